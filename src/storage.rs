pub mod bounding_box;
pub mod element;
pub mod element_store;
pub mod hash_table;
