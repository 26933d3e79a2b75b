pub mod multi_index;
