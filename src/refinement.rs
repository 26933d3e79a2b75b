pub mod detail_norm;
pub mod user_defined;
