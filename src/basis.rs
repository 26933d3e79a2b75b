pub mod alpert;
pub mod base;
pub mod gauss_legendre;
