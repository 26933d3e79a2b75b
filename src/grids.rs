pub mod dg_adapt;
