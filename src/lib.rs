//!
//! Adaptive multiresolution element management for sparse-grid discontinuous
//! Galerkin solvers.
//!
//! A function on the unit cube is stored as a tree of elements, each carrying
//! a block of multiwavelet coefficients. [`grids::dg_adapt::DGAdapt`] decides
//! which elements must exist to represent the function within a tolerance and
//! keeps every element's ancestor chain present.
//!
pub mod algorithms;
pub mod basis;
pub mod config;
pub mod errors;
pub mod grids;
pub mod refinement;
pub mod serialization;
pub mod storage;
pub mod utilities;
