///
/// One-dimensional hierarchical basis consumed by the adaptive engine.
///
/// Elements are addressed by (level, index) in unit coordinates. Basis
/// functions must be orthonormal across all levels so that coefficients are
/// plain inner products and their norm is the local L2 detail.
///
pub trait Basis : Send + Sync
{
    /// Number of basis functions on one element in one dimension.
    fn num_basis(&self) -> usize;

    /// Polynomial degree of the basis.
    fn degree(&self) -> usize;

    /// Value of basis function `i` of element (level, index) at `x`; zero outside the support.
    fn eval(&self, level: u8, index: u32, i: usize, x: f64) -> f64;

    ///
    /// Inner products of `f` with every basis function of element (level, index).
    ///
    fn project(&self, level: u8, index: u32, f: &dyn Fn(f64) -> f64) -> Vec<f64>;
}
