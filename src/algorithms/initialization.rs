use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::basis::base::Basis;
use crate::storage::bounding_box::BoundingBox;
use crate::storage::element::{CoefficientLayout, ElementKey};
use crate::utilities::multi_index::ordinal_1d;

///
/// One factor family of a separable function: `(x, d) -> g_d(x)`, so that
/// `f(x_1, ..., x_dim) = g_0(x_1) * ... * g_{dim-1}(x_dim)`.
///
pub type SeparableFunction = dyn Fn(f64, usize) -> f64 + Send + Sync;

///
/// One-dimensional projections of a separable term onto every (level, index)
/// up to `max_level`, one table per dimension. A d-dimensional coefficient
/// block is then a tensor product of d table rows.
///
pub(crate) struct SeparableProjection
{
    /// [dim][ordinal] -> coefficients of the basis functions
    tables: Vec<Vec<Vec<f64>>>,
}

impl SeparableProjection
{
    pub(crate) fn new<B: Basis>(basis: &B, func: &SeparableFunction, dim: usize, max_level: u8, domain: &BoundingBox) -> Self
    {
        let tables = (0..dim).map(|d|
        {
            let positions: Vec<(u8, u32)> = std::iter::once((0u8, 0u32))
                .chain((1..=max_level).flat_map(|l| (1..(1u32 << l)).step_by(2).map(move |i| (l, i))))
                .collect();
            positions.into_par_iter().map(|(l, i)|
            {
                basis.project(l, i, &|t| func(domain.to_real_1d(d, t), d))
            }).collect()
        }).collect();
        Self { tables }
    }

    #[inline]
    pub(crate) fn row(&self, dim: usize, level: u8, index: u32) -> &[f64]
    {
        &self.tables[dim][ordinal_1d(level, index) as usize]
    }

    ///
    /// Adds the tensor product coefficients of this term on `key` into `out`.
    ///
    pub(crate) fn accumulate(&self, key: &ElementKey, layout: &CoefficientLayout, out: &mut [f64])
    {
        let rows: Vec<&[f64]> = (0..layout.dim).map(|d| self.row(d, key.level[d], key.index[d])).collect();
        for (flat, value) in out.iter_mut().enumerate()
        {
            let multi = layout.multi_index(flat);
            *value += multi.iter().enumerate().map(|(d, &i)| rows[d][i]).product::<f64>();
        }
    }
}

///
/// A system of sums of separable functions: for each component, a list of
/// separable terms.
///
pub(crate) struct SeparableTarget
{
    components: Vec<Vec<SeparableProjection>>,
}

impl SeparableTarget
{
    pub(crate) fn new<B: Basis>(basis: &B, funcs: &[Vec<&SeparableFunction>], dim: usize, max_level: u8, domain: &BoundingBox) -> Self
    {
        let components = funcs.iter().map(|terms|
        {
            terms.iter().map(|&f| SeparableProjection::new(basis, f, dim, max_level, domain)).collect()
        }).collect();
        Self { components }
    }

    ///
    /// Coefficient block of `key`: every component, every term summed.
    ///
    pub(crate) fn block(&self, key: &ElementKey, layout: &CoefficientLayout) -> Vec<f64>
    {
        let mut block = vec![0.0; layout.block_len()];
        for (vec, terms) in self.components.iter().enumerate()
        {
            let out = layout.component_mut(&mut block, vec);
            for term in terms
            {
                term.accumulate(key, layout, out);
            }
        }
        block
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::basis::alpert::AlpertBasis;

    #[test]
    fn tensor_block_is_product_of_rows()
    {
        let basis = AlpertBasis::new(1);
        let f = |x: f64, d: usize| if d == 0 { x } else { 1.0 };
        let target = SeparableTarget::new(&basis, &[vec![&f as &SeparableFunction]], 2, 3, &BoundingBox::with_dim(2));
        let layout = CoefficientLayout::new(2, 1, 2);
        let block = target.block(&ElementKey::root(2), &layout);
        // x -> (1/2, 1/(2*sqrt(3))) against (1, 0)
        assert!((block[0] - 0.5).abs() < 1e-12);
        assert!(block[1].abs() < 1e-12);
        assert!((block[2] - 0.5 / 3f64.sqrt()).abs() < 1e-12);
        assert!(block[3].abs() < 1e-12);
        // a linear function has no detail with degree 1
        let block = target.block(&ElementKey::new(&[2, 0], &[1, 0]), &layout);
        assert!(block.iter().all(|c| c.abs() < 1e-12));
    }
}
