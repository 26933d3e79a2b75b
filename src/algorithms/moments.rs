use rustc_hash::FxHashMap;

use crate::basis::base::Basis;
use crate::storage::bounding_box::BoundingBox;
use crate::storage::element::{CoefficientLayout, ElementKey};
use crate::storage::element_store::ElementStore;

///
/// One weighted monomial `weight * v_1^{e_1} * ... * v_k^{e_k}` in the
/// velocity variables.
///
#[derive(Clone, Debug, PartialEq)]
pub struct MomentTerm
{
    pub exponents: Vec<u32>,
    pub weight: f64,
}

impl MomentTerm
{
    pub fn new(exponents: &[u32], weight: f64) -> Self
    {
        Self { exponents: exponents.to_vec(), weight }
    }
}

///
/// Integrals of each basis function of one velocity element against a
/// monomial in the physical velocity, keyed by (dimension, level, index, exponent).
///
struct VelocityMoments<'a, B: Basis>
{
    basis: &'a B,
    velocity_box: &'a BoundingBox,
    cache: FxHashMap<(usize, u8, u32, u32), Vec<f64>>,
}

impl<'a, B: Basis> VelocityMoments<'a, B>
{
    fn new(basis: &'a B, velocity_box: &'a BoundingBox) -> Self
    {
        Self { basis, velocity_box, cache: FxHashMap::default() }
    }

    fn get(&mut self, dim: usize, level: u8, index: u32, exponent: u32) -> &[f64]
    {
        let (basis, velocity_box) = (self.basis, self.velocity_box);
        self.cache.entry((dim, level, index, exponent)).or_insert_with(||
        {
            let lower = velocity_box.lower[dim];
            let width = velocity_box.width(dim);
            basis.project(level, index, &|t| width * (lower + width * t).powi(exponent as i32))
        })
    }
}

///
/// Adds `sum_terms weight * ∫ f v^e dv` of source component `vec_source` into
/// the right-hand side of target component `vec_target`.
///
/// The source has `dim_x + dim_v` dimensions with the x dimensions first; the
/// target has `dim_x`. Source elements whose x part is not present in the
/// target are skipped; their number is returned.
///
#[allow(clippy::too_many_arguments)]
pub(crate) fn accumulate_moments<B: Basis>(basis: &B, source: &ElementStore, source_layout: &CoefficientLayout, velocity_box: &BoundingBox,
    target: &mut ElementStore, target_layout: &CoefficientLayout, terms: &[MomentTerm], vec_source: usize, vec_target: usize) -> usize
{
    let dim_x = target_layout.dim;
    let dim_v = source_layout.dim - dim_x;
    let p = source_layout.num_basis;
    let velocity_len = p.pow(dim_v as u32);
    let mut moments = VelocityMoments::new(basis, velocity_box);
    let mut skipped = 0;
    // per velocity multi-index: value of the weighted sum of monomial integrals
    let mut integrals = vec![0.0; velocity_len];
    let velocity_layout = CoefficientLayout::new(dim_v, 1, p);
    for element in source.iter()
    {
        let x_key = ElementKey::new(&element.level()[..dim_x], &element.index()[..dim_x]);
        let Some(target_element) = target.find_mut(&x_key) else
        {
            log::trace!("no target element for {}", element.key());
            skipped += 1;
            continue;
        };
        integrals.iter_mut().for_each(|v| *v = 0.0);
        for term in terms
        {
            let rows: Vec<Vec<f64>> = (0..dim_v).map(|d|
            {
                moments.get(d, element.level()[dim_x + d], element.index()[dim_x + d], term.exponents[d]).to_vec()
            }).collect();
            for (flat, value) in integrals.iter_mut().enumerate()
            {
                let multi = velocity_layout.multi_index(flat);
                *value += term.weight * multi.iter().enumerate().map(|(d, &i)| rows[d][i]).product::<f64>();
            }
        }
        if integrals.iter().all(|v| *v == 0.0)
        {
            continue;
        }
        let coeff = source_layout.component(element.coeff(), vec_source);
        let rhs = target_layout.component_mut(&mut target_element.rhs, vec_target);
        for (i_x, out) in rhs.iter_mut().enumerate()
        {
            let block = &coeff[i_x * velocity_len..(i_x + 1) * velocity_len];
            *out += block.iter().zip(integrals.iter()).map(|(c, m)| c * m).sum::<f64>();
        }
    }
    skipped
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::basis::alpert::AlpertBasis;
    use crate::storage::element::Element;
    use crate::utilities::multi_index::support;

    fn single(store: &mut ElementStore, key: ElementKey, coeff: Vec<f64>)
    {
        let id = store.hash().hash_key(&key);
        store.insert(Element::new(key.clone(), id, support(&key), coeff, 0, 0));
    }

    #[test]
    fn density_of_constant_distribution()
    {
        let basis = AlpertBasis::new(1);
        let source_layout = CoefficientLayout::new(2, 1, 2);
        let target_layout = CoefficientLayout::new(1, 1, 2);
        let mut source = ElementStore::new(2, 3).unwrap();
        let mut target = ElementStore::new(1, 3).unwrap();
        // f(x, v) = 1 on [0,1] x [-2,2]: only the (0,0) coefficient of the root
        single(&mut source, ElementKey::root(2), vec![1.0, 0.0, 0.0, 0.0]);
        single(&mut source, ElementKey::new(&[1, 0], &[1, 0]), vec![0.0; 4]);
        single(&mut target, ElementKey::root(1), vec![0.0; 2]);
        let velocity = BoundingBox::new(&[-2.0], &[2.0]);
        let terms = [MomentTerm::new(&[0], 1.0)];
        let skipped = accumulate_moments(&basis, &source, &source_layout, &velocity, &mut target, &target_layout, &terms, 0, 0);
        assert_eq!(skipped, 1);
        let rhs = target.find(&ElementKey::root(1)).unwrap().rhs().to_vec();
        assert!((rhs[0] - 4.0).abs() < 1e-12);
        assert!(rhs[1].abs() < 1e-12);

        // first moment of a symmetric distribution vanishes
        let terms = [MomentTerm::new(&[1], 1.0)];
        accumulate_moments(&basis, &source, &source_layout, &velocity, &mut target, &target_layout, &terms, 0, 0);
        let after = target.find(&ElementKey::root(1)).unwrap().rhs().to_vec();
        assert!((after[0] - 4.0).abs() < 1e-12);
    }
}
