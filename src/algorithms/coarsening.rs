use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::algorithms::refinement::IndicatorFunctor;
use crate::storage::element::{CoefficientLayout, ElementKey};
use crate::storage::element_store::ElementStore;

///
/// Childless elements that are allowed to go: zero-child leaves, plus
/// childless elements that can have no children at all (maximum level).
/// Elements for which `protected` holds are never offered.
///
pub(crate) fn coarsening_candidates<P: Fn(&ElementKey) -> bool>(store: &ElementStore, protected: P) -> Vec<u64>
{
    store.iter().filter(|e|
    {
        e.num_exist_chd() == 0
            && (e.is_leaf_zero_child() || e.num_total_chd() == 0)
            && !protected(e.key())
    }).map(|e| e.id()).collect()
}

///
/// Read-only pass: keys among `candidates` whose indicator is below `eta`.
///
pub(crate) fn plan_coarsening(store: &ElementStore, candidates: &[u64], indicator: &dyn IndicatorFunctor, layout: &CoefficientLayout, eta: f64) -> Vec<ElementKey>
{
    candidates.par_iter().filter_map(|&id|
    {
        let element = store.get(id)?;
        let value = indicator.eval(element, layout);
        (value < eta).then(|| element.key().clone())
    }).collect()
}

///
/// Childless elements with a level above `max_mesh` in one of `dims`.
///
pub(crate) fn plan_coarsening_to_level(store: &ElementStore, max_mesh: u8, dims: &[usize]) -> Vec<ElementKey>
{
    store.iter().filter(|e|
    {
        e.num_exist_chd() == 0 && dims.iter().any(|&d| e.level()[d] > max_mesh)
    }).map(|e| e.key().clone()).collect()
}
