use std::collections::BTreeSet;

use indexmap::IndexSet;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::storage::element::{CoefficientLayout, Element, ElementKey};
use crate::storage::element_store::ElementStore;
use crate::utilities::multi_index::{all_ancestor_indices, children_by_dim, LevelConstraint};

///
/// Scalar measure of an element's detail, compared against the refinement
/// threshold `eps` and the coarsening threshold `eta`.
///
pub trait IndicatorFunctor : Send + Sync
{
    ///
    /// Return the indicator of `element`. A common choice is the L2 norm of
    /// the element's coefficient block, which in an orthonormal hierarchical
    /// basis is exactly the local detail.
    ///
    fn eval(&self, element: &Element, layout: &CoefficientLayout) -> f64;
}

///
/// Read-only pass: ids in `leaf` whose indicator is at least `eps`.
/// Evaluated in parallel; the result keeps the order of `leaf`.
///
pub(crate) fn refinable_leaves(store: &ElementStore, leaf: &IndexSet<u64>, indicator: &dyn IndicatorFunctor, layout: &CoefficientLayout, eps: f64) -> Vec<u64>
{
    let ids: Vec<u64> = leaf.iter().copied().collect();
    ids.par_iter().filter_map(|&id|
    {
        let element = store.get(id)?;
        let value = indicator.eval(element, layout);
        log::trace!("indicator {value:e} at {}", element.key());
        (value >= eps).then_some(id)
    }).collect()
}

///
/// Missing children of every element in `marked`, together with any missing
/// ancestor of those children, sorted coarse to fine so that inserting them in
/// order never leaves a hole.
///
pub(crate) fn plan_refinement(store: &ElementStore, marked: &[u64], constraint: &LevelConstraint) -> Vec<ElementKey>
{
    let mut planned = BTreeSet::new();
    for &id in marked
    {
        let Some(element) = store.get(id) else { continue };
        for (_, _, child) in children_by_dim(element.key(), constraint)
        {
            if !store.contains(&child)
            {
                planned.insert(child);
            }
        }
    }
    close_under_ancestors(store, planned)
}

///
/// Adds every missing ancestor of the planned keys. The returned keys are sorted
/// by level sum.
///
pub(crate) fn close_under_ancestors(store: &ElementStore, planned: BTreeSet<ElementKey>) -> Vec<ElementKey>
{
    let mut closed = planned.clone();
    for key in &planned
    {
        for ancestor in all_ancestor_indices(key)
        {
            if !store.contains(&ancestor)
            {
                closed.insert(ancestor);
            }
        }
    }
    closed.into_iter().collect()
}

///
/// Children along `dims` of every element whose level in that dimension is
/// still below `max_mesh`.
///
pub(crate) fn plan_refinement_to_level(store: &ElementStore, max_mesh: u8, dims: &[usize], constraint: &LevelConstraint) -> Vec<ElementKey>
{
    let mut planned = BTreeSet::new();
    for element in store.iter()
    {
        for (d, _, child) in children_by_dim(element.key(), constraint)
        {
            if dims.contains(&d) && element.level()[d] < max_mesh && !store.contains(&child)
            {
                planned.insert(child);
            }
        }
    }
    close_under_ancestors(store, planned)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::storage::element::Element;
    use crate::utilities::multi_index::support;

    fn store_with(keys: &[ElementKey]) -> ElementStore
    {
        let mut store = ElementStore::new(2, 4).unwrap();
        for key in keys
        {
            let id = store.hash().hash_key(key);
            store.insert(Element::new(key.clone(), id, support(key), vec![0.0], 0, 0));
        }
        store
    }

    #[test]
    fn planned_keys_include_missing_ancestors()
    {
        let root = ElementKey::root(2);
        let a = ElementKey::new(&[1, 0], &[1, 0]);
        let b = ElementKey::new(&[0, 1], &[0, 1]);
        let store = store_with(&[root, a.clone(), b]);
        let constraint = LevelConstraint::new(false, 4);
        let id = store.id_of(&a).unwrap();
        let planned = plan_refinement(&store, &[id], &constraint);
        // children of (1,0): (2,0)x2 and (1,1); (1,1) has parents (1,0) and (0,1), both present
        assert_eq!(planned.len(), 3);
        assert!(planned.contains(&ElementKey::new(&[1, 1], &[1, 1])));

        let store = store_with(&[ElementKey::root(2), a.clone()]);
        let id = store.id_of(&a).unwrap();
        let planned = plan_refinement(&store, &[id], &constraint);
        // (1,1) now needs (0,1) first
        let pos_parent = planned.iter().position(|k| *k == ElementKey::new(&[0, 1], &[0, 1])).unwrap();
        let pos_child = planned.iter().position(|k| *k == ElementKey::new(&[1, 1], &[1, 1])).unwrap();
        assert!(pos_parent < pos_child);
    }
}
