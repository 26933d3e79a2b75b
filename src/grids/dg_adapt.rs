use std::collections::BTreeSet;
use std::fmt::Display;

use indexmap::IndexSet;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::algorithms::coarsening::{coarsening_candidates, plan_coarsening, plan_coarsening_to_level};
use crate::algorithms::initialization::{SeparableFunction, SeparableTarget};
use crate::algorithms::moments::{accumulate_moments, MomentTerm};
use crate::algorithms::refinement::{close_under_ancestors, plan_refinement, plan_refinement_to_level, refinable_leaves, IndicatorFunctor};
use crate::basis::base::Basis;
use crate::config::AdaptConfig;
use crate::errors::DGError;
use crate::refinement::detail_norm::DetailNorm;
use crate::serialization::{deserialize, serialize, SerializationFormat};
use crate::storage::bounding_box::BoundingBox;
use crate::storage::element::{CoefficientLayout, Element, ElementKey};
use crate::storage::element_store::ElementStore;
use crate::utilities::multi_index::{all_ancestor_indices, child_slot, children_by_dim, initial_mesh, num_all_chd, num_all_par, parents_by_dim, support, validate_key};

///
/// Phases of an adaptation step, used to tag log records and invariant failures.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdaptStage
{
    Init,
    Add,
    Delete,
    Refine,
    Coarsen,
}

impl Display for AdaptStage
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self
        {
            AdaptStage::Init => "init",
            AdaptStage::Add => "add",
            AdaptStage::Delete => "delete",
            AdaptStage::Refine => "refine",
            AdaptStage::Coarsen => "coarsen",
        };
        write!(f, "{name}")
    }
}

///
/// Outcome of one call to [`DGAdapt::adapt`].
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdaptReport
{
    pub added: usize,
    pub removed: usize,
}

///
/// Persisted form of a single element.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord
{
    pub level: Vec<u8>,
    pub index: Vec<u32>,
    pub coeff: Vec<f64>,
}

///
/// Persisted form of a whole mesh. Links and leaf sets are rebuilt on restore.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshSnapshot
{
    pub config: AdaptConfig,
    pub domain: BoundingBox,
    pub num_basis: usize,
    pub elements: Vec<ElementRecord>,
}

///
/// Adaptive multiresolution mesh.
///
/// Owns the element store and keeps it free of holes: every element's full
/// ancestor chain is present between any two public calls. Structural changes
/// are planned in a read-only pass and then applied serially, parents before
/// children.
///
pub struct DGAdapt<B: Basis>
{
    config: AdaptConfig,
    basis: B,
    layout: CoefficientLayout,
    store: ElementStore,
    domain: BoundingBox,
    indicator: Box<dyn IndicatorFunctor>,
    leaf: IndexSet<u64>,
    leaf_zero_child: IndexSet<u64>,
    viscosity_element: Vec<u64>,
}

impl<B: Basis> DGAdapt<B>
{
    ///
    /// Creates the uniform starting mesh at `config.level_init` with zero
    /// coefficients.
    ///
    pub fn new(config: AdaptConfig, basis: B) -> Result<Self, DGError>
    {
        let mut grid = Self::empty(config, basis)?;
        grid.build_initial_mesh(|layout, _| vec![0.0; layout.block_len()]);
        grid.verify(AdaptStage::Init)?;
        Ok(grid)
    }

    fn empty(config: AdaptConfig, basis: B) -> Result<Self, DGError>
    {
        config.validate()?;
        let layout = CoefficientLayout::new(config.dim, config.num_vec, basis.num_basis());
        let store = ElementStore::new(config.dim, config.nmax)?;
        let domain = BoundingBox::with_dim(config.dim);
        let indicator = Box::new(DetailNorm::new(&config.indicator_components));
        Ok(Self { config, basis, layout, store, domain, indicator, leaf: IndexSet::new(), leaf_zero_child: IndexSet::new(), viscosity_element: Vec::new() })
    }

    ///
    /// Sets the physical extent of the domain. Elements always live on the
    /// unit cube; the domain only affects projection and point evaluation.
    ///
    pub fn with_domain(mut self, domain: BoundingBox) -> Result<Self, DGError>
    {
        if domain.dim() != self.config.dim
        {
            return Err(DGError::DimensionMismatch { expected: self.config.dim, found: domain.dim() });
        }
        if (0..domain.dim()).any(|d| !(domain.width(d) > 0.0))
        {
            return Err(DGError::InvalidConfiguration(format!("degenerate domain {:?} -> {:?}", domain.lower, domain.upper)));
        }
        self.domain = domain;
        Ok(self)
    }

    ///
    /// Replaces the refinement indicator (default: [`DetailNorm`] over the
    /// configured indicator components).
    ///
    pub fn set_indicator<I: IndicatorFunctor + 'static>(&mut self, indicator: I)
    {
        self.indicator = Box::new(indicator);
    }

    #[inline]
    pub fn config(&self) -> &AdaptConfig
    {
        &self.config
    }

    #[inline]
    pub fn basis(&self) -> &B
    {
        &self.basis
    }

    #[inline]
    pub fn layout(&self) -> &CoefficientLayout
    {
        &self.layout
    }

    #[inline]
    pub fn domain(&self) -> &BoundingBox
    {
        &self.domain
    }

    #[inline]
    pub fn dim(&self) -> usize
    {
        self.config.dim
    }

    #[inline]
    pub fn store(&self) -> &ElementStore
    {
        &self.store
    }

    #[inline]
    pub fn len(&self) -> usize
    {
        self.store.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.store.is_empty()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element>
    {
        self.store.iter()
    }

    #[inline]
    pub fn contains(&self, key: &ElementKey) -> bool
    {
        self.store.contains(key)
    }

    #[inline]
    pub fn find(&self, key: &ElementKey) -> Option<&Element>
    {
        self.store.find(key)
    }

    ///
    /// Mutable access to one element. Only coefficients and right-hand side
    /// can be changed through it; the tree structure cannot.
    ///
    #[inline]
    pub fn find_mut(&mut self, key: &ElementKey) -> Option<&mut Element>
    {
        self.store.find_mut(key)
    }

    /// Sorted keys of every element.
    pub fn keys(&self) -> Vec<ElementKey>
    {
        let mut keys: Vec<ElementKey> = self.store.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    #[inline]
    pub fn leaf(&self) -> &IndexSet<u64>
    {
        &self.leaf
    }

    #[inline]
    pub fn leaf_zero_child(&self) -> &IndexSet<u64>
    {
        &self.leaf_zero_child
    }

    #[inline]
    pub fn viscosity_element(&self) -> &[u64]
    {
        &self.viscosity_element
    }

    /// Indicator of one element under the current indicator functor.
    pub fn indicator(&self, element: &Element) -> f64
    {
        self.indicator.eval(element, &self.layout)
    }

    /// True if `key` belongs to the uniform starting mesh; such elements are never coarsened.
    pub fn is_initial(&self, key: &ElementKey) -> bool
    {
        self.config.initial_constraint().admits(&key.level)
    }

    fn build_initial_mesh<F: Fn(&CoefficientLayout, &ElementKey) -> Vec<f64>>(&mut self, block: F)
    {
        self.store.clear();
        self.leaf.clear();
        self.leaf_zero_child.clear();
        self.viscosity_element.clear();
        for key in initial_mesh(self.config.dim, &self.config.initial_constraint())
        {
            let coeff = block(&self.layout, &key);
            self.insert_element(key, coeff);
        }
        self.update_leaf();
        log::debug!("initial mesh at level {} with {} elements", self.config.level_init, self.store.len());
    }

    ///
    /// Allocates an element and links it to every existing parent and child.
    /// The caller guarantees `key` is valid and absent.
    ///
    fn insert_element(&mut self, key: ElementKey, coeff: Vec<f64>) -> u64
    {
        let constraint = self.config.constraint();
        let id = self.store.hash().hash_key(&key);
        let num_par = num_all_par(&key.level);
        let num_chd = num_all_chd(&key.level, &constraint);
        let mut element = Element::new(key.clone(), id, support(&key), coeff, num_par, num_chd);
        for (d, parent) in parents_by_dim(&key)
        {
            if let Some(parent_element) = self.store.find_mut(&parent)
            {
                let slot = child_slot(parent.level[d], parent.index[d], key.index[d]);
                parent_element.children[d][slot] = Some(id);
                element.parents[d] = Some(parent_element.id);
            }
        }
        for (d, slot, child) in children_by_dim(&key, &constraint)
        {
            if let Some(child_element) = self.store.find_mut(&child)
            {
                child_element.parents[d] = Some(id);
                element.children[d][slot] = Some(child_element.id);
            }
        }
        log::trace!("add {key}");
        self.store.insert(element);
        id
    }

    ///
    /// Removes the elements `keys` and clears the links that point at them.
    /// Absent keys are ignored. Returns the number of removed elements.
    ///
    fn remove_elements(&mut self, keys: &[ElementKey]) -> usize
    {
        let ids: Vec<u64> = keys.iter().filter_map(|key| self.store.id_of(key)).collect();
        for &id in &ids
        {
            let Some(element) = self.store.get(id) else { continue };
            let (parents, children) = (element.parents.clone(), element.children.clone());
            for (d, parent) in parents.into_iter().enumerate()
            {
                if let Some(parent_element) = parent.and_then(|p| self.store.get_mut(p))
                {
                    for slot in parent_element.children[d].iter_mut().filter(|slot| **slot == Some(id))
                    {
                        *slot = None;
                    }
                }
            }
            for (d, pair) in children.into_iter().enumerate()
            {
                for child in pair.into_iter().flatten()
                {
                    if let Some(child_element) = self.store.get_mut(child)
                    {
                        child_element.parents[d] = None;
                    }
                }
            }
            log::trace!("delete {}", self.store.hash().decode(id));
        }
        let doomed: FxHashSet<u64> = ids.into_iter().collect();
        self.leaf.retain(|id| !doomed.contains(id));
        self.leaf_zero_child.retain(|id| !doomed.contains(id));
        self.store.erase_all(&doomed)
    }

    fn validate_admissible(&self, key: &ElementKey) -> Result<(), DGError>
    {
        validate_key(key, self.config.dim, self.config.nmax)?;
        if !self.config.constraint().admits(&key.level)
        {
            return Err(DGError::InvalidIndex { level: key.level.clone(), index: key.index.clone() });
        }
        Ok(())
    }

    ///
    /// Adds the element `key` with zero coefficients. Missing ancestors are
    /// added first so no hole appears. Returns `false` if `key` was present,
    /// in which case nothing changes.
    ///
    pub fn add_elem(&mut self, key: &ElementKey) -> Result<bool, DGError>
    {
        self.validate_admissible(key)?;
        if self.store.contains(key)
        {
            return Ok(false);
        }
        let mut planned: BTreeSet<ElementKey> = all_ancestor_indices(key).into_iter().filter(|a| !self.store.contains(a)).collect();
        planned.insert(key.clone());
        for k in planned
        {
            self.insert_element(k, vec![0.0; self.layout.block_len()]);
        }
        self.update_leaf();
        self.verify(AdaptStage::Add)?;
        Ok(true)
    }

    ///
    /// Deletes the element `key`. Fails with [`DGError::ElementHasChildren`]
    /// (and changes nothing) if any child of it exists. Returns `false` if
    /// `key` was not present.
    ///
    pub fn del_elem(&mut self, key: &ElementKey) -> Result<bool, DGError>
    {
        validate_key(key, self.config.dim, self.config.nmax)?;
        match self.store.find(key)
        {
            None => return Ok(false),
            Some(element) if element.num_exist_chd() > 0 => return Err(DGError::ElementHasChildren { key: key.clone() }),
            Some(_) => {}
        }
        self.remove_elements(std::slice::from_ref(key));
        self.update_leaf();
        self.verify(AdaptStage::Delete)?;
        Ok(true)
    }

    ///
    /// Recomputes both leaf sets from the existing child counts.
    ///
    pub fn update_leaf(&mut self)
    {
        self.leaf.clear();
        for element in self.store.iter_mut()
        {
            let is_leaf = element.num_exist_chd() < element.num_total_chd;
            element.flags.set_is_leaf(is_leaf);
            if is_leaf
            {
                self.leaf.insert(element.id);
            }
        }
        self.update_leaf_zero_child();
    }

    ///
    /// Leaves without any existing child.
    ///
    pub fn update_leaf_zero_child(&mut self)
    {
        self.leaf_zero_child.clear();
        for element in self.store.iter_mut()
        {
            let zero = element.is_leaf() && element.num_exist_chd() == 0;
            element.flags.set_is_leaf_zero_child(zero);
            if zero
            {
                self.leaf_zero_child.insert(element.id);
            }
        }
    }

    ///
    /// Every immediate parent of every element is present and linked.
    ///
    pub fn check_hole(&self) -> Result<(), DGError>
    {
        for element in self.store.iter()
        {
            for (d, parent) in parents_by_dim(element.key())
            {
                if !self.store.contains(&parent) || element.parents[d].is_none()
                {
                    return Err(DGError::HoleDetected { key: element.key().clone(), missing: parent });
                }
            }
        }
        Ok(())
    }

    ///
    /// The number of parent links equals the number of child links.
    ///
    pub fn check_total_num_chd_par_equal(&self) -> Result<(), DGError>
    {
        let parents: usize = self.store.iter().map(|e| e.num_exist_par()).sum();
        let children: usize = self.store.iter().map(|e| e.num_exist_chd()).sum();
        if parents != children
        {
            return Err(DGError::LinkCountMismatch { parents, children });
        }
        Ok(())
    }

    pub fn set_all_new_add_false(&mut self)
    {
        for element in self.store.iter_mut()
        {
            element.flags.set_new_add(false);
        }
    }

    fn verify(&self, stage: AdaptStage) -> Result<(), DGError>
    {
        if !self.config.check_invariants
        {
            return Ok(());
        }
        let result = self.check_hole()
            .and_then(|_| self.check_total_num_chd_par_equal())
            .and_then(|_| self.store.check_consistency());
        if let Err(e) = &result
        {
            log::error!("invariant violated after {stage}: {e}");
        }
        result
    }

    fn insert_planned(&mut self, planned: Vec<ElementKey>)
    {
        let block_len = self.layout.block_len();
        for key in planned
        {
            self.insert_element(key, vec![0.0; block_len]);
        }
    }

    ///
    /// Adds every missing child of each leaf whose indicator is at least
    /// `eps`, together with any missing ancestor of those children. New
    /// elements carry zero coefficients. Returns the number of added elements.
    ///
    pub fn refine(&mut self) -> Result<usize, DGError>
    {
        let marked = refinable_leaves(&self.store, &self.leaf, self.indicator.as_ref(), &self.layout, self.config.eps);
        let planned = plan_refinement(&self.store, &marked, &self.config.constraint());
        let added = planned.len();
        self.insert_planned(planned);
        self.update_leaf();
        self.verify(AdaptStage::Refine)?;
        log::debug!("{}: {} leaves marked, {} elements added, {} total", AdaptStage::Refine, marked.len(), added, self.store.len());
        Ok(added)
    }

    ///
    /// Deletes childless elements whose indicator is below `eta`, pass after
    /// pass, until no candidate qualifies. Elements of the initial mesh are
    /// kept. Returns the number of deleted elements.
    ///
    pub fn coarsen(&mut self) -> Result<usize, DGError>
    {
        self.coarsen_with_threshold(self.config.eta, false)
    }

    fn coarsen_with_threshold(&mut self, threshold: f64, keep_new: bool) -> Result<usize, DGError>
    {
        let mut removed = 0;
        let mut passes = 0;
        loop
        {
            let candidates = coarsening_candidates(&self.store, |key| self.is_initial(key));
            let candidates: Vec<u64> = if keep_new
            {
                candidates.into_iter().filter(|&id| self.store.get(id).is_some_and(|e| !e.is_new_add())).collect()
            }
            else
            {
                candidates
            };
            let doomed = plan_coarsening(&self.store, &candidates, self.indicator.as_ref(), &self.layout, threshold);
            if doomed.is_empty()
            {
                break;
            }
            for key in &doomed
            {
                if let Some(element) = self.store.find_mut(key)
                {
                    element.flags.set_marked_delete(true);
                }
            }
            let marked: Vec<ElementKey> = self.store.iter().filter(|e| e.is_marked_delete()).map(|e| e.key().clone()).collect();
            removed += self.remove_elements(&marked);
            passes += 1;
            self.update_leaf();
        }
        self.verify(AdaptStage::Coarsen)?;
        log::debug!("{}: {} elements removed in {} passes, {} total", AdaptStage::Coarsen, removed, passes, self.store.len());
        Ok(removed)
    }

    ///
    /// One adaptation step: refine, then coarsen. Elements added by this
    /// step's refinement are not coarsened in the same step.
    ///
    pub fn adapt(&mut self) -> Result<AdaptReport, DGError>
    {
        self.set_all_new_add_false();
        let added = self.refine()?;
        let removed = self.coarsen_with_threshold(self.config.eta, true)?;
        Ok(AdaptReport { added, removed })
    }

    fn validate_dims(&self, dims: &[usize]) -> Result<(), DGError>
    {
        match dims.iter().find(|&&d| d >= self.config.dim)
        {
            Some(&d) => Err(DGError::DimensionMismatch { expected: self.config.dim, found: d + 1 }),
            None => Ok(()),
        }
    }

    ///
    /// Refines along `dims` until every element reaches `max_mesh` in those
    /// dimensions (subject to the level constraint).
    ///
    pub fn refine_to_max_level(&mut self, max_mesh: u8, dims: &[usize]) -> Result<usize, DGError>
    {
        self.validate_dims(dims)?;
        let constraint = self.config.constraint();
        let mut added = 0;
        loop
        {
            let planned = plan_refinement_to_level(&self.store, max_mesh, dims, &constraint);
            if planned.is_empty()
            {
                break;
            }
            added += planned.len();
            self.insert_planned(planned);
        }
        self.update_leaf();
        self.verify(AdaptStage::Refine)?;
        Ok(added)
    }

    ///
    /// Deletes every element finer than `max_mesh` in one of `dims`, children
    /// first.
    ///
    pub fn coarsen_to_max_level(&mut self, max_mesh: u8, dims: &[usize]) -> Result<usize, DGError>
    {
        self.validate_dims(dims)?;
        let mut removed = 0;
        loop
        {
            let doomed = plan_coarsening_to_level(&self.store, max_mesh, dims);
            if doomed.is_empty()
            {
                break;
            }
            removed += self.remove_elements(&doomed);
        }
        self.update_leaf();
        self.verify(AdaptStage::Coarsen)?;
        Ok(removed)
    }

    ///
    /// Adaptive projection of a scalar separable function `g_0(x_1)*...*g_{d-1}(x_d)`
    /// into component 0. Other components are zeroed.
    ///
    pub fn init_separable_scalar(&mut self, func: &SeparableFunction) -> Result<usize, DGError>
    {
        self.init_separable_scalar_sum(&[func])
    }

    ///
    /// As [`DGAdapt::init_separable_scalar`] for a sum of separable terms.
    ///
    pub fn init_separable_scalar_sum(&mut self, funcs: &[&SeparableFunction]) -> Result<usize, DGError>
    {
        let mut system: Vec<Vec<&SeparableFunction>> = vec![Vec::new(); self.config.num_vec];
        system[0] = funcs.to_vec();
        self.init_separable(&system)
    }

    ///
    /// One separable function per component.
    ///
    pub fn init_separable_system(&mut self, funcs: &[&SeparableFunction]) -> Result<usize, DGError>
    {
        let system: Vec<Vec<&SeparableFunction>> = funcs.iter().map(|&f| vec![f]).collect();
        self.init_separable_system_sum(&system)
    }

    ///
    /// A sum of separable functions per component.
    ///
    pub fn init_separable_system_sum(&mut self, funcs: &[Vec<&SeparableFunction>]) -> Result<usize, DGError>
    {
        if funcs.len() != self.config.num_vec
        {
            return Err(DGError::ComponentCountMismatch { expected: self.config.num_vec, found: funcs.len() });
        }
        self.init_separable(funcs)
    }

    ///
    /// Rebuilds the mesh from the initial level: every element is projected
    /// exactly through the separable structure, newly added leaves whose
    /// indicator reaches `eps` are refined until none qualify, and finally
    /// childless refined elements below `eps` are pruned.
    ///
    fn init_separable(&mut self, funcs: &[Vec<&SeparableFunction>]) -> Result<usize, DGError>
    {
        let target = SeparableTarget::new(&self.basis, funcs, self.config.dim, self.config.nmax, &self.domain);
        let constraint = self.config.constraint();
        let layout = self.layout;
        self.build_initial_mesh(|layout, key| target.block(key, layout));
        let mut rounds = 0;
        loop
        {
            let fresh: IndexSet<u64> = self.leaf.iter().copied()
                .filter(|&id| self.store.get(id).is_some_and(|e| e.is_new_add()))
                .collect();
            let marked = refinable_leaves(&self.store, &fresh, self.indicator.as_ref(), &layout, self.config.eps);
            self.set_all_new_add_false();
            let planned = plan_refinement(&self.store, &marked, &constraint);
            if planned.is_empty()
            {
                break;
            }
            let blocks: Vec<Vec<f64>> = planned.par_iter().map(|key| target.block(key, &layout)).collect();
            log::debug!("{} round {}: {} leaves marked, {} elements added", AdaptStage::Init, rounds, marked.len(), planned.len());
            for (key, block) in planned.into_iter().zip(blocks)
            {
                self.insert_element(key, block);
            }
            self.update_leaf();
            rounds += 1;
        }
        let pruned = self.coarsen_with_threshold(self.config.eps, false)?;
        self.set_all_new_add_false();
        self.verify(AdaptStage::Init)?;
        log::info!("adaptive initialization: {} elements after {} refinement rounds ({} pruned)", self.store.len(), rounds, pruned);
        Ok(self.store.len())
    }

    ///
    /// Flags elements whose scaled indicator `kappa * indicator` exceeds `eps`.
    /// The tree is not changed. Returns the flagged ids.
    ///
    pub fn update_viscosity_element(&mut self, kappa: f64) -> &[u64]
    {
        let eps = self.config.eps;
        let elements: Vec<&Element> = self.store.iter().collect();
        let flagged: Vec<(u64, bool)> = elements.par_iter()
            .map(|e| (e.id, kappa * self.indicator.eval(e, &self.layout) > eps))
            .collect();
        self.viscosity_element.clear();
        for (id, flag) in flagged
        {
            if let Some(element) = self.store.get_mut(id)
            {
                element.flags.set_is_viscosity(flag);
            }
            if flag
            {
                self.viscosity_element.push(id);
            }
        }
        log::debug!("{} elements flagged for viscosity", self.viscosity_element.len());
        &self.viscosity_element
    }

    ///
    /// Ensures every element of `field`, extended by level 0 in the trailing
    /// dimensions, exists here. New elements carry zero coefficients.
    ///
    pub fn adapt_to_field<C: Basis>(&mut self, field: &DGAdapt<C>) -> Result<usize, DGError>
    {
        let dim_field = field.dim();
        if dim_field > self.config.dim
        {
            return Err(DGError::DimensionMismatch { expected: self.config.dim, found: dim_field });
        }
        let mut planned = BTreeSet::new();
        for element in field.elements()
        {
            let mut key = ElementKey::root(self.config.dim);
            key.level[..dim_field].copy_from_slice(element.level());
            key.index[..dim_field].copy_from_slice(element.index());
            if !self.store.contains(&key)
            {
                self.validate_admissible(&key)?;
                planned.insert(key);
            }
        }
        let planned = close_under_ancestors(&self.store, planned);
        let added = planned.len();
        self.insert_planned(planned);
        self.update_leaf();
        self.verify(AdaptStage::Refine)?;
        Ok(added)
    }

    ///
    /// Value of component `vec` at the physical point `x`.
    ///
    pub fn value(&self, x: &[f64], vec: usize) -> Result<f64, DGError>
    {
        if x.len() != self.config.dim
        {
            return Err(DGError::DimensionMismatch { expected: self.config.dim, found: x.len() });
        }
        if vec >= self.config.num_vec
        {
            return Err(DGError::ComponentOutOfRange { component: vec, num_vec: self.config.num_vec });
        }
        if !self.domain.contains(x)
        {
            return Err(DGError::OutOfDomain(x.to_vec()));
        }
        let unit = self.domain.to_unit_coordinate(x);
        let p = self.layout.num_basis;
        let mut sum = 0.0;
        for element in self.store.iter().filter(|e| e.contains(&unit))
        {
            let values: Vec<Vec<f64>> = (0..self.config.dim).map(|d|
            {
                (0..p).map(|i| self.basis.eval(element.level()[d], element.index()[d], i, unit[d])).collect()
            }).collect();
            let coeff = self.layout.component(element.coeff(), vec);
            for (flat, c) in coeff.iter().enumerate()
            {
                let multi = self.layout.multi_index(flat);
                sum += c * multi.iter().enumerate().map(|(d, &i)| values[d][i]).product::<f64>();
            }
        }
        Ok(sum)
    }

    /// Zeroes the right-hand side of every element.
    pub fn clear_rhs(&mut self)
    {
        for element in self.store.iter_mut()
        {
            element.rhs.iter_mut().for_each(|v| *v = 0.0);
        }
    }

    fn check_moment_source<C: Basis>(&self, f: &DGAdapt<C>, dim_v: usize, vec_f: usize, vec_target: usize) -> Result<(), DGError>
    {
        if f.dim() != self.config.dim + dim_v
        {
            return Err(DGError::DimensionMismatch { expected: self.config.dim + dim_v, found: f.dim() });
        }
        if f.layout.num_basis != self.layout.num_basis
        {
            return Err(DGError::InvalidConfiguration(format!("basis size {} does not match {}", f.layout.num_basis, self.layout.num_basis)));
        }
        if vec_f >= f.config.num_vec
        {
            return Err(DGError::ComponentOutOfRange { component: vec_f, num_vec: f.config.num_vec });
        }
        if vec_target >= self.config.num_vec
        {
            return Err(DGError::ComponentOutOfRange { component: vec_target, num_vec: self.config.num_vec });
        }
        Ok(())
    }

    fn accumulate_from<C: Basis>(&mut self, f: &DGAdapt<C>, terms: &[MomentTerm], vec_f: usize, vec_target: usize) -> usize
    {
        let velocity_box = f.domain.split(self.config.dim, true);
        let skipped = accumulate_moments(&f.basis, &f.store, &f.layout, &velocity_box, &mut self.store, &self.layout, terms, vec_f, vec_target);
        if skipped > 0
        {
            log::debug!("moment accumulation skipped {skipped} elements without a target");
        }
        skipped
    }

    ///
    /// Adds `sum_d moment_order_weight[d] * ∫ f v_d^{moment_order[d]} dv` of
    /// component 0 of `f` into component `num_vec` of the right-hand side.
    /// `f` carries this mesh's dimensions first, then the velocity dimensions.
    /// Returns the number of elements of `f` without a counterpart here.
    ///
    pub fn compute_moment_full_grid<C: Basis>(&mut self, f: &DGAdapt<C>, moment_order: &[u32], moment_order_weight: &[f64], num_vec: usize) -> Result<usize, DGError>
    {
        let dim_v = f.dim().saturating_sub(self.config.dim);
        self.check_moment_source(f, dim_v, 0, num_vec)?;
        if dim_v == 0 || moment_order.len() != dim_v || moment_order_weight.len() != dim_v
        {
            return Err(DGError::DimensionMismatch { expected: dim_v, found: moment_order.len().min(moment_order_weight.len()) });
        }
        let terms: Vec<MomentTerm> = (0..dim_v).map(|d|
        {
            let mut exponents = vec![0; dim_v];
            exponents[d] = moment_order[d];
            MomentTerm { exponents, weight: moment_order_weight[d] }
        }).collect();
        Ok(self.accumulate_from(f, &terms, 0, num_vec))
    }

    ///
    /// `w * ∫ f v_1^{m_1} v_2^{m_2} dv` for a 1D field driven by a 1D2V distribution.
    ///
    pub fn compute_moment_1d2v<C: Basis>(&mut self, f: &DGAdapt<C>, moment_order: &[u32], moment_order_weight: f64, num_vec_f: usize, num_vec_eb: usize) -> Result<usize, DGError>
    {
        self.compute_moment_product(f, 1, moment_order, moment_order_weight, num_vec_f, num_vec_eb)
    }

    ///
    /// `w * ∫ f v_1^{m_1} v_2^{m_2} dv` for a 2D field driven by a 2D2V distribution.
    ///
    pub fn compute_moment_2d2v<C: Basis>(&mut self, f: &DGAdapt<C>, moment_order: &[u32], moment_order_weight: f64, num_vec_f: usize, num_vec_eb: usize) -> Result<usize, DGError>
    {
        self.compute_moment_product(f, 2, moment_order, moment_order_weight, num_vec_f, num_vec_eb)
    }

    fn compute_moment_product<C: Basis>(&mut self, f: &DGAdapt<C>, dim_x: usize, moment_order: &[u32], weight: f64, vec_f: usize, vec_target: usize) -> Result<usize, DGError>
    {
        if self.config.dim != dim_x
        {
            return Err(DGError::DimensionMismatch { expected: dim_x, found: self.config.dim });
        }
        self.check_moment_source(f, 2, vec_f, vec_target)?;
        if moment_order.len() != 2
        {
            return Err(DGError::DimensionMismatch { expected: 2, found: moment_order.len() });
        }
        let terms = [MomentTerm::new(moment_order, weight)];
        Ok(self.accumulate_from(f, &terms, vec_f, vec_target))
    }

    pub fn snapshot(&self) -> MeshSnapshot
    {
        let mut elements: Vec<&Element> = self.store.iter().collect();
        elements.sort_by(|a, b| a.key().cmp(b.key()));
        MeshSnapshot
        {
            config: self.config.clone(),
            domain: self.domain.clone(),
            num_basis: self.layout.num_basis,
            elements: elements.into_iter().map(|e| ElementRecord { level: e.level().to_vec(), index: e.index().to_vec(), coeff: e.coeff().to_vec() }).collect(),
        }
    }

    ///
    /// Rebuilds a mesh from a snapshot. Fails if the snapshot has a hole, an
    /// invalid key or a coefficient block of the wrong size.
    ///
    pub fn from_snapshot(snapshot: MeshSnapshot, basis: B) -> Result<Self, DGError>
    {
        if snapshot.num_basis != basis.num_basis()
        {
            return Err(DGError::InvalidConfiguration(format!("snapshot has {} basis functions, basis has {}", snapshot.num_basis, basis.num_basis())));
        }
        let mut grid = Self::empty(snapshot.config, basis)?.with_domain(snapshot.domain)?;
        let mut records: Vec<(ElementKey, Vec<f64>)> = snapshot.elements.into_iter()
            .map(|r| (ElementKey { level: r.level, index: r.index }, r.coeff))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, coeff) in records
        {
            grid.validate_admissible(&key)?;
            if coeff.len() != grid.layout.block_len()
            {
                return Err(DGError::DimensionMismatch { expected: grid.layout.block_len(), found: coeff.len() });
            }
            if !grid.store.contains(&key)
            {
                grid.insert_element(key, coeff);
            }
        }
        grid.set_all_new_add_false();
        grid.update_leaf();
        grid.check_hole()?;
        grid.check_total_num_chd_par_equal()?;
        log::info!("restored mesh with {} elements", grid.store.len());
        Ok(grid)
    }

    pub fn write<W: std::io::Write>(&self, mut writer: W, format: SerializationFormat) -> Result<(), DGError>
    {
        let bytes = serialize(&self.snapshot(), format)?;
        writer.write_all(&bytes).map_err(|_| DGError::FileIOError)
    }

    pub fn read<R: std::io::Read>(mut reader: R, format: SerializationFormat, basis: B) -> Result<Self, DGError>
    {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(|_| DGError::FileIOError)?;
        Self::from_snapshot(deserialize(&bytes, format)?, basis)
    }

    /// Save the snapshot to `path`.
    pub fn save(&self, path: &str, format: SerializationFormat) -> Result<(), DGError>
    {
        let file = std::io::BufWriter::new(std::fs::File::create(path).map_err(|_| DGError::FileIOError)?);
        self.write(file, format)
    }
}
