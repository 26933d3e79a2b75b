use std::fmt::Display;

use bitfield_struct::bitfield;
use serde::{Deserialize, Serialize};

#[bitfield(u8)]
#[derive(Serialize, Deserialize, PartialEq, Eq)]
pub struct ElementFlags
{
    /// set when the element was created during the current adaptation step
    pub new_add: bool,
    pub marked_delete: bool,
    pub is_leaf: bool,
    pub is_leaf_zero_child: bool,
    pub is_viscosity: bool,
    #[bits(3)]
    pub _empty: u8
}

///
/// Canonical identity of an element: one level and one index per dimension.
///
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementKey
{
    pub level: Vec<u8>,
    pub index: Vec<u32>,
}

impl ElementKey
{
    pub fn new(level: &[u8], index: &[u32]) -> Self
    {
        Self { level: level.to_vec(), index: index.to_vec() }
    }

    ///
    /// The coarsest element in `dim` dimensions, level 0 everywhere.
    ///
    pub fn root(dim: usize) -> Self
    {
        Self { level: vec![0; dim], index: vec![0; dim] }
    }

    #[inline]
    pub fn dim(&self) -> usize
    {
        self.level.len()
    }

    #[inline]
    pub fn level_sum(&self) -> u32
    {
        self.level.iter().map(|&l| l as u32).sum()
    }

    #[inline]
    pub fn level_max(&self) -> u8
    {
        *self.level.iter().max().unwrap_or(&0)
    }
}

impl PartialOrd for ElementKey
{
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(std::cmp::Ord::cmp(self, other))
    }
}

///
/// Orders coarser elements (smaller level sum) first, so a sorted list of keys
/// can be inserted parents-before-children.
///
impl Ord for ElementKey
{
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.level_sum().cmp(&other.level_sum())
            .then(self.level.cmp(&other.level))
            .then(self.index.cmp(&other.index))
    }
}

impl Display for ElementKey
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(level={:?}, index={:?})", self.level, self.index)
    }
}

///
/// Shape of an element's coefficient block: `num_vec` components, each a
/// tensor of `num_basis^dim` values with dimension 0 varying slowest.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoefficientLayout
{
    pub dim: usize,
    pub num_vec: usize,
    pub num_basis: usize,
}

impl CoefficientLayout
{
    pub fn new(dim: usize, num_vec: usize, num_basis: usize) -> Self
    {
        Self { dim, num_vec, num_basis }
    }

    #[inline]
    pub fn component_len(&self) -> usize
    {
        self.num_basis.pow(self.dim as u32)
    }

    #[inline]
    pub fn block_len(&self) -> usize
    {
        self.num_vec * self.component_len()
    }

    #[inline]
    pub fn component<'a>(&self, block: &'a [f64], vec: usize) -> &'a [f64]
    {
        let len = self.component_len();
        &block[vec*len..(vec+1)*len]
    }

    #[inline]
    pub fn component_mut<'a>(&self, block: &'a mut [f64], vec: usize) -> &'a mut [f64]
    {
        let len = self.component_len();
        &mut block[vec*len..(vec+1)*len]
    }

    ///
    /// Splits a flat in-component offset into one basis index per dimension.
    ///
    pub fn multi_index(&self, mut flat: usize) -> Vec<usize>
    {
        let mut r = vec![0; self.dim];
        for d in (0..self.dim).rev()
        {
            r[d] = flat % self.num_basis;
            flat /= self.num_basis;
        }
        r
    }
}

#[derive(Clone, Debug)]
pub struct Element
{
    pub(crate) key: ElementKey,
    pub(crate) id: u64,
    pub(crate) xl: Vec<f64>,
    pub(crate) xr: Vec<f64>,
    pub(crate) coeff: Vec<f64>,
    pub(crate) rhs: Vec<f64>,
    /// existing parent per dimension
    pub(crate) parents: Vec<Option<u64>>,
    /// existing left/right child per dimension (a level-0 dimension only uses the first slot)
    pub(crate) children: Vec<[Option<u64>; 2]>,
    pub(crate) num_total_par: usize,
    pub(crate) num_total_chd: usize,
    pub(crate) flags: ElementFlags,
}

impl Element
{
    pub(crate) fn new(key: ElementKey, id: u64, support: (Vec<f64>, Vec<f64>), coeff: Vec<f64>, num_total_par: usize, num_total_chd: usize) -> Self
    {
        let dim = key.dim();
        let rhs = vec![0.0; coeff.len()];
        let mut flags = ElementFlags::new();
        flags.set_new_add(true);
        Self { key, id, xl: support.0, xr: support.1, coeff, rhs, parents: vec![None; dim], children: vec![[None, None]; dim], num_total_par, num_total_chd, flags }
    }

    #[inline]
    pub fn key(&self) -> &ElementKey
    {
        &self.key
    }

    #[inline]
    pub fn id(&self) -> u64
    {
        self.id
    }

    #[inline]
    pub fn level(&self) -> &[u8]
    {
        &self.key.level
    }

    #[inline]
    pub fn index(&self) -> &[u32]
    {
        &self.key.index
    }

    #[inline]
    pub fn xl(&self) -> &[f64]
    {
        &self.xl
    }

    #[inline]
    pub fn xr(&self) -> &[f64]
    {
        &self.xr
    }

    pub fn center(&self) -> Vec<f64>
    {
        self.xl.iter().zip(self.xr.iter()).map(|(l, r)| 0.5 * (l + r)).collect()
    }

    #[inline]
    pub fn coeff(&self) -> &[f64]
    {
        &self.coeff
    }

    #[inline]
    pub fn coeff_mut(&mut self) -> &mut [f64]
    {
        &mut self.coeff
    }

    #[inline]
    pub fn rhs(&self) -> &[f64]
    {
        &self.rhs
    }

    #[inline]
    pub fn rhs_mut(&mut self) -> &mut [f64]
    {
        &mut self.rhs
    }

    pub fn num_exist_par(&self) -> usize
    {
        self.parents.iter().filter(|p| p.is_some()).count()
    }

    pub fn num_exist_chd(&self) -> usize
    {
        self.children.iter().map(|c| c.iter().filter(|c| c.is_some()).count()).sum()
    }

    #[inline]
    pub fn num_total_par(&self) -> usize
    {
        self.num_total_par
    }

    #[inline]
    pub fn num_total_chd(&self) -> usize
    {
        self.num_total_chd
    }

    pub fn parent_ids(&self) -> impl Iterator<Item = u64> + '_
    {
        self.parents.iter().flatten().copied()
    }

    pub fn child_ids(&self) -> impl Iterator<Item = u64> + '_
    {
        self.children.iter().flat_map(|c| c.iter().flatten().copied())
    }

    #[inline]
    pub fn is_new_add(&self) -> bool
    {
        self.flags.new_add()
    }

    #[inline]
    pub fn is_marked_delete(&self) -> bool
    {
        self.flags.marked_delete()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool
    {
        self.flags.is_leaf()
    }

    #[inline]
    pub fn is_leaf_zero_child(&self) -> bool
    {
        self.flags.is_leaf_zero_child()
    }

    #[inline]
    pub fn is_viscosity(&self) -> bool
    {
        self.flags.is_viscosity()
    }

    #[inline]
    pub fn flags(&self) -> ElementFlags
    {
        self.flags
    }

    ///
    /// True if `x` (unit coordinates) lies in the support. Intervals are
    /// half-open except at the right edge of the domain.
    ///
    pub fn contains(&self, x: &[f64]) -> bool
    {
        x.iter().zip(self.xl.iter().zip(self.xr.iter())).all(|(&x, (&l, &r))|
        {
            x >= l && (x < r || (r >= 1.0 && x <= r))
        })
    }
}
