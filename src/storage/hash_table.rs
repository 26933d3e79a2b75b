use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::{errors::DGError, storage::element::ElementKey, utilities::multi_index::{ordinal_1d, validate_key}};

/// Finest level an index can address: odd indices below `2^level` must fit in a `u32`.
pub const MAX_SUPPORTED_LEVEL: u8 = 31;

///
/// Bijection between element keys and integer ids.
///
/// The id is not a probabilistic hash: each dimension's (level, index) pair is
/// enumerated as `0` for level 0 and `2^(n-1) + (j-1)/2` otherwise, which fits
/// in `max_level` bits, and the per-dimension ordinals are packed side by side.
/// Distinct keys therefore never share an id.
///
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HashTable
{
    dim: usize,
    max_level: u8,
    live: FxHashSet<u64>,
}

impl HashTable
{
    pub fn new(dim: usize, max_level: u8) -> Result<Self, DGError>
    {
        if dim == 0 || dim * max_level as usize > 64
        {
            return Err(DGError::InvalidConfiguration(format!("cannot pack {dim} dimensions of {max_level} levels into a 64 bit id")));
        }
        if max_level > MAX_SUPPORTED_LEVEL
        {
            return Err(DGError::InvalidConfiguration(format!("max level {max_level} exceeds {MAX_SUPPORTED_LEVEL}")));
        }
        Ok(Self { dim, max_level, live: FxHashSet::default() })
    }

    #[inline]
    fn mask(&self) -> u64
    {
        (1u64 << self.max_level) - 1
    }

    ///
    /// Whether `key` has this table's dimension and a valid index no finer
    /// than `max_level`. Only such keys have an id.
    ///
    #[inline]
    pub fn admits(&self, key: &ElementKey) -> bool
    {
        validate_key(key, self.dim, self.max_level).is_ok()
    }

    ///
    /// Deterministic id of `key`. Does not consult the set of live keys.
    /// `key` must be admitted by [`HashTable::admits`]; finer levels would
    /// spill into the next dimension's bits.
    ///
    #[inline]
    pub fn hash_key(&self, key: &ElementKey) -> u64
    {
        let mut id = 0u64;
        for d in 0..self.dim
        {
            let ordinal = ordinal_1d(key.level[d], key.index[d]);
            id |= ordinal << (d * self.max_level as usize);
        }
        id
    }

    ///
    /// Reverse of [`HashTable::hash_key`].
    ///
    pub fn decode(&self, id: u64) -> ElementKey
    {
        let mask = self.mask();
        let mut key = ElementKey::root(self.dim);
        for d in 0..self.dim
        {
            let ordinal = (id >> (d * self.max_level as usize)) & mask;
            if ordinal != 0
            {
                let level = 64 - ordinal.leading_zeros();
                key.level[d] = level as u8;
                key.index[d] = (2 * (ordinal - (1u64 << (level - 1))) + 1) as u32;
            }
        }
        key
    }

    ///
    /// Registers `key` and returns its id. Inserting a present key changes nothing.
    ///
    pub fn insert(&mut self, key: &ElementKey) -> u64
    {
        debug_assert!(self.admits(key), "{key} has no id");
        let id = self.hash_key(key);
        self.live.insert(id);
        id
    }

    #[inline]
    pub fn lookup(&self, key: &ElementKey) -> Option<u64>
    {
        if !self.admits(key)
        {
            return None;
        }
        let id = self.hash_key(key);
        self.live.contains(&id).then_some(id)
    }

    #[inline]
    pub fn contains(&self, key: &ElementKey) -> bool
    {
        self.lookup(key).is_some()
    }

    #[inline]
    pub fn contains_id(&self, id: u64) -> bool
    {
        self.live.contains(&id)
    }

    ///
    /// Key of a live id.
    ///
    pub fn key_of(&self, id: u64) -> Option<ElementKey>
    {
        self.live.contains(&id).then(|| self.decode(id))
    }

    pub fn erase(&mut self, key: &ElementKey) -> bool
    {
        self.lookup(key).is_some_and(|id| self.live.remove(&id))
    }

    pub(crate) fn erase_id(&mut self, id: u64) -> bool
    {
        self.live.remove(&id)
    }

    #[inline]
    pub fn len(&self) -> usize
    {
        self.live.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.live.is_empty()
    }

    pub fn clear(&mut self)
    {
        self.live.clear();
    }
}
