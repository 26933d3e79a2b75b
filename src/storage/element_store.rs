use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashSet};

use crate::errors::DGError;
use crate::storage::element::{Element, ElementKey};
use crate::storage::hash_table::HashTable;

pub type ElementMap = IndexMap<u64, Element, FxBuildHasher>;

///
/// Owns every element. Elements are addressed by the id the hash table derives
/// from their key; iteration follows insertion order, so traversals are
/// reproducible run to run.
///
#[derive(Clone, Debug)]
pub struct ElementStore
{
    pub(crate) elements: ElementMap,
    pub(crate) hash: HashTable,
}

impl ElementStore
{
    pub fn new(dim: usize, max_level: u8) -> Result<Self, DGError>
    {
        Ok(Self { elements: ElementMap::default(), hash: HashTable::new(dim, max_level)? })
    }

    #[inline]
    pub fn hash(&self) -> &HashTable
    {
        &self.hash
    }

    #[inline]
    pub fn len(&self) -> usize
    {
        self.elements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.elements.is_empty()
    }

    #[inline]
    pub fn contains(&self, key: &ElementKey) -> bool
    {
        self.hash.contains(key)
    }

    #[inline]
    pub fn id_of(&self, key: &ElementKey) -> Option<u64>
    {
        self.hash.lookup(key)
    }

    #[inline]
    pub fn find(&self, key: &ElementKey) -> Option<&Element>
    {
        self.hash.lookup(key).and_then(|id| self.elements.get(&id))
    }

    #[inline]
    pub fn find_mut(&mut self, key: &ElementKey) -> Option<&mut Element>
    {
        self.hash.lookup(key).and_then(|id| self.elements.get_mut(&id))
    }

    #[inline]
    pub fn get(&self, id: u64) -> Option<&Element>
    {
        self.elements.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: u64) -> Option<&mut Element>
    {
        self.elements.get_mut(&id)
    }

    ///
    /// Inserts `element` unless its key is already present. Returns whether
    /// the store changed.
    ///
    pub(crate) fn insert(&mut self, element: Element) -> bool
    {
        if self.hash.contains(&element.key)
        {
            return false;
        }
        let id = self.hash.insert(&element.key);
        debug_assert_eq!(id, element.id);
        self.elements.insert(id, element);
        true
    }

    ///
    /// Removes every element whose id is in `ids` in a single pass, keeping
    /// the insertion order of the survivors. Returns the number removed.
    ///
    pub(crate) fn erase_all(&mut self, ids: &FxHashSet<u64>) -> usize
    {
        let before = self.elements.len();
        let hash = &mut self.hash;
        self.elements.retain(|id, _| !(ids.contains(id) && hash.erase_id(*id)));
        before - self.elements.len()
    }

    pub(crate) fn clear(&mut self)
    {
        self.elements.clear();
        self.hash.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element>
    {
        self.elements.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Element>
    {
        self.elements.values_mut()
    }

    pub fn ids(&self) -> Vec<u64>
    {
        self.elements.keys().copied().collect()
    }

    ///
    /// A key is in the hash table iff its element is in the store.
    ///
    pub fn check_consistency(&self) -> Result<(), DGError>
    {
        if self.hash.len() != self.elements.len()
        {
            let key = self.elements.values().find(|e| !self.hash.contains_id(e.id))
                .map(|e| e.key.clone())
                .unwrap_or_else(|| ElementKey::root(0));
            return Err(DGError::HashTableInconsistent { key });
        }
        for (&id, element) in &self.elements
        {
            if self.hash.lookup(&element.key) != Some(id)
            {
                return Err(DGError::HashTableInconsistent { key: element.key.clone() });
            }
        }
        Ok(())
    }
}
