//!
//! Parent/child combinatorics of the hierarchical (level, index) numbering.
//!
//! In one dimension level 0 holds the single index 0 with support `[0,1]`;
//! level `n >= 1` holds the odd indices `1..2^n` with support
//! `[(j-1)/2^n, (j+1)/2^n]`. In several dimensions each dimension refines on
//! its own, so an element has one parent per non-zero level and up to two
//! children per dimension.
//!
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{errors::DGError, storage::element::ElementKey};

///
/// Admissibility rule for level vectors.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelConstraint
{
    /// sparse grid: bound the level sum; full grid: bound each level
    pub sparse: bool,
    pub max_level: u8,
}

impl LevelConstraint
{
    pub fn new(sparse: bool, max_level: u8) -> Self
    {
        Self { sparse, max_level }
    }

    #[inline]
    pub fn admits(&self, level: &[u8]) -> bool
    {
        if self.sparse
        {
            level.iter().map(|&l| l as u32).sum::<u32>() <= self.max_level as u32
        }
        else
        {
            level.iter().all(|&l| l <= self.max_level)
        }
    }
}

/// Parent of `(level, index)` in one dimension. `None` at level 0.
#[inline]
pub fn parent_1d(level: u8, index: u32) -> Option<(u8, u32)>
{
    match level
    {
        0 => None,
        1 => Some((0, 0)),
        _ =>
        {
            let up = (index + 1) / 2;
            if up % 2 == 1
            {
                Some((level - 1, up))
            }
            else
            {
                Some((level - 1, (index - 1) / 2))
            }
        }
    }
}

/// Children of `(level, index)` in one dimension, left first.
#[inline]
pub fn children_1d(level: u8, index: u32) -> Vec<(u8, u32)>
{
    if level == 0
    {
        vec![(1, 1)]
    }
    else
    {
        vec![(level + 1, 2*index - 1), (level + 1, 2*index + 1)]
    }
}

///
/// Slot of a child below its parent in one dimension: 0 for the left
/// child (or the only child of a level-0 parent), 1 for the right one.
///
#[inline]
pub fn child_slot(parent_level: u8, parent_index: u32, child_index: u32) -> usize
{
    if parent_level == 0 || child_index == 2*parent_index - 1
    {
        0
    }
    else
    {
        1
    }
}

///
/// Position of `(level, index)` in the enumeration of all one-dimensional
/// elements: 0 for level 0, then level by level from left to right.
///
#[inline]
pub fn ordinal_1d(level: u8, index: u32) -> u64
{
    if level == 0 { 0 } else { (1u64 << (level - 1)) + ((index as u64 - 1) >> 1) }
}

/// Support `[xl, xr]` of `(level, index)` in one dimension.
#[inline]
pub fn support_1d(level: u8, index: u32) -> (f64, f64)
{
    if level == 0
    {
        (0.0, 1.0)
    }
    else
    {
        let h = 1.0 / (1u64 << level) as f64;
        ((index - 1) as f64 * h, (index + 1) as f64 * h)
    }
}

pub fn support(key: &ElementKey) -> (Vec<f64>, Vec<f64>)
{
    key.level.iter().zip(key.index.iter()).map(|(&l, &i)| support_1d(l, i)).unzip()
}

///
/// Checks that every (level, index) pair is a valid position and that the
/// key has the expected dimension.
///
pub fn validate_key(key: &ElementKey, dim: usize, max_level: u8) -> Result<(), DGError>
{
    if key.level.len() != dim || key.index.len() != dim
    {
        return Err(DGError::DimensionMismatch { expected: dim, found: key.level.len().max(key.index.len()) });
    }
    for (&l, &i) in key.level.iter().zip(key.index.iter())
    {
        let valid = if l == 0
        {
            i == 0
        }
        else
        {
            l <= max_level && i % 2 == 1 && (i as u64) < (1u64 << l)
        };
        if !valid
        {
            return Err(DGError::InvalidIndex { level: key.level.clone(), index: key.index.clone() });
        }
    }
    Ok(())
}

///
/// Immediate parents, tagged with the dimension that was coarsened.
///
pub fn parents_by_dim(key: &ElementKey) -> Vec<(usize, ElementKey)>
{
    let mut r = Vec::with_capacity(key.dim());
    for d in 0..key.dim()
    {
        if let Some((l, i)) = parent_1d(key.level[d], key.index[d])
        {
            let mut p = key.clone();
            p.level[d] = l;
            p.index[d] = i;
            r.push((d, p));
        }
    }
    r
}

///
/// Immediate children admitted by `constraint`, tagged with the refined
/// dimension and the child slot.
///
pub fn children_by_dim(key: &ElementKey, constraint: &LevelConstraint) -> Vec<(usize, usize, ElementKey)>
{
    let mut r = Vec::with_capacity(2*key.dim());
    let mut level = key.level.clone();
    for d in 0..key.dim()
    {
        level[d] += 1;
        let admitted = constraint.admits(&level);
        level[d] -= 1;
        if !admitted
        {
            continue;
        }
        for (slot, (l, i)) in children_1d(key.level[d], key.index[d]).into_iter().enumerate()
        {
            let mut c = key.clone();
            c.level[d] = l;
            c.index[d] = i;
            r.push((d, slot, c));
        }
    }
    r
}

///
/// Every element obtained by coarsening exactly one dimension by one level.
///
pub fn all_parent_indices(key: &ElementKey) -> BTreeSet<ElementKey>
{
    parents_by_dim(key).into_iter().map(|(_, p)| p).collect()
}

///
/// Every element obtained by refining exactly one dimension by one level,
/// restricted to admissible levels.
///
pub fn all_child_indices(key: &ElementKey, constraint: &LevelConstraint) -> BTreeSet<ElementKey>
{
    children_by_dim(key, constraint).into_iter().map(|(_, _, c)| c).collect()
}

///
/// The full ancestor chain: every element reachable by repeatedly taking
/// parents in any combination of dimensions. Does not include `key` itself.
///
pub fn all_ancestor_indices(key: &ElementKey) -> BTreeSet<ElementKey>
{
    let mut result = BTreeSet::new();
    let mut stack: Vec<ElementKey> = all_parent_indices(key).into_iter().collect();
    while let Some(p) = stack.pop()
    {
        if result.insert(p.clone())
        {
            stack.extend(all_parent_indices(&p));
        }
    }
    result
}

/// Number of parents an element at `level` has, present or not.
#[inline]
pub fn num_all_par(level: &[u8]) -> usize
{
    level.iter().filter(|&&l| l > 0).count()
}

/// Number of children an element at `level` may have under `constraint`.
pub fn num_all_chd(level: &[u8], constraint: &LevelConstraint) -> usize
{
    let mut level = level.to_vec();
    let mut count = 0;
    for d in 0..level.len()
    {
        level[d] += 1;
        if constraint.admits(&level)
        {
            count += if level[d] == 1 { 1 } else { 2 };
        }
        level[d] -= 1;
    }
    count
}

///
/// Every key of the uniform starting mesh: all valid positions whose level
/// vector is admitted by `constraint`.
///
pub fn initial_mesh(dim: usize, constraint: &LevelConstraint) -> Vec<ElementKey>
{
    let mut keys = Vec::new();
    let mut stack = vec![ElementKey::root(dim)];
    let mut seen = BTreeSet::new();
    while let Some(key) = stack.pop()
    {
        if !seen.insert(key.clone())
        {
            continue;
        }
        for (_, _, c) in children_by_dim(&key, constraint)
        {
            stack.push(c);
        }
        keys.push(key);
    }
    keys.sort();
    keys
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn parent_child_1d_roundtrip()
    {
        for level in 0..6u8
        {
            let indices: Vec<u32> = if level == 0 { vec![0] } else { (1..(1u32 << level)).step_by(2).collect() };
            for index in indices
            {
                for (l, i) in children_1d(level, index)
                {
                    assert_eq!(parent_1d(l, i), Some((level, index)));
                    let (pl, pr) = support_1d(level, index);
                    let (cl, cr) = support_1d(l, i);
                    assert!(cl >= pl && cr <= pr);
                }
            }
        }
        assert_eq!(parent_1d(3, 5), Some((2, 3)));
        assert_eq!(parent_1d(3, 3), Some((2, 1)));
        assert_eq!(parent_1d(0, 0), None);
        assert_eq!(ordinal_1d(0, 0), 0);
        assert_eq!(ordinal_1d(1, 1), 1);
        assert_eq!(ordinal_1d(3, 7), 7);
    }

    #[test]
    fn level_zero_dimensions_have_no_parent()
    {
        let key = ElementKey::new(&[0, 2, 1], &[0, 3, 1]);
        let parents = all_parent_indices(&key);
        assert_eq!(parents.len(), 2);
        assert!(parents.contains(&ElementKey::new(&[0, 1, 1], &[0, 1, 1])));
        assert!(parents.contains(&ElementKey::new(&[0, 2, 0], &[0, 3, 0])));
        assert_eq!(num_all_par(&key.level), 2);
        assert!(all_parent_indices(&ElementKey::root(3)).is_empty());
    }

    #[test]
    fn children_respect_constraint()
    {
        let full = LevelConstraint::new(false, 2);
        let key = ElementKey::new(&[0, 2], &[0, 1]);
        let children = all_child_indices(&key, &full);
        assert_eq!(children.len(), 1);
        assert_eq!(num_all_chd(&key.level, &full), 1);

        let sparse = LevelConstraint::new(true, 2);
        let key = ElementKey::new(&[1, 1], &[1, 1]);
        assert!(all_child_indices(&key, &sparse).is_empty());
        assert_eq!(num_all_chd(&key.level, &sparse), 0);
        let key = ElementKey::new(&[1, 0], &[1, 0]);
        assert_eq!(all_child_indices(&key, &sparse).len(), 3);
        assert_eq!(num_all_chd(&key.level, &sparse), 3);
    }

    #[test]
    fn ancestors_are_closed()
    {
        let key = ElementKey::new(&[2, 1], &[3, 1]);
        let ancestors = all_ancestor_indices(&key);
        // levels (x, y) with x <= 2, y <= 1 minus the key itself
        assert_eq!(ancestors.len(), 5);
        for a in &ancestors
        {
            for p in all_parent_indices(a)
            {
                assert!(ancestors.contains(&p));
            }
        }
    }

    #[test]
    fn initial_mesh_counts()
    {
        // full grid level 2 in 2D: (1 + 1 + 2)^2 elements
        assert_eq!(initial_mesh(2, &LevelConstraint::new(false, 2)).len(), 16);
        // sparse grid level 2 in 2D: level sums 0,1,2 -> 1 + 2 + (2 + 1 + 2)
        assert_eq!(initial_mesh(2, &LevelConstraint::new(true, 2)).len(), 8);
    }

    #[test]
    fn key_validation()
    {
        assert!(validate_key(&ElementKey::new(&[2, 0], &[3, 0]), 2, 4).is_ok());
        assert!(validate_key(&ElementKey::new(&[2, 0], &[2, 0]), 2, 4).is_err());
        assert!(validate_key(&ElementKey::new(&[0, 0], &[0, 1]), 2, 4).is_err());
        assert!(validate_key(&ElementKey::new(&[5], &[1]), 1, 4).is_err());
        assert_eq!(validate_key(&ElementKey::new(&[1], &[1]), 2, 4), Err(DGError::DimensionMismatch { expected: 2, found: 1 }));
    }
}
