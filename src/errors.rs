use thiserror::Error;

use crate::storage::element::ElementKey;

///
/// Errors raised by the adaptive element engine. Everything here is a
/// programming or configuration error; nothing is transient.
///
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DGError
{
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("invalid thresholds: eps={eps}, eta={eta} (require 0 <= eta <= eps, eps > 0)")]
    InvalidThresholds { eps: f64, eta: f64 },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("invalid element index: level={level:?}, index={index:?}")]
    InvalidIndex { level: Vec<u8>, index: Vec<u32> },
    #[error("expected {expected} components, found {found}")]
    ComponentCountMismatch { expected: usize, found: usize },
    #[error("component {component} out of range for {num_vec} components")]
    ComponentOutOfRange { component: usize, num_vec: usize },
    #[error("point {0:?} lies outside the domain")]
    OutOfDomain(Vec<f64>),
    #[error("element {key} still has children and cannot be deleted")]
    ElementHasChildren { key: ElementKey },
    #[error("hole detected: element {key} is missing parent {missing}")]
    HoleDetected { key: ElementKey, missing: ElementKey },
    #[error("parent/child link count mismatch: {parents} parent links, {children} child links")]
    LinkCountMismatch { parents: usize, children: usize },
    #[error("hash table and element store disagree on {key}")]
    HashTableInconsistent { key: ElementKey },
    #[error("serialization failed")]
    SerializationFailed,
    #[error("deserialization failed")]
    DeserializationFailed,
    #[error("LZ4 decompression failed")]
    LZ4DecompressionFailed,
    #[error("file I/O error")]
    FileIOError,
}
