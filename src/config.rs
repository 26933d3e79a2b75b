use serde::{Deserialize, Serialize};

use crate::errors::DGError;
use crate::storage::hash_table::MAX_SUPPORTED_LEVEL;
use crate::utilities::multi_index::LevelConstraint;

///
/// Construction-time settings of the adaptive engine.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptConfig
{
    /// number of spatial dimensions
    pub dim: usize,
    /// number of unknown components carried by each element
    pub num_vec: usize,
    /// sparse grid (bounded level sum) instead of full grid (bounded levels)
    pub sparse: bool,
    /// level of the uniform starting mesh
    pub level_init: u8,
    /// maximum mesh level
    pub nmax: u8,
    /// refinement threshold
    pub eps: f64,
    /// coarsening threshold, must not exceed `eps`
    pub eta: f64,
    /// components whose coefficients drive adaptivity
    pub indicator_components: Vec<usize>,
    /// verify the no-hole invariant after every structural change
    pub check_invariants: bool,
}

impl Default for AdaptConfig
{
    fn default() -> Self {
        Self { dim: 1, num_vec: 1, sparse: false, level_init: 2, nmax: 6, eps: 1e-3, eta: 1e-4, indicator_components: vec![0], check_invariants: true }
    }
}

impl AdaptConfig
{
    pub fn new(dim: usize, level_init: u8, nmax: u8, eps: f64, eta: f64) -> Self
    {
        Self { dim, level_init, nmax, eps, eta, ..Default::default() }
    }

    pub fn with_sparse(mut self, sparse: bool) -> Self
    {
        self.sparse = sparse;
        self
    }

    ///
    /// Sets the number of components. The indicator then looks at all of them
    /// unless `with_indicator_components` is called afterwards.
    ///
    pub fn with_num_vec(mut self, num_vec: usize) -> Self
    {
        self.num_vec = num_vec;
        self.indicator_components = (0..num_vec).collect();
        self
    }

    pub fn with_indicator_components(mut self, components: &[usize]) -> Self
    {
        self.indicator_components = components.to_vec();
        self
    }

    pub fn with_check_invariants(mut self, check: bool) -> Self
    {
        self.check_invariants = check;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, DGError>
    {
        let config: Self = serde_json::from_str(json).map_err(|e| DGError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[inline]
    pub fn constraint(&self) -> LevelConstraint
    {
        LevelConstraint::new(self.sparse, self.nmax)
    }

    #[inline]
    pub fn initial_constraint(&self) -> LevelConstraint
    {
        LevelConstraint::new(self.sparse, self.level_init)
    }

    pub fn validate(&self) -> Result<(), DGError>
    {
        if self.dim == 0
        {
            return Err(DGError::InvalidConfiguration("dim must be at least 1".into()));
        }
        if self.num_vec == 0
        {
            return Err(DGError::InvalidConfiguration("num_vec must be at least 1".into()));
        }
        if self.level_init > self.nmax
        {
            return Err(DGError::InvalidConfiguration(format!("level_init {} exceeds nmax {}", self.level_init, self.nmax)));
        }
        if self.dim * self.nmax as usize > 64
        {
            return Err(DGError::InvalidConfiguration(format!("{} dimensions at nmax {} exceed the 64 bit key space", self.dim, self.nmax)));
        }
        if self.nmax > MAX_SUPPORTED_LEVEL
        {
            return Err(DGError::InvalidConfiguration(format!("nmax {} exceeds {}", self.nmax, MAX_SUPPORTED_LEVEL)));
        }
        if !(self.eps > 0.0) || !(self.eta >= 0.0) || self.eta > self.eps
        {
            return Err(DGError::InvalidThresholds { eps: self.eps, eta: self.eta });
        }
        if let Some(&component) = self.indicator_components.iter().find(|&&c| c >= self.num_vec)
        {
            return Err(DGError::ComponentOutOfRange { component, num_vec: self.num_vec });
        }
        Ok(())
    }
}
