use serde::{Deserialize, Serialize};

///
/// Physical extent of the computational domain. Elements live on the unit
/// cube; this maps between unit and real coordinates.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox
{
    pub lower: Vec<f64>,
    pub upper: Vec<f64>
}

impl Default for BoundingBox
{
    #[inline]
    fn default() -> Self {
        Self { lower: vec![], upper: vec![] }
    }
}

impl BoundingBox
{
    #[inline]
    pub fn new(lower: &[f64], upper: &[f64]) -> Self
    {
        Self { lower: lower.to_vec(), upper: upper.to_vec() }
    }

    pub fn with_dim(num_inputs: usize) -> Self
    {
        Self { lower: vec![0.0; num_inputs], upper: vec![1.0; num_inputs] }
    }

    #[inline]
    pub fn dim(&self) -> usize
    {
        self.lower.len()
    }

    #[inline]
    pub fn width(&self, dim: usize) -> f64
    {
        self.upper[dim] - self.lower[dim]
    }

    ///
    /// Volume of hypercube (width(dim1)*...*width(dim_n))
    ///
    #[inline]
    pub fn volume(&self) -> f64
    {
        (0..self.lower.len()).map(|d| self.width(d)).product()
    }

    #[inline]
    pub fn to_unit_coordinate(&self, point: &[f64]) -> Vec<f64>
    {
        point.iter().enumerate().map(|(i, &x)| (x - self.lower[i]) / self.width(i)).collect()
    }

    #[inline]
    pub fn to_real_coordinate(&self, point: &[f64]) -> Vec<f64>
    {
        point.iter().enumerate().map(|(i, &x)| self.lower[i] + self.width(i) * x).collect()
    }

    /// Real coordinate of a unit coordinate along one dimension.
    #[inline]
    pub fn to_real_1d(&self, dim: usize, x: f64) -> f64
    {
        self.lower[dim] + self.width(dim) * x
    }

    #[inline]
    pub fn contains(&self, point: &[f64]) -> bool
    {
        point.iter().enumerate().all(|(d, &x)| self.lower[d] <= x && x <= self.upper[d])
    }

    ///
    /// Lower `dim` dimensions of this box, or the trailing ones when
    /// `trailing` is set.
    ///
    pub fn split(&self, dim: usize, trailing: bool) -> BoundingBox
    {
        if trailing
        {
            BoundingBox::new(&self.lower[dim..], &self.upper[dim..])
        }
        else
        {
            BoundingBox::new(&self.lower[..dim], &self.upper[..dim])
        }
    }
}
