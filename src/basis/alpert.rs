use serde::{Deserialize, Serialize};

use crate::basis::base::Basis;
use crate::basis::gauss_legendre::{scaled_legendre_values, QuadratureRule};
use crate::utilities::multi_index::support_1d;

///
/// Orthonormal piecewise-polynomial multiwavelets of degree `k`.
///
/// Level 0 carries the Legendre polynomials on `[0,1]`. Every finer level
/// carries `k+1` wavelets per cell: piecewise polynomials on the two halves of
/// the cell that are orthogonal to all polynomials of degree `k` on the whole
/// cell. The wavelets are obtained once by Gram-Schmidt in the coefficient
/// space of the half-cell Legendre bases.
///
#[derive(Clone, Debug)]
pub struct AlpertBasis
{
    degree: usize,
    /// wavelet `i` as coefficients of the half-cell bases, left half first
    wavelets: Vec<Vec<f64>>,
    quadrature: QuadratureRule,
    /// reference values at the quadrature nodes: [half][node][function]
    legendre_at: [Vec<Vec<f64>>; 2],
    wavelet_at: [Vec<Vec<f64>>; 2],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlpertOptions
{
    pub degree: usize,
    pub quadrature_points: usize,
}

impl Default for AlpertOptions
{
    fn default() -> Self {
        Self { degree: 1, quadrature_points: 12 }
    }
}

impl AlpertBasis
{
    pub fn new(degree: usize) -> Self
    {
        Self::with_options(AlpertOptions { degree, quadrature_points: (2*degree + 10).max(AlpertOptions::default().quadrature_points) })
    }

    pub fn with_options(options: AlpertOptions) -> Self
    {
        let p = options.degree + 1;
        let exact = QuadratureRule::new(p + 1);
        // global polynomial m expressed in half-cell basis (s, m')
        let mut global = vec![vec![0.0; 2*p]; p];
        for s in 0..2
        {
            for (&u, &w) in exact.nodes.iter().zip(exact.weights.iter())
            {
                let t = 0.5 * (s as f64 + u);
                let whole = scaled_legendre_values(options.degree, t);
                let half = scaled_legendre_values(options.degree, u);
                for m in 0..p
                {
                    for mp in 0..p
                    {
                        global[m][s*p + mp] += 0.5 * w * whole[m] * std::f64::consts::SQRT_2 * half[mp];
                    }
                }
            }
        }
        let wavelets = orthogonal_complement(&global, 2*p, p);

        let quadrature = QuadratureRule::new(options.quadrature_points);
        let mut legendre_at = [Vec::new(), Vec::new()];
        let mut wavelet_at = [Vec::new(), Vec::new()];
        for s in 0..2
        {
            for &u in &quadrature.nodes
            {
                let t = 0.5 * (s as f64 + u);
                legendre_at[s].push(scaled_legendre_values(options.degree, t));
                let half = scaled_legendre_values(options.degree, u);
                wavelet_at[s].push(wavelets.iter().map(|w| (0..p).map(|mp| w[s*p + mp] * std::f64::consts::SQRT_2 * half[mp]).sum()).collect());
            }
        }
        Self { degree: options.degree, wavelets, quadrature, legendre_at, wavelet_at }
    }

    ///
    /// Wavelet `i` on the reference cell `[0,1]`.
    ///
    pub fn reference_wavelet(&self, i: usize, t: f64) -> f64
    {
        let p = self.num_basis();
        let s = if t >= 0.5 { 1 } else { 0 };
        let u = 2.0 * t - s as f64;
        let half = scaled_legendre_values(self.degree, u);
        (0..p).map(|mp| self.wavelets[i][s*p + mp] * std::f64::consts::SQRT_2 * half[mp]).sum()
    }
}

///
/// Orthonormal basis (Gram-Schmidt, two passes) of the complement of the
/// orthonormal rows `occupied` inside R^n, truncated to `count` vectors.
///
fn orthogonal_complement(occupied: &[Vec<f64>], n: usize, count: usize) -> Vec<Vec<f64>>
{
    let dot = |a: &[f64], b: &[f64]| a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f64>();
    let mut accepted: Vec<Vec<f64>> = occupied.to_vec();
    let mut result = Vec::with_capacity(count);
    for c in 0..n
    {
        if result.len() == count
        {
            break;
        }
        let mut v = vec![0.0; n];
        v[c] = 1.0;
        for _ in 0..2
        {
            for q in &accepted
            {
                let r = dot(&v, q);
                v.iter_mut().zip(q.iter()).for_each(|(v, q)| *v -= r * q);
            }
        }
        let norm = dot(&v, &v).sqrt();
        if norm > 1e-8
        {
            v.iter_mut().for_each(|v| *v /= norm);
            accepted.push(v.clone());
            result.push(v);
        }
    }
    result
}

impl Basis for AlpertBasis
{
    #[inline]
    fn num_basis(&self) -> usize
    {
        self.degree + 1
    }

    #[inline]
    fn degree(&self) -> usize
    {
        self.degree
    }

    fn eval(&self, level: u8, index: u32, i: usize, x: f64) -> f64
    {
        let (a, b) = support_1d(level, index);
        if x < a || x > b
        {
            return 0.0;
        }
        if level == 0
        {
            scaled_legendre_values(self.degree, x)[i]
        }
        else
        {
            let h = b - a;
            self.reference_wavelet(i, (x - a) / h) / h.sqrt()
        }
    }

    fn project(&self, level: u8, index: u32, f: &dyn Fn(f64) -> f64) -> Vec<f64>
    {
        let p = self.num_basis();
        let (a, b) = support_1d(level, index);
        let h = b - a;
        let table = if level == 0 { &self.legendre_at } else { &self.wavelet_at };
        // level 0 functions are unscaled on [0,1]; wavelets carry h^(-1/2)
        let scale = if level == 0 { 1.0 } else { h.sqrt() };
        let mut r = vec![0.0; p];
        for s in 0..2
        {
            for (q, (&u, &w)) in self.quadrature.nodes.iter().zip(self.quadrature.weights.iter()).enumerate()
            {
                let t = 0.5 * (s as f64 + u);
                let value = f(a + h * t) * 0.5 * w;
                for i in 0..p
                {
                    r[i] += value * table[s][q][i];
                }
            }
        }
        r.iter_mut().for_each(|v| *v *= scale);
        r
    }
}
