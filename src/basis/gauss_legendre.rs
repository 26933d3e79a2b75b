use std::f64::consts::PI;

/// Compute the Legendre polynomial P_n(x) and its derivative using recurrence
fn legendre_and_derivative(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    let mut dp0 = 0.0;
    let mut dp1 = 1.0;

    if n == 0 {
        return (1.0, 0.0);
    }

    for k in 2..=n {
        let kf = k as f64;
        let pk = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        let dpk = ((2.0 * kf - 1.0) * (p1 + x * dp1) - (kf - 1.0) * dp0) / kf;

        p0 = p1;
        p1 = pk;
        dp0 = dp1;
        dp1 = dpk;
    }

    (p1, dp1)
}

/// Values of P_0(x), ..., P_n(x) on (-1, 1)
pub fn legendre_values(n: usize, x: f64) -> Vec<f64> {
    let mut values = Vec::with_capacity(n + 1);
    values.push(1.0);
    if n >= 1 {
        values.push(x);
    }
    for k in 2..=n {
        let kf = k as f64;
        let pk = ((2.0 * kf - 1.0) * x * values[k - 1] - (kf - 1.0) * values[k - 2]) / kf;
        values.push(pk);
    }
    values
}

/// Legendre polynomials rescaled to be orthonormal on (0, 1): sqrt(2m+1) P_m(2t-1)
pub fn scaled_legendre_values(n: usize, t: f64) -> Vec<f64> {
    legendre_values(n, 2.0 * t - 1.0)
        .into_iter()
        .enumerate()
        .map(|(m, p)| (2.0 * m as f64 + 1.0).sqrt() * p)
        .collect()
}

/// Compute Gauss-Legendre nodes and weights on the interval (0, 1)
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    let eps = 1e-15;

    for i in 0..n {
        // Initial guess: Chebyshev nodes (good approximation)
        let theta = PI * (i as f64 + 0.75) / (n as f64 + 0.5);
        let mut x = theta.cos();

        // Newton-Raphson refinement
        for _ in 0..100 {
            let (p, dp) = legendre_and_derivative(n, x);
            let dx = -p / dp;
            x += dx;
            if dx.abs() < eps {
                break;
            }
        }

        let (_, dp) = legendre_and_derivative(n, x);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);

        // Map from (-1, 1) to (0, 1)
        nodes.push(0.5 * (x + 1.0));
        weights.push(0.5 * w);
    }

    let mut pairs: Vec<(f64, f64)> = nodes.into_iter().zip(weights).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    pairs.into_iter().unzip()
}

///
/// Gauss-Legendre rule on (0, 1).
///
#[derive(Clone, Debug)]
pub struct QuadratureRule
{
    pub nodes: Vec<f64>,
    pub weights: Vec<f64>,
}

impl QuadratureRule
{
    pub fn new(num_points: usize) -> Self
    {
        let (nodes, weights) = gauss_legendre(num_points);
        Self { nodes, weights }
    }

    #[inline]
    pub fn len(&self) -> usize
    {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.nodes.is_empty()
    }

    /// Integral of `f` over `[a, b]`
    pub fn integrate<F: Fn(f64) -> f64>(&self, a: f64, b: f64, f: F) -> f64
    {
        let h = b - a;
        self.nodes.iter().zip(self.weights.iter()).map(|(&t, &w)| w * f(a + h * t)).sum::<f64>() * h
    }
}
