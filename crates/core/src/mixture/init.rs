use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::MatrixStack;
use crate::error::{MatvarError, Result};
use crate::matrix::dense::is_spd;
use crate::types::{DenseMatrix, DenseVector};

/// How component centers are chosen when none are supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CenterMethod {
    /// k-means (k-means++ seeding, Lloyd iterations) on vec(X).
    #[default]
    KMeans,
    /// Distinct observations drawn at random.
    Random,
}

/// Request for starting values of a K-component mixture.
///
/// ```
/// use matvar_core::mixture::{CenterMethod, InitRequest};
///
/// let req = InitRequest::components(3)
///     .center_method(CenterMethod::Random)
///     .seed(42);
/// assert_eq!(req.n_components(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct InitRequest {
    n_components: usize,
    prior: Option<Vec<f64>>,
    method: CenterMethod,
    centers: Option<Vec<DenseMatrix>>,
    u: Option<Vec<DenseMatrix>>,
    v: Option<Vec<DenseMatrix>>,
    seed: u64,
    kmeans_max_iter: usize,
}

impl InitRequest {
    /// `k` components with a uniform prior.
    pub fn components(k: usize) -> Self {
        Self {
            n_components: k,
            prior: None,
            method: CenterMethod::default(),
            centers: None,
            u: None,
            v: None,
            seed: 0,
            kmeans_max_iter: 100,
        }
    }

    /// As many components as `prior` has entries.
    pub fn from_prior(prior: Vec<f64>) -> Self {
        let mut req = Self::components(prior.len());
        req.prior = Some(prior);
        req
    }

    pub fn center_method(mut self, method: CenterMethod) -> Self {
        self.method = method;
        self
    }

    /// Use these centers instead of searching for them.
    pub fn centers(mut self, centers: Vec<DenseMatrix>) -> Self {
        self.centers = Some(centers);
        self
    }

    /// Starting row covariances: one per component, or one for all.
    pub fn row_covariances(mut self, u: Vec<DenseMatrix>) -> Self {
        self.u = Some(u);
        self
    }

    /// Starting column covariances: one per component, or one for all.
    pub fn col_covariances(mut self, v: Vec<DenseMatrix>) -> Self {
        self.v = Some(v);
        self
    }

    /// Seed of the random source (default: 0).
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Lloyd iterations of the k-means search (default: 100).
    pub fn kmeans_iterations(mut self, n: usize) -> Self {
        self.kmeans_max_iter = n;
        self
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }
}

/// Starting values of a mixture fit. `u` carries the scale of each component.
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureInit {
    pub prior: Vec<f64>,
    pub centers: Vec<DenseMatrix>,
    pub u: Vec<DenseMatrix>,
    pub v: Vec<DenseMatrix>,
}

impl MixtureInit {
    pub fn n_components(&self) -> usize {
        self.prior.len()
    }
}

/// Resolve an [`InitRequest`] against the data.
pub fn init_mixture(stack: &MatrixStack, request: &InitRequest) -> Result<MixtureInit> {
    let k = request.n_components;
    let (p, q) = stack.dims();
    if k == 0 || k > stack.len() {
        return Err(MatvarError::InvalidParameter(format!(
            "number of components must be between 1 and {}, got {}",
            stack.len(),
            k
        )));
    }

    let prior = match &request.prior {
        Some(pr) => {
            crate::discriminant::validate_prior(pr, k)?;
            pr.clone()
        }
        None => vec![1.0 / k as f64; k],
    };

    let centers = match &request.centers {
        Some(c) => {
            if c.len() != k || c.iter().any(|m| m.shape() != (p, q)) {
                return Err(MatvarError::Validation(format!(
                    "expected {} centers of shape {}x{}",
                    k, p, q
                )));
            }
            c.clone()
        }
        None => {
            let mut rng = StdRng::seed_from_u64(request.seed);
            let points = stack.vectorized();
            let picked = match request.method {
                CenterMethod::KMeans => kmeans(&points, k, request.kmeans_max_iter, &mut rng),
                CenterMethod::Random => rand::seq::index::sample(&mut rng, points.len(), k)
                    .into_iter()
                    .map(|i| points[i].clone())
                    .collect(),
            };
            picked
                .into_iter()
                .map(|c| DenseMatrix::from_column_slice(p, q, c.as_slice()))
                .collect()
        }
    };

    let u = expand("row covariance", request.u.as_ref(), k, p)?;
    let v = expand("column covariance", request.v.as_ref(), k, q)?;

    Ok(MixtureInit { prior, centers, u, v })
}

/// One matrix per component (broadcasting a single one), identity if absent.
fn expand(name: &str, given: Option<&Vec<DenseMatrix>>, k: usize, dim: usize) -> Result<Vec<DenseMatrix>> {
    let Some(given) = given else {
        return Ok(vec![DenseMatrix::identity(dim, dim); k]);
    };
    let out = match given.len() {
        1 => vec![given[0].clone(); k],
        n if n == k => given.clone(),
        n => {
            return Err(MatvarError::Validation(format!(
                "{} {} matrices given for {} components",
                n, name, k
            )))
        }
    };
    check_covariances(name, &out, dim)?;
    Ok(out)
}

/// Every matrix must be `dim x dim`, symmetric and positive definite.
pub(crate) fn check_covariances(name: &str, matrices: &[DenseMatrix], dim: usize) -> Result<()> {
    if dim == 0 || matrices.iter().any(|m| m.shape() != (dim, dim) || !is_spd(m)) {
        return Err(MatvarError::Validation(format!(
            "every {} must be a {}x{} positive-definite matrix",
            name, dim, dim
        )));
    }
    Ok(())
}

fn squared_distance(a: &DenseVector, b: &DenseVector) -> f64 {
    (a - b).norm_squared()
}

/// k-means++ seeding: the first center uniformly, each further one with
/// probability proportional to the squared distance to its nearest center.
fn kmeans_plus_plus<R: Rng + ?Sized>(points: &[DenseVector], k: usize, rng: &mut R) -> Vec<DenseVector> {
    let mut centers = vec![points[rng.gen_range(0..points.len())].clone()];
    let mut nearest: Vec<f64> = points.iter().map(|x| squared_distance(x, &centers[0])).collect();

    while centers.len() < k {
        let total: f64 = nearest.iter().sum();
        let idx = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            nearest
                .iter()
                .position(|&d| {
                    acc += d;
                    acc >= target
                })
                .unwrap_or(points.len() - 1)
        } else {
            rng.gen_range(0..points.len())
        };
        let c = points[idx].clone();
        for (d, x) in nearest.iter_mut().zip(points) {
            *d = d.min(squared_distance(x, &c));
        }
        centers.push(c);
    }
    centers
}

fn closest(x: &DenseVector, centers: &[DenseVector]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (j, c) in centers.iter().enumerate() {
        let d = squared_distance(x, c);
        if d < best_d {
            best_d = d;
            best = j;
        }
    }
    best
}

/// Lloyd's algorithm from k-means++ seeds. Stops when assignments no longer
/// change; an emptied cluster keeps its previous center.
fn kmeans<R: Rng + ?Sized>(points: &[DenseVector], k: usize, max_iter: usize, rng: &mut R) -> Vec<DenseVector> {
    let mut centers = kmeans_plus_plus(points, k, rng);
    let mut labels: Vec<usize> = points.iter().map(|x| closest(x, &centers)).collect();

    for _ in 0..max_iter {
        let dim = points[0].len();
        let mut sums = vec![DenseVector::zeros(dim); k];
        let mut counts = vec![0usize; k];
        for (x, &l) in points.iter().zip(&labels) {
            sums[l] += x;
            counts[l] += 1;
        }
        for ((c, s), &n) in centers.iter_mut().zip(sums).zip(&counts) {
            if n > 0 {
                *c = s / n as f64;
            }
        }

        let next: Vec<usize> = points.iter().map(|x| closest(x, &centers)).collect();
        if next == labels {
            break;
        }
        labels = next;
    }
    centers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered() -> MatrixStack {
        let mut ms = Vec::new();
        for i in 0..10 {
            let e = 0.01 * i as f64;
            ms.push(DenseMatrix::from_row_slice(2, 2, &[e, 0.0, 0.0, e]));
            ms.push(DenseMatrix::from_row_slice(2, 2, &[10.0 + e, 10.0, 10.0, 10.0 - e]));
        }
        MatrixStack::new(ms).unwrap()
    }

    #[test]
    fn test_kmeans_separates_clusters() {
        let init = init_mixture(&clustered(), &InitRequest::components(2).seed(3)).unwrap();
        let mut firsts: Vec<f64> = init.centers.iter().map(|c| c[(0, 1)]).collect();
        firsts.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!(firsts[0].abs() < 1e-12);
        assert!((firsts[1] - 10.0).abs() < 1e-12);
        assert_eq!(init.prior, vec![0.5, 0.5]);
        assert_eq!(init.u[0], DenseMatrix::identity(2, 2));
    }

    #[test]
    fn test_random_centers_are_distinct_and_seeded() {
        let stack = clustered();
        let req = InitRequest::components(4).center_method(CenterMethod::Random).seed(11);
        let a = init_mixture(&stack, &req).unwrap();
        let b = init_mixture(&stack, &req).unwrap();
        assert_eq!(a, b);
        for i in 0..4 {
            for j in (i + 1)..4 {
                assert_ne!(a.centers[i], a.centers[j]);
            }
        }
    }

    #[test]
    fn test_partial_init_broadcast() {
        let u = DenseMatrix::from_row_slice(2, 2, &[2.0, 0.1, 0.1, 1.0]);
        let req = InitRequest::from_prior(vec![0.3, 0.7]).row_covariances(vec![u.clone()]);
        let init = init_mixture(&clustered(), &req).unwrap();
        assert_eq!(init.u, vec![u.clone(), u]);
        assert_eq!(init.prior, vec![0.3, 0.7]);
    }

    #[test]
    fn test_rejects_bad_requests() {
        let stack = clustered();
        assert!(init_mixture(&stack, &InitRequest::components(0)).is_err());
        assert!(init_mixture(&stack, &InitRequest::components(21)).is_err());
        assert!(init_mixture(&stack, &InitRequest::from_prior(vec![0.5, 0.6])).is_err());
        let req = InitRequest::components(2).col_covariances(vec![DenseMatrix::identity(3, 3)]);
        assert!(init_mixture(&stack, &req).is_err());
    }
}
