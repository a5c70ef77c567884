//! QUEST solution of Wahba's problem.
//!
//! Given pairs of unit vectors observed in the body frame and known in the
//! reference frame, finds the attitude quaternion that minimizes the weighted
//! squared error between `A(q)·reference` and `body`. The optimal eigenvalue
//! of Davenport's K-matrix is found with Newton's method on its
//! characteristic polynomial, starting from the sum of the weights, and the
//! eigenvector is built in closed form.

use core::fmt;

use crate::linalg::{Matrix, MatrixError, Quaternion};

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuestError {
    /// At least two vector pairs are needed to constrain the attitude.
    TooFewObservations(usize),
    /// Weight at `index` is not a finite positive number.
    InvalidWeight { index: usize },
    /// An observation is not a 3-vector or has zero norm.
    Matrix(MatrixError),
    /// The optimal eigenvector vanished, the observations do not define a
    /// unique attitude.
    Degenerate,
    /// Newton's method hit the iteration cap. The quaternion built from the
    /// last eigenvalue estimate is still returned.
    NonConvergence {
        best_effort: Quaternion,
        iterations: usize,
    },
}

impl From<MatrixError> for QuestError {
    fn from(e: MatrixError) -> Self {
        Self::Matrix(e)
    }
}

impl fmt::Display for QuestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewObservations(n) => write!(f, "{n} observations, at least 2 are required"),
            Self::InvalidWeight { index } => write!(f, "weight {index} is not finite and positive"),
            Self::Matrix(e) => write!(f, "invalid observation: {e}"),
            Self::Degenerate => write!(f, "observations are degenerate"),
            Self::NonConvergence { iterations, .. } => {
                write!(f, "eigenvalue did not converge after {iterations} iterations")
            }
        }
    }
}

impl core::error::Error for QuestError {}

/// Attitude quaternion (scalar first) whose attitude matrix best maps each
/// `references[i]` onto `bodies[i]`.
///
/// Vectors are renormalized before use and the weights only matter relative
/// to each other; they are scaled to sum to one, so `tolerance` applies to
/// the normalized eigenvalue.
pub fn quest<const N: usize>(
    references: &[Matrix; N],
    bodies: &[Matrix; N],
    weights: &[f32; N],
    tolerance: f32,
    max_iterations: usize,
) -> Result<Quaternion, QuestError> {
    if N < 2 {
        return Err(QuestError::TooFewObservations(N));
    }

    let mut weight_sum = 0.0;
    for (index, weight) in weights.iter().enumerate() {
        if !weight.is_finite() || *weight <= 0.0 {
            return Err(QuestError::InvalidWeight { index });
        }
        weight_sum += weight;
    }

    // attitude profile matrix B = Σ wᵢ bᵢ rᵢᵀ
    let mut b = Matrix::zeros(3, 3)?;
    for ((reference, body), weight) in references.iter().zip(bodies).zip(weights) {
        let reference = unit_vector(reference)?;
        let body = unit_vector(body)?;
        let outer = body.try_mul(&reference.transpose())?;
        b.try_add_assign(&outer.scale(weight / weight_sum))?;
    }

    let profile = Profile::new(&b)?;
    let coefficients = profile.coefficients()?;
    let (lambda, iterations, converged) = coefficients.largest_eigenvalue(tolerance, max_iterations);
    log_debug!(
        "quest: eigenvalue {} after {} iterations",
        lambda,
        iterations
    );

    // Method of sequential rotations: [γ, x] scales with the scalar part of
    // the solution and vanishes at a half turn. Solve in the reference frame
    // and in the frames turned by π about each axis, keep the frame where the
    // solution is largest, then rotate it back.
    let mut best = (Quaternion::IDENTITY, profile.eigenvector(lambda)?);
    for (turn, signs) in HALF_TURNS {
        let turned = Profile::new(&b.try_mul(&Matrix::diagonal(&signs)?)?)?;
        let candidate = turned.eigenvector(lambda)?;
        if candidate.norm() > best.1.norm() {
            best = (turn, candidate);
        }
    }
    let (turn, eigenvector) = best;

    let norm = eigenvector.norm();
    if !norm.is_finite() || norm < DEGENERATE_NORM * libm::fabsf(lambda * lambda * lambda) {
        log_warn!("quest: degenerate observations, eigenvector norm {}", norm);
        return Err(QuestError::Degenerate);
    }
    log_trace!("quest: solved in frame turned by [{} {} {}]", turn.x(), turn.y(), turn.z());

    let q = (turn * eigenvector)
        .normalize()
        .map_err(|_| QuestError::Degenerate)?
        .canonical();

    if converged {
        Ok(q)
    } else {
        log_warn!("quest: no convergence after {} iterations", iterations);
        Err(QuestError::NonConvergence {
            best_effort: q,
            iterations,
        })
    }
}

/// Below this norm, relative to λ³, the eigenvector is rounding residue.
const DEGENERATE_NORM: f32 = 1e-4;

/// Half turns about x, y and z, with the attitude matrix of each.
const HALF_TURNS: [(Quaternion, [f32; 3]); 3] = [
    (Quaternion::new(0.0, 1.0, 0.0, 0.0), [1.0, -1.0, -1.0]),
    (Quaternion::new(0.0, 0.0, 1.0, 0.0), [-1.0, 1.0, -1.0]),
    (Quaternion::new(0.0, 0.0, 0.0, 1.0), [-1.0, -1.0, 1.0]),
];

/// Quantities derived from the attitude profile matrix B.
struct Profile {
    s: Matrix,
    z: Matrix,
    s_z: Matrix,
    sigma: f32,
    det_s: f32,
    adjugate_trace: f32,
}

impl Profile {
    fn new(b: &Matrix) -> Result<Self, MatrixError> {
        let s = b.try_add(&b.transpose())?;
        let z = Matrix::from([
            b.at(1, 2) - b.at(2, 1),
            b.at(2, 0) - b.at(0, 2),
            b.at(0, 1) - b.at(1, 0),
        ]);
        let s_z = s.try_mul(&z)?;
        Ok(Self {
            sigma: b.trace()?,
            det_s: s.determinant()?,
            adjugate_trace: s.adjugate()?.trace()?,
            s,
            z,
            s_z,
        })
    }

    fn coefficients(&self) -> Result<Coefficients, MatrixError> {
        let sigma = self.sigma;
        Ok(Coefficients {
            a: sigma * sigma - self.adjugate_trace,
            b: sigma * sigma + self.z.dot(&self.z)?,
            c: self.det_s + self.z.dot(&self.s_z)?,
            // S is symmetric so zᵀS²z = (Sz)·(Sz)
            d: self.s_z.dot(&self.s_z)?,
            sigma,
        })
    }

    /// Unnormalized eigenvector [γ, x] for the eigenvalue `lambda`.
    fn eigenvector(&self, lambda: f32) -> Result<Quaternion, MatrixError> {
        let alpha = lambda * lambda - self.sigma * self.sigma + self.adjugate_trace;
        let beta = lambda - self.sigma;
        let gamma = (lambda + self.sigma) * alpha - self.det_s;

        // x = (αI + βS + S²)·z
        let x = self
            .z
            .scale(alpha)
            .try_add(&self.s_z.scale(beta))?
            .try_add(&self.s.try_mul(&self.s_z)?)?;
        Ok(Quaternion::new(gamma, x.at(0, 0), x.at(1, 0), x.at(2, 0)))
    }
}

fn unit_vector(v: &Matrix) -> Result<Matrix, MatrixError> {
    let v: [f32; 3] = v.try_into()?;
    Matrix::from(v).normalize()
}

/// Coefficients of the characteristic polynomial of the K-matrix,
/// `f(λ) = λ⁴ − (a+b)λ² − cλ + (ab + cσ − d)`.
struct Coefficients {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    sigma: f32,
}

impl Coefficients {
    fn value(&self, lambda: f32) -> f32 {
        let l2 = lambda * lambda;
        l2 * l2 - (self.a + self.b) * l2 - self.c * lambda
            + (self.a * self.b + self.c * self.sigma - self.d)
    }

    fn derivative(&self, lambda: f32) -> f32 {
        4.0 * lambda * lambda * lambda - 2.0 * (self.a + self.b) * lambda - self.c
    }

    /// Newton iteration from λ₀ = 1, the sum of the normalized weights.
    /// Returns the estimate, the iterations used and whether `tolerance`
    /// was met.
    fn largest_eigenvalue(&self, tolerance: f32, max_iterations: usize) -> (f32, usize, bool) {
        let mut lambda = 1.0;
        for iteration in 1..=max_iterations {
            let slope = self.derivative(lambda);
            if slope == 0.0 || !slope.is_finite() {
                return (lambda, iteration, false);
            }
            let next = lambda - self.value(lambda) / slope;
            let step = libm::fabsf(next - lambda);
            lambda = next;
            if step < tolerance {
                return (lambda, iteration, true);
            }
        }
        (lambda, max_iterations, false)
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};
    use rand_distr::{Distribution, Normal};

    use super::*;

    const MAX_ITERATIONS: usize = 50;
    const TOLERANCE: f32 = 1e-5;

    fn references() -> [Matrix; 3] {
        [
            Matrix::from([1.0, 0.2, -0.1]),
            Matrix::from([0.1, 1.0, 0.3]),
            Matrix::from([-0.4, 0.2, 1.0]),
        ]
    }

    fn observe(truth: &Quaternion, references: &[Matrix; 3]) -> [Matrix; 3] {
        references
            .clone()
            .map(|r| Matrix::from(truth.rotate((&r).try_into().unwrap()).unwrap()))
    }

    #[test]
    fn recovers_noiseless_attitude() {
        let truth = Quaternion::from_axis_angle([1.0, -2.0, 0.5], 1.1).unwrap();
        let references = references();
        let bodies = observe(&truth, &references);

        let q = quest(&references, &bodies, &[1.0, 2.0, 0.5], TOLERANCE, MAX_ITERATIONS).unwrap();
        let error = q.angle_to(&truth);
        assert!(error < 0.01f32.to_radians(), "error {} deg", error.to_degrees());
        assert!((q.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn identity_attitude() {
        let references = references();
        let q = quest(&references, &references, &[1.0; 3], TOLERANCE, MAX_ITERATIONS).unwrap();
        assert!(q.angle_to(&Quaternion::IDENTITY) < 1e-4);
    }

    #[test]
    fn two_observations_suffice() {
        let truth = Quaternion::from_axis_angle([0.0, 1.0, 1.0], -0.6).unwrap();
        let references = [Matrix::from([1.0, 0.0, 0.0]), Matrix::from([0.0, 0.0, 1.0])];
        let bodies = references
            .clone()
            .map(|r| Matrix::from(truth.rotate((&r).try_into().unwrap()).unwrap()));

        let q = quest(&references, &bodies, &[1.0, 1.0], TOLERANCE, MAX_ITERATIONS).unwrap();
        assert!(q.angle_to(&truth) < 0.01f32.to_radians());
    }

    #[test]
    fn large_weights_are_scale_invariant() {
        let truth = Quaternion::from_axis_angle([0.3, 0.3, 1.0], 2.0).unwrap();
        let references = references();
        let bodies = observe(&truth, &references);

        // inverse variances of typical sensors
        let weights = [1.0 / (0.01 * 0.01), 1.0 / (0.005 * 0.005), 1.0 / (0.02 * 0.02)];
        let q = quest(&references, &bodies, &weights, TOLERANCE, MAX_ITERATIONS).unwrap();
        assert!(q.angle_to(&truth) < 0.01f32.to_radians());
    }

    #[test]
    fn higher_weight_on_noisy_vector_increases_error() {
        let truth = Quaternion::from_axis_angle([-1.0, 0.4, 0.2], 0.8).unwrap();
        let references = references();
        let clean = observe(&truth, &references);

        let mut rng = StdRng::seed_from_u64(42);
        let noise = Normal::new(0.0f32, 0.01).unwrap();

        let trials = 50;
        let mut error_trusted = 0.0;
        let mut error_distrusted = 0.0;
        for _ in 0..trials {
            let mut bodies = clean.clone();
            for i in 0..3 {
                let v = bodies[2].get(i, 0).unwrap();
                bodies[2].set(i, 0, v + noise.sample(&mut rng)).unwrap();
            }

            let trusted = quest(&references, &bodies, &[1.0, 1.0, 100.0], TOLERANCE, MAX_ITERATIONS)
                .unwrap();
            let distrusted = quest(&references, &bodies, &[1.0, 1.0, 0.01], TOLERANCE, MAX_ITERATIONS)
                .unwrap();
            error_trusted += trusted.angle_to(&truth);
            error_distrusted += distrusted.angle_to(&truth);
        }

        let error_trusted = error_trusted / trials as f32;
        let error_distrusted = error_distrusted / trials as f32;
        assert!(
            error_distrusted < error_trusted,
            "distrusted {error_distrusted} trusted {error_trusted}"
        );
        assert!(error_trusted < 0.05);
    }

    #[test]
    fn rejects_bad_input() {
        let one = [Matrix::from([1.0, 0.0, 0.0])];
        assert_eq!(
            quest(&one, &one, &[1.0], TOLERANCE, MAX_ITERATIONS),
            Err(QuestError::TooFewObservations(1))
        );

        let references = references();
        assert_eq!(
            quest(&references, &references, &[1.0, -1.0, 1.0], TOLERANCE, MAX_ITERATIONS),
            Err(QuestError::InvalidWeight { index: 1 })
        );
        assert_eq!(
            quest(&references, &references, &[1.0, f32::NAN, 1.0], TOLERANCE, MAX_ITERATIONS),
            Err(QuestError::InvalidWeight { index: 1 })
        );

        let mut bodies = references.clone();
        bodies[0] = Matrix::zeros(3, 1).unwrap();
        assert_eq!(
            quest(&references, &bodies, &[1.0; 3], TOLERANCE, MAX_ITERATIONS),
            Err(QuestError::Matrix(MatrixError::ZeroNorm))
        );

        bodies[0] = Matrix::zeros(4, 1).unwrap();
        assert!(matches!(
            quest(&references, &bodies, &[1.0; 3], TOLERANCE, MAX_ITERATIONS),
            Err(QuestError::Matrix(MatrixError::DimensionMismatch { .. }))
        ));
    }

    #[test]
    fn half_turn_attitudes() {
        let references = references();
        for axis in [[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.3, -1.0, 0.4]] {
            let truth = Quaternion::from_axis_angle(axis, core::f32::consts::PI).unwrap();
            let bodies = observe(&truth, &references);

            let q = quest(&references, &bodies, &[1.0; 3], TOLERANCE, MAX_ITERATIONS).unwrap();
            let error = q.angle_to(&truth);
            assert!(error < 0.01f32.to_radians(), "axis {axis:?} error {} deg", error.to_degrees());
            assert!((q.norm() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn collinear_observations_are_degenerate() {
        let references = [Matrix::from([0.0, 0.0, 1.0]), Matrix::from([0.0, 0.0, 2.0])];
        assert_eq!(
            quest(&references, &references, &[1.0, 1.0], TOLERANCE, MAX_ITERATIONS),
            Err(QuestError::Degenerate)
        );

        let truth = Quaternion::from_axis_angle([1.0, 1.0, 0.0], 0.7).unwrap();
        let references = [Matrix::from([0.0, 0.0, 1.0]), Matrix::from([0.0, 0.0, -1.0])];
        let bodies = references
            .clone()
            .map(|r| Matrix::from(truth.rotate((&r).try_into().unwrap()).unwrap()));
        assert_eq!(
            quest(&references, &bodies, &[1.0, 3.0], TOLERANCE, MAX_ITERATIONS),
            Err(QuestError::Degenerate)
        );
    }

    #[test]
    fn iteration_cap_is_best_effort() {
        let truth = Quaternion::from_axis_angle([0.0, 0.0, 1.0], 0.5).unwrap();
        let references = references();
        let bodies = observe(&truth, &references);

        match quest(&references, &bodies, &[1.0; 3], 0.0, 3) {
            Err(QuestError::NonConvergence {
                best_effort,
                iterations,
            }) => {
                assert_eq!(iterations, 3);
                assert!(best_effort.angle_to(&truth) < 1e-2);
            }
            other => panic!("expected non-convergence, got {other:?}"),
        }
    }
}
