//! Constant-velocity Kalman filter over the `(x, y, a, h)` box space.
//!
//! The state is `(cx, cy, a, h, vx, vy, va, vh)`. The filter only holds the
//! shared model constants. Every track owns its own mean and covariance and
//! passes them in explicitly, so one filter can serve any number of tracks.

use nalgebra as na;

use crate::bbox::{BBox, Ltwh};
use crate::error::Error;

pub type StateMean = na::SVector<f64, 8>;
pub type StateCovariance = na::SMatrix<f64, 8, 8>;
pub type Measurement = na::SVector<f64, 4>;
pub type MeasurementCovariance = na::SMatrix<f64, 4, 4>;

/// 0.95 quantile of the chi-square distribution, indexed by degrees of freedom.
const CHI2INV95: [f64; 10] = [
    f64::NAN, 3.8415, 5.9915, 7.8147, 9.4877, 11.070, 12.592, 14.067, 15.507, 16.919,
];

/// Gating threshold for `dof` degrees of freedom (1 to 9).
pub fn chi2inv95(dof: usize) -> Result<f64, Error> {
    match dof {
        1..=9 => Ok(CHI2INV95[dof]),
        _ => Err(Error::UnsupportedGatingDimension(dof)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatingMetric {
    /// Squared Mahalanobis distance.
    Mahalanobis,
    /// Squared Euclidean distance in measurement space.
    Gaussian,
}

#[derive(Debug, Clone, Copy)]
pub struct KalmanFilter {
    motion_mat: StateCovariance,
    update_mat: na::SMatrix<f64, 4, 8>,
    std_weight_position: f64,
    std_weight_velocity: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    pub fn new() -> Self {
        let mut motion_mat = StateCovariance::identity();
        for i in 0..4 {
            motion_mat[(i, 4 + i)] = 1.0;
        }

        Self {
            motion_mat,
            update_mat: na::SMatrix::<f64, 4, 8>::identity(),
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
        }
    }

    /// `(cx, cy, a, h)` of a box. Computed in `f64` so that any finite box
    /// gives a finite measurement.
    #[inline]
    pub fn measurement(bbox: &BBox<Ltwh>) -> Measurement {
        let w = f64::from(bbox.width());
        let h = f64::from(bbox.height());

        Measurement::new(
            f64::from(bbox.left()) + w / 2.0,
            f64::from(bbox.top()) + h / 2.0,
            w / h,
            h,
        )
    }

    /// Creates a track state from an unassociated measurement, velocities start at zero.
    pub fn initiate(&self, measurement: &Measurement) -> (StateMean, StateCovariance) {
        let mut mean = StateMean::zeros();
        mean.fixed_rows_mut::<4>(0).copy_from(measurement);

        let h = measurement[3];
        let pos = 2.0 * self.std_weight_position * h;
        let vel = 10.0 * self.std_weight_velocity * h;
        let std = StateMean::from_column_slice(&[pos, pos, 1e-2, pos, vel, vel, 1e-5, vel]);

        (mean, StateCovariance::from_diagonal(&std.component_mul(&std)))
    }

    fn process_noise(&self, mean: &StateMean) -> StateCovariance {
        let h = mean[3];
        let pos = self.std_weight_position * h;
        let vel = self.std_weight_velocity * h;
        let std = StateMean::from_column_slice(&[pos, pos, 1e-2, pos, vel, vel, 1e-5, vel]);

        StateCovariance::from_diagonal(&std.component_mul(&std))
    }

    pub fn predict(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
    ) -> (StateMean, StateCovariance) {
        let motion_cov = self.process_noise(mean);
        let mean = self.motion_mat * mean;
        let covariance = self.motion_mat * covariance * self.motion_mat.transpose() + motion_cov;

        (mean, covariance)
    }

    /// Runs the prediction step over many states in place.
    pub fn multi_predict<'a, I>(&self, states: I)
    where
        I: IntoIterator<Item = (&'a mut StateMean, &'a mut StateCovariance)>,
    {
        for (mean, covariance) in states {
            let (m, c) = self.predict(mean, covariance);
            *mean = m;
            *covariance = c;
        }
    }

    /// Projects the state distribution into measurement space.
    pub fn project(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
    ) -> (Measurement, MeasurementCovariance) {
        let h = mean[3];
        let pos = self.std_weight_position * h;
        let std = Measurement::new(pos, pos, 1e-1, pos);
        let innovation_cov = MeasurementCovariance::from_diagonal(&std.component_mul(&std));

        let projected_mean = self.update_mat * mean;
        let projected_cov =
            self.update_mat * covariance * self.update_mat.transpose() + innovation_cov;

        (projected_mean, projected_cov)
    }

    pub fn update(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
        measurement: &Measurement,
    ) -> Result<(StateMean, StateCovariance), Error> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);

        let chol = projected_cov
            .cholesky()
            .ok_or(Error::KalmanNotPositiveDefinite)?;

        // K^T = S^-1 * (P * H^T)^T
        let pht = covariance * self.update_mat.transpose();
        let kalman_gain = chol.solve(&pht.transpose()).transpose();

        let innovation = measurement - projected_mean;
        let new_mean = mean + kalman_gain * innovation;
        let new_covariance =
            covariance - kalman_gain * projected_cov * kalman_gain.transpose();

        Ok((new_mean, new_covariance))
    }

    /// Distance between the state distribution and each measurement.
    ///
    /// With `only_position` only the box center takes part and the result
    /// should be compared against `chi2inv95(2)`, otherwise against `chi2inv95(4)`.
    pub fn gating_distance(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
        measurements: &[Measurement],
        only_position: bool,
        metric: GatingMetric,
    ) -> Result<Vec<f64>, Error> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);

        if only_position {
            let m = projected_mean.fixed_rows::<2>(0).into_owned();
            let s = na::Matrix2::new(
                projected_cov[(0, 0)],
                projected_cov[(0, 1)],
                projected_cov[(1, 0)],
                projected_cov[(1, 1)],
            );
            let deltas = measurements
                .iter()
                .map(|z| z.fixed_rows::<2>(0).into_owned() - m);

            match metric {
                GatingMetric::Gaussian => Ok(deltas.map(|d| d.norm_squared()).collect()),
                GatingMetric::Mahalanobis => {
                    let chol = s.cholesky().ok_or(Error::KalmanNotPositiveDefinite)?;
                    let l = chol.l();

                    deltas
                        .map(|d| {
                            l.solve_lower_triangular(&d)
                                .map(|z| z.norm_squared())
                                .ok_or(Error::KalmanNotPositiveDefinite)
                        })
                        .collect()
                }
            }
        } else {
            let deltas = measurements.iter().map(|z| z - projected_mean);

            match metric {
                GatingMetric::Gaussian => Ok(deltas.map(|d| d.norm_squared()).collect()),
                GatingMetric::Mahalanobis => {
                    let chol = projected_cov
                        .cholesky()
                        .ok_or(Error::KalmanNotPositiveDefinite)?;
                    let l = chol.l();

                    deltas
                        .map(|d| {
                            l.solve_lower_triangular(&d)
                                .map(|z| z.norm_squared())
                                .ok_or(Error::KalmanNotPositiveDefinite)
                        })
                        .collect()
                }
            }
        }
    }
}

/// `true` when neither the mean nor the covariance holds a NaN or an infinity.
pub fn state_is_finite(mean: &StateMean, covariance: &StateCovariance) -> bool {
    mean.iter().chain(covariance.iter()).all(|v| v.is_finite())
}
