//! Cost matrices between tracks (rows) and detections (columns).
//!
//! Every builder accepts empty inputs and returns a matrix of the matching
//! empty shape, so callers never have to special-case a round without
//! tracks or without detections.

use ndarray::{Array2, Axis, Zip};

use crate::bbox::{ious, BBox, Ltrb};
use crate::error::Error;
use crate::kalman::{
    chi2inv95, GatingMetric, KalmanFilter, Measurement, StateCovariance, StateMean,
};

/// `1 - IOU` for every track/detection pair.
pub fn iou_distance(tracks: &[BBox<Ltrb>], detections: &[BBox<Ltrb>]) -> Array2<f32> {
    ious(tracks, detections).mapv_into(|iou| 1.0 - iou)
}

#[inline]
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 0.0;
    }

    1.0 - dot / (na * nb)
}

/// Cosine distance between the smoothed track embeddings and detection embeddings,
/// clamped below at zero.
///
/// A pair where either side has no embedding gets cost 0, which is neutral under
/// [`fuse_costs`], so the pair is judged on the other cue alone.
pub fn embedding_distance(tracks: &[Option<&[f32]>], detections: &[Option<&[f32]>]) -> Array2<f32> {
    Array2::from_shape_fn((tracks.len(), detections.len()), |(i, j)| {
        match (tracks[i], detections[j]) {
            (Some(t), Some(d)) if t.len() == d.len() => cosine_distance(t, d).max(0.0),
            _ => 0.0,
        }
    })
}

/// Reweights an IOU cost by detection confidence: `1 - (1 - cost) * score`.
pub fn fuse_score(mut cost: Array2<f32>, scores: &[f32]) -> Array2<f32> {
    if cost.is_empty() {
        return cost;
    }

    debug_assert_eq!(cost.ncols(), scores.len());

    for mut row in cost.axis_iter_mut(Axis(0)) {
        Zip::from(&mut row)
            .and(scores)
            .for_each(|c, &s| *c = 1.0 - (1.0 - *c) * s);
    }

    cost
}

/// Multiplies two costs in similarity space. An empty operand leaves the other unchanged.
pub fn fuse_costs(a: Array2<f32>, b: Array2<f32>) -> Array2<f32> {
    if a.is_empty() {
        return b;
    }

    if b.is_empty() {
        return a;
    }

    debug_assert_eq!(a.dim(), b.dim());

    Zip::from(&a)
        .and(&b)
        .map_collect(|&x, &y| 1.0 - (1.0 - x) * (1.0 - y))
}

/// Convex blend of two costs in similarity space, `alpha` weights the first one.
pub fn weight_sum_costs(a: Array2<f32>, b: Array2<f32>, alpha: f32) -> Array2<f32> {
    if a.is_empty() {
        return b;
    }

    if b.is_empty() {
        return a;
    }

    debug_assert_eq!(a.dim(), b.dim());

    Zip::from(&a)
        .and(&b)
        .map_collect(|&x, &y| 1.0 - ((1.0 - x) * alpha + (1.0 - y) * (1.0 - alpha)))
}

/// Scales appearance similarity by `(1 + iou_sim) / 2`.
pub fn fuse_iou(reid_cost: Array2<f32>, iou_cost: &Array2<f32>) -> Array2<f32> {
    if reid_cost.is_empty() {
        return reid_cost;
    }

    debug_assert_eq!(reid_cost.dim(), iou_cost.dim());

    Zip::from(&reid_cost)
        .and(iou_cost)
        .map_collect(|&r, &i| 1.0 - (1.0 - r) * (1.0 + (1.0 - i)) / 2.0)
}

fn gating_threshold(only_position: bool) -> Result<f64, Error> {
    chi2inv95(if only_position { 2 } else { 4 })
}

/// Sets every pair whose Mahalanobis distance exceeds the 95% chi-square
/// threshold to infinite cost.
pub fn gate_cost_matrix(
    kf: &KalmanFilter,
    mut cost: Array2<f32>,
    tracks: &[(StateMean, StateCovariance)],
    measurements: &[Measurement],
    only_position: bool,
) -> Result<Array2<f32>, Error> {
    if cost.is_empty() {
        return Ok(cost);
    }

    let threshold = gating_threshold(only_position)?;

    for ((mean, covariance), mut row) in tracks.iter().zip(cost.axis_iter_mut(Axis(0))) {
        let gating = kf.gating_distance(
            mean,
            covariance,
            measurements,
            only_position,
            GatingMetric::Mahalanobis,
        )?;

        Zip::from(&mut row).and(&gating[..]).for_each(|c, &g| {
            if g > threshold {
                *c = f32::INFINITY;
            }
        });
    }

    Ok(cost)
}

/// Gates like [`gate_cost_matrix`] and then blends the remaining costs with the
/// gating distance: `lambda * cost + (1 - lambda) * distance`.
pub fn fuse_motion(
    kf: &KalmanFilter,
    mut cost: Array2<f32>,
    tracks: &[(StateMean, StateCovariance)],
    measurements: &[Measurement],
    only_position: bool,
    lambda: f32,
) -> Result<Array2<f32>, Error> {
    if cost.is_empty() {
        return Ok(cost);
    }

    let threshold = gating_threshold(only_position)?;

    for ((mean, covariance), mut row) in tracks.iter().zip(cost.axis_iter_mut(Axis(0))) {
        let gating = kf.gating_distance(
            mean,
            covariance,
            measurements,
            only_position,
            GatingMetric::Mahalanobis,
        )?;

        Zip::from(&mut row).and(&gating[..]).for_each(|c, &g| {
            *c = if g > threshold {
                f32::INFINITY
            } else {
                lambda * *c + (1.0 - lambda) * g as f32
            };
        });
    }

    Ok(cost)
}
