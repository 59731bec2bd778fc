use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

/// How the first association round turns tracks and detections into costs.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FusionPolicy {
    /// IOU distance, reweighted by detection score unless in dense-scene mode.
    Iou,
    /// IOU distance fused multiplicatively with appearance distance.
    IouEmbedding,
    /// Appearance distance gated and blended by the Kalman Mahalanobis distance.
    EmbeddingMotion { lambda: f32, only_position: bool },
}

impl Default for FusionPolicy {
    fn default() -> Self {
        FusionPolicy::Iou
    }
}

impl FusionPolicy {
    #[inline]
    pub fn uses_embeddings(&self) -> bool {
        !matches!(self, FusionPolicy::Iou)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    pub track_thresh: f32,
    pub low_thresh: f32,
    pub new_track_margin: f32,
    pub match_thresh: f32,
    pub second_match_thresh: f32,
    pub unconfirmed_match_thresh: f32,
    pub duplicate_iou_distance: f32,
    pub track_buffer: u32,
    pub frame_rate: u32,
    pub num_classes: usize,
    pub mot20: bool,
    pub embedding_smoothing_factor: f32,
    pub embedding_history: usize,
    pub embedding_dim: Option<usize>,
    pub predict_lost: bool,
    pub fusion: FusionPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_thresh: 0.5,
            low_thresh: 0.1,
            new_track_margin: 0.1,
            match_thresh: 0.8,
            second_match_thresh: 0.5,
            unconfirmed_match_thresh: 0.7,
            duplicate_iou_distance: 0.15,
            track_buffer: 30,
            frame_rate: 30,
            num_classes: 5,
            mot20: false,
            embedding_smoothing_factor: 0.9,
            embedding_history: 30,
            embedding_dim: None,
            predict_lost: true,
            fusion: FusionPolicy::Iou,
        }
    }
}

impl TrackerConfig {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            ..Default::default()
        }
    }

    /// Number of frames a lost track is kept before it is removed.
    #[inline]
    pub fn max_time_lost(&self) -> u64 {
        (self.frame_rate as f64 / 30.0 * self.track_buffer as f64) as u64
    }

    /// Minimal score of a leftover detection to start a new track.
    #[inline]
    pub fn det_thresh(&self) -> f32 {
        self.track_thresh + self.new_track_margin
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.num_classes == 0 {
            return Err(Error::InvalidConfig("num_classes must be positive".into()));
        }

        if self.frame_rate == 0 {
            return Err(Error::InvalidConfig("frame_rate must be positive".into()));
        }

        if !(0.0..=1.0).contains(&self.low_thresh)
            || !(0.0..=1.0).contains(&self.track_thresh)
            || self.low_thresh >= self.track_thresh
        {
            return Err(Error::InvalidConfig(format!(
                "expected 0 <= low_thresh ({}) < track_thresh ({}) <= 1",
                self.low_thresh, self.track_thresh
            )));
        }

        let thresholds = [
            ("match_thresh", self.match_thresh),
            ("second_match_thresh", self.second_match_thresh),
            ("unconfirmed_match_thresh", self.unconfirmed_match_thresh),
            ("duplicate_iou_distance", self.duplicate_iou_distance),
            ("new_track_margin", self.new_track_margin),
        ];

        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.embedding_smoothing_factor) {
            return Err(Error::InvalidConfig(format!(
                "embedding_smoothing_factor must be in [0, 1], got {}",
                self.embedding_smoothing_factor
            )));
        }

        if self.embedding_history == 0 {
            return Err(Error::InvalidConfig(
                "embedding_history must be positive".into(),
            ));
        }

        if let Some(0) = self.embedding_dim {
            return Err(Error::InvalidConfig("embedding_dim must be positive".into()));
        }

        if let FusionPolicy::EmbeddingMotion { lambda, .. } = self.fusion {
            if !(0.0..=1.0).contains(&lambda) {
                return Err(Error::InvalidConfig(format!(
                    "fusion lambda must be in [0, 1], got {}",
                    lambda
                )));
            }
        }

        Ok(())
    }
}
