use std::fmt;

use log::warn;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb, Ltwh, Xyah};
use crate::circular_queue::CircularQueue;
use crate::detection::{l2_normalize, Detection};
use crate::error::Error;
use crate::kalman::{state_is_finite, KalmanFilter, StateCovariance, StateMean};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackState {
    /// Spawned from a single detection, not confirmed yet.
    Tentative,
    Tracked,
    Lost,
    Removed,
}

/// Smoothed appearance of a tracklet.
#[derive(Debug, Clone)]
struct Appearance {
    alpha: f32,
    smooth: Option<Vec<f32>>,
    current: Option<Vec<f32>>,
    history: CircularQueue<Vec<f32>>,
}

impl Appearance {
    fn new(alpha: f32, capacity: usize) -> Self {
        Self {
            alpha,
            smooth: None,
            current: None,
            history: CircularQueue::with_capacity(capacity),
        }
    }

    fn update(&mut self, embedding: &[f32]) {
        let mut feat = embedding.to_vec();
        l2_normalize(&mut feat);

        let smooth = match self.smooth.take() {
            Some(mut smooth) if smooth.len() == feat.len() => {
                for (s, f) in smooth.iter_mut().zip(&feat) {
                    *s = self.alpha * *s + (1.0 - self.alpha) * f;
                }

                l2_normalize(&mut smooth);
                smooth
            }
            _ => feat.clone(),
        };

        self.smooth = Some(smooth);
        self.current = Some(feat.clone());
        self.history.push(feat);
    }
}

/// One identity hypothesis of a single class, owned by its class universe.
#[derive(Debug, Clone)]
pub struct Tracklet {
    track_id: u64,
    class: usize,
    ltwh: BBox<Ltwh>,
    motion: Option<(StateMean, StateCovariance)>,
    score: f32,
    state: TrackState,
    is_activated: bool,
    frame_id: u64,
    start_frame: u64,
    tracklet_len: u64,
    appearance: Appearance,
}

impl Tracklet {
    /// Tentative tracklet from a detection. The id is assigned on [`Tracklet::activate`].
    pub fn new(det: &Detection, embedding_history: usize, smoothing_factor: f32) -> Self {
        let mut appearance = Appearance::new(smoothing_factor, embedding_history);

        if let Some(emb) = &det.embedding {
            appearance.update(emb);
        }

        Self {
            track_id: 0,
            class: det.class,
            ltwh: det.ltwh(),
            motion: None,
            score: det.confidence,
            state: TrackState::Tentative,
            is_activated: false,
            frame_id: 0,
            start_frame: 0,
            tracklet_len: 0,
            appearance,
        }
    }

    /// Starts the motion state. Only tracklets born on the first frame of a
    /// session are confirmed right away.
    pub fn activate(&mut self, kf: &KalmanFilter, frame_id: u64, track_id: u64) {
        let measurement = KalmanFilter::measurement(&self.ltwh);

        self.track_id = track_id;
        self.motion = Some(kf.initiate(&measurement));
        self.tracklet_len = 0;
        self.state = TrackState::Tracked;
        self.is_activated = frame_id == 1;
        self.frame_id = frame_id;
        self.start_frame = frame_id;
    }

    fn correct(&mut self, kf: &KalmanFilter, det: &Detection) -> Result<(), Error> {
        let measurement = KalmanFilter::measurement(&det.ltwh());

        let (mean, covariance) = match &self.motion {
            Some((mean, covariance)) => kf.update(mean, covariance, &measurement)?,
            None => kf.initiate(&measurement),
        };

        self.motion = Some(if state_is_finite(&mean, &covariance) {
            (mean, covariance)
        } else {
            warn!("{}: corrected motion state is not finite, reseeding", self);
            kf.initiate(&measurement)
        });
        self.ltwh = det.ltwh();

        Ok(())
    }

    /// Drops a motion state that stopped being finite. The tracklet then falls
    /// back to its last observed box and is reseeded on the next match.
    fn discard_diverged_motion(&mut self) {
        if let Some((mean, covariance)) = &self.motion {
            if !state_is_finite(mean, covariance) {
                warn!("{}: predicted motion state is not finite, dropping it", self);
                self.motion = None;
            }
        }
    }

    /// Brings a lost tracklet back. `new_id` replaces the identity when given.
    pub fn re_activate(
        &mut self,
        kf: &KalmanFilter,
        det: &Detection,
        frame_id: u64,
        new_id: Option<u64>,
    ) -> Result<(), Error> {
        self.correct(kf, det)?;

        if let Some(emb) = &det.embedding {
            self.appearance.update(emb);
        }

        self.tracklet_len = 0;
        self.frame_id = frame_id;
        self.state = TrackState::Tracked;
        self.is_activated = true;

        if let Some(id) = new_id {
            self.track_id = id;
        }

        self.score = det.confidence;

        Ok(())
    }

    pub fn update(
        &mut self,
        kf: &KalmanFilter,
        det: &Detection,
        frame_id: u64,
    ) -> Result<(), Error> {
        self.frame_id = frame_id;
        self.tracklet_len += 1;

        self.correct(kf, det)?;

        self.state = TrackState::Tracked;
        self.is_activated = true;
        self.score = det.confidence;

        if let Some(emb) = &det.embedding {
            self.appearance.update(emb);
        }

        Ok(())
    }

    #[inline]
    pub fn mark_lost(&mut self) {
        self.state = TrackState::Lost;
    }

    #[inline]
    pub fn mark_removed(&mut self) {
        self.state = TrackState::Removed;
    }

    /// Advances the motion state by one frame. Scale change is frozen for
    /// tracklets that are not currently tracked.
    pub fn predict(&mut self, kf: &KalmanFilter) {
        let tracked = self.state == TrackState::Tracked;

        if let Some((mean, covariance)) = &mut self.motion {
            if !tracked {
                mean[7] = 0.0;
            }

            let (m, c) = kf.predict(mean, covariance);
            *mean = m;
            *covariance = c;
        }

        self.discard_diverged_motion();
    }

    /// Batched [`Tracklet::predict`].
    pub fn multi_predict<'a, I>(kf: &KalmanFilter, tracklets: I)
    where
        I: IntoIterator<Item = &'a mut Tracklet>,
    {
        let mut tracklets: Vec<&mut Tracklet> = tracklets.into_iter().collect();

        kf.multi_predict(tracklets.iter_mut().filter_map(|t| {
            let tracked = t.state == TrackState::Tracked;
            let (mean, covariance) = t.motion.as_mut()?;

            if !tracked {
                mean[7] = 0.0;
            }

            Some((mean, covariance))
        }));

        tracklets.into_iter().for_each(Tracklet::discard_diverged_motion);
    }

    #[inline]
    pub fn track_id(&self) -> u64 {
        self.track_id
    }

    #[inline]
    pub fn class(&self) -> usize {
        self.class
    }

    #[inline]
    pub fn score(&self) -> f32 {
        self.score
    }

    #[inline]
    pub fn state(&self) -> TrackState {
        self.state
    }

    #[inline]
    pub fn is_activated(&self) -> bool {
        self.is_activated
    }

    #[inline]
    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    /// Last frame this tracklet was associated with a detection.
    #[inline]
    pub fn end_frame(&self) -> u64 {
        self.frame_id
    }

    #[inline]
    pub fn tracklet_len(&self) -> u64 {
        self.tracklet_len
    }

    /// Frames between creation and the last association.
    #[inline]
    pub fn lifespan(&self) -> u64 {
        self.frame_id.saturating_sub(self.start_frame)
    }

    #[inline]
    pub fn motion(&self) -> Option<&(StateMean, StateCovariance)> {
        self.motion.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn set_motion(&mut self, mean: StateMean, covariance: StateCovariance) {
        self.motion = Some((mean, covariance));
    }

    /// Motion state, or a fresh one seeded from the last box for a tracklet
    /// that was never activated.
    pub fn motion_or_initiate(&self, kf: &KalmanFilter) -> (StateMean, StateCovariance) {
        match self.motion {
            Some(state) => state,
            None => kf.initiate(&KalmanFilter::measurement(&self.ltwh)),
        }
    }

    /// L2-normalized moving average of the matched embeddings.
    #[inline]
    pub fn smooth_embedding(&self) -> Option<&[f32]> {
        self.appearance.smooth.as_deref()
    }

    #[inline]
    pub fn current_embedding(&self) -> Option<&[f32]> {
        self.appearance.current.as_deref()
    }

    /// Normalized embeddings of the latest matches, oldest first.
    pub fn embedding_history(&self) -> impl Iterator<Item = &[f32]> {
        self.appearance.history.iter().map(|v| v.as_slice())
    }

    pub fn ltwh(&self) -> BBox<Ltwh> {
        match &self.motion {
            Some((mean, _)) => {
                let h = mean[3];
                let w = mean[2] * h;

                BBox::ltwh(
                    (mean[0] - w / 2.0) as f32,
                    (mean[1] - h / 2.0) as f32,
                    w as f32,
                    h as f32,
                )
            }
            None => self.ltwh,
        }
    }

    #[inline]
    pub fn ltrb(&self) -> BBox<Ltrb> {
        self.ltwh().as_ltrb()
    }

    #[inline]
    pub fn xyah(&self) -> BBox<Xyah> {
        self.ltwh().as_xyah()
    }
}

impl fmt::Display for Tracklet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OT_({}-{})_({}-{})",
            self.class,
            self.track_id,
            self.start_frame,
            self.end_frame()
        )
    }
}
