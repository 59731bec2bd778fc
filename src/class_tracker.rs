//! Track universe of a single object class and its per-frame association.

use std::collections::HashSet;

use log::{debug, trace};
use ndarray::Array2;

use crate::assignment::linear_assignment;
use crate::config::{FusionPolicy, TrackerConfig};
use crate::detection::Detection;
use crate::error::Error;
use crate::kalman::KalmanFilter;
use crate::matching::{embedding_distance, fuse_costs, fuse_motion, fuse_score, iou_distance};
use crate::track_set::{join, remove_duplicates, subtract, IndexedSlice};
use crate::tracklet::{TrackState, Tracklet};

#[derive(Debug, Clone, Default)]
pub struct ClassTracker {
    class: usize,
    tracked: Vec<Tracklet>,
    lost: Vec<Tracklet>,
    removed: Vec<Tracklet>,
    last_id: u64,
}

fn iou_cost(
    tracks: &IndexedSlice<'_, Tracklet>,
    dets: &IndexedSlice<'_, &Detection>,
    with_score: bool,
) -> Array2<f32> {
    let a: Vec<_> = tracks.iter().map(Tracklet::ltrb).collect();
    let b: Vec<_> = dets.iter().map(|d| d.bbox()).collect();
    let cost = iou_distance(&a, &b);

    if with_score {
        let scores: Vec<_> = dets.iter().map(|d| d.confidence).collect();
        fuse_score(cost, &scores)
    } else {
        cost
    }
}

fn appearance_cost(
    tracks: &IndexedSlice<'_, Tracklet>,
    dets: &IndexedSlice<'_, &Detection>,
) -> Array2<f32> {
    let a: Vec<_> = tracks.iter().map(Tracklet::smooth_embedding).collect();
    let b: Vec<_> = dets.iter().map(|d| d.embedding.as_deref()).collect();

    embedding_distance(&a, &b)
}

fn first_round_cost(
    kf: &KalmanFilter,
    cfg: &TrackerConfig,
    tracks: &IndexedSlice<'_, Tracklet>,
    dets: &IndexedSlice<'_, &Detection>,
) -> Result<Array2<f32>, Error> {
    match cfg.fusion {
        FusionPolicy::Iou => Ok(iou_cost(tracks, dets, !cfg.mot20)),
        FusionPolicy::IouEmbedding => Ok(fuse_costs(
            iou_cost(tracks, dets, !cfg.mot20),
            appearance_cost(tracks, dets),
        )),
        FusionPolicy::EmbeddingMotion {
            lambda,
            only_position,
        } => {
            let states: Vec<_> = tracks.iter().map(|t| t.motion_or_initiate(kf)).collect();
            let measurements: Vec<_> = dets
                .iter()
                .map(|d| KalmanFilter::measurement(&d.ltwh()))
                .collect();

            fuse_motion(
                kf,
                appearance_cost(tracks, dets),
                &states,
                &measurements,
                only_position,
                lambda,
            )
        }
    }
}

fn take_slots(slots: &mut [Option<Tracklet>], idx: &[usize]) -> Vec<Tracklet> {
    idx.iter().filter_map(|&i| slots[i].take()).collect()
}

/// Updates matched tracked members and re-activates matched lost ones.
fn apply_matches(
    kf: &KalmanFilter,
    tracks: &mut [Tracklet],
    detections: &[&Detection],
    matches: &[(usize, usize)],
    frame_id: u64,
    activated: &mut Vec<usize>,
    refound: &mut Vec<usize>,
) -> Result<(), Error> {
    for &(ti, di) in matches {
        let track = &mut tracks[ti];

        if track.state() == TrackState::Tracked {
            track.update(kf, detections[di], frame_id)?;
            activated.push(ti);
        } else {
            track.re_activate(kf, detections[di], frame_id, None)?;
            refound.push(ti);
        }
    }

    Ok(())
}

impl ClassTracker {
    pub fn new(class: usize) -> Self {
        Self {
            class,
            ..Default::default()
        }
    }

    #[inline]
    pub fn class(&self) -> usize {
        self.class
    }

    #[inline]
    pub fn tracked(&self) -> &[Tracklet] {
        &self.tracked
    }

    #[inline]
    pub fn lost(&self) -> &[Tracklet] {
        &self.lost
    }

    #[inline]
    pub fn removed(&self) -> &[Tracklet] {
        &self.removed
    }

    /// Tracklets reported for the current frame.
    pub fn output(&self) -> impl Iterator<Item = &Tracklet> {
        self.tracked.iter().filter(|t| t.is_activated())
    }

    pub fn reset(&mut self) {
        self.tracked.clear();
        self.lost.clear();
        self.removed.clear();
        self.last_id = 0;
    }

    /// Copy of the live state to run a frame on, without the removed history.
    pub(crate) fn staged(&self) -> Self {
        Self {
            class: self.class,
            tracked: self.tracked.clone(),
            lost: self.lost.clone(),
            removed: Vec::new(),
            last_id: self.last_id,
        }
    }

    /// Takes over the state of a successfully updated copy.
    pub(crate) fn commit(&mut self, staged: Self) {
        self.tracked = staged.tracked;
        self.lost = staged.lost;
        self.last_id = staged.last_id;
        self.removed.extend(staged.removed);
    }

    #[cfg(test)]
    pub(crate) fn tracked_mut(&mut self) -> &mut [Tracklet] {
        &mut self.tracked
    }

    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    /// Runs the association rounds of one frame for this class.
    ///
    /// On error the class is left half-updated, callers must work on a copy
    /// and only keep it when every class succeeded.
    pub fn update(
        &mut self,
        kf: &KalmanFilter,
        cfg: &TrackerConfig,
        frame_id: u64,
        detections: &[&Detection],
    ) -> Result<(), Error> {
        let mut first = Vec::new();
        let mut second = Vec::new();

        for (i, det) in detections.iter().enumerate() {
            if det.confidence > cfg.track_thresh {
                first.push(i);
            } else if det.confidence > cfg.low_thresh {
                second.push(i);
            }
        }

        // previous tracked first, previous lost after it
        let n_tracked = self.tracked.len();
        let mut tracks = std::mem::take(&mut self.tracked);
        tracks.append(&mut std::mem::take(&mut self.lost));
        let n_previous = tracks.len();

        let (unconfirmed, confirmed): (Vec<usize>, Vec<usize>) =
            (0..n_tracked).partition(|&i| !tracks[i].is_activated());

        let mut seen: HashSet<u64> = confirmed.iter().map(|&i| tracks[i].track_id()).collect();
        let mut pool = confirmed;
        pool.extend((n_tracked..n_previous).filter(|&i| seen.insert(tracks[i].track_id())));

        let mut predict = vec![false; tracks.len()];
        for &i in &pool {
            predict[i] = cfg.predict_lost || tracks[i].state() == TrackState::Tracked;
        }

        Tracklet::multi_predict(
            kf,
            tracks
                .iter_mut()
                .zip(&predict)
                .filter(|(_, p)| **p)
                .map(|(t, _)| t),
        );

        let mut activated = Vec::new();
        let mut refound = Vec::new();
        let mut newly_lost = Vec::new();
        let mut removed = Vec::new();

        let first_view = IndexedSlice::new_with_indexes(detections, first);
        let second_view = IndexedSlice::new_with_indexes(detections, second);

        // Round 1: high score detections against the whole pool
        let pool_view = IndexedSlice::new_with_indexes(&tracks, pool);
        let cost = first_round_cost(kf, cfg, &pool_view, &first_view)?;
        let round = linear_assignment(&cost, cfg.match_thresh)?;
        trace!(
            "class {} round 1: {} tracks x {} detections, {} matches",
            self.class,
            pool_view.len(),
            first_view.len(),
            round.matches.len()
        );

        let matches: Vec<_> = round
            .matches
            .iter()
            .map(|&(r, c)| (pool_view.get_index(r), first_view.get_index(c)))
            .collect();
        let pool_left = pool_view.select(&round.unmatched_rows).all_indexes();
        let first_left = first_view.select(&round.unmatched_cols);

        apply_matches(
            kf,
            &mut tracks,
            detections,
            &matches,
            frame_id,
            &mut activated,
            &mut refound,
        )?;

        // Round 2: low score detections against the still tracked leftovers, IOU only
        let remaining: Vec<_> = pool_left
            .into_iter()
            .filter(|&i| tracks[i].state() == TrackState::Tracked)
            .collect();
        let remaining_view = IndexedSlice::new_with_indexes(&tracks, remaining);
        let cost = iou_cost(&remaining_view, &second_view, false);
        let round = linear_assignment(&cost, cfg.second_match_thresh)?;
        trace!(
            "class {} round 2: {} tracks x {} detections, {} matches",
            self.class,
            remaining_view.len(),
            second_view.len(),
            round.matches.len()
        );

        let matches: Vec<_> = round
            .matches
            .iter()
            .map(|&(r, c)| (remaining_view.get_index(r), second_view.get_index(c)))
            .collect();
        let unmatched = remaining_view.select(&round.unmatched_rows).all_indexes();
        let second_left = second_view.select(&round.unmatched_cols);

        apply_matches(
            kf,
            &mut tracks,
            detections,
            &matches,
            frame_id,
            &mut activated,
            &mut refound,
        )?;

        for i in unmatched {
            if tracks[i].state() != TrackState::Lost {
                tracks[i].mark_lost();
                newly_lost.push(i);
            }
        }

        // Round 3: unconfirmed tracks against every detection left over so far
        let leftover = first_left.chain(&second_left);
        let unconfirmed_view = IndexedSlice::new_with_indexes(&tracks, unconfirmed);
        let mut cost = iou_cost(&unconfirmed_view, &leftover, !cfg.mot20);

        if cfg.fusion == FusionPolicy::IouEmbedding {
            cost = fuse_costs(cost, appearance_cost(&unconfirmed_view, &leftover));
        }

        let round = linear_assignment(&cost, cfg.unconfirmed_match_thresh)?;
        trace!(
            "class {} round 3: {} tracks x {} detections, {} matches",
            self.class,
            unconfirmed_view.len(),
            leftover.len(),
            round.matches.len()
        );

        let matches: Vec<_> = round
            .matches
            .iter()
            .map(|&(r, c)| (unconfirmed_view.get_index(r), leftover.get_index(c)))
            .collect();
        let unmatched = unconfirmed_view.select(&round.unmatched_rows).all_indexes();
        let spawn = leftover.select(&round.unmatched_cols);

        for (ti, di) in matches {
            tracks[ti].update(kf, detections[di], frame_id)?;
            activated.push(ti);
        }

        for i in unmatched {
            tracks[i].mark_removed();
            removed.push(i);
        }

        // New tracklets
        let det_thresh = cfg.det_thresh();

        for det in spawn.iter() {
            if det.confidence < det_thresh {
                continue;
            }

            let mut track =
                Tracklet::new(det, cfg.embedding_history, cfg.embedding_smoothing_factor);
            track.activate(kf, frame_id, self.next_id());

            activated.push(tracks.len());
            tracks.push(track);
        }

        // Lost for too long
        let max_time_lost = cfg.max_time_lost();

        for i in n_tracked..n_previous {
            let track = &mut tracks[i];

            if track.state() == TrackState::Lost
                && frame_id.saturating_sub(track.end_frame()) > max_time_lost
            {
                track.mark_removed();
                removed.push(i);
            }
        }

        debug!(
            "class {} frame {}: {} activated, {} refound, {} lost, {} removed",
            self.class,
            frame_id,
            activated.len(),
            refound.len(),
            newly_lost.len(),
            removed.len()
        );

        // Every index is moved out exactly once, the first list naming it wins.
        let still_tracked: Vec<_> = (0..n_tracked)
            .filter(|&i| tracks[i].state() == TrackState::Tracked)
            .collect();
        let mut slots: Vec<Option<Tracklet>> = tracks.into_iter().map(Some).collect();

        let tracked = take_slots(&mut slots, &still_tracked);
        let activated = take_slots(&mut slots, &activated);
        let refound = take_slots(&mut slots, &refound);
        let removed = take_slots(&mut slots, &removed);
        let newly_lost = take_slots(&mut slots, &newly_lost);
        let previous_lost: Vec<_> = (n_tracked..n_previous).collect();
        let previous_lost = take_slots(&mut slots, &previous_lost);

        let tracked = join(join(tracked, activated), refound);

        let mut lost = subtract(previous_lost, &tracked);
        lost.extend(newly_lost);
        let lost = subtract(lost, &removed);

        let (tracked, lost) = remove_duplicates(tracked, lost, cfg.duplicate_iou_distance);

        self.tracked = tracked;
        self.lost = lost;
        self.removed.extend(removed);

        Ok(())
    }
}
