use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb, Ltwh};
use crate::tracklet::{TrackState, Tracklet};

/// Read-only snapshot of a tracklet as reported for a frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Track {
    pub track_id: u64,
    pub class: usize,
    pub confidence: f32,
    pub is_activated: bool,
    pub state: TrackState,
    pub start_frame: u64,
    // last associated frame
    pub end_frame: u64,
    pub bbox: BBox<Ltwh>,
}

impl Track {
    #[inline]
    pub fn ltwh(&self) -> BBox<Ltwh> {
        self.bbox
    }

    #[inline]
    pub fn ltrb(&self) -> BBox<Ltrb> {
        self.bbox.as_ltrb()
    }
}

impl From<&Tracklet> for Track {
    fn from(t: &Tracklet) -> Track {
        Track {
            track_id: t.track_id(),
            class: t.class(),
            confidence: t.score(),
            is_activated: t.is_activated(),
            state: t.state(),
            start_frame: t.start_frame(),
            end_frame: t.end_frame(),
            bbox: t.ltwh(),
        }
    }
}
