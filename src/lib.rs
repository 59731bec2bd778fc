pub mod assignment;
pub mod bbox;
pub mod class_tracker;
pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod kalman;
pub mod matching;
pub mod track_set;
pub mod tracker;
pub mod tracklet;

mod circular_queue;
mod track;

pub use config::{FusionPolicy, TrackerConfig};
pub use detection::Detection;
pub use error::Error;
pub use frame::Frame;
pub use track::Track;
pub use tracker::MultiClassTracker;
pub use tracklet::{TrackState, Tracklet};

pub trait Tracking {
    /// Consumes the detections of the next frame and returns the tracks reported for it.
    fn update(&mut self, frame: &Frame) -> Result<Vec<Track>, Error>;

    /// Tracks reported for the last processed frame.
    fn tracks(&self) -> Vec<Track>;

    /// Forgets every track and restarts identifiers, call between unrelated sequences.
    fn reset(&mut self);
}
