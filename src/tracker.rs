use log::warn;

use crate::class_tracker::ClassTracker;
use crate::config::TrackerConfig;
use crate::detection::Detection;
use crate::error::Error;
use crate::frame::Frame;
use crate::kalman::KalmanFilter;
use crate::track::Track;
use crate::tracklet::Tracklet;
use crate::Tracking;

/// ByteTrack style tracker running one independent universe per class.
///
/// A frame either fully succeeds or leaves the tracker exactly as it was:
/// all classes run on staged copies that are committed together.
#[derive(Debug, Clone)]
pub struct MultiClassTracker {
    config: TrackerConfig,
    kalman: KalmanFilter,
    classes: Vec<ClassTracker>,
    frame_id: u64,
    embedding_dim: Option<usize>,
}

impl MultiClassTracker {
    pub fn new(config: TrackerConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            classes: (0..config.num_classes).map(ClassTracker::new).collect(),
            embedding_dim: config.embedding_dim,
            kalman: KalmanFilter::new(),
            frame_id: 0,
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Number of frames processed since creation or the last reset.
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// Embedding length of the session, configured or learned from the first embedding.
    #[inline]
    pub fn embedding_dim(&self) -> Option<usize> {
        self.embedding_dim
    }

    fn class_tracker(&self, class: usize) -> Result<&ClassTracker, Error> {
        self.classes.get(class).ok_or(Error::ClassOutOfRange {
            class,
            num_classes: self.config.num_classes,
        })
    }

    pub fn tracked(&self, class: usize) -> Result<&[Tracklet], Error> {
        Ok(self.class_tracker(class)?.tracked())
    }

    pub fn lost(&self, class: usize) -> Result<&[Tracklet], Error> {
        Ok(self.class_tracker(class)?.lost())
    }

    pub fn removed(&self, class: usize) -> Result<&[Tracklet], Error> {
        Ok(self.class_tracker(class)?.removed())
    }

    /// Reported tracks of the last frame, one list per class.
    pub fn tracks_by_class(&self) -> Vec<Vec<Track>> {
        self.classes
            .iter()
            .map(|c| c.output().map(Track::from).collect())
            .collect()
    }

    fn admit(&self, det: &Detection, dim: &mut Option<usize>) -> Result<(), Error> {
        if det.class >= self.config.num_classes {
            return Err(Error::ClassOutOfRange {
                class: det.class,
                num_classes: self.config.num_classes,
            });
        }

        det.validate(*dim)?;

        if let (None, Some(emb)) = (*dim, &det.embedding) {
            *dim = Some(emb.len());
        }

        Ok(())
    }
}

impl Tracking for MultiClassTracker {
    fn update(&mut self, frame: &Frame) -> Result<Vec<Track>, Error> {
        let frame_id = self.frame_id + 1;
        let mut dim = self.embedding_dim;
        let mut groups: Vec<Vec<&Detection>> = vec![Vec::new(); self.classes.len()];

        for (i, det) in frame.iter().enumerate() {
            match self.admit(det, &mut dim) {
                Ok(()) => groups[det.class].push(det),
                Err(err) => warn!("frame {}: skipping detection #{}: {}", frame_id, i, err),
            }
        }

        let mut staged: Vec<_> = self.classes.iter().map(ClassTracker::staged).collect();

        for (class, dets) in staged.iter_mut().zip(&groups) {
            class.update(&self.kalman, &self.config, frame_id, dets)?;
        }

        for (class, update) in self.classes.iter_mut().zip(staged) {
            class.commit(update);
        }

        self.frame_id = frame_id;
        self.embedding_dim = dim;

        Ok(self.tracks())
    }

    fn tracks(&self) -> Vec<Track> {
        self.classes
            .iter()
            .flat_map(|c| c.output().map(Track::from))
            .collect()
    }

    fn reset(&mut self) {
        self.classes.iter_mut().for_each(ClassTracker::reset);
        self.frame_id = 0;
        self.embedding_dim = self.config.embedding_dim;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::config::FusionPolicy;
    use crate::kalman::StateCovariance;

    fn det(class: usize) -> Detection {
        Detection::new(BBox::ltrb(0.0, 0.0, 10.0, 10.0), 0.9, class)
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(matches!(
            MultiClassTracker::new(TrackerConfig::new(0)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_learns_embedding_dim() {
        let mut tracker = MultiClassTracker::new(TrackerConfig::new(2)).unwrap();
        assert_eq!(tracker.embedding_dim(), None);

        let frame = Frame::new(vec![
            det(0).with_embedding(vec![1.0, 0.0, 0.0]),
            Detection::new(BBox::ltrb(50.0, 50.0, 60.0, 60.0), 0.9, 0)
                .with_embedding(vec![1.0, 0.0]),
        ]);
        let out = tracker.update(&frame).unwrap();

        assert_eq!(tracker.embedding_dim(), Some(3));
        assert_eq!(out.len(), 1);

        tracker.reset();
        assert_eq!(tracker.embedding_dim(), None);
        assert_eq!(tracker.frame_id(), 0);
    }

    #[test]
    fn test_out_of_range_class() {
        let mut tracker = MultiClassTracker::new(TrackerConfig::new(2)).unwrap();
        let out = tracker.update(&Frame::new(vec![det(0), det(5)])).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class, 0);
        assert!(matches!(
            tracker.tracked(5),
            Err(Error::ClassOutOfRange { class: 5, num_classes: 2 })
        ));
    }

    #[test]
    fn test_tracks_by_class() {
        let mut tracker = MultiClassTracker::new(TrackerConfig::new(3)).unwrap();
        tracker
            .update(&Frame::from_classes(vec![vec![det(0)], vec![], vec![det(0), det(0)]]))
            .unwrap();

        let grouped = tracker.tracks_by_class();
        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped[0].len(), 1);
        assert!(grouped[1].is_empty());
        // identical boxes of one class still become separate tracks
        assert_eq!(grouped[2].iter().map(|t| t.track_id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_failed_frame_leaves_every_class_untouched() {
        let config = TrackerConfig {
            fusion: FusionPolicy::EmbeddingMotion {
                lambda: 0.98,
                only_position: false,
            },
            ..TrackerConfig::new(2)
        };
        let mut tracker = MultiClassTracker::new(config).unwrap();
        tracker.update(&Frame::new(vec![det(0), det(1)])).unwrap();

        // a covariance that is not positive definite breaks gating of class 1
        let (mean, covariance) = tracker.classes[1].tracked()[0].motion().copied().unwrap();
        tracker.classes[1].tracked_mut()[0]
            .set_motion(mean, StateCovariance::from_diagonal_element(-1e3));
        let before = tracker.clone();

        let far = Detection::new(BBox::ltrb(200.0, 200.0, 210.0, 210.0), 0.9, 0);
        let frame = Frame::new(vec![det(0), far, det(1)]);

        assert_eq!(tracker.update(&frame), Err(Error::KalmanNotPositiveDefinite));
        assert_eq!(tracker.frame_id(), 1);

        for class in 0..2 {
            let now = tracker.tracked(class).unwrap();
            let then = before.tracked(class).unwrap();

            assert_eq!(now.len(), then.len());
            assert_eq!(now[0].end_frame(), 1);
            assert_eq!(now[0].motion(), then[0].motion());
            assert!(tracker.lost(class).unwrap().is_empty());
            assert!(tracker.removed(class).unwrap().is_empty());
        }

        assert_eq!(tracker.tracks(), before.tracks());

        // the far box gets id 2 once the frame goes through, so no id was consumed
        tracker.classes[1].tracked_mut()[0].set_motion(mean, covariance);
        tracker.update(&frame).unwrap();

        assert_eq!(tracker.frame_id(), 2);
        assert_eq!(tracker.tracked(0).unwrap()[1].track_id(), 2);
    }
}
