use approx::assert_abs_diff_eq;

use mctrack::bbox::BBox;
use mctrack::kalman::state_is_finite;
use mctrack::{
    Detection, Frame, FusionPolicy, MultiClassTracker, TrackState, TrackerConfig, Tracking,
};

fn det(l: f32, t: f32, r: f32, b: f32, score: f32, class: usize) -> Detection {
    Detection::new(BBox::ltrb(l, t, r, b), score, class)
}

fn tracker(config: TrackerConfig) -> MultiClassTracker {
    MultiClassTracker::new(config).unwrap()
}

fn ids(tracks: &[mctrack::Track]) -> Vec<u64> {
    tracks.iter().map(|t| t.track_id).collect()
}

#[test]
fn moving_box_keeps_identity() {
    let mut tracker = tracker(TrackerConfig::new(1));

    let out = tracker.update(&Frame::new(vec![det(0.0, 0.0, 10.0, 10.0, 0.9, 0)])).unwrap();
    assert_eq!(out.len(), 1);
    assert!(out[0].is_activated);

    let bbox = out[0].ltrb();
    assert_abs_diff_eq!(bbox.left(), 0.0, epsilon = 1e-4);
    assert_abs_diff_eq!(bbox.top(), 0.0, epsilon = 1e-4);
    assert_abs_diff_eq!(bbox.right(), 10.0, epsilon = 1e-4);
    assert_abs_diff_eq!(bbox.bottom(), 10.0, epsilon = 1e-4);

    let id = out[0].track_id;
    let out = tracker.update(&Frame::new(vec![det(1.0, 1.0, 11.0, 11.0, 0.9, 0)])).unwrap();

    assert_eq!(ids(&out), vec![id]);
    assert_eq!(out[0].state, TrackState::Tracked);

    let bbox = out[0].ltrb();
    assert!(bbox.left() > 0.5 && bbox.left() <= 1.0 + 1e-4);
    assert!(bbox.top() > 0.5 && bbox.top() <= 1.0 + 1e-4);
    assert_abs_diff_eq!(bbox.width(), 10.0, epsilon = 1e-3);
    assert_eq!(tracker.frame_id(), 2);
}

#[test]
fn static_track_with_embedding_stays_tracked() {
    let config = TrackerConfig {
        fusion: FusionPolicy::IouEmbedding,
        ..TrackerConfig::new(1)
    };
    let mut tracker = tracker(config);

    for _ in 0..10 {
        let d = det(20.0, 20.0, 40.0, 60.0, 0.9, 0).with_embedding(vec![0.3, 0.4, 0.0, 1.2]);
        let out = tracker.update(&Frame::new(vec![d])).unwrap();

        assert_eq!(ids(&out), vec![1]);
        assert_eq!(out[0].state, TrackState::Tracked);
    }

    assert_eq!(tracker.tracked(0).unwrap()[0].tracklet_len(), 9);
}

fn lost_for(frames: u64) -> MultiClassTracker {
    let config = TrackerConfig {
        track_buffer: 3,
        ..TrackerConfig::new(1)
    };
    assert_eq!(config.max_time_lost(), 3);

    let mut tracker = tracker(config);
    tracker.update(&Frame::new(vec![det(0.0, 0.0, 10.0, 10.0, 0.9, 0)])).unwrap();

    for _ in 0..frames {
        let out = tracker.update(&Frame::default()).unwrap();
        assert!(out.is_empty());
    }

    tracker
}

#[test]
fn lost_track_can_return_within_buffer() {
    let mut tracker = lost_for(3);

    assert_eq!(tracker.lost(0).unwrap().len(), 1);
    assert!(tracker.removed(0).unwrap().is_empty());

    let out = tracker.update(&Frame::new(vec![det(0.0, 0.0, 10.0, 10.0, 0.9, 0)])).unwrap();
    assert_eq!(ids(&out), vec![1]);
    assert!(tracker.lost(0).unwrap().is_empty());
}

#[test]
fn lost_track_is_removed_after_buffer() {
    let mut tracker = lost_for(4);

    assert!(tracker.lost(0).unwrap().is_empty());
    let removed = tracker.removed(0).unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].track_id(), 1);
    assert_eq!(removed[0].state(), TrackState::Removed);

    // the same object now starts a new identity, unconfirmed for this frame
    let out = tracker.update(&Frame::new(vec![det(0.0, 0.0, 10.0, 10.0, 0.9, 0)])).unwrap();
    assert!(out.is_empty());
    assert_eq!(tracker.tracked(0).unwrap()[0].track_id(), 2);
}

#[test]
fn overlapping_detections_are_not_deduplicated() {
    let mut tracker = tracker(TrackerConfig::new(1));
    tracker.update(&Frame::new(vec![det(0.0, 0.0, 10.0, 10.0, 0.9, 0)])).unwrap();

    let a = det(0.0, 0.0, 10.0, 10.0, 0.9, 0);
    let b = det(0.0, 0.0, 10.0, 11.0, 0.9, 0);
    assert!(a.iou(&b) > 0.9);

    let out = tracker.update(&Frame::new(vec![a, b])).unwrap();

    assert_eq!(ids(&out), vec![1]);

    let tracked = tracker.tracked(0).unwrap();
    assert_eq!(tracked.len(), 2);
    assert_eq!(tracked[1].track_id(), 2);
    assert!(!tracked[1].is_activated());
}

#[test]
fn classes_have_independent_identities() {
    let mut tracker = tracker(TrackerConfig::new(2));

    let out = tracker
        .update(&Frame::new(vec![
            det(0.0, 0.0, 10.0, 10.0, 0.9, 1),
            det(0.0, 0.0, 10.0, 10.0, 0.9, 0),
            det(30.0, 0.0, 40.0, 10.0, 0.9, 1),
        ]))
        .unwrap();

    let pairs: Vec<_> = out.iter().map(|t| (t.class, t.track_id)).collect();
    assert_eq!(pairs, vec![(0, 1), (1, 1), (1, 2)]);

    // a class 0 detection never continues a class 1 track
    let out = tracker
        .update(&Frame::new(vec![det(30.0, 0.0, 40.0, 10.0, 0.9, 0)]))
        .unwrap();

    assert!(out.is_empty());
    assert_eq!(tracker.lost(1).unwrap().len(), 2);
    assert_eq!(tracker.tracked(0).unwrap()[0].track_id(), 2);
}

#[test]
fn malformed_detections_are_skipped() {
    let mut tracker = tracker(TrackerConfig {
        embedding_dim: Some(2),
        ..TrackerConfig::new(1)
    });

    let out = tracker
        .update(&Frame::new(vec![
            det(f32::NAN, 0.0, 10.0, 10.0, 0.9, 0),
            det(0.0, 0.0, 0.0, 10.0, 0.9, 0),
            det(0.0, 0.0, 10.0, 10.0, f32::INFINITY, 0),
            det(0.0, 0.0, 10.0, 10.0, 0.9, 0).with_embedding(vec![1.0, 0.0, 0.0]),
            det(0.0, 0.0, 10.0, 10.0, 0.9, 0).with_embedding(vec![0.0, 0.0]),
            det(0.0, 0.0, 10.0, 10.0, 0.9, 3),
            det(50.0, 50.0, 60.0, 60.0, 0.9, 0).with_embedding(vec![0.0, 2.0]),
        ]))
        .unwrap();

    assert_eq!(out.len(), 1);
    assert_abs_diff_eq!(out[0].ltrb().left(), 50.0, epsilon = 1e-4);

    let emb = tracker.tracked(0).unwrap()[0].smooth_embedding().unwrap();
    assert_abs_diff_eq!(emb[1], 1.0, epsilon = 1e-6);
}

#[test]
fn appearance_with_motion_gating_follows_objects() {
    let config = TrackerConfig {
        fusion: FusionPolicy::EmbeddingMotion {
            lambda: 0.98,
            only_position: false,
        },
        ..TrackerConfig::new(1)
    };
    let mut tracker = tracker(config);

    let frame = |dx: f32| {
        Frame::new(vec![
            det(dx, 0.0, 10.0 + dx, 20.0, 0.9, 0).with_embedding(vec![1.0, 0.0]),
            det(100.0 + dx, 0.0, 110.0 + dx, 20.0, 0.9, 0).with_embedding(vec![0.0, 1.0]),
        ])
    };

    let first = tracker.update(&frame(0.0)).unwrap();
    assert_eq!(ids(&first), vec![1, 2]);

    for step in 1..5 {
        let out = tracker.update(&frame(step as f32)).unwrap();

        assert_eq!(ids(&out), vec![1, 2]);
        assert!(out[0].ltrb().left() < out[1].ltrb().left());
    }
}

#[test]
fn huge_box_keeps_identity_and_finite_motion() {
    let policies = [
        FusionPolicy::Iou,
        FusionPolicy::EmbeddingMotion {
            lambda: 0.98,
            only_position: false,
        },
    ];

    for fusion in policies {
        let mut tracker = tracker(TrackerConfig {
            fusion,
            ..TrackerConfig::new(2)
        });

        for frame_id in 1..=4 {
            let frame = Frame::new(vec![
                det(0.0, 0.0, 1e21, 1e21, 0.9, 0),
                det(0.0, 0.0, 10.0, 10.0, 0.9, 1),
            ]);
            let out = tracker.update(&frame).unwrap();

            let pairs: Vec<_> = out.iter().map(|t| (t.class, t.track_id)).collect();
            assert_eq!(pairs, vec![(0, 1), (1, 1)]);
            assert_eq!(tracker.frame_id(), frame_id);
        }

        let huge = &tracker.tracked(0).unwrap()[0];
        let (mean, cov) = huge.motion().unwrap();
        assert!(state_is_finite(mean, cov));
        assert_eq!(huge.tracklet_len(), 3);
        assert!(tracker.lost(0).unwrap().is_empty());
    }
}

#[test]
fn reset_restarts_the_session() {
    let mut tracker = tracker(TrackerConfig::new(1));

    tracker.update(&Frame::new(vec![det(0.0, 0.0, 10.0, 10.0, 0.9, 0)])).unwrap();
    tracker.update(&Frame::new(vec![det(50.0, 50.0, 60.0, 60.0, 0.9, 0)])).unwrap();
    assert_eq!(tracker.frame_id(), 2);

    tracker.reset();
    assert_eq!(tracker.frame_id(), 0);
    assert!(tracker.tracks().is_empty());
    assert!(tracker.lost(0).unwrap().is_empty());
    assert!(tracker.removed(0).unwrap().is_empty());

    let out = tracker.update(&Frame::new(vec![det(50.0, 50.0, 60.0, 60.0, 0.9, 0)])).unwrap();
    assert_eq!(ids(&out), vec![1]);
}

#[test]
fn config_from_json() {
    let config: TrackerConfig = serde_json::from_str(
        r#"{
            "num_classes": 3,
            "track_thresh": 0.6,
            "fusion": {"kind": "embedding_motion", "lambda": 0.9, "only_position": true}
        }"#,
    )
    .unwrap();

    let tracker = tracker(config);
    assert_eq!(tracker.config().num_classes, 3);
    assert_abs_diff_eq!(tracker.config().det_thresh(), 0.7, epsilon = 1e-6);
    assert!(tracker.config().fusion.uses_embeddings());
}
