use serde_derive::{Deserialize, Serialize};

use crate::detection::Detection;

/// All detections of one video frame, every class mixed in one list.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    /// Builds a frame from per-class lists, the position of a list is the
    /// class of its detections.
    pub fn from_classes<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = Vec<Detection>>,
    {
        let detections = groups
            .into_iter()
            .enumerate()
            .flat_map(|(class, dets)| {
                dets.into_iter().map(move |mut det| {
                    det.class = class;
                    det
                })
            })
            .collect();

        Self { detections }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

impl From<Vec<Detection>> for Frame {
    fn from(detections: Vec<Detection>) -> Self {
        Self::new(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;

    #[test]
    fn test_from_classes() {
        let det = Detection::new(BBox::ltrb(0.0, 0.0, 1.0, 1.0), 0.9, 7);
        let frame = Frame::from_classes(vec![vec![det.clone()], vec![], vec![det.clone(), det]]);

        let classes: Vec<_> = frame.iter().map(|d| d.class).collect();
        assert_eq!(classes, vec![0, 2, 2]);
        assert_eq!(frame.len(), 3);
    }

    #[test]
    fn test_json() {
        let frame: Frame = serde_json::from_str(
            r#"{"detections": [{"x1": 0, "y1": 0, "x2": 4, "y2": 8, "p": 0.5, "c": 1, "e": [1, 0]}]}"#,
        )
        .unwrap();

        assert_eq!(frame.detections[0].class, 1);
        assert_eq!(frame.detections[0].embedding, Some(vec![1.0, 0.0]));
    }
}
