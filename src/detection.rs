use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb, Ltwh};
use crate::error::Error;

/// One observation produced by the upstream detector for the current frame.
/// The box is stored in corner form `(x1, y1, x2, y2)`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    #[serde(rename = "p")]
    pub confidence: f32,
    #[serde(rename = "c")]
    pub class: usize,
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Detection {
    pub fn new(bbox: BBox<Ltrb>, confidence: f32, class: usize) -> Self {
        Self {
            x1: bbox.left(),
            y1: bbox.top(),
            x2: bbox.right(),
            y2: bbox.bottom(),
            confidence,
            class,
            embedding: None,
        }
    }

    pub fn from_ltwh(bbox: BBox<Ltwh>, confidence: f32, class: usize) -> Self {
        Self::new(bbox.as_ltrb(), confidence, class)
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    #[inline(always)]
    pub fn bbox(&self) -> BBox<Ltrb> {
        BBox::ltrb(self.x1, self.y1, self.x2, self.y2)
    }

    #[inline(always)]
    pub fn ltwh(&self) -> BBox<Ltwh> {
        self.bbox().as_ltwh()
    }

    #[inline]
    pub fn iou(&self, other: &Detection) -> f32 {
        self.bbox().iou(&other.bbox())
    }

    /// Checks that the detection can safely seed or correct a motion state.
    ///
    /// `embedding_dim` is the length every embedding of the session must have,
    /// `None` skips the length check.
    pub fn validate(&self, embedding_dim: Option<usize>) -> Result<(), Error> {
        let bbox = self.bbox();

        // corners can be finite while `x2 - x1` overflows
        if !bbox.is_finite() || !bbox.as_ltwh().is_finite() {
            return Err(Error::NonFiniteBox);
        }

        if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
            return Err(Error::DegenerateBox);
        }

        if !self.confidence.is_finite() {
            return Err(Error::NonFiniteScore);
        }

        if let Some(emb) = &self.embedding {
            if let Some(expected) = embedding_dim {
                if emb.len() != expected {
                    return Err(Error::EmbeddingDimension {
                        expected,
                        actual: emb.len(),
                    });
                }
            }

            let finite = emb.iter().all(|v| v.is_finite());

            if emb.is_empty() || !finite || l2_norm(emb) <= f32::EPSILON {
                return Err(Error::ZeroEmbedding);
            }
        }

        Ok(())
    }
}

#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scales `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);

    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}
