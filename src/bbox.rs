use ndarray::Array2;
use serde_derive::{Deserialize, Serialize};
use std::marker::PhantomData;

pub trait BBoxFormat: std::fmt::Debug + Copy + PartialEq {}

/// Left-top-width-height format, contains left top corner and width-height
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, PartialEq)]
pub struct Ltwh;
impl BBoxFormat for Ltwh {}

/// X-y-aspect_ratio-height format, contains coordinates of the center of bbox
/// and aspect_ratio-height. This is the observation space of the motion model.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, PartialEq)]
pub struct Xyah;
impl BBoxFormat for Xyah {}

/// Left-top-right-bottom format, contains left top and right bottom corners
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, PartialEq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct BBox<F: BBoxFormat>([f32; 4], #[serde(skip)] PhantomData<F>);

impl<F: BBoxFormat> BBox<F> {
    #[inline]
    pub fn as_slice(&self) -> &[f32; 4] {
        &self.0
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl BBox<Ltwh> {
    #[inline]
    pub fn ltwh(x1: f32, x2: f32, x3: f32, x4: f32) -> Self {
        BBox([x1, x2, x3, x4], PhantomData)
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3]
    }

    #[inline]
    pub fn as_xyah(&self) -> BBox<Xyah> {
        self.into()
    }

    #[inline]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        self.into()
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(x1: f32, x2: f32, x3: f32, x4: f32) -> Self {
        BBox([x1, x2, x3, x4], PhantomData)
    }

    #[inline]
    pub fn as_ltwh(&self) -> BBox<Ltwh> {
        self.into()
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.0[3]
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.0[2] - self.0[0]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3] - self.0[1]
    }

    /// Area of the box, inverted boxes count as empty. Computed in `f64`, the
    /// product of two large `f32` sides would overflow.
    #[inline]
    pub fn area(&self) -> f64 {
        let w = f64::from(self.right()) - f64::from(self.left());
        let h = f64::from(self.bottom()) - f64::from(self.top());

        w.max(0.0) * h.max(0.0)
    }

    #[inline]
    pub fn intersection(&self, other: &BBox<Ltrb>) -> f64 {
        let right = f64::from(self.right().min(other.right()));
        let bottom = f64::from(self.bottom().min(other.bottom()));
        let w = right - f64::from(self.left().max(other.left()));
        let h = bottom - f64::from(self.top().max(other.top()));

        w.max(0.0) * h.max(0.0)
    }

    /// Intersection over union. Degenerate boxes give 0, never NaN.
    pub fn iou(&self, other: &BBox<Ltrb>) -> f32 {
        let inter = self.intersection(other);
        let union = self.area() + other.area() - inter;

        if union > 0.0 && inter > 0.0 {
            (inter / union).min(1.0) as f32
        } else {
            0.0
        }
    }

    /// Intersection over the area of `self`.
    pub fn ioa(&self, other: &BBox<Ltrb>) -> f32 {
        let area = self.area();

        if area > 0.0 {
            (self.intersection(other) / area).min(1.0) as f32
        } else {
            0.0
        }
    }
}

impl BBox<Xyah> {
    #[inline]
    pub fn xyah(x1: f32, x2: f32, x3: f32, x4: f32) -> Self {
        BBox([x1, x2, x3, x4], PhantomData)
    }

    #[inline(always)]
    pub fn as_ltwh(&self) -> BBox<Ltwh> {
        self.into()
    }

    #[inline(always)]
    pub fn cx(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn cy(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn aspect_ratio(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3]
    }
}

impl<'a> From<&'a BBox<Ltwh>> for BBox<Xyah> {
    #[inline]
    fn from(v: &'a BBox<Ltwh>) -> Self {
        Self(
            [
                v.0[0] + v.0[2] / 2.0,
                v.0[1] + v.0[3] / 2.0,
                v.0[2] / v.0[3],
                v.0[3],
            ],
            PhantomData,
        )
    }
}

impl<'a> From<&'a BBox<Ltwh>> for BBox<Ltrb> {
    #[inline]
    fn from(v: &'a BBox<Ltwh>) -> Self {
        Self(
            [v.0[0], v.0[1], v.0[2] + v.0[0], v.0[3] + v.0[1]],
            PhantomData,
        )
    }
}

impl<'a> From<&'a BBox<Ltrb>> for BBox<Ltwh> {
    #[inline]
    fn from(v: &'a BBox<Ltrb>) -> Self {
        Self(
            [v.0[0], v.0[1], v.0[2] - v.0[0], v.0[3] - v.0[1]],
            PhantomData,
        )
    }
}

impl<'a> From<&'a BBox<Xyah>> for BBox<Ltwh> {
    #[inline]
    fn from(v: &'a BBox<Xyah>) -> Self {
        let height = v.0[3];
        let width = v.0[2] * height;

        Self(
            [v.0[0] - width / 2.0, v.0[1] - height / 2.0, width, height],
            PhantomData,
        )
    }
}

/// Pairwise IOU, rows follow `a`, columns follow `b`.
pub fn ious(a: &[BBox<Ltrb>], b: &[BBox<Ltrb>]) -> Array2<f32> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i].iou(&b[j]))
}

/// Pairwise intersection over the area of the row box.
pub fn ioas(a: &[BBox<Ltrb>], b: &[BBox<Ltrb>]) -> Array2<f32> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i].ioa(&b[j]))
}
