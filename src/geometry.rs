//! Joint geometry and named measures.
//!
//! All angles are in degrees. Nothing in here returns NaN: degenerate configurations map to
//! [`DEGENERATE_ANGLE`] and unresolvable measures map to `None`.

use std::collections::HashMap;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::pose::{LandmarkIndex, PoseFrame};

/// Angle reported when the three points do not define one (treated as a straight limb).
pub const DEGENERATE_ANGLE: f32 = 180.0;

/// Vectors shorter than this are considered zero-length.
const MIN_SEGMENT: f32 = 1e-6;

/// Angle at vertex `b` between `b→a` and `b→c`, in [0, 180].
///
/// Returns [`DEGENERATE_ANGLE`] when either segment has zero length, when `a` and `c` coincide
/// or when any coordinate is non-finite.
pub fn angle(a: Vector3<f32>, b: Vector3<f32>, c: Vector3<f32>) -> f32 {
    let ba = a - b;
    let bc = c - b;
    let norm_ba = ba.norm();
    let norm_bc = bc.norm();

    if !(norm_ba.is_finite() && norm_bc.is_finite()) {
        return DEGENERATE_ANGLE;
    }
    if norm_ba < MIN_SEGMENT || norm_bc < MIN_SEGMENT || (a - c).norm() < MIN_SEGMENT {
        return DEGENERATE_ANGLE;
    }

    let cos_angle = (ba.dot(&bc) / (norm_ba * norm_bc)).clamp(-1.0, 1.0);
    cos_angle.acos().to_degrees()
}

/// 2D convenience wrapper over [`angle`].
pub fn angle_2d(a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> f32 {
    angle(
        Vector3::new(a.0, a.1, 0.0),
        Vector3::new(b.0, b.1, 0.0),
        Vector3::new(c.0, c.1, 0.0),
    )
}

pub fn distance(a: Vector3<f32>, b: Vector3<f32>) -> f32 {
    (a - b).norm()
}

pub fn midpoint(a: Vector3<f32>, b: Vector3<f32>) -> Vector3<f32> {
    (a + b) * 0.5
}

/// Coordinate space the geometry runs in.
///
/// Landmarks always arrive normalized; in pixel space x/y are scaled by the frame size first, so
/// angles and distances match a non-square image.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "space", rename_all = "snake_case")]
pub enum CoordinateSpace {
    #[default]
    Normalized,
    Pixel { width: u32, height: u32 },
}

impl CoordinateSpace {
    fn scale(&self) -> (f32, f32) {
        match *self {
            CoordinateSpace::Normalized => (1.0, 1.0),
            CoordinateSpace::Pixel { width, height } => (width as f32, height as f32),
        }
    }
}

/// How landmarks are mapped into measurement space.
///
/// Planar unless `depth` is set. With depth, `z` is scaled by the frame width like x.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Projection {
    pub space: CoordinateSpace,
    pub depth: bool,
}

impl Projection {
    pub fn new(space: CoordinateSpace, depth: bool) -> Self {
        Self { space, depth }
    }

    fn project(&self, x: f32, y: f32, z: f32) -> Vector3<f32> {
        let (sx, sy) = self.space.scale();
        let z = if self.depth { z * sx } else { 0.0 };
        Vector3::new(x * sx, y * sy, z)
    }
}

impl From<CoordinateSpace> for Projection {
    fn from(space: CoordinateSpace) -> Self {
        Self { space, depth: false }
    }
}

/// A landmark, or the midpoint of two landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointRef {
    Landmark(LandmarkIndex),
    Midpoint([LandmarkIndex; 2]),
}

impl PointRef {
    pub fn landmarks(&self) -> Vec<LandmarkIndex> {
        match *self {
            PointRef::Landmark(index) => vec![index],
            PointRef::Midpoint([a, b]) => vec![a, b],
        }
    }

    /// Resolves the point in `frame`, or `None` if any landmark is missing or not visible enough.
    pub fn resolve(
        &self,
        frame: &PoseFrame,
        min_visibility: f32,
        projection: Projection,
    ) -> Option<Vector3<f32>> {
        let point = |index: LandmarkIndex| {
            frame
                .visible(index, min_visibility)
                .map(|lm| projection.project(lm.x, lm.y, lm.z))
        };
        match *self {
            PointRef::Landmark(index) => point(index),
            PointRef::Midpoint([a, b]) => Some(midpoint(point(a)?, point(b)?)),
        }
    }
}

impl From<LandmarkIndex> for PointRef {
    fn from(index: LandmarkIndex) -> Self {
        PointRef::Landmark(index)
    }
}

/// How a measure is computed from the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeasureKind {
    /// Angle at `b` in degrees.
    Angle { a: PointRef, b: PointRef, c: PointRef },
    Distance { a: PointRef, b: PointRef },
    /// `|a.x - b.x|`
    HorizontalSpan { a: PointRef, b: PointRef },
    /// `|a.y - b.y|`
    VerticalGap { a: PointRef, b: PointRef },
    /// `b.y - a.y`; positive when `b` is lower in the image than `a`.
    VerticalOffset { a: PointRef, b: PointRef },
    /// Mean of earlier measures that resolved this frame.
    Mean { of: Vec<String> },
}

/// A named scalar derived from the pose (the "AngleSpec" of an exercise, generalised).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureSpec {
    pub name: String,
    pub kind: MeasureKind,
}

impl MeasureSpec {
    pub fn angle(
        name: &str,
        a: impl Into<PointRef>,
        b: impl Into<PointRef>,
        c: impl Into<PointRef>,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind: MeasureKind::Angle {
                a: a.into(),
                b: b.into(),
                c: c.into(),
            },
        }
    }

    pub fn mean(name: &str, of: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: MeasureKind::Mean {
                of: of.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    pub fn with_kind(name: &str, kind: MeasureKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }

    /// Landmarks referenced directly (not through `Mean`).
    pub fn landmarks(&self) -> Vec<LandmarkIndex> {
        match &self.kind {
            MeasureKind::Angle { a, b, c } => {
                let mut out = a.landmarks();
                out.extend(b.landmarks());
                out.extend(c.landmarks());
                out
            }
            MeasureKind::Distance { a, b }
            | MeasureKind::HorizontalSpan { a, b }
            | MeasureKind::VerticalGap { a, b }
            | MeasureKind::VerticalOffset { a, b } => {
                let mut out = a.landmarks();
                out.extend(b.landmarks());
                out
            }
            MeasureKind::Mean { .. } => Vec::new(),
        }
    }

    /// Names of other measures this one depends on.
    pub fn dependencies(&self) -> &[String] {
        match &self.kind {
            MeasureKind::Mean { of } => of,
            _ => &[],
        }
    }

    fn evaluate(
        &self,
        frame: &PoseFrame,
        min_visibility: f32,
        projection: Projection,
        resolved: &Measurements,
    ) -> Option<f32> {
        let p = |r: &PointRef| r.resolve(frame, min_visibility, projection);
        let value = match &self.kind {
            MeasureKind::Angle { a, b, c } => angle(p(a)?, p(b)?, p(c)?),
            MeasureKind::Distance { a, b } => distance(p(a)?, p(b)?),
            MeasureKind::HorizontalSpan { a, b } => (p(a)?.x - p(b)?.x).abs(),
            MeasureKind::VerticalGap { a, b } => (p(a)?.y - p(b)?.y).abs(),
            MeasureKind::VerticalOffset { a, b } => p(b)?.y - p(a)?.y,
            MeasureKind::Mean { of } => {
                let values: Vec<f32> = of.iter().filter_map(|name| resolved.get(name)).collect();
                if values.is_empty() {
                    return None;
                }
                values.iter().sum::<f32>() / values.len() as f32
            }
        };
        value.is_finite().then_some(value)
    }
}

/// Measures resolved for one frame, by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurements {
    values: HashMap<String, f32>,
}

impl Measurements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates `specs` in order; `Mean` measures see everything defined before them.
    pub fn compute(
        specs: &[MeasureSpec],
        frame: &PoseFrame,
        min_visibility: f32,
        projection: impl Into<Projection>,
    ) -> Self {
        let projection = projection.into();
        let mut out = Self::new();
        for spec in specs {
            if let Some(value) = spec.evaluate(frame, min_visibility, projection, &out) {
                out.values.insert(spec.name.clone(), value);
            }
        }
        out
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.values.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f32) {
        self.values.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
