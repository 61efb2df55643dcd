use crate::{Color, ParticipantId, Timestamp};
use euclid::default::Point2D;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Shape {
    Freehand { points: Vec<Point2D<f32>> },
    Eraser { points: Vec<Point2D<f32>> },
    Rectangle { from: Point2D<f32>, to: Point2D<f32> },
    Circle { from: Point2D<f32>, to: Point2D<f32> },
    Line { from: Point2D<f32>, to: Point2D<f32> },
}

/// A finished gesture as the client sends it. The id is optional; the log
/// assigns one when it is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDraft {
    pub id: Option<ElementId>,
    pub shape: Shape,
    pub color: Color,
    pub stroke_width: f32,
}

/// One immutable entry of a session's drawing log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawingElement {
    pub id: ElementId,
    /// Position in append order, strictly increasing within a session.
    pub seq: u64,
    pub shape: Shape,
    pub color: Color,
    pub stroke_width: f32,
    pub author: ParticipantId,
    pub appended_at: Timestamp,
}
