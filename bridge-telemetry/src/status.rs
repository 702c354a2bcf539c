//! Node status indicator.

use std::fmt;

use serde::Serialize;

/// Colour of the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFill {
    /// Working.
    Grey,
    /// Last operation succeeded.
    Green,
    /// Last operation failed.
    Red,
    /// Retrying or about to restart.
    Yellow,
    /// Waiting on in-flight work or a reconfiguration.
    Blue,
}

/// Shape of the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusShape {
    /// Steady state.
    Dot,
    /// Transient state such as a retry.
    Ring,
}

/// A status update shown next to the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    fill: StatusFill,
    shape: StatusShape,
    text: String,
}

impl NodeStatus {
    /// Creates a status update.
    #[must_use]
    pub fn new(fill: StatusFill, shape: StatusShape, text: impl Into<String>) -> Self {
        Self {
            fill,
            shape,
            text: text.into(),
        }
    }

    /// Grey dot: work in progress.
    #[must_use]
    pub fn working(text: impl Into<String>) -> Self {
        Self::new(StatusFill::Grey, StatusShape::Dot, text)
    }

    /// Green dot: success.
    #[must_use]
    pub fn success(text: impl Into<String>) -> Self {
        Self::new(StatusFill::Green, StatusShape::Dot, text)
    }

    /// Red dot: failure.
    #[must_use]
    pub fn failure(text: impl Into<String>) -> Self {
        Self::new(StatusFill::Red, StatusShape::Dot, text)
    }

    /// Yellow ring: retrying.
    #[must_use]
    pub fn retrying(text: impl Into<String>) -> Self {
        Self::new(StatusFill::Yellow, StatusShape::Ring, text)
    }

    /// Blue dot: waiting.
    #[must_use]
    pub fn waiting(text: impl Into<String>) -> Self {
        Self::new(StatusFill::Blue, StatusShape::Dot, text)
    }

    /// Returns the colour.
    #[must_use]
    pub const fn fill(&self) -> StatusFill {
        self.fill
    }

    /// Returns the shape.
    #[must_use]
    pub const fn shape(&self) -> StatusShape {
        self.shape
    }

    /// Returns the text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}/{:?}] {}", self.fill, self.shape, self.text)
    }
}
