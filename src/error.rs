use thiserror::Error;

/// Failures tied to a single geometry. Callers decide whether these skip the
/// feature or abort the whole run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("line needs at least 2 distinct points to be offset, found {points}")]
    DegenerateGeometry { points: usize },
    #[error("could not build offset curve at distance {distance} for a line of {points} points")]
    OffsetConstruction { distance: f64, points: usize },
    #[error("polygon width has to be a finite number greater than 0, got {width}")]
    InvalidWidth { width: f64 },
    #[error("offset is 0 and the polygon is not centered, so the width has no side to extend to")]
    UndefinedWidthDirection,
    #[error("closed ring has {points} points, at least 4 are needed")]
    InvalidRing { points: usize },
}

pub type WidthCallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("feature '{feature}': {source}")]
    Geometry {
        feature: String,
        #[source]
        source: GeometryError,
    },
    #[error("width callback failed for feature '{feature}': {source}")]
    WidthCallback {
        feature: String,
        #[source]
        source: WidthCallbackError,
    },
    #[error("processing was cancelled")]
    Cancelled,
}

impl ProcessError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ProcessError::Configuration(message.into())
    }
}
