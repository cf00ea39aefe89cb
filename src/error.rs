use thiserror::Error;

/// Why a single raw record was left out of a classification pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("required field `{field}` is missing")]
    MissingField { field: &'static str },

    #[error("unrecognized date `{value}`")]
    InvalidDate { value: String },

    #[error("`{field}` is not a valid coordinate: `{value}`")]
    InvalidCoordinate { field: &'static str, value: String },
}

/// Why a customer aggregate could not be turned into a map point.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifyError {
    #[error("coordinates out of range: latitude {latitude}, longitude {longitude}")]
    CoordinatesOutOfRange { latitude: f64, longitude: f64 },
}
