use thiserror::Error;

pub type ConvResult<T> = Result<T, ConvError>;

/// Failures a kernel call can report. Everything except `ScratchTooLarge` is a
/// caller contract violation caught before the loop nest runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvError {
    #[error("{tensor} must have {expected} dimensions, got {actual}")]
    RankMismatch { tensor: &'static str, expected: usize, actual: usize },

    #[error("dimension mismatch: {what} ({left} != {right})")]
    DimMismatch { what: &'static str, left: usize, right: usize },

    #[error("{tensor} buffer holds {actual} elements, shape needs {needed}")]
    BufferTooSmall { tensor: &'static str, needed: usize, actual: usize },

    #[error("{what} has {actual} entries, expected one per output channel ({expected})")]
    PerChannelLength { what: &'static str, expected: usize, actual: usize },

    #[error("{tensor} extent overflows usize")]
    ShapeOverflow { tensor: &'static str },

    #[error("{tensor} value {value} at index {index} does not fit the element type")]
    ElementRange { tensor: &'static str, index: usize, value: i32 },

    #[error("conv size is too large, not enough memory ({bytes} bytes requested)")]
    ScratchTooLarge { bytes: u64 },
}

impl ConvError {
    pub fn is_validation(&self) -> bool {
        !self.is_resource_exhaustion()
    }

    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, ConvError::ScratchTooLarge { .. })
    }
}
