use thiserror::Error;

/// Errors raised while constructing geo-fences.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FenceError {
    #[error("Fence radius must be a finite, non-negative number of meters (got {0})")]
    InvalidRadius(f64),
}
