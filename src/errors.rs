//! Error types which callers need to tell apart from other failures.
//!
//! Most code in this crate returns [`anyhow::Result`]. The types here are wrapped in
//! [`anyhow::Error`] like any other error and can be recovered with
//! [`anyhow::Error::downcast_ref`], even after context has been attached.
use thiserror::Error;

/// Invalid user configuration, detected before any heavy computation starts.
#[derive(Debug, Error, PartialEq)]
#[error("Configuration error: {0}")]
pub struct ConfigurationError(pub String);

/// A bounding box could not be computed for a set of points.
///
/// Raised for empty or non-finite point sets, for point sets wider than 180 degrees of longitude
/// and for boxes which, once enlarged, would wrap around the whole globe.
#[derive(Debug, Error, PartialEq)]
#[error("Bounding box error: {0}")]
pub struct BBoxError(pub String);

/// Failures of the damage calculation which abort the whole run
#[derive(Debug, Error, PartialEq)]
pub enum DamageError {
    /// A task reported that it ran out of memory instead of returning its result
    #[error("You ran out of memory!")]
    OutOfMemory,
}
