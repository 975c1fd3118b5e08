//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the identifiers that end up in directory
//! names and remote object keys. Each newtype ensures validity at
//! construction time: a bad id caught here is a bad path never created.

use std::fmt::{self, Display, Formatter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// Placeholder used for project/config ids when no configuration exists.
pub const PLACEHOLDER_ID: &str = "na";

/// Returns an error if `value` is empty or would escape a directory name.
fn validate_identifier(value: &str) -> Result<(), DomainError> {
    if value.is_empty() {
        return Err(DomainError::InvalidIdentifier(value.to_string()));
    }
    if value.contains('/') || value.contains('\\') || value.contains("..") {
        return Err(DomainError::InvalidIdentifier(value.to_string()));
    }
    Ok(())
}

// ============================================================================
// T011: Identity newtypes
// ============================================================================

/// Unique hardware identity of one pod (derived from the CPU serial)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a validated DeviceId
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        validate_identifier(&value)?;
        Ok(Self(value))
    }

    /// The identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Project the pod's data belongs to (from the device config)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Create a validated ProjectId
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        validate_identifier(&value)?;
        Ok(Self(value))
    }

    /// Placeholder id used when the device has no configuration
    #[must_use]
    pub fn placeholder() -> Self {
        Self(PLACEHOLDER_ID.to_string())
    }

    /// The identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ProjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Revision of the device configuration the data was captured under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigId(String);

impl ConfigId {
    /// Create a validated ConfigId
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        validate_identifier(&value)?;
        Ok(Self(value))
    }

    /// Placeholder id used when the device has no configuration
    #[must_use]
    pub fn placeholder() -> Self {
        Self(PLACEHOLDER_ID.to_string())
    }

    /// The identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ConfigId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// T012: CycleId
// ============================================================================

/// Identifier for one sync cycle (logging/observability only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(Uuid);

impl CycleId {
    /// Create a new random CycleId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CycleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// T013: ObjectKey
// ============================================================================

/// Relative, `/`-separated key of an object in the remote store
///
/// Derived from a file's location relative to the upload root, so the
/// remote bucket mirrors the on-disk tree. Never absolute, never empty,
/// never contains `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a validated ObjectKey from a `/`-separated string
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty()
            || value.starts_with('/')
            || value.split('/').any(|seg| seg.is_empty() || seg == "..")
        {
            return Err(DomainError::InvalidObjectKey(value));
        }
        Ok(Self(value))
    }

    /// Build an ObjectKey from a relative filesystem path
    pub fn from_relative_path(path: &Path) -> Result<Self, DomainError> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                std::path::Component::Normal(seg) => {
                    segments.push(seg.to_string_lossy().into_owned());
                }
                other => {
                    return Err(DomainError::InvalidObjectKey(format!(
                        "unexpected path component {other:?} in {}",
                        path.display()
                    )));
                }
            }
        }
        Self::new(segments.join("/"))
    }

    /// The key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Unit tests
// ============================================================================
