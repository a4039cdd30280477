//! # Bundle Input
//!
//! Reading bundle sets from files and request bodies.
//!
//! Two shapes are accepted: a bare JSON array of bundles, or the collector
//! response object `{"rumBundles": [...]}`.

use rumstat_core::{Bundle, RumError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of any file read by the CLI (100 MB).
pub const MAX_INPUT_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
pub fn validate_file_size(path: &Path, max_size: u64) -> Result<(), RumError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| RumError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(RumError::InvalidInput(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve a path to an existing regular file.
///
/// Canonicalizing resolves `..` and symlinks before anything is read.
pub fn validate_file_path(path: &Path) -> Result<PathBuf, RumError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| RumError::IoError(format!("Invalid file path '{}': {}", path.display(), e)))?;

    if !canonical.is_file() {
        return Err(RumError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

// =============================================================================
// PAYLOAD
// =============================================================================

/// A bundle set as delivered by the collector or by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BundlesPayload {
    Wrapped {
        #[serde(rename = "rumBundles")]
        rum_bundles: Vec<Bundle>,
    },
    Bare(Vec<Bundle>),
}

impl BundlesPayload {
    /// Bundles of either shape.
    #[must_use]
    pub fn into_bundles(self) -> Vec<Bundle> {
        match self {
            Self::Wrapped { rum_bundles } => rum_bundles,
            Self::Bare(bundles) => bundles,
        }
    }
}

/// Parse bundle JSON in either accepted shape.
pub fn parse_bundles(text: &str) -> Result<Vec<Bundle>, RumError> {
    serde_json::from_str::<BundlesPayload>(text)
        .map(BundlesPayload::into_bundles)
        .map_err(|e| RumError::SerializationError(format!("Invalid bundle JSON: {}", e)))
}

/// Read and parse a bundle file.
pub fn read_bundles(path: &Path) -> Result<Vec<Bundle>, RumError> {
    let canonical = validate_file_path(path)?;
    validate_file_size(&canonical, MAX_INPUT_FILE_SIZE)?;

    let text = std::fs::read_to_string(&canonical)
        .map_err(|e| RumError::IoError(format!("Cannot read file: {}", e)))?;
    let bundles = parse_bundles(&text)?;

    tracing::debug!(path = %canonical.display(), bundles = bundles.len(), "bundles read");
    Ok(bundles)
}

// =============================================================================
// TESTS
// =============================================================================
