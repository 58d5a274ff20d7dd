//! Manifest document parsing
//!
//! A manifest is a JSON object listing the Location, Schedule and Slot files a
//! publisher makes available:
//!
//! ```json
//! {
//!   "transactionTime": "2021-01-01T00:00:00Z",
//!   "request": "https://example.com/$bulk-publish",
//!   "output": [
//!     { "type": "Location", "url": "https://example.com/locations.ndjson" },
//!     { "type": "Slot", "url": "slots-ma.ndjson", "extension": { "state": ["MA"] } }
//!   ],
//!   "error": []
//! }
//! ```
//!
//! Descriptors are decoded one at a time so that a single malformed entry does
//! not hide its siblings.

use crate::state::LeafType;
use crate::{CrawlerError, Result};
use serde::Deserialize;
use serde_json::Value;

/// A parsed manifest document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFile {
    #[serde(default)]
    pub transaction_time: String,

    #[serde(default)]
    pub request: String,

    /// Raw descriptors, in document order
    output: Vec<Value>,

    #[serde(default)]
    pub error: Vec<Value>,
}

/// One entry of a manifest's `output` list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestOutput {
    #[serde(rename = "type")]
    pub file_type: LeafType,

    pub url: String,

    #[serde(default)]
    pub extension: Option<OutputExtension>,
}

/// The `extension` object of a descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OutputExtension {
    #[serde(default)]
    pub state: Vec<String>,
}

impl ManifestOutput {
    /// Raw jurisdiction annotations, possibly empty
    pub fn state_codes(&self) -> &[String] {
        self.extension
            .as_ref()
            .map(|ext| ext.state.as_slice())
            .unwrap_or_default()
    }
}

impl ManifestFile {
    /// Number of descriptors in `output`
    pub fn output_len(&self) -> usize {
        self.output.len()
    }

    /// Decodes each descriptor, keeping malformed ones as errors
    pub fn descriptors(
        &self,
    ) -> impl Iterator<Item = std::result::Result<ManifestOutput, serde_json::Error>> + '_ {
        self.output
            .iter()
            .map(|raw| ManifestOutput::deserialize(raw))
    }
}

/// Parses a manifest body fetched from `url`
///
/// The body must be a JSON object with an `output` array. All other fields are
/// optional.
pub fn parse_manifest(url: &str, body: &str) -> Result<ManifestFile> {
    serde_json::from_str(body).map_err(|e| CrawlerError::ParseFailed {
        url: url.to_string(),
        message: e.to_string(),
    })
}
