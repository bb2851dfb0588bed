//! Purpose: Describe how a table's row key is typed and which literals bound a scan.
//! Exports: `Mapping`, `ScanKeys`.
//! Role: Serde-backed configuration consumed by `ScanPlanBuilder::create_scanner_builder_for`.
//! Invariants: An empty `key_mask` is treated the same as an absent one.
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::key::KeyType;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub table: String,
    pub key_type: KeyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_mask: Option<String>,
}

impl Mapping {
    pub fn new(table: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            table: table.into(),
            key_type,
            key_mask: None,
        }
    }

    pub fn with_key_mask(mut self, mask: impl Into<String>) -> Self {
        self.key_mask = Some(mask.into());
        self
    }

    pub fn key_mask(&self) -> Option<&str> {
        self.key_mask.as_deref().filter(|mask| !mask.is_empty())
    }

    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        serde_json::from_str(input).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid mapping")
                .with_hint("A mapping needs \"table\" and \"key_type\", and may carry \"key_mask\".")
                .with_source(err)
        })
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to read mapping {}", path.display()))
                .with_source(err)
        })?;
        Self::from_json_str(&contents)
    }
}

/// Raw scan inputs as a user typed them; nothing here has been substituted or parsed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanKeys {
    pub start: Option<String>,
    pub stop: Option<String>,
    /// Overrides the mapping's mask for this scan.
    pub key_mask: Option<String>,
    pub cache_size: Option<String>,
}

impl ScanKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(mut self, literal: impl Into<String>) -> Self {
        self.start = Some(literal.into());
        self
    }

    pub fn stop(mut self, literal: impl Into<String>) -> Self {
        self.stop = Some(literal.into());
        self
    }

    pub fn key_mask(mut self, mask: impl Into<String>) -> Self {
        self.key_mask = Some(mask.into());
        self
    }

    pub fn cache_size(mut self, literal: impl Into<String>) -> Self {
        self.cache_size = Some(literal.into());
        self
    }

    /// The mask to apply: the scan's own when non-empty, else the mapping's.
    pub fn effective_mask<'a>(&'a self, mapping: &'a Mapping) -> Option<&'a str> {
        self.key_mask
            .as_deref()
            .filter(|mask| !mask.is_empty())
            .or_else(|| mapping.key_mask())
    }
}

#[cfg(test)]
mod tests {
    use super::{Mapping, ScanKeys};
    use crate::core::error::ErrorKind;
    use crate::core::key::KeyType;

    #[test]
    fn parses_mapping_json() {
        let mapping = Mapping::from_json_str(
            r#"{"table":"events","key_type":"UNSIGNED_DATE","key_mask":"yyyy-MM-dd"}"#,
        )
        .expect("mapping");
        assert_eq!(mapping.table, "events");
        assert_eq!(mapping.key_type, KeyType::UnsignedDate);
        assert_eq!(mapping.key_mask(), Some("yyyy-MM-dd"));
    }

    #[test]
    fn missing_key_type_is_usage_error() {
        let err = Mapping::from_json_str(r#"{"table":"events"}"#).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.hint().is_some());
    }

    #[test]
    fn scan_mask_overrides_mapping_mask() {
        let mapping = Mapping::new("t", KeyType::Long).with_key_mask("#,##0");
        assert_eq!(ScanKeys::new().effective_mask(&mapping), Some("#,##0"));
        assert_eq!(
            ScanKeys::new().key_mask("0.00").effective_mask(&mapping),
            Some("0.00")
        );
        assert_eq!(
            ScanKeys::new().key_mask("").effective_mask(&mapping),
            Some("#,##0")
        );
        let bare = Mapping::new("t", KeyType::Long).with_key_mask("");
        assert_eq!(ScanKeys::new().effective_mask(&bare), None);
    }
}
