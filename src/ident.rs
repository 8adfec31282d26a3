//! Normalized identifiers.
//!
//! Save-root labels and resource ids have been stored with different case
//! and collation settings over time. Both are canonicalized here, once, so
//! comparisons in memory and in SQL never depend on how a column was declared.

use serde::Serialize;
use std::fmt;

use crate::error::{Error, Result};

const MAX_ROOT_LEN: usize = 128;

/// A save profile label, trimmed and lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RootLabel(String);

impl RootLabel {
    /// Validate and normalize a label supplied by a caller.
    pub fn parse(raw: &str) -> Result<Self> {
        let label = raw.trim().to_lowercase();
        let well_formed = !label.is_empty()
            && label.len() <= MAX_ROOT_LEN
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

        if well_formed {
            Ok(RootLabel(label))
        } else {
            Err(Error::InvalidRoot(raw.to_string()))
        }
    }

    /// Build a label from arbitrary text (a directory name), replacing
    /// characters that are not allowed in labels.
    pub fn sanitized(raw: &str) -> Option<Self> {
        let cleaned: String = raw
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        RootLabel::parse(&cleaned).ok()
    }

    /// Wrap a label read back from the database. Legacy rows may predate
    /// normalization, so the same folding is applied without validation.
    pub(crate) fn from_stored(raw: String) -> Self {
        RootLabel(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RootLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resource token, trimmed, upper-cased and without the leading caret the
/// game uses for product/substance ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        let stem = trimmed.strip_prefix('^').unwrap_or(trimmed);
        ResourceId(stem.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Prefix test against an upper-case pattern.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_labels_fold_case_and_whitespace() {
        let a = RootLabel::parse("ST_76561198000000000").unwrap();
        let b = RootLabel::parse("  st_76561198000000000 ").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "st_76561198000000000");
    }

    #[test]
    fn malformed_root_labels_rejected() {
        assert!(RootLabel::parse("").is_err());
        assert!(RootLabel::parse("   ").is_err());
        assert!(RootLabel::parse("st 1").is_err());
        assert!(RootLabel::parse("st_1; DROP TABLE").is_err());
        assert!(RootLabel::parse(&"a".repeat(200)).is_err());
    }

    #[test]
    fn sanitized_replaces_bad_characters() {
        let label = RootLabel::sanitized("My Save (2)").unwrap();
        assert_eq!(label.as_str(), "my_save__2_");
        assert!(RootLabel::sanitized("").is_none());
    }

    #[test]
    fn resource_ids_drop_caret_and_fold_case() {
        assert_eq!(ResourceId::new("^FUEL1"), ResourceId::new("fuel1"));
        assert_eq!(ResourceId::new(" ^b_wall ").as_str(), "B_WALL");
        assert!(ResourceId::new("^").is_empty());
    }

    #[test]
    fn prefix_matches_canonical_form() {
        let id = ResourceId::new("^build_beacon");
        assert!(id.has_prefix("BUILD"));
        assert!(!id.has_prefix("B_"));
    }
}
