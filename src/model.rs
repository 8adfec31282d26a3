use serde::Serialize;

use crate::ident::ResourceId;

/// Coarse owner classification. Item rows keep the decoder's own owner label
/// (so `FRIGATE` and `CORVETTE` stay distinguishable); this enum is the
/// folded view of that label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OwnerKind {
    Character,
    Ship,
    Freighter,
    Vehicle,
    Storage,
    Pet,
    Base,
    Unknown,
}

impl OwnerKind {
    pub fn classify(label: &str) -> Self {
        let label = label.trim().to_ascii_uppercase();
        const TABLE: &[(&str, OwnerKind)] = &[
            ("SUIT", OwnerKind::Character),
            ("EXOSUIT", OwnerKind::Character),
            ("CHARACTER", OwnerKind::Character),
            ("PLAYER", OwnerKind::Character),
            ("SHIP", OwnerKind::Ship),
            ("CORVETTE", OwnerKind::Ship),
            ("FREIGHTER", OwnerKind::Freighter),
            ("FRIGATE", OwnerKind::Freighter),
            ("VEHICLE", OwnerKind::Vehicle),
            ("EXOCRAFT", OwnerKind::Vehicle),
            ("STORAGE", OwnerKind::Storage),
            ("CHEST", OwnerKind::Storage),
            ("PET", OwnerKind::Pet),
            ("BASE", OwnerKind::Base),
        ];

        TABLE
            .iter()
            .find(|(prefix, _)| label.starts_with(prefix))
            .map(|(_, kind)| *kind)
            .unwrap_or(OwnerKind::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Character => "Character",
            OwnerKind::Ship => "Ship",
            OwnerKind::Freighter => "Freighter",
            OwnerKind::Vehicle => "Vehicle",
            OwnerKind::Storage => "Storage",
            OwnerKind::Pet => "Pet",
            OwnerKind::Base => "Base",
            OwnerKind::Unknown => "Unknown",
        }
    }
}

/// Canonical form of an owner label: trimmed, upper-case, `UNKNOWN` if blank.
pub fn normalize_owner(raw: &str) -> String {
    let label = raw.trim().to_ascii_uppercase();
    if label.is_empty() {
        "UNKNOWN".to_string()
    } else {
        label
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum InventoryKind {
    #[serde(rename = "GENERAL")]
    General,
    #[serde(rename = "TECHONLY")]
    TechOnly,
    #[serde(rename = "CARGO")]
    Cargo,
}

impl InventoryKind {
    /// Lenient parse; anything unrecognized is a general inventory.
    pub fn parse(raw: &str) -> Self {
        let key: String = raw
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "tech" | "techonly" | "technology" => InventoryKind::TechOnly,
            "cargo" => InventoryKind::Cargo,
            _ => InventoryKind::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryKind::General => "GENERAL",
            InventoryKind::TechOnly => "TECHONLY",
            InventoryKind::Cargo => "CARGO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResourceKind {
    Product,
    Substance,
    Technology,
    Unknown,
}

impl ResourceKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "product" => ResourceKind::Product,
            "substance" => ResourceKind::Substance,
            "technology" => ResourceKind::Technology,
            _ => ResourceKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Product => "Product",
            ResourceKind::Substance => "Substance",
            ResourceKind::Technology => "Technology",
            ResourceKind::Unknown => "Unknown",
        }
    }
}

/// One physical inventory slot as reported by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotRecord {
    pub owner: String,
    pub inventory: InventoryKind,
    pub container: String,
    pub x: i64,
    pub y: i64,
    pub resource_id: ResourceId,
    pub amount: i64,
    pub resource_kind: ResourceKind,
}

impl SlotRecord {
    /// Technology rows: tech-only inventories and Technology resources.
    pub fn is_tech(&self) -> bool {
        self.inventory == InventoryKind::TechOnly || self.resource_kind == ResourceKind::Technology
    }
}

/// Mission progress and expedition season counters that the game stores in
/// inventory-shaped slots but which are not resources.
pub fn is_progress_token(id: &ResourceId) -> bool {
    const PREFIXES: &[&str] = &["SMUGGLE_", "FLYER", "BIGGS_", "POLICE_", "GET_"];
    if PREFIXES.iter().any(|p| id.has_prefix(p)) {
        return true;
    }

    // season counters look like S19_*
    let bytes = id.as_str().as_bytes();
    bytes.len() >= 4
        && bytes[0] == b'S'
        && bytes[1].is_ascii_digit()
        && bytes[2].is_ascii_digit()
        && bytes[3] == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_labels_fold_to_kinds() {
        assert_eq!(OwnerKind::classify("suit"), OwnerKind::Character);
        assert_eq!(OwnerKind::classify("FRIGATE"), OwnerKind::Freighter);
        assert_eq!(OwnerKind::classify("Corvette"), OwnerKind::Ship);
        assert_eq!(OwnerKind::classify("STORAGE3"), OwnerKind::Storage);
        assert_eq!(OwnerKind::classify("something"), OwnerKind::Unknown);
    }

    #[test]
    fn blank_owner_is_unknown() {
        assert_eq!(normalize_owner("  "), "UNKNOWN");
        assert_eq!(normalize_owner(" ship "), "SHIP");
    }

    #[test]
    fn inventory_kind_accepts_decoder_spellings() {
        assert_eq!(InventoryKind::parse("TECHONLY"), InventoryKind::TechOnly);
        assert_eq!(InventoryKind::parse("tech_only"), InventoryKind::TechOnly);
        assert_eq!(InventoryKind::parse("Technology"), InventoryKind::TechOnly);
        assert_eq!(InventoryKind::parse("Cargo"), InventoryKind::Cargo);
        assert_eq!(InventoryKind::parse(""), InventoryKind::General);
    }

    #[test]
    fn resource_kind_is_case_insensitive() {
        assert_eq!(ResourceKind::parse("substance"), ResourceKind::Substance);
        assert_eq!(ResourceKind::parse("TECHNOLOGY"), ResourceKind::Technology);
        assert_eq!(ResourceKind::parse("Fuel"), ResourceKind::Unknown);
    }

    #[test]
    fn progress_tokens_detected() {
        assert!(is_progress_token(&ResourceId::new("^SMUGGLE_RUN")));
        assert!(is_progress_token(&ResourceId::new("^S19_TOKEN")));
        assert!(is_progress_token(&ResourceId::new("get_reward")));
        assert!(!is_progress_token(&ResourceId::new("^FUEL1")));
        assert!(!is_progress_token(&ResourceId::new("S1_X")));
    }
}
