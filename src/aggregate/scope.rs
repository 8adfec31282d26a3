//! Logical inventory scopes.
//!
//! A scope is a row of `RULES`: owner-label prefixes plus optional resource
//! prefixes that include or exclude rows regardless of owner. Adding a scope
//! means adding a row here; aggregation code never branches on scope names.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::model::SlotRecord;

const BUILD_PREFIXES: &[&str] = &["B_", "BUILD", "BASE_"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Character,
    Base,
    Storage,
    Frigate,
    Corvette,
    Ship,
    Vehicles,
}

struct ScopeRule {
    scope: Scope,
    name: &'static str,
    aliases: &'static [&'static str],
    owners: &'static [&'static str],
    include: &'static [&'static str],
    exclude: &'static [&'static str],
}

const RULES: &[ScopeRule] = &[
    ScopeRule {
        scope: Scope::Character,
        name: "character",
        aliases: &["suit"],
        owners: &["SUIT", "CHARACTER", "PLAYER", "EXOSUIT"],
        include: &[],
        exclude: &[],
    },
    ScopeRule {
        scope: Scope::Base,
        name: "base",
        aliases: &[],
        owners: &["BASE"],
        include: BUILD_PREFIXES,
        exclude: &[],
    },
    ScopeRule {
        scope: Scope::Storage,
        name: "storage",
        aliases: &[],
        owners: &["STORAGE", "CHEST"],
        include: &[],
        exclude: &[],
    },
    ScopeRule {
        scope: Scope::Frigate,
        name: "frigate",
        aliases: &["freighter"],
        owners: &["FRIGATE", "FREIGHTER"],
        include: &[],
        exclude: &[],
    },
    ScopeRule {
        scope: Scope::Corvette,
        name: "corvette",
        aliases: &[],
        owners: &["CORVETTE"],
        include: &[],
        exclude: &[],
    },
    ScopeRule {
        scope: Scope::Ship,
        name: "ship",
        aliases: &[],
        owners: &["SHIP", "UNKNOWN"],
        include: &[],
        exclude: BUILD_PREFIXES,
    },
    ScopeRule {
        scope: Scope::Vehicles,
        name: "vehicles",
        aliases: &["vehicle"],
        owners: &["VEHICLE", "EXOCRAFT"],
        include: &[],
        exclude: &[],
    },
];

impl Scope {
    pub fn parse(raw: &str) -> Result<Self> {
        let name = raw.trim().to_ascii_lowercase();
        RULES
            .iter()
            .find(|rule| rule.name == name || rule.aliases.contains(&name.as_str()))
            .map(|rule| rule.scope)
            .ok_or_else(|| Error::InvalidScope(raw.to_string()))
    }

    pub fn all() -> impl Iterator<Item = Scope> {
        RULES.iter().map(|rule| rule.scope)
    }

    pub fn as_str(&self) -> &'static str {
        self.rule().name
    }

    fn rule(&self) -> &'static ScopeRule {
        // every variant has exactly one row
        RULES
            .iter()
            .find(|rule| rule.scope == *self)
            .unwrap_or(&RULES[0])
    }

    /// Whether a slot belongs to this scope, ignoring the tech rule.
    pub fn matches(&self, slot: &SlotRecord) -> bool {
        let rule = self.rule();
        if rule.exclude.iter().any(|p| slot.resource_id.has_prefix(p)) {
            return false;
        }
        let owner = slot.owner.to_ascii_uppercase();
        let owner_match = rule.owners.iter().any(|p| owner.starts_with(p));
        owner_match || rule.include.iter().any(|p| slot.resource_id.has_prefix(p))
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Scope::parse(s)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row filter shared by every aggregation path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowFilter {
    pub scope: Option<Scope>,
    pub include_tech: bool,
}

impl RowFilter {
    pub fn new(scope: Option<Scope>, include_tech: bool) -> Self {
        RowFilter { scope, include_tech }
    }

    pub fn admits(&self, slot: &SlotRecord) -> bool {
        if !self.include_tech && slot.is_tech() {
            return false;
        }
        self.scope.map_or(true, |scope| scope.matches(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::ResourceId;
    use crate::model::{InventoryKind, ResourceKind};

    fn slot(owner: &str, id: &str) -> SlotRecord {
        SlotRecord {
            owner: owner.into(),
            inventory: InventoryKind::General,
            container: String::new(),
            x: 0,
            y: 0,
            resource_id: ResourceId::new(id),
            amount: 1,
            resource_kind: ResourceKind::Product,
        }
    }

    #[test]
    fn names_and_aliases_parse() {
        assert_eq!(Scope::parse("Character").unwrap(), Scope::Character);
        assert_eq!(Scope::parse("suit").unwrap(), Scope::Character);
        assert_eq!(Scope::parse(" VEHICLE ").unwrap(), Scope::Vehicles);
        assert_eq!("freighter".parse::<Scope>().unwrap(), Scope::Frigate);
        assert_eq!(Scope::all().count(), 7);
    }

    #[test]
    fn unknown_scope_rejected() {
        let err = Scope::parse("spaceship").unwrap_err();
        assert!(matches!(err, Error::InvalidScope(_)));
        assert!(err.is_bad_request());
    }

    #[test]
    fn build_parts_are_base_not_ship() {
        let wall = slot("UNKNOWN", "^B_WALL");
        assert!(Scope::Base.matches(&wall));
        assert!(!Scope::Ship.matches(&wall));

        let beacon = slot("SHIP", "BUILD_BEACON");
        assert!(!Scope::Ship.matches(&beacon));
        assert!(Scope::Base.matches(&beacon));
    }

    #[test]
    fn unknown_owner_falls_into_ship() {
        assert!(Scope::Ship.matches(&slot("UNKNOWN", "FUEL1")));
        assert!(!Scope::Character.matches(&slot("UNKNOWN", "FUEL1")));
    }

    #[test]
    fn frigate_and_corvette_distinct() {
        assert!(Scope::Frigate.matches(&slot("FRIGATE", "FUEL1")));
        assert!(Scope::Frigate.matches(&slot("FREIGHTER", "FUEL1")));
        assert!(!Scope::Corvette.matches(&slot("FRIGATE", "FUEL1")));
        assert!(Scope::Corvette.matches(&slot("corvette", "FUEL1")));
    }

    #[test]
    fn tech_rows_need_flag() {
        let mut tech = slot("SUIT", "HAZARD_PROT");
        tech.inventory = InventoryKind::TechOnly;
        assert!(!RowFilter::new(Some(Scope::Character), false).admits(&tech));
        assert!(RowFilter::new(Some(Scope::Character), true).admits(&tech));

        let mut kind_tech = slot("SUIT", "JETPACK");
        kind_tech.resource_kind = ResourceKind::Technology;
        assert!(!RowFilter::default().admits(&kind_tech));
        assert!(RowFilter::default().admits(&slot("SUIT", "FUEL1")));
    }
}
