use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Merchant catalog entry used to resolve free-text item names to prices.
/// Deserializable so entries can be listed directly in the config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub unit_price: Decimal,
}

/// Resolves an extracted item name to a catalog price. The extractor never
/// does this; price resolution is the lifecycle manager's concern.
pub trait CatalogResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<&CatalogEntry>;
}

#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    entries: Vec<CatalogEntry>,
}

impl StaticCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }
}

impl CatalogResolver for StaticCatalog {
    fn resolve(&self, name: &str) -> Option<&CatalogEntry> {
        let needle = normalize(name);
        self.entries.iter().find(|entry| {
            normalize(&entry.name) == needle
                || entry.aliases.iter().any(|alias| normalize(alias) == needle)
        })
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CatalogEntry, CatalogResolver, StaticCatalog};

    fn catalog() -> StaticCatalog {
        StaticCatalog::new(vec![
            CatalogEntry {
                name: "Margherita Pizza".to_string(),
                aliases: vec!["pizza".to_string(), "margherita".to_string()],
                unit_price: Decimal::new(1250, 2),
            },
            CatalogEntry {
                name: "Soda".to_string(),
                aliases: vec!["cola".to_string()],
                unit_price: Decimal::new(300, 2),
            },
        ])
    }

    #[test]
    fn resolves_by_name_and_alias_case_insensitively() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("PIZZA").map(|e| e.unit_price), Some(Decimal::new(1250, 2)));
        assert_eq!(catalog.resolve("soda ").map(|e| e.unit_price), Some(Decimal::new(300, 2)));
    }

    #[test]
    fn unknown_names_stay_unresolved() {
        assert!(catalog().resolve("sushi").is_none());
    }
}
