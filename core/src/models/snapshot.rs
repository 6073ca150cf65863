//! Database snapshots

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use super::table::ResultTable;

/// Contents of every table owned by a workspace, keyed by table name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabaseSnapshot {
    tables: BTreeMap<String, ResultTable>,
}

impl DatabaseSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a table
    pub fn insert(&mut self, name: impl Into<String>, table: ResultTable) {
        self.tables.insert(name.into(), table);
    }

    /// Look up a table by name
    pub fn table(&self, name: &str) -> Option<&ResultTable> {
        self.tables.get(name)
    }

    /// Table names in sorted order
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Iterate over tables in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResultTable)> {
        self.tables.iter()
    }

    /// Number of tables
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the snapshot holds no tables
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<(String, ResultTable)> for DatabaseSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, ResultTable)>>(iter: I) -> Self {
        DatabaseSnapshot {
            tables: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_are_sorted() {
        let mut snapshot = DatabaseSnapshot::new();
        snapshot.insert("orders", ResultTable::default());
        snapshot.insert("clients", ResultTable::default());

        assert_eq!(snapshot.table_names(), vec!["clients", "orders"]);
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.table("orders").is_some());
        assert!(snapshot.table("missing").is_none());
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let snapshot: DatabaseSnapshot = vec![("t".to_string(), ResultTable::default())]
            .into_iter()
            .collect();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("t").is_some());
    }
}
