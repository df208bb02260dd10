//! Schema Registry
//!
//! Immutable catalog of tables, columns and their relationships, loaded once
//! from the three registry files written by the schema introspection tool.

use crate::error::{Result, SqlRagError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const TABLE_REGISTRY_FILE: &str = "table_registry.json";
pub const COLUMN_REGISTRY_FILE: &str = "column_registry.json";
pub const RELATIONAL_MAPPING_FILE: &str = "relational_mapping.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub table_name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub table_name: String,
    pub column_name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub description: String,
}

impl ColumnDescriptor {
    pub fn key(&self) -> ColumnKey {
        ColumnKey::new(&self.table_name, &self.column_name)
    }
}

/// Composite identity of a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnKey {
    pub table: String,
    pub column: String,
}

impl ColumnKey {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Directed foreign-key style relationship owned by a source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationalEdge {
    pub local_column: String,
    pub related_table: String,
    pub related_column: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRelations {
    #[serde(default)]
    pub related_tables: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<RelationalEdge>,
}

pub type RelationalMapping = HashMap<String, TableRelations>;

/// Loaded schema catalog. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    tables: Vec<TableDescriptor>,
    columns: Vec<ColumnDescriptor>,
    relations: RelationalMapping,
    table_index: HashMap<String, usize>,
    column_index: HashMap<String, ColumnKey>,
}

impl SchemaRegistry {
    /// Load the three registry files from `dir`. Any missing or malformed
    /// file fails the whole load.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();

        let tables: Vec<TableDescriptor> = Self::load_json(dir.join(TABLE_REGISTRY_FILE))?;
        let columns: Vec<ColumnDescriptor> = Self::load_json(dir.join(COLUMN_REGISTRY_FILE))?;
        let relations: RelationalMapping = Self::load_json(dir.join(RELATIONAL_MAPPING_FILE))?;

        let registry = Self::from_parts(tables, columns, relations)?;
        info!(
            "Loaded schema registry from {}: {} tables, {} columns, {} relation entries",
            dir.display(),
            registry.tables.len(),
            registry.columns.len(),
            registry.relations.len()
        );
        Ok(registry)
    }

    /// Build a registry from already-parsed parts, enforcing key uniqueness
    /// and that every column belongs to a known table.
    pub fn from_parts(
        tables: Vec<TableDescriptor>,
        columns: Vec<ColumnDescriptor>,
        relations: RelationalMapping,
    ) -> Result<Self> {
        let mut table_index = HashMap::new();
        for (i, table) in tables.iter().enumerate() {
            if table.table_name.is_empty() {
                return Err(SqlRagError::RegistryLoad(format!(
                    "Table entry {} has an empty table_name",
                    i
                )));
            }
            if table_index.insert(table.table_name.clone(), i).is_some() {
                return Err(SqlRagError::RegistryLoad(format!(
                    "Duplicate table in registry: {}",
                    table.table_name
                )));
            }
        }

        let mut column_index = HashMap::new();
        for column in &columns {
            if !table_index.contains_key(&column.table_name) {
                return Err(SqlRagError::RegistryLoad(format!(
                    "Column {}.{} references unknown table {}",
                    column.table_name, column.column_name, column.table_name
                )));
            }
            let key = column.key();
            if column_index.insert(key.to_string(), key).is_some() {
                return Err(SqlRagError::RegistryLoad(format!(
                    "Duplicate column in registry: {}.{}",
                    column.table_name, column.column_name
                )));
            }
        }

        for name in relations.keys().filter(|name| !table_index.contains_key(*name)) {
            warn!("Relational mapping entry for unknown table {} will be ignored", name);
        }

        Ok(Self {
            tables,
            columns,
            relations,
            table_index,
            column_index,
        })
    }

    fn load_json<T: for<'de> Deserialize<'de>>(path: PathBuf) -> Result<T> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            SqlRagError::RegistryLoad(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            SqlRagError::RegistryLoad(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Tables in registry order.
    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    /// Columns in registry order.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.table_index.contains_key(name)
    }

    /// Resolve a rendered `table.column` identifier back to its composite key.
    pub fn column_key(&self, identifier: &str) -> Option<&ColumnKey> {
        self.column_index.get(identifier)
    }

    /// Relations owned by `table`. Tables without an entry have none.
    pub fn relations(&self, table: &str) -> Option<&TableRelations> {
        self.relations.get(table)
    }

    /// Direct neighbours of `table` that exist in the registry.
    pub fn related_tables<'a>(&'a self, table: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.relations
            .get(table)
            .into_iter()
            .flat_map(|r| r.related_tables.iter())
            .filter(move |name| self.contains_table(name))
            .map(|name| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_registry(dir: &Path, tables: &str, columns: &str, mapping: &str) {
        fs::write(dir.join(TABLE_REGISTRY_FILE), tables).unwrap();
        fs::write(dir.join(COLUMN_REGISTRY_FILE), columns).unwrap();
        fs::write(dir.join(RELATIONAL_MAPPING_FILE), mapping).unwrap();
    }

    const TABLES: &str = r#"[
        {"table_name": "loan", "description": "Loans issued to customers"},
        {"table_name": "customer", "description": "Borrowers"}
    ]"#;

    const COLUMNS: &str = r#"[
        {"table_name": "loan", "column_name": "id", "type": "int", "nullable": false, "description": "Loan id"},
        {"table_name": "loan", "column_name": "customer_id", "type": "int", "nullable": false, "description": "Borrower"},
        {"table_name": "customer", "column_name": "id", "type": "int", "nullable": false, "description": "Customer id"}
    ]"#;

    const MAPPING: &str = r#"{
        "loan": {
            "related_tables": ["customer", "branch"],
            "relationships": [
                {"local_column": "customer_id", "related_table": "customer", "related_column": "id"}
            ]
        }
    }"#;

    #[test]
    fn test_load_registry() {
        let dir = tempfile::tempdir().unwrap();
        write_registry(dir.path(), TABLES, COLUMNS, MAPPING);

        let registry = SchemaRegistry::load(dir.path()).unwrap();
        assert_eq!(registry.tables().len(), 2);
        assert_eq!(registry.columns().len(), 3);
        assert_eq!(registry.tables()[0].table_name, "loan");
        assert_eq!(registry.columns()[0].data_type, "int");
        assert_eq!(
            registry.column_key("loan.customer_id"),
            Some(&ColumnKey::new("loan", "customer_id"))
        );
        assert!(registry.relations("customer").is_none());
    }

    #[test]
    fn test_related_tables_skip_unknown() {
        let dir = tempfile::tempdir().unwrap();
        write_registry(dir.path(), TABLES, COLUMNS, MAPPING);

        let registry = SchemaRegistry::load(dir.path()).unwrap();
        let related: Vec<&str> = registry.related_tables("loan").collect();
        assert_eq!(related, vec!["customer"]);
        assert_eq!(registry.related_tables("customer").count(), 0);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(TABLE_REGISTRY_FILE), TABLES).unwrap();

        let err = SchemaRegistry::load(dir.path()).unwrap_err();
        assert!(matches!(err, SqlRagError::RegistryLoad(_)));
        assert!(err.to_string().contains(COLUMN_REGISTRY_FILE));
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_registry(dir.path(), TABLES, r#"[{"table_name": "loan"}]"#, MAPPING);

        let err = SchemaRegistry::load(dir.path()).unwrap_err();
        assert!(matches!(err, SqlRagError::RegistryLoad(_)));
    }

    #[test]
    fn test_column_with_unknown_table_rejected() {
        let columns = vec![ColumnDescriptor {
            table_name: "payment".to_string(),
            column_name: "id".to_string(),
            data_type: "int".to_string(),
            nullable: false,
            description: String::new(),
        }];
        let tables = vec![TableDescriptor {
            table_name: "loan".to_string(),
            description: String::new(),
        }];

        let err = SchemaRegistry::from_parts(tables, columns, HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("unknown table payment"));
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let table = TableDescriptor {
            table_name: "loan".to_string(),
            description: String::new(),
        };
        let err = SchemaRegistry::from_parts(vec![table.clone(), table], vec![], HashMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate table"));
    }
}
