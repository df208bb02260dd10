//! Context Assembler
//!
//! Renders a retrieved schema subset as the prompt context block: table
//! descriptions, column descriptions, then relationships. Output follows
//! registry order so the same input always renders the same text.

use crate::registry::{ColumnKey, SchemaRegistry};
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;

pub struct ContextAssembler {
    registry: Arc<SchemaRegistry>,
}

impl ContextAssembler {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn assemble(&self, tables: &HashSet<String>, columns: &HashSet<ColumnKey>) -> String {
        let mut context = String::from("### Tables:\n");
        for table in self.registry.tables() {
            if tables.contains(&table.table_name) {
                let _ = writeln!(context, "{}: {}", table.table_name, table.description);
            }
        }

        context.push_str("\n### Columns:\n");
        for column in self.registry.columns() {
            if !tables.contains(&column.table_name) {
                continue;
            }
            let key = column.key();
            if !columns.contains(&key) {
                continue;
            }
            let nullability = if column.nullable { ", nullable" } else { "" };
            let _ = writeln!(
                context,
                "{} ({}{}): {}",
                key, column.data_type, nullability, column.description
            );
        }

        context.push_str("\n### Relationships:\n");
        for table in self.registry.tables() {
            let name = &table.table_name;
            if !tables.contains(name) {
                continue;
            }
            let Some(relations) = self.registry.relations(name) else {
                continue;
            };
            // Edges into tables outside the subset would dangle in the prompt.
            for edge in relations
                .relationships
                .iter()
                .filter(|edge| tables.contains(&edge.related_table))
            {
                let _ = writeln!(
                    context,
                    "{}.{} -> {}.{}",
                    name, edge.local_column, edge.related_table, edge.related_column
                );
            }
        }

        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{
        ColumnDescriptor, RelationalEdge, RelationalMapping, TableDescriptor, TableRelations,
    };

    fn registry() -> Arc<SchemaRegistry> {
        let tables = vec![
            TableDescriptor {
                table_name: "loan".to_string(),
                description: "Loans issued".to_string(),
            },
            TableDescriptor {
                table_name: "customer".to_string(),
                description: "Borrowers".to_string(),
            },
            TableDescriptor {
                table_name: "branch".to_string(),
                description: "Bank branches".to_string(),
            },
        ];
        let columns = vec![
            ColumnDescriptor {
                table_name: "loan".to_string(),
                column_name: "customer_id".to_string(),
                data_type: "int".to_string(),
                nullable: false,
                description: "Borrower".to_string(),
            },
            ColumnDescriptor {
                table_name: "loan".to_string(),
                column_name: "due_date".to_string(),
                data_type: "date".to_string(),
                nullable: true,
                description: "Next installment due".to_string(),
            },
            ColumnDescriptor {
                table_name: "customer".to_string(),
                column_name: "id".to_string(),
                data_type: "int".to_string(),
                nullable: false,
                description: "Customer id".to_string(),
            },
        ];
        let mut mapping = RelationalMapping::new();
        mapping.insert(
            "loan".to_string(),
            TableRelations {
                related_tables: vec!["customer".to_string(), "branch".to_string()],
                relationships: vec![
                    RelationalEdge {
                        local_column: "customer_id".to_string(),
                        related_table: "customer".to_string(),
                        related_column: "id".to_string(),
                    },
                    RelationalEdge {
                        local_column: "branch_id".to_string(),
                        related_table: "branch".to_string(),
                        related_column: "id".to_string(),
                    },
                ],
            },
        );
        Arc::new(SchemaRegistry::from_parts(tables, columns, mapping).unwrap())
    }

    fn tables(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn columns(keys: &[(&str, &str)]) -> HashSet<ColumnKey> {
        keys.iter().map(|(t, c)| ColumnKey::new(*t, *c)).collect()
    }

    #[test]
    fn test_renders_sections_in_registry_order() {
        let assembler = ContextAssembler::new(registry());
        let context = assembler.assemble(
            &tables(&["customer", "loan"]),
            &columns(&[("customer", "id"), ("loan", "due_date"), ("loan", "customer_id")]),
        );

        let expected = "### Tables:\n\
            loan: Loans issued\n\
            customer: Borrowers\n\
            \n### Columns:\n\
            loan.customer_id (int): Borrower\n\
            loan.due_date (date, nullable): Next installment due\n\
            customer.id (int): Customer id\n\
            \n### Relationships:\n\
            loan.customer_id -> customer.id\n";
        assert_eq!(context, expected);
    }

    #[test]
    fn test_suppresses_relationships_outside_subset() {
        let assembler = ContextAssembler::new(registry());
        let context = assembler.assemble(&tables(&["loan"]), &columns(&[("loan", "customer_id")]));
        assert!(!context.contains("->"));
        assert!(!context.contains("customer:"));
    }

    #[test]
    fn test_columns_require_both_table_and_column_membership() {
        let assembler = ContextAssembler::new(registry());
        let context = assembler.assemble(&tables(&["loan"]), &columns(&[("customer", "id")]));
        assert!(!context.contains("customer.id"));
        assert!(!context.contains("loan.due_date"));
    }

    #[test]
    fn test_deterministic_output() {
        let assembler = ContextAssembler::new(registry());
        let t = tables(&["loan", "customer", "branch"]);
        let c = columns(&[("loan", "due_date"), ("customer", "id")]);
        let first = assembler.assemble(&t, &c);
        for _ in 0..10 {
            assert_eq!(assembler.assemble(&t, &c), first);
        }
        assert!(first.contains("loan.branch_id -> branch.id"));
    }

    #[test]
    fn test_unknown_tables_not_rendered() {
        let assembler = ContextAssembler::new(registry());
        let context = assembler.assemble(&tables(&["ghost"]), &HashSet::new());
        assert_eq!(context, "### Tables:\n\n### Columns:\n\n### Relationships:\n");
    }
}
