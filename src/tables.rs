//! Declarative data tables: columns plus row and table actions, rendered by the
//! generic `table` partial. Action buttons post `action=<table>__<action>` (table
//! scope, with `object_ids`) or `action=<table>__<action>__<id>` (one row).

use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub verbose_name: &'static str,
}

impl Column {
    pub const fn new(name: &'static str, verbose_name: &'static str) -> Self {
        Self { name, verbose_name }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Plain link; `{id}` in the url is replaced by the row's object id.
    Link { url: &'static str, classes: &'static str },
    /// Posts back to the table's page and deletes the selected objects.
    Delete { data_type_singular: &'static str, data_type_plural: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: &'static str,
    pub verbose_name: String,
    pub kind: ActionKind,
}

impl Action {
    pub fn link(name: &'static str, verbose_name: &'static str, url: &'static str, classes: &'static str) -> Self {
        Self { name, verbose_name: verbose_name.to_string(), kind: ActionKind::Link { url, classes } }
    }

    pub fn delete(data_type_singular: &'static str, data_type_plural: &'static str) -> Self {
        Self {
            name: "delete",
            verbose_name: format!("Delete {}", data_type_plural),
            kind: ActionKind::Delete { data_type_singular, data_type_plural },
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self.kind, ActionKind::Delete { .. })
    }

    /// Flash text after deleting `names`.
    pub fn success_message(&self, names: &[String]) -> String {
        match &self.kind {
            ActionKind::Delete { data_type_singular, data_type_plural } => {
                let noun = if names.len() == 1 { data_type_singular } else { data_type_plural };
                format!("Deleted {}: {}", noun, names.join(", "))
            }
            ActionKind::Link { .. } => String::new(),
        }
    }

    /// Flash text after failing on `names`.
    pub fn failure_message(&self, names: &[String]) -> String {
        match &self.kind {
            ActionKind::Delete { data_type_singular, data_type_plural } => {
                let noun = if names.len() == 1 { data_type_singular } else { data_type_plural };
                format!("Unable to delete {}: {}", noun, names.join(", "))
            }
            ActionKind::Link { .. } => String::new(),
        }
    }

    fn context(&self, table: &str, object_id: Option<&str>) -> Value {
        match &self.kind {
            ActionKind::Link { url, classes } => {
                let href = object_id.map(|id| url.replace("{id}", id)).unwrap_or_else(|| url.to_string());
                json!({"is_link": true, "name": self.name, "verbose_name": self.verbose_name, "url": href, "classes": classes})
            }
            ActionKind::Delete { .. } => {
                let value = match object_id {
                    Some(id) => format!("{}__{}__{}", table, self.name, id),
                    None => format!("{}__{}", table, self.name),
                };
                json!({"is_link": false, "name": self.name, "verbose_name": self.verbose_name, "value": value, "classes": "btn danger"})
            }
        }
    }
}

/// A row source. Cells are looked up by column name.
pub trait TableRow {
    fn object_id(&self) -> String;
    fn object_display(&self) -> String;
    fn cell(&self, column: &str) -> String;
}

/// A parsed `action` value from a posted table form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest<'a> {
    pub action: &'a Action,
    /// Set for row actions; table actions read `object_ids` instead.
    pub object_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: &'static str,
    pub verbose_name: &'static str,
    pub columns: Vec<Column>,
    pub row_actions: Vec<Action>,
    pub table_actions: Vec<Action>,
}

impl TableSpec {
    pub fn new(name: &'static str, verbose_name: &'static str) -> Self {
        Self { name, verbose_name, columns: Vec::new(), row_actions: Vec::new(), table_actions: Vec::new() }
    }

    pub fn column(mut self, c: Column) -> Self {
        self.columns.push(c);
        self
    }

    pub fn row_action(mut self, a: Action) -> Self {
        self.row_actions.push(a);
        self
    }

    pub fn table_action(mut self, a: Action) -> Self {
        self.table_actions.push(a);
        self
    }

    /// Resolve a posted `action` value against this table's actions.
    pub fn parse_action<'a>(&'a self, raw: &str) -> Option<ActionRequest<'a>> {
        let mut parts = raw.splitn(3, "__");
        let table = parts.next()?;
        if table != self.name {
            return None;
        }
        let name = parts.next()?;
        match parts.next() {
            Some(id) if !id.is_empty() => {
                let action = self.row_actions.iter().find(|a| a.name == name)?;
                Some(ActionRequest { action, object_id: Some(id.to_string()) })
            }
            Some(_) => None,
            None => {
                let action = self.table_actions.iter().find(|a| a.name == name)?;
                Some(ActionRequest { action, object_id: None })
            }
        }
    }

    pub fn context<R: TableRow>(&self, rows: &[R]) -> Value {
        let columns: Vec<Value> = self
            .columns
            .iter()
            .map(|c| json!({"name": c.name, "verbose_name": c.verbose_name}))
            .collect();
        let rows: Vec<Value> = rows
            .iter()
            .map(|r| {
                let id = r.object_id();
                let cells: Vec<String> = self.columns.iter().map(|c| r.cell(c.name)).collect();
                let actions: Vec<Value> = self.row_actions.iter().map(|a| a.context(self.name, Some(&id))).collect();
                json!({"id": id, "display": r.object_display(), "cells": cells, "actions": actions})
            })
            .collect();
        let table_actions: Vec<Value> = self.table_actions.iter().map(|a| a.context(self.name, None)).collect();
        json!({
            "name": self.name,
            "verbose_name": self.verbose_name,
            "columns": columns,
            "column_count": self.columns.len() + 2,
            "rows": rows,
            "is_empty": rows.is_empty(),
            "table_actions": table_actions,
            "has_row_actions": !self.row_actions.is_empty(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Thing(&'static str, &'static str);

    impl TableRow for Thing {
        fn object_id(&self) -> String { self.0.to_string() }
        fn object_display(&self) -> String { self.1.to_string() }
        fn cell(&self, column: &str) -> String {
            match column {
                "id" => self.0.to_string(),
                "name" => self.1.to_string(),
                _ => String::new(),
            }
        }
    }

    fn table() -> TableSpec {
        TableSpec::new("things", "Things")
            .column(Column::new("id", "Id"))
            .column(Column::new("name", "Name"))
            .row_action(Action::delete("Thing", "Things"))
            .row_action(Action::link("rename", "Rename", "/things/{id}/rename", "ajax-modal"))
            .table_action(Action::link("create", "Create", "/things/create", "btn"))
            .table_action(Action::delete("Thing", "Things"))
    }

    #[test]
    fn parses_row_and_table_actions() {
        let t = table();
        let row = t.parse_action("things__delete__abc__def").unwrap();
        assert!(row.action.is_delete());
        assert_eq!(row.object_id.as_deref(), Some("abc__def"));
        let bulk = t.parse_action("things__delete").unwrap();
        assert_eq!(bulk.object_id, None);
        assert!(t.parse_action("others__delete").is_none());
        assert!(t.parse_action("things__explode").is_none());
        assert!(t.parse_action("things__delete__").is_none());
    }

    #[test]
    fn context_fills_cells_and_links() {
        let ctx = table().context(&[Thing("n1", "alpha")]);
        assert_eq!(ctx["rows"][0]["cells"][1], "alpha");
        assert_eq!(ctx["rows"][0]["actions"][0]["value"], "things__delete__n1");
        assert_eq!(ctx["rows"][0]["actions"][1]["url"], "/things/n1/rename");
        assert_eq!(ctx["table_actions"][1]["value"], "things__delete");
        assert_eq!(ctx["is_empty"], false);
    }

    #[test]
    fn delete_messages_pick_noun() {
        let d = Action::delete("Network", "Networks");
        assert_eq!(d.success_message(&["a".into()]), "Deleted Network: a");
        assert_eq!(d.success_message(&["a".into(), "b".into()]), "Deleted Networks: a, b");
        assert_eq!(d.failure_message(&["a".into()]), "Unable to delete Network: a");
    }
}
