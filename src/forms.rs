//! Declarative forms.
//!
//! A [`FormSpec`] lists its fields once; the same description drives validation of
//! posted data and the generic `form` template partial. Pages that host several
//! forms tell them apart by the hidden `method` field, which carries the form name.

use std::collections::{BTreeMap, HashMap};

use serde_json::{json, Value};

pub const METHOD_FIELD: &str = "method";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Widget {
    Text,
    Password,
    Hidden,
    ReadOnly,
    Select,
    Number,
}

impl Widget {
    fn as_str(&self) -> &'static str {
        match self {
            Widget::Text => "text",
            Widget::Password => "password",
            Widget::Hidden => "hidden",
            Widget::ReadOnly => "readonly",
            Widget::Select => "select",
            Widget::Number => "number",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Char { max_length: Option<usize> },
    Integer { min: Option<i64>, max: Option<i64> },
    /// (value, label) pairs.
    Choice(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub widget: Widget,
    pub required: bool,
}

impl Field {
    pub fn char(name: &'static str, label: &'static str) -> Self {
        Self { name, label, kind: FieldKind::Char { max_length: None }, widget: Widget::Text, required: true }
    }

    pub fn integer(name: &'static str, label: &'static str) -> Self {
        Self { name, label, kind: FieldKind::Integer { min: None, max: None }, widget: Widget::Number, required: true }
    }

    pub fn choice(name: &'static str, label: &'static str, choices: Vec<(String, String)>) -> Self {
        Self { name, label, kind: FieldKind::Choice(choices), widget: Widget::Select, required: true }
    }

    pub fn widget(mut self, widget: Widget) -> Self {
        self.widget = widget;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        if let FieldKind::Char { max_length } = &mut self.kind {
            *max_length = Some(n);
        }
        self
    }

    pub fn range(mut self, lo: i64, hi: i64) -> Self {
        if let FieldKind::Integer { min, max } = &mut self.kind {
            *min = Some(lo);
            *max = Some(hi);
        }
        self
    }

    fn clean(&self, raw: Option<&str>) -> Result<Option<String>, String> {
        // passwords are taken verbatim
        let value = match (raw, self.widget) {
            (Some(v), Widget::Password) => v.to_string(),
            (Some(v), _) => v.trim().to_string(),
            (None, _) => String::new(),
        };
        if value.is_empty() {
            return if self.required { Err("This field is required.".to_string()) } else { Ok(None) };
        }
        match &self.kind {
            FieldKind::Char { max_length: Some(n) } => {
                let len = value.chars().count();
                if len > *n {
                    return Err(format!("Ensure this value has at most {} characters (it has {}).", n, len));
                }
            }
            FieldKind::Char { max_length: None } => {}
            FieldKind::Integer { min, max } => {
                let parsed: i64 = value.parse().map_err(|_| "Enter a whole number.".to_string())?;
                if let Some(lo) = min {
                    if parsed < *lo {
                        return Err(format!("Ensure this value is greater than or equal to {}.", lo));
                    }
                }
                if let Some(hi) = max {
                    if parsed > *hi {
                        return Err(format!("Ensure this value is less than or equal to {}.", hi));
                    }
                }
                return Ok(Some(parsed.to_string()));
            }
            FieldKind::Choice(choices) => {
                if !choices.iter().any(|(v, _)| v == &value) {
                    return Err(format!("Select a valid choice. {} is not one of the available choices.", value));
                }
            }
        }
        Ok(Some(value))
    }
}

/// Validated values keyed by field name. Optional fields left blank are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanedData(HashMap<String, String>);

impl CleanedData {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }

    /// Value of a field declared required; empty string if it is somehow missing.
    pub fn str(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.parse().ok())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    pub fields: BTreeMap<String, Vec<String>>,
    pub non_field: Vec<String>,
}

impl FormErrors {
    pub fn is_empty(&self) -> bool { self.fields.is_empty() && self.non_field.is_empty() }

    pub fn add(&mut self, field: &str, msg: impl Into<String>) {
        self.fields.entry(field.to_string()).or_default().push(msg.into());
    }

    pub fn add_non_field(&mut self, msg: impl Into<String>) {
        self.non_field.push(msg.into());
    }
}

#[derive(Debug, Clone)]
pub struct FormSpec {
    /// Identifies the form in posted data (`method` field) and in the page.
    pub name: &'static str,
    pub title: &'static str,
    pub submit_label: &'static str,
    pub fields: Vec<Field>,
}

impl FormSpec {
    pub fn new(name: &'static str, title: &'static str, submit_label: &'static str) -> Self {
        Self { name, title, submit_label, fields: Vec::new() }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get_field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// Whether a posted body was meant for this form.
    pub fn is_submitted(&self, data: &HashMap<String, String>) -> bool {
        data.get(METHOD_FIELD).map(|m| m == self.name).unwrap_or(false)
    }

    pub fn validate(&self, data: &HashMap<String, String>) -> Result<CleanedData, FormErrors> {
        let mut cleaned = HashMap::new();
        let mut errors = FormErrors::default();
        for field in &self.fields {
            match field.clean(data.get(field.name).map(|s| s.as_str())) {
                Ok(Some(v)) => { cleaned.insert(field.name.to_string(), v); }
                Ok(None) => {}
                Err(msg) => errors.add(field.name, msg),
            }
        }
        if errors.is_empty() { Ok(CleanedData(cleaned)) } else { Err(errors) }
    }

    /// Template context for the `form` partial. Password values are never echoed.
    pub fn context(&self, values: &HashMap<String, String>, errors: Option<&FormErrors>) -> Value {
        let fields: Vec<Value> = self
            .fields
            .iter()
            .map(|f| {
                let value = if f.widget == Widget::Password {
                    String::new()
                } else {
                    values.get(f.name).cloned().unwrap_or_default()
                };
                let choices: Vec<Value> = match &f.kind {
                    FieldKind::Choice(c) => c
                        .iter()
                        .map(|(v, l)| json!({"value": v, "label": l, "selected": v == &value}))
                        .collect(),
                    _ => Vec::new(),
                };
                let field_errors = errors.and_then(|e| e.fields.get(f.name)).cloned().unwrap_or_default();
                json!({
                    "name": f.name,
                    "label": f.label,
                    "widget": f.widget.as_str(),
                    "is_hidden": f.widget == Widget::Hidden,
                    "is_password": f.widget == Widget::Password,
                    "is_readonly": f.widget == Widget::ReadOnly,
                    "is_select": f.widget == Widget::Select,
                    "is_number": f.widget == Widget::Number,
                    "required": f.required,
                    "value": value,
                    "choices": choices,
                    "errors": field_errors,
                })
            })
            .collect();
        json!({
            "name": self.name,
            "title": self.title,
            "submit_label": self.submit_label,
            "fields": fields,
            "non_field_errors": errors.map(|e| e.non_field.clone()).unwrap_or_default(),
        })
    }
}
