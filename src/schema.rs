//! Field schema of a report template.
//!
//! Schemas are stored as free-form JSON and may be hand-written, so reading
//! one never fails: entries that cannot produce a usable field are dropped.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Input kind of a template field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Textarea,
    Number,
    Date,
    Select,
    Checkbox,
}

impl FieldType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "textarea" => Some(Self::Textarea),
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "select" => Some(Self::Select),
            "checkbox" => Some(Self::Checkbox),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Number => "number",
            Self::Date => "date",
            Self::Select => "select",
            Self::Checkbox => "checkbox",
        }
    }
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help_text: String,
}

/// The ordered field list of a template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldsSchema {
    pub fields: Vec<FieldDef>,
}

impl FieldsSchema {
    /// Interpret a stored schema value.
    ///
    /// - anything but an object with a `fields` array yields no fields
    /// - entries without a name, with an unknown type, or `select` entries
    ///   without options are skipped
    /// - `label` defaults to the name, `type` to `text`
    /// - checkboxes are never required
    pub fn from_value(value: &Value) -> Self {
        let entries = match value.get("fields").and_then(Value::as_array) {
            Some(entries) => entries,
            None => return Self::default(),
        };

        let fields = entries.iter().filter_map(parse_entry).collect();
        Self { fields }
    }

    pub fn to_value(&self) -> Value {
        json!({ "fields": self.fields })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn parse_entry(entry: &Value) -> Option<FieldDef> {
    let name = entry.get("name").and_then(Value::as_str)?.trim();
    if name.is_empty() {
        return None;
    }

    let type_str = entry.get("type").and_then(Value::as_str).unwrap_or("text");
    let field_type = match FieldType::parse(type_str) {
        Some(t) => t,
        None => {
            log::warn!("Skipping field '{name}': unknown type '{type_str}'");
            return None;
        }
    };

    let options: Vec<String> = entry
        .get("options")
        .and_then(Value::as_array)
        .map(|opts| opts.iter().filter_map(option_text).collect())
        .unwrap_or_default();
    if field_type == FieldType::Select && options.is_empty() {
        log::warn!("Skipping select field '{name}': no options");
        return None;
    }

    let label = entry
        .get("label")
        .and_then(Value::as_str)
        .filter(|l| !l.is_empty())
        .unwrap_or(name)
        .to_string();

    let required = field_type != FieldType::Checkbox
        && entry.get("required").and_then(Value::as_bool).unwrap_or(false);

    Some(FieldDef {
        name: name.to_string(),
        label,
        field_type,
        required,
        options,
        help_text: entry
            .get("help_text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// Options may be written as strings or bare numbers.
fn option_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
