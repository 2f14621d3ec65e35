//! Form builder: declarative field lists that validate submitted values and
//! render themselves as HTML widgets.
//!
//! The same machinery drives the per-template report form (built from the
//! template's [`FieldsSchema`]) and the fixed record forms for templates,
//! categories, specialties, clinics and dentists.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde_json::{Map, Number, Value};

use crate::models::{DentalClinic, Id, ReportTemplate, Specialty, TemplateCategory};
use crate::schema::{FieldType, FieldsSchema};

/// Submitted values, keyed by field name.
pub type FormData = HashMap<String, String>;

/// Validated values, keyed by field name.
pub type CleanedData = Map<String, Value>;

const MSG_REQUIRED: &str = "Este campo es obligatorio.";
const MSG_NUMBER: &str = "Introduzca un número.";
const MSG_DATE: &str = "Introduzca una fecha válida.";
const MSG_EMAIL: &str = "Introduzca una dirección de correo electrónico válida.";
const MSG_URL: &str = "Introduzca una URL válida.";
const MSG_MODEL_CHOICE: &str = "Escoja una opción válida. Esa opción no está entre las disponibles.";
const MSG_INVALID_JSON: &str = "Formato JSON inválido para los campos del formulario";

/// Accepted date input formats; the first is also the storage format.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d/%m/%y"];

// ---------------------------------------------------------------------------
// Field definitions
// ---------------------------------------------------------------------------

/// How a text value is entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Widget {
    TextInput,
    Textarea { rows: u32 },
    Hidden,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Char(Widget),
    Float,
    Date,
    Choice(Vec<String>),
    Boolean,
    Email,
    Url,
    /// Reference to another record, offered as `(id, label)` pairs.
    ModelChoice(Vec<(Id, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub help_text: String,
    pub max_length: Option<usize>,
}

impl FormField {
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            required: false,
            help_text: String::new(),
            max_length: None,
        }
    }

    pub fn text(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(name, label, FieldKind::Char(Widget::TextInput))
    }

    pub fn textarea(name: impl Into<String>, label: impl Into<String>, rows: u32) -> Self {
        Self::new(name, label, FieldKind::Char(Widget::Textarea { rows }))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help_text = text.into();
        self
    }

    fn html_id(&self) -> String {
        format!("id_{}", self.name)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Validation messages per field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(" "))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Form
// ---------------------------------------------------------------------------

/// An ordered list of fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Form {
    pub fields: Vec<FormField>,
}

impl Form {
    pub fn new(fields: Vec<FormField>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate `data` against every field. Either all fields clean, or the
    /// full set of messages is returned.
    pub fn clean(&self, data: &FormData) -> Result<CleanedData, FormErrors> {
        let mut cleaned = CleanedData::new();
        let mut errors = FormErrors::default();

        for field in &self.fields {
            let raw = data.get(&field.name).map(|s| s.trim()).unwrap_or("");
            match clean_field(field, raw) {
                Ok(value) => {
                    cleaned.insert(field.name.clone(), value);
                }
                Err(message) => errors.add(&field.name, message),
            }
        }

        if errors.is_empty() {
            Ok(cleaned)
        } else {
            Err(errors)
        }
    }

    /// Render all widgets, pre-filled from `data`, with any error lists.
    pub fn render_html(&self, data: &FormData, errors: Option<&FormErrors>) -> String {
        let mut html = String::new();
        for field in &self.fields {
            let value = data.get(&field.name).map(String::as_str).unwrap_or("");
            let field_errors = errors.map(|e| e.get(&field.name)).unwrap_or(&[]);
            render_field(&mut html, field, value, field_errors);
        }
        html
    }
}

fn clean_field(field: &FormField, raw: &str) -> Result<Value, String> {
    if field.kind == FieldKind::Boolean {
        let checked = !matches!(
            raw.to_ascii_lowercase().as_str(),
            "" | "false" | "0" | "off"
        );
        if field.required && !checked {
            return Err(MSG_REQUIRED.to_string());
        }
        return Ok(Value::Bool(checked));
    }

    if raw.is_empty() {
        if field.required {
            return Err(MSG_REQUIRED.to_string());
        }
        return Ok(match field.kind {
            FieldKind::Char(_) | FieldKind::Email | FieldKind::Url => Value::String(String::new()),
            _ => Value::Null,
        });
    }

    if let Some(max) = field.max_length {
        let len = raw.chars().count();
        if len > max {
            return Err(format!(
                "Asegúrese de que este valor tenga como máximo {max} caracteres (tiene {len})."
            ));
        }
    }

    match &field.kind {
        FieldKind::Char(_) => Ok(Value::String(raw.to_string())),
        FieldKind::Float => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| MSG_NUMBER.to_string()),
        FieldKind::Date => parse_date(raw)
            .map(|d| Value::String(d.format(DATE_FORMATS[0]).to_string()))
            .ok_or_else(|| MSG_DATE.to_string()),
        FieldKind::Choice(options) => {
            if options.iter().any(|o| o == raw) {
                Ok(Value::String(raw.to_string()))
            } else {
                Err(format!(
                    "Escoja una opción válida. {raw} no es una de las opciones disponibles."
                ))
            }
        }
        FieldKind::Email => lettre::Address::from_str(raw)
            .map(|_| Value::String(raw.to_string()))
            .map_err(|_| MSG_EMAIL.to_string()),
        FieldKind::Url => normalize_url(raw)
            .map(Value::String)
            .ok_or_else(|| MSG_URL.to_string()),
        FieldKind::ModelChoice(choices) => raw
            .parse::<Id>()
            .ok()
            .filter(|id| choices.iter().any(|(c, _)| c == id))
            .map(|id| Value::Number(id.into()))
            .ok_or_else(|| MSG_MODEL_CHOICE.to_string()),
        FieldKind::Boolean => unreachable!("handled above"),
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Accept bare host names by assuming `http://`.
fn normalize_url(raw: &str) -> Option<String> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    let parsed = url::Url::parse(&candidate).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    Some(candidate)
}

// ---------------------------------------------------------------------------
// HTML rendering
// ---------------------------------------------------------------------------

fn esc(s: &str) -> String {
    tera::escape_html(s)
}

fn render_field(html: &mut String, field: &FormField, value: &str, errors: &[String]) {
    let id = field.html_id();
    let name = esc(&field.name);

    if field.kind == FieldKind::Char(Widget::Hidden) {
        html.push_str(&format!(
            "<input type=\"hidden\" name=\"{name}\" id=\"{id}\" value=\"{}\">\n",
            esc(value)
        ));
        return;
    }

    html.push_str("<div class=\"form-field\">\n");
    if !errors.is_empty() {
        html.push_str("<ul class=\"errorlist\">");
        for e in errors {
            html.push_str(&format!("<li>{}</li>", esc(e)));
        }
        html.push_str("</ul>\n");
    }
    html.push_str(&format!(
        "<label for=\"{id}\">{}:</label>\n",
        esc(&field.label)
    ));

    let required = if field.required { " required" } else { "" };
    let maxlength = field
        .max_length
        .map(|n| format!(" maxlength=\"{n}\""))
        .unwrap_or_default();

    match &field.kind {
        FieldKind::Char(Widget::Textarea { rows }) => {
            html.push_str(&format!(
                "<textarea name=\"{name}\" id=\"{id}\" rows=\"{rows}\"{maxlength}{required}>{}</textarea>",
                esc(value)
            ));
        }
        FieldKind::Char(_) => input(html, "text", &name, &id, value, &format!("{maxlength}{required}")),
        FieldKind::Float => input(html, "number", &name, &id, value, &format!(" step=\"any\"{required}")),
        FieldKind::Date => input(html, "date", &name, &id, value, required),
        FieldKind::Email => input(html, "email", &name, &id, value, &format!("{maxlength}{required}")),
        FieldKind::Url => input(html, "url", &name, &id, value, &format!("{maxlength}{required}")),
        FieldKind::Boolean => {
            let checked = !matches!(value.to_ascii_lowercase().as_str(), "" | "false" | "0" | "off");
            html.push_str(&format!(
                "<input type=\"checkbox\" name=\"{name}\" id=\"{id}\"{}>",
                if checked { " checked" } else { "" }
            ));
        }
        FieldKind::Choice(options) => {
            let choices: Vec<(String, String)> =
                options.iter().map(|o| (o.clone(), o.clone())).collect();
            select(html, &name, &id, value, &choices, required, false);
        }
        FieldKind::ModelChoice(choices) => {
            let choices: Vec<(String, String)> = choices
                .iter()
                .map(|(id, label)| (id.to_string(), label.clone()))
                .collect();
            select(html, &name, &id, value, &choices, required, true);
        }
    }
    html.push('\n');

    if !field.help_text.is_empty() {
        html.push_str(&format!(
            "<span class=\"helptext\">{}</span>\n",
            esc(&field.help_text)
        ));
    }
    html.push_str("</div>\n");
}

fn input(html: &mut String, input_type: &str, name: &str, id: &str, value: &str, extra: &str) {
    html.push_str(&format!(
        "<input type=\"{input_type}\" name=\"{name}\" id=\"{id}\" value=\"{}\"{extra}>",
        esc(value)
    ));
}

fn select(
    html: &mut String,
    name: &str,
    id: &str,
    value: &str,
    choices: &[(String, String)],
    required: &str,
    blank: bool,
) {
    html.push_str(&format!("<select name=\"{name}\" id=\"{id}\"{required}>"));
    if blank {
        html.push_str("<option value=\"\">---------</option>");
    }
    for (v, label) in choices {
        let selected = if v == value { " selected" } else { "" };
        html.push_str(&format!(
            "<option value=\"{}\"{selected}>{}</option>",
            esc(v),
            esc(label)
        ));
    }
    html.push_str("</select>");
}

// ---------------------------------------------------------------------------
// Report form
// ---------------------------------------------------------------------------

/// Build the form a user fills in to generate a report from `template`.
///
/// Patient and doctor names always come first; the template's schema
/// contributes the rest.
pub fn dynamic_report_form(template: &ReportTemplate) -> Form {
    let mut fields = vec![
        FormField::text("patient_name", "Nombre del paciente").required(),
        FormField::text("doctor_name", "Nombre del doctor").required(),
    ];

    let schema = FieldsSchema::from_value(&template.fields_schema);
    for def in schema.fields {
        let kind = match def.field_type {
            FieldType::Text => FieldKind::Char(Widget::TextInput),
            FieldType::Textarea => FieldKind::Char(Widget::Textarea { rows: 3 }),
            FieldType::Number => FieldKind::Float,
            FieldType::Date => FieldKind::Date,
            FieldType::Select => FieldKind::Choice(def.options),
            FieldType::Checkbox => FieldKind::Boolean,
        };
        let mut field = FormField::new(def.name, def.label, kind).help(def.help_text);
        field.required = def.required;
        fields.push(field);
    }

    Form::new(fields)
}

// ---------------------------------------------------------------------------
// Record forms
// ---------------------------------------------------------------------------

/// Validated template fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateInput {
    pub name: String,
    pub category: Option<Id>,
    pub specialty: Option<Id>,
    pub description: String,
    pub html_content: String,
    pub fields_schema: Value,
    pub is_active: bool,
    pub is_public: bool,
}

pub fn template_form(categories: &[TemplateCategory], specialties: &[Specialty]) -> Form {
    let category_choices = categories.iter().map(|c| (c.id, c.name.clone())).collect();
    let specialty_choices = specialties.iter().map(|s| (s.id, s.name.clone())).collect();
    Form::new(vec![
        FormField::text("name", "Nombre").required().max_length(100),
        FormField::new("category", "Categoría", FieldKind::ModelChoice(category_choices)).required(),
        FormField::new("specialty", "Especialidad", FieldKind::ModelChoice(specialty_choices)),
        FormField::textarea("description", "Descripción", 3),
        FormField::textarea("html_content", "Contenido HTML", 15)
            .required()
            .help("Contenido HTML con marcadores como {{paciente.nombre}}"),
        FormField::new("is_active", "Activo", FieldKind::Boolean),
        FormField::new("is_public", "Público", FieldKind::Boolean)
            .help("Si es accesible para todos los usuarios"),
        FormField::new("fields_json", "Esquema de Campos", FieldKind::Char(Widget::Hidden)),
    ])
}

/// Validate template data, including the JSON field schema.
pub fn clean_template(form: &Form, data: &FormData) -> Result<TemplateInput, FormErrors> {
    let cleaned = form.clean(data);
    let fields_json = data.get("fields_json").map(|s| s.trim()).unwrap_or("");
    let schema = if fields_json.is_empty() {
        Ok(Value::Object(Map::new()))
    } else {
        serde_json::from_str::<Value>(fields_json).map_err(|_| MSG_INVALID_JSON)
    };

    match (cleaned, schema) {
        (Ok(c), Ok(fields_schema)) => Ok(TemplateInput {
            name: text(&c, "name"),
            category: opt_id(&c, "category"),
            specialty: opt_id(&c, "specialty"),
            description: text(&c, "description"),
            html_content: text(&c, "html_content"),
            fields_schema,
            is_active: flag(&c, "is_active"),
            is_public: flag(&c, "is_public"),
        }),
        (cleaned, schema) => {
            let mut errors = cleaned.err().unwrap_or_default();
            if let Err(msg) = schema {
                errors.add("fields_json", msg);
            }
            Err(errors)
        }
    }
}

pub fn template_initial(t: &ReportTemplate) -> FormData {
    let mut data = FormData::new();
    data.insert("name".into(), t.name.clone());
    data.insert("category".into(), id_text(t.category));
    data.insert("specialty".into(), id_text(t.specialty));
    data.insert("description".into(), t.description.clone());
    data.insert("html_content".into(), t.html_content.clone());
    data.insert("is_active".into(), bool_text(t.is_active));
    data.insert("is_public".into(), bool_text(t.is_public));
    data.insert("fields_json".into(), t.fields_schema.to_string());
    data
}

/// Name + description, shared by categories and specialties.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedInput {
    pub name: String,
    pub description: String,
}

pub fn category_form() -> Form {
    Form::new(vec![
        FormField::text("name", "Nombre").required().max_length(100),
        FormField::textarea("description", "Descripción", 3),
    ])
}

pub fn specialty_form() -> Form {
    category_form()
}

pub fn clean_named(form: &Form, data: &FormData) -> Result<NamedInput, FormErrors> {
    let c = form.clean(data)?;
    Ok(NamedInput {
        name: text(&c, "name"),
        description: text(&c, "description"),
    })
}

pub fn category_initial(c: &TemplateCategory) -> FormData {
    named_initial(&c.name, &c.description)
}

pub fn specialty_initial(s: &Specialty) -> FormData {
    named_initial(&s.name, &s.description)
}

fn named_initial(name: &str, description: &str) -> FormData {
    let mut data = FormData::new();
    data.insert("name".into(), name.to_string());
    data.insert("description".into(), description.to_string());
    data
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClinicInput {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub website: String,
}

pub fn clinic_form() -> Form {
    Form::new(vec![
        FormField::text("name", "Nombre del gabinete").required().max_length(200),
        FormField::textarea("address", "Dirección", 3),
        FormField::text("phone", "Teléfono").max_length(20),
        FormField::new("email", "Email", FieldKind::Email).max_length(254),
        FormField::new("website", "Página web", FieldKind::Url).max_length(200),
    ])
}

pub fn clean_clinic(form: &Form, data: &FormData) -> Result<ClinicInput, FormErrors> {
    let c = form.clean(data)?;
    Ok(ClinicInput {
        name: text(&c, "name"),
        address: text(&c, "address"),
        phone: text(&c, "phone"),
        email: text(&c, "email"),
        website: text(&c, "website"),
    })
}

pub fn clinic_initial(c: &DentalClinic) -> FormData {
    let mut data = FormData::new();
    data.insert("name".into(), c.name.clone());
    data.insert("address".into(), c.address.clone());
    data.insert("phone".into(), c.phone.clone());
    data.insert("email".into(), c.email.clone());
    data.insert("website".into(), c.website.clone());
    data
}

#[derive(Debug, Clone, PartialEq)]
pub struct DentistInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub clinic: Option<Id>,
    pub notes: String,
    pub is_active: bool,
}

pub fn dentist_form(clinics: &[DentalClinic]) -> Form {
    let clinic_choices = clinics.iter().map(|c| (c.id, c.name.clone())).collect();
    Form::new(vec![
        FormField::text("first_name", "Nombre").required().max_length(100),
        FormField::text("last_name", "Apellidos").required().max_length(100),
        FormField::new("email", "Email", FieldKind::Email).required().max_length(254),
        FormField::text("phone", "Teléfono").max_length(20),
        FormField::textarea("address", "Dirección personal", 3),
        FormField::new("clinic", "Gabinete dental", FieldKind::ModelChoice(clinic_choices)),
        FormField::textarea("notes", "Notas", 3),
        FormField::new("is_active", "Activo", FieldKind::Boolean),
    ])
}

pub fn clean_dentist(form: &Form, data: &FormData) -> Result<DentistInput, FormErrors> {
    let c = form.clean(data)?;
    Ok(DentistInput {
        first_name: text(&c, "first_name"),
        last_name: text(&c, "last_name"),
        email: text(&c, "email"),
        phone: text(&c, "phone"),
        address: text(&c, "address"),
        clinic: opt_id(&c, "clinic"),
        notes: text(&c, "notes"),
        is_active: flag(&c, "is_active"),
    })
}

pub fn dentist_initial(d: &crate::models::DentistContact) -> FormData {
    let mut data = FormData::new();
    data.insert("first_name".into(), d.first_name.clone());
    data.insert("last_name".into(), d.last_name.clone());
    data.insert("email".into(), d.email.clone());
    data.insert("phone".into(), d.phone.clone());
    data.insert("address".into(), d.address.clone());
    data.insert("clinic".into(), id_text(d.clinic));
    data.insert("notes".into(), d.notes.clone());
    data.insert("is_active".into(), bool_text(d.is_active));
    data
}

// ---------------------------------------------------------------------------
// Cleaned-data accessors
// ---------------------------------------------------------------------------

fn text(c: &CleanedData, key: &str) -> String {
    c.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn opt_id(c: &CleanedData, key: &str) -> Option<Id> {
    c.get(key).and_then(Value::as_u64)
}

fn flag(c: &CleanedData, key: &str) -> bool {
    c.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn id_text(id: Option<Id>) -> String {
    id.map(|i| i.to_string()).unwrap_or_default()
}

fn bool_text(b: bool) -> String {
    if b { "on" } else { "" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn data(pairs: &[(&str, &str)]) -> FormData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn template_with(schema: Value) -> ReportTemplate {
        ReportTemplate {
            id: 1,
            name: "Endodoncia".to_string(),
            category: None,
            specialty: None,
            description: String::new(),
            html_content: String::new(),
            fields_schema: schema,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            is_active: true,
            is_public: false,
        }
    }

    fn full_schema() -> Value {
        json!({"fields": [
            {"name": "diente", "type": "text", "required": true},
            {"name": "notas", "type": "textarea"},
            {"name": "revision", "type": "number"},
            {"name": "cita", "type": "date"},
            {"name": "cirugia", "type": "select", "options": ["No", "Sí"], "required": true},
            {"name": "urgente", "type": "checkbox"}
        ]})
    }

    #[test]
    fn report_form_starts_with_patient_and_doctor() {
        let form = dynamic_report_form(&template_with(full_schema()));
        let names: Vec<_> = form.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["patient_name", "doctor_name", "diente", "notas", "revision", "cita", "cirugia", "urgente"]
        );
    }

    #[test]
    fn report_form_cleans_typed_values() {
        let form = dynamic_report_form(&template_with(full_schema()));
        let cleaned = form
            .clean(&data(&[
                ("patient_name", "  Juan Pérez "),
                ("doctor_name", "Laura"),
                ("diente", "36"),
                ("revision", "4"),
                ("cita", "22/05/2025"),
                ("cirugia", "Sí"),
                ("urgente", "on"),
            ]))
            .unwrap();

        assert_eq!(cleaned["patient_name"], json!("Juan Pérez"));
        assert_eq!(cleaned["notas"], json!(""));
        assert_eq!(cleaned["revision"], json!(4.0));
        assert_eq!(cleaned["cita"], json!("2025-05-22"));
        assert_eq!(cleaned["cirugia"], json!("Sí"));
        assert_eq!(cleaned["urgente"], json!(true));
    }

    #[test]
    fn optional_empty_number_and_date_are_null() {
        let form = dynamic_report_form(&template_with(full_schema()));
        let cleaned = form
            .clean(&data(&[
                ("patient_name", "Juan"),
                ("doctor_name", "Laura"),
                ("diente", "11"),
                ("cirugia", "No"),
            ]))
            .unwrap();
        assert_eq!(cleaned["revision"], Value::Null);
        assert_eq!(cleaned["cita"], Value::Null);
        assert_eq!(cleaned["urgente"], json!(false));
    }

    #[test]
    fn collects_every_error() {
        let form = dynamic_report_form(&template_with(full_schema()));
        let errors = form
            .clean(&data(&[
                ("doctor_name", "Laura"),
                ("diente", "11"),
                ("revision", "four"),
                ("cita", "2025-13-40"),
                ("cirugia", "Quizás"),
            ]))
            .unwrap_err();

        assert_eq!(errors.get("patient_name"), [MSG_REQUIRED.to_string()]);
        assert_eq!(errors.get("revision"), [MSG_NUMBER.to_string()]);
        assert_eq!(errors.get("cita"), [MSG_DATE.to_string()]);
        assert!(errors.get("cirugia")[0].contains("Quizás no es una de las opciones"));
        assert!(errors.get("diente").is_empty());
    }

    #[test]
    fn max_length_is_enforced() {
        let form = Form::new(vec![FormField::text("phone", "Teléfono").max_length(5)]);
        let errors = form.clean(&data(&[("phone", "1234567")])).unwrap_err();
        assert!(errors.get("phone")[0].contains("como máximo 5 caracteres (tiene 7)"));
    }

    #[test]
    fn renders_widgets_per_type() {
        let form = dynamic_report_form(&template_with(full_schema()));
        let html = form.render_html(&data(&[("cirugia", "Sí"), ("urgente", "on")]), None);

        assert!(html.contains(r#"<input type="text" name="patient_name" id="id_patient_name" value="" required>"#));
        assert!(html.contains(r#"<textarea name="notas" id="id_notas" rows="3">"#));
        assert!(html.contains(r#"type="number" name="revision""#));
        assert!(html.contains(r#"type="date" name="cita""#));
        assert!(html.contains(r#"<option value="Sí" selected>Sí</option>"#));
        assert!(html.contains(r#"<input type="checkbox" name="urgente" id="id_urgente" checked>"#));
    }

    #[test]
    fn render_escapes_values_and_shows_errors() {
        let form = Form::new(vec![FormField::text("obs", "Observaciones").required()]);
        let mut errors = FormErrors::default();
        errors.add("obs", MSG_REQUIRED);
        let html = form.render_html(&data(&[("obs", "<b>x</b>")]), Some(&errors));
        assert!(html.contains("&lt;b&gt;x&lt;"));
        assert!(html.contains("<ul class=\"errorlist\"><li>Este campo es obligatorio.</li></ul>"));
    }

    #[test]
    fn template_form_rejects_invalid_json() {
        let categories = vec![TemplateCategory {
            id: 1,
            name: "General".into(),
            description: String::new(),
        }];
        let form = template_form(&categories, &[]);
        let errors = clean_template(
            &form,
            &data(&[
                ("name", "T"),
                ("category", "1"),
                ("html_content", "<p>x</p>"),
                ("fields_json", "{not json"),
            ]),
        )
        .unwrap_err();
        assert_eq!(errors.get("fields_json"), [MSG_INVALID_JSON.to_string()]);
    }

    #[test]
    fn template_form_requires_known_category() {
        let form = template_form(&[], &[]);
        let errors = clean_template(
            &form,
            &data(&[("name", "T"), ("category", "9"), ("html_content", "x")]),
        )
        .unwrap_err();
        assert_eq!(errors.get("category"), [MSG_MODEL_CHOICE.to_string()]);
    }

    #[test]
    fn template_form_empty_schema_is_object() {
        let categories = vec![TemplateCategory {
            id: 4,
            name: "General".into(),
            description: String::new(),
        }];
        let form = template_form(&categories, &[]);
        let input = clean_template(
            &form,
            &data(&[("name", "T"), ("category", "4"), ("html_content", "x"), ("is_active", "on")]),
        )
        .unwrap();
        assert_eq!(input.category, Some(4));
        assert_eq!(input.fields_schema, json!({}));
        assert!(input.is_active);
        assert!(!input.is_public);
    }

    #[test]
    fn clinic_form_validates_email_and_website() {
        let form = clinic_form();
        let errors = clean_clinic(
            &form,
            &data(&[("name", "Sonrisas"), ("email", "nope"), ("website", "ftp://x.org")]),
        )
        .unwrap_err();
        assert_eq!(errors.get("email"), [MSG_EMAIL.to_string()]);
        assert_eq!(errors.get("website"), [MSG_URL.to_string()]);

        let ok = clean_clinic(
            &form,
            &data(&[("name", "Sonrisas"), ("email", "info@sonrisas.es"), ("website", "sonrisas.es")]),
        )
        .unwrap();
        assert_eq!(ok.website, "http://sonrisas.es");
    }

    #[test]
    fn dentist_form_requires_email() {
        let form = dentist_form(&[]);
        let errors = clean_dentist(&form, &data(&[("first_name", "Ana"), ("last_name", "Ruiz")]))
            .unwrap_err();
        assert_eq!(errors.get("email"), [MSG_REQUIRED.to_string()]);
    }

    #[test]
    fn initial_data_cleans_back_to_same_record() {
        let clinic = DentalClinic {
            id: 2,
            name: "Centro".into(),
            address: "Calle 1".into(),
            phone: "600".into(),
            email: "c@centro.es".into(),
            website: "https://centro.es".into(),
        };
        let input = clean_clinic(&clinic_form(), &clinic_initial(&clinic)).unwrap();
        assert_eq!(input.name, "Centro");
        assert_eq!(input.website, "https://centro.es");
    }
}
