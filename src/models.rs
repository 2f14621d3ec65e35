//! Record types for templates, generated reports, clinics and contacts.
//!
//! Relations are stored as ids; the store enforces that referenced ids exist
//! and clears them when the referenced record is deleted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Record identifier, assigned by the store starting at 1.
pub type Id = u64;

/// The acting user of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub is_superuser: bool,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_superuser: false,
        }
    }

    pub fn superuser(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_superuser: true,
        }
    }

    /// Whether this user may act on a record created by `owner`.
    pub fn can_manage(&self, owner: Option<&str>) -> bool {
        self.is_superuser || owner == Some(self.username.as_str())
    }
}

/// Groups templates, e.g. "Endodoncia" or "Periodoncia".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateCategory {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Dental specialty a template belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specialty {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A report layout with `{{ placeholders }}` plus the schema of the fields
/// that fill them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTemplate {
    pub id: Id,
    pub name: String,
    pub category: Option<Id>,
    pub specialty: Option<Id>,
    #[serde(default)]
    pub description: String,
    pub html_content: String,
    /// `{ "fields": [ { "name", "label", "type", ... } ] }`, see
    /// [`crate::schema::FieldsSchema`].
    #[serde(default = "empty_object")]
    pub fields_schema: Value,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_public: bool,
}

/// A filled-in template: the captured values, the rendered HTML and, when
/// conversion succeeded, the stored PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedReport {
    pub id: Id,
    pub template: Option<Id>,
    pub patient_name: String,
    pub doctor_name: String,
    pub title: String,
    pub report_content: String,
    pub form_data: Value,
    /// Path relative to the media root.
    pub pdf_file: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DentalClinic {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub website: String,
}

/// A referring dentist, optionally attached to a clinic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DentistContact {
    pub id: Id,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    pub clinic: Option<Id>,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl DentistContact {
    pub fn full_name(&self) -> String {
        format!("Dr. {} {}", self.first_name, self.last_name)
    }
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl fmt::Display for TemplateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Display for Specialty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Display for ReportTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Display for GeneratedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (v{})", self.title, self.version)
    }
}

impl fmt::Display for DentalClinic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Display for DentistContact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dentist() -> DentistContact {
        DentistContact {
            id: 1,
            first_name: "Laura".to_string(),
            last_name: "Martínez".to_string(),
            email: "laura@example.com".to_string(),
            phone: String::new(),
            address: String::new(),
            clinic: None,
            notes: String::new(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn dentist_display_uses_title() {
        assert_eq!(dentist().to_string(), "Dr. Laura Martínez");
    }

    #[test]
    fn report_display_includes_version() {
        let report = GeneratedReport {
            id: 3,
            template: None,
            patient_name: "Juan".to_string(),
            doctor_name: "Ana".to_string(),
            title: "Informe para Juan".to_string(),
            report_content: String::new(),
            form_data: Value::Null,
            pdf_file: None,
            created_by: None,
            created_at: Utc::now(),
            version: 2,
        };
        assert_eq!(report.to_string(), "Informe para Juan (v2)");
    }

    #[test]
    fn missing_flags_deserialize_to_defaults() {
        let json = r#"{
            "id": 1, "first_name": "A", "last_name": "B", "email": "a@b.c",
            "clinic": null, "created_at": "2025-05-08T10:00:00Z"
        }"#;
        let d: DentistContact = serde_json::from_str(json).unwrap();
        assert!(d.is_active);
        assert!(d.notes.is_empty());
    }

    #[test]
    fn ownership_rules() {
        let owner = User::new("ana");
        let other = User::new("luis");
        let admin = User::superuser("root");
        assert!(owner.can_manage(Some("ana")));
        assert!(!other.can_manage(Some("ana")));
        assert!(!other.can_manage(None));
        assert!(admin.can_manage(None));
    }
}
