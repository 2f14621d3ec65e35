//! Record storage: every table in one JSON document.
//!
//! Each mutation rewrites the document through a temporary file renamed over
//! the original, so a crash never leaves a half-written store behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::*;

/// Rows of one record type plus the next id to hand out. Ids are never
/// reused, even after deletes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table<T> {
    next_id: Id,
    rows: Vec<T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: Vec::new(),
        }
    }
}

/// All tables of the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tables {
    categories: Table<TemplateCategory>,
    specialties: Table<Specialty>,
    templates: Table<ReportTemplate>,
    reports: Table<GeneratedReport>,
    clinics: Table<DentalClinic>,
    dentists: Table<DentistContact>,
}

/// A record type kept in the store.
pub trait Record: Clone + Serialize + DeserializeOwned {
    /// Name used in user-facing messages.
    const ENTITY: &'static str;

    fn id(&self) -> Id;
    fn set_id(&mut self, id: Id);
    fn table(tables: &Tables) -> &Table<Self>;
    fn table_mut(tables: &mut Tables) -> &mut Table<Self>;

    /// Verify that every id this record refers to exists.
    fn check_references(&self, _tables: &Tables) -> Result<()> {
        Ok(())
    }

    /// Clear references to a record of this type that is being deleted.
    fn on_delete(_id: Id, _tables: &mut Tables) {}
}

fn ensure_exists<T: Record>(tables: &Tables, id: Option<Id>) -> Result<()> {
    match id {
        Some(id) if !T::table(tables).rows.iter().any(|r| r.id() == id) => {
            Err(Error::reference(T::ENTITY, id))
        }
        _ => Ok(()),
    }
}

impl Record for TemplateCategory {
    const ENTITY: &'static str = "Categoría";

    fn id(&self) -> Id {
        self.id
    }
    fn set_id(&mut self, id: Id) {
        self.id = id;
    }
    fn table(tables: &Tables) -> &Table<Self> {
        &tables.categories
    }
    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.categories
    }

    fn on_delete(id: Id, tables: &mut Tables) {
        for t in tables.templates.rows.iter_mut() {
            if t.category == Some(id) {
                t.category = None;
            }
        }
    }
}

impl Record for Specialty {
    const ENTITY: &'static str = "Especialidad";

    fn id(&self) -> Id {
        self.id
    }
    fn set_id(&mut self, id: Id) {
        self.id = id;
    }
    fn table(tables: &Tables) -> &Table<Self> {
        &tables.specialties
    }
    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.specialties
    }

    fn on_delete(id: Id, tables: &mut Tables) {
        for t in tables.templates.rows.iter_mut() {
            if t.specialty == Some(id) {
                t.specialty = None;
            }
        }
    }
}

impl Record for ReportTemplate {
    const ENTITY: &'static str = "Plantilla";

    fn id(&self) -> Id {
        self.id
    }
    fn set_id(&mut self, id: Id) {
        self.id = id;
    }
    fn table(tables: &Tables) -> &Table<Self> {
        &tables.templates
    }
    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.templates
    }

    fn check_references(&self, tables: &Tables) -> Result<()> {
        ensure_exists::<TemplateCategory>(tables, self.category)?;
        ensure_exists::<Specialty>(tables, self.specialty)
    }

    fn on_delete(id: Id, tables: &mut Tables) {
        for r in tables.reports.rows.iter_mut() {
            if r.template == Some(id) {
                r.template = None;
            }
        }
    }
}

impl Record for GeneratedReport {
    const ENTITY: &'static str = "Informe";

    fn id(&self) -> Id {
        self.id
    }
    fn set_id(&mut self, id: Id) {
        self.id = id;
    }
    fn table(tables: &Tables) -> &Table<Self> {
        &tables.reports
    }
    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.reports
    }

    fn check_references(&self, tables: &Tables) -> Result<()> {
        ensure_exists::<ReportTemplate>(tables, self.template)
    }
}

impl Record for DentalClinic {
    const ENTITY: &'static str = "Clínica";

    fn id(&self) -> Id {
        self.id
    }
    fn set_id(&mut self, id: Id) {
        self.id = id;
    }
    fn table(tables: &Tables) -> &Table<Self> {
        &tables.clinics
    }
    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.clinics
    }

    fn on_delete(id: Id, tables: &mut Tables) {
        for d in tables.dentists.rows.iter_mut() {
            if d.clinic == Some(id) {
                d.clinic = None;
            }
        }
    }
}

impl Record for DentistContact {
    const ENTITY: &'static str = "Contacto";

    fn id(&self) -> Id {
        self.id
    }
    fn set_id(&mut self, id: Id) {
        self.id = id;
    }
    fn table(tables: &Tables) -> &Table<Self> {
        &tables.dentists
    }
    fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
        &mut tables.dentists
    }

    fn check_references(&self, tables: &Tables) -> Result<()> {
        ensure_exists::<DentalClinic>(tables, self.clinic)
    }
}

/// Filters for [`Store::reports`]. Empty fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub template: Option<Id>,
    /// Case-insensitive substring of the patient name.
    pub patient: Option<String>,
    pub created_by: Option<String>,
}

/// Counts and recent records for the home page.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub templates_count: usize,
    pub reports_count: usize,
    pub clinics_count: usize,
    pub dentists_count: usize,
    pub recent_templates: Vec<ReportTemplate>,
    pub recent_reports: Vec<GeneratedReport>,
}

/// The record store.
#[derive(Debug)]
pub struct Store {
    path: Option<PathBuf>,
    tables: Tables,
}

impl Store {
    /// Open the store at `path`, starting empty when the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let text = fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        } else {
            log::debug!("no store at '{}', starting empty", path.display());
            Tables::default()
        };
        Ok(Self {
            path: Some(path),
            tables,
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            tables: Tables::default(),
        }
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.tables)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    // -- generic CRUD -------------------------------------------------------

    pub fn get<T: Record>(&self, id: Id) -> Result<&T> {
        T::table(&self.tables)
            .rows
            .iter()
            .find(|r| r.id() == id)
            .ok_or_else(|| Error::not_found(T::ENTITY, id))
    }

    /// All rows in insertion order.
    pub fn all<T: Record>(&self) -> &[T] {
        &T::table(&self.tables).rows
    }

    /// Insert `row` under a fresh id, which is written into the returned copy.
    pub fn insert<T: Record>(&mut self, mut row: T) -> Result<T> {
        row.check_references(&self.tables)?;
        let table = T::table_mut(&mut self.tables);
        row.set_id(table.next_id);
        table.next_id += 1;
        table.rows.push(row.clone());
        self.persist()?;
        log::info!("created {} {}", T::ENTITY, row.id());
        Ok(row)
    }

    /// Replace the stored row with the same id.
    pub fn update<T: Record>(&mut self, row: T) -> Result<T> {
        row.check_references(&self.tables)?;
        let id = row.id();
        let slot = T::table_mut(&mut self.tables)
            .rows
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| Error::not_found(T::ENTITY, id))?;
        let previous = std::mem::replace(slot, row.clone());
        if let Err(e) = self.persist() {
            if let Some(slot) = T::table_mut(&mut self.tables)
                .rows
                .iter_mut()
                .find(|r| r.id() == id)
            {
                *slot = previous;
            }
            return Err(e);
        }
        Ok(row)
    }

    /// Delete a row, clearing references to it.
    pub fn delete<T: Record>(&mut self, id: Id) -> Result<T> {
        let rows = &mut T::table_mut(&mut self.tables).rows;
        let index = rows
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| Error::not_found(T::ENTITY, id))?;
        let removed = rows.remove(index);
        T::on_delete(id, &mut self.tables);
        self.persist()?;
        log::info!("deleted {} {}", T::ENTITY, id);
        Ok(removed)
    }

    // -- queries --------------------------------------------------------------

    pub fn category_by_name(&self, name: &str) -> Option<&TemplateCategory> {
        self.tables.categories.rows.iter().find(|c| c.name == name)
    }

    pub fn specialty_by_name(&self, name: &str) -> Option<&Specialty> {
        self.tables.specialties.rows.iter().find(|s| s.name == name)
    }

    pub fn template_by_name(&self, name: &str) -> Option<&ReportTemplate> {
        self.tables.templates.rows.iter().find(|t| t.name == name)
    }

    /// Categories by name, each with the number of templates in it.
    pub fn categories_with_counts(&self) -> Vec<(TemplateCategory, usize)> {
        let mut out: Vec<_> = self
            .tables
            .categories
            .rows
            .iter()
            .map(|c| {
                let count = self
                    .tables
                    .templates
                    .rows
                    .iter()
                    .filter(|t| t.category == Some(c.id))
                    .count();
                (c.clone(), count)
            })
            .collect();
        out.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        out
    }

    pub fn specialties(&self) -> Vec<Specialty> {
        sorted_by(&self.tables.specialties.rows, |s| s.name.clone())
    }

    pub fn categories(&self) -> Vec<TemplateCategory> {
        sorted_by(&self.tables.categories.rows, |c| c.name.clone())
    }

    /// Active templates, newest first, optionally in one category.
    pub fn active_templates(&self, category: Option<Id>) -> Vec<ReportTemplate> {
        let mut out: Vec<_> = self
            .tables
            .templates
            .rows
            .iter()
            .filter(|t| t.is_active && (category.is_none() || t.category == category))
            .cloned()
            .collect();
        out.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        out
    }

    /// Reports matching `filter`, newest first.
    pub fn reports(&self, filter: &ReportFilter) -> Vec<GeneratedReport> {
        let patient = filter.patient.as_ref().map(|p| p.to_lowercase());
        let mut out: Vec<_> = self
            .tables
            .reports
            .rows
            .iter()
            .filter(|r| filter.template.is_none() || r.template == filter.template)
            .filter(|r| {
                patient
                    .as_ref()
                    .map_or(true, |p| r.patient_name.to_lowercase().contains(p.as_str()))
            })
            .filter(|r| {
                filter.created_by.is_none() || r.created_by.as_deref() == filter.created_by.as_deref()
            })
            .cloned()
            .collect();
        newest_reports_first(&mut out);
        out
    }

    /// Most recent reports generated from a template.
    pub fn template_reports(&self, template: Id, limit: usize) -> Vec<GeneratedReport> {
        let filter = ReportFilter {
            template: Some(template),
            ..ReportFilter::default()
        };
        self.reports(&filter).into_iter().take(limit).collect()
    }

    pub fn clinics(&self) -> Vec<DentalClinic> {
        sorted_by(&self.tables.clinics.rows, |c| c.name.clone())
    }

    /// Dentists by last then first name, optionally of one clinic.
    pub fn dentists(&self, clinic: Option<Id>) -> Vec<DentistContact> {
        let rows: Vec<_> = self
            .tables
            .dentists
            .rows
            .iter()
            .filter(|d| clinic.is_none() || d.clinic == clinic)
            .cloned()
            .collect();
        sorted_by(&rows, |d| (d.last_name.clone(), d.first_name.clone()))
    }

    pub fn active_dentists(&self) -> Vec<DentistContact> {
        self.dentists(None)
            .into_iter()
            .filter(|d| d.is_active)
            .collect()
    }

    pub fn dashboard(&self) -> Dashboard {
        let mut recent_reports = self.tables.reports.rows.clone();
        newest_reports_first(&mut recent_reports);
        recent_reports.truncate(5);

        Dashboard {
            templates_count: self.tables.templates.rows.len(),
            reports_count: self.tables.reports.rows.len(),
            clinics_count: self.tables.clinics.rows.len(),
            dentists_count: self.tables.dentists.rows.len(),
            recent_templates: self.active_templates(None).into_iter().take(5).collect(),
            recent_reports,
        }
    }
}

fn sorted_by<T: Clone, K: Ord>(rows: &[T], key: impl Fn(&T) -> K) -> Vec<T> {
    let mut out = rows.to_vec();
    out.sort_by_key(|r| key(r));
    out
}

fn newest_reports_first(reports: &mut [GeneratedReport]) {
    reports.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
}
