//! Operations of the report application.
//!
//! Every operation takes the acting [`User`]. Successful mutations return a
//! [`Flash`] carrying the record and the message shown to the user; failures
//! are [`Error`]s whose `Display` text is that message.

use chrono::Utc;
use serde_json::Value;

use crate::config::{AppConfig, PdfSettings};
use crate::defaults::{self, SeedReport};
use crate::document::wrap_report_html;
use crate::error::{Error, Result};
use crate::forms::{
    self, category_form, clean_clinic, clean_dentist, clean_named, clean_template, clinic_form,
    dentist_form, dynamic_report_form, specialty_form, template_form, Form, FormData,
};
use crate::mail::{Mailer, ReportEmail};
use crate::media::{file_name_component, MediaStore};
use crate::models::*;
use crate::pipeline::generate_pdf;
use crate::store::{Dashboard, ReportFilter, Store};
use crate::templating::{build_context, render_template};

/// Number of reports shown on a template's detail page.
const TEMPLATE_DETAIL_REPORTS: usize = 5;

/// Outcome of a successful operation.
#[derive(Debug, Clone)]
pub struct Flash<T> {
    pub value: T,
    pub message: String,
}

impl<T> Flash<T> {
    fn new(value: T, message: impl Into<String>) -> Self {
        Self {
            value,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplateList {
    pub templates: Vec<ReportTemplate>,
    /// Every category with its number of templates.
    pub categories: Vec<(TemplateCategory, usize)>,
    pub selected: Option<TemplateCategory>,
}

#[derive(Debug, Clone)]
pub struct TemplateDetail {
    pub template: ReportTemplate,
    pub category: Option<TemplateCategory>,
    pub specialty: Option<Specialty>,
    pub recent_reports: Vec<GeneratedReport>,
}

/// Template saved from the visual block editor.
#[derive(Debug, Clone, Default)]
pub struct TemplateDraft {
    /// Template to update; a new one is created when `None`.
    pub template_id: Option<Id>,
    pub name: String,
    pub category: Option<Id>,
    pub specialty: Option<Id>,
    /// Editor blocks, each an object with an HTML `content`.
    pub blocks: Vec<Value>,
    /// Field schema; left untouched when `None`.
    pub fields: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ReportDetail {
    pub report: GeneratedReport,
    pub template_name: Option<String>,
    /// Active dentists the report can be sent to.
    pub recipients: Vec<DentistContact>,
}

/// PDF bytes of a report and the name to serve them under.
#[derive(Debug, Clone)]
pub struct PdfDownload {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// `true` when served from the stored file, `false` when generated on the
    /// fly for inline display.
    pub stored: bool,
}

#[derive(Debug, Clone)]
pub struct ClinicDetail {
    pub clinic: DentalClinic,
    pub dentists: Vec<DentistContact>,
}

#[derive(Debug, Clone)]
pub struct DentistList {
    pub dentists: Vec<DentistContact>,
    pub clinics: Vec<DentalClinic>,
    pub selected: Option<DentalClinic>,
}

#[derive(Debug, Clone)]
pub struct DentistDetail {
    pub dentist: DentistContact,
    pub clinic: Option<DentalClinic>,
}

/// The application: records, generated files, PDF settings and mail.
pub struct App {
    store: Store,
    media: MediaStore,
    pdf: PdfSettings,
    mailer: Mailer,
}

impl App {
    pub fn new(store: Store, media: MediaStore, config: &AppConfig) -> Self {
        Self {
            store,
            media,
            pdf: config.pdf.clone(),
            mailer: Mailer::new(config.mail.clone()),
        }
    }

    /// Open the store and media root named by `config`.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let store = Store::open(config.store_path())?;
        let media = MediaStore::new(&config.media_dir);
        Ok(Self::new(store, media, config))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    pub fn home(&self, _user: &User) -> Dashboard {
        self.store.dashboard()
    }

    pub fn seed_defaults(&mut self, user: &User) -> Result<Flash<SeedReport>> {
        let owner = user.is_superuser.then_some(user.username.as_str());
        let report = defaults::seed(&mut self.store, owner)?;
        let message = if report.is_empty() {
            "Los datos predeterminados ya existían.".to_string()
        } else {
            report.lines().join("\n")
        };
        Ok(Flash::new(report, message))
    }

    // -- templates ------------------------------------------------------------

    pub fn list_templates(&self, _user: &User, category: Option<Id>) -> Result<TemplateList> {
        let selected = match category {
            Some(id) => Some(self.store.get::<TemplateCategory>(id)?.clone()),
            None => None,
        };
        Ok(TemplateList {
            templates: self.store.active_templates(category),
            categories: self.store.categories_with_counts(),
            selected,
        })
    }

    pub fn template_detail(&self, _user: &User, id: Id) -> Result<TemplateDetail> {
        let template = self.store.get::<ReportTemplate>(id)?.clone();
        Ok(TemplateDetail {
            category: self.lookup::<TemplateCategory>(template.category),
            specialty: self.lookup::<Specialty>(template.specialty),
            recent_reports: self.store.template_reports(id, TEMPLATE_DETAIL_REPORTS),
            template,
        })
    }

    /// The template record form, choices filled from the store.
    pub fn template_form(&self) -> Form {
        template_form(&self.store.categories(), &self.store.specialties())
    }

    pub fn create_template(&mut self, user: &User, data: &FormData) -> Result<Flash<ReportTemplate>> {
        let input = clean_template(&self.template_form(), data).map_err(Error::InvalidForm)?;
        let now = Utc::now();
        let template = self.store.insert(ReportTemplate {
            id: 0,
            name: input.name,
            category: input.category,
            specialty: input.specialty,
            description: input.description,
            html_content: input.html_content,
            fields_schema: input.fields_schema,
            created_by: Some(user.username.clone()),
            created_at: now,
            updated_at: now,
            is_active: input.is_active,
            is_public: input.is_public,
        })?;
        let message = format!("Plantilla '{}' creada con éxito.", template.name);
        Ok(Flash::new(template, message))
    }

    pub fn edit_template(&mut self, user: &User, id: Id, data: &FormData) -> Result<Flash<ReportTemplate>> {
        let mut template = self.store.get::<ReportTemplate>(id)?.clone();
        if !user.can_manage(template.created_by.as_deref()) {
            return Err(Error::PermissionDenied(
                "No tienes permiso para editar esta plantilla.".to_string(),
            ));
        }
        let input = clean_template(&self.template_form(), data).map_err(Error::InvalidForm)?;
        template.name = input.name;
        template.category = input.category;
        template.specialty = input.specialty;
        template.description = input.description;
        template.html_content = input.html_content;
        template.fields_schema = input.fields_schema;
        template.is_active = input.is_active;
        template.is_public = input.is_public;
        template.updated_at = Utc::now();
        let template = self.store.update(template)?;
        let message = format!("Plantilla '{}' actualizada con éxito.", template.name);
        Ok(Flash::new(template, message))
    }

    /// Form data of an existing template, for pre-filling an edit.
    pub fn template_initial(&self, id: Id) -> Result<FormData> {
        Ok(forms::template_initial(self.store.get::<ReportTemplate>(id)?))
    }

    pub fn delete_template(&mut self, user: &User, id: Id) -> Result<Flash<ReportTemplate>> {
        let template = self.store.get::<ReportTemplate>(id)?;
        if !user.can_manage(template.created_by.as_deref()) {
            return Err(Error::PermissionDenied(
                "No tienes permiso para eliminar esta plantilla.".to_string(),
            ));
        }
        let template = self.store.delete::<ReportTemplate>(id)?;
        let message = format!("Plantilla '{}' eliminada con éxito.", template.name);
        Ok(Flash::new(template, message))
    }

    /// Save a template built in the block editor. The blocks' `content`
    /// strings are concatenated into the HTML body. Only the creator's own
    /// templates can be updated this way.
    pub fn save_template_from_blocks(
        &mut self,
        user: &User,
        draft: TemplateDraft,
    ) -> Result<Flash<ReportTemplate>> {
        let html_content: String = draft
            .blocks
            .iter()
            .filter_map(|b| b.get("content").and_then(Value::as_str))
            .collect();
        let now = Utc::now();

        let mut template = match draft.template_id {
            Some(id) => {
                let existing = self.store.get::<ReportTemplate>(id)?;
                if existing.created_by.as_deref() != Some(user.username.as_str()) {
                    return Err(Error::not_found("Plantilla", id));
                }
                existing.clone()
            }
            None => ReportTemplate {
                id: 0,
                name: String::new(),
                category: None,
                specialty: None,
                description: String::new(),
                html_content: String::new(),
                fields_schema: Value::Object(Default::default()),
                created_by: Some(user.username.clone()),
                created_at: now,
                updated_at: now,
                is_active: true,
                is_public: false,
            },
        };

        template.name = draft.name;
        if draft.category.is_some() {
            template.category = draft.category;
        }
        if draft.specialty.is_some() {
            template.specialty = draft.specialty;
        }
        if let Some(fields) = draft.fields {
            template.fields_schema = fields;
        }
        template.html_content = html_content;
        template.updated_at = now;

        let template = if template.id == 0 {
            self.store.insert(template)?
        } else {
            self.store.update(template)?
        };
        let message = format!("Plantilla '{}' guardada con éxito.", template.name);
        Ok(Flash::new(template, message))
    }

    /// The form a user fills in to generate a report from template `id`.
    pub fn report_form(&self, _user: &User, id: Id) -> Result<(ReportTemplate, Form)> {
        let template = self.store.get::<ReportTemplate>(id)?.clone();
        let form = dynamic_report_form(&template);
        Ok((template, form))
    }

    // -- reports ----------------------------------------------------------------

    /// Validate `data` against the template's form, render the template and
    /// store the report. A PDF that fails to generate is logged and the report
    /// is kept without one.
    pub fn generate_report(
        &mut self,
        user: &User,
        template_id: Id,
        data: &FormData,
    ) -> Result<Flash<GeneratedReport>> {
        let (template, form) = self.report_form(user, template_id)?;
        let cleaned = form.clean(data).map_err(Error::InvalidForm)?;
        let patient = cleaned_text(&cleaned, "patient_name");
        let doctor = cleaned_text(&cleaned, "doctor_name");

        let specialty = self.lookup::<Specialty>(template.specialty).map(|s| s.name);
        let context = build_context(&patient, &doctor, specialty.as_deref(), &cleaned);
        let content = render_template(&template.html_content, &context)?;

        let mut report = GeneratedReport {
            id: 0,
            template: Some(template.id),
            title: format!("Informe para {} - {}", patient, template.name),
            patient_name: patient,
            doctor_name: doctor,
            report_content: content,
            form_data: Value::Object(cleaned),
            pdf_file: None,
            created_by: Some(user.username.clone()),
            created_at: Utc::now(),
            version: 1,
        };

        let filename = format!(
            "informe_{}_{}.pdf",
            file_name_component(&report.patient_name),
            file_name_component(&template.name)
        );
        report.pdf_file = self.store_pdf(&report, &filename);

        let report = self.store.insert(report)?;
        Ok(Flash::new(report, "Informe generado con éxito."))
    }

    /// Reports matching `filter`. Users other than superusers only see their
    /// own.
    pub fn list_reports(&self, user: &User, filter: &ReportFilter) -> Vec<GeneratedReport> {
        let mut filter = filter.clone();
        if !user.is_superuser {
            filter.created_by = Some(user.username.clone());
        }
        filter.patient = filter.patient.filter(|p| !p.trim().is_empty());
        self.store.reports(&filter)
    }

    pub fn report_detail(&self, user: &User, id: Id) -> Result<ReportDetail> {
        let report = self.own_report(user, id, "No tienes permiso para ver este informe.")?;
        Ok(ReportDetail {
            template_name: self.lookup::<ReportTemplate>(report.template).map(|t| t.name),
            recipients: self.store.active_dentists(),
            report,
        })
    }

    /// The stored PDF of a report, or one generated on the fly when none was
    /// stored.
    pub fn report_pdf(&self, user: &User, id: Id) -> Result<PdfDownload> {
        let report = self.own_report(user, id, "No tienes permiso para descargar este informe.")?;
        if let Some(path) = report.pdf_file.as_deref() {
            if self.media.exists(path) {
                let filename = path.rsplit('/').next().unwrap_or(path).to_string();
                return Ok(PdfDownload {
                    filename,
                    bytes: self.media.read(path)?,
                    stored: true,
                });
            }
            log::warn!("stored PDF '{path}' of report {id} is missing, regenerating");
        }
        Ok(PdfDownload {
            filename: format!("informe_{}_{}.pdf", file_name_component(&report.patient_name), report.id),
            bytes: self.render_report_pdf(&report)?,
            stored: false,
        })
    }

    /// Render the report's PDF again, replacing the stored file and bumping
    /// the version.
    pub fn regenerate_report_pdf(&mut self, user: &User, id: Id) -> Result<Flash<GeneratedReport>> {
        let mut report = self.own_report(user, id, "No tienes permiso para ver este informe.")?;
        let pdf = self.render_report_pdf(&report)?;
        let filename = format!(
            "informe_{}_{}.pdf",
            file_name_component(&report.patient_name),
            report.id
        );
        let path = self.media.save_report_pdf(&filename, &pdf, Utc::now())?;
        let previous = report.pdf_file.replace(path.clone());
        report.version += 1;
        let report = match self.store.update(report) {
            Ok(report) => report,
            Err(e) => {
                self.media.delete(&path);
                return Err(e);
            }
        };
        if let Some(old) = previous {
            self.media.delete(&old);
        }
        Ok(Flash::new(report, "PDF del informe regenerado con éxito."))
    }

    /// Email a report to a dentist. `subject` and `text` fall back to the
    /// default wording when absent or blank.
    pub fn send_report(
        &self,
        user: &User,
        id: Id,
        dentist: Option<Id>,
        subject: Option<&str>,
        text: Option<&str>,
    ) -> Result<Flash<DentistContact>> {
        let report = self.own_report(user, id, "No tienes permiso para ver este informe.")?;
        let dentist_id = dentist.ok_or(Error::MissingRecipient)?;
        let dentist = self.store.get::<DentistContact>(dentist_id)?.clone();

        let pdf = self.report_pdf(user, id)?.bytes;
        let email = ReportEmail::for_report(&report, subject, text, pdf);
        self.mailer.send(&dentist, &email)?;

        let message = format!(
            "Informe enviado con éxito a {} {}.",
            dentist.first_name, dentist.last_name
        );
        Ok(Flash::new(dentist, message))
    }

    // -- clinics ------------------------------------------------------------------

    pub fn list_clinics(&self, _user: &User) -> Vec<DentalClinic> {
        self.store.clinics()
    }

    pub fn clinic_detail(&self, _user: &User, id: Id) -> Result<ClinicDetail> {
        Ok(ClinicDetail {
            clinic: self.store.get::<DentalClinic>(id)?.clone(),
            dentists: self.store.dentists(Some(id)),
        })
    }

    pub fn create_clinic(&mut self, _user: &User, data: &FormData) -> Result<Flash<DentalClinic>> {
        let input = clean_clinic(&clinic_form(), data).map_err(Error::InvalidForm)?;
        let clinic = self.store.insert(DentalClinic {
            id: 0,
            name: input.name,
            address: input.address,
            phone: input.phone,
            email: input.email,
            website: input.website,
        })?;
        let message = format!("Clínica '{}' creada con éxito.", clinic.name);
        Ok(Flash::new(clinic, message))
    }

    pub fn edit_clinic(&mut self, _user: &User, id: Id, data: &FormData) -> Result<Flash<DentalClinic>> {
        self.store.get::<DentalClinic>(id)?;
        let input = clean_clinic(&clinic_form(), data).map_err(Error::InvalidForm)?;
        let clinic = self.store.update(DentalClinic {
            id,
            name: input.name,
            address: input.address,
            phone: input.phone,
            email: input.email,
            website: input.website,
        })?;
        let message = format!("Clínica '{}' actualizada con éxito.", clinic.name);
        Ok(Flash::new(clinic, message))
    }

    pub fn clinic_initial(&self, id: Id) -> Result<FormData> {
        Ok(forms::clinic_initial(self.store.get::<DentalClinic>(id)?))
    }

    pub fn delete_clinic(&mut self, _user: &User, id: Id) -> Result<Flash<DentalClinic>> {
        let clinic = self.store.delete::<DentalClinic>(id)?;
        let message = format!("Clínica '{}' eliminada con éxito.", clinic.name);
        Ok(Flash::new(clinic, message))
    }

    // -- dentists -----------------------------------------------------------------

    pub fn list_dentists(&self, _user: &User, clinic: Option<Id>) -> Result<DentistList> {
        let selected = match clinic {
            Some(id) => Some(self.store.get::<DentalClinic>(id)?.clone()),
            None => None,
        };
        Ok(DentistList {
            dentists: self.store.dentists(clinic),
            clinics: self.store.clinics(),
            selected,
        })
    }

    pub fn dentist_detail(&self, _user: &User, id: Id) -> Result<DentistDetail> {
        let dentist = self.store.get::<DentistContact>(id)?.clone();
        Ok(DentistDetail {
            clinic: self.lookup::<DentalClinic>(dentist.clinic),
            dentist,
        })
    }

    pub fn dentist_form(&self) -> Form {
        dentist_form(&self.store.clinics())
    }

    pub fn create_dentist(&mut self, _user: &User, data: &FormData) -> Result<Flash<DentistContact>> {
        let input = clean_dentist(&self.dentist_form(), data).map_err(Error::InvalidForm)?;
        let dentist = self.store.insert(DentistContact {
            id: 0,
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
            phone: input.phone,
            address: input.address,
            clinic: input.clinic,
            notes: input.notes,
            is_active: input.is_active,
            created_at: Utc::now(),
        })?;
        let message = format!(
            "Contacto '{} {}' creado con éxito.",
            dentist.first_name, dentist.last_name
        );
        Ok(Flash::new(dentist, message))
    }

    pub fn edit_dentist(&mut self, _user: &User, id: Id, data: &FormData) -> Result<Flash<DentistContact>> {
        let mut dentist = self.store.get::<DentistContact>(id)?.clone();
        let input = clean_dentist(&self.dentist_form(), data).map_err(Error::InvalidForm)?;
        dentist.first_name = input.first_name;
        dentist.last_name = input.last_name;
        dentist.email = input.email;
        dentist.phone = input.phone;
        dentist.address = input.address;
        dentist.clinic = input.clinic;
        dentist.notes = input.notes;
        dentist.is_active = input.is_active;
        let dentist = self.store.update(dentist)?;
        let message = format!(
            "Contacto '{} {}' actualizado con éxito.",
            dentist.first_name, dentist.last_name
        );
        Ok(Flash::new(dentist, message))
    }

    pub fn dentist_initial(&self, id: Id) -> Result<FormData> {
        Ok(forms::dentist_initial(self.store.get::<DentistContact>(id)?))
    }

    pub fn delete_dentist(&mut self, _user: &User, id: Id) -> Result<Flash<DentistContact>> {
        let dentist = self.store.delete::<DentistContact>(id)?;
        let message = format!(
            "Contacto '{} {}' eliminado con éxito.",
            dentist.first_name, dentist.last_name
        );
        Ok(Flash::new(dentist, message))
    }

    // -- categories and specialties ---------------------------------------------

    pub fn list_categories(&self, _user: &User) -> Vec<(TemplateCategory, usize)> {
        self.store.categories_with_counts()
    }

    pub fn create_category(&mut self, _user: &User, data: &FormData) -> Result<Flash<TemplateCategory>> {
        let input = clean_named(&category_form(), data).map_err(Error::InvalidForm)?;
        let category = self.store.insert(TemplateCategory {
            id: 0,
            name: input.name,
            description: input.description,
        })?;
        let message = format!("Categoría '{}' creada con éxito.", category.name);
        Ok(Flash::new(category, message))
    }

    pub fn edit_category(
        &mut self,
        _user: &User,
        id: Id,
        data: &FormData,
    ) -> Result<Flash<TemplateCategory>> {
        self.store.get::<TemplateCategory>(id)?;
        let input = clean_named(&category_form(), data).map_err(Error::InvalidForm)?;
        let category = self.store.update(TemplateCategory {
            id,
            name: input.name,
            description: input.description,
        })?;
        let message = format!("Categoría '{}' actualizada con éxito.", category.name);
        Ok(Flash::new(category, message))
    }

    pub fn category_initial(&self, id: Id) -> Result<FormData> {
        Ok(forms::category_initial(self.store.get::<TemplateCategory>(id)?))
    }

    pub fn delete_category(&mut self, _user: &User, id: Id) -> Result<Flash<TemplateCategory>> {
        let category = self.store.delete::<TemplateCategory>(id)?;
        let message = format!("Categoría '{}' eliminada con éxito.", category.name);
        Ok(Flash::new(category, message))
    }

    pub fn list_specialties(&self, _user: &User) -> Vec<Specialty> {
        self.store.specialties()
    }

    pub fn create_specialty(&mut self, _user: &User, data: &FormData) -> Result<Flash<Specialty>> {
        let input = clean_named(&specialty_form(), data).map_err(Error::InvalidForm)?;
        let specialty = self.store.insert(Specialty {
            id: 0,
            name: input.name,
            description: input.description,
        })?;
        let message = format!("Especialidad '{}' creada con éxito.", specialty.name);
        Ok(Flash::new(specialty, message))
    }

    pub fn edit_specialty(&mut self, _user: &User, id: Id, data: &FormData) -> Result<Flash<Specialty>> {
        self.store.get::<Specialty>(id)?;
        let input = clean_named(&specialty_form(), data).map_err(Error::InvalidForm)?;
        let specialty = self.store.update(Specialty {
            id,
            name: input.name,
            description: input.description,
        })?;
        let message = format!("Especialidad '{}' actualizada con éxito.", specialty.name);
        Ok(Flash::new(specialty, message))
    }

    pub fn specialty_initial(&self, id: Id) -> Result<FormData> {
        Ok(forms::specialty_initial(self.store.get::<Specialty>(id)?))
    }

    pub fn delete_specialty(&mut self, _user: &User, id: Id) -> Result<Flash<Specialty>> {
        let specialty = self.store.delete::<Specialty>(id)?;
        let message = format!("Especialidad '{}' eliminada con éxito.", specialty.name);
        Ok(Flash::new(specialty, message))
    }

    // -- helpers ------------------------------------------------------------------

    fn lookup<T: crate::store::Record>(&self, id: Option<Id>) -> Option<T> {
        id.and_then(|id| self.store.get::<T>(id).ok()).cloned()
    }

    fn own_report(&self, user: &User, id: Id, denied: &str) -> Result<GeneratedReport> {
        let report = self.store.get::<GeneratedReport>(id)?;
        if !user.can_manage(report.created_by.as_deref()) {
            return Err(Error::PermissionDenied(denied.to_string()));
        }
        Ok(report.clone())
    }

    /// Wrap the report content in the report stylesheet and convert it.
    fn render_report_pdf(&self, report: &GeneratedReport) -> Result<Vec<u8>> {
        let html = wrap_report_html(&report.report_content, &report.title);
        let html = self.media.inline_images(&html);
        let mut config = self.pdf.pipeline_config();
        config.title = report.title.clone();
        let (bytes, layout) = generate_pdf(&html, &config)?;
        log::debug!("report '{}': {} page(s), {} bytes", report.title, layout.pages.len(), bytes.len());
        Ok(bytes)
    }

    /// Generate and store the report's PDF, returning its media path. Failures
    /// are logged.
    fn store_pdf(&self, report: &GeneratedReport, filename: &str) -> Option<String> {
        let saved = self
            .render_report_pdf(report)
            .and_then(|pdf| self.media.save_report_pdf(filename, &pdf, report.created_at));
        match saved {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("report '{}' saved without PDF: {e}", report.title);
                None
            }
        }
    }
}

fn cleaned_text(cleaned: &forms::CleanedData, key: &str) -> String {
    cleaned
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app() -> (App, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.mail.outbox_dir = dir.path().join("outbox");
        let app = App::new(Store::in_memory(), MediaStore::new(dir.path().join("media")), &config);
        (app, dir)
    }

    fn data(pairs: &[(&str, &str)]) -> FormData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn with_category(app: &mut App) -> Id {
        let user = User::new("ana");
        app.create_category(&user, &data(&[("name", "Endodoncia")]))
            .unwrap()
            .value
            .id
    }

    fn new_template(app: &mut App, user: &User, category: Id) -> ReportTemplate {
        let schema = json!({"fields": [
            {"name": "diente", "label": "Diente", "type": "text", "required": true}
        ]})
        .to_string();
        app.create_template(
            user,
            &data(&[
                ("name", "Endodoncia Básica"),
                ("category", &category.to_string()),
                ("html_content", "<h2>{{paciente.nombre}}</h2><p>Diente {{datos.diente}}</p>"),
                ("is_active", "on"),
                ("fields_json", &schema),
            ]),
        )
        .unwrap()
        .value
    }

    #[test]
    fn create_template_records_the_creator() {
        let (mut app, _dir) = app();
        let cat = with_category(&mut app);
        let flash = app
            .create_template(
                &User::new("ana"),
                &data(&[("name", "T"), ("category", &cat.to_string()), ("html_content", "x")]),
            )
            .unwrap();
        assert_eq!(flash.message, "Plantilla 'T' creada con éxito.");
        assert_eq!(flash.value.created_by.as_deref(), Some("ana"));
    }

    #[test]
    fn only_the_creator_edits_a_template() {
        let (mut app, _dir) = app();
        let cat = with_category(&mut app);
        let ana = User::new("ana");
        let t = new_template(&mut app, &ana, cat);

        let mut edit = app.template_initial(t.id).unwrap();
        edit.insert("name".into(), "Renombrada".into());

        let err = app.edit_template(&User::new("luis"), t.id, &edit).unwrap_err();
        assert_eq!(err.to_string(), "No tienes permiso para editar esta plantilla.");

        let flash = app.edit_template(&User::superuser("root"), t.id, &edit).unwrap();
        assert_eq!(flash.message, "Plantilla 'Renombrada' actualizada con éxito.");
        assert_eq!(flash.value.created_by.as_deref(), Some("ana"));
    }

    #[test]
    fn generating_a_report_renders_and_stores_the_pdf() {
        let (mut app, _dir) = app();
        let cat = with_category(&mut app);
        let ana = User::new("ana");
        let t = new_template(&mut app, &ana, cat);

        let flash = app
            .generate_report(
                &ana,
                t.id,
                &data(&[("patient_name", "Juan Pérez"), ("doctor_name", "Dra. López"), ("diente", "36")]),
            )
            .unwrap();
        assert_eq!(flash.message, "Informe generado con éxito.");
        let report = flash.value;
        assert_eq!(report.title, "Informe para Juan Pérez - Endodoncia Básica");
        assert_eq!(report.report_content, "<h2>Juan Pérez</h2><p>Diente 36</p>");
        assert_eq!(report.form_data["diente"], json!("36"));

        let path = report.pdf_file.clone().unwrap();
        assert!(path.ends_with("/informe_Juan_Pérez_Endodoncia_Básica.pdf"));
        let download = app.report_pdf(&ana, report.id).unwrap();
        assert!(download.stored);
        assert_eq!(&download.bytes[..5], b"%PDF-");
    }

    #[test]
    fn invalid_report_data_is_rejected() {
        let (mut app, _dir) = app();
        let cat = with_category(&mut app);
        let ana = User::new("ana");
        let t = new_template(&mut app, &ana, cat);
        let err = app
            .generate_report(&ana, t.id, &data(&[("patient_name", "Juan")]))
            .unwrap_err();
        match err {
            Error::InvalidForm(errors) => {
                assert!(!errors.get("doctor_name").is_empty());
                assert!(!errors.get("diente").is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(app.store().all::<GeneratedReport>().is_empty());
    }

    #[test]
    fn reports_are_private_to_their_creator() {
        let (mut app, _dir) = app();
        let cat = with_category(&mut app);
        let ana = User::new("ana");
        let t = new_template(&mut app, &ana, cat);
        let fields = data(&[("patient_name", "Juan"), ("doctor_name", "Ana"), ("diente", "11")]);
        let report = app.generate_report(&ana, t.id, &fields).unwrap().value;

        let luis = User::new("luis");
        assert!(app.list_reports(&luis, &ReportFilter::default()).is_empty());
        assert_eq!(app.list_reports(&User::superuser("root"), &ReportFilter::default()).len(), 1);

        let err = app.report_detail(&luis, report.id).unwrap_err();
        assert_eq!(err.to_string(), "No tienes permiso para ver este informe.");
        let err = app.report_pdf(&luis, report.id).unwrap_err();
        assert_eq!(err.to_string(), "No tienes permiso para descargar este informe.");
    }

    #[test]
    fn missing_pdf_is_generated_inline() {
        let (mut app, _dir) = app();
        let ana = User::new("ana");
        let report = app
            .store
            .insert(GeneratedReport {
                id: 0,
                template: None,
                patient_name: "Juan Pérez".to_string(),
                doctor_name: "Ana".to_string(),
                title: "Informe para Juan Pérez".to_string(),
                report_content: "<p>Contenido</p>".to_string(),
                form_data: json!({}),
                pdf_file: Some("reports/2020/01/perdido.pdf".to_string()),
                created_by: Some("ana".to_string()),
                created_at: Utc::now(),
                version: 1,
            })
            .unwrap();

        let download = app.report_pdf(&ana, report.id).unwrap();
        assert!(!download.stored);
        assert_eq!(download.filename, format!("informe_Juan_Pérez_{}.pdf", report.id));
        assert_eq!(&download.bytes[..5], b"%PDF-");
    }

    #[test]
    fn regenerating_replaces_the_stored_file() {
        let (mut app, _dir) = app();
        let cat = with_category(&mut app);
        let ana = User::new("ana");
        let t = new_template(&mut app, &ana, cat);
        let fields = data(&[("patient_name", "Juan"), ("doctor_name", "Ana"), ("diente", "11")]);
        let report = app.generate_report(&ana, t.id, &fields).unwrap().value;
        let old = report.pdf_file.clone().unwrap();

        let updated = app.regenerate_report_pdf(&ana, report.id).unwrap().value;
        assert_eq!(updated.version, 2);
        let new = updated.pdf_file.unwrap();
        assert_ne!(old, new);
        assert!(!app.media().exists(&old));
        assert!(app.media().exists(&new));
    }

    #[test]
    fn pdf_failure_keeps_the_report() {
        let (mut app, _dir) = app();
        let cat = with_category(&mut app);
        let ana = User::new("ana");
        let t = app
            .create_template(
                &ana,
                &data(&[
                    ("name", "Sin página"),
                    ("category", &cat.to_string()),
                    ("html_content", "<style>@page { size: 0 0 }</style><p>{{paciente.nombre}}</p>"),
                ]),
            )
            .unwrap()
            .value;

        let fields = data(&[("patient_name", "Juan"), ("doctor_name", "Ana")]);
        let flash = app.generate_report(&ana, t.id, &fields).unwrap();
        assert_eq!(flash.message, "Informe generado con éxito.");
        let report = flash.value;
        assert_eq!(report.pdf_file, None);
        assert_eq!(app.store().all::<GeneratedReport>().len(), 1);

        // Without a stored file the download renders on the spot.
        let err = app.report_pdf(&ana, report.id).unwrap_err();
        assert!(matches!(err, Error::Pdf(_)));

        let mut fixed = report.clone();
        fixed.report_content = "<p>Juan</p>".to_string();
        app.store.update(fixed).unwrap();
        let download = app.report_pdf(&ana, report.id).unwrap();
        assert!(!download.stored);
        assert_eq!(download.filename, format!("informe_Juan_{}.pdf", report.id));
        assert_eq!(&download.bytes[..5], b"%PDF-");
    }

    #[test]
    fn failed_regeneration_keeps_the_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("store.json");
        let mut app = App::new(
            Store::open(&store_path).unwrap(),
            MediaStore::new(dir.path().join("media")),
            &AppConfig::default(),
        );
        let cat = with_category(&mut app);
        let ana = User::new("ana");
        let t = new_template(&mut app, &ana, cat);
        let fields = data(&[("patient_name", "Juan"), ("doctor_name", "Ana"), ("diente", "11")]);
        let report = app.generate_report(&ana, t.id, &fields).unwrap().value;
        let old = report.pdf_file.clone().unwrap();

        std::fs::create_dir(store_path.with_extension("json.tmp")).unwrap();
        assert!(app.regenerate_report_pdf(&ana, report.id).is_err());

        let kept = app.store().get::<GeneratedReport>(report.id).unwrap();
        assert_eq!(kept.pdf_file.as_deref(), Some(old.as_str()));
        assert_eq!(kept.version, 1);
        assert!(app.media().exists(&old));
        let (month_dir, _) = old.rsplit_once('/').unwrap();
        let files = std::fs::read_dir(dir.path().join("media").join(month_dir))
            .unwrap()
            .count();
        assert_eq!(files, 1);
    }

    #[test]
    fn sending_needs_a_recipient() {
        let (mut app, dir) = app();
        let cat = with_category(&mut app);
        let ana = User::new("ana");
        let t = new_template(&mut app, &ana, cat);
        let fields = data(&[("patient_name", "Juan"), ("doctor_name", "Ana"), ("diente", "11")]);
        let report = app.generate_report(&ana, t.id, &fields).unwrap().value;

        let err = app.send_report(&ana, report.id, None, None, None).unwrap_err();
        assert_eq!(err.to_string(), "Por favor selecciona un destinatario.");

        let dentist = app
            .create_dentist(
                &ana,
                &data(&[("first_name", "Laura"), ("last_name", "Martínez"), ("email", "laura@example.com")]),
            )
            .unwrap()
            .value;
        let flash = app.send_report(&ana, report.id, Some(dentist.id), None, None).unwrap();
        assert_eq!(flash.message, "Informe enviado con éxito a Laura Martínez.");
        assert_eq!(std::fs::read_dir(dir.path().join("outbox")).unwrap().count(), 1);
    }

    #[test]
    fn blocks_are_concatenated_into_the_template() {
        let (mut app, _dir) = app();
        let ana = User::new("ana");
        let draft = TemplateDraft {
            name: "Visual".to_string(),
            blocks: vec![json!({"content": "<h2>A</h2>"}), json!({"type": "x"}), json!({"content": "<p>B</p>"})],
            ..TemplateDraft::default()
        };
        let t = app.save_template_from_blocks(&ana, draft).unwrap().value;
        assert_eq!(t.html_content, "<h2>A</h2><p>B</p>");
        assert!(t.is_active);

        let foreign = TemplateDraft {
            template_id: Some(t.id),
            name: "Ajena".to_string(),
            ..TemplateDraft::default()
        };
        let err = app.save_template_from_blocks(&User::new("luis"), foreign).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn clinic_detail_lists_its_dentists() {
        let (mut app, _dir) = app();
        let user = User::new("ana");
        let clinic = app.create_clinic(&user, &data(&[("name", "Sonrisas")])).unwrap();
        assert_eq!(clinic.message, "Clínica 'Sonrisas' creada con éxito.");
        let clinic_id = clinic.value.id.to_string();
        app.create_dentist(
            &user,
            &data(&[("first_name", "Luis"), ("last_name", "Alonso"), ("email", "l@x.es"), ("clinic", &clinic_id)]),
        )
        .unwrap();

        let detail = app.clinic_detail(&user, clinic.value.id).unwrap();
        assert_eq!(detail.dentists.len(), 1);
        app.delete_clinic(&user, clinic.value.id).unwrap();
        let listed = app.list_dentists(&user, None).unwrap();
        assert_eq!(listed.dentists[0].clinic, None);
    }

    #[test]
    fn unknown_category_filter_is_not_found() {
        let (app, _dir) = app();
        let err = app.list_templates(&User::new("ana"), Some(3)).unwrap_err();
        assert_eq!(err.to_string(), "Categoría con id 3 no encontrado");
    }

    #[test]
    fn seeding_reports_what_was_created() {
        let (mut app, _dir) = app();
        let root = User::superuser("root");
        let flash = app.seed_defaults(&root).unwrap();
        assert_eq!(flash.value.templates.len(), 3);
        let again = app.seed_defaults(&root).unwrap();
        assert_eq!(again.message, "Los datos predeterminados ya existían.");
        let t = app.store().template_by_name("Informe de Periodoncia").unwrap();
        assert_eq!(t.created_by.as_deref(), Some("root"));
    }
}
