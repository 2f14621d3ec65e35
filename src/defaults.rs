//! Default categories, specialties and report templates.
//!
//! Seeding is idempotent: records are looked up by name and only missing
//! ones are created.

use chrono::Utc;
use serde_json::{json, Value};

use crate::error::Result;
use crate::models::{Id, ReportTemplate, Specialty, TemplateCategory};
use crate::store::Store;

/// Endodontic treatment report.
pub fn endodontics_template() -> &'static str {
    r##"
<div class="container report-container">
    <div class="report-header">
        <h2 class="text-center">INFORME DE ENDODONCIA</h2>
        <hr>
        <div class="row mt-4">
            <div class="col-md-6">
                <p><strong>Paciente:</strong> {{paciente.nombre}}</p>
            </div>
            <div class="col-md-6 text-end">
                <p><strong>Fecha:</strong> {% now "d/m/Y" %}</p>
            </div>
        </div>
        <div class="row">
            <div class="col-md-6">
                <p><strong>Médico:</strong> {{medico.nombre}}</p>
            </div>
        </div>
    </div>

    <div class="report-content mt-4">
        <h4>Diente Tratado</h4>
        <p>{{datos.diente}}</p>

        <h4>Diagnóstico</h4>
        <p>{{datos.diagnostico}}</p>

        <h4>Procedimiento Realizado</h4>
        <p>{{datos.procedimiento}}</p>

        <h4>Observaciones</h4>
        <p>{{datos.observaciones}}</p>
    </div>

    <div class="report-footer mt-5">
        <div class="row">
            <div class="col-md-6">
                <p>Revisión recomendada en: {{datos.revision}} semanas</p>
            </div>
            <div class="col-md-6 text-end">
                <p>____________________</p>
                <p>Firma del especialista</p>
            </div>
        </div>
    </div>
</div>
"##
}

fn endodontics_fields() -> Value {
    json!({ "fields": [
        { "name": "diente", "label": "Diente tratado (número)", "type": "text", "required": true },
        { "name": "diagnostico", "label": "Diagnóstico", "type": "textarea", "required": true },
        { "name": "procedimiento", "label": "Procedimiento realizado", "type": "textarea", "required": true },
        { "name": "observaciones", "label": "Observaciones", "type": "textarea", "required": false },
        { "name": "revision", "label": "Revisión recomendada (semanas)", "type": "number", "required": true }
    ]})
}

/// Periodontal evaluation with an optional surgery notice.
pub fn periodontics_template() -> &'static str {
    r##"
<div class="container report-container">
    <div class="report-header">
        <h2 class="text-center">INFORME DE PERIODONCIA</h2>
        <hr>
        <div class="row mt-4">
            <div class="col-md-6">
                <p><strong>Paciente:</strong> {{paciente.nombre}}</p>
            </div>
            <div class="col-md-6 text-end">
                <p><strong>Fecha:</strong> {% now "d/m/Y" %}</p>
            </div>
        </div>
        <div class="row">
            <div class="col-md-6">
                <p><strong>Médico:</strong> {{medico.nombre}}</p>
            </div>
        </div>
    </div>

    <div class="report-content mt-4">
        <h4>Evaluación Periodontal</h4>
        <p>{{datos.evaluacion}}</p>

        <h4>Zonas Afectadas</h4>
        <p>{{datos.zonas_afectadas}}</p>

        <h4>Tratamiento Recomendado</h4>
        <p>{{datos.tratamiento}}</p>

        <h4>Instrucciones para el Paciente</h4>
        <p>{{datos.instrucciones}}</p>

        {% if datos.requiere_cirugia == "Sí" %}
        <div class="alert alert-warning">
            <h5>Requiere Intervención Quirúrgica</h5>
            <p>{{datos.detalles_cirugia}}</p>
        </div>
        {% endif %}
    </div>

    <div class="report-footer mt-5">
        <div class="row">
            <div class="col-md-6">
                <p>Próxima cita: {{datos.proxima_cita}}</p>
            </div>
            <div class="col-md-6 text-end">
                <p>____________________</p>
                <p>Firma del periodoncista</p>
            </div>
        </div>
    </div>
</div>
"##
}

fn periodontics_fields() -> Value {
    json!({ "fields": [
        { "name": "evaluacion", "label": "Evaluación periodontal", "type": "textarea", "required": true },
        { "name": "zonas_afectadas", "label": "Zonas afectadas", "type": "textarea", "required": true },
        { "name": "tratamiento", "label": "Tratamiento recomendado", "type": "textarea", "required": true },
        { "name": "instrucciones", "label": "Instrucciones para el paciente", "type": "textarea", "required": true },
        { "name": "requiere_cirugia", "label": "¿Requiere intervención quirúrgica?", "type": "select",
          "options": ["No", "Sí"], "required": true },
        { "name": "detalles_cirugia", "label": "Detalles de la cirugía (si aplica)", "type": "textarea", "required": false },
        { "name": "proxima_cita", "label": "Fecha próxima cita", "type": "date", "required": true }
    ]})
}

/// General consultation report with a budget.
pub fn general_template() -> &'static str {
    r##"
<div class="container report-container">
    <div class="report-header">
        <h2 class="text-center">INFORME DENTAL</h2>
        <hr>
        <div class="row mt-4">
            <div class="col-md-6">
                <p><strong>Paciente:</strong> {{paciente.nombre}}</p>
            </div>
            <div class="col-md-6 text-end">
                <p><strong>Fecha:</strong> {% now "d/m/Y" %}</p>
            </div>
        </div>
        <div class="row">
            <div class="col-md-6">
                <p><strong>Médico:</strong> {{medico.nombre}}</p>
            </div>
        </div>
    </div>

    <div class="report-content mt-4">
        <h4>Motivo de la Consulta</h4>
        <p>{{datos.motivo}}</p>

        <h4>Examen Clínico</h4>
        <p>{{datos.examen_clinico}}</p>

        <h4>Diagnóstico</h4>
        <p>{{datos.diagnostico}}</p>

        <h4>Plan de Tratamiento</h4>
        <p>{{datos.plan_tratamiento}}</p>

        <h4>Presupuesto Estimado</h4>
        <p>{{datos.presupuesto}} €</p>
    </div>

    <div class="report-footer mt-5">
        <div class="row">
            <div class="col-md-6">
                <p><strong>Teléfono para citas:</strong> {{datos.telefono_citas}}</p>
            </div>
            <div class="col-md-6 text-end">
                <p>____________________</p>
                <p>Firma del dentista</p>
            </div>
        </div>
    </div>
</div>
"##
}

fn general_fields() -> Value {
    json!({ "fields": [
        { "name": "motivo", "label": "Motivo de la consulta", "type": "textarea", "required": true },
        { "name": "examen_clinico", "label": "Examen clínico", "type": "textarea", "required": true },
        { "name": "diagnostico", "label": "Diagnóstico", "type": "textarea", "required": true },
        { "name": "plan_tratamiento", "label": "Plan de tratamiento", "type": "textarea", "required": true },
        { "name": "presupuesto", "label": "Presupuesto estimado (€)", "type": "number", "required": true },
        { "name": "telefono_citas", "label": "Teléfono para citas", "type": "text", "required": true }
    ]})
}

/// Names of the records a seeding run created, in creation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedReport {
    pub categories: Vec<String>,
    pub specialties: Vec<String>,
    pub templates: Vec<String>,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.specialties.is_empty() && self.templates.is_empty()
    }

    /// One line per created record.
    pub fn lines(&self) -> Vec<String> {
        let categories = self.categories.iter().map(|n| format!("Categoría {n} creada"));
        let specialties = self.specialties.iter().map(|n| format!("Especialidad {n} creada"));
        let templates = self.templates.iter().map(|n| format!("Plantilla \"{n}\" creada"));
        categories.chain(specialties).chain(templates).collect()
    }
}

/// Create the default records that do not exist yet. Templates are owned by
/// `owner` and public.
pub fn seed(store: &mut Store, owner: Option<&str>) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    let endo = category(store, &mut report, "Endodoncia", "Plantillas para informes de endodoncia")?;
    let perio = category(store, &mut report, "Periodoncia", "Plantillas para informes de periodoncia")?;
    let general = category(
        store,
        &mut report,
        "Informe General",
        "Plantillas para informes dentales generales",
    )?;

    let esp_endo = specialty(
        store,
        &mut report,
        "Endodoncia",
        "Especialidad en el tratamiento del interior del diente",
    )?;
    let esp_perio = specialty(
        store,
        &mut report,
        "Periodoncia",
        "Especialidad en el tratamiento de las encías y tejidos de soporte del diente",
    )?;

    let templates = [
        (
            "Informe de Endodoncia Básico",
            endo,
            Some(esp_endo),
            "Plantilla básica para informes de tratamiento de endodoncia",
            endodontics_template(),
            endodontics_fields(),
        ),
        (
            "Informe de Periodoncia",
            perio,
            Some(esp_perio),
            "Plantilla para informes de evaluación y tratamiento periodontal",
            periodontics_template(),
            periodontics_fields(),
        ),
        (
            "Informe Dental General",
            general,
            None,
            "Plantilla general para informes dentales",
            general_template(),
            general_fields(),
        ),
    ];

    for (name, category, specialty, description, html, fields) in templates {
        if store.template_by_name(name).is_some() {
            continue;
        }
        let now = Utc::now();
        store.insert(ReportTemplate {
            id: 0,
            name: name.to_string(),
            category: Some(category),
            specialty,
            description: description.to_string(),
            html_content: html.to_string(),
            fields_schema: fields,
            created_by: owner.map(str::to_string),
            created_at: now,
            updated_at: now,
            is_active: true,
            is_public: true,
        })?;
        report.templates.push(name.to_string());
    }

    Ok(report)
}

fn category(store: &mut Store, report: &mut SeedReport, name: &str, description: &str) -> Result<Id> {
    if let Some(existing) = store.category_by_name(name) {
        return Ok(existing.id);
    }
    let created = store.insert(TemplateCategory {
        id: 0,
        name: name.to_string(),
        description: description.to_string(),
    })?;
    report.categories.push(name.to_string());
    Ok(created.id)
}

fn specialty(store: &mut Store, report: &mut SeedReport, name: &str, description: &str) -> Result<Id> {
    if let Some(existing) = store.specialty_by_name(name) {
        return Ok(existing.id);
    }
    let created = store.insert(Specialty {
        id: 0,
        name: name.to_string(),
        description: description.to_string(),
    })?;
    report.specialties.push(name.to_string());
    Ok(created.id)
}
