//! Command-line interface.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use crate::app::{App, Flash, TemplateDraft};
use crate::config::AppConfig;
use crate::document::wrap_report_html;
use crate::error::{Error, Result};
use crate::forms::FormData;
use crate::media::MediaStore;
use crate::models::{Id, User};
use crate::pipeline::{generate_pdf, PageOrientation};
use crate::store::ReportFilter;

/// Dental report templates, reports, clinics and contacts
#[derive(Parser, Debug)]
#[command(name = "dental-reports", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, env = "DENTAL_REPORTS_CONFIG", default_value = "dental-reports.toml")]
    pub config: PathBuf,

    /// Name of the acting user
    #[arg(short, long, global = true, env = "DENTAL_REPORTS_USER", default_value = "admin")]
    pub user: String,

    /// Act with superuser rights
    #[arg(long, global = true)]
    pub superuser: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn acting_user(&self) -> User {
        if self.superuser {
            User::superuser(&self.user)
        } else {
            User::new(&self.user)
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the default categories, specialties and templates
    Seed,
    /// Show record counts and recent activity
    Home,
    #[command(subcommand)]
    Category(NamedCommand),
    #[command(subcommand)]
    Specialty(NamedCommand),
    #[command(subcommand)]
    Template(TemplateCommand),
    #[command(subcommand)]
    Report(ReportCommand),
    #[command(subcommand)]
    Clinic(RecordCommand),
    #[command(subcommand)]
    Dentist(DentistCommand),
    /// Convert an HTML file to PDF
    Render(RenderArgs),
}

/// Form values given as repeated `--field name=value`.
#[derive(Args, Debug, Default)]
pub struct FieldArgs {
    #[arg(short = 'f', long = "field", value_name = "NAME=VALUE", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,
}

impl FieldArgs {
    fn overlay(&self, mut data: FormData) -> FormData {
        data.extend(self.fields.iter().cloned());
        data
    }

    fn data(&self) -> FormData {
        self.overlay(FormData::new())
    }
}

fn parse_field(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}

#[derive(Subcommand, Debug)]
pub enum NamedCommand {
    List,
    Create(FieldArgs),
    Edit {
        id: Id,
        #[command(flatten)]
        fields: FieldArgs,
    },
    Delete { id: Id },
}

#[derive(Subcommand, Debug)]
pub enum RecordCommand {
    List,
    Create(FieldArgs),
    Show { id: Id },
    Edit {
        id: Id,
        #[command(flatten)]
        fields: FieldArgs,
    },
    Delete { id: Id },
}

#[derive(Subcommand, Debug)]
pub enum DentistCommand {
    List {
        /// Only dentists of this clinic
        #[arg(long)]
        clinic: Option<Id>,
    },
    Create(FieldArgs),
    Show { id: Id },
    Edit {
        id: Id,
        #[command(flatten)]
        fields: FieldArgs,
    },
    Delete { id: Id },
}

/// Template bodies and schemas can be read from files.
#[derive(Args, Debug)]
pub struct TemplateArgs {
    #[command(flatten)]
    pub fields: FieldArgs,
    /// File holding the HTML content
    #[arg(long)]
    pub html_file: Option<PathBuf>,
    /// File holding the JSON field schema
    #[arg(long)]
    pub schema_file: Option<PathBuf>,
}

impl TemplateArgs {
    fn overlay(&self, data: FormData) -> Result<FormData> {
        let mut data = self.fields.overlay(data);
        if let Some(path) = &self.html_file {
            data.insert("html_content".into(), fs::read_to_string(path)?);
        }
        if let Some(path) = &self.schema_file {
            data.insert("fields_json".into(), fs::read_to_string(path)?);
        }
        Ok(data)
    }
}

#[derive(Subcommand, Debug)]
pub enum TemplateCommand {
    List {
        #[arg(long)]
        category: Option<Id>,
    },
    Show { id: Id },
    Create(TemplateArgs),
    Edit {
        id: Id,
        #[command(flatten)]
        args: TemplateArgs,
    },
    Delete { id: Id },
    /// Print the report form of a template as HTML
    Form { id: Id },
    /// Save a template from a block editor document
    /// (`{ template_id, name, category_id, specialty_id, blocks, fields }`)
    Import { file: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum ReportCommand {
    Generate {
        template: Id,
        #[command(flatten)]
        fields: FieldArgs,
    },
    List {
        #[arg(long)]
        template: Option<Id>,
        /// Part of the patient name
        #[arg(long)]
        patient: Option<String>,
    },
    Show { id: Id },
    /// Write the report PDF to a file
    Pdf {
        id: Id,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Render the PDF again and replace the stored file
    Regenerate { id: Id },
    /// Email the report to a dentist
    Send {
        id: Id,
        #[arg(long)]
        dentist: Option<Id>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        message: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// HTML file to convert
    pub input: PathBuf,
    /// Output path (default: same stem as input with .pdf)
    pub output: Option<PathBuf>,
    /// Use landscape page orientation
    #[arg(short, long)]
    pub landscape: bool,
    /// Document title in PDF metadata (default: input filename stem)
    #[arg(short, long)]
    pub title: Option<String>,
    /// Convert the file as-is instead of wrapping it in the report stylesheet
    #[arg(long)]
    pub raw: bool,
}

/// Execute a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(&cli.config)?;
    let user = cli.acting_user();

    if let Command::Render(args) = &cli.command {
        return render(&config, args);
    }

    let mut app = App::open(&config)?;
    match cli.command {
        Command::Seed => print_flash(app.seed_defaults(&user)?),
        Command::Home => {
            let d = app.home(&user);
            println!(
                "Plantillas: {}  Informes: {}  Clínicas: {}  Contactos: {}",
                d.templates_count, d.reports_count, d.clinics_count, d.dentists_count
            );
            println!("\nPlantillas recientes:");
            for t in &d.recent_templates {
                println!("  [{}] {}", t.id, t);
            }
            println!("\nInformes recientes:");
            for r in &d.recent_reports {
                println!("  [{}] {} {}", r.id, r, r.created_at.format("%d/%m/%Y %H:%M"));
            }
        }
        Command::Category(cmd) => category(&mut app, &user, cmd)?,
        Command::Specialty(cmd) => specialty(&mut app, &user, cmd)?,
        Command::Template(cmd) => template(&mut app, &user, cmd)?,
        Command::Report(cmd) => report(&mut app, &user, cmd)?,
        Command::Clinic(cmd) => clinic(&mut app, &user, cmd)?,
        Command::Dentist(cmd) => dentist(&mut app, &user, cmd)?,
        Command::Render(_) => {}
    }
    Ok(())
}

fn print_flash<T>(flash: Flash<T>) {
    println!("{}", flash.message);
}

fn category(app: &mut App, user: &User, cmd: NamedCommand) -> Result<()> {
    match cmd {
        NamedCommand::List => {
            for (c, count) in app.list_categories(user) {
                println!("[{}] {} ({} plantillas)", c.id, c, count);
            }
        }
        NamedCommand::Create(f) => print_flash(app.create_category(user, &f.data())?),
        NamedCommand::Edit { id, fields } => {
            let data = fields.overlay(app.category_initial(id)?);
            print_flash(app.edit_category(user, id, &data)?);
        }
        NamedCommand::Delete { id } => print_flash(app.delete_category(user, id)?),
    }
    Ok(())
}

fn specialty(app: &mut App, user: &User, cmd: NamedCommand) -> Result<()> {
    match cmd {
        NamedCommand::List => {
            for s in app.list_specialties(user) {
                println!("[{}] {}", s.id, s);
            }
        }
        NamedCommand::Create(f) => print_flash(app.create_specialty(user, &f.data())?),
        NamedCommand::Edit { id, fields } => {
            let data = fields.overlay(app.specialty_initial(id)?);
            print_flash(app.edit_specialty(user, id, &data)?);
        }
        NamedCommand::Delete { id } => print_flash(app.delete_specialty(user, id)?),
    }
    Ok(())
}

fn template(app: &mut App, user: &User, cmd: TemplateCommand) -> Result<()> {
    match cmd {
        TemplateCommand::List { category } => {
            let list = app.list_templates(user, category)?;
            if let Some(c) = &list.selected {
                println!("Categoría: {c}");
            }
            for t in &list.templates {
                println!("[{}] {}", t.id, t);
            }
        }
        TemplateCommand::Show { id } => {
            let d = app.template_detail(user, id)?;
            println!("{}", d.template);
            if let Some(c) = &d.category {
                println!("Categoría: {c}");
            }
            if let Some(s) = &d.specialty {
                println!("Especialidad: {s}");
            }
            if !d.template.description.is_empty() {
                println!("{}", d.template.description);
            }
            println!(
                "Creada por: {}",
                d.template.created_by.as_deref().unwrap_or("-")
            );
            println!("\nInformes recientes:");
            for r in &d.recent_reports {
                println!("  [{}] {}", r.id, r);
            }
        }
        TemplateCommand::Create(args) => {
            let data = args.overlay(FormData::new())?;
            print_flash(app.create_template(user, &data)?);
        }
        TemplateCommand::Edit { id, args } => {
            let data = args.overlay(app.template_initial(id)?)?;
            print_flash(app.edit_template(user, id, &data)?);
        }
        TemplateCommand::Delete { id } => print_flash(app.delete_template(user, id)?),
        TemplateCommand::Form { id } => {
            let (_, form) = app.report_form(user, id)?;
            print!("{}", form.render_html(&FormData::new(), None));
        }
        TemplateCommand::Import { file } => {
            let doc: Value = serde_json::from_str(&fs::read_to_string(&file)?)?;
            print_flash(app.save_template_from_blocks(user, draft_from_json(&doc))?);
        }
    }
    Ok(())
}

/// Ids may be given as numbers or numeric strings; anything else is ignored.
fn json_id(value: Option<&Value>) -> Option<Id> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn draft_from_json(doc: &Value) -> TemplateDraft {
    TemplateDraft {
        template_id: json_id(doc.get("template_id")),
        name: doc
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        category: json_id(doc.get("category_id")),
        specialty: json_id(doc.get("specialty_id")),
        blocks: doc
            .get("blocks")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        fields: doc.get("fields").filter(|f| !f.is_null()).cloned(),
    }
}

fn report(app: &mut App, user: &User, cmd: ReportCommand) -> Result<()> {
    match cmd {
        ReportCommand::Generate { template, fields } => {
            let flash = app.generate_report(user, template, &fields.data())?;
            println!("{}", flash.message);
            println!("[{}] {}", flash.value.id, flash.value);
            match &flash.value.pdf_file {
                Some(path) => println!("PDF: {}", app.media().path(path).display()),
                None => println!("El informe se guardó sin PDF."),
            }
        }
        ReportCommand::List { template, patient } => {
            let filter = ReportFilter {
                template,
                patient,
                ..ReportFilter::default()
            };
            for r in app.list_reports(user, &filter) {
                println!("[{}] {} {}", r.id, r, r.created_at.format("%d/%m/%Y %H:%M"));
            }
        }
        ReportCommand::Show { id } => {
            let d = app.report_detail(user, id)?;
            println!("{}", d.report);
            println!("Paciente: {}", d.report.patient_name);
            println!("Médico: {}", d.report.doctor_name);
            if let Some(name) = &d.template_name {
                println!("Plantilla: {name}");
            }
            println!("Fecha: {}", d.report.created_at.format("%d/%m/%Y %H:%M"));
            println!("\n{}", d.report.report_content);
            if !d.recipients.is_empty() {
                println!("\nDestinatarios disponibles:");
                for r in &d.recipients {
                    println!("  [{}] {} <{}>", r.id, r, r.email);
                }
            }
        }
        ReportCommand::Pdf { id, output } => {
            let download = app.report_pdf(user, id)?;
            let output = output.unwrap_or_else(|| PathBuf::from(&download.filename));
            write_output(&output, &download.bytes)?;
            eprintln!("Wrote '{}' ({} bytes)", output.display(), download.bytes.len());
        }
        ReportCommand::Regenerate { id } => print_flash(app.regenerate_report_pdf(user, id)?),
        ReportCommand::Send {
            id,
            dentist,
            subject,
            message,
        } => print_flash(app.send_report(user, id, dentist, subject.as_deref(), message.as_deref())?),
    }
    Ok(())
}

fn clinic(app: &mut App, user: &User, cmd: RecordCommand) -> Result<()> {
    match cmd {
        RecordCommand::List => {
            for c in app.list_clinics(user) {
                println!("[{}] {}", c.id, c);
            }
        }
        RecordCommand::Create(f) => print_flash(app.create_clinic(user, &f.data())?),
        RecordCommand::Show { id } => {
            let d = app.clinic_detail(user, id)?;
            println!("{}", d.clinic);
            for (label, value) in [
                ("Dirección", &d.clinic.address),
                ("Teléfono", &d.clinic.phone),
                ("Email", &d.clinic.email),
                ("Web", &d.clinic.website),
            ] {
                if !value.is_empty() {
                    println!("{label}: {value}");
                }
            }
            println!("\nContactos:");
            for dentist in &d.dentists {
                println!("  [{}] {} <{}>", dentist.id, dentist, dentist.email);
            }
        }
        RecordCommand::Edit { id, fields } => {
            let data = fields.overlay(app.clinic_initial(id)?);
            print_flash(app.edit_clinic(user, id, &data)?);
        }
        RecordCommand::Delete { id } => print_flash(app.delete_clinic(user, id)?),
    }
    Ok(())
}

fn dentist(app: &mut App, user: &User, cmd: DentistCommand) -> Result<()> {
    match cmd {
        DentistCommand::List { clinic } => {
            let list = app.list_dentists(user, clinic)?;
            if let Some(c) = &list.selected {
                println!("Clínica: {c}");
            }
            for d in &list.dentists {
                let state = if d.is_active { "" } else { " (inactivo)" };
                println!("[{}] {} <{}>{}", d.id, d, d.email, state);
            }
        }
        DentistCommand::Create(f) => print_flash(app.create_dentist(user, &f.data())?),
        DentistCommand::Show { id } => {
            let d = app.dentist_detail(user, id)?;
            println!("{}", d.dentist);
            println!("Email: {}", d.dentist.email);
            if !d.dentist.phone.is_empty() {
                println!("Teléfono: {}", d.dentist.phone);
            }
            if let Some(c) = &d.clinic {
                println!("Clínica: {c}");
            }
            if !d.dentist.notes.is_empty() {
                println!("Notas: {}", d.dentist.notes);
            }
        }
        DentistCommand::Edit { id, fields } => {
            let data = fields.overlay(app.dentist_initial(id)?);
            print_flash(app.edit_dentist(user, id, &data)?);
        }
        DentistCommand::Delete { id } => print_flash(app.delete_dentist(user, id)?),
    }
    Ok(())
}

/// Direct HTML to PDF conversion.
fn render(config: &AppConfig, args: &RenderArgs) -> Result<()> {
    let html = fs::read_to_string(&args.input)?;

    // Default output: same directory + same stem as input, but with .pdf
    let output = args.output.clone().unwrap_or_else(|| {
        let mut o = args.input.clone();
        o.set_extension("pdf");
        o
    });

    // Default title: stem of the input filename.
    let title = args.title.clone().unwrap_or_else(|| {
        args.input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("informe")
            .to_string()
    });

    let html = if args.raw {
        html
    } else {
        wrap_report_html(&html, &title)
    };
    let html = MediaStore::new(&config.media_dir).inline_images(&html);

    let mut pipeline = config.pdf.pipeline_config();
    pipeline.title = title;
    if args.landscape {
        pipeline.orientation = PageOrientation::Landscape;
    }

    let (bytes, layout) = generate_pdf(&html, &pipeline)?;
    write_output(&output, &bytes)?;
    let pages = layout.pages.len();
    eprintln!(
        "Wrote '{}' ({} bytes, {} page{})",
        output.display(),
        bytes.len(),
        pages,
        if pages == 1 { "" } else { "s" }
    );
    Ok(())
}

/// Write `bytes`, creating the output directory if necessary.
fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["dental-reports", "home"]);
        assert_eq!(cli.config, PathBuf::from("dental-reports.toml"));
        assert!(!cli.superuser);
        assert!(matches!(cli.command, Command::Home));
    }

    #[test]
    fn global_options_after_the_subcommand() {
        let cli = Cli::parse_from([
            "dental-reports",
            "report",
            "list",
            "--patient",
            "juan",
            "--user",
            "ana",
            "--superuser",
        ]);
        assert_eq!(cli.acting_user(), User::superuser("ana"));
        match cli.command {
            Command::Report(ReportCommand::List { patient, template }) => {
                assert_eq!(patient.as_deref(), Some("juan"));
                assert_eq!(template, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn repeated_fields_become_form_data() {
        let cli = Cli::parse_from([
            "dental-reports",
            "report",
            "generate",
            "3",
            "--field",
            "patient_name=Juan Pérez",
            "-f",
            "nota=a=b",
        ]);
        let Command::Report(ReportCommand::Generate { template, fields }) = cli.command else {
            panic!("expected report generate");
        };
        assert_eq!(template, 3);
        let data = fields.data();
        assert_eq!(data["patient_name"], "Juan Pérez");
        assert_eq!(data["nota"], "a=b");
    }

    #[test]
    fn malformed_field_is_rejected() {
        assert!(parse_field("sin_valor").is_err());
        assert!(parse_field("=x").is_err());
        assert_eq!(parse_field("a=").unwrap(), ("a".to_string(), String::new()));
    }

    #[test]
    fn edit_overlays_given_fields() {
        let mut initial = FormData::new();
        initial.insert("name".into(), "Viejo".into());
        initial.insert("description".into(), "igual".into());
        let args = FieldArgs {
            fields: vec![("name".into(), "Nuevo".into())],
        };
        let data = args.overlay(initial);
        assert_eq!(data["name"], "Nuevo");
        assert_eq!(data["description"], "igual");
    }

    #[test]
    fn block_documents_accept_string_ids() {
        let draft = draft_from_json(&json!({
            "template_id": "7",
            "name": "Visual",
            "category_id": 2,
            "specialty_id": "",
            "blocks": [{"content": "<p>x</p>"}],
        }));
        assert_eq!(draft.template_id, Some(7));
        assert_eq!(draft.category, Some(2));
        assert_eq!(draft.specialty, None);
        assert_eq!(draft.blocks.len(), 1);
        assert!(draft.fields.is_none());
    }

    #[test]
    fn render_writes_a_pdf_next_to_the_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("carta.html");
        fs::write(&input, "<h1>Carta</h1><p>Texto</p>").unwrap();
        let config = AppConfig {
            media_dir: dir.path().join("media"),
            ..AppConfig::default()
        };
        let args = RenderArgs {
            input: input.clone(),
            output: None,
            landscape: true,
            title: None,
            raw: false,
        };
        render(&config, &args).unwrap();
        let pdf = fs::read(dir.path().join("carta.pdf")).unwrap();
        assert_eq!(&pdf[..5], b"%PDF-");
    }
}
