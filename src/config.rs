//! Application configuration, read from a TOML file.
//!
//! Every key is optional; a missing file yields the defaults.
//!
//! ```toml
//! data_dir = "data"
//! media_dir = "media"
//!
//! [pdf]
//! title = "Informe Dental"
//! orientation = "portrait"
//! footer = "Página {page} de {pages}"
//!
//! [mail]
//! from = "informes@clinica.example"
//! transport = "smtp"
//! smtp_host = "smtp.clinica.example"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;
use crate::pipeline::{PageOrientation, PipelineConfig};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the record store (`dental_reports.json`).
    pub data_dir: PathBuf,
    /// Root directory for generated PDF files.
    pub media_dir: PathBuf,
    pub pdf: PdfSettings,
    pub mail: MailSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            media_dir: PathBuf::from("media"),
            pdf: PdfSettings::default(),
            mail: MailSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load the configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at '{}', using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Path of the JSON record store.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("dental_reports.json")
    }
}

/// Settings for the HTML → PDF step.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PdfSettings {
    /// Document title embedded in the PDF metadata.
    pub title: String,
    /// `portrait` or `landscape`.
    pub orientation: String,
    /// Page margin in points. When unset, the stylesheet's `@page` margin
    /// applies.
    pub margin_pt: Option<f32>,
    /// Footer drawn on every page; `{page}` and `{pages}` are substituted.
    /// An empty string disables the footer.
    pub footer: String,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            title: "Informe Dental".to_string(),
            orientation: "portrait".to_string(),
            margin_pt: None,
            footer: crate::document::DEFAULT_FOOTER.to_string(),
        }
    }
}

impl PdfSettings {
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig {
            title: self.title.clone(),
            orientation: if self.orientation.eq_ignore_ascii_case("landscape") {
                PageOrientation::Landscape
            } else {
                PageOrientation::Portrait
            },
            footer: if self.footer.is_empty() {
                None
            } else {
                Some(self.footer.clone())
            },
            ..PipelineConfig::default()
        };
        if let Some(margin) = self.margin_pt {
            config.page_margin = margin;
            config.margin_locked = true;
        }
        config
    }
}

/// How report emails leave the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    Smtp,
    /// Write `.eml` files into `outbox_dir`.
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    pub from: String,
    pub transport: MailTransport,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub outbox_dir: PathBuf,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            from: "informes@localhost".to_string(),
            transport: MailTransport::File,
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
            outbox_dir: PathBuf::from("outbox"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = AppConfig::from_toml("").unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert_eq!(cfg.mail.transport, MailTransport::File);
        assert_eq!(cfg.pdf.title, "Informe Dental");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            media_dir = "/srv/media"
            [pdf]
            orientation = "landscape"
            margin_pt = 30.0
            [mail]
            transport = "smtp"
            smtp_host = "smtp.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.media_dir, PathBuf::from("/srv/media"));
        assert_eq!(cfg.mail.transport, MailTransport::Smtp);
        assert_eq!(cfg.mail.smtp_port, 587);

        let pipeline = cfg.pdf.pipeline_config();
        assert_eq!(pipeline.orientation, PageOrientation::Landscape);
        assert_eq!(pipeline.page_margin, 30.0);
        assert!(pipeline.margin_locked);
    }

    #[test]
    fn empty_footer_disables_it() {
        let cfg = AppConfig::from_toml("[pdf]\nfooter = \"\"").unwrap();
        assert!(cfg.pdf.pipeline_config().footer.is_none());
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = AppConfig::from_toml("data_dir = [").unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.store_path(), PathBuf::from("data/dental_reports.json"));
    }
}
