//! Crate-wide error type.
//!
//! The `Display` text of every variant is what a user sees as the failure
//! message of an operation, so variants carry the context needed to phrase it.

use thiserror::Error;

use crate::forms::FormErrors;

/// Errors produced by record storage, rendering, PDF generation and delivery.
#[derive(Debug, Error)]
pub enum Error {
    /// A record lookup by id found nothing.
    #[error("{entity} con id {id} no encontrado")]
    NotFound { entity: &'static str, id: u64 },

    /// A record refers to another record that does not exist.
    #[error("{entity} con id {id} no existe")]
    Reference { entity: &'static str, id: u64 },

    /// The acting user may not perform the operation.
    #[error("{0}")]
    PermissionDenied(String),

    /// Submitted form data failed validation.
    #[error("Formulario inválido: {0}")]
    InvalidForm(FormErrors),

    /// `tera` rejected the rendering context.
    #[error("Error al generar el informe: {0}")]
    Template(#[from] tera::Error),

    /// The template body could not be parsed or rendered.
    #[error("Error al generar el informe: {0}")]
    Render(String),

    /// The HTML could not be converted to PDF.
    #[error("Error al generar el PDF: {0}")]
    Pdf(String),

    /// No recipient was chosen when sending a report.
    #[error("Por favor selecciona un destinatario.")]
    MissingRecipient,

    /// The email could not be built or delivered.
    #[error("Error al enviar el correo: {0}")]
    Mail(String),

    /// The configuration file is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(entity: &'static str, id: u64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn reference(entity: &'static str, id: u64) -> Self {
        Self::Reference { entity, id }
    }
}

impl From<lettre::error::Error> for Error {
    fn from(e: lettre::error::Error) -> Self {
        Self::Mail(e.to_string())
    }
}

impl From<lettre::address::AddressError> for Error {
    fn from(e: lettre::address::AddressError) -> Self {
        Self::Mail(format!("dirección inválida: {e}"))
    }
}

impl From<taffy::TaffyError> for Error {
    fn from(e: taffy::TaffyError) -> Self {
        Self::Pdf(format!("layout: {e}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message() {
        let err = Error::not_found("Plantilla", 7);
        assert_eq!(err.to_string(), "Plantilla con id 7 no encontrado");
    }

    #[test]
    fn missing_recipient_message() {
        assert_eq!(
            Error::MissingRecipient.to_string(),
            "Por favor selecciona un destinatario."
        );
    }

    #[test]
    fn render_error_is_prefixed() {
        let err = Error::Render("boom".to_string());
        assert_eq!(err.to_string(), "Error al generar el informe: boom");
    }
}
