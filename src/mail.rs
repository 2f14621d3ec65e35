//! Report delivery by email.

use std::fs;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, FileTransport, Message, SmtpTransport, Transport};

use crate::config::{MailSettings, MailTransport};
use crate::error::{Error, Result};
use crate::media::file_name_component;
use crate::models::{DentistContact, GeneratedReport};

/// Content of a report email.
#[derive(Debug, Clone)]
pub struct ReportEmail {
    pub subject: String,
    pub text: String,
    pub attachment_name: String,
    pub pdf: Vec<u8>,
}

impl ReportEmail {
    /// Email for `report`, with the default subject and text unless given.
    pub fn for_report(
        report: &GeneratedReport,
        subject: Option<&str>,
        text: Option<&str>,
        pdf: Vec<u8>,
    ) -> Self {
        let subject = subject
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Informe dental: {}", report.title));
        let text = text
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "Adjuntamos el informe dental {} para el paciente {}.",
                    report.title, report.patient_name
                )
            });
        Self {
            subject,
            text,
            attachment_name: format!("Informe_{}.pdf", file_name_component(&report.title)),
            pdf,
        }
    }

    fn html(&self) -> String {
        format!("<p>{}</p>", tera::escape_html(&self.text))
    }
}

/// Sends report emails through the configured transport.
#[derive(Debug, Clone)]
pub struct Mailer {
    settings: MailSettings,
}

impl Mailer {
    pub fn new(settings: MailSettings) -> Self {
        Self { settings }
    }

    /// Assemble the multipart message: text and HTML alternatives plus the
    /// PDF attachment.
    pub fn build_message(&self, to: &DentistContact, email: &ReportEmail) -> Result<Message> {
        let address: Address = to.email.parse()?;
        let recipient = Mailbox::new(Some(to.full_name()), address);
        let pdf_type = ContentType::parse("application/pdf")
            .map_err(|e| Error::Mail(e.to_string()))?;

        let body = MultiPart::mixed()
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(email.text.clone()))
                    .singlepart(SinglePart::html(email.html())),
            )
            .singlepart(Attachment::new(email.attachment_name.clone()).body(email.pdf.clone(), pdf_type));

        Ok(Message::builder()
            .from(self.settings.from.parse()?)
            .to(recipient)
            .subject(email.subject.clone())
            .multipart(body)?)
    }

    /// Build and deliver the message.
    pub fn send(&self, to: &DentistContact, email: &ReportEmail) -> Result<()> {
        let message = self.build_message(to, email)?;
        match self.settings.transport {
            MailTransport::Smtp => {
                let mut builder = SmtpTransport::starttls_relay(&self.settings.smtp_host)
                    .map_err(|e| Error::Mail(e.to_string()))?
                    .port(self.settings.smtp_port);
                if let (Some(user), Some(pass)) =
                    (&self.settings.smtp_user, &self.settings.smtp_password)
                {
                    builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
                }
                builder
                    .build()
                    .send(&message)
                    .map_err(|e| Error::Mail(e.to_string()))?;
            }
            MailTransport::File => {
                fs::create_dir_all(&self.settings.outbox_dir)?;
                FileTransport::new(&self.settings.outbox_dir)
                    .send(&message)
                    .map_err(|e| Error::Mail(e.to_string()))?;
            }
        }
        log::info!("report email '{}' sent to {}", email.subject, to.email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn report() -> GeneratedReport {
        GeneratedReport {
            id: 1,
            template: None,
            patient_name: "Juan Perez".to_string(),
            doctor_name: "Dra. Lopez".to_string(),
            title: "Informe para Juan Perez - Periodoncia".to_string(),
            report_content: String::new(),
            form_data: json!({}),
            pdf_file: None,
            created_by: None,
            created_at: Utc::now(),
            version: 1,
        }
    }

    fn dentist(email: &str) -> DentistContact {
        DentistContact {
            id: 1,
            first_name: "Laura".to_string(),
            last_name: "Martinez".to_string(),
            email: email.to_string(),
            phone: String::new(),
            address: String::new(),
            clinic: None,
            notes: String::new(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn default_subject_and_text() {
        let email = ReportEmail::for_report(&report(), None, Some("  "), Vec::new());
        assert_eq!(email.subject, "Informe dental: Informe para Juan Perez - Periodoncia");
        assert_eq!(
            email.text,
            "Adjuntamos el informe dental Informe para Juan Perez - Periodoncia para el paciente Juan Perez."
        );
        assert_eq!(email.attachment_name, "Informe_Informe_para_Juan_Perez_-_Periodoncia.pdf");
    }

    #[test]
    fn file_transport_writes_an_eml() {
        let dir = tempfile::tempdir().unwrap();
        let settings = MailSettings {
            from: "informes@clinica.example".to_string(),
            transport: MailTransport::File,
            outbox_dir: dir.path().join("outbox"),
            ..MailSettings::default()
        };
        let mailer = Mailer::new(settings);
        let email = ReportEmail::for_report(&report(), Some("Informe"), None, b"%PDF-1.7".to_vec());
        mailer.send(&dentist("laura@example.com"), &email).unwrap();

        let files: Vec<_> = fs::read_dir(dir.path().join("outbox"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        let eml = fs::read_to_string(&files[0]).unwrap();
        assert!(eml.contains("laura@example.com"));
        assert!(eml.contains("application/pdf"));
        assert!(eml.contains("Subject: Informe"));
    }

    #[test]
    fn invalid_recipient_is_a_mail_error() {
        let mailer = Mailer::new(MailSettings::default());
        let email = ReportEmail::for_report(&report(), None, None, Vec::new());
        let err = mailer.build_message(&dentist("no-es-un-email"), &email).unwrap_err();
        assert!(matches!(err, Error::Mail(_)));
    }
}
