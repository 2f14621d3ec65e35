//! Storage for generated files under a media root.

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use chrono::{DateTime, Datelike, Utc};

use crate::error::Result;

/// URL prefix under which stored media is referenced from report HTML.
pub const MEDIA_URL: &str = "/media/";

/// Files stored below a root directory, addressed by relative paths such as
/// `reports/2025/05/informe_Juan_Endodoncia.pdf`.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a stored file.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Save a report PDF under `reports/{YYYY}/{MM}/`. An existing file of
    /// the same name is never overwritten; `_1`, `_2`, ... is appended to the
    /// stem instead. Returns the relative path of the new file.
    pub fn save_report_pdf(&self, filename: &str, bytes: &[u8], at: DateTime<Utc>) -> Result<String> {
        let dir = format!("reports/{:04}/{:02}", at.year(), at.month());
        fs::create_dir_all(self.root.join(&dir))?;

        let (stem, ext) = split_extension(filename);
        let mut candidate = filename.to_string();
        let mut n = 1;
        while self.root.join(&dir).join(&candidate).exists() {
            candidate = format!("{stem}_{n}{ext}");
            n += 1;
        }

        let relative = format!("{dir}/{candidate}");
        fs::write(self.root.join(&relative), bytes)?;
        log::debug!("stored {} ({} bytes)", relative, bytes.len());
        Ok(relative)
    }

    pub fn read(&self, relative: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.path(relative))?)
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).is_file()
    }

    /// Delete a stored file. Failures are logged, not returned.
    pub fn delete(&self, relative: &str) {
        if let Err(e) = fs::remove_file(self.path(relative)) {
            log::warn!("could not delete media file '{relative}': {e}");
        }
    }

    /// Rewrite `src="/media/..."` image references into base64 data URIs so
    /// the PDF renderer can embed them. Missing files keep their original
    /// reference.
    pub fn inline_images(&self, html: &str) -> String {
        let mut out = String::with_capacity(html.len());
        let mut rest = html;
        let needle = format!("src=\"{MEDIA_URL}");

        while let Some(start) = rest.find(&needle) {
            let value_start = start + "src=\"".len();
            let Some(len) = rest[value_start..].find('"') else {
                break;
            };
            let uri = &rest[value_start..value_start + len];
            out.push_str(&rest[..value_start]);
            match self.data_uri(&uri[MEDIA_URL.len()..]) {
                Some(data) => out.push_str(&data),
                None => {
                    log::warn!("media URI {uri} not found");
                    out.push_str(uri);
                }
            }
            rest = &rest[value_start + len..];
        }
        out.push_str(rest);
        out
    }

    fn data_uri(&self, relative: &str) -> Option<String> {
        if relative.split('/').any(|part| part == "..") {
            return None;
        }
        let mime = match Path::new(relative)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            _ => return None,
        };
        let bytes = fs::read(self.path(relative)).ok()?;
        Some(format!("data:{mime};base64,{}", BASE64_STD.encode(bytes)))
    }
}

/// `("informe", ".pdf")` for `informe.pdf`.
fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(i) if i > 0 => (&filename[..i], &filename[i..]),
        _ => (filename, ""),
    }
}

/// Turn free text into a file name: spaces become `_`, path separators are
/// dropped.
pub fn file_name_component(text: &str) -> String {
    text.trim()
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn may_2025() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 8, 10, 0, 0).unwrap()
    }

    #[test]
    fn reports_are_filed_by_year_and_month() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path());
        let rel = media.save_report_pdf("informe.pdf", b"%PDF-1", may_2025()).unwrap();
        assert_eq!(rel, "reports/2025/05/informe.pdf");
        assert_eq!(media.read(&rel).unwrap(), b"%PDF-1");
    }

    #[test]
    fn clashing_names_get_a_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path());
        let a = media.save_report_pdf("informe.pdf", b"a", may_2025()).unwrap();
        let b = media.save_report_pdf("informe.pdf", b"b", may_2025()).unwrap();
        let c = media.save_report_pdf("informe.pdf", b"c", may_2025()).unwrap();
        assert_eq!(a, "reports/2025/05/informe.pdf");
        assert_eq!(b, "reports/2025/05/informe_1.pdf");
        assert_eq!(c, "reports/2025/05/informe_2.pdf");
    }

    #[test]
    fn delete_of_missing_file_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path());
        let rel = media.save_report_pdf("x.pdf", b"x", may_2025()).unwrap();
        media.delete(&rel);
        assert!(!media.exists(&rel));
        media.delete(&rel);
    }

    #[test]
    fn media_images_become_data_uris() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("logos")).unwrap();
        fs::write(dir.path().join("logos/clinica.png"), b"png").unwrap();
        let media = MediaStore::new(dir.path());

        let html = r#"<img src="/media/logos/clinica.png"><img src="/media/none.png"><img src="http://x/y.png">"#;
        let out = media.inline_images(html);
        assert_eq!(
            out,
            r#"<img src="data:image/png;base64,cG5n"><img src="/media/none.png"><img src="http://x/y.png">"#
        );
    }

    #[test]
    fn file_names_from_free_text() {
        assert_eq!(file_name_component(" Juan Pérez "), "Juan_Pérez");
        assert_eq!(file_name_component("a/b"), "ab");
    }
}
