//! The printable report document: rendered template content wrapped in the
//! report stylesheet.

/// Footer drawn on every page of a report; see
/// [`crate::pagination::add_page_footers`].
pub const DEFAULT_FOOTER: &str = "Página {page} de {pages}";

const REPORT_STYLESHEET: &str = r#"
@page { size: A4; margin: 2cm; }
body { font-family: "DejaVu Sans", sans-serif; font-size: 12px; line-height: 1.5; }
h1 { font-size: 18px; text-align: center; color: #2c3e50; margin-bottom: 20px; }
h2 { font-size: 16px; color: #3498db; margin-top: 15px; }
h3 { font-size: 14px; color: #2c3e50; }
table { width: 100%; margin-bottom: 15px; }
table, th, td { border: 1px solid #ddd; }
th, td { padding: 8px; text-align: left; }
th { background-color: #f2f2f2; font-weight: bold; }
img { max-width: 100%; }
.header { display: table; width: 100%; margin-bottom: 20px; }
.header-left { display: table-cell; width: 50%; }
.header-right { display: table-cell; width: 50%; text-align: right; }
"#;

/// Wrap `content` in a complete HTML document carrying the report
/// stylesheet. `title` is escaped; `content` is inserted as-is.
pub fn wrap_report_html(content: &str, title: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n\
         <title>{}</title>\n<style>{REPORT_STYLESHEET}</style>\n</head>\n\
         <body>\n{content}\n</body>\n</html>\n",
        tera::escape_html(title)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{collect_stylesheets, document_title, parse_html};
    use crate::style::Stylesheet;

    #[test]
    fn wrapped_document_declares_a4_with_2cm_margin() {
        let html = wrap_report_html("<p>x</p>", "Informe Dental");
        let dom = parse_html(&html);
        let sheet = Stylesheet::parse(&collect_stylesheets(&dom));
        assert_eq!(sheet.page.size, Some((595.28, 841.89)));
        let margin = sheet.page.margin.unwrap();
        assert!((margin - 56.69).abs() < 0.01);
    }

    #[test]
    fn title_is_escaped() {
        let html = wrap_report_html("", "Juan & <Ana>");
        let dom = parse_html(&html);
        assert_eq!(document_title(&dom).as_deref(), Some("Juan & <Ana>"));
        assert!(html.contains("Juan &amp; &lt;Ana&gt;"));
    }
}
