//! Placeholder substitution for report templates.
//!
//! Templates are rendered with `tera`, whose syntax matches the
//! Django-style markup of stored templates closely. Two Django behaviours
//! are kept on top of it:
//!
//! - `{% now "d/m/Y" %}` expands to the current local date;
//! - a variable the context does not define renders as an empty string (and
//!   is false in `{% if %}`) instead of failing the whole report.

use std::error::Error as StdError;

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use serde_json::{json, Map, Value};
use tera::{Context, Tera};

use crate::error::{Error, Result};
use crate::forms::CleanedData;

/// Build the rendering context of a report.
///
/// ```text
/// paciente.nombre        patient name
/// medico.nombre          doctor name
/// medico.especialidad    specialty of the template, or ""
/// datos.*                every cleaned form value
/// ```
pub fn build_context(
    patient: &str,
    doctor: &str,
    specialty: Option<&str>,
    data: &CleanedData,
) -> Value {
    json!({
        "paciente": { "nombre": patient },
        "medico": {
            "nombre": doctor,
            "especialidad": specialty.unwrap_or_default(),
        },
        "datos": Value::Object(data.clone()),
    })
}

/// Render `html` against `context` at the current local time.
pub fn render_template(html: &str, context: &Value) -> Result<String> {
    render_template_at(html, context, Local::now().naive_local())
}

/// Render `html` against `context`, expanding `{% now %}` with `now`.
pub fn render_template_at(html: &str, context: &Value, now: NaiveDateTime) -> Result<String> {
    let source = expand_now(html, now);

    let mut value = match context {
        Value::Object(_) => context.clone(),
        _ => Value::Object(Map::new()),
    };
    for path in referenced_paths(&source) {
        fill_missing(&mut value, &path);
    }

    let ctx = Context::from_value(value)?;
    Tera::one_off(&source, &ctx, true).map_err(|e| {
        let detail = error_chain(&e);
        log::warn!("template rendering failed: {detail}");
        Error::Render(detail)
    })
}

/// `tera` reports the useful detail in the error's sources.
fn error_chain(e: &tera::Error) -> String {
    let mut msg = e.to_string();
    let mut source = StdError::source(e);
    while let Some(s) = source {
        msg.push_str(": ");
        msg.push_str(&s.to_string());
        source = s.source();
    }
    msg
}

// ---------------------------------------------------------------------------
// {% now %}
// ---------------------------------------------------------------------------

const MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

const WEEKDAYS: [&str; 7] = [
    "lunes",
    "martes",
    "miércoles",
    "jueves",
    "viernes",
    "sábado",
    "domingo",
];

/// Replace every `{% now "<format>" %}` tag with the formatted `now`.
fn expand_now(html: &str, now: NaiveDateTime) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(start) = rest.find("{%") {
        let Some(len) = rest[start + 2..].find("%}") else {
            break;
        };
        let end = start + 2 + len;
        let tag = &rest[start + 2..end];
        out.push_str(&rest[..start]);
        match now_format(tag) {
            Some(format) => out.push_str(&format_django_date(format, now)),
            None => out.push_str(&rest[start..end + 2]),
        }
        rest = &rest[end + 2..];
    }
    out.push_str(rest);
    out
}

/// The quoted format of a `now` tag body, e.g. ` now "d/m/Y" `.
fn now_format(tag: &str) -> Option<&str> {
    let args = tag.trim().strip_prefix("now")?;
    if !args.starts_with(char::is_whitespace) {
        return None;
    }
    let args = args.trim();
    let quote = args.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    args[1..].strip_suffix(quote)
}

/// Format `dt` with Django's date-format letters.
pub fn format_django_date(format: &str, dt: NaiveDateTime) -> String {
    let mut out = String::new();
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            'd' => out.push_str(&format!("{:02}", dt.day())),
            'j' => out.push_str(&dt.day().to_string()),
            'm' => out.push_str(&format!("{:02}", dt.month())),
            'n' => out.push_str(&dt.month().to_string()),
            'Y' => out.push_str(&dt.year().to_string()),
            'y' => out.push_str(&format!("{:02}", dt.year().rem_euclid(100))),
            'H' => out.push_str(&format!("{:02}", dt.hour())),
            'G' => out.push_str(&dt.hour().to_string()),
            'i' => out.push_str(&format!("{:02}", dt.minute())),
            's' => out.push_str(&format!("{:02}", dt.second())),
            'F' => out.push_str(MONTHS[dt.month0() as usize]),
            'M' => out.extend(MONTHS[dt.month0() as usize].chars().take(3)),
            'l' => out.push_str(WEEKDAYS[dt.weekday().num_days_from_monday() as usize]),
            'D' => out.extend(
                WEEKDAYS[dt.weekday().num_days_from_monday() as usize]
                    .chars()
                    .take(3),
            ),
            other => out.push(other),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Undefined variables
// ---------------------------------------------------------------------------

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "true", "false", "True", "False", "none", "None", "loop",
    "defined", "undefined",
];

/// Variable paths used in `{{ … }}` and in `{% if %}` / `{% elif %}`.
fn referenced_paths(source: &str) -> Vec<Vec<String>> {
    let mut paths = Vec::new();
    let mut rest = source;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let (close, is_tag) = match after.chars().next() {
            Some('{') => ("}}", false),
            Some('%') => ("%}", true),
            _ => {
                rest = after;
                continue;
            }
        };
        let Some(end) = after[1..].find(close) else {
            break;
        };
        let body = after[1..1 + end].trim().trim_matches('-').trim();
        let expr = if is_tag {
            body.strip_prefix("if ")
                .or_else(|| body.strip_prefix("elif "))
                .unwrap_or("")
        } else {
            body
        };
        paths.extend(expression_paths(expr));
        rest = &after[1 + end + close.len()..];
    }
    paths
}

/// Dotted identifiers of an expression, skipping literals, filters, function
/// calls and keyword arguments.
fn expression_paths(expr: &str) -> Vec<Vec<String>> {
    let bytes = expr.as_bytes();
    let mut paths = Vec::new();
    let mut i = 0;
    let mut prev_significant = b' ';

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'"' || b == b'\'' || b == b'`' {
            i += 1;
            while i < bytes.len() && bytes[i] != b {
                i += 1;
            }
            i += 1;
            prev_significant = b;
            continue;
        }
        if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
            {
                i += 1;
            }
            let token = &expr[start..i];
            let next = expr[i..].trim_start().bytes().next();
            let is_filter = prev_significant == b'|';
            let is_call_or_kwarg = matches!(next, Some(b'(') | Some(b'='))
                && !expr[i..].trim_start().starts_with("==");
            if !is_filter && !is_call_or_kwarg && !KEYWORDS.contains(&token) {
                let path: Vec<String> = token
                    .split('.')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if !path.is_empty() {
                    paths.push(path);
                }
            }
            prev_significant = b'a';
            continue;
        }
        if b.is_ascii_digit() {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            prev_significant = b'0';
            continue;
        }
        if !b.is_ascii_whitespace() {
            prev_significant = b;
        }
        i += 1;
    }
    paths
}

/// Insert `""` at `path` unless something is already there.
fn fill_missing(value: &mut Value, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = value;
    for key in parents {
        current = match current {
            Value::Object(map) => map
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }
    if let Value::Object(map) = current {
        map.entry(last.clone())
            .or_insert_with(|| Value::String(String::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 8)
            .unwrap()
            .and_hms_opt(9, 5, 3)
            .unwrap()
    }

    fn context() -> Value {
        let mut data = CleanedData::new();
        data.insert("diente".into(), json!("36"));
        data.insert("requiere_cirugia".into(), json!("Sí"));
        build_context("Juan Pérez", "Dra. Ana López", Some("Endodoncia"), &data)
    }

    #[test]
    fn nested_context_values_are_substituted() {
        let html = "<p>{{paciente.nombre}} / {{ medico.nombre }} ({{medico.especialidad}}): {{datos.diente}}</p>";
        let out = render_template_at(html, &context(), at()).unwrap();
        assert_eq!(out, "<p>Juan Pérez / Dra. Ana López (Endodoncia): 36</p>");
    }

    #[test]
    fn values_are_html_escaped() {
        let ctx = build_context("<b>Juan</b>", "", None, &CleanedData::new());
        let out = render_template_at("{{ paciente.nombre }}", &ctx, at()).unwrap();
        assert_eq!(out, "&lt;b&gt;Juan&lt;&#x2F;b&gt;");
    }

    #[test]
    fn now_tag_uses_django_letters() {
        let out = render_template_at(r#"Fecha: {% now "d/m/Y" %}"#, &context(), at()).unwrap();
        assert_eq!(out, "Fecha: 08/05/2025");
        assert_eq!(format_django_date("j \\d\\e F \\d\\e Y, H:i", at()), "8 de mayo de 2025, 09:05");
        assert_eq!(format_django_date("D y n G s", at()), "jue 25 5 9 03");
        assert_eq!(format_django_date("l M", at()), "jueves may");
    }

    #[test]
    fn missing_variables_render_empty() {
        let out = render_template_at("[{{ datos.alergias }}][{{ otro }}]", &context(), at()).unwrap();
        assert_eq!(out, "[][]");
    }

    #[test]
    fn if_blocks_compare_values_and_tolerate_missing_ones() {
        let html = r#"{% if datos.requiere_cirugia == "Sí" %}cirugía{% endif %}{% if datos.nada %}x{% elif datos.tampoco == "a" %}y{% else %}z{% endif %}"#;
        let out = render_template_at(html, &context(), at()).unwrap();
        assert_eq!(out, "cirugíaz");
    }

    #[test]
    fn filters_are_not_treated_as_variables() {
        let out = render_template_at("{{ paciente.nombre | upper }}", &context(), at()).unwrap();
        assert_eq!(out, "JUAN PÉREZ");
    }

    #[test]
    fn syntax_errors_are_render_errors() {
        let err = render_template_at("{% if %}", &context(), at()).unwrap_err();
        assert!(matches!(err, Error::Render(_)));
        assert!(err.to_string().starts_with("Error al generar el informe: "));
    }

    #[test]
    fn unterminated_tag_opener_is_a_render_error() {
        let err = render_template_at("<p>100{%}</p>", &context(), at()).unwrap_err();
        assert!(matches!(err, Error::Render(_)));
        assert_eq!(expand_now("10{%}", at()), "10{%}");
        assert_eq!(expand_now(r#"{%}{% now "Y" %}"#, at()), "{%}{% now \"Y\" %}");
    }

    #[test]
    fn path_scanner_skips_literals_and_keywords() {
        let paths = expression_paths(r#"datos.a == "x.y" and not datos.b | default(value=1)"#);
        assert_eq!(
            paths,
            vec![
                vec!["datos".to_string(), "a".to_string()],
                vec!["datos".to_string(), "b".to_string()]
            ]
        );
    }
}
