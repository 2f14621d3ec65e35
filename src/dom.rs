//! HTML parser – converts an HTML string into a simple DOM tree.
//!
//! We support the controlled subset that report templates use:
//! - Block: div, p, h1-h6, ul, ol, li, table, tr, td, th, hr
//! - Inline: span, strong, b, em, i, u, br, img
//! - Document structure: html, head, body, title, style, meta, link
//!
//! `thead`, `tbody` and `tfoot` are transparent: their rows are attached to the
//! enclosing table.

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// The tag name of a supported element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Div,
    P,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Ul,
    Ol,
    Li,
    Table,
    Tr,
    Td,
    Th,
    Span,
    Strong,
    B,
    Em,
    I,
    U,
    Br,
    Hr,
    Img,
    Body,
    Html,
    Head,
    Title,
    Style,
    Meta,
    Link,
    /// Row groups, unwrapped by the parser.
    RowGroup,
    /// Catch-all for unknown tags – they are kept but never displayed.
    Unknown(String),
}

impl Tag {
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "div" => Tag::Div,
            "p" => Tag::P,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "h4" => Tag::H4,
            "h5" => Tag::H5,
            "h6" => Tag::H6,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "table" => Tag::Table,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "span" => Tag::Span,
            "strong" => Tag::Strong,
            "b" => Tag::B,
            "em" => Tag::Em,
            "i" => Tag::I,
            "u" => Tag::U,
            "br" => Tag::Br,
            "hr" => Tag::Hr,
            "img" => Tag::Img,
            "body" => Tag::Body,
            "html" => Tag::Html,
            "head" => Tag::Head,
            "title" => Tag::Title,
            "style" => Tag::Style,
            "meta" => Tag::Meta,
            "link" => Tag::Link,
            "thead" | "tbody" | "tfoot" => Tag::RowGroup,
            _ => Tag::Unknown(s.to_string()),
        }
    }

    /// Lower-case name as written in HTML and matched by CSS selectors.
    pub fn name(&self) -> &str {
        match self {
            Tag::Div => "div",
            Tag::P => "p",
            Tag::H1 => "h1",
            Tag::H2 => "h2",
            Tag::H3 => "h3",
            Tag::H4 => "h4",
            Tag::H5 => "h5",
            Tag::H6 => "h6",
            Tag::Ul => "ul",
            Tag::Ol => "ol",
            Tag::Li => "li",
            Tag::Table => "table",
            Tag::Tr => "tr",
            Tag::Td => "td",
            Tag::Th => "th",
            Tag::Span => "span",
            Tag::Strong => "strong",
            Tag::B => "b",
            Tag::Em => "em",
            Tag::I => "i",
            Tag::U => "u",
            Tag::Br => "br",
            Tag::Hr => "hr",
            Tag::Img => "img",
            Tag::Body => "body",
            Tag::Html => "html",
            Tag::Head => "head",
            Tag::Title => "title",
            Tag::Style => "style",
            Tag::Meta => "meta",
            Tag::Link => "link",
            Tag::RowGroup => "tbody",
            Tag::Unknown(s) => s,
        }
    }

    /// Elements that never take children.
    pub fn is_void(&self) -> bool {
        matches!(
            self,
            Tag::Img | Tag::Br | Tag::Hr | Tag::Meta | Tag::Link
        ) || matches!(self, Tag::Unknown(s) if s.eq_ignore_ascii_case("input"))
    }

    /// Headings and paragraphs: blocks whose inline content is flowed as a
    /// single wrapped text run.
    pub fn is_paragraph(&self) -> bool {
        matches!(
            self,
            Tag::P | Tag::H1 | Tag::H2 | Tag::H3 | Tag::H4 | Tag::H5 | Tag::H6
        )
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            Tag::Span | Tag::Strong | Tag::B | Tag::Em | Tag::I | Tag::U | Tag::Br
        )
    }

    pub fn is_table_part(&self) -> bool {
        matches!(self, Tag::Table | Tag::Tr | Tag::Td | Tag::Th)
    }

    /// Elements whose text content is raw (not parsed as markup).
    fn is_raw_text(&self) -> bool {
        matches!(self, Tag::Style | Tag::Title)
    }
}

/// A node in our DOM tree.
#[derive(Debug, Clone)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

/// An element node carrying tag, attributes, and children.
#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attributes.get("style").map(|s| s.as_str())
    }

    pub fn src(&self) -> Option<&str> {
        self.attributes.get("src").map(|s| s.as_str())
    }

    /// Concatenated text of all descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                DomNode::Text(t) => out.push_str(t),
                DomNode::Element(e) => out.push_str(&e.text_content()),
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Parser – simple recursive descent over HTML
// ---------------------------------------------------------------------------

/// Parse an HTML string into a list of DOM nodes.
pub fn parse_html(html: &str) -> Vec<DomNode> {
    let mut parser = Parser::new(html);
    parser.parse_nodes()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_nodes(&mut self) -> Vec<DomNode> {
        let mut nodes = Vec::new();
        loop {
            self.skip_whitespace_preserve();
            if self.eof() || self.starts_with("</") {
                break;
            }
            match self.parse_node() {
                Some(DomNode::Element(e)) if e.tag == Tag::RowGroup => nodes.extend(e.children),
                Some(node) => nodes.push(node),
                None => {}
            }
        }
        nodes
    }

    fn parse_node(&mut self) -> Option<DomNode> {
        if self.starts_with("<!--") {
            self.skip_comment();
            return None;
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            // Doctype / processing instruction
            self.skip_until(">");
            self.advance_bytes(1);
            return None;
        }
        if self.starts_with("<") && self.peek_is_tag_start() {
            Some(self.parse_element())
        } else {
            Some(self.parse_text())
        }
    }

    /// `<` followed by a letter opens a tag; anything else is literal text.
    fn peek_is_tag_start(&self) -> bool {
        self.input[self.pos + 1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
    }

    fn parse_text(&mut self) -> DomNode {
        let start = self.pos;
        // A stray '<' is consumed as text.
        if self.starts_with("<") {
            self.advance_bytes(1);
        }
        while !self.eof() && !self.starts_with("<") {
            self.advance_char();
        }
        DomNode::Text(decode_entities(&self.input[start..self.pos]))
    }

    fn parse_element(&mut self) -> DomNode {
        self.advance_bytes(1); // '<'
        let tag_name = self.parse_name();
        let tag = Tag::from_str(&tag_name);
        let mut elem = ElementNode::new(tag.clone());

        loop {
            self.skip_whitespace();
            if self.eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let (key, value) = self.parse_attribute();
            if key.is_empty() {
                // Unparseable attribute character; skip it.
                self.advance_char();
                continue;
            }
            elem.attributes.insert(key.to_ascii_lowercase(), value);
        }

        if self.starts_with("/>") {
            self.advance_bytes(2);
            return DomNode::Element(elem);
        }
        self.advance_bytes(1); // '>'
        if tag.is_void() {
            return DomNode::Element(elem);
        }

        if tag.is_raw_text() {
            let close = format!("</{}", tag_name.to_ascii_lowercase());
            let start = self.pos;
            let rest = &self.input[start..];
            let end = rest
                .to_ascii_lowercase()
                .find(&close)
                .map(|i| start + i)
                .unwrap_or(self.input.len());
            let raw = &self.input[start..end];
            let text = if tag == Tag::Title {
                decode_entities(raw)
            } else {
                raw.to_string()
            };
            elem.children.push(DomNode::Text(text));
            self.pos = end;
        } else {
            elem.children = self.parse_nodes();
        }

        // Closing tag
        if self.starts_with("</") {
            self.advance_bytes(2);
            self.parse_name();
            self.skip_whitespace();
            if self.starts_with(">") {
                self.advance_bytes(1);
            }
        }

        DomNode::Element(elem)
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_alphanumeric() || c == '-' || c == '_' || c == ':' {
                self.advance_char();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_attribute(&mut self) -> (String, String) {
        let key = self.parse_name();
        self.skip_whitespace();
        if !self.starts_with("=") {
            return (key, String::new());
        }
        self.advance_bytes(1);
        self.skip_whitespace();
        let value = self.parse_attr_value();
        (key, value)
    }

    fn parse_attr_value(&mut self) -> String {
        for quote in ["\"", "'"] {
            if self.starts_with(quote) {
                self.advance_bytes(1);
                let start = self.pos;
                self.skip_until(quote);
                let val = decode_entities(&self.input[start..self.pos]);
                self.advance_bytes(1);
                return val;
            }
        }
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_whitespace() || c == '>' {
                break;
            }
            if c == '/' && self.input[self.pos..].starts_with("/>") {
                break;
            }
            self.advance_char();
        }
        decode_entities(&self.input[start..self.pos])
    }

    fn skip_whitespace(&mut self) {
        while !self.eof() && self.current_char().is_whitespace() {
            self.advance_char();
        }
    }

    /// Skip runs of pure whitespace between elements; keep leading whitespace
    /// of real text.
    fn skip_whitespace_preserve(&mut self) {
        let saved = self.pos;
        self.skip_whitespace();
        if !self.eof() && !self.starts_with("<") {
            self.pos = saved;
        }
    }

    fn skip_comment(&mut self) {
        self.advance_bytes(4);
        self.skip_until("-->");
        self.advance_bytes(3);
    }

    fn skip_until(&mut self, pat: &str) {
        match self.input[self.pos..].find(pat) {
            Some(i) => self.pos += i,
            None => self.pos = self.input.len(),
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input[self.pos..].chars().next().unwrap_or('\0')
    }

    fn advance_char(&mut self) {
        if let Some(c) = self.input[self.pos..].chars().next() {
            self.pos += c.len_utf8();
        }
    }

    /// Advance over ASCII syntax characters, clamped at end of input.
    fn advance_bytes(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }
}

/// Decode named and numeric character references.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 12)
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{00A0}',
        "euro" => '€',
        "copy" => '©',
        "deg" => '°',
        "ordm" => 'º',
        "ordf" => 'ª',
        "iexcl" => '¡',
        "iquest" => '¿',
        "aacute" => 'á',
        "eacute" => 'é',
        "iacute" => 'í',
        "oacute" => 'ó',
        "uacute" => 'ú',
        "ntilde" => 'ñ',
        "uuml" => 'ü',
        "Aacute" => 'Á',
        "Eacute" => 'É',
        "Iacute" => 'Í',
        "Oacute" => 'Ó',
        "Uacute" => 'Ú',
        "Ntilde" => 'Ñ',
        "Uuml" => 'Ü',
        "middot" => '·',
        "ndash" => '–',
        "hellip" => '…',
        _ => return None,
    };
    Some(c)
}

// ---------------------------------------------------------------------------
// Document helpers
// ---------------------------------------------------------------------------

/// Find the `<body>` element, looking inside `<html>`.
pub fn find_body(nodes: &[DomNode]) -> Option<&ElementNode> {
    find_element(nodes, &Tag::Body)
}

/// Find the `<body>` element and return its children, or return all nodes if
/// no `<body>` is present.
pub fn body_children(nodes: &[DomNode]) -> Vec<DomNode> {
    match find_body(nodes) {
        Some(body) => body.children.clone(),
        None => nodes.to_vec(),
    }
}

/// Concatenated text of every `<style>` element in the document.
pub fn collect_stylesheets(nodes: &[DomNode]) -> String {
    let mut css = String::new();
    visit_elements(nodes, &mut |e| {
        if e.tag == Tag::Style {
            css.push_str(&e.text_content());
            css.push('\n');
        }
    });
    css
}

/// Text of the first `<title>` element, trimmed.
pub fn document_title(nodes: &[DomNode]) -> Option<String> {
    find_element(nodes, &Tag::Title)
        .map(|t| t.text_content().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn find_element<'a>(nodes: &'a [DomNode], tag: &Tag) -> Option<&'a ElementNode> {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if e.tag == *tag {
                return Some(e);
            }
            if let Some(found) = find_element(&e.children, tag) {
                return Some(found);
            }
        }
    }
    None
}

fn visit_elements(nodes: &[DomNode], f: &mut dyn FnMut(&ElementNode)) {
    for node in nodes {
        if let DomNode::Element(e) = node {
            f(e);
            visit_elements(&e.children, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(node: &DomNode) -> &ElementNode {
        match node {
            DomNode::Element(e) => e,
            DomNode::Text(t) => panic!("Expected element, got text {t:?}"),
        }
    }

    #[test]
    fn parse_simple_div() {
        let html = r#"<div class="flex p-4"><p>Hello</p></div>"#;
        let nodes = parse_html(html);
        assert_eq!(nodes.len(), 1);
        let e = element(&nodes[0]);
        assert_eq!(e.tag, Tag::Div);
        assert_eq!(e.classes(), vec!["flex", "p-4"]);
        assert_eq!(e.children.len(), 1);
    }

    #[test]
    fn void_elements_take_no_children() {
        let nodes = parse_html(r#"<p>Línea 1<br>Línea 2</p><hr><img src="logo.png">"#);
        assert_eq!(nodes.len(), 3);
        let p = element(&nodes[0]);
        assert_eq!(p.children.len(), 3);
        assert_eq!(element(&p.children[1]).tag, Tag::Br);
        assert_eq!(element(&nodes[1]).tag, Tag::Hr);
        assert_eq!(element(&nodes[2]).src(), Some("logo.png"));
    }

    #[test]
    fn parse_inline_formatting() {
        let nodes = parse_html("<p><strong>Paciente:</strong> Juan</p>");
        let p = element(&nodes[0]);
        assert_eq!(element(&p.children[0]).tag, Tag::Strong);
        assert!(matches!(&p.children[1], DomNode::Text(t) if t == " Juan"));
    }

    #[test]
    fn row_groups_are_unwrapped() {
        let html = "<table><thead><tr><th>A</th></tr></thead><tbody><tr><td>1</td></tr><tr><td>2</td></tr></tbody></table>";
        let table = element(&parse_html(html)[0]).clone();
        assert_eq!(table.children.len(), 3);
        assert!(table
            .children
            .iter()
            .all(|c| element(c).tag == Tag::Tr));
    }

    #[test]
    fn decodes_named_and_numeric_entities() {
        assert_eq!(decode_entities("22&#x2F;05&#x2F;2025"), "22/05/2025");
        assert_eq!(decode_entities("&lt;b&gt; &amp; &#39;x&#39;"), "<b> & 'x'");
        assert_eq!(decode_entities("Diagn&oacute;stico &euro;"), "Diagnóstico €");
        assert_eq!(decode_entities("AT&T &bogus;"), "AT&T &bogus;");
    }

    #[test]
    fn extracts_stylesheet_title_and_body() {
        let html = r#"<!DOCTYPE html>
            <html><head><meta charset="UTF-8"><title>Informe Dental</title>
            <style>p > a { color: red; } h1 { font-size: 18px; }</style></head>
            <body><h1>Hola</h1></body></html>"#;
        let nodes = parse_html(html);
        assert_eq!(document_title(&nodes).as_deref(), Some("Informe Dental"));
        let css = collect_stylesheets(&nodes);
        assert!(css.contains("p > a { color: red; }"));
        let body = find_body(&nodes).unwrap();
        assert_eq!(body.children.len(), 1);
        assert_eq!(body_children(&nodes).len(), 1);
    }

    #[test]
    fn stray_less_than_is_text() {
        let nodes = parse_html("<p>a < b</p>");
        let p = element(&nodes[0]);
        assert_eq!(p.text_content(), "a < b");
    }
}
