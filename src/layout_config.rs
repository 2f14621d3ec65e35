//! Layout config – the intermediate representation between layout computation
//! and PDF rendering. This is the "frozen" structure that encodes exactly what
//! goes on each page.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A complete document layout ready for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Document title embedded in the PDF metadata.
    #[serde(default = "LayoutConfig::default_title")]
    pub title: String,
    /// Width of each page in PDF points (1 pt = 1/72 inch).
    pub page_width_pt: f32,
    /// Height of each page in PDF points.
    pub page_height_pt: f32,
    /// Margin applied on every side of the page, in points.
    #[serde(default)]
    pub page_margin_pt: f32,
    /// Ordered list of pages.
    pub pages: Vec<PageLayout>,
}

/// One page of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: usize,
    pub boxes: Vec<LayoutBox>,
    /// Running footer, drawn below the content area.
    #[serde(default)]
    pub footer: Option<LayoutBox>,
}

impl PageLayout {
    pub fn new(page_index: usize) -> Self {
        Self {
            page_index,
            boxes: Vec::new(),
            footer: None,
        }
    }
}

/// A positioned rectangle with optional content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBox {
    /// Position relative to page top-left, in points.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    /// Visual styling
    pub background_color: Option<[f32; 4]>,
    pub border: Option<BorderStyle>,

    /// Content (mutually exclusive in practice)
    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,

    /// Children (nested boxes)
    pub children: Vec<LayoutBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorderStyle {
    pub width: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    /// Pre-wrapped lines of text.
    pub lines: Vec<TextLine>,
    pub font_family: String,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub color: [f32; 4],
    pub line_height: f32,
    pub text_align: String,
    pub underline: bool,
    /// List bullet/number prefix (e.g. "• " or "1. ")
    pub list_marker: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    /// X offset within the layout box (for alignment)
    pub x_offset: f32,
    /// Y offset from the top of the text content area
    pub y_offset: f32,
    /// Measured width of the line
    #[serde(default)]
    pub width: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    pub src: String,
    pub width: f32,
    pub height: f32,
}

impl LayoutConfig {
    /// Create an empty A4 layout config.
    pub fn a4() -> Self {
        Self {
            title: Self::default_title(),
            // A4: 210mm × 297mm = 595.28 × 841.89 points
            page_width_pt: 595.28,
            page_height_pt: 841.89,
            page_margin_pt: 0.0,
            pages: Vec::new(),
        }
    }

    fn default_title() -> String {
        "Informe Dental".to_string()
    }

    /// All text lines on a page, footer included, in drawing order.
    pub fn page_text(&self, page: usize) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(p) = self.pages.get(page) {
            for b in p.boxes.iter().chain(p.footer.iter()) {
                collect_text(b, &mut out);
            }
        }
        out
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn collect_text(b: &LayoutBox, out: &mut Vec<String>) {
    if let Some(text) = &b.text {
        out.extend(text.lines.iter().map(|l| l.text.clone()));
    }
    for child in &b.children {
        collect_text(child, out);
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            border: None,
            text: None,
            image: None,
            children: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_keeps_footer() {
        let mut config = LayoutConfig::a4();
        let mut page = PageLayout::new(0);
        let mut footer = LayoutBox::new(56.7, 800.0, 481.9, 15.0);
        footer.text = Some(TextContent {
            lines: vec![TextLine {
                text: "Página 1 de 1".to_string(),
                x_offset: 200.0,
                y_offset: 0.0,
                width: 60.0,
            }],
            font_family: "DejaVu Sans".to_string(),
            font_size: 10.0,
            bold: false,
            italic: false,
            color: [0.5, 0.55, 0.55, 1.0],
            line_height: 15.0,
            text_align: "center".to_string(),
            underline: false,
            list_marker: None,
        });
        page.footer = Some(footer);
        config.pages.push(page);

        let back = LayoutConfig::from_json(&config.to_json()).unwrap();
        assert_eq!(back.page_text(0), vec!["Página 1 de 1"]);
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = r#"{"page_width_pt": 595.28, "page_height_pt": 841.89,
                       "pages": [{"page_index": 0, "boxes": []}]}"#;
        let config = LayoutConfig::from_json(json).unwrap();
        assert_eq!(config.title, "Informe Dental");
        assert!(config.pages[0].footer.is_none());
    }
}
