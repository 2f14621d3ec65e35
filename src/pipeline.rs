//! Pipeline – ties together parsing, styling, layout, pagination, and
//! rendering into a single function call.

use crate::dom::{body_children, collect_stylesheets, find_body, parse_html, ElementNode, Tag};
use crate::error::Result;
use crate::fonts::FontManager;
use crate::layout::compute_layout;
use crate::layout_config::LayoutConfig;
use crate::pagination::{add_page_footers, paginate, PAGE_MARGIN_PT};
use crate::render::render_pdf;
use crate::style::{build_styled_tree, resolve_style, Stylesheet};

/// Page orientation for the generated PDF.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageOrientation {
    /// Portrait mode: height > width (default).
    #[default]
    Portrait,
    /// Landscape mode: width > height (short-edge binding).
    Landscape,
}

/// Configuration for the PDF generation pipeline.
///
/// An `@page` rule in the document overrides size, orientation and (unless
/// `margin_locked`) margin.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Document title embedded in the PDF metadata. When empty, the
    /// document's `<title>` is used.
    pub title: String,
    /// Page width in points (default: A4 = 595.28).
    pub page_width: f32,
    /// Page height in points (default: A4 = 841.89).
    pub page_height: f32,
    /// Page margin in points (default: 40).
    pub page_margin: f32,
    /// Page orientation; swaps effective width/height when `Landscape`.
    pub orientation: PageOrientation,
    /// Footer template drawn on every page (`{page}`, `{pages}`).
    pub footer: Option<String>,
    /// Keep `page_margin` even when the document declares its own.
    pub margin_locked: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            title: "Informe Dental".to_string(),
            page_width: 595.28,
            page_height: 841.89,
            page_margin: PAGE_MARGIN_PT,
            orientation: PageOrientation::Portrait,
            footer: None,
            margin_locked: false,
        }
    }
}

impl PipelineConfig {
    /// Effective page width after applying orientation.
    pub fn effective_width(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.page_width,
            PageOrientation::Landscape => self.page_height,
        }
    }

    /// Effective page height after applying orientation.
    pub fn effective_height(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.page_height,
            PageOrientation::Landscape => self.page_width,
        }
    }

    /// Create an A4 landscape config.
    pub fn a4_landscape() -> Self {
        Self {
            orientation: PageOrientation::Landscape,
            ..Self::default()
        }
    }

    /// Overlay the document's `@page` rule.
    fn with_page_rule(&self, sheet: &Stylesheet) -> Self {
        let mut config = self.clone();
        let page = &sheet.page;
        if let Some((w, h)) = page.size {
            config.page_width = w;
            config.page_height = h;
        }
        if page.landscape {
            config.orientation = PageOrientation::Landscape;
        }
        if let Some(margin) = page.margin.filter(|_| !self.margin_locked) {
            config.page_margin = margin;
        }
        config
    }
}

/// Parse, style, lay out and paginate a document without rendering it.
fn layout_document(html: &str, config: &PipelineConfig) -> Result<(LayoutConfig, PipelineConfig)> {
    // 1. Parse HTML and its embedded stylesheet
    let dom = parse_html(html);
    let sheet = Stylesheet::parse(&collect_stylesheets(&dom));
    let config = config.with_page_rule(&sheet);

    // 2. Build the styled tree under the body's style
    let synthetic_body = ElementNode::new(Tag::Body);
    let body = find_body(&dom).unwrap_or(&synthetic_body);
    let body_style = resolve_style(body, None, &sheet);
    let styled = build_styled_tree(&body_children(&dom), Some(&body_style), &sheet);

    // 3. Compute layout
    let fonts = FontManager::default();
    let eff_w = config.effective_width();
    let eff_h = config.effective_height();
    let boxes = compute_layout(&styled, eff_w, config.page_margin, &fonts)?;

    // 4. Paginate
    let mut layout_config = paginate(&boxes, eff_w, eff_h, config.page_margin, &fonts);
    layout_config.title = if config.title.is_empty() {
        crate::dom::document_title(&dom).unwrap_or_default()
    } else {
        config.title.clone()
    };
    if let Some(footer) = &config.footer {
        add_page_footers(&mut layout_config, footer, &fonts);
    }
    log::debug!(
        "laid out {} page(s) at {}x{} pt, margin {} pt",
        layout_config.pages.len(),
        eff_w,
        eff_h,
        config.page_margin
    );
    Ok((layout_config, config))
}

/// Full pipeline: HTML string → PDF bytes.
///
/// Returns the PDF bytes together with the layout they were drawn from.
pub fn generate_pdf(html: &str, config: &PipelineConfig) -> Result<(Vec<u8>, LayoutConfig)> {
    let (layout_config, _) = layout_document(html, config)?;
    let pdf_bytes = render_pdf(&layout_config, &FontManager::default())?;
    Ok((pdf_bytes, layout_config))
}

/// Generate only the layout config (no PDF rendering) – useful for testing.
pub fn compute_layout_config(html: &str, config: &PipelineConfig) -> Result<LayoutConfig> {
    Ok(layout_document(html, config)?.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_basic() {
        let html = "<h1>Hello</h1><p>World</p>";
        let (bytes, config) = generate_pdf(html, &PipelineConfig::default()).unwrap();
        assert!(!bytes.is_empty());
        assert!(!config.pages.is_empty());
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn page_rule_sets_size_and_margin() {
        let html = "<html><head><style>@page { size: A5 landscape; margin: 1cm }</style></head>\
                    <body><p>x</p></body></html>";
        let layout = compute_layout_config(html, &PipelineConfig::default()).unwrap();
        assert!((layout.page_width_pt - 595.28).abs() < 0.01);
        assert!((layout.page_height_pt - 419.53).abs() < 0.01);
        assert!((layout.page_margin_pt - 28.35).abs() < 0.01);
    }

    #[test]
    fn locked_margin_wins_over_page_rule() {
        let html = "<style>@page { margin: 2cm }</style><p>x</p>";
        let config = PipelineConfig {
            page_margin: 20.0,
            margin_locked: true,
            ..PipelineConfig::default()
        };
        let layout = compute_layout_config(html, &config).unwrap();
        assert_eq!(layout.page_margin_pt, 20.0);
    }

    #[test]
    fn body_rule_is_inherited() {
        let html = "<html><head><style>body { font-size: 12px }</style></head>\
                    <body><p>texto</p></body></html>";
        let layout = compute_layout_config(html, &PipelineConfig::default()).unwrap();
        let text = layout.pages[0].boxes[0].text.as_ref().unwrap();
        assert_eq!(text.font_size, 12.0);
    }

    #[test]
    fn empty_title_falls_back_to_document_title() {
        let html = "<html><head><title>Informe de prueba</title></head><body><p>x</p></body></html>";
        let config = PipelineConfig {
            title: String::new(),
            ..PipelineConfig::default()
        };
        let layout = compute_layout_config(html, &config).unwrap();
        assert_eq!(layout.title, "Informe de prueba");
    }

    #[test]
    fn footer_is_added_when_configured() {
        let config = PipelineConfig {
            footer: Some("Página {page} de {pages}".to_string()),
            ..PipelineConfig::default()
        };
        let layout = compute_layout_config("<p>x</p>", &config).unwrap();
        assert_eq!(layout.page_text(0), vec!["x", "Página 1 de 1"]);
    }
}
