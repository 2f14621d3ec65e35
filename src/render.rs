//! PDF renderer – takes a [`LayoutConfig`] and produces PDF bytes using
//! `printpdf` (v0.8 ops-based API) with the embedded report font.

use std::collections::{BTreeSet, HashMap, HashSet};

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use printpdf::*;

use crate::error::{Error, Result};
use crate::fonts::{FontKey, FontManager};
use crate::layout_config::*;

const PT_TO_MM: f32 = 0.352778;

/// A printpdf XObject together with the pixel dimensions of the source image.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

/// Per-document drawing context.
struct Painter<'a> {
    page_height: f32,
    images: &'a HashMap<String, ImageResource>,
    font_ids: &'a HashMap<FontKey, FontId>,
    fonts: &'a FontManager,
}

/// Render a LayoutConfig into PDF bytes.
///
/// `<img>` elements whose `src` is not a base64 data URI, or whose bytes
/// cannot be decoded, are skipped with a warning.
pub fn render_pdf(config: &LayoutConfig, fonts: &FontManager) -> Result<Vec<u8>> {
    if config.page_width_pt <= 0.0 || config.page_height_pt <= 0.0 {
        return Err(Error::Pdf(format!(
            "invalid page size {}x{}",
            config.page_width_pt, config.page_height_pt
        )));
    }
    let page_w = Mm(config.page_width_pt * PT_TO_MM);
    let page_h = Mm(config.page_height_pt * PT_TO_MM);

    let mut doc = PdfDocument::new(&config.title);
    let images = register_images(&mut doc, config);
    let font_ids = register_fonts(&mut doc, config, fonts)?;
    let painter = Painter {
        page_height: config.page_height_pt,
        images: &images,
        font_ids: &font_ids,
        fonts,
    };

    let mut pages: Vec<PdfPage> = config
        .pages
        .iter()
        .map(|page_layout| {
            let mut ops = Vec::new();
            for lbox in page_layout.boxes.iter().chain(page_layout.footer.iter()) {
                painter.render_box(&mut ops, lbox);
            }
            PdfPage::new(page_w, page_h, ops)
        })
        .collect();

    if pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }
    log::debug!("rendering {} PDF page(s)", pages.len());

    doc.with_pages(pages);
    let mut warnings = Vec::new();
    let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
    if bytes.is_empty() {
        return Err(Error::Pdf("empty PDF output".to_string()));
    }
    Ok(bytes)
}

/// Decode every distinct image once and register it as an XObject.
fn register_images(doc: &mut PdfDocument, config: &LayoutConfig) -> HashMap<String, ImageResource> {
    let mut all_srcs: HashSet<&str> = HashSet::new();
    for page_layout in &config.pages {
        for lbox in &page_layout.boxes {
            collect_image_srcs(lbox, &mut all_srcs);
        }
    }

    let mut resources = HashMap::new();
    let mut img_warnings: Vec<PdfWarnMsg> = Vec::new();
    for src in all_srcs {
        let bytes = match parse_data_uri(src) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("skipping image: {e}");
                continue;
            }
        };
        let dyn_img = match ::image::load_from_memory(&bytes) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("skipping image: decode error: {e}");
                continue;
            }
        };
        let raw = match RawImage::decode_from_bytes(&bytes, &mut img_warnings) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("skipping image: PDF encode error: {e}");
                continue;
            }
        };
        resources.insert(
            src.to_string(),
            ImageResource {
                xobj_id: doc.add_image(&raw),
                px_width: dyn_img.width(),
                px_height: dyn_img.height(),
            },
        );
    }
    resources
}

/// Parse and register every face the layout writes text with.
fn register_fonts(
    doc: &mut PdfDocument,
    config: &LayoutConfig,
    fonts: &FontManager,
) -> Result<HashMap<FontKey, FontId>> {
    let mut keys = BTreeSet::new();
    for page_layout in &config.pages {
        for lbox in page_layout.boxes.iter().chain(page_layout.footer.iter()) {
            collect_font_keys(lbox, &mut keys);
        }
    }

    let mut ids = HashMap::new();
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    for key in keys {
        let font = ParsedFont::from_bytes(fonts.get(key).bytes, 0, &mut warnings)
            .ok_or_else(|| Error::Pdf(format!("could not load font face {key:?}")))?;
        ids.insert(key, doc.add_font(&font));
    }
    Ok(ids)
}

fn collect_font_keys(lbox: &LayoutBox, keys: &mut BTreeSet<FontKey>) {
    if let Some(text) = &lbox.text {
        keys.insert(FontKey::new(text.bold, text.italic));
        if text.list_marker.is_some() {
            keys.insert(FontKey::REGULAR);
        }
    }
    for child in &lbox.children {
        collect_font_keys(child, keys);
    }
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
fn parse_data_uri(src: &str) -> std::result::Result<Vec<u8>, String> {
    let rest = src.strip_prefix("data:").ok_or_else(|| {
        let preview: String = src.chars().take(80).collect();
        format!("src must be a base64 data URI, got {preview:?}")
    })?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| "invalid data URI: missing `,`".to_string())?;
    if !header.contains(";base64") {
        return Err("only base64 data URIs are supported".to_string());
    }
    BASE64_STD
        .decode(data.trim())
        .map_err(|e| format!("base64 decode error: {e}"))
}

/// Recursively collect all unique `image.src` strings from a [`LayoutBox`] tree.
fn collect_image_srcs<'a>(lbox: &'a LayoutBox, srcs: &mut HashSet<&'a str>) {
    if let Some(img) = &lbox.image {
        srcs.insert(img.src.as_str());
    }
    for child in &lbox.children {
        collect_image_srcs(child, srcs);
    }
}

fn rgb(c: &[f32; 4]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

/// Corners of a rectangle in PDF space, counter-clockwise from bottom-left.
fn corners(x: f32, bottom: f32, width: f32, height: f32) -> Vec<LinePoint> {
    vec![
        point(x, bottom),
        point(x + width, bottom),
        point(x + width, bottom + height),
        point(x, bottom + height),
    ]
}

impl Painter<'_> {
    /// Recursively render a LayoutBox and its children into PDF ops.
    fn render_box(&self, ops: &mut Vec<Op>, lbox: &LayoutBox) {
        // PDF origin is bottom-left; layout origin is top-left.
        let top = self.page_height - lbox.y;
        let bottom = top - lbox.height;

        if let Some(bg) = &lbox.background_color {
            ops.push(Op::SetFillColor { col: rgb(bg) });
            ops.push(Op::DrawPolygon {
                polygon: Polygon {
                    rings: vec![PolygonRing {
                        points: corners(lbox.x, bottom, lbox.width, lbox.height),
                    }],
                    mode: PaintMode::Fill,
                    winding_order: WindingOrder::NonZero,
                },
            });
        }

        if let Some(border) = &lbox.border {
            ops.push(Op::SetOutlineColor {
                col: rgb(&border.color),
            });
            ops.push(Op::SetOutlineThickness {
                pt: Pt(border.width),
            });
            ops.push(Op::DrawLine {
                line: Line {
                    points: corners(lbox.x, bottom, lbox.width, lbox.height),
                    is_closed: true,
                },
            });
        }

        if let Some(text) = &lbox.text {
            self.render_text(ops, lbox, text, top);
        }

        if let Some(img) = &lbox.image {
            self.render_image(ops, lbox, img);
        }

        for child in &lbox.children {
            self.render_box(ops, child);
        }
    }

    fn render_text(&self, ops: &mut Vec<Op>, lbox: &LayoutBox, text: &TextContent, top: f32) {
        let font = FontKey::new(text.bold, text.italic);
        // Centre the glyphs vertically inside the line box.
        let leading = (text.line_height - text.font_size).max(0.0) / 2.0;
        let ascender = self.fonts.ascender_px(text.font_size);

        for tline in text.lines.iter().filter(|l| !l.text.is_empty()) {
            let x = lbox.x + tline.x_offset;
            let baseline = top - tline.y_offset - leading - ascender;
            self.write_text(ops, x, baseline, &tline.text, text, font);

            if text.underline {
                let y = baseline - text.font_size * 0.1;
                ops.push(Op::SetOutlineThickness { pt: Pt(0.5) });
                ops.push(Op::SetOutlineColor {
                    col: rgb(&text.color),
                });
                ops.push(Op::DrawLine {
                    line: Line {
                        points: vec![point(x, y), point(x + tline.width, y)],
                        is_closed: false,
                    },
                });
            }
        }

        // Bullet or number in the gutter left of the list item.
        if let Some(marker) = &text.list_marker {
            let baseline = top - leading - ascender;
            self.write_text(ops, lbox.x - 16.0, baseline, marker, text, FontKey::REGULAR);
        }
    }

    fn render_image(&self, ops: &mut Vec<Op>, lbox: &LayoutBox, img: &ImageContent) {
        let Some(res) = self.images.get(&img.src) else {
            return;
        };
        // At 72 dpi printpdf maps one pixel to one point.
        let scale = |target: f32, px: u32| if px > 0 { target / px as f32 } else { 1.0 };
        ops.push(Op::UseXobject {
            id: res.xobj_id.clone(),
            transform: XObjectTransform {
                translate_x: Some(Pt(lbox.x)),
                translate_y: Some(Pt(self.page_height - lbox.y - img.height)),
                dpi: Some(72.0),
                scale_x: Some(scale(img.width, res.px_width)),
                scale_y: Some(scale(img.height, res.px_height)),
                rotate: None,
            },
        });
    }

    fn write_text(
        &self,
        ops: &mut Vec<Op>,
        x: f32,
        baseline: f32,
        s: &str,
        text: &TextContent,
        key: FontKey,
    ) {
        let Some(font) = self.font_ids.get(&key) else {
            log::warn!("no font registered for {key:?}, dropping text");
            return;
        };
        ops.push(Op::StartTextSection);
        ops.push(Op::SetTextCursor {
            pos: Point {
                x: Pt(x),
                y: Pt(baseline),
            },
        });
        ops.push(Op::SetFontSize {
            size: Pt(text.font_size),
            font: font.clone(),
        });
        ops.push(Op::SetLineHeight {
            lh: Pt(text.line_height),
        });
        ops.push(Op::SetFillColor {
            col: rgb(&text.color),
        });
        ops.push(Op::WriteText {
            items: vec![TextItem::Text(s.to_string())],
            font: font.clone(),
        });
        ops.push(Op::EndTextSection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_empty_page() {
        let config = LayoutConfig::a4();
        let bytes = render_pdf(&config, &FontManager::default()).unwrap();
        assert!(bytes.len() > 100, "PDF should have content");
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn invalid_page_size_is_an_error() {
        let mut config = LayoutConfig::a4();
        config.page_width_pt = 0.0;
        let err = render_pdf(&config, &FontManager::default()).unwrap_err();
        assert!(err.to_string().starts_with("Error al generar el PDF"));
    }

    fn text_box(text: &str, bold: bool) -> LayoutBox {
        let mut lbox = LayoutBox::new(56.7, 56.7, 400.0, 18.0);
        lbox.text = Some(TextContent {
            lines: vec![TextLine {
                text: text.to_string(),
                x_offset: 0.0,
                y_offset: 0.0,
                width: 120.0,
            }],
            font_family: "DejaVu Sans".to_string(),
            font_size: 12.0,
            bold,
            italic: false,
            color: [0.0, 0.0, 0.0, 1.0],
            line_height: 18.0,
            text_align: "left".to_string(),
            underline: false,
            list_marker: None,
        });
        lbox
    }

    #[test]
    fn only_used_faces_are_collected() {
        let mut parent = LayoutBox::new(0.0, 0.0, 500.0, 40.0);
        parent.children.push(text_box("Diagnóstico", true));
        let mut item = text_box("Año", true);
        if let Some(text) = item.text.as_mut() {
            text.list_marker = Some("•".to_string());
        }
        parent.children.push(item);

        let mut keys = BTreeSet::new();
        collect_font_keys(&parent, &mut keys);
        assert_eq!(
            keys.into_iter().collect::<Vec<_>>(),
            vec![FontKey::REGULAR, FontKey::new(true, false)]
        );
    }

    #[test]
    fn spanish_text_embeds_the_report_font() {
        let mut config = LayoutConfig::a4();
        let mut page = PageLayout::new(0);
        page.boxes.push(text_box("Año diagnóstico: 5 € – «endodoncia»", false));
        config.pages.push(page);

        let bytes = render_pdf(&config, &FontManager::default()).unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
        let contains = |needle: &[u8]| bytes.windows(needle.len()).any(|w| w == needle);
        assert!(contains(b"CIDFontType2"));
        assert!(contains(b"FontFile2"));
    }

    #[test]
    fn data_uri_parsing() {
        assert!(parse_data_uri("logo.png").is_err());
        assert!(parse_data_uri("data:image/png,abc").is_err());
        assert_eq!(parse_data_uri("data:text/plain;base64,aG9sYQ==").unwrap(), b"hola");
    }
}
