//! Pagination – splits a flat list of positioned boxes into pages.
//!
//! Handles:
//! - A4 page boundaries
//! - Page-break-before / page-break-after hints
//! - Table row splitting across pages
//! - Per-line offsets for centred and right-aligned text
//! - Running page footers ("Página 1 de 3")

use crate::fonts::FontManager;
use crate::layout::{BoxContent, PositionedBox};
use crate::layout_config::*;
use crate::style;

/// Default page margins in points.
pub const PAGE_MARGIN_PT: f32 = 40.0;

/// Recursively expand any pure-container box whose height exceeds a single
/// page so its children can be split across pages individually.
fn flatten_for_pagination<'a>(
    boxes: &'a [PositionedBox],
    content_height: f32,
) -> Vec<&'a PositionedBox> {
    let mut result = Vec::new();
    for pbox in boxes {
        if pbox.height > content_height
            && matches!(pbox.content, BoxContent::None)
            && !pbox.children.is_empty()
        {
            result.extend(flatten_for_pagination(&pbox.children, content_height));
        } else {
            result.push(pbox);
        }
    }
    result
}

/// Convert positioned boxes into a paginated LayoutConfig.
pub fn paginate(
    boxes: &[PositionedBox],
    page_width: f32,
    page_height: f32,
    page_margin: f32,
    fonts: &FontManager,
) -> LayoutConfig {
    let mut config = LayoutConfig {
        page_width_pt: page_width,
        page_height_pt: page_height,
        page_margin_pt: page_margin,
        ..LayoutConfig::a4()
    };

    let content_height = page_height - 2.0 * page_margin;

    // Expand oversized wrapper divs so their children can paginate individually.
    let flat = flatten_for_pagination(boxes, content_height);

    let mut current_page = PageLayout::new(0);

    // Document-space y at which the current page begins.  All PositionedBox.y
    // values are absolute document coordinates produced by the layout extractor,
    // so `pbox.y - page_start_doc_y` gives the y-on-page for any box.
    let mut page_start_doc_y = 0.0f32;

    for pbox in &flat {
        // Page break before
        if pbox.page_break_before && !current_page.boxes.is_empty() {
            config.pages.push(current_page);
            current_page = PageLayout::new(config.pages.len());
            page_start_doc_y = pbox.y;
        }

        let y_on_page = (pbox.y - page_start_doc_y).max(0.0);
        let overflows = y_on_page + pbox.height > content_height;

        if overflows && pbox.height > content_height && is_splittable_text(pbox) {
            split_text_box(
                pbox,
                &mut config,
                &mut current_page,
                &mut page_start_doc_y,
                content_height,
                page_margin,
                fonts,
            );
        } else if overflows
            && !current_page.boxes.is_empty()
            && is_table_like(pbox)
            && !pbox.page_break_inside_avoid
        {
            split_table_box(
                pbox,
                &mut config,
                &mut current_page,
                &mut page_start_doc_y,
                content_height,
                page_margin,
                fonts,
            );
        } else {
            if overflows && !current_page.boxes.is_empty() {
                config.pages.push(current_page);
                current_page = PageLayout::new(config.pages.len());
                page_start_doc_y = pbox.y;
            }
            let y_on_page = (pbox.y - page_start_doc_y).max(0.0);
            let layout_box = positioned_to_layout_box(pbox, page_margin, y_on_page, fonts);
            current_page.boxes.push(layout_box);
        }

        // Page break after
        if pbox.page_break_after {
            config.pages.push(current_page);
            current_page = PageLayout::new(config.pages.len());
            page_start_doc_y = pbox.y + pbox.height;
        }
    }

    if !current_page.boxes.is_empty() {
        config.pages.push(current_page);
    }
    if config.pages.is_empty() {
        config.pages.push(PageLayout::new(0));
    }
    config
}

fn is_table_like(pbox: &PositionedBox) -> bool {
    pbox.style.display == style::Display::Grid && !pbox.children.is_empty()
}

fn split_table_box(
    pbox: &PositionedBox,
    config: &mut LayoutConfig,
    current_page: &mut PageLayout,
    page_start_doc_y: &mut f32,
    content_height: f32,
    page_margin: f32,
    fonts: &FontManager,
) {
    for child in &pbox.children {
        let y_on_page = (child.y - *page_start_doc_y).max(0.0);
        if y_on_page + child.height > content_height && !current_page.boxes.is_empty() {
            let next = PageLayout::new(config.pages.len());
            config.pages.push(std::mem::replace(current_page, next));
            *page_start_doc_y = child.y;
        }
        let y = (child.y - *page_start_doc_y).max(0.0);
        let row_box = positioned_to_layout_box(child, page_margin, y, fonts);
        current_page.boxes.push(row_box);
    }
}

/// A wrapped paragraph that may continue on the next page.
fn is_splittable_text(pbox: &PositionedBox) -> bool {
    matches!(&pbox.content, BoxContent::Text { lines, .. } if lines.len() > 1)
        && pbox.children.is_empty()
        && !pbox.page_break_inside_avoid
}

/// Place a paragraph taller than a page line by line, filling the current
/// page and continuing on as many pages as the remaining lines need.
fn split_text_box(
    pbox: &PositionedBox,
    config: &mut LayoutConfig,
    current_page: &mut PageLayout,
    page_start_doc_y: &mut f32,
    content_height: f32,
    page_margin: f32,
    fonts: &FontManager,
) {
    let BoxContent::Text { lines, .. } = &pbox.content else {
        return;
    };
    let line_height = fonts.line_height_px(pbox.style.font_size, pbox.style.line_height);
    if line_height <= 0.0 {
        return;
    }

    let mut start = 0;
    while start < lines.len() {
        let doc_y = pbox.y + start as f32 * line_height;
        let y_on_page = (doc_y - *page_start_doc_y).max(0.0);
        let room = content_height - y_on_page;
        // Small tolerance so a line ending exactly on the boundary still fits.
        let mut fit = (((room + 0.01) / line_height).floor().max(0.0) as usize)
            .min(lines.len() - start);
        if fit == 0 {
            if !current_page.boxes.is_empty() {
                let next = PageLayout::new(config.pages.len());
                config.pages.push(std::mem::replace(current_page, next));
                *page_start_doc_y = doc_y;
                continue;
            }
            // A single line taller than the page still has to go somewhere.
            fit = 1;
        }

        let end = start + fit;
        let chunk = PositionedBox {
            y: doc_y,
            height: fit as f32 * line_height,
            content: BoxContent::Text {
                text: lines[start..end].join(" "),
                lines: lines[start..end].to_vec(),
            },
            page_break_before: false,
            page_break_after: false,
            ..pbox.clone()
        };
        current_page
            .boxes
            .push(positioned_to_layout_box(&chunk, page_margin, y_on_page, fonts));

        start = end;
        if start < lines.len() {
            let next = PageLayout::new(config.pages.len());
            config.pages.push(std::mem::replace(current_page, next));
            *page_start_doc_y = pbox.y + start as f32 * line_height;
        }
    }
}

/// Convert a PositionedBox to a LayoutBox with page-absolute coordinates.
/// `y_on_page` = `pbox.y - page_start_doc_y`; Taffy's layout already encodes
/// margin spacing into `pbox.y`, so we do not add margin_top separately.
fn positioned_to_layout_box(
    pbox: &PositionedBox,
    page_margin: f32,
    y_on_page: f32,
    fonts: &FontManager,
) -> LayoutBox {
    let abs_x = pbox.x;
    let abs_y = page_margin + y_on_page;
    build_layout_box(pbox, abs_x, abs_y, fonts)
}

/// Recursively build a LayoutBox tree where every box carries *page-absolute*
/// x/y coordinates (origin = top-left of the physical page).
///
/// For each child, its absolute y is derived by:
///   `child_abs_y = parent_abs_y + (child.y − parent.y)`
/// because PositionedBox.y values are accumulated document-space absolutes
/// (set by `extract` starting with `offset_y = 0`), so the difference gives
/// the child's position relative to its parent.
fn build_layout_box(
    pbox: &PositionedBox,
    abs_x: f32,
    abs_y: f32,
    fonts: &FontManager,
) -> LayoutBox {
    let mut lb = LayoutBox::new(abs_x, abs_y, pbox.width, pbox.height);

    // Background
    if !pbox.style.background_color.is_transparent() {
        let c = &pbox.style.background_color;
        lb.background_color = Some([c.r, c.g, c.b, c.a]);
    }

    // Border
    if pbox.style.border_width > 0.5 {
        let c = &pbox.style.border_color;
        lb.border = Some(BorderStyle {
            width: pbox.style.border_width,
            color: [c.r, c.g, c.b, c.a],
        });
    }

    // Content
    match &pbox.content {
        BoxContent::Text { lines, .. } => {
            let c = &pbox.style.color;
            let line_height = fonts.line_height_px(pbox.style.font_size, pbox.style.line_height);
            let bold = pbox.style.font_weight == style::FontWeight::Bold;
            let italic = pbox.style.font_style == style::FontStyle::Italic;
            let text_lines: Vec<TextLine> = lines
                .iter()
                .enumerate()
                .map(|(i, line)| {
                    let width = fonts.measure_text_width(
                        line,
                        pbox.style.font_size,
                        bold,
                        italic,
                        &pbox.style.font_family,
                    );
                    TextLine {
                        text: line.clone(),
                        x_offset: align_offset(pbox.style.text_align, pbox.width, width),
                        y_offset: i as f32 * line_height,
                        width,
                    }
                })
                .collect();

            lb.text = Some(TextContent {
                lines: text_lines,
                font_family: pbox.style.font_family.clone(),
                font_size: pbox.style.font_size,
                bold,
                italic,
                color: [c.r, c.g, c.b, c.a],
                line_height,
                text_align: match pbox.style.text_align {
                    style::TextAlign::Left => "left".to_string(),
                    style::TextAlign::Center => "center".to_string(),
                    style::TextAlign::Right => "right".to_string(),
                },
                underline: pbox.style.text_decoration == style::TextDecoration::Underline,
                list_marker: None,
            });
        }
        BoxContent::Image { src } => {
            lb.image = Some(ImageContent {
                src: src.clone(),
                width: pbox.width,
                height: pbox.height,
            });
        }
        BoxContent::ListItem { marker } => {
            let c = &pbox.style.color;
            let line_height = fonts.line_height_px(pbox.style.font_size, pbox.style.line_height);
            // `lines` is empty – the bullet / number is rendered via
            // `list_marker` (drawn 16 pt to the left of the li box), while
            // the li's actual text content comes from its child boxes.
            lb.text = Some(TextContent {
                lines: vec![],
                font_family: pbox.style.font_family.clone(),
                font_size: pbox.style.font_size,
                bold: pbox.style.font_weight == style::FontWeight::Bold,
                italic: false,
                color: [c.r, c.g, c.b, c.a],
                line_height,
                text_align: "left".to_string(),
                underline: false,
                list_marker: Some(marker.clone()),
            });
        }
        BoxContent::None => {}
    }

    // Recurse into children, propagating absolute coordinates.
    // Each child's PositionedBox.y is a document-space absolute, so
    // (child.y − pbox.y) gives the child's offset within the parent.
    for child in &pbox.children {
        let child_abs_x = child.x; // already page-absolute (extract accumulated page_margin)
        let child_abs_y = abs_y + (child.y - pbox.y);
        let child_box = build_layout_box(child, child_abs_x, child_abs_y, fonts);
        lb.children.push(child_box);
    }

    lb
}

fn align_offset(align: style::TextAlign, box_width: f32, line_width: f32) -> f32 {
    let free = (box_width - line_width).max(0.0);
    match align {
        style::TextAlign::Left => 0.0,
        style::TextAlign::Center => free / 2.0,
        style::TextAlign::Right => free,
    }
}

/// Footer text size and colour (#7f8c8d).
const FOOTER_FONT_SIZE: f32 = 10.0;
const FOOTER_COLOR: [f32; 4] = [0.498, 0.549, 0.553, 1.0];

/// Attach a centred footer to every page. `{page}` and `{pages}` in the
/// template are replaced with the 1-based page number and the page count.
///
/// The footer sits in the middle of the bottom margin, or on the last line of
/// the page when the margin is too small to hold it.
pub fn add_page_footers(config: &mut LayoutConfig, template: &str, fonts: &FontManager) {
    let total = config.pages.len();
    let margin = config.page_margin_pt;
    let line_height = fonts.line_height_px(FOOTER_FONT_SIZE, 1.5);
    let width = config.page_width_pt - 2.0 * margin;
    let y = if margin >= line_height {
        config.page_height_pt - margin + (margin - line_height) / 2.0
    } else {
        config.page_height_pt - line_height
    };

    for (i, page) in config.pages.iter_mut().enumerate() {
        let text = template
            .replace("{page}", &(i + 1).to_string())
            .replace("{pages}", &total.to_string());
        let text_width =
            fonts.measure_text_width(&text, FOOTER_FONT_SIZE, false, false, "DejaVu Sans");

        let mut footer = LayoutBox::new(margin, y, width, line_height);
        footer.text = Some(TextContent {
            lines: vec![TextLine {
                text,
                x_offset: align_offset(style::TextAlign::Center, width, text_width),
                y_offset: 0.0,
                width: text_width,
            }],
            font_family: "DejaVu Sans".to_string(),
            font_size: FOOTER_FONT_SIZE,
            bold: false,
            italic: false,
            color: FOOTER_COLOR,
            line_height,
            text_align: "center".to_string(),
            underline: false,
            list_marker: None,
        });
        page.footer = Some(footer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::layout::compute_layout;
    use crate::style::{build_styled_tree, Stylesheet};

    fn paginate_html(html: &str) -> LayoutConfig {
        let dom = parse_html(html);
        let styled = build_styled_tree(&dom, None, &Stylesheet::default());
        let fonts = FontManager::default();
        let boxes = compute_layout(&styled, 595.0, PAGE_MARGIN_PT, &fonts).unwrap();
        paginate(&boxes, 595.0, 842.0, PAGE_MARGIN_PT, &fonts)
    }

    fn first_line(b: &LayoutBox) -> Option<&TextLine> {
        b.text
            .as_ref()
            .and_then(|t| t.lines.first())
            .or_else(|| b.children.iter().find_map(first_line))
    }

    #[test]
    fn single_page() {
        let config = paginate_html("<p>Short text</p>");
        assert_eq!(config.pages.len(), 1);
        assert_eq!(config.page_margin_pt, PAGE_MARGIN_PT);
    }

    #[test]
    fn multiple_pages() {
        // Generate enough content to fill multiple pages
        let mut html = String::new();
        for i in 0..60 {
            html.push_str(&format!("<p>Paragraph {} with some text</p>", i));
        }
        let config = paginate_html(&html);
        assert!(
            config.pages.len() > 1,
            "Expected multiple pages, got {}",
            config.pages.len()
        );
    }

    fn lowest_bottom(b: &LayoutBox) -> f32 {
        b.children
            .iter()
            .map(lowest_bottom)
            .fold(b.y + b.height, f32::max)
    }

    #[test]
    fn paragraphs_taller_than_a_page_continue_on_the_next() {
        let html = format!(
            "<h2>Plan de tratamiento</h2><p>{}</p><p>Fin</p>",
            "texto largo del tratamiento ".repeat(1500)
        );
        let config = paginate_html(&html);
        assert!(config.pages.len() > 2, "got {} pages", config.pages.len());

        for page in &config.pages {
            for b in &page.boxes {
                assert!(
                    lowest_bottom(b) <= 842.0 - PAGE_MARGIN_PT + 0.5,
                    "box on page {} ends at {}",
                    page.page_index,
                    lowest_bottom(b)
                );
            }
        }

        let all_text: Vec<String> = (0..config.pages.len())
            .flat_map(|i| config.page_text(i))
            .collect();
        let words: usize = all_text.iter().map(|l| l.matches("texto").count()).sum();
        assert_eq!(words, 1500);
        assert_eq!(all_text.last().map(String::as_str), Some("Fin"));
    }

    #[test]
    fn forced_page_break() {
        let config = paginate_html(r#"<p class="page-break">uno</p><p>dos</p>"#);
        assert_eq!(config.pages.len(), 2);
        assert_eq!(config.page_text(1), vec!["dos"]);
    }

    #[test]
    fn centred_and_right_aligned_lines_are_offset() {
        let config = paginate_html(
            r#"<p class="text-center">Centro</p><p class="text-end">Derecha</p><p>Izquierda</p>"#,
        );
        let boxes = &config.pages[0].boxes;
        let centre = first_line(&boxes[0]).unwrap();
        let right = first_line(&boxes[1]).unwrap();
        let left = first_line(&boxes[2]).unwrap();
        let content = 595.0 - 2.0 * PAGE_MARGIN_PT;
        assert!((centre.x_offset - (content - centre.width) / 2.0).abs() < 0.5);
        assert!((right.x_offset - (content - right.width)).abs() < 0.5);
        assert_eq!(left.x_offset, 0.0);
    }

    #[test]
    fn footers_number_every_page() {
        let mut html = String::new();
        for i in 0..60 {
            html.push_str(&format!("<p>Paragraph {i}</p>"));
        }
        let mut config = paginate_html(&html);
        let total = config.pages.len();
        add_page_footers(&mut config, "Página {page} de {pages}", &FontManager::default());

        for (i, page) in config.pages.iter().enumerate() {
            let footer = page.footer.as_ref().unwrap();
            assert!(footer.y > 842.0 - PAGE_MARGIN_PT);
            assert!(footer.y + footer.height <= 842.0);
            let text = config.page_text(i);
            assert_eq!(
                text.last().unwrap(),
                &format!("Página {} de {}", i + 1, total)
            );
        }
    }
}
