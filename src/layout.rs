//! Layout engine – uses Taffy to compute flexbox / grid layout from a styled
//! DOM tree, then converts the result into a flat list of positioned boxes.

use std::collections::HashMap;
use taffy::prelude::*;

use crate::dom::Tag;
use crate::error::Result;
use crate::fonts::{wrap_text, FontManager};
use crate::style::{
    self, ComputedStyle, FontStyle as CssFontStyle, FontWeight, StyledNode, TextAlign,
};

// ---------------------------------------------------------------------------
// Intermediate layout tree (pre-pagination)
// ---------------------------------------------------------------------------

/// A positioned box in document coordinates (before page splitting).
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub style: ComputedStyle,
    pub content: BoxContent,
    pub children: Vec<PositionedBox>,
    pub page_break_before: bool,
    pub page_break_after: bool,
    pub page_break_inside_avoid: bool,
}

#[derive(Debug, Clone)]
pub enum BoxContent {
    None,
    Text {
        text: String,
        lines: Vec<String>,
    },
    Image {
        src: String,
    },
    /// List item marker
    ListItem {
        marker: String,
    },
}

// ---------------------------------------------------------------------------
// Build Taffy tree from styled nodes
// ---------------------------------------------------------------------------

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    node_styles: HashMap<NodeId, ComputedStyle>,
    node_content: HashMap<NodeId, BoxContent>,
    available_width: f32,
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontManager, available_width: f32) -> Self {
        Self {
            taffy: TaffyTree::new(),
            fonts,
            node_styles: HashMap::new(),
            node_content: HashMap::new(),
            available_width,
        }
    }

    /// Collect the text of an inline subtree. Source newlines are plain
    /// whitespace; `<br>` is a hard break.
    fn collect_inline_text(node: &StyledNode) -> String {
        match node {
            StyledNode::Text { text, .. } => text.replace(['\n', '\r'], " "),
            StyledNode::Element { tag: Tag::Br, .. } => "\n".to_string(),
            StyledNode::Element { children, .. } => {
                children.iter().map(Self::collect_inline_text).collect()
            }
        }
    }

    /// Collapse whitespace within each line of a merged inline run.
    fn normalise_run(raw: &str) -> String {
        let lines: Vec<String> = raw
            .split('\n')
            .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect();
        let joined = lines.join("\n");
        joined.trim_matches('\n').to_string()
    }

    /// Return true when every child is a text node or an inline element
    /// (no block-level children, no images).
    fn all_inline(children: &[StyledNode]) -> bool {
        children.iter().all(|c| match c {
            StyledNode::Text { .. } => true,
            StyledNode::Element {
                tag,
                style,
                children: gc,
                ..
            } => {
                *tag != Tag::Img
                    && matches!(
                        style.display,
                        style::Display::Inline | style::Display::InlineBlock
                    )
                    && Self::all_inline(gc)
            }
        })
    }

    /// Text style of a merged run: a lone formatting element (e.g. a cell
    /// holding only `<strong>`) lends its style to the whole run.
    fn run_style(block_style: &ComputedStyle, children: &[StyledNode]) -> ComputedStyle {
        match children {
            [StyledNode::Element { style, .. }] => style.text_run(),
            _ => block_style.text_run(),
        }
    }

    fn build_node(&mut self, styled: &StyledNode, parent_width: f32) -> Result<NodeId> {
        match styled {
            StyledNode::Text { text, style } => {
                let text = Self::normalise_run(&text.replace(['\n', '\r'], " "));
                self.build_text_node(&text, style, parent_width)
            }
            StyledNode::Element {
                tag,
                style,
                children,
                attrs,
            } => self.build_element_node(tag, style, children, attrs, parent_width),
        }
    }

    /// Like build_text_node but the node also carries the margin and padding
    /// of the enclosing block, so headings keep their spacing.
    fn build_paragraph_node(
        &mut self,
        text: &str,
        text_style: &ComputedStyle,
        block_style: &ComputedStyle,
        parent_width: f32,
    ) -> Result<NodeId> {
        let inner = parent_width - block_style.padding_left - block_style.padding_right
            - block_style.margin_left
            - block_style.margin_right;
        let node = self.build_text_node(text, text_style, inner)?;
        let current = self.taffy.style(node)?.clone();
        let updated = Style {
            margin: Rect {
                top: LengthPercentageAuto::Length(block_style.margin_top),
                right: LengthPercentageAuto::Length(block_style.margin_right),
                bottom: LengthPercentageAuto::Length(block_style.margin_bottom),
                left: LengthPercentageAuto::Length(block_style.margin_left),
            },
            padding: Rect {
                top: LengthPercentage::Length(block_style.padding_top),
                right: LengthPercentage::Length(block_style.padding_right),
                bottom: LengthPercentage::Length(block_style.padding_bottom),
                left: LengthPercentage::Length(block_style.padding_left),
            },
            ..current
        };
        self.taffy.set_style(node, updated)?;
        let mut style = text_style.clone();
        style.page_break_before = block_style.page_break_before;
        style.page_break_after = block_style.page_break_after;
        style.page_break_inside_avoid = block_style.page_break_inside_avoid;
        self.node_styles.insert(node, style);
        Ok(node)
    }

    fn build_text_node(
        &mut self,
        text: &str,
        style: &ComputedStyle,
        parent_width: f32,
    ) -> Result<NodeId> {
        let bold = style.font_weight == FontWeight::Bold;
        let italic = style.font_style == CssFontStyle::Italic;
        let family = &style.font_family;
        let font_size = style.font_size;
        let line_height_px = self.fonts.line_height_px(font_size, style.line_height);

        let max_w = if parent_width > 0.0 {
            parent_width
        } else {
            self.available_width
        };
        let lines = wrap_text(text, font_size, bold, italic, family, max_w, self.fonts);

        // Aligned text spans the full line so pagination can offset each line.
        let text_width = if style.text_align == TextAlign::Left {
            lines
                .iter()
                .map(|l| {
                    self.fonts
                        .measure_text_width(l, font_size, bold, italic, family)
                })
                .fold(0.0f32, f32::max)
        } else {
            max_w
        };
        let text_height = lines.len() as f32 * line_height_px;

        let taffy_style = Style {
            size: Size {
                width: Dimension::Length(text_width),
                height: Dimension::Length(text_height),
            },
            flex_shrink: 0.0,
            ..Default::default()
        };

        let node = self.taffy.new_leaf(taffy_style)?;
        self.node_styles.insert(node, style.clone());
        self.node_content.insert(
            node,
            BoxContent::Text {
                text: text.to_string(),
                lines,
            },
        );
        Ok(node)
    }

    fn build_element_node(
        &mut self,
        tag: &Tag,
        style: &ComputedStyle,
        children: &[StyledNode],
        attrs: &HashMap<String, String>,
        parent_width: f32,
    ) -> Result<NodeId> {
        let inline_only = !children.is_empty() && Self::all_inline(children);
        let merged_text = if inline_only {
            let raw: String = children.iter().map(Self::collect_inline_text).collect();
            Some(Self::normalise_run(&raw)).filter(|t| !t.is_empty())
        } else {
            None
        };

        // Headings and paragraphs with only inline content become a single
        // wrapped text node.
        if tag.is_paragraph() {
            if let Some(text) = &merged_text {
                let text_style = Self::run_style(style, children);
                return self.build_paragraph_node(text, &text_style, style, parent_width);
            }
        }

        // Compute the width available for children
        let my_width = match style.width {
            style::Dimension::Px(w) => w,
            style::Dimension::Percent(p) => parent_width * p / 100.0,
            style::Dimension::Auto => parent_width - style.margin_left - style.margin_right,
        };
        let inner_width = my_width
            - style.padding_left
            - style.padding_right
            - 2.0 * style.border_width;

        // Estimate per-child width for flex-row containers and table rows so
        // that text is word-wrapped to the right column width at build time.
        let is_flex_row = style.display == style::Display::Flex
            && style.flex_direction == style::FlexDirection::Row;
        let is_table_row = *tag == Tag::Tr;

        let elem_child_count = children
            .iter()
            .filter(|c| matches!(c, StyledNode::Element { .. }))
            .count()
            .max(1);

        let shared_width = if is_flex_row || is_table_row {
            let gap_total = style.gap * (elem_child_count.saturating_sub(1)) as f32;
            ((inner_width - gap_total) / elem_child_count as f32).max(1.0)
        } else {
            inner_width
        };

        let mut child_nodes = Vec::new();

        if let Some(text) = merged_text {
            let text_style = Self::run_style(style, children);
            child_nodes.push(self.build_text_node(&text, &text_style, inner_width)?);
        } else {
            let mut list_counter = 0u32;
            for child in children {
                // List items record their marker so it can be rendered as a
                // bullet / number in the left gutter.
                let li_marker = match child {
                    StyledNode::Element { tag: Tag::Li, .. } => {
                        list_counter += 1;
                        Some(if *tag == Tag::Ol {
                            format!("{list_counter}. ")
                        } else {
                            "\u{2022} ".to_string()
                        })
                    }
                    _ => None,
                };

                // Children with their own width resolve it against the full
                // row; the rest share it evenly.
                let build_width = match child {
                    StyledNode::Element { style: cs, .. }
                        if is_flex_row && !matches!(cs.width, style::Dimension::Auto) =>
                    {
                        inner_width
                    }
                    _ => shared_width,
                };

                let child_id = self.build_node(child, build_width)?;
                if let Some(marker) = li_marker {
                    self.node_content
                        .insert(child_id, BoxContent::ListItem { marker });
                }
                child_nodes.push(child_id);
            }
        }

        // For <img> elements, resolve Auto width/height to concrete dimensions
        // using the image's intrinsic size decoded from the base64 data URI.
        // A flex container with no children and Auto dimensions computes to
        // 0×0, which would make the image invisible.
        let style_override = if *tag == Tag::Img
            && (matches!(style.width, style::Dimension::Auto)
                || matches!(style.height, style::Dimension::Auto))
        {
            let src = attrs.get("src").map(|s| s.as_str()).unwrap_or("");
            resolve_img_auto_dimensions(src, style, parent_width)
        } else {
            None
        };

        let effective_style = style_override.as_ref().unwrap_or(style);
        let taffy_style = self.computed_to_taffy(effective_style, tag);
        let node = self.taffy.new_with_children(taffy_style, &child_nodes)?;
        self.node_styles.insert(node, effective_style.clone());

        if *tag == Tag::Img {
            let src = attrs.get("src").cloned().unwrap_or_default();
            self.node_content.insert(node, BoxContent::Image { src });
        }

        Ok(node)
    }

    fn computed_to_taffy(&self, s: &ComputedStyle, tag: &Tag) -> Style {
        let mut ts = Style::default();

        let margin = Rect {
            top: LengthPercentageAuto::Length(s.margin_top),
            right: LengthPercentageAuto::Length(s.margin_right),
            bottom: LengthPercentageAuto::Length(s.margin_bottom),
            left: LengthPercentageAuto::Length(s.margin_left),
        };
        let padding = Rect {
            top: LengthPercentage::Length(s.padding_top),
            right: LengthPercentage::Length(s.padding_right),
            bottom: LengthPercentage::Length(s.padding_bottom),
            left: LengthPercentage::Length(s.padding_left),
        };
        let border = Rect {
            top: LengthPercentage::Length(s.border_width),
            right: LengthPercentage::Length(s.border_width),
            bottom: LengthPercentage::Length(s.border_width),
            left: LengthPercentage::Length(s.border_width),
        };

        // HTML table model: always flex regardless of computed display.
        match tag {
            Tag::Table => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Column;
                ts.size.width = self.dim_to_taffy(s.width);
                ts.size.height = self.dim_to_taffy(s.height);
                ts.min_size.width = taffy::Dimension::Length(0.0);
                ts.padding = padding;
                ts.margin = margin;
                return ts;
            }
            Tag::Tr => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Row;
                ts.align_items = Some(taffy::AlignItems::Stretch);
                ts.size.width = taffy::Dimension::Percent(1.0);
                ts.min_size.width = taffy::Dimension::Length(0.0);
                ts.margin = margin;
                return ts;
            }
            Tag::Td | Tag::Th => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Column;
                ts.flex_grow = 1.0;
                ts.flex_shrink = 1.0;
                ts.flex_basis = taffy::Dimension::Length(0.0); // equal columns
                ts.min_size.width = taffy::Dimension::Length(0.0);
                ts.padding = padding;
                ts.border = border;
                return ts;
            }
            _ => {}
        }

        match s.display {
            style::Display::Flex => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = match s.flex_direction {
                    style::FlexDirection::Row => taffy::FlexDirection::Row,
                    style::FlexDirection::Column => taffy::FlexDirection::Column,
                };
                ts.flex_wrap = match s.flex_wrap {
                    style::FlexWrap::NoWrap => taffy::FlexWrap::NoWrap,
                    style::FlexWrap::Wrap => taffy::FlexWrap::Wrap,
                };
                ts.justify_content = Some(match s.justify_content {
                    style::JustifyContent::Start => taffy::JustifyContent::Start,
                    style::JustifyContent::End => taffy::JustifyContent::End,
                    style::JustifyContent::Center => taffy::JustifyContent::Center,
                    style::JustifyContent::SpaceBetween => taffy::JustifyContent::SpaceBetween,
                    style::JustifyContent::SpaceAround => taffy::JustifyContent::SpaceAround,
                    style::JustifyContent::SpaceEvenly => taffy::JustifyContent::SpaceEvenly,
                });
                ts.align_items = Some(match s.align_items {
                    style::AlignItems::Start => taffy::AlignItems::Start,
                    style::AlignItems::End => taffy::AlignItems::End,
                    style::AlignItems::Center => taffy::AlignItems::Center,
                    style::AlignItems::Stretch => taffy::AlignItems::Stretch,
                });
            }
            style::Display::Grid => {
                ts.display = taffy::Display::Grid;
                let cols = s.grid_template_columns.len().max(1);
                ts.grid_template_columns = vec![taffy::TrackSizingFunction::from_flex(1.0); cols];
            }
            style::Display::Block
            | style::Display::ListItem
            | style::Display::TableRow
            | style::Display::TableCell
            | style::Display::InlineBlock => {
                // Block-level elements stack vertically.
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Column;
            }
            style::Display::Inline => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Row;
                ts.flex_wrap = taffy::FlexWrap::Wrap;
            }
            style::Display::None => {
                ts.display = taffy::Display::None;
            }
        }

        ts.size = Size {
            width: self.dim_to_taffy(s.width),
            height: self.dim_to_taffy(s.height),
        };
        // Allow flex/shrink items to compress below their natural content size
        ts.min_size = Size {
            width: if s.flex_shrink > 0.0 || s.flex_grow > 0.0 {
                taffy::Dimension::Length(0.0)
            } else {
                self.dim_to_taffy(s.min_width)
            },
            height: taffy::Dimension::Auto,
        };
        ts.max_size = Size {
            width: self.dim_to_taffy(s.max_width),
            height: taffy::Dimension::Auto,
        };

        ts.flex_grow = s.flex_grow;
        ts.flex_shrink = s.flex_shrink;
        ts.margin = margin;
        ts.padding = padding;
        ts.border = border;
        ts.gap = Size {
            width: LengthPercentage::Length(s.gap),
            height: LengthPercentage::Length(s.gap),
        };

        ts
    }

    fn dim_to_taffy(&self, d: style::Dimension) -> taffy::Dimension {
        match d {
            style::Dimension::Auto => taffy::Dimension::Auto,
            style::Dimension::Px(v) => taffy::Dimension::Length(v),
            style::Dimension::Percent(v) => taffy::Dimension::Percent(v / 100.0),
        }
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<PositionedBox> {
        let layout = self.taffy.layout(node)?;
        let style = self.node_styles.get(&node).cloned().unwrap_or_default();
        let content = self
            .node_content
            .get(&node)
            .cloned()
            .unwrap_or(BoxContent::None);

        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;

        let children = self
            .taffy
            .children(node)?
            .into_iter()
            .map(|child| self.extract(child, x, y))
            .collect::<Result<Vec<_>>>()?;

        Ok(PositionedBox {
            x,
            y,
            width: layout.size.width,
            height: layout.size.height,
            page_break_before: style.page_break_before,
            page_break_after: style.page_break_after,
            page_break_inside_avoid: style.page_break_inside_avoid,
            style,
            content,
            children,
        })
    }
}

// ---------------------------------------------------------------------------
// Image intrinsic-size helper
// ---------------------------------------------------------------------------

/// Decode a base64 data-URI image and return a cloned [`ComputedStyle`] with
/// any `Auto` width/height replaced by values derived from the image's
/// intrinsic dimensions.
///
/// Returns `None` when the src is not a parseable base64 data URI, when image
/// decoding fails, or when both dimensions are already specified.
fn resolve_img_auto_dimensions(
    src: &str,
    style: &ComputedStyle,
    parent_width: f32,
) -> Option<ComputedStyle> {
    use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};

    if !src.starts_with("data:") || !src.contains(";base64,") {
        return None;
    }
    let comma = src.find(',')?;
    let bytes = BASE64_STD.decode(src[comma + 1..].trim()).ok()?;
    let img = ::image::load_from_memory(&bytes).ok()?;
    let (px_w, px_h) = (img.width() as f32, img.height() as f32);
    if px_w == 0.0 || px_h == 0.0 {
        return None;
    }
    let aspect = px_w / px_h;

    let known_w = match style.width {
        style::Dimension::Px(v) => Some(v),
        style::Dimension::Percent(p) => Some(parent_width * p / 100.0),
        style::Dimension::Auto => None,
    };
    let known_h = match style.height {
        style::Dimension::Px(v) => Some(v),
        _ => None,
    };
    // `max-width: 100%` keeps large logos inside the column.
    let max_w = match style.max_width {
        style::Dimension::Px(v) => v,
        style::Dimension::Percent(p) => parent_width * p / 100.0,
        style::Dimension::Auto => f32::INFINITY,
    };

    let mut s = style.clone();
    match (known_w, known_h) {
        (Some(w), None) => s.height = style::Dimension::Px((w / aspect).max(1.0)),
        (None, Some(h)) => s.width = style::Dimension::Px((h * aspect).max(1.0)),
        (None, None) => {
            let w = px_w.min(max_w);
            s.width = style::Dimension::Px(w);
            s.height = style::Dimension::Px((w / aspect).max(1.0));
        }
        (Some(_), Some(_)) => return None,
    }
    Some(s)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute layout for a styled tree, returning a list of top-level positioned
/// boxes in document coordinates.
pub fn compute_layout(
    styled_nodes: &[StyledNode],
    page_width: f32,
    page_margin: f32,
    fonts: &FontManager,
) -> Result<Vec<PositionedBox>> {
    let content_width = page_width - 2.0 * page_margin;
    let mut builder = LayoutBuilder::new(fonts, content_width);

    let child_ids = styled_nodes
        .iter()
        .map(|node| builder.build_node(node, content_width))
        .collect::<Result<Vec<_>>>()?;

    let root_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        size: Size {
            width: taffy::Dimension::Length(content_width),
            height: taffy::Dimension::Auto,
        },
        ..Default::default()
    };

    let root = builder.taffy.new_with_children(root_style, &child_ids)?;
    builder.taffy.compute_layout(
        root,
        Size {
            width: AvailableSpace::Definite(content_width),
            height: AvailableSpace::MaxContent,
        },
    )?;

    let root_box = builder.extract(root, page_margin, 0.0)?;
    Ok(root_box.children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::style::{build_styled_tree, Stylesheet};

    fn layout(html: &str) -> Vec<PositionedBox> {
        let dom = parse_html(html);
        let styled = build_styled_tree(&dom, None, &Stylesheet::default());
        compute_layout(&styled, 595.0, 40.0, &FontManager::default()).unwrap()
    }

    fn text_lines(b: &PositionedBox) -> Vec<String> {
        match &b.content {
            BoxContent::Text { lines, .. } => lines.clone(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn layout_simple_paragraph() {
        let boxes = layout("<p>Hello world</p>");
        assert!(!boxes.is_empty(), "Should produce at least one box");
        let first = &boxes[0];
        assert!(first.width > 0.0, "Box should have width");
        assert!(first.height > 0.0, "Box should have height");
    }

    #[test]
    fn layout_flex_row() {
        let boxes = layout(
            r#"<div class="flex"><div class="flex-1">A</div><div class="flex-1">B</div></div>"#,
        );
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].children.len(), 2);
    }

    #[test]
    fn inline_formatting_merges_into_one_run() {
        let boxes = layout("<p><strong>Paciente:</strong> Juan Pérez</p>");
        assert_eq!(text_lines(&boxes[0]), vec!["Paciente: Juan Pérez"]);
    }

    #[test]
    fn br_forces_a_line_break() {
        let boxes = layout("<p>Calle Mayor 1<br>\n  Madrid</p>");
        assert_eq!(text_lines(&boxes[0]), vec!["Calle Mayor 1", "Madrid"]);
    }

    #[test]
    fn source_newlines_are_spaces() {
        let boxes = layout("<p>uno\ndos</p>");
        assert_eq!(text_lines(&boxes[0]), vec!["uno dos"]);
    }

    #[test]
    fn hr_is_a_thin_rule() {
        let boxes = layout("<p>a</p><hr><p>b</p>");
        let hr = &boxes[1];
        assert!((hr.height - 1.0).abs() < 0.01);
        assert!((hr.width - 515.0).abs() < 0.5);
    }

    #[test]
    fn cell_text_keeps_cell_box() {
        let boxes = layout("<table><tr><td><strong>Total</strong></td><td>12</td></tr></table>");
        let row = &boxes[0].children[0];
        let cell = &row.children[0];
        assert!(cell.style.border_width > 0.0);
        let text = &cell.children[0];
        assert_eq!(text_lines(text), vec!["Total"]);
        assert_eq!(text.style.font_weight, FontWeight::Bold);
    }

    #[test]
    fn bootstrap_columns_split_the_row() {
        let boxes = layout(
            r#"<div class="row"><div class="col-md-6"><p>Izquierda</p></div><div class="col-md-6 text-end"><p>Derecha</p></div></div>"#,
        );
        let row = &boxes[0];
        assert_eq!(row.children.len(), 2);
        let (left, right) = (&row.children[0], &row.children[1]);
        assert!((left.width - 257.5).abs() < 1.0, "left width {}", left.width);
        assert!(right.x > left.x + 200.0);
    }
}
