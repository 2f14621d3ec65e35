//! Style resolver – maps the document stylesheet, utility classes and inline
//! styles to a flat [`ComputedStyle`] struct consumed by the layout engine.
//!
//! Resolution order for an element (later wins):
//! 1. inherited text properties of the parent
//! 2. tag defaults
//! 3. `<style>` rules, by specificity then source order
//! 4. utility classes (Tailwind subset plus the Bootstrap names used by
//!    stored report templates)
//! 5. the `style` attribute

use std::collections::HashMap;

use crate::dom::{DomNode, ElementNode, Tag};

/// Fully resolved style for a single element.
#[derive(Debug, Clone)]
pub struct ComputedStyle {
    // Display / layout
    pub display: Display,
    pub flex_direction: FlexDirection,
    pub flex_wrap: FlexWrap,
    pub flex_grow: f32,
    pub flex_shrink: f32,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub gap: f32,

    // Grid
    pub grid_template_columns: Vec<GridTrack>,

    // Sizing
    pub width: Dimension,
    pub height: Dimension,
    pub min_width: Dimension,
    pub max_width: Dimension,

    // Spacing (pt)
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,

    // Border
    pub border_width: f32,
    pub border_color: Color,

    // Typography
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_family: String,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub text_decoration: TextDecoration,
    pub font_style: FontStyle,

    // Background
    pub background_color: Color,

    // Page break
    pub page_break_before: bool,
    pub page_break_after: bool,
    pub page_break_inside_avoid: bool,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            flex_direction: FlexDirection::Row,
            flex_wrap: FlexWrap::NoWrap,
            flex_grow: 0.0,
            flex_shrink: 1.0,
            justify_content: JustifyContent::Start,
            align_items: AlignItems::Stretch,
            gap: 0.0,
            grid_template_columns: Vec::new(),
            width: Dimension::Auto,
            height: Dimension::Auto,
            min_width: Dimension::Auto,
            max_width: Dimension::Auto,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            border_width: 0.0,
            border_color: Color::BLACK,
            font_size: 16.0,
            font_weight: FontWeight::Normal,
            font_family: "DejaVu Sans".to_string(),
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.4,
            text_decoration: TextDecoration::None,
            font_style: FontStyle::Normal,
            background_color: Color::TRANSPARENT,
            page_break_before: false,
            page_break_after: false,
            page_break_inside_avoid: false,
        }
    }
}

impl ComputedStyle {
    /// Style for a run of text inside `self`: text properties kept, box model
    /// cleared.
    pub fn text_run(&self) -> Self {
        Self {
            display: Display::Inline,
            width: Dimension::Auto,
            height: Dimension::Auto,
            min_width: Dimension::Auto,
            max_width: Dimension::Auto,
            border_width: 0.0,
            background_color: Color::TRANSPARENT,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            page_break_before: false,
            page_break_after: false,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Supporting enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Flex,
    Grid,
    Inline,
    InlineBlock,
    ListItem,
    TableRow,
    TableCell,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexWrap {
    NoWrap,
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifyContent {
    Start,
    End,
    Center,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignItems {
    Start,
    End,
    Center,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoration {
    None,
    Underline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Px(f32),
    Percent(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridTrack {
    Px(f32),
    Fr(f32),
    Auto,
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => Some(Self::rgb(
                channel(&hex[0..1].repeat(2))?,
                channel(&hex[1..2].repeat(2))?,
                channel(&hex[2..3].repeat(2))?,
            )),
            _ => None,
        }
    }

    /// Parse `#rgb`, `#rrggbb`, `rgb(r, g, b)` or a basic colour keyword.
    pub fn parse(val: &str) -> Option<Self> {
        let val = val.trim();
        if val.starts_with('#') {
            return Self::from_hex(val);
        }
        let lower = val.to_ascii_lowercase();
        if let Some(args) = lower
            .strip_prefix("rgb(")
            .or_else(|| lower.strip_prefix("rgba("))
            .and_then(|s| s.strip_suffix(')'))
        {
            let parts: Vec<f32> = args
                .split(',')
                .filter_map(|p| p.trim().parse::<f32>().ok())
                .collect();
            if parts.len() < 3 {
                return None;
            }
            let mut c = Self::rgb(parts[0] / 255.0, parts[1] / 255.0, parts[2] / 255.0);
            if let Some(a) = parts.get(3) {
                c.a = *a;
            }
            return Some(c);
        }
        let c = match lower.as_str() {
            "black" => Self::BLACK,
            "white" => Self::WHITE,
            "transparent" => Self::TRANSPARENT,
            "red" => Self::rgb(1.0, 0.0, 0.0),
            "green" => Self::rgb(0.0, 0.502, 0.0),
            "blue" => Self::rgb(0.0, 0.0, 1.0),
            "gray" | "grey" => Self::rgb(0.502, 0.502, 0.502),
            "silver" => Self::rgb(0.753, 0.753, 0.753),
            "navy" => Self::rgb(0.0, 0.0, 0.502),
            "orange" => Self::rgb(1.0, 0.647, 0.0),
            "yellow" => Self::rgb(1.0, 1.0, 0.0),
            _ => return None,
        };
        Some(c)
    }
}

// ---------------------------------------------------------------------------
// Stylesheet
// ---------------------------------------------------------------------------

/// Rules parsed from the document's `<style>` elements.
///
/// Only compound selectors of a tag and/or classes are honoured
/// (`h1`, `.header`, `th.total`, `*`); rules using combinators, ids or
/// pseudo-classes are ignored.
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    rules: Vec<CssRule>,
    pub page: PageRule,
}

#[derive(Debug, Clone)]
struct CssRule {
    selector: Selector,
    order: usize,
    declarations: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
struct Selector {
    tag: Option<String>,
    classes: Vec<String>,
}

impl Selector {
    fn parse(text: &str) -> Option<Self> {
        if text.is_empty() || text.contains([' ', '>', '+', '~', ':', '[', '#']) {
            return None;
        }
        if text == "*" {
            return Some(Self {
                tag: None,
                classes: Vec::new(),
            });
        }
        let mut parts = text.split('.');
        let tag = parts
            .next()
            .filter(|t| !t.is_empty())
            .map(|t| t.to_ascii_lowercase());
        let classes: Vec<String> = parts.map(str::to_string).collect();
        if classes.iter().any(String::is_empty) {
            return None;
        }
        Some(Self { tag, classes })
    }

    fn specificity(&self) -> (usize, usize) {
        (self.classes.len(), usize::from(self.tag.is_some()))
    }

    fn matches(&self, element: &ElementNode) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag.name().eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        let classes = element.classes();
        self.classes.iter().all(|c| classes.contains(&c.as_str()))
    }
}

/// Page box settings from `@page`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRule {
    /// Portrait page size in points.
    pub size: Option<(f32, f32)>,
    pub landscape: bool,
    /// Uniform page margin in points.
    pub margin: Option<f32>,
}

impl PageRule {
    fn apply(&mut self, declarations: &[(String, String)]) {
        for (prop, val) in declarations {
            match prop.as_str() {
                "size" => self.apply_size(val),
                "margin" => {
                    if let Some(first) = val.split_whitespace().next() {
                        self.margin = parse_length(first, 16.0);
                    }
                }
                _ => {}
            }
        }
    }

    fn apply_size(&mut self, val: &str) {
        let mut lengths = Vec::new();
        for token in val.split_whitespace() {
            match token.to_ascii_lowercase().as_str() {
                "a3" => self.size = Some((841.89, 1190.55)),
                "a4" => self.size = Some((595.28, 841.89)),
                "a5" => self.size = Some((419.53, 595.28)),
                "letter" => self.size = Some((612.0, 792.0)),
                "legal" => self.size = Some((612.0, 1008.0)),
                "landscape" => self.landscape = true,
                "portrait" => self.landscape = false,
                other => lengths.extend(parse_length(other, 16.0)),
            }
        }
        if let [w, h] = lengths[..] {
            self.landscape = w > h;
            self.size = Some((w.min(h), w.max(h)));
        }
    }
}

impl Stylesheet {
    pub fn parse(css: &str) -> Self {
        let css = strip_comments(css);
        let mut sheet = Stylesheet::default();
        let mut rest = css.as_str();
        let mut order = 0usize;

        while let Some(open) = rest.find('{') {
            let prelude = rest[..open].trim();
            let close = match matching_brace(&rest[open..]) {
                Some(i) => open + i,
                None => break,
            };
            let body = &rest[open + 1..close];
            rest = &rest[close + 1..];

            if let Some(at_rule) = prelude.strip_prefix('@') {
                if at_rule.starts_with("page") {
                    sheet.page.apply(&parse_declarations(body));
                } else {
                    log::debug!("Ignoring @{at_rule} rule");
                }
                continue;
            }

            let declarations = parse_declarations(body);
            for text in prelude.split(',') {
                match Selector::parse(text.trim()) {
                    Some(selector) => {
                        sheet.rules.push(CssRule {
                            selector,
                            order,
                            declarations: declarations.clone(),
                        });
                        order += 1;
                    }
                    None => log::debug!("Ignoring unsupported selector '{}'", text.trim()),
                }
            }
        }

        sheet
            .rules
            .sort_by_key(|r| (r.selector.specificity(), r.order));
        sheet
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.page == PageRule::default()
    }

    fn apply(&self, element: &ElementNode, style: &mut ComputedStyle) {
        for rule in &self.rules {
            if rule.selector.matches(element) {
                for (prop, val) in &rule.declarations {
                    apply_css_property(style, prop, val);
                }
            }
        }
    }
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        rest = match rest[start + 2..].find("*/") {
            Some(end) => &rest[start + 2 + end + 2..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}

/// Byte offset of the `}` closing the `{` at the start of `s`.
fn matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_declarations(body: &str) -> Vec<(String, String)> {
    body.split(';')
        .filter_map(|decl| {
            let (prop, val) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let val = val.trim().trim_end_matches("!important").trim();
            if prop.is_empty() || val.is_empty() {
                None
            } else {
                Some((prop, val.to_string()))
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style for an element, inheriting text properties from its parent.
pub fn resolve_style(
    element: &ElementNode,
    parent: Option<&ComputedStyle>,
    sheet: &Stylesheet,
) -> ComputedStyle {
    let mut style = ComputedStyle::default();

    if let Some(p) = parent {
        style.font_size = p.font_size;
        style.font_weight = p.font_weight;
        style.font_family = p.font_family.clone();
        style.color = p.color;
        style.text_align = p.text_align;
        style.line_height = p.line_height;
        style.font_style = p.font_style;
        style.text_decoration = p.text_decoration;
    }

    apply_tag_defaults(&mut style, &element.tag);
    sheet.apply(element, &mut style);

    for class in element.classes() {
        apply_utility_class(&mut style, class);
    }

    if let Some(inline) = element.inline_style() {
        apply_inline_style(&mut style, inline);
    }

    style
}

/// Default styles based on tag semantics.
fn apply_tag_defaults(s: &mut ComputedStyle, tag: &Tag) {
    let heading = |s: &mut ComputedStyle, size: f32, margin: f32| {
        s.font_size = size;
        s.font_weight = FontWeight::Bold;
        s.margin_top = margin;
        s.margin_bottom = margin * 0.75;
    };
    match tag {
        Tag::H1 => heading(s, 32.0, 16.0),
        Tag::H2 => heading(s, 24.0, 14.0),
        Tag::H3 => heading(s, 20.0, 12.0),
        Tag::H4 => heading(s, 16.0, 10.0),
        Tag::H5 => heading(s, 14.0, 8.0),
        Tag::H6 => heading(s, 12.0, 8.0),
        Tag::P => {
            s.margin_bottom = 10.0;
        }
        Tag::Ul | Tag::Ol => {
            s.margin_bottom = 10.0;
            s.padding_left = 24.0;
        }
        Tag::Li => {
            s.display = Display::ListItem;
            s.margin_bottom = 4.0;
        }
        Tag::Table => {
            s.display = Display::Grid;
            s.border_width = 1.0;
        }
        Tag::Tr => {
            s.display = Display::TableRow;
        }
        Tag::Td | Tag::Th => {
            s.display = Display::TableCell;
            s.padding_top = 4.0;
            s.padding_right = 8.0;
            s.padding_bottom = 4.0;
            s.padding_left = 8.0;
            s.border_width = 1.0;
            if *tag == Tag::Th {
                s.font_weight = FontWeight::Bold;
                s.background_color = Color::rgb(0.93, 0.93, 0.93);
            }
        }
        Tag::Span | Tag::Br => {
            s.display = Display::Inline;
        }
        Tag::Strong | Tag::B => {
            s.display = Display::Inline;
            s.font_weight = FontWeight::Bold;
        }
        Tag::Em | Tag::I => {
            s.display = Display::Inline;
            s.font_style = FontStyle::Italic;
        }
        Tag::U => {
            s.display = Display::Inline;
            s.text_decoration = TextDecoration::Underline;
        }
        Tag::Hr => {
            s.height = Dimension::Px(1.0);
            s.margin_top = 8.0;
            s.margin_bottom = 8.0;
            s.background_color = Color::rgb(0.8, 0.8, 0.8);
        }
        Tag::Img => {
            s.display = Display::InlineBlock;
        }
        Tag::Div | Tag::Body | Tag::Html => {}
        Tag::Head
        | Tag::Title
        | Tag::Style
        | Tag::Meta
        | Tag::Link
        | Tag::RowGroup
        | Tag::Unknown(_) => {
            s.display = Display::None;
        }
    }
}

/// Apply a single utility class.
fn apply_utility_class(s: &mut ComputedStyle, class: &str) {
    match class {
        // Display
        "flex" | "d-flex" => s.display = Display::Flex,
        "grid" => s.display = Display::Grid,
        "block" | "d-block" => s.display = Display::Block,
        "inline" => s.display = Display::Inline,
        "inline-block" => s.display = Display::InlineBlock,
        "hidden" | "d-none" => s.display = Display::None,

        // Flex direction
        "flex-row" => s.flex_direction = FlexDirection::Row,
        "flex-col" | "flex-column" => s.flex_direction = FlexDirection::Column,

        // Flex wrap
        "flex-wrap" => s.flex_wrap = FlexWrap::Wrap,
        "flex-nowrap" => s.flex_wrap = FlexWrap::NoWrap,

        // Flex grow/shrink
        "flex-grow" | "grow" | "flex-grow-1" => s.flex_grow = 1.0,
        "flex-shrink" | "shrink" => s.flex_shrink = 1.0,
        "flex-1" => {
            s.flex_grow = 1.0;
            s.flex_shrink = 1.0;
        }

        // Justify content
        "justify-start" | "justify-content-start" => s.justify_content = JustifyContent::Start,
        "justify-end" | "justify-content-end" => s.justify_content = JustifyContent::End,
        "justify-center" | "justify-content-center" => {
            s.justify_content = JustifyContent::Center
        }
        "justify-between" | "justify-content-between" => {
            s.justify_content = JustifyContent::SpaceBetween
        }
        "justify-around" | "justify-content-around" => {
            s.justify_content = JustifyContent::SpaceAround
        }
        "justify-evenly" | "justify-content-evenly" => {
            s.justify_content = JustifyContent::SpaceEvenly
        }

        // Align items
        "items-start" | "align-items-start" => s.align_items = AlignItems::Start,
        "items-end" | "align-items-end" => s.align_items = AlignItems::End,
        "items-center" | "align-items-center" => s.align_items = AlignItems::Center,
        "items-stretch" | "align-items-stretch" => s.align_items = AlignItems::Stretch,

        // Font weight / style
        "font-bold" | "fw-bold" => s.font_weight = FontWeight::Bold,
        "font-normal" | "fw-normal" => s.font_weight = FontWeight::Normal,
        "italic" | "fst-italic" => s.font_style = FontStyle::Italic,
        "not-italic" | "fst-normal" => s.font_style = FontStyle::Normal,

        // Text decoration
        "underline" | "text-decoration-underline" => {
            s.text_decoration = TextDecoration::Underline
        }
        "no-underline" | "text-decoration-none" => s.text_decoration = TextDecoration::None,

        // Text alignment
        "text-left" | "text-start" => s.text_align = TextAlign::Left,
        "text-center" => s.text_align = TextAlign::Center,
        "text-right" | "text-end" => s.text_align = TextAlign::Right,
        "text-muted" => s.color = Color::rgb(0.424, 0.459, 0.490),

        // Font sizes
        "text-xs" => s.font_size = 12.0,
        "text-sm" | "small" => s.font_size = 14.0,
        "text-base" => s.font_size = 16.0,
        "text-lg" => s.font_size = 18.0,
        "text-xl" => s.font_size = 20.0,
        "text-2xl" => s.font_size = 24.0,
        "text-3xl" => s.font_size = 30.0,
        "text-4xl" => s.font_size = 36.0,

        // Width
        "w-full" | "w-100" => s.width = Dimension::Percent(100.0),
        "w-auto" => s.width = Dimension::Auto,
        "w-1/2" | "w-50" => s.width = Dimension::Percent(50.0),
        "w-1/3" => s.width = Dimension::Percent(33.333),
        "w-2/3" => s.width = Dimension::Percent(66.666),
        "w-1/4" | "w-25" => s.width = Dimension::Percent(25.0),
        "w-3/4" | "w-75" => s.width = Dimension::Percent(75.0),

        // Bootstrap grid
        "row" => {
            s.display = Display::Flex;
            s.flex_direction = FlexDirection::Row;
            s.flex_wrap = FlexWrap::Wrap;
        }
        "col" => {
            s.flex_grow = 1.0;
            s.flex_shrink = 1.0;
        }

        // Bootstrap alerts
        "alert" => {
            s.padding_top = 12.0;
            s.padding_right = 16.0;
            s.padding_bottom = 12.0;
            s.padding_left = 16.0;
            s.margin_bottom = 16.0;
            s.border_width = 1.0;
        }
        "alert-warning" => alert_colors(s, "#fff3cd", "#ffe69c", "#664d03"),
        "alert-info" => alert_colors(s, "#cff4fc", "#9eeaf9", "#055160"),
        "alert-danger" => alert_colors(s, "#f8d7da", "#f1aeb5", "#58151c"),
        "alert-success" => alert_colors(s, "#d1e7dd", "#a3cfbb", "#0a3622"),

        // Page break
        "break-before" => s.page_break_before = true,
        "break-after" => s.page_break_after = true,
        "break-inside-avoid" => s.page_break_inside_avoid = true,
        "page" | "page-break" => s.page_break_after = true,

        _ => {
            try_parse_column_class(s, class);
            try_parse_spacing_class(s, class);
            try_parse_color_class(s, class);
            try_parse_gap_class(s, class);
            try_parse_grid_cols_class(s, class);
            try_parse_width_class(s, class);
            try_parse_height_class(s, class);
        }
    }
}

fn alert_colors(s: &mut ComputedStyle, bg: &str, border: &str, text: &str) {
    if let (Some(bg), Some(border), Some(text)) =
        (Color::from_hex(bg), Color::from_hex(border), Color::from_hex(text))
    {
        s.background_color = bg;
        s.border_color = border;
        s.color = text;
    }
}

/// `col-6`, `col-md-6`, `col-lg-4`: a fraction of a 12-column row.
fn try_parse_column_class(s: &mut ComputedStyle, class: &str) {
    let Some(rest) = class.strip_prefix("col-") else {
        return;
    };
    let span = rest.rsplit('-').next().and_then(|n| n.parse::<f32>().ok());
    match span {
        Some(n) if n > 0.0 && n <= 12.0 => {
            s.width = Dimension::Percent(n / 12.0 * 100.0);
            s.flex_shrink = 1.0;
        }
        // `col-md`, `col-auto`: share the remaining space
        _ => {
            s.flex_grow = 1.0;
            s.flex_shrink = 1.0;
        }
    }
}

fn try_parse_spacing_class(s: &mut ComputedStyle, class: &str) {
    // p-{n}, px-{n}, py-{n}, pt-{n}, etc.  (1 unit = 4px)
    // m-{n}, mx-{n}, my-{n}, mt-{n}, etc.
    let Some((prefix, value_str)) = class.rsplit_once('-') else {
        return;
    };
    let value: f32 = match value_str.parse::<f32>() {
        Ok(v) => v * 4.0,
        Err(_) => return,
    };

    match prefix {
        "p" => {
            s.padding_top = value;
            s.padding_right = value;
            s.padding_bottom = value;
            s.padding_left = value;
        }
        "px" => {
            s.padding_left = value;
            s.padding_right = value;
        }
        "py" => {
            s.padding_top = value;
            s.padding_bottom = value;
        }
        "pt" => s.padding_top = value,
        "pr" | "pe" => s.padding_right = value,
        "pb" => s.padding_bottom = value,
        "pl" | "ps" => s.padding_left = value,
        "m" => {
            s.margin_top = value;
            s.margin_right = value;
            s.margin_bottom = value;
            s.margin_left = value;
        }
        "mx" => {
            s.margin_left = value;
            s.margin_right = value;
        }
        "my" => {
            s.margin_top = value;
            s.margin_bottom = value;
        }
        "mt" => s.margin_top = value,
        "mr" | "me" => s.margin_right = value,
        "mb" => s.margin_bottom = value,
        "ml" | "ms" => s.margin_left = value,
        _ => {}
    }
}

fn try_parse_color_class(s: &mut ComputedStyle, class: &str) {
    // Tailwind colour subset: text-{color}, bg-{color}, border-{color}
    const COLORS: [(&str, Color); 15] = [
        ("red-500", Color::rgb(0.937, 0.267, 0.267)),
        ("red-700", Color::rgb(0.725, 0.110, 0.110)),
        ("blue-500", Color::rgb(0.231, 0.510, 0.965)),
        ("blue-700", Color::rgb(0.102, 0.306, 0.827)),
        ("green-500", Color::rgb(0.133, 0.773, 0.369)),
        ("green-700", Color::rgb(0.082, 0.533, 0.247)),
        ("gray-100", Color::rgb(0.953, 0.957, 0.961)),
        ("gray-200", Color::rgb(0.898, 0.906, 0.922)),
        ("gray-300", Color::rgb(0.831, 0.843, 0.871)),
        ("gray-500", Color::rgb(0.424, 0.447, 0.502)),
        ("gray-700", Color::rgb(0.216, 0.255, 0.318)),
        ("gray-900", Color::rgb(0.067, 0.094, 0.153)),
        ("white", Color::WHITE),
        ("black", Color::BLACK),
        ("yellow-500", Color::rgb(0.918, 0.788, 0.153)),
    ];

    let (target, name) = if let Some(n) = class.strip_prefix("text-") {
        (&mut s.color, n)
    } else if let Some(n) = class.strip_prefix("bg-") {
        (&mut s.background_color, n)
    } else if let Some(n) = class.strip_prefix("border-") {
        (&mut s.border_color, n)
    } else {
        return;
    };
    if let Some((_, color)) = COLORS.iter().find(|(c, _)| *c == name) {
        *target = *color;
    }
}

fn try_parse_gap_class(s: &mut ComputedStyle, class: &str) {
    if let Some(rest) = class.strip_prefix("gap-") {
        if let Ok(v) = rest.parse::<f32>() {
            s.gap = v * 4.0;
        }
    }
}

fn try_parse_grid_cols_class(s: &mut ComputedStyle, class: &str) {
    if let Some(rest) = class.strip_prefix("grid-cols-") {
        if let Ok(n) = rest.parse::<usize>() {
            s.grid_template_columns = vec![GridTrack::Fr(1.0); n];
        }
    }
}

fn try_parse_width_class(s: &mut ComputedStyle, class: &str) {
    if let Some(rest) = class.strip_prefix("w-") {
        if let Ok(v) = rest.parse::<f32>() {
            s.width = Dimension::Px(v * 4.0);
        }
    }
}

fn try_parse_height_class(s: &mut ComputedStyle, class: &str) {
    if let Some(rest) = class.strip_prefix("h-") {
        if let Ok(v) = rest.parse::<f32>() {
            s.height = Dimension::Px(v * 4.0);
        }
    }
}

// ---------------------------------------------------------------------------
// CSS declarations
// ---------------------------------------------------------------------------

fn apply_inline_style(s: &mut ComputedStyle, style_str: &str) {
    for (prop, val) in parse_declarations(style_str) {
        apply_css_property(s, &prop, &val);
    }
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str) {
    let em = s.font_size;
    let set_len = |target: &mut f32| {
        if let Some(v) = parse_length(val, em) {
            *target = v;
        }
    };
    match prop {
        "display" => {
            s.display = match val {
                "flex" => Display::Flex,
                "grid" => Display::Grid,
                "block" | "table-cell" => Display::Block,
                "inline" => Display::Inline,
                "inline-block" => Display::InlineBlock,
                "none" => Display::None,
                "table" => {
                    s.flex_direction = FlexDirection::Row;
                    Display::Flex
                }
                _ => s.display,
            }
        }
        "flex-direction" => {
            s.flex_direction = match val {
                "row" => FlexDirection::Row,
                "column" => FlexDirection::Column,
                _ => s.flex_direction,
            }
        }
        "flex-grow" => {
            if let Ok(v) = val.parse() {
                s.flex_grow = v;
            }
        }
        "font-size" => {
            if let Some(v) = parse_length(val, em) {
                s.font_size = v;
            }
        }
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "bolder" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = match val {
                "italic" | "oblique" => FontStyle::Italic,
                _ => FontStyle::Normal,
            }
        }
        "text-decoration" | "text-decoration-line" => {
            s.text_decoration = if val.contains("underline") {
                TextDecoration::Underline
            } else {
                TextDecoration::None
            }
        }
        "color" => {
            if let Some(c) = Color::parse(val) {
                s.color = c;
            }
        }
        "background-color" | "background" => {
            if let Some(c) = Color::parse(val) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match val {
                "center" => TextAlign::Center,
                "right" | "end" => TextAlign::Right,
                _ => TextAlign::Left,
            }
        }
        "width" => s.width = parse_dimension(val, em),
        "height" => s.height = parse_dimension(val, em),
        "min-width" => s.min_width = parse_dimension(val, em),
        "max-width" => s.max_width = parse_dimension(val, em),
        "margin" => apply_shorthand_spacing(
            val,
            em,
            [
                &mut s.margin_top,
                &mut s.margin_right,
                &mut s.margin_bottom,
                &mut s.margin_left,
            ],
        ),
        "margin-top" => set_len(&mut s.margin_top),
        "margin-right" => set_len(&mut s.margin_right),
        "margin-bottom" => set_len(&mut s.margin_bottom),
        "margin-left" => set_len(&mut s.margin_left),
        "padding" => apply_shorthand_spacing(
            val,
            em,
            [
                &mut s.padding_top,
                &mut s.padding_right,
                &mut s.padding_bottom,
                &mut s.padding_left,
            ],
        ),
        "padding-top" => set_len(&mut s.padding_top),
        "padding-right" => set_len(&mut s.padding_right),
        "padding-bottom" => set_len(&mut s.padding_bottom),
        "padding-left" => set_len(&mut s.padding_left),
        "border" => {
            for token in val.split_whitespace() {
                if token == "none" {
                    s.border_width = 0.0;
                } else if let Some(w) = parse_length(token, em) {
                    s.border_width = w;
                } else if let Some(c) = Color::parse(token) {
                    s.border_color = c;
                }
            }
        }
        "border-width" => set_len(&mut s.border_width),
        "border-color" => {
            if let Some(c) = Color::parse(val) {
                s.border_color = c;
            }
        }
        "line-height" => {
            if let Ok(v) = val.parse::<f32>() {
                s.line_height = v;
            } else if let Some(px) = parse_length(val, em) {
                s.line_height = px / s.font_size;
            }
        }
        "gap" => set_len(&mut s.gap),
        "break-after" | "page-break-after" => {
            s.page_break_after = val == "always" || val == "page";
        }
        "break-before" | "page-break-before" => {
            s.page_break_before = val == "always" || val == "page";
        }
        "page-break-inside" | "break-inside" => {
            s.page_break_inside_avoid = val == "avoid";
        }
        _ => {}
    }
}

/// Parse a CSS length into points. CSS pixels map 1:1 to points.
pub fn parse_length(val: &str, font_size: f32) -> Option<f32> {
    let val = val.trim();
    if val == "0" {
        return Some(0.0);
    }
    const UNITS: [(&str, f32); 6] = [
        ("px", 1.0),
        ("pt", 1.0),
        ("cm", 28.346_457),
        ("mm", 2.834_645_7),
        ("in", 72.0),
        ("em", 0.0),
    ];
    for (unit, factor) in UNITS {
        if let Some(num) = val.strip_suffix(unit) {
            let n: f32 = num.trim().parse().ok()?;
            let factor = if unit == "em" { font_size } else { factor };
            return Some(n * factor);
        }
    }
    val.parse().ok()
}

fn parse_dimension(s: &str, font_size: f32) -> Dimension {
    let s = s.trim();
    if s == "auto" || s == "none" {
        Dimension::Auto
    } else if let Some(p) = s.strip_suffix('%') {
        p.trim()
            .parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto)
    } else {
        parse_length(s, font_size)
            .map(Dimension::Px)
            .unwrap_or(Dimension::Auto)
    }
}

fn apply_shorthand_spacing(val: &str, em: f32, [top, right, bottom, left]: [&mut f32; 4]) {
    let parts: Vec<f32> = val
        .split_whitespace()
        .filter_map(|p| parse_length(p, em))
        .collect();
    let (t, r, b, l) = match parts[..] {
        [a] => (a, a, a, a),
        [v, h] => (v, h, v, h),
        [t, h, b] => (t, h, b, h),
        [t, r, b, l] => (t, r, b, l),
        _ => return,
    };
    *top = t;
    *right = r;
    *bottom = b;
    *left = l;
}

// ---------------------------------------------------------------------------
// Styled DOM tree
// ---------------------------------------------------------------------------

/// A DOM node annotated with its computed style.
#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        tag: Tag,
        style: ComputedStyle,
        children: Vec<StyledNode>,
        /// Original attributes (for images src, etc.)
        attrs: HashMap<String, String>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

/// Build a styled tree from a DOM tree, resolving styles top-down.
pub fn build_styled_tree(
    nodes: &[DomNode],
    parent_style: Option<&ComputedStyle>,
    sheet: &Stylesheet,
) -> Vec<StyledNode> {
    let mut result = Vec::new();
    for node in nodes {
        match node {
            DomNode::Element(e) => {
                let style = resolve_style(e, parent_style, sheet);
                if style.display == Display::None {
                    continue;
                }
                let children = build_styled_tree(&e.children, Some(&style), sheet);
                result.push(StyledNode::Element {
                    tag: e.tag.clone(),
                    style,
                    children,
                    attrs: e.attributes.clone(),
                });
            }
            DomNode::Text(text) => {
                if !text.trim().is_empty() {
                    let style = parent_style.cloned().unwrap_or_default().text_run();
                    result.push(StyledNode::Text {
                        text: text.clone(),
                        style,
                    });
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    fn element(html: &str) -> ElementNode {
        match parse_html(html).into_iter().next() {
            Some(DomNode::Element(e)) => e,
            other => panic!("Expected element, got {other:?}"),
        }
    }

    #[test]
    fn tailwind_padding() {
        let mut s = ComputedStyle::default();
        apply_utility_class(&mut s, "p-4");
        assert_eq!(s.padding_top, 16.0);
        assert_eq!(s.padding_left, 16.0);
    }

    #[test]
    fn inline_style_font_size() {
        let mut s = ComputedStyle::default();
        apply_inline_style(&mut s, "font-size: 24px; color: #ff0000");
        assert_eq!(s.font_size, 24.0);
        assert!((s.color.r - 1.0).abs() < 0.01);
    }

    #[test]
    fn color_from_hex() {
        let c = Color::from_hex("#ff8800").unwrap();
        assert!((c.r - 1.0).abs() < 0.01);
        assert!((c.g - 0.533).abs() < 0.01);
        assert_eq!(Color::parse("rgb(255, 0, 0)"), Some(Color::rgb(1.0, 0.0, 0.0)));
        assert_eq!(Color::parse("white"), Some(Color::WHITE));
        assert_eq!(Color::parse("#ééé"), None);
    }

    #[test]
    fn lengths_convert_to_points() {
        assert!((parse_length("2cm", 12.0).unwrap() - 56.69).abs() < 0.01);
        assert!((parse_length("10mm", 12.0).unwrap() - 28.35).abs() < 0.01);
        assert_eq!(parse_length("1in", 12.0), Some(72.0));
        assert_eq!(parse_length("1.5em", 12.0), Some(18.0));
        assert_eq!(parse_length("8px", 12.0), Some(8.0));
        assert_eq!(parse_length("wide", 12.0), None);
    }

    #[test]
    fn heading_keeps_its_size_inside_a_parent() {
        let parent = ComputedStyle {
            font_size: 12.0,
            ..Default::default()
        };
        let h2 = resolve_style(&element("<h2>x</h2>"), Some(&parent), &Stylesheet::default());
        assert_eq!(h2.font_size, 24.0);
        assert_eq!(h2.font_weight, FontWeight::Bold);
    }

    #[test]
    fn stylesheet_rules_cascade() {
        let sheet = Stylesheet::parse(
            r#"
            /* report styles */
            h1 { font-size: 18px; text-align: center; color: #2c3e50; }
            table, th, td { border: 1px solid #ddd; }
            th { background-color: #f2f2f2; }
            th.total { background-color: #ffffff; }
            .page-number:before { content: "x"; }
            "#,
        );

        let h1 = resolve_style(&element("<h1>T</h1>"), None, &sheet);
        assert_eq!(h1.font_size, 18.0);
        assert_eq!(h1.text_align, TextAlign::Center);
        assert_eq!(h1.color, Color::from_hex("#2c3e50").unwrap());

        let td = resolve_style(&element("<td>1</td>"), None, &sheet);
        assert_eq!(td.border_width, 1.0);
        assert_eq!(td.border_color, Color::from_hex("#ddd").unwrap());

        let th = resolve_style(&element(r#"<th class="total">1</th>"#), None, &sheet);
        assert_eq!(th.background_color, Color::WHITE);
    }

    #[test]
    fn classes_and_inline_override_stylesheet() {
        let sheet = Stylesheet::parse("p { color: #ff0000; text-align: left; }");
        let p = resolve_style(
            &element(r#"<p class="text-end" style="color: #0000ff">x</p>"#),
            None,
            &sheet,
        );
        assert_eq!(p.text_align, TextAlign::Right);
        assert_eq!(p.color, Color::rgb(0.0, 0.0, 1.0));
    }

    #[test]
    fn page_rule_size_and_margin() {
        let sheet = Stylesheet::parse("@page { size: A4 landscape; margin: 2cm; }");
        assert_eq!(sheet.page.size, Some((595.28, 841.89)));
        assert!(sheet.page.landscape);
        assert!((sheet.page.margin.unwrap() - 56.69).abs() < 0.01);

        let custom = Stylesheet::parse("@page { size: 100mm 150mm; }");
        let (w, h) = custom.page.size.unwrap();
        assert!((w - 283.46).abs() < 0.01 && (h - 425.2).abs() < 0.01);
        assert!(!custom.page.landscape);
    }

    #[test]
    fn bootstrap_grid_classes() {
        let mut s = ComputedStyle::default();
        apply_utility_class(&mut s, "row");
        assert_eq!(s.display, Display::Flex);
        assert_eq!(s.flex_direction, FlexDirection::Row);

        let mut col = ComputedStyle::default();
        apply_utility_class(&mut col, "col-md-6");
        assert_eq!(col.width, Dimension::Percent(50.0));
    }

    #[test]
    fn metadata_elements_are_not_styled_into_the_tree() {
        let nodes = parse_html("<title>T</title><style>p{}</style><p>Body</p>");
        let styled = build_styled_tree(&nodes, None, &Stylesheet::default());
        assert_eq!(styled.len(), 1);
    }
}
