//! Font faces and text measurement using `ttf-parser`.
//!
//! Reports are set in DejaVu Sans Condensed, embedded in the binary. The same
//! bytes are measured here and handed to printpdf by the renderer, so wrapped
//! lines match the glyphs that end up in the PDF.

const REGULAR: &[u8] = include_bytes!("../fonts/DejaVuSansCondensed.ttf");
const BOLD: &[u8] = include_bytes!("../fonts/DejaVuSansCondensed-Bold.ttf");
const OBLIQUE: &[u8] = include_bytes!("../fonts/DejaVuSansCondensed-Oblique.ttf");
const BOLD_OBLIQUE: &[u8] = include_bytes!("../fonts/DejaVuSansCondensed-BoldOblique.ttf");

/// Which face of the family a run of text uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontKey {
    pub bold: bool,
    pub italic: bool,
}

impl FontKey {
    pub const REGULAR: FontKey = FontKey {
        bold: false,
        italic: false,
    };

    pub fn new(bold: bool, italic: bool) -> Self {
        Self { bold, italic }
    }

    fn index(self) -> usize {
        usize::from(self.bold) * 2 + usize::from(self.italic)
    }
}

/// A loaded font face with metrics.
#[derive(Debug, Clone)]
pub struct FontData {
    /// Raw font bytes, also embedded into the PDF.
    pub bytes: &'static [u8],
    face: Option<ttf_parser::Face<'static>>,
    units_per_em: f32,
    ascender: f32,
    descender: f32,
}

impl FontData {
    fn load(name: &str, bytes: &'static [u8]) -> Self {
        match ttf_parser::Face::parse(bytes, 0) {
            Ok(face) => Self {
                bytes,
                units_per_em: face.units_per_em() as f32,
                ascender: face.ascender() as f32,
                descender: face.descender() as f32,
                face: Some(face),
            },
            Err(e) => {
                log::warn!("failed to parse font {name}: {e}; using estimated metrics");
                Self {
                    bytes,
                    face: None,
                    units_per_em: 1000.0,
                    ascender: 760.0,
                    descender: -240.0,
                }
            }
        }
    }
}

/// The four faces of the report font.
#[derive(Debug, Clone)]
pub struct FontManager {
    faces: [FontData; 4],
}

impl Default for FontManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FontManager {
    pub fn new() -> Self {
        Self {
            faces: [
                FontData::load("DejaVuSansCondensed", REGULAR),
                FontData::load("DejaVuSansCondensed-Oblique", OBLIQUE),
                FontData::load("DejaVuSansCondensed-Bold", BOLD),
                FontData::load("DejaVuSansCondensed-BoldOblique", BOLD_OBLIQUE),
            ],
        }
    }

    pub fn get(&self, key: FontKey) -> &FontData {
        &self.faces[key.index()]
    }

    /// Width of `text` at `font_size`, in points.
    ///
    /// Characters the face has no glyph for count as half an em.
    pub fn measure_text_width(
        &self,
        text: &str,
        font_size: f32,
        bold: bool,
        italic: bool,
        _family: &str,
    ) -> f32 {
        let data = self.get(FontKey::new(bold, italic));
        let Some(face) = &data.face else {
            let avg = if bold { 0.55 } else { 0.5 };
            return text.chars().count() as f32 * font_size * avg;
        };

        let scale = font_size / data.units_per_em;
        text.chars()
            .map(|ch| {
                face.glyph_index(ch)
                    .and_then(|gid| face.glyph_hor_advance(gid))
                    .map(|advance| advance as f32 * scale)
                    .unwrap_or(font_size * 0.5)
            })
            .sum()
    }

    /// Line height in points for a font size and a CSS `line-height` factor.
    pub fn line_height_px(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }

    /// Distance from the top of a `font_size` tall box to the baseline, with
    /// the face's ascender and descender sharing the box.
    pub fn ascender_px(&self, font_size: f32) -> f32 {
        let data = self.get(FontKey::REGULAR);
        let extent = data.ascender - data.descender;
        if extent <= 0.0 {
            return font_size * 0.75;
        }
        font_size * data.ascender / extent
    }
}

/// Word-wrap text to fit within `max_width` points. Returns a vec of lines.
///
/// `\n` forces a line break. Words longer than a line are broken by character.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    bold: bool,
    italic: bool,
    family: &str,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }
    let measure = |s: &str| fonts.measure_text_width(s, font_size, bold, italic, family);

    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current_line = String::new();
        for word in words {
            let candidate = if current_line.is_empty() {
                word.to_string()
            } else {
                format!("{current_line} {word}")
            };
            if measure(&candidate) <= max_width {
                current_line = candidate;
                continue;
            }
            if !current_line.is_empty() {
                lines.push(std::mem::take(&mut current_line));
            }
            if measure(word) <= max_width {
                current_line = word.to_string();
            } else {
                // Hard-break an over-long word.
                for c in word.chars() {
                    current_line.push(c);
                    if measure(&current_line) > max_width && current_line.chars().count() > 1 {
                        current_line.pop();
                        lines.push(std::mem::take(&mut current_line));
                        current_line.push(c);
                    }
                }
            }
        }
        if !current_line.is_empty() {
            lines.push(current_line);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_glyph_advances() {
        let mgr = FontManager::default();
        // H(1386) e(1134) l(512) l(512) o(1127) = 4671 units of 2048
        let w = mgr.measure_text_width("Hello", 16.0, false, false, "DejaVu Sans");
        assert!((w - 36.492).abs() < 0.01, "got {w}");
    }

    #[test]
    fn every_face_parses() {
        let mgr = FontManager::new();
        for key in [
            FontKey::REGULAR,
            FontKey::new(false, true),
            FontKey::new(true, false),
            FontKey::new(true, true),
        ] {
            let data = mgr.get(key);
            assert!(data.face.is_some(), "{key:?} failed to parse");
            assert!(!data.bytes.is_empty());
        }
        let ascender = mgr.ascender_px(10.0);
        assert!((ascender - 7.97).abs() < 0.01, "got {ascender}");
    }

    #[test]
    fn bold_is_wider_and_accents_match_base_letters() {
        let mgr = FontManager::new();
        let regular = mgr.measure_text_width("Diagnostico", 12.0, false, false, "DejaVu Sans");
        let bold = mgr.measure_text_width("Diagnostico", 12.0, true, false, "DejaVu Sans");
        assert!(bold > regular);
        let accented = mgr.measure_text_width("Diagnóstico", 12.0, false, false, "DejaVu Sans");
        assert_eq!(accented, regular);
    }

    #[test]
    fn word_wrap_basic() {
        let mgr = FontManager::default();
        let lines = wrap_text("Hello world foo bar", 16.0, false, false, "DejaVu Sans", 60.0, &mgr);
        assert!(lines.len() >= 2, "Expected wrapping, got {:?}", lines);
    }

    #[test]
    fn explicit_newlines_break_lines() {
        let mgr = FontManager::default();
        let lines = wrap_text("uno\ndos", 12.0, false, false, "DejaVu Sans", 500.0, &mgr);
        assert_eq!(lines, vec!["uno", "dos"]);
    }

    #[test]
    fn long_words_are_hard_broken() {
        let mgr = FontManager::default();
        let lines = wrap_text(&"m".repeat(40), 10.0, false, false, "DejaVu Sans", 50.0, &mgr);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(mgr.measure_text_width(line, 10.0, false, false, "DejaVu Sans") <= 50.0);
        }
    }
}
