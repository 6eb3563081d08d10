//! Font resolution table
//!
//! Maps the font name carried by a text span to a font the renderer is known to
//! support. Resolution is total: every path ends in a member of the PDF
//! standard 14 fonts, and the Helvetica family is the default.

use crate::style::StyleFlags;

/// The PDF standard 14 fonts. Every conforming renderer provides these.
pub const STANDARD_FONTS: [&str; 14] = [
    "Helvetica",
    "Helvetica-Bold",
    "Helvetica-Oblique",
    "Helvetica-BoldOblique",
    "Times-Roman",
    "Times-Bold",
    "Times-Italic",
    "Times-BoldItalic",
    "Courier",
    "Courier-Bold",
    "Courier-Oblique",
    "Courier-BoldOblique",
    "Symbol",
    "ZapfDingbats",
];

/// Last-resort font requested by name when every other candidate failed.
pub const UNIVERSAL_DEFAULT: &str = "Helvetica";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontStyle {
    pub fn from_flags(flags: StyleFlags) -> Self {
        match (flags.bold, flags.italic) {
            (true, true) => FontStyle::BoldItalic,
            (true, false) => FontStyle::Bold,
            (false, true) => FontStyle::Italic,
            (false, false) => FontStyle::Regular,
        }
    }
}

/// The four style variants of one font family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontFamily {
    pub regular: &'static str,
    pub bold: &'static str,
    pub italic: &'static str,
    pub bold_italic: &'static str,
}

impl FontFamily {
    pub const fn variant(&self, style: FontStyle) -> &'static str {
        match style {
            FontStyle::Regular => self.regular,
            FontStyle::Bold => self.bold,
            FontStyle::Italic => self.italic,
            FontStyle::BoldItalic => self.bold_italic,
        }
    }
}

pub const DEFAULT_FAMILY: FontFamily = FontFamily {
    regular: "Helvetica",
    bold: "Helvetica-Bold",
    italic: "Helvetica-Oblique",
    bold_italic: "Helvetica-BoldOblique",
};

/// Exact-name substitutions, consulted before any heuristic.
const SUBSTITUTIONS: &[(&str, &str)] = &[
    ("DejaVuSerifCondensed", "Helvetica"),
    ("DejaVuSerifCondensed-Bol", "Helvetica-Bold"),
    ("DejaVuSerifCondensed-Bold", "Helvetica-Bold"),
    ("ind_hi_1_001", "Helvetica"),
    ("XBZar-Bold", "Helvetica-Bold"),
    ("ArialMT", "Helvetica"),
    ("Arial-BoldMT", "Helvetica-Bold"),
    ("Arial-ItalicMT", "Helvetica-Oblique"),
    ("Arial-BoldItalicMT", "Helvetica-BoldOblique"),
    ("TimesNewRomanPSMT", "Times-Roman"),
    ("TimesNewRomanPS-BoldMT", "Times-Bold"),
    ("TimesNewRomanPS-ItalicMT", "Times-Italic"),
    ("TimesNewRomanPS-BoldItalicMT", "Times-BoldItalic"),
    ("CourierNewPSMT", "Courier"),
    ("CourierNewPS-BoldMT", "Courier-Bold"),
];

const BOLD_MARKERS: &[&str] = &["bold", "black", "heavy", "demi"];
const BOLD_SUFFIXES: &[&str] = &["-b", "-bd", "-bi", "-bdit"];
const ITALIC_MARKERS: &[&str] = &["italic", "oblique", "slanted"];
const ITALIC_SUFFIXES: &[&str] = &["-i", "-it", "-bi", "-bdit"];

fn has_bold_marker(lower: &str) -> bool {
    BOLD_MARKERS.iter().any(|m| lower.contains(m))
        || BOLD_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

fn has_italic_marker(lower: &str) -> bool {
    ITALIC_MARKERS.iter().any(|m| lower.contains(m))
        || ITALIC_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

fn has_bold_italic_markers(lower: &str) -> bool {
    has_bold_marker(lower) && has_italic_marker(lower)
}

struct StyleRule {
    style: FontStyle,
    matches: fn(&str) -> bool,
}

/// Heuristic rules, evaluated top to bottom; the first match wins.
///
/// The combined rule must precede the single-style rules: the markers of a
/// bold italic name usually sit in different substrings ("Bold" and "Oblique"
/// in "Foo-Bold-Oblique"), so the bold rule alone would claim it. Bold is
/// tested before italic.
const STYLE_RULES: &[StyleRule] = &[
    StyleRule {
        style: FontStyle::BoldItalic,
        matches: has_bold_italic_markers,
    },
    StyleRule {
        style: FontStyle::Bold,
        matches: has_bold_marker,
    },
    StyleRule {
        style: FontStyle::Italic,
        matches: has_italic_marker,
    },
];

/// Style implied by markers in a font name, if any
pub fn style_from_name(name: &str) -> Option<FontStyle> {
    let lower = strip_subset_prefix(name).to_lowercase();
    STYLE_RULES
        .iter()
        .find(|rule| (rule.matches)(&lower))
        .map(|rule| rule.style)
}

/// Strip a subset tag such as `ABCDEF+` from an embedded font name
pub fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.bytes().all(|b| b.is_ascii_uppercase()) => {
            rest
        }
        _ => name,
    }
}

pub fn is_standard_font(name: &str) -> bool {
    STANDARD_FONTS.contains(&name)
}

fn exact_substitute(name: &str) -> Option<&'static str> {
    if let Some(standard) = STANDARD_FONTS.iter().find(|f| **f == name) {
        return Some(standard);
    }
    SUBSTITUTIONS
        .iter()
        .find(|(original, _)| *original == name)
        .map(|(_, substitute)| *substitute)
}

/// Resolve a span's font name to a renderer-supported substitute.
pub fn resolve(original_font: &str) -> &'static str {
    if let Some(substitute) = exact_substitute(original_font) {
        return substitute;
    }
    let stripped = strip_subset_prefix(original_font);
    if let Some(substitute) = exact_substitute(stripped) {
        return substitute;
    }

    style_from_name(stripped)
        .map(|style| DEFAULT_FAMILY.variant(style))
        .unwrap_or(DEFAULT_FAMILY.regular)
}

/// Like [`resolve`], but falls back to the span's style flags when the name
/// itself carries no style information.
pub fn resolve_styled(original_font: &str, flags: StyleFlags) -> &'static str {
    let substitute = resolve(original_font);
    let has_exact_entry = exact_substitute(strip_subset_prefix(original_font)).is_some()
        || exact_substitute(original_font).is_some();
    if substitute == DEFAULT_FAMILY.regular && !has_exact_entry {
        DEFAULT_FAMILY.variant(FontStyle::from_flags(flags))
    } else {
        substitute
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exact_table_entries() {
        assert_eq!(resolve("XBZar-Bold"), "Helvetica-Bold");
        assert_eq!(resolve("DejaVuSerifCondensed"), "Helvetica");
        assert_eq!(resolve("DejaVuSerifCondensed-Bol"), "Helvetica-Bold");
        assert_eq!(resolve("ind_hi_1_001"), "Helvetica");
        assert_eq!(resolve("TimesNewRomanPSMT"), "Times-Roman");
        assert_eq!(resolve("Arial-BoldMT"), "Helvetica-Bold");
    }

    #[test]
    fn test_standard_fonts_resolve_to_themselves() {
        for font in STANDARD_FONTS {
            assert_eq!(resolve(font), font);
        }
    }

    #[test]
    fn test_subset_prefix_is_ignored() {
        assert_eq!(strip_subset_prefix("BCDEEE+ArialMT"), "ArialMT");
        assert_eq!(strip_subset_prefix("Foo+Bar"), "Foo+Bar");
        assert_eq!(strip_subset_prefix("abcdef+Bar"), "abcdef+Bar");
        assert_eq!(resolve("BCDEEE+ArialMT"), "Helvetica");
        assert_eq!(resolve("QWERTY+XBZar-Bold"), "Helvetica-Bold");
    }

    #[test]
    fn test_bold_markers() {
        assert_eq!(resolve("Roboto-Bold"), "Helvetica-Bold");
        assert_eq!(resolve("robotobold"), "Helvetica-Bold");
        assert_eq!(resolve("Lato-Black"), "Helvetica-Bold");
        assert_eq!(resolve("SomeFont-B"), "Helvetica-Bold");
    }

    #[test]
    fn test_italic_markers() {
        assert_eq!(resolve("Roboto-Italic"), "Helvetica-Oblique");
        assert_eq!(resolve("Univers-Oblique"), "Helvetica-Oblique");
        assert_eq!(resolve("Minion-It"), "Helvetica-Oblique");
    }

    #[test]
    fn test_combined_rule_runs_before_bold() {
        // Markers in one substring
        assert_eq!(resolve("Roboto-BoldItalic"), "Helvetica-BoldOblique");
        // Markers in different substrings: a bold-only check would stop early
        assert_eq!(resolve("Univers-Bold-Oblique"), "Helvetica-BoldOblique");
        assert_eq!(resolve("ItalicSans-Heavy"), "Helvetica-BoldOblique");
        assert_eq!(resolve("Garamond-BI"), "Helvetica-BoldOblique");
    }

    #[test]
    fn test_unknown_defaults_to_helvetica() {
        assert_eq!(resolve("g_d0_f1"), "Helvetica");
        assert_eq!(resolve("UnknownFont"), "Helvetica");
        assert_eq!(resolve(""), "Helvetica");
    }

    #[test]
    fn test_resolve_styled_uses_flags_only_without_name_markers() {
        let bold = StyleFlags {
            bold: true,
            italic: false,
        };
        assert_eq!(resolve_styled("g_d0_f1", bold), "Helvetica-Bold");
        // Exact table entries win over flags
        assert_eq!(resolve_styled("DejaVuSerifCondensed", bold), "Helvetica");
        // Name markers win over flags
        let italic = StyleFlags {
            bold: false,
            italic: true,
        };
        assert_eq!(resolve_styled("Roboto-Bold", italic), "Helvetica-Bold");
    }

    proptest! {
        #[test]
        fn resolve_is_total(name in ".*") {
            let substitute = resolve(&name);
            prop_assert!(!substitute.is_empty());
            prop_assert!(is_standard_font(substitute));
        }
    }
}
