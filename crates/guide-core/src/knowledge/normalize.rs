//! Term normalization shared by every index comparison.
//!
//! A normalized term is width-folded, free of zero-width characters, whitespace-collapsed,
//! trimmed and lowercased. The empty string means "no term".

/// Full-width block that mirrors printable ASCII (`！` .. `～`).
const FULLWIDTH_START: u32 = 0xFF01;
const FULLWIDTH_END: u32 = 0xFF5E;
const FULLWIDTH_OFFSET: u32 = 0xFEE0;

/// Ideographic (full-width) space.
const IDEOGRAPHIC_SPACE: char = '\u{3000}';

#[inline]
fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}')
}

#[inline]
fn to_half_width(c: char) -> char {
    if c == IDEOGRAPHIC_SPACE {
        return ' ';
    }
    let cp = c as u32;
    if (FULLWIDTH_START..=FULLWIDTH_END).contains(&cp) {
        char::from_u32(cp - FULLWIDTH_OFFSET).unwrap_or(c)
    } else {
        c
    }
}

/// Normalizes `s` into a comparison-safe term. Total and idempotent.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.chars().filter(|c| !is_zero_width(*c)).map(to_half_width) {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.extend(c.to_lowercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_full_width_and_case() {
        assert_eq!(normalize("ＷａｔｅｒＳｋｉｎ"), "waterskin");
        assert_eq!(normalize("Ｂｅｅｒ　Ｍｕｇ"), "beer mug");
        assert_eq!(normalize("１２３！"), "123!");
    }

    #[test]
    fn collapses_whitespace_and_strips_zero_width() {
        assert_eq!(normalize("  iron \t\n  bar  "), "iron bar");
        assert_eq!(normalize("wa\u{200B}ter"), "water");
        assert_eq!(normalize("\u{3000}水壶\u{3000}"), "水壶");
    }

    #[test]
    fn empty_and_blank_inputs_are_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \u{3000}\u{200B} "), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "Waterskin",
            "  ＡＢＣ　ｄｅｆ  ",
            "水壶",
            "x\u{200B} \u{3000} y",
            "İstanbul",
            "ǅ mixed ß",
            "",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", s);
        }
    }
}
