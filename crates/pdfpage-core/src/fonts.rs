//! Standard-14 font selection and text measurement.
//!
//! Overlay text is written with the PDF base-14 fonts, so requested font
//! families (CSS generics, PDF.js-style subset names, platform names) are
//! mapped onto the closest standard font. Placement math measures strings
//! against the AFM advance widths of the exact font that will be written,
//! which is what keeps centered and right-aligned text from drifting
//! relative to approximate viewer metrics.

/// Base families the standard 14 covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Helvetica,
    Times,
    Courier,
    Symbol,
    ZapfDingbats,
}

fn family_of(name: &str) -> Family {
    let lower = name.to_lowercase();
    match lower.as_str() {
        "serif" => return Family::Times,
        "sans-serif" | "cursive" | "fantasy" => return Family::Helvetica,
        "monospace" => return Family::Courier,
        _ => {}
    }
    if lower.contains("times") || lower.contains("georgia") || lower.contains("garamond") {
        Family::Times
    } else if lower.contains("courier")
        || lower.contains("mono")
        || lower.contains("consolas")
        || lower.contains("monaco")
    {
        Family::Courier
    } else if lower.contains("zapf") || lower.contains("dingbat") {
        Family::ZapfDingbats
    } else if lower.contains("symbol") {
        Family::Symbol
    } else {
        // Arial, Helvetica, "sans", PDF.js internal names like g_d0_f1,
        // subset-prefixed names like BCDEEE+ArialMT, and anything unknown.
        Family::Helvetica
    }
}

/// Resolve a requested family plus bold/italic flags to a standard-14
/// BaseFont name. Names that already spell out a style win over the flags.
pub fn resolve_font(family: Option<&str>, bold: bool, italic: bool) -> &'static str {
    let (family, bold, italic) = match family {
        Some(name) => {
            let lower = name.to_lowercase();
            let named_bold = lower.contains("bold");
            let named_italic = lower.contains("italic") || lower.contains("oblique");
            (
                family_of(name),
                bold || named_bold,
                italic || named_italic,
            )
        }
        None => (Family::Helvetica, bold, italic),
    };

    match family {
        Family::Times => match (bold, italic) {
            (true, true) => "Times-BoldItalic",
            (true, false) => "Times-Bold",
            (false, true) => "Times-Italic",
            (false, false) => "Times-Roman",
        },
        Family::Helvetica => match (bold, italic) {
            (true, true) => "Helvetica-BoldOblique",
            (true, false) => "Helvetica-Bold",
            (false, true) => "Helvetica-Oblique",
            (false, false) => "Helvetica",
        },
        Family::Courier => match (bold, italic) {
            (true, true) => "Courier-BoldOblique",
            (true, false) => "Courier-Bold",
            (false, true) => "Courier-Oblique",
            (false, false) => "Courier",
        },
        Family::Symbol => "Symbol",
        Family::ZapfDingbats => "ZapfDingbats",
    }
}

// AFM advance widths in 1/1000 em for the printable ASCII range (0x20..=0x7E).
// Oblique variants share their upright metrics; the italic Times faces are
// close enough to the roman widths for placement purposes.

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333,
    278, 278, 556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278,
    584, 584, 584, 556, 1015, 667, 667, 722, 722, 667, 611, 778, 722, 278,
    500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944,
    667, 667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556,
    278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333, 500,
    278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333,
    278, 278, 556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333,
    584, 584, 584, 611, 975, 722, 722, 722, 722, 667, 611, 778, 722, 278,
    556, 722, 611, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944,
    667, 667, 611, 333, 278, 333, 584, 556, 333, 556, 611, 556, 611, 556,
    333, 611, 611, 278, 278, 556, 278, 889, 611, 611, 611, 611, 389, 556,
    333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[rustfmt::skip]
const TIMES_ROMAN: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333,
    250, 278, 500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278,
    564, 564, 564, 444, 921, 722, 667, 667, 722, 611, 556, 722, 722, 333,
    389, 722, 611, 889, 722, 722, 556, 722, 667, 556, 611, 722, 722, 944,
    722, 722, 611, 333, 278, 333, 469, 500, 333, 444, 500, 444, 500, 444,
    333, 500, 500, 278, 278, 500, 278, 778, 500, 500, 500, 500, 333, 389,
    278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

#[rustfmt::skip]
const TIMES_BOLD: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333,
    250, 278, 500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333,
    570, 570, 570, 500, 930, 722, 667, 722, 722, 667, 611, 778, 778, 389,
    500, 778, 667, 944, 722, 778, 611, 778, 722, 556, 667, 722, 722, 1000,
    722, 722, 667, 333, 278, 333, 581, 500, 333, 500, 556, 444, 556, 444,
    333, 500, 556, 278, 333, 556, 278, 833, 556, 500, 556, 556, 444, 389,
    333, 556, 500, 722, 500, 500, 444, 394, 220, 394, 520,
];

fn widths_for(font: &str) -> Option<&'static [u16; 95]> {
    match font {
        "Helvetica" | "Helvetica-Oblique" => Some(&HELVETICA),
        "Helvetica-Bold" | "Helvetica-BoldOblique" => Some(&HELVETICA_BOLD),
        "Times-Roman" | "Times-Italic" => Some(&TIMES_ROMAN),
        "Times-Bold" | "Times-BoldItalic" => Some(&TIMES_BOLD),
        _ => None,
    }
}

/// Advance width of one character in 1/1000 em.
fn char_width_milli(font: &str, c: char) -> u16 {
    if font.starts_with("Courier") {
        return 600;
    }
    match widths_for(font) {
        Some(table) => {
            let code = c as u32;
            if (0x20..=0x7E).contains(&code) {
                table[(code - 0x20) as usize]
            } else {
                // Fall back to the '?' advance for characters outside the
                // table.
                table[('?' as u32 - 0x20) as usize]
            }
        }
        // Symbol and ZapfDingbats: flat approximation.
        None => 600,
    }
}

/// Width in points of `text` set in `font` at `size`, from AFM metrics.
pub fn text_width(text: &str, font: &str, size: f64) -> f64 {
    let milli: u64 = text.chars().map(|c| char_width_milli(font, c) as u64).sum();
    milli as f64 / 1000.0 * size
}
