//! Byte-width-preserving title shortening (spec §4.4 stage 8, §8 truncation law).
//!
//! Ported from `original_source/ircrssfeedbot/util/textwrap.py`: shorten at a word
//! boundary with a `[…]` placeholder, then keep trimming a character at a time
//! until the UTF-8 encoded length actually fits, since multi-byte characters can
//! make a word-boundary cut overshoot the byte budget.

const MIN_WIDTH: usize = 5;
const PLACEHOLDER: &str = "[…]";

/// Shorten `text` to at most `width` UTF-8-encoded bytes, preferring word boundaries.
pub fn shorten_to_bytes_width(text: &str, width: usize) -> String {
    let width = width.max(MIN_WIDTH);
    if text.len() <= width {
        return text.to_string();
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    for n in (0..words.len()).rev() {
        let candidate = if n == 0 {
            PLACEHOLDER.to_string()
        } else {
            format!("{} {}", words[..n].join(" "), PLACEHOLDER)
        };
        if candidate.len() <= width {
            return candidate;
        }
    }

    // Budget too small even for the placeholder alone (only possible for pathological
    // widths below the MIN_WIDTH clamp, which cannot happen here): trim it char-wise.
    let mut fallback = PLACEHOLDER.to_string();
    while fallback.len() > width {
        fallback.pop();
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_unchanged_when_within_budget() {
        let text = "short title";
        assert_eq!(shorten_to_bytes_width(text, 100), text);
    }

    #[test]
    fn fits_within_byte_budget_for_multibyte_text() {
        let text = "☺ Ilsa, le méchant ☺ ☺ gardien ☺";
        let width = 27;
        let shortened = shorten_to_bytes_width(text, width);
        assert!(shortened.len() <= width);
    }

    #[test]
    fn truncation_law_holds_for_varied_budgets() {
        let text = "the quick brown fox jumps over the lazy dog repeatedly and again";
        for width in [5, 8, 12, 20, 40, 100] {
            let shortened = shorten_to_bytes_width(text, width);
            assert!(
                shortened.len() <= width.max(MIN_WIDTH),
                "width {width} produced {shortened:?} ({} bytes)",
                shortened.len()
            );
        }
    }
}
