//! IRC text styling (spec §4.7 supplement), grounded on
//! `original_source/ircrssfeedbot/style.py`'s `_STYLERS` registry. Applies
//! mIRC control codes for bold/italics/color before a title is sent.

use crate::config::StyleRule;

const BOLD: char = '\u{02}';
const ITALICS: char = '\u{1d}';
const COLOR: char = '\u{03}';
const RESET: char = '\u{0f}';

/// mIRC's numbered color palette, the small subset the original names by color word.
fn color_code(name: &str) -> Option<&'static str> {
    Some(match name.to_ascii_lowercase().as_str() {
        "white" => "00",
        "black" => "01",
        "blue" => "02",
        "green" => "03",
        "red" => "04",
        "brown" => "05",
        "purple" => "06",
        "orange" => "07",
        "yellow" => "08",
        "lightgreen" => "09",
        "cyan" => "10",
        "lightcyan" => "11",
        "lightblue" => "12",
        "pink" => "13",
        "grey" | "gray" => "14",
        "lightgrey" | "lightgray" => "15",
        _ => return None,
    })
}

/// Apply a style rule to `text`, returning it unchanged if no rule is given.
pub fn style(text: &str, rule: Option<&StyleRule>) -> String {
    let Some(rule) = rule else { return text.to_string() };

    let mut prefix = String::new();
    if rule.bold {
        prefix.push(BOLD);
    }
    if rule.italics {
        prefix.push(ITALICS);
    }
    if rule.fg.is_some() || rule.bg.is_some() {
        prefix.push(COLOR);
        if let Some(fg) = rule.fg.as_deref().and_then(color_code) {
            prefix.push_str(fg);
        }
        if let Some(bg) = rule.bg.as_deref().and_then(color_code) {
            prefix.push(',');
            prefix.push_str(bg);
        }
    }

    if prefix.is_empty() {
        text.to_string()
    } else {
        format!("{prefix}{text}{RESET}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rule_leaves_text_unchanged() {
        assert_eq!(style("hello", None), "hello");
    }

    #[test]
    fn bold_wraps_with_control_code_and_reset() {
        let rule = StyleRule { fg: None, bg: None, bold: true, italics: false };
        let styled = style("hello", Some(&rule));
        assert_eq!(styled, format!("{BOLD}hello{RESET}"));
    }

    #[test]
    fn color_emits_palette_index() {
        let rule = StyleRule { fg: Some("red".to_string()), bg: None, bold: false, italics: false };
        let styled = style("hello", Some(&rule));
        assert_eq!(styled, format!("{COLOR}04hello{RESET}"));
    }
}
