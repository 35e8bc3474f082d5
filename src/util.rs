//! String helpers shared by the rule compiler, the tokenizer and the theme

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::rules::CaptureIndex;

/// `$N` and `${N:/downcase}` / `${N:/upcase}` references inside rule names
static CAPTURING_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(\d+)|\$\{(\d+):/(downcase|upcase)\}").expect("capture reference regex")
});

static HEX_COLOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^#([0-9a-f]{3}|[0-9a-f]{4}|[0-9a-f]{6}|[0-9a-f]{8})$").expect("hex color regex")
});

/// Check if a regex metacharacter needs escaping when spliced into a pattern
fn needs_escape(ch: char) -> bool {
    matches!(
        ch,
        '-' | '\\'
            | '{'
            | '}'
            | '*'
            | '+'
            | '?'
            | '|'
            | '^'
            | '$'
            | '.'
            | ','
            | '['
            | ']'
            | '('
            | ')'
            | '#'
    )
}

/// Escape text so it matches literally inside an Oniguruma pattern
pub fn escape_regexp_characters(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if needs_escape(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Whether a rule name references captures (`$1`, `${2:/upcase}`)
pub fn has_captures(name: &str) -> bool {
    CAPTURING_NAME.is_match(name)
}

/// Substitute capture references in a rule name with the captured text
///
/// Leading dots are stripped from the captured text so the result stays a
/// valid scope. References to groups that do not exist are left untouched.
pub fn replace_captures(name: &str, line: &str, captures: &[CaptureIndex]) -> String {
    CAPTURING_NAME
        .replace_all(name, |caps: &Captures| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let (index, command) = match (caps.get(1), caps.get(2)) {
                (Some(index), _) => (index.as_str(), None),
                (None, Some(index)) => (index.as_str(), caps.get(3).map(|m| m.as_str())),
                (None, None) => return whole.to_string(),
            };

            let Some(capture) = index.parse::<usize>().ok().and_then(|i| captures.get(i)) else {
                return whole.to_string();
            };

            let text = line
                .get(capture.start..capture.end)
                .unwrap_or("")
                .trim_start_matches('.');
            match command {
                Some("downcase") => text.to_lowercase(),
                Some("upcase") => text.to_uppercase(),
                _ => text.to_string(),
            }
        })
        .into_owned()
}

/// `scope` equals `prefix` or extends it by whole dot-separated segments
pub fn scope_matches(scope: &str, prefix: &str) -> bool {
    scope == prefix
        || (scope.len() > prefix.len()
            && scope.starts_with(prefix)
            && scope.as_bytes()[prefix.len()] == b'.')
}

/// `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa`
pub fn is_valid_hex_color(hex: &str) -> bool {
    HEX_COLOR.is_match(hex)
}

/// Order optional string lists: absent first, then shorter first, then element-wise
pub fn str_arr_cmp(a: Option<&[String]>, b: Option<&[String]>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
    }
}
