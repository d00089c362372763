//! Markup escaping and per-field styles.

use crate::config::{FieldStyle, ParseMode};

/// Escape `text` so it renders literally under `mode`.
pub fn escape(text: &str, mode: ParseMode) -> String {
    match mode {
        ParseMode::Html => {
            let mut out = String::with_capacity(text.len());
            for c in text.chars() {
                match c {
                    '&' => out.push_str("&amp;"),
                    '<' => out.push_str("&lt;"),
                    '>' => out.push_str("&gt;"),
                    '"' => out.push_str("&quot;"),
                    _ => out.push(c),
                }
            }
            out
        }
        ParseMode::Markdown => {
            let mut out = String::with_capacity(text.len());
            for c in text.chars() {
                if matches!(c, '_' | '*' | '`' | '[') {
                    out.push('\\');
                }
                out.push(c);
            }
            out
        }
        ParseMode::Plain => text.to_string(),
    }
}

/// Style `value` and escape it for `mode`.
///
/// Case transforms run on the raw text, markup wrapping after escaping, and
/// the emoji prefix last. Empty values stay empty.
pub fn apply(value: &str, style: Option<&FieldStyle>, mode: ParseMode) -> String {
    let Some(style) = style else {
        return escape(value, mode);
    };
    if value.is_empty() {
        return String::new();
    }

    let mut text = if style.caps {
        value.to_uppercase()
    } else if style.capitalize {
        capitalize(value)
    } else {
        value.to_string()
    };

    text = escape(&text, mode);

    if style.italic {
        text = wrap(&text, mode, "<i>", "</i>", "_");
    }
    if style.bold {
        text = wrap(&text, mode, "<b>", "</b>", "*");
    }

    match style.emoji.as_deref().filter(|e| !e.is_empty()) {
        Some(emoji) => format!("{} {}", emoji, text),
        None => text,
    }
}

fn wrap(text: &str, mode: ParseMode, open: &str, close: &str, markdown: &str) -> String {
    match mode {
        ParseMode::Html => format!("{open}{text}{close}"),
        ParseMode::Markdown => format!("{markdown}{text}{markdown}"),
        ParseMode::Plain => text.to_string(),
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
