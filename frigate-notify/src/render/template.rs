//! Placeholder substitution.
//!
//! Syntax: `{name}` is replaced by the value of `name`, `{{` and `}}` produce
//! literal braces. An unterminated `{` is copied verbatim. Names without a
//! value expand to the empty string. Substituted values are never re-scanned.

/// Expand `template`, resolving each placeholder through `lookup`.
pub fn expand<F>(template: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut result = String::with_capacity(template.len() * 2);
    let mut chars = template.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    result.push('{');
                    continue;
                }

                let rest = &template[start + 1..];
                match rest.find(['}', '{']) {
                    Some(end) if rest.as_bytes()[end] == b'}' => {
                        let name = rest[..end].trim();
                        if let Some(value) = lookup(name) {
                            result.push_str(&value);
                        }
                        // Skip the name and the closing brace.
                        for _ in 0..rest[..end].chars().count() + 1 {
                            chars.next();
                        }
                    }
                    _ => result.push('{'),
                }
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                }
                result.push('}');
            }
            _ => result.push(c),
        }
    }

    result
}

/// Placeholder names referenced by `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    expand(template, |name| {
        names.push(name.to_string());
        None
    });
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "camera" => Some("front".to_string()),
            "label" => Some("person".to_string()),
            "tricky" => Some("{camera}".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_expand_simple() {
        assert_eq!(
            expand("{label} on {camera}", lookup),
            "person on front"
        );
    }

    #[test]
    fn test_unknown_placeholder_is_empty() {
        assert_eq!(expand("[{nope}]", lookup), "[]");
    }

    #[test]
    fn test_escaped_braces() {
        assert_eq!(expand("{{camera}} = {camera}", lookup), "{camera} = front");
        assert_eq!(expand("a }} b } c", lookup), "a } b } c");
    }

    #[test]
    fn test_unterminated_placeholder_is_literal() {
        assert_eq!(expand("score {label", lookup), "score {label");
        assert_eq!(expand("{ {camera}", lookup), "{ front");
        assert_eq!(expand("trailing {", lookup), "trailing {");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        assert_eq!(expand("{tricky}", lookup), "{camera}");
    }

    #[test]
    fn test_whitespace_in_name_is_trimmed() {
        assert_eq!(expand("{ camera }", lookup), "front");
    }

    #[test]
    fn test_multibyte_text_is_preserved() {
        assert_eq!(expand("🚨 {label} ✓ {camera}", lookup), "🚨 person ✓ front");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            placeholders("{a} {{b}} {c"),
            vec!["a".to_string()]
        );
        assert_eq!(
            placeholders("{label}{camera}"),
            vec!["label".to_string(), "camera".to_string()]
        );
    }
}
