//! Just enough GVariant text format for `gsettings get`/`set` of strings and
//! string arrays.

/// Quote a string as a GVariant literal: `it's` -> `'it\'s'`.
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Format a string array literal. An empty array needs its type annotation.
pub fn format_string_array(values: &[String]) -> String {
    if values.is_empty() {
        return "@as []".to_string();
    }
    let items: Vec<String> = values.iter().map(|v| quote_string(v)).collect();
    format!("[{}]", items.join(", "))
}

/// Parse a single string literal as printed by `gsettings get`.
pub fn parse_string(text: &str) -> Result<String, String> {
    let text = strip_annotation(text.trim(), "@s");
    let chars: Vec<char> = text.chars().collect();
    let (value, end) = parse_literal(&chars, 0)?;
    if chars[end..].iter().any(|c| !c.is_whitespace()) {
        return Err(format!("trailing characters after string: {}", text));
    }
    Ok(value)
}

/// Parse a string array literal such as `['/a/', '/b/']` or `@as []`.
pub fn parse_string_array(text: &str) -> Result<Vec<String>, String> {
    let text = strip_annotation(text.trim(), "@as");
    let chars: Vec<char> = text.chars().collect();
    let mut pos = skip_whitespace(&chars, 0);
    if chars.get(pos) != Some(&'[') {
        return Err(format!("expected '[' in {}", text));
    }
    pos = skip_whitespace(&chars, pos + 1);

    let mut values = Vec::new();
    if chars.get(pos) == Some(&']') {
        return Ok(values);
    }

    loop {
        let (value, end) = parse_literal(&chars, pos)?;
        values.push(value);
        pos = skip_whitespace(&chars, end);
        match chars.get(pos) {
            Some(',') => pos = skip_whitespace(&chars, pos + 1),
            Some(']') => return Ok(values),
            _ => return Err(format!("expected ',' or ']' in {}", text)),
        }
    }
}

fn strip_annotation<'a>(text: &'a str, annotation: &str) -> &'a str {
    text.strip_prefix(annotation)
        .map(str::trim_start)
        .unwrap_or(text)
}

fn skip_whitespace(chars: &[char], mut pos: usize) -> usize {
    while chars.get(pos).is_some_and(|c| c.is_whitespace()) {
        pos += 1;
    }
    pos
}

/// Parse a `'...'` or `"..."` literal starting at `pos`; returns the value
/// and the position just past the closing quote.
fn parse_literal(chars: &[char], pos: usize) -> Result<(String, usize), String> {
    let quote = match chars.get(pos) {
        Some(&q) if q == '\'' || q == '"' => q,
        _ => return Err("expected a quoted string".to_string()),
    };

    let mut value = String::new();
    let mut i = pos + 1;
    while let Some(&c) = chars.get(i) {
        match c {
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| "unterminated escape".to_string())?;
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    'u' => {
                        let hex: String = chars.iter().skip(i + 2).take(4).collect();
                        let code = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| format!("bad unicode escape \\u{}", hex))?;
                        value.push(code);
                        i += 4;
                    }
                    other => value.push(*other),
                }
                i += 2;
            }
            c if c == quote => return Ok((value, i + 1)),
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    Err("unterminated string".to_string())
}
