//! String-literal escaping.
//!
//! `unescape_js_string` is the only place literal text from the input is
//! "evaluated": it decodes the escape sequences of a string-literal body
//! and nothing else.

/// Decode the body of a JavaScript string literal (without its quotes).
///
/// Total: malformed escapes decode to the escaped character itself and
/// unpaired surrogates become U+FFFD.
#[must_use]
pub fn unescape_js_string(body: &str) -> String {
    unescape_checked(body).0
}

/// Like [`unescape_js_string`], also reporting whether the result is an
/// exact rendition (false when an unpaired surrogate had to be replaced).
#[must_use]
pub fn unescape_checked(body: &str) -> (String, bool) {
    let chars: Vec<char> = body.chars().collect();
    let mut out = String::with_capacity(body.len());
    let mut exact = true;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch != '\\' {
            out.push(ch);
            i += 1;
            continue;
        }
        i += 1;
        let Some(&esc) = chars.get(i) else {
            out.push('\\');
            break;
        };
        i += 1;
        match esc {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            // line continuation
            '\n' | '\u{2028}' | '\u{2029}' => {}
            '\r' => {
                if chars.get(i) == Some(&'\n') {
                    i += 1;
                }
            }
            '0'..='7' => {
                // legacy octal: up to three digits, value <= 0o377
                let mut value = esc.to_digit(8).unwrap_or(0);
                let max_len = if esc <= '3' { 3 } else { 2 };
                let mut len = 1;
                while len < max_len {
                    match chars.get(i).and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            i += 1;
                            len += 1;
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).unwrap_or('\u{fffd}'));
            }
            'x' => match hex_value(&chars, i, 2) {
                Some(v) => {
                    out.push(char::from_u32(v).unwrap_or('\u{fffd}'));
                    i += 2;
                }
                None => out.push('x'),
            },
            'u' => match read_unicode_escape(&chars, i) {
                Some((unit, len)) => {
                    i += len;
                    if (0xD800..0xDC00).contains(&unit) {
                        // high surrogate: pair it with a following \uXXXX low surrogate
                        let low = if chars.get(i) == Some(&'\\') && chars.get(i + 1) == Some(&'u') {
                            read_unicode_escape(&chars, i + 2)
                                .filter(|(lo, _)| (0xDC00..0xE000).contains(lo))
                        } else {
                            None
                        };
                        match low {
                            Some((lo, lo_len)) => {
                                let cp = 0x10000 + ((unit - 0xD800) << 10) + (lo - 0xDC00);
                                out.push(char::from_u32(cp).unwrap_or('\u{fffd}'));
                                i += 2 + lo_len;
                            }
                            None => {
                                out.push('\u{fffd}');
                                exact = false;
                            }
                        }
                    } else if (0xDC00..0xE000).contains(&unit) {
                        out.push('\u{fffd}');
                        exact = false;
                    } else {
                        out.push(char::from_u32(unit).unwrap_or('\u{fffd}'));
                    }
                }
                None => out.push('u'),
            },
            other => out.push(other),
        }
    }

    (out, exact)
}

fn hex_value(chars: &[char], start: usize, len: usize) -> Option<u32> {
    if start + len > chars.len() {
        return None;
    }
    let mut value = 0u32;
    for c in &chars[start..start + len] {
        value = value * 16 + c.to_digit(16)?;
    }
    Some(value)
}

/// Reads the part after `\u`: either four hex digits or `{hex}`.
/// Returns the code point/unit and the number of chars consumed.
fn read_unicode_escape(chars: &[char], start: usize) -> Option<(u32, usize)> {
    if chars.get(start) == Some(&'{') {
        let mut value = 0u32;
        let mut j = start + 1;
        while let Some(c) = chars.get(j) {
            if *c == '}' {
                if j == start + 1 || value > 0x10FFFF {
                    return None;
                }
                return Some((value, j - start + 1));
            }
            value = value.checked_mul(16)?.checked_add(c.to_digit(16)?)?;
            j += 1;
        }
        None
    } else {
        hex_value(chars, start, 4).map(|v| (v, 4))
    }
}

/// Escape a string for a double-quoted literal: backslash, quote,
/// newline, carriage return and tab.
#[must_use]
pub fn escape_js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
