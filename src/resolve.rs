//! Textual indirection resolver.
//!
//! Rewrites `E[0x1f]`, `E[31]`, `E["name"]`, `E['name']` and `E.name` to
//! the aliased source text, where `E` is the environment binding (or the
//! constant-array name on the second pass). Occurrences preceded by an
//! identifier character or a member dot are part of something else and
//! are left alone.

use crate::alias::{AliasKey, AliasMap};
use crate::error::{Error, Result};
use regex::{Captures, Regex};

/// Per-run substitution settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstitutionOptions {
    /// Prefix each replacement with `/* E[key] */`.
    pub debug_annotate: bool,
}

fn indirection_pattern(binding: &str) -> Result<Regex> {
    let pattern = format!(
        r#"(?P<pre>\.\.\.|[A-Za-z0-9_$.])?{}(?:\[\s*(?:0[xX](?P<hex>[0-9a-fA-F]+)|(?P<dec>[0-9]+)|"(?P<dq>[^"\\\n]*)"|'(?P<sq>[^'\\\n]*)')\s*\]|\.(?P<dot>[A-Za-z_$][A-Za-z0-9_$]*))"#,
        regex::escape(binding)
    );
    Regex::new(&pattern).map_err(|e| Error::Extraction(format!("bad binding `{binding}`: {e}")))
}

fn key_of(caps: &Captures<'_>) -> Option<AliasKey> {
    if let Some(hex) = caps.name("hex") {
        return u64::from_str_radix(hex.as_str(), 16).ok().map(AliasKey::Index);
    }
    if let Some(dec) = caps.name("dec") {
        return dec.as_str().parse().ok().map(AliasKey::Index);
    }
    caps.name("dq")
        .or_else(|| caps.name("sq"))
        .or_else(|| caps.name("dot"))
        .map(|m| AliasKey::Name(m.as_str().to_string()))
}

/// Source text that can sit in front of `.`, `[` or `(` without changing
/// meaning.
fn is_simple_operand(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty()
        && (trimmed
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '.'))
            || (trimmed.len() >= 2
                && trimmed.starts_with('"')
                && trimmed.ends_with('"')
                && !trimmed[1..trimmed.len() - 1].contains('"')))
}

/// `42.x` reads as a malformed number, so a bare integer needs parens
/// before a member dot.
fn is_integer_literal(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit())
}

/// Replace every `binding[key]` whose key is in `map` with the mapped text.
///
/// Fails with [`Error::MissingAlias`] when no map is supplied; unknown keys
/// are left untouched.
pub fn resolve_indirection(
    code: &str,
    map: Option<&AliasMap>,
    binding: &str,
    opts: &SubstitutionOptions,
) -> Result<String> {
    let map = map.ok_or_else(|| Error::MissingAlias { binding: binding.to_string() })?;
    if binding.is_empty() {
        return Err(Error::Extraction("empty binding name".to_string()));
    }
    let re = indirection_pattern(binding)?;
    let mut replaced = 0usize;

    let out = re.replace_all(code, |caps: &Captures<'_>| {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        let pre = caps.name("pre").map_or("", |m| m.as_str());
        if pre.len() == 1 {
            return whole.to_string();
        }
        let access = &whole[pre.len()..];
        let Some(value) = key_of(caps).and_then(|k| map.get(&k)) else {
            return whole.to_string();
        };
        replaced += 1;

        let end = caps.get(0).map_or(0, |m| m.end());
        let needs_parens = match code[end..].chars().next() {
            Some('.') => !is_simple_operand(value) || is_integer_literal(value),
            Some('[' | '(' | '`') => !is_simple_operand(value),
            _ => false,
        };
        let value = if needs_parens {
            format!("({value})")
        } else {
            value.to_string()
        };
        if opts.debug_annotate {
            format!("{pre}/* {access} */ {value}")
        } else {
            format!("{pre}{value}")
        }
    });

    tracing::debug!(binding, replaced, "resolved indirections");
    Ok(out.into_owned())
}
