//! Alias maps: opaque keys to the source text they stand for.
//!
//! The captured-environment object looks like
//! `{get "K"(){return X}, set "K"(v){X=v}, get 0x1(){return Y}}`. Only the
//! getters matter; each contributes `K -> "X"`.

use crate::error::{Error, Result};
use crate::format::{expression_source, parse_expression};
use oxc_allocator::Allocator;
use oxc_ast::ast::{Expression, ObjectPropertyKind, PropertyKey, PropertyKind, Statement};
use oxc_span::GetSpan;
use rustc_hash::FxHashMap;
use std::fmt;

/// Key of an alias entry: a numeric index or a property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AliasKey {
    Index(u64),
    Name(String),
}

impl fmt::Display for AliasKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AliasKey::Index(i) => write!(f, "0x{i:x}"),
            AliasKey::Name(name) => write!(f, "{name:?}"),
        }
    }
}

/// Ordered key -> expression-source map with unique keys.
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    entries: Vec<(AliasKey, String)>,
    index: FxHashMap<AliasKey, usize>,
}

impl AliasMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `0..n` to the given values, in order.
    #[must_use]
    pub fn from_values(values: Vec<String>) -> Self {
        let mut map = Self::new();
        for (i, v) in values.into_iter().enumerate() {
            map.insert(AliasKey::Index(i as u64), v);
        }
        map
    }

    /// Insert or overwrite; an overwritten key keeps its first position.
    pub fn insert(&mut self, key: AliasKey, value: String) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &AliasKey) -> Option<&str> {
        self.index.get(key).map(|&i| self.entries[i].1.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AliasKey, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }
}

/// Build the alias map from the source text of an accessor object literal.
///
/// The getter's returned expression is kept as source text, never
/// evaluated, so `return typeof global` maps to `"typeof global"`.
pub fn parse_alias_object(src: &str) -> Result<AliasMap> {
    let src = src.trim();
    let allocator = Allocator::default();
    let Expression::ObjectExpression(object) = parse_expression(&allocator, src)? else {
        return Err(Error::Extraction(
            "alias source is not an object literal".to_string(),
        ));
    };

    let mut map = AliasMap::new();
    for prop in &object.properties {
        let ObjectPropertyKind::ObjectProperty(prop) = prop else {
            continue;
        };
        if prop.kind != PropertyKind::Get {
            continue;
        }
        let alias_key = literal_key(&prop.key, prop.computed).ok_or_else(|| {
            Error::AmbiguousPattern(format!(
                "getter key `{}` is not a literal",
                prop.key.span().source_text(src)
            ))
        })?;
        let returned = returned_expression(&prop.value).ok_or_else(|| {
            Error::AmbiguousPattern(format!("getter {alias_key} does not return an expression"))
        })?;
        map.insert(alias_key, expression_source(returned, src));
    }

    tracing::debug!(entries = map.len(), "parsed alias object");
    Ok(map)
}

fn literal_key(key: &PropertyKey<'_>, computed: bool) -> Option<AliasKey> {
    match key {
        PropertyKey::StaticIdentifier(id) if !computed => Some(AliasKey::Name(id.name.to_string())),
        PropertyKey::StringLiteral(s) => Some(AliasKey::Name(s.value.to_string())),
        PropertyKey::NumericLiteral(n) => {
            let n = n.value;
            if n >= 0.0 && n.fract() == 0.0 && n <= u64::MAX as f64 {
                Some(AliasKey::Index(n as u64))
            } else {
                Some(AliasKey::Name(n.to_string()))
            }
        }
        _ => None,
    }
}

/// The argument of the first statement of a getter, when it is `return expr`.
fn returned_expression<'e, 'a>(getter: &'e Expression<'a>) -> Option<&'e Expression<'a>> {
    let Expression::FunctionExpression(func) = getter else {
        return None;
    };
    match func.body.as_ref()?.statements.first()? {
        Statement::ReturnStatement(ret) => ret.argument.as_ref(),
        _ => None,
    }
}
