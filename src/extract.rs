//! Locate the obfuscated payload and its side tables.
//!
//! The packed script evaluates `Function("<ENV>", "<body>")(<aliases>)`.
//! [`extract_payload`] pulls the three pieces apart and wraps the body in a
//! named function so the rest of the pipeline can parse it as a program.

use crate::alias::AliasMap;
use crate::error::{Error, Result};
use crate::escape::unescape_js_string;
use crate::format::expression_source;
use oxc_ast::ast::{
    ArrayExpressionElement, BindingPattern, Expression, Program, Statement,
    VariableDeclarationKind,
};
use oxc_span::GetSpan;

const CONSTRUCTOR_OPEN: &str = "Function(\"";
const ARG_SEPARATOR: &str = "\",\"";
const CALL_SEPARATOR: &str = "\")(";

/// The three artifacts of one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// `function payload(ENV) { body }` followed by the invocation.
    pub cleaned: String,
    /// Source of the alias object passed to the constructed function.
    pub parameters: String,
    /// Name of the environment binding.
    pub environment: String,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Byte offset of the `)` closing an argument list whose `(` was already
/// consumed. String and template literals are skipped whole.
fn argument_list_end(args: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut chars = args.char_indices();
    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            match c {
                '\\' => {
                    chars.next();
                }
                _ if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split `Function("ENV","body")(params)` out of `source`.
pub fn extract_payload(source: &str) -> Result<Extracted> {
    let open = source
        .find(CONSTRUCTOR_OPEN)
        .ok_or_else(|| Error::Extraction("no `Function(\"` constructor call found".to_string()))?;
    let env_start = open + CONSTRUCTOR_OPEN.len();
    let env_len = source[env_start..]
        .find(ARG_SEPARATOR)
        .ok_or_else(|| Error::Extraction("constructor has no body argument".to_string()))?;
    let environment = &source[env_start..env_start + env_len];
    if !is_identifier(environment) {
        return Err(Error::Extraction(format!(
            "environment binding `{environment}` is not an identifier"
        )));
    }

    let body_start = env_start + env_len + ARG_SEPARATOR.len();
    let call = source
        .rfind(CALL_SEPARATOR)
        .filter(|&i| i >= body_start)
        .ok_or_else(|| Error::Extraction("constructed function is never invoked".to_string()))?;
    let body = unescape_js_string(&source[body_start..call]);

    let args = &source[call + CALL_SEPARATOR.len()..];
    let close = argument_list_end(args)
        .ok_or_else(|| Error::Extraction("unterminated argument list".to_string()))?;
    let parameters = args[..close].trim();
    if parameters.is_empty() {
        return Err(Error::Extraction(
            "constructed function is invoked without arguments".to_string(),
        ));
    }

    tracing::debug!(
        environment,
        body_len = body.len(),
        parameters_len = parameters.len(),
        "extracted payload"
    );
    Ok(Extracted {
        cleaned: format!("function payload({environment}) {{\n{body}\n}}\npayload({parameters});"),
        parameters: parameters.to_string(),
        environment: environment.to_string(),
    })
}

/// Statements of the wrapper scope: the body of a leading function
/// declaration, or the program itself.
fn wrapper_statements<'p, 'a>(program: &'p Program<'a>) -> &'p [Statement<'a>] {
    if let Some(Statement::FunctionDeclaration(f)) = program.body.first()
        && f.id.is_some()
        && let Some(body) = &f.body
    {
        return body.statements.as_slice();
    }
    program.body.as_slice()
}

fn declarators<'p, 'a>(
    stmt: &'p Statement<'a>,
) -> impl Iterator<Item = (VariableDeclarationKind, &'p str, Option<&'p Expression<'a>>)> {
    let decl = match stmt {
        Statement::VariableDeclaration(decl) => Some(decl),
        _ => None,
    };
    decl.into_iter().flat_map(|decl| {
        decl.declarations.iter().filter_map(move |d| match &d.id {
            BindingPattern::BindingIdentifier(id) => Some((decl.kind, id.name.as_str(), d.init.as_ref())),
            _ => None,
        })
    })
}

/// Name of the first `const` initialised with an array literal in the
/// wrapper scope.
#[must_use]
pub fn find_constant_array_name(program: &Program<'_>) -> Option<String> {
    wrapper_statements(program).iter().find_map(|stmt| {
        declarators(stmt).find_map(|(kind, name, init)| {
            let is_array = matches!(init, Some(Expression::ArrayExpression(_)));
            (kind == VariableDeclarationKind::Const && is_array).then(|| name.to_string())
        })
    })
}

/// Index map of the `const name = [...]` table in the wrapper scope.
/// Values are the element source text; holes read as `undefined`.
///
/// `None` when the name is absent, bound with `var`/`let`, or not
/// initialised with an array literal.
#[must_use]
pub fn extract_constant_array(program: &Program<'_>, name: &str) -> Option<AliasMap> {
    let (kind, init) = wrapper_statements(program)
        .iter()
        .find_map(|stmt| declarators(stmt).find(|(_, n, _)| *n == name))
        .map(|(kind, _, init)| (kind, init))?;
    if kind != VariableDeclarationKind::Const {
        tracing::debug!(name, kind = kind.as_str(), "constant table is reassignable, skipped");
        return None;
    }
    let Some(Expression::ArrayExpression(array)) = init else {
        return None;
    };

    let source = program.source_text;
    let values = array
        .elements
        .iter()
        .map(|elem| match elem {
            ArrayExpressionElement::Elision(_) => "undefined".to_string(),
            ArrayExpressionElement::SpreadElement(spread) => spread.span().source_text(source).to_string(),
            _ => elem
                .as_expression()
                .map_or_else(|| "undefined".to_string(), |e| expression_source(e, source)),
        })
        .collect();
    let map = AliasMap::from_values(values);
    tracing::debug!(name, entries = map.len(), "extracted constant table");
    Some(map)
}
