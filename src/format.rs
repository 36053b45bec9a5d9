//! Parse and print JavaScript.
//!
//! Every tree pass works on an oxc [`Program`] allocated in a caller-owned
//! arena and hands it back here for the final text. The text-level passes
//! run their input through [`format_source`] first so that their patterns
//! see one canonical layout.

use oxc_allocator::Allocator;
use oxc_ast::ast::{Expression, Program};
use oxc_codegen::Codegen;
use oxc_diagnostics::OxcDiagnostic;
use oxc_parser::{ParseOptions, Parser};
use oxc_span::{GetSpan, SourceType};

use crate::error::{Error, Result, Span};

fn parse_options() -> ParseOptions {
    ParseOptions { preserve_parens: false, ..ParseOptions::default() }
}

/// 1-indexed line and column of a byte offset.
fn position(source: &str, offset: usize) -> Span {
    let offset = offset.min(source.len());
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let col = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    Span::new(line, col)
}

fn parse_error(source: &str, errors: &[OxcDiagnostic]) -> Error {
    let Some(first) = errors.first() else {
        return Error::parse(Span::default(), "parser gave up without a diagnostic");
    };
    let offset = first
        .labels
        .as_ref()
        .and_then(|labels| labels.first())
        .map_or(0, |label| label.offset());
    Error::parse(position(source, offset), first.message.to_string())
}

/// Parse a script. Comments are not carried through the tree.
pub fn parse_program<'a>(allocator: &'a Allocator, source: &'a str) -> Result<Program<'a>> {
    let ret = Parser::new(allocator, source, SourceType::cjs())
        .with_options(parse_options())
        .parse();
    if ret.panicked || !ret.errors.is_empty() {
        return Err(parse_error(source, &ret.errors));
    }
    let mut program = ret.program;
    program.comments.clear();
    Ok(program)
}

/// Parse a single expression, such as an object literal.
pub fn parse_expression<'a>(allocator: &'a Allocator, source: &'a str) -> Result<Expression<'a>> {
    Parser::new(allocator, source, SourceType::cjs())
        .with_options(parse_options())
        .parse_expression()
        .map_err(|errors| parse_error(source, &errors))
}

/// Source text of `expr` as it appears in `source`. A sequence comes back
/// parenthesised so it stays one operand wherever it is pasted.
#[must_use]
pub fn expression_source(expr: &Expression<'_>, source: &str) -> String {
    let text = expr.span().source_text(source);
    if matches!(expr, Expression::SequenceExpression(_)) {
        format!("({text})")
    } else {
        text.to_string()
    }
}

#[must_use]
pub fn print(program: &Program<'_>) -> String {
    Codegen::new().build(program).code
}

/// Parse and re-print `source` in canonical layout.
pub fn format_source(source: &str) -> Result<String> {
    let allocator = Allocator::default();
    let program = parse_program(&allocator, source)?;
    Ok(print(&program))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_canonical_and_stable() {
        let once = format_source("var a=1;function f(x){return x+'y'}").unwrap();
        assert_eq!(format_source(&once).unwrap(), once);
        assert_eq!(once, format_source("var a = 1;\n\nfunction f(x) {\n  return x + 'y';\n}").unwrap());
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(format_source("/* a */ f(); // b").unwrap(), format_source("f();").unwrap());
    }

    #[test]
    fn parse_errors_carry_a_position() {
        let err = format_source("var a = 1;\nvar = ;").unwrap_err();
        match err {
            Error::Parse { span, .. } => assert_eq!(span.line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn sequences_are_parenthesised() {
        let allocator = Allocator::default();
        let expr = parse_expression(&allocator, "[(a, b), c + 1]").unwrap();
        let Expression::ArrayExpression(array) = &expr else {
            panic!("not an array");
        };
        let sources: Vec<_> = array
            .elements
            .iter()
            .filter_map(|e| e.as_expression())
            .map(|e| expression_source(e, "[(a, b), c + 1]"))
            .collect();
        assert_eq!(sources, vec!["(a, b)", "c + 1"]);
    }

    #[test]
    fn positions_count_characters() {
        assert_eq!(position("ab\ncé d", 7), Span::new(2, 4));
        assert_eq!(position("x", 0), Span::new(1, 1));
    }
}
