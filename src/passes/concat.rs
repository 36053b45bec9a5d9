//! Constant-fold `"a" + "b"` into `"ab"`.

use oxc_allocator::Allocator;
use oxc_ast::AstBuilder;
use oxc_ast::ast::{BinaryOperator, Expression, Program};
use oxc_ast_visit::{VisitMut, walk_mut};
use oxc_span::Span;

struct ConcatFolder<'a> {
    ast: AstBuilder<'a>,
    folded: usize,
}

fn folded_value(expr: &Expression<'_>) -> Option<(Span, String)> {
    let Expression::BinaryExpression(bin) = expr else {
        return None;
    };
    if bin.operator != BinaryOperator::Addition {
        return None;
    }
    let (Expression::StringLiteral(l), Expression::StringLiteral(r)) = (&bin.left, &bin.right) else {
        return None;
    };
    if l.lone_surrogates || r.lone_surrogates {
        return None;
    }
    Some((bin.span, format!("{}{}", l.value, r.value)))
}

impl<'a> VisitMut<'a> for ConcatFolder<'a> {
    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        walk_mut::walk_expression(self, expr);
        if let Some((span, value)) = folded_value(expr) {
            *expr = self.ast.expression_string_literal(span, self.ast.atom(&value), None);
            self.folded += 1;
        }
    }
}

/// Fold every `+` whose operands are both string literals. Children are
/// visited before parents, so `"1" + "2" + "3"` collapses in one call.
pub fn fold_string_concats<'a>(allocator: &'a Allocator, program: &mut Program<'a>) -> usize {
    let mut folder = ConcatFolder { ast: AstBuilder::new(allocator), folded: 0 };
    folder.visit_program(program);
    tracing::debug!(folded = folder.folded, "folded string concatenations");
    folder.folded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{format_source, parse_program, print};
    use oxc_ast::ast::Statement;

    fn fold(src: &str) -> (String, usize) {
        let allocator = Allocator::default();
        let mut program = parse_program(&allocator, src).unwrap();
        let n = fold_string_concats(&allocator, &mut program);
        (print(&program), n)
    }

    #[test]
    fn chain_collapses_in_one_call() {
        let (out, n) = fold(r#"x = "1" + "2" + "3";"#);
        assert_eq!(out, format_source(r#"x = "123";"#).unwrap());
        assert_eq!(n, 2);
    }

    #[test]
    fn mixed_operands_are_left_alone() {
        let (out, n) = fold(r#"x = a + "b" + "c"; y = 1 + "2"; z = "p" + ("q" + "r");"#);
        assert_eq!(
            out,
            format_source(r#"x = a + "b" + "c"; y = 1 + "2"; z = "pqr";"#).unwrap()
        );
        assert_eq!(n, 2);
    }

    #[test]
    fn folding_reaches_nested_functions() {
        let (out, _) = fold(r#"function f() { return g("a" + 'b'); }"#);
        assert_eq!(out, format_source(r#"function f() { return g("ab"); }"#).unwrap());
    }

    #[test]
    fn escapes_survive() {
        let allocator = Allocator::default();
        let mut program = parse_program(&allocator, r#"x = "a\"" + '\n';"#).unwrap();
        assert_eq!(fold_string_concats(&allocator, &mut program), 1);
        let Statement::ExpressionStatement(stmt) = &program.body[0] else {
            panic!("not an expression statement");
        };
        let Expression::AssignmentExpression(assign) = &stmt.expression else {
            panic!("not an assignment");
        };
        let Expression::StringLiteral(lit) = &assign.right else {
            panic!("not folded");
        };
        assert_eq!(lit.value.as_str(), "a\"\n");
        // the printed literal reads back as the same value
        let again = format_source(&print(&program)).unwrap();
        assert_eq!(again, print(&program));
    }

    #[test]
    fn second_run_is_a_no_op() {
        let allocator = Allocator::default();
        let mut program = parse_program(&allocator, r#"x = "1" + "2";"#).unwrap();
        fold_string_concats(&allocator, &mut program);
        assert_eq!(fold_string_concats(&allocator, &mut program), 0);
    }
}
