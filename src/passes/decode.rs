//! Replace inlined string-decoding loops with one shared helper call.
//!
//! A decoding function binds a 91-, 98- or 101-character alphabet literal,
//! runs the variable-bit-width loop over its seed parameter and returns
//! `G(bytes)`. The alphabet is either the first declarator of a `var`
//! statement or the first assignment inside a batching call:
//!
//! ```text
//! var alpha = "…", a, b;          // or: batch(alpha = "…", a = "" + seed, …);
//! for (…) { … (x & 8191) > 88 ? 13 : 14 … }
//! return G(bytes);
//! ```
//!
//! Both collapse to `const bytes = decodeHelper("…", seed); return G(bytes);`.

use oxc_allocator::{Allocator, CloneIn};
use oxc_ast::ast::{
    Argument, AssignmentOperator, AssignmentTarget, BinaryOperator, BindingPattern,
    ConditionalExpression, Expression, Function, IdentifierReference, Program, Statement,
    VariableDeclarationKind,
};
use oxc_ast::{AstBuilder, NONE};
use oxc_ast_visit::{Visit, VisitMut, walk, walk_mut};
use oxc_span::SPAN;
use oxc_syntax::scope::ScopeFlags;

use crate::decode::DECODE_HELPER_SOURCE;
use crate::error::Result;
use crate::format::parse_program;

/// Name every canonicalised call site refers to.
pub const HELPER_NAME: &str = "decodeHelper";

const ALPHABET_LENGTHS: [usize; 3] = [91, 98, 101];

struct Decoder<'a> {
    alphabet: Expression<'a>,
    seed: String,
    output: String,
}

enum Match<'a> {
    No,
    Partial(&'static str),
    Yes(Decoder<'a>),
}

fn is_alphabet(expr: &Expression<'_>) -> bool {
    matches!(expr, Expression::StringLiteral(s)
        if ALPHABET_LENGTHS.contains(&s.value.as_str().encode_utf16().count()))
}

fn number(expr: &Expression<'_>) -> Option<f64> {
    match expr {
        Expression::NumericLiteral(n) => Some(n.value),
        _ => None,
    }
}

/// Alphabet literal bound by the statement, in either shape.
fn alphabet_binding<'s, 'a>(stmt: &'s Statement<'a>) -> Option<&'s Expression<'a>> {
    match stmt {
        Statement::VariableDeclaration(decl) => {
            let first = decl.declarations.first()?;
            if !matches!(first.id, BindingPattern::BindingIdentifier(_)) {
                return None;
            }
            first.init.as_ref().filter(|init| is_alphabet(init))
        }
        Statement::ExpressionStatement(stmt) => {
            let Expression::CallExpression(call) = &stmt.expression else {
                return None;
            };
            if !matches!(call.callee, Expression::Identifier(_)) {
                return None;
            }
            let Some(Expression::AssignmentExpression(assign)) = call.arguments.first()?.as_expression()
            else {
                return None;
            };
            let plain = assign.operator == AssignmentOperator::Assign
                && matches!(assign.left, AssignmentTarget::AssignmentTargetIdentifier(_));
            (plain && is_alphabet(&assign.right)).then_some(&assign.right)
        }
        _ => None,
    }
}

fn is_uninitialised_var(stmt: &Statement<'_>) -> bool {
    let Statement::VariableDeclaration(decl) = stmt else {
        return false;
    };
    decl.kind == VariableDeclarationKind::Var && decl.declarations.iter().all(|d| d.init.is_none())
}

/// Looks for `(x & 8191) > 88 ? 13 : 14`, the width switch of the loop.
#[derive(Default)]
struct WidthSwitch {
    found: bool,
}

impl<'a> Visit<'a> for WidthSwitch {
    fn visit_conditional_expression(&mut self, cond: &ConditionalExpression<'a>) {
        if let Expression::BinaryExpression(test) = &cond.test
            && test.operator == BinaryOperator::GreaterThan
            && let Expression::BinaryExpression(masked) = &test.left
            && masked.operator == BinaryOperator::BitwiseAnd
            && number(&masked.right) == Some(8191.0)
            && number(&test.right) == Some(88.0)
            && number(&cond.consequent) == Some(13.0)
            && number(&cond.alternate) == Some(14.0)
        {
            self.found = true;
        }
        walk::walk_conditional_expression(self, cond);
    }
}

/// `return G(name)`: the name of the byte buffer.
fn returned_buffer<'s>(stmt: &'s Statement<'_>) -> Option<&'s str> {
    let Statement::ReturnStatement(ret) = stmt else {
        return None;
    };
    let Some(Expression::CallExpression(call)) = &ret.argument else {
        return None;
    };
    match call.arguments.as_slice() {
        [only] => match only.as_expression()? {
            Expression::Identifier(id) => Some(id.name.as_str()),
            _ => None,
        },
        _ => None,
    }
}

fn recognise<'a>(ast: AstBuilder<'a>, func: &Function<'a>) -> Match<'a> {
    let Some(body) = &func.body else {
        return Match::No;
    };
    let Some(head) = body.statements.iter().find(|s| !is_uninitialised_var(s)) else {
        return Match::No;
    };
    let Some(alphabet) = alphabet_binding(head) else {
        return Match::No;
    };

    // an alphabet-sized literal alone is not a decoder
    let mut switch = WidthSwitch::default();
    switch.visit_function_body(body);
    if !switch.found {
        return Match::No;
    }
    let Some(BindingPattern::BindingIdentifier(seed)) = func.params.items.first().map(|p| &p.pattern)
    else {
        return Match::Partial("decoder has no plain seed parameter");
    };
    let Some(output) = body.statements.last().and_then(returned_buffer) else {
        return Match::Partial("decoder does not end in `return G(buffer)`");
    };
    Match::Yes(Decoder {
        alphabet: alphabet.clone_in(ast.allocator),
        seed: seed.name.to_string(),
        output: output.to_string(),
    })
}

struct DecoderCanonicalizer<'a> {
    ast: AstBuilder<'a>,
    rewritten: usize,
}

impl<'a> DecoderCanonicalizer<'a> {
    fn helper_call(&self, decoder: Decoder<'a>) -> Statement<'a> {
        let ast = self.ast;
        let args = ast.vec_from_array([
            Argument::from(decoder.alphabet),
            Argument::from(ast.expression_identifier(SPAN, ast.atom(&decoder.seed))),
        ]);
        let callee = ast.expression_identifier(SPAN, ast.atom(HELPER_NAME));
        let call = ast.expression_call(SPAN, callee, NONE, args, false);
        let target = ast.binding_pattern_binding_identifier(SPAN, ast.atom(&decoder.output));
        let declarator =
            ast.variable_declarator(SPAN, VariableDeclarationKind::Const, target, NONE, Some(call), false);
        Statement::VariableDeclaration(ast.alloc_variable_declaration(
            SPAN,
            VariableDeclarationKind::Const,
            ast.vec1(declarator),
            false,
        ))
    }
}

impl<'a> VisitMut<'a> for DecoderCanonicalizer<'a> {
    fn visit_function(&mut self, func: &mut Function<'a>, flags: ScopeFlags) {
        walk_mut::walk_function(self, func, flags);
        let decoder = match recognise(self.ast, func) {
            Match::No => return,
            Match::Partial(problem) => {
                let name = func.id.as_ref().map_or("<anonymous>", |id| id.name.as_str());
                tracing::warn!(function = name, "{problem}");
                return;
            }
            Match::Yes(decoder) => decoder,
        };
        let decl = self.helper_call(decoder);
        let Some(body) = func.body.as_deref_mut() else {
            return;
        };
        let Some(ret) = body.statements.pop() else {
            return;
        };
        body.statements.clear();
        body.statements.push(decl);
        body.statements.push(ret);
        self.rewritten += 1;
    }
}

/// Collapse every recognised decoding loop into a `decodeHelper` call.
pub fn canonicalize_decoders<'a>(allocator: &'a Allocator, program: &mut Program<'a>) -> usize {
    let mut canonicalizer = DecoderCanonicalizer { ast: AstBuilder::new(allocator), rewritten: 0 };
    canonicalizer.visit_program(program);
    tracing::debug!(rewritten = canonicalizer.rewritten, "canonicalized decoders");
    canonicalizer.rewritten
}

#[derive(Default)]
struct HelperUse {
    referenced: bool,
    declared: bool,
}

impl<'a> Visit<'a> for HelperUse {
    fn visit_identifier_reference(&mut self, id: &IdentifierReference<'a>) {
        self.referenced |= id.name.as_str() == HELPER_NAME;
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        self.declared |= func.id.as_ref().is_some_and(|id| id.name.as_str() == HELPER_NAME);
        walk::walk_function(self, func, flags);
    }
}

/// Append the canonical decoder to the program once, when something calls
/// it and nothing declares it yet. Returns whether it was appended.
pub fn append_decode_helper<'a>(allocator: &'a Allocator, program: &mut Program<'a>) -> Result<bool> {
    let mut usage = HelperUse::default();
    usage.visit_program(program);
    if !usage.referenced || usage.declared {
        return Ok(false);
    }
    let helper = parse_program(allocator, DECODE_HELPER_SOURCE)?;
    program.body.extend(helper.body);
    tracing::debug!("appended {HELPER_NAME}");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_helper;
    use crate::decode::tests::encode;
    use crate::escape::unescape_js_string;
    use crate::format::{format_source, print};

    const ALPHA_A: &str = r#"fAKVLrIYbjcuM}OnFdQB,1<@zvlqyam:4&\"P;w*x82/%`.+kZt)eU0^oGRXp!CDE|N5i7gT{s=9]$~JHhS?_36#(>[W"#;
    const ALPHA_B: &str = r#"uOpGbEZtABaNWQJ/6<,FvmU8HD?!*lKz=oR]4;0S)T\"c_97}Y@XwVg.^x{e&r2|j(sC[y1qI$#+:h%PL>fkdiM5n~`3"#;

    fn declarator_shape() -> String {
        format!(
            r#"function __Array(__Array) {{
  var utf8ArrayToStr = "{ALPHA_A}", btO3Nyf, __globalObject, __Buffer, __TextDecoder, __Uint8Array, __String, Blob;
  var_65(btO3Nyf = "" + (__Array || ""), __globalObject = btO3Nyf.length, __Buffer = [], __TextDecoder = 0, __Uint8Array = 0, __String = -1);
  for (Blob = 0; Blob < __globalObject; Blob++) {{
    var URL = utf8ArrayToStr.indexOf(btO3Nyf[Blob]);
    if (URL === -1) continue;
    if (__String < 0) {{
      __String = URL;
    }} else {{
      var_65(__String += URL * 91, __TextDecoder |= __String << __Uint8Array, __Uint8Array += (__String & 8191) > 88 ? 13 : 14);
      do {{
        var_65(__Buffer.push(__TextDecoder & 255), __TextDecoder >>= 8, __Uint8Array -= 8);
      }} while (__Uint8Array > 7);
      __String = -1;
    }}
  }}
  if (__String > -1) {{
    __Buffer.push((__TextDecoder | __String << __Uint8Array) & 255);
  }}
  return dkJAw8(__Buffer);
}}"#
        )
    }

    fn batched_shape() -> String {
        format!(
            r#"function __Buffer(param_0) {{
  var local_0, local_1, local_2, local_3, local_4, local_5, local_6, local_7, local_8;
  var_65(local_0 = "{ALPHA_B}", local_1 = "" + (param_0 || ""), local_2 = local_1.length, local_3 = [], local_4 = 0, local_5 = 0, local_6 = -1);
  for (local_7 = 0; local_7 < local_2; local_7++) {{
    local_8 = local_0.indexOf(local_1[local_7]);
    if (local_8 === -1) continue;
    if (local_6 < 0) {{
      local_6 = local_8;
    }} else {{
      var_65(local_6 += local_8 * 91, local_4 |= local_6 << local_5, local_5 += (local_6 & 8191) > 88 ? 13 : 14);
      do {{
        var_65(local_3.push(local_4 & 255), local_4 >>= 8, local_5 -= 8);
      }} while (local_5 > 7);
      local_6 = -1;
    }}
  }}
  if (local_6 > -1) {{
    local_3.push((local_4 | local_6 << local_5) & 255);
  }}
  return dkJAw8(local_3);
}}"#
        )
    }

    fn canonicalize(src: &str) -> (String, usize) {
        let allocator = Allocator::default();
        let mut program = parse_program(&allocator, src).unwrap();
        let n = canonicalize_decoders(&allocator, &mut program);
        (print(&program), n)
    }

    /// Arguments of the `decodeHelper` call a canonicalised function starts with.
    fn helper_arguments(program: &Program<'_>) -> (String, String) {
        let Some(Statement::FunctionDeclaration(func)) = program.body.first() else {
            panic!("no function");
        };
        let body = func.body.as_ref().unwrap();
        let Statement::VariableDeclaration(decl) = &body.statements[0] else {
            panic!("no const declaration");
        };
        let Some(Expression::CallExpression(call)) = &decl.declarations[0].init else {
            panic!("no helper call");
        };
        let Some(Expression::StringLiteral(alphabet)) = call.arguments[0].as_expression() else {
            panic!("alphabet is not a literal");
        };
        let Some(Expression::Identifier(seed)) = call.arguments[1].as_expression() else {
            panic!("seed is not an identifier");
        };
        (alphabet.value.to_string(), seed.name.to_string())
    }

    #[test]
    fn declarator_shape_collapses() {
        let (out, n) = canonicalize(&declarator_shape());
        assert_eq!(n, 1);
        let want = format!(
            r#"function __Array(__Array) {{ const __Buffer = decodeHelper("{ALPHA_A}", __Array); return dkJAw8(__Buffer); }}"#
        );
        assert_eq!(out, format_source(&want).unwrap());
    }

    #[test]
    fn batched_shape_collapses() {
        let (out, n) = canonicalize(&batched_shape());
        assert_eq!(n, 1);
        let want = format!(
            r#"function __Buffer(param_0) {{ const local_3 = decodeHelper("{ALPHA_B}", param_0); return dkJAw8(local_3); }}"#
        );
        assert_eq!(out, format_source(&want).unwrap());
    }

    #[test]
    fn emitted_call_decodes_with_the_bound_alphabet() {
        let allocator = Allocator::default();
        let src = declarator_shape();
        let mut program = parse_program(&allocator, &src).unwrap();
        assert_eq!(canonicalize_decoders(&allocator, &mut program), 1);

        let (alphabet, seed) = helper_arguments(&program);
        assert_eq!(alphabet, unescape_js_string(ALPHA_A));
        assert_eq!(alphabet.encode_utf16().count(), 91);
        assert_eq!(seed, "__Array");
        for data in [&b"console.log"[..], &b"\x00\x7f\xff"[..], &[0x5A_u8; 29][..]] {
            let encoded = encode(&alphabet, data);
            assert_eq!(decode_helper(&alphabet, &encoded), data, "{encoded}");
        }
    }

    #[test]
    fn second_run_is_a_no_op() {
        let allocator = Allocator::default();
        let src = batched_shape();
        let mut program = parse_program(&allocator, &src).unwrap();
        canonicalize_decoders(&allocator, &mut program);
        let once = print(&program);
        assert_eq!(canonicalize_decoders(&allocator, &mut program), 0);
        assert_eq!(print(&program), once);
    }

    #[test]
    fn wrong_length_or_missing_loop_is_left_alone() {
        let short = r#"function f(p) { var a = "abc", b; return g(b); }"#;
        let (out, n) = canonicalize(short);
        assert_eq!((n, out), (0, format_source(short).unwrap()));

        let no_loop = format!(r#"function f(p) {{ var a = "{ALPHA_A}", b; return g(b); }}"#);
        let (out, n) = canonicalize(&no_loop);
        assert_eq!((n, out), (0, format_source(&no_loop).unwrap()));
    }

    #[test]
    fn partial_match_is_left_alone() {
        let src = declarator_shape().replace("return dkJAw8(__Buffer);", "return __Buffer;");
        let (out, n) = canonicalize(&src);
        assert_eq!((n, out), (0, format_source(&src).unwrap()));
    }

    #[test]
    fn helper_is_appended_once() {
        let allocator = Allocator::default();
        let src = format!("{}\n{}", declarator_shape(), batched_shape());
        let mut program = parse_program(&allocator, &src).unwrap();
        assert_eq!(canonicalize_decoders(&allocator, &mut program), 2);
        assert!(append_decode_helper(&allocator, &mut program).unwrap());
        assert!(!append_decode_helper(&allocator, &mut program).unwrap());
        let out = print(&program);
        assert_eq!(out.matches("function decodeHelper(").count(), 1);
        assert!(out.trim_end().ends_with('}'));
        assert!(format_source(&out).is_ok());
    }

    #[test]
    fn helper_is_not_appended_when_unused() {
        let allocator = Allocator::default();
        let mut program = parse_program(&allocator, "f();").unwrap();
        assert!(!append_decode_helper(&allocator, &mut program).unwrap());
        assert_eq!(print(&program), format_source("f();").unwrap());
    }
}
