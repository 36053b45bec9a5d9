//! Inline trivial decode wrappers into their call sites.
//!
//! After canonicalisation many decoding functions are reduced to
//!
//! ```text
//! function F(p) { const L = decodeHelper(A, p); return G(L); }
//! ```
//!
//! Every `F(x)` that resolves to that declaration becomes
//! `G(decodeHelper(A, x))`, provided `G` and `decodeHelper` still mean at
//! the call site what they mean inside `F`. The declaration goes away once
//! nothing refers to `F` any more; a wrapper still passed around as a value
//! keeps its declaration.

use oxc_allocator::{Allocator, CloneIn, Vec as ArenaVec};
use oxc_ast::ast::{
    Argument, BindingPattern, CallExpression, Expression, Function, FunctionType,
    IdentifierReference, Program, Statement, ThisExpression, VariableDeclarationKind,
};
use oxc_ast::{AstBuilder, NONE};
use oxc_ast_visit::{Visit, VisitMut, walk, walk_mut};
use oxc_semantic::{Scoping, SemanticBuilder, SymbolId};
use oxc_span::{SPAN, Span};
use oxc_syntax::scope::ScopeFlags;
use rustc_hash::{FxHashMap, FxHashSet};

use super::decode::HELPER_NAME;

const MAX_ROUNDS: usize = 16;

struct Wrapper<'a> {
    name: String,
    alphabet: Expression<'a>,
    output: Expression<'a>,
    /// Names the inlined text refers to, with the symbol each resolves to
    /// inside the wrapper. `None` is a global.
    free: Vec<(String, Option<SymbolId>)>,
}

fn resolved(scoping: &Scoping, id: &IdentifierReference<'_>) -> Option<SymbolId> {
    scoping.get_reference(id.reference_id.get()?).symbol_id()
}

/// Names an expression reads, each with the symbol it resolves to.
struct FreeNames<'s> {
    scoping: &'s Scoping,
    names: Vec<(String, Option<SymbolId>)>,
    uses_this: bool,
}

impl<'a> Visit<'a> for FreeNames<'_> {
    fn visit_identifier_reference(&mut self, id: &IdentifierReference<'a>) {
        self.names.push((id.name.to_string(), resolved(self.scoping, id)));
    }

    fn visit_this_expression(&mut self, _it: &ThisExpression) {
        self.uses_this = true;
    }
}

fn single_identifier<'s>(args: &'s ArenaVec<'_, Argument<'_>>) -> Option<&'s str> {
    match args.as_slice() {
        [Argument::Identifier(id)] => Some(id.name.as_str()),
        _ => None,
    }
}

/// `function F(p) { const L = decodeHelper(A, p); return G(L); }`
fn recognise<'a>(
    ast: AstBuilder<'a>,
    scoping: &Scoping,
    func: &Function<'a>,
) -> Option<(SymbolId, Wrapper<'a>)> {
    if func.r#type != FunctionType::FunctionDeclaration || func.r#async || func.generator {
        return None;
    }
    let id = func.id.as_ref()?;
    let symbol = id.symbol_id.get()?;
    let name = id.name.as_str();

    let [param] = func.params.items.as_slice() else {
        return None;
    };
    if func.params.rest.is_some() || param.initializer.is_some() {
        return None;
    }
    let BindingPattern::BindingIdentifier(param) = &param.pattern else {
        return None;
    };
    let param = param.name.as_str();

    let body: Vec<&Statement<'a>> = func
        .body
        .as_ref()?
        .statements
        .iter()
        .filter(|s| !matches!(s, Statement::EmptyStatement(_)))
        .collect();
    let [Statement::VariableDeclaration(decl), Statement::ReturnStatement(ret)] = body.as_slice() else {
        return None;
    };

    if decl.kind != VariableDeclarationKind::Const {
        return None;
    }
    let [declarator] = decl.declarations.as_slice() else {
        return None;
    };
    let BindingPattern::BindingIdentifier(local) = &declarator.id else {
        return None;
    };
    let local = local.name.as_str();
    let Some(Expression::CallExpression(helper)) = &declarator.init else {
        return None;
    };
    let Expression::Identifier(helper_callee) = &helper.callee else {
        return None;
    };
    if helper.optional || helper_callee.name.as_str() != HELPER_NAME {
        return None;
    }
    let [Argument::StringLiteral(_), Argument::Identifier(seed)] = helper.arguments.as_slice() else {
        return None;
    };
    if seed.name.as_str() != param {
        return None;
    }
    let alphabet = helper.arguments[0].as_expression()?;

    let Some(Expression::CallExpression(call)) = &ret.argument else {
        return None;
    };
    if call.optional || single_identifier(&call.arguments) != Some(local) {
        return None;
    }

    let mut free = FreeNames { scoping, names: Vec::new(), uses_this: false };
    free.visit_expression(&call.callee);
    if free.uses_this || free.names.iter().any(|(n, _)| [param, local, name].contains(&n.as_str())) {
        return None;
    }
    free.names.push((HELPER_NAME.to_string(), resolved(scoping, helper_callee)));

    Some((
        symbol,
        Wrapper {
            name: name.to_string(),
            alphabet: alphabet.clone_in(ast.allocator),
            output: call.callee.clone_in(ast.allocator),
            free: free.names,
        },
    ))
}

/// Collects every wrapper declaration whose binding is never redeclared or
/// reassigned.
struct WrapperFinder<'s, 'a> {
    ast: AstBuilder<'a>,
    scoping: &'s Scoping,
    found: FxHashMap<SymbolId, Wrapper<'a>>,
}

impl<'a> Visit<'a> for WrapperFinder<'_, 'a> {
    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        if let Some((symbol, wrapper)) = recognise(self.ast, self.scoping, func) {
            if self.scoping.symbol_redeclarations(symbol).is_empty()
                && !self.scoping.symbol_is_mutated(symbol)
            {
                self.found.insert(symbol, wrapper);
            } else {
                tracing::debug!(wrapper = %wrapper.name, "wrapper binding is rebound, skipped");
            }
        }
        walk::walk_function(self, func, flags);
    }
}

/// Rewrites wrapper calls, innermost first.
struct Inliner<'s, 'a> {
    ast: AstBuilder<'a>,
    scoping: &'s Scoping,
    wrappers: &'s FxHashMap<SymbolId, Wrapper<'a>>,
    inlined: usize,
}

impl<'s, 'a> Inliner<'s, 'a> {
    /// The wrapper `call` invokes, if it can be inlined where it stands.
    fn target(&self, call: &CallExpression<'a>) -> Option<&'s Wrapper<'a>> {
        let [arg] = call.arguments.as_slice() else {
            return None;
        };
        if call.optional || matches!(arg, Argument::SpreadElement(_)) {
            return None;
        }
        let Expression::Identifier(callee) = &call.callee else {
            return None;
        };
        let reference = self.scoping.get_reference(callee.reference_id.get()?);
        let wrapper = self.wrappers.get(&reference.symbol_id()?)?;
        let scope = reference.scope_id();
        for (name, symbol) in &wrapper.free {
            if self.scoping.find_binding(scope, name) != *symbol {
                tracing::debug!(wrapper = %wrapper.name, name = %name, "shadowed at call site, not inlined");
                return None;
            }
        }
        Some(wrapper)
    }

    fn inlined_call(&self, wrapper: &Wrapper<'a>, arg: Expression<'a>, span: Span) -> Expression<'a> {
        let ast = self.ast;
        let helper = ast.expression_identifier(SPAN, ast.atom(HELPER_NAME));
        let args = ast.vec_from_array([
            Argument::from(wrapper.alphabet.clone_in(ast.allocator)),
            Argument::from(arg),
        ]);
        let decoded = ast.expression_call(SPAN, helper, NONE, args, false);
        let output = wrapper.output.clone_in(ast.allocator);
        ast.expression_call(span, output, NONE, ast.vec1(Argument::from(decoded)), false)
    }
}

impl<'a> VisitMut<'a> for Inliner<'_, 'a> {
    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        walk_mut::walk_expression(self, expr);
        let Expression::CallExpression(call) = expr else {
            return;
        };
        let Some(wrapper) = self.target(call) else {
            return;
        };
        let span = call.span;
        let Some(arg) = call.arguments.pop().and_then(|a| Expression::try_from(a).ok()) else {
            return;
        };
        *expr = self.inlined_call(wrapper, arg, span);
        self.inlined += 1;
    }
}

/// Counts references still resolving to each wrapper.
struct Remaining<'s> {
    scoping: &'s Scoping,
    counts: FxHashMap<SymbolId, usize>,
}

impl<'a> Visit<'a> for Remaining<'_> {
    fn visit_identifier_reference(&mut self, id: &IdentifierReference<'a>) {
        if let Some(count) = resolved(self.scoping, id).and_then(|s| self.counts.get_mut(&s)) {
            *count += 1;
        }
    }
}

/// Drops the declarations of the given function symbols.
struct Remover {
    symbols: FxHashSet<SymbolId>,
    removed: usize,
}

impl<'a> VisitMut<'a> for Remover {
    fn visit_statements(&mut self, stmts: &mut ArenaVec<'a, Statement<'a>>) {
        let before = stmts.len();
        stmts.retain(|stmt| match stmt {
            Statement::FunctionDeclaration(func) => !func
                .id
                .as_ref()
                .and_then(|id| id.symbol_id.get())
                .is_some_and(|s| self.symbols.contains(&s)),
            _ => true,
        });
        self.removed += before - stmts.len();
        walk_mut::walk_statements(self, stmts);
    }
}

/// One inlining round: returns the call sites rewritten and the
/// declarations removed.
fn inline_round<'a>(allocator: &'a Allocator, program: &mut Program<'a>) -> (usize, usize) {
    let scoping = SemanticBuilder::new().build(program).semantic.into_scoping();
    let ast = AstBuilder::new(allocator);

    let mut finder = WrapperFinder { ast, scoping: &scoping, found: FxHashMap::default() };
    finder.visit_program(program);
    let wrappers = finder.found;
    if wrappers.is_empty() {
        return (0, 0);
    }

    let mut inliner = Inliner { ast, scoping: &scoping, wrappers: &wrappers, inlined: 0 };
    inliner.visit_program(program);

    let mut remaining = Remaining {
        scoping: &scoping,
        counts: wrappers.keys().map(|&s| (s, 0)).collect(),
    };
    remaining.visit_program(program);
    let mut unused = FxHashSet::default();
    for (symbol, count) in remaining.counts {
        let name = wrappers.get(&symbol).map_or("", |w| w.name.as_str());
        if count == 0 {
            unused.insert(symbol);
        } else {
            tracing::debug!(wrapper = name, remaining = count, "wrapper still referenced, kept");
        }
    }
    if unused.is_empty() {
        return (inliner.inlined, 0);
    }
    let mut remover = Remover { symbols: unused, removed: 0 };
    remover.visit_program(program);
    tracing::debug!(removed = remover.removed, "removed inlined wrappers");
    (inliner.inlined, remover.removed)
}

/// Inline every call to a decode wrapper, to a fixpoint. Returns the number
/// of call sites rewritten.
pub fn inline_decode_wrappers<'a>(allocator: &'a Allocator, program: &mut Program<'a>) -> usize {
    let mut inlined = 0;
    for _ in 0..MAX_ROUNDS {
        let (sites, removed) = inline_round(allocator, program);
        inlined += sites;
        if sites == 0 && removed == 0 {
            tracing::debug!(inlined, "inlined decode wrappers");
            return inlined;
        }
    }
    tracing::warn!(inlined, "wrapper inlining did not settle after {MAX_ROUNDS} rounds");
    inlined
}
