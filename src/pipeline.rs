//! End-to-end normalisation of one packed script.

use oxc_allocator::Allocator;

use crate::alias::parse_alias_object;
use crate::error::Result;
use crate::extract::{extract_constant_array, extract_payload, find_constant_array_name};
use crate::format::{format_source, parse_program, print};
use crate::passes;
use crate::resolve::{SubstitutionOptions, resolve_indirection};

/// Per-run configuration.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Leave `/* E[key] */` before each resolved indirection. The printer
    /// drops comments, so an annotated run stops after resolution.
    pub debug_annotate: bool,
    /// Run the wrapper-call inliner after canonicalisation.
    pub inline_wrappers: bool,
    /// Append the canonical decoder when the output calls it.
    pub append_helper: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options { debug_annotate: false, inline_wrappers: true, append_helper: true }
    }
}

impl Options {
    fn substitution(&self) -> SubstitutionOptions {
        SubstitutionOptions { debug_annotate: self.debug_annotate }
    }
}

/// The three artifacts of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// The normalised program.
    pub cleaned: String,
    /// Source of the alias object, as found.
    pub parameters: String,
    /// Name of the environment binding.
    pub environment: String,
}

/// Unpack, resolve and normalise a packed script.
pub fn run(source: &str, opts: &Options) -> Result<Output> {
    let extracted = extract_payload(source)?;
    tracing::info!(environment = %extracted.environment, "payload extracted");

    let mut code = format_source(&extracted.cleaned)?;
    let aliases = parse_alias_object(&extracted.parameters)?;
    code = resolve_indirection(&code, Some(&aliases), &extracted.environment, &opts.substitution())?;
    tracing::info!(aliases = aliases.len(), "environment resolved");

    let constants = {
        let allocator = Allocator::default();
        let program = parse_program(&allocator, &code)?;
        find_constant_array_name(&program).map(|name| {
            let table = extract_constant_array(&program, &name);
            (name, table)
        })
    };
    match constants {
        Some((name, Some(table))) => {
            code = resolve_indirection(&code, Some(&table), &name, &opts.substitution())?;
            tracing::info!(array = %name, entries = table.len(), "constant table resolved");
        }
        Some((name, None)) => tracing::info!(array = %name, "no usable constant table"),
        None => {}
    }

    let cleaned = if opts.debug_annotate {
        code
    } else {
        normalize(&code, opts)?
    };
    Ok(Output {
        cleaned,
        parameters: extracted.parameters,
        environment: extracted.environment,
    })
}

/// Run the tree passes over an already unpacked program.
pub fn normalize(code: &str, opts: &Options) -> Result<String> {
    let allocator = Allocator::default();
    let mut program = parse_program(&allocator, code)?;

    let folded = passes::fold_string_concats(&allocator, &mut program);
    let rest = passes::normalize_rest_params(&allocator, &mut program);
    let decoders = passes::canonicalize_decoders(&allocator, &mut program);
    let inlined = if opts.inline_wrappers {
        passes::inline_decode_wrappers(&allocator, &mut program)
    } else {
        0
    };
    let helper = opts.append_helper && passes::append_decode_helper(&allocator, &mut program)?;
    tracing::info!(folded, rest, decoders, inlined, helper, "tree passes done");

    Ok(print(&program))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn options_default() {
        let opts = Options::default();
        assert!(!opts.debug_annotate);
        assert!(opts.inline_wrappers);
        assert!(opts.append_helper);
    }

    #[test]
    fn normalize_folds_and_renames() {
        let out = normalize(
            r#"function f(...a) { a.length = 1; return a[0] + "x" + "y"; }"#,
            &Options::default(),
        )
        .unwrap();
        assert_eq!(out, format_source(r#"function f(param_0) { return param_0 + "x" + "y"; }"#).unwrap());
    }

    #[test]
    fn normalize_rejects_bad_input() {
        assert!(matches!(normalize("var = ;", &Options::default()), Err(Error::Parse { .. })));
    }

    #[test]
    fn run_without_constructor_fails() {
        assert!(matches!(run("var a = 1;", &Options::default()), Err(Error::Extraction(_))));
    }
}
