use std::env;
use std::process;

use crate::pipeline::Options;

#[derive(Debug, Default, PartialEq)]
pub struct Args {
    pub input: String,
    pub output: Option<String>,
    pub stdout: bool,
    pub format: bool,
    pub write: bool,
    pub debug_annotate: bool,
    pub no_inline: bool,
    pub no_helper: bool,
}

impl Args {
    /// Pipeline configuration implied by the flags.
    #[must_use]
    pub fn options(&self) -> Options {
        Options {
            debug_annotate: self.debug_annotate,
            inline_wrappers: !self.no_inline,
            append_helper: !self.no_helper,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Run(Args),
    Help,
    Version,
}

pub fn parse_args() -> Args {
    match parse_from(env::args().skip(1)) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            print_usage();
            process::exit(0);
        }
        Ok(Command::Version) => {
            println!("jsclean {}", env!("CARGO_PKG_VERSION"));
            process::exit(0);
        }
        Err(msg) => {
            eprintln!("jsclean: {msg}");
            eprintln!("Try 'jsclean --help' for usage.");
            process::exit(1);
        }
    }
}

/// Parse an argument list (without the program name).
pub fn parse_from(argv: impl IntoIterator<Item = String>) -> Result<Command, String> {
    let args: Vec<String> = argv.into_iter().collect();
    let mut parsed = Args::default();
    let mut input: Option<String> = None;

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];

        if arg == "--" {
            i += 1;
            if let Some(rest) = args.get(i) {
                input.get_or_insert_with(|| rest.clone());
            }
            break;
        }

        if arg == "-o" || arg == "--output" {
            i += 1;
            let Some(path) = args.get(i) else {
                return Err(format!("{arg} requires an argument"));
            };
            parsed.output = Some(path.clone());
        } else if let Some(path) = arg.strip_prefix("--output=") {
            parsed.output = Some(path.to_string());
        } else if arg == "--stdout" {
            parsed.stdout = true;
        } else if arg == "--format" {
            parsed.format = true;
        } else if arg == "-w" || arg == "--write" {
            parsed.write = true;
        } else if arg == "--debug-annotate" {
            parsed.debug_annotate = true;
        } else if arg == "--no-inline" {
            parsed.no_inline = true;
        } else if arg == "--no-helper" {
            parsed.no_helper = true;
        } else if arg == "-h" || arg == "--help" {
            return Ok(Command::Help);
        } else if arg == "--version" || arg == "-V" {
            return Ok(Command::Version);
        } else if arg.starts_with('-') && arg.len() > 1 {
            return Err(format!("unknown option: {arg}"));
        } else if input.is_none() {
            input = Some(arg.clone());
        } else {
            return Err(format!("unexpected argument: {arg}"));
        }
        i += 1;
    }

    if parsed.write && !parsed.format {
        return Err("-w only applies to --format".to_string());
    }
    parsed.input = input.ok_or_else(|| "missing input file".to_string())?;
    Ok(Command::Run(parsed))
}

fn print_usage() {
    eprintln!(
        "jsclean {}: undo accessor-indirection obfuscation in JavaScript",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!("Usage: jsclean [options] input.js");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o FILE           Write the cleaned program to FILE");
    eprintln!("  --stdout          Print the cleaned program instead of writing files");
    eprintln!("  --format          Only reformat the input (stdout, or in place with -w)");
    eprintln!("  --debug-annotate  Keep each resolved indirection as a comment");
    eprintln!("  --no-inline       Keep decode wrapper functions");
    eprintln!("  --no-helper       Do not append the decodeHelper routine");
    eprintln!("  -h, --help        Show this help");
    eprintln!("  --version         Print the version");
    eprintln!();
    eprintln!("  Writes <name>.cleaned.js, <name>.parameters.js and <name>.environment.js");
    eprintln!("  next to the input. Set JSCLEAN_LOG=debug for pass statistics.");
}

/// `<stem><suffix>` where a trailing `.js` is replaced and any other name
/// is kept whole: `a.min.js` -> `a.min.environment.js`, `a.b` -> `a.b.environment.js`.
fn sibling_name(source: &str, suffix: &str) -> String {
    let stem = source.strip_suffix(".js").unwrap_or(source);
    format!("{stem}{suffix}")
}

#[must_use]
pub fn cleaned_file_name(source: &str) -> String {
    sibling_name(source, ".cleaned.js")
}

#[must_use]
pub fn parameters_file_name(source: &str) -> String {
    sibling_name(source, ".parameters.js")
}

#[must_use]
pub fn environment_file_name(source: &str) -> String {
    sibling_name(source, ".environment.js")
}
