use std::fs;
use std::io::{self, Write};
use std::process;

use jsclean::error::Error;
use jsclean::{cli, format, pipeline};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_env("JSCLEAN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .init();
}

fn fail(err: &Error) -> ! {
    eprintln!("jsclean: {err}");
    process::exit(if err.is_input_error() { 2 } else { 1 });
}

fn write_file(path: &str, contents: &str) {
    if let Err(e) = fs::write(path, contents) {
        eprintln!("jsclean: cannot write '{path}': {e}");
        process::exit(1);
    }
}

fn main() {
    init_logging();
    let args = cli::parse_args();

    let source = match fs::read_to_string(&args.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("jsclean: cannot read '{}': {}", args.input, e);
            process::exit(1);
        }
    };

    // Reformat only
    if args.format {
        let formatted = format::format_source(&source).unwrap_or_else(|e| fail(&e));
        if args.write {
            write_file(&args.input, &formatted);
        } else {
            let mut out = io::stdout().lock();
            if let Err(e) = out.write_all(formatted.as_bytes()) {
                fail(&Error::Io(e));
            }
        }
        return;
    }

    let output = pipeline::run(&source, &args.options()).unwrap_or_else(|e| fail(&e));

    if args.stdout {
        print!("{}", output.cleaned);
        return;
    }

    // nothing is written until the whole run has succeeded
    let cleaned_path = args
        .output
        .clone()
        .unwrap_or_else(|| cli::cleaned_file_name(&args.input));
    write_file(&cleaned_path, &output.cleaned);
    write_file(&cli::parameters_file_name(&args.input), &output.parameters);
    write_file(&cli::environment_file_name(&args.input), &output.environment);
    tracing::info!(cleaned = %cleaned_path, "wrote outputs");
}
