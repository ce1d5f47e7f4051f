//! Thin CLI host: reads a script (from a path, `--eval`, or stdin), runs it
//! to completion, and renders any uncaught error through the library's
//! source-annotated diagnostics.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;

/// Run an EC script.
#[derive(ClapParser, Debug)]
#[command(name = "ecrun", version, about = "Tree-walking interpreter for the EC scripting language")]
struct Cli {
    /// Script path, `-` for stdin, or omitted if `--eval` is given
    script: Option<PathBuf>,

    /// Run this inline snippet instead of reading a file
    #[arg(long)]
    eval: Option<String>,

    /// Disable ANSI-colored diagnostics
    #[arg(long)]
    no_color: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = std::env::var("EC_LOG").unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let use_color = !cli.no_color
        && std::env::var_os("NO_COLOR").is_none()
        && std::env::var_os("EC_NO_COLOR").is_none();

    let (source, result) = if let Some(code) = cli.eval {
        let result = ecrun::run_source(&code, "<eval>");
        (code, result)
    } else {
        match cli.script.as_deref() {
            Some(path) if path != PathBuf::from("-") => {
                let source = match std::fs::read_to_string(path) {
                    Ok(s) => s,
                    Err(e) => {
                        eprintln!("ecrun: cannot read {}: {e}", path.display());
                        return ExitCode::FAILURE;
                    }
                };
                let result = ecrun::run_file(path);
                (source, result)
            }
            _ => {
                let mut source = String::new();
                if let Err(e) = std::io::stdin().read_to_string(&mut source) {
                    eprintln!("ecrun: cannot read stdin: {e}");
                    return ExitCode::FAILURE;
                }
                let result = ecrun::run_source(&source, "<stdin>");
                (source, result)
            }
        }
    };

    match result {
        Ok(evaluator) => {
            for line in &evaluator.output {
                println!("{line}");
            }
            match evaluator.exit_code {
                Some(code) => ExitCode::from(code.clamp(0, 255) as u8),
                None => ExitCode::SUCCESS,
            }
        }
        Err(err) => {
            let rendered = err.display_with_source(&source);
            let rendered = if use_color { rendered } else { strip_ansi(&rendered) };
            eprintln!("{rendered}");
            ExitCode::FAILURE
        }
    }
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for c in chars.by_ref() {
                if c == 'm' {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}
