//! A small JavaScript-like scripting language: lexer, parser, tree-walking
//! evaluator, cooperative event loop, module resolver, and host surface
//!.

pub mod ast;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod event_loop;
pub mod generator;
pub mod host;
pub mod lexer;
pub mod modules;
pub mod parser;
pub mod style;
pub mod suggest;
pub mod token;
pub mod value;

pub use environment::Frame;
pub use error::EcError;
pub use evaluator::Evaluator;
pub use event_loop::EventLoop;
pub use value::Value;

use std::path::Path;

/// Parses and runs a script from an in-memory source string, driving the
/// event loop to completion before returning. `name` is used only for
/// error messages and as the module's own path when it `require`s or
/// `import`s relatively.
pub fn run_source(source: &str, _name: &str) -> Result<Evaluator, EcError> {
    let tokens = lexer::tokenize(source)?;
    let program = parser::Parser::new(tokens)
        .parse_program()
        .map_err(|mut errors| EcError::Syntax(errors.remove(0)))?;

    let mut evaluator = Evaluator::new();
    evaluator.module_base = Some(std::env::current_dir().unwrap_or_default());
    evaluator.run_program(&program)?;
    evaluator.run_event_loop_to_completion()?;
    Ok(evaluator)
}

/// Reads, parses, and runs a script file from disk, driving the event loop
/// to completion before returning. Relative `require`/`import` specifiers
/// inside the script resolve against the file's own directory.
pub fn run_file(path: &Path) -> Result<Evaluator, EcError> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| error::ModuleError::new(format!("cannot read {}: {e}", path.display()), path.display().to_string()))?;

    let tokens = lexer::tokenize(&source)?;
    let program = parser::Parser::new(tokens)
        .parse_program()
        .map_err(|mut errors| EcError::Syntax(errors.remove(0)))?;

    let mut evaluator = Evaluator::new();
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    evaluator.module_base = Some(canonical.parent().map(|p| p.to_path_buf()).unwrap_or(canonical));
    evaluator.run_program(&program)?;
    evaluator.run_event_loop_to_completion()?;
    Ok(evaluator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_a_trivial_script() {
        let ev = run_source("console.log('hi')", "<test>").expect("script runs");
        assert_eq!(ev.output, vec!["hi".to_string()]);
    }

    #[test]
    fn surfaces_a_syntax_error() {
        let err = run_source("let = ;", "<test>").unwrap_err();
        assert!(matches!(err, EcError::Syntax(_)));
    }

    #[test]
    fn exit_code_defaults_to_none_without_process_exit() {
        let ev = run_source("1 + 1", "<test>").expect("script runs");
        assert_eq!(ev.exit_code, None);
    }
}
