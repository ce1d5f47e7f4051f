//! Specifier resolution, per-canonical-path module cache, and CommonJS/ESM
//! exports-record duality.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::environment::Frame;
use crate::error::{EcError, ModuleError};
use crate::evaluator::Evaluator;
use crate::value::Value;

/// The file extensions the resolver probes when a specifier has none.
const EXTENSIONS: [&str; 3] = ["ec", "js", "mjs"];

/// The cached record for one canonical path: a live, shared exports map
/// (so a re-entrant circular import observes whatever has been exported so
/// far) plus whether evaluation has finished.
#[derive(Clone)]
pub struct ModuleRecord {
    pub exports: Rc<RefCell<IndexMap<String, Value>>>,
    pub loaded: bool,
}

#[derive(Deserialize, Default)]
struct PackageJson {
    main: Option<String>,
}

/// Resolves `specifier` (imported from `evaluator.module_base`, or the
/// process's current directory if this is the entry script), evaluates it
/// at most once, and returns its exports record.
pub fn import(evaluator: &mut Evaluator, specifier: &str) -> Result<IndexMap<String, Value>, EcError> {
    if let Some(builtin_name) = specifier.strip_prefix("node:") {
        return builtin_module_exports(builtin_name, specifier);
    }
    if specifier.starts_with("http://") || specifier.starts_with("https://") {
        return import_url(evaluator, specifier);
    }
    if is_relative_or_absolute(specifier) {
        let path = resolve_relative(evaluator, specifier)?;
        return import_file(evaluator, path);
    }
    if crate::host::is_builtin_module(specifier) {
        return builtin_module_exports(specifier, specifier);
    }
    let path = resolve_bare(evaluator, specifier)?;
    import_file(evaluator, path)
}

fn is_relative_or_absolute(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}

fn base_dir(evaluator: &Evaluator) -> PathBuf {
    evaluator
        .module_base
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn resolve_relative(evaluator: &Evaluator, specifier: &str) -> Result<PathBuf, EcError> {
    let base = base_dir(evaluator);
    let candidate = if specifier.starts_with('/') {
        PathBuf::from(specifier)
    } else {
        base.join(specifier)
    };
    resolve_candidate(&candidate, specifier)
}

/// Bare specifier resolution: ascend from the importing file's directory
/// looking for `node_modules/<specifier>`, terminating at the filesystem
/// root.
fn resolve_bare(evaluator: &Evaluator, specifier: &str) -> Result<PathBuf, EcError> {
    let mut dir = base_dir(evaluator);
    loop {
        let candidate = dir.join("node_modules").join(specifier);
        if let Ok(resolved) = resolve_candidate(&candidate, specifier) {
            return Ok(resolved);
        }
        if !dir.pop() {
            break;
        }
    }
    Err(ModuleError::new(format!("cannot find module '{specifier}'"), specifier.to_string()).into())
}

/// Applies the extension-probe / directory / `package.json` / `index.*`
/// rules to a single candidate path.
fn resolve_candidate(candidate: &Path, specifier: &str) -> Result<PathBuf, EcError> {
    if candidate.extension().is_some() && candidate.is_file() {
        return Ok(candidate.to_path_buf());
    }
    if candidate.is_file() {
        return Ok(candidate.to_path_buf());
    }
    for ext in EXTENSIONS {
        let probe = candidate.with_extension(ext);
        if probe.is_file() {
            return Ok(probe);
        }
    }
    if candidate.is_dir() {
        let package_json = candidate.join("package.json");
        if let Ok(contents) = std::fs::read_to_string(&package_json) {
            if let Ok(pkg) = serde_json::from_str::<PackageJson>(&contents) {
                if let Some(main) = pkg.main {
                    let main_path = candidate.join(main);
                    if main_path.is_file() {
                        return Ok(main_path);
                    }
                    for ext in EXTENSIONS {
                        let probe = main_path.with_extension(ext);
                        if probe.is_file() {
                            return Ok(probe);
                        }
                    }
                }
            }
        }
        for ext in EXTENSIONS {
            let probe = candidate.join(format!("index.{ext}"));
            if probe.is_file() {
                return Ok(probe);
            }
        }
    }
    Err(ModuleError::new(format!("cannot find module '{specifier}'"), specifier.to_string()).into())
}

/// Parses and evaluates a file-backed module at most once, keyed by its
/// canonicalized path. A circular re-entrant import
/// returns the shared, possibly-partial exports map in place.
fn import_file(evaluator: &mut Evaluator, path: PathBuf) -> Result<IndexMap<String, Value>, EcError> {
    let canonical = std::fs::canonicalize(&path).unwrap_or(path);
    let key = canonical.to_string_lossy().to_string();

    if let Some(record) = evaluator.module_cache.borrow().get(&key) {
        return Ok(record.exports.borrow().clone());
    }

    let exports_cell = Rc::new(RefCell::new(IndexMap::new()));
    evaluator
        .module_cache
        .borrow_mut()
        .insert(key.clone(), ModuleRecord { exports: exports_cell.clone(), loaded: false });

    let source = std::fs::read_to_string(&canonical)
        .map_err(|e| ModuleError::new(format!("cannot read module '{}': {e}", canonical.display()), key.clone()))?;

    let tokens = crate::lexer::tokenize(&source)?;
    let program = crate::parser::Parser::new(tokens)
        .parse_program()
        .map_err(|mut errors| EcError::Syntax(errors.remove(0)))?;

    let module_frame = Frame::child_function(&evaluator.global);
    let prev_base = evaluator.module_base.take();
    evaluator.module_base = canonical.parent().map(|p| p.to_path_buf());
    let result = evaluator.run_module_body(&program, &module_frame, &exports_cell);
    evaluator.module_base = prev_base;
    result?;

    if let Some(record) = evaluator.module_cache.borrow_mut().get_mut(&key) {
        record.loaded = true;
    }
    Ok(exports_cell.borrow().clone())
}

/// Delegates to the host fetch interface. Caches fetched
/// source by the SHA-256 of the URL so offline re-runs can reuse it.
fn import_url(evaluator: &mut Evaluator, url: &str) -> Result<IndexMap<String, Value>, EcError> {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    let key = format!("url:{digest}");
    if let Some(record) = evaluator.module_cache.borrow().get(&key) {
        return Ok(record.exports.borrow().clone());
    }

    let cache_path = url_cache_path(&digest);
    let source = match std::fs::read_to_string(&cache_path) {
        Ok(cached) => cached,
        Err(_) => {
            let fetched = fetch_url(url)?;
            if let Some(dir) = cache_path.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            let _ = std::fs::write(&cache_path, &fetched);
            fetched
        }
    };

    let exports_cell = Rc::new(RefCell::new(IndexMap::new()));
    evaluator
        .module_cache
        .borrow_mut()
        .insert(key.clone(), ModuleRecord { exports: exports_cell.clone(), loaded: false });

    let tokens = crate::lexer::tokenize(&source)?;
    let program = crate::parser::Parser::new(tokens)
        .parse_program()
        .map_err(|mut errors| EcError::Syntax(errors.remove(0)))?;

    let module_frame = Frame::child_function(&evaluator.global);
    let prev_base = evaluator.module_base.take();
    let result = evaluator.run_module_body(&program, &module_frame, &exports_cell);
    evaluator.module_base = prev_base;
    result?;

    if let Some(record) = evaluator.module_cache.borrow_mut().get_mut(&key) {
        record.loaded = true;
    }
    Ok(exports_cell.borrow().clone())
}

fn url_cache_path(digest: &str) -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ecrun")
        .join("url-modules")
        .join(digest)
}

#[cfg(feature = "url-import")]
fn fetch_url(url: &str) -> Result<String, EcError> {
    ureq::get(url)
        .call()
        .map_err(|e| ModuleError::new(format!("fetch failed for '{url}': {e}"), url.to_string()))?
        .into_string()
        .map_err(|e| ModuleError::new(format!("non-UTF8 response from '{url}': {e}"), url.to_string()).into())
}

#[cfg(not(feature = "url-import"))]
fn fetch_url(url: &str) -> Result<String, EcError> {
    Err(ModuleError::new(
        format!("cannot fetch '{url}': this build has no url-import capability"),
        url.to_string(),
    )
    .into())
}

/// `node:`-prefixed or bare built-in module names. These never touch the filesystem cache —
/// each call rebuilds a fresh exports object, matching their description
/// as stateless facades rather than cached file content.
fn builtin_module_exports(name: &str, original_specifier: &str) -> Result<IndexMap<String, Value>, EcError> {
    crate::host::builtin_module(name)
        .ok_or_else(|| ModuleError::new(format!("unknown built-in module '{name}'"), original_specifier.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn resolves_extensionless_relative_specifier() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "m.ec", "export const PI = 3.14;");
        let mut ev = Evaluator::new();
        ev.module_base = Some(dir.path().to_path_buf());
        let exports = import(&mut ev, "./m").unwrap();
        assert_eq!(exports.get("PI"), Some(&Value::Number(3.14)));
    }

    #[test]
    fn caches_module_so_repeated_import_is_identical_reference() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "m.ec", "export const obj = {};");
        let mut ev = Evaluator::new();
        ev.module_base = Some(dir.path().to_path_buf());
        let first = import(&mut ev, "./m").unwrap();
        let second = import(&mut ev, "./m").unwrap();
        match (first.get("obj"), second.get("obj")) {
            (Some(Value::Object(a)), Some(Value::Object(b))) => assert!(Rc::ptr_eq(a, b)),
            other => panic!("expected object exports, got {other:?}"),
        }
    }

    #[test]
    fn directory_import_uses_package_json_main() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        std::fs::create_dir(&pkg_dir).unwrap();
        write_file(&pkg_dir, "package.json", r#"{"main": "entry.ec"}"#);
        write_file(&pkg_dir, "entry.ec", "export const value = 42;");
        let mut ev = Evaluator::new();
        ev.module_base = Some(dir.path().to_path_buf());
        let exports = import(&mut ev, "./pkg").unwrap();
        assert_eq!(exports.get("value"), Some(&Value::Number(42.0)));
    }

    #[test]
    fn directory_import_falls_back_to_index() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg2");
        std::fs::create_dir(&pkg_dir).unwrap();
        write_file(&pkg_dir, "index.ec", "export const value = 7;");
        let mut ev = Evaluator::new();
        ev.module_base = Some(dir.path().to_path_buf());
        let exports = import(&mut ev, "./pkg2").unwrap();
        assert_eq!(exports.get("value"), Some(&Value::Number(7.0)));
    }

    #[test]
    fn commonjs_module_exports_via_module_dot_exports() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "cjs.js", "exports.value = 99;");
        let mut ev = Evaluator::new();
        ev.module_base = Some(dir.path().to_path_buf());
        let exports = import(&mut ev, "./cjs").unwrap();
        assert_eq!(exports.get("value"), Some(&Value::Number(99.0)));
    }

    #[test]
    fn commonjs_non_object_module_exports_wraps_as_default() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "cjs2.js", "module.exports = 5;");
        let mut ev = Evaluator::new();
        ev.module_base = Some(dir.path().to_path_buf());
        let exports = import(&mut ev, "./cjs2").unwrap();
        assert_eq!(exports.get("default"), Some(&Value::Number(5.0)));
    }

    #[test]
    fn missing_module_is_a_module_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut ev = Evaluator::new();
        ev.module_base = Some(dir.path().to_path_buf());
        let result = import(&mut ev, "./does-not-exist");
        assert!(matches!(result, Err(EcError::Module(_))));
    }

    #[test]
    fn node_prefixed_builtin_resolves_without_filesystem() {
        let mut ev = Evaluator::new();
        let exports = import(&mut ev, "node:path").unwrap();
        assert!(exports.contains_key("join"));
    }
}
