//! Module resolver behavior: caching identity, circular imports, bare
//! `node_modules` specifiers, and CommonJS/`module.exports` interop
//! (spec §4.I).

use std::io::Write;

fn write_module(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::File::create(&path).unwrap().write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn two_imports_of_the_same_default_object_export_share_identity() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "m.ec", "export default {count: 0};");
    let main = write_module(
        dir.path(),
        "main.ec",
        r#"
        import a from "./m";
        import b from "./m";
        a.count = 5;
        console.log(b.count, a === b);
        "#,
    );

    let ev = ecrun::run_file(&main).expect("script runs");
    assert_eq!(ev.output, vec!["5 true".to_string()]);
}

#[test]
fn circular_imports_observe_the_partial_exports_map() {
    let dir = tempfile::tempdir().unwrap();
    write_module(
        dir.path(),
        "a.ec",
        r#"
        export const fromA = "a";
        import { fromB } from "./b";
        export const sawFromB = fromB;
        "#,
    );
    write_module(
        dir.path(),
        "b.ec",
        r#"
        export const fromB = "b";
        import { fromA } from "./a";
        export const sawFromA = fromA;
        "#,
    );
    let main = write_module(
        dir.path(),
        "main.ec",
        r#"
        import { fromA, sawFromB } from "./a";
        console.log(fromA, sawFromB);
        "#,
    );

    let ev = ecrun::run_file(&main).expect("script runs");
    assert_eq!(ev.output, vec!["a b".to_string()]);
}

#[test]
fn missing_named_export_is_a_module_error() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "m.ec", "export const onlyThis = 1;");
    let main = write_module(
        dir.path(),
        "main.ec",
        r#"import { doesNotExist } from "./m"; console.log(doesNotExist);"#,
    );

    let err = ecrun::run_file(&main).unwrap_err();
    assert_eq!(err.kind_label(), "Module");
}

#[test]
fn bare_specifier_resolves_through_node_modules() {
    let dir = tempfile::tempdir().unwrap();
    write_module(
        dir.path(),
        "node_modules/leftpad/index.ec",
        "export function pad(s) { return ' ' + s; }",
    );
    let main = write_module(
        dir.path(),
        "main.ec",
        r#"import { pad } from "leftpad"; console.log(pad("x"));"#,
    );

    let ev = ecrun::run_file(&main).expect("script runs");
    assert_eq!(ev.output, vec![" x".to_string()]);
}

#[test]
fn commonjs_module_exports_object_is_read_as_named_exports() {
    let dir = tempfile::tempdir().unwrap();
    write_module(
        dir.path(),
        "cjs.ec",
        r#"
        function greet(name) { return "hi " + name; }
        module.exports = { greet: greet };
        "#,
    );
    let main = write_module(
        dir.path(),
        "main.ec",
        r#"import { greet } from "./cjs"; console.log(greet("world"));"#,
    );

    let ev = ecrun::run_file(&main).expect("script runs");
    assert_eq!(ev.output, vec!["hi world".to_string()]);
}

#[test]
fn commonjs_non_object_module_exports_becomes_the_default_export() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "cjs.ec", "module.exports = 42;");
    let main = write_module(
        dir.path(),
        "main.ec",
        r#"import value from "./cjs"; console.log(value);"#,
    );

    let ev = ecrun::run_file(&main).expect("script runs");
    assert_eq!(ev.output, vec!["42".to_string()]);
}

#[test]
fn module_with_no_extension_probes_ec_js_mjs_in_order() {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "m.js", "export const tag = \"js\";");
    let main = write_module(
        dir.path(),
        "main.ec",
        r#"import { tag } from "./m"; console.log(tag);"#,
    );

    let ev = ecrun::run_file(&main).expect("script runs");
    assert_eq!(ev.output, vec!["js".to_string()]);
}

#[test]
fn unresolvable_specifier_is_a_module_error() {
    let dir = tempfile::tempdir().unwrap();
    let main = write_module(
        dir.path(),
        "main.ec",
        r#"import { x } from "./does-not-exist";"#,
    );

    let err = ecrun::run_file(&main).unwrap_err();
    assert_eq!(err.kind_label(), "Module");
}
