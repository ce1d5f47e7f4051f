//! End-to-end scenarios straight from the interpreter's own behavioral
//! contract (console output, compound assignment, observers, timers,
//! pipeline, modules).

use std::io::Write;

fn run(src: &str) -> ecrun::Evaluator {
    ecrun::run_source(src, "<test>").expect("script runs without error")
}

#[test]
fn console_log_adds_numbers() {
    let ev = run("console.log(1 + 2)");
    assert_eq!(ev.output, vec!["3".to_string()]);
}

#[test]
fn compound_assignment_chain() {
    let ev = run("var x = 10; x += 5; x *= 2; console.log(x);");
    assert_eq!(ev.output, vec!["30".to_string()]);
}

#[test]
fn observer_reports_old_and_new_values() {
    let ev = run(
        r#"
        var c = 0;
        observe c function(o, n) { console.log("from", o, "to", n); }
        c = 5;
        c = 7;
        "#,
    );
    assert_eq!(
        ev.output,
        vec!["from 0 to 5".to_string(), "from 5 to 7".to_string()]
    );
}

#[test]
fn set_interval_with_self_clearing() {
    let ev = run(
        r#"
        var i = 0;
        var id = setInterval(function(){
            i = i + 1;
            if (i === 3) { clearInterval(id); }
            console.log(i);
        }, 10);
        "#,
    );
    assert_eq!(
        ev.output,
        vec!["1".to_string(), "2".to_string(), "3".to_string()]
    );
}

#[test]
fn pipeline_prepends_argument_to_a_call_expression() {
    let ev = run("function add(a,b){return a+b;} console.log(5 |> add(3));");
    assert_eq!(ev.output, vec!["8".to_string()]);
}

#[test]
fn pipeline_as_bare_function_reference() {
    let ev = run("function double(x){return x*2;} console.log(5 |> double);");
    assert_eq!(ev.output, vec!["10".to_string()]);
}

#[test]
fn module_import_named_export() {
    let dir = tempfile::tempdir().expect("tempdir");
    let module_path = dir.path().join("m.ec");
    std::fs::File::create(&module_path)
        .unwrap()
        .write_all(b"export const PI = 3.14; export function area(r){return PI*r*r;}")
        .unwrap();

    let main_path = dir.path().join("main.ec");
    std::fs::File::create(&main_path)
        .unwrap()
        .write_all(br#"import { area } from "./m"; console.log(area(2));"#)
        .unwrap();

    let ev = ecrun::run_file(&main_path).expect("script runs");
    assert_eq!(ev.output, vec!["12.56".to_string()]);
}

#[test]
fn empty_source_evaluates_without_error() {
    let ev = run("");
    assert!(ev.output.is_empty());
    assert_eq!(ev.exit_code, None);
}

#[test]
fn comments_only_source_evaluates_without_error() {
    let ev = run("// just a comment\n/* and a block one */");
    assert!(ev.output.is_empty());
}

#[test]
fn division_by_zero_yields_infinity_not_an_error() {
    let ev = run("console.log(1 / 0);");
    assert_eq!(ev.output, vec!["Infinity".to_string()]);
}

#[test]
fn array_out_of_bounds_is_undefined() {
    let ev = run("var a = [1,2]; console.log(a[5]);");
    assert_eq!(ev.output, vec!["undefined".to_string()]);
}

#[test]
fn missing_object_property_is_undefined() {
    let ev = run("var o = {a: 1}; console.log(o.missing);");
    assert_eq!(ev.output, vec!["undefined".to_string()]);
}

#[test]
fn nested_template_literals_reenter_the_lexer() {
    let ev = run(
        r#"
        var name = "world";
        console.log(`outer ${`inner ${name}`} end`);
        "#,
    );
    assert_eq!(ev.output, vec!["outer inner world end".to_string()]);
}

#[test]
fn multi_variable_observer_reports_trigger_and_values() {
    let ev = run(
        r#"
        var a = 1;
        var b = 2;
        observe (a, b) function(changes) {
            console.log(changes.triggered[0], changes.values.a, changes.values.b);
        }
        a = 10;
        b = 20;
        "#,
    );
    assert_eq!(
        ev.output,
        vec!["a 10 2".to_string(), "b 10 20".to_string()]
    );
}

#[test]
fn when_guard_limits_observer_execution_to_its_trigger() {
    let ev = run(
        r#"
        var a = 1;
        var b = 2;
        observe (a, b) function(changes) {
            when a { console.log("a changed"); }
            when b { console.log("b changed"); }
        }
        a = 5;
        b = 6;
        "#,
    );
    assert_eq!(
        ev.output,
        vec!["a changed".to_string(), "b changed".to_string()]
    );
}

#[test]
fn generator_yields_values_across_next_calls() {
    let ev = run(
        r#"
        function* gen() { yield 1; yield 2; return 3; }
        var g = gen();
        var r1 = g.next();
        var r2 = g.next();
        var r3 = g.next();
        var r4 = g.next();
        console.log(r1.value, r1.done);
        console.log(r2.value, r2.done);
        console.log(r3.value, r3.done);
        console.log(r4.value, r4.done);
        "#,
    );
    assert_eq!(
        ev.output,
        vec![
            "1 false".to_string(),
            "2 false".to_string(),
            "3 true".to_string(),
            "undefined true".to_string(),
        ]
    );
}

#[test]
fn unknown_identifier_is_a_runtime_error() {
    let err = ecrun::run_source("undefinedName;", "<test>").unwrap_err();
    assert_eq!(err.kind_label(), "Runtime");
}

#[test]
fn try_catch_recovers_from_a_thrown_value() {
    let ev = run(
        r#"
        try {
            throw "boom";
        } catch (e) {
            console.log("caught", e);
        } finally {
            console.log("cleanup");
        }
        "#,
    );
    assert_eq!(
        ev.output,
        vec!["caught boom".to_string(), "cleanup".to_string()]
    );
}
