//! The invariants and round-trip laws from the interpreter's behavioral
//! contract: const immutability, observer fan-out, strict-equality NaN,
//! JSON/querystring round trips, and timer due-time ordering.

fn run(src: &str) -> ecrun::Evaluator {
    ecrun::run_source(src, "<test>").expect("script runs without error")
}

#[test]
fn reassigning_a_const_is_a_runtime_error() {
    let err = ecrun::run_source("const x = 1; x = 2;", "<test>").unwrap_err();
    assert_eq!(err.kind_label(), "Runtime");
}

#[test]
fn observer_fires_exactly_once_per_assignment_in_order() {
    let ev = run(
        r#"
        var x = 0;
        var calls = [];
        observe x function(o, n) { calls.push("first"); }
        observe x function(o, n) { calls.push("second"); }
        x = 1;
        console.log(calls.join(","));
        "#,
    );
    assert_eq!(ev.output, vec!["first,second".to_string()]);
}

#[test]
fn reassigning_the_same_value_still_triggers_observers() {
    let ev = run(
        r#"
        var x = 5;
        var count = 0;
        observe x function(o, n) { count = count + 1; }
        x = 5;
        console.log(count);
        "#,
    );
    assert_eq!(ev.output, vec!["1".to_string()]);
}

#[test]
fn nan_is_not_strictly_equal_to_itself() {
    let ev = run("console.log(NaN === NaN);");
    assert_eq!(ev.output, vec!["false".to_string()]);
}

#[test]
fn strict_equality_is_reflexive_for_non_nan_values() {
    let ev = run(
        r#"
        var o = {a: 1};
        console.log(1 === 1, "s" === "s", true === true, o === o, null === null, undefined === undefined);
        "#,
    );
    assert_eq!(ev.output, vec!["true true true true true true".to_string()]);
}

#[test]
fn json_round_trip_preserves_shape() {
    let ev = run(
        r#"
        var v = {a: 1, b: "two", c: [1,2,3], d: true, e: null};
        var round = JSON.parse(JSON.stringify(v));
        console.log(round.a, round.b, round.c.length, round.d, round.e);
        "#,
    );
    assert_eq!(ev.output, vec!["1 two 3 true null".to_string()]);
}

#[test]
fn querystring_round_trip_normalizes_values_to_strings() {
    let ev = run(
        r#"
        var qs = require("querystring");
        var obj = {a: "1", b: "two"};
        var round = qs.parse(qs.stringify(obj));
        console.log(round.a, round.b);
        "#,
    );
    assert_eq!(ev.output, vec!["1 two".to_string()]);
}

#[test]
fn timers_with_earlier_due_times_run_first() {
    let ev = run(
        r#"
        setTimeout(function(){ console.log("second"); }, 20);
        setTimeout(function(){ console.log("first"); }, 5);
        "#,
    );
    assert_eq!(ev.output, vec!["first".to_string(), "second".to_string()]);
}

#[test]
fn timers_with_identical_due_times_run_in_registration_order() {
    let ev = run(
        r#"
        setTimeout(function(){ console.log("a"); }, 10);
        setTimeout(function(){ console.log("b"); }, 10);
        "#,
    );
    assert_eq!(ev.output, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn next_tick_microtasks_drain_before_a_macrotask() {
    let ev = run(
        r#"
        setTimeout(function(){ console.log("macro"); }, 0);
        nextTick(function(){ console.log("micro"); });
        "#,
    );
    assert_eq!(ev.output, vec!["micro".to_string(), "macro".to_string()]);
}

#[test]
fn pure_numeric_expression_is_deterministic() {
    let a = run("console.log((2 + 3) * 4 - 1 / 2);");
    let b = run("console.log((2 + 3) * 4 - 1 / 2);");
    assert_eq!(a.output, b.output);
}

#[test]
fn assignment_to_undeclared_name_is_a_runtime_error() {
    let err = ecrun::run_source("x = 1;", "<test>").unwrap_err();
    assert_eq!(err.kind_label(), "Runtime");
}

#[test]
fn tokenizing_ignores_whitespace_and_comments() {
    let with_space = ecrun::lexer::tokenize("1 + 2 // trailing comment\n").unwrap();
    let without_space = ecrun::lexer::tokenize("1+2").unwrap();
    let kinds_a: Vec<_> = with_space.iter().map(|t| t.kind.clone()).collect();
    let kinds_b: Vec<_> = without_space.iter().map(|t| t.kind.clone()).collect();
    assert_eq!(kinds_a, kinds_b);
}
