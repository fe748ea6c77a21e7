//! End-to-end snippet tests driving the six boundary scenarios through a
//! whole `Session`, adapted from the compile-run-check-outcome shape of the
//! teacher's own snippet harness.

use tapas::common::data::Value;
use tapas::session::{Session, SessionOutcome};
use tapas::{SyntaxKind, TraceKind};

#[test]
fn integer_arithmetic_and_division_by_zero() {
    let mut session = Session::new(Vec::new());
    assert_eq!(session.run_source("return 1 + 2 * 3").unwrap(), Value::Int(7));

    let err = session.run_source("return 10 / 0").unwrap_err();
    match err {
        SessionOutcome::Trace(t) => assert_eq!(t.kind, TraceKind::DivIntZero),
        other => panic!("expected a Trace error, got {:?}", other),
    }
}

#[test]
fn closures_capture_state_across_calls() {
    let mut session = Session::new(Vec::new());
    let source = "
        var counter = () { var n: int = 0; return () { n = n + 1; return n } }();
        var a = counter();
        var b = counter();
        var c = counter();
        return [a, b, c]
    ";
    let result = session.run_source(source).unwrap();
    assert_eq!(result.to_string(), "[1, 2, 3]");
}

#[test]
fn for_loop_over_range_mutates_list() {
    let mut session = Session::new(Vec::new());
    let source = "
        var xs = [0, 0, 0];
        for (i in 0 to 2) { xs[i] = i * i };
        return xs
    ";
    let result = session.run_source(source).unwrap();
    assert_eq!(result.to_string(), "[0, 1, 4]");
}

#[test]
fn recursive_factorial() {
    let mut session = Session::new(Vec::new());
    let source = "
        var fact = (n) { if (n <= 1) { return 1 }; return n * fact(n - 1) };
        return fact(5)
    ";
    assert_eq!(session.run_source(source).unwrap(), Value::Int(120));
}

#[test]
fn shadowing_at_the_same_scope_is_rejected() {
    let mut session = Session::new(Vec::new());
    let err = session.run_source("var x: int = 1; var x: int = 2").unwrap_err();
    match err {
        SessionOutcome::Syntax(s) => assert_eq!(s.kind, SyntaxKind::DblDeclare),
        other => panic!("expected a Syntax error, got {:?}", other),
    }
}

#[test]
fn var_declared_inside_a_block_is_rejected() {
    let mut session = Session::new(Vec::new());
    let err = session
        .run_source("var x: int = 1; if (true) { var x: int = 2 }")
        .unwrap_err();
    match err {
        SessionOutcome::Syntax(s) => assert_eq!(s.kind, SyntaxKind::InBlockVarDef),
        other => panic!("expected a Syntax error, got {:?}", other),
    }
}

#[test]
fn import_exposes_a_dict_of_functions() {
    let mut session = Session::new(vec!["tests/fixtures".into()]);
    let result = session.run_source("import 'm.tap' as m; m::greet('world'); return 1");
    assert_eq!(result.unwrap(), Value::Int(1));
}

#[test]
fn if_elif_else_cascade_picks_the_matching_arm() {
    // each clause is its own top-level line, the way the lexer actually
    // splits a written-out if/elif/else cascade into separate units.
    let classify = |n: i64| {
        let source = format!(
            "
            var n: int = {};
            if (n < 0) {{
                return -1
            }}
            elif (n == 0) {{
                return 0
            }}
            else {{
                return 1
            }}
            ",
            n
        );
        let mut session = Session::new(Vec::new());
        session.run_source(&source).unwrap()
    };
    assert_eq!(classify(-5), Value::Int(-1));
    assert_eq!(classify(0), Value::Int(0));
    assert_eq!(classify(5), Value::Int(1));
}

#[test]
fn elif_without_a_preceding_if_is_rejected() {
    let mut session = Session::new(Vec::new());
    let err = session.run_source("elif (true) { return 1 }").unwrap_err();
    match err {
        SessionOutcome::Syntax(s) => assert_eq!(s.kind, SyntaxKind::Other),
        other => panic!("expected a Syntax error, got {:?}", other),
    }
}
