use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::ast::Block;
use crate::error::ErrorKind;
use crate::parser::parse_file;
use crate::source::SourceMap;

fn parse(text: &str) -> Block {
    let mut sources = SourceMap::new();
    sources.insert("test.al", text);
    parse_file(&mut sources, "test.al").expect("program should parse")
}

fn check(text: &str) -> Result<StatesLog, Error> {
    validate(&parse(text))
}

fn error_kind(text: &str) -> ErrorKind {
    check(text).expect_err("program should be rejected").kind
}

/// State set after the top-level statements, before the root scope is left.
fn states_after(text: &str) -> StateSet {
    let block = parse(text);
    let mut context = Context::new();
    for statement in &block.statements {
        context
            .validate_statement(statement)
            .expect("statement should validate");
    }
    context.states().clone()
}

#[test]
fn test_alloc_then_free_is_accepted() {
    assert!(check("def p ptr; p := alloc(4); free(p)").is_ok());
}

#[test]
fn test_missing_free_leaks() {
    let error = check("def p ptr\np := alloc(4)\n").unwrap_err();
    assert_eq!(error.kind, ErrorKind::MemoryLeak);
    assert!(error.message.contains("test.al:2:6"), "{}", error.message);
}

#[test]
fn test_overwritten_pointer_leaks() {
    assert_eq!(
        error_kind("def p ptr; p := alloc(4); p := alloc(2); free(p)"),
        ErrorKind::MemoryLeak
    );
}

#[test]
fn test_dereference_past_capacity() {
    let error = check("def p ptr; def q ptr; p := alloc(4); q := p + 5; $q").unwrap_err();
    assert_eq!(error.kind, ErrorKind::AccessViolation);
    assert_eq!(error.span.start.column, 50);
}

#[test]
fn test_dereference_in_bounds() {
    assert!(check("def p ptr; def q ptr; p := alloc(4); q := p + 3; $q; q <- 7; free(p)").is_ok());
}

#[test]
fn test_negative_offset_is_out_of_bounds() {
    assert_eq!(
        error_kind("def p ptr; def q ptr; p := alloc(4); q := p - 1; q <- 1; free(p)"),
        ErrorKind::AccessViolation
    );
}

#[test]
fn test_free_of_maybe_null_pointer() {
    let error = check("def p ptr; def q ptr; def n int; p := alloc(2); q := n + 0; free(q)")
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::AccessViolation);
    assert!(error.message.contains("may be null"));
}

#[test]
fn test_free_at_offset() {
    let error = check("def p ptr; def q ptr; p := alloc(4); q := p + 1; free(q)").unwrap_err();
    assert_eq!(error.kind, ErrorKind::AccessViolation);
    assert!(error.message.contains("offset 1"));
}

#[test]
fn test_double_free() {
    assert_eq!(
        error_kind("def p ptr; def q ptr; p := alloc(4); q := p; free(p); free(q)"),
        ErrorKind::AccessViolation
    );
}

#[test]
fn test_free_nulls_every_alias() {
    let states = states_after("def p ptr; def q ptr; p := alloc(4); q := p + 2; free(p)");
    assert_eq!(
        states,
        StateSet::from([State::new(vec![Reference::Null, Reference::Null])])
    );
}

#[test]
fn test_unpredictable_free() {
    let program = "
        def a ptr
        def b ptr
        def x ptr
        def c int
        a := alloc(2)
        b := alloc(2)
        if (c) { x := a } else { x := b }
        free(x)
    ";
    assert_eq!(error_kind(program), ErrorKind::UnpredictableFree);
}

#[test]
fn test_free_requires_pointer_identifier() {
    assert_eq!(error_kind("def n int; free(n)"), ErrorKind::Type);
    assert_eq!(
        error_kind("def p ptr; p := alloc(1); free(p + 0)"),
        ErrorKind::Shape
    );
}

#[test]
fn test_scope_and_shape_errors() {
    assert_eq!(error_kind("x := 1"), ErrorKind::Scope);
    assert_eq!(error_kind("def p ptr; p := 4"), ErrorKind::Shape);
    assert_eq!(error_kind("def n int; n := alloc(4)"), ErrorKind::Type);
    assert_eq!(error_kind("def n int; n := 1 + alloc(4)"), ErrorKind::Shape);
    assert_eq!(error_kind("def n int; $n"), ErrorKind::Type);
    assert_eq!(error_kind("def p ptr; p := alloc(0)"), ErrorKind::Type);
}

#[test]
fn test_inner_scope_variables_are_dropped() {
    let error = check("{ def p ptr; p := alloc(2) } def q ptr").unwrap_err();
    assert_eq!(error.kind, ErrorKind::MemoryLeak);
    assert_eq!(error.span.start.column, 1);
    assert_eq!(error_kind("{ def p ptr } p := alloc(1)"), ErrorKind::Scope);
}

#[test]
fn test_case_split_covers_every_word() {
    let states = states_after("def a ptr; def x ptr; def n int; a := alloc(3); x := n + 0");
    let a = Reference::Packet { id: 0, offset: 0 };
    let expected: StateSet = [Reference::Null]
        .into_iter()
        .chain((0..3).map(|offset| Reference::Packet { id: 0, offset }))
        .map(|x| State::new(vec![a, x, Reference::Null]))
        .collect();
    assert_eq!(states, expected);
}

#[test]
fn test_case_split_explosion() {
    assert_eq!(
        error_kind("def a ptr; def x ptr; def n int; a := alloc(70000); x := n + 0"),
        ErrorKind::Divergence
    );
}

#[test]
fn test_if_joins_both_branches() {
    let states = states_after(
        "def a ptr; def x ptr; def c int; a := alloc(4); if (c) { x := a + 1 } else { x := a + 3 }",
    );
    let a = Reference::Packet { id: 0, offset: 0 };
    assert_eq!(
        states,
        StateSet::from([
            State::new(vec![a, a.shifted(1), Reference::Null]),
            State::new(vec![a, a.shifted(3), Reference::Null]),
        ])
    );
}

#[test]
fn test_allocation_escaping_branch_leaks() {
    assert_eq!(
        error_kind("def p ptr; def c int; if (c) { p := alloc(4) } free(p)"),
        ErrorKind::MemoryLeak
    );
}

#[test]
fn test_free_in_one_branch_leaks() {
    assert_eq!(
        error_kind("def p ptr; def c int; p := alloc(4); if (c) { free(p) } free(p)"),
        ErrorKind::MemoryLeak
    );
}

#[test]
fn test_branch_local_allocation_is_fine() {
    assert!(check("def c int; if (c) { def t ptr; t := alloc(2); t <- c; free(t) }").is_ok());
}

#[test]
fn test_identity_loop_runs_body_twice() {
    let program = "def c int\ndef p ptr\np := alloc(4)\nwhile (c) {\n  c := c - 1\n}\nfree(p)\n";
    let log = check(program).unwrap();
    let body = log.entries("test.al").iter().filter(|(line, _)| *line == 5).count();
    assert_eq!(body, 2);
    assert_eq!(log.peak("test.al", 4), Some(1));
}

#[test]
fn test_loop_keeps_state_set_when_body_is_identity() {
    let before = states_after("def c int; def p ptr; p := alloc(4)");
    let after = states_after("def c int; def p ptr; p := alloc(4); while (c) { p <- c }");
    assert_eq!(before, after);
}

#[test]
fn test_unbounded_loop_diverges() {
    let error = check(
        "def c int; def p ptr; def q ptr; p := alloc(4); q := p; while (c) { q := q + 1 } free(p)",
    )
    .unwrap_err();
    assert_eq!(error.kind, ErrorKind::Divergence);
    assert!(error.message.contains("100"));
}

#[test]
fn test_bounded_loop_converges() {
    // q walks the buffer but the assumption keeps it inside.
    let program = "
        def c int
        def p ptr
        def q ptr
        p := alloc(4)
        q := p
        while (c) {
            assume (q < p + 3) { q := q + 1 }
            $q
        }
        free(p)
    ";
    let log = check(program).unwrap();
    assert_eq!(log.peak("test.al", 7), Some(4));
    assert_eq!(log.peak("test.al", 9), Some(3));
}

#[test]
fn test_allocation_surviving_loop_iteration() {
    let error = check("def c int; def p ptr; while (c) { p := alloc(1) }").unwrap_err();
    assert_eq!(error.kind, ErrorKind::Divergence);
    assert!(error.message.starts_with("Unexpected allocation"));
}

#[test]
fn test_allocation_freed_in_loop_iteration() {
    assert!(check("def c int; while (c) { def t ptr; t := alloc(2); t <- c; free(t) }").is_ok());
}

#[test]
fn test_assumption_narrows_states() {
    let program = "def a ptr; def x ptr; def n int; a := alloc(4); x := n + 0; assume (x = a + 2); $x";
    let states = states_after(program);
    let a = Reference::Packet { id: 0, offset: 0 };
    assert_eq!(
        states,
        StateSet::from([State::new(vec![a, a.shifted(2), Reference::Null])])
    );
    assert_eq!(
        error_kind("def a ptr; def x ptr; def n int; a := alloc(4); x := n + 0; $x"),
        ErrorKind::AccessViolation
    );
}

#[test]
fn test_contradicting_assumption() {
    assert_eq!(
        error_kind("def a ptr; def b ptr; a := alloc(1); b := alloc(1); assume (a = b)"),
        ErrorKind::Assumption
    );
}

#[test]
fn test_assumption_shapes() {
    assert_eq!(
        error_kind("def a ptr; def n int; a := alloc(1); assume (a = n)"),
        ErrorKind::Type
    );
    assert_eq!(
        error_kind("def a ptr; def b ptr; assume (a + 1 = b)"),
        ErrorKind::Shape
    );
}

#[test]
fn test_guarded_assumption_only_runs_matching_states() {
    let program = "
        def a ptr
        def x ptr
        def n int
        a := alloc(4)
        x := n + 0
        assume (x < a + 2) { $x }
        free(a)
    ";
    assert!(check(program).is_ok());
}

#[test]
fn test_call_below_declared_size() {
    let program = "
        func fill(p ptr[4]) { p <- 1 }
        def a ptr
        a := alloc(2)
        call fill(a)
        free(a)
    ";
    let error = check(program).unwrap_err();
    assert_eq!(error.kind, ErrorKind::Contract);
    assert!(error.message.starts_with("Function pre-condition failed"));
}

#[test]
fn test_call_grows_buffer_in_place() {
    let program = "
        func grow(p ptr[4:8]) { free(p); p := alloc(8) }
        def a ptr
        def b ptr
        a := alloc(4)
        call grow(a)
        b := a + 7
        $b
        free(a)
    ";
    assert!(check(program).is_ok());
}

#[test]
fn test_call_output_parameter() {
    let program = "
        func make(p ptr[0:4]) { p := alloc(4) }
        def a ptr
        call make(a)
        a <- 3
        free(a)
    ";
    assert!(check(program).is_ok());
}

#[test]
fn test_call_consumes_input_and_aliases() {
    let program = "
        proto release(p ptr[2:0])
        def a ptr
        def b ptr
        a := alloc(2)
        b := a + 1
        call release(a)
    ";
    let states = states_after(program);
    assert_eq!(
        states,
        StateSet::from([State::new(vec![Reference::Null, Reference::Null])])
    );
    assert!(check(program).is_ok());
}

#[test]
fn test_call_checks_arity_and_types() {
    let prelude = "func f(n int, p ptr[1]) { } def a ptr; def n int; a := alloc(1); ";
    assert_eq!(error_kind(&format!("{}call f(n)", prelude)), ErrorKind::Type);
    assert_eq!(error_kind(&format!("{}call f(a, n)", prelude)), ErrorKind::Type);
    assert_eq!(error_kind(&format!("{}call g(n, a)", prelude)), ErrorKind::Scope);
}

#[test]
fn test_call_with_shared_buffer() {
    let program = "
        func two(a ptr[1], b ptr[1]) { }
        def x ptr
        x := alloc(1)
        call two(x, x)
        free(x)
    ";
    assert_eq!(error_kind(program), ErrorKind::Contract);
}

#[test]
fn test_postcondition_requires_null_output() {
    let error = check("func keep(p ptr[2:0]) { }").unwrap_err();
    assert_eq!(error.kind, ErrorKind::Contract);
    assert!(error.message.contains("must be null"));
}

#[test]
fn test_function_body_leak() {
    assert_eq!(
        error_kind("func f(p ptr[1]) { def t ptr; t := alloc(1) }"),
        ErrorKind::MemoryLeak
    );
}

#[test]
fn test_const_parameters() {
    assert_eq!(error_kind("func f(const p ptr[2]) { free(p) }"), ErrorKind::Type);
    assert_eq!(error_kind("func f(const p ptr[2:3]) { }"), ErrorKind::Type);
    assert_eq!(error_kind("func f(const n int) { n := 1 }"), ErrorKind::Type);
    assert!(check("func f(const p ptr[2]) { $p; p <- 1 }").is_ok());
}

#[test]
fn test_const_argument_to_mutable_parameter() {
    let program = "
        func g(p ptr[2]) { }
        func f(const p ptr[2]) { call g(p) }
    ";
    assert_eq!(error_kind(program), ErrorKind::Type);
}

#[test]
fn test_generic_function_checked_per_binding() {
    let program = "
        func clear[N](p ptr[N]) { p <- 0 }
        def a ptr
        a := alloc(3)
        call clear[3](a)
        call clear[1 + 2](a)
        free(a)
    ";
    let log = check(program).unwrap();
    let body = log.entries("test.al").iter().filter(|(line, _)| *line == 2).count();
    assert_eq!(body, 2, "one entry for the definition, one for clear[3]");

    assert_eq!(
        error_kind("func clear[N](p ptr[N]) { p <- 0 } def a ptr; call clear[0](a)"),
        ErrorKind::AccessViolation
    );
    assert_eq!(
        error_kind("func clear[N](p ptr[N]) { p <- 0 } def a ptr; a := alloc(3); call clear(a)"),
        ErrorKind::Type
    );
}

#[test]
fn test_recursive_generic_function_terminates() {
    let program = "
        func walk[N](p ptr[N]) { call walk[N](p) }
        def a ptr
        a := alloc(2)
        call walk[2](a)
        free(a)
    ";
    assert!(check(program).is_ok());
}

#[test]
fn test_generic_recursion_with_growing_binding_diverges() {
    let program = "
        func walk[N](p ptr[2]) { call walk[N + 1](p) }
        def a ptr
        a := alloc(2)
        call walk[1](a)
        free(a)
    ";
    let error = check(program).unwrap_err();
    assert_eq!(error.kind, ErrorKind::Divergence);
    assert!(error.message.contains("walk"), "{}", error.message);
    assert_eq!(error.span.start.line, 2);
}

#[test]
fn test_external_generic_function() {
    assert_eq!(error_kind("func ^main[N]() { }"), ErrorKind::Type);
}

#[test]
fn test_negative_contract_size() {
    assert_eq!(error_kind("func f(p ptr[0 - 1]) { }"), ErrorKind::Contract);
}

#[test]
fn test_unbound_metavariable() {
    assert_eq!(error_kind("def p ptr; p := alloc(N)"), ErrorKind::Metavariable);
}

#[test]
fn test_movement_string_needs_room() {
    assert!(check("def p ptr; p := alloc(2); p <- \"abcdefgh\"; free(p)").is_ok());
    assert_eq!(
        error_kind("def p ptr; p := alloc(2); p <- \"abcdefghi\"; free(p)"),
        ErrorKind::AccessViolation
    );
}

#[test]
fn test_validation_is_repeatable() {
    let block = parse("def c int; def p ptr; p := alloc(4); while (c) { p <- c } free(p)");
    let first = validate(&block);
    let second = validate(&block);
    assert_eq!(first, second);

    let block = parse("def p ptr; p := alloc(4)");
    assert_eq!(validate(&block), validate(&block));
}

#[test]
fn test_log_display() {
    let log = check("def p ptr\np := alloc(1)\nfree(p)").unwrap();
    assert_eq!(log.to_string(), "test.al\n1: 1\n2: 1\n3: 1\n");
}

fn assignments(statements: &[(usize, i64)]) -> String {
    statements
        .iter()
        .map(|(target, offset)| {
            let target = if *target == 0 { "x" } else { "y" };
            format!("{} := a + {}; ", target, offset)
        })
        .collect()
}

proptest! {
    #[test]
    fn if_result_is_union_of_branches(
        then_branch in prop::collection::vec((0usize..2, 0i64..8), 0..4),
        else_branch in prop::collection::vec((0usize..2, 0i64..8), 0..4),
    ) {
        let prelude = "def a ptr; def x ptr; def y ptr; def c int; a := alloc(8); ";
        let joined = states_after(&format!(
            "{}if (c) {{ {}}} else {{ {}}}",
            prelude,
            assignments(&then_branch),
            assignments(&else_branch)
        ));

        let mut expected = states_after(&format!("{}{}", prelude, assignments(&then_branch)));
        expected.extend(states_after(&format!("{}{}", prelude, assignments(&else_branch))));
        prop_assert_eq!(joined, expected);
    }
}
