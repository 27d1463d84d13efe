use dusk::reporter::CollectingReporter;
use dusk::vm::{InterpretResult, Vm};

fn interpret(source: &str) -> (InterpretResult, Vec<String>) {
    let mut vm = Vm::new();
    let mut reporter = CollectingReporter::new();
    let result = vm.interpret(source, &mut reporter);
    let errors = reporter.errors.iter().map(|r| r.message.clone()).collect();
    (result, errors)
}

#[test]
fn arithmetic_precedence_and_grouping() {
    let (result, errors) = interpret("print (1 + 2) * 3 - 4 / 2;");
    assert_eq!(result, InterpretResult::Ok);
    assert!(errors.is_empty());
}

#[test]
fn global_variables_persist_across_statements() {
    let (result, errors) = interpret("var a = 1; a = a + 1; print a;");
    assert_eq!(result, InterpretResult::Ok);
    assert!(errors.is_empty());
}

#[test]
fn block_scoping_shadows_and_restores_outer_bindings() {
    let (result, errors) = interpret(
        "var a = `outer`;
         {
           var a = `inner`;
           print a;
         }
         print a;",
    );
    assert_eq!(result, InterpretResult::Ok);
    assert!(errors.is_empty());
}

#[test]
fn if_else_selects_the_right_branch() {
    let (result, errors) = interpret("if (1 < 2) print `yes`; else print `no`;");
    assert_eq!(result, InterpretResult::Ok);
    assert!(errors.is_empty());
}

#[test]
fn logical_and_or_short_circuit() {
    let (result, errors) = interpret("print false and (1/0 == 1/0); print true or (1/0 == 1/0);");
    assert_eq!(result, InterpretResult::Ok);
    assert!(errors.is_empty());
}

#[test]
fn string_concatenation_produces_a_new_interned_value() {
    let (result, errors) = interpret("print `foo` + `bar`;");
    assert_eq!(result, InterpretResult::Ok);
    assert!(errors.is_empty());
}

#[test]
fn reading_an_undeclared_global_is_a_runtime_error() {
    let (result, errors) = interpret("print nope;");
    assert_eq!(result, InterpretResult::RuntimeError);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Undefined variable 'nope'"));
}

#[test]
fn assigning_to_an_undeclared_global_is_a_runtime_error() {
    let (result, errors) = interpret("nope = 1;");
    assert_eq!(result, InterpretResult::RuntimeError);
    assert!(errors[0].contains("Undefined variable 'nope'"));
}

#[test]
fn adding_a_number_to_a_string_is_a_runtime_error() {
    let (result, errors) = interpret("print 1 + `a`;");
    assert_eq!(result, InterpretResult::RuntimeError);
    assert!(errors[0].contains("Operands must be numbers."));
}

#[test]
fn reading_a_local_in_its_own_initializer_is_a_compile_error() {
    let (result, errors) = interpret("{ var a = a; }");
    assert_eq!(result, InterpretResult::CompileError);
    assert!(errors[0].contains("own initializer"));
}

#[test]
fn redeclaring_a_local_in_the_same_scope_is_a_compile_error() {
    let (result, errors) = interpret("{ var a = 1; var a = 2; }");
    assert_eq!(result, InterpretResult::CompileError);
    assert!(errors[0].contains("Already a variable"));
}

#[test]
fn xor_parses_but_is_rejected_at_compile_time() {
    let (result, errors) = interpret("print true xor false;");
    assert_eq!(result, InterpretResult::CompileError);
    assert!(errors.iter().any(|e| e.contains("xor operator is not supported")));
}

#[test]
fn panic_mode_recovers_at_the_next_statement_boundary() {
    // two independent syntax errors on two statements: the parser
    // should report both rather than cascading off the first.
    let (result, errors) = interpret("print ; print ;");
    assert_eq!(result, InterpretResult::CompileError);
    assert_eq!(errors.len(), 2);
}
