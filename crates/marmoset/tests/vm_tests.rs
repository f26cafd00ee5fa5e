//! End-to-end tests: source text through the compiler and the VM, checking
//! the last popped stack element (or the error that aborted the run).

mod common;

use std::collections::HashMap;
use std::rc::Rc;

use marmoset::{Compiler, Error, Value, Vm};

fn run(input: &str) -> Value {
    let program = common::parse(input);
    let mut compiler = Compiler::new();
    compiler
        .compile(&program)
        .unwrap_or_else(|err| panic!("compile error for {input:?}: {err}"));

    let mut vm = Vm::new(compiler.bytecode());
    vm.run()
        .unwrap_or_else(|err| panic!("vm error for {input:?}: {err}"));
    vm.last_popped_stack_element()
}

fn run_err(input: &str) -> Error {
    let program = common::parse(input);
    let mut compiler = Compiler::new();
    compiler
        .compile(&program)
        .unwrap_or_else(|err| panic!("compile error for {input:?}: {err}"));

    let mut vm = Vm::new(compiler.bytecode());
    match vm.run() {
        Err(err) => err,
        Ok(()) => panic!("expected vm error for {input:?}, got none"),
    }
}

fn expect_values(tests: &[(&str, Value)]) {
    for (input, want) in tests {
        assert_eq!(&run(input), want, "input: {input}");
    }
}

fn int_array(values: &[i64]) -> Value {
    Value::Array(Rc::new(values.iter().map(|v| Value::Integer(*v)).collect()))
}

#[test]
fn integer_arithmetic() {
    expect_values(&[
        ("1", Value::Integer(1)),
        ("1 + 2", Value::Integer(3)),
        ("1 - 2", Value::Integer(-1)),
        ("2 * 2", Value::Integer(4)),
        ("1 / 2", Value::Integer(0)),
        ("50 / 2 * 2 + 10 - 5", Value::Integer(55)),
        ("-1", Value::Integer(-1)),
        ("-1 * 5", Value::Integer(-5)),
        ("-50 + 100 + -50", Value::Integer(0)),
    ]);
}

#[test]
fn dividing_by_zero_aborts_the_run() {
    let err = run_err("1 / 0");
    assert_eq!(err, Error::DivideByZero);
    assert_eq!(err.to_string(), "integer divide by zero");
}

#[test]
fn boolean_expressions() {
    expect_values(&[
        ("true", Value::Boolean(true)),
        ("false", Value::Boolean(false)),
        ("1 == 1", Value::Boolean(true)),
        ("1 != 2", Value::Boolean(true)),
        ("1 > 2", Value::Boolean(false)),
        ("1 < 2", Value::Boolean(true)),
        ("true == false", Value::Boolean(false)),
        ("false != false", Value::Boolean(false)),
        // Values of different kinds are never equal.
        ("1 == false", Value::Boolean(false)),
        ("2 != true", Value::Boolean(true)),
        ("!true", Value::Boolean(false)),
        ("!!true", Value::Boolean(true)),
        ("!1", Value::Boolean(false)),
        ("!(if(false){5;})", Value::Boolean(true)),
    ]);
}

#[test]
fn ordering_mixed_kinds_aborts_the_run() {
    let err = run_err("true > 1");
    assert_eq!(
        err.to_string(),
        "unsupported types for binary operation: BOOLEAN INTEGER"
    );
}

#[test]
fn adding_mixed_kinds_aborts_the_run() {
    let err = run_err("1 + true");
    assert_eq!(
        err.to_string(),
        "unsupported types for binary operation: INTEGER BOOLEAN"
    );
}

#[test]
fn negating_a_non_integer_aborts_the_run() {
    let err = run_err("-true");
    assert_eq!(err.to_string(), "unsupported type for negation: BOOLEAN");
}

#[test]
fn string_expressions() {
    expect_values(&[
        (r#""monkey""#, Value::Str("monkey".into())),
        (r#""foo" + "bar""#, Value::Str("foobar".into())),
        (r#""foo" + "bar" + "baz""#, Value::Str("foobarbaz".into())),
    ]);
}

#[test]
fn non_concatenation_on_strings_aborts_the_run() {
    let err = run_err(r#""foo" - "bar""#);
    assert_eq!(
        err.to_string(),
        "unsupported types for binary operation: STRING STRING"
    );
}

#[test]
fn conditionals() {
    expect_values(&[
        ("if(true){10}", Value::Integer(10)),
        ("if(true){10}else{20}", Value::Integer(10)),
        ("if(false){10}else{20}", Value::Integer(20)),
        ("if(1 < 2){10}else{20}", Value::Integer(10)),
        ("if(false){10}", Value::Null),
        ("if((if(false){10})){10}else{20}", Value::Integer(20)),
    ]);
}

#[test]
fn array_literals() {
    expect_values(&[
        ("[]", int_array(&[])),
        ("[1,2,3]", int_array(&[1, 2, 3])),
        ("[1+2,3*4]", int_array(&[3, 12])),
    ]);
}

#[test]
fn hash_literals() {
    assert_eq!(run("{}"), Value::Hash(Rc::new(HashMap::new())));

    let expected: HashMap<_, _> = [
        (marmoset::HashKey::Integer(1), Value::Integer(2)),
        (marmoset::HashKey::Integer(3), Value::Integer(4)),
    ]
    .into_iter()
    .collect();
    assert_eq!(run("{1: 2, 3: 4}"), Value::Hash(Rc::new(expected)));
}

#[test]
fn unusable_hash_keys_abort_the_run() {
    let err = run_err("{[]: 1}");
    assert_eq!(err.to_string(), "unusable as hash key: ARRAY");
}

#[test]
fn index_expressions() {
    expect_values(&[
        ("[1,2,3][1]", Value::Integer(2)),
        ("[[1,2,3]][0][0]", Value::Integer(1)),
        ("[][0]", Value::Null),
        ("[1][10]", Value::Null),
        ("[1][-1]", Value::Null),
        ("{1:1,2:2}[1]", Value::Integer(1)),
        ("{1:1,2:2}[2]", Value::Integer(2)),
        ("{1:1}[0]", Value::Null),
        ("{}[0]", Value::Null),
        (r#"{"name": "Crab"}["name"]"#, Value::Str("Crab".into())),
        ("{true: 5}[true]", Value::Integer(5)),
    ]);
}

#[test]
fn indexing_a_non_indexable_aborts_the_run() {
    let err = run_err("5[0]");
    assert_eq!(err.to_string(), "index operator not supported: INTEGER");
}

#[test]
fn global_let_statements() {
    expect_values(&[
        ("let one = 1;one", Value::Integer(1)),
        ("let one = 1 let two = 2; one + two;", Value::Integer(3)),
        ("let one = 1 let two = one + one; one + two;", Value::Integer(3)),
    ]);
}

#[test]
fn calling_functions() {
    expect_values(&[
        ("let f = fn(){5 + 10};f()", Value::Integer(15)),
        (
            "let one = fn(){1}; let two = fn(){2}; one() + two();",
            Value::Integer(3),
        ),
        (
            "let one = fn(){1}; let two = fn(){one()*2}; fn(){two()+1}()",
            Value::Integer(3),
        ),
        ("fn(){1;2}();", Value::Integer(2)),
        ("fn(){return 1;2}();", Value::Integer(1)),
    ]);
}

#[test]
fn calling_functions_without_return_value() {
    expect_values(&[
        ("fn(){}();", Value::Null),
        ("let f = fn(){}; f();", Value::Null),
        ("let a = fn(){}; let b = fn(){a()}; b();", Value::Null),
    ]);
}

#[test]
fn calling_functions_with_bindings() {
    expect_values(&[
        ("fn(){let one = 1;one}();", Value::Integer(1)),
        (
            "let f = fn(){let one = 1;let two = 2;one + two;} f();",
            Value::Integer(3),
        ),
        (
            r#"let f = fn(){let mon = "mon"; return mon + "key"} f();"#,
            Value::Str("monkey".into()),
        ),
        (
            r#"let f = fn(){let f = fn(){"monkey"};f} f()();"#,
            Value::Str("monkey".into()),
        ),
        (
            "let sum = fn(x,y){let z = x + y;z;}
             let outer = fn(){ sum(1,2) + sum(3,4) }
             outer();",
            Value::Integer(10),
        ),
    ]);
}

#[test]
fn calling_functions_with_arguments_and_bindings() {
    expect_values(&[
        ("fn(two){let one = 1;one+two}(2);", Value::Integer(3)),
        (
            "let f = fn(three){let one = 1;let two = 2;one + two + three;} f(3);",
            Value::Integer(6),
        ),
        (
            r#"let f = fn(key){let mon = "mon"; return mon + key} f("key");"#,
            Value::Str("monkey".into()),
        ),
    ]);
}

#[test]
fn first_class_functions() {
    expect_values(&[(
        "let returnsOneReturner = fn() { let returnsOne = fn() { 1; }; returnsOne; };
         returnsOneReturner()();",
        Value::Integer(1),
    )]);
}

#[test]
fn calling_with_wrong_arguments() {
    let tests = [
        ("fn(){1;}(1);", "wrong number of arguments: want=0, got=1"),
        ("fn(a){a;}();", "wrong number of arguments: want=1, got=0"),
        ("fn(x,y){x+y;}(1);", "wrong number of arguments: want=2, got=1"),
    ];
    for (input, want) in tests {
        assert_eq!(run_err(input).to_string(), want, "input: {input}");
    }
}

#[test]
fn calling_a_non_function_aborts_the_run() {
    let err = run_err("let x = 1; x(5)");
    assert_eq!(err, Error::NotCallable);
    assert_eq!(err.to_string(), "calling non-closure and non-builtin");
}

#[test]
fn closures() {
    expect_values(&[
        (
            "let double = fn(x){ fn(){ return 2*x } } double(1)()",
            Value::Integer(2),
        ),
        (
            "let head = fn(x){ fn(){ return first(x) } } head([10,1])()",
            Value::Integer(10),
        ),
        (
            "let newClosure = fn(a){ fn(){a} }; let closure = newClosure(99); closure();",
            Value::Integer(99),
        ),
        (
            "let newAdder = fn(a, b) { fn(c) { a + b + c }; };
             let adder = newAdder(1, 2);
             adder(8);",
            Value::Integer(11),
        ),
        (
            "let newAdderOuter = fn(a, b) {
                 let c = a + b;
                 fn(d) { let e = d + c; fn(f) { e + f; }; };
             };
             let newAdderInner = newAdderOuter(1, 2);
             let adder = newAdderInner(3);
             adder(8);",
            Value::Integer(14),
        ),
    ]);
}

#[test]
fn recursive_functions() {
    expect_values(&[
        (
            "let f = fn(x){
                 if (x < 2) { return x }
                 return f(x-1) + f(x-2)
             }
             f(15)",
            Value::Integer(610),
        ),
        (
            "let countDown = fn(x) { if (x == 0) { return 0 } else { countDown(x - 1) } };
             countDown(3);",
            Value::Integer(0),
        ),
    ]);
}

#[test]
fn builtin_functions() {
    expect_values(&[
        (r#"len("")"#, Value::Integer(0)),
        (r#"len("four")"#, Value::Integer(4)),
        ("len([])", Value::Integer(0)),
        ("len([1,2,3])", Value::Integer(3)),
        ("first([1,2,3])", Value::Integer(1)),
        ("first([])", Value::Null),
        ("last([1,2,3])", Value::Integer(3)),
        ("last([])", Value::Null),
        ("rest([1,2,3])", int_array(&[2, 3])),
        ("rest([])", Value::Null),
        ("push([], 1)", int_array(&[1])),
        ("push([1], 2)", int_array(&[1, 2])),
        (r#"puts("monkey")"#, Value::Null),
        ("help()", Value::Null),
        ("exit()", Value::Null),
    ]);
}

#[test]
fn builtin_misuse_flows_as_error_values() {
    // These are values, not VM errors: the run finishes normally.
    expect_values(&[
        (
            "len(1)",
            Value::Error("argument to `len` not supported, got INTEGER".to_string()),
        ),
        (
            r#"len("one", "two")"#,
            Value::Error("wrong number of arguments. got=2, want=1".to_string()),
        ),
        (
            "first(1)",
            Value::Error("argument to first must be ARRAY, got INTEGER".to_string()),
        ),
        (
            "last(1)",
            Value::Error("argument to last must be ARRAY, got INTEGER".to_string()),
        ),
        (
            "rest(1)",
            Value::Error("argument to rest must be ARRAY, got INTEGER".to_string()),
        ),
        (
            "push(1, 1)",
            Value::Error("argument to push must be ARRAY, got INTEGER".to_string()),
        ),
    ]);

    assert_eq!(
        run("len(1)").inspect(),
        "ERROR: argument to `len` not supported, got INTEGER"
    );
}

#[test]
fn top_level_returns_halt_with_the_value() {
    expect_values(&[
        ("return 1;", Value::Integer(1)),
        (r#"if(true){return "x";}"#, Value::Str("x".into())),
        ("fn(){if(true){return true;};}();", Value::Boolean(true)),
    ]);
}

#[test]
fn results_render_through_inspect() {
    assert_eq!(run("1 + 2").inspect(), "3");
    assert_eq!(
        run("let one = 1 let two = one + one; one + two;").inspect(),
        "3"
    );
    assert_eq!(
        run("let f = fn(x){ if (x < 2) { return x } return f(x-1) + f(x-2) }; f(15)").inspect(),
        "610"
    );
    assert_eq!(
        run("let double = fn(x){ fn(){ return 2*x } }; double(1)()").inspect(),
        "2"
    );
    assert_eq!(run("[1,2,3][1]").inspect(), "2");
    assert_eq!(run("[][0]").inspect(), "null");
}

#[test]
fn globals_persist_across_session_runs() {
    let program = common::parse("let banana = 4; let apple = 3;");
    let mut compiler = Compiler::new();
    compiler.compile(&program).unwrap();

    let mut vm = Vm::new(compiler.bytecode());
    vm.run().unwrap();
    let globals = vm.into_globals();

    // Second input of the session: same symbol table, same constants, same
    // globals store.
    let (symbol_table, constants) = compiler.into_state();
    let mut compiler = Compiler::new_with_state(symbol_table, constants);
    let program = common::parse("banana * apple");
    compiler.compile(&program).unwrap();

    let mut vm = Vm::new_with_globals_store(compiler.bytecode(), globals);
    vm.run().unwrap();
    assert_eq!(vm.last_popped_stack_element(), Value::Integer(12));
}
