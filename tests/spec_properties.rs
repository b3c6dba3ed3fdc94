//! End-to-end coverage of the compiler's named testable properties
//! (spec.md §8 S1-S6), driven entirely through the public API: the JSON
//! wire format stands in for the out-of-scope parser/tokenizer, and
//! `compile_module`/`semantics::module::analyze` are exercised the way an
//! embedding caller would use them.

use covenant::ast::{Decl, Expr, ExprKind, FunctionDef, IterExpr, Literal, Stmt, StmtKind};
use covenant::errors::ErrorKind;
use covenant::namespace::Namespace;
use covenant::semantics::{self, Entity};
use covenant::span::FileSpan;
use covenant::symbol;
use covenant::types::Mutability;
use covenant::{compile_module, wire, CompilerConfig};

fn file() -> FileSpan { FileSpan::synthetic(std::rc::Rc::from("t.json")) }

/// S1 — bytecode prefix containment: the runtime body assembled on its own
/// appears verbatim inside the full deploy bytecode, and the ABI carries
/// exactly the one declared external function.
#[test]
fn s1_runtime_bytecode_is_contained_in_deploy_bytecode() {
  let json = r#"{
    "decls": [
      { "kind": "function", "name": "a", "external": true, "mutability": "view",
        "ret": { "kind": "name", "name": "bool" },
        "body": [ { "kind": "return", "values": [ { "kind": "bool_lit", "value": true } ] } ] }
    ]
  }"#;
  let module = wire::parse_module(json, &file()).unwrap();
  let config = CompilerConfig::new();
  let artifacts = compile_module(&module, &file(), &config).unwrap();

  let runtime = artifacts.runtime_bytecode();
  let deploy = artifacts.deploy_bytecode();
  assert!(
    deploy.windows(runtime.len()).any(|w| w == runtime),
    "runtime bytecode must appear verbatim inside the deploy bytecode"
  );

  assert_eq!(artifacts.abi_functions.len(), 1);
  assert_eq!(artifacts.abi_functions[0].name, symbol::intern("a"));
  assert!(artifacts.abi_functions[0].args.is_empty());
}

/// S2 — constant folding: `x: constant(uint256) = as_wei_value(5, "finney")
/// + as_wei_value(2, "babbage") + as_wei_value(8, "shannon")` resolves to a
/// literal during Phase 1, before codegen ever runs.
#[test]
fn s2_constant_folds_a_sum_of_as_wei_value_calls() {
  let json = r#"{
    "decls": [
      { "kind": "var", "name": "x", "ty": { "kind": "name", "name": "uint256" }, "modifier": "constant",
        "value": { "kind": "bin_op", "op": "add",
          "lhs": { "kind": "bin_op", "op": "add",
            "lhs": { "kind": "call", "func": { "kind": "name", "name": "as_wei_value" },
                     "args": [ { "kind": "int_lit", "value": 5 }, { "kind": "str_lit", "value": "finney" } ] },
            "rhs": { "kind": "call", "func": { "kind": "name", "name": "as_wei_value" },
                     "args": [ { "kind": "int_lit", "value": 2 }, { "kind": "str_lit", "value": "babbage" } ] }
          },
          "rhs": { "kind": "call", "func": { "kind": "name", "name": "as_wei_value" },
                   "args": [ { "kind": "int_lit", "value": 8 }, { "kind": "str_lit", "value": "shannon" } ] }
        }
      }
    ]
  }"#;
  let module = wire::parse_module(json, &file()).unwrap();

  let mut ns = Namespace::new();
  semantics::module::install_builtin_scope(&mut ns, &file()).unwrap();
  let analysis = semantics::module::analyze(&module, ns, &file()).unwrap();

  let Entity::Var { const_value, .. } = analysis.namespace.get(symbol::intern("x"), &file()).unwrap() else {
    panic!("expected a variable entity")
  };
  let expected = 5_000_000_000_000_000i128 + 2_000 + 8_000_000_000;
  assert_eq!(*const_value, Some(Literal::Int(expected)));
}

/// S3 — cyclic call rejection: two internal functions calling each other
/// fail compilation with `CallViolation`.
#[test]
fn s3_mutually_recursive_internal_calls_are_rejected() {
  let json = r#"{
    "decls": [
      { "kind": "function", "name": "ping", "body": [
        { "kind": "expr", "value": { "kind": "call", "func": { "kind": "name", "name": "pong" } } }
      ] },
      { "kind": "function", "name": "pong", "body": [
        { "kind": "expr", "value": { "kind": "call", "func": { "kind": "name", "name": "ping" } } }
      ] }
    ]
  }"#;
  let module = wire::parse_module(json, &file()).unwrap();
  let config = CompilerConfig::new();
  let err = compile_module(&module, &file(), &config).unwrap_err();
  assert!(matches!(err.kind, ErrorKind::CallViolation(_)), "{:?}", err.kind);
}

/// S4 — iteration safety: a for-loop over a storage array whose body calls
/// a function that writes into that same array is an `ImmutableViolation`
/// at the call site.
#[test]
fn s4_call_that_mutates_the_iterated_array_is_rejected() {
  let a = symbol::intern("a");

  let mutate = FunctionDef {
    span: file(), name: symbol::intern("mutate"), args: vec![], ret: None,
    external: false, mutability: Mutability::NonPayable, nonreentrant: None,
    body: vec![Stmt { span: file(), kind: StmtKind::Assign(
      Expr { span: file(), kind: ExprKind::Subscript(
        Box::new(Expr { span: file(), kind: ExprKind::Name(a) }),
        Box::new(Expr { span: file(), kind: ExprKind::Literal(Literal::Int(0)) }),
      ) },
      Expr { span: file(), kind: ExprKind::Literal(Literal::Int(1)) },
    ) }],
  };
  let iterate = FunctionDef {
    span: file(), name: symbol::intern("iterate"), args: vec![], ret: None,
    external: true, mutability: Mutability::NonPayable, nonreentrant: None,
    body: vec![Stmt { span: file(), kind: StmtKind::For {
      var: symbol::intern("x"),
      iter: IterExpr::Expr(Expr { span: file(), kind: ExprKind::Name(a) }),
      body: vec![Stmt { span: file(), kind: StmtKind::Expr(
        Expr { span: file(), kind: ExprKind::Call {
          func: Box::new(Expr { span: file(), kind: ExprKind::Name(symbol::intern("mutate")) }),
          args: vec![], kwargs: vec![],
        } },
      ) }],
    } }],
  };

  let module = covenant::ast::Module {
    decls: vec![
      Decl::Var(covenant::ast::ModuleVar {
        span: file(), name: a,
        ty: covenant::ast::TypeAnnNode::StaticArray(Box::new(covenant::ast::TypeAnnNode::Name(symbol::intern("uint256"))), 3),
        modifier: covenant::ast::VarModifier::Plain, public: false, value: None,
      }),
      Decl::Function(mutate),
      Decl::Function(iterate),
    ],
  };

  let config = CompilerConfig::new();
  let err = compile_module(&module, &file(), &config).unwrap_err();
  assert!(matches!(err.kind, ErrorKind::ImmutableViolation(_)), "{:?}", err.kind);
}

/// S5 — optimizer identity rules: each named `(before, after)` pair
/// rewrites to the same IR tree, exercised here through full compilation of
/// functions built around each identity rather than constructing IR by
/// hand (the per-rule unit tests in `optimizer.rs` cover the IR shapes
/// directly; this confirms the rules still fire end to end).
#[test]
fn s5_mul_by_32_and_mod_by_128_survive_full_compilation() {
  let json = r#"{
    "decls": [
      { "kind": "function", "name": "f", "external": true, "mutability": "view",
        "ret": { "kind": "name", "name": "uint256" },
        "args": [ { "name": "x", "ty": { "kind": "name", "name": "uint256" } } ],
        "body": [ { "kind": "return", "values": [
          { "kind": "bin_op", "op": "mod",
            "lhs": { "kind": "bin_op", "op": "mul", "lhs": { "kind": "name", "name": "x" }, "rhs": { "kind": "int_lit", "value": 32 } },
            "rhs": { "kind": "int_lit", "value": 128 } }
        ] } ] }
    ]
  }"#;
  let module = wire::parse_module(json, &file()).unwrap();
  let config = CompilerConfig::new();
  let artifacts = compile_module(&module, &file(), &config).unwrap();
  // `mul x 32` becomes `shl 5 x` and `mod _ 128` becomes `and 127 _`; the
  // optimizer must have fired at least those two rewrites.
  assert!(artifacts.optimizer_stats.rules_fired >= 2, "{:?}", artifacts.optimizer_stats);
}

/// A two-argument external function must read each argument from its own
/// calldata head word (`4 + 32*i`), not the same word for every argument
/// (spec.md §4.E) — regression coverage for the bug S1 alone can't catch,
/// since S1's one function takes no arguments at all.
#[test]
fn external_function_reads_each_argument_from_its_own_calldata_word() {
  let json = r#"{
    "decls": [
      { "kind": "function", "name": "f", "external": true, "mutability": "view",
        "ret": { "kind": "name", "name": "uint256" },
        "args": [
          { "name": "a", "ty": { "kind": "name", "name": "uint256" } },
          { "name": "b", "ty": { "kind": "name", "name": "uint256" } }
        ],
        "body": [ { "kind": "return", "values": [
          { "kind": "bin_op", "op": "sub", "lhs": { "kind": "name", "name": "a" }, "rhs": { "kind": "name", "name": "b" } }
        ] } ] }
    ]
  }"#;
  let module = wire::parse_module(json, &file()).unwrap();
  let config = CompilerConfig::new();
  let artifacts = compile_module(&module, &file(), &config).unwrap();
  let runtime = artifacts.runtime_bytecode();
  // CALLDATALOAD offset 36 (0x24) for the second argument must appear
  // somewhere in the runtime body as a pushed literal.
  assert!(runtime.windows(2).any(|w| w == [0x60, 0x24]), "{runtime:02x?}");
}

/// An `immutable` is assignable exactly once, from its own initializer, at
/// deploy time, and readable in the runtime body thereafter (spec.md §3
/// invariant (ii), §4.E).
#[test]
fn immutable_is_written_in_the_constructor_and_readable_in_the_runtime_body() {
  let json = r#"{
    "decls": [
      { "kind": "var", "name": "owner", "ty": { "kind": "name", "name": "uint256" }, "modifier": "immutable",
        "value": { "kind": "int_lit", "value": 42 } },
      { "kind": "function", "name": "get_owner", "external": true, "mutability": "view",
        "ret": { "kind": "name", "name": "uint256" },
        "body": [ { "kind": "return", "values": [ { "kind": "name", "name": "owner" } ] } ] }
    ]
  }"#;
  let module = wire::parse_module(json, &file()).unwrap();
  let config = CompilerConfig::new();
  let artifacts = compile_module(&module, &file(), &config).unwrap();

  // The deploy bytecode is longer than the runtime body by exactly the
  // immutables tail (one word here), since it's appended after the runtime
  // bytes are copied out.
  let runtime_len = artifacts.runtime_bytecode().len();
  let deploy_len = artifacts.deploy_bytecode().len();
  assert!(deploy_len > runtime_len, "deploy bytecode must carry the immutables tail");

  // The runtime body reads the immutable back via CODESIZE/CODECOPY rather
  // than a CALLDATALOAD or SLOAD — it has no storage slot and no argument.
  assert!(artifacts.runtime_bytecode().contains(&0x38), "expected a CODESIZE opcode (0x38)");
}

/// A declared `immutable` with no initializer is rejected at compile time
/// — there is no other assignment site for it (spec.md §4.C).
#[test]
fn immutable_with_no_initial_value_is_rejected() {
  let json = r#"{
    "decls": [
      { "kind": "var", "name": "owner", "ty": { "kind": "name", "name": "uint256" }, "modifier": "immutable" }
    ]
  }"#;
  let module = wire::parse_module(json, &file()).unwrap();
  let config = CompilerConfig::new();
  let err = compile_module(&module, &file(), &config).unwrap_err();
  assert!(matches!(err.kind, ErrorKind::StructureException(_)), "{:?}", err.kind);
}

/// S6 — static assertion: `assert False` is rejected at compile time with
/// `StaticAssertionException`, not silently compiled to a runtime revert.
#[test]
fn s6_assert_false_is_a_compile_time_error() {
  let json = r#"{
    "decls": [
      { "kind": "function", "name": "f", "body": [
        { "kind": "assert", "cond": { "kind": "bool_lit", "value": false } }
      ] }
    ]
  }"#;
  let module = wire::parse_module(json, &file()).unwrap();
  let config = CompilerConfig::new();
  let err = compile_module(&module, &file(), &config).unwrap_err();
  assert!(matches!(err.kind, ErrorKind::StaticAssertionException(_)), "{:?}", err.kind);
}
