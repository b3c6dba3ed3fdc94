//! Phase 1 (spec.md §4.C): the module-level visitor. Populates the module
//! [`Namespace`] from a [`Module`]'s declarations, tolerating any
//! declaration order by retrying unresolved entries until a full pass
//! makes no progress (SPEC_FULL.md §4.C supplement — this bounds the
//! Python host's informal "keep retrying forward references" loop).

use hashbrown::{HashMap, HashSet};
use crate::ast::{Decl, ImportedInterface, Module, VarModifier};
use crate::errors::{CovenantError, ErrorKind, ExceptionList, Result};
use crate::namespace::Namespace;
use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::types::ty::{EnumDef, InterfaceDef, InterfaceFunction, StructDef, Type};
use crate::types::{CodeKind, Location, TypeFlags};
use super::{Builtin, Entity, EventSig, FunctionSig};

/// The result of Phase 1: a populated namespace plus the function
/// declarations (kept alongside so Phase 2 doesn't need to re-scan
/// `module.decls` to find them).
pub struct ModuleAnalysis {
  pub namespace: Namespace<Entity>,
  pub functions: Vec<crate::ast::FunctionDef>,
}

/// Populate the builtin scope: builtin function names (SPEC_FULL.md §4.B
/// supplement). Wei-denomination units are resolved separately, by string
/// literal, in [`super::folding`] — they are not namespace entities. Does
/// not enter the module scope; callers enter it separately so Phase 2 can
/// still push block scopes beneath it.
pub fn install_builtin_scope(ns: &mut Namespace<Entity>, span: &FileSpan) -> Result<()> {
  ns.enter_builtin_scope(span)?;
  for &(name, b) in Builtin::all() {
    ns.set(crate::symbol::intern(name), Entity::Builtin(b), span)?;
  }
  Ok(())
}

/// Run Phase 1 over `module`, given a namespace whose builtin scope has
/// already been installed (see [`install_builtin_scope`]).
pub fn analyze(module: &Module, mut namespace: Namespace<Entity>, file: &FileSpan) -> Result<ModuleAnalysis> {
  namespace.enter_module_scope(file)?;

  let mut remaining: Vec<&Decl> = module.decls.iter().collect();
  let mut exceptions = ExceptionList::new();
  let mut functions = Vec::new();
  let mut selectors: HashMap<[u8; 4], Symbol> = HashMap::new();

  loop {
    let mut next_round = Vec::new();
    let mut made_progress = false;
    let mut round_errors = ExceptionList::new();

    for decl in remaining {
      match try_install(decl, &mut namespace, &mut selectors) {
        Ok(Some(f)) => { functions.push(f); made_progress = true; }
        Ok(None) => made_progress = true,
        Err(e) if is_retryable(&e) => { round_errors.push(e); next_round.push(decl); }
        Err(e) => return Err(e),
      }
    }

    if next_round.is_empty() { break }
    if !made_progress {
      exceptions.extend(round_errors.into_sorted());
      return Err(exceptions.into_sorted().into_iter().next()
        .unwrap_or_else(|| CovenantError::new(ErrorKind::CovenantInternalException("empty exception list".into()), file.clone())));
    }
    remaining = next_round;
  }

  check_call_graph(&functions, file)?;
  Ok(ModuleAnalysis { namespace, functions })
}

/// `UndeclaredDefinition` is the only kind Phase 1 treats as "try again
/// next round" — every other error kind (malformed annotation, duplicate
/// name, etc.) is a genuine defect in this declaration and reported
/// immediately.
fn is_retryable(err: &CovenantError) -> bool { matches!(err.kind, ErrorKind::UndeclaredDefinition(_)) }

fn try_install(
  decl: &Decl,
  ns: &mut Namespace<Entity>,
  selectors: &mut HashMap<[u8; 4], Symbol>,
) -> Result<Option<crate::ast::FunctionDef>> {
  match decl {
    Decl::Struct(def) => { install_struct(def, ns)?; Ok(None) }
    Decl::Enum(def) => { install_enum(def, ns)?; Ok(None) }
    Decl::Interface(def) => { install_interface(def, ns)?; Ok(None) }
    Decl::Event(def) => { install_event(def, ns)?; Ok(None) }
    Decl::Var(var) => { install_var(var, ns, selectors)?; Ok(None) }
    Decl::Function(f) => { install_function(f, ns, selectors)?; Ok(Some(f.clone())) }
    Decl::Import(import) => { install_import(import, ns)?; Ok(None) }
    Decl::Implements { span, interface } => { check_implements(*interface, ns, span)?; Ok(None) }
  }
}

/// Resolve a parsed type annotation against a namespace, following named
/// references (structs/enums/interfaces) through [`resolve_type_name`].
fn lookup_type(node: &crate::ast::TypeAnnNode, location: Location, ns: &Namespace<Entity>, span: &FileSpan) -> Result<Type> {
  Type::from_annotation(node, location, false, false, &mut |name, s| resolve_type_name(name, ns, s), span)
}

fn resolve_type_name(name: Symbol, ns: &Namespace<Entity>, span: &FileSpan) -> Result<Type> {
  match ns.get(name, span)? {
    Entity::Struct(d) => Ok(Type::Struct(d.clone())),
    Entity::Enum(d) => Ok(Type::Enum(d.clone())),
    Entity::Interface(d) => Ok(Type::Interface(d.clone())),
    _ => Err(CovenantError::new(ErrorKind::UnknownType(format!("'{name}' is not a type")), span.clone())),
  }
}

fn install_struct(def: &crate::ast::StructDef, ns: &mut Namespace<Entity>) -> Result<()> {
  let mut fields = Vec::with_capacity(def.fields.len());
  for (name, ann) in &def.fields {
    fields.push((*name, lookup_type(ann, Location::Memory, ns, &def.span)?));
  }
  let rc = std::rc::Rc::new(StructDef { name: def.name, fields });
  ns.set(def.name, Entity::Struct(rc), &def.span)
}

fn install_enum(def: &crate::ast::EnumDef, ns: &mut Namespace<Entity>) -> Result<()> {
  if def.members.len() > 256 {
    return Err(CovenantError::new(
      ErrorKind::StructureException(format!("enum '{}' has more than 256 members", def.name)), def.span.clone()));
  }
  let mut seen = HashSet::new();
  for &m in &def.members {
    if !seen.insert(m) {
      return Err(CovenantError::new(
        ErrorKind::NamespaceCollision(format!("duplicate enum member '{m}'")), def.span.clone()));
    }
  }
  let rc = std::rc::Rc::new(EnumDef { name: def.name, members: def.members.clone() });
  ns.set(def.name, Entity::Enum(rc), &def.span)
}

fn install_interface(def: &crate::ast::InterfaceDef, ns: &mut Namespace<Entity>) -> Result<()> {
  let mut functions = Vec::with_capacity(def.functions.len());
  for f in &def.functions {
    let args = f.args.iter().map(|a| lookup_type(a, Location::Calldata, ns, &def.span)).collect::<Result<_>>()?;
    let ret = f.ret.as_ref().map(|r| lookup_type(r, Location::Memory, ns, &def.span)).transpose()?;
    functions.push(InterfaceFunction { name: f.name, args, ret, mutability: f.mutability });
  }
  let rc = std::rc::Rc::new(InterfaceDef { name: def.name, functions });
  ns.set(def.name, Entity::Interface(rc), &def.span)
}

fn install_event(def: &crate::ast::EventDef, ns: &mut Namespace<Entity>) -> Result<()> {
  let mut indexed_count = 0u8;
  let mut fields = Vec::with_capacity(def.fields.len());
  for f in &def.fields {
    if f.indexed { indexed_count += 1 }
    fields.push((f.name, lookup_type(&f.ty, Location::Memory, ns, &def.span)?, f.indexed));
  }
  if indexed_count > 3 {
    return Err(CovenantError::new(
      ErrorKind::EventDeclarationException(format!("event '{}' has more than 3 indexed fields", def.name)), def.span.clone()));
  }
  let rc = std::rc::Rc::new(EventSig { name: def.name, fields });
  ns.set(def.name, Entity::Event(rc), &def.span)
}

fn install_var(var: &crate::ast::ModuleVar, ns: &mut Namespace<Entity>, selectors: &mut HashMap<[u8; 4], Symbol>) -> Result<()> {
  let location = match var.modifier {
    VarModifier::Plain => Location::Storage,
    VarModifier::Constant => Location::Code(CodeKind::Data),
    VarModifier::Immutable => Location::Code(CodeKind::Immutable),
  };
  let ty = lookup_type(&var.ty, location, ns, &var.span)?;
  if matches!(ty, Type::Mapping(..)) && var.modifier != VarModifier::Plain {
    return Err(CovenantError::new(
      ErrorKind::InvalidType("HashMap cannot be constant or immutable".into()), var.span.clone()));
  }
  let mut flags = TypeFlags::empty();
  if var.modifier == VarModifier::Constant { flags |= TypeFlags::CONSTANT; }
  if var.modifier == VarModifier::Immutable { flags |= TypeFlags::IMMUTABLE; }
  if var.public { flags |= TypeFlags::PUBLIC; }
  if var.public {
    register_selector(var.name, &[], &ty, selectors, &var.span)?;
  }
  let const_value = if var.modifier == VarModifier::Constant {
    let Some(value) = &var.value else {
      return Err(CovenantError::new(
        ErrorKind::StructureException(format!("constant '{}' has no initial value", var.name)), var.span.clone()));
    };
    // spec.md §3 invariant (iii): `is_constant` implies a literal or a
    // closed expression of literals.
    let lit = super::folding::const_eval(value, ns).ok_or_else(|| CovenantError::new(
      ErrorKind::StructureException(format!("constant '{}' is not a literal or a closed expression of literals", var.name)),
      var.span.clone()))?;
    Some(lit)
  } else {
    // `immutable` records a pending initial-assignment requirement instead
    // (spec.md §4.C): unlike `constant`, its value need not fold to a
    // literal (codegen compiles it fresh into the constructor), but it must
    // have one — there is no other assignment site for it.
    if var.modifier == VarModifier::Immutable && var.value.is_none() {
      return Err(CovenantError::new(
        ErrorKind::StructureException(format!("immutable '{}' has no initial value", var.name)), var.span.clone()));
    }
    None
  };
  ns.set(var.name, Entity::Var { ty, location, flags, const_value }, &var.span)
}

fn install_function(f: &crate::ast::FunctionDef, ns: &mut Namespace<Entity>, selectors: &mut HashMap<[u8; 4], Symbol>) -> Result<()> {
  let mut args = Vec::with_capacity(f.args.len());
  for a in &f.args {
    args.push((a.name, lookup_type(&a.ty, Location::Calldata, ns, &f.span)?));
  }
  let ret = f.ret.as_ref().map(|r| lookup_type(r, Location::Memory, ns, &f.span)).transpose()?;
  if let Some(key) = &f.nonreentrant {
    if key.is_empty() {
      return Err(CovenantError::new(
        ErrorKind::FunctionDeclarationException("nonreentrant key must not be empty".into()), f.span.clone()));
    }
  }
  if f.external {
    register_selector(f.name, &args.iter().map(|(_, t)| t.clone()).collect::<Vec<_>>(), &Type::Tuple(vec![]), selectors, &f.span)?;
  }
  let sig = FunctionSig { name: f.name, args, ret, external: f.external, mutability: f.mutability, nonreentrant_key: f.nonreentrant.clone() };
  ns.set(f.name, Entity::Function(std::rc::Rc::new(sig)), &f.span)
}

fn register_selector(name: Symbol, arg_types: &[Type], _placeholder: &Type, selectors: &mut HashMap<[u8; 4], Symbol>, span: &FileSpan) -> Result<()> {
  let sig = format!("{}({})", name, arg_types.iter().map(crate::types::abi::selector_name).collect::<Vec<_>>().join(","));
  let id = crate::types::abi::method_id(&sig);
  if let Some(prev) = selectors.insert(id, name) {
    if prev != name {
      return Err(CovenantError::new(
        ErrorKind::NamespaceCollision(format!("'{name}' and '{prev}' produce the same 4-byte selector")), span.clone()));
    }
  }
  Ok(())
}

fn install_import(import: &crate::ast::Import, ns: &mut Namespace<Entity>) -> Result<()> {
  let functions = match &import.interface {
    ImportedInterface::Source(def) => {
      def.functions.iter().map(|f| {
        let args = f.args.iter().map(|a| lookup_type(a, Location::Calldata, ns, &def.span)).collect::<Result<Vec<_>>>()?;
        let ret = f.ret.as_ref().map(|r| lookup_type(r, Location::Memory, ns, &def.span)).transpose()?;
        Ok(InterfaceFunction { name: f.name, args, ret, mutability: f.mutability })
      }).collect::<Result<Vec<_>>>()?
    }
    ImportedInterface::Abi(decls) => {
      decls.iter().map(|f| {
        let args = f.args.iter().map(|a| lookup_type(a, Location::Calldata, ns, &import.span)).collect::<Result<Vec<_>>>()?;
        let ret = f.rets.first().map(|r| lookup_type(r, Location::Memory, ns, &import.span)).transpose()?;
        Ok(InterfaceFunction { name: f.name, args, ret, mutability: f.mutability })
      }).collect::<Result<Vec<_>>>()?
    }
  };
  let rc = std::rc::Rc::new(InterfaceDef { name: import.name, functions });
  ns.set(import.name, Entity::Interface(rc), &import.span)
}

fn check_implements(interface: Symbol, ns: &Namespace<Entity>, span: &FileSpan) -> Result<()> {
  let Entity::Interface(def) = ns.get(interface, span)? else {
    return Err(CovenantError::new(ErrorKind::InterfaceViolation(format!("'{interface}' is not an interface")), span.clone()));
  };
  for want in &def.functions {
    let Ok(Entity::Function(have)) = ns.get(want.name, span) else {
      return Err(CovenantError::new(
        ErrorKind::InterfaceViolation(format!("missing implementation of '{}' required by '{interface}'", want.name)),
        span.clone()));
    };
    let args_ok = have.args.len() == want.args.len()
      && have.args.iter().zip(&want.args).all(|((_, a), b)| a.compare_type(b));
    let ret_ok = match (&have.ret, &want.ret) {
      (Some(a), Some(b)) => a.compare_type(b),
      (None, None) => true,
      _ => false,
    };
    if !args_ok || !ret_ok {
      return Err(CovenantError::new(
        ErrorKind::InterfaceViolation(format!("'{}' does not match the signature required by '{interface}'", want.name)),
        span.clone()));
    }
  }
  Ok(())
}

/// DFS cycle detection over the internal (non-external-call) call graph
/// (spec.md §4.C): a function that can reach itself through a chain of
/// internal calls is rejected with *CallViolation* naming every function
/// on the cycle.
fn check_call_graph(functions: &[crate::ast::FunctionDef], file: &FileSpan) -> Result<()> {
  let by_name: HashMap<Symbol, &crate::ast::FunctionDef> = functions.iter().map(|f| (f.name, f)).collect();
  let mut visiting = HashSet::new();
  let mut done = HashSet::new();

  for f in functions {
    if !done.contains(&f.name) {
      dfs(f.name, &by_name, &mut visiting, &mut done, &mut Vec::new(), file)?;
    }
  }
  Ok(())
}

fn dfs(
  name: Symbol,
  by_name: &HashMap<Symbol, &crate::ast::FunctionDef>,
  visiting: &mut HashSet<Symbol>,
  done: &mut HashSet<Symbol>,
  stack: &mut Vec<Symbol>,
  file: &FileSpan,
) -> Result<()> {
  if visiting.contains(&name) {
    let cycle_start = stack.iter().position(|&s| s == name).unwrap_or(0);
    let cycle = stack[cycle_start..].to_vec();
    return Err(CovenantError::new(
      ErrorKind::CallViolation(format!("recursive internal call cycle: {}", names_joined(&cycle))), file.clone()));
  }
  let Some(def) = by_name.get(&name) else { return Ok(()) };
  visiting.insert(name);
  stack.push(name);
  for callee in called_functions(def) {
    if by_name.contains_key(&callee) {
      dfs(callee, by_name, visiting, done, stack, file)?;
    }
  }
  stack.pop();
  visiting.remove(&name);
  done.insert(name);
  Ok(())
}

fn names_joined(names: &[Symbol]) -> String {
  names.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> ")
}

pub(crate) fn called_functions(def: &crate::ast::FunctionDef) -> Vec<Symbol> {
  let mut out = Vec::new();
  for stmt in &def.body { collect_calls_stmt(stmt, &mut out); }
  out
}

fn collect_calls_stmt(stmt: &crate::ast::Stmt, out: &mut Vec<Symbol>) {
  use crate::ast::StmtKind::*;
  match &stmt.kind {
    Expr(e) | Assign(_, e) | AugAssign(_, _, e) => collect_calls_expr(e, out),
    AnnAssign { value: Some(e), .. } => collect_calls_expr(e, out),
    AnnAssign { value: None, .. } | Pass | Break | Continue | Raise(_) => {}
    If { cond, then, els } => { collect_calls_expr(cond, out); then.iter().for_each(|s| collect_calls_stmt(s, out)); els.iter().for_each(|s| collect_calls_stmt(s, out)); }
    For { body, .. } => body.iter().for_each(|s| collect_calls_stmt(s, out)),
    Return(exprs) => exprs.iter().for_each(|e| collect_calls_expr(e, out)),
    Assert { cond, .. } => collect_calls_expr(cond, out),
    Log { args, .. } => args.iter().for_each(|e| collect_calls_expr(e, out)),
  }
}

fn collect_calls_expr(expr: &crate::ast::Expr, out: &mut Vec<Symbol>) {
  use crate::ast::ExprKind::*;
  match &expr.kind {
    Call { func, args, kwargs } => {
      if let Name(n) = &func.kind { out.push(*n) }
      args.iter().for_each(|e| collect_calls_expr(e, out));
      kwargs.iter().for_each(|(_, e)| collect_calls_expr(e, out));
    }
    Attribute(e, _) | Subscript(e, _) | UnaryOp(_, e) => collect_calls_expr(e, out),
    BinOp(_, a, b) | Compare(_, a, b) => { collect_calls_expr(a, out); collect_calls_expr(b, out); }
    BoolOp(_, es) | List(es) | Tuple(es) => es.iter().for_each(|e| collect_calls_expr(e, out)),
    Ternary { cond, then, other } => { collect_calls_expr(cond, out); collect_calls_expr(then, out); collect_calls_expr(other, out); }
    StructLit(_, fields) => fields.iter().for_each(|(_, e)| collect_calls_expr(e, out)),
    Literal(_) | Name(_) => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::*;
  use std::rc::Rc;

  fn span() -> FileSpan { FileSpan::synthetic(Rc::from("t.cov")) }

  fn fresh_ns() -> Namespace<Entity> {
    let mut ns = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    ns
  }

  #[test]
  fn forward_referenced_struct_type_resolves_on_retry() {
    let module = Module {
      decls: vec![
        Decl::Var(ModuleVar {
          span: span(), name: crate::symbol::intern("p"), ty: TypeAnnNode::Name(crate::symbol::intern("Point")),
          modifier: VarModifier::Plain, public: false, value: None,
        }),
        Decl::Struct(StructDef {
          span: span(), name: crate::symbol::intern("Point"),
          fields: vec![(crate::symbol::intern("x"), TypeAnnNode::Name(crate::symbol::intern("uint256")))],
        }),
      ],
    };
    let result = analyze(&module, fresh_ns(), &span());
    assert!(result.is_ok(), "{:?}", result.err());
  }

  #[test]
  fn directly_recursive_internal_call_is_rejected() {
    let f = FunctionDef {
      span: span(), name: crate::symbol::intern("loop"), args: vec![], ret: None, external: false,
      mutability: crate::types::Mutability::NonPayable, nonreentrant: None,
      body: vec![Stmt { span: span(), kind: StmtKind::Expr(Expr {
        span: span(), kind: ExprKind::Call { func: Box::new(Expr { span: span(), kind: ExprKind::Name(crate::symbol::intern("loop")) }), args: vec![], kwargs: vec![] },
      }) }],
    };
    let module = Module { decls: vec![Decl::Function(f)] };
    let result = analyze(&module, fresh_ns(), &span());
    assert!(result.is_err());
  }

  #[test]
  fn duplicate_selector_across_two_public_functions_is_rejected() {
    let make_fn = |name: &str| FunctionDef {
      span: span(), name: crate::symbol::intern(name), args: vec![], ret: None, external: true,
      mutability: crate::types::Mutability::NonPayable, nonreentrant: None, body: vec![],
    };
    // Two different names will not collide in practice; this test exercises
    // that installing the *same* function twice is caught as a namespace
    // collision (the realistic case a parser could produce from a buggy
    // duplicate top-level def).
    let module = Module { decls: vec![Decl::Function(make_fn("transfer")), Decl::Function(make_fn("transfer"))] };
    let result = analyze(&module, fresh_ns(), &span());
    assert!(result.is_err());
  }

  fn as_wei_value_call(amount: i128, unit: &str) -> Expr {
    Expr { span: span(), kind: ExprKind::Call {
      func: Box::new(Expr { span: span(), kind: ExprKind::Name(crate::symbol::intern("as_wei_value")) }),
      args: vec![
        Expr { span: span(), kind: ExprKind::Literal(Literal::Int(amount)) },
        Expr { span: span(), kind: ExprKind::Literal(Literal::Str(unit.to_string())) },
      ],
      kwargs: vec![],
    } }
  }

  /// spec.md §8 S2: Phase 1 assigns a `constant(uint256)` variable the
  /// literal sum of its `as_wei_value` terms.
  #[test]
  fn constant_variable_folds_as_wei_value_sum_at_install_time() {
    let x = crate::symbol::intern("x");
    let value = Expr { span: span(), kind: ExprKind::BinOp(
      crate::ast::BinOp::Add,
      Box::new(Expr { span: span(), kind: ExprKind::BinOp(
        crate::ast::BinOp::Add,
        Box::new(as_wei_value_call(5, "finney")),
        Box::new(as_wei_value_call(2, "babbage")),
      ) }),
      Box::new(as_wei_value_call(8, "shannon")),
    ) };
    let module = Module { decls: vec![Decl::Var(ModuleVar {
      span: span(), name: x, ty: TypeAnnNode::Name(crate::symbol::intern("uint256")),
      modifier: VarModifier::Constant, public: false, value: Some(value),
    })] };

    let analysis = analyze(&module, fresh_ns(), &span()).unwrap();
    let Entity::Var { const_value, .. } = analysis.namespace.get(x, &span()).unwrap() else { panic!("expected a variable entity") };
    let expected = 5_000_000_000_000_000i128 + 2_000 + 8_000_000_000;
    assert_eq!(*const_value, Some(Literal::Int(expected)));
  }

  #[test]
  fn constant_variable_without_a_foldable_initializer_is_rejected() {
    let module = Module { decls: vec![Decl::Var(ModuleVar {
      span: span(), name: crate::symbol::intern("y"), ty: TypeAnnNode::Name(crate::symbol::intern("uint256")),
      modifier: VarModifier::Constant, public: false, value: None,
    })] };
    let result = analyze(&module, fresh_ns(), &span());
    assert!(result.is_err());
  }
}
