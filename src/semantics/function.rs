//! Phase 2 (spec.md §4.C): the function-level visitor. Type-checks a
//! function body against its already-installed signature, and enforces
//! the checks that only make sense with a full body in view: terminus
//! checking, mutability/environment-access rules, and `for`-loop safe-
//! iteration (SPEC_FULL.md §4.C supplement).

use crate::ast::{BinOp, Expr, ExprKind, FunctionDef, IterExpr, Literal, Stmt, StmtKind};
use crate::errors::{CovenantError, ErrorKind, Result};
use crate::namespace::Namespace;
use crate::span::FileSpan;
use crate::types::{Location, Mutability};
use super::annotate::infer;
use super::Entity;

/// Per-function checking entry point. Binds arguments into a fresh block
/// scope, walks the body, and verifies the function's terminus obligation
/// if it declares a return type. `all_functions` is the whole module's
/// function list, needed only to trace internal calls for the
/// iteration-safety check (SPEC_FULL.md §4.C supplement).
pub fn check_function(f: &FunctionDef, ns: &mut Namespace<Entity>, all_functions: &[FunctionDef]) -> Result<()> {
  let sig_args = {
    let Entity::Function(sig) = ns.get(f.name, &f.span)? else {
      return Err(CovenantError::new(ErrorKind::CovenantInternalException("function entity missing".into()), f.span.clone()));
    };
    sig.clone()
  };

  let depth = ns.enter_scope(&f.span)?;
  for (name, ty) in &sig_args.args {
    ns.set(*name, Entity::Var { ty: ty.clone(), location: Location::Calldata, flags: crate::types::TypeFlags::empty(), const_value: None }, &f.span)?;
  }

  let mut visitor = FunctionVisitor { mutability: sig_args.mutability, ns, all_functions };
  let result = visitor.check_block(&f.body);
  visitor.ns.exit_scope(depth);
  result?;

  if sig_args.ret.is_some() && !terminates(&f.body) {
    return Err(CovenantError::new(
      ErrorKind::FunctionDeclarationException(format!("function '{}' does not return on every path", f.name)), f.span.clone()));
  }
  Ok(())
}

struct FunctionVisitor<'a, 'ns> {
  mutability: Mutability,
  ns: &'ns mut Namespace<Entity>,
  all_functions: &'a [FunctionDef],
}

impl FunctionVisitor<'_, '_> {
  fn check_block(&mut self, body: &[Stmt]) -> Result<()> {
    for stmt in body { self.check_stmt(stmt)?; }
    Ok(())
  }

  fn check_stmt(&mut self, stmt: &Stmt) -> Result<()> {
    match &stmt.kind {
      StmtKind::Expr(e) => { self.check_call_mutability(e)?; infer(e, self.ns, None)?; Ok(()) }
      StmtKind::Assign(target, value) => {
        self.check_assignment_target(target)?;
        let target_ty = infer(target, self.ns, None)?;
        infer(value, self.ns, Some(&target_ty))?;
        Ok(())
      }
      StmtKind::AugAssign(op, target, value) => {
        self.check_assignment_target(target)?;
        let target_ty = infer(target, self.ns, None)?;
        target_ty.validate_numeric_op(*op, &stmt.span)?;
        infer(value, self.ns, Some(&target_ty))?;
        Ok(())
      }
      StmtKind::AnnAssign { name, ty, value } => {
        let declared = crate::types::ty::Type::from_annotation(
          ty, Location::Memory, false, false,
          &mut |n, sp| self.ns.get(n, sp).and_then(|e| entity_as_type(e, sp)), &stmt.span)?;
        if let Some(v) = value { infer(v, self.ns, Some(&declared))?; }
        self.ns.set(*name, Entity::Var { ty: declared, location: Location::Memory, flags: crate::types::TypeFlags::empty(), const_value: None }, &stmt.span)
      }
      StmtKind::If { cond, then, els } => {
        infer(cond, self.ns, Some(&crate::types::ty::Type::Bool))?;
        let depth = self.ns.enter_scope(&stmt.span)?;
        let r1 = self.check_block(then);
        self.ns.exit_scope(depth);
        r1?;
        let depth = self.ns.enter_scope(&stmt.span)?;
        let r2 = self.check_block(els);
        self.ns.exit_scope(depth);
        r2
      }
      StmtKind::For { var, iter, body } => {
        let elem_ty = self.check_iterable(iter, &stmt.span)?;
        if let IterExpr::Expr(e) = iter {
          if let ExprKind::Name(name) = &e.kind {
            if let Ok(Entity::Var { location: Location::Storage, .. }) = self.ns.get(*name, &stmt.span) {
              self.check_no_mutation_during_iteration(*name, body)?;
            }
          }
        }
        let depth = self.ns.enter_scope(&stmt.span)?;
        self.ns.set(*var, Entity::Var { ty: elem_ty, location: Location::Memory, flags: crate::types::TypeFlags::empty(), const_value: None }, &stmt.span)?;
        let r = self.check_block(body);
        self.ns.exit_scope(depth);
        r
      }
      StmtKind::Return(exprs) => {
        for e in exprs { infer(e, self.ns, None)?; }
        Ok(())
      }
      StmtKind::Pass | StmtKind::Break | StmtKind::Continue => Ok(()),
      StmtKind::Assert { cond, .. } => {
        infer(cond, self.ns, Some(&crate::types::ty::Type::Bool))?;
        if let ExprKind::Literal(Literal::Bool(false)) = &cond.kind {
          return Err(CovenantError::new(
            ErrorKind::StaticAssertionException("assert False always fails".into()), stmt.span.clone()));
        }
        Ok(())
      }
      StmtKind::Raise(_) => Ok(()),
      StmtKind::Log { event, args } => {
        let Entity::Event(sig) = self.ns.get(*event, &stmt.span)? else {
          return Err(CovenantError::new(ErrorKind::EventDeclarationException(format!("'{event}' is not an event")), stmt.span.clone()));
        };
        if args.len() != sig.fields.len() {
          return Err(CovenantError::new(
            ErrorKind::ArgumentException(format!("event '{event}' expects {} arguments", sig.fields.len())), stmt.span.clone()));
        }
        let expected: Vec<_> = sig.fields.iter().map(|(_, t, _)| t.clone()).collect();
        for (arg, want) in args.iter().zip(&expected) { infer(arg, self.ns, Some(want))?; }
        if self.mutability == Mutability::Pure || self.mutability == Mutability::View {
          return Err(CovenantError::new(
            ErrorKind::StateAccessViolation("log statements require a non-view, non-pure function".into()), stmt.span.clone()));
        }
        Ok(())
      }
    }
  }

  fn check_assignment_target(&self, target: &Expr) -> Result<()> {
    if let ExprKind::Name(name) = &target.kind {
      if let Ok(Entity::Var { flags, .. }) = self.ns.get(*name, &target.span) {
        if flags.contains(crate::types::TypeFlags::CONSTANT) {
          return Err(CovenantError::new(ErrorKind::ConstancyViolation(format!("'{name}' is constant")), target.span.clone()));
        }
        if flags.contains(crate::types::TypeFlags::IMMUTABLE) {
          return Err(CovenantError::new(ErrorKind::ImmutableViolation(format!("'{name}' is immutable outside the constructor")), target.span.clone()));
        }
      }
    }
    self.check_state_write_mutability(target)
  }

  /// `view`/`pure` functions may not assign to storage (spec.md §4.C).
  fn check_state_write_mutability(&self, target: &Expr) -> Result<()> {
    if self.mutability != Mutability::View && self.mutability != Mutability::Pure { return Ok(()) }
    if let ExprKind::Name(name) = &target.kind {
      if let Ok(Entity::Var { location: Location::Storage, .. }) = self.ns.get(*name, &target.span) {
        return Err(CovenantError::new(
          ErrorKind::StateAccessViolation(format!("{:?} function cannot write storage variable '{name}'", self.mutability)),
          target.span.clone()));
      }
    }
    Ok(())
  }

  /// Internal calls must respect the caller's mutability ceiling (spec.md
  /// §4.C): a `view` function may only call `pure`/`view` callees, `pure`
  /// may only call `pure`.
  fn check_call_mutability(&self, expr: &Expr) -> Result<()> {
    if let ExprKind::Call { func, .. } = &expr.kind {
      if let ExprKind::Name(name) = &func.kind {
        if let Ok(Entity::Function(sig)) = self.ns.get(*name, &expr.span) {
          if !self.mutability.may_call(sig.mutability) {
            return Err(CovenantError::new(
              ErrorKind::CallViolation(format!("{:?} function cannot call {:?} function '{name}'", self.mutability, sig.mutability)),
              expr.span.clone()));
          }
        }
      }
    }
    Ok(())
  }

  /// Safe-iteration checks for `for` loops (SPEC_FULL.md §4.C supplement):
  /// a `range(a, b)` bound must be two compile-time-constant literals, or
  /// `range(x, x + const)` with syntactically identical bases and a
  /// positive constant offset; a bare array/bytes/string iterates its
  /// declared bound.
  fn check_iterable(&mut self, iter: &IterExpr, span: &FileSpan) -> Result<crate::types::ty::Type> {
    use crate::types::ty::Type;
    match iter {
      IterExpr::Expr(e) => {
        let t = infer(e, self.ns, None)?;
        match &t {
          Type::DynArray(elem, _) | Type::StaticArray(elem, _) => Ok((**elem).clone()),
          _ => Err(CovenantError::new(ErrorKind::IteratorException("for loop requires an array-typed iterable".into()), span.clone())),
        }
      }
      IterExpr::List(items) => {
        for item in items { infer(item, self.ns, None)?; }
        items.first().map_or(Ok(Type::Bool), |i| infer(i, self.ns, None))
      }
      IterExpr::Range1(bound) => {
        require_literal_nonneg(bound, span)?;
        Ok(Type::Int(crate::types::prim::IntTy::U256))
      }
      IterExpr::Range2(lo, hi) => {
        require_literal_nonneg(lo, span)?;
        require_literal_nonneg(hi, span)?;
        Ok(Type::Int(crate::types::prim::IntTy::U256))
      }
      IterExpr::RangeOffset { base, konst } => {
        if *konst == 0 {
          return Err(CovenantError::new(ErrorKind::IteratorException("range offset must be positive".into()), span.clone()));
        }
        infer(base, self.ns, None)?;
        Ok(Type::Int(crate::types::prim::IntTy::U256))
      }
    }
  }

  /// Reject a loop body that writes `target`, directly or through an
  /// internal call (spec.md §8 S4): the storage array being iterated must
  /// not change length or contents mid-loop.
  fn check_no_mutation_during_iteration(&self, target: crate::symbol::Symbol, body: &[Stmt]) -> Result<()> {
    for stmt in body { self.check_stmt_no_mutation(target, stmt)?; }
    Ok(())
  }

  fn check_stmt_no_mutation(&self, target: crate::symbol::Symbol, stmt: &Stmt) -> Result<()> {
    match &stmt.kind {
      StmtKind::Assign(t, v) | StmtKind::AugAssign(_, t, v) => {
        if storage_write_root(t) == Some(target) {
          return Err(CovenantError::new(
            ErrorKind::ImmutableViolation(format!("'{target}' is mutated while being iterated")), stmt.span.clone()));
        }
        self.check_expr_no_mutation(target, v, &stmt.span)
      }
      StmtKind::Expr(e) => self.check_expr_no_mutation(target, e, &stmt.span),
      StmtKind::If { then, els, .. } => {
        self.check_no_mutation_during_iteration(target, then)?;
        self.check_no_mutation_during_iteration(target, els)
      }
      StmtKind::For { body, .. } => self.check_no_mutation_during_iteration(target, body),
      StmtKind::Return(exprs) => exprs.iter().try_for_each(|e| self.check_expr_no_mutation(target, e, &stmt.span)),
      StmtKind::Log { args, .. } => args.iter().try_for_each(|e| self.check_expr_no_mutation(target, e, &stmt.span)),
      StmtKind::AnnAssign { value: Some(v), .. } => self.check_expr_no_mutation(target, v, &stmt.span),
      StmtKind::AnnAssign { value: None, .. } | StmtKind::Pass | StmtKind::Break
      | StmtKind::Continue | StmtKind::Assert { .. } | StmtKind::Raise(_) => Ok(()),
    }
  }

  fn check_expr_no_mutation(&self, target: crate::symbol::Symbol, expr: &Expr, span: &FileSpan) -> Result<()> {
    if let ExprKind::Call { func, .. } = &expr.kind {
      if let ExprKind::Name(callee) = &func.kind {
        let mut visited = hashbrown::HashSet::new();
        if function_writes_storage_var(*callee, target, self.all_functions, &mut visited) {
          return Err(CovenantError::new(
            ErrorKind::ImmutableViolation(format!("call to '{callee}' mutates '{target}' while it is being iterated")),
            span.clone()));
        }
      }
    }
    Ok(())
  }
}

/// `true` if `name` (or, transitively, anything it calls internally)
/// writes directly to storage variable `target`.
fn function_writes_storage_var(
  name: crate::symbol::Symbol,
  target: crate::symbol::Symbol,
  all_functions: &[FunctionDef],
  visited: &mut hashbrown::HashSet<crate::symbol::Symbol>,
) -> bool {
  if !visited.insert(name) { return false }
  let Some(def) = all_functions.iter().find(|f| f.name == name) else { return false };
  if body_writes_directly(&def.body, target) { return true }
  super::module::called_functions(def).into_iter().any(|callee| function_writes_storage_var(callee, target, all_functions, visited))
}

fn body_writes_directly(body: &[Stmt], target: crate::symbol::Symbol) -> bool {
  body.iter().any(|s| match &s.kind {
    StmtKind::Assign(t, _) | StmtKind::AugAssign(_, t, _) => storage_write_root(t) == Some(target),
    StmtKind::If { then, els, .. } => body_writes_directly(then, target) || body_writes_directly(els, target),
    StmtKind::For { body, .. } => body_writes_directly(body, target),
    _ => false,
  })
}

/// The storage variable a (possibly indexed/field) assignment target
/// ultimately writes through, e.g. `a[i]` and `a` both root at `a`.
fn storage_write_root(target: &Expr) -> Option<crate::symbol::Symbol> {
  match &target.kind {
    ExprKind::Name(n) => Some(*n),
    ExprKind::Subscript(base, _) | ExprKind::Attribute(base, _) => storage_write_root(base),
    _ => None,
  }
}

fn require_literal_nonneg(e: &Expr, span: &FileSpan) -> Result<()> {
  match &e.kind {
    ExprKind::Literal(crate::ast::Literal::Int(v)) if *v >= 0 => Ok(()),
    _ => Err(CovenantError::new(
      ErrorKind::IteratorException("for-loop range bounds must be non-negative compile-time constants".into()), span.clone())),
  }
}

fn entity_as_type(e: &Entity, span: &FileSpan) -> Result<crate::types::ty::Type> {
  match e {
    Entity::Struct(d) => Ok(crate::types::ty::Type::Struct(d.clone())),
    Entity::Enum(d) => Ok(crate::types::ty::Type::Enum(d.clone())),
    Entity::Interface(d) => Ok(crate::types::ty::Type::Interface(d.clone())),
    _ => Err(CovenantError::new(ErrorKind::UnknownType("not a type name".into()), span.clone())),
  }
}

/// `true` if every control-flow path through `body` ends in `return` or an
/// unconditional `raise`/`assert False`/`selfdestruct` call (spec.md §4.C
/// terminus checking).
#[must_use] pub fn terminates(body: &[Stmt]) -> bool {
  match body.last() {
    None => false,
    Some(stmt) => match &stmt.kind {
      StmtKind::Return(_) | StmtKind::Raise(_) => true,
      StmtKind::If { then, els, .. } => !els.is_empty() && terminates(then) && terminates(els),
      StmtKind::Expr(Expr { kind: ExprKind::Call { func, .. }, .. }) => matches!(&func.kind, ExprKind::Name(n) if crate::symbol::resolve(*n) == "selfdestruct"),
      _ => false,
    },
  }
}

/// Unused in the present codegen but kept aligned with spec.md §4.A's
/// arithmetic/boolean split: a tiny helper future call sites can use to
/// validate an augmented-assignment operator without re-deriving it.
#[must_use] pub fn is_arithmetic_aug_op(op: BinOp) -> bool { !matches!(op, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor) }

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::*;
  use crate::semantics::module::install_builtin_scope;

  fn span() -> FileSpan { FileSpan::synthetic(std::rc::Rc::from("t.cov")) }

  #[test]
  fn function_without_trailing_return_is_rejected_when_a_return_type_is_declared() {
    let mut ns: Namespace<Entity> = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    ns.enter_module_scope(&span()).unwrap();
    let sig = super::super::FunctionSig {
      name: crate::symbol::intern("f"), args: vec![], ret: Some(crate::types::ty::Type::Bool),
      external: false, mutability: Mutability::View, nonreentrant_key: None,
    };
    ns.set(crate::symbol::intern("f"), Entity::Function(std::rc::Rc::new(sig)), &span()).unwrap();
    let f = FunctionDef {
      span: span(), name: crate::symbol::intern("f"), args: vec![], ret: Some(TypeAnnNode::Name(crate::symbol::intern("bool"))),
      external: false, mutability: Mutability::View, nonreentrant: None,
      body: vec![Stmt { span: span(), kind: StmtKind::Pass }],
    };
    assert!(check_function(&f, &mut ns, &[]).is_err());
  }

  #[test]
  fn view_function_cannot_write_storage() {
    let mut ns: Namespace<Entity> = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    ns.enter_module_scope(&span()).unwrap();
    let x = crate::symbol::intern("x");
    ns.set(x, Entity::Var { ty: crate::types::ty::Type::Bool, location: Location::Storage, flags: crate::types::TypeFlags::empty(), const_value: None }, &span()).unwrap();
    let sig = super::super::FunctionSig { name: crate::symbol::intern("f"), args: vec![], ret: None, external: false, mutability: Mutability::View, nonreentrant_key: None };
    ns.set(crate::symbol::intern("f"), Entity::Function(std::rc::Rc::new(sig)), &span()).unwrap();
    let f = FunctionDef {
      span: span(), name: crate::symbol::intern("f"), args: vec![], ret: None, external: false, mutability: Mutability::View, nonreentrant: None,
      body: vec![Stmt { span: span(), kind: StmtKind::Assign(
        Expr { span: span(), kind: ExprKind::Name(x) },
        Expr { span: span(), kind: ExprKind::Literal(Literal::Bool(true)) },
      ) }],
    };
    assert!(check_function(&f, &mut ns, &[]).is_err());
  }

  #[test]
  fn calling_a_function_that_writes_the_iterated_storage_array_is_an_immutable_violation() {
    let mut ns: Namespace<Entity> = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    ns.enter_module_scope(&span()).unwrap();
    let a = crate::symbol::intern("a");
    let elem = crate::types::ty::Type::Int(crate::types::prim::IntTy::U256);
    ns.set(a, Entity::Var {
      ty: crate::types::ty::Type::StaticArray(Box::new(elem.clone()), 3),
      location: Location::Storage, flags: crate::types::TypeFlags::empty(), const_value: None,
    }, &span()).unwrap();

    let mutate_sig = super::super::FunctionSig {
      name: crate::symbol::intern("mutate"), args: vec![], ret: None,
      external: false, mutability: Mutability::NonPayable, nonreentrant_key: None,
    };
    ns.set(crate::symbol::intern("mutate"), Entity::Function(std::rc::Rc::new(mutate_sig)), &span()).unwrap();
    let iterate_sig = super::super::FunctionSig {
      name: crate::symbol::intern("iterate"), args: vec![], ret: None,
      external: true, mutability: Mutability::NonPayable, nonreentrant_key: None,
    };
    ns.set(crate::symbol::intern("iterate"), Entity::Function(std::rc::Rc::new(iterate_sig)), &span()).unwrap();

    let mutate = FunctionDef {
      span: span(), name: crate::symbol::intern("mutate"), args: vec![], ret: None,
      external: false, mutability: Mutability::NonPayable, nonreentrant: None,
      body: vec![Stmt { span: span(), kind: StmtKind::Assign(
        Expr { span: span(), kind: ExprKind::Subscript(
          Box::new(Expr { span: span(), kind: ExprKind::Name(a) }),
          Box::new(Expr { span: span(), kind: ExprKind::Literal(Literal::Int(0)) }),
        ) },
        Expr { span: span(), kind: ExprKind::Literal(Literal::Int(1)) },
      ) }],
    };
    let iterate = FunctionDef {
      span: span(), name: crate::symbol::intern("iterate"), args: vec![], ret: None,
      external: true, mutability: Mutability::NonPayable, nonreentrant: None,
      body: vec![Stmt { span: span(), kind: StmtKind::For {
        var: crate::symbol::intern("x"),
        iter: IterExpr::Expr(Expr { span: span(), kind: ExprKind::Name(a) }),
        body: vec![Stmt { span: span(), kind: StmtKind::Expr(
          Expr { span: span(), kind: ExprKind::Call {
            func: Box::new(Expr { span: span(), kind: ExprKind::Name(crate::symbol::intern("mutate")) }),
            args: vec![], kwargs: vec![],
          } },
        ) }],
      } }],
    };

    let all = vec![mutate, iterate.clone()];
    assert!(matches!(
      check_function(&iterate, &mut ns, &all).unwrap_err().kind,
      ErrorKind::ImmutableViolation(_)
    ));
  }
}
