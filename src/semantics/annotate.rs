//! The bidirectional expression-typing judgment (spec.md §4.A/§4.C,
//! SPEC_FULL.md §4.A supplement): given an expression and an optional
//! expected type, produce its resolved [`Type`] or a diagnostic. Shared by
//! Phase 2 ([`super::function`]) and by codegen (component E), which
//! re-walks the same tree under the same rules to emit IR — exactly the
//! layering `original_source`'s `old_codegen` uses its annotated AST for.

use crate::ast::{BinOp, CompareOp, Expr, ExprKind, Literal};
use crate::errors::{CovenantError, ErrorKind, Result};
use crate::namespace::Namespace;
use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::types::prim::Signedness;
use crate::types::ty::{ArrayLen, Type};
use super::Entity;

/// Infer (and validate) the type of `expr`. `expected`, when present,
/// narrows an integer/decimal literal to a concrete width and tightens a
/// literal-length array against a fixed bound (SPEC_FULL.md §4.A
/// supplement: "a literal used in a context that expects a concrete
/// numeric type is narrowed by that context").
pub fn infer(expr: &Expr, ns: &Namespace<Entity>, expected: Option<&Type>) -> Result<Type> {
  match &expr.kind {
    ExprKind::Literal(lit) => infer_literal(lit, expected, &expr.span),
    ExprKind::Name(name) => infer_name(*name, ns, &expr.span),
    ExprKind::Attribute(base, field) => {
      let base_ty = infer(base, ns, None)?;
      base_ty.get_member(*field, &expr.span).map(|(t, _)| t)
    }
    ExprKind::Subscript(base, index) => {
      let base_ty = infer(base, ns, None)?;
      let literal_index = literal_int(index);
      let index_ty = infer(index, ns, None)?;
      base_ty.get_index_type(&index_ty, literal_index, &expr.span)
    }
    ExprKind::Call { func, args, kwargs } => infer_call(func, args, kwargs, ns, &expr.span),
    ExprKind::BinOp(op, a, b) => infer_binop(*op, a, b, ns, expected, &expr.span),
    ExprKind::BoolOp(_, terms) => {
      for t in terms {
        infer(t, ns, Some(&Type::Bool))?.validate_boolean_op(&expr.span)?;
      }
      Ok(Type::Bool)
    }
    ExprKind::UnaryOp(op, inner) => infer_unary(*op, inner, ns, &expr.span),
    ExprKind::Compare(op, a, b) => {
      let ta = infer(a, ns, None)?;
      let tb = infer(b, ns, Some(&ta))?;
      ta.validate_comparator(*op, &expr.span)?;
      if !ta.compare_type(&tb) {
        return Err(mismatch(&ta, &tb, &expr.span));
      }
      Ok(Type::Bool)
    }
    ExprKind::Ternary { cond, then, other } => {
      infer(cond, ns, Some(&Type::Bool))?;
      let t1 = infer(then, ns, expected)?;
      let t2 = infer(other, ns, Some(&t1))?;
      if !t1.compare_type(&t2) { return Err(mismatch(&t1, &t2, &expr.span)); }
      Ok(t1)
    }
    ExprKind::List(items) => infer_list(items, ns, expected, &expr.span),
    ExprKind::Tuple(items) => {
      let tys = items.iter().map(|e| infer(e, ns, None)).collect::<Result<_>>()?;
      Ok(Type::Tuple(tys))
    }
    ExprKind::StructLit(name, fields) => infer_struct_lit(*name, fields, ns, &expr.span),
  }
}

fn infer_literal(lit: &Literal, expected: Option<&Type>, span: &FileSpan) -> Result<Type> {
  if let (Literal::Int(v), Some(Type::Int(want))) = (lit, expected) {
    if want.contains(*v) { return Ok(Type::Int(*want)) }
  }
  let natural = Type::from_literal(lit, span)?;
  if let Some(want) = expected {
    return natural.tighten_array_len(want, span);
  }
  Ok(natural)
}

fn literal_int(expr: &Expr) -> Option<i128> {
  match &expr.kind { ExprKind::Literal(Literal::Int(v)) => Some(*v), _ => None }
}

fn infer_name(name: Symbol, ns: &Namespace<Entity>, span: &FileSpan) -> Result<Type> {
  match ns.get(name, span)? {
    Entity::Var { ty, .. } => Ok(ty.clone()),
    Entity::Enum(d) => Ok(Type::Enum(d.clone())),
    other => Err(CovenantError::new(
      ErrorKind::InvalidReference(format!("'{name}' ({other:?}) is not usable as a value")), span.clone())),
  }
}

fn infer_unary(op: crate::ast::UnaryOp, inner: &Expr, ns: &Namespace<Entity>, span: &FileSpan) -> Result<Type> {
  use crate::ast::UnaryOp::*;
  let ty = infer(inner, ns, None)?;
  match op {
    Not => { ty.validate_boolean_op(span)?; Ok(Type::Bool) }
    USub => { ty.validate_unary_minus(span)?; Ok(ty) }
    Invert => {
      if !ty.is_integer() {
        return Err(CovenantError::new(ErrorKind::InvalidOperation("~ requires an integer type".into()), span.clone()));
      }
      Ok(ty)
    }
  }
}

fn infer_binop(op: BinOp, a: &Expr, b: &Expr, ns: &Namespace<Entity>, expected: Option<&Type>, span: &FileSpan) -> Result<Type> {
  let ta = infer(a, ns, expected)?;
  ta.validate_numeric_op(op, span)?;
  let tb = infer(b, ns, Some(&ta))?;
  if !ta.compare_type(&tb) {
    // Shift/pow allow a smaller right-hand operand (the shift amount need
    // not match the left operand's width).
    if !matches!(op, BinOp::Shl | BinOp::Shr | BinOp::Pow) || !tb.is_integer() {
      return Err(mismatch(&ta, &tb, span));
    }
  }
  Ok(ta)
}

fn infer_list(items: &[Expr], ns: &Namespace<Entity>, expected: Option<&Type>, span: &FileSpan) -> Result<Type> {
  let elem_expected = match expected {
    Some(Type::StaticArray(e, _) | Type::DynArray(e, _)) => Some((**e).clone()),
    _ => None,
  };
  let mut elem_ty: Option<Type> = elem_expected.clone();
  for item in items {
    let t = infer(item, ns, elem_ty.as_ref())?;
    elem_ty = Some(match &elem_ty { Some(prev) if prev.compare_type(&t) => prev.clone(), _ => t });
  }
  let elem_ty = elem_ty.ok_or_else(|| CovenantError::new(
    ErrorKind::StructureException("cannot infer the element type of an empty list literal".into()), span.clone()))?;
  let n = u64::try_from(items.len()).unwrap_or(u64::MAX);
  Ok(Type::StaticArray(Box::new(elem_ty), n))
}

fn infer_struct_lit(name: Symbol, fields: &[(Symbol, Expr)], ns: &Namespace<Entity>, span: &FileSpan) -> Result<Type> {
  let Entity::Struct(def) = ns.get(name, span)? else {
    return Err(CovenantError::new(ErrorKind::UnknownType(format!("'{name}' is not a struct")), span.clone()));
  };
  if fields.len() != def.fields.len() {
    return Err(CovenantError::new(
      ErrorKind::ArgumentException(format!("struct '{name}' expects {} fields, got {}", def.fields.len(), fields.len())),
      span.clone()));
  }
  for (fname, fexpr) in fields {
    let want = def.fields.iter().find(|(n, _)| n == fname).map(|(_, t)| t.clone())
      .ok_or_else(|| CovenantError::new(ErrorKind::UnknownAttribute(format!("no field '{fname}' on struct '{name}'")), span.clone()))?;
    let got = infer(fexpr, ns, Some(&want))?;
    if !want.compare_type(&got) { return Err(mismatch(&want, &got, span)); }
  }
  Ok(Type::Struct(def.clone()))
}

fn infer_call(func: &Expr, args: &[Expr], kwargs: &[(Symbol, Expr)], ns: &Namespace<Entity>, span: &FileSpan) -> Result<Type> {
  match &func.kind {
    ExprKind::Name(name) => infer_call_by_name(*name, args, kwargs, ns, span),
    ExprKind::Attribute(base, method) => infer_external_call(base, *method, args, ns, span),
    _ => Err(CovenantError::new(ErrorKind::InvalidOperation("call target is not callable".into()), span.clone())),
  }
}

fn infer_call_by_name(name: Symbol, args: &[Expr], _kwargs: &[(Symbol, Expr)], ns: &Namespace<Entity>, span: &FileSpan) -> Result<Type> {
  match ns.get(name, span)? {
    Entity::Function(sig) => {
      if args.len() != sig.args.len() {
        return Err(CovenantError::new(
          ErrorKind::ArgumentException(format!("'{name}' expects {} arguments, got {}", sig.args.len(), args.len())),
          span.clone()));
      }
      for (arg, (_, want)) in args.iter().zip(&sig.args) {
        let got = infer(arg, ns, Some(want))?;
        if !want.compare_type(&got) { return Err(mismatch(want, &got, span)); }
      }
      Ok(sig.ret.clone().unwrap_or(Type::Tuple(vec![])))
    }
    Entity::Struct(def) => {
      // Positional struct construction, `Point(1, 2)`.
      if args.len() != def.fields.len() {
        return Err(CovenantError::new(
          ErrorKind::ArgumentException(format!("struct '{name}' expects {} fields", def.fields.len())), span.clone()));
      }
      for (arg, (_, want)) in args.iter().zip(&def.fields) {
        let got = infer(arg, ns, Some(want))?;
        if !want.compare_type(&got) { return Err(mismatch(want, &got, span)); }
      }
      Ok(Type::Struct(def.clone()))
    }
    Entity::Builtin(b) => super::folding::builtin_return_type(b, args, ns, span),
    _ => infer_primitive_cast(name, args, ns, span),
  }
}

/// A primitive type name used in call position is a cast, e.g.
/// `uint256(x)`, `address(b)`.
fn infer_primitive_cast(name: Symbol, args: &[Expr], ns: &Namespace<Entity>, span: &FileSpan) -> Result<Type> {
  let target = crate::types::ty::Type::from_annotation(
    &crate::ast::TypeAnnNode::Name(name), crate::types::Location::Memory, false, false,
    &mut |n, sp| Err(CovenantError::new(ErrorKind::UnknownType(crate::symbol::resolve(n)), sp.clone())), span)
    .map_err(|_| CovenantError::new(ErrorKind::InvalidReference(format!("'{name}' is not callable")), span.clone()))?;
  let arg_tys = args.iter().map(|a| infer(a, ns, None)).collect::<Result<Vec<_>>>()?;
  target.fetch_call_return_cast(&arg_tys, span)
}

fn infer_external_call(base: &Expr, method: Symbol, args: &[Expr], ns: &Namespace<Entity>, span: &FileSpan) -> Result<Type> {
  let base_ty = infer(base, ns, None)?;
  let Type::Interface(def) = base_ty else {
    return Err(CovenantError::new(ErrorKind::InvalidOperation("method call target is not an interface reference".into()), span.clone()));
  };
  let sig = def.functions.iter().find(|f| f.name == method)
    .ok_or_else(|| CovenantError::new(ErrorKind::UnknownAttribute(format!("interface '{}' has no function '{method}'", def.name)), span.clone()))?;
  if args.len() != sig.args.len() {
    return Err(CovenantError::new(
      ErrorKind::ArgumentException(format!("'{method}' expects {} arguments", sig.args.len())), span.clone()));
  }
  for (arg, want) in args.iter().zip(&sig.args) {
    let got = infer(arg, ns, Some(want))?;
    if !want.compare_type(&got) { return Err(mismatch(want, &got, span)); }
  }
  Ok(sig.ret.clone().unwrap_or(Type::Tuple(vec![])))
}

fn mismatch(want: &Type, got: &Type, span: &FileSpan) -> CovenantError {
  CovenantError::new(ErrorKind::TypeMismatch(format!("expected {want}, got {got}")), span.clone())
}

/// `true` for a binary comparator/boolean-op expression, used by the
/// terminus checker to recognize `assert`/`if` guard shapes without
/// re-exporting the whole `infer` surface.
#[must_use] pub fn signedness_of(ty: &Type) -> Option<Signedness> {
  match ty { Type::Int(t) => Some(t.signed), _ => None }
}

/// Whether `ty` is a bounded dynamic array/bytes/string whose literal max
/// length is statically `n` (used by `for`-loop safe-iteration checks).
#[must_use] pub fn static_max_length(ty: &Type) -> Option<u64> {
  match ty {
    Type::Bytes(l) | Type::Str(l) => Some(l.max_length()),
    Type::DynArray(_, n) => Some(*n),
    _ => None,
  }
}

/// Reconstruct a list-literal's element array length as `ArrayLen::Fixed`
/// for contexts that require a concrete bound rather than a literal's
/// widened bound (used by codegen when materializing a list literal).
#[must_use] pub fn fixed_len(n: u64) -> ArrayLen { ArrayLen::Fixed(n) }
