//! Builtin-call typing and compile-time constant folding (spec.md §4.C,
//! SPEC_FULL.md §4.E supplement). [`builtin_return_type`] is the typing
//! half, called from [`super::annotate::infer`]; [`fold`] is the
//! evaluation half, called by codegen (component E) before it falls back
//! to emitting runtime opcodes — folding `len([1,2,3])` to the literal `3`
//! is cheaper and, for `constant`-context expressions, mandatory.

use crate::ast::{BinOp, Expr, ExprKind, Literal, UnaryOp};
use crate::errors::{CovenantError, ErrorKind, Result};
use crate::namespace::Namespace;
use crate::span::FileSpan;
use crate::types::prim::IntTy;
use crate::types::ty::{ArrayLen, Type};
use super::{annotate::infer, Builtin, Entity};

/// The result type of a builtin call, used by the annotate pass. Most
/// builtins have a fixed or argument-derived return type; a handful
/// (`min`/`max`/`abs`) return their (numeric) argument type unchanged.
pub fn builtin_return_type(b: Builtin, args: &[Expr], ns: &Namespace<Entity>, span: &FileSpan) -> Result<Type> {
  use Builtin::*;
  match b {
    Floor | Ceil => { expect_arity(args, 1, span)?; expect_decimal(args, ns, span)?; Ok(Type::Int(IntTy::I128)) }
    Len => { expect_arity(args, 1, span)?; let t = infer(&args[0], ns, None)?; expect_sequence(&t, span)?; Ok(Type::Int(IntTy::U256)) }
    Concat => {
      if args.len() < 2 {
        return Err(arg_err("concat requires at least 2 arguments", span));
      }
      let mut max_len = 0u64;
      for a in args {
        let t = infer(a, ns, None)?;
        max_len += expect_sequence(&t, span)?;
      }
      Ok(Type::Bytes(ArrayLen::Literal { max_length: max_len, min_length: 0 }))
    }
    Slice => {
      expect_arity(args, 3, span)?;
      let t = infer(&args[0], ns, None)?;
      expect_sequence(&t, span)?;
      Ok(t)
    }
    Keccak256 => { expect_arity(args, 1, span)?; Ok(Type::BytesM(32)) }
    Sha256 => { expect_arity(args, 1, span)?; Ok(Type::BytesM(32)) }
    MethodId => { expect_arity(args, 1, span)?; Ok(Type::BytesM(4)) }
    AsWeiValue => {
      expect_arity(args, 2, span)?;
      let ExprKind::Literal(Literal::Str(unit)) = &args[1].kind else {
        return Err(arg_err("as_wei_value's second argument must be a string literal denomination", span));
      };
      wei_unit_multiplier(unit).ok_or_else(|| arg_err(&format!("'{unit}' is not a known wei denomination"), span))?;
      Ok(Type::Int(IntTy::U256))
    }
    Min | Max => {
      expect_arity(args, 2, span)?;
      let t0 = infer(&args[0], ns, None)?;
      if !t0.is_numeric() { return Err(arg_err("min/max require numeric arguments", span)) }
      let t1 = infer(&args[1], ns, Some(&t0))?;
      if !t0.compare_type(&t1) { return Err(arg_err("min/max arguments must share a type", span)) }
      Ok(t0)
    }
    Abs => {
      expect_arity(args, 1, span)?;
      let t = infer(&args[0], ns, None)?;
      t.validate_unary_minus(span)?;
      Ok(t)
    }
    Empty | Convert => Err(arg_err("requires an explicit type argument understood by the caller, not inferable generically", span)),
    PowMod256 => { expect_arity(args, 2, span)?; Ok(Type::Int(IntTy::U256)) }
    AddMod | MulMod => { expect_arity(args, 3, span)?; Ok(Type::Int(IntTy::U256)) }
    RawCall => Ok(Type::Bytes(ArrayLen::Literal { max_length: u64::from(u32::MAX), min_length: 0 })),
    RawLog | CreateForwarderTo | Send | SelfDestruct | Assert | Raise | RangeBuiltin => Ok(Type::Tuple(vec![])),
  }
}

/// Resolve an `as_wei_value` denomination name to its wei multiplier
/// (spec.md §8 S2: `finney`, `babbage`, `shannon`, ... per
/// [`super::wei_units`]).
#[must_use] pub fn wei_unit_multiplier(name: &str) -> Option<u128> {
  super::wei_units().iter().find(|(n, _)| *n == name).map(|(_, m)| *m)
}

fn expect_arity(args: &[Expr], n: usize, span: &FileSpan) -> Result<()> {
  if args.len() != n {
    return Err(arg_err(&format!("expects exactly {n} argument(s), got {}", args.len()), span));
  }
  Ok(())
}

fn expect_decimal(args: &[Expr], ns: &Namespace<Entity>, span: &FileSpan) -> Result<()> {
  let t = infer(&args[0], ns, None)?;
  if !matches!(t, Type::Decimal) {
    return Err(arg_err("expects a decimal argument", span));
  }
  Ok(())
}

fn expect_sequence(t: &Type, span: &FileSpan) -> Result<u64> {
  match t {
    Type::Bytes(l) | Type::Str(l) => Ok(l.max_length()),
    Type::DynArray(_, n) => Ok(*n),
    _ => Err(arg_err(&format!("{t} is not a sequence type"), span)),
  }
}

fn arg_err(msg: &str, span: &FileSpan) -> CovenantError {
  CovenantError::new(ErrorKind::ArgumentException(msg.to_string()), span.clone())
}

/// Constant-fold a call to one of the arithmetic/bitwise/hashing builtins
/// when every argument is itself a literal (SPEC_FULL.md §4.D supplement).
/// Returns `None` (not an error) when folding doesn't apply — e.g. any
/// argument is not a compile-time literal — so callers fall back to
/// runtime codegen.
#[must_use] pub fn fold(name: Builtin, args: &[Expr]) -> Option<Literal> {
  let ints: Vec<i128> = args.iter().filter_map(literal_int).collect();
  if ints.len() != args.len() && !matches!(name, Builtin::Keccak256 | Builtin::Sha256 | Builtin::MethodId | Builtin::Len | Builtin::AsWeiValue) {
    return None;
  }
  match name {
    Builtin::Floor => literal_decimal(&args[0]).map(|d| Literal::Int(d.floor() as i128)),
    Builtin::Ceil => literal_decimal(&args[0]).map(|d| Literal::Int(d.ceil() as i128)),
    Builtin::Len => match &args[0].kind {
      ExprKind::Literal(Literal::Str(s)) => Some(Literal::Int(s.chars().count() as i128)),
      ExprKind::Literal(Literal::Bytes(b)) => Some(Literal::Int(b.len() as i128)),
      _ => None,
    },
    Builtin::Min => ints.first().zip(ints.get(1)).map(|(a, b)| Literal::Int((*a).min(*b))),
    Builtin::Max => ints.first().zip(ints.get(1)).map(|(a, b)| Literal::Int((*a).max(*b))),
    Builtin::Abs => ints.first().map(|a| Literal::Int(a.abs())),
    Builtin::AddMod => match ints[..] { [a, b, m] if m != 0 => Some(Literal::Int((a + b).rem_euclid(m))), _ => None },
    Builtin::MulMod => match ints[..] { [a, b, m] if m != 0 => Some(Literal::Int((a * b).rem_euclid(m))), _ => None },
    Builtin::PowMod256 => match ints[..] { [a, b] if b >= 0 => Some(Literal::Int(a.wrapping_pow(b as u32))), _ => None },
    Builtin::AsWeiValue => {
      let value = literal_int(&args[0])?;
      let ExprKind::Literal(Literal::Str(unit)) = &args[1].kind else { return None };
      let mult = wei_unit_multiplier(unit)?;
      Some(Literal::Int(value.checked_mul(mult as i128)?))
    }
    Builtin::Keccak256 => literal_bytes(&args[0]).map(|b| Literal::Bytes(alloy_primitives::keccak256(b).to_vec())),
    Builtin::MethodId => match &args[0].kind {
      ExprKind::Literal(Literal::Str(s)) => Some(Literal::Bytes(crate::types::abi::method_id(s).to_vec())),
      _ => None,
    },
    _ => None,
  }
}

/// Evaluate a `constant(...)`-declared variable's initializer down to a
/// literal (spec.md §3 invariant iii, §8 S2): literals, closed arithmetic
/// over literals, and builtin calls (`as_wei_value` and friends) all fold;
/// anything that bottoms out in a storage read, a function argument, or an
/// unfoldable builtin does not, and the caller reports that as an error.
#[must_use] pub fn const_eval(expr: &Expr, ns: &Namespace<Entity>) -> Option<Literal> {
  match &expr.kind {
    ExprKind::Literal(l) => Some(l.clone()),
    ExprKind::UnaryOp(UnaryOp::USub, inner) => {
      let v = literal_as_int(&const_eval(inner, ns)?)?;
      Some(Literal::Int(v.checked_neg()?))
    }
    ExprKind::BinOp(op, a, b) => {
      let a = literal_as_int(&const_eval(a, ns)?)?;
      let b = literal_as_int(&const_eval(b, ns)?)?;
      let v = match op {
        BinOp::Add => a.checked_add(b)?,
        BinOp::Sub => a.checked_sub(b)?,
        BinOp::Mul => a.checked_mul(b)?,
        BinOp::Div if b != 0 => a / b,
        BinOp::Mod if b != 0 => a.rem_euclid(b),
        BinOp::Pow if b >= 0 && b <= u32::MAX as i128 => a.checked_pow(b as u32)?,
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Shl if b >= 0 && b < 128 => a.checked_shl(b as u32)?,
        BinOp::Shr if b >= 0 && b < 128 => a.checked_shr(b as u32)?,
        _ => return None,
      };
      Some(Literal::Int(v))
    }
    ExprKind::Call { func, args, .. } => {
      let ExprKind::Name(n) = &func.kind else { return None };
      let Ok(Entity::Builtin(b)) = ns.get(*n, &expr.span) else { return None };
      let folded_args: Vec<Expr> = args.iter().map(|a| match const_eval(a, ns) {
        Some(lit) => Expr { span: a.span.clone(), kind: ExprKind::Literal(lit) },
        None => a.clone(),
      }).collect();
      fold(b, &folded_args)
    }
    _ => None,
  }
}

fn literal_as_int(l: &Literal) -> Option<i128> { match l { Literal::Int(v) => Some(*v), _ => None } }

fn literal_int(e: &Expr) -> Option<i128> { match &e.kind { ExprKind::Literal(Literal::Int(v)) => Some(*v), _ => None } }

fn literal_decimal(e: &Expr) -> Option<f64> {
  match &e.kind { ExprKind::Literal(Literal::Decimal(s)) => s.parse().ok(), _ => None }
}

fn literal_bytes(e: &Expr) -> Option<Vec<u8>> {
  match &e.kind {
    ExprKind::Literal(Literal::Bytes(b)) => Some(b.clone()),
    ExprKind::Literal(Literal::Str(s)) => Some(s.clone().into_bytes()),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn span() -> FileSpan { FileSpan::synthetic(std::rc::Rc::from("t.cov")) }
  fn int_expr(v: i128) -> Expr { Expr { span: span(), kind: ExprKind::Literal(Literal::Int(v)) } }

  #[test]
  fn folds_min_of_two_literals() {
    let args = [int_expr(5), int_expr(2)];
    assert_eq!(fold(Builtin::Min, &args), Some(Literal::Int(2)));
  }

  #[test]
  fn folds_addmod_of_three_literals() {
    let args = [int_expr(10), int_expr(10), int_expr(8)];
    assert_eq!(fold(Builtin::AddMod, &args), Some(Literal::Int(4)));
  }

  #[test]
  fn keccak256_of_literal_bytes_folds() {
    let args = [Expr { span: span(), kind: ExprKind::Literal(Literal::Bytes(vec![])) }];
    let folded = fold(Builtin::Keccak256, &args);
    assert!(matches!(folded, Some(Literal::Bytes(_))));
  }

  #[test]
  fn as_wei_value_folds_a_literal_amount_and_denomination() {
    let str_expr = |s: &str| Expr { span: span(), kind: ExprKind::Literal(Literal::Str(s.to_string())) };
    let args = [int_expr(5), str_expr("finney")];
    assert_eq!(fold(Builtin::AsWeiValue, &args), Some(Literal::Int(5_000_000_000_000_000)));
  }

  fn as_wei_value_call(amount: i128, unit: &str) -> Expr {
    Expr { span: span(), kind: ExprKind::Call {
      func: Box::new(Expr { span: span(), kind: ExprKind::Name(crate::symbol::intern("as_wei_value")) }),
      args: vec![int_expr(amount), Expr { span: span(), kind: ExprKind::Literal(Literal::Str(unit.to_string())) }],
      kwargs: vec![],
    } }
  }

  /// spec.md §8 S2: a chain of `as_wei_value` calls summed together folds to
  /// a single literal during Phase 1, before codegen ever sees the constant.
  #[test]
  fn const_eval_folds_a_sum_of_as_wei_value_calls() {
    let mut ns: Namespace<Entity> = Namespace::new();
    ns.enter_builtin_scope(&span()).unwrap();
    ns.set(crate::symbol::intern("as_wei_value"), Entity::Builtin(Builtin::AsWeiValue), &span()).unwrap();

    let sum = Expr { span: span(), kind: ExprKind::BinOp(
      BinOp::Add,
      Box::new(Expr { span: span(), kind: ExprKind::BinOp(
        BinOp::Add,
        Box::new(as_wei_value_call(5, "finney")),
        Box::new(as_wei_value_call(2, "babbage")),
      ) }),
      Box::new(as_wei_value_call(8, "shannon")),
    ) };

    let expected = 5_000_000_000_000_000i128 + 2_000 + 8_000_000_000;
    assert_eq!(const_eval(&sum, &ns), Some(Literal::Int(expected)));
  }
}
