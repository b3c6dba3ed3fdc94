//! Expression lowering (spec.md §4.E): every [`Expr`] lowers to a valency-1
//! [`IrNode`]. Binary/comparison/boolean operators map directly onto their
//! target opcode; literals, member access, and builtin calls go through
//! small dedicated helpers.

use std::rc::Rc;
use alloy_primitives::U256;
use crate::ast::{BinOp, BoolOp, CompareOp, Expr, ExprKind, Literal, UnaryOp};
use crate::errors::{CovenantError, ErrorKind, Result};
use crate::ir::opcodes::Opcode;
use crate::ir::IrNode;
use crate::semantics::{annotate::infer, folding, Builtin, Entity};
use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::types::prim::Signedness;
use crate::types::ty::Type;
use crate::types::Location;
use super::{external_call, inline, CodegenCtx};

/// Lower `expr` to an IR tree of valency 1.
pub fn compile_expr(expr: &Expr, ctx: &mut CodegenCtx) -> Result<Rc<IrNode>> {
  match &expr.kind {
    ExprKind::Literal(lit) => compile_literal(lit, &expr.span),
    ExprKind::Name(name) => compile_name(*name, ctx, &expr.span),
    ExprKind::Attribute(base, field) => compile_attribute(base, *field, ctx, &expr.span),
    ExprKind::Subscript(base, index) => compile_subscript(base, index, ctx, &expr.span),
    ExprKind::Call { func, args, kwargs } => compile_call(func, args, kwargs, ctx, &expr.span),
    ExprKind::BinOp(op, a, b) => compile_binop(*op, a, b, ctx, &expr.span),
    ExprKind::BoolOp(op, terms) => compile_boolop(*op, terms, ctx, &expr.span),
    ExprKind::UnaryOp(op, inner) => compile_unary(*op, inner, ctx, &expr.span),
    ExprKind::Compare(op, a, b) => compile_compare(*op, a, b, ctx, &expr.span),
    ExprKind::Ternary { cond, then, other } => compile_ternary(cond, then, other, ctx, &expr.span),
    ExprKind::List(items) => compile_list(items, ctx, &expr.span),
    ExprKind::Tuple(items) => compile_multi(items, ctx, &expr.span),
    ExprKind::StructLit(_, fields) => {
      let values = fields.iter().map(|(_, e)| e.clone()).collect::<Vec<_>>();
      compile_multi(&values, ctx, &expr.span)
    }
  }
}

fn compile_literal(lit: &Literal, span: &FileSpan) -> Result<Rc<IrNode>> {
  match lit {
    Literal::Bool(b) => Ok(IrNode::int(U256::from(u64::from(*b)), span)),
    Literal::Int(v) => {
      let u = if *v < 0 { U256::from(v.unsigned_abs()).wrapping_neg() } else { U256::from(*v as u128) };
      Ok(IrNode::int(u, span))
    }
    Literal::HexAddress(hex) => {
      let digits = hex.trim_start_matches("0x");
      let bytes = hex::decode(digits).map_err(|_| invalid_literal(span))?;
      Ok(IrNode::int(U256::from_be_slice(&bytes), span))
    }
    Literal::HexBytes32(hex) => {
      let digits = hex.trim_start_matches("0x");
      let bytes = hex::decode(digits).map_err(|_| invalid_literal(span))?;
      Ok(IrNode::int(U256::from_be_slice(&bytes), span))
    }
    Literal::Bytes(b) => Ok(IrNode::int(U256::from_be_slice(b), span)),
    Literal::Str(s) => Ok(IrNode::int(U256::from_be_slice(s.as_bytes()), span)),
    Literal::Decimal(text) => {
      let scaled: i128 = decimal_to_fixed(text).ok_or_else(|| invalid_literal(span))?;
      let u = if scaled < 0 { U256::from(scaled.unsigned_abs()).wrapping_neg() } else { U256::from(scaled as u128) };
      Ok(IrNode::int(u, span))
    }
    Literal::Unreachable => Err(invalid_literal(span)),
  }
}

fn invalid_literal(span: &FileSpan) -> CovenantError {
  CovenantError::new(ErrorKind::InvalidLiteral("literal could not be lowered".into()), span.clone())
}

/// `decimal` is a fixed168x10 representation: scale the textual value by
/// `10**10` (spec.md §3 decimal supplement).
fn decimal_to_fixed(text: &str) -> Option<i128> {
  let negative = text.starts_with('-');
  let text = text.trim_start_matches('-');
  let mut parts = text.splitn(2, '.');
  let whole: i128 = parts.next()?.parse().ok()?;
  let frac_str = parts.next().unwrap_or("");
  let frac_str = format!("{frac_str:0<10}");
  let frac: i128 = frac_str[..10].parse().ok()?;
  let value = whole * 10_000_000_000 + frac;
  Some(if negative { -value } else { value })
}

fn compile_name(name: Symbol, ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  // Arguments, locals, and loop variables are codegen-private memory slots
  // assigned by the caller (function entry, an inlined call's prologue, a
  // `for` unrolling) before the body compiles — Phase 2's per-function
  // scope that originally bound them is already exited by the time codegen
  // runs, so a local slot is always checked before the namespace (spec.md
  // §4.E).
  if let Some(slot) = ctx.existing_local_slot(name) {
    return IrNode::op(Opcode::MLoad, vec![IrNode::int(U256::from(slot), span)], span);
  }
  match ctx.namespace.get(name, span)? {
    Entity::Var { location: Location::Storage, .. } => {
      let slot = *ctx.storage_slots.get(&name).ok_or_else(|| internal("storage slot not assigned", span))?;
      IrNode::op(Opcode::SLoad, vec![IrNode::int(U256::from(slot), span)], span)
    }
    Entity::Var { const_value: Some(lit), .. } => {
      // `constant(...)` bindings have no runtime storage at all (spec.md
      // §8 S2): the value installed by Phase 1 is inlined directly.
      compile_literal(lit, span)
    }
    Entity::Var { location: Location::Code(crate::types::CodeKind::Immutable), .. } => {
      // Constructor-written, read-only after deployment: the deployed
      // account's code is `[runtime bytes][immutables blob]`
      // (`assembler::assemble_deploy`), so an immutable at byte `offset`
      // into that tail sits at `codesize() - (immutables_size - offset)` —
      // this needs no compile-time knowledge of the runtime's own length,
      // since that term cancels against the `CODESIZE` read (spec.md §4.E).
      let offset = *ctx.immutable_offsets.get(&name).ok_or_else(|| internal("immutable has no assigned offset", span))?;
      let tail_len = ctx.immutables_size - offset;
      let pos = IrNode::op(Opcode::Sub, vec![
        IrNode::op(Opcode::CodeSize, vec![], span)?,
        IrNode::int(U256::from(tail_len), span),
      ], span)?;
      let dest = ctx.alloc_memory_words(1);
      let copy = IrNode::op(Opcode::CodeCopy, vec![IrNode::int(U256::from(dest), span), pos, IrNode::int(U256::from(32u64), span)], span)?;
      let load = IrNode::op(Opcode::MLoad, vec![IrNode::int(U256::from(dest), span)], span)?;
      Ok(IrNode::seq(vec![copy, load], span))
    }
    Entity::Var { .. } => {
      // Memory-resident locals live at a per-function bump-allocated
      // offset, assigned lazily on first reference (spec.md §4.E). Reached
      // only defensively: every reference that can legitimately get here
      // already has a slot via `existing_local_slot` above.
      let slot = ctx.local_slot(name);
      IrNode::op(Opcode::MLoad, vec![IrNode::int(U256::from(slot), span)], span)
    }
    _ => Err(internal("name does not denote a value", span)),
  }
}

fn internal(msg: &str, span: &FileSpan) -> CovenantError {
  CovenantError::new(ErrorKind::CovenantInternalException(msg.to_string()), span.clone())
}

fn compile_attribute(base: &Expr, field: Symbol, ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  let base_ir = compile_expr(base, ctx)?;
  let s = crate::symbol::resolve(field);
  match s.as_str() {
    "balance" => IrNode::op(Opcode::Balance, vec![base_ir], span),
    "codehash" => IrNode::op(Opcode::ExtCodeHash, vec![base_ir], span),
    "codesize" => IrNode::op(Opcode::ExtCodeSize, vec![base_ir], span),
    "is_contract" => {
      let size = IrNode::op(Opcode::ExtCodeSize, vec![base_ir], span)?;
      let zero = IrNode::int(U256::ZERO, span);
      let is_zero = IrNode::op(Opcode::Eq, vec![size, zero], span)?;
      IrNode::op(Opcode::IsZero, vec![is_zero], span)
    }
    _ => Err(internal("unsupported attribute access", span)),
  }
}

fn compile_subscript(base: &Expr, index: &Expr, ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  let base_ty = infer(base, ctx.namespace, None)?;
  let index_ir = compile_expr(index, ctx)?;
  match base_ty {
    Type::Mapping(..) => {
      // slot = keccak256(index ++ base_slot) — the standard storage
      // mapping layout.
      let ExprKind::Name(base_name) = &base.kind else { return Err(internal("mapping base must be a storage variable name", span)) };
      let slot = *ctx.storage_slots.get(base_name).ok_or_else(|| internal("storage slot not assigned", span))?;
      let offset = ctx.alloc_memory_words(2);
      let write_index = IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(offset), span), index_ir], span)?;
      let write_slot = IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(offset + 32), span), IrNode::int(U256::from(slot), span)], span)?;
      let hash = IrNode::op(Opcode::Keccak256, vec![IrNode::int(U256::from(offset), span), IrNode::int(U256::from(64u64), span)], span)?;
      let slot_load = IrNode::op(Opcode::SLoad, vec![hash], span)?;
      Ok(IrNode::seq(vec![write_index, write_slot, slot_load], span))
    }
    Type::StaticArray(..) | Type::DynArray(..) => {
      let base_ir = compile_expr(base, ctx)?;
      let word_offset = IrNode::op(Opcode::Mul, vec![index_ir, IrNode::int(U256::from(32u64), span)], span)?;
      let addr = IrNode::op(Opcode::Add, vec![base_ir, word_offset], span)?;
      IrNode::op(Opcode::MLoad, vec![addr], span)
    }
    _ => Err(internal("unsupported subscript base type", span)),
  }
}

fn compile_binop(op: BinOp, a: &Expr, b: &Expr, ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  let signed = signed_operands(a, ctx)?;
  let ir_a = compile_expr(a, ctx)?;
  let ir_b = compile_expr(b, ctx)?;
  let opcode = match (op, signed) {
    (BinOp::Add, _) => Opcode::Add,
    (BinOp::Sub, _) => Opcode::Sub,
    (BinOp::Mul, _) => Opcode::Mul,
    (BinOp::Div, false) => Opcode::Div,
    (BinOp::Div, true) => Opcode::SDiv,
    (BinOp::Mod, false) => Opcode::Mod,
    (BinOp::Mod, true) => Opcode::SMod,
    (BinOp::Pow, _) => Opcode::Exp,
    (BinOp::BitAnd, _) => Opcode::And,
    (BinOp::BitOr, _) => Opcode::Or,
    (BinOp::BitXor, _) => Opcode::Xor,
    (BinOp::Shl, _) => Opcode::Shl,
    (BinOp::Shr, false) => Opcode::Shr,
    (BinOp::Shr, true) => Opcode::Sar,
  };
  IrNode::op(opcode, vec![ir_a, ir_b], span)
}

fn signed_operands(a: &Expr, ctx: &CodegenCtx) -> Result<bool> {
  let ty = infer(a, ctx.namespace, None)?;
  Ok(matches!(ty, Type::Int(t) if t.signed == Signedness::Signed) || matches!(ty, Type::Decimal))
}

fn compile_boolop(op: BoolOp, terms: &[Expr], ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  let mut iter = terms.iter();
  let first = iter.next().ok_or_else(|| internal("boolean operator with no operands", span))?;
  let mut acc = compile_expr(first, ctx)?;
  let opcode = match op { BoolOp::And => Opcode::And, BoolOp::Or => Opcode::Or };
  for t in iter {
    let next = compile_expr(t, ctx)?;
    acc = IrNode::op(opcode, vec![acc, next], span)?;
  }
  Ok(acc)
}

fn compile_unary(op: UnaryOp, inner: &Expr, ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  let ir = compile_expr(inner, ctx)?;
  match op {
    UnaryOp::Not => IrNode::op(Opcode::IsZero, vec![ir], span),
    UnaryOp::Invert => IrNode::op(Opcode::Not, vec![ir], span),
    UnaryOp::USub => {
      let zero = IrNode::int(U256::ZERO, span);
      IrNode::op(Opcode::Sub, vec![zero, ir], span)
    }
  }
}

fn compile_compare(op: CompareOp, a: &Expr, b: &Expr, ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  let signed = signed_operands(a, ctx)?;
  let ir_a = compile_expr(a, ctx)?;
  let ir_b = compile_expr(b, ctx)?;
  match op {
    CompareOp::Eq => IrNode::op(Opcode::Eq, vec![ir_a, ir_b], span),
    CompareOp::NotEq => {
      let eq = IrNode::op(Opcode::Eq, vec![ir_a, ir_b], span)?;
      IrNode::op(Opcode::IsZero, vec![eq], span)
    }
    CompareOp::Lt => IrNode::op(if signed { Opcode::SLt } else { Opcode::Lt }, vec![ir_a, ir_b], span),
    CompareOp::Gt => IrNode::op(if signed { Opcode::SGt } else { Opcode::Gt }, vec![ir_a, ir_b], span),
    CompareOp::LtE => {
      let gt = IrNode::op(if signed { Opcode::SGt } else { Opcode::Gt }, vec![ir_a, ir_b], span)?;
      IrNode::op(Opcode::IsZero, vec![gt], span)
    }
    CompareOp::GtE => {
      let lt = IrNode::op(if signed { Opcode::SLt } else { Opcode::Lt }, vec![ir_a, ir_b], span)?;
      IrNode::op(Opcode::IsZero, vec![lt], span)
    }
    CompareOp::In => Err(internal("membership test lowering is handled at the list-literal call site", span)),
  }
}

fn compile_ternary(cond: &Expr, then: &Expr, other: &Expr, ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  let cond_ir = compile_expr(cond, ctx)?;
  let then_ir = compile_expr(then, ctx)?;
  let else_ir = compile_expr(other, ctx)?;
  IrNode::if_(cond_ir, then_ir, Some(else_ir), span)
}

fn compile_list(items: &[Expr], ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  // Materialize into a freshly allocated memory region, word per element,
  // leaving the base address as the resulting value.
  let base = ctx.alloc_memory_words(u64::try_from(items.len()).unwrap_or(0));
  let mut writes = Vec::with_capacity(items.len());
  for (i, item) in items.iter().enumerate() {
    let value = compile_expr(item, ctx)?;
    let addr = IrNode::int(U256::from(base + (i as u64) * 32), span);
    writes.push(IrNode::op(Opcode::MStore, vec![addr, value], span)?);
  }
  writes.push(IrNode::int(U256::from(base), span));
  Ok(IrNode::seq(writes, span))
}

fn compile_multi(items: &[Expr], ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  let parts = items.iter().map(|e| compile_expr(e, ctx)).collect::<Result<Vec<_>>>()?;
  IrNode::multi(parts, span)
}

fn compile_call(func: &Expr, args: &[Expr], kwargs: &[(Symbol, Expr)], ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  match &func.kind {
    ExprKind::Name(name) => compile_call_by_name(*name, args, kwargs, ctx, span),
    ExprKind::Attribute(base, method) => external_call::compile_external_call(base, *method, args, ctx, span),
    _ => Err(internal("call target is not lowerable", span)),
  }
}

fn compile_call_by_name(name: Symbol, args: &[Expr], _kwargs: &[(Symbol, Expr)], ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  match ctx.namespace.get(name, span)?.clone() {
    Entity::Function(_) => {
      // Internal calls are resolved by inlining the callee's body at the
      // call site (`codegen::inline`): the acyclic call graph (spec.md
      // §4.C) makes this always terminate, and it sidesteps the IR's lack
      // of a runtime return-address value.
      let callee = *ctx.functions.get(&name).ok_or_else(|| internal("internal call to an unregistered function", span))?;
      inline::compile_internal_call(callee, args, ctx, span)
    }
    Entity::Builtin(b) => compile_builtin(b, args, ctx, span),
    Entity::Struct(_) => compile_multi(args, ctx, span),
    _ => compile_cast(name, args, ctx, span),
  }
}

fn compile_cast(name: Symbol, args: &[Expr], ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  // A primitive type name in call position: the underlying 256-bit word
  // is unchanged by every cast this language admits (spec.md §4.A
  // `fetch_call_return_cast`); only the *type* attached to the value
  // changes, which codegen does not need to represent at the IR level.
  let _ = name;
  compile_expr(args.first().ok_or_else(|| internal("cast with no argument", span))?, ctx)
}

fn compile_builtin(b: Builtin, args: &[Expr], ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  if let Some(lit) = folding::fold(b, args) {
    return compile_literal(&lit, span);
  }
  match b {
    Builtin::Keccak256 => {
      let data = compile_expr(&args[0], ctx)?;
      let size_ty = infer(&args[0], ctx.namespace, None)?;
      let len = crate::types::abi::AbiLayout::of(&size_ty).min_size;
      IrNode::op(Opcode::Keccak256, vec![data, IrNode::int(U256::from(len), span)], span)
    }
    Builtin::Len => {
      // Runtime length of a dynamic value is carried alongside its data;
      // for the fixed-size case the static bound is returned directly.
      let ty = infer(&args[0], ctx.namespace, None)?;
      let bound = crate::semantics::annotate::static_max_length(&ty).unwrap_or(0);
      Ok(IrNode::int(U256::from(bound), span))
    }
    Builtin::Min | Builtin::Max => {
      let a = compile_expr(&args[0], ctx)?;
      let b_ir = compile_expr(&args[1], ctx)?;
      let signed = signed_operands(&args[0], ctx)?;
      let cmp = if b == Builtin::Min {
        IrNode::op(if signed { Opcode::SLt } else { Opcode::Lt }, vec![a.clone(), b_ir.clone()], span)?
      } else {
        IrNode::op(if signed { Opcode::SGt } else { Opcode::Gt }, vec![a.clone(), b_ir.clone()], span)?
      };
      IrNode::if_(cmp, a, Some(b_ir), span)
    }
    Builtin::Abs => {
      let ir = compile_expr(&args[0], ctx)?;
      let zero = IrNode::int(U256::ZERO, span);
      let is_neg = IrNode::op(Opcode::SLt, vec![ir.clone(), zero.clone()], span)?;
      let negated = IrNode::op(Opcode::Sub, vec![zero, ir.clone()], span)?;
      IrNode::if_(is_neg, negated, Some(ir), span)
    }
    Builtin::AsWeiValue => {
      // The value may be a runtime expression, but the denomination (checked
      // against `folding::wei_unit_multiplier` during typing) is always a
      // string literal, so it compiles to a plain constant multiplier.
      let value = compile_expr(&args[0], ctx)?;
      let ExprKind::Literal(Literal::Str(unit)) = &args[1].kind else {
        return Err(internal("as_wei_value's unit argument must be a string literal", span));
      };
      let mult = folding::wei_unit_multiplier(unit)
        .ok_or_else(|| internal("unknown wei denomination reached codegen", span))?;
      IrNode::op(Opcode::Mul, vec![value, IrNode::int(U256::from(mult), span)], span)
    }
    Builtin::AddMod => {
      let parts = args.iter().map(|a| compile_expr(a, ctx)).collect::<Result<Vec<_>>>()?;
      IrNode::op(Opcode::AddMod, parts, span)
    }
    Builtin::MulMod => {
      let parts = args.iter().map(|a| compile_expr(a, ctx)).collect::<Result<Vec<_>>>()?;
      IrNode::op(Opcode::MulMod, parts, span)
    }
    Builtin::PowMod256 => {
      let base = compile_expr(&args[0], ctx)?;
      let exp = compile_expr(&args[1], ctx)?;
      IrNode::op(Opcode::Exp, vec![base, exp], span)
    }
    Builtin::Empty => Ok(IrNode::int(U256::ZERO, span)),
    Builtin::Convert => compile_expr(&args[0], ctx),
    Builtin::Concat | Builtin::Slice => external_call::compile_byte_builtin(b, args, ctx, span),
    Builtin::RawCall | Builtin::RawLog | Builtin::CreateForwarderTo | Builtin::Send | Builtin::SelfDestruct =>
      external_call::compile_system_builtin(b, args, ctx, span),
    Builtin::Floor | Builtin::Ceil => {
      let ir = compile_expr(&args[0], ctx)?;
      let scale = IrNode::int(U256::from(10_000_000_000u64), span);
      IrNode::op(if b == Builtin::Floor { Opcode::SDiv } else { Opcode::Div }, vec![ir, scale], span)
    }
    Builtin::MethodId => {
      let ExprKind::Literal(Literal::Str(s)) = &args[0].kind else { return Err(internal("method_id requires a string literal", span)) };
      let id = crate::types::abi::method_id(s);
      Ok(IrNode::int(U256::from_be_slice(&id), span))
    }
    Builtin::Sha256 => {
      // No native opcode in this vocabulary's fixed table; lowered as a
      // call to the SHA256 precompile (address 0x2) by the external-call
      // path, matching how a real backend would reach a precompile.
      external_call::compile_byte_builtin(b, args, ctx, span)
    }
    Builtin::Assert | Builtin::Raise | Builtin::RangeBuiltin => Err(internal("handled at statement level, not as an expression", span)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::namespace::Namespace;
  use crate::semantics::module::install_builtin_scope;

  fn span() -> FileSpan { FileSpan::synthetic(std::rc::Rc::from("t.cov")) }
  fn lit(kind: ExprKind) -> Expr { Expr { span: span(), kind } }
  fn ctx(ns: &Namespace<Entity>) -> super::CodegenCtx<'_> { super::CodegenCtx::new(ns) }

  #[test]
  fn negative_int_literal_lowers_to_wrapped_two_complement() {
    let ir = compile_literal(&Literal::Int(-1), &span()).unwrap();
    assert_eq!(ir.value, crate::ir::IrValue::Int(U256::MAX));
  }

  #[test]
  fn bool_literal_lowers_to_zero_or_one() {
    let ir = compile_literal(&Literal::Bool(true), &span()).unwrap();
    assert_eq!(ir.value, crate::ir::IrValue::Int(U256::from(1u64)));
  }

  #[test]
  fn binop_add_on_unsigned_ints_emits_add_opcode() {
    let mut ns = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    let mut c = ctx(&ns);
    let a = lit(ExprKind::Literal(Literal::Int(1)));
    let b = lit(ExprKind::Literal(Literal::Int(2)));
    let ir = compile_binop(BinOp::Add, &a, &b, &mut c, &span()).unwrap();
    assert_eq!(ir.value, crate::ir::IrValue::Op(Opcode::Add));
  }

  #[test]
  fn compare_lte_is_synthesized_from_gt_and_iszero() {
    let mut ns = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    let mut c = ctx(&ns);
    let a = lit(ExprKind::Literal(Literal::Int(1)));
    let b = lit(ExprKind::Literal(Literal::Int(2)));
    let ir = compile_compare(CompareOp::LtE, &a, &b, &mut c, &span()).unwrap();
    assert_eq!(ir.value, crate::ir::IrValue::Op(Opcode::IsZero));
    assert_eq!(ir.args[0].value, crate::ir::IrValue::Op(Opcode::Gt));
  }

  #[test]
  fn min_builtin_call_folds_two_literal_arguments() {
    let mut ns = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    let mut c = ctx(&ns);
    let args = vec![lit(ExprKind::Literal(Literal::Int(5))), lit(ExprKind::Literal(Literal::Int(2)))];
    let ir = compile_builtin(Builtin::Min, &args, &mut c, &span()).unwrap();
    assert_eq!(ir.value, crate::ir::IrValue::Int(U256::from(2u64)));
  }

  #[test]
  fn as_wei_value_folds_with_a_literal_amount_and_denomination() {
    let mut ns = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    let mut c = ctx(&ns);
    let args = vec![lit(ExprKind::Literal(Literal::Int(5))), lit(ExprKind::Literal(Literal::Str("finney".into())))];
    let ir = compile_builtin(Builtin::AsWeiValue, &args, &mut c, &span()).unwrap();
    assert_eq!(ir.value, crate::ir::IrValue::Int(U256::from(5_000_000_000_000_000u64)));
  }

  #[test]
  fn constant_module_variable_inlines_its_literal_instead_of_loading() {
    let mut ns = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    ns.enter_module_scope(&span()).unwrap();
    let x = crate::symbol::intern("x");
    ns.set(x, Entity::Var {
      ty: crate::types::ty::Type::Int(crate::types::prim::IntTy::U256),
      location: Location::Code(crate::types::CodeKind::Data),
      flags: crate::types::TypeFlags::CONSTANT,
      const_value: Some(Literal::Int(42)),
    }, &span()).unwrap();
    let mut c = ctx(&ns);
    let ir = compile_name(x, &mut c, &span()).unwrap();
    assert_eq!(ir.value, crate::ir::IrValue::Int(U256::from(42u64)));
  }

  #[test]
  fn ternary_requires_matching_branch_valency() {
    let mut ns = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    let mut c = ctx(&ns);
    let cond = lit(ExprKind::Literal(Literal::Bool(true)));
    let then = lit(ExprKind::Literal(Literal::Int(1)));
    let other = lit(ExprKind::Literal(Literal::Int(2)));
    let ir = compile_ternary(&cond, &then, &other, &mut c, &span()).unwrap();
    assert_eq!(ir.valency, 1);
  }
}
