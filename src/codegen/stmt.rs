//! Statement lowering (spec.md §4.E): every [`Stmt`] lowers to a valency-0
//! [`IrNode`]. A function body lowers to one `seq` of its statements,
//! closed over the `exit_label` every `return` jumps past.

use std::rc::Rc;
use alloy_primitives::U256;
use crate::ast::{BinOp, Expr, ExprKind, IterExpr, Literal, Stmt, StmtKind};
use crate::errors::{CovenantError, ErrorKind, Result};
use crate::ir::opcodes::Opcode;
use crate::ir::IrNode;
use crate::semantics::Entity;
use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::types::Location;
use super::expr::compile_expr;
use super::CodegenCtx;

/// Lower a statement list to a single valency-0 node. `exit_label` is the
/// function's exit frame: every `return` compiles to `exit_to(exit_label,
/// values...)` (spec.md §4.E).
pub fn compile_block(body: &[Stmt], exit_label: Symbol, ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  let mut nodes = Vec::with_capacity(body.len());
  for stmt in body {
    nodes.push(compile_stmt(stmt, exit_label, ctx)?);
  }
  if nodes.is_empty() { return Ok(IrNode::pass(span)) }
  Ok(IrNode::seq(nodes, span))
}

fn compile_stmt(stmt: &Stmt, exit_label: Symbol, ctx: &mut CodegenCtx) -> Result<Rc<IrNode>> {
  let span = &stmt.span;
  match &stmt.kind {
    StmtKind::Expr(e) => {
      let ir = compile_expr(e, ctx)?;
      if ir.valency == 1 { IrNode::op(Opcode::Pop, vec![ir], span) } else { Ok(ir) }
    }
    StmtKind::Assign(target, value) => {
      let value_ir = compile_expr(value, ctx)?;
      compile_store(target, value_ir, ctx, span)
    }
    StmtKind::AugAssign(op, target, value) => {
      let current = compile_expr(target, ctx)?;
      let rhs = compile_expr(value, ctx)?;
      let opcode = aug_opcode(*op);
      let combined = IrNode::op(opcode, vec![current, rhs], span)?;
      compile_store(target, combined, ctx, span)
    }
    StmtKind::AnnAssign { name, value, .. } => {
      let slot = ctx.local_slot(*name);
      match value {
        Some(v) => {
          let ir = compile_expr(v, ctx)?;
          IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(slot), span), ir], span)
        }
        None => Ok(IrNode::pass(span)),
      }
    }
    StmtKind::If { cond, then, els } => {
      let cond_ir = compile_expr(cond, ctx)?;
      let then_ir = compile_block(then, exit_label, ctx, span)?;
      let else_ir = if els.is_empty() { None } else { Some(compile_block(els, exit_label, ctx, span)?) };
      IrNode::if_(cond_ir, then_ir, else_ir, span)
    }
    StmtKind::For { var, iter, body } => compile_for(*var, iter, body, exit_label, ctx, span),
    StmtKind::Return(exprs) => {
      let vals = exprs.iter().map(|e| compile_expr(e, ctx)).collect::<Result<Vec<_>>>()?;
      Ok(IrNode::exit_to(exit_label, vals, span))
    }
    StmtKind::Pass | StmtKind::Continue => Ok(IrNode::pass(span)),
    StmtKind::Break => Ok(IrNode::exit_to(exit_label, vec![], span)),
    StmtKind::Assert { cond, reason } => compile_assert(cond, reason.as_ref(), ctx, span),
    StmtKind::Raise(reason) => compile_raise(reason.as_ref(), span),
    StmtKind::Log { event, args } => compile_log(*event, args, ctx, span),
  }
}

fn compile_store(target: &Expr, value: Rc<IrNode>, ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  match &target.kind {
    // Arguments, locals, and loop variables are codegen-private memory
    // slots assigned by the caller (function entry, an inlined call's
    // prologue, a `for` unrolling) before the body compiles — Phase 2's
    // per-function scope that bound them is already exited by the time
    // codegen runs, so a local slot is always checked before the namespace
    // (spec.md §4.E).
    ExprKind::Name(name) if ctx.existing_local_slot(*name).is_some() => {
      let slot = ctx.existing_local_slot(*name).unwrap();
      IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(slot), span), value], span)
    }
    ExprKind::Name(name) => match ctx.namespace.get(*name, span)?.clone() {
      Entity::Var { location: Location::Storage, .. } => {
        let slot = *ctx.storage_slots.get(name).ok_or_else(|| internal("storage slot not assigned", span))?;
        IrNode::op(Opcode::SStore, vec![IrNode::int(U256::from(slot), span), value], span)
      }
      Entity::Var { location: Location::Code(_), .. } => Err(internal("constant/immutable variables are not assignable", span)),
      Entity::Var { .. } => {
        let slot = ctx.local_slot(*name);
        IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(slot), span), value], span)
      }
      _ => Err(internal("assignment target does not denote a variable", span)),
    },
    ExprKind::Subscript(base, index) => compile_subscript_store(base, index, value, ctx, span),
    ExprKind::Attribute(..) => Err(internal("struct field assignment is not yet lowerable", span)),
    _ => Err(internal("unsupported assignment target", span)),
  }
}

/// Mirrors `expr::compile_subscript`'s addressing so a write lands at the
/// same slot/offset a read of the same expression would load from.
fn compile_subscript_store(base: &Expr, index: &Expr, value: Rc<IrNode>, ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  use crate::semantics::annotate::infer;
  use crate::types::ty::Type;
  let base_ty = infer(base, ctx.namespace, None)?;
  let index_ir = compile_expr(index, ctx)?;
  match base_ty {
    Type::Mapping(..) => {
      let ExprKind::Name(base_name) = &base.kind else { return Err(internal("mapping base must be a storage variable name", span)) };
      let slot = *ctx.storage_slots.get(base_name).ok_or_else(|| internal("storage slot not assigned", span))?;
      let offset = ctx.alloc_memory_words(2);
      let write_index = IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(offset), span), index_ir], span)?;
      let write_slot = IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(offset + 32), span), IrNode::int(U256::from(slot), span)], span)?;
      let hash = IrNode::op(Opcode::Keccak256, vec![IrNode::int(U256::from(offset), span), IrNode::int(U256::from(64u64), span)], span)?;
      let store = IrNode::op(Opcode::SStore, vec![hash, value], span)?;
      Ok(IrNode::seq(vec![write_index, write_slot, store], span))
    }
    Type::StaticArray(..) | Type::DynArray(..) => {
      let base_ir = compile_expr(base, ctx)?;
      let word_offset = IrNode::op(Opcode::Mul, vec![index_ir, IrNode::int(U256::from(32u64), span)], span)?;
      let addr = IrNode::op(Opcode::Add, vec![base_ir, word_offset], span)?;
      IrNode::op(Opcode::MStore, vec![addr, value], span)
    }
    _ => Err(internal("unsupported subscript assignment base type", span)),
  }
}

fn aug_opcode(op: BinOp) -> Opcode {
  match op {
    BinOp::Add => Opcode::Add, BinOp::Sub => Opcode::Sub, BinOp::Mul => Opcode::Mul,
    BinOp::Div => Opcode::Div, BinOp::Mod => Opcode::Mod, BinOp::Pow => Opcode::Exp,
    BinOp::BitAnd => Opcode::And, BinOp::BitOr => Opcode::Or, BinOp::BitXor => Opcode::Xor,
    BinOp::Shl => Opcode::Shl, BinOp::Shr => Opcode::Shr,
  }
}

/// `for var in iter: body`: the safe-iteration rules Phase 2 already
/// enforced (`semantics::function::check_iterable`) guarantee every bound
/// here is a compile-time constant, so codegen fully unrolls the loop
/// instead of emitting a runtime jump-back — the trip count is always
/// known, and this sidesteps needing a way for an arbitrary body subtree
/// to read a `repeat`-bound induction variable's live value (spec.md §4.D
/// only binds `repeat`'s counter symbolically; there is no IR form to read
/// it back). Each iteration gets its own `MSTORE` of the concrete index
/// into `var`'s memory slot before the body runs.
fn compile_for(var: Symbol, iter: &IterExpr, body: &[Stmt], exit_label: Symbol, ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  let slot = ctx.local_slot(var);
  let mut iterations = Vec::new();
  match iter {
    IterExpr::Range1(bound) => {
      let n = literal_count(bound, span)?;
      for i in 0..n { iterations.push(IrNode::int(U256::from(i), span)) }
    }
    IterExpr::Range2(lo, hi) => {
      let (a, b) = literal_range_bounds(lo, hi, span)?;
      for i in a..b { iterations.push(IrNode::int(U256::from(i as u64), span)) }
    }
    IterExpr::RangeOffset { base, konst } => {
      let base_ir = compile_expr(base, ctx)?;
      for i in 0..*konst {
        iterations.push(IrNode::op(Opcode::Add, vec![base_ir.clone(), IrNode::int(U256::from(i), span)], span)?);
      }
    }
    IterExpr::List(items) => {
      for item in items { iterations.push(compile_expr(item, ctx)?) }
    }
    IterExpr::Expr(_) => return Err(internal("dynamic-length array iteration is not yet lowerable", span)),
  }
  let mut unrolled = Vec::with_capacity(iterations.len());
  for value in iterations {
    unrolled.push(IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(slot), span), value], span)?);
    unrolled.push(compile_block(body, exit_label, ctx, span)?);
  }
  if unrolled.is_empty() { return Ok(IrNode::pass(span)) }
  Ok(IrNode::seq(unrolled, span))
}

fn literal_count(bound: &Expr, span: &FileSpan) -> Result<u64> {
  match &bound.kind {
    ExprKind::Literal(Literal::Int(v)) if *v >= 0 => Ok(*v as u64),
    _ => Err(internal("range bound must be a non-negative literal", span)),
  }
}

fn literal_range_bounds(lo: &Expr, hi: &Expr, span: &FileSpan) -> Result<(i128, i128)> {
  let (ExprKind::Literal(Literal::Int(a)), ExprKind::Literal(Literal::Int(b))) = (&lo.kind, &hi.kind) else {
    return Err(internal("range bounds must be literal constants", span));
  };
  if b < a { return Err(internal("range upper bound must not be less than the lower bound", span)) }
  Ok((*a, *b))
}

fn compile_assert(cond: &Expr, reason: Option<&Literal>, ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  let cond_ir = compile_expr(cond, ctx)?;
  let failed = IrNode::op(Opcode::IsZero, vec![cond_ir], span)?;
  let revert = compile_raise(reason, span)?;
  IrNode::if_(failed, revert, None, span)
}

fn compile_raise(reason: Option<&Literal>, span: &FileSpan) -> Result<Rc<IrNode>> {
  let (offset, size) = match reason {
    Some(Literal::Str(s)) => (IrNode::int(U256::ZERO, span), IrNode::int(U256::from(s.len() as u64), span)),
    _ => (IrNode::int(U256::ZERO, span), IrNode::int(U256::ZERO, span)),
  };
  IrNode::op(Opcode::Revert, vec![offset, size], span)
}

fn compile_log(event: Symbol, args: &[Expr], ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  let Entity::Event(sig) = ctx.namespace.get(event, span)?.clone() else {
    return Err(internal("log target is not an event", span));
  };
  let mut topics = vec![];
  let mut data_words = vec![];
  for (arg, (_, _, indexed)) in args.iter().zip(sig.fields.iter()) {
    let ir = compile_expr(arg, ctx)?;
    if *indexed { topics.push(ir) } else { data_words.push(ir) }
  }
  if topics.len() > 4 {
    return Err(internal("an event may have at most 4 indexed fields", span));
  }
  let base = ctx.alloc_memory_words(data_words.len().max(1) as u64);
  let mut writes = Vec::with_capacity(data_words.len());
  for (i, w) in data_words.iter().enumerate() {
    writes.push(IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(base + (i as u64) * 32), span), Rc::clone(w)], span)?);
  }
  let mut log_args = vec![IrNode::int(U256::from(base), span), IrNode::int(U256::from(data_words.len() as u64 * 32), span)];
  log_args.extend(topics.iter().cloned());
  let log = IrNode::op(Opcode::log_n(topics.len() as u8), log_args, span)?;
  writes.push(log);
  Ok(IrNode::seq(writes, span))
}

fn internal(msg: &str, span: &FileSpan) -> CovenantError {
  CovenantError::new(ErrorKind::CovenantInternalException(msg.to_string()), span.clone())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::namespace::Namespace;
  use crate::semantics::module::install_builtin_scope;
  use crate::types::TypeFlags;

  fn span() -> FileSpan { FileSpan::synthetic(std::rc::Rc::from("t.cov")) }

  #[test]
  fn pass_statement_compiles_to_pass() {
    let mut ns = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    let mut ctx = CodegenCtx::new(&ns);
    let exit = crate::symbol::intern("$exit");
    let body = vec![Stmt { span: span(), kind: StmtKind::Pass }];
    let ir = compile_block(&body, exit, &mut ctx, &span()).unwrap();
    assert_eq!(ir.valency, 0);
  }

  #[test]
  fn return_statement_lowers_to_exit_to() {
    let mut ns = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    let mut ctx = CodegenCtx::new(&ns);
    let exit = crate::symbol::intern("$exit");
    let body = vec![Stmt { span: span(), kind: StmtKind::Return(vec![Expr { span: span(), kind: ExprKind::Literal(Literal::Int(1)) }]) }];
    let ir = compile_block(&body, exit, &mut ctx, &span()).unwrap();
    assert_eq!(ir.value, crate::ir::IrValue::ExitTo(exit));
  }

  #[test]
  fn assign_to_storage_var_emits_sstore() {
    let mut ns = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    let x = crate::symbol::intern("x");
    ns.set(x, Entity::Var { ty: crate::types::ty::Type::Bool, location: Location::Storage, flags: TypeFlags::empty(), const_value: None }, &span()).unwrap();
    let mut ctx = CodegenCtx::new(&ns);
    ctx.storage_slots.insert(x, 0);
    let exit = crate::symbol::intern("$exit");
    let target = Expr { span: span(), kind: ExprKind::Name(x) };
    let value = Expr { span: span(), kind: ExprKind::Literal(Literal::Bool(true)) };
    let body = vec![Stmt { span: span(), kind: StmtKind::Assign(target, value) }];
    let ir = compile_block(&body, exit, &mut ctx, &span()).unwrap();
    assert_eq!(ir.value, crate::ir::IrValue::Op(Opcode::SStore));
  }

  #[test]
  fn assert_false_reason_compiles_to_conditional_revert() {
    let mut ns = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    let mut ctx = CodegenCtx::new(&ns);
    let exit = crate::symbol::intern("$exit");
    let cond = Expr { span: span(), kind: ExprKind::Literal(Literal::Bool(false)) };
    let body = vec![Stmt { span: span(), kind: StmtKind::Assert { cond, reason: None } }];
    let ir = compile_block(&body, exit, &mut ctx, &span()).unwrap();
    assert_eq!(ir.value, crate::ir::IrValue::If);
  }
}
