//! Component G: the assembler. Two phases (spec.md §4.G):
//!
//! 1. A structural descent over an [`crate::ir::IrNode`] tree, expanding
//!    each macro form into a flat list of [`AsmItem`]s — opcodes, literal
//!    `PUSH`es, and named jump targets that haven't yet been given a byte
//!    offset.
//! 2. Two-pass label resolution: assume every label reference is a
//!    `PUSH2`, lay out byte offsets, then iterate shrinking any reference
//!    whose target now fits in one byte down to `PUSH1`, re-laying-out
//!    until the assumed widths stop changing. Bounded by the number of
//!    distinct labels; non-convergence is a [`ErrorKind::CompilerPanic`]
//!    (can't happen for a well-formed tree, but keeps the driver total).
//!
//! `deploy` (spec.md §4.G) is handled as a special top-level form: the
//! runtime body is assembled to concrete bytes first, then appended as a
//! trailing blob after a constructor that `CODECOPY`s it into memory and
//! returns it — the runtime segment's start is just another label in the
//! constructor's own label space.

use std::rc::Rc;
use hashbrown::HashMap;
use std::collections::BTreeMap;
use alloy_primitives::U256;
use crate::errors::{CovenantError, ErrorKind, Result};
use crate::ir::opcodes::Opcode;
use crate::ir::{IrNode, IrValue};
use crate::span::FileSpan;
use crate::symbol::Symbol;

/// One assembler-level instruction, before label offsets are known.
#[derive(Clone, Debug, PartialEq)]
pub enum AsmItem {
  Op(Opcode),
  /// A literal word, emitted as the minimal `PUSHn` that fits it (`PUSH1`
  /// for zero).
  Push(U256),
  /// A forward/backward reference to a label's byte offset, emitted as
  /// `PUSH1`/`PUSH2` once resolution has settled on a width.
  PushLabel(Symbol),
  /// `JUMPDEST` at the current position, naming this offset `Symbol`.
  Label(Symbol),
  /// Opaque already-assembled bytes (the runtime segment, appended inside
  /// a `deploy` wrapper).
  Raw(Vec<u8>),
}

/// One [`AsmItem`] together with the source span it was lowered from, if
/// any (used to build the PC/source map, `--format source-map`).
#[derive(Clone, Debug)]
pub struct AsmLine {
  pub item: AsmItem,
  pub span: Option<FileSpan>,
}

impl AsmLine {
  fn new(item: AsmItem, span: Option<FileSpan>) -> Self { Self { item, span } }
}

/// The assembler's final output: concrete bytecode plus a PC-to-span map
/// for diagnostics and the `--format source-map` output (spec.md §6).
pub struct AssembledCode {
  pub bytecode: Vec<u8>,
  pub pc_pos_map: BTreeMap<u32, FileSpan>,
}

/// Assemble a complete IR tree. A root [`IrValue::Deploy`] node gets the
/// constructor/runtime split described above; any other root is assembled
/// as a single flat program (used for `--format opcodes-runtime` and
/// tests that don't go through a full `deploy` wrapper).
pub fn assemble(node: &Rc<IrNode>) -> Result<AssembledCode> {
  if let IrValue::Deploy(immutables_size) = &node.value {
    return assemble_deploy(&node.args[0], &node.args[1], *immutables_size);
  }
  assemble_plain(node)
}

fn assemble_plain(node: &Rc<IrNode>) -> Result<AssembledCode> {
  let mut gen = 0u64;
  let mut lines = Vec::new();
  lower(node, &mut lines, &mut gen)?;
  resolve(&lines)
}

/// The runtime body is assembled to bytes first (it has no dependency on
/// the constructor), then the constructor is assembled with a trailing
/// `CODECOPY`+`RETURN` wrapper that reads the runtime bytes back out of
/// its own code, followed by the runtime bytes themselves as an opaque
/// blob (spec.md §4.G). `immutables_size` widens the `RETURN` past the
/// runtime bytes alone: the constructor body (lowered above the wrapper)
/// writes each immutable's initial value into memory just past
/// `runtime_size`, so the deployed account's code ends up
/// `[runtime bytes][immutables blob]` (spec.md §4.E supplement). The
/// `CODECOPY` length is untouched — it only ever needs to pull the static
/// runtime bytes out of the constructor's own code.
fn assemble_deploy(constructor: &Rc<IrNode>, runtime: &Rc<IrNode>, immutables_size: u64) -> Result<AssembledCode> {
  let runtime_asm = assemble_plain(runtime)?;
  let runtime_size = runtime_asm.bytecode.len();

  let mut gen = 0u64;
  let mut lines = Vec::new();
  lower(constructor, &mut lines, &mut gen)?;

  let runtime_start = fresh(&mut gen, "runtime_start");
  let returned_size = runtime_size as u64 + immutables_size;
  lines.push(AsmLine::new(AsmItem::Push(U256::from(runtime_size)), None));
  lines.push(AsmLine::new(AsmItem::PushLabel(runtime_start), None));
  lines.push(AsmLine::new(AsmItem::Push(U256::ZERO), None));
  lines.push(AsmLine::new(AsmItem::Op(Opcode::CodeCopy), None));
  lines.push(AsmLine::new(AsmItem::Push(U256::from(returned_size)), None));
  lines.push(AsmLine::new(AsmItem::Push(U256::ZERO), None));
  lines.push(AsmLine::new(AsmItem::Op(Opcode::Return), None));
  lines.push(AsmLine::new(AsmItem::Label(runtime_start), None));
  lines.push(AsmLine::new(AsmItem::Raw(runtime_asm.bytecode), None));

  let mut resolved = resolve(&lines)?;
  // the runtime segment's own PC/source-map entries are relative to its
  // own assembly; reinsert them shifted by the offset the constructor+
  // wrapper occupy ahead of it.
  let shift = resolved.bytecode.len() as u32 - runtime_size as u32;
  for (pc, span) in runtime_asm.pc_pos_map {
    resolved.pc_pos_map.insert(pc + shift, span);
  }
  Ok(resolved)
}

fn fresh(gen: &mut u64, prefix: &str) -> Symbol {
  let n = *gen;
  *gen += 1;
  crate::symbol::intern(&format!("${prefix}{n}"))
}

/// A label `name`'s "just past its frame" target, referenced by
/// [`IrValue::ExitTo`] — distinct from `name` itself, which `goto` treats
/// as the frame's start.
fn exit_marker(name: Symbol) -> Symbol {
  crate::symbol::intern(&format!("{name}$exit"))
}

fn push_label(out: &mut Vec<AsmLine>, name: Symbol, span: &Option<FileSpan>) {
  out.push(AsmLine::new(AsmItem::PushLabel(name), span.clone()));
}

fn op(out: &mut Vec<AsmLine>, opcode: Opcode, span: &Option<FileSpan>) {
  out.push(AsmLine::new(AsmItem::Op(opcode), span.clone()));
}

/// Phase 1: descend an IR tree, expanding each macro form per spec.md
/// §4.G. Opcode operands are emitted in reverse argument order: an
/// `IrNode::op`'s `args` are stored in source order (`a - b` stores
/// `[a, b]`), but the target VM pops its first operand off the top of the
/// stack, so the *last*-listed argument must be pushed first to leave the
/// first-listed one on top when the opcode runs.
fn lower(node: &Rc<IrNode>, out: &mut Vec<AsmLine>, gen: &mut u64) -> Result<()> {
  let span = &node.source_pos;
  match &node.value {
    IrValue::Op(opcode) => {
      for a in node.args.iter().rev() { lower(a, out, gen)?; }
      op(out, *opcode, span);
    }
    IrValue::Int(v) => out.push(AsmLine::new(AsmItem::Push(*v), span.clone())),
    IrValue::Seq => {
      let n = node.args.len();
      for (i, a) in node.args.iter().enumerate() {
        lower(a, out, gen)?;
        if i + 1 != n && a.valency == 1 { op(out, Opcode::Pop, span); }
      }
    }
    IrValue::With(_) => {
      let (value, body) = (&node.args[0], &node.args[1]);
      lower(value, out, gen)?;
      lower(body, out, gen)?;
      if body.valency == 1 { op(out, Opcode::Swap(1), span); }
      op(out, Opcode::Pop, span);
    }
    IrValue::If => {
      let cond = &node.args[0];
      let then_b = &node.args[1];
      lower(cond, out, gen)?;
      op(out, Opcode::IsZero, span);
      match node.args.get(2) {
        Some(else_b) => {
          let else_label = fresh(gen, "else");
          let end_label = fresh(gen, "endif");
          push_label(out, else_label, span);
          op(out, Opcode::Jumpi, span);
          lower(then_b, out, gen)?;
          push_label(out, end_label, span);
          op(out, Opcode::Jump, span);
          out.push(AsmLine::new(AsmItem::Label(else_label), span.clone()));
          lower(else_b, out, gen)?;
          out.push(AsmLine::new(AsmItem::Label(end_label), span.clone()));
        }
        None => {
          let end_label = fresh(gen, "endif");
          push_label(out, end_label, span);
          op(out, Opcode::Jumpi, span);
          lower(then_b, out, gen)?;
          out.push(AsmLine::new(AsmItem::Label(end_label), span.clone()));
        }
      }
    }
    IrValue::Repeat => {
      let start = &node.args[1];
      let count_node = &node.args[2];
      let body = &node.args[3];
      let IrValue::Int(count) = &count_node.value else {
        return Err(panic_err("repeat bound must lower to a literal count".into(), node));
      };
      let count = *count;
      lower(start, out, gen)?;
      let loop_start = fresh(gen, "loop");
      let loop_end = fresh(gen, "loop_end");
      out.push(AsmLine::new(AsmItem::Label(loop_start), span.clone()));
      op(out, Opcode::Dup(1), span);
      out.push(AsmLine::new(AsmItem::Push(count), span.clone()));
      op(out, Opcode::Lt, span);
      op(out, Opcode::IsZero, span);
      push_label(out, loop_end, span);
      op(out, Opcode::Jumpi, span);
      lower(body, out, gen)?;
      out.push(AsmLine::new(AsmItem::Push(U256::from(1u64)), span.clone()));
      op(out, Opcode::Add, span);
      push_label(out, loop_start, span);
      op(out, Opcode::Jump, span);
      out.push(AsmLine::new(AsmItem::Label(loop_end), span.clone()));
      op(out, Opcode::Pop, span);
    }
    IrValue::Goto(label) => {
      for a in &node.args { lower(a, out, gen)?; }
      push_label(out, *label, span);
      op(out, Opcode::Jump, span);
    }
    IrValue::ExitTo(label) => {
      for a in &node.args { lower(a, out, gen)?; }
      push_label(out, exit_marker(*label), span);
      op(out, Opcode::Jump, span);
    }
    IrValue::Label(name) => {
      let body = &node.args[1];
      out.push(AsmLine::new(AsmItem::Label(*name), span.clone()));
      lower(body, out, gen)?;
      out.push(AsmLine::new(AsmItem::Label(exit_marker(*name)), span.clone()));
    }
    IrValue::VarList(_) => {}
    IrValue::Multi => { for a in &node.args { lower(a, out, gen)?; } }
    IrValue::Pass => {}
    IrValue::Deploy(_) => return Err(panic_err("`deploy` is only valid at the root of a compilation unit".into(), node)),
  }
  Ok(())
}

fn item_len(item: &AsmItem, widths: &HashMap<Symbol, u8>) -> u32 {
  match item {
    AsmItem::Op(_) => 1,
    AsmItem::Push(v) => 1 + u32::from(push_width(*v)),
    AsmItem::PushLabel(sym) => 1 + u32::from(widths[sym]),
    AsmItem::Label(_) => 1,
    AsmItem::Raw(bytes) => bytes.len() as u32,
  }
}

/// The minimal number of big-endian bytes needed to hold `v`, at least 1
/// (a `PUSH` always carries at least one immediate byte, even for zero).
fn push_width(v: U256) -> u8 {
  let bytes = v.to_be_bytes::<32>();
  let leading_zeros = bytes.iter().take_while(|b| **b == 0).count();
  u8::try_from(32 - leading_zeros).unwrap_or(32).max(1)
}

/// Phase 2: the two-pass (iterated-to-a-fixed-point) label resolver.
fn resolve(lines: &[AsmLine]) -> Result<AssembledCode> {
  let mut labels: Vec<Symbol> = Vec::new();
  for l in lines {
    if let AsmItem::PushLabel(s) = &l.item {
      if !labels.contains(s) { labels.push(*s); }
    }
  }
  let mut widths: HashMap<Symbol, u8> = labels.iter().map(|s| (*s, 2)).collect();

  let bound = labels.len() + 1;
  let mut offsets = HashMap::new();
  for _ in 0..bound {
    offsets.clear();
    let mut pc = 0u32;
    for l in lines {
      if let AsmItem::Label(name) = &l.item { offsets.insert(*name, pc); }
      pc += item_len(&l.item, &widths);
    }
    let mut changed = false;
    for name in &labels {
      let target = *offsets.get(name).ok_or_else(|| {
        CovenantError::new(ErrorKind::CompilerPanic(format!("label `{name}` is referenced but never defined")), synthetic_span())
      })?;
      let new_width = if target <= 0xff { 1 } else { 2 };
      if widths[name] != new_width {
        widths.insert(*name, new_width);
        changed = true;
      }
    }
    if !changed { return Ok(emit(lines, &widths, &offsets)); }
  }
  Err(CovenantError::new(ErrorKind::CompilerPanic("label width resolution did not converge".into()), synthetic_span()))
}

fn emit(lines: &[AsmLine], widths: &HashMap<Symbol, u8>, offsets: &HashMap<Symbol, u32>) -> AssembledCode {
  let mut bytecode = Vec::new();
  let mut pc_pos_map = BTreeMap::new();
  for l in lines {
    let pc = bytecode.len() as u32;
    match &l.item {
      AsmItem::Op(opcode) => bytecode.push(opcode_byte(*opcode)),
      AsmItem::Push(v) => push_bytes(&mut bytecode, *v, push_width(*v)),
      AsmItem::PushLabel(sym) => push_bytes(&mut bytecode, U256::from(offsets[sym]), widths[sym]),
      AsmItem::Label(_) => bytecode.push(opcode_byte(Opcode::JumpDest)),
      AsmItem::Raw(data) => bytecode.extend_from_slice(data),
    }
    if let Some(span) = &l.span { pc_pos_map.insert(pc, span.clone()); }
  }
  AssembledCode { bytecode, pc_pos_map }
}

fn push_bytes(out: &mut Vec<u8>, v: U256, width: u8) {
  out.push(0x5f + width);
  let be = v.to_be_bytes::<32>();
  out.extend_from_slice(&be[32 - width as usize..]);
}

/// `PUSH1`..`PUSH32` occupy `0x60..=0x7f`; every other opcode has a single
/// well-known byte value (standard EVM opcode table).
fn opcode_byte(op: Opcode) -> u8 {
  use Opcode::*;
  match op {
    Stop => 0x00, Add => 0x01, Mul => 0x02, Sub => 0x03, Div => 0x04, SDiv => 0x05,
    Mod => 0x06, SMod => 0x07, AddMod => 0x08, MulMod => 0x09, Exp => 0x0a, SignExtend => 0x0b,
    Lt => 0x10, Gt => 0x11, SLt => 0x12, SGt => 0x13, Eq => 0x14, IsZero => 0x15,
    And => 0x16, Or => 0x17, Xor => 0x18, Not => 0x19, Byte => 0x1a, Shl => 0x1b, Shr => 0x1c, Sar => 0x1d,
    Keccak256 => 0x20,
    Address => 0x30, Balance => 0x31, Origin => 0x32, Caller => 0x33, CallValue => 0x34,
    CallDataLoad => 0x35, CallDataSize => 0x36, CallDataCopy => 0x37, CodeSize => 0x38,
    CodeCopy => 0x39, GasPrice => 0x3a, ExtCodeSize => 0x3b, ExtCodeCopy => 0x3c,
    ReturnDataSize => 0x3d, ReturnDataCopy => 0x3e, ExtCodeHash => 0x3f,
    BlockHash => 0x40, Coinbase => 0x41, Timestamp => 0x42, Number => 0x43, Difficulty => 0x44,
    GasLimit => 0x45, ChainId => 0x46, SelfBalance => 0x47, BaseFee => 0x48,
    Pop => 0x50, MLoad => 0x51, MStore => 0x52, MStore8 => 0x53, SLoad => 0x54, SStore => 0x55,
    Jump => 0x56, Jumpi => 0x57, Pc => 0x58, MSize => 0x59, Gas => 0x5a, JumpDest => 0x5b,
    Log0 => 0xa0, Log1 => 0xa1, Log2 => 0xa2, Log3 => 0xa3, Log4 => 0xa4,
    Create => 0xf0, Call => 0xf1, CallCode => 0xf2, Return => 0xf3, DelegateCall => 0xf4,
    Create2 => 0xf5, StaticCall => 0xfa, Revert => 0xfd, Invalid => 0xfe, SelfDestruct => 0xff,
    Push => 0x60,
    Dup(n) => 0x7f + n,
    Swap(n) => 0x8f + n,
  }
}

/// Render assembled bytecode back to a space-separated mnemonic stream
/// (`--format opcodes`/`opcodes_runtime`/`asm`, spec.md §6). `PUSHn`
/// immediates render inline as hex, matching the disassembled listing
/// format the teacher's own instruction-dump tooling favors.
#[must_use] pub fn disassemble(bytecode: &[u8]) -> Vec<String> {
  let mut out = Vec::new();
  let mut i = 0usize;
  while i < bytecode.len() {
    let byte = bytecode[i];
    i += 1;
    if byte == 0x5f { out.push("PUSH0".to_string()); continue }
    if (0x60..=0x7f).contains(&byte) {
      let width = (byte - 0x5f) as usize;
      let end = (i + width).min(bytecode.len());
      out.push(format!("PUSH{width} 0x{}", hex::encode(&bytecode[i..end])));
      i = end;
      continue
    }
    if (0x80..=0x8f).contains(&byte) { out.push(format!("DUP{}", byte - 0x7f)); continue }
    if (0x90..=0x9f).contains(&byte) { out.push(format!("SWAP{}", byte - 0x8f)); continue }
    out.push(byte_mnemonic(byte).to_string());
  }
  out
}

fn byte_mnemonic(byte: u8) -> &'static str {
  match byte {
    0x00 => "STOP", 0x01 => "ADD", 0x02 => "MUL", 0x03 => "SUB", 0x04 => "DIV", 0x05 => "SDIV",
    0x06 => "MOD", 0x07 => "SMOD", 0x08 => "ADDMOD", 0x09 => "MULMOD", 0x0a => "EXP", 0x0b => "SIGNEXTEND",
    0x10 => "LT", 0x11 => "GT", 0x12 => "SLT", 0x13 => "SGT", 0x14 => "EQ", 0x15 => "ISZERO",
    0x16 => "AND", 0x17 => "OR", 0x18 => "XOR", 0x19 => "NOT", 0x1a => "BYTE", 0x1b => "SHL", 0x1c => "SHR", 0x1d => "SAR",
    0x20 => "KECCAK256",
    0x30 => "ADDRESS", 0x31 => "BALANCE", 0x32 => "ORIGIN", 0x33 => "CALLER", 0x34 => "CALLVALUE",
    0x35 => "CALLDATALOAD", 0x36 => "CALLDATASIZE", 0x37 => "CALLDATACOPY", 0x38 => "CODESIZE",
    0x39 => "CODECOPY", 0x3a => "GASPRICE", 0x3b => "EXTCODESIZE", 0x3c => "EXTCODECOPY",
    0x3d => "RETURNDATASIZE", 0x3e => "RETURNDATACOPY", 0x3f => "EXTCODEHASH",
    0x40 => "BLOCKHASH", 0x41 => "COINBASE", 0x42 => "TIMESTAMP", 0x43 => "NUMBER", 0x44 => "DIFFICULTY",
    0x45 => "GASLIMIT", 0x46 => "CHAINID", 0x47 => "SELFBALANCE", 0x48 => "BASEFEE",
    0x50 => "POP", 0x51 => "MLOAD", 0x52 => "MSTORE", 0x53 => "MSTORE8", 0x54 => "SLOAD", 0x55 => "SSTORE",
    0x56 => "JUMP", 0x57 => "JUMPI", 0x58 => "PC", 0x59 => "MSIZE", 0x5a => "GAS", 0x5b => "JUMPDEST",
    0xa0 => "LOG0", 0xa1 => "LOG1", 0xa2 => "LOG2", 0xa3 => "LOG3", 0xa4 => "LOG4",
    0xf0 => "CREATE", 0xf1 => "CALL", 0xf2 => "CALLCODE", 0xf3 => "RETURN", 0xf4 => "DELEGATECALL",
    0xf5 => "CREATE2", 0xfa => "STATICCALL", 0xfd => "REVERT", 0xfe => "INVALID", 0xff => "SELFDESTRUCT",
    _ => "UNKNOWN",
  }
}

fn synthetic_span() -> FileSpan { FileSpan::synthetic(std::rc::Rc::from("<assembler>")) }

fn panic_err(msg: String, node: &Rc<IrNode>) -> CovenantError {
  let span = node.source_pos.clone().unwrap_or_else(synthetic_span);
  CovenantError::new(ErrorKind::CompilerPanic(msg), span)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ir::IrNode;

  fn span() -> FileSpan { FileSpan::synthetic(std::rc::Rc::from("t.cov")) }

  #[test]
  fn sub_emits_operands_so_the_minuend_ends_on_top() {
    let a = IrNode::int(U256::from(10u64), &span());
    let b = IrNode::int(U256::from(3u64), &span());
    let node = IrNode::op(Opcode::Sub, vec![a, b], &span()).unwrap();
    let asm = assemble_plain(&node).unwrap();
    // PUSH1 3, PUSH1 10, SUB
    assert_eq!(asm.bytecode, vec![0x60, 3, 0x60, 10, 0x03]);
  }

  #[test]
  fn if_without_else_skips_forward_past_then() {
    let cond = IrNode::int(U256::from(1u64), &span());
    let then_b = IrNode::op(Opcode::Pop, vec![IrNode::int(U256::ZERO, &span())], &span()).unwrap();
    let node = IrNode::if_(cond, then_b, None, &span()).unwrap();
    let asm = assemble_plain(&node).unwrap();
    assert_eq!(asm.bytecode.first().copied(), Some(0x60));
    assert!(asm.bytecode.contains(&0x5b));
  }

  #[test]
  fn deploy_appends_runtime_bytes_verbatim_after_the_wrapper() {
    let ctor = IrNode::pass(&span());
    let runtime = IrNode::op(Opcode::Stop, vec![], &span()).unwrap();
    let deploy = IrNode::deploy(ctor, runtime, 0, &span()).unwrap();
    let asm = assemble(&deploy).unwrap();
    assert_eq!(asm.bytecode.last().copied(), Some(0x00));
  }

  #[test]
  fn deploy_return_length_widens_by_immutables_size() {
    let ctor = IrNode::pass(&span());
    let runtime = IrNode::op(Opcode::Stop, vec![], &span()).unwrap();
    let plain = IrNode::deploy(Rc::clone(&ctor), Rc::clone(&runtime), 0, &span()).unwrap();
    let widened = IrNode::deploy(ctor, runtime, 64, &span()).unwrap();
    let plain_asm = assemble(&plain).unwrap();
    let widened_asm = assemble(&widened).unwrap();
    assert_eq!(widened_asm.bytecode.len(), plain_asm.bytecode.len());
    assert!(widened_asm.bytecode.windows(2).any(|w| w == [0x60, 64]));
  }

  #[test]
  fn label_width_shrinks_when_the_target_fits_in_one_byte() {
    let body = IrNode::pass(&span());
    let labeled = IrNode::label(crate::symbol::intern("l"), vec![], body, &span());
    let asm = assemble_plain(&labeled).unwrap();
    assert!(asm.bytecode.contains(&0x5b));
  }

  #[test]
  fn disassemble_renders_push_immediates_inline() {
    let tokens = disassemble(&[0x60, 0x03, 0x60, 0x0a, 0x03, 0x00]);
    assert_eq!(tokens, vec!["PUSH1 0x03", "PUSH1 0x0a", "SUB", "STOP"]);
  }
}
