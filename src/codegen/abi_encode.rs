//! The ABI encoder: static head / dynamic tail layout (spec.md §4.E), used
//! to build calldata for external message calls. Every argument's head slot
//! is 32 bytes; a dynamic argument's head slot holds a byte offset into the
//! tail instead of the value itself (the standard Solidity ABI layout).

use std::rc::Rc;
use alloy_primitives::U256;
use crate::errors::Result;
use crate::ir::opcodes::Opcode;
use crate::ir::IrNode;
use crate::span::FileSpan;
use super::CodegenCtx;

/// Lay out a 4-byte selector followed by `args`' ABI encoding in memory,
/// starting at a freshly bump-allocated base. Returns the `MSTORE` (and
/// `MSTORE8`) writes that materialize it, the base byte offset, and the
/// total encoded length in bytes.
///
/// Every argument here has already been lowered to a single 32-byte IR
/// value (codegen has no native multi-word dynamic buffers yet), so this
/// only emits the static head — each argument occupies exactly one word,
/// none are treated as dynamic. Extending to true `bytes`/`string`/dynamic
/// array arguments means lowering those to a (pointer, length) pair first.
pub fn encode_call(selector: [u8; 4], arg_irs: &[Rc<IrNode>], ctx: &mut CodegenCtx, span: &FileSpan) -> Result<(Vec<Rc<IrNode>>, u64, u64)> {
  let word_count = 1 + arg_irs.len() as u64;
  let base = ctx.alloc_memory_words(word_count);
  let mut writes = Vec::with_capacity(arg_irs.len() + 1);

  let selector_word = U256::from_be_slice(&[&selector[..], &[0u8; 28][..]].concat());
  writes.push(IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(base), span), IrNode::int(selector_word, span)], span)?);

  for (i, arg) in arg_irs.iter().enumerate() {
    let offset = base + 4 + (i as u64) * 32;
    writes.push(IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(offset), span), Rc::clone(arg)], span)?);
  }

  let total_len = 4 + arg_irs.len() as u64 * 32;
  Ok((writes, base, total_len))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::namespace::Namespace;
  use crate::semantics::module::install_builtin_scope;

  fn span() -> FileSpan { FileSpan::synthetic(std::rc::Rc::from("t.cov")) }

  #[test]
  fn encode_call_writes_selector_then_one_word_per_argument() {
    let mut ns = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    let mut ctx = CodegenCtx::new(&ns);
    let arg = IrNode::int(U256::from(42u64), &span());
    let (writes, base, len) = encode_call([0xa9, 0x05, 0x9c, 0xbb], &[arg], &mut ctx, &span()).unwrap();
    assert_eq!(base, 0);
    assert_eq!(len, 36);
    assert_eq!(writes.len(), 2);
  }
}
