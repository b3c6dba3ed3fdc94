//! Component F: the IR optimizer (spec.md §4.F). A pure, bounded
//! structural-descent rewrite over [`IrNode`] trees: constant folding,
//! algebraic identities, strength reduction, comparator canonicalization,
//! truthy rewrites, control-flow polarity swaps, branch pruning, store-
//! sequence peephole fusion, and dead `seq`/`if` collapsing. Never changes
//! observable behavior; only emits an equivalent, cheaper (or at least not
//! more expensive) tree.

use std::rc::Rc;
use alloy_primitives::U256;
use crate::ir::opcodes::Opcode;
use crate::ir::{IrNode, IrValue};
use crate::span::FileSpan;

/// Counters surfaced through `--show-gas-estimates`/`opt_ir` output
/// (SPEC_FULL.md §4.F supplement): purely observational, never fed back
/// into the rewrite itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct OptimizerStats {
  pub nodes_visited: u64,
  pub rules_fired: u64,
}

/// Rewrite `node` to a fixed point, bounded by the tree's own node count so
/// a buggy rule can never loop forever (mirrors the bound spec.md §4.G
/// places on PUSH-immediate sizing).
#[must_use] pub fn optimize(node: &Rc<IrNode>) -> (Rc<IrNode>, OptimizerStats) {
  let mut stats = OptimizerStats::default();
  let bound = node_count(node).max(1);
  let mut current = Rc::clone(node);
  for _ in 0..bound {
    let (next, changed) = rewrite_once(&current, &mut stats);
    if !changed { return (next, stats) }
    current = next;
  }
  (current, stats)
}

fn node_count(node: &IrNode) -> u64 {
  1 + node.args.iter().map(|a| node_count(a)).sum::<u64>()
}

fn rewrite_once(node: &Rc<IrNode>, stats: &mut OptimizerStats) -> (Rc<IrNode>, bool) {
  stats.nodes_visited += 1;
  let mut changed = false;
  let mut args = Vec::with_capacity(node.args.len());
  for a in &node.args {
    let (rewritten, c) = rewrite_once(a, stats);
    changed |= c;
    args.push(rewritten);
  }
  let span = node.source_pos.clone().unwrap_or_else(|| FileSpan::synthetic(std::rc::Rc::from("<opt>")));
  let mut rebuilt = Rc::new(IrNode { value: node.value.clone(), args, valency: node.valency, source_space: node.source_space, annotation: node.annotation.clone(), source_pos: node.source_pos.clone() });

  if let Some(folded) = fold_constants(&rebuilt, &span) {
    stats.rules_fired += 1;
    return (folded, true);
  }
  if let Some(simplified) = algebraic_identity(&rebuilt, &span) {
    stats.rules_fired += 1;
    rebuilt = simplified;
    changed = true;
  }
  if let Some(reduced) = strength_reduce(&rebuilt, &span) {
    stats.rules_fired += 1;
    rebuilt = reduced;
    changed = true;
  }
  if let Some(canon) = canonicalize_comparator(&rebuilt, &span) {
    stats.rules_fired += 1;
    rebuilt = canon;
    changed = true;
  }
  if let Some(truthy) = truthy_rewrite(&rebuilt, &span) {
    stats.rules_fired += 1;
    rebuilt = truthy;
    changed = true;
  }
  if let Some(swapped) = polarity_swap(&rebuilt) {
    stats.rules_fired += 1;
    rebuilt = swapped;
    changed = true;
  }
  if let Some(pruned) = prune_branch(&rebuilt) {
    stats.rules_fired += 1;
    rebuilt = pruned;
    changed = true;
  }
  if let Some(collapsed) = collapse_empty_seq(&rebuilt, &span) {
    stats.rules_fired += 1;
    rebuilt = collapsed;
    changed = true;
  }
  if let Some(fused) = fuse_store_sequence(&rebuilt, &span) {
    stats.rules_fired += 1;
    rebuilt = fused;
    changed = true;
  }
  (rebuilt, changed)
}

/// Fold a binary/unary opcode whose operands are all literal integers.
fn fold_constants(node: &Rc<IrNode>, span: &FileSpan) -> Option<Rc<IrNode>> {
  let IrValue::Op(op) = &node.value else { return None };
  let op = *op;
  let ints: Vec<U256> = node.args.iter().filter_map(|a| match &a.value { IrValue::Int(v) => Some(*v), _ => None }).collect();
  if ints.len() != node.args.len() { return None }
  let folded = match (op, ints.as_slice()) {
    (Opcode::Add, [a, b]) => a.wrapping_add(*b),
    (Opcode::Sub, [a, b]) => a.wrapping_sub(*b),
    (Opcode::Mul, [a, b]) => a.wrapping_mul(*b),
    (Opcode::Div, [a, b]) => if *b == U256::ZERO { U256::ZERO } else { *a / *b },
    (Opcode::Mod, [a, b]) => if *b == U256::ZERO { U256::ZERO } else { *a % *b },
    (Opcode::And, [a, b]) => *a & *b,
    (Opcode::Or, [a, b]) => *a | *b,
    (Opcode::Xor, [a, b]) => *a ^ *b,
    (Opcode::Not, [a]) => !*a,
    (Opcode::IsZero, [a]) => if *a == U256::ZERO { U256::from(1u64) } else { U256::ZERO },
    (Opcode::Eq, [a, b]) => if a == b { U256::from(1u64) } else { U256::ZERO },
    (Opcode::Lt, [a, b]) => if a < b { U256::from(1u64) } else { U256::ZERO },
    (Opcode::Gt, [a, b]) => if a > b { U256::from(1u64) } else { U256::ZERO },
    _ => return None,
  };
  Some(IrNode::int(folded, span))
}

/// A handful of the standard EVM-backend algebraic identities: `x + 0`,
/// `x * 1`, `x * 0`, `x - 0`, `x & 0`, `x | 0`.
fn algebraic_identity(node: &Rc<IrNode>, _span: &FileSpan) -> Option<Rc<IrNode>> {
  let IrValue::Op(op) = &node.value else { return None };
  let op = *op;
  let lit = |a: &Rc<IrNode>| match &a.value { IrValue::Int(v) => Some(*v), _ => None };
  match (op, node.args.as_slice()) {
    (Opcode::Add, [a, b]) if lit(b) == Some(U256::ZERO) => Some(Rc::clone(a)),
    (Opcode::Add, [a, b]) if lit(a) == Some(U256::ZERO) => Some(Rc::clone(b)),
    (Opcode::Sub, [a, b]) if lit(b) == Some(U256::ZERO) => Some(Rc::clone(a)),
    (Opcode::Mul, [a, b]) if lit(b) == Some(U256::from(1u64)) => Some(Rc::clone(a)),
    (Opcode::Mul, [a, b]) if lit(a) == Some(U256::from(1u64)) => Some(Rc::clone(b)),
    (Opcode::Mul, [_, b]) if lit(b) == Some(U256::ZERO) => Some(Rc::clone(b)),
    (Opcode::Mul, [a, _]) if lit(a) == Some(U256::ZERO) => Some(Rc::clone(a)),
    (Opcode::Or, [a, b]) if lit(b) == Some(U256::ZERO) => Some(Rc::clone(a)),
    (Opcode::And, [_, b]) if lit(b) == Some(U256::ZERO) => Some(Rc::clone(b)),
    (Opcode::Sub, [a, b]) if a == b => Some(IrNode::int(U256::ZERO, _span)),
    _ => None,
  }
}

/// Replace a power-of-two `mul`/`mod` with the equivalent `shl`/`and`
/// (spec.md §8 S5): `x * 32 -> x shl 5`, `x % 128 -> x and 127`.
fn strength_reduce(node: &Rc<IrNode>, span: &FileSpan) -> Option<Rc<IrNode>> {
  let IrValue::Op(op) = &node.value else { return None };
  let op = *op;
  let lit = |a: &Rc<IrNode>| match &a.value { IrValue::Int(v) => Some(*v), _ => None };
  match (op, node.args.as_slice()) {
    (Opcode::Mul, [a, b]) => {
      let shift = lit(b).and_then(power_of_two_exponent)?;
      IrNode::op(Opcode::Shl, vec![IrNode::int(U256::from(shift), span), Rc::clone(a)], span).ok()
    }
    (Opcode::Mod, [a, b]) => {
      let bits = lit(b)?;
      power_of_two_exponent(bits)?;
      IrNode::op(Opcode::And, vec![IrNode::int(bits - U256::from(1u64), span), Rc::clone(a)], span).ok()
    }
    _ => None,
  }
}

/// `Some(n)` if `v == 2^n` for some `n` in `1..256`, else `None` (`v == 1`
/// is left to the `x * 1` identity instead of a no-op shift).
fn power_of_two_exponent(v: U256) -> Option<u64> {
  if v <= U256::from(1u64) || !(v & (v - U256::from(1u64))).is_zero() { return None }
  Some(v.bit_len() as u64 - 1)
}

/// Eliminates `gt` from the IR vocabulary (spec.md §4.F comparator
/// canonicalization): against a literal bound it tightens into an `lt`
/// check one past it (`gt x k -> not (lt x (k+1))`, the named "tight-bound
/// tightening"), otherwise it's just an operand swap (`gt a b -> lt b a`).
/// `gt x MAX` can never hold, so it folds straight to `0`. Composes with
/// [`polarity_swap`] when the result lands as an `if` condition — the
/// `iszero` this introduces cancels against that rule's own negation
/// instead of costing an extra opcode. Signed `sgt`/`slt` are left alone:
/// the two's-complement wraparound at `MAX`/`MIN` makes the same `+1`
/// unsound without extra casework.
fn canonicalize_comparator(node: &Rc<IrNode>, span: &FileSpan) -> Option<Rc<IrNode>> {
  let IrValue::Op(Opcode::Gt) = &node.value else { return None };
  let lit = |a: &Rc<IrNode>| match &a.value { IrValue::Int(v) => Some(*v), _ => None };
  let [a, b] = node.args.as_slice() else { return None };
  if let Some(k) = lit(b) {
    if k == U256::MAX { return Some(IrNode::int(U256::ZERO, span)) }
    let lt = IrNode::op(Opcode::Lt, vec![Rc::clone(a), IrNode::int(k + U256::from(1u64), span)], span).ok()?;
    return IrNode::op(Opcode::IsZero, vec![lt], span).ok();
  }
  if let Some(k) = lit(a) {
    return IrNode::op(Opcode::Lt, vec![Rc::clone(b), IrNode::int(k, span)], span).ok();
  }
  IrNode::op(Opcode::Lt, vec![Rc::clone(b), Rc::clone(a)], span).ok()
}

/// `iszero(sub a b) -> eq a b` (spec.md §4.F truthy rewrites): the same
/// zero/nonzero test, one fewer opcode.
fn truthy_rewrite(node: &Rc<IrNode>, span: &FileSpan) -> Option<Rc<IrNode>> {
  let IrValue::Op(Opcode::IsZero) = &node.value else { return None };
  let [inner] = node.args.as_slice() else { return None };
  let IrValue::Op(Opcode::Sub) = &inner.value else { return None };
  let [a, b] = inner.args.as_slice() else { return None };
  IrNode::op(Opcode::Eq, vec![Rc::clone(a), Rc::clone(b)], span).ok()
}

/// `if (iszero c) then else -> if c else then` (spec.md §4.F control-flow
/// polarity swap): `assembler::lower`'s own `if` lowering already negates
/// its condition once via its own `iszero`+`jumpi`, so an `iszero` still
/// sitting at the IR level by the time it reaches an `if` condition is a
/// redundant double negation once the branches are swapped.
fn polarity_swap(node: &Rc<IrNode>) -> Option<Rc<IrNode>> {
  if node.value != IrValue::If { return None }
  let [cond, then, els] = node.args.as_slice() else { return None };
  let IrValue::Op(Opcode::IsZero) = &cond.value else { return None };
  let [c] = cond.args.as_slice() else { return None };
  Some(Rc::new(IrNode {
    value: IrValue::If, args: vec![Rc::clone(c), Rc::clone(els), Rc::clone(then)],
    valency: node.valency, source_space: node.source_space, annotation: node.annotation.clone(), source_pos: node.source_pos.clone(),
  }))
}

/// Adjacent store-sequence peephole fusion (spec.md §4.F, §2): a `seq`'s
/// children run strictly in order with nothing able to observe between two
/// consecutive ones, so two back-to-back `mstore`s to the identical
/// literal address make the first one dead, and two back-to-back
/// `calldatacopy`/`calldatacopy` or `codecopy`/`codecopy` pairs whose
/// literal dest/src/len line up end-to-end (`dest2 == dest1+len1`,
/// `src2 == src1+len1`) are one copy in disguise.
fn fuse_store_sequence(node: &Rc<IrNode>, span: &FileSpan) -> Option<Rc<IrNode>> {
  if node.value != IrValue::Seq { return None }
  let lit = |a: &Rc<IrNode>| match &a.value { IrValue::Int(v) => Some(*v), _ => None };
  for i in 0..node.args.len().saturating_sub(1) {
    let first = &node.args[i];
    let second = &node.args[i + 1];

    if let (IrValue::Op(Opcode::MStore), IrValue::Op(Opcode::MStore)) = (&first.value, &second.value) {
      if let (Some(addr1), Some(addr2)) = (lit(&first.args[0]), lit(&second.args[0])) {
        if addr1 == addr2 {
          let mut args = node.args.clone();
          args.remove(i);
          return Some(IrNode::seq(args, span));
        }
      }
    }

    for copy_op in [Opcode::CallDataCopy, Opcode::CodeCopy] {
      let (IrValue::Op(a_op), IrValue::Op(b_op)) = (&first.value, &second.value) else { continue };
      if *a_op != copy_op || *b_op != copy_op { continue }
      let Some((d1, s1, l1)) = lit(&first.args[0]).zip(lit(&first.args[1])).zip(lit(&first.args[2])).map(|((d, s), l)| (d, s, l)) else { continue };
      let Some((d2, s2)) = lit(&second.args[0]).zip(lit(&second.args[1])) else { continue };
      let Some(l2) = lit(&second.args[2]) else { continue };
      if d2 != d1 + l1 || s2 != s1 + l1 { continue }
      let fused_op = IrNode::op(copy_op, vec![IrNode::int(d1, span), IrNode::int(s1, span), IrNode::int(l1 + l2, span)], span).ok()?;
      let mut args = node.args.clone();
      args.splice(i..=i + 1, [fused_op]);
      return Some(IrNode::seq(args, span));
    }
  }
  None
}

/// `(if <literal-true> then else)` / `(if <literal-false> then else)`
/// collapses to whichever branch is statically taken.
fn prune_branch(node: &Rc<IrNode>) -> Option<Rc<IrNode>> {
  if node.value != IrValue::If { return None }
  let IrValue::Int(cond) = &node.args[0].value else { return None };
  let cond = *cond;
  if cond != U256::ZERO {
    Some(Rc::clone(&node.args[1]))
  } else {
    node.args.get(2).cloned().or_else(|| Some(IrNode::pass(&node.source_pos.clone().unwrap_or_else(|| FileSpan::synthetic(std::rc::Rc::from("<opt>"))))))
  }
}

/// `(seq x)` with a single child collapses to that child; an all-`pass`
/// sequence collapses to one `pass` (SPEC_FULL.md §4.F supplement).
fn collapse_empty_seq(node: &Rc<IrNode>, span: &FileSpan) -> Option<Rc<IrNode>> {
  if node.value != IrValue::Seq { return None }
  if node.args.len() == 1 { return Some(Rc::clone(&node.args[0])) }
  if node.args.iter().all(|a| a.value == IrValue::Pass) { return Some(IrNode::pass(span)) }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  fn span() -> FileSpan { FileSpan::synthetic(std::rc::Rc::from("t.cov")) }

  #[test]
  fn folds_constant_addition() {
    let a = IrNode::int(U256::from(2u64), &span());
    let b = IrNode::int(U256::from(3u64), &span());
    let add = IrNode::op(Opcode::Add, vec![a, b], &span()).unwrap();
    let (opt, stats) = optimize(&add);
    assert_eq!(opt.value, IrValue::Int(U256::from(5u64)));
    assert!(stats.rules_fired >= 1);
  }

  #[test]
  fn x_plus_zero_simplifies_to_x() {
    let x = IrNode::op(Opcode::CallDataLoad, vec![IrNode::int(U256::ZERO, &span())], &span()).unwrap();
    let zero = IrNode::int(U256::ZERO, &span());
    let add = IrNode::op(Opcode::Add, vec![x.clone(), zero], &span()).unwrap();
    let (opt, _) = optimize(&add);
    assert_eq!(opt.value, x.value);
  }

  #[test]
  fn literal_true_condition_prunes_to_then_branch() {
    let cond = IrNode::int(U256::from(1u64), &span());
    let then_branch = IrNode::int(U256::from(42u64), &span());
    let else_branch = IrNode::int(U256::from(0u64), &span());
    let node = IrNode::if_(cond, then_branch, Some(else_branch), &span()).unwrap();
    let (opt, _) = optimize(&node);
    assert_eq!(opt.value, IrValue::Int(U256::from(42u64)));
  }

  #[test]
  fn single_child_seq_collapses() {
    let a = IrNode::int(U256::from(9u64), &span());
    let seq = IrNode::seq(vec![a.clone()], &span());
    let (opt, _) = optimize(&seq);
    assert_eq!(opt.value, a.value);
  }

  #[test]
  fn x_sub_x_folds_to_zero() {
    let x = IrNode::op(Opcode::CallDataLoad, vec![IrNode::int(U256::ZERO, &span())], &span()).unwrap();
    let sub = IrNode::op(Opcode::Sub, vec![x.clone(), x.clone()], &span()).unwrap();
    let (opt, _) = optimize(&sub);
    assert_eq!(opt.value, IrValue::Int(U256::ZERO));
  }

  #[test]
  fn mul_by_power_of_two_becomes_shl() {
    let x = IrNode::op(Opcode::CallDataLoad, vec![IrNode::int(U256::ZERO, &span())], &span()).unwrap();
    let mul = IrNode::op(Opcode::Mul, vec![x, IrNode::int(U256::from(32u64), &span())], &span()).unwrap();
    let (opt, _) = optimize(&mul);
    assert_eq!(opt.value, IrValue::Op(Opcode::Shl));
    assert_eq!(opt.args[0].value, IrValue::Int(U256::from(5u64)));
  }

  #[test]
  fn mod_by_power_of_two_becomes_and() {
    let x = IrNode::op(Opcode::CallDataLoad, vec![IrNode::int(U256::ZERO, &span())], &span()).unwrap();
    let m = IrNode::op(Opcode::Mod, vec![x, IrNode::int(U256::from(128u64), &span())], &span()).unwrap();
    let (opt, _) = optimize(&m);
    assert_eq!(opt.value, IrValue::Op(Opcode::And));
    assert_eq!(opt.args[0].value, IrValue::Int(U256::from(127u64)));
  }

  #[test]
  fn gt_against_a_literal_tightens_into_iszero_of_lt() {
    let x = IrNode::op(Opcode::CallDataLoad, vec![IrNode::int(U256::ZERO, &span())], &span()).unwrap();
    let gt = IrNode::op(Opcode::Gt, vec![x, IrNode::int(U256::from(9u64), &span())], &span()).unwrap();
    let (opt, stats) = optimize(&gt);
    assert_eq!(opt.value, IrValue::Op(Opcode::IsZero));
    assert_eq!(opt.args[0].value, IrValue::Op(Opcode::Lt));
    assert_eq!(opt.args[0].args[1].value, IrValue::Int(U256::from(10u64)));
    assert!(stats.rules_fired >= 1);
  }

  #[test]
  fn gt_against_u256_max_always_folds_to_false() {
    let x = IrNode::op(Opcode::CallDataLoad, vec![IrNode::int(U256::ZERO, &span())], &span()).unwrap();
    let gt = IrNode::op(Opcode::Gt, vec![x, IrNode::int(U256::MAX, &span())], &span()).unwrap();
    let (opt, _) = optimize(&gt);
    assert_eq!(opt.value, IrValue::Int(U256::ZERO));
  }

  #[test]
  fn gt_of_two_non_literals_swaps_to_lt() {
    let x = IrNode::op(Opcode::CallDataLoad, vec![IrNode::int(U256::ZERO, &span())], &span()).unwrap();
    let y = IrNode::op(Opcode::CallDataLoad, vec![IrNode::int(U256::from(32u64), &span())], &span()).unwrap();
    let gt = IrNode::op(Opcode::Gt, vec![x.clone(), y.clone()], &span()).unwrap();
    let (opt, _) = optimize(&gt);
    assert_eq!(opt.value, IrValue::Op(Opcode::Lt));
    assert_eq!(opt.args[0].value, y.value);
    assert_eq!(opt.args[1].value, x.value);
  }

  #[test]
  fn iszero_of_sub_collapses_to_eq() {
    let x = IrNode::op(Opcode::CallDataLoad, vec![IrNode::int(U256::ZERO, &span())], &span()).unwrap();
    let y = IrNode::op(Opcode::CallDataLoad, vec![IrNode::int(U256::from(32u64), &span())], &span()).unwrap();
    let sub = IrNode::op(Opcode::Sub, vec![x, y], &span()).unwrap();
    let truthy = IrNode::op(Opcode::IsZero, vec![sub], &span()).unwrap();
    let (opt, _) = optimize(&truthy);
    assert_eq!(opt.value, IrValue::Op(Opcode::Eq));
  }

  #[test]
  fn if_on_an_iszero_condition_swaps_branches_and_drops_the_negation() {
    let c = IrNode::op(Opcode::CallDataLoad, vec![IrNode::int(U256::ZERO, &span())], &span()).unwrap();
    let negated = IrNode::op(Opcode::IsZero, vec![c], &span()).unwrap();
    let then_branch = IrNode::int(U256::from(1u64), &span());
    let else_branch = IrNode::int(U256::from(2u64), &span());
    let node = IrNode::if_(negated, then_branch, Some(else_branch), &span()).unwrap();
    let (opt, _) = optimize(&node);
    assert_eq!(opt.value, IrValue::If);
    assert_eq!(opt.args[0].value, IrValue::Op(Opcode::CallDataLoad));
    assert_eq!(opt.args[1].value, IrValue::Int(U256::from(2u64)));
    assert_eq!(opt.args[2].value, IrValue::Int(U256::from(1u64)));
  }

  #[test]
  fn adjacent_mstores_to_the_same_address_drop_the_first() {
    let addr = IrNode::int(U256::ZERO, &span());
    let first = IrNode::op(Opcode::MStore, vec![addr.clone(), IrNode::int(U256::from(1u64), &span())], &span()).unwrap();
    let second = IrNode::op(Opcode::MStore, vec![addr, IrNode::int(U256::from(2u64), &span())], &span()).unwrap();
    let seq = IrNode::seq(vec![first, second.clone()], &span());
    let (opt, stats) = optimize(&seq);
    assert_eq!(opt.value, second.value);
    assert_eq!(opt.args[1].value, IrValue::Int(U256::from(2u64)));
    assert!(stats.rules_fired >= 1);
  }

  #[test]
  fn adjacent_calldatacopies_that_line_up_fuse_into_one() {
    let first = IrNode::op(Opcode::CallDataCopy, vec![
      IrNode::int(U256::ZERO, &span()), IrNode::int(U256::from(4u64), &span()), IrNode::int(U256::from(32u64), &span()),
    ], &span()).unwrap();
    let second = IrNode::op(Opcode::CallDataCopy, vec![
      IrNode::int(U256::from(32u64), &span()), IrNode::int(U256::from(36u64), &span()), IrNode::int(U256::from(32u64), &span()),
    ], &span()).unwrap();
    let seq = IrNode::seq(vec![first, second], &span());
    let (opt, _) = optimize(&seq);
    assert_eq!(opt.value, IrValue::Op(Opcode::CallDataCopy));
    assert_eq!(opt.args[2].value, IrValue::Int(U256::from(64u64)));
  }
}
