//! Component D: the intermediate representation (spec.md §3 "IR node",
//! §4.D). An s-expression tree: every node either lowers directly to one
//! target [`opcodes::Opcode`] or is one of a small, fixed set of structured
//! macros (`seq`, `with`, `if`, `repeat`, `goto`/`label`, `multi`). Each node
//! carries a **valency** — 0 or 1 values left on the stack after it runs —
//! checked at construction time so that a malformed tree is a compiler bug
//! (`CompilerPanic`), never a user-facing diagnostic.

pub mod opcodes;

use std::rc::Rc;
use alloy_primitives::U256;
use crate::errors::{CovenantError, ErrorKind, Result};
use crate::span::FileSpan;
use crate::symbol::Symbol;
use opcodes::Opcode;

/// Where a byte buffer being sliced/measured actually lives (SPEC_FULL.md
/// §4.E supplement, resolving spec.md §9 Open Question 2): `slice`/`len`
/// need to know whether to emit `CALLDATACOPY`, `CODECOPY`, or
/// `EXTCODECOPY`, without smuggling that choice through a magic string on
/// the node's `value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceSpace {
  Memory,
  Calldata,
  /// This contract's own running code.
  SelfCode,
  /// Another contract's code, reached via `EXTCODECOPY` — the address
  /// expression is carried as the node's first argument.
  ExtCode,
}

/// The node payload: either a leaf target opcode/literal, or a structured
/// macro form (spec.md §4.D).
#[derive(Clone, Debug, PartialEq)]
pub enum IrValue {
  Op(Opcode),
  /// A literal 256-bit word, emitted by the assembler as a minimal `PUSHn`.
  Int(U256),
  /// `(seq a b c)`: evaluate each child in order, dropping all but the
  /// last's value. Valency equals the last child's valency.
  Seq,
  /// `(with x value body)`: bind `value` to fresh local slot `x`, evaluate
  /// `body`. Valency equals `body`'s.
  With(Symbol),
  /// `(if cond then [else])`: valency equals `then`'s valency (`else`, if
  /// present, must match; a missing `else` implies valency 0).
  If,
  /// `(repeat i start count body)`: loop `body` with `i` bound to
  /// `start..start+count`. Always valency 0.
  Repeat,
  /// `(goto label args...)`: jump to the start of `label`'s frame.
  Goto(Symbol),
  /// `(exit_to label args...)`: jump to just past `label`'s frame (the
  /// `break`/`return`/function-exit jump target).
  ExitTo(Symbol),
  /// `(label name (var_list ...) body)`: the jump target named `name`.
  Label(Symbol),
  VarList(Vec<Symbol>),
  /// `(multi a b c)`: an ABI-tuple-like grouping of independently-valued
  /// children, used only where a caller destructures several return values
  /// at once (spec.md §4.D).
  Multi,
  /// A no-op, valency 0.
  Pass,
  /// The constructor body / runtime body split (spec.md §4.G): the first
  /// child is the constructor, the second the runtime code to be appended
  /// to the deployed account. The carried `u64` is the byte length of the
  /// constructor-written immutables tail the deployed account's code gets
  /// appended with, after the runtime bytes (spec.md §4.E supplement).
  Deploy(u64),
}

/// One IR node. `args` are `Rc`-shared so the optimizer can graft shared
/// subtrees (e.g. a hoisted common sub-expression) without cloning them.
#[derive(Clone, Debug, PartialEq)]
pub struct IrNode {
  pub value: IrValue,
  pub args: Vec<Rc<IrNode>>,
  pub valency: u8,
  /// Present only on `SourceSpace::ExtCode`/`Calldata` buffer references
  /// produced by `slice`/`len` lowering (SPEC_FULL.md §4.E supplement).
  pub source_space: Option<SourceSpace>,
  /// A human-readable tag carried through to the assembly listing
  /// (`--format asm`), never affecting codegen.
  pub annotation: Option<String>,
  pub source_pos: Option<FileSpan>,
}

impl IrNode {
  fn leaf(value: IrValue, valency: u8, span: &FileSpan) -> Rc<IrNode> {
    Rc::new(IrNode { value, args: Vec::new(), valency, source_space: None, annotation: None, source_pos: Some(span.clone()) })
  }

  #[must_use] pub fn with_annotation(self: Rc<Self>, text: impl Into<String>) -> Rc<IrNode> {
    let mut n = (*self).clone();
    n.annotation = Some(text.into());
    Rc::new(n)
  }

  #[must_use] pub fn with_source_space(self: Rc<Self>, space: SourceSpace) -> Rc<IrNode> {
    let mut n = (*self).clone();
    n.source_space = Some(space);
    Rc::new(n)
  }

  /// A literal integer leaf.
  #[must_use] pub fn int(v: U256, span: &FileSpan) -> Rc<IrNode> { Self::leaf(IrValue::Int(v), 1, span) }

  /// `pass`: valency 0, no effect.
  #[must_use] pub fn pass(span: &FileSpan) -> Rc<IrNode> { Self::leaf(IrValue::Pass, 0, span) }

  /// Apply a target opcode to exactly `op.inputs()` argument nodes, each of
  /// valency 1. A mismatch is an internal-invariant violation: by the time
  /// codegen emits an opcode node the stack effect has already been
  /// determined by the type system, so a bad arity here can only be a
  /// compiler bug.
  pub fn op(op: Opcode, args: Vec<Rc<IrNode>>, span: &FileSpan) -> Result<Rc<IrNode>> {
    let want = op.inputs() as usize;
    if args.len() != want {
      return Err(panic_err(format!("opcode {} expects {want} operands, got {}", opcodes::mnemonic(op), args.len()), span));
    }
    for a in &args {
      if a.valency != 1 {
        return Err(panic_err(format!("operand to {} has valency {}, expected 1", opcodes::mnemonic(op), a.valency), span));
      }
    }
    Ok(Rc::new(IrNode { value: IrValue::Op(op), args, valency: op.outputs(), source_space: None, annotation: None, source_pos: Some(span.clone()) }))
  }

  /// `(seq ...)`: empty sequence folds to `pass` per SPEC_FULL.md §4.F
  /// supplement (valency 0); otherwise valency follows the last child.
  #[must_use] pub fn seq(children: Vec<Rc<IrNode>>, span: &FileSpan) -> Rc<IrNode> {
    let Some(last) = children.last() else { return Self::pass(span) };
    let valency = last.valency;
    Rc::new(IrNode { value: IrValue::Seq, args: children, valency, source_space: None, annotation: None, source_pos: Some(span.clone()) })
  }

  /// `(with x value body)`.
  pub fn with_binding(x: Symbol, value: Rc<IrNode>, body: Rc<IrNode>, span: &FileSpan) -> Result<Rc<IrNode>> {
    if value.valency != 1 {
      return Err(panic_err("`with` binding value must have valency 1".into(), span));
    }
    let valency = body.valency;
    Ok(Rc::new(IrNode { value: IrValue::With(x), args: vec![value, body], valency, source_space: None, annotation: None, source_pos: Some(span.clone()) }))
  }

  /// `(if cond then else?)`. `then` and a present `else` must agree on
  /// valency (spec.md §4.D); a missing `else` forces valency 0, matching a
  /// statement-position conditional with no value to merge.
  pub fn if_(cond: Rc<IrNode>, then: Rc<IrNode>, els: Option<Rc<IrNode>>, span: &FileSpan) -> Result<Rc<IrNode>> {
    if cond.valency != 1 {
      return Err(panic_err("`if` condition must have valency 1".into(), span));
    }
    let valency = match &els {
      Some(e) if e.valency == then.valency => then.valency,
      Some(_) => return Err(panic_err("`if`/`else` valency mismatch".into(), span)),
      None => 0,
    };
    let mut args = vec![cond, then];
    if let Some(e) = els { args.push(e); }
    Ok(Rc::new(IrNode { value: IrValue::If, args, valency, source_space: None, annotation: None, source_pos: Some(span.clone()) }))
  }

  /// `(repeat i start count body)`: always valency 0 (spec.md §4.D — loops
  /// are executed for effect only).
  pub fn repeat(i: Symbol, start: Rc<IrNode>, count: u64, body: Rc<IrNode>, span: &FileSpan) -> Result<Rc<IrNode>> {
    if start.valency != 1 {
      return Err(panic_err("`repeat` start bound must have valency 1".into(), span));
    }
    if body.valency != 0 {
      return Err(panic_err("`repeat` body must have valency 0".into(), span));
    }
    let count_node = Self::int(U256::from(count), span);
    let var_list = Rc::new(IrNode { value: IrValue::VarList(vec![i]), args: Vec::new(), valency: 0, source_space: None, annotation: None, source_pos: Some(span.clone()) });
    Ok(Rc::new(IrNode { value: IrValue::Repeat, args: vec![var_list, start, count_node, body], valency: 0, source_space: None, annotation: None, source_pos: Some(span.clone()) }))
  }

  /// `(goto label args...)`: valency 0, a tail jump.
  pub fn goto(label: Symbol, args: Vec<Rc<IrNode>>, span: &FileSpan) -> Rc<IrNode> {
    Rc::new(IrNode { value: IrValue::Goto(label), args, valency: 0, source_space: None, annotation: None, source_pos: Some(span.clone()) })
  }

  /// `(exit_to label args...)`: valency 0, jumps past the end of `label`'s
  /// frame (used for `break`, `return`, and implicit function fallthrough).
  pub fn exit_to(label: Symbol, args: Vec<Rc<IrNode>>, span: &FileSpan) -> Rc<IrNode> {
    Rc::new(IrNode { value: IrValue::ExitTo(label), args, valency: 0, source_space: None, annotation: None, source_pos: Some(span.clone()) })
  }

  /// `(label name (var_list ...) body)`: the jump target `goto`/`exit_to`
  /// refer to by symbol. Valency equals `body`'s.
  #[must_use] pub fn label(name: Symbol, vars: Vec<Symbol>, body: Rc<IrNode>, span: &FileSpan) -> Rc<IrNode> {
    let var_list = Rc::new(IrNode { value: IrValue::VarList(vars), args: Vec::new(), valency: 0, source_space: None, annotation: None, source_pos: Some(span.clone()) });
    let valency = body.valency;
    Rc::new(IrNode { value: IrValue::Label(name), args: vec![var_list, body], valency, source_space: None, annotation: None, source_pos: Some(span.clone()) })
  }

  /// `(multi a b c)`: every child must have valency 1; the group's own
  /// valency is the child count, used where the code generator needs to
  /// leave several independently-typed values on the stack at once (e.g.
  /// building the arguments to a struct constructor).
  pub fn multi(children: Vec<Rc<IrNode>>, span: &FileSpan) -> Result<Rc<IrNode>> {
    for c in &children {
      if c.valency != 1 {
        return Err(panic_err("`multi` child must have valency 1".into(), span));
      }
    }
    let valency = u8::try_from(children.len()).map_err(|_| panic_err("`multi` has too many children".into(), span))?;
    Ok(Rc::new(IrNode { value: IrValue::Multi, args: children, valency, source_space: None, annotation: None, source_pos: Some(span.clone()) }))
  }

  /// `(deploy constructor runtime)` (spec.md §4.G). `immutables_size` is the
  /// byte length of the constructor-written tail appended after `runtime`
  /// in the deployed account's code (0 when the module declares no
  /// `immutable` variables).
  pub fn deploy(constructor: Rc<IrNode>, runtime: Rc<IrNode>, immutables_size: u64, span: &FileSpan) -> Result<Rc<IrNode>> {
    if constructor.valency != 0 || runtime.valency != 0 {
      return Err(panic_err("constructor/runtime bodies must have valency 0".into(), span));
    }
    Ok(Rc::new(IrNode { value: IrValue::Deploy(immutables_size), args: vec![constructor, runtime], valency: 0, source_space: None, annotation: None, source_pos: Some(span.clone()) }))
  }

  /// An approximate, non-binding gas estimate (`--show-gas-estimates`,
  /// SPEC_FULL.md §4.F supplement): base cost of every opcode visited plus
  /// the data-dependent surcharges that are knowable statically — `COPY`
  /// opcodes and `LOGn` whose size operand is a literal.
  #[must_use] pub fn gas_estimate(&self) -> u64 {
    let own = match &self.value {
      IrValue::Op(op) => {
        let mut g = op.base_gas();
        g += self.literal_copy_surcharge(*op);
        g
      }
      IrValue::Int(_) => 3,
      _ => 1,
    };
    own + self.args.iter().map(|a| a.gas_estimate()).sum::<u64>()
  }

  fn literal_copy_surcharge(&self, op: Opcode) -> u64 {
    use Opcode::*;
    let size_arg = match op {
      CallDataCopy | CodeCopy | ReturnDataCopy => self.args.get(2),
      ExtCodeCopy => self.args.get(3),
      Log0 => self.args.get(1),
      Log1 => self.args.get(1),
      Log2 => self.args.get(1),
      Log3 => self.args.get(1),
      Log4 => self.args.get(1),
      _ => None,
    };
    let Some(arg) = size_arg else { return 0 };
    let IrValue::Int(n) = &arg.value else { return 0 };
    let n: u64 = (*n).try_into().unwrap_or(u64::MAX);
    match op {
      CallDataCopy | CodeCopy | ReturnDataCopy | ExtCodeCopy => 3 * n.div_ceil(32),
      Log0 | Log1 | Log2 | Log3 | Log4 => 8 * n,
      _ => 0,
    }
  }
}

fn panic_err(msg: String, span: &FileSpan) -> CovenantError {
  CovenantError::new(ErrorKind::CompilerPanic(msg), span.clone())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::rc::Rc as StdRc;

  fn span() -> FileSpan { FileSpan::synthetic(StdRc::from("t.cov")) }

  #[test]
  fn empty_seq_has_valency_zero() {
    let node = IrNode::seq(Vec::new(), &span());
    assert_eq!(node.valency, 0);
    assert_eq!(node.value, IrValue::Pass);
  }

  #[test]
  fn seq_valency_follows_last_child() {
    let a = IrNode::int(U256::from(1u64), &span());
    let node = IrNode::seq(vec![a.clone(), a], &span());
    assert_eq!(node.valency, 1);
  }

  #[test]
  fn op_rejects_wrong_arity() {
    let a = IrNode::int(U256::from(1u64), &span());
    let err = IrNode::op(opcodes::Opcode::Add, vec![a], &span());
    assert!(err.is_err());
  }

  #[test]
  fn if_requires_matching_branch_valency() {
    let cond = IrNode::int(U256::from(1u64), &span());
    let then_branch = IrNode::int(U256::from(2u64), &span());
    let else_branch = IrNode::pass(&span());
    let err = IrNode::if_(cond, then_branch, Some(else_branch), &span());
    assert!(err.is_err());
  }

  #[test]
  fn gas_estimate_adds_literal_copy_surcharge() {
    let dest = IrNode::int(U256::from(0u64), &span());
    let offset = IrNode::int(U256::from(0u64), &span());
    let size = IrNode::int(U256::from(64u64), &span());
    let node = IrNode::op(opcodes::Opcode::CallDataCopy, vec![dest, offset, size], &span()).unwrap();
    // base_gas(3) + 3 * ceil(64/32) == 9, plus each literal arg's own cost.
    assert!(node.gas_estimate() >= 9);
  }
}
