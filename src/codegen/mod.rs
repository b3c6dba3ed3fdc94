//! Component E: the code generator. Walks a type-checked function body
//! (re-deriving types via [`crate::semantics::annotate`], the same
//! judgment Phase 2 already validated the body against) and emits
//! [`crate::ir::IrNode`] trees. Storage slots are assigned once per
//! module in declaration order; memory is a simple bump allocator reset
//! at the start of every function (spec.md §4.E).

pub mod abi_encode;
pub mod expr;
pub mod external_call;
pub mod inline;
pub mod stmt;

use hashbrown::HashMap;
use std::rc::Rc;
use alloy_primitives::U256;
use crate::ast::{Decl, FunctionDef, Module, VarModifier};
use crate::errors::{CovenantError, ErrorKind, Result};
use crate::ir::opcodes::Opcode;
use crate::ir::IrNode;
use crate::namespace::Namespace;
use crate::semantics::Entity;
use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::types::abi::AbiLayout;
use crate::types::ty::Type;

/// Per-module codegen state threaded through every function's lowering:
/// the storage layout (assigned once, in declaration order, spec.md §4.E),
/// a label-name counter for fresh jump targets, and a per-function memory
/// bump allocator that `enter_function` resets.
pub struct CodegenCtx<'ns> {
  pub namespace: &'ns Namespace<Entity>,
  pub storage_slots: HashMap<Symbol, u64>,
  next_storage_slot: u64,
  next_label: u64,
  pub memory_offset: u64,
  /// Memory-resident local variables' byte offsets, assigned lazily on
  /// first reference and cleared every function entry alongside
  /// `memory_offset` (spec.md §4.E).
  locals: HashMap<Symbol, u64>,
  /// Every module-level function, by name, so an internal call can look up
  /// its callee's body to inline (`codegen::inline`).
  pub functions: HashMap<Symbol, &'ns FunctionDef>,
  /// Each `immutable` module variable's byte offset into the immutables
  /// tail appended after the runtime bytes at deploy time (spec.md §4.E
  /// supplement), assigned once in declaration order by
  /// `assign_immutable_layout`.
  pub immutable_offsets: HashMap<Symbol, u64>,
  /// The total size in bytes of the immutables tail, i.e. the next free
  /// offset `assign_immutable_layout` would hand out.
  pub immutables_size: u64,
}

impl<'ns> CodegenCtx<'ns> {
  #[must_use] pub fn new(namespace: &'ns Namespace<Entity>) -> Self {
    Self {
      namespace, storage_slots: HashMap::new(), next_storage_slot: 0, next_label: 0, memory_offset: 0,
      locals: HashMap::new(), functions: HashMap::new(), immutable_offsets: HashMap::new(), immutables_size: 0,
    }
  }

  /// A local's memory slot, if one has already been assigned this function
  /// — unlike [`Self::local_slot`], never allocates. Used to distinguish a
  /// function argument/local (already bound by the time its body compiles)
  /// from a module-level name.
  #[must_use] pub fn existing_local_slot(&self, name: Symbol) -> Option<u64> { self.locals.get(&name).copied() }

  /// Index every function declaration by name, in declaration order
  /// (spec.md §4.E): internal calls resolve their callee through this map
  /// rather than re-walking the module on every call site.
  pub fn register_functions(&mut self, module: &'ns Module) {
    for decl in &module.decls {
      if let Decl::Function(f) = decl { self.functions.insert(f.name, f); }
    }
  }

  /// The memory byte offset backing local `name`, allocating a fresh word
  /// the first time it's referenced in the current function.
  pub fn local_slot(&mut self, name: Symbol) -> u64 {
    if let Some(&slot) = self.locals.get(&name) { return slot }
    let slot = self.alloc_memory_words(1);
    self.locals.insert(name, slot);
    slot
  }

  /// Assign a storage slot to every plain (non-constant, non-immutable)
  /// module variable, in declaration order — the simplest deterministic
  /// layout (spec.md §4.E; no packing, each value type occupies a whole
  /// word, matching the word-addressed storage model of §1).
  pub fn assign_storage_layout(&mut self, module: &Module) {
    for decl in &module.decls {
      if let Decl::Var(v) = decl {
        if v.modifier == VarModifier::Plain {
          self.storage_slots.insert(v.name, self.next_storage_slot);
          self.next_storage_slot += 1;
        }
      }
    }
  }

  /// Assign every `immutable` module variable a byte offset into the
  /// immutables tail, in declaration order (spec.md §4.E supplement): each
  /// occupies a whole word, the same no-packing layout
  /// `assign_storage_layout` uses for storage.
  pub fn assign_immutable_layout(&mut self, module: &Module) {
    for decl in &module.decls {
      if let Decl::Var(v) = decl {
        if v.modifier == VarModifier::Immutable {
          self.immutable_offsets.insert(v.name, self.immutables_size);
          self.immutables_size += 32;
        }
      }
    }
  }

  /// A fresh, module-unique label symbol, used for `if`/`for` jump targets
  /// and function entry/exit points.
  pub fn fresh_label(&mut self, prefix: &str) -> Symbol {
    let n = self.next_label;
    self.next_label += 1;
    crate::symbol::intern(&format!("${prefix}{n}"))
  }

  pub fn reset_memory(&mut self) { self.memory_offset = 0; self.locals.clear(); }

  /// Bump-allocate `words` 32-byte memory slots, returning the byte offset
  /// of the first one.
  pub fn alloc_memory_words(&mut self, words: u64) -> u64 {
    let offset = self.memory_offset;
    self.memory_offset += words * 32;
    offset
  }
}

/// Lower one function body to IR (spec.md §4.E): binds arguments (by
/// calldata offset for `external` functions, by local slot otherwise),
/// lowers the body's statements under a fresh exit label, and appends an
/// implicit `STOP`/fallthrough exit for functions with no declared return.
pub fn compile_function(f: &FunctionDef, ctx: &mut CodegenCtx) -> Result<Rc<IrNode>> {
  ctx.reset_memory();
  let mut writes = Vec::with_capacity(f.args.len());
  if f.external {
    // Public entry points read their arguments out of calldata, one head
    // slot per argument starting right after the 4-byte selector (spec.md
    // §4.E). Each argument's resolved type decides whether that slot is
    // the value itself or an offset into the dynamic tail.
    let Entity::Function(sig) = ctx.namespace.get(f.name, &f.span)? else {
      return Err(internal("function entity missing", &f.span));
    };
    let sig = Rc::clone(sig);
    for (i, arg) in f.args.iter().enumerate() {
      let ty = &sig.args[i].1;
      writes.push(compile_calldata_arg(i, arg.name, ty, ctx, &f.span)?);
    }
  }
  let exit_label = ctx.fresh_label("fn_exit");
  let body = stmt::compile_block(&f.body, exit_label, ctx, &f.span)?;
  let labeled = IrNode::label(exit_label, vec![], body, &f.span);
  let stop = IrNode::op(crate::ir::opcodes::Opcode::Stop, vec![], &f.span)?;
  writes.push(labeled);
  writes.push(stop);
  Ok(IrNode::seq(writes, &f.span))
}

/// Bind one `external` argument's local slot from calldata. A statically
/// sized type's head slot (`CALLDATALOAD(4 + 32*i)`) *is* the argument's
/// value. A dynamic type's (`bytes`/`string`/array) head slot instead holds
/// a byte offset to its tail, per the standard ABI layout
/// `abi_encode::encode_call` writes on the calling side; that tail's data
/// words (skipping the ABI length word) are copied out of calldata into a
/// fresh memory buffer, up to the type's compile-time size bound, and the
/// argument's slot holds a pointer to that buffer — the same length-less
/// pointer convention `expr::compile_subscript` already assumes for every
/// array value (spec.md §4.E supplement).
fn compile_calldata_arg(i: usize, name: Symbol, ty: &Type, ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  let head_offset = 4 + (i as u64) * 32;
  let head = IrNode::op(Opcode::CallDataLoad, vec![IrNode::int(U256::from(head_offset), span)], span)?;
  let slot = ctx.local_slot(name);
  if !AbiLayout::is_dynamic(ty) {
    return IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(slot), span), head], span);
  }
  // `head` is the tail offset relative to the start of the arguments
  // (i.e. right after the selector); the length word sits at `4 + head`
  // and the data words right after it.
  let tail_pos = IrNode::op(Opcode::Add, vec![IrNode::int(U256::from(4u64), span), head], span)?;
  let data_pos = IrNode::op(Opcode::Add, vec![tail_pos, IrNode::int(U256::from(32u64), span)], span)?;
  let bound = u64::from(AbiLayout::size_bound(ty).unwrap_or(32));
  let copy_words = bound.saturating_sub(32).div_ceil(32).max(1);
  let dest = ctx.alloc_memory_words(copy_words);
  let copy = IrNode::op(Opcode::CallDataCopy, vec![
    IrNode::int(U256::from(dest), span), data_pos, IrNode::int(U256::from(copy_words * 32), span),
  ], span)?;
  let store_ptr = IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(slot), span), IrNode::int(U256::from(dest), span)], span)?;
  Ok(IrNode::seq(vec![copy, store_ptr], span))
}

fn internal(msg: &str, span: &FileSpan) -> CovenantError {
  CovenantError::new(ErrorKind::CovenantInternalException(msg.to_string()), span.clone())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::*;
  use crate::semantics::module::install_builtin_scope;
  use crate::types::Mutability;

  fn span() -> FileSpan { FileSpan::synthetic(std::rc::Rc::from("t.cov")) }

  #[test]
  fn storage_layout_assigns_sequential_slots_to_plain_vars() {
    let mut ns = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    let module = Module {
      decls: vec![
        Decl::Var(ModuleVar { span: span(), name: crate::symbol::intern("a"), ty: TypeAnnNode::Name(crate::symbol::intern("uint256")), modifier: VarModifier::Plain, public: false, value: None }),
        Decl::Var(ModuleVar { span: span(), name: crate::symbol::intern("b"), ty: TypeAnnNode::Name(crate::symbol::intern("uint256")), modifier: VarModifier::Plain, public: false, value: None }),
      ],
    };
    let mut ctx = CodegenCtx::new(&ns);
    ctx.assign_storage_layout(&module);
    assert_eq!(ctx.storage_slots[&crate::symbol::intern("a")], 0);
    assert_eq!(ctx.storage_slots[&crate::symbol::intern("b")], 1);
  }

  #[test]
  fn empty_function_body_compiles_to_a_pass_wrapped_exit_label() {
    let mut ns = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    let f = FunctionDef {
      span: span(), name: crate::symbol::intern("noop"), args: vec![], ret: None, external: false,
      mutability: Mutability::NonPayable, nonreentrant: None, body: vec![Stmt { span: span(), kind: StmtKind::Pass }],
    };
    let mut ctx = CodegenCtx::new(&ns);
    let ir = compile_function(&f, &mut ctx).unwrap();
    assert_eq!(ir.valency, 0);
  }
}
