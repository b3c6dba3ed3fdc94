//! Component H: the compiler driver (spec.md §4.H). Holds the
//! in-progress artifacts of a single compilation unit
//! (`analyzed_ast -> ir -> optimized_ir -> assembly`, the `annotated_ast`
//! stage being the caller-supplied [`Module`] itself since the
//! parser/tokenizer producing it is out of scope — spec.md §1). Every
//! call to [`compile_module`] builds a fresh [`Namespace`] and
//! [`CodegenCtx`], so sequential compilations never observe one another's
//! symbols, constants, or storage layout (SPEC_FULL.md §4.H supplement).

use std::rc::Rc;
use alloy_primitives::U256;
use tracing::debug;
use crate::assembler::{self, AssembledCode};
use crate::ast::{Decl, Module, VarModifier};
use crate::codegen::{self, CodegenCtx};
use crate::config::CompilerConfig;
use crate::errors::{CovenantError, ErrorKind, Result};
use crate::ir::opcodes::Opcode;
use crate::ir::IrNode;
use crate::namespace::Namespace;
use crate::optimizer::{self, OptimizerStats};
use crate::semantics::{self, Entity, EventSig, FunctionSig};
use crate::span::FileSpan;

/// Everything produced for one compilation unit. Fields are public so a
/// caller asking for one `--format` doesn't pay to recompute artifacts it
/// already has (spec.md §4.H "each transition is memoized").
pub struct CompileArtifacts {
  pub runtime_ir: Rc<IrNode>,
  pub optimized_runtime_ir: Rc<IrNode>,
  pub optimizer_stats: OptimizerStats,
  pub deploy_ir: Rc<IrNode>,
  /// The runtime body alone, assembled independently of the deploy
  /// wrapper (`--format opcodes-runtime`/`bytecode-runtime`).
  pub assembled_runtime: AssembledCode,
  /// The full `deploy` tree: constructor, `CODECOPY`/`RETURN` wrapper,
  /// then the runtime bytes verbatim (`--format bytecode`).
  pub assembled: AssembledCode,
  /// Module variable name to storage slot (`--format layout`), the same
  /// assignment codegen used, by name rather than interned `Symbol` so it
  /// survives outside this process (e.g. into JSON).
  pub storage_layout: std::collections::BTreeMap<String, u64>,
  /// Every `external` function's resolved signature, in declaration
  /// order (`--format abi`/`method_identifiers`).
  pub abi_functions: Vec<Rc<FunctionSig>>,
  /// Every declared event's resolved signature (`--format abi`).
  pub abi_events: Vec<Rc<EventSig>>,
}

impl CompileArtifacts {
  #[must_use] pub fn runtime_bytecode(&self) -> &[u8] { &self.assembled_runtime.bytecode }
  #[must_use] pub fn deploy_bytecode(&self) -> &[u8] { &self.assembled.bytecode }
}

/// Compile one already-parsed module to bytecode (spec.md §4.H). `file`
/// names the compilation unit for diagnostics; `config` carries the
/// immutable per-compilation knobs (SPEC_FULL.md §7).
pub fn compile_module(module: &Module, file: &FileSpan, config: &CompilerConfig) -> Result<CompileArtifacts> {
  let mut namespace = Namespace::new();
  semantics::module::install_builtin_scope(&mut namespace, file)?;
  let analysis = semantics::module::analyze(module, namespace, file)?;
  let mut ns = analysis.namespace;
  for f in &analysis.functions {
    semantics::function::check_function(f, &mut ns, &analysis.functions)?;
  }
  debug!(functions = analysis.functions.len(), "phase 2 complete");

  let mut ctx = CodegenCtx::new(&ns);
  match &config.storage_layout {
    Some(layout) => ctx.storage_slots = layout.clone(),
    None => ctx.assign_storage_layout(module),
  }
  ctx.register_functions(module);
  ctx.assign_immutable_layout(module);

  let mut dispatch_arms = Vec::new();
  let mut abi_functions = Vec::new();
  for f in &analysis.functions {
    if !f.external { continue }
    let Entity::Function(sig) = ns.get(f.name, file)? else {
      return Err(internal(file, "a declared-external function has no function entity in the namespace"));
    };
    let selector_sig = format!("{}({})", f.name, sig.args.iter().map(|(_, ty)| crate::types::abi::selector_name(ty)).collect::<Vec<_>>().join(","));
    let selector = crate::types::abi::method_id(&selector_sig);
    let body = codegen::compile_function(f, &mut ctx)?;
    dispatch_arms.push((selector, body));
    abi_functions.push(Rc::clone(sig));
  }

  let mut abi_events = Vec::new();
  for decl in &module.decls {
    if let crate::ast::Decl::Event(e) = decl {
      if let Entity::Event(sig) = ns.get(e.name, file)? {
        abi_events.push(Rc::clone(sig));
      }
    }
  }

  let runtime_ir = build_dispatcher(&dispatch_arms, file)?;
  let (optimized_runtime_ir, optimizer_stats) = if config.optimize {
    optimizer::optimize(&runtime_ir)
  } else {
    (Rc::clone(&runtime_ir), OptimizerStats::default())
  };

  let assembled_runtime = assembler::assemble(&optimized_runtime_ir)?;
  let runtime_size = assembled_runtime.bytecode.len() as u64;

  // Every `immutable` gets written once, at deploy time, into the tail
  // appended after the runtime bytes (`assembler::assemble_deploy`); reads
  // happen in the runtime body via `codegen::expr::compile_name`. The two
  // never overlap in memory (`[0, runtime_size)` vs `[runtime_size, ..)`),
  // so there's no ordering constraint between these writes and the
  // `CODECOPY`/`RETURN` wrapper `assemble_deploy` appends after this IR.
  ctx.reset_memory();
  let mut ctor_writes = Vec::new();
  for decl in &module.decls {
    let Decl::Var(v) = decl else { continue };
    if v.modifier != VarModifier::Immutable { continue }
    let Some(value_expr) = &v.value else { continue };
    let value_ir = codegen::expr::compile_expr(value_expr, &mut ctx)?;
    let offset = ctx.immutable_offsets[&v.name];
    let addr = runtime_size + offset;
    ctor_writes.push(IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(addr), file), value_ir], file)?);
  }
  let constructor_ir = if ctor_writes.is_empty() { IrNode::pass(file) } else { IrNode::seq(ctor_writes, file) };
  let deploy_ir = IrNode::deploy(constructor_ir, Rc::clone(&optimized_runtime_ir), ctx.immutables_size, file)?;
  let assembled = assembler::assemble(&deploy_ir)?;
  let storage_layout = ctx.storage_slots.iter().map(|(s, slot)| (s.to_string(), *slot)).collect();

  Ok(CompileArtifacts { runtime_ir, optimized_runtime_ir, optimizer_stats, deploy_ir, assembled_runtime, assembled, storage_layout, abi_functions, abi_events })
}

/// Compile several named units independently (spec.md §4.H
/// `compile_codes`): each gets its own fresh namespace/allocator, so one
/// unit's failure doesn't prevent the others from compiling.
pub fn compile_modules(units: &[(String, Module)], config: &CompilerConfig) -> Vec<(String, Result<CompileArtifacts>)> {
  units.iter().map(|(name, module)| {
    let file = FileSpan::synthetic(Rc::from(name.as_str()));
    (name.clone(), compile_module(module, &file, config))
  }).collect()
}

/// The public-function selector switch (spec.md §4.E, §6): right-align
/// the first 4 calldata bytes via `SHR`, compare against each external
/// function's method id in declaration order, falling through to
/// `REVERT` if nothing matches.
fn build_dispatcher(arms: &[([u8; 4], Rc<IrNode>)], span: &FileSpan) -> Result<Rc<IrNode>> {
  let selector_word = {
    let loaded = IrNode::op(Opcode::CallDataLoad, vec![IrNode::int(U256::ZERO, span)], span)?;
    IrNode::op(Opcode::Shr, vec![IrNode::int(U256::from(224u64), span), loaded], span)?
  };
  let fallback = IrNode::op(Opcode::Revert, vec![IrNode::int(U256::ZERO, span), IrNode::int(U256::ZERO, span)], span)?;
  let mut chain = fallback;
  for (selector, body) in arms.iter().rev() {
    let want = U256::from_be_slice(&selector[..]);
    let matches = IrNode::op(Opcode::Eq, vec![IrNode::int(want, span), Rc::clone(&selector_word)], span)?;
    chain = IrNode::if_(matches, Rc::clone(body), Some(chain), span)?;
  }
  Ok(chain)
}

fn internal(span: &FileSpan, msg: &str) -> CovenantError {
  CovenantError::new(ErrorKind::CovenantInternalException(msg.to_string()), span.clone())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::*;
  use crate::types::Mutability;

  fn span() -> FileSpan { FileSpan::synthetic(std::rc::Rc::from("t.cov")) }

  fn sample_module() -> Module {
    Module {
      decls: vec![
        Decl::Function(FunctionDef {
          span: span(), name: crate::symbol::intern("get_value"),
          args: vec![], ret: Some(TypeAnnNode::Name(crate::symbol::intern("uint256"))),
          external: true, mutability: Mutability::View, nonreentrant: None,
          body: vec![Stmt { span: span(), kind: StmtKind::Return(vec![Expr { span: span(), kind: ExprKind::Literal(Literal::Int(7)) }]) }],
        }),
      ],
    }
  }

  #[test]
  fn compiling_a_module_twice_never_shares_storage_slots_or_labels() {
    let module = sample_module();
    let config = CompilerConfig::new();
    let a = compile_module(&module, &span(), &config).unwrap();
    let b = compile_module(&module, &span(), &config).unwrap();
    assert_eq!(a.runtime_bytecode(), b.runtime_bytecode());
  }

  #[test]
  fn dispatcher_reverts_when_no_external_function_matches() {
    let module = Module { decls: vec![] };
    let config = CompilerConfig::new();
    let artifacts = compile_module(&module, &span(), &config).unwrap();
    assert!(artifacts.runtime_bytecode().contains(&0xfd));
  }
}
