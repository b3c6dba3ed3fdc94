//! Internal (intra-contract) function calls (spec.md §4.E). The call graph
//! is acyclic (spec.md §4.C `build_call_graph`), so every internal call is
//! resolved by inlining the callee's body at the call site rather than a
//! runtime jump-and-return: `goto`/`label`/`exit_to` have no way to push a
//! return address as a value, so there is nothing for a runtime `JUMP` to
//! jump back *to* (the same IR-expressiveness gap that drove unrolling
//! `for`-loops in [`super::stmt`]).
//!
//! Parameters and any locals the callee declares are renamed to a
//! call-site-unique symbol before the body is lowered, so repeated or
//! nested inlining never aliases two calls' memory slots. This renaming is
//! purely lexical: it does not distinguish a local name from an outer
//! (storage/module-level) declaration it happens to shadow. A callee whose
//! parameter or local name collides with a module-level name is not
//! supported by this lowering — a known limitation, not a restriction the
//! language itself imposes.

use std::rc::Rc;
use hashbrown::HashMap;
use alloy_primitives::U256;
use crate::ast::{Expr, ExprKind, FunctionDef, IterExpr, Stmt, StmtKind};
use crate::errors::Result;
use crate::ir::opcodes::Opcode;
use crate::ir::{IrNode, IrValue};
use crate::span::FileSpan;
use crate::symbol::Symbol;
use super::expr::compile_expr;
use super::stmt::compile_block;
use super::CodegenCtx;

/// Lower `callee(args...)` by substituting a fresh, call-site-unique symbol
/// for every parameter and locally-declared name in `callee`, writing the
/// (already-compiled-in-the-caller's-scope) argument values into those
/// slots, then lowering the renamed body under a fresh exit label.
pub fn compile_internal_call(callee: &FunctionDef, args: &[Expr], ctx: &mut CodegenCtx, span: &FileSpan) -> Result<Rc<IrNode>> {
  let call_id = ctx.fresh_label("call");
  let mut subst = HashMap::new();
  for a in &callee.args {
    subst.insert(a.name, mangle(a.name, call_id));
  }
  collect_locals(&callee.body, call_id, &mut subst);
  let body = rename_block(&callee.body, &subst);

  let mut writes = Vec::with_capacity(callee.args.len() + 1);
  for (param, arg_expr) in callee.args.iter().zip(args) {
    let value = compile_expr(arg_expr, ctx)?;
    let slot = ctx.local_slot(subst[&param.name]);
    writes.push(IrNode::op(Opcode::MStore, vec![IrNode::int(U256::from(slot), span), value], span)?);
  }

  let exit_label = ctx.fresh_label("inline_exit");
  let body_ir = compile_block(&body, exit_label, ctx, span)?;
  // `IrNode::label` always sets valency to its body's (a statement sequence
  // is always valency 0); bypass it here since a function with a declared
  // return type is guaranteed — by the type checker, before codegen ever
  // runs — to push exactly one value on every reachable exit.
  let ret_valency = u8::from(callee.ret.is_some());
  let var_list = Rc::new(IrNode {
    value: IrValue::VarList(vec![]), args: vec![], valency: 0,
    source_space: None, annotation: None, source_pos: Some(span.clone()),
  });
  let label_node = Rc::new(IrNode {
    value: IrValue::Label(exit_label), args: vec![var_list, body_ir], valency: ret_valency,
    source_space: None, annotation: None, source_pos: Some(span.clone()),
  });

  writes.push(label_node);
  Ok(IrNode::seq(writes, span))
}

fn mangle(name: Symbol, call_id: Symbol) -> Symbol {
  crate::symbol::intern(&format!("{name}${call_id}"))
}

fn collect_locals(body: &[Stmt], call_id: Symbol, subst: &mut HashMap<Symbol, Symbol>) {
  for s in body {
    match &s.kind {
      StmtKind::AnnAssign { name, .. } => { subst.entry(*name).or_insert_with(|| mangle(*name, call_id)); }
      StmtKind::If { then, els, .. } => { collect_locals(then, call_id, subst); collect_locals(els, call_id, subst); }
      StmtKind::For { var, body, .. } => {
        subst.entry(*var).or_insert_with(|| mangle(*var, call_id));
        collect_locals(body, call_id, subst);
      }
      _ => {}
    }
  }
}

fn rename_block(body: &[Stmt], subst: &HashMap<Symbol, Symbol>) -> Vec<Stmt> {
  body.iter().map(|s| rename_stmt(s, subst)).collect()
}

fn rename_stmt(s: &Stmt, subst: &HashMap<Symbol, Symbol>) -> Stmt {
  let kind = match &s.kind {
    StmtKind::Expr(e) => StmtKind::Expr(rename_expr(e, subst)),
    StmtKind::Assign(t, v) => StmtKind::Assign(rename_expr(t, subst), rename_expr(v, subst)),
    StmtKind::AugAssign(op, t, v) => StmtKind::AugAssign(*op, rename_expr(t, subst), rename_expr(v, subst)),
    StmtKind::AnnAssign { name, ty, value } => StmtKind::AnnAssign {
      name: subst.get(name).copied().unwrap_or(*name),
      ty: ty.clone(),
      value: value.as_ref().map(|v| rename_expr(v, subst)),
    },
    StmtKind::If { cond, then, els } => StmtKind::If {
      cond: rename_expr(cond, subst), then: rename_block(then, subst), els: rename_block(els, subst),
    },
    StmtKind::For { var, iter, body } => StmtKind::For {
      var: subst.get(var).copied().unwrap_or(*var),
      iter: rename_iter(iter, subst),
      body: rename_block(body, subst),
    },
    StmtKind::Return(exprs) => StmtKind::Return(exprs.iter().map(|e| rename_expr(e, subst)).collect()),
    StmtKind::Pass => StmtKind::Pass,
    StmtKind::Break => StmtKind::Break,
    StmtKind::Continue => StmtKind::Continue,
    StmtKind::Assert { cond, reason } => StmtKind::Assert { cond: rename_expr(cond, subst), reason: reason.clone() },
    StmtKind::Raise(r) => StmtKind::Raise(r.clone()),
    StmtKind::Log { event, args } => StmtKind::Log { event: *event, args: args.iter().map(|a| rename_expr(a, subst)).collect() },
  };
  Stmt { span: s.span.clone(), kind }
}

fn rename_expr(e: &Expr, subst: &HashMap<Symbol, Symbol>) -> Expr {
  let kind = match &e.kind {
    ExprKind::Literal(l) => ExprKind::Literal(l.clone()),
    ExprKind::Name(n) => ExprKind::Name(subst.get(n).copied().unwrap_or(*n)),
    ExprKind::Attribute(base, m) => ExprKind::Attribute(Box::new(rename_expr(base, subst)), *m),
    ExprKind::Subscript(base, idx) => ExprKind::Subscript(Box::new(rename_expr(base, subst)), Box::new(rename_expr(idx, subst))),
    ExprKind::Call { func, args, kwargs } => ExprKind::Call {
      func: Box::new(rename_expr(func, subst)),
      args: args.iter().map(|a| rename_expr(a, subst)).collect(),
      kwargs: kwargs.iter().map(|(k, v)| (*k, rename_expr(v, subst))).collect(),
    },
    ExprKind::BinOp(op, a, b) => ExprKind::BinOp(*op, Box::new(rename_expr(a, subst)), Box::new(rename_expr(b, subst))),
    ExprKind::BoolOp(op, items) => ExprKind::BoolOp(*op, items.iter().map(|x| rename_expr(x, subst)).collect()),
    ExprKind::UnaryOp(op, a) => ExprKind::UnaryOp(*op, Box::new(rename_expr(a, subst))),
    ExprKind::Compare(op, a, b) => ExprKind::Compare(*op, Box::new(rename_expr(a, subst)), Box::new(rename_expr(b, subst))),
    ExprKind::Ternary { cond, then, other } => ExprKind::Ternary {
      cond: Box::new(rename_expr(cond, subst)), then: Box::new(rename_expr(then, subst)), other: Box::new(rename_expr(other, subst)),
    },
    ExprKind::List(items) => ExprKind::List(items.iter().map(|x| rename_expr(x, subst)).collect()),
    ExprKind::Tuple(items) => ExprKind::Tuple(items.iter().map(|x| rename_expr(x, subst)).collect()),
    ExprKind::StructLit(name, fields) => ExprKind::StructLit(*name, fields.iter().map(|(k, v)| (*k, rename_expr(v, subst))).collect()),
  };
  Expr { span: e.span.clone(), kind }
}

fn rename_iter(it: &IterExpr, subst: &HashMap<Symbol, Symbol>) -> IterExpr {
  match it {
    IterExpr::Expr(e) => IterExpr::Expr(rename_expr(e, subst)),
    IterExpr::List(items) => IterExpr::List(items.iter().map(|x| rename_expr(x, subst)).collect()),
    IterExpr::Range1(a) => IterExpr::Range1(rename_expr(a, subst)),
    IterExpr::Range2(a, b) => IterExpr::Range2(rename_expr(a, subst), rename_expr(b, subst)),
    IterExpr::RangeOffset { base, konst } => IterExpr::RangeOffset { base: rename_expr(base, subst), konst: *konst },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::*;
  use crate::namespace::Namespace;
  use crate::semantics::module::install_builtin_scope;
  use crate::types::Mutability;

  fn span() -> FileSpan { FileSpan::synthetic(std::rc::Rc::from("t.cov")) }

  #[test]
  fn inlined_call_writes_argument_then_labels_the_return_value() {
    let mut ns = Namespace::new();
    install_builtin_scope(&mut ns, &span()).unwrap();
    let callee = FunctionDef {
      span: span(), name: crate::symbol::intern("double"),
      args: vec![FunctionArg { name: crate::symbol::intern("x"), ty: TypeAnnNode::Name(crate::symbol::intern("uint256")), default: None }],
      ret: Some(TypeAnnNode::Name(crate::symbol::intern("uint256"))),
      external: false, mutability: Mutability::Pure, nonreentrant: None,
      body: vec![Stmt { span: span(), kind: StmtKind::Return(vec![Expr {
        span: span(),
        kind: ExprKind::BinOp(BinOp::Add, Box::new(Expr { span: span(), kind: ExprKind::Name(crate::symbol::intern("x")) }), Box::new(Expr { span: span(), kind: ExprKind::Name(crate::symbol::intern("x")) })),
      }])}],
    };
    let mut ctx = CodegenCtx::new(&ns);
    let arg = Expr { span: span(), kind: ExprKind::Literal(Literal::Int(7)) };
    let ir = compile_internal_call(&callee, std::slice::from_ref(&arg), &mut ctx, &span()).unwrap();
    assert_eq!(ir.valency, 1);
  }
}
