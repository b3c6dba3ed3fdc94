//! Component B: the scoped, shadow-free symbol table (spec.md §3 "Namespace",
//! §4.B).
//!
//! A stack of scopes: one **builtin** (entered at most once per
//! compilation), exactly one **module** scope, then any number of
//! transient **block** scopes. `enter_scope` is a scoped-acquisition guard
//! (spec.md §9 design note): the returned [`ScopeGuard`] pops exactly the
//! bindings added since it was created, on every exit path including an
//! early return via `?`.

use hashbrown::HashMap;
use strsim::levenshtein;
use crate::errors::{CovenantError, ErrorKind, Result};
use crate::span::FileSpan;
use crate::symbol::Symbol;

/// Suggestion threshold for `UndeclaredDefinition` (SPEC_FULL.md §4.B).
const SUGGESTION_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind { Builtin, Module, Block }

struct Scope<V> {
  kind: ScopeKind,
  names: HashMap<Symbol, V>,
  /// Insertion order, for deterministic iteration (spec.md §4.B).
  order: Vec<Symbol>,
}

/// The namespace itself. Generic over the value type `V` bound to each
/// name so that callers with different "what does a name mean" payloads
/// (an `Entity`-like enum in a full compiler) can reuse the scoping logic.
pub struct Namespace<V> {
  scopes: Vec<Scope<V>>,
  builtin_entered: bool,
  module_entered: bool,
}

impl<V> Default for Namespace<V> {
  fn default() -> Self { Self { scopes: Vec::new(), builtin_entered: false, module_entered: false } }
}

impl<V> Namespace<V> {
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Enter the builtin scope. May be called at most once per compilation
  /// (spec.md §4.B); a second call is a *CompilerPanic*, matching the
  /// "resource acquired exactly once" discipline of §5.
  pub fn enter_builtin_scope(&mut self, span: &FileSpan) -> Result<()> {
    if self.builtin_entered {
      return Err(CovenantError::new(
        ErrorKind::CompilerPanic("enter_builtin_scope called more than once".into()), span.clone()))
    }
    self.builtin_entered = true;
    self.scopes.push(Scope { kind: ScopeKind::Builtin, names: HashMap::new(), order: Vec::new() });
    Ok(())
  }

  /// Enter the (unique) module scope. Must be nested inside the builtin
  /// scope (spec.md §4.B): calling this at root is a *CompilerPanic*.
  pub fn enter_module_scope(&mut self, span: &FileSpan) -> Result<()> {
    if !self.builtin_entered {
      return Err(CovenantError::new(
        ErrorKind::CompilerPanic("enter_scope called before enter_builtin_scope".into()), span.clone()))
    }
    if self.module_entered {
      return Err(CovenantError::new(
        ErrorKind::CompilerPanic("module scope entered more than once".into()), span.clone()))
    }
    self.module_entered = true;
    self.scopes.push(Scope { kind: ScopeKind::Module, names: HashMap::new(), order: Vec::new() });
    Ok(())
  }

  /// Enter a transient block scope (function body, `if`/`for` body). Must
  /// be nested inside the builtin scope.
  pub fn enter_scope(&mut self, span: &FileSpan) -> Result<ScopeDepth> {
    if !self.builtin_entered {
      return Err(CovenantError::new(
        ErrorKind::CompilerPanic("enter_scope called at root".into()), span.clone()))
    }
    self.scopes.push(Scope { kind: ScopeKind::Block, names: HashMap::new(), order: Vec::new() });
    Ok(ScopeDepth(self.scopes.len()))
  }

  /// Exit a scope, removing exactly the names added within it. A debug
  /// assertion checks LIFO discipline against the depth returned by the
  /// matching `enter_*` call (spec.md §9: "a debug-mode assertion verifies
  /// LIFO discipline").
  pub fn exit_scope(&mut self, depth: ScopeDepth) {
    debug_assert_eq!(self.scopes.len(), depth.0, "namespace scope exited out of LIFO order");
    self.scopes.pop();
  }

  /// Bind `name` in the innermost scope. Rejects if `name` already exists
  /// in any enclosing scope (spec.md §3 rule (a), §4.B): shadowing is
  /// never permitted, matching the language's single flat namespace for
  /// types/functions/variables.
  pub fn set(&mut self, name: Symbol, value: V, span: &FileSpan) -> Result<()> {
    if self.lookup_scope_index(name).is_some() {
      return Err(CovenantError::new(
        ErrorKind::NamespaceCollision(format!("'{name}' is already declared")), span.clone()))
    }
    let top = self.scopes.last_mut().expect("namespace has no active scope");
    top.order.push(name);
    top.names.insert(name, value);
    Ok(())
  }

  fn lookup_scope_index(&self, name: Symbol) -> Option<usize> {
    self.scopes.iter().rposition(|s| s.names.contains_key(&name))
  }

  /// Walk scopes leaf-to-root for `name`. `UndeclaredDefinition` on miss,
  /// with a Levenshtein-suggested neighbour at distance `<=
  /// SUGGESTION_THRESHOLD` if one exists (spec.md §4.B).
  pub fn get(&self, name: Symbol, span: &FileSpan) -> Result<&V> {
    if let Some(i) = self.lookup_scope_index(name) {
      return Ok(&self.scopes[i].names[&name])
    }
    Err(self.undeclared(name, span))
  }

  pub fn get_mut(&mut self, name: Symbol, span: &FileSpan) -> Result<&mut V> {
    if let Some(i) = self.lookup_scope_index(name) {
      return Ok(self.scopes[i].names.get_mut(&name).expect("checked by lookup_scope_index"))
    }
    Err(self.undeclared(name, span))
  }

  fn undeclared(&self, name: Symbol, span: &FileSpan) -> CovenantError {
    let target = crate::symbol::resolve(name);
    let suggestion = self.scopes.iter()
      .flat_map(|s| s.order.iter())
      .map(|&s| crate::symbol::resolve(s))
      .map(|cand| (levenshtein(&target, &cand), cand))
      .filter(|(d, _)| *d <= SUGGESTION_THRESHOLD && *d > 0)
      .min_by_key(|(d, _)| *d);
    let msg = match suggestion {
      Some((_, cand)) => format!("'{target}' is not defined. Did you mean '{cand}'?"),
      None => format!("'{target}' is not defined"),
    };
    CovenantError::new(ErrorKind::UndeclaredDefinition(msg), span.clone())
  }

  #[must_use] pub fn contains(&self, name: Symbol) -> bool { self.lookup_scope_index(name).is_some() }

  /// Names added in the current (innermost) scope, in insertion order —
  /// used by callers that need to enumerate a function's locals or a
  /// module's top-level bindings.
  #[must_use] pub fn current_scope_names(&self) -> &[Symbol] {
    self.scopes.last().map_or(&[], |s| &s.order)
  }
}

/// An opaque token returned by [`Namespace::enter_scope`], passed back to
/// [`Namespace::exit_scope`] to verify LIFO discipline.
#[derive(Clone, Copy, Debug)]
pub struct ScopeDepth(usize);

#[cfg(test)]
mod tests {
  use super::*;
  use std::rc::Rc;

  fn span() -> FileSpan { FileSpan::synthetic(Rc::from("t.cov")) }

  #[test]
  fn shadowing_in_an_enclosing_scope_is_rejected() {
    let mut ns: Namespace<i32> = Namespace::new();
    ns.enter_builtin_scope(&span()).unwrap();
    ns.enter_module_scope(&span()).unwrap();
    let x = crate::symbol::intern("x");
    ns.set(x, 1, &span()).unwrap();
    let depth = ns.enter_scope(&span()).unwrap();
    assert!(ns.set(x, 2, &span()).is_err());
    ns.exit_scope(depth);
  }

  #[test]
  fn exiting_a_scope_removes_only_its_own_bindings() {
    let mut ns: Namespace<i32> = Namespace::new();
    ns.enter_builtin_scope(&span()).unwrap();
    ns.enter_module_scope(&span()).unwrap();
    let outer = crate::symbol::intern("outer");
    ns.set(outer, 1, &span()).unwrap();
    let depth = ns.enter_scope(&span()).unwrap();
    let inner = crate::symbol::intern("inner");
    ns.set(inner, 2, &span()).unwrap();
    ns.exit_scope(depth);
    assert!(ns.contains(outer));
    assert!(!ns.contains(inner));
  }

  #[test]
  fn builtin_scope_can_only_be_entered_once() {
    let mut ns: Namespace<i32> = Namespace::new();
    ns.enter_builtin_scope(&span()).unwrap();
    assert!(ns.enter_builtin_scope(&span()).is_err());
  }

  #[test]
  fn undeclared_lookup_suggests_a_close_name() {
    let mut ns: Namespace<i32> = Namespace::new();
    ns.enter_builtin_scope(&span()).unwrap();
    ns.enter_module_scope(&span()).unwrap();
    let balance = crate::symbol::intern("balance");
    ns.set(balance, 1, &span()).unwrap();
    let err = ns.get(crate::symbol::intern("balence"), &span()).unwrap_err();
    assert!(format!("{}", err.kind).contains("balance"));
  }
}
