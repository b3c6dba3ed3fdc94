//! String interning for identifiers.
//!
//! Every name that flows through the namespace, the AST, and the IR is
//! interned once into a [`Symbol`] so that equality and hashing are a
//! single integer comparison instead of a string compare. Mirrors the
//! `Symbol`/`Interner` split used throughout `mmcc`.

use std::cell::RefCell;
use std::fmt;
use hashbrown::HashMap;

/// An interned string. Cheap to copy, compare, and hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u32);

impl Symbol {
  /// The symbol for `_`, used as the "discard" binder name.
  pub const UNDER: Symbol = Symbol(0);

  pub(crate) fn into_usize(self) -> usize { self.0 as usize }
  fn from_usize(n: usize) -> Self { Symbol(u32::try_from(n).expect("too many interned strings")) }
}

impl fmt::Debug for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    with_interner(|i| write!(f, "{:?}", i.resolve(*self)))
  }
}
impl fmt::Display for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    with_interner(|i| write!(f, "{}", i.resolve(*self)))
  }
}

/// A string interner. One process-local instance backs the global [`intern`]
/// function; embedders that need isolation between compilations can still
/// construct their own via [`Interner::new`] and resolve through it directly.
#[derive(Default)]
pub struct Interner {
  strings: Vec<Box<str>>,
  map: HashMap<Box<str>, Symbol>,
}

impl Interner {
  /// Create a fresh interner pre-seeded with `_` at [`Symbol::UNDER`].
  #[must_use] pub fn new() -> Self {
    let mut this = Self::default();
    let sym = this.intern("_");
    debug_assert_eq!(sym, Symbol::UNDER);
    this
  }

  /// Intern `s`, returning the existing symbol if already present.
  pub fn intern(&mut self, s: &str) -> Symbol {
    if let Some(&sym) = self.map.get(s) { return sym }
    let sym = Symbol::from_usize(self.strings.len());
    let boxed: Box<str> = s.into();
    self.strings.push(boxed.clone());
    self.map.insert(boxed, sym);
    sym
  }

  /// Resolve a symbol back to its string. Panics if `sym` was not produced
  /// by this interner.
  #[must_use] pub fn resolve(&self, sym: Symbol) -> &str { &self.strings[sym.into_usize()] }
}

thread_local! {
  static GLOBAL: RefCell<Interner> = RefCell::new(Interner::new());
}

fn with_interner<R>(f: impl FnOnce(&Interner) -> R) -> R {
  GLOBAL.with(|i| f(&i.borrow()))
}

/// Intern a string into the global, thread-local interner.
pub fn intern(s: &str) -> Symbol { GLOBAL.with(|i| i.borrow_mut().intern(s)) }

/// Resolve a symbol interned via [`intern`] back to its text.
#[must_use] pub fn resolve(sym: Symbol) -> String { with_interner(|i| i.resolve(sym).to_owned()) }

/// Build a dense `Symbol -> T` lookup table sized to the current interner,
/// for the `scan`-generated primitive tables in [`crate::types::prim`].
#[must_use] pub fn init_dense_symbol_map<T: Copy>(pairs: &[(Symbol, T)]) -> Box<[Option<T>]> {
  let len = pairs.iter().map(|(s, _)| s.into_usize()).max().map_or(0, |n| n + 1);
  let mut table = vec![None; len].into_boxed_slice();
  for &(s, v) in pairs { table[s.into_usize()] = Some(v); }
  table
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interns_equal_strings_to_the_same_symbol() {
    let a = intern("foo");
    let b = intern("foo");
    let c = intern("bar");
    assert_eq!(a, b);
    assert_ne!(a, c);
  }

  #[test]
  fn resolves_back_to_the_original_text() {
    let s = intern("storage_slot");
    assert_eq!(resolve(s), "storage_slot");
  }
}
