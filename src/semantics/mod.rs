//! Component C: the semantic analyzer (spec.md §4.C). Two phases over a
//! parsed [`crate::ast::Module`]:
//!
//! 1. [`module`] — a forward-reference fixed point over top-level
//!    declarations, populating the module [`Namespace`] with [`Entity`]
//!    bindings, checking public-selector uniqueness and the internal
//!    call graph for cycles.
//! 2. [`function`] — per-function type-checking: terminus checking,
//!    mutability/environment-access rules, safe-iteration checks.
//!
//! [`annotate`] holds the bidirectional expression-typing judgment shared
//! by both phases and by component E (codegen re-walks the same AST under
//! the same rules to emit IR). [`folding`] implements compile-time
//! evaluation of builtin calls over literal arguments.

pub mod annotate;
pub mod folding;
pub mod function;
pub mod module;

use std::rc::Rc;
use crate::symbol::Symbol;
use crate::types::ty::{EnumDef, InterfaceDef, StructDef, Type};
use crate::types::Mutability;

/// A public or internal function's signature, as recorded in the
/// namespace once Phase 1 has resolved it.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionSig {
  pub name: Symbol,
  pub args: Vec<(Symbol, Type)>,
  pub ret: Option<Type>,
  pub external: bool,
  pub mutability: Mutability,
  pub nonreentrant_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EventSig {
  pub name: Symbol,
  pub fields: Vec<(Symbol, Type, bool)>,
}

/// The builtin function vocabulary (SPEC_FULL.md §4.B supplement): the
/// names pre-registered in the builtin scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
  Floor, Ceil, Len, Concat, Slice, Keccak256, Sha256, MethodId, AsWeiValue,
  Min, Max, Abs, Empty, Convert, RawCall, RawLog, CreateForwarderTo, PowMod256, AddMod, MulMod,
  Send, SelfDestruct, Assert, Raise, RangeBuiltin,
}

impl Builtin {
  /// All builtins the namespace pre-registers, by name.
  #[must_use] pub fn all() -> &'static [(&'static str, Builtin)] {
    &[
      ("floor", Builtin::Floor), ("ceil", Builtin::Ceil), ("len", Builtin::Len),
      ("concat", Builtin::Concat), ("slice", Builtin::Slice), ("keccak256", Builtin::Keccak256),
      ("sha256", Builtin::Sha256), ("method_id", Builtin::MethodId),
      ("as_wei_value", Builtin::AsWeiValue), ("min", Builtin::Min), ("max", Builtin::Max),
      ("abs", Builtin::Abs), ("empty", Builtin::Empty), ("convert", Builtin::Convert),
      ("raw_call", Builtin::RawCall), ("raw_log", Builtin::RawLog),
      ("create_forwarder_to", Builtin::CreateForwarderTo), ("pow_mod256", Builtin::PowMod256),
      ("addmod", Builtin::AddMod), ("mulmod", Builtin::MulMod), ("send", Builtin::Send),
      ("selfdestruct", Builtin::SelfDestruct),
    ]
  }
}

/// What a name in the namespace denotes (spec.md §3 "Namespace"). Generic
/// over this rather than hard-coding a `HashMap<Symbol, Type>` lets a
/// single scope stack carry functions, types, constants, and units
/// uniformly, matching the language's single flat namespace.
#[derive(Clone, Debug)]
pub enum Entity {
  /// `const_value` is `Some` only for `constant(...)`-declared module
  /// variables whose initializer folds to a literal; codegen inlines it
  /// directly instead of emitting a load (spec.md §8 S2).
  Var { ty: Type, location: crate::types::Location, flags: crate::types::TypeFlags, const_value: Option<crate::ast::Literal> },
  Function(Rc<FunctionSig>),
  Struct(Rc<StructDef>),
  Enum(Rc<EnumDef>),
  Interface(Rc<InterfaceDef>),
  Event(Rc<EventSig>),
  Builtin(Builtin),
}

/// The wei unit table (SPEC_FULL.md §3 supplement, matching
/// `vyper/context/datatypes/units.py`). `as_wei_value`'s second argument
/// names one of these by string literal, not by identifier — there is no
/// namespace entity for a unit, just this lookup table.
#[must_use] pub fn wei_units() -> &'static [(&'static str, u128)] {
  &[
    ("wei", 1),
    ("babbage", 1_000),
    ("kwei", 1_000),
    ("lovelace", 1_000_000),
    ("mwei", 1_000_000),
    ("shannon", 1_000_000_000),
    ("gwei", 1_000_000_000),
    ("szabo", 1_000_000_000_000),
    ("microether", 1_000_000_000_000),
    ("finney", 1_000_000_000_000_000),
    ("milliether", 1_000_000_000_000_000),
    ("ether", 1_000_000_000_000_000_000),
  ]
}
