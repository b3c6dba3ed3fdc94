//! Component A: the type system. Primitive and composite type objects;
//! assignability, comparison, member access, indexing, and literal
//! admission (spec.md §3, §4.A).

pub mod prim;
pub mod ty;
pub mod abi;

use bitflags::bitflags;

/// The data location a type (or a pointer to it) resides in (spec.md §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Location {
  Unset,
  Memory,
  Storage,
  Calldata,
  /// Code-space data, split into the immutables section (set once in the
  /// constructor, read in the runtime body) and the constant/data section
  /// (string/bytes literals baked into the bytecode).
  Code(CodeKind),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CodeKind { Immutable, Data }

bitflags! {
  /// `is_constant`, `is_immutable`, `is_public` (spec.md §3).
  #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
  pub struct TypeFlags: u8 {
    const CONSTANT  = 0b001;
    const IMMUTABLE = 0b010;
    const PUBLIC    = 0b100;
  }
}

/// Function/variable mutability, totally ordered `pure < view < nonpayable
/// < payable` (spec.md §3, GLOSSARY).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mutability { Pure, View, NonPayable, Payable }

impl Mutability {
  /// `true` if a caller with mutability `self` may call a callee with
  /// mutability `other` (spec.md §4.C: view forbids calling non-view/pure,
  /// pure forbids calling anything but pure).
  #[must_use] pub fn may_call(self, callee: Mutability) -> bool {
    match self {
      Mutability::Pure => callee == Mutability::Pure,
      Mutability::View => callee <= Mutability::View,
      Mutability::NonPayable | Mutability::Payable => true,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Visibility { External, Internal }
