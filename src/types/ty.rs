//! The concrete [`Type`] representation and its uniform contract
//! (spec.md §4.A): `from_annotation`, `from_literal`, `compare_type`,
//! `validate_numeric_op`/`validate_boolean_op`/`validate_comparator`,
//! `get_index_type`, `get_member`, `fetch_call_return`.

use std::rc::Rc;
use crate::ast::{self, Literal, TypeAnnNode};
use crate::errors::{CovenantError, ErrorKind, Result};
use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::types::prim::{IntTy, Signedness};
use crate::types::{CodeKind, Location, Mutability, TypeFlags};

/// The literal/fixed-length distinction for `Bytes`/`String` (spec.md §3
/// invariant iv, §9 design note): a literal's bounds widen; a fixed length
/// is exact. Kept as a variant rather than two separate types so
/// `compare_type`'s tightening rule is one match arm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArrayLen {
  Fixed(u64),
  /// `min_length <= max_length`; both literal list/string/bytes literals
  /// and the result of comparing two literal-typed `ArrayValue`s tighten
  /// these bounds (spec.md §3 invariant iv).
  Literal { max_length: u64, min_length: u64 },
}

impl ArrayLen {
  #[must_use] pub fn max_length(self) -> u64 {
    match self { ArrayLen::Fixed(n) => n, ArrayLen::Literal { max_length, .. } => max_length }
  }
  #[must_use] pub fn is_literal(self) -> bool { matches!(self, ArrayLen::Literal { .. }) }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDef {
  pub name: Symbol,
  pub fields: Vec<(Symbol, Type)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumDef {
  pub name: Symbol,
  pub members: Vec<Symbol>,
}

impl EnumDef {
  /// Enums are bit-encoded (SPEC_FULL.md §3); member `k` occupies bit `k`.
  #[must_use] pub fn mask_for(&self, member: Symbol) -> Option<u128> {
    self.members.iter().position(|&m| m == member).map(|k| 1u128 << k)
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceFunction {
  pub name: Symbol,
  pub args: Vec<Type>,
  pub ret: Option<Type>,
  pub mutability: Mutability,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceDef {
  pub name: Symbol,
  pub functions: Vec<InterfaceFunction>,
}

/// The core type object (spec.md §3). Composite definitions are `Rc`-shared
/// so that every use site of a named struct/enum/interface points at the
/// same declaration without re-parsing it.
#[derive(Clone, Debug, PartialEq)]
pub enum Type {
  Bool,
  Int(IntTy),
  Decimal,
  Address,
  /// `bytesN`, `1 <= n <= 32`.
  BytesM(u8),
  Bytes(ArrayLen),
  Str(ArrayLen),
  StaticArray(Box<Type>, u64),
  DynArray(Box<Type>, u64),
  Struct(Rc<StructDef>),
  Enum(Rc<EnumDef>),
  Interface(Rc<InterfaceDef>),
  Mapping(Box<Type>, Box<Type>),
  Tuple(Vec<Type>),
}

impl Type {
  #[must_use] pub fn is_numeric(&self) -> bool { matches!(self, Type::Int(_) | Type::Decimal) }
  #[must_use] pub fn is_integer(&self) -> bool { matches!(self, Type::Int(_)) }
  #[must_use] pub fn is_value_type(&self) -> bool { !matches!(self, Type::Mapping(..)) }

  /// `true` for types whose ABI encoding has a runtime-dependent length
  /// (`is_dynamic` in spec.md §3's ABI-type projection); delegated to
  /// [`crate::types::abi`].
  #[must_use] pub fn is_dynamic(&self) -> bool { crate::types::abi::AbiLayout::of(self).is_dynamic }

  /// Structural equivalence (never raises), with the literal/fixed
  /// asymmetric widening rule from spec.md §3 invariant iv.
  #[must_use] pub fn compare_type(&self, other: &Type) -> bool {
    use Type::*;
    match (self, other) {
      (Bool, Bool) | (Decimal, Decimal) | (Address, Address) => true,
      (Int(a), Int(b)) => a == b,
      (BytesM(a), BytesM(b)) => a == b,
      (Bytes(a), Bytes(b)) | (Str(a), Str(b)) => Self::compare_array_len(*a, *b),
      (StaticArray(a, na), StaticArray(b, nb)) => na == nb && a.compare_type(b),
      (DynArray(a, na), DynArray(b, nb)) => na == nb && a.compare_type(b),
      (Struct(a), Struct(b)) => Rc::ptr_eq(a, b) || a.name == b.name,
      (Enum(a), Enum(b)) => Rc::ptr_eq(a, b) || a.name == b.name,
      (Interface(a), Interface(b)) => Rc::ptr_eq(a, b) || a.name == b.name,
      (Mapping(ka, va), Mapping(kb, vb)) => ka.compare_type(kb) && va.compare_type(vb),
      (Tuple(a), Tuple(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.compare_type(y)),
      _ => false,
    }
  }

  fn compare_array_len(a: ArrayLen, b: ArrayLen) -> bool {
    match (a, b) {
      (ArrayLen::Fixed(x), ArrayLen::Fixed(y)) => x == y,
      // literal vs fixed: the literal is compatible if it fits; tightening
      // happens at the call site (assignment), comparison here is just
      // "can these ever denote the same value" for `compare_type`'s
      // purposes, so require the literal's max to match the fixed length.
      (ArrayLen::Fixed(x), ArrayLen::Literal { max_length, .. })
      | (ArrayLen::Literal { max_length, .. }, ArrayLen::Fixed(x)) => max_length <= x,
      (ArrayLen::Literal { max_length: ma, .. }, ArrayLen::Literal { max_length: mb, .. }) => ma == mb,
    }
  }

  /// Tighten two literal-typed `ArrayValue`s against each other, or a
  /// literal against a fixed length (spec.md §3 invariant iv). Returns the
  /// resulting type for `self`'s side, or an error if the literal cannot
  /// fit the fixed bound.
  pub fn tighten_array_len(&self, target: &Type, span: &FileSpan) -> Result<Type> {
    match (self, target) {
      (Type::Bytes(a), Type::Bytes(b)) => Ok(Type::Bytes(Self::tighten(*a, *b, span)?)),
      (Type::Str(a), Type::Str(b)) => Ok(Type::Str(Self::tighten(*a, *b, span)?)),
      _ => Ok(self.clone()),
    }
  }

  fn tighten(a: ArrayLen, b: ArrayLen, span: &FileSpan) -> Result<ArrayLen> {
    match (a, b) {
      (ArrayLen::Literal { max_length: ma, .. }, ArrayLen::Literal { max_length: mb, .. }) => {
        let tight = ma.max(mb);
        Ok(ArrayLen::Literal { max_length: tight, min_length: tight })
      }
      (ArrayLen::Literal { max_length, .. }, ArrayLen::Fixed(n))
      | (ArrayLen::Fixed(n), ArrayLen::Literal { max_length, .. }) => {
        if max_length > n {
          return Err(CovenantError::new(
            ErrorKind::TypeMismatch(format!("literal of length {max_length} does not fit in bound {n}")),
            span.clone()))
        }
        Ok(ArrayLen::Fixed(n))
      }
      (ArrayLen::Fixed(x), ArrayLen::Fixed(y)) => {
        if x != y {
          return Err(CovenantError::new(
            ErrorKind::TypeMismatch(format!("length {x} does not match {y}")), span.clone()))
        }
        Ok(ArrayLen::Fixed(x))
      }
    }
  }

  /// Construct a [`Type`] from a parsed annotation. `lookup` resolves a bare
  /// `Name` node against the namespace for struct/enum/interface references;
  /// primitives are recognized here directly.
  pub fn from_annotation(
    node: &TypeAnnNode,
    location: Location,
    is_immutable: bool,
    is_public: bool,
    lookup: &mut dyn FnMut(Symbol, &FileSpan) -> Result<Type>,
    span: &FileSpan,
  ) -> Result<Type> {
    let _ = (location, is_immutable, is_public); // flags are attached by the caller, not the shape
    match node {
      TypeAnnNode::Name(sym) => Self::primitive_from_name(*sym).map_or_else(|| lookup(*sym, span), Ok),
      TypeAnnNode::StaticArray(elem, n) => {
        if *n == 0 {
          return Err(CovenantError::new(
            ErrorKind::StructureException("array length must be positive".into()), span.clone()))
        }
        let elem_ty = Self::from_annotation(elem, location, is_immutable, is_public, lookup, span)?;
        Self::reject_multidim_string_bytes(&elem_ty, span)?;
        Ok(Type::StaticArray(Box::new(elem_ty), *n))
      }
      TypeAnnNode::DynArray(elem, n) => {
        let elem_ty = Self::from_annotation(elem, location, is_immutable, is_public, lookup, span)?;
        Self::reject_multidim_string_bytes(&elem_ty, span)?;
        Ok(Type::DynArray(Box::new(elem_ty), *n))
      }
      TypeAnnNode::BytesM(n) => {
        if *n == 0 || *n > 32 {
          return Err(CovenantError::new(ErrorKind::UnknownType(format!("bytes{n}")), span.clone()))
        }
        Ok(Type::BytesM(*n))
      }
      TypeAnnNode::BoundedBytes(k) => Ok(Type::Bytes(ArrayLen::Fixed(*k))),
      TypeAnnNode::BoundedString(k) => Ok(Type::Str(ArrayLen::Fixed(*k))),
      TypeAnnNode::Mapping(k, v) => {
        if location != Location::Storage {
          return Err(CovenantError::new(
            ErrorKind::InvalidType("HashMap is only valid in storage".into()), span.clone()))
        }
        let kt = Self::from_annotation(k, location, is_immutable, is_public, lookup, span)?;
        let vt = Self::from_annotation(v, location, is_immutable, is_public, lookup, span)?;
        Ok(Type::Mapping(Box::new(kt), Box::new(vt)))
      }
      TypeAnnNode::Tuple(elems) => {
        let tys = elems.iter()
          .map(|e| Self::from_annotation(e, location, is_immutable, is_public, lookup, span))
          .collect::<Result<_>>()?;
        Ok(Type::Tuple(tys))
      }
    }
  }

  fn reject_multidim_string_bytes(elem_ty: &Type, span: &FileSpan) -> Result<()> {
    if matches!(elem_ty, Type::Bytes(_) | Type::Str(_)) {
      return Err(CovenantError::new(
        ErrorKind::StructureException("multidimensional subscripts on String/Bytes are not allowed".into()),
        span.clone()))
    }
    Ok(())
  }

  fn primitive_from_name(sym: Symbol) -> Option<Type> {
    let s = crate::symbol::resolve(sym);
    if let Some(rest) = s.strip_prefix("uint") {
      return rest.parse().ok().filter(|b: &u16| b % 8 == 0 && *b <= 256)
        .map(|bits| Type::Int(IntTy { signed: Signedness::Unsigned, bits }));
    }
    if let Some(rest) = s.strip_prefix("int") {
      return rest.parse().ok().filter(|b: &u16| b % 8 == 0 && *b <= 256)
        .map(|bits| Type::Int(IntTy { signed: Signedness::Signed, bits }));
    }
    match s.as_str() {
      "bool" => Some(Type::Bool),
      "decimal" => Some(Type::Decimal),
      "address" => Some(Type::Address),
      _ => None,
    }
  }

  /// The narrowest concrete type that can hold `literal` (spec.md §4.A).
  pub fn from_literal(literal: &Literal, span: &FileSpan) -> Result<Type> {
    match literal {
      Literal::Bool(_) => Ok(Type::Bool),
      Literal::Int(v) => IntTy::all_widths().find(|t| t.contains(*v))
        .map(Type::Int)
        .ok_or_else(|| CovenantError::new(
          ErrorKind::InvalidLiteral(format!("{v} does not fit any integer type")), span.clone())),
      Literal::Decimal(text) => {
        let frac_digits = text.split('.').nth(1).map_or(0, str::len);
        if frac_digits > 10 {
          return Err(CovenantError::new(
            ErrorKind::InvalidLiteral("decimal literal has more than 10 fractional digits".into()),
            span.clone()))
        }
        let whole: i128 = text.split('.').next().unwrap_or("0").parse()
          .map_err(|_| CovenantError::new(ErrorKind::InvalidLiteral("malformed decimal".into()), span.clone()))?;
        if !IntTy::I128.contains(whole) {
          return Err(CovenantError::new(
            ErrorKind::InvalidLiteral("decimal literal out of int128 range".into()), span.clone()))
        }
        Ok(Type::Decimal)
      }
      Literal::Str(s) => {
        let n = u64::try_from(s.chars().count()).unwrap_or(u64::MAX);
        Ok(Type::Str(ArrayLen::Literal { max_length: n, min_length: n }))
      }
      Literal::Bytes(b) => {
        let n = u64::try_from(b.len()).unwrap_or(u64::MAX);
        Ok(Type::Bytes(ArrayLen::Literal { max_length: n, min_length: n }))
      }
      Literal::HexAddress(hex) => {
        let digits = hex.trim_start_matches("0x");
        if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
          return Err(CovenantError::new(
            ErrorKind::InvalidLiteral("address literal must be 40 hex digits".into()), span.clone()))
        }
        if !crate::types::abi::eip55_checksum_matches(digits) {
          return Err(CovenantError::new(
            ErrorKind::InvalidLiteral("address literal fails EIP-55 checksum".into()), span.clone()))
        }
        Ok(Type::Address)
      }
      Literal::HexBytes32(hex) => {
        let digits = hex.trim_start_matches("0x");
        if digits.len() != 64 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
          return Err(CovenantError::new(
            ErrorKind::InvalidLiteral("bytes32 literal must be 64 hex digits".into()), span.clone()))
        }
        Ok(Type::BytesM(32))
      }
      Literal::Unreachable => Err(CovenantError::new(
        ErrorKind::InvalidLiteral("UNREACHABLE is not a value literal".into()), span.clone())),
    }
  }

  /// Raise *InvalidOperation* if `self` does not admit arithmetic `op`
  /// (spec.md §4.A): `uint256` forbids unary minus, `decimal` forbids
  /// `**`, non-numeric types forbid arithmetic entirely.
  pub fn validate_numeric_op(&self, op: ast::BinOp, span: &FileSpan) -> Result<()> {
    if !self.is_numeric() {
      return Err(CovenantError::new(
        ErrorKind::InvalidOperation(format!("{self:?} does not support arithmetic")), span.clone()))
    }
    if op == ast::BinOp::Pow && matches!(self, Type::Decimal) {
      return Err(CovenantError::new(
        ErrorKind::InvalidOperation("decimal does not support **".into()), span.clone()))
    }
    Ok(())
  }

  /// Raise *InvalidOperation* if `self` cannot be the sole operand of unary
  /// minus (`uint256` forbids it, spec.md §4.A).
  pub fn validate_unary_minus(&self, span: &FileSpan) -> Result<()> {
    if let Type::Int(t) = self {
      if t.signed == Signedness::Unsigned {
        return Err(CovenantError::new(
          ErrorKind::InvalidOperation(format!("{} does not support unary minus", t.name())), span.clone()))
      }
    }
    if !self.is_numeric() {
      return Err(CovenantError::new(
        ErrorKind::InvalidOperation("unary minus requires a numeric type".into()), span.clone()))
    }
    Ok(())
  }

  pub fn validate_boolean_op(&self, span: &FileSpan) -> Result<()> {
    if !matches!(self, Type::Bool) {
      return Err(CovenantError::new(
        ErrorKind::InvalidOperation(format!("{self:?} does not support boolean operators")), span.clone()))
    }
    Ok(())
  }

  /// Equality/inequality is allowed for all value types; ordering
  /// (`<`,`<=`,`>`,`>=`) requires a numeric type (spec.md §4.A).
  pub fn validate_comparator(&self, op: ast::CompareOp, span: &FileSpan) -> Result<()> {
    let ordering = matches!(op, ast::CompareOp::Lt | ast::CompareOp::LtE | ast::CompareOp::Gt | ast::CompareOp::GtE);
    if ordering && !self.is_numeric() {
      return Err(CovenantError::new(
        ErrorKind::InvalidOperation("ordering comparisons require a numeric type".into()), span.clone()))
    }
    if !ordering && !self.is_value_type() {
      return Err(CovenantError::new(
        ErrorKind::InvalidOperation(format!("{self:?} does not support equality comparison")), span.clone()))
    }
    Ok(())
  }

  /// Validate and classify an index expression's static properties
  /// (spec.md §4.A): static arrays require in-bounds literal indices when
  /// the index is itself a literal, dynamic arrays/mappings/tuples have
  /// their own rules.
  pub fn get_index_type(&self, index_ty: &Type, literal_index: Option<i128>, span: &FileSpan) -> Result<Type> {
    match self {
      Type::StaticArray(elem, n) => {
        if let Some(i) = literal_index {
          if i < 0 || i as u128 >= u128::from(*n) {
            return Err(CovenantError::new(
              ErrorKind::ArrayIndexException(format!("index {i} out of bounds for length {n}")), span.clone()))
          }
        } else if !index_ty.is_integer() {
          return Err(CovenantError::new(ErrorKind::TypeMismatch("array index must be an integer".into()), span.clone()))
        }
        Ok((**elem).clone())
      }
      Type::DynArray(elem, _) => {
        if !index_ty.is_integer() {
          return Err(CovenantError::new(ErrorKind::TypeMismatch("array index must be an integer".into()), span.clone()))
        }
        Ok((**elem).clone())
      }
      Type::Mapping(key, value) => {
        if !key.compare_type(index_ty) {
          return Err(CovenantError::new(ErrorKind::TypeMismatch(format!("mapping key must be {key:?}")), span.clone()))
        }
        Ok((**value).clone())
      }
      Type::Tuple(elems) => {
        let i = literal_index.ok_or_else(|| CovenantError::new(
          ErrorKind::TypeMismatch("tuple index must be a literal integer".into()), span.clone()))?;
        usize::try_from(i).ok().and_then(|i| elems.get(i)).cloned()
          .ok_or_else(|| CovenantError::new(
            ErrorKind::ArrayIndexException(format!("tuple index {i} out of bounds")), span.clone()))
      }
      _ => Err(CovenantError::new(ErrorKind::InvalidOperation(format!("{self:?} is not indexable")), span.clone())),
    }
  }

  /// Member access (spec.md §4.A): addresses expose `balance`, `codehash`,
  /// `codesize`, `is_contract`, `code`; structs expose declared fields;
  /// interfaces expose declared functions (as a [`Type::Tuple`]-shaped
  /// marker handled by the caller's call-lowering, not by this lookup).
  pub fn get_member(&self, name: Symbol, span: &FileSpan) -> Result<(Type, TypeFlags)> {
    let s = crate::symbol::resolve(name);
    match self {
      Type::Address => match s.as_str() {
        "balance" => Ok((Type::Int(IntTy::U256), TypeFlags::CONSTANT)),
        "codehash" => Ok((Type::BytesM(32), TypeFlags::CONSTANT)),
        "codesize" => Ok((Type::Int(IntTy::U256), TypeFlags::CONSTANT)),
        "is_contract" => Ok((Type::Bool, TypeFlags::CONSTANT)),
        "code" => Ok((Type::Bytes(ArrayLen::Fixed(u64::from(u32::MAX))), TypeFlags::empty())),
        _ => Err(CovenantError::new(ErrorKind::UnknownAttribute(format!("address has no member {s}")), span.clone())),
      },
      Type::Struct(def) => def.fields.iter().find(|(n, _)| crate::symbol::resolve(*n) == s)
        .map(|(_, ty)| (ty.clone(), TypeFlags::empty()))
        .ok_or_else(|| CovenantError::new(ErrorKind::UnknownAttribute(format!("no field {s} on struct")), span.clone())),
      _ => Err(CovenantError::new(ErrorKind::UnknownAttribute(format!("{self:?} has no member {s}")), span.clone())),
    }
  }

  /// For a callable type used in call position (a primitive cast, a struct
  /// constructor, or a function/interface-constructor call handled at a
  /// higher layer): the minimal shared checks — argument count — live here;
  /// argument *type* matching against a concrete signature is performed by
  /// the caller (which has access to the full signature, not just a type).
  pub fn fetch_call_return_cast(&self, args: &[Type], span: &FileSpan) -> Result<Type> {
    if args.len() != 1 {
      return Err(CovenantError::new(
        ErrorKind::ArgumentException(format!("cast to {self:?} takes exactly one argument")), span.clone()))
    }
    let src = &args[0];
    let ok = match self {
      Type::Int(_) => src.is_numeric() || matches!(src, Type::BytesM(_) | Type::Bool | Type::Address),
      Type::Bool => src.is_numeric() || matches!(src, Type::BytesM(_)),
      Type::Address => matches!(src, Type::BytesM(20) | Type::Int(_)),
      Type::BytesM(n) => matches!(src, Type::BytesM(_) | Type::Address) || (*n == 20 && matches!(src, Type::Address)),
      Type::Decimal => src.is_numeric(),
      _ => false,
    };
    if !ok {
      return Err(CovenantError::new(
        ErrorKind::TypeMismatch(format!("cannot cast {src:?} to {self:?}")), span.clone()))
    }
    Ok(self.clone())
  }
}

impl Location {
  #[must_use] pub fn immutables() -> Location { Location::Code(CodeKind::Immutable) }
}

impl std::fmt::Display for Type {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Type::Bool => write!(f, "bool"),
      Type::Int(t) => write!(f, "{}", t.name()),
      Type::Decimal => write!(f, "decimal"),
      Type::Address => write!(f, "address"),
      Type::BytesM(n) => write!(f, "bytes{n}"),
      Type::Bytes(l) => write!(f, "Bytes[{}]", l.max_length()),
      Type::Str(l) => write!(f, "String[{}]", l.max_length()),
      Type::StaticArray(t, n) => write!(f, "{t}[{n}]"),
      Type::DynArray(t, n) => write!(f, "DynArray[{t}, {n}]"),
      Type::Struct(d) => write!(f, "{}", d.name),
      Type::Enum(d) => write!(f, "{}", d.name),
      Type::Interface(d) => write!(f, "{}", d.name),
      Type::Mapping(k, v) => write!(f, "HashMap[{k}, {v}]"),
      Type::Tuple(tys) => write!(f, "({})", tys.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::rc::Rc;

  fn span() -> FileSpan { FileSpan::synthetic(Rc::from("t.cov")) }

  #[test]
  fn from_literal_picks_narrowest_unsigned_width() {
    let ty = Type::from_literal(&Literal::Int(200), &span()).unwrap();
    assert_eq!(ty, Type::Int(IntTy { signed: Signedness::Unsigned, bits: 8 }));
  }

  #[test]
  fn from_literal_picks_signed_width_for_negative() {
    let ty = Type::from_literal(&Literal::Int(-5), &span()).unwrap();
    assert_eq!(ty, Type::Int(IntTy { signed: Signedness::Signed, bits: 8 }));
  }

  #[test]
  fn decimal_literal_rejects_more_than_ten_fractional_digits() {
    let err = Type::from_literal(&Literal::Decimal("1.12345678901".into()), &span());
    assert!(err.is_err());
  }

  #[test]
  fn uint256_rejects_unary_minus() {
    let err = Type::Int(IntTy::U256).validate_unary_minus(&span());
    assert!(err.is_err());
  }

  #[test]
  fn decimal_rejects_pow() {
    let err = Type::Decimal.validate_numeric_op(ast::BinOp::Pow, &span());
    assert!(err.is_err());
  }

  #[test]
  fn ordering_requires_numeric() {
    assert!(Type::Bool.validate_comparator(ast::CompareOp::Lt, &span()).is_err());
    assert!(Type::Int(IntTy::U256).validate_comparator(ast::CompareOp::Lt, &span()).is_ok());
  }

  #[test]
  fn literal_bytes_tighten_against_fixed_bound() {
    let lit = Type::Bytes(ArrayLen::Literal { max_length: 10, min_length: 10 });
    let tight = lit.tighten_array_len(&Type::Bytes(ArrayLen::Fixed(32)), &span()).unwrap();
    assert_eq!(tight, Type::Bytes(ArrayLen::Fixed(32)));
  }

  #[test]
  fn literal_bytes_too_long_for_fixed_bound_errors() {
    let lit = Type::Bytes(ArrayLen::Literal { max_length: 40, min_length: 40 });
    assert!(lit.tighten_array_len(&Type::Bytes(ArrayLen::Fixed(32)), &span()).is_err());
  }

  #[test]
  fn static_array_literal_index_out_of_bounds() {
    let arr = Type::StaticArray(Box::new(Type::Bool), 3);
    assert!(arr.get_index_type(&Type::Int(IntTy::U256), Some(5), &span()).is_err());
    assert!(arr.get_index_type(&Type::Int(IntTy::U256), Some(1), &span()).is_ok());
  }
}
