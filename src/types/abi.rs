//! The ABI-type projection (spec.md §3): `is_dynamic`, `embedded_static_size`,
//! `size_bound`, `selector_name`, `min_size`, plus type-from-ABI
//! reconstruction (spec.md §4.A) and the EIP-55 checksum check used by
//! address literal admission.

use alloy_primitives::keccak256;
use crate::errors::{CovenantError, ErrorKind, Result};
use crate::span::FileSpan;
use crate::types::prim::{IntTy, Signedness};
use crate::types::ty::{ArrayLen, Type};

/// The layout facts spec.md §3 attaches to every type's ABI projection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AbiLayout {
  /// Whether the encoded length depends on a runtime value.
  pub is_dynamic: bool,
  /// The number of bytes this type occupies in the static "head" region
  /// when embedded in a tuple (32 for everything, since dynamic types
  /// embed a 32-byte offset instead of their payload).
  pub embedded_static_size: u32,
  /// An upper bound on total encoded size (head + tail), or `None` if
  /// unbounded (never true for Covenant's bounded dynamic types).
  pub size_bound: Option<u32>,
  /// The minimum encoded size (a dynamic array of length 0 still writes
  /// its length word, etc).
  pub min_size: u32,
}

impl AbiLayout {
  #[must_use] pub fn of(ty: &Type) -> AbiLayout {
    match ty {
      Type::Bool | Type::Int(_) | Type::Decimal | Type::Address | Type::BytesM(_) | Type::Enum(_) =>
        AbiLayout { is_dynamic: false, embedded_static_size: 32, size_bound: Some(32), min_size: 32 },
      Type::Bytes(len) | Type::Str(len) => {
        let words = len.max_length().div_ceil(32);
        AbiLayout {
          is_dynamic: true,
          embedded_static_size: 32,
          size_bound: Some(32 + 32 * u32::try_from(words).unwrap_or(u32::MAX)),
          min_size: 32,
        }
      }
      Type::StaticArray(elem, n) => {
        let inner = Self::of(elem);
        let dynamic = inner.is_dynamic;
        let n = u32::try_from(*n).unwrap_or(u32::MAX);
        AbiLayout {
          is_dynamic: dynamic,
          embedded_static_size: if dynamic { 32 } else { inner.embedded_static_size.saturating_mul(n) },
          size_bound: inner.size_bound.map(|s| s.saturating_mul(n)),
          min_size: inner.min_size.saturating_mul(n),
        }
      }
      Type::DynArray(elem, n) => {
        let inner = Self::of(elem);
        let n = u32::try_from(*n).unwrap_or(u32::MAX);
        AbiLayout {
          is_dynamic: true,
          embedded_static_size: 32,
          size_bound: inner.size_bound.map(|s| 32 + s.saturating_mul(n)),
          min_size: 32,
        }
      }
      Type::Struct(def) => {
        let mut dynamic = false;
        let mut bound = Some(0u32);
        let mut min = 0u32;
        for (_, fty) in &def.fields {
          let l = Self::of(fty);
          dynamic |= l.is_dynamic;
          bound = bound.zip(l.size_bound).map(|(a, b)| a + b);
          min += l.min_size;
        }
        AbiLayout { is_dynamic: dynamic, embedded_static_size: if dynamic { 32 } else { min }, size_bound: bound, min_size: min }
      }
      Type::Tuple(elems) => {
        let mut dynamic = false;
        let mut bound = Some(0u32);
        let mut min = 0u32;
        for fty in elems {
          let l = Self::of(fty);
          dynamic |= l.is_dynamic;
          bound = bound.zip(l.size_bound).map(|(a, b)| a + b);
          min += l.min_size;
        }
        AbiLayout { is_dynamic: dynamic, embedded_static_size: if dynamic { 32 } else { min }, size_bound: bound, min_size: min }
      }
      Type::Interface(_) => AbiLayout { is_dynamic: false, embedded_static_size: 32, size_bound: Some(32), min_size: 32 },
      Type::Mapping(..) => AbiLayout { is_dynamic: false, embedded_static_size: 0, size_bound: Some(0), min_size: 0 },
    }
  }

  #[must_use] pub fn is_dynamic(ty: &Type) -> bool { Self::of(ty).is_dynamic }
  #[must_use] pub fn embedded_static_size(ty: &Type) -> u32 { Self::of(ty).embedded_static_size }
  #[must_use] pub fn size_bound(ty: &Type) -> Option<u32> { Self::of(ty).size_bound }
  #[must_use] pub fn min_size(ty: &Type) -> u32 { Self::of(ty).min_size }
}

/// The canonical ABI type name used in function selectors, e.g.
/// `uint256`, `address`, `bytes32`, `bytes`, `uint256[3]`, `(uint256,bool)`.
#[must_use] pub fn selector_name(ty: &Type) -> String {
  match ty {
    Type::Bool => "bool".into(),
    Type::Int(t) => t.name(),
    Type::Decimal => "fixed168x10".into(),
    Type::Address => "address".into(),
    Type::BytesM(n) => format!("bytes{n}"),
    Type::Bytes(_) => "bytes".into(),
    Type::Str(_) => "string".into(),
    Type::StaticArray(elem, n) => format!("{}[{n}]", selector_name(elem)),
    Type::DynArray(elem, _) => format!("{}[]", selector_name(elem)),
    Type::Enum(_) => "uint256".into(),
    Type::Struct(def) => format!("({})", def.fields.iter().map(|(_, t)| selector_name(t)).collect::<Vec<_>>().join(",")),
    Type::Tuple(elems) => format!("({})", elems.iter().map(selector_name).collect::<Vec<_>>().join(",")),
    Type::Interface(_) => "address".into(),
    Type::Mapping(..) => String::new(),
  }
}

/// `method_id`: the first 4 bytes of `keccak256(canonical_signature)`
/// (spec.md §3 "Function signature").
#[must_use] pub fn method_id(canonical_signature: &str) -> [u8; 4] {
  let hash = keccak256(canonical_signature.as_bytes());
  [hash[0], hash[1], hash[2], hash[3]]
}

/// EIP-55 mixed-case checksum validation for a 40-hex-digit address body
/// (spec.md §4.A `from_literal`). `digits` must already be lowercase-or-
/// mixed hex without the `0x` prefix.
#[must_use] pub fn eip55_checksum_matches(digits: &str) -> bool {
  if digits.len() != 40 { return false }
  let lower = digits.to_ascii_lowercase();
  // An all-lowercase or all-uppercase literal is conventionally accepted
  // as "checksum not attempted"; only a mixed-case literal is validated.
  if digits == lower || digits == digits.to_ascii_uppercase() { return true }
  let hash = keccak256(lower.as_bytes());
  for (i, c) in lower.chars().enumerate() {
    if !c.is_ascii_hexdigit() { continue }
    let nibble = hash[i / 2];
    let bit4 = if i % 2 == 0 { nibble >> 4 } else { nibble & 0xf };
    let want_upper = bit4 >= 8;
    let is_upper = digits.as_bytes()[i].is_ascii_uppercase();
    if c.is_alphabetic() && want_upper != is_upper { return false }
  }
  true
}

/// Reconstruct a [`Type`] from an ABI JSON fragment's `type` string
/// (spec.md §4.A "Type-from-ABI"): `fixed168x10` -> `decimal`,
/// `string`/`bytes` -> the variable-length types, a bracketed `[N]` suffix
/// -> a static array. Used when loading an imported interface supplied as
/// raw ABI JSON (spec.md §6).
pub fn type_from_abi_string(s: &str, span: &FileSpan) -> Result<Type> {
  if let Some(inner) = s.strip_suffix(']') {
    let open = inner.rfind('[').ok_or_else(|| unknown(s, span))?;
    let (base, n) = (&inner[..open], &inner[open + 1..]);
    let base_ty = type_from_abi_string(base, span)?;
    let n: u64 = n.parse().map_err(|_| unknown(s, span))?;
    return Ok(Type::StaticArray(Box::new(base_ty), n));
  }
  match s {
    "bool" => Ok(Type::Bool),
    "address" => Ok(Type::Address),
    "string" => Ok(Type::Str(ArrayLen::Literal { max_length: u64::from(u32::MAX), min_length: 0 })),
    "bytes" => Ok(Type::Bytes(ArrayLen::Literal { max_length: u64::from(u32::MAX), min_length: 0 })),
    "fixed168x10" => Ok(Type::Decimal),
    _ if s.starts_with("uint") => parse_int_suffix(s, 4, Signedness::Unsigned, span),
    _ if s.starts_with("int") => parse_int_suffix(s, 3, Signedness::Signed, span),
    _ if s.starts_with("bytes") => {
      let n: u8 = s[5..].parse().map_err(|_| unknown(s, span))?;
      if n == 0 || n > 32 { return Err(unknown(s, span)) }
      Ok(Type::BytesM(n))
    }
    _ => Err(unknown(s, span)),
  }
}

fn parse_int_suffix(s: &str, prefix_len: usize, signed: Signedness, span: &FileSpan) -> Result<Type> {
  let bits: u16 = s[prefix_len..].parse().map_err(|_| unknown(s, span))?;
  if bits == 0 || bits % 8 != 0 || bits > 256 { return Err(unknown(s, span)) }
  Ok(Type::Int(IntTy { signed, bits }))
}

fn unknown(s: &str, span: &FileSpan) -> CovenantError {
  CovenantError::new(ErrorKind::UnknownType(format!("unrecognized ABI type {s}")), span.clone())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::rc::Rc;

  fn span() -> FileSpan { FileSpan::synthetic(Rc::from("t.cov")) }

  #[test]
  fn bytes_and_string_are_dynamic() {
    assert!(AbiLayout::is_dynamic(&Type::Bytes(ArrayLen::Fixed(64))));
    assert!(!AbiLayout::is_dynamic(&Type::Int(IntTy::U256)));
  }

  #[test]
  fn selector_name_for_static_array() {
    let ty = Type::StaticArray(Box::new(Type::Int(IntTy::U256)), 3);
    assert_eq!(selector_name(&ty), "uint256[3]");
  }

  #[test]
  fn selector_name_for_dynarray() {
    let ty = Type::DynArray(Box::new(Type::Bool), 10);
    assert_eq!(selector_name(&ty), "bool[]");
  }

  #[test]
  fn type_from_abi_string_roundtrips_static_array() {
    let ty = type_from_abi_string("uint256[3]", &span()).unwrap();
    assert_eq!(ty, Type::StaticArray(Box::new(Type::Int(IntTy::U256)), 3));
  }

  #[test]
  fn all_lowercase_address_passes_checksum() {
    assert!(eip55_checksum_matches(&"a".repeat(40)));
  }

  #[test]
  fn known_checksummed_address_validates_and_miscasing_fails() {
    // One of the example addresses from EIP-55's specification section.
    let digits = "5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
    assert!(eip55_checksum_matches(digits));
    let mut bytes = digits.as_bytes().to_vec();
    bytes[2] = bytes[2].to_ascii_lowercase(); // flip the 'A' at index 2 from upper to lower
    let mangled = String::from_utf8(bytes).unwrap();
    assert!(!eip55_checksum_matches(&mangled));
  }

  #[test]
  fn method_id_is_first_four_bytes_of_keccak() {
    // `transfer(address,uint256)` is the canonical ERC-20 selector.
    let id = method_id("transfer(address,uint256)");
    assert_eq!(hex::encode(id), "a9059cbb");
  }
}
