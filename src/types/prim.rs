//! Primitive type identities: concrete integer widths/signedness. The
//! capability checks spec.md §3 describes in terms of abstract type
//! classes (`Numeric`, `Integer`, `Bytes`, ...) are implemented directly
//! against `Type` variants in `validate_numeric_op`/`validate_comparator`
//! (ty.rs) rather than through an intermediate classification type.

/// An integer's signedness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signedness { Signed, Unsigned }

/// A concrete integer type: `int8..int256` / `uint8..uint256`, always a
/// multiple of 8 bits, stored natively as a 256-bit word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IntTy {
  pub signed: Signedness,
  pub bits: u16,
}

impl IntTy {
  pub const U256: IntTy = IntTy { signed: Signedness::Unsigned, bits: 256 };
  pub const I256: IntTy = IntTy { signed: Signedness::Signed, bits: 256 };
  pub const I128: IntTy = IntTy { signed: Signedness::Signed, bits: 128 };
  pub const BOOL_BACKING: IntTy = IntTy { signed: Signedness::Unsigned, bits: 8 };

  #[must_use] pub fn name(self) -> String {
    let p = match self.signed { Signedness::Signed => "int", Signedness::Unsigned => "uint" };
    format!("{p}{}", self.bits)
  }

  /// `true` if this type's value domain is a subset of `other`'s
  /// (same signedness, `self.bits <= other.bits`), used by assignability
  /// and the numeric-literal narrowest-fit rule (SPEC_FULL.md §4.A).
  #[must_use] pub fn fits_in(self, other: IntTy) -> bool {
    self.signed == other.signed && self.bits <= other.bits
  }

  /// The inclusive bounds of this type's value domain, as signed 256-bit
  /// integers (representable exactly since `bits <= 256`).
  #[must_use] pub fn bounds(self) -> (i128, i128) {
    match self.signed {
      Signedness::Unsigned if self.bits >= 127 => (0, i128::MAX),
      Signedness::Unsigned => (0, (1i128 << self.bits) - 1),
      Signedness::Signed if self.bits >= 128 => (i128::MIN, i128::MAX),
      Signedness::Signed => {
        let half = 1i128 << (self.bits - 1);
        (-half, half - 1)
      }
    }
  }

  #[must_use] pub fn contains(self, v: i128) -> bool {
    let (lo, hi) = self.bounds();
    lo <= v && v <= hi
  }

  /// Every standard integer width, narrowest first, used by
  /// `from_literal`'s narrowest-fit search.
  #[must_use] pub fn all_widths() -> impl Iterator<Item = IntTy> {
    (1..=32u16).flat_map(|bytes| {
      let bits = bytes * 8;
      [IntTy { signed: Signedness::Unsigned, bits }, IntTy { signed: Signedness::Signed, bits }]
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn uint8_bounds_are_0_to_255() {
    assert_eq!(IntTy { signed: Signedness::Unsigned, bits: 8 }.bounds(), (0, 255));
  }

  #[test]
  fn int8_bounds_are_minus_128_to_127() {
    assert_eq!(IntTy { signed: Signedness::Signed, bits: 8 }.bounds(), (-128, 127));
  }

  #[test]
  fn fits_in_respects_signedness() {
    let u8 = IntTy { signed: Signedness::Unsigned, bits: 8 };
    let i8 = IntTy { signed: Signedness::Signed, bits: 8 };
    assert!(!u8.fits_in(i8));
    assert!(u8.fits_in(IntTy { signed: Signedness::Unsigned, bits: 16 }));
  }
}
