//! The fixed opcode vocabulary (spec.md §3 "IR node", §4.D): each target
//! opcode's `(inputs, outputs, base_gas)` triple, used both by IR node
//! construction (arity/gas checks) and by the assembler (mnemonic
//! emission).

/// One virtual-machine opcode: stack-based, 256-bit words, word-addressed
/// storage, byte-addressed memory, immutable calldata (spec.md §1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
  /// Halts execution with no output; the implicit terminator a function
  /// with no declared return type falls into at the end of its body.
  Stop,
  // arithmetic
  Add, Sub, Mul, Div, SDiv, Mod, SMod, AddMod, MulMod, Exp, SignExtend,
  // comparison / bitwise
  Lt, Gt, SLt, SGt, Eq, IsZero, And, Or, Xor, Not, Byte, Shl, Shr, Sar,
  // crypto
  Keccak256,
  // environment
  Address, Balance, Origin, Caller, CallValue, CallDataLoad, CallDataSize, CallDataCopy,
  CodeSize, CodeCopy, GasPrice, ExtCodeSize, ExtCodeCopy, ReturnDataSize, ReturnDataCopy,
  ExtCodeHash, BlockHash, Coinbase, Timestamp, Number, Difficulty, GasLimit, ChainId,
  SelfBalance, BaseFee,
  // stack / memory / storage / control flow
  Pop, MLoad, MStore, MStore8, SLoad, SStore, Jump, Jumpi, Pc, MSize, Gas, JumpDest,
  // logging
  Log0, Log1, Log2, Log3, Log4,
  // system
  Create, Call, CallCode, Return, DelegateCall, Create2, StaticCall, Revert, Invalid,
  SelfDestruct,
  /// Emits a minimal `PUSHn` immediate; not part of the source opcode
  /// vocabulary, only produced by the IR optimizer/assembler for literal
  /// integers (spec.md §4.G).
  Push,
  /// `DUPn`, `n` in 1..=16.
  Dup(u8),
  /// `SWAPn`, `n` in 1..=16.
  Swap(u8),
}

/// `(inputs, outputs, base_gas)` — `outputs` is always 0 or 1 for this
/// vocabulary (valency, spec.md §3).
#[must_use] pub fn arity_and_gas(op: Opcode) -> (u8, u8, u64) {
  use Opcode::*;
  match op {
    Stop => (0, 0, 0),
    Add | Sub | Mul | Div | SDiv | Mod | SMod => (2, 1, 5),
    AddMod | MulMod => (3, 1, 8),
    Exp => (2, 1, 10),
    SignExtend => (2, 1, 5),
    Lt | Gt | SLt | SGt | Eq | And | Or | Xor | Byte | Shl | Shr | Sar => (2, 1, 3),
    IsZero | Not => (1, 1, 3),
    Keccak256 => (2, 1, 30),
    Address | Origin | Caller | CallValue | CallDataSize | CodeSize | GasPrice
      | ReturnDataSize | Coinbase | Timestamp | Number | Difficulty | GasLimit | ChainId
      | SelfBalance | BaseFee | Pc | MSize | Gas => (0, 1, 2),
    Balance | ExtCodeSize | ExtCodeHash | BlockHash => (1, 1, 20),
    CallDataLoad => (1, 1, 3),
    CallDataCopy | CodeCopy | ReturnDataCopy => (3, 0, 3),
    ExtCodeCopy => (4, 0, 20),
    Pop => (1, 0, 2),
    MLoad => (1, 1, 3),
    MStore | MStore8 => (2, 0, 3),
    SLoad => (1, 1, 100),
    SStore => (2, 0, 100),
    Jump => (1, 0, 8),
    Jumpi => (2, 0, 10),
    JumpDest => (0, 0, 1),
    Log0 => (2, 0, 375),
    Log1 => (3, 0, 750),
    Log2 => (4, 0, 1125),
    Log3 => (5, 0, 1500),
    Log4 => (6, 0, 1875),
    Create => (3, 1, 32000),
    Create2 => (4, 1, 32000),
    Call | CallCode => (7, 1, 100),
    DelegateCall | StaticCall => (6, 1, 100),
    Return | Revert => (2, 0, 0),
    Invalid => (0, 0, 0),
    SelfDestruct => (1, 0, 5000),
    Push => (0, 1, 3),
    Dup(_) => (0, 1, 3),
    Swap(_) => (0, 0, 3),
  }
}

/// A human-readable mnemonic, used by the assembler's assembly listing and
/// the `opcodes`/`opcodes_runtime` output formats (spec.md §6).
#[must_use] pub fn mnemonic(op: Opcode) -> String {
  use Opcode::*;
  match op {
    Stop => "STOP".into(),
    Add => "ADD".into(), Sub => "SUB".into(), Mul => "MUL".into(), Div => "DIV".into(),
    SDiv => "SDIV".into(), Mod => "MOD".into(), SMod => "SMOD".into(), AddMod => "ADDMOD".into(),
    MulMod => "MULMOD".into(), Exp => "EXP".into(), SignExtend => "SIGNEXTEND".into(),
    Lt => "LT".into(), Gt => "GT".into(), SLt => "SLT".into(), SGt => "SGT".into(), Eq => "EQ".into(),
    IsZero => "ISZERO".into(), And => "AND".into(), Or => "OR".into(), Xor => "XOR".into(),
    Not => "NOT".into(), Byte => "BYTE".into(), Shl => "SHL".into(), Shr => "SHR".into(), Sar => "SAR".into(),
    Keccak256 => "KECCAK256".into(),
    Address => "ADDRESS".into(), Balance => "BALANCE".into(), Origin => "ORIGIN".into(),
    Caller => "CALLER".into(), CallValue => "CALLVALUE".into(), CallDataLoad => "CALLDATALOAD".into(),
    CallDataSize => "CALLDATASIZE".into(), CallDataCopy => "CALLDATACOPY".into(),
    CodeSize => "CODESIZE".into(), CodeCopy => "CODECOPY".into(), GasPrice => "GASPRICE".into(),
    ExtCodeSize => "EXTCODESIZE".into(), ExtCodeCopy => "EXTCODECOPY".into(),
    ReturnDataSize => "RETURNDATASIZE".into(), ReturnDataCopy => "RETURNDATACOPY".into(),
    ExtCodeHash => "EXTCODEHASH".into(), BlockHash => "BLOCKHASH".into(), Coinbase => "COINBASE".into(),
    Timestamp => "TIMESTAMP".into(), Number => "NUMBER".into(), Difficulty => "DIFFICULTY".into(),
    GasLimit => "GASLIMIT".into(), ChainId => "CHAINID".into(), SelfBalance => "SELFBALANCE".into(),
    BaseFee => "BASEFEE".into(),
    Pop => "POP".into(), MLoad => "MLOAD".into(), MStore => "MSTORE".into(), MStore8 => "MSTORE8".into(),
    SLoad => "SLOAD".into(), SStore => "SSTORE".into(), Jump => "JUMP".into(), Jumpi => "JUMPI".into(),
    Pc => "PC".into(), MSize => "MSIZE".into(), Gas => "GAS".into(), JumpDest => "JUMPDEST".into(),
    Log0 => "LOG0".into(), Log1 => "LOG1".into(), Log2 => "LOG2".into(), Log3 => "LOG3".into(), Log4 => "LOG4".into(),
    Create => "CREATE".into(), Call => "CALL".into(), CallCode => "CALLCODE".into(), Return => "RETURN".into(),
    DelegateCall => "DELEGATECALL".into(), Create2 => "CREATE2".into(), StaticCall => "STATICCALL".into(),
    Revert => "REVERT".into(), Invalid => "INVALID".into(), SelfDestruct => "SELFDESTRUCT".into(),
    Push => "PUSH".into(),
    Dup(n) => format!("DUP{n}"),
    Swap(n) => format!("SWAP{n}"),
  }
}

impl Opcode {
  #[must_use] pub fn inputs(self) -> u8 { arity_and_gas(self).0 }
  #[must_use] pub fn outputs(self) -> u8 { arity_and_gas(self).1 }
  #[must_use] pub fn base_gas(self) -> u64 { arity_and_gas(self).2 }
  /// `LOGn` opcode for `n` indexed-plus-signature topics, `0 <= n <= 4`.
  #[must_use] pub fn log_n(n: u8) -> Opcode {
    match n { 0 => Opcode::Log0, 1 => Opcode::Log1, 2 => Opcode::Log2, 3 => Opcode::Log3, 4 => Opcode::Log4,
      _ => panic!("LOG opcode only supports 0..=4 topics") }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn binary_arith_ops_take_two_and_return_one() {
    assert_eq!(Opcode::Add.inputs(), 2);
    assert_eq!(Opcode::Add.outputs(), 1);
  }

  #[test]
  fn sstore_has_no_output() {
    assert_eq!(Opcode::SStore.outputs(), 0);
  }

  #[test]
  fn log_n_dispatches_by_topic_count() {
    assert_eq!(Opcode::log_n(2), Opcode::Log2);
  }
}
