//! The annotated syntax tree: the interface boundary the tokenizer/parser
//! (deliberately out of scope, spec.md §1) hands to the semantic analyzer.
//!
//! This module defines only the *shape* of that tree — no lexer, no
//! recursive-descent parser. A production pipeline plugs a real parser in
//! front of [`crate::semantics`]; the types here are its contract.

use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::types::Mutability;

/// A literal value as written in source, before `Type::from_literal`
/// (spec.md §4.A) narrows it to a concrete type.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
  Int(i128),
  Bool(bool),
  /// Decimal literal text, e.g. `"1.50"`; validated to have `<= 10`
  /// fractional digits by `from_literal`.
  Decimal(String),
  Str(String),
  Bytes(Vec<u8>),
  /// A `0x`-prefixed 40-hex-digit address literal, checked against EIP-55
  /// checksum casing by `from_literal`.
  HexAddress(String),
  /// A `0x`-prefixed 64-hex-digit (32 byte) literal.
  HexBytes32(String),
  /// The bare identifier `UNREACHABLE`, valid only as an `assert`/`raise`
  /// reason (spec.md §4.C).
  Unreachable,
}

/// A type annotation as written in source (the shape `Type::from_annotation`
/// consumes).
#[derive(Clone, Debug, PartialEq)]
pub enum TypeAnnNode {
  Name(Symbol),
  /// `T[N]`.
  StaticArray(Box<TypeAnnNode>, u64),
  /// `DynArray[T, N]`.
  DynArray(Box<TypeAnnNode>, u64),
  /// `bytesN`.
  BytesM(u8),
  /// `Bytes[K]`.
  BoundedBytes(u64),
  /// `String[K]`.
  BoundedString(u64),
  /// `HashMap[K, V]`.
  Mapping(Box<TypeAnnNode>, Box<TypeAnnNode>),
  Tuple(Vec<TypeAnnNode>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp { Add, Sub, Mul, Div, Mod, Pow, BitAnd, BitOr, BitXor, Shl, Shr }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoolOp { And, Or }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp { Not, USub, Invert }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp { Eq, NotEq, Lt, LtE, Gt, GtE, In }

#[derive(Clone, Debug)]
pub struct Expr {
  pub span: FileSpan,
  pub kind: ExprKind,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
  Literal(Literal),
  Name(Symbol),
  Attribute(Box<Expr>, Symbol),
  Subscript(Box<Expr>, Box<Expr>),
  Call { func: Box<Expr>, args: Vec<Expr>, kwargs: Vec<(Symbol, Expr)> },
  BinOp(BinOp, Box<Expr>, Box<Expr>),
  BoolOp(BoolOp, Vec<Expr>),
  UnaryOp(UnaryOp, Box<Expr>),
  Compare(CompareOp, Box<Expr>, Box<Expr>),
  /// `then if cond else other`.
  Ternary { cond: Box<Expr>, then: Box<Expr>, other: Box<Expr> },
  List(Vec<Expr>),
  Tuple(Vec<Expr>),
  /// A struct literal, `Point({x: 1, y: 2})`.
  StructLit(Symbol, Vec<(Symbol, Expr)>),
}

/// An iterator expression for `for x in <iter>:` (spec.md §4.C).
#[derive(Clone, Debug)]
pub enum IterExpr {
  /// A bounded dynamic array or a storage/memory reference to one.
  Expr(Expr),
  /// A literal list `for x in [1, 2, 3]:`.
  List(Vec<Expr>),
  /// `range(a)`.
  Range1(Expr),
  /// `range(a, b)`.
  Range2(Expr, Expr),
  /// `range(x, x + const)`: both base expressions must be syntactically
  /// identical and `const >= 1`.
  RangeOffset { base: Expr, konst: u64 },
}

#[derive(Clone, Debug)]
pub struct Stmt {
  pub span: FileSpan,
  pub kind: StmtKind,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
  Expr(Expr),
  Assign(Expr, Expr),
  AugAssign(BinOp, Expr, Expr),
  /// A local variable declaration, `x: uint256 = ...`.
  AnnAssign { name: Symbol, ty: TypeAnnNode, value: Option<Expr> },
  If { cond: Expr, then: Vec<Stmt>, els: Vec<Stmt> },
  For { var: Symbol, iter: IterExpr, body: Vec<Stmt> },
  Return(Vec<Expr>),
  Pass,
  Break,
  Continue,
  Assert { cond: Expr, reason: Option<Literal> },
  Raise(Option<Literal>),
  Log { event: Symbol, args: Vec<Expr> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarModifier { Plain, Constant, Immutable }

#[derive(Clone, Debug)]
pub struct ModuleVar {
  pub span: FileSpan,
  pub name: Symbol,
  pub ty: TypeAnnNode,
  pub modifier: VarModifier,
  pub public: bool,
  pub value: Option<Expr>,
}

#[derive(Clone, Debug)]
pub struct EventField {
  pub name: Symbol,
  pub ty: TypeAnnNode,
  pub indexed: bool,
}

#[derive(Clone, Debug)]
pub struct EventDef {
  pub span: FileSpan,
  pub name: Symbol,
  pub fields: Vec<EventField>,
}

#[derive(Clone, Debug)]
pub struct StructDef {
  pub span: FileSpan,
  pub name: Symbol,
  pub fields: Vec<(Symbol, TypeAnnNode)>,
}

#[derive(Clone, Debug)]
pub struct EnumDef {
  pub span: FileSpan,
  pub name: Symbol,
  pub members: Vec<Symbol>,
}

#[derive(Clone, Debug)]
pub struct FunctionArg {
  pub name: Symbol,
  pub ty: TypeAnnNode,
  pub default: Option<Expr>,
}

#[derive(Clone, Debug)]
pub struct InterfaceFunctionSig {
  pub name: Symbol,
  pub args: Vec<TypeAnnNode>,
  pub ret: Option<TypeAnnNode>,
  pub mutability: Mutability,
}

#[derive(Clone, Debug)]
pub struct InterfaceDef {
  pub span: FileSpan,
  pub name: Symbol,
  pub functions: Vec<InterfaceFunctionSig>,
}

#[derive(Clone, Debug)]
pub struct FunctionDef {
  pub span: FileSpan,
  pub name: Symbol,
  pub args: Vec<FunctionArg>,
  pub ret: Option<TypeAnnNode>,
  pub external: bool,
  pub mutability: Mutability,
  pub nonreentrant: Option<String>,
  pub body: Vec<Stmt>,
}

/// The description of an imported interface, delivered by the interface-code
/// provider (spec.md §6): either parsed Covenant source or a raw ABI JSON
/// fragment. Loading/parsing the referenced file is the caller's job; only
/// the already-resolved shape reaches the analyzer.
#[derive(Clone, Debug)]
pub enum ImportedInterface {
  Source(InterfaceDef),
  Abi(Vec<AbiFunctionDecl>),
}

#[derive(Clone, Debug)]
pub struct AbiFunctionDecl {
  pub name: Symbol,
  pub args: Vec<TypeAnnNode>,
  pub rets: Vec<TypeAnnNode>,
  pub mutability: Mutability,
}

#[derive(Clone, Debug)]
pub struct Import {
  pub span: FileSpan,
  pub name: Symbol,
  pub interface: ImportedInterface,
}

#[derive(Clone, Debug)]
pub enum Decl {
  Var(ModuleVar),
  Implements { span: FileSpan, interface: Symbol },
  Event(EventDef),
  Struct(StructDef),
  Enum(EnumDef),
  Interface(InterfaceDef),
  Function(FunctionDef),
  Import(Import),
}

/// A full compilation unit: one source file's top-level declarations, in
/// whatever textual order the parser encountered them (Phase 1 tolerates
/// any order, spec.md §4.C).
#[derive(Clone, Debug, Default)]
pub struct Module {
  pub decls: Vec<Decl>,
}
