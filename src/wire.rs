//! A minimal JSON front door (SPEC_FULL.md §6 supplement). The
//! tokenizer/parser that would normally produce an [`ast::Module`] is
//! deliberately out of scope (spec.md §1), so this module is the only
//! way the CLI has to turn a user-supplied file into one: it
//! deserializes a JSON document into the shapes below, then lowers
//! them into the real AST. Every span produced here is the same
//! zero-width synthetic span — there is no source text to point a
//! caret at.

use serde::Deserialize;
use crate::ast::*;
use crate::errors::{CovenantError, ErrorKind, Result};
use crate::span::FileSpan;
use crate::symbol::{self, Symbol};
use crate::types::Mutability;

fn sym(s: &str) -> Symbol { symbol::intern(s) }

fn syntax_err(file: &FileSpan, msg: impl Into<String>) -> CovenantError {
  CovenantError::new(ErrorKind::SyntaxException(msg.into()), file.clone())
}

/// Parse a JSON-encoded module. `file` names the unit for diagnostics.
pub fn parse_module(json: &str, file: &FileSpan) -> Result<Module> {
  let wire: WireModule = serde_json::from_str(json)
    .map_err(|e| syntax_err(file, format!("invalid module JSON: {e}")))?;
  wire.into_ast(file)
}

#[derive(Deserialize)]
pub struct WireModule {
  #[serde(default)]
  pub decls: Vec<WireDecl>,
}

impl WireModule {
  fn into_ast(self, file: &FileSpan) -> Result<Module> {
    let decls = self.decls.into_iter().map(|d| d.into_ast(file)).collect::<Result<Vec<_>>>()?;
    Ok(Module { decls })
  }
}

#[derive(Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum WireVarModifier { #[default] Plain, Constant, Immutable }

impl WireVarModifier {
  fn into_ast(self) -> VarModifier {
    match self {
      Self::Plain => VarModifier::Plain,
      Self::Constant => VarModifier::Constant,
      Self::Immutable => VarModifier::Immutable,
    }
  }
}

#[derive(Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum WireMutability { Pure, View, #[default] NonPayable, Payable }

impl WireMutability {
  fn into_ast(self) -> Mutability {
    match self {
      Self::Pure => Mutability::Pure,
      Self::View => Mutability::View,
      Self::NonPayable => Mutability::NonPayable,
      Self::Payable => Mutability::Payable,
    }
  }
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireType {
  Name { name: String },
  StaticArray { elem: Box<WireType>, len: u64 },
  DynArray { elem: Box<WireType>, max: u64 },
  BytesM { n: u8 },
  BoundedBytes { max: u64 },
  BoundedString { max: u64 },
  Mapping { key: Box<WireType>, value: Box<WireType> },
  Tuple { elems: Vec<WireType> },
}

impl WireType {
  fn into_ast(self) -> TypeAnnNode {
    match self {
      Self::Name { name } => TypeAnnNode::Name(sym(&name)),
      Self::StaticArray { elem, len } => TypeAnnNode::StaticArray(Box::new(elem.into_ast()), len),
      Self::DynArray { elem, max } => TypeAnnNode::DynArray(Box::new(elem.into_ast()), max),
      Self::BytesM { n } => TypeAnnNode::BytesM(n),
      Self::BoundedBytes { max } => TypeAnnNode::BoundedBytes(max),
      Self::BoundedString { max } => TypeAnnNode::BoundedString(max),
      Self::Mapping { key, value } => TypeAnnNode::Mapping(Box::new(key.into_ast()), Box::new(value.into_ast())),
      Self::Tuple { elems } => TypeAnnNode::Tuple(elems.into_iter().map(WireType::into_ast).collect()),
    }
  }
}

/// A bare literal, used where the AST wants a [`Literal`] directly
/// rather than a full expression (`assert ... , reason`, `raise reason`).
#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireLit {
  Int { value: i128 },
  Bool { value: bool },
  Decimal { value: String },
  Str { value: String },
  Bytes { value: Vec<u8> },
  HexAddress { value: String },
  HexBytes32 { value: String },
  Unreachable,
}

impl WireLit {
  fn into_ast(self) -> Literal {
    match self {
      Self::Int { value } => Literal::Int(value),
      Self::Bool { value } => Literal::Bool(value),
      Self::Decimal { value } => Literal::Decimal(value),
      Self::Str { value } => Literal::Str(value),
      Self::Bytes { value } => Literal::Bytes(value),
      Self::HexAddress { value } => Literal::HexAddress(value),
      Self::HexBytes32 { value } => Literal::HexBytes32(value),
      Self::Unreachable => Literal::Unreachable,
    }
  }
}

fn bin_op(s: &str, file: &FileSpan) -> Result<BinOp> {
  Ok(match s {
    "add" => BinOp::Add, "sub" => BinOp::Sub, "mul" => BinOp::Mul, "div" => BinOp::Div,
    "mod" => BinOp::Mod, "pow" => BinOp::Pow, "bit_and" => BinOp::BitAnd, "bit_or" => BinOp::BitOr,
    "bit_xor" => BinOp::BitXor, "shl" => BinOp::Shl, "shr" => BinOp::Shr,
    other => return Err(syntax_err(file, format!("unknown binary operator `{other}`"))),
  })
}

fn bool_op(s: &str, file: &FileSpan) -> Result<BoolOp> {
  Ok(match s {
    "and" => BoolOp::And, "or" => BoolOp::Or,
    other => return Err(syntax_err(file, format!("unknown boolean operator `{other}`"))),
  })
}

fn unary_op(s: &str, file: &FileSpan) -> Result<UnaryOp> {
  Ok(match s {
    "not" => UnaryOp::Not, "usub" => UnaryOp::USub, "invert" => UnaryOp::Invert,
    other => return Err(syntax_err(file, format!("unknown unary operator `{other}`"))),
  })
}

fn compare_op(s: &str, file: &FileSpan) -> Result<CompareOp> {
  Ok(match s {
    "eq" => CompareOp::Eq, "not_eq" => CompareOp::NotEq, "lt" => CompareOp::Lt,
    "lt_e" => CompareOp::LtE, "gt" => CompareOp::Gt, "gt_e" => CompareOp::GtE, "in" => CompareOp::In,
    other => return Err(syntax_err(file, format!("unknown comparison operator `{other}`"))),
  })
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireExpr {
  IntLit { value: i128 },
  BoolLit { value: bool },
  DecimalLit { value: String },
  StrLit { value: String },
  BytesLit { value: Vec<u8> },
  HexAddressLit { value: String },
  HexBytes32Lit { value: String },
  UnreachableLit,
  Name { name: String },
  Attribute { base: Box<WireExpr>, attr: String },
  Subscript { base: Box<WireExpr>, index: Box<WireExpr> },
  Call { func: Box<WireExpr>, #[serde(default)] args: Vec<WireExpr>, #[serde(default)] kwargs: Vec<(String, WireExpr)> },
  BinOp { op: String, lhs: Box<WireExpr>, rhs: Box<WireExpr> },
  BoolOp { op: String, values: Vec<WireExpr> },
  UnaryOp { op: String, operand: Box<WireExpr> },
  Compare { op: String, lhs: Box<WireExpr>, rhs: Box<WireExpr> },
  Ternary { cond: Box<WireExpr>, then: Box<WireExpr>, other: Box<WireExpr> },
  List { items: Vec<WireExpr> },
  Tuple { items: Vec<WireExpr> },
  StructLit { name: String, #[serde(default)] fields: Vec<(String, WireExpr)> },
}

impl WireExpr {
  fn into_ast(self, file: &FileSpan) -> Result<Expr> {
    let span = file.clone();
    let kind = match self {
      Self::IntLit { value } => ExprKind::Literal(Literal::Int(value)),
      Self::BoolLit { value } => ExprKind::Literal(Literal::Bool(value)),
      Self::DecimalLit { value } => ExprKind::Literal(Literal::Decimal(value)),
      Self::StrLit { value } => ExprKind::Literal(Literal::Str(value)),
      Self::BytesLit { value } => ExprKind::Literal(Literal::Bytes(value)),
      Self::HexAddressLit { value } => ExprKind::Literal(Literal::HexAddress(value)),
      Self::HexBytes32Lit { value } => ExprKind::Literal(Literal::HexBytes32(value)),
      Self::UnreachableLit => ExprKind::Literal(Literal::Unreachable),
      Self::Name { name } => ExprKind::Name(sym(&name)),
      Self::Attribute { base, attr } => ExprKind::Attribute(Box::new(base.into_ast(file)?), sym(&attr)),
      Self::Subscript { base, index } => ExprKind::Subscript(Box::new(base.into_ast(file)?), Box::new(index.into_ast(file)?)),
      Self::Call { func, args, kwargs } => ExprKind::Call {
        func: Box::new(func.into_ast(file)?),
        args: args.into_iter().map(|a| a.into_ast(file)).collect::<Result<_>>()?,
        kwargs: kwargs.into_iter().map(|(n, e)| Ok((sym(&n), e.into_ast(file)?))).collect::<Result<_>>()?,
      },
      Self::BinOp { op, lhs, rhs } => ExprKind::BinOp(bin_op(&op, file)?, Box::new(lhs.into_ast(file)?), Box::new(rhs.into_ast(file)?)),
      Self::BoolOp { op, values } => ExprKind::BoolOp(bool_op(&op, file)?, values.into_iter().map(|e| e.into_ast(file)).collect::<Result<_>>()?),
      Self::UnaryOp { op, operand } => ExprKind::UnaryOp(unary_op(&op, file)?, Box::new(operand.into_ast(file)?)),
      Self::Compare { op, lhs, rhs } => ExprKind::Compare(compare_op(&op, file)?, Box::new(lhs.into_ast(file)?), Box::new(rhs.into_ast(file)?)),
      Self::Ternary { cond, then, other } => ExprKind::Ternary {
        cond: Box::new(cond.into_ast(file)?), then: Box::new(then.into_ast(file)?), other: Box::new(other.into_ast(file)?),
      },
      Self::List { items } => ExprKind::List(items.into_iter().map(|e| e.into_ast(file)).collect::<Result<_>>()?),
      Self::Tuple { items } => ExprKind::Tuple(items.into_iter().map(|e| e.into_ast(file)).collect::<Result<_>>()?),
      Self::StructLit { name, fields } => ExprKind::StructLit(sym(&name), fields.into_iter().map(|(n, e)| Ok((sym(&n), e.into_ast(file)?))).collect::<Result<_>>()?),
    };
    Ok(Expr { span, kind })
  }
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireIterExpr {
  Expr { value: WireExpr },
  List { items: Vec<WireExpr> },
  Range1 { to: WireExpr },
  Range2 { from: WireExpr, to: WireExpr },
  RangeOffset { base: WireExpr, konst: u64 },
}

impl WireIterExpr {
  fn into_ast(self, file: &FileSpan) -> Result<IterExpr> {
    Ok(match self {
      Self::Expr { value } => IterExpr::Expr(value.into_ast(file)?),
      Self::List { items } => IterExpr::List(items.into_iter().map(|e| e.into_ast(file)).collect::<Result<_>>()?),
      Self::Range1 { to } => IterExpr::Range1(to.into_ast(file)?),
      Self::Range2 { from, to } => IterExpr::Range2(from.into_ast(file)?, to.into_ast(file)?),
      Self::RangeOffset { base, konst } => IterExpr::RangeOffset { base: base.into_ast(file)?, konst },
    })
  }
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireStmt {
  Expr { value: WireExpr },
  Assign { target: WireExpr, value: WireExpr },
  AugAssign { op: String, target: WireExpr, value: WireExpr },
  AnnAssign { name: String, ty: WireType, #[serde(default)] value: Option<WireExpr> },
  If { cond: WireExpr, #[serde(default)] then: Vec<WireStmt>, #[serde(default)] els: Vec<WireStmt> },
  For { var: String, iter: WireIterExpr, #[serde(default)] body: Vec<WireStmt> },
  Return { #[serde(default)] values: Vec<WireExpr> },
  Pass,
  Break,
  Continue,
  Assert { cond: WireExpr, #[serde(default)] reason: Option<WireLit> },
  Raise { #[serde(default)] reason: Option<WireLit> },
  Log { event: String, #[serde(default)] args: Vec<WireExpr> },
}

impl WireStmt {
  fn into_ast(self, file: &FileSpan) -> Result<Stmt> {
    let span = file.clone();
    let kind = match self {
      Self::Expr { value } => StmtKind::Expr(value.into_ast(file)?),
      Self::Assign { target, value } => StmtKind::Assign(target.into_ast(file)?, value.into_ast(file)?),
      Self::AugAssign { op, target, value } => StmtKind::AugAssign(bin_op(&op, file)?, target.into_ast(file)?, value.into_ast(file)?),
      Self::AnnAssign { name, ty, value } => StmtKind::AnnAssign {
        name: sym(&name), ty: ty.into_ast(), value: value.map(|e| e.into_ast(file)).transpose()?,
      },
      Self::If { cond, then, els } => StmtKind::If {
        cond: cond.into_ast(file)?,
        then: then.into_iter().map(|s| s.into_ast(file)).collect::<Result<_>>()?,
        els: els.into_iter().map(|s| s.into_ast(file)).collect::<Result<_>>()?,
      },
      Self::For { var, iter, body } => StmtKind::For {
        var: sym(&var), iter: iter.into_ast(file)?, body: body.into_iter().map(|s| s.into_ast(file)).collect::<Result<_>>()?,
      },
      Self::Return { values } => StmtKind::Return(values.into_iter().map(|e| e.into_ast(file)).collect::<Result<_>>()?),
      Self::Pass => StmtKind::Pass,
      Self::Break => StmtKind::Break,
      Self::Continue => StmtKind::Continue,
      Self::Assert { cond, reason } => StmtKind::Assert { cond: cond.into_ast(file)?, reason: reason.map(WireLit::into_ast) },
      Self::Raise { reason } => StmtKind::Raise(reason.map(WireLit::into_ast)),
      Self::Log { event, args } => StmtKind::Log { event: sym(&event), args: args.into_iter().map(|e| e.into_ast(file)).collect::<Result<_>>()? },
    };
    Ok(Stmt { span, kind })
  }
}

#[derive(Deserialize)]
pub struct WireArg {
  pub name: String,
  pub ty: WireType,
  #[serde(default)]
  pub default: Option<WireExpr>,
}

#[derive(Deserialize)]
pub struct WireEventField {
  pub name: String,
  pub ty: WireType,
  #[serde(default)]
  pub indexed: bool,
}

#[derive(Deserialize)]
pub struct WireInterfaceFn {
  pub name: String,
  #[serde(default)]
  pub args: Vec<WireType>,
  #[serde(default)]
  pub ret: Option<WireType>,
  #[serde(default)]
  pub mutability: WireMutability,
}

impl WireInterfaceFn {
  fn into_ast(self) -> InterfaceFunctionSig {
    InterfaceFunctionSig {
      name: sym(&self.name),
      args: self.args.into_iter().map(WireType::into_ast).collect(),
      ret: self.ret.map(WireType::into_ast),
      mutability: self.mutability.into_ast(),
    }
  }
}

#[derive(Deserialize)]
pub struct WireAbiFunctionDecl {
  pub name: String,
  #[serde(default)]
  pub args: Vec<WireType>,
  #[serde(default)]
  pub rets: Vec<WireType>,
  #[serde(default)]
  pub mutability: WireMutability,
}

impl WireAbiFunctionDecl {
  fn into_ast(self) -> AbiFunctionDecl {
    AbiFunctionDecl {
      name: sym(&self.name),
      args: self.args.into_iter().map(WireType::into_ast).collect(),
      rets: self.rets.into_iter().map(WireType::into_ast).collect(),
      mutability: self.mutability.into_ast(),
    }
  }
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireImportedInterface {
  Source { #[serde(default)] functions: Vec<WireInterfaceFn> },
  Abi { #[serde(default)] functions: Vec<WireAbiFunctionDecl> },
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireDecl {
  Var {
    name: String,
    ty: WireType,
    #[serde(default)] modifier: WireVarModifier,
    #[serde(default)] public: bool,
    #[serde(default)] value: Option<WireExpr>,
  },
  Implements { interface: String },
  Event { name: String, #[serde(default)] fields: Vec<WireEventField> },
  Struct { name: String, #[serde(default)] fields: Vec<(String, WireType)> },
  Enum { name: String, #[serde(default)] members: Vec<String> },
  Interface { name: String, #[serde(default)] functions: Vec<WireInterfaceFn> },
  Function {
    name: String,
    #[serde(default)] args: Vec<WireArg>,
    #[serde(default)] ret: Option<WireType>,
    #[serde(default)] external: bool,
    #[serde(default)] mutability: WireMutability,
    #[serde(default)] nonreentrant: Option<String>,
    #[serde(default)] body: Vec<WireStmt>,
  },
  Import { name: String, interface: WireImportedInterface },
}

impl WireDecl {
  fn into_ast(self, file: &FileSpan) -> Result<Decl> {
    let span = file.clone();
    Ok(match self {
      Self::Var { name, ty, modifier, public, value } => Decl::Var(ModuleVar {
        span, name: sym(&name), ty: ty.into_ast(), modifier: modifier.into_ast(), public,
        value: value.map(|e| e.into_ast(file)).transpose()?,
      }),
      Self::Implements { interface } => Decl::Implements { span, interface: sym(&interface) },
      Self::Event { name, fields } => Decl::Event(EventDef {
        span, name: sym(&name),
        fields: fields.into_iter().map(|f| EventField { name: sym(&f.name), ty: f.ty.into_ast(), indexed: f.indexed }).collect(),
      }),
      Self::Struct { name, fields } => Decl::Struct(StructDef {
        span, name: sym(&name), fields: fields.into_iter().map(|(n, t)| (sym(&n), t.into_ast())).collect(),
      }),
      Self::Enum { name, members } => Decl::Enum(EnumDef {
        span, name: sym(&name), members: members.iter().map(|m| sym(m)).collect(),
      }),
      Self::Interface { name, functions } => Decl::Interface(InterfaceDef {
        span, name: sym(&name), functions: functions.into_iter().map(WireInterfaceFn::into_ast).collect(),
      }),
      Self::Function { name, args, ret, external, mutability, nonreentrant, body } => Decl::Function(FunctionDef {
        span, name: sym(&name),
        args: args.into_iter().map(|a| Ok(FunctionArg { name: sym(&a.name), ty: a.ty.into_ast(), default: a.default.map(|e| e.into_ast(file)).transpose()? })).collect::<Result<_>>()?,
        ret: ret.map(WireType::into_ast), external, mutability: mutability.into_ast(), nonreentrant,
        body: body.into_iter().map(|s| s.into_ast(file)).collect::<Result<_>>()?,
      }),
      Self::Import { name, interface } => Decl::Import(Import {
        span, name: sym(&name),
        interface: match interface {
          WireImportedInterface::Source { functions } => ImportedInterface::Source(InterfaceDef {
            span: file.clone(), name: sym(&name), functions: functions.into_iter().map(WireInterfaceFn::into_ast).collect(),
          }),
          WireImportedInterface::Abi { functions } => ImportedInterface::Abi(functions.into_iter().map(WireAbiFunctionDecl::into_ast).collect()),
        },
      }),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn file() -> FileSpan { FileSpan::synthetic(std::rc::Rc::from("t.json")) }

  #[test]
  fn parses_a_single_external_function_returning_a_literal() {
    let json = r#"{
      "decls": [
        { "kind": "function", "name": "get_value", "external": true, "mutability": "view",
          "ret": { "kind": "name", "name": "uint256" },
          "body": [ { "kind": "return", "values": [ { "kind": "int_lit", "value": 7 } ] } ] }
      ]
    }"#;
    let module = parse_module(json, &file()).unwrap();
    assert_eq!(module.decls.len(), 1);
    let Decl::Function(f) = &module.decls[0] else { panic!("expected a function decl") };
    assert_eq!(f.name, sym("get_value"));
    assert!(f.external);
  }

  #[test]
  fn unknown_operator_name_is_a_syntax_error_not_a_panic() {
    let json = r#"{
      "decls": [
        { "kind": "function", "name": "f", "body": [
          { "kind": "expr", "value": { "kind": "bin_op", "op": "frobnicate",
            "lhs": { "kind": "int_lit", "value": 1 }, "rhs": { "kind": "int_lit", "value": 2 } } }
        ] }
      ]
    }"#;
    let err = parse_module(json, &file()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::SyntaxException(_)));
  }

  #[test]
  fn malformed_json_is_a_syntax_error() {
    let err = parse_module("not json", &file()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::SyntaxException(_)));
  }
}
