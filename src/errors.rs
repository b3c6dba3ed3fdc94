//! Diagnostics (component I): typed compiler errors, source-position
//! rendering, and the `ExceptionList` accumulator used by Phase 1 of the
//! semantic analyzer (spec.md §4.C, §7).

use std::fmt;
use thiserror::Error;
use crate::span::FileSpan;

/// The error kind catalogue from spec.md §7, grouped the same way.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
  // Parse & structure
  #[error("invalid syntax: {0}")] SyntaxException(String),
  #[error("invalid structure: {0}")] StructureException(String),
  #[error("unexpected node type: {0}")] UnexpectedNodeType(String),

  // Declaration
  #[error("invalid variable declaration: {0}")] VariableDeclarationException(String),
  #[error("invalid function declaration: {0}")] FunctionDeclarationException(String),
  #[error("invalid event declaration: {0}")] EventDeclarationException(String),
  #[error("name collision: {0}")] NamespaceCollision(String),
  #[error("undeclared definition: {0}")] UndeclaredDefinition(String),
  #[error("unknown type: {0}")] UnknownType(String),
  #[error("unknown attribute: {0}")] UnknownAttribute(String),

  // Typing
  #[error("type mismatch: {0}")] TypeMismatch(String),
  #[error("invalid type: {0}")] InvalidType(String),
  #[error("invalid literal: {0}")] InvalidLiteral(String),
  #[error("invalid operation: {0}")] InvalidOperation(String),
  #[error("invalid reference: {0}")] InvalidReference(String),
  #[error("overflow: {0}")] OverflowException(String),
  #[error("array index out of bounds: {0}")] ArrayIndexException(String),
  #[error("division by zero: {0}")] ZeroDivisionException(String),

  // Semantics
  #[error("call violation: {0}")] CallViolation(String),
  #[error("constancy violation: {0}")] ConstancyViolation(String),
  #[error("state access violation: {0}")] StateAccessViolation(String),
  #[error("immutable violation: {0}")] ImmutableViolation(String),
  #[error("non-payable violation: {0}")] NonPayableViolation(String),
  #[error("interface violation: {0}")] InterfaceViolation(String),
  #[error("iterator exception: {0}")] IteratorException(String),
  #[error("argument exception: {0}")] ArgumentException(String),

  // Compile-time runtime
  #[error("static assertion failed: {0}")] StaticAssertionException(String),

  // Internal invariant
  #[error("compiler panic: {0}")] CompilerPanic(String),
  #[error("internal error: {0}")] CovenantInternalException(String),
  #[error("type check failure: {0}")] TypeCheckFailure(String),
}

/// A single diagnostic: a kind, a message (folded into the kind), and the
/// span(s) it applies to. `extra_spans` covers multi-site errors such as
/// *CallViolation* (which names every function in a cycle).
#[derive(Debug, Clone)]
pub struct CovenantError {
  pub kind: ErrorKind,
  pub span: FileSpan,
  pub extra_spans: Vec<FileSpan>,
}

impl CovenantError {
  pub fn new(kind: ErrorKind, span: FileSpan) -> Self { Self { kind, span, extra_spans: Vec::new() } }

  #[must_use] pub fn with_extra_spans(mut self, spans: impl IntoIterator<Item = FileSpan>) -> Self {
    self.extra_spans.extend(spans);
    self
  }

  /// `true` for the internal-invariant kinds that must abort the whole
  /// compilation immediately rather than being accumulated (spec.md §7).
  #[must_use] pub fn is_fatal(&self) -> bool {
    matches!(self.kind,
      ErrorKind::CompilerPanic(_) | ErrorKind::CovenantInternalException(_) | ErrorKind::TypeCheckFailure(_))
  }
}

impl fmt::Display for CovenantError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}: {}", self.span.file, self.span.start_line, self.span.start_col, self.kind)
  }
}

impl std::error::Error for CovenantError {}

pub type Result<T> = std::result::Result<T, CovenantError>;

/// An accumulator for Phase 1 module analysis (spec.md §4.C): declarations
/// skipped due to unresolved forward references are retried on a later pass,
/// and only the errors from the final, no-progress pass are reported.
#[derive(Debug, Default)]
pub struct ExceptionList {
  errors: Vec<CovenantError>,
}

impl ExceptionList {
  #[must_use] pub fn new() -> Self { Self::default() }
  pub fn push(&mut self, err: CovenantError) { self.errors.push(err); }
  pub fn extend(&mut self, errs: impl IntoIterator<Item = CovenantError>) { self.errors.extend(errs); }
  #[must_use] pub fn is_empty(&self) -> bool { self.errors.is_empty() }
  #[must_use] pub fn len(&self) -> usize { self.errors.len() }

  /// Sort by source position (spec.md §7: "aggregates and sorts by source
  /// position") and hand back the final, ordered list.
  #[must_use] pub fn into_sorted(mut self) -> Vec<CovenantError> {
    self.errors.sort_by(|a, b| {
      (a.span.file.as_ref(), a.span.start_line, a.span.start_col)
        .cmp(&(b.span.file.as_ref(), b.span.start_line, b.span.start_col))
    });
    self.errors
  }
}

impl fmt::Display for ExceptionList {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, e) in self.errors.iter().enumerate() {
      if i > 0 { writeln!(f)?; }
      write!(f, "{e}")?;
    }
    Ok(())
  }
}

/// Render a diagnostic the way spec.md §7 prescribes:
/// `<FileName>:<line>:<col>: <Kind>: <message>` followed by a source
/// excerpt and a caret line.
#[must_use] pub fn render(err: &CovenantError, source: &str) -> String {
  let line_text = source.lines().nth(err.span.start_line.saturating_sub(1) as usize).unwrap_or("");
  let caret_col = err.span.start_col.saturating_sub(1) as usize;
  let caret = format!("{}^", " ".repeat(caret_col));
  format!("{err}\n  {line_text}\n  {caret}")
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::rc::Rc;

  fn span(line: u32, col: u32) -> FileSpan {
    FileSpan { file: Rc::from("a.cov"), start_line: line, start_col: col, end_line: line, end_col: col + 1, byte_start: 0, byte_end: 1 }
  }

  #[test]
  fn sorts_by_span_position() {
    let mut list = ExceptionList::new();
    list.push(CovenantError::new(ErrorKind::UndeclaredDefinition("b".into()), span(5, 1)));
    list.push(CovenantError::new(ErrorKind::UndeclaredDefinition("a".into()), span(1, 1)));
    let sorted = list.into_sorted();
    assert_eq!(sorted[0].span.start_line, 1);
    assert_eq!(sorted[1].span.start_line, 5);
  }

  #[test]
  fn render_includes_caret_at_column() {
    let err = CovenantError::new(ErrorKind::UndeclaredDefinition("x".into()), span(1, 5));
    let rendered = render(&err, "let y = x\n");
    assert!(rendered.contains("let y = x"));
    assert!(rendered.ends_with('^'));
  }
}
