//! Source positions and spans, threaded through every AST and IR node.

use std::fmt;
use std::rc::Rc;

/// A compilation unit's file name, shared by every span that points into it.
pub type FileName = Rc<str>;

/// A byte-offset range paired with line/column information, used for
/// diagnostics and the PC/source map (spec.md §6 "Source map").
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FileSpan {
  pub file: FileName,
  pub start_line: u32,
  pub start_col: u32,
  pub end_line: u32,
  pub end_col: u32,
  pub byte_start: u32,
  pub byte_end: u32,
}

impl fmt::Debug for FileSpan {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}", self.file, self.start_line, self.start_col)
  }
}

impl fmt::Display for FileSpan {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}", self.file, self.start_line, self.start_col)
  }
}

impl FileSpan {
  /// A zero-width span at the start of `file`, used for synthesized nodes
  /// (builtins, constant-folded replacements) that have no source origin.
  #[must_use] pub fn synthetic(file: FileName) -> Self {
    Self { file, start_line: 0, start_col: 0, end_line: 0, end_col: 0, byte_start: 0, byte_end: 0 }
  }

  /// The smallest span containing both `self` and `other`, used when
  /// merging spans of a terminus `if`/`else` pair or a folded expression.
  #[must_use] pub fn to(&self, other: &FileSpan) -> FileSpan {
    debug_assert_eq!(self.file, other.file);
    FileSpan {
      file: self.file.clone(),
      start_line: self.start_line, start_col: self.start_col,
      end_line: other.end_line, end_col: other.end_col,
      byte_start: self.byte_start, byte_end: other.byte_end,
    }
  }
}

/// A value together with the span of source text it was derived from.
/// Used for named entities (functions, structs, module variables) that need
/// both a payload and a location, matching `mmcc`'s `Spanned<T>`.
#[derive(Clone, Debug)]
pub struct Spanned<T> {
  pub span: FileSpan,
  pub k: T,
}

impl<T> Spanned<T> {
  pub fn new(span: FileSpan, k: T) -> Self { Self { span, k } }
  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> { Spanned { span: self.span, k: f(self.k) } }
}
