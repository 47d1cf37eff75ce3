//! Errors raised while decoding, dispatching, or executing instructions.
//!
//! Only structural problems are errors. A null register input and a non-finite value are
//! recoverable and are reported as [`Diagnostic`](crate::state::Diagnostic)s instead.

use thiserror::Error;

use crate::types::WireType;

pub type Result<T> = std::result::Result<T, VmError>;

#[derive(Debug, Error)]
pub enum VmError {
  /// A serialized operand's tag disagrees with the kind the descriptor declares.
  #[error("unexpected type for input #{position} of {instruction}: expected {expected}, got {actual}")]
  SchemaMismatch {
    instruction : &'static str,
    position    : usize,
    expected    : WireType,
    actual      : WireType,
  },

  /// The record carries a different number of inputs or outputs than declared.
  #[error("{instruction} expects {expected} {operands} but the record has {actual}")]
  ArityMismatch {
    instruction : &'static str,
    operands    : &'static str,
    expected    : usize,
    actual      : usize,
  },

  /// A fixed-capacity list operand is longer than the supported maximum.
  #[error("input #{position} of {instruction} has {len} elements, more than the maximum of {max}")]
  CapacityExceeded {
    instruction : &'static str,
    position    : usize,
    len         : usize,
    max         : usize,
  },

  /// The opcode does not name an instruction in the catalog. The program is corrupt.
  #[error("unknown opcode: {0}")]
  UnknownOpcode(u16),

  /// A required register operand carries the absent marker.
  #[error("required register operand is absent")]
  AbsentRegister,

  /// The index lies outside the register file, or does not fit the wire format at all.
  #[error("register {register} is outside a register file of {count}")]
  RegisterOutOfRange { register: usize, count: usize },

  #[error("register {0} holds null")]
  NullRegister(usize),

  #[error("register {register} holds {actual}, expected {expected}")]
  RegisterKind {
    register : usize,
    expected : &'static str,
    actual   : &'static str,
  },

  #[error("expected {expected} output values, got {actual}")]
  OutputCount { expected: usize, actual: usize },

  #[error("input value does not exist: {0}")]
  MissingInput(String),

  #[error("duplicated output name: {0}")]
  DuplicateOutput(String),

  #[error("invalid instruction catalog: {0}")]
  InvalidCatalog(String),

  #[error(transparent)]
  Shape(#[from] ndarray::ShapeError),

  /// A kernel rejected its operands, e.g. incompatible shapes or a bad axis.
  #[error("{0}")]
  Kernel(String),

  #[error("line {line}: {message}")]
  Assembly { line: usize, message: String },
}
