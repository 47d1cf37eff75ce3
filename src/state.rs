//! The register file and everything else an instruction runner may touch while it runs.

use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use prettytable::{format as TableFormat, Table};
use strum_macros::Display as StrumDisplay;

use crate::address::Reg;
use crate::errors::{Result, VmError};
use crate::options::{TraceLevel, VmOptions};
use crate::types::{Array, Opaque, OpaqueHandle, Scalar, Sequence, Shape};
use crate::var::{Var, NULL_VAR};

/// Which non-finite value a safety check found.
#[derive(StrumDisplay, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum NonFinite {
  #[strum(serialize = "NaN")]
  Nan,
  #[strum(serialize = "Inf")]
  Inf,
}

/// A recoverable condition recorded while running. Neither kind stops execution.
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
  /// A typed instruction was skipped because a register input held null.
  NullOperand { instruction: &'static str },
  NonFiniteValue {
    instruction : &'static str,
    operand     : &'static str,
    register    : usize,
    problem     : NonFinite,
  },
}

impl Display for Diagnostic {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Diagnostic::NullOperand { instruction } => write!(f, "{} skipped", instruction),
      Diagnostic::NonFiniteValue { instruction, operand, register, problem } => {
        write!(f, "{} detected in {} (${}) of {}", problem, operand, register, instruction)
      }
    }
  }
}

/// Where trace lines go.
#[derive(Clone, Debug)]
pub enum TraceSink {
  /// Colored lines on standard error.
  Stderr,
  /// Uncolored lines kept in memory.
  Capture(Vec<String>),
}

#[derive(Debug)]
pub struct VmState {
  options     : VmOptions,
  variables   : Vec<Var>,
  inputs      : HashMap<String, Var>,
  outputs     : HashMap<String, Var>,

  pc          : usize,
  current     : &'static str,
  warned      : HashSet<&'static str>,
  diagnostics : Vec<Diagnostic>,
  sink        : TraceSink,
}

impl VmState {
  /// A state with `num_registers` null slots; see [`Program::num_registers`](crate::Program::num_registers).
  pub fn new(options: VmOptions, num_registers: usize) -> VmState {
    VmState::with_inputs(options, num_registers, HashMap::new())
  }

  /// A state whose program reads the given named values with `In`.
  pub fn with_inputs(options: VmOptions, num_registers: usize, inputs: HashMap<String, Var>) -> VmState {
    let mut variables = Vec::new();
    variables.resize_with(num_registers, Var::default);

    VmState {
      options,
      variables,
      inputs,
      outputs     : HashMap::new(),
      pc          : 0,
      current     : "",
      warned      : HashSet::new(),
      diagnostics : Vec::new(),
      sink        : TraceSink::Stderr,
    }
  }

  pub fn options(&self) -> &VmOptions {
    &self.options
  }

  pub fn options_mut(&mut self) -> &mut VmOptions {
    &mut self.options
  }

  pub fn trace_level(&self) -> TraceLevel {
    self.options.trace_level
  }

  pub fn pc(&self) -> usize {
    self.pc
  }

  pub(crate) fn set_pc(&mut self, pc: usize) {
    self.pc = pc;
  }

  /// The name of the instruction currently running.
  pub fn current_op(&self) -> &'static str {
    self.current
  }

  pub(crate) fn begin(&mut self, name: &'static str) {
    self.current = name;
  }

  // region Register access

  pub fn num_registers(&self) -> usize {
    self.variables.len()
  }

  fn index_of(&self, reg: Reg) -> Result<usize> {
    let i = reg.index().ok_or(VmError::AbsentRegister)?;
    match i < self.variables.len() {
      true  => Ok(i),
      false => Err(VmError::RegisterOutOfRange { register: i, count: self.variables.len() }),
    }
  }

  /// Unset and absent registers read as null, and so do registers past the end of the file.
  /// The typed getters report the latter as `RegisterOutOfRange`.
  pub fn get_var(&self, reg: Reg) -> &Var {
    reg.index()
       .and_then(|i| self.variables.get(i))
       .unwrap_or(&NULL_VAR)
  }

  /// Overwrites the slot. Writes to the absent register are dropped.
  pub fn set_var(&mut self, reg: Reg, var: Var) -> Result<()> {
    if reg.is_absent() {
      return Ok(());
    }
    let i = self.index_of(reg)?;
    self.variables[i] = var;
    Ok(())
  }

  pub fn set_null(&mut self, reg: Reg) -> Result<()> {
    self.set_var(reg, Var::Null)
  }

  pub fn free_var(&mut self, reg: Reg) -> Result<()> {
    self.index_of(reg)?;
    self.set_null(reg)
  }

  pub fn is_null(&self, reg: Reg) -> bool {
    self.get_var(reg).is_null()
  }

  fn kind_error(register: usize, expected: &'static str, actual: &Var) -> VmError {
    match actual {
      Var::Null => VmError::NullRegister(register),
      other     => VmError::RegisterKind { register, expected, actual: other.kind_name() },
    }
  }

  pub fn get_array(&self, reg: Reg) -> Result<Array> {
    let i = self.index_of(reg)?;
    match self.get_var(reg) {
      Var::Array(array) => Ok(array.clone()),
      other             => Err(Self::kind_error(i, "array", other)),
    }
  }

  /// An absent register or a null slot reads as `None`.
  pub fn get_optional_array(&self, reg: Reg) -> Result<Option<Array>> {
    if reg.is_absent() {
      return Ok(None);
    }
    match self.get_var(reg) {
      Var::Null => self.index_of(reg).map(|_| None),
      _         => self.get_array(reg).map(Some),
    }
  }

  pub fn get_array_list(&self, regs: &[Reg]) -> Result<Vec<Array>> {
    regs.iter().map(|reg| self.get_array(*reg)).collect()
  }

  pub fn get_sequence(&self, reg: Reg) -> Result<&Sequence> {
    let i = self.index_of(reg)?;
    match self.get_var(reg) {
      Var::Sequence(seq) => Ok(seq),
      other              => Err(Self::kind_error(i, "sequence", other)),
    }
  }

  pub fn get_opaque(&self, reg: Reg) -> Result<OpaqueHandle> {
    let i = self.index_of(reg)?;
    match self.get_var(reg) {
      Var::Opaque(opaque) => Ok(opaque.clone()),
      other               => Err(Self::kind_error(i, "opaque", other)),
    }
  }

  pub fn get_shape(&self, reg: Reg) -> Result<Shape> {
    let i = self.index_of(reg)?;
    match self.get_var(reg) {
      Var::Shape(shape) => Ok(shape.clone()),
      other             => Err(Self::kind_error(i, "shape", other)),
    }
  }

  pub fn get_scalar(&self, reg: Reg) -> Result<Scalar> {
    let i = self.index_of(reg)?;
    match self.get_var(reg) {
      Var::Scalar(scalar) => Ok(*scalar),
      other               => Err(Self::kind_error(i, "scalar", other)),
    }
  }

  pub fn get_optional_scalar(&self, reg: Reg) -> Result<Option<Scalar>> {
    if reg.is_absent() {
      return Ok(None);
    }
    match self.get_var(reg) {
      Var::Null => self.index_of(reg).map(|_| None),
      _         => self.get_scalar(reg).map(Some),
    }
  }

  pub fn set_array(&mut self, reg: Reg, array: Array) -> Result<()> {
    self.set_var(reg, Var::Array(array))
  }

  pub fn set_array_list(&mut self, regs: &[Reg], arrays: Vec<Array>) -> Result<()> {
    if regs.len() != arrays.len() {
      return Err(VmError::OutputCount { expected: regs.len(), actual: arrays.len() });
    }
    for reg in regs.iter().filter(|reg| !reg.is_absent()) {
      self.index_of(*reg)?;
    }
    for (reg, array) in regs.iter().zip(arrays) {
      self.set_var(*reg, Var::Array(array))?;
    }
    Ok(())
  }

  pub fn set_sequence(&mut self, reg: Reg, seq: Sequence) -> Result<()> {
    self.set_var(reg, Var::Sequence(seq));
    Ok(())
  }

  /// Replaces the slot with an empty sequence and hands it out for appending.
  pub fn create_sequence(&mut self, reg: Reg) -> Result<&mut Sequence> {
    let i = self.index_of(reg)?;
    self.set_var(reg, Var::Sequence(Sequence::new()));
    match &mut self.variables[i] {
      Var::Sequence(seq) => Ok(seq),
      other              => Err(Self::kind_error(i, "sequence", other)),
    }
  }

  pub fn set_opaque(&mut self, reg: Reg, opaque: Box<dyn Opaque>) -> Result<()> {
    self.set_var(reg, Var::Opaque(Arc::from(opaque)))
  }

  pub fn set_shape(&mut self, reg: Reg, shape: Shape) -> Result<()> {
    self.set_var(reg, Var::Shape(shape))
  }

  pub fn set_scalar(&mut self, reg: Reg, scalar: Scalar) -> Result<()> {
    self.set_var(reg, Var::Scalar(scalar))
  }

  // endregion

  // region Program inputs and outputs

  pub fn input(&self, name: &str) -> Result<&Var> {
    self.inputs.get(name).ok_or_else(|| VmError::MissingInput(name.to_string()))
  }

  /// Publishes the register's current value under `name`.
  pub fn output(&mut self, name: &str, reg: Reg) -> Result<()> {
    if self.outputs.contains_key(name) {
      return Err(VmError::DuplicateOutput(name.to_string()));
    }
    let var = self.get_var(reg).clone();
    self.outputs.insert(name.to_string(), var);
    Ok(())
  }

  pub fn outputs(&self) -> &HashMap<String, Var> {
    &self.outputs
  }

  pub fn take_outputs(&mut self) -> HashMap<String, Var> {
    std::mem::take(&mut self.outputs)
  }

  // endregion

  // region Strings for traces and reports

  /// The register's value as printed by the operand trace. Verbose ops print full contents.
  pub fn get_var_string(&self, reg: Reg) -> String {
    if reg.is_absent() {
      return "null".to_string();
    }
    let var = self.get_var(reg);
    match self.options.verbose_ops.contains(self.current) {
      true  => var.debug_string(),
      false => var.to_string(),
    }
  }

  /// `[$0=f64(2), $_=null]` for an array list.
  pub fn get_var_list_string(&self, regs: &[Reg]) -> String {
    format!(
      "[{}]",
      regs.iter()
          .map(|reg| format!("${}={}", reg, self.get_var_string(*reg)))
          .collect::<Vec<String>>()
          .join(", ")
    )
  }

  /// Per-register byte counts of every non-null slot, with a total row.
  pub fn memory_status(&self) -> Table {
    let mut table = Table::new();
    let mut total = 0usize;

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Bytes"]);

    for (i, var) in self.variables.iter().enumerate().filter(|(_, var)| !var.is_null()) {
      let nbytes = var.nbytes();
      total += nbytes;
      table.add_row(row![r->format!("{}{} =", var.sigil(), i), nbytes]);
    }
    table.add_row(row![r->"Total =", total]);

    table
  }

  /// Logs [`VmState::memory_status`].
  pub fn show_memory_status(&self) {
    tracing::info!("register memory usage:\n{}", self.memory_status());
  }

  // endregion

  // region Tracing and diagnostics

  pub fn capture_trace(&mut self) {
    self.sink = TraceSink::Capture(Vec::new());
  }

  /// Returns captured trace lines, leaving the capture buffer empty.
  pub fn take_trace(&mut self) -> Vec<String> {
    match &mut self.sink {
      TraceSink::Capture(lines) => std::mem::take(lines),
      TraceSink::Stderr         => Vec::new(),
    }
  }

  /// Only stderr output is colored.
  pub fn colored(&self) -> bool {
    matches!(self.sink, TraceSink::Stderr)
  }

  pub fn trace(&mut self, line: String) {
    match &mut self.sink {
      TraceSink::Stderr         => eprintln!("{}", line),
      TraceSink::Capture(lines) => lines.push(line),
    }
  }

  /// Returns true the first time it is called for `name`.
  pub(crate) fn warn_once(&mut self, name: &'static str) -> bool {
    self.warned.insert(name)
  }

  pub fn report(&mut self, diagnostic: Diagnostic) {
    self.diagnostics.push(diagnostic);
  }

  pub fn diagnostics(&self) -> &[Diagnostic] {
    &self.diagnostics
  }

  // endregion
}

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator(' ')
      .borders(' ')
      .separators(
        &[TableFormat::LinePosition::Title],
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separators(
        &[TableFormat::LinePosition::Bottom],
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

/// The register file as a table, one row per slot.
impl Display for VmState {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);

    for (i, var) in self.variables.iter().enumerate() {
      table.add_row(row![r->format!("{}{} =", var.sigil(), i), var]);
    }

    write!(f, "{}", table)
  }
}

#[cfg(test)]
mod tests {
  use ndarray::arr1;

  use super::*;

  fn array(values: &[f64]) -> Array {
    arr1(values).into_dyn().into_shared()
  }

  #[test]
  fn unset_registers_read_null() {
    let st = VmState::new(VmOptions::default(), 8);
    assert!(st.is_null(Reg::new(5)));
    assert!(st.is_null(Reg::ABSENT));
    assert!(matches!(st.get_array(Reg::new(5)), Err(VmError::NullRegister(5))));
    assert!(matches!(st.get_array(Reg::ABSENT), Err(VmError::AbsentRegister)));
    assert!(matches!(st.get_optional_array(Reg::ABSENT), Ok(None)));
    assert!(matches!(st.get_optional_array(Reg::new(5)), Ok(None)));
  }

  #[test]
  fn the_register_file_does_not_grow() {
    let mut st = VmState::new(VmOptions::default(), 4);
    let past_end = Reg::try_from(20_000_000usize).unwrap();

    assert!(matches!(
      st.set_scalar(past_end, Scalar::Int(1)),
      Err(VmError::RegisterOutOfRange { register: 20_000_000, count: 4 })
    ));
    assert!(matches!(st.set_array(Reg::new(4), array(&[1.0])), Err(VmError::RegisterOutOfRange { .. })));
    assert!(matches!(st.create_sequence(Reg::new(4)), Err(VmError::RegisterOutOfRange { .. })));
    assert!(matches!(st.get_array(Reg::new(4)), Err(VmError::RegisterOutOfRange { .. })));
    assert!(matches!(st.get_optional_scalar(Reg::new(4)), Err(VmError::RegisterOutOfRange { .. })));
    assert!(st.free_var(Reg::new(4)).is_err());

    // A list write is checked before any register changes.
    let regs = [Reg::new(0), Reg::new(9)];
    assert!(st.set_array_list(&regs, vec![array(&[1.0]), array(&[2.0])]).is_err());
    assert!(st.is_null(Reg::new(0)));
    assert_eq!(st.num_registers(), 4);
  }

  #[test]
  fn lent_sequences_come_back() {
    let mut st = VmState::new(VmOptions::default(), 2);
    st.set_sequence(Reg::new(0), vec![array(&[1.0])]).unwrap();
    st.set_array(Reg::new(1), array(&[1.0])).unwrap();

    let mut seq = st.lend_sequence(Reg::new(0)).unwrap();
    assert!(st.get_sequence(Reg::new(0)).unwrap().is_empty());
    seq.push(array(&[2.0]));
    st.return_sequence(Reg::new(0), seq);
    assert_eq!(st.get_sequence(Reg::new(0)).unwrap().len(), 2);

    assert!(matches!(st.lend_sequence(Reg::new(1)), Err(VmError::RegisterKind { register: 1, .. })));
  }

  #[test]
  fn writes_overwrite() {
    let mut st = VmState::new(VmOptions::default(), 8);
    st.set_array(Reg::new(3), array(&[1.0])).unwrap();
    st.set_scalar(Reg::new(3), Scalar::Int(4)).unwrap();

    assert_eq!(st.get_scalar(Reg::new(3)).unwrap(), Scalar::Int(4));
    assert!(st.is_null(Reg::new(0)));
    assert!(matches!(
      st.get_array(Reg::new(3)),
      Err(VmError::RegisterKind { register: 3, expected: "array", actual: "scalar" })
    ));
  }

  #[test]
  fn absent_writes_are_dropped() {
    let mut st = VmState::new(VmOptions::default(), 8);
    st.set_array(Reg::ABSENT, array(&[1.0])).unwrap();
    assert_eq!(st.memory_status().len(), 1);
  }

  #[test]
  fn create_sequence_replaces_the_slot() {
    let mut st = VmState::new(VmOptions::default(), 8);
    st.set_array(Reg::new(0), array(&[1.0])).unwrap();
    st.create_sequence(Reg::new(0)).unwrap().push(array(&[2.0, 3.0]));

    assert_eq!(st.get_sequence(Reg::new(0)).unwrap().len(), 1);
    assert!(matches!(st.create_sequence(Reg::ABSENT), Err(VmError::AbsentRegister)));
  }

  #[test]
  fn array_lists_must_match_register_count() {
    let mut st = VmState::new(VmOptions::default(), 8);
    let regs = [Reg::new(0), Reg::new(1)];
    assert!(matches!(
      st.set_array_list(&regs, vec![array(&[1.0])]),
      Err(VmError::OutputCount { expected: 2, actual: 1 })
    ));
    st.set_array_list(&regs, vec![array(&[1.0]), array(&[2.0])]).unwrap();
    assert_eq!(st.get_array_list(&regs).unwrap()[1], array(&[2.0]));
  }

  #[test]
  fn var_strings() {
    let mut st = VmState::new(VmOptions::default().with_verbose_op("Print"), 8);
    st.set_array(Reg::new(0), array(&[1.0, 2.0])).unwrap();

    assert_eq!(st.get_var_list_string(&[Reg::new(0), Reg::new(1), Reg::ABSENT]), "[$0=f64(2), $1=null, $_=null]");

    st.begin("Print");
    assert_eq!(st.get_var_string(Reg::new(0)), "[1, 2]");
  }

  #[test]
  fn program_outputs_are_unique() {
    let mut st = VmState::new(VmOptions::default(), 8);
    st.set_array(Reg::new(0), array(&[1.0])).unwrap();
    st.output("y", Reg::new(0)).unwrap();

    assert!(matches!(st.output("y", Reg::new(0)), Err(VmError::DuplicateOutput(_))));
    assert!(matches!(st.input("x"), Err(VmError::MissingInput(_))));
    assert_eq!(st.take_outputs().len(), 1);
  }

  #[test]
  fn memory_status_totals_bytes() {
    let mut st = VmState::new(VmOptions::default(), 8);
    st.set_array(Reg::new(0), array(&[1.0, 2.0])).unwrap();
    st.set_array(Reg::new(2), array(&[1.0])).unwrap();

    let table = st.memory_status();
    assert_eq!(table.len(), 3);
    assert!(table.to_string().contains("24"));
  }

  #[test]
  fn captured_trace_is_uncolored() {
    let mut st = VmState::new(VmOptions::default(), 8);
    assert!(st.colored());
    st.capture_trace();
    st.trace("line".to_string());
    assert!(!st.colored());
    assert_eq!(st.take_trace(), vec!["line".to_string()]);
    assert!(st.take_trace().is_empty());
  }
}
