/*!
  The uniform runner every instruction goes through. Generated code supplies the per-instruction
  parts through [`Op`] (descriptor, decoding, operand listing, and the typed invocation); [`run`]
  wraps them in the fixed sequence of steps:

    1. trace the instruction's provenance,
    2. skip the instruction if a register input holds null (typed instructions only),
    3. trace the call line,
    4. trace input values,
    5. invoke,
    6. trace output values,
    7. scan array operands for NaN and Inf.

  Tracing is compiled only with the `trace_computation` feature.
*/

use std::fmt::Debug;

use smallvec::SmallVec;

use crate::bytecode::InstructionRecord;
use crate::catalog::InstructionDescriptor;
use crate::errors::Result;
use crate::state::{Diagnostic, NonFinite, VmState};
use crate::types::{Operand, OperandValue};

#[cfg(feature = "trace_computation")]
use crate::{compiler::trace, options::TraceLevel};

pub type Operands<'a> = SmallVec<[Operand<'a>; 8]>;

/// What the generator implements for every instruction struct.
pub trait Op: Sized + Debug {
  const DESCRIPTOR: InstructionDescriptor;

  fn decode(record: &InstructionRecord) -> Result<Self>;

  fn debug_info(&self) -> Option<&str>;

  fn inputs(&self) -> Operands<'_>;

  fn outputs(&self) -> Operands<'_>;

  /// Resolves inputs, calls the hand-written `run_impl`, and stores its results.
  fn invoke(&mut self, st: &mut VmState) -> Result<()>;
}

/**
  Auxiliary state owned by an instruction that declares `custom(T)`. It is built once the
  operand fields are decoded and handed back to `release` when the instruction is dropped.
*/
pub trait CustomState<O>: Sized + Debug {
  fn init(op: &O) -> Result<Self>;

  fn release(self, _op: &O) {}
}

pub fn run<O: Op>(op: &mut O, st: &mut VmState) -> Result<()> {
  let name = O::DESCRIPTOR.name;
  st.begin(name);

  #[cfg(feature = "trace_computation")]
  if st.trace_level() >= TraceLevel::Call {
    if let Some(info) = op.debug_info() {
      st.trace(format!("# {}", info));
    }
  }

  if O::DESCRIPTOR.typed && has_null_input(&op.inputs(), st) {
    return skip(op, st);
  }

  #[cfg(feature = "trace_computation")]
  if st.trace_level() >= TraceLevel::Call {
    let line = trace::call_string(name, &op.inputs(), &op.outputs(), st.colored());
    st.trace(line);
  }

  #[cfg(feature = "trace_computation")]
  if st.trace_level() >= TraceLevel::Operands {
    let mut line = trace::values_string(&op.inputs(), st, st.colored());
    if !O::DESCRIPTOR.outputs.is_empty() {
      line.push_str(" ->");
    }
    st.trace(line);
  }

  op.invoke(st)?;

  #[cfg(feature = "trace_computation")]
  if st.trace_level() >= TraceLevel::Operands && !O::DESCRIPTOR.outputs.is_empty() {
    let line = trace::values_string(&op.outputs(), st, st.colored());
    st.trace(line);
  }

  if st.options().check_nans || st.options().check_infs {
    check_non_finite(op, st);
  }

  Ok(())
}

/// A register input is null if its register is inside the register file and the slot holds
/// null. Registers past the end are left for `invoke` to reject.
fn has_null_input(inputs: &[Operand<'_>], st: &VmState) -> bool {
  inputs.iter()
        .flat_map(|operand| operand.value.registers())
        .filter(|reg| reg.index().map_or(false, |i| i < st.num_registers()))
        .any(|reg| st.is_null(*reg))
}

fn skip<O: Op>(op: &O, st: &mut VmState) -> Result<()> {
  let name = O::DESCRIPTOR.name;

  if st.warn_once(name) {
    tracing::warn!(instruction = name, "{} skipped: a register input is null", name);
    st.report(Diagnostic::NullOperand { instruction: name });
  }
  for operand in op.outputs().iter() {
    for reg in operand.value.registers() {
      st.set_null(*reg)?;
    }
  }
  Ok(())
}

fn check_non_finite<O: Op>(op: &O, st: &mut VmState) {
  let name = O::DESCRIPTOR.name;
  let (check_nans, check_infs) = (st.options().check_nans, st.options().check_infs);
  let inputs = op.inputs();
  let outputs = op.outputs();
  let mut found = Vec::new();

  let scanned = inputs.iter()
                      .filter(|operand| operand.kind.holds_arrays())
                      .chain(outputs.iter());
  for operand in scanned {
    for reg in operand.value.registers() {
      let Some(register) = reg.index() else { continue };
      let (nan, inf) = st.get_var(*reg).non_finite();
      if nan && check_nans {
        found.push((operand.name, register, NonFinite::Nan));
      }
      if inf && check_infs {
        found.push((operand.name, register, NonFinite::Inf));
      }
    }
  }

  if found.is_empty() {
    return;
  }

  let report = invalid_in_outs(&inputs, &outputs, st);
  for (operand, register, problem) in found {
    tracing::error!(instruction = name, operand, register, "{} detected\n{}", problem, report);
    st.report(Diagnostic::NonFiniteValue { instruction: name, operand, register, problem });
  }
}

/// One `input #i: value` / `output #i: value` line per array operand.
fn invalid_in_outs(inputs: &[Operand<'_>], outputs: &[Operand<'_>], st: &VmState) -> String {
  let describe = |operand: &Operand<'_>| match operand.value {
    OperandValue::Reg(reg)   => st.get_var_string(reg),
    OperandValue::Regs(regs) => st.get_var_list_string(regs),
    _                        => String::new(),
  };

  let inputs = inputs.iter()
                     .filter(|operand| operand.kind.holds_arrays())
                     .enumerate()
                     .map(|(i, operand)| format!("input #{}: {}", i, describe(operand)));
  let outputs = outputs.iter()
                       .enumerate()
                       .map(|(i, operand)| format!("output #{}: {}", i, describe(operand)));

  inputs.chain(outputs).collect::<Vec<String>>().join("\n")
}
