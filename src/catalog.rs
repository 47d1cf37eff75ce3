//! Instruction descriptors: the static schema the generator emits for every instruction, and
//! the checks a catalog must pass before a dispatcher is built from it.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use prettytable::{format as TableFormat, Table};

use crate::errors::{Result, VmError};
use crate::types::OperandKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OperandDescriptor {
  pub name : &'static str,
  pub kind : OperandKind,
}

impl OperandDescriptor {
  pub const fn new(name: &'static str, kind: OperandKind) -> OperandDescriptor {
    OperandDescriptor { name, kind }
  }

  pub const fn is_repeated(&self) -> bool {
    self.kind.is_repeated()
  }
}

/// `a: ARRAY`, with a trailing `*` for repeated operands.
impl Display for OperandDescriptor {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}{}", self.name, self.kind, if self.is_repeated() { "*" } else { "" })
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstructionDescriptor {
  pub name             : &'static str,
  /// One-based catalog position.
  pub opcode           : u16,
  pub inputs           : &'static [OperandDescriptor],
  pub outputs          : &'static [OperandDescriptor],
  pub typed            : bool,
  pub has_custom_state : bool,
}

impl InstructionDescriptor {
  /// Whether the last output takes all remaining output registers.
  pub fn variadic_outputs(&self) -> bool {
    self.outputs.last().map_or(false, |o| o.kind == OperandKind::ArrayList)
  }

  pub fn operands(&self) -> impl Iterator<Item = &OperandDescriptor> {
    self.inputs.iter().chain(self.outputs.iter())
  }
}

/// `Name(in: KIND, ...) -> (out: KIND, ...)`
impl Display for InstructionDescriptor {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let list = |operands: &[OperandDescriptor]| {
      operands.iter().map(|o| o.to_string()).collect::<Vec<String>>().join(", ")
    };
    write!(f, "{}({})", self.name, list(self.inputs))?;
    if !self.outputs.is_empty() {
      write!(f, " -> ({})", list(self.outputs))?;
    }
    Ok(())
  }
}

/// Checks the invariants every catalog must satisfy.
pub fn validate_catalog(catalog: &[InstructionDescriptor]) -> Result<()> {
  let mut names = HashSet::new();

  for (position, descriptor) in catalog.iter().enumerate() {
    if !names.insert(descriptor.name) {
      return Err(VmError::InvalidCatalog(format!("duplicate instruction {}", descriptor.name)));
    }
    if descriptor.opcode as usize != position + 1 {
      return Err(VmError::InvalidCatalog(format!(
        "{} has opcode {} at position {}", descriptor.name, descriptor.opcode, position
      )));
    }

    let mut operand_names = HashSet::new();
    for operand in descriptor.operands() {
      if !operand_names.insert(operand.name) {
        return Err(VmError::InvalidCatalog(format!(
          "duplicate operand {} in {}", operand.name, descriptor.name
        )));
      }
    }

    if let Some(output) = descriptor.outputs.iter().find(|o| !o.kind.is_register()) {
      return Err(VmError::InvalidCatalog(format!(
        "output {} of {} is a {} literal", output.name, descriptor.name, output.kind
      )));
    }

    let lists = descriptor.outputs.iter().filter(|o| o.kind == OperandKind::ArrayList).count();
    if lists > 1 || (lists == 1 && !descriptor.variadic_outputs()) {
      return Err(VmError::InvalidCatalog(format!(
        "{} may only have one {} output, and it must be the last", descriptor.name, OperandKind::ArrayList
      )));
    }
  }

  Ok(())
}

/// The catalog as a table: opcode, name, flags, and operand lists.
pub fn catalog_table(catalog: &[InstructionDescriptor]) -> Table {
  let mut table = Table::new();
  let list = |operands: &[OperandDescriptor]| {
    operands.iter()
            .map(|o| format!("{}: {}", o.name, o.kind.storage_type()))
            .collect::<Vec<String>>()
            .join(", ")
  };

  table.set_format(*TableFormat::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
  table.set_titles(row![ubr->"Opcode", ubl->"Name", ubl->"Typed", ubl->"Inputs", ubl->"Outputs"]);

  for descriptor in catalog {
    let typed = match (descriptor.typed, descriptor.has_custom_state) {
      (true, true)   => "typed+custom",
      (true, false)  => "typed",
      (false, true)  => "raw+custom",
      (false, false) => "raw",
    };
    table.add_row(row![
      r->descriptor.opcode,
      descriptor.name,
      typed,
      list(descriptor.inputs),
      list(descriptor.outputs)
    ]);
  }

  table
}
