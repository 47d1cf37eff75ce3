/*!
  Opcode dispatch. A catalog generated by `define_instructions!` provides a closed
  `Instruction` enum implementing [`Dispatch`]; the [`Dispatcher`] maps opcodes to that
  catalog's decoders, and a [`Program`] is a decoded instruction stream run in order against
  one [`VmState`].
*/

use std::fmt::{Display, Formatter};

use bimap::BiMap;

use crate::bytecode::{parse_assembly, InstructionRecord};
use crate::catalog::{validate_catalog, InstructionDescriptor};
use crate::compiler::Op;
use crate::errors::{Result, VmError};
use crate::state::VmState;

/// Decodes a record into a catalog's instruction type.
pub type Factory<I> = fn(&InstructionRecord) -> Result<I>;

/// The factory of instruction `O`, as stored in a generated `FACTORIES` table.
pub fn make<O, I>(record: &InstructionRecord) -> Result<I>
  where O: Op + Into<I>
{
  O::decode(record).map(Into::into)
}

/// Implemented by the `Instruction` enum of every generated catalog.
pub trait Dispatch: Sized + Display + 'static {
  fn catalog() -> &'static [InstructionDescriptor];

  /// Factories in opcode order.
  fn factories() -> &'static [Factory<Self>];

  fn opcode(&self) -> u16;

  fn debug_info(&self) -> Option<&str>;

  /// One past the highest register the instruction names.
  fn register_count(&self) -> usize;

  fn run(&mut self, st: &mut VmState) -> Result<()>;
}

pub struct Dispatcher<I: Dispatch> {
  factories : &'static [Factory<I>],
  mnemonics : BiMap<u16, &'static str>,
}

impl<I: Dispatch> Dispatcher<I> {
  /// Validates the catalog and builds the opcode tables.
  pub fn new() -> Result<Dispatcher<I>> {
    let catalog = I::catalog();
    let factories = I::factories();

    validate_catalog(catalog)?;
    if catalog.len() != factories.len() {
      return Err(VmError::InvalidCatalog(format!(
        "{} descriptors but {} factories", catalog.len(), factories.len()
      )));
    }

    Ok(Dispatcher {
      factories,
      mnemonics: catalog.iter().map(|d| (d.opcode, d.name)).collect(),
    })
  }

  pub fn factory(&self, opcode: u16) -> Result<Factory<I>> {
    (opcode as usize)
      .checked_sub(1)
      .and_then(|i| self.factories.get(i))
      .copied()
      .ok_or(VmError::UnknownOpcode(opcode))
  }

  pub fn decode(&self, record: &InstructionRecord) -> Result<I> {
    let factory = self.factory(record.opcode)?;
    factory(record)
  }

  pub fn opcode_of(&self, name: &str) -> Option<u16> {
    self.mnemonics.get_by_right(name).copied()
  }

  pub fn name_of(&self, opcode: u16) -> Option<&'static str> {
    self.mnemonics.get_by_left(&opcode).copied()
  }

  pub fn descriptor(&self, opcode: u16) -> Result<&'static InstructionDescriptor> {
    (opcode as usize)
      .checked_sub(1)
      .and_then(|i| I::catalog().get(i))
      .ok_or(VmError::UnknownOpcode(opcode))
  }

  /// `(opcode, name)` pairs in opcode order.
  pub fn entries(&self) -> Vec<(u16, &'static str)> {
    let mut entries: Vec<(u16, &'static str)> = self.mnemonics.iter().map(|(o, n)| (*o, *n)).collect();
    entries.sort_unstable();
    entries
  }

  pub fn len(&self) -> usize {
    self.factories.len()
  }

  pub fn is_empty(&self) -> bool {
    self.factories.is_empty()
  }
}

/// A decoded instruction stream.
pub struct Program<I: Dispatch> {
  instructions: Vec<I>,
}

impl<I: Dispatch> Program<I> {
  /// Decodes every record; the first malformed record aborts the load.
  pub fn load(records: &[InstructionRecord]) -> Result<Program<I>> {
    let dispatcher = Dispatcher::<I>::new()?;
    Program::load_with(&dispatcher, records)
  }

  pub fn load_with(dispatcher: &Dispatcher<I>, records: &[InstructionRecord]) -> Result<Program<I>> {
    let instructions = records.iter()
                              .map(|record| dispatcher.decode(record))
                              .collect::<Result<Vec<I>>>()?;
    tracing::debug!(instructions = instructions.len(), "program loaded");
    Ok(Program { instructions })
  }

  pub fn from_assembly(text: &str) -> Result<Program<I>> {
    let dispatcher = Dispatcher::<I>::new()?;
    let records = parse_assembly(text, &dispatcher)?;
    Program::load_with(&dispatcher, &records)
  }

  /// The size of register file the program needs.
  pub fn num_registers(&self) -> usize {
    self.instructions.iter().map(Dispatch::register_count).max().unwrap_or(0)
  }

  /// Runs every instruction in order. Stops at the first error, leaving the failing
  /// instruction's index in [`VmState::pc`]. A state smaller than
  /// [`Program::num_registers`] is rejected before anything runs.
  pub fn run(&mut self, st: &mut VmState) -> Result<()> {
    let needed = self.num_registers();
    if needed > st.num_registers() {
      return Err(VmError::RegisterOutOfRange { register: needed - 1, count: st.num_registers() });
    }

    for (pc, instruction) in self.instructions.iter_mut().enumerate() {
      st.set_pc(pc);
      if let Err(error) = instruction.run(st) {
        tracing::error!(pc, instruction = %instruction, "{}", error);
        return Err(error);
      }
    }
    if st.options().dump_memory_usage {
      st.show_memory_status();
    }
    Ok(())
  }

  pub fn instructions(&self) -> &[I] {
    &self.instructions
  }

  pub fn len(&self) -> usize {
    self.instructions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.instructions.is_empty()
  }
}

/// The program as assembly that [`Program::from_assembly`] reads back. Provenance comes back
/// line by line, with each line trimmed.
impl<I: Dispatch> Display for Program<I> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    for instruction in &self.instructions {
      if let Some(info) = instruction.debug_info() {
        for line in info.split('\n') {
          writeln!(f, "# {}", line)?;
        }
      }
      writeln!(f, "{}", instruction)?;
    }
    Ok(())
  }
}
