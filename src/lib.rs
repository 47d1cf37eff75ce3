/*!
  The instruction-execution core of a register-based tensor virtual machine.

  A front end lowers a model into a flat program of [`InstructionRecord`]s (or its textual
  [assembly](bytecode)). Each record is decoded against the generated instruction catalog
  into a typed instruction, and a [`Program`] runs those instructions in order against a
  register file held by a [`VmState`]. Registers hold arrays, sequences of arrays, opaque
  handles, shapes, or scalars; an instruction with a null register input is skipped and its
  outputs are nulled.

  ```text
  # model.py:3
  $2 = Add($0, $1)
  $3, *4 = Relu($2)
  ```
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

mod address;
pub mod bytecode;
pub mod catalog;
pub mod compiler;
pub mod dispatch;
mod errors;
pub mod instructions;
pub mod ops;
pub mod options;
pub mod state;
pub mod types;
mod var;

pub use address::{Reg, RegisterNumberType};
pub use bytecode::{parse_assembly, InstructionRecord, OperandRecord};
pub use catalog::{InstructionDescriptor, OperandDescriptor};
pub use dispatch::{Dispatch, Dispatcher, Program};
pub use errors::{Result, VmError};
pub use instructions::{Instruction, Opcode};
pub use options::{TraceLevel, VmOptions};
pub use state::{Diagnostic, NonFinite, VmState};
pub use var::Var;
