//! The serialized instruction record consumed by the decoders. A record is what the front end
//! emits for one instruction: an opcode, positional input operands each carrying an explicit
//! tag, the output register indices, and optional provenance.

use std::fmt::{Display, Formatter};

use crate::address::{Reg, RegisterNumberType};
use crate::types::WireType;

/// A tagged input operand.
#[derive(Clone, Debug, PartialEq)]
pub enum OperandRecord {
  Array(RegisterNumberType),
  ArrayList(Vec<RegisterNumberType>),
  Sequence(RegisterNumberType),
  Opaque(RegisterNumberType),
  Shape(RegisterNumberType),
  Scalar(RegisterNumberType),
  Int(i64),
  Float(f64),
  String(String),
  Ints(Vec<i64>),
  Doubles(Vec<f64>),
}

impl OperandRecord {
  pub fn wire_type(&self) -> WireType {
    match self {
      OperandRecord::Array(_)     => WireType::Array,
      OperandRecord::ArrayList(_) => WireType::ArrayList,
      OperandRecord::Sequence(_)  => WireType::Sequence,
      OperandRecord::Opaque(_)    => WireType::Opaque,
      OperandRecord::Shape(_)     => WireType::Shape,
      OperandRecord::Scalar(_)    => WireType::Scalar,
      OperandRecord::Int(_)       => WireType::Int,
      OperandRecord::Float(_)     => WireType::Float,
      OperandRecord::String(_)    => WireType::String,
      OperandRecord::Ints(_)      => WireType::Ints,
      OperandRecord::Doubles(_)   => WireType::Doubles,
    }
  }
}

impl Display for OperandRecord {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      OperandRecord::Array(i)     => write!(f, "${}", Reg::from_wire(*i)),
      OperandRecord::ArrayList(v) => write!(f, "[{}]", join(v.iter().map(|i| format!("${}", Reg::from_wire(*i))))),
      OperandRecord::Sequence(i)  => write!(f, "@{}", Reg::from_wire(*i)),
      OperandRecord::Opaque(i)    => write!(f, "*{}", Reg::from_wire(*i)),
      OperandRecord::Shape(i)     => write!(f, "^{}", Reg::from_wire(*i)),
      OperandRecord::Scalar(i)    => write!(f, "%{}", Reg::from_wire(*i)),
      OperandRecord::Int(i)       => write!(f, "{}", i),
      OperandRecord::Float(x)     => write!(f, "{:?}", x),
      OperandRecord::String(s)    => write!(f, "{:?}", s),
      OperandRecord::Ints(v)      => write!(f, "({})", join(v.iter().map(i64::to_string))),
      OperandRecord::Doubles(v)   => write!(f, "{{{}}}", join(v.iter().map(|x| format!("{:?}", x)))),
    }
  }
}

fn join(items: impl Iterator<Item = String>) -> String {
  items.collect::<Vec<String>>().join(", ")
}

/// One serialized instruction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstructionRecord {
  pub opcode     : u16,
  pub inputs     : Vec<OperandRecord>,
  pub outputs    : Vec<RegisterNumberType>,
  pub debug_info : Option<String>,
}

impl InstructionRecord {
  pub fn new(opcode: u16) -> InstructionRecord {
    InstructionRecord { opcode, ..Default::default() }
  }

  pub fn input(mut self, operand: OperandRecord) -> InstructionRecord {
    self.inputs.push(operand);
    self
  }

  pub fn output(mut self, register: RegisterNumberType) -> InstructionRecord {
    self.outputs.push(register);
    self
  }

  pub fn debug_info(mut self, info: &str) -> InstructionRecord {
    self.debug_info = Some(info.to_string());
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_keeps_operand_order() {
    let record = InstructionRecord::new(7)
        .input(OperandRecord::Array(0))
        .input(OperandRecord::Int(3))
        .output(2)
        .debug_info("model.py:12");

    assert_eq!(record.opcode, 7);
    assert_eq!(record.inputs, vec![OperandRecord::Array(0), OperandRecord::Int(3)]);
    assert_eq!(record.outputs, vec![2]);
    assert_eq!(record.debug_info.as_deref(), Some("model.py:12"));
  }

  #[test]
  fn tags_follow_variants() {
    assert_eq!(OperandRecord::Ints(vec![1, 2]).wire_type(), WireType::Ints);
    assert_eq!(OperandRecord::Scalar(4).wire_type(), WireType::Scalar);
    assert_eq!(OperandRecord::Doubles(vec![0.5]).to_string(), "{0.5}");
    assert_eq!(OperandRecord::ArrayList(vec![1, 2]).to_string(), "[$1, $2]");
  }
}
