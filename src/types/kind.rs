/*!
  One zero-sized marker type per [`OperandKind`]. The instruction generator names an operand's
  kind by naming its marker (`a: Array`), and reaches everything kind-specific through the
  marker's [`OperandType`] (and, for outputs, [`RegisterType`]) implementation. An output
  declared with a literal kind fails to compile, because literal markers do not implement
  `RegisterType`.
*/

use crate::address::Reg;
use crate::bytecode::OperandRecord;
use crate::errors::{Result, VmError};
use crate::state::VmState;
use crate::types::value::{self, OpaqueHandle, MAX_NDIM};
use crate::types::OperandKind;

/// An operand as seen by the runner's generic steps (null guard, trace, safety check).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OperandValue<'a> {
  Reg(Reg),
  Regs(&'a [Reg]),
  Int(i64),
  Float(f64),
  Str(&'a str),
  Ints(&'a [i64]),
  Doubles(&'a [f64]),
}

impl<'a> OperandValue<'a> {
  /// The registers the operand refers to; empty for literals.
  pub fn registers(&self) -> &[Reg] {
    match self {
      OperandValue::Reg(reg)   => std::slice::from_ref(reg),
      OperandValue::Regs(regs) => regs,
      _                        => &[],
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Operand<'a> {
  pub name  : &'static str,
  pub kind  : OperandKind,
  pub value : OperandValue<'a>,
}

pub trait OperandType {
  const KIND: OperandKind;

  /// The field type of a decoded instruction.
  type Storage: Clone + std::fmt::Debug;
  /// The value the runner resolves before calling the typed stub.
  type Held;
  /// The parameter type of the typed stub.
  type Input<'a>;

  fn decode(instruction: &'static str, position: usize, record: &OperandRecord) -> Result<Self::Storage>;

  fn resolve(st: &VmState, storage: &Self::Storage) -> Result<Self::Held>;

  /// Runs once every input has resolved, so nothing is moved out of a register unless the
  /// stub will be called.
  fn lend(_st: &mut VmState, _storage: &Self::Storage, _held: &mut Self::Held) -> Result<()> {
    Ok(())
  }

  fn input(held: &mut Self::Held) -> Self::Input<'_>;

  /// Hands a lent value back to its register after the stub returns, whether or not it
  /// succeeded.
  fn restore(_st: &mut VmState, _storage: &Self::Storage, _held: Self::Held) {}

  fn operand(storage: &Self::Storage) -> OperandValue<'_>;
}

/// Kinds that may appear as instruction outputs.
pub trait RegisterType: OperandType {
  /// What a typed stub produces for an output of this kind.
  type Output;

  fn decode_output(outputs: &mut OutputCursor<'_>) -> Self::Storage;

  /// Moves `value` into the register(s). An absent register drops the value.
  fn store(st: &mut VmState, storage: &Self::Storage, value: Self::Output) -> Result<()>;
}

/// Walks a record's output registers in declaration order.
pub struct OutputCursor<'a> {
  outputs  : &'a [i32],
  position : usize,
}

impl<'a> OutputCursor<'a> {
  pub fn new(outputs: &'a [i32]) -> OutputCursor<'a> {
    OutputCursor { outputs, position: 0 }
  }

  /// Missing entries read as absent; the decoder checks the count beforehand.
  pub fn next_register(&mut self) -> Reg {
    let reg = self.outputs.get(self.position).map_or(Reg::ABSENT, |i| Reg::from_wire(*i));
    self.position += 1;
    reg
  }

  pub fn rest(&mut self) -> Vec<Reg> {
    let rest = self.outputs.get(self.position..).unwrap_or(&[]);
    self.position = self.outputs.len();
    rest.iter().map(|i| Reg::from_wire(*i)).collect()
  }
}

// region Decoding helpers

fn mismatch(instruction: &'static str, position: usize, kind: OperandKind, record: &OperandRecord) -> VmError {
  VmError::SchemaMismatch {
    instruction,
    position,
    expected: kind.wire_type(),
    actual: record.wire_type(),
  }
}

fn register(instruction: &'static str, position: usize, kind: OperandKind, record: &OperandRecord) -> Result<Reg> {
  use crate::types::WireType as W;

  match (kind.wire_type(), record) {
    (W::Array, OperandRecord::Array(i))
    | (W::Sequence, OperandRecord::Sequence(i))
    | (W::Opaque, OperandRecord::Opaque(i))
    | (W::Shape, OperandRecord::Shape(i))
    | (W::Scalar, OperandRecord::Scalar(i)) => Ok(Reg::from_wire(*i)),
    _ => Err(mismatch(instruction, position, kind, record)),
  }
}

// endregion

// region Register kinds

macro_rules! register_marker {
  ($marker:ident, $held:ty, $input:ty, $output:ty, |$st:ident, $reg:ident| $resolve:expr, |$sst:ident, $sreg:ident, $value:ident| $store:expr, |$held_v:ident| $view:expr) => {
    #[derive(Debug)]
    pub struct $marker;

    impl OperandType for $marker {
      const KIND: OperandKind = OperandKind::$marker;
      type Storage = Reg;
      type Held = $held;
      type Input<'a> = $input;

      fn decode(instruction: &'static str, position: usize, record: &OperandRecord) -> Result<Reg> {
        register(instruction, position, Self::KIND, record)
      }

      fn resolve($st: &VmState, storage: &Reg) -> Result<$held> {
        let $reg = *storage;
        $resolve
      }

      fn input($held_v: &mut $held) -> Self::Input<'_> {
        $view
      }

      fn operand(storage: &Reg) -> OperandValue<'_> {
        OperandValue::Reg(*storage)
      }
    }

    impl RegisterType for $marker {
      type Output = $output;

      fn decode_output(outputs: &mut OutputCursor<'_>) -> Reg {
        outputs.next_register()
      }

      fn store($sst: &mut VmState, storage: &Reg, $value: $output) -> Result<()> {
        let $sreg = *storage;
        $store
      }
    }
  };
}

register_marker!(
  Array, value::Array, &'a value::Array, value::Array,
  |st, reg| st.get_array(reg),
  |st, reg, value| st.set_array(reg, value),
  |held| held
);

register_marker!(
  OptionalArray, Option<value::Array>, Option<&'a value::Array>, value::Array,
  |st, reg| st.get_optional_array(reg),
  |st, reg, value| st.set_array(reg, value),
  |held| Option::as_ref(held)
);

register_marker!(
  Opaque, OpaqueHandle, &'a dyn value::Opaque, Box<dyn value::Opaque>,
  |st, reg| st.get_opaque(reg),
  |st, reg, value| st.set_opaque(reg, value),
  |held| &**held
);

register_marker!(
  Shape, value::Shape, &'a value::Shape, value::Shape,
  |st, reg| st.get_shape(reg),
  |st, reg, value| st.set_shape(reg, value),
  |held| held
);

register_marker!(
  Scalar, value::Scalar, value::Scalar, value::Scalar,
  |st, reg| st.get_scalar(reg),
  |st, reg, value| st.set_scalar(reg, value),
  |held| *held
);

register_marker!(
  OptionalScalar, Option<value::Scalar>, Option<value::Scalar>, value::Scalar,
  |st, reg| st.get_optional_scalar(reg),
  |st, reg, value| st.set_scalar(reg, value),
  |held| *held
);

/**
  A sequence register. The stub borrows the register's own sequence mutably: `resolve` only
  checks the slot, `lend` moves the sequence out, and `restore` moves it back. While the stub
  runs, the slot reads as an empty sequence.
*/
#[derive(Debug)]
pub struct Sequence;

impl OperandType for Sequence {
  const KIND: OperandKind = OperandKind::Sequence;
  type Storage = Reg;
  type Held = value::Sequence;
  type Input<'a> = &'a mut value::Sequence;

  fn decode(instruction: &'static str, position: usize, record: &OperandRecord) -> Result<Reg> {
    register(instruction, position, Self::KIND, record)
  }

  fn resolve(st: &VmState, storage: &Reg) -> Result<value::Sequence> {
    st.get_sequence(*storage).map(|_| value::Sequence::new())
  }

  fn lend(st: &mut VmState, storage: &Reg, held: &mut value::Sequence) -> Result<()> {
    *held = st.lend_sequence(*storage)?;
    Ok(())
  }

  fn input(held: &mut value::Sequence) -> &mut value::Sequence {
    held
  }

  fn restore(st: &mut VmState, storage: &Reg, held: value::Sequence) {
    st.return_sequence(*storage, held);
  }

  fn operand(storage: &Reg) -> OperandValue<'_> {
    OperandValue::Reg(*storage)
  }
}

impl RegisterType for Sequence {
  type Output = value::Sequence;

  fn decode_output(outputs: &mut OutputCursor<'_>) -> Reg {
    outputs.next_register()
  }

  fn store(st: &mut VmState, storage: &Reg, value: value::Sequence) -> Result<()> {
    st.set_sequence(*storage, value)
  }
}

/// A list of array registers. As an output it takes every remaining output register.
#[derive(Debug)]
pub struct ArrayList;

impl OperandType for ArrayList {
  const KIND: OperandKind = OperandKind::ArrayList;
  type Storage = Vec<Reg>;
  type Held = Vec<value::Array>;
  type Input<'a> = &'a [value::Array];

  fn decode(instruction: &'static str, position: usize, record: &OperandRecord) -> Result<Vec<Reg>> {
    match record {
      OperandRecord::ArrayList(indices) => Ok(indices.iter().map(|i| Reg::from_wire(*i)).collect()),
      _ => Err(mismatch(instruction, position, Self::KIND, record)),
    }
  }

  fn resolve(st: &VmState, storage: &Vec<Reg>) -> Result<Vec<value::Array>> {
    st.get_array_list(storage)
  }

  fn input(held: &mut Vec<value::Array>) -> &[value::Array] {
    held
  }

  fn operand(storage: &Vec<Reg>) -> OperandValue<'_> {
    OperandValue::Regs(storage)
  }
}

impl RegisterType for ArrayList {
  type Output = Vec<value::Array>;

  fn decode_output(outputs: &mut OutputCursor<'_>) -> Vec<Reg> {
    outputs.rest()
  }

  fn store(st: &mut VmState, storage: &Vec<Reg>, value: Vec<value::Array>) -> Result<()> {
    st.set_array_list(storage, value)
  }
}

// endregion

// region Literal kinds

#[derive(Debug)]
pub struct Int;

impl OperandType for Int {
  const KIND: OperandKind = OperandKind::Int;
  type Storage = i64;
  type Held = i64;
  type Input<'a> = i64;

  fn decode(instruction: &'static str, position: usize, record: &OperandRecord) -> Result<i64> {
    match record {
      OperandRecord::Int(i) => Ok(*i),
      _ => Err(mismatch(instruction, position, Self::KIND, record)),
    }
  }

  fn resolve(_st: &VmState, storage: &i64) -> Result<i64> {
    Ok(*storage)
  }

  fn input(held: &mut i64) -> i64 {
    *held
  }

  fn operand(storage: &i64) -> OperandValue<'_> {
    OperandValue::Int(*storage)
  }
}

#[derive(Debug)]
pub struct Float;

impl OperandType for Float {
  const KIND: OperandKind = OperandKind::Float;
  type Storage = f64;
  type Held = f64;
  type Input<'a> = f64;

  fn decode(instruction: &'static str, position: usize, record: &OperandRecord) -> Result<f64> {
    match record {
      OperandRecord::Float(x) => Ok(*x),
      _ => Err(mismatch(instruction, position, Self::KIND, record)),
    }
  }

  fn resolve(_st: &VmState, storage: &f64) -> Result<f64> {
    Ok(*storage)
  }

  fn input(held: &mut f64) -> f64 {
    *held
  }

  fn operand(storage: &f64) -> OperandValue<'_> {
    OperandValue::Float(*storage)
  }
}

#[derive(Debug)]
pub struct String;

impl OperandType for String {
  const KIND: OperandKind = OperandKind::String;
  type Storage = std::string::String;
  type Held = std::string::String;
  type Input<'a> = &'a str;

  fn decode(instruction: &'static str, position: usize, record: &OperandRecord) -> Result<std::string::String> {
    match record {
      OperandRecord::String(s) => Ok(s.clone()),
      _ => Err(mismatch(instruction, position, Self::KIND, record)),
    }
  }

  fn resolve(_st: &VmState, storage: &std::string::String) -> Result<std::string::String> {
    Ok(storage.clone())
  }

  fn input(held: &mut std::string::String) -> &str {
    held
  }

  fn operand(storage: &std::string::String) -> OperandValue<'_> {
    OperandValue::Str(storage)
  }
}

/// A dimension list; bounded by [`MAX_NDIM`].
#[derive(Debug)]
pub struct IntList;

impl OperandType for IntList {
  const KIND: OperandKind = OperandKind::IntList;
  type Storage = value::IntList;
  type Held = value::IntList;
  type Input<'a> = &'a [i64];

  fn decode(instruction: &'static str, position: usize, record: &OperandRecord) -> Result<value::IntList> {
    match record {
      OperandRecord::Ints(ints) if ints.len() > MAX_NDIM => Err(VmError::CapacityExceeded {
        instruction,
        position,
        len: ints.len(),
        max: MAX_NDIM,
      }),
      OperandRecord::Ints(ints) => Ok(ints.iter().copied().collect()),
      _ => Err(mismatch(instruction, position, Self::KIND, record)),
    }
  }

  fn resolve(_st: &VmState, storage: &value::IntList) -> Result<value::IntList> {
    Ok(storage.clone())
  }

  fn input(held: &mut value::IntList) -> &[i64] {
    held
  }

  fn operand(storage: &value::IntList) -> OperandValue<'_> {
    OperandValue::Ints(storage)
  }
}

#[derive(Debug)]
pub struct DoubleList;

impl OperandType for DoubleList {
  const KIND: OperandKind = OperandKind::DoubleList;
  type Storage = Vec<f64>;
  type Held = Vec<f64>;
  type Input<'a> = &'a [f64];

  fn decode(instruction: &'static str, position: usize, record: &OperandRecord) -> Result<Vec<f64>> {
    match record {
      OperandRecord::Doubles(doubles) => Ok(doubles.clone()),
      _ => Err(mismatch(instruction, position, Self::KIND, record)),
    }
  }

  fn resolve(_st: &VmState, storage: &Vec<f64>) -> Result<Vec<f64>> {
    Ok(storage.clone())
  }

  fn input(held: &mut Vec<f64>) -> &[f64] {
    held
  }

  fn operand(storage: &Vec<f64>) -> OperandValue<'_> {
    OperandValue::Doubles(storage)
  }
}

// endregion
