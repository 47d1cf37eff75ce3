/*!
  The instruction set. Everything else about an instruction (its opcode, struct, decoder,
  descriptor, runner wiring) is generated from the list below by
  [`define_instructions!`](crate::compiler). The hand-written part of each instruction is its
  `run_impl`, which lives in [`ops`](crate::ops).

  Opcodes are assigned by position, starting at 1, so the list is append-only: inserting or
  reordering entries renumbers every instruction after the change.
*/

use crate::compiler::define_instructions;

/// Invokes `$callback!` with the instruction catalog.
macro_rules! for_each_instruction {
  ($callback:ident) => {
    $callback! {
      // region Program I/O and register management

      /// Copies the named program input into `v`.
      In: untyped (name: String) -> (v: Array);
      /// Publishes `v` as the named program output.
      Out: untyped (name: String, v: Array) -> ();
      /// Releases the value held in `v`.
      Free: untyped (v: Array) -> ();

      // endregion

      // region Constants

      Identity: typed (x: Array) -> (y: Array);
      /// A dense constant. The array is built once, when the instruction is decoded.
      Constant: typed + custom(crate::ops::ConstantState) (values: DoubleList, shape: IntList) -> (y: Array);
      IntScalarConstant: typed (value: Int) -> (s: Scalar);
      FloatScalarConstant: typed (value: Float) -> (s: Scalar);

      // endregion

      // region Elementwise math, with broadcasting for binary ops

      Add: typed (a: Array, b: Array) -> (c: Array);
      Sub: typed (a: Array, b: Array) -> (c: Array);
      Mul: typed (a: Array, b: Array) -> (c: Array);
      Div: typed (a: Array, b: Array) -> (c: Array);
      Neg: typed (x: Array) -> (y: Array);
      Exp: typed (x: Array) -> (y: Array);
      Log: typed (x: Array) -> (y: Array);
      Sqrt: typed (x: Array) -> (y: Array);
      LeakyRelu: typed (x: Array, alpha: Float) -> (y: Array);
      /// Also returns the mask of positive inputs for `ReluGrad`.
      Relu: typed (x: Array) -> (y: Array, ctx: Opaque);
      ReluGrad: typed (gy: Array, ctx: Opaque) -> (gx: Array);
      MatMul: typed (a: Array, b: Array) -> (y: Array);
      /// `x · wᵀ + b`
      Linear: typed (x: Array, w: Array, b: OptionalArray) -> (y: Array);
      Clip: typed (x: Array, min: OptionalScalar, max: OptionalScalar) -> (y: Array);
      MulScalar: typed (x: Array, s: Scalar) -> (y: Array);
      ReduceSum: typed (x: Array) -> (s: Scalar);

      // endregion

      // region Shapes

      ShapeOf: typed (x: Array) -> (shape: Shape);
      Reshape: typed (x: Array, shape: Shape) -> (y: Array);
      /// An empty `perm` reverses the axes.
      Transpose: typed (x: Array, perm: IntList) -> (y: Array);
      Concat: typed (xs: ArrayList, axis: Int) -> (y: Array);
      /// Splits `x` into `split.len()` pieces, or into equal pieces if `split` is empty.
      Split: typed (x: Array, axis: Int, split: IntList) -> (ys: ArrayList);

      // endregion

      // region Sequences

      SequenceCreate: typed (xs: ArrayList) -> (seq: Sequence);
      SequenceAppend: typed (seq: Sequence, value: Array) -> (output: Sequence);
      /// A negative index counts from the end.
      SequenceLookup: typed (seq: Sequence, index: Int) -> (y: Array);
      SequenceStack: typed (seq: Sequence, axis: Int) -> (y: Array);
      SequenceSize: typed (seq: Sequence) -> (size: Scalar);
      SequenceClear: untyped (seq: Sequence) -> ();

      // endregion

      /// Logs the arrays in `xs`.
      Print: typed (xs: ArrayList, label: String) -> ();
    }
  };
}

for_each_instruction!(define_instructions);

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use strum::IntoEnumIterator;

  use super::*;
  use crate::catalog::validate_catalog;
  use crate::compiler::Op;
  use crate::errors::VmError;
  use crate::types::OperandKind;

  #[test]
  fn catalog_is_valid() {
    validate_catalog(CATALOG).unwrap();
    assert_eq!(CATALOG.len(), FACTORIES.len());
    assert_eq!(CATALOG.len(), Opcode::iter().count());
  }

  #[test]
  fn opcodes_are_one_based_catalog_positions() {
    assert_eq!(Opcode::In.code(), 1);
    assert_eq!(Opcode::from_code(1).unwrap(), Opcode::In);
    for (position, opcode) in Opcode::iter().enumerate() {
      assert_eq!(opcode.code() as usize, position + 1);
      assert_eq!(opcode.descriptor().name, opcode.to_string());
      assert_eq!(CATALOG[position].opcode, opcode.code());
    }
  }

  #[test]
  fn unknown_codes() {
    let past_end = CATALOG.len() as u16 + 1;
    assert!(matches!(Opcode::from_code(0), Err(VmError::UnknownOpcode(0))));
    assert!(matches!(Opcode::from_code(past_end), Err(VmError::UnknownOpcode(code)) if code == past_end));
    assert_eq!(Opcode::from_str("MatMul").ok(), Some(Opcode::MatMul));
  }

  #[test]
  fn descriptors_carry_flags_and_kinds() {
    let constant = <Constant as Op>::DESCRIPTOR;
    assert!(constant.typed && constant.has_custom_state);
    assert_eq!(constant.inputs[1].kind, OperandKind::IntList);

    let out = <Out as Op>::DESCRIPTOR;
    assert!(!out.typed);
    assert!(out.outputs.is_empty());

    let split = <Split as Op>::DESCRIPTOR;
    assert!(split.variadic_outputs());
    assert_eq!(split.outputs[0].kind, OperandKind::ArrayList);

    let linear = <Linear as Op>::DESCRIPTOR;
    assert_eq!(linear.inputs[2].kind, OperandKind::OptionalArray);
  }
}
