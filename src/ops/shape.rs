use ndarray::{concatenate, ArrayD, ArrayView, Axis, IxDyn, Slice};

use crate::errors::{Result, VmError};
use crate::instructions::{Concat, Reshape, ShapeOf, Split, Transpose};
use crate::ops::normalize_axis;
use crate::state::VmState;
use crate::types::{Array, Shape};

impl ShapeOf {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, x: &Array) -> Result<Shape> {
    Ok(Shape::of(x))
  }
}

impl Reshape {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, x: &Array, shape: &Shape) -> Result<Array> {
    let values: Vec<f64> = x.iter().copied().collect();
    Ok(ArrayD::from_shape_vec(IxDyn(shape.dims()), values)?.into_shared())
  }
}

impl Transpose {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, x: &Array, perm: &[i64]) -> Result<Array> {
    if perm.is_empty() {
      return Ok(x.view().reversed_axes().to_owned().into_shared());
    }

    let mut axes = Vec::with_capacity(perm.len());
    for axis in perm {
      axes.push(normalize_axis(*axis, x.ndim())?);
    }
    let mut seen = axes.clone();
    seen.sort_unstable();
    seen.dedup();
    if axes.len() != x.ndim() || seen.len() != axes.len() {
      return Err(VmError::Kernel(format!("{:?} is not a permutation of {} axes", perm, x.ndim())));
    }

    Ok(x.view().permuted_axes(axes.as_slice()).to_owned().into_shared())
  }
}

impl Concat {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, xs: &[Array], axis: i64) -> Result<Array> {
    let first = xs.first().ok_or_else(|| VmError::Kernel("nothing to concatenate".to_string()))?;
    let axis = normalize_axis(axis, first.ndim())?;
    let views: Vec<ArrayView<f64, IxDyn>> = xs.iter().map(|x| x.view()).collect();

    Ok(concatenate(Axis(axis), &views)?.into_shared())
  }
}

impl Split {
  /// With an empty `split`, the axis is divided evenly among the output registers.
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, x: &Array, axis: i64, split: &[i64]) -> Result<Vec<Array>> {
    let axis = normalize_axis(axis, x.ndim())?;
    let length = x.len_of(Axis(axis));

    let sizes: Vec<usize> = match split.is_empty() {
      true => {
        let pieces = self.ys.len();
        if pieces == 0 || length % pieces != 0 {
          return Err(VmError::Kernel(format!("cannot split {} elements into {} pieces", length, pieces)));
        }
        vec![length / pieces; pieces]
      }
      false => {
        split.iter()
             .map(|s| usize::try_from(*s).map_err(|_| VmError::Kernel(format!("negative split {}", s))))
             .collect::<Result<Vec<usize>>>()?
      }
    };
    let total = sizes.iter().try_fold(0usize, |total, size| total.checked_add(*size));
    if total != Some(length) {
      return Err(VmError::Kernel(format!("split {:?} does not cover an axis of length {}", sizes, length)));
    }

    // The sizes sum to `length`, so no bound below overflows or leaves the axis.
    let mut start = 0;
    let mut pieces = Vec::with_capacity(sizes.len());
    for size in sizes {
      let piece = x.slice_axis(Axis(axis), Slice::from(start..start + size));
      pieces.push(piece.to_owned().into_shared());
      start += size;
    }
    Ok(pieces)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::address::Reg;
  use crate::bytecode::{InstructionRecord, OperandRecord};
  use crate::ops::testing::{array, run_record, state_with};

  #[test]
  fn shape_of_and_reshape() {
    let mut st = state_with(&[(0, array(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]))]);
    run_record::<ShapeOf>(InstructionRecord::new(0).input(OperandRecord::Array(0)).output(1), &mut st).unwrap();
    assert_eq!(st.get_shape(Reg::new(1)).unwrap(), Shape::new(&[2, 3]));

    st.set_shape(Reg::new(2), Shape::new(&[3, 2])).unwrap();
    let reshape = InstructionRecord::new(0).input(OperandRecord::Array(0)).input(OperandRecord::Shape(2)).output(3);
    run_record::<Reshape>(reshape, &mut st).unwrap();
    assert_eq!(st.get_array(Reg::new(3)).unwrap(), array(&[3, 2], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));

    st.set_shape(Reg::new(2), Shape::new(&[4])).unwrap();
    let reshape = InstructionRecord::new(0).input(OperandRecord::Array(0)).input(OperandRecord::Shape(2)).output(3);
    assert!(matches!(run_record::<Reshape>(reshape, &mut st), Err(VmError::Shape(_))));
  }

  #[test]
  fn transpose_reverses_by_default() {
    let mut st = state_with(&[(0, array(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]))]);
    let transpose = |perm: Vec<i64>, out: i32| {
      InstructionRecord::new(0).input(OperandRecord::Array(0)).input(OperandRecord::Ints(perm)).output(out)
    };

    run_record::<Transpose>(transpose(vec![], 1), &mut st).unwrap();
    run_record::<Transpose>(transpose(vec![1, 0], 2), &mut st).unwrap();
    let expected = array(&[3, 2], &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    assert_eq!(st.get_array(Reg::new(1)).unwrap(), expected);
    assert_eq!(st.get_array(Reg::new(2)).unwrap(), expected);

    assert!(matches!(run_record::<Transpose>(transpose(vec![0, 0], 3), &mut st), Err(VmError::Kernel(_))));
  }

  #[test]
  fn concat_and_split() {
    let mut st = state_with(&[
      (0, array(&[1, 2], &[1.0, 2.0])),
      (1, array(&[2, 2], &[3.0, 4.0, 5.0, 6.0])),
    ]);
    let concat = InstructionRecord::new(0).input(OperandRecord::ArrayList(vec![0, 1])).input(OperandRecord::Int(0)).output(2);
    run_record::<Concat>(concat, &mut st).unwrap();
    assert_eq!(st.get_array(Reg::new(2)).unwrap(), array(&[3, 2], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));

    let split = InstructionRecord::new(0)
        .input(OperandRecord::Array(2))
        .input(OperandRecord::Int(-2))
        .input(OperandRecord::Ints(vec![2, 1]))
        .output(3)
        .output(4);
    run_record::<Split>(split, &mut st).unwrap();
    assert_eq!(st.get_array(Reg::new(3)).unwrap(), array(&[2, 2], &[1.0, 2.0, 3.0, 4.0]));
    assert_eq!(st.get_array(Reg::new(4)).unwrap(), array(&[1, 2], &[5.0, 6.0]));
  }

  #[test]
  fn even_split_uses_the_output_count() {
    let mut st = state_with(&[(0, array(&[4], &[1.0, 2.0, 3.0, 4.0]))]);
    let split = |outputs: &[i32]| {
      outputs.iter().fold(
        InstructionRecord::new(0)
            .input(OperandRecord::Array(0))
            .input(OperandRecord::Int(0))
            .input(OperandRecord::Ints(vec![])),
        |record, out| record.output(*out),
      )
    };

    run_record::<Split>(split(&[1, 2]), &mut st).unwrap();
    assert_eq!(st.get_array(Reg::new(2)).unwrap(), array(&[2], &[3.0, 4.0]));
    assert!(matches!(run_record::<Split>(split(&[1, 2, 3]), &mut st), Err(VmError::Kernel(_))));
  }

  #[test]
  fn split_sizes_that_overflow_are_rejected() {
    let mut st = state_with(&[(0, array(&[2], &[1.0, 2.0]))]);
    let split = InstructionRecord::new(0)
        .input(OperandRecord::Array(0))
        .input(OperandRecord::Int(0))
        .input(OperandRecord::Ints(vec![i64::MAX, i64::MAX, 4]))
        .output(1)
        .output(2)
        .output(3);

    assert!(matches!(run_record::<Split>(split, &mut st), Err(VmError::Kernel(_))));
    assert!(st.is_null(Reg::new(1)));
  }
}
