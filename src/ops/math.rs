use std::any::Any;

use ndarray::{ArrayD, Ix2, IxDyn, Zip};

use crate::errors::{Result, VmError};
use crate::instructions::{
  Add, Clip, Div, Exp, LeakyRelu, Linear, Log, MatMul, Mul, MulScalar, Neg, ReduceSum, Relu,
  ReluGrad, Sqrt, Sub,
};
use crate::state::VmState;
use crate::types::{Array, Opaque, Scalar, Shape};

// region Broadcasting

/// The numpy broadcast of two shapes.
fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
  let ndim = a.len().max(b.len());
  let dim = |shape: &[usize], i: usize| match i + shape.len() < ndim {
    true  => 1,
    false => shape[i + shape.len() - ndim],
  };

  (0..ndim).map(|i| match (dim(a, i), dim(b, i)) {
             (x, y) if x == y => Ok(x),
             (1, y)           => Ok(y),
             (x, 1)           => Ok(x),
             _ => Err(VmError::Kernel(format!("cannot broadcast {:?} with {:?}", a, b))),
           })
           .collect()
}

fn binary<F>(a: &Array, b: &Array, f: F) -> Result<Array>
  where F: Fn(f64, f64) -> f64
{
  let shape = broadcast_shape(a.shape(), b.shape())?;
  let broadcast_error = || VmError::Kernel(format!("cannot broadcast {:?} with {:?}", a.shape(), b.shape()));
  let a = a.broadcast(IxDyn(&shape)).ok_or_else(broadcast_error)?;
  let b = b.broadcast(IxDyn(&shape)).ok_or_else(broadcast_error)?;

  Ok(Zip::from(&a).and(&b).map_collect(|x, y| f(*x, *y)).into_shared())
}

// endregion

// region Elementwise

impl Add {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, a: &Array, b: &Array) -> Result<Array> {
    binary(a, b, |x, y| x + y)
  }
}

impl Sub {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, a: &Array, b: &Array) -> Result<Array> {
    binary(a, b, |x, y| x - y)
  }
}

impl Mul {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, a: &Array, b: &Array) -> Result<Array> {
    binary(a, b, |x, y| x * y)
  }
}

impl Div {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, a: &Array, b: &Array) -> Result<Array> {
    binary(a, b, |x, y| x / y)
  }
}

impl Neg {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, x: &Array) -> Result<Array> {
    Ok(x.mapv(|v| -v).into_shared())
  }
}

impl Exp {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, x: &Array) -> Result<Array> {
    Ok(x.mapv(f64::exp).into_shared())
  }
}

impl Log {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, x: &Array) -> Result<Array> {
    Ok(x.mapv(f64::ln).into_shared())
  }
}

impl Sqrt {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, x: &Array) -> Result<Array> {
    Ok(x.mapv(f64::sqrt).into_shared())
  }
}

impl LeakyRelu {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, x: &Array, alpha: f64) -> Result<Array> {
    Ok(x.mapv(|v| if v < 0.0 { v * alpha } else { v }).into_shared())
  }
}

impl MulScalar {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, x: &Array, s: Scalar) -> Result<Array> {
    let s = s.to_f64();
    Ok(x.mapv(|v| v * s).into_shared())
  }
}

impl Clip {
  pub(crate) fn run_impl(
    &mut self,
    _st: &mut VmState,
    x: &Array,
    min: Option<Scalar>,
    max: Option<Scalar>,
  ) -> Result<Array> {
    let min = min.map_or(f64::NEG_INFINITY, Scalar::to_f64);
    let max = max.map_or(f64::INFINITY, Scalar::to_f64);
    Ok(x.mapv(|v| v.max(min).min(max)).into_shared())
  }
}

impl ReduceSum {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, x: &Array) -> Result<Scalar> {
    Ok(Scalar::Float(x.sum()))
  }
}

// endregion

// region Relu and its gradient

/// What `Relu` saves for `ReluGrad`: where the input was positive.
#[derive(Debug)]
pub struct ReluContext {
  mask: ArrayD<bool>,
}

impl Opaque for ReluContext {
  fn describe(&self) -> String {
    format!("ReluContext{}", Shape::new(self.mask.shape()))
  }

  fn nbytes(&self) -> usize {
    self.mask.len()
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

impl Relu {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, x: &Array) -> Result<(Array, Box<dyn Opaque>)> {
    let y = x.mapv(|v| v.max(0.0)).into_shared();
    let context: Box<dyn Opaque> = Box::new(ReluContext { mask: x.mapv(|v| v > 0.0) });
    Ok((y, context))
  }
}

impl ReluGrad {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, gy: &Array, ctx: &dyn Opaque) -> Result<Array> {
    let context = ctx.as_any()
                     .downcast_ref::<ReluContext>()
                     .ok_or_else(|| VmError::Kernel(format!("expected a ReluContext, got {}", ctx.describe())))?;
    if gy.shape() != context.mask.shape() {
      return Err(VmError::Kernel(format!(
        "gradient shape {:?} does not match {}", gy.shape(), context.describe()
      )));
    }

    Ok(Zip::from(gy).and(&context.mask).map_collect(|g, m| if *m { *g } else { 0.0 }).into_shared())
  }
}

// endregion

// region Matrix products

fn matmul(a: &Array, b: &Array) -> Result<Array> {
  let a = a.view().into_dimensionality::<Ix2>()?;
  let b = b.view().into_dimensionality::<Ix2>()?;
  if a.ncols() != b.nrows() {
    return Err(VmError::Kernel(format!("cannot multiply {:?} by {:?}", a.shape(), b.shape())));
  }
  Ok(a.dot(&b).into_dyn().into_shared())
}

impl MatMul {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, a: &Array, b: &Array) -> Result<Array> {
    matmul(a, b)
  }
}

impl Linear {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, x: &Array, w: &Array, b: Option<&Array>) -> Result<Array> {
    let wt = w.t().to_owned().into_shared();
    let y = matmul(x, &wt)?;
    match b {
      Some(b) => binary(&y, b, |x, y| x + y),
      None    => Ok(y),
    }
  }
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;
  use crate::address::Reg;
  use crate::bytecode::{InstructionRecord, OperandRecord};
  use crate::ops::testing::{array, run_record, state_with};

  fn binary_record(a: i32, b: i32, c: i32) -> InstructionRecord {
    InstructionRecord::new(0).input(OperandRecord::Array(a)).input(OperandRecord::Array(b)).output(c)
  }

  #[test]
  fn broadcast_shapes() {
    assert_eq!(broadcast_shape(&[2, 3], &[3]).unwrap(), vec![2, 3]);
    assert_eq!(broadcast_shape(&[4, 1], &[1, 5]).unwrap(), vec![4, 5]);
    assert_eq!(broadcast_shape(&[], &[2]).unwrap(), vec![2]);
    assert!(broadcast_shape(&[2], &[3]).is_err());
  }

  #[test]
  fn add_broadcasts_a_row() {
    let mut st = state_with(&[
      (0, array(&[2, 2], &[1.0, 2.0, 3.0, 4.0])),
      (1, array(&[2], &[10.0, 20.0])),
    ]);
    run_record::<Add>(binary_record(0, 1, 2), &mut st).unwrap();
    assert_eq!(st.get_array(Reg::new(2)).unwrap(), array(&[2, 2], &[11.0, 22.0, 13.0, 24.0]));
  }

  #[test]
  fn incompatible_shapes_are_kernel_errors() {
    let mut st = state_with(&[(0, array(&[2], &[1.0, 2.0])), (1, array(&[3], &[1.0, 2.0, 3.0]))]);
    assert!(matches!(run_record::<Sub>(binary_record(0, 1, 2), &mut st), Err(VmError::Kernel(_))));
  }

  #[test]
  fn unary_ops() {
    let mut st = state_with(&[(0, array(&[3], &[-1.0, 0.0, 4.0]))]);
    let unary = |out| InstructionRecord::new(0).input(OperandRecord::Array(0)).output(out);

    run_record::<Neg>(unary(1), &mut st).unwrap();
    run_record::<Sqrt>(unary(2), &mut st).unwrap();
    assert_eq!(st.get_array(Reg::new(1)).unwrap(), array(&[3], &[1.0, -0.0, -4.0]));
    assert!(st.get_array(Reg::new(2)).unwrap().iter().next().map_or(false, |v| v.is_nan()));

    let leaky = InstructionRecord::new(0).input(OperandRecord::Array(0)).input(OperandRecord::Float(0.5)).output(3);
    run_record::<LeakyRelu>(leaky, &mut st).unwrap();
    assert_eq!(st.get_array(Reg::new(3)).unwrap(), array(&[3], &[-0.5, 0.0, 4.0]));
  }

  #[test]
  fn relu_context_flows_to_the_gradient() {
    let mut st = state_with(&[
      (0, array(&[3], &[-1.0, 2.0, 3.0])),
      (1, array(&[3], &[5.0, 6.0, 7.0])),
    ]);
    let relu = InstructionRecord::new(0).input(OperandRecord::Array(0)).output(2).output(3);
    run_record::<Relu>(relu, &mut st).unwrap();
    assert_eq!(st.get_array(Reg::new(2)).unwrap(), array(&[3], &[0.0, 2.0, 3.0]));
    assert_eq!(st.get_var(Reg::new(3)).to_string(), "ReluContext(3)");

    let grad = InstructionRecord::new(0).input(OperandRecord::Array(1)).input(OperandRecord::Opaque(3)).output(4);
    run_record::<ReluGrad>(grad, &mut st).unwrap();
    assert_eq!(st.get_array(Reg::new(4)).unwrap(), array(&[3], &[0.0, 6.0, 7.0]));
  }

  #[test]
  fn relu_context_output_may_be_absent() {
    let mut st = state_with(&[(0, array(&[1], &[1.0]))]);
    let relu = InstructionRecord::new(0).input(OperandRecord::Array(0)).output(1).output(-1);
    run_record::<Relu>(relu, &mut st).unwrap();
    assert!(!st.is_null(Reg::new(1)));
  }

  #[test]
  fn matmul_and_linear() {
    let mut st = state_with(&[
      (0, array(&[1, 2], &[1.0, 2.0])),
      (1, array(&[2, 2], &[1.0, 0.0, 0.0, 1.0])),
      (2, array(&[2], &[0.5, 0.5])),
      (3, array(&[3], &[1.0, 2.0, 3.0])),
    ]);
    run_record::<MatMul>(binary_record(0, 1, 4), &mut st).unwrap();
    assert_eq!(st.get_array(Reg::new(4)).unwrap(), array(&[1, 2], &[1.0, 2.0]));

    let linear = |b: i32, out: i32| {
      InstructionRecord::new(0)
          .input(OperandRecord::Array(0))
          .input(OperandRecord::Array(1))
          .input(OperandRecord::Array(b))
          .output(out)
    };
    run_record::<Linear>(linear(2, 5), &mut st).unwrap();
    run_record::<Linear>(linear(-1, 6), &mut st).unwrap();
    assert_eq!(st.get_array(Reg::new(5)).unwrap(), array(&[1, 2], &[1.5, 2.5]));
    assert_eq!(st.get_array(Reg::new(6)).unwrap(), array(&[1, 2], &[1.0, 2.0]));

    assert!(matches!(run_record::<MatMul>(binary_record(3, 1, 7), &mut st), Err(VmError::Shape(_))));
  }

  #[test]
  fn clip_with_optional_bounds() {
    let mut st = state_with(&[(0, array(&[3], &[-2.0, 0.5, 9.0]))]);
    st.set_scalar(Reg::new(1), Scalar::Int(1)).unwrap();

    let clip = InstructionRecord::new(0)
        .input(OperandRecord::Array(0))
        .input(OperandRecord::Scalar(-1))
        .input(OperandRecord::Scalar(1))
        .output(2);
    run_record::<Clip>(clip, &mut st).unwrap();
    assert_eq!(st.get_array(Reg::new(2)).unwrap(), array(&[3], &[-2.0, 0.5, 1.0]));
  }

  #[test]
  fn scalar_ops() {
    let mut st = state_with(&[(0, array(&[2], &[1.5, 2.5]))]);
    st.set_scalar(Reg::new(1), Scalar::Float(2.0)).unwrap();

    let scale = InstructionRecord::new(0).input(OperandRecord::Array(0)).input(OperandRecord::Scalar(1)).output(2);
    run_record::<MulScalar>(scale, &mut st).unwrap();
    run_record::<ReduceSum>(InstructionRecord::new(0).input(OperandRecord::Array(2)).output(3), &mut st).unwrap();

    assert_eq!(st.get_scalar(Reg::new(3)).unwrap(), Scalar::Float(8.0));
  }
}
