use ndarray::{ArrayD, IxDyn};

use crate::compiler::CustomState;
use crate::errors::{Result, VmError};
use crate::instructions::{Constant, Free, FloatScalarConstant, Identity, In, IntScalarConstant, Out, Print};
use crate::state::VmState;
use crate::types::{Array, Scalar};

// region Program I/O

impl In {
  pub(crate) fn run_impl(&mut self, st: &mut VmState) -> Result<()> {
    let var = st.input(&self.name)?.clone();
    st.set_var(self.v, var)
  }
}

impl Out {
  pub(crate) fn run_impl(&mut self, st: &mut VmState) -> Result<()> {
    st.output(&self.name, self.v)
  }
}

impl Free {
  pub(crate) fn run_impl(&mut self, st: &mut VmState) -> Result<()> {
    st.free_var(self.v)
  }
}

// endregion

// region Constants

impl Identity {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, x: &Array) -> Result<Array> {
    Ok(x.clone())
  }
}

/// The array a `Constant` produces, built from its literal operands at decode time.
#[derive(Debug)]
pub struct ConstantState {
  array: Array,
}

impl CustomState<Constant> for ConstantState {
  fn init(op: &Constant) -> Result<ConstantState> {
    let dims = op.shape
                 .iter()
                 .map(|d| usize::try_from(*d).map_err(|_| VmError::Kernel(format!("negative dimension {}", d))))
                 .collect::<Result<Vec<usize>>>()?;
    let array = ArrayD::from_shape_vec(IxDyn(&dims), op.values.clone())?.into_shared();
    Ok(ConstantState { array })
  }
}

impl Constant {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, _values: &[f64], _shape: &[i64]) -> Result<Array> {
    self.custom
        .as_ref()
        .map(|state| state.array.clone())
        .ok_or_else(|| VmError::Kernel("constant has no prepared value".to_string()))
  }
}

impl IntScalarConstant {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, value: i64) -> Result<Scalar> {
    Ok(Scalar::Int(value))
  }
}

impl FloatScalarConstant {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, value: f64) -> Result<Scalar> {
    Ok(Scalar::Float(value))
  }
}

// endregion

impl Print {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, xs: &[Array], label: &str) -> Result<()> {
    for (i, x) in xs.iter().enumerate() {
      tracing::info!(label, index = i, "{}", x);
    }
    Ok(())
  }
}
