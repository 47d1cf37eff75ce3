//! Hand-written `run_impl` bodies for the instructions in [`instructions`](crate::instructions).
//! The kernels are straightforward `ndarray` code; nothing here is tuned.

mod math;
mod misc;
mod sequence;
mod shape;

pub use math::ReluContext;
pub use misc::ConstantState;

use crate::errors::{Result, VmError};

/// Maps a possibly negative axis onto `0..ndim`.
pub(crate) fn normalize_axis(axis: i64, ndim: usize) -> Result<usize> {
  let normalized = match axis < 0 {
    true  => axis + ndim as i64,
    false => axis,
  };
  match (0..ndim as i64).contains(&normalized) {
    true  => Ok(normalized as usize),
    false => Err(VmError::Kernel(format!("axis {} out of range for rank {}", axis, ndim))),
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn axes() {
    assert_eq!(normalize_axis(-1, 3).unwrap(), 2);
    assert_eq!(normalize_axis(0, 1).unwrap(), 0);
    assert!(normalize_axis(3, 3).is_err());
    assert!(normalize_axis(-4, 3).is_err());
  }
}
