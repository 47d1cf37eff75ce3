use ndarray::{stack, ArrayView, Axis, IxDyn};

use crate::errors::{Result, VmError};
use crate::instructions::{
  SequenceAppend, SequenceClear, SequenceCreate, SequenceLookup, SequenceSize, SequenceStack,
};
use crate::ops::normalize_axis;
use crate::state::VmState;
use crate::types::{Array, Scalar, Sequence};

impl SequenceCreate {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, xs: &[Array], seq: &mut Sequence) -> Result<()> {
    seq.extend(xs.iter().cloned());
    Ok(())
  }
}

impl SequenceAppend {
  /// Appends in place when `output` names the same register as `seq`; otherwise `output`
  /// gets a copy and `seq` is left as it was.
  pub(crate) fn run_impl(
    &mut self,
    _st: &mut VmState,
    seq: &mut Sequence,
    value: &Array,
    output: &mut Sequence,
  ) -> Result<()> {
    match self.seq == self.output {
      true  => std::mem::swap(seq, output),
      false => output.extend(seq.iter().cloned()),
    }
    output.push(value.clone());
    Ok(())
  }
}

impl SequenceLookup {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, seq: &mut Sequence, index: i64) -> Result<Array> {
    let position = match index < 0 {
      true  => index + seq.len() as i64,
      false => index,
    };
    usize::try_from(position)
      .ok()
      .and_then(|i| seq.get(i))
      .cloned()
      .ok_or_else(|| VmError::Kernel(format!("index {} out of range for a sequence of {}", index, seq.len())))
  }
}

impl SequenceStack {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, seq: &mut Sequence, axis: i64) -> Result<Array> {
    let first = seq.first().ok_or_else(|| VmError::Kernel("cannot stack an empty sequence".to_string()))?;
    let axis = normalize_axis(axis, first.ndim() + 1)?;
    let views: Vec<ArrayView<f64, IxDyn>> = seq.iter().map(|x| x.view()).collect();

    Ok(stack(Axis(axis), &views)?.into_shared())
  }
}

impl SequenceSize {
  pub(crate) fn run_impl(&mut self, _st: &mut VmState, seq: &mut Sequence) -> Result<Scalar> {
    Ok(Scalar::Int(seq.len() as i64))
  }
}

impl SequenceClear {
  pub(crate) fn run_impl(&mut self, st: &mut VmState) -> Result<()> {
    st.create_sequence(self.seq)?;
    Ok(())
  }
}
