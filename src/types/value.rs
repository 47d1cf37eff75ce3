//! Native value types held by registers. Arrays come from `ndarray`; this module only adds the
//! thin wrappers the register file needs (shape, scalar, opaque handles) and the finiteness scan.

use std::any::Any;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use ndarray::{ArcArray, IxDyn};
use smallvec::SmallVec;

/// Dense array value. Clones share storage, so resolving an operand never copies elements.
pub type Array = ArcArray<f64, IxDyn>;

/// The ordered list of arrays held by a sequence register.
pub type Sequence = Vec<Array>;

/// The maximum rank of a dimension list operand.
pub const MAX_NDIM: usize = 10;

/// Storage of an `INT_LIST` operand; its length is bounded by [`MAX_NDIM`].
pub type IntList = SmallVec<[i64; MAX_NDIM]>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Shape(SmallVec<[usize; MAX_NDIM]>);

impl Shape {
  pub fn new(dims: &[usize]) -> Shape {
    Shape(SmallVec::from_slice(dims))
  }

  pub fn of(array: &Array) -> Shape {
    Shape::new(array.shape())
  }

  pub fn dims(&self) -> &[usize] {
    &self.0
  }

  pub fn ndim(&self) -> usize {
    self.0.len()
  }

  /// Number of elements of an array with this shape.
  pub fn size(&self) -> usize {
    self.0.iter().product()
  }
}

impl Display for Shape {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "({})",
      self.0.iter().map(usize::to_string).collect::<Vec<String>>().join(", ")
    )
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
  Int(i64),
  Float(f64),
}

impl Scalar {
  pub fn to_f64(self) -> f64 {
    match self {
      Scalar::Int(i)   => i as f64,
      Scalar::Float(x) => x,
    }
  }

  pub fn to_i64(self) -> i64 {
    match self {
      Scalar::Int(i)   => i,
      Scalar::Float(x) => x as i64,
    }
  }
}

impl Display for Scalar {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Scalar::Int(i)   => write!(f, "{}", i),
      Scalar::Float(x) => write!(f, "{:?}", x),
    }
  }
}

/**
  A value the VM moves between instructions without looking inside, e.g. the saved context
  a forward kernel hands to its gradient kernel. Consumers recover the concrete type with
  `as_any().downcast_ref()`.
*/
pub trait Opaque: Any + Debug + Send + Sync {
  /// Short description used by traces.
  fn describe(&self) -> String;

  fn debug_string(&self) -> String {
    format!("{:?}", self)
  }

  fn nbytes(&self) -> usize {
    0
  }

  fn as_any(&self) -> &dyn Any;
}

pub type OpaqueHandle = Arc<dyn Opaque>;

/// Returns `(has_nan, has_inf)` for the array.
pub fn non_finite(array: &Array) -> (bool, bool) {
  array.iter().fold((false, false), |(nan, inf), x| (nan || x.is_nan(), inf || x.is_infinite()))
}
