//! The contents of one register slot.

use std::fmt::{Display, Formatter};

use strum_macros::IntoStaticStr;

use crate::types::{non_finite, Array, OpaqueHandle, Scalar, Sequence, Shape};

#[derive(Clone, Debug, Default, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Var {
  /// An unset slot, an explicitly freed slot, or the output of a skipped instruction.
  #[default]
  Null,
  Array(Array),
  Sequence(Sequence),
  Opaque(OpaqueHandle),
  Shape(Shape),
  Scalar(Scalar),
}

/// What a read of an unset register observes.
pub static NULL_VAR: Var = Var::Null;

fn array_summary(array: &Array) -> String {
  format!("f64{}", Shape::of(array))
}

impl Var {
  pub fn is_null(&self) -> bool {
    matches!(self, Var::Null)
  }

  /// The kind name used in error messages, e.g. `"sequence"`.
  pub fn kind_name(&self) -> &'static str {
    self.into()
  }

  pub fn sigil(&self) -> char {
    match self {
      Var::Null        => ' ',
      Var::Array(_)    => '$',
      Var::Sequence(_) => '@',
      Var::Opaque(_)   => '*',
      Var::Shape(_)    => '^',
      Var::Scalar(_)   => '%',
    }
  }

  /// The full value, as printed for verbose ops.
  pub fn debug_string(&self) -> String {
    match self {
      Var::Null            => "null".to_string(),
      Var::Array(array)    => format!("{}", array),
      Var::Sequence(seq)   => {
        format!("[{}]", seq.iter().map(|a| format!("{}", a)).collect::<Vec<String>>().join(", "))
      }
      Var::Opaque(opaque)  => opaque.debug_string(),
      Var::Shape(shape)    => shape.to_string(),
      Var::Scalar(scalar)  => scalar.to_string(),
    }
  }

  /// Bytes held by the slot, for the memory report.
  pub fn nbytes(&self) -> usize {
    let array_bytes = |a: &Array| a.len() * std::mem::size_of::<f64>();
    match self {
      Var::Null           => 0,
      Var::Array(array)   => array_bytes(array),
      Var::Sequence(seq)  => seq.iter().map(array_bytes).sum(),
      Var::Opaque(opaque) => opaque.nbytes(),
      Var::Shape(shape)   => shape.ndim() * std::mem::size_of::<i64>(),
      Var::Scalar(_)      => std::mem::size_of::<f64>(),
    }
  }

  /// `(has_nan, has_inf)` over every array the slot holds.
  pub fn non_finite(&self) -> (bool, bool) {
    match self {
      Var::Array(array)  => non_finite(array),
      Var::Sequence(seq) => {
        seq.iter()
           .map(non_finite)
           .fold((false, false), |(nan, inf), (n, i)| (nan || n, inf || i))
      }
      _ => (false, false),
    }
  }
}

/// A one-line summary: `f64(2, 3)` for an array, `[f64(2), f64(3)]` for a sequence.
impl Display for Var {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Var::Null           => write!(f, "null"),
      Var::Array(array)   => write!(f, "{}", array_summary(array)),
      Var::Sequence(seq)  => {
        write!(f, "[{}]", seq.iter().map(array_summary).collect::<Vec<String>>().join(", "))
      }
      Var::Opaque(opaque) => write!(f, "{}", opaque.describe()),
      Var::Shape(shape)   => write!(f, "{}", shape),
      Var::Scalar(scalar) => write!(f, "{}", scalar),
    }
  }
}

#[cfg(test)]
mod tests {
  use ndarray::{arr1, arr2};

  use super::*;

  #[test]
  fn summaries() {
    let a = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).into_dyn().into_shared();
    let b = arr1(&[1.0]).into_dyn().into_shared();

    assert_eq!(Var::Array(a.clone()).to_string(), "f64(2, 3)");
    assert_eq!(Var::Sequence(vec![a, b]).to_string(), "[f64(2, 3), f64(1)]");
    assert_eq!(Var::Null.to_string(), "null");
    assert_eq!(Var::Scalar(Scalar::Float(2.5)).to_string(), "2.5");
  }

  #[test]
  fn kind_names_and_sizes() {
    let a = arr1(&[1.0, 2.0]).into_dyn().into_shared();
    assert_eq!(Var::Null.kind_name(), "null");
    assert_eq!(Var::Sequence(vec![]).kind_name(), "sequence");
    assert_eq!(Var::Array(a.clone()).nbytes(), 16);
    assert_eq!(Var::Sequence(vec![a.clone(), a]).nbytes(), 32);
    assert!(NULL_VAR.is_null());
  }

  #[test]
  fn sequences_are_scanned_for_non_finite_values() {
    let ok = arr1(&[1.0]).into_dyn().into_shared();
    let bad = arr1(&[f64::INFINITY]).into_dyn().into_shared();
    assert_eq!(Var::Sequence(vec![ok.clone(), bad]).non_finite(), (false, true));
    assert_eq!(Var::Array(ok).non_finite(), (false, false));
  }
}
