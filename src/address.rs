//! A register reference as it appears in a decoded instruction. The wire format marks an
//! absent (optional) register with a negative index, which is preserved here so that traces
//! and scatter logic can distinguish "no register" from "register holding null".

use std::fmt::{Display, Formatter};

use crate::errors::VmError;

/// The register number as carried on the wire.
pub type RegisterNumberType = i32;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct Reg(RegisterNumberType);

impl Reg {
  /// The absent marker.
  pub const ABSENT: Reg = Reg(-1);

  /// Every `u16` fits the wire format; wider indices go through `Reg::try_from`.
  pub const fn new(index: u16) -> Reg {
    Reg(index as RegisterNumberType)
  }

  /// Any negative wire index is read as the absent marker.
  pub fn from_wire(index: RegisterNumberType) -> Reg {
    match index < 0 {
      true  => Reg::ABSENT,
      false => Reg(index)
    }
  }

  pub fn to_wire(self) -> RegisterNumberType {
    self.0
  }

  /// Converts the register to an index into the register file.
  pub fn index(self) -> Option<usize> {
    match self.0 < 0 {
      true  => None,
      false => Some(self.0 as usize)
    }
  }

  pub fn is_absent(self) -> bool {
    self.0 < 0
  }
}

impl Default for Reg {
  fn default() -> Self {
    Reg::ABSENT
  }
}

impl TryFrom<usize> for Reg {
  type Error = VmError;

  fn try_from(index: usize) -> Result<Reg, VmError> {
    RegisterNumberType::try_from(index)
      .map(Reg)
      .map_err(|_| VmError::RegisterOutOfRange { register: index, count: RegisterNumberType::MAX as usize })
  }
}

/// Without a sigil; callers prefix the sigil of the operand kind.
impl Display for Reg {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.index() {
      Some(i) => write!(f, "{}", i),
      None    => write!(f, "_")
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn negative_wire_indices_are_absent() {
    assert_eq!(Reg::from_wire(-1), Reg::ABSENT);
    assert_eq!(Reg::from_wire(-7), Reg::ABSENT);
    assert_eq!(Reg::from_wire(-7).index(), None);
    assert_eq!(Reg::from_wire(3).index(), Some(3));
  }

  #[test]
  fn display_uses_placeholder_for_absent() {
    assert_eq!(Reg::new(12).to_string(), "12");
    assert_eq!(Reg::ABSENT.to_string(), "_");
  }

  #[test]
  fn wide_indices_do_not_wrap_to_absent() {
    assert_eq!(Reg::try_from(7usize).unwrap(), Reg::new(7));
    assert_eq!(Reg::try_from(RegisterNumberType::MAX as usize).unwrap().to_wire(), RegisterNumberType::MAX);
    assert!(matches!(
      Reg::try_from(1usize << 31),
      Err(VmError::RegisterOutOfRange { register, .. }) if register == 1usize << 31
    ));
  }
}
