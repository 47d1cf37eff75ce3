/*!

  The type catalog. Every operand of every instruction has one of the [`OperandKind`]s below,
  and everything kind-specific in the crate is keyed by this enum or by the marker types in
  [`kind`]:

    - the wire tag a serialized operand must carry ([`OperandKind::wire_type`]),
    - the storage type of the per-instruction field ([`OperandType::Storage`]),
    - how the runner resolves the operand and what the typed stub receives
      ([`OperandType::resolve`], [`OperandType::input`]),
    - how an output is scattered back into the register file ([`RegisterType::store`]).

  Register kinds hold register indices; the remaining kinds are immediate literals. Adding a
  kind means adding a variant here and a marker type in `kind`; nothing else hard-codes
  kind behavior.

*/

pub mod kind;
pub mod value;

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

pub use kind::{Operand, OperandType, OperandValue, OutputCursor, RegisterType};
pub use value::{non_finite, Array, IntList, Opaque, OpaqueHandle, Scalar, Sequence, Shape, MAX_NDIM};

#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter,
  Clone,        Copy,          Eq,         PartialEq, Debug, Hash
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OperandKind {
  Array,
  OptionalArray,
  ArrayList,
  Sequence,
  Opaque,
  Shape,
  Scalar,
  OptionalScalar,
  Int,
  Float,
  String,
  IntList,
  DoubleList,
}

/// The tag carried by a serialized operand. Optional kinds share the tag of the kind they
/// wrap, so an absent optional array is still tagged `ARRAY`.
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter,
  Clone,        Copy,          Eq,         PartialEq, Debug, Hash
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WireType {
  Array,
  ArrayList,
  Sequence,
  Opaque,
  Shape,
  Scalar,
  Int,
  Float,
  String,
  Ints,
  Doubles,
}

impl OperandKind {
  pub const fn wire_type(self) -> WireType {
    match self {
      OperandKind::Array
      | OperandKind::OptionalArray  => WireType::Array,
      OperandKind::ArrayList        => WireType::ArrayList,
      OperandKind::Sequence         => WireType::Sequence,
      OperandKind::Opaque           => WireType::Opaque,
      OperandKind::Shape            => WireType::Shape,
      OperandKind::Scalar
      | OperandKind::OptionalScalar => WireType::Scalar,
      OperandKind::Int              => WireType::Int,
      OperandKind::Float            => WireType::Float,
      OperandKind::String           => WireType::String,
      OperandKind::IntList          => WireType::Ints,
      OperandKind::DoubleList       => WireType::Doubles,
    }
  }

  /// Whether the operand refers to the register file rather than carrying a literal.
  pub const fn is_register(self) -> bool {
    matches!(
      self,
      OperandKind::Array
        | OperandKind::OptionalArray
        | OperandKind::ArrayList
        | OperandKind::Sequence
        | OperandKind::Opaque
        | OperandKind::Shape
        | OperandKind::Scalar
        | OperandKind::OptionalScalar
    )
  }

  pub const fn is_repeated(self) -> bool {
    matches!(self, OperandKind::ArrayList | OperandKind::IntList | OperandKind::DoubleList)
  }

  pub const fn is_optional(self) -> bool {
    matches!(self, OperandKind::OptionalArray | OperandKind::OptionalScalar)
  }

  /// Kinds whose register values are dense arrays and are scanned by the NaN/Inf check.
  pub const fn holds_arrays(self) -> bool {
    matches!(self, OperandKind::Array | OperandKind::OptionalArray | OperandKind::ArrayList)
  }

  /// The prefix used for this kind's registers in traces and in assembly.
  pub const fn sigil(self) -> char {
    match self {
      OperandKind::Array
      | OperandKind::OptionalArray
      | OperandKind::ArrayList      => '$',
      OperandKind::Sequence         => '@',
      OperandKind::Opaque           => '*',
      OperandKind::Shape            => '^',
      OperandKind::Scalar
      | OperandKind::OptionalScalar => '%',
      _                             => ' ',
    }
  }

  /// The Rust storage type of an instruction field of this kind, for catalog listings.
  pub const fn storage_type(self) -> &'static str {
    match self {
      OperandKind::ArrayList  => "Vec<Reg>",
      OperandKind::Int        => "i64",
      OperandKind::Float      => "f64",
      OperandKind::String     => "String",
      OperandKind::IntList    => "IntList",
      OperandKind::DoubleList => "Vec<f64>",
      _                       => "Reg",
    }
  }
}

impl WireType {
  /// Maps a register sigil back to the wire tag; used by the assembler.
  pub fn from_sigil(sigil: char) -> Option<WireType> {
    match sigil {
      '$' => Some(WireType::Array),
      '@' => Some(WireType::Sequence),
      '*' => Some(WireType::Opaque),
      '^' => Some(WireType::Shape),
      '%' => Some(WireType::Scalar),
      _   => None
    }
  }
}
