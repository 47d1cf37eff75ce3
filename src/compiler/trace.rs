//! Trace line formatting. Everything here is a pure function of operand kinds, names, and a
//! read-only view of the register file; the runner decides whether and where to print.

use crate::address::Reg;
use crate::state::VmState;
use crate::types::{Operand, OperandKind, OperandValue};

const GREEN  : &str = "\x1b[32m";
const YELLOW : &str = "\x1b[33m";
const RED    : &str = "\x1b[31m";
const RESET  : &str = "\x1b[0m";

/// A register reference with its kind sigil, e.g. `$3`.
pub fn colored_name(kind: OperandKind, reg: Reg, colored: bool) -> String {
  let sigil = kind.sigil();
  match colored {
    false => format!("{}{}", sigil, reg),
    true  => {
      let color = match sigil {
        '$' => GREEN,
        '*' => YELLOW,
        _   => RED,
      };
      format!("{}{}{}{}", color, sigil, reg, RESET)
    }
  }
}

pub fn register_list(regs: &[Reg], colored: bool) -> String {
  format!(
    "[{}]",
    regs.iter()
        .map(|reg| colored_name(OperandKind::Array, *reg, colored))
        .collect::<Vec<String>>()
        .join(", ")
  )
}

pub fn int_list(values: &[i64]) -> String {
  format!("({})", values.iter().map(i64::to_string).collect::<Vec<String>>().join(", "))
}

pub fn double_list(values: &[f64]) -> String {
  format!("{{{}}}", values.iter().map(|x| format!("{:?}", x)).collect::<Vec<String>>().join(", "))
}

pub fn operand_string(operand: &Operand<'_>, colored: bool) -> String {
  match operand.value {
    OperandValue::Reg(reg)   => colored_name(operand.kind, reg, colored),
    OperandValue::Regs(regs) => register_list(regs, colored),
    OperandValue::Int(i)     => i.to_string(),
    OperandValue::Float(x)   => format!("{:?}", x),
    OperandValue::Str(s)     => format!("{:?}", s),
    OperandValue::Ints(v)    => int_list(v),
    OperandValue::Doubles(v) => double_list(v),
  }
}

fn join(operands: &[Operand<'_>], colored: bool) -> String {
  operands.iter().map(|o| operand_string(o, colored)).collect::<Vec<String>>().join(", ")
}

/// `outs = Name(ins)`, or `Name(ins)` for an instruction without outputs.
pub fn call_string(name: &str, inputs: &[Operand<'_>], outputs: &[Operand<'_>], colored: bool) -> String {
  match outputs.is_empty() {
    true  => format!("{}({})", name, join(inputs, colored)),
    false => format!("{} = {}({})", join(outputs, colored), name, join(inputs, colored)),
  }
}

/// ` $0=f64(2, 3) [$1=f64(2), $2=null]` for the register operands of `operands`.
pub fn values_string(operands: &[Operand<'_>], st: &VmState, colored: bool) -> String {
  operands.iter()
          .filter_map(|operand| match operand.value {
            OperandValue::Reg(reg)   => {
              Some(format!(" {}={}", colored_name(operand.kind, reg, colored), st.get_var_string(reg)))
            }
            OperandValue::Regs(regs) => {
              Some(format!(" {}", st.get_var_list_string(regs)))
            }
            _ => None,
          })
          .collect()
}

#[cfg(test)]
mod tests {
  use ndarray::arr1;

  use super::*;
  use crate::options::VmOptions;

  fn operand(kind: OperandKind, value: OperandValue<'_>) -> Operand<'_> {
    Operand { name: "x", kind, value }
  }

  #[test]
  fn sigils_and_colors() {
    assert_eq!(colored_name(OperandKind::Opaque, Reg::new(4), false), "*4");
    assert_eq!(colored_name(OperandKind::Array, Reg::ABSENT, false), "$_");
    assert_eq!(colored_name(OperandKind::Array, Reg::new(1), true), "\x1b[32m$1\x1b[0m");
    assert_eq!(colored_name(OperandKind::Opaque, Reg::new(1), true), "\x1b[33m*1\x1b[0m");
    assert_eq!(colored_name(OperandKind::Shape, Reg::new(1), true), "\x1b[31m^1\x1b[0m");
  }

  #[test]
  fn call_line() {
    let regs = [Reg::new(0), Reg::new(1)];
    let inputs = [
      operand(OperandKind::ArrayList, OperandValue::Regs(&regs)),
      operand(OperandKind::Int, OperandValue::Int(1)),
      operand(OperandKind::IntList, OperandValue::Ints(&[2, 3])),
      operand(OperandKind::Float, OperandValue::Float(1.0)),
      operand(OperandKind::String, OperandValue::Str("w")),
    ];
    let outputs = [operand(OperandKind::Sequence, OperandValue::Reg(Reg::new(2)))];

    assert_eq!(
      call_string("Op", &inputs, &outputs, false),
      r#"@2 = Op([$0, $1], 1, (2, 3), 1.0, "w")"#
    );
    assert_eq!(call_string("Print", &inputs[..1], &[], false), "Print([$0, $1])");
  }

  #[test]
  fn values_line_skips_literals() {
    let mut st = VmState::new(VmOptions::default(), 16);
    st.set_array(Reg::new(0), arr1(&[1.0, 2.0]).into_dyn().into_shared()).unwrap();

    let operands = [
      operand(OperandKind::Array, OperandValue::Reg(Reg::new(0))),
      operand(OperandKind::Int, OperandValue::Int(3)),
      operand(OperandKind::OptionalArray, OperandValue::Reg(Reg::ABSENT)),
    ];
    assert_eq!(values_string(&operands, &st, false), " $0=f64(2) $_=null");
    assert_eq!(double_list(&[1.0, 2.5]), "{1.0, 2.5}");
  }
}
