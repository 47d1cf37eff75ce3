/*!
  The human readable textual form of an instruction stream is called assembly. It is line
  oriented, and each line is one of:

    - an instruction, `outs = Name(ins)` or `Name(ins)`;
    - `# text`, the provenance of the instruction on the next line. Consecutive `#` lines
      are joined with newlines, and each is trimmed;
    - `; text`, a comment. A comment may also end an instruction line.

  Register operands carry their kind's sigil (`$` array, `@` sequence, `*` opaque, `^` shape,
  `%` scalar), and `_` in place of a number is the absent register. Lists are written
  `[$1, $2]` for registers, `(1, 2)` for integers and `{1.0, 2.5}` for doubles. Strings are
  double quoted and take the escapes Rust's `{:?}` produces, `\u{..}` included. Output
  registers are only addresses, so an output's sigil is informational.
*/

use nom::{
  branch::alt,
  bytes::complete::{escaped_transform, is_not, tag, take_while1},
  character::complete::{char as one_char, digit1, hex_digit1, one_of, space0},
  combinator::{all_consuming, map, map_opt, map_res, opt, recognize, rest, value},
  multi::{separated_list0, separated_list1},
  number::complete::recognize_float,
  sequence::{delimited, pair, preceded, terminated, tuple},
  IResult,
};

use crate::address::{Reg, RegisterNumberType};
use crate::bytecode::{InstructionRecord, OperandRecord};
use crate::dispatch::{Dispatch, Dispatcher};
use crate::errors::{Result, VmError};

type Parsed<'a, T> = IResult<&'a str, T>;

/// Outputs, mnemonic, and inputs of one instruction line.
type Call<'a> = (Vec<RegisterNumberType>, &'a str, Vec<OperandRecord>);

fn comma(input: &str) -> Parsed<char> {
  delimited(space0, one_char(','), space0)(input)
}

fn list<'a, O, F>(open: char, item: F, close: char) -> impl FnMut(&'a str) -> Parsed<'a, Vec<O>>
  where F: FnMut(&'a str) -> Parsed<'a, O>
{
  delimited(
    terminated(one_char(open), space0),
    separated_list0(comma, item),
    preceded(space0, one_char(close)),
  )
}

fn index(input: &str) -> Parsed<RegisterNumberType> {
  alt((
    value(Reg::ABSENT.to_wire(), one_char('_')),
    map_res(digit1, |digits: &str| digits.parse::<RegisterNumberType>()),
  ))(input)
}

fn register(input: &str) -> Parsed<(char, RegisterNumberType)> {
  pair(one_of("$@*^%"), index)(input)
}

fn array_register(input: &str) -> Parsed<RegisterNumberType> {
  preceded(one_char('$'), index)(input)
}

fn integer(input: &str) -> Parsed<i64> {
  map_res(recognize(pair(opt(one_char('-')), digit1)), |text: &str| text.parse::<i64>())(input)
}

fn double(input: &str) -> Parsed<f64> {
  alt((
    value(f64::NAN, tag("NaN")),
    value(f64::INFINITY, tag("inf")),
    value(f64::NEG_INFINITY, tag("-inf")),
    map_res(recognize_float, |text: &str| text.parse::<f64>()),
  ))(input)
}

/// A bare number is a float if it has a fraction or an exponent.
fn number(input: &str) -> Parsed<OperandRecord> {
  alt((
    map(alt((tag("NaN"), tag("inf"), tag("-inf"))), |text: &str| {
      OperandRecord::Float(match text {
        "NaN" => f64::NAN,
        "inf" => f64::INFINITY,
        _     => f64::NEG_INFINITY,
      })
    }),
    map_res(recognize_float, |text: &str| -> std::result::Result<OperandRecord, String> {
      match text.contains(|c| matches!(c, '.' | 'e' | 'E')) {
        true  => text.parse::<f64>().map(OperandRecord::Float).map_err(|e| e.to_string()),
        false => text.parse::<i64>().map(OperandRecord::Int).map_err(|e| e.to_string()),
      }
    }),
  ))(input)
}

/// `u{1f600}`, after the backslash.
fn unicode_escape(input: &str) -> Parsed<char> {
  map_opt(
    delimited(tag("u{"), hex_digit1, one_char('}')),
    |hex: &str| u32::from_str_radix(hex, 16).ok().and_then(char::from_u32),
  )(input)
}

fn string(input: &str) -> Parsed<String> {
  let escape = alt((
    value('\\', one_char('\\')),
    value('"', one_char('"')),
    value('\'', one_char('\'')),
    value('\n', one_char('n')),
    value('\r', one_char('r')),
    value('\t', one_char('t')),
    value('\0', one_char('0')),
    unicode_escape,
  ));
  delimited(
    one_char('"'),
    map(opt(escaped_transform(is_not("\\\""), '\\', escape)), Option::unwrap_or_default),
    one_char('"'),
  )(input)
}

fn operand(input: &str) -> Parsed<OperandRecord> {
  alt((
    map(register, |(sigil, index)| match sigil {
      '@' => OperandRecord::Sequence(index),
      '*' => OperandRecord::Opaque(index),
      '^' => OperandRecord::Shape(index),
      '%' => OperandRecord::Scalar(index),
      _   => OperandRecord::Array(index),
    }),
    map(list('[', array_register, ']'), OperandRecord::ArrayList),
    map(list('(', integer, ')'), OperandRecord::Ints),
    map(list('{', double, '}'), OperandRecord::Doubles),
    map(string, OperandRecord::String),
    number,
  ))(input)
}

/// `$3`, or a bracketed list for a variadic output.
fn output_group(input: &str) -> Parsed<Vec<RegisterNumberType>> {
  alt((
    map(register, |(_, index)| vec![index]),
    list('[', array_register, ']'),
  ))(input)
}

fn outputs(input: &str) -> Parsed<Vec<RegisterNumberType>> {
  map(
    terminated(separated_list1(comma, output_group), delimited(space0, one_char('='), space0)),
    |groups| groups.concat(),
  )(input)
}

fn mnemonic(input: &str) -> Parsed<&str> {
  take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

fn call(input: &str) -> Parsed<Call<'_>> {
  all_consuming(terminated(
    tuple((
      map(opt(outputs), Option::unwrap_or_default),
      mnemonic,
      preceded(space0, list('(', operand, ')')),
    )),
    pair(space0, opt(preceded(one_char(';'), rest))),
  ))(input)
}

/// Assembles `text` against the mnemonics of `dispatcher`'s catalog. Operands are checked
/// only syntactically here; the decoders check them against the descriptors.
pub fn parse_assembly<I: Dispatch>(text: &str, dispatcher: &Dispatcher<I>) -> Result<Vec<InstructionRecord>> {
  let mut records = Vec::new();
  let mut debug_info: Option<String> = None;

  for (number, line) in text.lines().enumerate() {
    let line_number = number + 1;
    let line = line.trim();

    if line.is_empty() || line.starts_with(';') {
      continue;
    }
    if let Some(info) = line.strip_prefix('#') {
      debug_info = Some(match debug_info.take() {
        Some(previous) => format!("{}\n{}", previous, info.trim()),
        None           => info.trim().to_string(),
      });
      continue;
    }

    let (outputs, name, inputs) = match call(line) {
      Ok((_, parsed)) => parsed,
      Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
        return Err(VmError::Assembly {
          line    : line_number,
          message : format!("unexpected input at `{}`", e.input),
        });
      }
      Err(nom::Err::Incomplete(_)) => {
        return Err(VmError::Assembly { line: line_number, message: "incomplete instruction".to_string() });
      }
    };

    let opcode = dispatcher.opcode_of(name).ok_or_else(|| VmError::Assembly {
      line    : line_number,
      message : format!("{} is not an instruction", name),
    })?;

    records.push(InstructionRecord {
      opcode,
      inputs,
      outputs,
      debug_info: debug_info.take(),
    });
  }

  Ok(records)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::instructions::Instruction;

  fn assemble(text: &str) -> Result<Vec<InstructionRecord>> {
    let dispatcher = Dispatcher::<Instruction>::new()?;
    parse_assembly(text, &dispatcher)
  }

  fn opcode(name: &str) -> u16 {
    Dispatcher::<Instruction>::new().unwrap().opcode_of(name).unwrap()
  }

  #[test]
  fn operands_of_every_form() {
    let records = assemble(
      r#"$9 = Op(): ; not a call"#
    );
    assert!(matches!(records, Err(VmError::Assembly { line: 1, .. })));

    let (_, (outputs, name, inputs)) =
      call(r#"$9, *_ = Foo($0, @1, *2, ^3, %_, [$4, $_], (1, -2), {0.5, -1e3}, 7, -0.25, "a \"b\"")"#).unwrap();
    assert_eq!(outputs, vec![9, -1]);
    assert_eq!(name, "Foo");
    assert_eq!(
      inputs,
      vec![
        OperandRecord::Array(0),
        OperandRecord::Sequence(1),
        OperandRecord::Opaque(2),
        OperandRecord::Shape(3),
        OperandRecord::Scalar(-1),
        OperandRecord::ArrayList(vec![4, -1]),
        OperandRecord::Ints(vec![1, -2]),
        OperandRecord::Doubles(vec![0.5, -1000.0]),
        OperandRecord::Int(7),
        OperandRecord::Float(-0.25),
        OperandRecord::String("a \"b\"".to_string()),
      ]
    );
  }

  #[test]
  fn empty_lists_and_strings() {
    let (_, (outputs, _, inputs)) = call(r#"Print([], "")"#).unwrap();
    assert!(outputs.is_empty());
    assert_eq!(inputs, vec![OperandRecord::ArrayList(vec![]), OperandRecord::String(String::new())]);

    let (_, (_, _, inputs)) = call("$1 = Transpose($0, ())").unwrap();
    assert_eq!(inputs[1], OperandRecord::Ints(vec![]));
  }

  #[test]
  fn variadic_outputs_flatten() {
    let (_, (outputs, _, _)) = call("[$3, $4], $5 = Split($2, 0, ())").unwrap();
    assert_eq!(outputs, vec![3, 4, 5]);
  }

  #[test]
  fn provenance_attaches_to_the_next_instruction() {
    let records = assemble(
      "
      ; header comment
      # model.py:12
      $2 = Add($0, $1)   ; trailing comment

      $3 = Neg($2)
      "
    ).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].opcode, opcode("Add"));
    assert_eq!(records[0].debug_info.as_deref(), Some("model.py:12"));
    assert_eq!(records[0].outputs, vec![2]);
    assert_eq!(records[1].debug_info, None);
  }

  #[test]
  fn consecutive_provenance_lines_join() {
    let records = assemble("# model.py:12\n#   in forward\n$1 = Neg($0)").unwrap();
    assert_eq!(records[0].debug_info.as_deref(), Some("model.py:12\nin forward"));
  }

  #[test]
  fn strings_take_debug_escapes() {
    let text = "nul\0 quote' del\u{7f} bell\u{7} emoji\u{1f600} tab\t \"q\" \\";
    let printed = OperandRecord::String(text.to_string()).to_string();

    let (rest, parsed) = string(&printed).unwrap();
    assert!(rest.is_empty());
    assert_eq!(parsed, text);

    let (_, parsed) = string(r#""it\'s \u{41}""#).unwrap();
    assert_eq!(parsed, "it's A");
    assert!(string(r#""\u{110000}""#).is_err());
  }

  #[test]
  fn unknown_mnemonics_report_their_line() {
    let result = assemble("$1 = Neg($0)\n$2 = Frobnicate($1)");
    match result {
      Err(VmError::Assembly { line, message }) => {
        assert_eq!(line, 2);
        assert!(message.contains("Frobnicate"));
      }
      other => panic!("expected an assembly error, got {:?}", other),
    }
  }

  #[test]
  fn records_print_in_assembly_syntax() {
    let record = InstructionRecord::new(0)
        .input(OperandRecord::Doubles(vec![1.0, f64::INFINITY]))
        .input(OperandRecord::String("tab\there".to_string()));
    let text = format!("Constant({})", record.inputs.iter().map(|i| i.to_string()).collect::<Vec<String>>().join(", "));

    let (_, (_, _, inputs)) = call(&text).unwrap();
    assert_eq!(inputs, record.inputs);
  }
}
