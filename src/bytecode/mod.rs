/*!

  The two external forms of an instruction stream.

  A record ([`InstructionRecord`]) is the structured form produced by a front end: an opcode,
  positional input operands each tagged with its [`WireType`](crate::types::WireType), output
  register indices, and an optional provenance string. Decoders never trust the tags; every
  tag is checked against the kind the instruction descriptor declares.

  Assembly is the human readable form. It uses the same syntax the call trace prints, so a
  trace can be pasted back in as a program:

  ```text
  # model.py:12
  $2 = Add($0, $1)
  $3, *4 = Relu($2)      ; comment
  ```

*/

mod assembly;
mod record;

pub use assembly::parse_assembly;
pub use record::{InstructionRecord, OperandRecord};
