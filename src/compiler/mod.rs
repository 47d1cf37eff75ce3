/*!

  The instruction generator. [`define_instructions!`] takes a declarative catalog and emits,
  for every instruction in it:

    - a struct named after the instruction, with one field per operand in the operand kind's
      storage type, the instruction's provenance, and its custom state if it declares one;
    - an [`Op`] implementation: the static descriptor, a decoder that validates a record
      against the descriptor, operand listings for the runner, and `invoke`, which resolves
      inputs, calls the hand-written `run_impl`, and scatters the results;
    - a `Drop` implementation releasing custom state, for instructions that have it.

  For the catalog as a whole it emits the `Opcode` enum (one-based, in catalog order), the
  `Instruction` enum with one variant per instruction, the `CATALOG` descriptor table, the
  `FACTORIES` table the dispatcher indexes by opcode, and the
  [`Dispatch`](crate::dispatch::Dispatch) implementation.

  A catalog entry reads

  ```text
  /// doc comment
  Name: typed|untyped [+ custom(StateType)] (input: Kind, ...) -> (output: Kind, ...);
  ```

  where each `Kind` names a marker type in [`types::kind`](crate::types::kind).

  For a typed instruction the hand-written stub is

  ```text
  fn run_impl(&mut self, st: &mut VmState, <one parameter per input>, <&mut Sequence per
              sequence output>) -> Result<()|T|(T1, T2, ...)>
  ```

  returning the non-sequence outputs in declaration order. A sequence input arrives as the
  register's own sequence, `&mut Sequence`, and goes back to the register when the stub
  returns; outputs are stored after that, so an output naming the same register wins. An untyped instruction's stub is
  `fn run_impl(&mut self, st: &mut VmState) -> Result<()>` and does its own register I/O.

*/

mod runner;
pub mod trace;

pub use runner::{run, CustomState, Op, Operands};

/// The uncolored call line of an instruction, `outs = Name(ins)`.
pub fn call_line<O: Op>(op: &O) -> String {
  trace::call_string(O::DESCRIPTOR.name, &op.inputs(), &op.outputs(), false)
}

/// One past the highest register the instruction names; 0 if it names none.
pub fn register_count<O: Op>(op: &O) -> usize {
  op.inputs()
    .iter()
    .chain(op.outputs().iter())
    .flat_map(|operand| operand.value.registers())
    .filter_map(|reg| reg.index())
    .map(|i| i + 1)
    .max()
    .unwrap_or(0)
}

macro_rules! define_instructions {
  // region Flags

  (@typed typed) => { true };
  (@typed untyped) => { false };

  (@has_custom) => { false };
  (@has_custom $state:ty) => { true };

  // endregion

  // region Opcodes

  (@opcodes $first:ident $($rest:ident)*) => {
    /// One-based instruction numbers in catalog order.
    #[derive(
      ::strum_macros::Display, ::strum_macros::EnumString, ::strum_macros::IntoStaticStr,
      ::strum_macros::EnumIter, ::num_enum::TryFromPrimitive, ::num_enum::IntoPrimitive,
      Clone, Copy, Eq, PartialEq, Debug, Hash
    )]
    #[repr(u16)]
    pub enum Opcode {
      $first = 1,
      $($rest,)*
    }
  };

  // endregion

  // region Invocation

  (@invoke_for untyped ins [$($ins:tt)*] outs [$($outs:tt)*]) => {
    fn invoke(&mut self, st: &mut $crate::state::VmState) -> $crate::errors::Result<()> {
      self.run_impl(st)
    }
  };

  (@invoke_for typed ins [$($ins:tt)*] outs [$($outs:tt)*]) => {
    $crate::compiler::define_instructions!(@invoke ins [$($ins)*] seq [] ret [] outs [$($outs)*]);
  };

  // Sequence outputs become `&mut` parameters; the rest are returned.
  (@invoke ins [$($ins:tt)*] seq [$($seq:ident)*] ret [$($ret:tt)*]
     outs [$out:ident : Sequence, $($rest:tt)*]) => {
    $crate::compiler::define_instructions!(
      @invoke ins [$($ins)*] seq [$($seq)* $out] ret [$($ret)*] outs [$($rest)*]
    );
  };

  (@invoke ins [$($ins:tt)*] seq [$($seq:ident)*] ret [$($ret:tt)*]
     outs [$out:ident : $kind:ident, $($rest:tt)*]) => {
    $crate::compiler::define_instructions!(
      @invoke ins [$($ins)*] seq [$($seq)*] ret [$($ret)* $out : $kind,] outs [$($rest)*]
    );
  };

  (@invoke ins [$($in:ident : $in_kind:ident),*] seq [$($seq:ident)*] ret [] outs []) => {
    fn invoke(&mut self, st: &mut $crate::state::VmState) -> $crate::errors::Result<()> {
      #[allow(unused_imports)]
      use $crate::types::{OperandType, RegisterType};

      $( let mut $in = <$crate::types::kind::$in_kind as OperandType>::resolve(st, &self.$in)?; )*
      $( <$crate::types::kind::$in_kind as OperandType>::lend(st, &self.$in, &mut $in)?; )*
      $( let mut $seq = $crate::types::Sequence::new(); )*
      let result = self.run_impl(
        st,
        $( <$crate::types::kind::$in_kind as OperandType>::input(&mut $in), )*
        $( &mut $seq, )*
      );
      $( <$crate::types::kind::$in_kind as OperandType>::restore(st, &self.$in, $in); )*
      result?;
      $( <$crate::types::kind::Sequence as RegisterType>::store(st, &self.$seq, $seq)?; )*
      Ok(())
    }
  };

  (@invoke ins [$($in:ident : $in_kind:ident),*] seq [$($seq:ident)*]
     ret [$ret:ident : $ret_kind:ident,] outs []) => {
    fn invoke(&mut self, st: &mut $crate::state::VmState) -> $crate::errors::Result<()> {
      #[allow(unused_imports)]
      use $crate::types::{OperandType, RegisterType};

      $( let mut $in = <$crate::types::kind::$in_kind as OperandType>::resolve(st, &self.$in)?; )*
      $( <$crate::types::kind::$in_kind as OperandType>::lend(st, &self.$in, &mut $in)?; )*
      $( let mut $seq = $crate::types::Sequence::new(); )*
      let result = self.run_impl(
        st,
        $( <$crate::types::kind::$in_kind as OperandType>::input(&mut $in), )*
        $( &mut $seq, )*
      );
      $( <$crate::types::kind::$in_kind as OperandType>::restore(st, &self.$in, $in); )*
      let $ret = result?;
      <$crate::types::kind::$ret_kind as RegisterType>::store(st, &self.$ret, $ret)?;
      $( <$crate::types::kind::Sequence as RegisterType>::store(st, &self.$seq, $seq)?; )*
      Ok(())
    }
  };

  (@invoke ins [$($in:ident : $in_kind:ident),*] seq [$($seq:ident)*]
     ret [$($ret:ident : $ret_kind:ident,)+] outs []) => {
    fn invoke(&mut self, st: &mut $crate::state::VmState) -> $crate::errors::Result<()> {
      #[allow(unused_imports)]
      use $crate::types::{OperandType, RegisterType};

      $( let mut $in = <$crate::types::kind::$in_kind as OperandType>::resolve(st, &self.$in)?; )*
      $( <$crate::types::kind::$in_kind as OperandType>::lend(st, &self.$in, &mut $in)?; )*
      $( let mut $seq = $crate::types::Sequence::new(); )*
      let result = self.run_impl(
        st,
        $( <$crate::types::kind::$in_kind as OperandType>::input(&mut $in), )*
        $( &mut $seq, )*
      );
      $( <$crate::types::kind::$in_kind as OperandType>::restore(st, &self.$in, $in); )*
      let ($($ret,)+) = result?;
      $( <$crate::types::kind::$ret_kind as RegisterType>::store(st, &self.$ret, $ret)?; )+
      $( <$crate::types::kind::Sequence as RegisterType>::store(st, &self.$seq, $seq)?; )*
      Ok(())
    }
  };

  // endregion

  // region One instruction

  (@op [$(#[$doc:meta])*] $name:ident $typing:ident [$($state:ty)?]
     [$($in:ident : $in_kind:ident),*] [$($out:ident : $out_kind:ident),*]) => {
    $(#[$doc])*
    #[derive(Debug)]
    pub struct $name {
      debug_info: Option<::string_cache::DefaultAtom>,
      $( pub(crate) $in: <$crate::types::kind::$in_kind as $crate::types::OperandType>::Storage, )*
      $( pub(crate) $out: <$crate::types::kind::$out_kind as $crate::types::OperandType>::Storage, )*
      $( pub(crate) custom: Option<Box<$state>>, )?
    }

    impl $crate::compiler::Op for $name {
      const DESCRIPTOR: $crate::catalog::InstructionDescriptor = $crate::catalog::InstructionDescriptor {
        name: stringify!($name),
        opcode: Opcode::$name as u16,
        inputs: &[
          $(
            $crate::catalog::OperandDescriptor::new(
              stringify!($in),
              <$crate::types::kind::$in_kind as $crate::types::OperandType>::KIND
            ),
          )*
        ],
        outputs: &[
          $(
            $crate::catalog::OperandDescriptor::new(
              stringify!($out),
              <$crate::types::kind::$out_kind as $crate::types::OperandType>::KIND
            ),
          )*
        ],
        typed: $crate::compiler::define_instructions!(@typed $typing),
        has_custom_state: $crate::compiler::define_instructions!(@has_custom $($state)?),
      };

      #[allow(unused_mut, unused_variables)]
      fn decode(record: &$crate::bytecode::InstructionRecord) -> $crate::errors::Result<Self> {
        #[allow(unused_imports)]
        use $crate::types::{OperandType, RegisterType};
        use $crate::errors::VmError;

        let descriptor = <Self as $crate::compiler::Op>::DESCRIPTOR;
        let arity = |operands: &'static str, expected: usize, actual: usize| VmError::ArityMismatch {
          instruction: descriptor.name,
          operands,
          expected,
          actual,
        };

        if record.inputs.len() != descriptor.inputs.len() {
          return Err(arity("inputs", descriptor.inputs.len(), record.inputs.len()));
        }
        let fixed = descriptor.outputs.len() - descriptor.variadic_outputs() as usize;
        let outputs_fit = match descriptor.variadic_outputs() {
          true  => record.outputs.len() >= fixed,
          false => record.outputs.len() == fixed,
        };
        if !outputs_fit {
          return Err(arity("outputs", descriptor.outputs.len(), record.outputs.len()));
        }

        let mut inputs = record.inputs.iter().enumerate();
        $(
          let $in = match inputs.next() {
            Some((position, operand)) => {
              <$crate::types::kind::$in_kind as OperandType>::decode(descriptor.name, position, operand)?
            }
            None => return Err(arity("inputs", descriptor.inputs.len(), record.inputs.len())),
          };
        )*

        let mut outputs = $crate::types::OutputCursor::new(&record.outputs);
        $( let $out = <$crate::types::kind::$out_kind as RegisterType>::decode_output(&mut outputs); )*

        let mut op = $name {
          debug_info: record.debug_info.as_deref().map(::string_cache::DefaultAtom::from),
          $( $in, )*
          $( $out, )*
          $( custom: None::<Box<$state>>, )?
        };
        $(
          let state = <$state as $crate::compiler::CustomState<$name>>::init(&op)?;
          op.custom = Some(Box::new(state));
        )?

        Ok(op)
      }

      fn debug_info(&self) -> Option<&str> {
        self.debug_info.as_deref()
      }

      fn inputs(&self) -> $crate::compiler::Operands<'_> {
        ::smallvec::smallvec![
          $(
            $crate::types::Operand {
              name: stringify!($in),
              kind: <$crate::types::kind::$in_kind as $crate::types::OperandType>::KIND,
              value: <$crate::types::kind::$in_kind as $crate::types::OperandType>::operand(&self.$in),
            }
          ),*
        ]
      }

      fn outputs(&self) -> $crate::compiler::Operands<'_> {
        ::smallvec::smallvec![
          $(
            $crate::types::Operand {
              name: stringify!($out),
              kind: <$crate::types::kind::$out_kind as $crate::types::OperandType>::KIND,
              value: <$crate::types::kind::$out_kind as $crate::types::OperandType>::operand(&self.$out),
            }
          ),*
        ]
      }

      $crate::compiler::define_instructions!(
        @invoke_for $typing ins [$($in : $in_kind),*] outs [$($out : $out_kind,)*]
      );
    }

    $(
      impl Drop for $name {
        fn drop(&mut self) {
          if let Some(state) = self.custom.take() {
            ::tracing::debug!(instruction = stringify!($name), "releasing custom state");
            <$state as $crate::compiler::CustomState<$name>>::release(*state, self);
          }
        }
      }
    )?
  };

  // endregion

  // region Catalog

  (
    $(
      $(#[$doc:meta])*
      $name:ident : $typing:ident $(+ custom($state:ty))?
        ( $($in:ident : $in_kind:ident),* $(,)? ) -> ( $($out:ident : $out_kind:ident),* $(,)? );
    )+
  ) => {
    $crate::compiler::define_instructions!(@opcodes $($name)+);

    $(
      $crate::compiler::define_instructions!(
        @op [$(#[$doc])*] $name $typing [$($state)?] [$($in : $in_kind),*] [$($out : $out_kind),*]
      );
    )+

    impl Opcode {
      pub fn code(self) -> u16 {
        self.into()
      }

      pub fn from_code(code: u16) -> $crate::errors::Result<Opcode> {
        Opcode::try_from(code).map_err(|_| $crate::errors::VmError::UnknownOpcode(code))
      }

      pub fn descriptor(self) -> $crate::catalog::InstructionDescriptor {
        match self {
          $( Opcode::$name => <$name as $crate::compiler::Op>::DESCRIPTOR, )+
        }
      }
    }

    /// A decoded instruction of this catalog.
    #[derive(Debug)]
    pub enum Instruction {
      $( $name($name), )+
    }

    $(
      impl From<$name> for Instruction {
        fn from(op: $name) -> Instruction {
          Instruction::$name(op)
        }
      }
    )+

    impl std::fmt::Display for Instruction {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
          $( Instruction::$name(op) => write!(f, "{}", $crate::compiler::call_line(op)), )+
        }
      }
    }

    /// Descriptors in opcode order.
    pub const CATALOG: &[$crate::catalog::InstructionDescriptor] = &[
      $( <$name as $crate::compiler::Op>::DESCRIPTOR, )+
    ];

    /// Decoders in opcode order; the factory for opcode `n` is at index `n - 1`.
    pub const FACTORIES: &[$crate::dispatch::Factory<Instruction>] = &[
      $( $crate::dispatch::make::<$name, Instruction>, )+
    ];

    impl $crate::dispatch::Dispatch for Instruction {
      fn catalog() -> &'static [$crate::catalog::InstructionDescriptor] {
        CATALOG
      }

      fn factories() -> &'static [$crate::dispatch::Factory<Instruction>] {
        FACTORIES
      }

      fn opcode(&self) -> u16 {
        match self {
          $( Instruction::$name(_) => Opcode::$name as u16, )+
        }
      }

      fn debug_info(&self) -> Option<&str> {
        match self {
          $( Instruction::$name(op) => $crate::compiler::Op::debug_info(op), )+
        }
      }

      fn register_count(&self) -> usize {
        match self {
          $( Instruction::$name(op) => $crate::compiler::register_count(op), )+
        }
      }

      fn run(&mut self, st: &mut $crate::state::VmState) -> $crate::errors::Result<()> {
        match self {
          $( Instruction::$name(op) => $crate::compiler::run(op, st), )+
        }
      }
    }
  };

  // endregion
}

pub(crate) use define_instructions;
