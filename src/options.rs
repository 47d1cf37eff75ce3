//! Execution options. Every switch can also be set from the environment with
//! [`VmOptions::from_env`].

use std::collections::HashSet;
use std::str::FromStr;

use strum_macros::{Display as StrumDisplay, EnumString};

#[derive(
  StrumDisplay, EnumString,
  Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash
)]
#[strum(ascii_case_insensitive)]
pub enum TraceLevel {
  /// No trace output.
  #[default]
  #[strum(to_string = "off", serialize = "0")]
  Off,
  /// Provenance and one `outs = Name(ins)` line per instruction.
  #[strum(to_string = "call", serialize = "1")]
  Call,
  /// Call lines plus the values of register operands before and after the call.
  #[strum(to_string = "operands", serialize = "2")]
  Operands,
}

#[derive(Clone, Debug, Default)]
pub struct VmOptions {
  pub trace_level       : TraceLevel,
  pub check_nans        : bool,
  pub check_infs        : bool,
  /// Instructions whose operand trace prints full values instead of summaries.
  pub verbose_ops       : HashSet<String>,
  /// Log a per-register memory table after each program run.
  pub dump_memory_usage : bool,
}

pub const TRACE_VAR        : &str = "TENSORVM_TRACE";
pub const CHECK_NANS_VAR   : &str = "TENSORVM_CHECK_NANS";
pub const CHECK_INFS_VAR   : &str = "TENSORVM_CHECK_INFS";
pub const VERBOSE_OPS_VAR  : &str = "TENSORVM_VERBOSE_OPS";
pub const DUMP_MEMORY_VAR  : &str = "TENSORVM_DUMP_MEMORY";

fn parse_flag(var: &str, value: &str) -> Option<bool> {
  match value.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on"  => Some(true),
    "0" | "false" | "no" | "off" => Some(false),
    _ => {
      tracing::warn!(var, value, "ignoring unrecognized flag value");
      None
    }
  }
}

impl VmOptions {
  pub fn from_env() -> VmOptions {
    VmOptions::from_lookup(|name| std::env::var(name).ok())
  }

  /// Builds options from an arbitrary variable lookup. Unparseable values keep the default.
  pub fn from_lookup<F>(lookup: F) -> VmOptions
    where F: Fn(&str) -> Option<String>
  {
    let mut options = VmOptions::default();

    if let Some(value) = lookup(TRACE_VAR) {
      match TraceLevel::from_str(value.trim()) {
        Ok(level) => options.trace_level = level,
        Err(_)    => tracing::warn!(var = TRACE_VAR, value = %value, "ignoring unrecognized trace level"),
      }
    }
    if let Some(flag) = lookup(CHECK_NANS_VAR).and_then(|v| parse_flag(CHECK_NANS_VAR, &v)) {
      options.check_nans = flag;
    }
    if let Some(flag) = lookup(CHECK_INFS_VAR).and_then(|v| parse_flag(CHECK_INFS_VAR, &v)) {
      options.check_infs = flag;
    }
    if let Some(flag) = lookup(DUMP_MEMORY_VAR).and_then(|v| parse_flag(DUMP_MEMORY_VAR, &v)) {
      options.dump_memory_usage = flag;
    }
    if let Some(ops) = lookup(VERBOSE_OPS_VAR) {
      options.verbose_ops = ops.split(',')
                               .map(str::trim)
                               .filter(|s| !s.is_empty())
                               .map(str::to_string)
                               .collect();
    }

    options
  }

  pub fn with_trace_level(mut self, trace_level: TraceLevel) -> VmOptions {
    self.trace_level = trace_level;
    self
  }

  pub fn with_checks(mut self, check_nans: bool, check_infs: bool) -> VmOptions {
    self.check_nans = check_nans;
    self.check_infs = check_infs;
    self
  }

  pub fn with_verbose_op(mut self, name: &str) -> VmOptions {
    self.verbose_ops.insert(name.to_string());
    self
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> =
      pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |name| map.get(name).cloned()
  }

  #[test]
  fn trace_levels_parse_from_names_and_numbers() {
    assert_eq!(TraceLevel::from_str("0").ok(), Some(TraceLevel::Off));
    assert_eq!(TraceLevel::from_str("Call").ok(), Some(TraceLevel::Call));
    assert_eq!(TraceLevel::from_str("2").ok(), Some(TraceLevel::Operands));
    assert!(TraceLevel::Operands > TraceLevel::Call);
  }

  #[test]
  fn options_from_lookup() {
    let options = VmOptions::from_lookup(lookup_from(&[
      (TRACE_VAR, "operands"),
      (CHECK_NANS_VAR, "1"),
      (CHECK_INFS_VAR, "false"),
      (VERBOSE_OPS_VAR, "MatMul, Add,"),
    ]));

    assert_eq!(options.trace_level, TraceLevel::Operands);
    assert!(options.check_nans);
    assert!(!options.check_infs);
    assert_eq!(options.verbose_ops.len(), 2);
    assert!(options.verbose_ops.contains("Add"));
    assert!(!options.dump_memory_usage);
  }

  #[test]
  fn bad_values_keep_defaults() {
    let options = VmOptions::from_lookup(lookup_from(&[(TRACE_VAR, "loud"), (CHECK_NANS_VAR, "maybe")]));
    assert_eq!(options.trace_level, TraceLevel::Off);
    assert!(!options.check_nans);
  }
}
