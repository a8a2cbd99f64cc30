use std::collections::HashMap;

use indexmap::IndexMap;
use thiserror::Error;

use crate::environment::EnvVars;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpandError {
  #[error("Environment variable '{name}' is not defined.")]
  Unresolved { name: String },
  /// The chain starts and ends with the same variable.
  #[error("Environment variable '{}' references itself ({}).", .chain[0], .chain.join(" -> "))]
  Cyclic { chain: Vec<String> },
}

/// Expands every `$NAME` and `${NAME}` reference in the configured
/// environment values.
///
/// References resolve against the configured entries first and fall back to
/// the inherited environment. A value that references its own name (ex.
/// `PATH=$HOME/bin:$PATH`) refers to the inherited value of that variable.
pub fn expand_environment(raw: &IndexMap<String, String>, inherited: &EnvVars) -> Result<IndexMap<String, String>, ExpandError> {
  let mut expander = Expander::new(raw, inherited);
  let mut result = IndexMap::with_capacity(raw.len());
  for name in raw.keys() {
    let value = expander.resolve_configured(name)?;
    result.insert(name.clone(), value);
  }
  Ok(result)
}

/// Expands the references in a single string, such as a configured search path.
pub fn expand_value(value: &str, raw: &IndexMap<String, String>, inherited: &EnvVars) -> Result<String, ExpandError> {
  Expander::new(raw, inherited).expand_text(value, None)
}

struct Expander<'a> {
  raw: &'a IndexMap<String, String>,
  inherited: &'a EnvVars,
  resolved: HashMap<String, String>,
  visiting: Vec<String>,
}

impl<'a> Expander<'a> {
  fn new(raw: &'a IndexMap<String, String>, inherited: &'a EnvVars) -> Self {
    Self {
      raw,
      inherited,
      resolved: HashMap::new(),
      visiting: Vec::new(),
    }
  }

  fn resolve_configured(&mut self, name: &str) -> Result<String, ExpandError> {
    if let Some(value) = self.resolved.get(name) {
      return Ok(value.clone());
    }
    let raw = self.raw;
    let Some(raw_value) = raw.get(name) else {
      return self.resolve_inherited(name);
    };
    if let Some(index) = self.visiting.iter().position(|visiting| visiting == name) {
      let mut chain = self.visiting[index..].to_vec();
      chain.push(name.to_string());
      return Err(ExpandError::Cyclic { chain });
    }

    self.visiting.push(name.to_string());
    let value = self.expand_text(raw_value, Some(name));
    self.visiting.pop();
    let value = value?;
    self.resolved.insert(name.to_string(), value.clone());
    Ok(value)
  }

  fn resolve_inherited(&self, name: &str) -> Result<String, ExpandError> {
    match self.inherited.get(name) {
      Some(value) => Ok(value.clone()),
      None => Err(ExpandError::Unresolved { name: name.to_string() }),
    }
  }

  /// A variable referencing itself reads the inherited value, and is a cycle
  /// when there is none.
  fn resolve_self_reference(&self, name: &str) -> Result<String, ExpandError> {
    match self.inherited.get(name) {
      Some(value) => Ok(value.clone()),
      None => Err(ExpandError::Cyclic {
        chain: vec![name.to_string(), name.to_string()],
      }),
    }
  }

  fn expand_text(&mut self, text: &str, current_name: Option<&str>) -> Result<String, ExpandError> {
    let mut result = String::with_capacity(text.len());
    let mut remaining = text;

    while let Some(index) = remaining.find('$') {
      result.push_str(&remaining[..index]);
      let after = &remaining[index + 1..];
      match parse_reference(after) {
        Some((name, consumed)) => {
          let value = if Some(name) == current_name {
            self.resolve_self_reference(name)?
          } else {
            self.resolve_configured(name)?
          };
          result.push_str(&value);
          remaining = &after[consumed..];
        }
        None => {
          // not a reference, so keep the dollar sign as-is
          result.push('$');
          remaining = after;
        }
      }
    }

    result.push_str(remaining);
    Ok(result)
  }
}

/// Parses the variable name that follows a `$`, returning the name and the
/// number of bytes consumed.
fn parse_reference(text: &str) -> Option<(&str, usize)> {
  if let Some(braced) = text.strip_prefix('{') {
    let end = braced.find('}')?;
    let name = &braced[..end];
    if is_variable_name(name) { Some((name, end + 2)) } else { None }
  } else {
    let end = text
      .char_indices()
      .find(|(index, c)| !is_name_char(*c, *index == 0))
      .map(|(index, _)| index)
      .unwrap_or(text.len());
    if end == 0 { None } else { Some((&text[..end], end)) }
  }
}

fn is_variable_name(name: &str) -> bool {
  !name.is_empty() && name.char_indices().all(|(index, c)| is_name_char(c, index == 0))
}

fn is_name_char(c: char, is_first: bool) -> bool {
  c == '_' || c.is_ascii_alphabetic() || (!is_first && c.is_ascii_digit())
}

#[cfg(test)]
mod test {
  use pretty_assertions::assert_eq;

  use super::*;

  fn map(items: &[(&str, &str)]) -> IndexMap<String, String> {
    items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn expands_chained_references() {
    let raw = map(&[("TOOLS", "$ROOT/tools"), ("ROOT", "${HOME}/workspace"), ("PLAIN", "value")]);
    let inherited = map(&[("HOME", "/home/user")]);
    let result = expand_environment(&raw, &inherited).unwrap();
    assert_eq!(
      result,
      map(&[
        ("TOOLS", "/home/user/workspace/tools"),
        ("ROOT", "/home/user/workspace"),
        ("PLAIN", "value"),
      ])
    );
  }

  #[test]
  fn configured_values_win_over_inherited() {
    let raw = map(&[("A", "$B"), ("B", "configured")]);
    let inherited = map(&[("B", "inherited")]);
    assert_eq!(expand_environment(&raw, &inherited).unwrap()["A"], "configured");
  }

  #[test]
  fn self_reference_uses_inherited_value() {
    let raw = map(&[("PATH", "$HOME/bin:$PATH")]);
    let inherited = map(&[("HOME", "/h"), ("PATH", "/usr/bin")]);
    assert_eq!(expand_environment(&raw, &inherited).unwrap()["PATH"], "/h/bin:/usr/bin");
  }

  #[test]
  fn self_reference_without_inherited_value_is_cyclic() {
    let raw = map(&[("EXTRA", "$EXTRA:/opt")]);
    let err = expand_environment(&raw, &EnvVars::new()).unwrap_err();
    assert_eq!(
      err,
      ExpandError::Cyclic {
        chain: vec!["EXTRA".to_string(), "EXTRA".to_string()]
      }
    );
    assert_eq!(err.to_string(), "Environment variable 'EXTRA' references itself (EXTRA -> EXTRA).");

    // also when reached through another variable
    let raw = map(&[("A", "$B"), ("B", "${B}x")]);
    let err = expand_environment(&raw, &EnvVars::new()).unwrap_err();
    assert_eq!(
      err,
      ExpandError::Cyclic {
        chain: vec!["B".to_string(), "B".to_string()]
      }
    );
  }

  #[test]
  fn unknown_reference_is_unresolved() {
    let raw = map(&[("A", "$MISSING/bin")]);
    let err = expand_environment(&raw, &EnvVars::new()).unwrap_err();
    assert_eq!(err, ExpandError::Unresolved { name: "MISSING".to_string() });
  }

  #[test]
  fn detects_cycles() {
    let raw = map(&[("A", "$B"), ("B", "$A")]);
    let err = expand_environment(&raw, &EnvVars::new()).unwrap_err();
    assert_eq!(
      err,
      ExpandError::Cyclic {
        chain: vec!["A".to_string(), "B".to_string(), "A".to_string()]
      }
    );
  }

  #[test]
  fn detects_transitive_cycles() {
    let raw = map(&[("A", "x${B}"), ("B", "$C"), ("C", "prefix-$A")]);
    let err = expand_environment(&raw, &map(&[("A", "inherited")])).unwrap_err();
    assert!(matches!(err, ExpandError::Cyclic { .. }));
  }

  #[test]
  fn errors_on_undefined() {
    let raw = map(&[("A", "$UNDEFINED")]);
    let err = expand_environment(&raw, &EnvVars::new()).unwrap_err();
    assert_eq!(err, ExpandError::Unresolved { name: "UNDEFINED".to_string() });
  }

  #[test]
  fn keeps_non_references() {
    let raw = map(&[("PRICE", "$5 and $ and ${not closed and $")]);
    assert_eq!(expand_environment(&raw, &EnvVars::new()).unwrap()["PRICE"], "$5 and $ and ${not closed and $");
  }

  #[test]
  fn no_defined_reference_remains() {
    let raw = map(&[("A", "$B-$C"), ("B", "${C}${C}"), ("C", "c"), ("D", "$A/$B/$E")]);
    let inherited = map(&[("E", "e")]);
    let result = expand_environment(&raw, &inherited).unwrap();
    for value in result.values() {
      assert!(!value.contains('$'), "unexpanded value: {}", value);
    }
    assert_eq!(result["D"], "cc-c/cc/e");
  }

  #[test]
  fn expands_single_values() {
    let raw = map(&[("TOOLS", "$HOME/tools")]);
    let inherited = map(&[("HOME", "/home/user")]);
    assert_eq!(expand_value("$TOOLS/bin", &raw, &inherited).unwrap(), "/home/user/tools/bin");
    assert_eq!(expand_value("${HOME}", &raw, &inherited).unwrap(), "/home/user");
  }
}
