//! Glob matching for intent criteria (spec §4.7: "`*` (any run of
//! non-separator chars), `?` (single char), literal `.`; no regex").

use wildcard::Wildcard;

/// Matches `value` against the glob `pattern`. An invalid pattern matches
/// nothing rather than panicking -- callers are evaluating user-supplied
/// intent criteria, not trusted config.
pub fn glob_match(pattern: &str, value: &str) -> bool {
  match Wildcard::new(pattern.as_bytes()) {
    Ok(w) => w.is_match(value.as_bytes()),
    Err(_) => false,
  }
}

/// `any(globMatch(p, value) for p in patterns)`, with the empty list
/// meaning "match all" (spec §4.7 tie-break).
pub fn any_matches(patterns: &[String], value: &str) -> bool {
  if patterns.is_empty() {
    return true;
  }
  patterns.iter().any(|p| glob_match(p, value))
}

/// `any(globMatch(p, value) for p in excludes)`, with the empty list
/// meaning "exclude nothing".
pub fn any_excludes(patterns: &[String], value: &str) -> bool {
  patterns.iter().any(|p| glob_match(p, value))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_pattern_list_matches_all() {
    assert!(any_matches(&[], "anything"));
  }

  #[test]
  fn star_matches_prefix() {
    assert!(any_matches(&["nginx*".to_string()], "nginx-proxy"));
    assert!(!any_matches(&["nginx*".to_string()], "redis"));
  }

  #[test]
  fn empty_exclude_list_excludes_nothing() {
    assert!(!any_excludes(&[], "anything"));
  }
}
