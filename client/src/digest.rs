//! Digest normalisation and the single definition of "has update" (spec §4.4, §8).

/// Normalises a digest into lower-case `sha256:<64 hex>` form.
///
/// Accepts bare hex, `sha256:<hex>` (any case), and is idempotent:
/// `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(digest: &str) -> Option<String> {
  let lower = digest.trim().to_lowercase();
  let hex_part = lower.strip_prefix("sha256:").unwrap_or(&lower);
  if hex_part.len() != 64
    || !hex_part.bytes().all(|b| b.is_ascii_hexdigit())
  {
    return None;
  }
  Some(format!("sha256:{hex_part}"))
}

/// The only definition of "needs update" in the system (spec §4.4).
///
/// `None` digests (never resolved, or not yet checked) never produce an
/// update signal.
pub fn compute_has_update(
  current_digest: Option<&str>,
  latest_digest: Option<&str>,
) -> bool {
  match (
    current_digest.and_then(normalize),
    latest_digest.and_then(normalize),
  ) {
    (Some(current), Some(latest)) => current != latest,
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalizes_bare_hex() {
    let hex = "a".repeat(64);
    assert_eq!(normalize(&hex), Some(format!("sha256:{hex}")));
  }

  #[test]
  fn normalizes_mixed_case_prefixed() {
    let hex = "ABC123".to_string() + &"d".repeat(58);
    let input = format!("SHA256:{hex}");
    let expected = format!("sha256:{}", hex.to_lowercase());
    assert_eq!(normalize(&input), Some(expected));
  }

  #[test]
  fn rejects_wrong_length() {
    assert_eq!(normalize("sha256:abc"), None);
  }

  #[test]
  fn rejects_non_hex() {
    let bad = "g".repeat(64);
    assert_eq!(normalize(&bad), None);
  }

  #[test]
  fn idempotent() {
    let hex = "f".repeat(64);
    let once = normalize(&hex).unwrap();
    let twice = normalize(&once).unwrap();
    assert_eq!(once, twice);
  }

  #[test]
  fn has_update_requires_both_digests() {
    let a = format!("sha256:{}", "a".repeat(64));
    let b = format!("sha256:{}", "b".repeat(64));
    assert!(!compute_has_update(None, Some(&b)));
    assert!(!compute_has_update(Some(&a), None));
    assert!(!compute_has_update(Some(&a), Some(&a)));
    assert!(compute_has_update(Some(&a), Some(&b)));
  }

  #[test]
  fn has_update_case_insensitive() {
    let lower = format!("sha256:{}", "a".repeat(64));
    let upper = format!("SHA256:{}", "A".repeat(64));
    assert!(!compute_has_update(Some(&lower), Some(&upper)));
  }
}
