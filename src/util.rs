//! Small utility helpers used across modules.

/// Lowercase ASCII slug: alphanumeric runs kept, everything between them
/// collapsed to single dashes. Non-ASCII characters are dropped.
pub fn slugify(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut pending_dash = false;
  for ch in s.chars() {
    if ch.is_ascii_alphanumeric() {
      if pending_dash && !out.is_empty() {
        out.push('-');
      }
      pending_dash = false;
      out.push(ch.to_ascii_lowercase());
    } else {
      pending_dash = true;
    }
  }
  out
}

/// Log-safe truncation for large strings (snapshot payloads).
/// Avoids spamming logs with huge request bodies; cuts on a char boundary.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while cut > 0 && !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slugify_collapses_separators() {
    assert_eq!(slugify("Caesar Salad"), "caesar-salad");
    assert_eq!(slugify("  SQL -- Injection 101!"), "sql-injection-101");
    assert_eq!(slugify("already-a-slug"), "already-a-slug");
  }

  #[test]
  fn trunc_keeps_short_strings_intact() {
    assert_eq!(trunc_for_log("short", 32), "short");
    assert!(trunc_for_log(&"x".repeat(64), 8).starts_with("xxxxxxxx…"));
  }
}
