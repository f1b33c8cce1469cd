//! Small utility helpers used across modules.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Marker appended to any text cut down to its cap.
pub const ELLIPSIS: &str = "...";

/// Very small and safe string templating.
/// Replaces `{key}` placeholders in one pass; inserted values are never
/// scanned again, so a value containing `{other}` stays literal. Unknown
/// keys are left as they are.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  PLACEHOLDER_RE
    .replace_all(tpl, |caps: &Captures| {
      let key = &caps[1];
      match pairs.iter().find(|(k, _)| *k == key) {
        Some((_, v)) => v.to_string(),
        None => caps[0].to_string(),
      }
    })
    .into_owned()
}

/// Cut `s` to `cap` characters plus an ellipsis when it is longer than `cap`.
/// Counts chars, not bytes, so multi-byte text never splits mid-codepoint.
pub fn clamp_chars(s: &str, cap: usize) -> String {
  if s.chars().count() <= cap {
    return s.to_string();
  }
  let mut out: String = s.chars().take(cap).collect();
  out.push_str(ELLIPSIS);
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge generator payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    None => s.to_string(),
    Some((idx, _)) => format!("{}… ({} bytes total)", &s[..idx], s.len()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_every_key() {
    let out = fill_template("level {level} in {language}, level {level}", &[("level", "2"), ("language", "rust")]);
    assert_eq!(out, "level 2 in rust, level 2");
  }

  #[test]
  fn fill_template_does_not_expand_inside_values() {
    let out = fill_template("Q: {question} A: {answer} {unknown}", &[("question", "is {answer} right?"), ("answer", "42")]);
    assert_eq!(out, "Q: is {answer} right? A: 42 {unknown}");
  }

  #[test]
  fn clamp_chars_only_touches_long_text() {
    let long = "a".repeat(900);
    let clamped = clamp_chars(&long, 800);
    assert_eq!(clamped.chars().count(), 803);
    assert!(clamped.ends_with("..."));

    let short = "b".repeat(100);
    assert_eq!(clamp_chars(&short, 800), short);
  }

  #[test]
  fn trunc_for_log_respects_char_boundaries() {
    let s = "ééééé";
    let out = trunc_for_log(s, 2);
    assert!(out.starts_with("éé…"));
    assert_eq!(trunc_for_log("abc", 10), "abc");
  }
}
