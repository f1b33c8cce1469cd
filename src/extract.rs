//! Locating the JSON object inside a chatty generator reply.
//!
//! Boundaries are the first `{` and the last `}`. There is no brace balancing:
//! braces inside string values are tolerated, but a brace in the commentary
//! around the object will widen the region and the repair chain gets a
//! corrupted candidate. The repair passes were tuned against this shape.

/// Slice of `text` from the first `{` through the last `}`, inclusive.
pub fn extract_json_region(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let end = text.rfind('}')?;
  if end < start {
    return None;
  }
  Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strips_commentary_around_object() {
    let body = r#""title": "Quest", "story": "Go {north}""#;
    let text = format!("Sure! Here is your JSON:\n{{{body}}}\nHope it helps.");
    assert_eq!(extract_json_region(&text), Some(format!("{{{body}}}").as_str()));
  }

  #[test]
  fn missing_or_reversed_braces_yield_none() {
    assert_eq!(extract_json_region("no json here"), None);
    assert_eq!(extract_json_region("only { open"), None);
    assert_eq!(extract_json_region("} reversed {"), None);
  }

  #[test]
  fn stray_brace_in_commentary_widens_region() {
    let text = "Use {braces} wisely: {\"a\": 1}";
    assert_eq!(extract_json_region(text), Some("{braces} wisely: {\"a\": 1}"));
  }
}
