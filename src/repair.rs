//! Heuristic JSON repair for generator output.
//!
//! The engine owns a fixed set of pure text passes and an ordered list of
//! plans (compositions of those passes). The untouched candidate is parsed
//! first, then each plan in turn; the first text that parses as a JSON object
//! wins. Lossless plans run before the ones that flatten newlines or rewrite
//! backslashes, so well-behaved code samples keep their line structure.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::scan::{map_outside_strings, reescape_string_quotes, single_to_double_quotes};

static FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[A-Za-z0-9_+-]*").unwrap());
static BARE_KEY_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"([{,]\s*)([A-Za-z_$][A-Za-z0-9_$-]*)(\s*):").unwrap());
static TRAILING_COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());
static QUOTE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""{3,}"#).unwrap());
static DOUBLED_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""{2}(\w)"#).unwrap());
static DOUBLED_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(\w)"{2}"#).unwrap());

/// One rewrite step. Steps never look at each other's output format; each is
/// a no-op when its malformation is absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
  StripFences,
  QuoteKeys,
  NormalizeQuotes,
  CollapseNewlines,
  EscapeBackslashes,
  TrailingCommas,
  RescanQuotes,
}

impl Pass {
  pub fn apply(&self, text: &str) -> String {
    match self {
      Pass::StripFences => FENCE_RE.replace_all(text, "").into_owned(),
      Pass::QuoteKeys => map_outside_strings(text, |run| {
        BARE_KEY_RE.replace_all(run, "${1}\"${2}\"${3}:").into_owned()
      }),
      Pass::NormalizeQuotes => single_to_double_quotes(&drop_control_chars(text)),
      Pass::CollapseNewlines => text.replace("\r\n", " ").replace(['\n', '\r'], " "),
      Pass::EscapeBackslashes => text.replace('\\', "\\\\").replace("\\\\\"", "\\\""),
      Pass::TrailingCommas => map_outside_strings(text, |run| {
        TRAILING_COMMA_RE.replace_all(run, "$1").into_owned()
      }),
      Pass::RescanQuotes => reescape_string_quotes(&collapse_duplicate_quotes(text)),
    }
  }
}

/// A named composition of passes, applied in the listed order.
#[derive(Debug)]
struct Plan {
  name: &'static str,
  passes: &'static [Pass],
}

use Pass::*;

const PLANS: &[Plan] = &[
  Plan { name: "fences", passes: &[StripFences] },
  Plan { name: "bare_keys", passes: &[StripFences, QuoteKeys] },
  Plan { name: "quotes", passes: &[StripFences, QuoteKeys, NormalizeQuotes] },
  Plan { name: "lossless_commas", passes: &[StripFences, QuoteKeys, NormalizeQuotes, TrailingCommas] },
  Plan {
    name: "lossless_rescan",
    passes: &[StripFences, QuoteKeys, NormalizeQuotes, TrailingCommas, RescanQuotes],
  },
  Plan { name: "newlines", passes: &[StripFences, QuoteKeys, NormalizeQuotes, CollapseNewlines] },
  Plan {
    name: "backslashes",
    passes: &[StripFences, QuoteKeys, NormalizeQuotes, CollapseNewlines, EscapeBackslashes],
  },
  Plan {
    name: "commas",
    passes: &[StripFences, QuoteKeys, NormalizeQuotes, CollapseNewlines, EscapeBackslashes, TrailingCommas],
  },
  Plan {
    name: "full",
    passes: &[
      StripFences,
      QuoteKeys,
      NormalizeQuotes,
      CollapseNewlines,
      EscapeBackslashes,
      TrailingCommas,
      RescanQuotes,
    ],
  },
];

/// Parseable JSON text plus what it parsed into.
#[derive(Clone, Debug)]
pub struct RepairedJson {
  pub text: String,
  pub value: Map<String, Value>,
  /// Name of the plan that produced `text` (`as_is` when nothing was needed).
  pub plan: &'static str,
}

/// Run the plans over `candidate` until one yields a JSON object.
#[instrument(level = "debug", target = "pipeline", skip(candidate), fields(candidate_len = candidate.len()))]
pub fn repair(candidate: &str) -> Option<RepairedJson> {
  if let Some(value) = parse_object(candidate) {
    return Some(RepairedJson { text: candidate.to_string(), value, plan: "as_is" });
  }

  for plan in PLANS {
    let text = plan.passes.iter().fold(candidate.to_string(), |acc, pass| pass.apply(&acc));
    if let Some(value) = parse_object(&text) {
      debug!(target: "pipeline", plan = plan.name, "Repair plan produced valid JSON");
      return Some(RepairedJson { text, value, plan: plan.name });
    }
  }

  debug!(target: "pipeline", plans = PLANS.len(), "Every repair plan failed");
  None
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
  match serde_json::from_str::<Value>(text) {
    Ok(Value::Object(map)) => Some(map),
    _ => None,
  }
}

/// Drop ASCII control characters except tab and newline, plus DEL.
fn drop_control_chars(text: &str) -> String {
  text
    .chars()
    .filter(|&c| !((c <= '\u{1f}' && c != '\t' && c != '\n') || c == '\u{7f}'))
    .collect()
}

/// `"""x` and `""x""` style stutters collapse to a single quote. A lone `""`
/// between structural characters is an empty string and is left alone.
fn collapse_duplicate_quotes(text: &str) -> String {
  let s = QUOTE_RUN_RE.replace_all(text, "\"");
  let s = DOUBLED_OPEN_RE.replace_all(&s, "\"$1");
  DOUBLED_CLOSE_RE.replace_all(&s, "$1\"").into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn valid_json_comes_back_unchanged() {
    let ok = r#"{"title": "Quest", "tags": ["a", "b"], "xp": 10}"#;
    let first = repair(ok).expect("valid json");
    assert_eq!(first.text, ok);
    assert_eq!(first.plan, "as_is");
    let second = repair(&first.text).expect("still valid");
    assert_eq!(second.text, first.text);
  }

  #[test]
  fn bare_keys_and_single_quotes_are_fixed() {
    let candidate = r#"{title: 'Level 1 Quest', story: "Explore the cave", objective: "Find the key"}"#;
    let fixed = repair(candidate).expect("repairable");
    assert_eq!(fixed.plan, "quotes");
    assert_eq!(fixed.value["title"], "Level 1 Quest");
    assert_eq!(fixed.value["story"], "Explore the cave");
    assert_eq!(fixed.value["objective"], "Find the key");
  }

  #[test]
  fn trailing_commas_are_removed() {
    let fixed = repair(r#"{"a": [1, 2,], "b": "x, }",}"#).expect("repairable");
    assert_eq!(fixed.plan, "lossless_commas");
    assert_eq!(fixed.value["a"], serde_json::json!([1, 2]));
    assert_eq!(fixed.value["b"], "x, }");
  }

  #[test]
  fn raw_newlines_in_code_survive_lossless_plan() {
    let candidate = "{\"code\": \"def f():\n    return 1\", \"n\": 1}";
    let fixed = repair(candidate).expect("repairable");
    assert_eq!(fixed.plan, "lossless_rescan");
    assert_eq!(fixed.value["code"], "def f():\n    return 1");
  }

  #[test]
  fn unescaped_backslash_is_escaped() {
    let fixed = repair(r#"{"pattern": "\d+"}"#).expect("repairable");
    assert_eq!(fixed.value["pattern"], "\\d+");
  }

  #[test]
  fn interior_quotes_in_values_are_escaped() {
    let fixed = repair(r#"{"answer": "print("done")", "hint": "use print"}"#).expect("repairable");
    assert_eq!(fixed.value["answer"], r#"print("done")"#);
  }

  #[test]
  fn escapes_next_to_interior_quotes_keep_their_meaning() {
    let fixed = repair(r#"{"question": "Use "print" here", "hint": "line one\nline two é"}"#).expect("repairable");
    assert_eq!(fixed.value["question"], r#"Use "print" here"#);
    assert_eq!(fixed.value["hint"], "line one\nline two \u{e9}");
  }

  #[test]
  fn fence_markers_inside_candidate_are_stripped() {
    let fixed = repair("{\"a\": 1 ```}").expect("repairable");
    assert_eq!(fixed.plan, "fences");
  }

  #[test]
  fn hopeless_text_gives_none() {
    assert!(repair("{this is not json at all}").is_none());
    assert!(repair("[1, 2, 3]").is_none());
  }

  #[test]
  fn escape_backslashes_keeps_quote_escapes() {
    assert_eq!(Pass::EscapeBackslashes.apply(r#"x\y \"q\""#), r#"x\\y \"q\""#);
  }

  #[test]
  fn duplicate_quotes_collapse_but_empty_strings_stay() {
    assert_eq!(collapse_duplicate_quotes(r#"{"a": ""word"", "b": ""}"#), r#"{"a": "word", "b": ""}"#);
  }

  #[test]
  fn control_chars_are_dropped_except_tab_and_newline() {
    assert_eq!(drop_control_chars("a\u{0}b\tc\nd\u{7f}e\u{1b}"), "ab\tc\nde");
  }
}
