//! Schema post-processing of parsed generator output.
//!
//! Works on the raw JSON mapping, before typing, so that stringly or sloppy
//! values can still be coerced. Rules that can be satisfied by normalizing are
//! applied silently; rules that can't (too few blanks, an unrecognizable
//! challenge type, a non-boolean verdict) become `SchemaViolation`, which
//! makes the orchestrator try a fresh generation.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::config::PipelineSettings;
use crate::domain::{ChallengeType, ContentKind, Difficulty};
use crate::error::PipelineError;
use crate::scan::strip_js_comments;
use crate::util::clamp_chars;

/// Placeholder for one fill-in-the-blank slot.
pub const BLANK_MARKER: &str = "_____";
pub const MIN_BLANKS: usize = 2;
pub const OPTION_COUNT: usize = 4;

const CODE_FIELDS: [&str; 3] = ["template", "answer", "code"];
const CHALLENGE_TEXT_FIELDS: [&str; 6] = ["question", "answer", "hint", "explanation", "template", "code"];
const STORY_TEXT_FIELDS: [&str; 5] = ["title", "story", "objective", "setting", "character"];

static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{5,}").unwrap());
static FENCED_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\n?(.*?)```").unwrap());
static OPTION_LABEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\(?[A-Da-d][\).:]\s+").unwrap());
static LETTER_ANSWER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\(?([A-Da-d])[\).:]?$").unwrap());

/// Line prefixes that mark a question line as source code rather than prose.
const CODE_LINE_PREFIXES: &[&str] = &[
  "def ", "function ", "return", "for ", "for(", "while ", "while(", "if ", "if(", "elif ", "else:", "else {",
  "const ", "let ", "var ", "class ", "import ", "from ", "print(", "console.log", "public ", "private ",
  "static ", "#include", "fn ", "}", "{",
];

/// Inputs the rules depend on besides the mapping itself.
#[derive(Clone, Copy, Debug)]
pub struct PostContext<'a> {
  pub settings: &'a PipelineSettings,
  pub language: &'a str,
  pub level: u8,
}

pub fn post_process(
  map: Map<String, Value>,
  kind: ContentKind,
  ctx: &PostContext<'_>,
) -> Result<Map<String, Value>, PipelineError> {
  match kind {
    ContentKind::Story => process_story(map, ctx),
    ContentKind::Challenge => process_challenge(map, ctx),
    ContentKind::Feedback => process_feedback(map, ctx),
  }
}

fn process_story(mut map: Map<String, Value>, ctx: &PostContext<'_>) -> Result<Map<String, Value>, PipelineError> {
  for key in STORY_TEXT_FIELDS {
    coerce_text(&mut map, key);
  }
  for key in ["setting", "character"] {
    drop_if_blank(&mut map, key);
  }
  clamp_fields(&mut map, ContentKind::Story, ctx.settings);
  Ok(map)
}

fn process_feedback(mut map: Map<String, Value>, ctx: &PostContext<'_>) -> Result<Map<String, Value>, PipelineError> {
  if let Some(raw) = map.get("is_correct") {
    let verdict = coerce_bool(raw).ok_or_else(|| PipelineError::schema(format!("is_correct is not a boolean: {raw}")))?;
    map.insert("is_correct".into(), Value::Bool(verdict));
  }
  coerce_text(&mut map, "feedback");
  coerce_text(&mut map, "next_hint");
  drop_if_blank(&mut map, "next_hint");
  clamp_fields(&mut map, ContentKind::Feedback, ctx.settings);
  Ok(map)
}

fn process_challenge(mut map: Map<String, Value>, ctx: &PostContext<'_>) -> Result<Map<String, Value>, PipelineError> {
  if let Some(Value::Array(items)) = map.get("answer") {
    let joined = items.iter().filter_map(scalar_to_string).collect::<Vec<_>>().join(", ");
    map.insert("answer".into(), Value::String(joined));
  }
  for key in CHALLENGE_TEXT_FIELDS {
    coerce_text(&mut map, key);
  }

  let ctype = resolve_challenge_type(&map)?;
  map.insert("type".into(), Value::String(ctype.as_str().into()));

  for key in CODE_FIELDS {
    map_str(&mut map, key, restore_newlines);
  }

  move_code_out_of_question(&mut map, ctype);

  match ctype {
    ChallengeType::FillInBlank => {
      map.remove("options");
    }
    ChallengeType::MultipleChoice => {
      if let Some(template) = map.remove("template") {
        if str_field(&map, "code").is_none() {
          map.insert("code".into(), template);
        }
      }
    }
  }
  drop_if_blank(&mut map, "code");

  if is_js_flavored(ctx.language) {
    for key in CODE_FIELDS {
      map_str(&mut map, key, normalize_js_code);
    }
  }

  let caps = &ctx.settings.caps.challenge;
  match ctype {
    ChallengeType::FillInBlank => enforce_blanks(&mut map, caps)?,
    ChallengeType::MultipleChoice => {
      enforce_options(&mut map, &ctx.settings.placeholder_options, caps.get("options").copied())
    }
  }
  clamp_fields(&mut map, ContentKind::Challenge, ctx.settings);

  fill_level_defaults(&mut map, ctx);
  Ok(map)
}

fn resolve_challenge_type(map: &Map<String, Value>) -> Result<ChallengeType, PipelineError> {
  let declared = map.get("type").and_then(Value::as_str);
  if let Some(t) = declared.and_then(ChallengeType::parse_loose) {
    return Ok(t);
  }
  let has_options = matches!(map.get("options"), Some(Value::Array(a)) if !a.is_empty());
  let has_blanks = str_field(map, "template").map(|t| t.contains(BLANK_MARKER)).unwrap_or(false);
  match (has_options, has_blanks) {
    (true, false) => Ok(ChallengeType::MultipleChoice),
    (false, true) => Ok(ChallengeType::FillInBlank),
    _ => Err(PipelineError::schema(format!(
      "unsupported challenge type {:?}",
      declared.unwrap_or("<missing>")
    ))),
  }
}

/// Undo the newline flattening of the repair chain: literal `\n` pairs become
/// real line breaks again.
pub fn restore_newlines(s: &str) -> String {
  s.replace("\\r\\n", "\n").replace("\\n", "\n")
}

fn is_js_flavored(language: &str) -> bool {
  matches!(
    language.trim().to_lowercase().as_str(),
    "javascript" | "js" | "typescript" | "ts" | "node" | "nodejs"
  )
}

/// Unescape leftover `\"` and `\t`, then drop comments.
pub fn normalize_js_code(code: &str) -> String {
  let unescaped = code.replace("\\\"", "\"").replace("\\t", "\t");
  strip_js_comments(&unescaped)
}

fn move_code_out_of_question(map: &mut Map<String, Value>, ctype: ChallengeType) {
  let Some(question) = str_field(map, "question") else { return };
  let Some((narrative, code)) = split_code_from_question(&question) else { return };

  map.insert("question".into(), Value::String(narrative));
  let template_usable = str_field(map, "template").map(|t| t.contains(BLANK_MARKER)).unwrap_or(false);
  if ctype == ChallengeType::FillInBlank && !template_usable {
    map.insert("template".into(), Value::String(code));
  } else if str_field(map, "code").is_none() {
    map.insert("code".into(), Value::String(code));
  }
}

/// Separate an embedded code block from the question prose. A fenced block
/// wins; otherwise the first run of at least two code-looking lines counts.
/// Returns `None` when there is no code, or when nothing but code would be left.
pub fn split_code_from_question(question: &str) -> Option<(String, String)> {
  let question = restore_newlines(question);

  if let Some(caps) = FENCED_CODE_RE.captures(&question) {
    let code = caps.get(1).map_or("", |m| m.as_str()).trim_matches('\n').trim_end().to_string();
    let narrative = FENCED_CODE_RE.replace(&question, " ");
    let narrative = collapse_blank_lines(&narrative);
    if code.trim().is_empty() || narrative.is_empty() {
      return None;
    }
    return Some((narrative, code));
  }

  let lines: Vec<&str> = question.lines().collect();
  let mut run: Option<(usize, usize)> = None;
  let mut i = 0;
  while i < lines.len() {
    if looks_like_code(lines[i]) {
      let start = i;
      while i < lines.len() && looks_like_code(lines[i]) {
        i += 1;
      }
      if i - start >= 2 {
        run = Some((start, i));
        break;
      }
    } else {
      i += 1;
    }
  }

  let (start, end) = run?;
  let code = lines[start..end].join("\n").trim_end().to_string();
  let narrative_lines: Vec<&str> = lines[..start].iter().chain(lines[end..].iter()).copied().collect();
  let narrative = collapse_blank_lines(&narrative_lines.join("\n"));
  if narrative.is_empty() {
    return None;
  }
  Some((narrative, code))
}

fn looks_like_code(line: &str) -> bool {
  let trimmed = line.trim();
  if trimmed.is_empty() {
    return false;
  }
  let indented = line.starts_with("  ") || line.starts_with('\t');
  let keyword = CODE_LINE_PREFIXES.iter().any(|p| trimmed.starts_with(p));
  let punct = trimmed.ends_with('{') || trimmed.ends_with('}') || trimmed.ends_with(';');
  let assignment = trimmed.contains(" = ") && !trimmed.ends_with('?') && !trimmed.ends_with('.');
  indented || keyword || punct || assignment
}

fn collapse_blank_lines(s: &str) -> String {
  s.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join("\n")
}

/// Blanks and answer segments must line up, so neither field may be cut: text
/// over its cap is a violation rather than a truncation.
fn enforce_blanks(map: &mut Map<String, Value>, caps: &BTreeMap<String, usize>) -> Result<(), PipelineError> {
  for key in ["template", "answer"] {
    let len = map.get(key).and_then(Value::as_str).map_or(0, |s| s.chars().count());
    if let Some(&cap) = caps.get(key) {
      if len > cap {
        return Err(PipelineError::schema(format!("{key} is {len} chars, cap is {cap}")));
      }
    }
  }
  let template = str_field(map, "template").ok_or_else(|| PipelineError::schema("fill-in-blank without template"))?;
  let template = BLANK_RUN_RE.replace_all(&template, BLANK_MARKER).into_owned();
  let blanks = template.matches(BLANK_MARKER).count();
  if blanks < MIN_BLANKS {
    return Err(PipelineError::schema(format!("template has {blanks} blank(s), need at least {MIN_BLANKS}")));
  }
  map.insert("template".into(), Value::String(template));

  let answer = str_field(map, "answer").unwrap_or_default();
  let parts = split_answer(&answer);
  let parts = if parts.len() == blanks && parts.iter().all(|p| !p.is_empty()) {
    parts
  } else {
    rederive_answer(&answer, blanks)
      .ok_or_else(|| PipelineError::schema(format!("answer {answer:?} does not fill {blanks} blanks")))?
  };
  map.insert("answer".into(), Value::String(parts.join(", ")));
  Ok(())
}

fn split_answer(answer: &str) -> Vec<String> {
  answer.split(',').map(|p| p.trim().to_string()).collect()
}

/// Whitespace split into exactly `blanks` segments; the last one keeps the rest.
fn rederive_answer(answer: &str, blanks: usize) -> Option<Vec<String>> {
  let words: Vec<&str> = answer
    .split_whitespace()
    .map(|w| w.trim_matches(','))
    .filter(|w| !w.is_empty())
    .collect();
  if words.len() < blanks {
    return None;
  }
  let mut parts: Vec<String> = words[..blanks - 1].iter().map(|w| w.to_string()).collect();
  parts.push(words[blanks - 1..].join(" "));
  let consistent = split_answer(&parts.join(", ")).len() == blanks;
  consistent.then_some(parts)
}

/// Options and answer are cut to the same `option_cap`, so an answer that
/// matched an option still matches it afterwards.
fn enforce_options(map: &mut Map<String, Value>, placeholders: &[String], option_cap: Option<usize>) {
  let cap = |s: String| match option_cap {
    Some(c) => clamp_chars(&s, c),
    None => s,
  };
  let mut options: Vec<String> = match map.get("options") {
    Some(Value::Array(items)) => items.iter().filter_map(scalar_to_string).collect(),
    Some(Value::String(s)) => s.lines().map(str::to_string).collect(),
    _ => Vec::new(),
  };
  options = options.iter().map(|o| cap(strip_option_label(o))).filter(|o| !o.is_empty()).collect();
  dedup_case_insensitive(&mut options);

  // Literal text first: options may themselves be named "C" or "B".
  let raw_answer = cap(str_field(map, "answer").unwrap_or_default().trim().to_string());
  let stripped = cap(strip_option_label(&raw_answer));
  let matching = |needle: &str| options.iter().find(|o| o.eq_ignore_ascii_case(needle)).cloned();
  let mut answer = matching(&raw_answer)
    .or_else(|| matching(&stripped))
    .or_else(|| letter_index(&raw_answer).and_then(|idx| options.get(idx).cloned()))
    .unwrap_or(stripped);

  let answer_pos = options.iter().position(|o| o.eq_ignore_ascii_case(&answer));
  if options.len() > OPTION_COUNT {
    options = match answer_pos {
      Some(pos) => {
        let mut keep: Vec<usize> = (0..options.len()).filter(|&i| i != pos).take(OPTION_COUNT - 1).collect();
        keep.push(pos);
        keep.sort_unstable();
        keep.into_iter().map(|i| options[i].clone()).collect()
      }
      None => options.into_iter().take(OPTION_COUNT).collect(),
    };
  }

  let mut fillers = placeholders.iter().cloned().chain((1..).map(|n| format!("Option {n}")));
  while options.len() < OPTION_COUNT {
    let Some(filler) = fillers.next() else { break };
    if !options.iter().any(|o| o.eq_ignore_ascii_case(&filler)) {
      options.push(filler);
    }
  }

  if !answer.is_empty() {
    let exact = options.iter().find(|o| o.eq_ignore_ascii_case(&answer)).cloned();
    match exact {
      Some(exact) => answer = exact,
      None => {
        if let Some(last) = options.last_mut() {
          *last = answer.clone();
        }
      }
    }
  }

  map.insert("options".into(), Value::Array(options.into_iter().map(Value::String).collect()));
  map.insert("answer".into(), Value::String(answer));
}

fn strip_option_label(s: &str) -> String {
  OPTION_LABEL_RE.replace(s.trim(), "").trim().to_string()
}

fn letter_index(answer: &str) -> Option<usize> {
  let caps = LETTER_ANSWER_RE.captures(answer)?;
  let letter = caps.get(1)?.as_str().chars().next()?.to_ascii_uppercase();
  Some((letter as u8 - b'A') as usize)
}

fn dedup_case_insensitive(items: &mut Vec<String>) {
  let mut seen: Vec<String> = Vec::with_capacity(items.len());
  items.retain(|item| {
    let key = item.to_lowercase();
    if seen.contains(&key) {
      false
    } else {
      seen.push(key);
      true
    }
  });
}

fn fill_level_defaults(map: &mut Map<String, Value>, ctx: &PostContext<'_>) {
  let defaults = ctx.settings.level_defaults(ctx.level);

  let difficulty = map
    .get("difficulty")
    .and_then(Value::as_str)
    .and_then(Difficulty::parse_loose)
    .unwrap_or(defaults.difficulty);
  map.insert("difficulty".into(), Value::String(difficulty.as_str().into()));

  let xp = map.get("xp_reward").and_then(coerce_u32).unwrap_or(defaults.xp_reward);
  map.insert("xp_reward".into(), Value::from(ctx.settings.xp_range.clamp(xp)));
}

fn clamp_fields(map: &mut Map<String, Value>, kind: ContentKind, settings: &PipelineSettings) {
  for (key, &cap) in settings.caps.for_kind(kind) {
    match map.get_mut(key.as_str()) {
      Some(Value::String(s)) => {
        if s.chars().count() > cap {
          *s = clamp_chars(s, cap);
        }
      }
      Some(Value::Array(items)) => {
        for item in items.iter_mut() {
          if let Value::String(s) = item {
            if s.chars().count() > cap {
              *s = clamp_chars(s, cap);
            }
          }
        }
      }
      _ => {}
    }
  }
}

fn str_field(map: &Map<String, Value>, key: &str) -> Option<String> {
  map.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty()).map(str::to_string)
}

fn map_str(map: &mut Map<String, Value>, key: &str, f: impl Fn(&str) -> String) {
  if let Some(Value::String(s)) = map.get_mut(key) {
    *s = f(s);
  }
}

/// Numbers and booleans in text fields become strings; null disappears.
fn coerce_text(map: &mut Map<String, Value>, key: &str) {
  match map.get(key) {
    Some(Value::Null) => {
      map.remove(key);
    }
    Some(Value::Number(_)) | Some(Value::Bool(_)) => {
      if let Some(s) = map.get(key).and_then(scalar_to_string) {
        map.insert(key.into(), Value::String(s));
      }
    }
    _ => {}
  }
}

fn drop_if_blank(map: &mut Map<String, Value>, key: &str) {
  let blank = match map.get(key) {
    Some(Value::String(s)) => s.trim().is_empty(),
    Some(Value::Null) => true,
    _ => false,
  };
  if blank {
    map.remove(key);
  }
}

fn scalar_to_string(v: &Value) -> Option<String> {
  match v {
    Value::String(s) => Some(s.trim().to_string()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

fn coerce_bool(v: &Value) -> Option<bool> {
  match v {
    Value::Bool(b) => Some(*b),
    Value::Number(n) => match n.as_i64() {
      Some(1) => Some(true),
      Some(0) => Some(false),
      _ => None,
    },
    Value::String(s) => match s.trim().to_lowercase().as_str() {
      "true" | "yes" | "correct" | "1" => Some(true),
      "false" | "no" | "incorrect" | "wrong" | "0" => Some(false),
      _ => None,
    },
    _ => None,
  }
}

fn coerce_u32(v: &Value) -> Option<u32> {
  match v {
    Value::Number(n) => n
      .as_u64()
      .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
      .map(|n| n.min(u32::MAX as u64) as u32),
    Value::String(s) => s.trim().parse::<u32>().ok(),
    _ => None,
  }
}
