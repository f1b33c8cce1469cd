//! Character-level scanners used by the repair passes and the post-processor.
//!
//! Each scanner is an explicit state machine over `char`s. None of them is a
//! JSON or JavaScript parser; they only know enough about string literals to
//! leave them alone (or to fix them up).

use std::iter::Peekable;
use std::str::Chars;

/// Position of the JSON string scanner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScanState {
  Normal,
  InString,
  Escape,
}

/// Apply `f` to every run of text outside double-quoted strings, copying the
/// strings themselves through untouched. An unterminated string swallows the
/// rest of the input.
pub fn map_outside_strings<F>(text: &str, mut f: F) -> String
where
  F: FnMut(&str) -> String,
{
  let mut out = String::with_capacity(text.len() + 8);
  let mut state = ScanState::Normal;
  let mut seg_start = 0;

  for (i, ch) in text.char_indices() {
    state = match state {
      ScanState::Normal if ch == '"' => {
        out.push_str(&f(&text[seg_start..i]));
        seg_start = i;
        ScanState::InString
      }
      ScanState::Normal => ScanState::Normal,
      ScanState::InString => match ch {
        '\\' => ScanState::Escape,
        '"' => {
          out.push_str(&text[seg_start..=i]);
          seg_start = i + 1;
          ScanState::Normal
        }
        _ => ScanState::InString,
      },
      ScanState::Escape => ScanState::InString,
    };
  }

  let tail = &text[seg_start..];
  if state == ScanState::Normal {
    out.push_str(&f(tail));
  } else {
    out.push_str(tail);
  }
  out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QuoteState {
  Normal,
  InDouble,
  DoubleEscape,
  InSingle,
  SingleEscape,
}

/// Rewrite single-quoted strings as double-quoted ones. Double-quoted runs are
/// copied verbatim (apostrophes inside them stay), `"` inside a single-quoted
/// run gets escaped and `\'` loses its now pointless escape.
pub fn single_to_double_quotes(text: &str) -> String {
  let mut out = String::with_capacity(text.len() + 8);
  let mut state = QuoteState::Normal;

  for ch in text.chars() {
    state = match (state, ch) {
      (QuoteState::Normal, '"') => {
        out.push('"');
        QuoteState::InDouble
      }
      (QuoteState::Normal, '\'') => {
        out.push('"');
        QuoteState::InSingle
      }
      (QuoteState::Normal, c) => {
        out.push(c);
        QuoteState::Normal
      }
      (QuoteState::InDouble, '\\') => {
        out.push('\\');
        QuoteState::DoubleEscape
      }
      (QuoteState::InDouble, '"') => {
        out.push('"');
        QuoteState::Normal
      }
      (QuoteState::InDouble, c) => {
        out.push(c);
        QuoteState::InDouble
      }
      (QuoteState::DoubleEscape, c) => {
        out.push(c);
        QuoteState::InDouble
      }
      (QuoteState::InSingle, '\\') => QuoteState::SingleEscape,
      (QuoteState::InSingle, '\'') => {
        out.push('"');
        QuoteState::Normal
      }
      (QuoteState::InSingle, '"') => {
        out.push_str("\\\"");
        QuoteState::InSingle
      }
      (QuoteState::InSingle, c) => {
        out.push(c);
        QuoteState::InSingle
      }
      (QuoteState::SingleEscape, '\'') => {
        out.push('\'');
        QuoteState::InSingle
      }
      (QuoteState::SingleEscape, c) => {
        out.push('\\');
        out.push(c);
        QuoteState::InSingle
      }
    };
  }
  if state == QuoteState::SingleEscape {
    out.push('\\');
  }
  out
}

/// Re-escape a string-bearing JSON text so interior quotes and lone
/// backslashes inside values stop terminating or corrupting them.
///
/// A `"` seen inside a string closes it only when the next non-blank char is
/// structural (`,` `}` `]` `:`) or the input ends; otherwise it is escaped.
/// A backslash already escaping `"` or `\` is kept, any other gets doubled.
/// Raw tabs and newlines inside strings become escapes, other control chars
/// are dropped.
pub fn reescape_string_quotes(text: &str) -> String {
  let chars: Vec<char> = text.chars().collect();
  let mut out = String::with_capacity(text.len() + 16);
  let mut state = ScanState::Normal;

  for (i, &ch) in chars.iter().enumerate() {
    state = match state {
      ScanState::Normal => {
        out.push(ch);
        if ch == '"' { ScanState::InString } else { ScanState::Normal }
      }
      ScanState::InString => match ch {
        '\\' if is_json_escape(&chars[i + 1..]) => {
          out.push('\\');
          ScanState::Escape
        }
        '\\' => {
          out.push_str("\\\\");
          ScanState::InString
        }
        '"' if closes_string(&chars[i + 1..]) => {
          out.push('"');
          ScanState::Normal
        }
        '"' => {
          out.push_str("\\\"");
          ScanState::InString
        }
        '\n' => {
          out.push_str("\\n");
          ScanState::InString
        }
        '\t' => {
          out.push_str("\\t");
          ScanState::InString
        }
        c if c.is_control() => ScanState::InString,
        c => {
          out.push(c);
          ScanState::InString
        }
      },
      ScanState::Escape => {
        out.push(ch);
        ScanState::InString
      }
    };
  }
  out
}

/// Whether `rest` (the text after a backslash) starts a valid JSON escape.
fn is_json_escape(rest: &[char]) -> bool {
  match rest.first() {
    Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't') => true,
    Some('u') => rest.len() >= 5 && rest[1..5].iter().all(|c| c.is_ascii_hexdigit()),
    _ => false,
  }
}

fn closes_string(rest: &[char]) -> bool {
  match rest.iter().find(|c| !c.is_whitespace()) {
    None => true,
    Some(c) => matches!(c, ',' | '}' | ']' | ':'),
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum JsState {
  Code,
  Str(char),
  StrEscape(char),
  LineComment,
  BlockComment,
}

/// Remove `//` and `/* */` comments from JavaScript-like source. String and
/// template literals are respected, so `"http://x"` survives. Lines that held
/// nothing but a comment disappear; lines that kept code lose trailing blanks.
pub fn strip_js_comments(code: &str) -> String {
  let mut out = String::with_capacity(code.len());
  let mut touched: Vec<bool> = vec![false];
  let mut state = JsState::Code;
  let mut chars: Peekable<Chars<'_>> = code.chars().peekable();

  while let Some(ch) = chars.next() {
    state = match state {
      JsState::Code => match (ch, chars.peek()) {
        ('/', Some('/')) => {
          chars.next();
          mark_current_line(&mut touched);
          JsState::LineComment
        }
        ('/', Some('*')) => {
          chars.next();
          mark_current_line(&mut touched);
          JsState::BlockComment
        }
        ('"', _) | ('\'', _) | ('`', _) => {
          out.push(ch);
          JsState::Str(ch)
        }
        _ => {
          push_tracked(&mut out, &mut touched, ch);
          JsState::Code
        }
      },
      JsState::Str(q) => {
        push_tracked(&mut out, &mut touched, ch);
        if ch == '\\' {
          JsState::StrEscape(q)
        } else if ch == q || (ch == '\n' && q != '`') {
          JsState::Code
        } else {
          JsState::Str(q)
        }
      }
      JsState::StrEscape(q) => {
        push_tracked(&mut out, &mut touched, ch);
        JsState::Str(q)
      }
      JsState::LineComment => {
        if ch == '\n' {
          push_tracked(&mut out, &mut touched, ch);
          JsState::Code
        } else {
          JsState::LineComment
        }
      }
      JsState::BlockComment => {
        if ch == '*' && chars.peek() == Some(&'/') {
          chars.next();
          JsState::Code
        } else {
          JsState::BlockComment
        }
      }
    };
  }

  out
    .split('\n')
    .zip(touched.iter())
    .filter(|(line, was_touched)| !(**was_touched && line.trim().is_empty()))
    .map(|(line, was_touched)| if *was_touched { line.trim_end() } else { line })
    .collect::<Vec<_>>()
    .join("\n")
}

fn mark_current_line(touched: &mut [bool]) {
  if let Some(last) = touched.last_mut() {
    *last = true;
  }
}

fn push_tracked(out: &mut String, touched: &mut Vec<bool>, ch: char) {
  out.push(ch);
  if ch == '\n' {
    touched.push(false);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn map_outside_strings_leaves_string_bodies_alone() {
    let out = map_outside_strings(r#"{a: "b: c", d: 1}"#, |s| s.to_uppercase());
    assert_eq!(out, r#"{A: "b: c", D: 1}"#);
  }

  #[test]
  fn map_outside_strings_handles_escaped_quotes() {
    let out = map_outside_strings(r#"x "say \"hi\" x" x"#, |s| s.replace('x', "y"));
    assert_eq!(out, r#"y "say \"hi\" x" y"#);
  }

  #[test]
  fn single_quotes_become_double() {
    let out = single_to_double_quotes(r#"{'title': 'It\'s "on"', "note": "don't"}"#);
    assert_eq!(out, r#"{"title": "It's \"on\"", "note": "don't"}"#);
    assert!(serde_json::from_str::<serde_json::Value>(&out).is_ok());
  }

  #[test]
  fn reescape_fixes_interior_quotes() {
    let broken = r#"{"code": "print("hi")", "n": 1}"#;
    let fixed = reescape_string_quotes(broken);
    let v: serde_json::Value = serde_json::from_str(&fixed).expect("parses after rescan");
    assert_eq!(v["code"], r#"print("hi")"#);
  }

  #[test]
  fn reescape_doubles_lone_backslashes_and_escapes_raw_newlines() {
    let broken = "{\"path\": \"C:\\dir\nnext\"}";
    let fixed = reescape_string_quotes(broken);
    let v: serde_json::Value = serde_json::from_str(&fixed).expect("parses after rescan");
    assert_eq!(v["path"], "C:\\dir\nnext");
  }

  #[test]
  fn reescape_keeps_valid_escapes() {
    let broken = r#"{"msg": "say "hi"\tthen\nbye \u00e9 a\/b"}"#;
    let fixed = reescape_string_quotes(broken);
    let v: serde_json::Value = serde_json::from_str(&fixed).expect("parses after rescan");
    assert_eq!(v["msg"], "say \"hi\"\tthen\nbye \u{e9} a/b");
  }

  #[test]
  fn reescape_is_identity_on_plain_json() {
    let ok = r#"{"a": ["x", "y"], "b": "say \"hi\""}"#;
    assert_eq!(reescape_string_quotes(ok), ok);
  }

  #[test]
  fn strip_js_comments_drops_comment_lines() {
    let src = "function f() {\n  // comment\n  return 1;\n}";
    let out = strip_js_comments(src);
    assert!(!out.contains("//"));
    assert_eq!(out, "function f() {\n  return 1;\n}");
  }

  #[test]
  fn strip_js_comments_keeps_strings_and_inline_code() {
    let src = "const url = \"http://x\"; /* note */ let y = 2; // tail\n/*\n block\n*/\nconsole.log(url);";
    let out = strip_js_comments(src);
    assert_eq!(out, "const url = \"http://x\";  let y = 2;\nconsole.log(url);");
  }
}
