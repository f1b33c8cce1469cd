//! Fallback records served when every generation attempt failed.
//!
//! The built-in set guarantees a usable answer for any story or challenge
//! request even with no config and no working generator. Extra records from
//! configuration are accepted only after the same post-processing and
//! validation that generated content gets.

use rand::seq::SliceRandom;
use tracing::{error, info};

use crate::config::{FallbackCfg, FallbackEntryCfg, PipelineSettings};
use crate::domain::{
  ChallengeRecord, ChallengeType, ContentKind, ContentRecord, Difficulty, GenerationRequest, StoryRecord,
};
use crate::postprocess::{post_process, PostContext};
use crate::validate::into_record;

#[derive(Clone, Debug)]
struct StoryEntry {
  level: u8,
  record: StoryRecord,
}

#[derive(Clone, Debug)]
struct ChallengeEntry {
  level: u8,
  language: String,
  record: ChallengeRecord,
}

/// Immutable lookup table of fallback records, keyed by kind, subtype, level
/// and (for challenges) language.
#[derive(Clone, Debug)]
pub struct FallbackTable {
  stories: Vec<StoryEntry>,
  challenges: Vec<ChallengeEntry>,
}

impl Default for FallbackTable {
  fn default() -> Self {
    Self { stories: seed_stories(), challenges: seed_challenges() }
  }
}

impl FallbackTable {
  /// Built-ins plus every configured entry that survives normalization.
  pub fn with_config(cfg: &FallbackCfg, settings: &PipelineSettings) -> Self {
    let mut table = Self::default();
    for entry in &cfg.stories {
      match normalize_entry(entry, ContentKind::Story, settings) {
        Ok(ContentRecord::Story(record)) => table.stories.push(StoryEntry { level: entry.level, record }),
        Ok(_) => {}
        Err(e) => error!(target: "pipeline", level = entry.level, error = %e, "Skipping invalid fallback story"),
      }
    }
    for entry in &cfg.challenges {
      match normalize_entry(entry, ContentKind::Challenge, settings) {
        Ok(ContentRecord::Challenge(record)) => table.challenges.push(ChallengeEntry {
          level: entry.level,
          language: entry_language(entry).to_string(),
          record,
        }),
        Ok(_) => {}
        Err(e) => error!(target: "pipeline", level = entry.level, error = %e, "Skipping invalid fallback challenge"),
      }
    }
    info!(
      target: "pipeline",
      stories = table.stories.len(),
      challenges = table.challenges.len(),
      "Fallback table ready"
    );
    table
  }

  /// Fallback for a request, or `None` for kinds that have no fallback (feedback).
  pub fn lookup(&self, req: &GenerationRequest) -> Option<ContentRecord> {
    match req.kind {
      ContentKind::Story => self.story(req.level()).map(ContentRecord::Story),
      ContentKind::Challenge => self
        .challenge(req.level(), req.language(), req.params.challenge_type)
        .map(ContentRecord::Challenge),
      ContentKind::Feedback => None,
    }
  }

  pub fn story(&self, level: u8) -> Option<StoryRecord> {
    let picked = closest_level(&self.stories, level, |e| e.level)?;
    Some(picked.record.clone())
  }

  /// Entries in `language` are preferred. The subtype is the requested one,
  /// else picked at random among those the language has. Lookup widens from
  /// (language, subtype) to (any language, subtype) to the whole table, so a
  /// non-empty table always yields a record.
  pub fn challenge(&self, level: u8, language: &str, ctype: Option<ChallengeType>) -> Option<ChallengeRecord> {
    let all: Vec<&ChallengeEntry> = self.challenges.iter().collect();
    let same_lang: Vec<&ChallengeEntry> =
      all.iter().copied().filter(|e| e.language.eq_ignore_ascii_case(language.trim())).collect();

    let ctype = ctype.or_else(|| {
      let pool = if same_lang.is_empty() { &all } else { &same_lang };
      let available: Vec<ChallengeType> = ChallengeType::ALL
        .into_iter()
        .filter(|t| pool.iter().any(|e| e.record.challenge_type == *t))
        .collect();
      available.choose(&mut rand::thread_rng()).copied()
    });

    let candidates = match ctype {
      Some(t) => [of_type(&same_lang, t), of_type(&all, t)]
        .into_iter()
        .find(|c| !c.is_empty())
        .unwrap_or_else(|| all.clone()),
      None => all.clone(),
    };

    let picked = closest_level(&candidates, level, |e| e.level)?;
    Some(picked.record.clone())
  }
}

fn of_type<'a>(pool: &[&'a ChallengeEntry], t: ChallengeType) -> Vec<&'a ChallengeEntry> {
  pool.iter().copied().filter(|e| e.record.challenge_type == t).collect()
}

/// Highest level not above `level`; below the table, the lowest entry. Ties
/// are broken at random.
fn closest_level<T: Clone>(items: &[T], level: u8, level_of: impl Fn(&T) -> u8) -> Option<T> {
  let target = items
    .iter()
    .map(&level_of)
    .filter(|l| *l <= level)
    .max()
    .or_else(|| items.iter().map(&level_of).min())?;
  let candidates: Vec<&T> = items.iter().filter(|i| level_of(*i) == target).collect();
  candidates.choose(&mut rand::thread_rng()).map(|c| (*c).clone())
}

fn entry_language(entry: &FallbackEntryCfg) -> &str {
  entry.language.as_deref().filter(|l| !l.trim().is_empty()).unwrap_or("python")
}

fn normalize_entry(
  entry: &FallbackEntryCfg,
  kind: ContentKind,
  settings: &PipelineSettings,
) -> Result<ContentRecord, crate::error::PipelineError> {
  let ctx = PostContext { settings, language: entry_language(entry), level: entry.level.max(1) };
  let map = post_process(entry.fields.clone(), kind, &ctx)?;
  into_record(kind, map)
}

fn story(title: &str, story: &str, objective: &str, setting: &str, character: &str) -> StoryRecord {
  StoryRecord {
    title: title.into(),
    story: story.into(),
    objective: objective.into(),
    setting: Some(setting.into()),
    character: Some(character.into()),
  }
}

fn seed_stories() -> Vec<StoryEntry> {
  vec![
    StoryEntry {
      level: 1,
      record: story(
        "The Whispering Terminal",
        "Deep in the Byte Forest an old terminal flickers to life. Its screen shows a half-written spell, and the forest guardians say only a coder can finish it and wake the sleeping village.",
        "Repair the terminal's broken spell by solving its coding puzzles.",
        "A moonlit forest of glowing circuit-trees.",
        "Pixel, a curious owl who speaks only in error messages.",
      ),
    },
    StoryEntry {
      level: 2,
      record: story(
        "Loops of the Endless River",
        "The river around Iteration Island keeps flowing in circles. Boats never reach the shore because someone scrambled the loop that steers them. The ferry master needs your help before nightfall.",
        "Fix the steering loops so the ferries can reach the harbor.",
        "A misty island ringed by a river that bends back on itself.",
        "Captain Range, a grumpy ferry master with a wooden leg.",
      ),
    },
    StoryEntry {
      level: 3,
      record: story(
        "The Function Fortress",
        "The Fortress of Functions has locked its gates. Each door answers only to a correctly defined function, and the Null Knight patrols the halls looking for careless code.",
        "Unlock the fortress gates by writing the functions each door demands.",
        "A stone fortress whose doors are carved with function signatures.",
        "The Null Knight, an armored guard who returns nothing.",
      ),
    },
    StoryEntry {
      level: 4,
      record: story(
        "The Dictionary Dragon",
        "A dragon guards the Great Library and has hidden every book under a secret key. Only those who master lookups and data structures can convince it to share the lost knowledge.",
        "Retrieve the lost books by solving the dragon's data riddles.",
        "A towering library lit by floating lanterns of text.",
        "Lexi, an ancient dragon who collects keys and values.",
      ),
    },
  ]
}

#[allow(clippy::too_many_arguments)]
fn challenge(
  question: &str,
  challenge_type: ChallengeType,
  options: Option<[&str; 4]>,
  template: Option<&str>,
  code: Option<&str>,
  answer: &str,
  hint: &str,
  explanation: &str,
  difficulty: Difficulty,
  xp_reward: u32,
) -> ChallengeRecord {
  ChallengeRecord {
    question: question.into(),
    challenge_type,
    options: options.map(|o| o.iter().map(|s| s.to_string()).collect()),
    template: template.map(str::to_string),
    code: code.map(str::to_string),
    answer: answer.into(),
    hint: hint.into(),
    explanation: explanation.into(),
    difficulty,
    xp_reward,
  }
}

fn seed_challenges() -> Vec<ChallengeEntry> {
  use ChallengeType::{FillInBlank, MultipleChoice};
  use Difficulty::{Easy, Hard, Medium};

  let py = |level: u8, record: ChallengeRecord| ChallengeEntry { level, language: "python".into(), record };
  let js = |level: u8, record: ChallengeRecord| ChallengeEntry { level, language: "javascript".into(), record };

  vec![
    py(
      1,
      challenge(
        "Complete the code so it greets the hero by name.",
        FillInBlank,
        None,
        Some("name = _____\n_____(\"Hello, \" + name)"),
        None,
        "\"Pixel\", print",
        "Strings go in quotes, and there is a built-in that writes to the screen.",
        "The variable needs a string value and print() displays text.",
        Easy,
        10,
      ),
    ),
    py(
      1,
      challenge(
        "What does this code print?",
        MultipleChoice,
        Some(["5", "23", "Error", "None"]),
        None,
        Some("x = 2\ny = 3\nprint(x + y)"),
        "5",
        "Both variables hold numbers, not strings.",
        "x + y adds the integers 2 and 3, so print shows 5.",
        Easy,
        10,
      ),
    ),
    py(
      2,
      challenge(
        "Fill in the loop so it prints the numbers 0 to 4.",
        FillInBlank,
        None,
        Some("for _____ in _____(5):\n    print(i)"),
        None,
        "i, range",
        "The loop variable is printed inside the body.",
        "range(5) yields 0 through 4 and i takes each value in turn.",
        Medium,
        20,
      ),
    ),
    py(
      2,
      challenge(
        "How many times does this loop print \"splash\"?",
        MultipleChoice,
        Some(["2", "3", "4", "Forever"]),
        None,
        Some("count = 0\nwhile count < 3:\n    print(\"splash\")\n    count += 1"),
        "3",
        "Track the value of count after every pass.",
        "count goes 0, 1, 2 and the loop stops once it reaches 3.",
        Medium,
        20,
      ),
    ),
    py(
      3,
      challenge(
        "Complete the function so it returns the square of a number.",
        FillInBlank,
        None,
        Some("_____ square(n):\n    _____ n * n"),
        None,
        "def, return",
        "Python functions start with a keyword and hand back a value with another.",
        "def declares the function and return sends n * n back to the caller.",
        Hard,
        30,
      ),
    ),
    py(
      3,
      challenge(
        "What is the value of result after this code runs?",
        MultipleChoice,
        Some(["[1, 4, 9]", "[1, 2, 3]", "[2, 4, 6]", "14"]),
        None,
        Some("nums = [1, 2, 3]\nresult = [n * n for n in nums]"),
        "[1, 4, 9]",
        "A list comprehension applies the expression to every element.",
        "Each number is squared, giving [1, 4, 9].",
        Hard,
        30,
      ),
    ),
    js(
      1,
      challenge(
        "Complete the code so it logs the hero's name.",
        FillInBlank,
        None,
        Some("_____ name = \"Pixel\";\nconsole._____(name);"),
        None,
        "const, log",
        "Declare a constant, then use the console method that prints.",
        "const declares the variable and console.log prints it.",
        Easy,
        10,
      ),
    ),
    js(
      1,
      challenge(
        "What does this code log?",
        MultipleChoice,
        Some(["\"23\"", "5", "NaN", "undefined"]),
        None,
        Some("const a = \"2\";\nconst b = 3;\nconsole.log(a + b);"),
        "\"23\"",
        "One operand is a string.",
        "+ with a string operand concatenates, so the result is \"23\".",
        Easy,
        10,
      ),
    ),
  ]
}
