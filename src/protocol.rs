//! Public HTTP request/response DTOs (serde ready).
//! Records themselves are serialized straight from `domain`; this module only
//! holds the query/body shapes and the small envelope types.

use serde::{Deserialize, Serialize};

use crate::domain::{ChallengeType, RequestParams};

/// `GET /api/story` query. Values arrive as strings and are parsed leniently.
#[derive(Debug, Default, Deserialize)]
pub struct StoryQuery {
    pub level: Option<String>,
    pub objective: Option<String>,
    pub context: Option<String>,
}

/// `GET /api/challenge` query.
#[derive(Debug, Default, Deserialize)]
pub struct ChallengeQuery {
    pub level: Option<String>,
    pub language: Option<String>,
    #[serde(rename = "type")]
    pub challenge_type: Option<String>,
    pub objective: Option<String>,
    pub context: Option<String>,
}

/// `POST /api/feedback` body. Missing fields count as empty strings.
#[derive(Debug, Default, Deserialize)]
pub struct FeedbackIn {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub correct_answer: String,
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
    pub code: &'static str,
}

/// Level from a query string: unparsable or missing means 1, zero is lifted to 1.
pub fn parse_level(raw: Option<&str>) -> u8 {
    raw.and_then(|s| s.trim().parse::<u8>().ok()).unwrap_or(1).max(1)
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl StoryQuery {
    pub fn into_params(self) -> RequestParams {
        RequestParams {
            level: Some(parse_level(self.level.as_deref())),
            objective: non_empty(self.objective),
            story_context: non_empty(self.context),
            ..Default::default()
        }
    }
}

impl ChallengeQuery {
    /// An unrecognized `type` is ignored rather than rejected.
    pub fn into_params(self) -> RequestParams {
        RequestParams {
            level: Some(parse_level(self.level.as_deref())),
            language: non_empty(self.language).map(|l| l.to_lowercase()),
            challenge_type: self.challenge_type.as_deref().and_then(ChallengeType::parse_loose),
            objective: non_empty(self.objective),
            story_context: non_empty(self.context),
            ..Default::default()
        }
    }
}

impl FeedbackIn {
    pub fn into_params(self) -> RequestParams {
        RequestParams {
            answer: Some(self.answer),
            correct_answer: Some(self.correct_answer),
            question: Some(self.question),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing_is_lenient() {
        assert_eq!(parse_level(Some("3")), 3);
        assert_eq!(parse_level(Some(" 2 ")), 2);
        assert_eq!(parse_level(Some("abc")), 1);
        assert_eq!(parse_level(Some("0")), 1);
        assert_eq!(parse_level(None), 1);
    }

    #[test]
    fn challenge_query_maps_type_and_language() {
        let q = ChallengeQuery {
            level: Some("2".into()),
            language: Some("JavaScript".into()),
            challenge_type: Some("multiple_choice".into()),
            ..Default::default()
        };
        let p = q.into_params();
        assert_eq!(p.level, Some(2));
        assert_eq!(p.language.as_deref(), Some("javascript"));
        assert_eq!(p.challenge_type, Some(ChallengeType::MultipleChoice));

        let unknown = ChallengeQuery { challenge_type: Some("essay".into()), ..Default::default() };
        assert_eq!(unknown.into_params().challenge_type, None);
    }
}
