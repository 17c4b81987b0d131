//! Film commentary from a chat-completion model.
//!
//! One request per displayed movie: a fixed critic persona, the viewer's
//! request and the movie's metadata as JSON. Any OpenAI-compatible
//! `chat/completions` endpoint works; the default is Groq.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::{MovieRecord, RankedResult};
use crate::config::{CommentaryConfig, ResilienceConfig, COMMENTARY_API_KEY_ENV};
use crate::resilience::{BackendError, Failure, Guarded};

const BACKEND: &str = "commentary API";

const PERSONA: &str = "You are Christopher Torrantino 🎬, a passionate film critic. \
You receive a film's details and a viewer's request and immediately write a short, vivid comment.

🎯 Your take should:
- Skip warm-up musings (\"hmm...\", \"maybe...\")
- Include a brief breakdown of the plot
- Consider the cast, genre, director and year
- Draw witty, clever parallels with other films, series and books
- Point out anything unusual, or any clichés
- Slip in movie memes or jokes
- End by saying whether it is worth watching and who will enjoy it
- Reply in the language of the viewer's request, unusual but coherent, lively, with emoji and a love of cinema

Important: answer not like a bot but like a person who knows film and has a good sense of humour! 🎥🍿";

static REASONING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

/// Writes commentary on one movie for one viewer request.
pub trait Commentator: Send + Sync {
    fn comment(&self, query: &str, movie: &MovieRecord) -> Result<String, BackendError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// The persona, then the viewer request with the movie's metadata.
pub fn build_messages(query: &str, movie: &MovieRecord) -> Vec<ChatMessage> {
    let metadata = serde_json::to_string_pretty(movie).unwrap_or_default();
    vec![
        ChatMessage {
            role: "system".to_string(),
            content: PERSONA.to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: format!("🎥 Viewer request: {query}\n\n📽️ Film: {metadata}\n"),
        },
    ]
}

/// Drops `<think>...</think>` blocks emitted by reasoning models.
pub fn strip_reasoning(text: &str) -> String {
    REASONING.replace_all(text, "").trim().to_string()
}

pub struct CommentaryClient {
    client: reqwest::blocking::Client,
    api_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: String,
    guard: Guarded,
}

impl CommentaryClient {
    pub fn new(
        config: &CommentaryConfig,
        resilience: &ResilienceConfig,
        api_key: String,
    ) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key,
            guard: Guarded::new(BACKEND, resilience),
        })
    }

    /// Reads the API key from the environment.
    pub fn from_env(config: &CommentaryConfig, resilience: &ResilienceConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(COMMENTARY_API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("{COMMENTARY_API_KEY_ENV} is not set"))?;
        Self::new(config, resilience, api_key)
    }

    fn complete_once(&self, request: &ChatRequest<'_>) -> Result<String, Failure> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .map_err(|e| Failure::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(Failure::from_status(status, &detail));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| Failure::Terminal(format!("malformed completion: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| strip_reasoning(&choice.message.content))
            .ok_or_else(|| Failure::Terminal("completion has no choices".to_string()))
    }
}

impl Commentator for CommentaryClient {
    fn comment(&self, query: &str, movie: &MovieRecord) -> Result<String, BackendError> {
        let request = ChatRequest {
            model: &self.model,
            messages: build_messages(query, movie),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        self.guard.call(|| self.complete_once(&request))
    }
}

/// A ranked movie with optional commentary.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedResult {
    #[serde(flatten)]
    pub result: RankedResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
}

impl From<RankedResult> for AnnotatedResult {
    fn from(result: RankedResult) -> Self {
        Self {
            result,
            commentary: None,
        }
    }
}

/// Attaches commentary to every result.
///
/// A failed comment leaves that result without commentary; the results
/// themselves are always returned.
pub fn annotate(
    results: Vec<RankedResult>,
    query: &str,
    commentator: Option<&dyn Commentator>,
) -> Vec<AnnotatedResult> {
    let Some(commentator) = commentator else {
        return results.into_iter().map(AnnotatedResult::from).collect();
    };

    results
        .into_iter()
        .map(|result| {
            let commentary = match commentator.comment(query, &result.movie) {
                Ok(text) => Some(text),
                Err(err) => {
                    log::warn!("No commentary for {:?}: {err}", result.movie.title);
                    None
                }
            };
            AnnotatedResult { result, commentary }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyCritic;

    impl Commentator for FlakyCritic {
        fn comment(&self, _query: &str, movie: &MovieRecord) -> Result<String, BackendError> {
            if movie.title == "Heat" {
                Ok("A heist classic 🍿".to_string())
            } else {
                Err(BackendError::Unavailable {
                    backend: BACKEND,
                    reason: "status 503".to_string(),
                })
            }
        }
    }

    fn ranked(title: &str, rank: usize) -> RankedResult {
        RankedResult {
            movie: MovieRecord {
                title: title.into(),
                ..Default::default()
            },
            score: 0.5,
            rank,
            content: None,
        }
    }

    #[test]
    fn test_strip_reasoning() {
        let raw = "<think>\nThe user wants\na thriller.\n</think>\n\nGreat pick! 🎬";
        assert_eq!(strip_reasoning(raw), "Great pick! 🎬");
        assert_eq!(strip_reasoning("no reasoning here"), "no reasoning here");
    }

    #[test]
    fn test_messages_carry_query_and_metadata() {
        let movie = MovieRecord {
            title: "Сталкер".into(),
            year: Some(1979),
            ..Default::default()
        };
        let messages = build_messages("что-то философское", &movie);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("film critic"));
        assert_eq!(messages[1].role, "user");
        assert!(messages[1].content.contains("что-то философское"));
        assert!(messages[1].content.contains("\"movie_title\": \"Сталкер\""));
        assert!(messages[1].content.contains("\"year\": 1979"));
    }

    #[test]
    fn test_annotate_keeps_results_on_failure() {
        let results = vec![ranked("Heat", 1), ranked("Thief", 2)];
        let annotated = annotate(results, "heist", Some(&FlakyCritic));

        assert_eq!(annotated.len(), 2);
        assert_eq!(annotated[0].commentary.as_deref(), Some("A heist classic 🍿"));
        assert_eq!(annotated[1].commentary, None);
        assert_eq!(annotated[1].result.rank, 2);
    }

    #[test]
    fn test_annotate_without_commentator() {
        let annotated = annotate(vec![ranked("Heat", 1)], "heist", None);
        assert_eq!(annotated[0].commentary, None);

        let json = serde_json::to_value(&annotated[0]).unwrap();
        assert_eq!(json["movie_title"], "Heat");
        assert_eq!(json["rank"], 1);
        assert!(json.get("commentary").is_none());
    }

    #[test]
    fn test_request_body() {
        let request = ChatRequest {
            model: "deepseek-r1-distill-llama-70b",
            messages: build_messages("q", &MovieRecord::default()),
            temperature: 1.3,
            max_tokens: 700,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "deepseek-r1-distill-llama-70b");
        assert_eq!(json["max_tokens"], 700);
        assert_eq!(json["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"<think>hm</think>Watch it."}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(strip_reasoning(&parsed.choices[0].message.content), "Watch it.");
    }
}
