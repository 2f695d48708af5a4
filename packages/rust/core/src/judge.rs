//! External quality judge collaborator.
//!
//! The judge scores a prompt 0..=100 and returns actionable suggestions.
//! It only exists in agent mode; a missing endpoint means the refinement
//! loop runs without judged iterations.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use promptforge_shared::config::JudgeConfig;
use promptforge_shared::{CollaboratorError, CollaboratorResult};

/// Timeout for judge requests.
const REQUEST_TIMEOUT_SECS: u64 = 60;

const USER_AGENT: &str = concat!("PromptForge/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Report shape
// ---------------------------------------------------------------------------

/// One judge suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeSuggestion {
    /// Which scoring criterion the suggestion addresses.
    pub criterion: String,
    pub kind: SuggestionKind,
    /// Expected score improvement if applied.
    pub estimated_gain: u32,
    /// Whether a mechanical scaffold fix exists for it.
    pub auto_fixable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Critical,
    Improvement,
}

/// Judge verdict for one text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeReport {
    /// 0..=100.
    pub total_score: u32,
    #[serde(default)]
    pub suggestions: Vec<JudgeSuggestion>,
}

impl JudgeReport {
    /// Suggestions worth acting on: critical, or improvements with a gain
    /// of at least 5 points. The `auto_fixable` flag is the judge's guess;
    /// whether a scaffold actually exists is decided at apply time.
    pub fn applicable(&self) -> impl Iterator<Item = &JudgeSuggestion> {
        self.suggestions.iter().filter(|s| {
            s.kind == SuggestionKind::Critical
                || (s.kind == SuggestionKind::Improvement && s.estimated_gain >= 5)
        })
    }
}

// ---------------------------------------------------------------------------
// QualityJudge trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait QualityJudge: Send + Sync {
    async fn judge(
        &self,
        text: &str,
        domain: Option<&str>,
        framework: Option<&str>,
    ) -> CollaboratorResult<JudgeReport>;
}

// ---------------------------------------------------------------------------
// HTTP judge
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct JudgeRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    framework: Option<&'a str>,
}

/// HTTP client for a judge endpoint that accepts a JSON body and returns a
/// [`JudgeReport`].
pub struct HttpJudge {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpJudge {
    /// Build a judge from config. `None` when no endpoint is configured.
    pub fn from_config(config: &JudgeConfig) -> CollaboratorResult<Option<Self>> {
        let Some(endpoint) = config.endpoint.clone() else {
            debug!("no judge endpoint configured, refinement runs unjudged");
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CollaboratorError::unavailable("judge", e.to_string()))?;
        Ok(Some(Self { client, endpoint }))
    }
}

#[async_trait]
impl QualityJudge for HttpJudge {
    async fn judge(
        &self,
        text: &str,
        domain: Option<&str>,
        framework: Option<&str>,
    ) -> CollaboratorResult<JudgeReport> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&JudgeRequest {
                text,
                domain,
                framework,
            })
            .send()
            .await
            .map_err(|e| CollaboratorError::request("judge", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::request("judge", format!("HTTP {status}")));
        }

        let report: JudgeReport = response
            .json()
            .await
            .map_err(|e| CollaboratorError::malformed("judge", e.to_string()))?;

        if report.total_score > 100 {
            return Err(CollaboratorError::malformed(
                "judge",
                format!("score {} out of range", report.total_score),
            ));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn judge_for(uri: &str) -> HttpJudge {
        HttpJudge {
            client: reqwest::Client::new(),
            endpoint: format!("{uri}/judge"),
        }
    }

    #[tokio::test]
    async fn parses_report() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/judge"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"total_score":72,"suggestions":[{"criterion":"security","kind":"critical","estimated_gain":10,"auto_fixable":true}]}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let report = judge_for(&server.uri())
            .judge("text", Some("backend"), None)
            .await
            .unwrap();
        assert_eq!(report.total_score, 72);
        assert_eq!(report.applicable().count(), 1);
    }

    #[tokio::test]
    async fn out_of_range_score_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/judge"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"total_score":250,"suggestions":[]}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        assert!(judge_for(&server.uri()).judge("t", None, None).await.is_err());
    }

    #[tokio::test]
    async fn http_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/judge"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = judge_for(&server.uri()).judge("t", None, None).await.unwrap_err();
        assert_eq!(err.service(), "judge");
    }

    #[test]
    fn applicable_filters_low_gain_improvements() {
        let report = JudgeReport {
            total_score: 60,
            suggestions: vec![
                JudgeSuggestion {
                    criterion: "clarity".into(),
                    kind: SuggestionKind::Improvement,
                    estimated_gain: 3,
                    auto_fixable: true,
                },
                JudgeSuggestion {
                    criterion: "security".into(),
                    kind: SuggestionKind::Improvement,
                    estimated_gain: 8,
                    auto_fixable: true,
                },
                JudgeSuggestion {
                    criterion: "structure".into(),
                    kind: SuggestionKind::Critical,
                    estimated_gain: 2,
                    auto_fixable: false,
                },
            ],
        };
        let picked: Vec<&str> = report.applicable().map(|s| s.criterion.as_str()).collect();
        // Criticals count even when the judge marked them not auto-fixable.
        assert_eq!(picked, vec!["security", "structure"]);
    }
}
