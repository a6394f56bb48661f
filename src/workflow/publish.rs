use reqwest::Url;

use super::Project;
use crate::error::{DadError, Result};
use crate::lifecycle::require_endpoint;
use crate::remote::RemoteClient;
use crate::types::{AgentFields, AgentRecord, Stage};

pub const DEFAULT_TEST_QUESTION: &str = "What data sources do you have access to?";

#[derive(Debug)]
pub struct AgentAnswer {
    pub question: String,
    pub answer: Result<String>,
}

#[derive(Debug)]
pub struct TestReport {
    pub record: AgentRecord,
    pub answers: Vec<AgentAnswer>,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.answers.iter().all(|a| a.answer.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &AgentAnswer> {
        self.answers.iter().filter(|a| a.answer.is_err())
    }
}

pub fn validate_endpoint(url: &str) -> Result<Url> {
    let invalid = |reason: String| DadError::InvalidUrl {
        url: url.to_string(),
        reason,
    };

    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme `{}`", parsed.scheme())));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(parsed)
}

impl Project {
    /// Records the agent's published endpoint and moves it to `deployed`.
    pub fn publish_agent(&mut self, name: &str, url: &str) -> Result<AgentRecord> {
        let record = self.tracker.get(name)?;
        validate_endpoint(url)?;

        if record.stage < Stage::Executed {
            log::warn!(
                "Publishing '{}' while it is only {}; the endpoint may not answer yet",
                name,
                record.stage
            );
        }

        self.tracker
            .advance(name, Stage::Deployed, AgentFields::endpoint(url))
    }

    /// Asks the published agent each question. The agent moves to `tested`
    /// only when every question was answered.
    pub async fn test_agent(
        &mut self,
        client: &dyn RemoteClient,
        name: &str,
        questions: &[String],
    ) -> Result<TestReport> {
        let record = self.tracker.get(name)?.clone();
        let endpoint = require_endpoint(&record)?.to_string();

        let defaults = [DEFAULT_TEST_QUESTION.to_string()];
        let questions = if questions.is_empty() {
            &defaults[..]
        } else {
            questions
        };

        let retry = self.config.retry_policy();
        let mut answers = Vec::with_capacity(questions.len());
        for question in questions {
            let answer = retry
                .run(self.sleeper(), "ask agent", || {
                    client.ask_agent(&endpoint, question)
                })
                .await;
            if let Err(e) = &answer {
                log::warn!("Agent '{}' failed on {:?}: {}", name, question, e);
            }
            answers.push(AgentAnswer {
                question: question.clone(),
                answer,
            });
        }

        let mut report = TestReport { record, answers };
        if report.passed() {
            report.record = self
                .tracker
                .advance(name, Stage::Tested, AgentFields::default())?;
        }
        Ok(report)
    }
}
