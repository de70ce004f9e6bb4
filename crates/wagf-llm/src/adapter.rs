use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use wagf_core::{LlmInvoke, SkillProposal, TokenCounts};

use crate::config::{ParsingConfig, ResponseFormat};
use crate::parser::SkillParser;
use crate::preprocess::Preprocessor;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Wraps the injected LLM callable: timeout, model-family preprocessing,
/// then the tiered parse. Invocation failures become unparseable proposals;
/// the broker counts them as failed attempts.
pub struct ModelAdapter {
    llm: Arc<dyn LlmInvoke>,
    parser: SkillParser,
    preprocessor: Preprocessor,
    format: ResponseFormat,
    timeout: Duration,
}

impl ModelAdapter {
    pub fn new(llm: Arc<dyn LlmInvoke>, parsing: ParsingConfig, format: ResponseFormat) -> Self {
        let preprocessor = Preprocessor::new(llm.model_name());
        Self {
            llm,
            parser: SkillParser::new(parsing, format.clone()),
            preprocessor,
            format,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn parser(&self) -> &SkillParser {
        &self.parser
    }

    /// One attempt: invoke, preprocess, parse. `presented` is the skill list
    /// in presentation order.
    pub async fn propose(
        &self,
        agent_id: &str,
        prompt: &str,
        presented: &[String],
    ) -> (SkillProposal, TokenCounts) {
        let reply = match tokio::time::timeout(self.timeout, self.llm.invoke(prompt)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(error)) => {
                warn!(agent = agent_id, %error, "LLM invocation failed");
                return (
                    SkillProposal::unparseable(agent_id, format!("<invocation error: {error}>")),
                    TokenCounts::default(),
                );
            }
            Err(_) => {
                warn!(
                    agent = agent_id,
                    timeout_s = self.timeout.as_secs(),
                    "LLM invocation timed out"
                );
                return (
                    SkillProposal::unparseable(agent_id, "<invocation timeout>"),
                    TokenCounts::default(),
                );
            }
        };

        let cleaned = self.preprocessor.apply(&reply.text, &self.format);
        let proposal = self.parser.parse(agent_id, &cleaned, presented);
        (proposal, reply.tokens)
    }
}
