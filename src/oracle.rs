#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::future::Future;

use anyhow::{Context, Result, ensure};
use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
};
use tracing::debug;

use crate::{config::OracleEnv, prompts};

/// A text-completion service: given a prompt, return a completion.
///
/// Every oracle-backed stage depends only on this one operation, so tests can
/// drive the pipeline with canned responses.
pub trait Oracle {
    /// Completes `prompt`. The response carries no format guarantees.
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Oracle backed by an OpenAI-compatible chat completion endpoint.
#[derive(Clone)]
pub struct OpenAiOracle {
    /// API client.
    client: OpenAIClient<OpenAIConfig>,
    /// Model and sampling settings.
    env:    OracleEnv,
}

impl OpenAiOracle {
    /// Creates a client for the endpoint in `env`.
    pub fn new(env: OracleEnv) -> Self {
        let client = OpenAIClient::with_config(
            OpenAIConfig::new()
                .with_api_base(env.api_base().to_owned())
                .with_api_key(env.api_key().to_owned()),
        );
        Self { client, env }
    }

    /// Returns the settings this oracle was built with.
    pub fn env(&self) -> &OracleEnv {
        &self.env
    }

    /// Sends one system + user message exchange and returns the first choice.
    async fn chat(&self, prompt: &str) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(prompts::system_message())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into(),
        ];

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.env.model())
            .messages(messages)
            .temperature(self.env.temperature())
            .n(1);
        if let Some(top_p) = self.env.top_p() {
            args.top_p(top_p);
        }
        let request = args.build()?;

        debug!(model = self.env.model(), chars = prompt.len(), "Sending completion request");
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .with_context(|| format!("Completion request to {} failed", self.env.api_base()))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();
        ensure!(!content.trim().is_empty(), "Completion service returned an empty response");

        Ok(content)
    }
}

impl Oracle for OpenAiOracle {
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send {
        self.chat(prompt)
    }
}
