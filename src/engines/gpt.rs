//! GPT vision OCR via an Azure OpenAI deployment.
//!
//! The model is prompted to emit Markdown directly, so normalization here is
//! just the HTML-artifact cleanup pass. Token usage is captured so billing
//! can use real token counts instead of the time-based estimate.

use std::env;

use async_openai::{
    Client,
    config::AzureConfig,
    types::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs,
        ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs,
        ImageUrlArgs,
    },
};

use crate::{
    billing::TokenUsage, data_url::data_url, normalize::html_to_markdown, prelude::*,
    record::Line,
};

use super::{EngineInput, EngineOutput, EngineSpec, OcrEngine, engine_spec};

const OCR_PROMPT: &str = "You are a high-accuracy OCR engine.\n\
    Extract ALL visible text from the document.\n\n\
    OUTPUT FORMAT (VERY IMPORTANT):\n\
    - Output MUST be ONLY the extracted content.\n\
    - Use Markdown to preserve structure.\n\
    - If there is a table (invoice items, totals, etc.), output it as a \
    proper Markdown table using | pipes.\n\
    - Preserve line breaks.\n\
    - Do NOT add commentary, explanations, or analysis.\n\
    - Do NOT wrap output in code fences.\n\n\
    QUALITY RULES:\n\
    - Keep numbers exactly as seen (including commas and decimals).\n\
    - Keep labels and values on the same line when they appear that way.\n\
    - If a field is missing/unclear, omit it (do not hallucinate).\n";

pub struct GptEngine {
    spec: &'static EngineSpec,
    client: Client<AzureConfig>,
    deployment: String,
}

impl GptEngine {
    /// Create a new Azure OpenAI engine. Missing credentials fail here, once,
    /// rather than on every request.
    pub fn new() -> Result<Self> {
        let endpoint = required_env("AZURE_OPENAI_ENDPOINT")?
            .trim_end_matches('/')
            .to_owned();
        let api_key = required_env("AZURE_OPENAI_API_KEY")?;
        let deployment = required_env("AZURE_OPENAI_DEPLOYMENT")?;
        let api_version = env::var("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|_| "2025-01-01-preview".to_owned());

        let config = AzureConfig::new()
            .with_api_base(endpoint)
            .with_api_key(api_key)
            .with_api_version(api_version)
            .with_deployment_id(deployment.clone());
        Ok(Self {
            spec: engine_spec("gpt")?,
            client: Client::with_config(config),
            deployment,
        })
    }
}

#[async_trait::async_trait]
impl OcrEngine for GptEngine {
    fn spec(&self) -> &'static EngineSpec {
        self.spec
    }

    #[instrument(level = "debug", skip_all, fields(filename = %input.filename))]
    async fn recognize(&self, input: &EngineInput) -> Result<EngineOutput> {
        let image_url = data_url(&input.mime_type, &input.bytes);

        let text_part = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(OCR_PROMPT)
            .build()
            .context("error building prompt part")?;
        let image_part = ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(
                ImageUrlArgs::default()
                    .url(image_url)
                    .build()
                    .context("error building image URL")?,
            )
            .build()
            .context("error building image part")?;
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(vec![
                ChatCompletionRequestUserMessageContentPart::Text(text_part),
                ChatCompletionRequestUserMessageContentPart::ImageUrl(image_part),
            ])
            .build()
            .context("error building message")?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.deployment.clone())
            .messages(vec![message.into()])
            .temperature(0.0)
            .build()
            .context("error building request")?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("Azure OpenAI request failed")?;

        let token_usage = response.usage.as_ref().map(|usage| TokenUsage {
            input_tokens: u64::from(usage.prompt_tokens),
            output_tokens: u64::from(usage.completion_tokens),
        });
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .unwrap_or("");
        let text = html_to_markdown(content);
        let lines = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Line::bare)
            .collect();

        Ok(EngineOutput {
            text,
            lines,
            raw: serde_json::to_value(&response).ok(),
            token_usage,
            ..EngineOutput::default()
        })
    }
}

fn required_env(name: &str) -> Result<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("{} missing in environment (.env)", name))
}
