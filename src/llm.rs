use std::process::Stdio;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt as _;

use crate::error::{GenerationError, Result};
use crate::gemini::{GeminiConfig, GeminiModel};
use crate::openai::{OpenAiConfig, OpenAiModel};
use crate::prompt::OUTLINE_PROMPT_PREFIX;
use crate::template::content_template_pretty;

/// A text-completion service: one prompt in, one complete text out.
#[async_trait]
pub trait TextModel: Send + Sync {
    fn name(&self) -> &str;

    async fn send_message(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LlmEngine {
    Noop,
    Gemini,
    Openai,
    Command,
}

impl LlmEngine {
    pub fn from_env() -> anyhow::Result<Option<Self>> {
        let Ok(raw) = std::env::var("COURSEFORGE_ENGINE") else {
            return Ok(None);
        };
        Self::parse(&raw)
            .map(Some)
            .with_context(|| format!("invalid COURSEFORGE_ENGINE={raw:?}"))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "noop" => Ok(Self::Noop),
            "" | "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::Openai),
            "command" => Ok(Self::Command),
            other => anyhow::bail!("unsupported engine: {other}"),
        }
    }
}

pub fn model_timeout_from_env() -> Duration {
    let secs = std::env::var("COURSEFORGE_MODEL_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(120);
    Duration::from_secs(secs)
}

/// Builds the model client for `engine` from environment configuration.
///
/// `command` overrides `COURSEFORGE_MODEL_COMMAND` for the command engine.
pub fn build_model(
    engine: LlmEngine,
    command: Option<CommandConfig>,
) -> anyhow::Result<Box<dyn TextModel>> {
    let timeout = model_timeout_from_env();
    let model: Box<dyn TextModel> = match engine {
        LlmEngine::Noop => Box::new(NoopModel),
        LlmEngine::Gemini => Box::new(
            GeminiModel::new(GeminiConfig::from_env(), timeout).context("build gemini client")?,
        ),
        LlmEngine::Openai => Box::new(
            OpenAiModel::new(OpenAiConfig::from_env(), timeout).context("build openai client")?,
        ),
        LlmEngine::Command => {
            let config = match command {
                Some(config) => config,
                None => CommandConfig::from_env()
                    .context("COURSEFORGE_MODEL_COMMAND is required for --engine=command")?,
            };
            Box::new(CommandModel::new(config))
        }
    };
    tracing::info!(engine = ?engine, model = model.name(), "model client ready");
    Ok(model)
}

/// Offline engine: answers chapter prompts with the content template and
/// outline prompts with placeholder chapters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopModel;

#[async_trait]
impl TextModel for NoopModel {
    fn name(&self) -> &str {
        "noop"
    }

    async fn send_message(&self, prompt: &str) -> Result<String> {
        if prompt.starts_with(OUTLINE_PROMPT_PREFIX) {
            return Ok(noop_outline(prompt));
        }
        Ok(content_template_pretty().to_owned())
    }
}

fn noop_outline(prompt: &str) -> String {
    let field = |label: &str| {
        prompt
            .lines()
            .find_map(|line| line.trim().strip_prefix(label))
            .map(|v| v.trim().to_owned())
            .unwrap_or_default()
    };
    let topic = field("Topic:");
    let count = field("Number of Chapters:").parse::<usize>().unwrap_or(1).max(1);

    let chapters = (1..=count)
        .map(|n| {
            serde_json::json!({
                "name": format!("Chapter {n}: {topic}"),
                "about": format!("Part {n} of {topic}."),
                "duration": "15 minutes",
                "keyTakeaways": [],
            })
        })
        .collect::<Vec<_>>();

    serde_json::json!({
        "course": {
            "name": topic,
            "description": format!("An introduction to {topic}."),
            "learningObjectives": [],
            "prerequisites": [],
            "chapters": chapters,
        }
    })
    .to_string()
}

#[derive(Debug, Clone)]
pub struct CommandConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let program = std::env::var("COURSEFORGE_MODEL_COMMAND")
            .map_err(|_| anyhow::anyhow!("COURSEFORGE_MODEL_COMMAND is not set"))?;
        let program = program.trim().to_owned();
        if program.is_empty() {
            anyhow::bail!("COURSEFORGE_MODEL_COMMAND is empty");
        }
        Ok(Self {
            program,
            args: Vec::new(),
        })
    }
}

/// Runs a local program with the prompt on stdin and takes its stdout as the
/// response.
#[derive(Debug, Clone)]
pub struct CommandModel {
    config: CommandConfig,
}

impl CommandModel {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    async fn run(&self, prompt: &str) -> anyhow::Result<String> {
        let program = &self.config.program;
        let mut child = tokio::process::Command::new(program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn model command: {program}"))?;

        {
            let mut stdin = child.stdin.take().context("open model command stdin")?;
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("write model command stdin")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("wait model command")?;
        if !output.status.success() {
            anyhow::bail!("model command failed: {program} ({})", output.status);
        }
        String::from_utf8(output.stdout).context("model command stdout is not valid UTF-8")
    }
}

#[async_trait]
impl TextModel for CommandModel {
    fn name(&self) -> &str {
        &self.config.program
    }

    async fn send_message(&self, prompt: &str) -> Result<String> {
        tracing::debug!(command = %self.config.program, "model command");
        let text = self
            .run(prompt)
            .await
            .map_err(|err| GenerationError::unavailable("model command", format!("{err:#}")))?;
        if text.trim().is_empty() {
            return Err(GenerationError::unavailable(
                "model command",
                "command produced no output",
            ));
        }
        Ok(text)
    }
}
