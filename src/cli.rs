use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::llm::LlmEngine;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the chapter content template as JSON.
    Template,
    /// Generate a course outline and write it to a course file.
    Outline(OutlineArgs),
    /// Print a chapter, generating and storing it if needed.
    Chapter(ChapterArgs),
    /// Regenerate one chapter, or every chapter of the course.
    Regenerate(RegenerateArgs),
}

#[derive(Debug, Clone, Args)]
pub struct EngineArgs {
    /// Model engine. Defaults to `COURSEFORGE_ENGINE`, then `gemini`.
    #[arg(long, value_enum)]
    pub engine: Option<LlmEngine>,

    /// Program to run for `--engine command` (prompt on stdin, reply on stdout).
    #[arg(long)]
    pub model_command: Option<String>,

    /// Argument passed to `--model-command`. Repeatable.
    #[arg(long = "model-arg", allow_hyphen_values = true)]
    pub model_args: Vec<String>,

    /// Skip video search even if API keys are configured.
    #[arg(long, default_value_t = false)]
    pub no_videos: bool,
}

#[derive(Debug, Args)]
pub struct OutlineArgs {
    #[arg(long)]
    pub topic: String,

    #[arg(long)]
    pub category: String,

    #[arg(long, default_value = "Beginner")]
    pub level: String,

    /// Course length, e.g. `1-2` (hours).
    #[arg(long, default_value = "1-2")]
    pub duration: String,

    /// Number of chapters to ask for.
    #[arg(long, default_value_t = 5)]
    pub chapters: u32,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Output course file (`.json`, `.yaml` or `.yml`).
    #[arg(long)]
    pub out: PathBuf,

    /// Overwrite `--out` if it exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
}

#[derive(Debug, Args)]
pub struct ChapterArgs {
    /// Course file written by `outline`.
    #[arg(long)]
    pub course: PathBuf,

    /// Zero-based chapter index.
    #[arg(long)]
    pub chapter: usize,

    /// Directory holding stored chapters.
    #[arg(long)]
    pub store: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Debug, Args)]
pub struct RegenerateArgs {
    #[arg(long)]
    pub course: PathBuf,

    /// Zero-based chapter index. Omit to regenerate every chapter.
    #[arg(long)]
    pub chapter: Option<usize>,

    #[arg(long)]
    pub store: PathBuf,

    #[command(flatten)]
    pub engine: EngineArgs,
}
