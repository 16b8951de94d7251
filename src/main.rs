use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    courseforge::logging::init().context("init logging")?;

    let cli = courseforge::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        courseforge::cli::Command::Template => {
            courseforge::commands::template().context("template")?;
        }
        courseforge::cli::Command::Outline(args) => {
            courseforge::commands::outline(args)
                .await
                .context("outline")?;
        }
        courseforge::cli::Command::Chapter(args) => {
            courseforge::commands::chapter(args)
                .await
                .context("chapter")?;
        }
        courseforge::cli::Command::Regenerate(args) => {
            courseforge::commands::regenerate(args)
                .await
                .context("regenerate")?;
        }
    }

    Ok(())
}
