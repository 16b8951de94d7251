#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod commands;
pub mod error;
pub mod fallback;
pub mod formats;
pub mod gemini;
pub mod llm;
pub mod logging;
pub mod normalize;
pub mod openai;
pub mod outline;
pub mod pipeline;
pub mod prompt;
pub mod render;
pub mod status;
pub mod template;
pub mod video;
