use anyhow::Context;
use log::LevelFilter;
use log4rs::{
    append::{console::ConsoleAppender, file::FileAppender},
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};

use crate::config::Config as AppConfig;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l:<5})} {t} - {m}{n}";

/// Installs the global logger. A log4rs YAML file named by the config wins
/// over the built-in console (and optional file) setup.
pub fn initialize(config: &AppConfig) -> anyhow::Result<()> {
    if let Some(path) = &config.log_config {
        log4rs::init_file(path, Default::default())
            .with_context(|| format!("failed to load log config {}", path.display()))?;
        return Ok(());
    }

    log4rs::init_config(build(config.log_level, config.log_file.as_deref())?)
        .context("logger already initialized")?;
    Ok(())
}

fn build(level: LevelFilter, log_file: Option<&std::path::Path>) -> anyhow::Result<Config> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();

    let mut builder =
        Config::builder().appender(Appender::builder().build("stdout", Box::new(stdout)));
    let mut root = Root::builder().appender("stdout");

    if let Some(path) = log_file {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }

    builder
        .build(root.build(level))
        .context("invalid logger configuration")
}
