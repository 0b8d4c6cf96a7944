use std::{env, net::SocketAddr, path::PathBuf, str::FromStr};

use anyhow::Context;
use log::LevelFilter;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";
const MAX_FILE_BYTES: usize = 25 * 1024 * 1024; // 25MB
const MAX_BATCH_BYTES: usize = 200 * 1024 * 1024; // 200MB
const MAX_FILES: usize = 100;
const ZIP_LEVEL: i32 = 9;
const AVIF_SPEED: u8 = 6;

/// Ceilings applied while the multipart body is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub max_file_bytes: usize,
    pub max_batch_bytes: usize,
    pub max_files: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_bytes: MAX_FILE_BYTES,
            max_batch_bytes: MAX_BATCH_BYTES,
            max_files: MAX_FILES,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub limits: Limits,
    /// Deflate level for archive entries (0-9).
    pub zip_level: i32,
    /// rav1e speed preset, 1 (slowest) to 10 (fastest).
    pub avif_speed: u8,
    pub log_level: LevelFilter,
    pub log_file: Option<PathBuf>,
    /// A log4rs YAML file; when set it replaces the built-in logger setup.
    pub log_config: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            limits: Limits::default(),
            zip_level: ZIP_LEVEL,
            avif_speed: AVIF_SPEED,
            log_level: LevelFilter::Info,
            log_file: None,
            log_config: None,
        }
    }
}

impl Config {
    /// Reads `CONVERTER_*` variables, loading `.env` first if one exists.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let addr = env::var("CONVERTER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
        let addr = SocketAddr::from_str(&addr)
            .with_context(|| format!("CONVERTER_ADDR is not a socket address: {}", addr))?;

        let limits = Limits {
            max_file_bytes: parse_var("CONVERTER_MAX_FILE_BYTES", MAX_FILE_BYTES)?,
            max_batch_bytes: parse_var("CONVERTER_MAX_BATCH_BYTES", MAX_BATCH_BYTES)?,
            max_files: parse_var("CONVERTER_MAX_FILES", MAX_FILES)?,
        };

        let zip_level: i32 = parse_var("CONVERTER_ZIP_LEVEL", ZIP_LEVEL)?;
        if !(0..=9).contains(&zip_level) {
            anyhow::bail!("CONVERTER_ZIP_LEVEL must be between 0 and 9, got {}", zip_level);
        }

        let avif_speed: u8 = parse_var("CONVERTER_AVIF_SPEED", AVIF_SPEED)?;
        if !(1..=10).contains(&avif_speed) {
            anyhow::bail!("CONVERTER_AVIF_SPEED must be between 1 and 10, got {}", avif_speed);
        }

        let log_level = parse_var("CONVERTER_LOG_LEVEL", LevelFilter::Info)?;

        Ok(Self {
            addr,
            limits,
            zip_level,
            avif_speed,
            log_level,
            log_file: env::var_os("CONVERTER_LOG_FILE").map(PathBuf::from),
            log_config: env::var_os("CONVERTER_LOG_CONFIG").map(PathBuf::from),
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|err| anyhow::anyhow!("{} has an invalid value {:?}: {}", name, raw, err)),
        Err(_) => Ok(default),
    }
}
