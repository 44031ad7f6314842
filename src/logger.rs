//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after global flags are parsed. Every line the
//! subscriber writes goes through a [`SecretMask`], so values registered after
//! init (e.g. repository credentials resolved from config) never reach the log.

use std::io::{self, Write};
use std::sync::{Arc, RwLock};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use crate::error::AppError;

const MASK: &str = "****";

/// Shared registry of secret values to redact from log output.
#[derive(Debug, Clone, Default)]
pub struct SecretMask {
    secrets: Arc<RwLock<Vec<String>>>,
}

impl SecretMask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value for redaction. Empty values are ignored.
    pub fn register(&self, secret: &str) {
        if secret.is_empty() {
            return;
        }
        let mut secrets = self.secrets.write().unwrap_or_else(|e| e.into_inner());
        if secrets.iter().any(|s| s == secret) {
            return;
        }
        secrets.push(secret.to_string());
        // Longest first so a secret containing another one is masked whole.
        secrets.sort_by(|a, b| b.len().cmp(&a.len()));
    }

    pub fn apply(&self, text: &str) -> String {
        let secrets = self.secrets.read().unwrap_or_else(|e| e.into_inner());
        let mut masked = text.to_string();
        for secret in secrets.iter() {
            if masked.contains(secret.as_str()) {
                masked = masked.replace(secret.as_str(), MASK);
            }
        }
        masked
    }
}

/// Writer that redacts registered secrets before forwarding to `inner`.
pub struct MaskedWriter<W: Write> {
    inner: W,
    mask: SecretMask,
}

impl<W: Write> MaskedWriter<W> {
    pub fn new(inner: W, mask: SecretMask) -> Self {
        Self { inner, mask }
    }
}

impl<W: Write> Write for MaskedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        self.inner.write_all(self.mask.apply(&text).as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<'a> MakeWriter<'a> for SecretMask {
    type Writer = MaskedWriter<io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        MaskedWriter::new(io::stderr(), self.clone())
    }
}

/// Map the global `--verbose` flag to a level string.
pub fn level_for(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Initialise the global tracing subscriber.
///
/// If `prefer_level` is `true`, `level` takes precedence and `RUST_LOG` is only
/// used as a fallback when `level` is invalid. If `prefer_level` is `false`,
/// `RUST_LOG` takes precedence and `level` is the fallback.
pub fn init(level: &str, prefer_level: bool, mask: SecretMask) -> Result<(), AppError> {
    let filter = if prefer_level {
        match EnvFilter::try_new(level) {
            Ok(filter) => filter,
            Err(level_err) => EnvFilter::try_from_default_env().map_err(|env_err| {
                AppError::Logger(format!(
                    "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                ))
            })?,
        }
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(mask)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}
