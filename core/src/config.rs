// Layered runtime settings
//
// defaults -> /etc/obliterator/obliterator.toml -> per-user config file ->
// explicit --config file -> OBLITERATOR_* environment variables.
// Later layers win. Nested keys use a double underscore in the environment,
// e.g. OBLITERATOR_OPERATOR__NAME.

use crate::crypto::OperatorMetadata;
use crate::engine::EngineConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SYSTEM_CONFIG_PATH: &str = "/etc/obliterator/obliterator.toml";
pub const ENV_PREFIX: &str = "OBLITERATOR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Certificates, detached signatures and the log file land here
    pub output_dir: PathBuf,
    /// Well-known directory searched for public keys during verification
    pub keys_dir: PathBuf,
    /// PKCS#8 private key used to sign certificates
    pub signing_key: Option<PathBuf>,
    /// Latest progress event, atomically replaced
    pub progress_file: Option<PathBuf>,
    pub progress_buffer: usize,
    pub chunk_size_bytes: usize,
    pub allow_fallback: bool,
    /// Overwrite pass count override, 1..=20
    pub pass_count: Option<u32>,
    /// humantime durations; "none" disables the deadline
    pub ata_timeout: String,
    pub nvme_timeout: String,
    pub discard_timeout: String,
    /// How long a timed-out vendor command may take to wind down before the
    /// device is written to by a fallback
    pub command_grace: String,
    /// Temporary ATA user password for SECURITY ERASE UNIT
    pub ata_password: String,
    pub operator: OperatorMetadata,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("/var/lib/obliterator"),
            keys_dir: PathBuf::from("/etc/obliterator/keys"),
            signing_key: None,
            progress_file: Some(PathBuf::from("/run/obliterator/progress.json")),
            progress_buffer: 256,
            chunk_size_bytes: 4 * 1024 * 1024,
            allow_fallback: false,
            pass_count: None,
            ata_timeout: "2h".to_string(),
            nvme_timeout: "1h".to_string(),
            discard_timeout: "none".to_string(),
            command_grace: "30s".to_string(),
            ata_password: "obliterator".to_string(),
            operator: OperatorMetadata::default(),
        }
    }
}

impl Settings {
    /// Load every layer; `explicit` must exist when given
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_layers(Path::new(SYSTEM_CONFIG_PATH), user_config_path(), explicit)
    }

    pub(crate) fn load_layers(
        system: &Path,
        user: Option<PathBuf>,
        explicit: Option<&Path>,
    ) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Settings::default()).context("encoding defaults")?)
            .add_source(File::from(system).format(FileFormat::Toml).required(false));

        if let Some(user) = user {
            builder = builder.add_source(File::from(user).format(FileFormat::Toml).required(false));
        }
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("reading configuration")?
            .try_deserialize()
            .context("parsing configuration")?;

        settings.validate()?;
        tracing::debug!(?settings.output_dir, ?settings.keys_dir, "configuration loaded");
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if let Some(passes) = self.pass_count {
            crate::algorithms::check_pass_count(passes)?;
        }
        if self.chunk_size_bytes < 4096 {
            anyhow::bail!("chunk_size_bytes must be at least 4096, got {}", self.chunk_size_bytes);
        }
        if self.progress_buffer == 0 {
            anyhow::bail!("progress_buffer must be positive");
        }
        self.engine_config().map(|_| ())
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        Ok(EngineConfig {
            chunk_size: self.chunk_size_bytes,
            allow_fallback: self.allow_fallback,
            fallback_passes: self.pass_count,
            ata_timeout: parse_deadline(&self.ata_timeout).context("ata_timeout")?,
            nvme_timeout: parse_deadline(&self.nvme_timeout).context("nvme_timeout")?,
            discard_timeout: parse_deadline(&self.discard_timeout).context("discard_timeout")?,
            command_grace: parse_deadline(&self.command_grace)
                .context("command_grace")?
                .unwrap_or_default(),
        })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.output_dir.join("logs")
    }
}

/// Per-user config file, e.g. ~/.config/obliterator/obliterator.toml
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "obliterator", "obliterator")
        .map(|dirs| dirs.config_dir().join("obliterator.toml"))
}

fn parse_deadline(value: &str) -> Result<Option<Duration>> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let duration = humantime::parse_duration(value)
        .with_context(|| format!("invalid duration {:?}", value))?;
    Ok(Some(duration))
}
