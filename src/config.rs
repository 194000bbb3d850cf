//! Configuration management for the starpit game server
//!
//! Defaults, TOML loading, `STARPIT_*` environment overrides and validation.

use crate::errors::{ConfigurationError, StarpitResult};
use crate::games::curve::MINES_TOTAL_CELLS;
use crate::games::outcome::CrashDistribution;
use crate::games::types::Multiplier;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Top-level server configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StarpitConfig {
    pub crash: CrashConfig,
    pub mines: MinesConfig,
    pub ledger: LedgerConfig,
    pub api: ApiConfig,
}

/// Crash round timing and betting rules
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    pub tick_interval_ms: u64,
    pub countdown_ms: u64,
    /// Pause between a crash and the next countdown
    pub pause_ms: u64,
    /// Bets are refused once the live multiplier reaches this value
    pub betting_cutoff: Multiplier,
    pub min_auto_cashout: Multiplier,
    pub history_size: usize,
    /// Rounds of resolved wagers kept for lookup
    pub wager_retention_rounds: u64,
    /// Ticks a crash may be held back by failing ledger credits before it is forced
    pub max_settlement_retries: u32,
    pub settlement_max_attempts: u32,
    pub distribution: CrashDistribution,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 200,
            countdown_ms: 10_000,
            pause_ms: 5_000,
            betting_cutoff: Multiplier::from_hundredths(120),
            min_auto_cashout: Multiplier::from_hundredths(101),
            history_size: 10,
            wager_retention_rounds: 10,
            max_settlement_retries: 5,
            settlement_max_attempts: 50,
            distribution: CrashDistribution::default(),
        }
    }
}

impl CrashConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_millis(self.countdown_ms)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MinesConfig {
    pub total_cells: u8,
    pub min_mines: u8,
    pub max_mines: u8,
    /// Completed sessions kept in memory for lookup
    pub session_retention: usize,
}

impl Default for MinesConfig {
    fn default() -> Self {
        Self {
            total_cells: MINES_TOTAL_CELLS,
            min_mines: 1,
            max_mines: MINES_TOTAL_CELLS - 1,
            session_retention: 10_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Balance given to an account on first use
    pub starting_balance: u64,
    /// Game records kept per user
    pub history_per_user: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_balance: 1_000,
            history_per_user: 100,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
    pub broadcast_buffer_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
            broadcast_buffer_size: 1024,
        }
    }
}

impl ApiConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration loader with environment variable support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> StarpitResult<StarpitConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            StarpitConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> StarpitResult<StarpitConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(&self, config: &mut StarpitConfig) -> StarpitResult<()> {
        if let Ok(host) = env::var("STARPIT_API_HOST") {
            config.api.host = host;
        }
        if let Some(port) = parse_env("STARPIT_API_PORT")? {
            config.api.port = port;
        }
        if let Some(tick) = parse_env("STARPIT_TICK_INTERVAL_MS")? {
            config.crash.tick_interval_ms = tick;
        }
        if let Some(countdown) = parse_env("STARPIT_COUNTDOWN_MS")? {
            config.crash.countdown_ms = countdown;
        }
        if let Some(pause) = parse_env("STARPIT_PAUSE_MS")? {
            config.crash.pause_ms = pause;
        }
        if let Some(balance) = parse_env("STARPIT_STARTING_BALANCE")? {
            config.ledger.starting_balance = balance;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self, config: &StarpitConfig) -> StarpitResult<()> {
        let crash = &config.crash;
        if crash.tick_interval_ms == 0 {
            return Err(ConfigurationError::invalid("crash.tick_interval_ms", 0, "Tick interval cannot be zero").into());
        }
        if crash.betting_cutoff < Multiplier::ONE {
            return Err(ConfigurationError::invalid(
                "crash.betting_cutoff",
                crash.betting_cutoff,
                "Betting cutoff must be at least 1.00x",
            )
            .into());
        }
        if crash.min_auto_cashout <= Multiplier::ONE || crash.min_auto_cashout > crash.distribution.cap {
            return Err(ConfigurationError::invalid(
                "crash.min_auto_cashout",
                crash.min_auto_cashout,
                "Minimum auto-cashout must be above 1.00x and within the cap",
            )
            .into());
        }
        if crash.history_size == 0 {
            return Err(ConfigurationError::invalid("crash.history_size", 0, "History size cannot be zero").into());
        }
        if crash.settlement_max_attempts == 0 {
            return Err(ConfigurationError::invalid(
                "crash.settlement_max_attempts",
                0,
                "Settlement attempts cannot be zero",
            )
            .into());
        }
        crash.distribution.validate()?;

        let mines = &config.mines;
        if mines.total_cells < 2 {
            return Err(ConfigurationError::invalid("mines.total_cells", mines.total_cells, "Grid needs at least 2 cells").into());
        }
        if mines.min_mines == 0 || mines.min_mines > mines.max_mines || mines.max_mines >= mines.total_cells {
            return Err(ConfigurationError::invalid(
                "mines.max_mines",
                mines.max_mines,
                "Mine range must satisfy 1 <= min <= max < total_cells",
            )
            .into());
        }

        if config.api.port == 0 {
            return Err(ConfigurationError::invalid("api.port", 0, "API port cannot be zero").into());
        }
        if config.api.request_timeout_secs == 0 {
            return Err(ConfigurationError::invalid("api.request_timeout_secs", 0, "Timeout cannot be zero").into());
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &StarpitConfig, path: &str) -> StarpitResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigurationError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigurationError::invalid(key, &raw, "Could not parse value")),
        Err(_) => Ok(None),
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config(path: &str) -> StarpitResult<()> {
    ConfigLoader::new().save(&StarpitConfig::default(), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = StarpitConfig::default();
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.crash.tick_interval(), Duration::from_millis(200));
        assert_eq!(config.crash.betting_cutoff, Multiplier::from_hundredths(120));
        assert_eq!(config.mines.max_mines, 24);
        assert_eq!(config.ledger.starting_balance, 1_000);
    }

    #[test]
    fn test_config_validation() {
        let loader = ConfigLoader::new();
        let mut config = StarpitConfig::default();
        assert!(loader.validate(&config).is_ok());

        config.crash.tick_interval_ms = 0;
        assert!(loader.validate(&config).is_err());

        let mut config = StarpitConfig::default();
        config.mines.max_mines = 25;
        assert!(loader.validate(&config).is_err());

        let mut config = StarpitConfig::default();
        config.crash.betting_cutoff = Multiplier::from_hundredths(90);
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn test_save_and_load_config() -> StarpitResult<()> {
        let temp_file = NamedTempFile::new()?;
        let path = temp_file.path().to_str().unwrap();

        let mut original = StarpitConfig::default();
        original.crash.countdown_ms = 3_000;
        original.api.port = 9090;

        let loader = ConfigLoader::new();
        loader.save(&original, path)?;

        let loaded = ConfigLoader::new().with_path(path).load()?;
        assert_eq!(loaded.crash.countdown_ms, 3_000);
        assert_eq!(loaded.api.port, 9090);
        assert_eq!(loaded.crash.distribution, original.crash.distribution);

        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> StarpitResult<()> {
        let temp_file = NamedTempFile::new()?;
        std::fs::write(temp_file.path(), "[api]\nport = 7000\n")?;

        let config = ConfigLoader::new().with_path(temp_file.path()).load()?;
        assert_eq!(config.api.port, 7000);
        assert_eq!(config.crash.countdown_ms, 10_000);
        Ok(())
    }
}
