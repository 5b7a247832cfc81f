use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::application::engine::EngineSettings;
use crate::application::sampling::SamplingStrategy;
use crate::domain::canonical::NormalizationRules;
use crate::domain::digest::HashAlgorithm;
use crate::domain::outcome::ValidationMethod;
use crate::domain::value_objects::IgnoredColumns;
use crate::infrastructure::db::retry::RetryPolicy;

/// Config file looked up in the working directory when none is given.
pub const LOCAL_CONFIG_FILE: &str = "rowcheck.toml";
/// Prefix of environment overrides: `ROWCHECK__SOURCE__PASSWORD=...`.
pub const ENV_PREFIX: &str = "ROWCHECK";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub source: DbConfig,
    pub target: DbConfig,
    #[serde(default)]
    pub tables: TablesConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub fix: FixConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// Database driver: "postgres" (default), "mysql", "mariadb", or "sqlite".
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default = "default_host")]
    pub host: String,
    /// 0 selects the driver's default port.
    #[serde(default)]
    pub port: u16,
    /// Database name, or file path for SQLite.
    pub dbname: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_driver() -> String {
    "postgres".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

/// Which tables to reconcile.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TablesConfig {
    /// Tables to check. Empty means every table of the source schema.
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub overrides: Vec<TableOverride>,
}

/// Per-table settings, matched by source table name.
#[derive(Debug, Deserialize, Clone)]
pub struct TableOverride {
    pub name: String,
    /// Name of the table in the target, when it was renamed by the migration.
    #[serde(default)]
    pub target_name: Option<String>,
    /// Identifying key, overriding the discovered primary key.
    #[serde(default)]
    pub key: Vec<String>,
    /// Added to the global ignored columns for this table.
    #[serde(default)]
    pub ignored_columns: IgnoredColumns,
}

impl TablesConfig {
    pub fn override_for(&self, table: &str) -> Option<&TableOverride> {
        self.overrides.iter().find(|o| o.name == table)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ValidationConfig {
    pub methods: Vec<ValidationMethod>,
    pub chunk_size: usize,
    pub hash_algorithm: HashAlgorithm,
    /// Ignored in every table (ETL metadata).
    pub ignored_columns: IgnoredColumns,
    /// Tables reconciled at the same time.
    pub parallelism: usize,
    pub table_timeout_secs: Option<u64>,
    pub missing_rows_max_table_size: u64,
    pub max_detailed_mismatches: usize,
    pub max_missing_rows_to_log: usize,
    pub retain_rows_max: u64,
    pub sampling: SamplingStrategy,
    pub normalization: NormalizationRules,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            methods: vec![ValidationMethod::RowCount, ValidationMethod::Hash],
            chunk_size: engine.chunk_size,
            hash_algorithm: engine.hash_algorithm,
            ignored_columns: IgnoredColumns::default(),
            parallelism: 4,
            table_timeout_secs: None,
            missing_rows_max_table_size: engine.missing_rows_max_table_size,
            max_detailed_mismatches: engine.max_detailed_mismatches,
            max_missing_rows_to_log: engine.max_missing_rows_to_log,
            retain_rows_max: engine.retain_rows_max,
            sampling: engine.sampling,
            normalization: engine.normalization,
        }
    }
}

impl ValidationConfig {
    pub fn engine_settings(&self, collect_fixes: bool) -> EngineSettings {
        EngineSettings {
            chunk_size: self.chunk_size,
            hash_algorithm: self.hash_algorithm,
            sampling: self.sampling,
            normalization: self.normalization.clone(),
            missing_rows_max_table_size: self.missing_rows_max_table_size,
            max_detailed_mismatches: self.max_detailed_mismatches,
            max_missing_rows_to_log: self.max_missing_rows_to_log,
            retain_rows_max: self.retain_rows_max,
            collect_fixes,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FixConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Fix statement file, rewritten on every run.
    #[serde(default = "default_fix_path")]
    pub path: String,
}

fn default_fix_path() -> String {
    "fixes.sql".to_string()
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_fix_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

fn default_output_dir() -> String {
    "reports".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl DbConfig {
    /// Build a sqlx-compatible connection URL from this config.
    pub fn url(&self) -> String {
        match self.driver.as_str() {
            "mysql" | "mariadb" => format!(
                "mysql://{}:{}@{}:{}/{}",
                self.user,
                self.password,
                self.host,
                self.port_or(3306),
                self.dbname
            ),
            "sqlite" => format!("sqlite://{}", self.dbname),
            _ => format!(
                "postgres://{}:{}@{}:{}/{}",
                self.user,
                self.password,
                self.host,
                self.port_or(5432),
                self.dbname
            ),
        }
    }

    fn port_or(&self, default: u16) -> u16 {
        if self.port == 0 {
            default
        } else {
            self.port
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from the default locations when `None`, then
    /// apply `ROWCHECK__SECTION__KEY` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = match path {
            Some(p) => PathBuf::from(p),
            None => default_config_path()?,
        };
        let path_str = path
            .to_str()
            .with_context(|| format!("Config path is not valid UTF-8: {}", path.display()))?;

        let cfg: AppConfig = Config::builder()
            .add_source(File::new(path_str, FileFormat::Toml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config file: {}", path.display()))?
            .try_deserialize()
            .with_context(|| "Failed to parse config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document, without environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: AppConfig = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()
            .with_context(|| "Failed to parse config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.validation.methods.is_empty() {
            bail!("validation.methods must name at least one method");
        }
        if self.validation.chunk_size == 0 {
            bail!("validation.chunk_size must be at least 1");
        }
        if self.validation.parallelism == 0 {
            bail!("validation.parallelism must be at least 1");
        }
        Ok(())
    }
}

/// `./rowcheck.toml` if present, else `<config dir>/rowcheck/config.toml`.
fn default_config_path() -> Result<PathBuf> {
    let local = Path::new(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Ok(local.to_path_buf());
    }
    let base = dirs::config_dir().context("Could not determine configuration directory")?;
    Ok(base.join("rowcheck").join("config.toml"))
}
