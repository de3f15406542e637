use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::loader::Module;
use crate::core::repository::CsvOptions;

/// Config file names, first match wins
const CONFIG_FILES: [&str; 4] = ["rsetup.toml", "rsetup.yaml", "rsetup.json", ".rsetup.toml"];

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Root for profiles and snapshots (`~` and `$VAR` are expanded)
    pub data_dir: String,

    /// Profile used when a command does not name one
    pub profile: String,

    /// Deployment module used when a command does not name one
    pub module: Module,

    /// CSV reader settings
    pub csv: CsvConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig
{
    /// Single-byte field delimiter
    pub delimiter: char,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            data_dir: "~/.local/share/rsetup".to_string(),
            profile: crate::core::profile::DEFAULT_PROFILE.to_string(),
            module: Module::Relief,
            csv: CsvConfig::default(),
        }
    }
}

impl Default for CsvConfig
{
    fn default() -> Self
    {
        Self { delimiter: ',' }
    }
}

impl Config
{
    /// `data_dir` with `~` and environment variables expanded.
    pub fn data_dir(&self) -> Result<PathBuf>
    {
        let expanded = shellexpand::full(&self.data_dir)
            .with_context(|| format!("Failed to expand data_dir '{}'", self.data_dir))?;

        Ok(PathBuf::from(expanded.as_ref()))
    }

    pub fn csv_options(&self) -> Result<CsvOptions>
    {
        let delimiter = u8::try_from(self.csv.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .with_context(|| {
                format!("csv.delimiter must be a single ASCII character, got '{}'", self.csv.delimiter)
            })?;

        Ok(CsvOptions { delimiter })
    }
}

pub fn load_config() -> Result<Config>
{
    load_config_from(Path::new("."))
}

/// Load the first config file found in `dir`, then `RSETUP_*` environment
/// overrides (e.g. `RSETUP_PROFILE`, `RSETUP_CSV__DELIMITER`).
pub fn load_config_from(dir: &Path) -> Result<Config>
{
    let mut builder = config::Config::builder();

    for name in &CONFIG_FILES
    {
        let path = dir.join(name);
        if path.exists()
        {
            builder = builder.add_source(config::File::from(path));
            break;
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RSETUP")
            .prefix_separator("_")
            .separator("__"),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join(CONFIG_FILES[0]);

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    if ctx.dry_run
    {
        if !ctx.quiet
        {
            println!("Would write {}:\n{toml_string}", config_path.display());
        }
        return Ok(());
    }

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
