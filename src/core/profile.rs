//! Named profiles and their imported data snapshots.
//!
//! Layout under the configured data directory:
//!
//! ```text
//! <data_dir>/pf/<profile>/in/<yyyyMMdd_HHmm>/*.csv
//! ```
//!
//! Every import copies the source tables into a fresh snapshot directory and
//! loads the module from that copy, never from the source.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::{Context, Result};
use chrono::Local;
use itertools::Itertools;
use owo_colors::OwoColorize;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::cli::{AppContext, ImportArgs, ProfilesArgs};
use crate::core::loader::{Module, ModuleSummary, load_module, missing_required_files};
use crate::core::repository::{CsvError, CsvRepository, FileCsvRepository};
use crate::infra::config::load_config;
use crate::infra::io::{copy_atomic, ensure_dir};
use crate::infra::walk::TableWalker;

/// Profile that always exists
pub const DEFAULT_PROFILE: &str = "default";

/// Directory under the data dir holding one directory per profile
pub const PROFILES_DIR: &str = "pf";

/// Directory under a profile holding imported snapshots
pub const SNAPSHOT_DIR: &str = "in";

const SNAPSHOT_FORMAT: &str = "%Y%m%d_%H%M";

/// Length of a [`SNAPSHOT_FORMAT`] stamp
const STAMP_LEN: usize = 13;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]+").expect("constant pattern"));

/// Replace every run of non-word characters with `_`.
pub fn sanitize_profile_name(name: &str) -> String
{
    NON_WORD
        .replace_all(name, "_")
        .into_owned()
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError
{
    #[error("Profile name '{0}' has no letters, digits or underscores")]
    InvalidName(String),

    #[error("Failed to access {}", path.display())]
    Io
    {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProfileError
{
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_
    {
        move |source| ProfileError::Io { path: path.to_path_buf(), source }
    }
}

/// Sanitized profile name, refusing names with nothing left to keep.
pub fn validate_profile_name(name: &str) -> Result<String, ProfileError>
{
    let sanitized = sanitize_profile_name(name);
    if sanitized.is_empty()
    {
        return Err(ProfileError::InvalidName(name.to_owned()));
    }

    Ok(sanitized)
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError
{
    #[error("Missing {}", .0.join(", "))]
    MissingFiles(Vec<String>),

    #[error("Failed to prepare {}", path.display())]
    Io
    {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid table pattern")]
    Pattern(#[from] globset::Error),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Csv(#[from] CsvError),
}

impl ImportError
{
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_
    {
        move |source| ImportError::Io { path: path.to_path_buf(), source }
    }
}

/// Outcome of [`ProfileStore::import_data`].
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport
{
    pub profile: String,
    pub snapshot_dir: PathBuf,
    /// Table files copied into the snapshot
    pub copied: Vec<PathBuf>,
    pub summary: ModuleSummary,
}

/// Profile directories under one data directory.
#[derive(Debug, Clone)]
pub struct ProfileStore
{
    root: PathBuf,
}

impl ProfileStore
{
    pub fn open(data_dir: impl AsRef<Path>) -> Self
    {
        Self {
            root: data_dir
                .as_ref()
                .join(PROFILES_DIR),
        }
    }

    /// Directory holding every profile.
    pub fn root(&self) -> &Path
    {
        &self.root
    }

    /// Directory of `name`, after sanitizing.
    pub fn profile_path(
        &self,
        name: &str,
    ) -> Result<PathBuf, ProfileError>
    {
        Ok(self
            .root
            .join(validate_profile_name(name)?))
    }

    /// True when the profile did not exist before.
    pub fn create_profile(
        &self,
        name: &str,
    ) -> Result<bool, ProfileError>
    {
        let path = self.profile_path(name)?;
        ensure_dir(&path).map_err(ProfileError::io(&path))
    }

    /// Profile names, case-insensitively sorted. Creates `default` first.
    pub fn list_profiles(&self) -> Result<Vec<String>, ProfileError>
    {
        self.create_profile(DEFAULT_PROFILE)?;

        let names = subdirs(&self.root)?
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| {
                name.to_string_lossy()
                    .into_owned()
            })
            .sorted_by_key(|name| name.to_lowercase())
            .collect();

        Ok(names)
    }

    /// Create a new timestamped snapshot directory for `profile`. A second
    /// snapshot within the same minute gets a numeric suffix.
    pub fn new_snapshot_dir(
        &self,
        profile: &str,
    ) -> Result<PathBuf, ProfileError>
    {
        let parent = self
            .profile_path(profile)?
            .join(SNAPSHOT_DIR);
        let stamp = Local::now()
            .format(SNAPSHOT_FORMAT)
            .to_string();

        let mut dir = parent.join(&stamp);
        let mut n = 2;
        while dir.exists()
        {
            dir = parent.join(format!("{stamp}_{n}"));
            n += 1;
        }

        fs::create_dir_all(&dir).map_err(ProfileError::io(&dir))?;
        Ok(dir)
    }

    /// Snapshot directories of `profile`, oldest first.
    pub fn snapshots(
        &self,
        profile: &str,
    ) -> Result<Vec<PathBuf>, ProfileError>
    {
        let parent = self
            .profile_path(profile)?
            .join(SNAPSHOT_DIR);
        if !parent.is_dir()
        {
            return Ok(Vec::new());
        }

        let mut dirs = subdirs(&parent)?;
        dirs.sort_by_cached_key(|dir| snapshot_order(dir));
        Ok(dirs)
    }

    /// Copy the tables of `source_dir` into a new snapshot of `profile` and
    /// load `module` from it.
    ///
    /// Refuses with the full list of missing files before touching the profile
    /// or the repository.
    #[instrument(skip(self, repo))]
    pub fn import_data<R: CsvRepository>(
        &self,
        profile: &str,
        source_dir: &Path,
        module: Module,
        repo: &R,
    ) -> Result<ImportReport, ImportError>
    {
        let missing = missing_required_files(source_dir, module);
        if !missing.is_empty()
        {
            return Err(ImportError::MissingFiles(missing));
        }

        let profile = validate_profile_name(profile)?;

        repo.clear();

        let snapshot_dir = self.new_snapshot_dir(&profile)?;

        let mut copied = Vec::new();
        for file in TableWalker::new(&[])?.walk_files(source_dir)
        {
            let dest = copy_atomic(&file, &snapshot_dir).map_err(ImportError::io(&file))?;
            copied.push(dest);
        }

        debug!(files = copied.len(), snapshot = %snapshot_dir.display(), "snapshot written");

        let summary = load_module(&snapshot_dir, module, repo)?;

        Ok(ImportReport { profile, snapshot_dir, copied, summary })
    }
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>, ProfileError>
{
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(ProfileError::io(dir))?
    {
        let entry = entry.map_err(ProfileError::io(dir))?;
        if entry
            .file_type()
            .map_err(ProfileError::io(dir))?
            .is_dir()
        {
            dirs.push(entry.path());
        }
    }

    Ok(dirs)
}

/// `(stamp, n)` for `<stamp>` (n = 1) and `<stamp>_<n>`; other names sort
/// first, by name.
fn snapshot_order(dir: &Path) -> (String, u32)
{
    let name = dir
        .file_name()
        .map(|n| {
            n.to_string_lossy()
                .into_owned()
        })
        .unwrap_or_default();

    let parsed = name
        .split_at_checked(STAMP_LEN)
        .and_then(|(stamp, rest)| {
            let n = match rest.strip_prefix('_')
            {
                Some(suffix) => suffix
                    .parse()
                    .ok()?,
                None if rest.is_empty() => 1,
                None => return None,
            };
            Some((stamp.to_owned(), n))
        });

    match parsed
    {
        Some(order) => order,
        None => (name, 0),
    }
}

fn store() -> Result<ProfileStore>
{
    let config = load_config()?;
    Ok(ProfileStore::open(config.data_dir()?))
}

/// `rsetup import`: copy a data directory into a profile and load it.
pub fn run(
    args: ImportArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config = load_config()?;
    let module = args
        .module
        .unwrap_or(config.module);
    let profile = args
        .profile
        .unwrap_or_else(|| config.profile.clone());
    let store = ProfileStore::open(config.data_dir()?);

    if ctx.dry_run
    {
        let missing = missing_required_files(&args.dir, module);
        if !missing.is_empty()
        {
            anyhow::bail!("Missing {}", missing.join(", "));
        }
        if !ctx.quiet
        {
            println!(
                "DRY RUN: would import {} into {}",
                args.dir.display(),
                store
                    .profile_path(&profile)?
                    .join(SNAPSHOT_DIR)
                    .display()
            );
        }
        return Ok(());
    }

    let repo = FileCsvRepository::with_options(config.csv_options()?);
    let report = store
        .import_data(&profile, &args.dir, module, &repo)
        .with_context(|| format!("Failed to import {}", args.dir.display()))?;

    if !ctx.quiet
    {
        let line = format!(
            "Imported {} files ({} rows) into profile '{}' at {}",
            report
                .copied
                .len(),
            report
                .summary
                .total_rows(),
            report.profile,
            report
                .snapshot_dir
                .display()
        );
        if ctx.no_color
        {
            println!("{line}");
        }
        else
        {
            println!("{}", line.green());
        }
    }

    Ok(())
}

/// `rsetup profiles`: list profiles, optionally creating one first.
pub fn profiles_run(
    args: ProfilesArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let store = store()?;

    if let Some(name) = &args.create
    {
        if ctx.dry_run
        {
            println!("DRY RUN: would create {}", store.profile_path(name)?.display());
        }
        else if store
            .create_profile(name)
            .with_context(|| format!("Failed to create profile '{name}'"))?
            && !ctx.quiet
        {
            println!("Created profile '{}'", sanitize_profile_name(name));
        }
    }

    let profiles = store
        .list_profiles()
        .with_context(|| format!("Failed to list profiles in {}", store.root().display()))?;

    for name in profiles
    {
        let snapshots = store
            .snapshots(&name)?
            .len();
        if ctx.no_color
        {
            println!("{name} ({snapshots} snapshots)");
        }
        else
        {
            println!("{} ({snapshots} snapshots)", name.bold());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests
{
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn sanitize_collapses_non_word_runs()
    {
        assert_eq!(sanitize_profile_name("Field Team #2"), "Field_Team_2");
        assert_eq!(sanitize_profile_name("ok_name"), "ok_name");
        assert_eq!(sanitize_profile_name("café"), "caf_");
    }

    #[test]
    fn default_profile_always_listed_and_sorted() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let store = ProfileStore::open(tmp.path());

        assert!(store.create_profile("beta")?);
        assert!(store.create_profile("Alpha")?);
        assert!(!store.create_profile("beta")?);

        assert_eq!(store.list_profiles()?, vec!["Alpha", "beta", "default"]);
        Ok(())
    }

    #[test]
    fn snapshots_in_the_same_minute_do_not_collide() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let store = ProfileStore::open(tmp.path());

        let first = store.new_snapshot_dir("default")?;
        let second = store.new_snapshot_dir("default")?;

        assert_ne!(first, second);
        assert!(first.starts_with(tmp.path().join("pf/default/in")));
        assert_eq!(store.snapshots("default")?.len(), 2);
        Ok(())
    }

    #[test]
    fn empty_profile_name_is_refused_everywhere() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let store = ProfileStore::open(tmp.path());

        assert!(matches!(store.profile_path(""), Err(ProfileError::InvalidName(_))));
        assert!(matches!(store.create_profile(""), Err(ProfileError::InvalidName(_))));
        assert!(matches!(store.new_snapshot_dir(""), Err(ProfileError::InvalidName(_))));
        assert!(!store.root().join(SNAPSHOT_DIR).exists());

        assert_eq!(store.list_profiles()?, vec!["default"]);
        Ok(())
    }

    #[test]
    fn snapshots_order_numeric_suffixes_by_value() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let store = ProfileStore::open(tmp.path());
        let parent = store
            .profile_path("default")?
            .join(SNAPSHOT_DIR);

        for name in ["20260102_0900_10", "20260102_0900", "20260101_2359", "20260102_0900_2"]
        {
            fs::create_dir_all(parent.join(name))?;
        }

        let names: Vec<String> = store
            .snapshots("default")?
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| {
                n.to_string_lossy()
                    .into_owned()
            })
            .collect();

        assert_eq!(names, vec!["20260101_2359", "20260102_0900", "20260102_0900_2", "20260102_0900_10"]);
        Ok(())
    }
}
