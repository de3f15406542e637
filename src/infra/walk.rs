//! Filepath: src/infra/walk.rs
//! Table file discovery inside a data directory.
//! - Only regular files whose *name* matches the table globs (default `*.csv`)
//! - Top level only unless a depth is given
//! - Ignore files (.gitignore etc.) are not consulted: exported data dirs are
//!   not repositories and every table counts
//! - Deterministic ordering for stable tests/CI
//!
//! Backed by ripgrep's `ignore` crate and `globset`.

use std::path::{Path, PathBuf};

use globset::{Error, Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;

/// Default glob for table files
pub const TABLE_GLOB: &str = "*.csv";

/// Walker listing the table files of a data directory.
pub struct TableWalker
{
    /// Compiled file name patterns a table must match
    patterns: GlobSet,

    /// Maximum recursion depth; default Some(1) (directory itself)
    max_depth: Option<usize>,
}

impl TableWalker
{
    /// Build a walker for file names matching any of `patterns`; an empty
    /// slice means [`TABLE_GLOB`].
    pub fn new(patterns: &[String]) -> Result<Self, Error>
    {
        let mut builder = GlobSetBuilder::new();

        if patterns.is_empty()
        {
            builder.add(Glob::new(TABLE_GLOB)?);
        }

        for pattern in patterns
        {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self { patterns: builder.build()?, max_depth: Some(1) })
    }

    /// (Optional) Limit recursion depth (`None` = unbounded).
    pub fn with_max_depth(
        mut self,
        depth: Option<usize>,
    ) -> Self
    {
        self.max_depth = depth;
        self
    }

    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        // Plain listing: no ignore files, no parent lookups
        b.standard_filters(false);

        // Dotfiles are never tables
        b.hidden(true);
        b.follow_links(false);
        b.max_depth(self.max_depth);

        b
    }

    /// Table files under `root`, sorted.
    pub fn walk_files<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<PathBuf>
    {
        let root_path = root.as_ref();
        let walker = self
            .build_walk(root_path)
            .build();

        let mut out: Vec<PathBuf> = walker
            // Drop entries with IO errors
            .filter_map(|res| res.ok())
            .filter(|entry| {
                entry
                    .file_type()
                    .is_some_and(|ft| ft.is_file())
            })
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.file_name()
                    .is_some_and(|name| {
                        self.patterns
                            .is_match(name)
                    })
            })
            .collect();

        out.sort();

        out
    }
}
