//! **relief-setup** - data layer of a relief/health deployment setup tool
//!
//! Cached CSV reference tables with row-id indexes, voucher range coalescing,
//! module table loading and profile snapshots.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Core data layer
pub mod core {
    /// Untyped rows, the row id trait and the typed module tables
    pub mod row;
    pub use row::{SyncRow, TypedTable, UntypedRow};

    /// Per-key CSV cache with background loads and row-id indexes
    pub mod repository;
    pub use repository::{
        CsvError, CsvOptions, CsvRepository, FileCsvRepository, PendingLoad, RowIndex,
        TableSnapshot,
    };

    /// Integer range coalescing for voucher numbering
    pub mod range;
    pub use range::{Range, RangeDescriptor, run as ranges_run};

    /// Module table definitions and loading
    pub mod loader;
    pub use loader::{Module, check_run, load_module, run as load_run};

    /// Profiles and imported snapshots
    pub mod profile;
    pub use profile::{ProfileStore, profiles_run, run as import_run};
}

/// Infrastructure - configuration, table sources and directory walking
pub mod infra {
    /// Configuration management with TOML support and env overrides
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Table sources and atomic file copies
    pub mod io;
    pub use io::{DirSource, TableSource};

    /// Table file discovery
    pub mod walk;
    pub use walk::TableWalker;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use core::{check_run, import_run, load_run, profiles_run, ranges_run};
pub use infra::{Config, load_config};

// Core types for external consumers
pub use core::{CsvRepository, FileCsvRepository, Module, ProfileStore, Range};
