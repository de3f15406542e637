//! Loading a deployment module's tables into the CSV repository.
//!
//! A module (Relief or Health) requires a fixed set of base tables. Some base
//! tables point at per-form custom tables through a form id column; those are
//! loaded untyped once the base table is in.

use std::{
    fmt,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use owo_colors::OwoColorize;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tabled::{Table, Tabled, builder::Builder, settings::Style};
use tracing::{debug, instrument};

use crate::cli::{AppContext, CheckArgs, LoadArgs, OutputFormat};
use crate::core::repository::{CsvError, CsvRepository, FileCsvRepository, TableSnapshot};
use crate::core::row::{
    Authorization, BeneficiaryEntity, Entitlement, HasCustomTable, Individual, TypedTable,
    UntypedRow, VisitProgram, custom_table_file_name,
};
use crate::infra::config::load_config;
use crate::infra::io::{DirSource, TableSource};

/// Deployment module a data directory is prepared for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Module
{
    Relief,
    Health,
}

impl Module
{
    /// Base table files the module cannot run without.
    pub fn required_files(self) -> &'static [&'static str]
    {
        match self
        {
            Module::Relief => &[
                Authorization::FILE_NAME,
                Entitlement::FILE_NAME,
                BeneficiaryEntity::FILE_NAME,
                Individual::FILE_NAME,
            ],
            Module::Health => &[
                BeneficiaryEntity::FILE_NAME,
                Individual::FILE_NAME,
                VisitProgram::FILE_NAME,
            ],
        }
    }
}

impl fmt::Display for Module
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        match self
        {
            Module::Relief => write!(f, "relief"),
            Module::Health => write!(f, "health"),
        }
    }
}

/// Required files of `module` that are absent from `dir`, in definition order.
pub fn missing_required_files(
    dir: &Path,
    module: Module,
) -> Vec<String>
{
    module
        .required_files()
        .iter()
        .filter(|name| !dir.join(name).is_file())
        .map(|name| name.to_string())
        .collect()
}

/// Load `T`'s table both typed and untyped, in parallel, replacing any cached
/// copy. Returns the typed snapshot.
pub fn read_base_table<T, S, R>(
    source: &S,
    repo: &R,
) -> Result<Arc<TableSnapshot<T>>, CsvError>
where
    T: TypedTable,
    S: TableSource,
    R: CsvRepository,
{
    let file = T::FILE_NAME;

    let (typed, untyped) = rayon::join(
        || {
            source
                .open(file)
                .and_then(|input| repo.read_typed::<T, _>(input, true))
        },
        || {
            source
                .open(file)
                .and_then(|input| repo.read_untyped(file, input, true))
        },
    );

    untyped?;
    typed
}

/// Load `T`'s base table, then every distinct custom table its rows name.
/// Returns the custom table file names, in first-seen order.
#[instrument(skip_all, fields(table = T::table_name()))]
pub fn read_base_table_with_custom_table<T, S, R>(
    source: &S,
    repo: &R,
) -> Result<Vec<String>, CsvError>
where
    T: TypedTable + HasCustomTable,
    S: TableSource,
    R: CsvRepository,
{
    let base = read_base_table::<T, S, R>(source, repo)?;

    let custom_files: Vec<String> = base
        .rows()
        .iter()
        .filter_map(HasCustomTable::custom_table_form_id)
        .unique()
        .map(custom_table_file_name)
        .collect();

    debug!(count = custom_files.len(), "loading custom tables");

    custom_files
        .par_iter()
        .try_for_each(|file| {
            let input = source.open(file)?;
            repo.read_untyped(file, input, true)
                .map(|_| ())
        })?;

    Ok(custom_files)
}

fn load_base<T, R>(
    source: &DirSource,
    repo: &R,
) -> Result<Vec<String>, CsvError>
where
    T: TypedTable,
    R: CsvRepository,
{
    read_base_table::<T, _, R>(source, repo).map(|_| Vec::new())
}

fn load_with_custom<T, R>(
    source: &DirSource,
    repo: &R,
) -> Result<Vec<String>, CsvError>
where
    T: TypedTable + HasCustomTable,
    R: CsvRepository,
{
    read_base_table_with_custom_table::<T, _, R>(source, repo)
}

type TableLoad<R> = fn(&DirSource, &R) -> Result<Vec<String>, CsvError>;

fn module_tables<R: CsvRepository>(module: Module) -> Vec<(&'static str, TableLoad<R>)>
{
    match module
    {
        Module::Relief => vec![
            (Authorization::FILE_NAME, load_with_custom::<Authorization, R> as TableLoad<R>),
            (Entitlement::FILE_NAME, load_base::<Entitlement, R> as TableLoad<R>),
            (BeneficiaryEntity::FILE_NAME, load_with_custom::<BeneficiaryEntity, R> as TableLoad<R>),
            (Individual::FILE_NAME, load_with_custom::<Individual, R> as TableLoad<R>),
        ],
        Module::Health => vec![
            (BeneficiaryEntity::FILE_NAME, load_with_custom::<BeneficiaryEntity, R> as TableLoad<R>),
            (Individual::FILE_NAME, load_with_custom::<Individual, R> as TableLoad<R>),
            (VisitProgram::FILE_NAME, load_with_custom::<VisitProgram, R> as TableLoad<R>),
        ],
    }
}

/// Row count of one loaded table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct TableSummary
{
    pub file: String,
    pub rows: usize,
    /// Whether the table is a per-form custom table
    pub custom: bool,
}

/// What [`load_module`] put into the repository.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleSummary
{
    pub module: Module,
    pub dir: PathBuf,
    /// Base tables first, in definition order, then custom tables
    pub tables: Vec<TableSummary>,
}

impl ModuleSummary
{
    pub fn total_rows(&self) -> usize
    {
        self.tables
            .iter()
            .map(|t| t.rows)
            .sum()
    }
}

/// Load every table of `module` from `dir`, base tables in parallel.
#[instrument(skip(repo))]
pub fn load_module<R: CsvRepository>(
    dir: &Path,
    module: Module,
    repo: &R,
) -> Result<ModuleSummary, CsvError>
{
    let source = DirSource::new(dir);
    let tables = module_tables::<R>(module);

    let custom_per_table: Vec<Vec<String>> = tables
        .par_iter()
        .map(|(_, load)| load(&source, repo))
        .collect::<Result<_, _>>()?;

    let rows_of = |file: &str| {
        repo.untyped(file)
            .map_or(0, |t| t.len())
    };

    let mut summaries: Vec<TableSummary> = tables
        .iter()
        .map(|(file, _)| TableSummary { file: file.to_string(), rows: rows_of(file), custom: false })
        .collect();

    summaries.extend(
        custom_per_table
            .into_iter()
            .flatten()
            .unique()
            .map(|file| TableSummary { rows: rows_of(&file), file, custom: true }),
    );

    debug!(tables = summaries.len(), "module loaded");

    Ok(ModuleSummary { module, dir: dir.to_path_buf(), tables: summaries })
}

/// Numbers from a headerless CSV: the first column of every record.
/// Records with an empty first field are skipped.
pub fn read_range_csv(path: &Path) -> Result<Vec<i64>, CsvError>
{
    let key = path
        .display()
        .to_string();
    let file = File::open(path).map_err(|source| CsvError::Open { key: key.clone(), source })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let mut values = Vec::new();
    for (idx, record) in reader
        .records()
        .enumerate()
    {
        let record = record.map_err(|source| CsvError::Read { key: key.clone(), source })?;

        let Some(first) = record
            .get(0)
            .filter(|v| !v.is_empty())
        else
        {
            continue;
        };

        let value = first
            .parse::<i64>()
            .map_err(|_| CsvError::InvalidNumber {
                key: key.clone(),
                record: idx as u64 + 1,
                value: first.to_owned(),
            })?;
        values.push(value);
    }

    Ok(values)
}

/// `rsetup check`: report required tables missing from a directory.
pub fn check_run(
    args: CheckArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config = load_config()?;
    let module = args
        .module
        .unwrap_or(config.module);

    let missing = missing_required_files(&args.dir, module);

    if missing.is_empty()
    {
        if !ctx.quiet
        {
            let msg = format!(
                "All {} required {module} tables present in {}",
                module
                    .required_files()
                    .len(),
                args.dir.display()
            );
            if ctx.no_color
            {
                println!("{msg}");
            }
            else
            {
                println!("{}", msg.green());
            }
        }
        return Ok(());
    }

    for name in &missing
    {
        if ctx.no_color
        {
            println!("missing: {name}");
        }
        else
        {
            println!("{} {name}", "missing:".red());
        }
    }

    anyhow::bail!("Missing {}", missing.join(", "))
}

/// `rsetup load`: load a module directory and print a summary, a table, or a row.
pub fn run(
    args: LoadArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config = load_config()?;
    let module = args
        .module
        .unwrap_or(config.module);

    let missing = missing_required_files(&args.dir, module);
    if !missing.is_empty()
    {
        anyhow::bail!("Missing {}", missing.join(", "));
    }

    if ctx.dry_run
    {
        if !ctx.quiet
        {
            println!("DRY RUN: would load {module} tables from {}", args.dir.display());
        }
        return Ok(());
    }

    let repo = FileCsvRepository::with_options(config.csv_options()?);

    let spinner = if ctx.quiet
    {
        ProgressBar::hidden()
    }
    else
    {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.set_message(format!("Loading {module} tables"));
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    };

    let summary = load_module(&args.dir, module, &repo)
        .with_context(|| format!("Failed to load {}", args.dir.display()))?;
    spinner.finish_and_clear();

    match args.table
    {
        Some(file) =>
        {
            let table = repo
                .untyped(&file)
                .with_context(|| format!("Table {file} is not part of the {module} module"))?;
            print_table(&table, args.id.as_deref(), args.format)
        }
        None => print_summary(&summary, args.format, ctx),
    }
}

fn print_summary(
    summary: &ModuleSummary,
    format: OutputFormat,
    ctx: &AppContext,
) -> Result<()>
{
    match format
    {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
        OutputFormat::Text =>
        {
            let mut table = Table::new(&summary.tables);
            table.with(Style::rounded());
            println!("{table}");

            if !ctx.quiet
            {
                println!(
                    "{} tables, {} rows",
                    summary
                        .tables
                        .len(),
                    summary.total_rows()
                );
            }
        }
    }

    Ok(())
}

fn print_table(
    table: &TableSnapshot<UntypedRow>,
    id: Option<&str>,
    format: OutputFormat,
) -> Result<()>
{
    let rows: Vec<&UntypedRow> = match id
    {
        Some(id) => vec![
            table
                .get(id)
                .with_context(|| format!("No row '{id}' in {}", table.key()))?,
        ],
        None => table
            .rows()
            .iter()
            .collect(),
    };

    match format
    {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Text =>
        {
            let Some(first) = rows.first()
            else
            {
                println!("{} is empty", table.key());
                return Ok(());
            };

            let mut builder = Builder::default();
            builder.push_record(first.columns().map(|(name, _)| name));
            for row in &rows
            {
                builder.push_record(row.columns().map(|(_, value)| value));
            }

            let mut out = builder.build();
            out.with(Style::rounded());
            println!("{out}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests
{
    use std::{collections::HashMap, io::Cursor};

    use super::*;

    /// In-memory tables keyed by file name
    struct MemorySource(HashMap<&'static str, &'static str>);

    impl TableSource for MemorySource
    {
        type Reader = Cursor<&'static [u8]>;

        fn open(
            &self,
            file_name: &str,
        ) -> Result<Self::Reader, CsvError>
        {
            self.0
                .get(file_name)
                .map(|text| Cursor::new(text.as_bytes()))
                .ok_or_else(|| CsvError::Open {
                    key: file_name.to_owned(),
                    source: std::io::ErrorKind::NotFound.into(),
                })
        }
    }

    #[test]
    fn base_table_is_cached_typed_and_untyped()
    {
        let source = MemorySource(HashMap::from([(
            "entitlements.csv",
            "_id,authorization_id,beneficiary_entity_id,status\ne1,a1,b1,ACTIVE\n",
        )]));
        let repo = FileCsvRepository::new();

        let typed = read_base_table::<Entitlement, _, _>(&source, &repo).unwrap();

        assert_eq!(typed.rows()[0].authorization_id, "a1");
        assert_eq!(
            repo.untyped("entitlements.csv")
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn custom_tables_are_loaded_once_per_form()
    {
        let source = MemorySource(HashMap::from([
            (
                "authorizations.csv",
                "_id,name,custom_delivery_form_id\n\
                 a1,Food,food_delivery\n\
                 a2,Food again,food_delivery\n\
                 a3,Cash,\n\
                 a4,Shelter,shelter_delivery\n",
            ),
            ("food_delivery.csv", "_id,kg\nd1,5\nd2,10\n"),
            ("shelter_delivery.csv", "_id,kits\ns1,1\n"),
        ]));
        let repo = FileCsvRepository::new();

        let custom = read_base_table_with_custom_table::<Authorization, _, _>(&source, &repo)
            .unwrap();

        assert_eq!(custom, vec!["food_delivery.csv", "shelter_delivery.csv"]);
        assert_eq!(
            repo.indexed_untyped("food_delivery.csv")
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn missing_custom_table_fails_with_its_name()
    {
        let source = MemorySource(HashMap::from([(
            "visit_programs.csv",
            "_id,name,custom_visit_form_id\nv1,ANC,anc_visit\n",
        )]));
        let repo = FileCsvRepository::new();

        let err = read_base_table_with_custom_table::<VisitProgram, _, _>(&source, &repo)
            .unwrap_err();

        assert!(matches!(err, CsvError::Open { .. }));
        assert_eq!(err.key(), "anc_visit.csv");
    }

    #[test]
    fn modules_share_beneficiary_tables()
    {
        let relief = Module::Relief.required_files();
        let health = Module::Health.required_files();

        assert!(relief.contains(&"beneficiary_entities.csv"));
        assert!(health.contains(&"beneficiary_entities.csv"));
        assert!(!relief.contains(&"visit_programs.csv"));
        assert_eq!(Module::Health.to_string(), "health");
    }
}
