//! Concurrent cache of parsed CSV tables.
//!
//! Tables are cached per key: the file name for untyped tables, the row type
//! for typed ones. A cached table is an immutable [`TableSnapshot`] holding the
//! rows in file order together with their id index, so a reader never sees rows
//! and an index from two different loads.
//!
//! Population goes through moka's entry compute API, which serializes loads of
//! the same key while loads of different keys proceed in parallel.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    io::Read,
    sync::{Arc, mpsc},
};

use moka::{
    ops::compute::{CompResult, Op},
    sync::Cache,
};
use tracing::{debug, trace};

use crate::core::row::{SyncRow, TypedTable, UntypedRow};

/// Errors raised while loading or reading cached tables.
#[derive(Debug, thiserror::Error)]
pub enum CsvError
{
    #[error("Failed to open {key}")]
    Open
    {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {key}")]
    Read
    {
        key: String,
        #[source]
        source: csv::Error,
    },

    #[error("Duplicate row id '{id}' in {key}")]
    DuplicateRowId
    {
        key: String,
        id: String,
    },

    #[error("Invalid number '{value}' in record {record} of {key}")]
    InvalidNumber
    {
        key: String,
        record: u64,
        value: String,
    },

    #[error("Table {key} has not been loaded")]
    NotLoaded
    {
        key: String
    },

    #[error("Load of {key} stopped before completing")]
    Abandoned
    {
        key: String
    },
}

impl CsvError
{
    /// Cache key or file the error refers to
    pub fn key(&self) -> &str
    {
        match self
        {
            CsvError::Open { key, .. }
            | CsvError::Read { key, .. }
            | CsvError::DuplicateRowId { key, .. }
            | CsvError::InvalidNumber { key, .. }
            | CsvError::NotLoaded { key }
            | CsvError::Abandoned { key } => key,
        }
    }
}

/// Result of loading one table
pub type LoadResult<R> = Result<Arc<TableSnapshot<R>>, CsvError>;

/// Reader settings shared by every table.
#[derive(Debug, Clone)]
pub struct CsvOptions
{
    /// Field delimiter
    pub delimiter: u8,
}

impl Default for CsvOptions
{
    fn default() -> Self
    {
        Self { delimiter: b',' }
    }
}

impl CsvOptions
{
    fn reader<R: Read>(
        &self,
        input: R,
    ) -> csv::Reader<R>
    {
        csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(input)
    }
}

/// Immutable rows of one table plus their id index.
#[derive(Debug)]
pub struct TableSnapshot<R>
{
    key: String,

    /// Rows in file order
    rows: Vec<R>,

    /// Row id → position in `rows`; rows without an id are not indexed
    by_id: HashMap<String, usize>,
}

impl<R: SyncRow> TableSnapshot<R>
{
    /// Index `rows` by row id. Fails on the first repeated id.
    pub fn build(
        key: impl Into<String>,
        rows: Vec<R>,
    ) -> Result<Self, CsvError>
    {
        let key = key.into();
        let mut by_id = HashMap::with_capacity(rows.len());

        for (idx, row) in rows
            .iter()
            .enumerate()
        {
            let id = row.row_id();
            if id.is_empty()
            {
                continue;
            }

            if by_id
                .insert(id.to_owned(), idx)
                .is_some()
            {
                return Err(CsvError::DuplicateRowId { key, id: id.to_owned() });
            }
        }

        Ok(Self { key, rows, by_id })
    }

    /// Row with the given id.
    pub fn get(
        &self,
        id: &str,
    ) -> Option<&R>
    {
        self.by_id
            .get(id)
            .map(|&idx| &self.rows[idx])
    }
}

impl<R> TableSnapshot<R>
{
    pub fn key(&self) -> &str
    {
        &self.key
    }

    pub fn rows(&self) -> &[R]
    {
        &self.rows
    }

    pub fn len(&self) -> usize
    {
        self.rows
            .len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.rows
            .is_empty()
    }
}

/// Read-only id → row view over a cached table.
#[derive(Debug)]
pub struct RowIndex<R>(Arc<TableSnapshot<R>>);

impl<R> Clone for RowIndex<R>
{
    fn clone(&self) -> Self
    {
        Self(Arc::clone(&self.0))
    }
}

impl<R: SyncRow> RowIndex<R>
{
    pub fn get(
        &self,
        id: &str,
    ) -> Option<&R>
    {
        self.0
            .get(id)
    }

    pub fn contains_key(
        &self,
        id: &str,
    ) -> bool
    {
        self.0
            .by_id
            .contains_key(id)
    }

    /// Number of indexed rows
    pub fn len(&self) -> usize
    {
        self.0
            .by_id
            .len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.0
            .by_id
            .is_empty()
    }

    /// Indexed rows as `(id, row)`, in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &R)>
    {
        self.0
            .rows
            .iter()
            .filter_map(|row| {
                let id = row.row_id();
                (!id.is_empty()).then_some((id, row))
            })
    }
}

impl<R> From<Arc<TableSnapshot<R>>> for RowIndex<R>
{
    fn from(snapshot: Arc<TableSnapshot<R>>) -> Self
    {
        Self(snapshot)
    }
}

/// Handle to a table load running on the rayon pool.
///
/// Waiting blocks the calling thread, so never wait from inside a rayon task;
/// use the `read_*` methods there instead.
#[must_use = "the load result is only observable through wait()"]
pub struct PendingLoad<R>
{
    key: String,
    rx: mpsc::Receiver<LoadResult<R>>,
}

impl<R: Send + Sync + 'static> PendingLoad<R>
{
    fn spawn<F>(
        key: String,
        job: F,
    ) -> Self
    where
        F: FnOnce() -> LoadResult<R> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);

        rayon::spawn(move || {
            // Receiver may be gone if the caller dropped the handle
            let _ = tx.send(job());
        });

        Self { key, rx }
    }
}

impl<R> PendingLoad<R>
{
    pub fn key(&self) -> &str
    {
        &self.key
    }

    /// Block until the load finishes.
    pub fn wait(self) -> LoadResult<R>
    {
        let Self { key, rx } = self;

        rx.recv()
            .map_err(|_| CsvError::Abandoned { key })?
    }
}

/// Store of parsed CSV tables.
///
/// `read_*` run on the calling thread; `load_*` run the same work on the rayon
/// pool and hand back a [`PendingLoad`]. With `purge == false` an already
/// cached table is returned as is and the input is not read.
pub trait CsvRepository: Clone + Send + Sync + 'static
{
    fn read_untyped<R: Read>(
        &self,
        filename: &str,
        input: R,
        purge: bool,
    ) -> LoadResult<UntypedRow>;

    fn read_typed<T: TypedTable, R: Read>(
        &self,
        input: R,
        purge: bool,
    ) -> LoadResult<T>;

    /// Cached untyped table.
    fn untyped(
        &self,
        filename: &str,
    ) -> Option<Arc<TableSnapshot<UntypedRow>>>;

    /// Cached typed table.
    fn typed<T: TypedTable>(&self) -> Option<Arc<TableSnapshot<T>>>;

    /// Forget every cached table.
    fn clear(&self);

    fn load_untyped<R: Read + Send + 'static>(
        &self,
        filename: &str,
        input: R,
        purge: bool,
    ) -> PendingLoad<UntypedRow>
    {
        let repo = self.clone();
        let key = filename.to_owned();

        PendingLoad::spawn(key.clone(), move || repo.read_untyped(&key, input, purge))
    }

    fn load_typed<T: TypedTable, R: Read + Send + 'static>(
        &self,
        input: R,
        purge: bool,
    ) -> PendingLoad<T>
    {
        let repo = self.clone();

        PendingLoad::spawn(T::table_name().to_owned(), move || repo.read_typed::<T, R>(input, purge))
    }

    fn indexed_untyped(
        &self,
        filename: &str,
    ) -> Option<RowIndex<UntypedRow>>
    {
        self.untyped(filename)
            .map(RowIndex::from)
    }

    fn indexed_typed<T: TypedTable>(&self) -> Option<RowIndex<T>>
    {
        self.typed::<T>()
            .map(RowIndex::from)
    }
}

type ErasedSnapshot = Arc<dyn Any + Send + Sync>;

/// [`CsvRepository`] backed by in-memory moka caches. Clones share storage.
#[derive(Clone)]
pub struct FileCsvRepository
{
    /// File name → untyped table
    untyped: Cache<String, Arc<TableSnapshot<UntypedRow>>>,

    /// Row type → `Arc<TableSnapshot<T>>`
    typed: Cache<TypeId, ErasedSnapshot>,

    options: CsvOptions,
}

impl Default for FileCsvRepository
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl FileCsvRepository
{
    pub fn new() -> Self
    {
        Self::with_options(CsvOptions::default())
    }

    pub fn with_options(options: CsvOptions) -> Self
    {
        // No capacity bound: a cached table is only dropped by purge or clear()
        Self {
            untyped: Cache::builder().build(),
            typed: Cache::builder().build(),
            options,
        }
    }

    pub fn options(&self) -> &CsvOptions
    {
        &self.options
    }
}

impl CsvRepository for FileCsvRepository
{
    fn read_untyped<R: Read>(
        &self,
        filename: &str,
        input: R,
        purge: bool,
    ) -> LoadResult<UntypedRow>
    {
        let options = &self.options;
        let outcome = self
            .untyped
            .entry(filename.to_owned())
            .and_try_compute_with(|current| match current
            {
                Some(_) if !purge =>
                {
                    debug!(table = filename, "table already cached");
                    Ok(Op::Nop)
                }
                _ =>
                {
                    debug!(table = filename, "reading table from input");
                    let rows = parse_untyped(filename, input, options)?;

                    debug!(table = filename, rows = rows.len(), "computing index");
                    let snapshot = TableSnapshot::build(filename, rows)?;

                    Ok(Op::Put(Arc::new(snapshot)))
                }
            })?;

        let snapshot = settled(filename, outcome)?;
        debug!(table = filename, rows = snapshot.len(), "table ready");

        Ok(snapshot)
    }

    fn read_typed<T: TypedTable, R: Read>(
        &self,
        input: R,
        purge: bool,
    ) -> LoadResult<T>
    {
        let name = T::table_name();
        let options = &self.options;
        let outcome = self
            .typed
            .entry(TypeId::of::<T>())
            .and_try_compute_with(|current| match current
            {
                Some(_) if !purge =>
                {
                    debug!(table = name, "table already cached");
                    Ok(Op::Nop)
                }
                _ =>
                {
                    debug!(table = name, "reading typed table from input");
                    let rows = parse_typed::<T, R>(name, input, options)?;

                    debug!(table = name, rows = rows.len(), "computing index");
                    let snapshot: ErasedSnapshot = Arc::new(TableSnapshot::build(name, rows)?);

                    Ok(Op::Put(snapshot))
                }
            })?;

        let snapshot = downcast::<T>(settled(name, outcome)?)
            .ok_or_else(|| CsvError::NotLoaded { key: name.to_owned() })?;
        debug!(table = name, rows = snapshot.len(), "table ready");

        Ok(snapshot)
    }

    fn untyped(
        &self,
        filename: &str,
    ) -> Option<Arc<TableSnapshot<UntypedRow>>>
    {
        trace!(table = filename, "reading from cache");

        self.untyped
            .get(filename)
    }

    fn typed<T: TypedTable>(&self) -> Option<Arc<TableSnapshot<T>>>
    {
        trace!(table = T::table_name(), "reading from cache");

        self.typed
            .get(&TypeId::of::<T>())
            .and_then(downcast::<T>)
    }

    fn clear(&self)
    {
        debug!("clearing cached tables");

        self.untyped
            .invalidate_all();
        self.typed
            .invalidate_all();
    }
}

/// Value left in the cache after a compute.
fn settled<K, V>(
    key: &str,
    outcome: CompResult<K, V>,
) -> Result<V, CsvError>
{
    outcome
        .into_entry()
        .map(|entry| entry.into_value())
        .ok_or_else(|| CsvError::NotLoaded { key: key.to_owned() })
}

fn downcast<T: TypedTable>(erased: ErasedSnapshot) -> Option<Arc<TableSnapshot<T>>>
{
    erased
        .downcast::<TableSnapshot<T>>()
        .ok()
}

fn read_error(
    key: &str,
    source: csv::Error,
) -> CsvError
{
    CsvError::Read { key: key.to_owned(), source }
}

fn parse_untyped<R: Read>(
    key: &str,
    input: R,
    options: &CsvOptions,
) -> Result<Vec<UntypedRow>, CsvError>
{
    let mut reader = options.reader(input);
    let headers = reader
        .headers()
        .map_err(|e| read_error(key, e))?
        .clone();

    reader
        .records()
        .map(|record| {
            let record = record.map_err(|e| read_error(key, e))?;

            Ok(headers
                .iter()
                .zip(record.iter())
                .collect())
        })
        .collect()
}

fn parse_typed<T: TypedTable, R: Read>(
    key: &str,
    input: R,
    options: &CsvOptions,
) -> Result<Vec<T>, CsvError>
{
    options
        .reader(input)
        .deserialize::<T>()
        .map(|row| row.map_err(|e| read_error(key, e)))
        .collect()
}
