use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::core::repository::CsvError;

/// Opens named CSV tables on demand. Every call yields a fresh reader, so the
/// same table can be read more than once (typed and untyped).
pub trait TableSource: Send + Sync
{
    type Reader: Read + Send + 'static;

    fn open(
        &self,
        file_name: &str,
    ) -> Result<Self::Reader, CsvError>;
}

/// Tables stored as files in one directory.
#[derive(Debug, Clone)]
pub struct DirSource
{
    root: PathBuf,
}

impl DirSource
{
    pub fn new(root: impl Into<PathBuf>) -> Self
    {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path
    {
        &self.root
    }

    pub fn path_of(
        &self,
        file_name: &str,
    ) -> PathBuf
    {
        self.root
            .join(file_name)
    }

    pub fn exists(
        &self,
        file_name: &str,
    ) -> bool
    {
        self.path_of(file_name)
            .is_file()
    }
}

impl TableSource for DirSource
{
    type Reader = BufReader<File>;

    fn open(
        &self,
        file_name: &str,
    ) -> Result<Self::Reader, CsvError>
    {
        File::open(self.path_of(file_name))
            .map(BufReader::new)
            .map_err(|source| CsvError::Open { key: file_name.to_owned(), source })
    }
}

/// Copy `src` into `dest_dir` under the same name, through a temp file in the
/// destination so a partial copy never shows up under the final name.
pub fn copy_atomic(
    src: &Path,
    dest_dir: &Path,
) -> io::Result<PathBuf>
{
    let name = src
        .file_name()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a file path: {}", src.display()),
            )
        })?;
    let dest = dest_dir.join(name);

    let mut input = File::open(src)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dest_dir)?;

    io::copy(&mut input, &mut tmp)?;
    tmp.flush()?;
    tmp.as_file()
        .sync_all()?;

    // Atomically move into place
    tmp.persist(&dest)?;

    Ok(dest)
}

/// Create `dir` and its parents; true if it did not exist before.
pub fn ensure_dir(dir: &Path) -> io::Result<bool>
{
    if dir.is_dir()
    {
        return Ok(false);
    }

    fs::create_dir_all(dir)?;
    Ok(true)
}

#[cfg(test)]
mod tests
{
    use anyhow::Result;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn dir_source_opens_fresh_readers() -> Result<()>
    {
        let tmp = TempDir::new()?;
        fs::write(tmp.path().join("a.csv"), "_id\nx\n")?;
        let source = DirSource::new(tmp.path());

        for _ in 0..2
        {
            let mut text = String::new();
            source
                .open("a.csv")?
                .read_to_string(&mut text)?;
            assert_eq!(text, "_id\nx\n");
        }

        assert!(source.exists("a.csv"));
        assert!(!source.exists("b.csv"));
        Ok(())
    }

    #[test]
    fn missing_table_is_an_open_error()
    {
        let tmp = TempDir::new().unwrap();
        let err = DirSource::new(tmp.path())
            .open("nope.csv")
            .unwrap_err();

        assert!(matches!(err, CsvError::Open { .. }));
        assert_eq!(err.key(), "nope.csv");
    }

    #[test]
    fn copy_atomic_keeps_name_and_content() -> Result<()>
    {
        let src_dir = TempDir::new()?;
        let dest_dir = TempDir::new()?;
        let src = src_dir.path().join("individuals.csv");
        fs::write(&src, "_id\ni1\n")?;

        let dest = copy_atomic(&src, dest_dir.path())?;

        assert_eq!(dest, dest_dir.path().join("individuals.csv"));
        assert_eq!(fs::read_to_string(dest)?, "_id\ni1\n");
        Ok(())
    }

    #[test]
    fn ensure_dir_reports_creation() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let nested = tmp.path().join("a/b");

        assert!(ensure_dir(&nested)?);
        assert!(!ensure_dir(&nested)?);
        Ok(())
    }
}
