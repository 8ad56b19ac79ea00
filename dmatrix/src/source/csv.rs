//! Delimited-text files (`.csv`, `.tsv`)
//!
//! Files must carry a header row. Column types are inferred from the first
//! records and cast to `f64`. A single file cannot be split ahead of a full
//! read, so it is only ever loaded centrally; a list of files has one
//! partition per file. Row counts come from a record scan that parses no
//! values.

use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use tracing::debug;

use crate::errors::{MatrixError, Result};
use crate::frame::DataFrame;

use super::adapter::{check_partitions, SourceAdapter};
use super::{has_extension, DataSource, Partitioning};

/// Records sampled for schema inference
const INFER_SCHEMA_RECORDS: usize = 1000;

pub struct CsvAdapter;

impl CsvAdapter {
    fn paths<'a>(&self, source: &'a DataSource) -> Result<&'a [std::path::PathBuf]> {
        match source {
            DataSource::Paths(paths) => Ok(paths),
            other => Err(MatrixError::Config(format!(
                "csv adapter cannot read {}",
                other.describe()
            ))),
        }
    }

    fn delimiter(path: &Path) -> u8 {
        if has_extension(path, &["tsv"]) {
            b'\t'
        } else {
            b','
        }
    }

    fn open(path: &Path) -> Result<(File, Format)> {
        let file = File::open(path).map_err(|e| {
            MatrixError::Load(format!("cannot open {}: {}", path.display(), e))
        })?;
        let format = Format::default()
            .with_header(true)
            .with_delimiter(Self::delimiter(path));
        Ok((file, format))
    }

    /// Header names of one file
    pub fn header(path: &Path) -> Result<Vec<String>> {
        let (file, format) = Self::open(path)?;
        let (schema, _) = format.infer_schema(file, Some(0))?;
        Ok(schema.fields().iter().map(|f| f.name().clone()).collect())
    }

    /// Data records in one file, excluding the header
    pub fn count_records(path: &Path) -> Result<usize> {
        let (file, format) = Self::open(path)?;
        let (_, records) = format.infer_schema(file, None)?;
        debug!(path = %path.display(), records, "Counted delimited records");
        Ok(records)
    }

    /// Read one delimited file fully
    pub fn read_file(path: &Path) -> Result<DataFrame> {
        let delimiter = Self::delimiter(path);
        let (mut file, format) = Self::open(path)?;
        let (schema, _) = format.infer_schema(&mut file, Some(INFER_SCHEMA_RECORDS))?;
        file.rewind()?;

        let schema = Arc::new(schema);
        let reader = ReaderBuilder::new(Arc::clone(&schema))
            .with_header(true)
            .with_delimiter(delimiter)
            .build(file)?;

        let mut frames = Vec::new();
        for batch in reader {
            frames.push(DataFrame::from_record_batch(&batch?)?);
        }

        if frames.is_empty() {
            let columns = schema.fields().iter().map(|f| f.name().clone()).collect();
            return Ok(DataFrame::empty(columns));
        }

        let frame = DataFrame::concat(&frames)?;
        debug!(
            path = %path.display(),
            rows = frame.num_rows(),
            columns = frame.num_columns(),
            "Read delimited file"
        );
        Ok(frame)
    }
}

impl SourceAdapter for CsvAdapter {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn matches(&self, source: &DataSource) -> bool {
        match source {
            DataSource::Paths(paths) => {
                !paths.is_empty() && paths.iter().all(|p| has_extension(p, &["csv", "tsv"]))
            }
            _ => false,
        }
    }

    fn partitioning(&self, _source: &DataSource) -> Partitioning {
        Partitioning::External
    }

    fn partition_count(&self, source: &DataSource) -> Result<usize> {
        Ok(self.paths(source)?.len())
    }

    fn is_distributable(&self, source: &DataSource) -> bool {
        matches!(source, DataSource::Paths(paths) if paths.len() > 1)
    }

    fn row_count(&self, source: &DataSource) -> Result<Option<usize>> {
        let mut total = 0;
        for path in self.paths(source)? {
            total += Self::count_records(path)?;
        }
        Ok(Some(total))
    }

    fn columns(&self, source: &DataSource) -> Result<Vec<String>> {
        match self.paths(source)?.first() {
            Some(first) => Self::header(first),
            None => Ok(Vec::new()),
        }
    }

    fn load(&self, source: &DataSource, partitions: &[usize]) -> Result<DataFrame> {
        let paths = self.paths(source)?;
        check_partitions(self.name(), partitions, paths.len())?;

        let frames = partitions
            .iter()
            .map(|&p| Self::read_file(&paths[p]))
            .collect::<Result<Vec<_>>>()?;
        DataFrame::concat(&frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_read_csv_with_header() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "data.csv", "a,b,label\n1,0,0\n0,1,1\n0.5,2,3\n");

        let source = DataSource::path(&path);
        let frame = CsvAdapter.load(&source, &[0]).unwrap();
        assert_eq!(
            frame.columns(),
            &["a".to_string(), "b".to_string(), "label".to_string()]
        );
        assert_eq!(frame.num_rows(), 3);
        assert_eq!(frame.column("a").unwrap().to_vec(), vec![1.0, 0.0, 0.5]);
    }

    #[test]
    fn test_read_tsv() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "data.tsv", "x\ty\n1\t2\n3\t4\n");
        let frame = CsvAdapter::read_file(Path::new(&path)).unwrap();
        assert_eq!(frame.column("y").unwrap().to_vec(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_single_file_not_distributable() {
        let single = DataSource::path("one.csv");
        let multi = DataSource::paths(["one.csv", "two.csv"]);
        assert!(!CsvAdapter.is_distributable(&single));
        assert!(!CsvAdapter.infer_distributed(&single).unwrap());
        assert!(CsvAdapter.is_distributable(&multi));
        assert!(CsvAdapter.infer_distributed(&multi).unwrap());
        assert_eq!(CsvAdapter.partition_count(&multi).unwrap(), 2);
    }

    #[test]
    fn test_row_count_and_header_without_loading() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.csv", "x,y\n1,2\n3,4\n5,6\n");
        let b = write(&dir, "b.csv", "x,y\n7,8\n");

        let source = DataSource::paths([a, b]);
        assert_eq!(CsvAdapter.row_count(&source).unwrap(), Some(4));
        assert_eq!(
            CsvAdapter.columns(&source).unwrap(),
            vec!["x".to_string(), "y".to_string()]
        );
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = CsvAdapter
            .load(&DataSource::path("/nonexistent/dir/x.csv"), &[0])
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Load);
    }

    #[test]
    fn test_loads_only_requested_files() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.csv", "v\n1\n2\n");
        let b = write(&dir, "b.csv", "v\n3\n");
        // Third file does not exist; loading partitions 1 and 0 must not touch it.
        let c = dir.path().join("missing.csv").to_string_lossy().into_owned();

        let source = DataSource::paths([a, b, c]);
        let frame = CsvAdapter.load(&source, &[1, 0]).unwrap();
        assert_eq!(frame.column("v").unwrap().to_vec(), vec![3.0, 1.0, 2.0]);
    }
}
