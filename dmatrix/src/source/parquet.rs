//! Columnar files (`.parquet`, `.pq`)
//!
//! A single file is split along its row groups; a list of files has one
//! partition per file. When a single file has fewer row groups than actors
//! (one group is the common case), the plan cuts it into contiguous row
//! ranges instead. Row counts come from footer metadata, so planning never
//! reads row data.

use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

use parquet::arrow::arrow_reader::{ParquetRecordBatchReaderBuilder, RowSelection, RowSelector};
use tracing::debug;

use crate::errors::{MatrixError, Result};
use crate::frame::DataFrame;
use crate::sharding::batch_range;

use super::adapter::{check_partitions, SourceAdapter};
use super::{has_extension, DataSource, Partitioning};

pub struct ParquetAdapter;

/// A readable unit: a whole file, one row group, or a row range of a file
#[derive(Debug, Clone, PartialEq, Eq)]
enum Unit<'a> {
    File(&'a Path),
    RowGroup(&'a Path, usize),
    Rows(&'a Path, Range<usize>),
}

impl ParquetAdapter {
    fn paths<'a>(&self, source: &'a DataSource) -> Result<&'a [PathBuf]> {
        match source {
            DataSource::Paths(paths) => Ok(paths),
            other => Err(MatrixError::Config(format!(
                "parquet adapter cannot read {}",
                other.describe()
            ))),
        }
    }

    fn open(path: &Path) -> Result<ParquetRecordBatchReaderBuilder<File>> {
        let file = File::open(path).map_err(|e| {
            MatrixError::Load(format!("cannot open {}: {}", path.display(), e))
        })?;
        Ok(ParquetRecordBatchReaderBuilder::try_new(file)?)
    }

    /// Number of row groups in one file
    pub fn row_groups(path: &Path) -> Result<usize> {
        Ok(Self::open(path)?.metadata().num_row_groups())
    }

    /// Rows in one file, from footer metadata
    pub fn file_rows(path: &Path) -> Result<usize> {
        let rows = Self::open(path)?.metadata().file_metadata().num_rows();
        usize::try_from(rows)
            .map_err(|_| MatrixError::Load(format!("{}: invalid row count {}", path.display(), rows)))
    }

    /// Units of the source; `split` asks for that many row ranges of a
    /// single file when it exceeds the row group count
    fn units<'a>(&self, paths: &'a [PathBuf], split: Option<usize>) -> Result<Vec<Unit<'a>>> {
        match paths {
            [single] => {
                let groups = Self::row_groups(single)?;
                match split {
                    Some(count) if count > groups => {
                        let rows = Self::file_rows(single)?;
                        Ok((0..count)
                            .map(|k| Unit::Rows(single.as_path(), batch_range(k, count, rows)))
                            .collect())
                    }
                    _ => Ok((0..groups)
                        .map(|g| Unit::RowGroup(single.as_path(), g))
                        .collect()),
                }
            }
            many => Ok(many.iter().map(|p| Unit::File(p.as_path())).collect()),
        }
    }

    fn read_units(&self, units: &[Unit<'_>], partitions: &[usize]) -> Result<DataFrame> {
        check_partitions(self.name(), partitions, units.len())?;
        let frames = partitions
            .iter()
            .map(|&p| Self::read_unit(&units[p]))
            .collect::<Result<Vec<_>>>()?;
        DataFrame::concat(&frames)
    }

    fn read_unit(unit: &Unit<'_>) -> Result<DataFrame> {
        let (path, builder) = match unit {
            Unit::File(path) => (*path, Self::open(path)?),
            Unit::RowGroup(path, group) => (*path, Self::open(path)?.with_row_groups(vec![*group])),
            Unit::Rows(path, range) => {
                let selection = RowSelection::from(vec![
                    RowSelector::skip(range.start),
                    RowSelector::select(range.len()),
                ]);
                (*path, Self::open(path)?.with_row_selection(selection))
            }
        };

        let columns: Vec<String> = builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();

        let mut frames = Vec::new();
        for batch in builder.build()? {
            frames.push(DataFrame::from_record_batch(&batch?)?);
        }

        let frame = if frames.is_empty() {
            DataFrame::empty(columns)
        } else {
            DataFrame::concat(&frames)?
        };

        debug!(
            path = %path.display(),
            unit = ?unit,
            rows = frame.num_rows(),
            "Read parquet unit"
        );
        Ok(frame)
    }
}

impl SourceAdapter for ParquetAdapter {
    fn name(&self) -> &'static str {
        "parquet"
    }

    fn matches(&self, source: &DataSource) -> bool {
        match source {
            DataSource::Paths(paths) => {
                !paths.is_empty() && paths.iter().all(|p| has_extension(p, &["parquet", "pq"]))
            }
            _ => false,
        }
    }

    fn partitioning(&self, _source: &DataSource) -> Partitioning {
        Partitioning::External
    }

    fn partition_count(&self, source: &DataSource) -> Result<usize> {
        let paths = self.paths(source)?;
        Ok(self.units(paths, None)?.len())
    }

    /// A single file with fewer row groups than actors is planned as one
    /// row range per actor, capped at one row per range
    fn split_count(&self, source: &DataSource, num_actors: usize) -> Result<usize> {
        let paths = self.paths(source)?;
        let natural = self.units(paths, None)?.len();
        match paths {
            [single] if natural < num_actors => {
                let rows = Self::file_rows(single)?;
                Ok(natural.max(num_actors.min(rows)))
            }
            _ => Ok(natural),
        }
    }

    fn is_distributable(&self, _source: &DataSource) -> bool {
        true
    }

    /// Columnar sources are always distributed unless overridden; a single
    /// file can always be cut into row ranges
    fn infer_distributed(&self, _source: &DataSource) -> Result<bool> {
        Ok(true)
    }

    fn row_count(&self, source: &DataSource) -> Result<Option<usize>> {
        let mut total = 0;
        for path in self.paths(source)? {
            total += Self::file_rows(path)?;
        }
        Ok(Some(total))
    }

    fn columns(&self, source: &DataSource) -> Result<Vec<String>> {
        let Some(first) = self.paths(source)?.first() else {
            return Ok(Vec::new());
        };
        Ok(Self::open(first)?
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect())
    }

    fn load_split(
        &self,
        source: &DataSource,
        partitions: &[usize],
        split_count: usize,
    ) -> Result<DataFrame> {
        let paths = self.paths(source)?;
        let units = self.units(paths, Some(split_count))?;
        if units.len() != split_count {
            return Err(MatrixError::Load(format!(
                "{} has {} parquet units, plan expects {}",
                source.describe(),
                units.len(),
                split_count
            )));
        }
        self.read_units(&units, partitions)
    }

    fn load(&self, source: &DataSource, partitions: &[usize]) -> Result<DataFrame> {
        let paths = self.paths(source)?;
        let units = self.units(paths, None)?;
        self.read_units(&units, partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use parquet::arrow::ArrowWriter;
    use parquet::file::properties::WriterProperties;
    use tempfile::TempDir;

    fn write_parquet(path: &Path, frame: &DataFrame, row_group_size: usize) {
        let batch = frame.to_record_batch().unwrap();
        let props = WriterProperties::builder()
            .set_max_row_group_size(row_group_size)
            .build();
        let file = File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props)).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    fn counting_frame(rows: usize) -> DataFrame {
        DataFrame::new(
            vec!["v".to_string(), "w".to_string()],
            Array2::from_shape_fn((rows, 2), |(i, j)| (i * 10 + j) as f64),
        )
        .unwrap()
    }

    #[test]
    fn test_single_file_row_groups_are_partitions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.parquet");
        write_parquet(&path, &counting_frame(12), 4);

        let source = DataSource::path(path.to_string_lossy());
        assert_eq!(ParquetAdapter.partition_count(&source).unwrap(), 3);
        assert_eq!(ParquetAdapter.row_count(&source).unwrap(), Some(12));
        assert!(ParquetAdapter.infer_distributed(&source).unwrap());

        let frame = ParquetAdapter.load(&source, &[2]).unwrap();
        assert_eq!(frame.column("v").unwrap().to_vec(), vec![80.0, 90.0, 100.0, 110.0]);
    }

    #[test]
    fn test_multi_file_partitions_are_files() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.parquet");
        let b = dir.path().join("b.pq");
        write_parquet(&a, &counting_frame(5), 2);
        write_parquet(&b, &counting_frame(3), 2);

        let source = DataSource::paths([a.to_string_lossy(), b.to_string_lossy()]);
        assert_eq!(ParquetAdapter.partition_count(&source).unwrap(), 2);
        assert_eq!(ParquetAdapter.row_count(&source).unwrap(), Some(8));

        let all = ParquetAdapter.load(&source, &[0, 1]).unwrap();
        assert_eq!(all.num_rows(), 8);
        assert_eq!(all.columns(), &["v".to_string(), "w".to_string()]);
    }

    /// One row group shared by three actors becomes three row ranges
    #[test]
    fn test_single_row_group_split_into_row_ranges() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.parquet");
        write_parquet(&path, &counting_frame(8), 1024);

        let source = DataSource::path(path.to_string_lossy());
        assert_eq!(ParquetAdapter.partition_count(&source).unwrap(), 1);
        assert_eq!(ParquetAdapter.split_count(&source, 1).unwrap(), 1);
        assert_eq!(ParquetAdapter.split_count(&source, 3).unwrap(), 3);
        assert_eq!(ParquetAdapter.split_count(&source, 20).unwrap(), 8);

        let first = ParquetAdapter.load_split(&source, &[0], 3).unwrap();
        assert_eq!(first.column("v").unwrap().to_vec(), vec![0.0, 10.0, 20.0]);
        let last = ParquetAdapter.load_split(&source, &[2], 3).unwrap();
        assert_eq!(last.column("v").unwrap().to_vec(), vec![60.0, 70.0]);
        assert_eq!(
            ParquetAdapter.columns(&source).unwrap(),
            vec!["v".to_string(), "w".to_string()]
        );
        assert_eq!(ParquetAdapter.load_split(&source, &[1], 2).unwrap().num_rows(), 4);
        assert!(ParquetAdapter.load_split(&source, &[3], 3).is_err());
    }

    #[test]
    fn test_full_load_roundtrips_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.parquet");
        let frame = counting_frame(7);
        write_parquet(&path, &frame, 3);

        let source = DataSource::path(path.to_string_lossy());
        let count = ParquetAdapter.partition_count(&source).unwrap();
        let all: Vec<usize> = (0..count).collect();
        assert_eq!(ParquetAdapter.load(&source, &all).unwrap(), frame);
    }
}
