//! Sample writer contract (§6 "`SampleWriter` contract") and the
//! Arrow/Parquet-backed implementation, modeled on the teacher's
//! `ParquetSink` (tmp-file + atomic rename).

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Int32Array, RecordBatch, StringArray};
use arrow::datatypes::Schema;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::hash::HashAlgo;
use crate::row::{ColumnValue, SubOutcome};

/// One finished row passed to a writer: the transformed image bytes (if
/// any), the global key, optional caption, and the outcome metadata.
pub struct WriterRecord {
    pub image: Option<Vec<u8>>,
    pub key: String,
    pub caption: Option<String>,
    pub outcome: SubOutcome,
}

/// §6: `write(image_or_null, str_key, caption_or_null, meta)`,
/// `close()`. `Send` because C5's coordinator thread owns the writer.
pub trait SampleWriter: Send {
    fn write(&mut self, record: WriterRecord) -> Result<(), String>;
    fn close(self: Box<Self>) -> Result<usize, String>;

    /// Capability check, not reflection (§9): a writer that supports
    /// multi-image aggregation overrides this to return `Some(self)`.
    fn as_multi_image_writer(&mut self) -> Option<&mut dyn MultiImageWriter> {
        None
    }
}

/// Optional capability: aggregate several sub-outcomes for one row into
/// a single writer call (§6, C6 aggregation step).
pub trait MultiImageWriter: SampleWriter {
    fn write_multi_images(
        &mut self,
        records: Vec<(Option<Vec<u8>>, SubOutcome)>,
        key: &str,
        caption: Option<&str>,
    ) -> Result<(), String>;
}

fn column_value_to_string(value: &ColumnValue) -> Option<String> {
    match value {
        ColumnValue::Null => None,
        ColumnValue::Str(s) => Some(s.clone()),
        ColumnValue::F64List(v) => Some(
            v.iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(","),
        ),
    }
}

/// Writes rows to a Parquet file, one file per shard. Accumulates rows
/// in memory column-by-column and flushes as a single batch on close —
/// the teacher's `ParquetSink` instead streams `RecordBatch`es in as
/// they're produced upstream; here C6 produces one row at a time so
/// batching happens at `close()`.
pub struct ArrowSampleWriter {
    schema: Arc<Schema>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    keys: Vec<String>,
    statuses: Vec<String>,
    error_messages: Vec<Option<String>>,
    widths: Vec<Option<i32>>,
    heights: Vec<Option<i32>>,
    original_widths: Vec<Option<i32>>,
    original_heights: Vec<Option<i32>>,
    exifs: Vec<Option<String>>,
    hashes: Vec<Option<String>>,
    compute_hash: Option<HashAlgo>,
    meta_columns: Vec<(String, Vec<Option<String>>)>,
    row_count: usize,
}

impl ArrowSampleWriter {
    pub fn new(
        shard_id: u64,
        output_folder: &Path,
        schema: Arc<Schema>,
        meta_column_names: &[String],
        compute_hash: Option<HashAlgo>,
    ) -> Result<Self, String> {
        fs::create_dir_all(output_folder)
            .map_err(|e| format!("failed to create output folder: {e}"))?;
        let filename = format!("{shard_id:05}.parquet");
        let final_path = output_folder.join(&filename);
        let tmp_path = output_folder.join(format!("{filename}.tmp"));
        if tmp_path.exists() {
            fs::remove_file(&tmp_path).map_err(|e| e.to_string())?;
        }

        Ok(Self {
            schema,
            tmp_path,
            final_path,
            keys: Vec::new(),
            statuses: Vec::new(),
            error_messages: Vec::new(),
            widths: Vec::new(),
            heights: Vec::new(),
            original_widths: Vec::new(),
            original_heights: Vec::new(),
            exifs: Vec::new(),
            hashes: Vec::new(),
            compute_hash,
            meta_columns: meta_column_names
                .iter()
                .map(|n| (n.clone(), Vec::new()))
                .collect(),
            row_count: 0,
        })
    }

    fn push_one(&mut self, outcome: &SubOutcome) {
        self.keys
            .push(outcome.meta.get("key").and_then(ColumnValue::as_str).unwrap_or("").to_string());
        self.statuses.push(outcome.status.as_str().to_string());
        self.error_messages.push(Some(outcome.error_message.clone()));
        self.widths.push(outcome.width);
        self.heights.push(outcome.height);
        self.original_widths.push(outcome.original_width);
        self.original_heights.push(outcome.original_height);
        self.exifs.push(outcome.exif.clone());
        self.hashes.push(outcome.hash.clone());
        for (name, col) in self.meta_columns.iter_mut() {
            let value = outcome
                .meta
                .get(name)
                .and_then(column_value_to_string);
            col.push(value);
        }
        self.row_count += 1;
    }

    fn build_batch(&self) -> Result<RecordBatch, String> {
        let mut arrays: Vec<ArrayRef> = Vec::new();
        for (name, _) in &self.meta_columns {
            if name == "key" {
                arrays.push(Arc::new(StringArray::from(self.keys.clone())));
            } else if self.schema.index_of(name).is_ok() {
                let col = self
                    .meta_columns
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default();
                arrays.push(Arc::new(StringArray::from(col)));
            }
        }
        arrays.push(Arc::new(StringArray::from(self.statuses.clone())));
        arrays.push(Arc::new(StringArray::from(self.error_messages.clone())));
        arrays.push(Arc::new(Int32Array::from(self.widths.clone())));
        arrays.push(Arc::new(Int32Array::from(self.heights.clone())));
        arrays.push(Arc::new(Int32Array::from(self.original_widths.clone())));
        arrays.push(Arc::new(Int32Array::from(self.original_heights.clone())));
        if self.schema.index_of("exif").is_ok() {
            arrays.push(Arc::new(StringArray::from(self.exifs.clone())));
        }
        if let Some(algo) = self.compute_hash {
            let name = algo.column_name();
            let already_echoed = self.meta_columns.iter().any(|(n, _)| n == name);
            if !already_echoed && self.schema.index_of(name).is_ok() {
                arrays.push(Arc::new(StringArray::from(self.hashes.clone())));
            }
        }

        RecordBatch::try_new(self.schema.clone(), arrays).map_err(|e| e.to_string())
    }
}

impl SampleWriter for ArrowSampleWriter {
    fn write(&mut self, record: WriterRecord) -> Result<(), String> {
        self.push_one(&record.outcome);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<usize, String> {
        let row_count = self.row_count;
        let batch = self.build_batch()?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let file = File::create(&self.tmp_path).map_err(|e| e.to_string())?;
        let mut writer =
            ArrowWriter::try_new(file, self.schema.clone(), Some(props)).map_err(|e| e.to_string())?;
        writer.write(&batch).map_err(|e| e.to_string())?;
        writer.close().map_err(|e| e.to_string())?;
        fs::rename(&self.tmp_path, &self.final_path).map_err(|e| e.to_string())?;
        Ok(row_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn test_schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("key", DataType::Utf8, false),
            Field::new("status", DataType::Utf8, false),
            Field::new("error_message", DataType::Utf8, true),
            Field::new("width", DataType::Int32, true),
            Field::new("height", DataType::Int32, true),
            Field::new("original_width", DataType::Int32, true),
            Field::new("original_height", DataType::Int32, true),
        ]))
    }

    #[test]
    fn write_then_close_produces_parquet_file() {
        let dir = TempDir::new().unwrap();
        let schema = test_schema();
        let mut writer =
            ArrowSampleWriter::new(7, dir.path(), schema, &["key".to_string()], None).unwrap();

        let outcome = SubOutcome {
            status: crate::row::Status::Success,
            error_message: String::new(),
            width: Some(10),
            height: Some(10),
            original_width: Some(100),
            original_height: Some(100),
            exif: None,
            hash: None,
            meta: {
                let mut m = HashMap::new();
                m.insert("key".to_string(), ColumnValue::Str("0000700000".to_string()));
                m
            },
        };
        writer
            .write(WriterRecord {
                image: Some(vec![1, 2, 3]),
                key: "0000700000".to_string(),
                caption: None,
                outcome,
            })
            .unwrap();

        let boxed: Box<dyn SampleWriter> = Box::new(writer);
        let rows = boxed.close().unwrap();
        assert_eq!(rows, 1);
        assert!(dir.path().join("00007.parquet").exists());
        assert!(!dir.path().join("00007.parquet.tmp").exists());
    }

    #[test]
    fn default_writer_has_no_multi_image_capability() {
        let dir = TempDir::new().unwrap();
        let schema = test_schema();
        let mut writer =
            ArrowSampleWriter::new(1, dir.path(), schema, &["key".to_string()], None).unwrap();
        assert!(writer.as_multi_image_writer().is_none());
    }

    #[test]
    fn compute_hash_column_not_populated_when_schema_lacks_it() {
        // No "sha256" field in the schema (not configured, or already
        // present as an echoed input column) -> no extra array pushed,
        // so the batch stays aligned with the schema's field count.
        let dir = TempDir::new().unwrap();
        let schema = test_schema();
        let field_count = schema.fields().len();
        let mut writer = ArrowSampleWriter::new(
            2,
            dir.path(),
            schema,
            &["key".to_string()],
            Some(HashAlgo::Sha256),
        )
        .unwrap();
        writer
            .write(WriterRecord {
                image: None,
                key: "k".to_string(),
                caption: None,
                outcome: SubOutcome {
                    hash: Some("deadbeef".to_string()),
                    meta: {
                        let mut m = HashMap::new();
                        m.insert("key".to_string(), ColumnValue::Str("k".to_string()));
                        m
                    },
                    ..SubOutcome::blank(HashMap::new())
                },
            })
            .unwrap();
        let batch = writer.build_batch().unwrap();
        assert_eq!(batch.num_columns(), field_count);
    }
}
