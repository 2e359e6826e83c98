//! Shard source (C4, §4.4) — load one input shard as a sequence of
//! [`Row`]s, resolve configured columns, and derive the output schema.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ListArray, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::reader::FileReader;

use crate::hash::HashAlgo;
use crate::row::{ColumnValue, Row, UrlSpec};

/// Where a loaded shard's rows come from, and how it is cleaned up once
/// processed (§4.4, §4.7 "delete input shard on success").
pub trait ShardSource {
    /// Read every row of the shard into memory.
    fn load(&self) -> Result<Vec<Row>, String>;

    /// Remove the input shard. Only called after a shard has been fully
    /// and successfully processed.
    fn delete(&self) -> Result<(), String>;

    /// A human-readable label for logging.
    fn label(&self) -> String;
}

/// Which configured columns were found, and at what position in
/// `column_list`/the row payload (§4.4 "resolve columns").
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    pub url: usize,
    pub caption: Option<usize>,
    pub verify_hash: Option<usize>,
    pub blurring_bbox: Option<usize>,
}

/// An Arrow IPC file on local disk — the shard format this pipeline
/// reads, mirroring the way `papeline-openalex` schemas describe Arrow
/// batches read from Parquet (here: IPC, per the input format §4.4
/// calls for).
pub struct LocalIpcSource {
    path: PathBuf,
    url_column: String,
    caption_column: Option<String>,
    verify_hash_column: Option<String>,
    blurring_bbox_column: Option<String>,
}

impl LocalIpcSource {
    pub fn new(
        path: impl Into<PathBuf>,
        url_column: impl Into<String>,
        caption_column: Option<String>,
        verify_hash_column: Option<String>,
        blurring_bbox_column: Option<String>,
    ) -> Self {
        Self {
            path: path.into(),
            url_column: url_column.into(),
            caption_column,
            verify_hash_column,
            blurring_bbox_column,
        }
    }

    fn column_index(&self, schema: &Schema) -> Result<ColumnIndex, String> {
        let url = schema
            .index_of(&self.url_column)
            .map_err(|_| format!("url column '{}' not found in shard schema", self.url_column))?;
        let caption = self
            .caption_column
            .as_deref()
            .and_then(|c| schema.index_of(c).ok());
        let verify_hash = self
            .verify_hash_column
            .as_deref()
            .and_then(|c| schema.index_of(c).ok());
        let blurring_bbox = self
            .blurring_bbox_column
            .as_deref()
            .and_then(|c| schema.index_of(c).ok());
        Ok(ColumnIndex {
            url,
            caption,
            verify_hash,
            blurring_bbox,
        })
    }
}

impl ShardSource for LocalIpcSource {
    fn load(&self) -> Result<Vec<Row>, String> {
        let file = File::open(&self.path)
            .map_err(|e| format!("failed to open shard {}: {e}", self.path.display()))?;
        let reader =
            FileReader::try_new(file, None).map_err(|e| format!("invalid IPC shard: {e}"))?;
        let schema = reader.schema();
        let idx = self.column_index(&schema)?;

        let mut rows = Vec::new();
        let mut row_index: u64 = 0;
        for batch in reader {
            let batch = batch.map_err(|e| format!("failed to read shard batch: {e}"))?;
            let url_array = batch.column(idx.url);
            for i in 0..batch.num_rows() {
                let url = extract_url(url_array, i)?;
                let mut payload = Vec::with_capacity(batch.num_columns());
                for col in 0..batch.num_columns() {
                    payload.push(extract_cell(batch.column(col), i));
                }
                rows.push(Row {
                    row_index,
                    url,
                    payload,
                });
                row_index += 1;
            }
        }
        Ok(rows)
    }

    fn delete(&self) -> Result<(), String> {
        std::fs::remove_file(&self.path)
            .map_err(|e| format!("failed to delete shard {}: {e}", self.path.display()))
    }

    fn label(&self) -> String {
        self.path.display().to_string()
    }
}

fn extract_url(array: &Arc<dyn Array>, row: usize) -> Result<UrlSpec, String> {
    if array.is_null(row) {
        return Err(format!("url is null at row {row}"));
    }
    if let Some(strings) = array.as_any().downcast_ref::<StringArray>() {
        return Ok(UrlSpec::Single(strings.value(row).to_string()));
    }
    if let Some(list) = array.as_any().downcast_ref::<ListArray>() {
        let inner = list.value(row);
        let strings = inner
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| "url list column is not a list of strings".to_string())?;
        let urls = (0..strings.len())
            .map(|i| {
                if strings.is_null(i) {
                    None
                } else {
                    Some(strings.value(i).to_string())
                }
            })
            .collect();
        return Ok(UrlSpec::List(urls));
    }
    Err(format!(
        "unsupported url column type {:?}",
        array.data_type()
    ))
}

fn extract_cell(array: &Arc<dyn Array>, row: usize) -> ColumnValue {
    if array.is_null(row) {
        return ColumnValue::Null;
    }
    match array.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 => array
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|a| ColumnValue::Str(a.value(row).to_string()))
            .unwrap_or(ColumnValue::Null),
        DataType::List(_) => array
            .as_any()
            .downcast_ref::<ListArray>()
            .and_then(|list| {
                let inner = list.value(row);
                arrow::compute::cast(&inner, &DataType::Float64)
                    .ok()
                    .and_then(|casted| {
                        casted
                            .as_any()
                            .downcast_ref::<arrow::array::Float64Array>()
                            .map(|f| f.values().to_vec())
                    })
            })
            .map(ColumnValue::F64List)
            .unwrap_or(ColumnValue::Null),
        _ => ColumnValue::Null,
    }
}

/// Build the output Arrow schema: input columns (minus the verify-hash
/// column, per §4.6) plus the fields every `SubOutcome` appends.
pub fn output_schema(
    input_fields: &[Field],
    verify_hash_column: Option<&str>,
    write_exif: bool,
    compute_hash: Option<HashAlgo>,
) -> Schema {
    let mut fields: Vec<Field> = input_fields
        .iter()
        .filter(|f| Some(f.name().as_str()) != verify_hash_column)
        .cloned()
        .collect();

    fields.push(Field::new("key", DataType::Utf8, false));
    fields.push(Field::new("status", DataType::Utf8, false));
    fields.push(Field::new("error_message", DataType::Utf8, true));
    fields.push(Field::new("width", DataType::Int32, true));
    fields.push(Field::new("height", DataType::Int32, true));
    fields.push(Field::new("original_width", DataType::Int32, true));
    fields.push(Field::new("original_height", DataType::Int32, true));
    if write_exif {
        fields.push(Field::new("exif", DataType::Utf8, true));
    }
    if let Some(algo) = compute_hash {
        let name = algo.column_name();
        if !fields.iter().any(|f| f.name() == name) {
            fields.push(Field::new(name, DataType::Utf8, true));
        }
    }

    Schema::new(fields)
}

/// Meta-column names in the exact order [`output_schema`] places the
/// echoed input columns and `key`, for wiring an [`crate::writer::ArrowSampleWriter`].
pub fn meta_column_names(input_fields: &[Field], verify_hash_column: Option<&str>) -> Vec<String> {
    let mut names: Vec<String> = input_fields
        .iter()
        .filter(|f| Some(f.name().as_str()) != verify_hash_column)
        .map(|f| f.name().clone())
        .collect();
    names.push("key".to_string());
    names
}
