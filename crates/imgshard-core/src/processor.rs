//! Per-row state machine (C6, §4.6).

use std::collections::HashMap;

use crate::config::DownloaderConfig;
use crate::hash::HashAlgo;
use crate::key::format_key;
use crate::resizer::Resizer;
use crate::row::{ColumnValue, FetchOutcome, RawRowResult, Row, RowOutcome, Status, SubOutcome};
use crate::shard::ColumnIndex;
use crate::stats::CappedStatusCounter;
use crate::writer::{MultiImageWriter, SampleWriter, WriterRecord};

/// Orchestrator-scoped counters updated by every processed row (§4.6
/// "Counter updates", §3 `ShardStats` minus the timestamps).
pub struct RowCounters {
    pub successes: u64,
    pub failed_to_download: u64,
    pub failed_to_resize: u64,
    pub status_counter: CappedStatusCounter,
}

impl RowCounters {
    pub fn new(status_cap: usize) -> Self {
        Self {
            successes: 0,
            failed_to_download: 0,
            failed_to_resize: 0,
            status_counter: CappedStatusCounter::new(status_cap),
        }
    }

    fn record(&mut self, sub: &SubOutcome) {
        match sub.status {
            Status::Success => self.successes += 1,
            Status::FailedToDownload => self.failed_to_download += 1,
            Status::FailedToResize => self.failed_to_resize += 1,
        }
        let key = if sub.error_message.is_empty() {
            sub.status.as_str()
        } else {
            sub.error_message.as_str()
        };
        self.status_counter.record(key);
    }
}

fn base_meta(row: &Row, config: &DownloaderConfig, columns: &ColumnIndex, str_key: &str) -> HashMap<String, ColumnValue> {
    let mut meta = HashMap::new();
    for (i, name) in config.column_list.iter().enumerate() {
        if Some(i) == columns.verify_hash {
            continue;
        }
        if let Some(value) = row.payload.get(i) {
            meta.insert(name.clone(), value.clone());
        }
    }
    meta.insert("key".to_string(), ColumnValue::Str(str_key.to_string()));
    meta
}

fn verify_hash(
    payload_hash: Option<&str>,
    algo: HashAlgo,
    body: &[u8],
) -> Option<bool> {
    payload_hash.map(|expected| algo.hex_digest(body).eq_ignore_ascii_case(expected))
}

/// Run S2–S5 against one fetched body, returning the `SubOutcome` for
/// it (status/meta only — the transformed image bytes are returned
/// separately so the caller can hand them to the writer).
fn process_body(
    outcome: &FetchOutcome,
    bbox: Option<&[f64]>,
    config: &DownloaderConfig,
    resizer: &dyn Resizer,
    skip_hash_verify: bool,
    base: &HashMap<String, ColumnValue>,
    verify_hash_payload: Option<&str>,
) -> (Option<Vec<u8>>, SubOutcome) {
    let mut sub = SubOutcome::blank(base.clone());

    let body = match outcome {
        FetchOutcome::Error(e) => {
            sub.error_message = e.clone();
            sub.status = Status::FailedToDownload;
            return (None, sub);
        }
        FetchOutcome::Payload(b) => b,
    };

    // S2: hash verify (single-URL branch only; skipped for list rows
    // per §4.6/§9 Open Question (a)).
    if !skip_hash_verify {
        if let Some(algo) = config.verify_hash_type {
            if let Some(matched) = verify_hash(verify_hash_payload, algo, body) {
                if !matched {
                    sub.error_message = "hash mismatch".to_string();
                    sub.status = Status::FailedToDownload;
                    return (None, sub);
                }
            }
        }
    } else if config.verify_hash_type.is_some() {
        log::warn!("hash verification skipped for a sub-URL of a list-URL row");
    }

    // S3: transform.
    let resized = resizer.resize(body, bbox);
    if !resized.is_success() {
        sub.error_message = resized.error_message.unwrap_or_default();
        sub.status = Status::FailedToResize;
        return (None, sub);
    }
    sub.width = resized.width;
    sub.height = resized.height;
    sub.original_width = resized.original_width;
    sub.original_height = resized.original_height;
    sub.status = Status::Success;

    // S4: EXIF, best effort, never affects status.
    if config.extract_exif {
        sub.exif = extract_exif_json(body);
    }

    // S5: compute-hash.
    if let Some(algo) = config.compute_hash {
        sub.hash = Some(algo.hex_digest(body));
    }

    (resized.image, sub)
}

/// Parse EXIF tags out of an image body and serialise them as a JSON
/// tag-name -> display-value map. Any parse failure (no EXIF segment,
/// truncated body, unsupported container) yields `None` rather than an
/// error, since EXIF is metadata best-effort, not a correctness gate.
fn extract_exif_json(body: &[u8]) -> Option<String> {
    let mut cursor = std::io::Cursor::new(body);
    let fields = exif::Reader::new().read_from_container(&mut cursor).ok()?;

    let mut map = serde_json::Map::new();
    for field in fields.fields() {
        let name = field.tag.to_string();
        let value = field.display_value().with_unit(&fields).to_string();
        map.insert(name, serde_json::Value::String(value));
    }
    serde_json::to_string(&map).ok()
}

/// Process one `Row` against its `RawRowResult` (§4.6).
pub fn process_row(
    row: &Row,
    raw: RawRowResult,
    columns: &ColumnIndex,
    config: &DownloaderConfig,
    resizer: &dyn Resizer,
    shard_id: u64,
    key_p: u32,
    writer: &mut dyn SampleWriter,
    counters: &mut RowCounters,
) -> Result<RowOutcome, String> {
    let str_key = format_key(shard_id, row.row_index, key_p, config.shard_count_oom);
    let base = base_meta(row, config, columns, &str_key);

    let caption = columns
        .caption
        .and_then(|i| row.payload.get(i))
        .and_then(ColumnValue::as_str)
        .map(|s| s.to_string());

    let verify_hash_payload = columns
        .verify_hash
        .and_then(|i| row.payload.get(i))
        .and_then(ColumnValue::as_str);

    let bbox = columns
        .blurring_bbox
        .and_then(|i| row.payload.get(i))
        .and_then(ColumnValue::as_f64_list);

    match raw {
        RawRowResult::Single(outcome) => {
            let (image, sub) = process_body(
                &outcome,
                bbox,
                config,
                resizer,
                false,
                &base,
                verify_hash_payload,
            );
            counters.record(&sub);
            writer
                .write(WriterRecord {
                    image,
                    key: str_key.clone(),
                    caption: caption.clone(),
                    outcome: sub.clone(),
                })
                .map_err(|e| format!("writer error: {e}"))?;
            Ok(RowOutcome::Single(sub))
        }
        RawRowResult::List(outcomes) => {
            let mut multi_results: Vec<(Option<Vec<u8>>, SubOutcome)> = Vec::new();
            for outcome in &outcomes {
                let (image, sub) = process_body(
                    outcome,
                    bbox,
                    config,
                    resizer,
                    true,
                    &base,
                    None,
                );
                counters.record(&sub);
                multi_results.push((image, sub));
            }

            let any_success = multi_results.iter().any(|(_, s)| matches!(s.status, Status::Success));

            if any_success {
                if let Some(multi) = writer.as_multi_image_writer() {
                    multi
                        .write_multi_images(multi_results.clone(), &str_key, caption.as_deref())
                        .map_err(|e| format!("writer error: {e}"))?;
                } else if let Some((image, sub)) =
                    multi_results.iter().find(|(_, s)| matches!(s.status, Status::Success))
                {
                    writer
                        .write(WriterRecord {
                            image: image.clone(),
                            key: str_key.clone(),
                            caption: caption.clone(),
                            outcome: sub.clone(),
                        })
                        .map_err(|e| format!("writer error: {e}"))?;
                }
            } else {
                // §9 Open Question (b): also call write_multi_images in
                // the all-failure case when the writer supports it,
                // unifying the single and multi write paths.
                if let Some(multi) = writer.as_multi_image_writer() {
                    multi
                        .write_multi_images(multi_results.clone(), &str_key, caption.as_deref())
                        .map_err(|e| format!("writer error: {e}"))?;
                } else {
                    let fallback = multi_results
                        .first()
                        .map(|(_, s)| s.clone())
                        .unwrap_or_else(|| SubOutcome::blank(base.clone()));
                    writer
                        .write(WriterRecord {
                            image: None,
                            key: str_key.clone(),
                            caption: caption.clone(),
                            outcome: fallback,
                        })
                        .map_err(|e| format!("writer error: {e}"))?;
                }
            }

            Ok(RowOutcome::List(
                multi_results.into_iter().map(|(_, s)| s).collect(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resizer::CenterCropResizer;
    use crate::writer::ArrowSampleWriter;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_config() -> DownloaderConfig {
        DownloaderConfig {
            thread_count: 2,
            save_caption: false,
            extract_exif: false,
            output_folder: "/tmp".into(),
            column_list: vec!["url".to_string(), "caption".to_string()],
            url_column: "url".to_string(),
            caption_column: Some("caption".to_string()),
            blurring_bbox_col: None,
            timeout: 5,
            samples_per_shard: 1000,
            shard_count_oom: 5,
            compute_hash: None,
            verify_hash_type: None,
            verify_hash_column: None,
            encode_format: "jpg".to_string(),
            retries: 0,
            user_agent_token: None,
            disallowed_header_directives: Default::default(),
        }
    }

    fn test_writer(dir: &std::path::Path) -> ArrowSampleWriter {
        let schema = Arc::new(Schema::new(vec![
            Field::new("caption", DataType::Utf8, true),
            Field::new("key", DataType::Utf8, false),
            Field::new("status", DataType::Utf8, false),
            Field::new("error_message", DataType::Utf8, true),
            Field::new("width", DataType::Int32, true),
            Field::new("height", DataType::Int32, true),
            Field::new("original_width", DataType::Int32, true),
            Field::new("original_height", DataType::Int32, true),
        ]));
        ArrowSampleWriter::new(0, dir, schema, &["caption".to_string(), "key".to_string()], None).unwrap()
    }

    fn test_row() -> Row {
        Row {
            row_index: 7,
            url: crate::row::UrlSpec::Single("http://h/a.jpg".to_string()),
            payload: vec![
                ColumnValue::Str("http://h/a.jpg".to_string()),
                ColumnValue::Str("a cute cat".to_string()),
            ],
        }
    }

    #[test]
    fn single_row_success_path() {
        let dir = TempDir::new().unwrap();
        let config = test_config();
        let resizer = CenterCropResizer::new(10);
        let row = test_row();
        let columns = ColumnIndex {
            url: 0,
            caption: Some(1),
            verify_hash: None,
            blurring_bbox: None,
        };
        let mut writer = test_writer(dir.path());
        let mut counters = RowCounters::new(10);

        let raw = RawRowResult::Single(FetchOutcome::Payload(bytes::Bytes::from_static(b"jpegbytes")));
        let outcome = process_row(&row, raw, &columns, &config, &resizer, 3, 3, &mut writer, &mut counters).unwrap();

        assert!(outcome.is_success());
        assert_eq!(counters.successes, 1);
        match outcome {
            RowOutcome::Single(sub) => {
                assert_eq!(sub.status, Status::Success);
                assert!(sub.error_message.is_empty());
                assert!(sub.width.is_some());
            }
            RowOutcome::List(_) => panic!("expected single"),
        }
    }

    #[test]
    fn single_row_fetch_error_is_failed_to_download() {
        let dir = TempDir::new().unwrap();
        let config = test_config();
        let resizer = CenterCropResizer::new(10);
        let row = test_row();
        let columns = ColumnIndex {
            url: 0,
            caption: Some(1),
            verify_hash: None,
            blurring_bbox: None,
        };
        let mut writer = test_writer(dir.path());
        let mut counters = RowCounters::new(10);

        let raw = RawRowResult::Single(FetchOutcome::Error("connection refused".to_string()));
        let outcome = process_row(&row, raw, &columns, &config, &resizer, 3, 3, &mut writer, &mut counters).unwrap();

        assert!(!outcome.is_success());
        assert_eq!(counters.failed_to_download, 1);
    }

    #[test]
    fn hash_mismatch_skips_transform() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config();
        config.verify_hash_type = Some(HashAlgo::Md5);
        config.column_list = vec!["url".to_string(), "md5".to_string()];
        let resizer = CenterCropResizer::new(10);
        let row = Row {
            row_index: 0,
            url: crate::row::UrlSpec::Single("http://h/a".to_string()),
            payload: vec![
                ColumnValue::Str("http://h/a".to_string()),
                ColumnValue::Str("deadbeefdeadbeefdeadbeefdeadbeef".to_string()),
            ],
        };
        let columns = ColumnIndex {
            url: 0,
            caption: None,
            verify_hash: Some(1),
            blurring_bbox: None,
        };
        let mut writer = test_writer(dir.path());
        let mut counters = RowCounters::new(10);

        let raw = RawRowResult::Single(FetchOutcome::Payload(bytes::Bytes::from_static(b"actual body")));
        let outcome = process_row(&row, raw, &columns, &config, &resizer, 0, 3, &mut writer, &mut counters).unwrap();

        match outcome {
            RowOutcome::Single(sub) => {
                assert_eq!(sub.status, Status::FailedToDownload);
                assert_eq!(sub.error_message, "hash mismatch");
                assert!(sub.width.is_none());
            }
            RowOutcome::List(_) => panic!("expected single"),
        }
    }

    #[test]
    fn resize_failure_is_failed_to_resize() {
        let dir = TempDir::new().unwrap();
        let config = test_config();
        let resizer = CenterCropResizer::new(10);
        let row = test_row();
        let columns = ColumnIndex {
            url: 0,
            caption: Some(1),
            verify_hash: None,
            blurring_bbox: None,
        };
        let mut writer = test_writer(dir.path());
        let mut counters = RowCounters::new(10);

        let raw = RawRowResult::Single(FetchOutcome::Payload(bytes::Bytes::new()));
        let outcome = process_row(&row, raw, &columns, &config, &resizer, 0, 3, &mut writer, &mut counters).unwrap();

        match outcome {
            RowOutcome::Single(sub) => assert_eq!(sub.status, Status::FailedToResize),
            RowOutcome::List(_) => panic!("expected single"),
        }
        assert_eq!(counters.failed_to_resize, 1);
    }

    #[test]
    fn list_row_partial_success_aggregates() {
        let dir = TempDir::new().unwrap();
        let config = test_config();
        let resizer = CenterCropResizer::new(10);
        let row = Row {
            row_index: 1,
            url: crate::row::UrlSpec::List(vec![
                Some("http://h/a".to_string()),
                None,
                Some("http://h/b".to_string()),
            ]),
            payload: vec![
                ColumnValue::Null,
                ColumnValue::Str("caption".to_string()),
            ],
        };
        let columns = ColumnIndex {
            url: 0,
            caption: Some(1),
            verify_hash: None,
            blurring_bbox: None,
        };
        let mut writer = test_writer(dir.path());
        let mut counters = RowCounters::new(10);

        let raw = RawRowResult::List(vec![
            FetchOutcome::Payload(bytes::Bytes::from_static(b"ok body")),
            FetchOutcome::Error("fetch failed".to_string()),
        ]);
        let outcome = process_row(&row, raw, &columns, &config, &resizer, 0, 3, &mut writer, &mut counters).unwrap();

        assert!(outcome.is_success());
        match outcome {
            RowOutcome::List(subs) => {
                assert_eq!(subs.len(), 2);
                assert_eq!(subs[0].status, Status::Success);
                assert_eq!(subs[1].status, Status::FailedToDownload);
            }
            RowOutcome::Single(_) => panic!("expected list"),
        }
        assert_eq!(counters.successes, 1);
        assert_eq!(counters.failed_to_download, 1);
    }

    #[test]
    fn extract_exif_json_returns_none_for_non_exif_body() {
        assert_eq!(extract_exif_json(b"not an image at all"), None);
    }

    #[test]
    fn extract_exif_enabled_leaves_exif_null_on_parse_failure() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config();
        config.extract_exif = true;
        let resizer = CenterCropResizer::new(10);
        let row = test_row();
        let columns = ColumnIndex {
            url: 0,
            caption: Some(1),
            verify_hash: None,
            blurring_bbox: None,
        };
        let mut writer = test_writer(dir.path());
        let mut counters = RowCounters::new(10);

        let raw = RawRowResult::Single(FetchOutcome::Payload(bytes::Bytes::from_static(b"jpegbytes")));
        let outcome = process_row(&row, raw, &columns, &config, &resizer, 3, 3, &mut writer, &mut counters).unwrap();

        assert!(outcome.is_success());
        match outcome {
            RowOutcome::Single(sub) => assert_eq!(sub.exif, None),
            RowOutcome::List(_) => panic!("expected single"),
        }
    }

    #[test]
    fn list_row_all_failure_writes_fallback_record() {
        let dir = TempDir::new().unwrap();
        let config = test_config();
        let resizer = CenterCropResizer::new(10);
        let row = Row {
            row_index: 2,
            url: crate::row::UrlSpec::List(vec![Some("http://h/a".to_string())]),
            payload: vec![ColumnValue::Null, ColumnValue::Null],
        };
        let columns = ColumnIndex {
            url: 0,
            caption: None,
            verify_hash: None,
            blurring_bbox: None,
        };
        let mut writer = test_writer(dir.path());
        let mut counters = RowCounters::new(10);

        let raw = RawRowResult::List(vec![FetchOutcome::Error("timed out".to_string())]);
        let outcome = process_row(&row, raw, &columns, &config, &resizer, 0, 3, &mut writer, &mut counters).unwrap();

        assert!(!outcome.is_success());
        assert_eq!(counters.failed_to_download, 1);
    }
}
