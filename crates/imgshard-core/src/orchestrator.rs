//! Shard orchestrator (C7, §4.7) — owns C4–C6 for one shard.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::DownloaderConfig;
use crate::error::OrchestratorError;
use crate::pipeline::run_pipeline;
use crate::processor::{process_row, RowCounters};
use crate::resizer::Resizer;
use crate::row::RowOutcome;
use crate::shard::{ColumnIndex, ShardSource};
use crate::stats::{ShardStats, StatsSink};
use crate::writer::SampleWriter;

/// Returned by `process_shard`: whether the shard completed cleanly,
/// plus its identifying descriptor (§4.7 `(ok, shard_descriptor)`).
pub struct ShardOutcome {
    pub ok: bool,
    pub shard_id: u64,
    pub count: u64,
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Run C4→C5→C6 for one shard, write stats, delete the source shard on
/// success (§4.7). A per-row panic inside C6 is caught and logged
/// without aborting the shard (§7 item 6); a load/writer error aborts
/// the whole shard (§7 item 7).
pub fn process_shard(
    shard_id: u64,
    source: &dyn ShardSource,
    columns: &ColumnIndex,
    key_p: u32,
    config: &DownloaderConfig,
    resizer: &dyn Resizer,
    mut writer: Box<dyn SampleWriter>,
    stats_sink: &dyn StatsSink,
) -> Result<ShardOutcome, OrchestratorError> {
    let start_time = now_unix_secs();

    let rows = source
        .load()
        .map_err(OrchestratorError::Load)?;
    let count = rows.len() as u64;

    let mut counters = RowCounters::new(1024);
    let mut panicked_rows: u64 = 0;

    let ua_token = config.normalized_ua_token();
    let disallowed = config.normalized_disallowed_directives();

    run_pipeline(
        rows,
        config.thread_count,
        config.timeout,
        config.retries,
        &ua_token,
        &disallowed,
        |result| {
            let writer_ref = &mut *writer;
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                process_row(
                    &result.row,
                    result.raw,
                    columns,
                    config,
                    resizer,
                    shard_id,
                    key_p,
                    writer_ref,
                    &mut counters,
                )
            }));

            match outcome {
                Ok(Ok(row_outcome)) => {
                    let _: RowOutcome = row_outcome;
                }
                Ok(Err(e)) => {
                    log::error!("row {} processing failed: {e}", result.row.row_index);
                }
                Err(_) => {
                    panicked_rows += 1;
                    log::error!(
                        "row {} processing panicked; permit released, row contributes to neither successes nor failures",
                        result.row.row_index
                    );
                }
            }
        },
    );

    let row_count = writer.close().map_err(OrchestratorError::Writer)?;
    let _ = row_count;

    let end_time = now_unix_secs();

    let stats = ShardStats {
        shard_id,
        count,
        successes: counters.successes,
        failed_to_download: counters.failed_to_download,
        failed_to_resize: counters.failed_to_resize,
        start_time,
        end_time,
        status_counter: counters.status_counter.to_map(),
    };
    stats_sink.write(&stats).map_err(OrchestratorError::Stats)?;

    source
        .delete()
        .map_err(OrchestratorError::Load)?;

    if panicked_rows > 0 {
        log::warn!("{panicked_rows} row(s) panicked during shard {shard_id}");
    }

    Ok(ShardOutcome {
        ok: true,
        shard_id,
        count,
    })
}
