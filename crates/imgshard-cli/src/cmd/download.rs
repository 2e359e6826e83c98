//! Download subcommand - run the shard pipeline over a directory of
//! input shards.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::datatypes::Schema;
use arrow::ipc::reader::FileReader;
use clap::{Args, ValueEnum};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use imgshard_core::{
    meta_column_names, output_schema, p_digits, process_shard, ArrowSampleWriter, CenterCropResizer,
    ColumnIndex, HashAlgo, JsonStatsSink, LocalIpcSource,
};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Directory containing input shards (`<shard_id>.arrow`, IPC format)
    pub input_folder: PathBuf,

    /// Output directory for parquet shards and stats files
    #[arg(short, long)]
    pub output_folder: Option<PathBuf>,

    /// Column holding the URL (or list of URLs) to fetch
    #[arg(long)]
    pub url_column: Option<String>,

    /// Column holding a caption to echo alongside each image
    #[arg(long)]
    pub caption_column: Option<String>,

    /// Column holding a `[x, y, w, h]` crop box
    #[arg(long)]
    pub blurring_bbox_col: Option<String>,

    /// Number of worker threads per shard
    #[arg(short, long)]
    pub thread_count: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Number of retry attempts per URL
    #[arg(long)]
    pub retries: Option<u32>,

    /// Expected samples per shard, used to size the zero-padded key
    #[arg(long)]
    pub samples_per_shard: Option<u64>,

    /// Configured shard-count order of magnitude (`q` in the key width)
    #[arg(long)]
    pub shard_count_oom: Option<u32>,

    /// Digest algorithm to compute and store for every downloaded image
    #[arg(long, value_enum)]
    pub compute_hash: Option<HashAlgoArg>,

    /// Digest algorithm used to verify against a `verify_hash_column`
    #[arg(long, value_enum)]
    pub verify_hash_type: Option<HashAlgoArg>,

    /// Save the caption column alongside each written sample
    #[arg(long)]
    pub save_caption: bool,

    /// Extract and store EXIF metadata
    #[arg(long)]
    pub extract_exif: bool,

    /// `User-Agent` token checked against `X-Robots-Tag` directives
    #[arg(long)]
    pub user_agent_token: Option<String>,

    /// `X-Robots-Tag` directives that cause a fetch to be refused
    #[arg(long, value_delimiter = ',')]
    pub disallowed_header_directives: Vec<String>,

    /// Stop after this many shards
    #[arg(short, long)]
    pub limit: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum HashAlgoArg {
    Md5,
    Sha1,
    Sha256,
}

impl From<HashAlgoArg> for HashAlgo {
    fn from(value: HashAlgoArg) -> Self {
        match value {
            HashAlgoArg::Md5 => HashAlgo::Md5,
            HashAlgoArg::Sha1 => HashAlgo::Sha1,
            HashAlgoArg::Sha256 => HashAlgo::Sha256,
        }
    }
}

fn print_summary(rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Shard run").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}

/// Input shards are named `<shard_id>.arrow`; discover and sort them
/// numerically so shard ids stay dense and predictable.
fn discover_shards(input_folder: &PathBuf) -> Result<Vec<(u64, PathBuf)>> {
    let mut shards = Vec::new();
    let entries = std::fs::read_dir(input_folder)
        .with_context(|| format!("failed to read input folder: {}", input_folder.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("arrow") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Ok(shard_id) = stem.parse::<u64>() {
            shards.push((shard_id, path));
        }
    }
    shards.sort_by_key(|(id, _)| *id);
    Ok(shards)
}

fn read_schema(path: &PathBuf) -> Result<Schema> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader =
        FileReader::try_new(file, None).with_context(|| format!("invalid IPC shard: {}", path.display()))?;
    Ok(reader.schema().as_ref().clone())
}

fn column_index(schema: &Schema, config: &imgshard_core::DownloaderConfig) -> Result<ColumnIndex> {
    let url = schema
        .index_of(&config.url_column)
        .map_err(|_| anyhow::anyhow!("url column '{}' not found", config.url_column))?;
    let caption = config
        .caption_column
        .as_deref()
        .and_then(|c| schema.index_of(c).ok());
    let verify_hash = config
        .verify_hash_column
        .as_deref()
        .and_then(|c| schema.index_of(c).ok());
    let blurring_bbox = config
        .blurring_bbox_col
        .as_deref()
        .and_then(|c| schema.index_of(c).ok());
    Ok(ColumnIndex {
        url,
        caption,
        verify_hash,
        blurring_bbox,
    })
}

pub fn run(args: DownloadArgs, config: &Config) -> Result<()> {
    let mut downloader = config.to_downloader_config()?;

    if let Some(output_folder) = &args.output_folder {
        downloader.output_folder = output_folder.clone();
    }
    if let Some(url_column) = &args.url_column {
        downloader.url_column = url_column.clone();
    }
    if args.caption_column.is_some() {
        downloader.caption_column = args.caption_column.clone();
    }
    if args.blurring_bbox_col.is_some() {
        downloader.blurring_bbox_col = args.blurring_bbox_col.clone();
    }
    if let Some(thread_count) = args.thread_count {
        downloader.thread_count = thread_count;
    }
    if let Some(timeout) = args.timeout {
        downloader.timeout = timeout;
    }
    if let Some(retries) = args.retries {
        downloader.retries = retries;
    }
    if let Some(samples_per_shard) = args.samples_per_shard {
        downloader.samples_per_shard = samples_per_shard;
    }
    if let Some(shard_count_oom) = args.shard_count_oom {
        downloader.shard_count_oom = shard_count_oom;
    }
    if let Some(algo) = args.compute_hash {
        downloader.compute_hash = Some(algo.into());
    }
    if let Some(algo) = args.verify_hash_type {
        let algo: HashAlgo = algo.into();
        downloader.verify_hash_type = Some(algo);
        downloader.verify_hash_column = Some(algo.column_name().to_string());
    }
    downloader.save_caption = downloader.save_caption || args.save_caption;
    downloader.extract_exif = downloader.extract_exif || args.extract_exif;
    if let Some(ua) = &args.user_agent_token {
        downloader.user_agent_token = Some(ua.clone());
    }
    if !args.disallowed_header_directives.is_empty() {
        downloader.disallowed_header_directives =
            args.disallowed_header_directives.iter().cloned().collect();
    }

    log::info!("Input folder: {}", args.input_folder.display());
    log::info!("Output folder: {}", downloader.output_folder.display());
    log::info!("Threads per shard: {}", downloader.thread_count);

    let mut shards = discover_shards(&args.input_folder)?;
    if let Some(limit) = args.limit {
        shards.truncate(limit);
    }
    if shards.is_empty() {
        log::warn!("No input shards found in {}", args.input_folder.display());
        return Ok(());
    }
    log::info!("Found {} shard(s) to process", shards.len());

    const TARGET_SIZE: i32 = 256;
    let key_p = p_digits(downloader.samples_per_shard);
    let resizer = CenterCropResizer::new(TARGET_SIZE);
    let stats_sink = JsonStatsSink::new(&downloader.output_folder);

    let mut total_count: u64 = 0;
    let mut completed = 0usize;
    let mut failed = 0usize;
    let start = std::time::Instant::now();

    for (shard_id, path) in &shards {
        let schema = match read_schema(path) {
            Ok(schema) => schema,
            Err(e) => {
                log::error!("shard {shard_id} ({}): {e}", path.display());
                failed += 1;
                continue;
            }
        };
        let columns = match column_index(&schema, &downloader) {
            Ok(columns) => columns,
            Err(e) => {
                log::error!("shard {shard_id} ({}): {e}", path.display());
                failed += 1;
                continue;
            }
        };

        let input_fields: Vec<_> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let out_schema = Arc::new(output_schema(
            &input_fields,
            downloader.verify_hash_column.as_deref(),
            downloader.extract_exif,
            downloader.compute_hash,
        ));
        let meta_names = meta_column_names(&input_fields, downloader.verify_hash_column.as_deref());

        let source = LocalIpcSource::new(
            path.clone(),
            downloader.url_column.clone(),
            downloader.caption_column.clone(),
            downloader.verify_hash_column.clone(),
            downloader.blurring_bbox_col.clone(),
        );
        let writer: Box<dyn imgshard_core::SampleWriter> = Box::new(
            ArrowSampleWriter::new(
                *shard_id,
                &downloader.output_folder,
                out_schema,
                &meta_names,
                downloader.compute_hash,
            )
            .map_err(|e| anyhow::anyhow!("failed to open writer for shard {shard_id}: {e}"))?,
        );

        match process_shard(
            *shard_id,
            &source,
            &columns,
            key_p,
            &downloader,
            &resizer,
            writer,
            &stats_sink,
        ) {
            Ok(outcome) => {
                total_count += outcome.count;
                completed += 1;
            }
            Err(e) => {
                log::error!("shard {shard_id} failed: {e}");
                failed += 1;
            }
        }
    }

    print_summary(&[
        (
            "Shards",
            format!("{completed}/{} ({failed} failed)", shards.len()),
        ),
        ("Rows", total_count.to_string()),
        ("Time", format!("{:.1}s", start.elapsed().as_secs_f64())),
    ]);

    if failed > 0 {
        anyhow::bail!("{failed} shard(s) failed");
    }
    Ok(())
}
