use crate::{AppError, Context, ErrorEnvelope, JsonEnvelope};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use perspectiva_catalog::Scenario;
use perspectiva_scoring::{
    blake3_hex, compute_inputs_hash, score_couple_with, score_exact_match, AnswerSet, AuditTrace,
    ExactMatchScores, ScoreResult, ScoringConfig, HASH_UNAVAILABLE,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_BATCH_OUT_PATH: &str = "perspectiva.batch.ndjson";
const ROW_WORK_QUEUE: usize = 256;
const LOWEST_K_LIMIT: usize = 10;

pub(super) struct BatchCommand {
    pub input: String,
    pub out: Option<PathBuf>,
    pub threads: Option<usize>,
    pub max_rows: Option<usize>,
    pub json_output: bool,
    pub strict: bool,
}

/// One couple to score.
struct CoupleTask {
    row_index: usize,
    id: Option<String>,
    answers_a: AnswerSet,
    answers_b: AnswerSet,
    inputs_hash: String,
}

/// Read-only state shared by every worker.
struct Scorer {
    scenarios: Vec<Scenario>,
    config: ScoringConfig,
    trace: AuditTrace,
}

impl Scorer {
    fn score(&self, task: CoupleTask) -> BatchRowResult {
        let result = score_couple_with(
            &self.scenarios,
            &task.answers_a,
            &task.answers_b,
            &self.config,
        );
        let exact_match = self
            .config
            .includes_exact_match()
            .then(|| score_exact_match(&self.scenarios, &task.answers_a, &task.answers_b));
        if !result.excluded.is_empty() {
            tracing::debug!(
                row = task.row_index,
                excluded = result.excluded.len(),
                "row scored with exclusions"
            );
        }
        BatchRowResult::scored(task, result, exact_match, &self.trace)
    }
}

#[derive(Serialize)]
struct BatchRowResult {
    row_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    inputs_hash: String,
    status: &'static str,
    error: Option<ErrorEnvelope>,
    data: Option<ScoreResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exact_match: Option<ExactMatchScores>,
    audit_trace: AuditTrace,
}

impl BatchRowResult {
    fn scored(
        task: CoupleTask,
        result: ScoreResult,
        exact_match: Option<ExactMatchScores>,
        trace: &AuditTrace,
    ) -> Self {
        let status = if result.excluded.is_empty() {
            "OK"
        } else {
            "PARTIAL"
        };
        Self {
            row_index: task.row_index,
            id: task.id,
            audit_trace: row_trace(trace, &task.inputs_hash),
            inputs_hash: task.inputs_hash,
            status,
            error: None,
            data: Some(result),
            exact_match,
        }
    }

    fn input_failure(row_index: usize, failure: RowFailure, trace: &AuditTrace) -> Self {
        Self {
            row_index,
            id: failure.id,
            audit_trace: row_trace(trace, &failure.inputs_hash),
            inputs_hash: failure.inputs_hash,
            status: "ERROR",
            error: Some(failure.error),
            data: None,
            exact_match: None,
        }
    }

    /// Global score of rows where at least one scenario was scored.
    fn rankable_score(&self) -> Option<f64> {
        self.data
            .as_ref()
            .filter(|result| result.scored_scenarios() > 0)
            .map(|result| result.global_score)
    }
}

fn row_trace(trace: &AuditTrace, inputs_hash: &str) -> AuditTrace {
    let mut trace = trace.clone();
    trace.hashes.inputs_hash = inputs_hash.to_string();
    trace
}

struct RowFailure {
    id: Option<String>,
    inputs_hash: String,
    error: ErrorEnvelope,
}

#[derive(Deserialize)]
struct JsonlRow {
    id: Option<String>,
    answers_a: Option<AnswerSet>,
    answers_b: Option<AnswerSet>,
}

#[derive(Serialize)]
struct BatchSummary {
    input_path: String,
    out_path: String,
    rows_total: usize,
    rows_ok: usize,
    rows_partial: usize,
    rows_err: usize,
    duration_ms: u64,
    lowest_k: Vec<BatchLowRow>,
}

#[derive(Serialize)]
struct BatchLowRow {
    row_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    inputs_hash: String,
    global_score: f64,
}

#[derive(Default)]
struct WriterStats {
    rows_total: usize,
    rows_ok: usize,
    rows_partial: usize,
    rows_err: usize,
    lowest_k: Vec<BatchLowRow>,
}

impl WriterStats {
    fn record(&mut self, row: &BatchRowResult) {
        self.rows_total = self.rows_total.saturating_add(1);
        match row.status {
            "OK" => self.rows_ok = self.rows_ok.saturating_add(1),
            "PARTIAL" => self.rows_partial = self.rows_partial.saturating_add(1),
            _ => self.rows_err = self.rows_err.saturating_add(1),
        }
        if let Some(global_score) = row.rankable_score() {
            self.lowest_k.push(BatchLowRow {
                row_index: row.row_index,
                id: row.id.clone(),
                inputs_hash: row.inputs_hash.clone(),
                global_score,
            });
        }
    }

    fn finish(mut self) -> Self {
        self.lowest_k.sort_by(|left, right| {
            left.global_score
                .total_cmp(&right.global_score)
                .then_with(|| left.row_index.cmp(&right.row_index))
                .then_with(|| left.inputs_hash.cmp(&right.inputs_hash))
        });
        self.lowest_k.truncate(LOWEST_K_LIMIT);
        self
    }
}

pub(super) fn run(command: BatchCommand, ctx: &Context) -> Result<JsonEnvelope, AppError> {
    let BatchCommand {
        input,
        out,
        threads,
        max_rows,
        json_output,
        strict,
    } = command;

    if matches!(threads, Some(0)) {
        return Err(AppError::usage("--threads must be >= 1".to_string()));
    }
    if matches!(max_rows, Some(0)) {
        return Err(AppError::usage("--max-rows must be >= 1".to_string()));
    }

    let started = Instant::now();
    let out_path = out.unwrap_or_else(|| PathBuf::from(DEFAULT_BATCH_OUT_PATH));
    let trace = ctx.trace(None);
    let scorer = Arc::new(Scorer {
        scenarios: ctx.catalog.scenarios.clone(),
        config: ctx.config.clone(),
        trace: trace.clone(),
    });

    let progress = build_progress_bar(&input, max_rows)?;
    let out_file = File::create(&out_path).map_err(|err| {
        AppError::output_write(format!(
            "failed to open output file {}: {err}",
            out_path.display()
        ))
    })?;

    let pool = build_thread_pool(threads)?;
    let worker_count = pool.current_num_threads().max(1);
    tracing::info!(workers = worker_count, input = %input, "batch started");

    let (task_tx, task_rx) = bounded::<CoupleTask>(ROW_WORK_QUEUE);
    let (result_tx, result_rx) = unbounded::<BatchRowResult>();

    let writer_handle = thread::spawn(move || write_rows_in_order(out_file, result_rx));

    let mut dispatch_error: Option<AppError> = None;
    pool.in_place_scope(|scope| {
        for _ in 0..worker_count {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let progress = progress.clone();
            let scorer = Arc::clone(&scorer);
            scope.spawn(move |_| {
                while let Ok(task) = task_rx.recv() {
                    if result_tx.send(scorer.score(task)).is_err() {
                        break;
                    }
                    progress.inc(1);
                }
            });
        }
        drop(task_rx);

        let dispatched = open_input(&input).and_then(|mut reader| {
            dispatch_rows(&mut reader, max_rows, &task_tx, &result_tx, &trace, &progress)
        });
        if let Err(err) = dispatched {
            dispatch_error = Some(err);
        }
        drop(task_tx);
    });

    drop(result_tx);

    let stats = writer_handle
        .join()
        .map_err(|_| AppError::internal("batch writer thread panicked".to_string()))??;

    progress.set_position(stats.rows_total as u64);
    progress.finish_with_message(format!("processed {} rows", stats.rows_total));

    if let Some(err) = dispatch_error {
        return Err(err);
    }

    let summary = BatchSummary {
        input_path: input,
        out_path: out_path.display().to_string(),
        rows_total: stats.rows_total,
        rows_ok: stats.rows_ok,
        rows_partial: stats.rows_partial,
        rows_err: stats.rows_err,
        duration_ms: duration_ms(started),
        lowest_k: stats.lowest_k,
    };
    tracing::info!(
        rows = summary.rows_total,
        errors = summary.rows_err,
        ms = summary.duration_ms,
        "batch finished"
    );

    if !json_output {
        print_batch_summary(&summary);
    }

    if strict && summary.rows_err > 0 {
        return Err(AppError::strict_failure(
            "BATCH_STRICT_FAILURE",
            format!("strict mode failed: {} row(s) had errors", summary.rows_err),
        )
        .with_data(json!(summary)));
    }

    Ok(JsonEnvelope::ok(trace, json!(summary)))
}

fn open_input(input: &str) -> Result<Box<dyn BufRead>, AppError> {
    if input == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(input).map_err(|err| {
        AppError::input_read(format!("failed to open input file {input}: {err}"))
    })?;
    Ok(Box::new(BufReader::new(file)))
}

fn build_thread_pool(threads: Option<usize>) -> Result<rayon::ThreadPool, AppError> {
    let mut builder =
        rayon::ThreadPoolBuilder::new().thread_name(|i| format!("perspectiva-batch-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|err| AppError::internal(format!("failed to build batch thread pool: {err}")))
}

fn build_progress_bar(input: &str, max_rows: Option<usize>) -> Result<ProgressBar, AppError> {
    if input == "-" {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::with_template("[{elapsed_precise}] {spinner} {pos} couples scored")
        {
            spinner.set_style(style.tick_chars("/|\\- "));
        }
        spinner.enable_steady_tick(Duration::from_millis(120));
        return Ok(spinner);
    }

    let total = count_rows(Path::new(input), max_rows)?;
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.magenta/blue}] {pos}/{len} couples ({percent}%)",
    ) {
        bar.set_style(style.progress_chars("=> "));
    }
    Ok(bar)
}

fn count_rows(path: &Path, max_rows: Option<usize>) -> Result<usize, AppError> {
    let file = File::open(path).map_err(|err| {
        AppError::input_read(format!(
            "failed to open input file {}: {err}",
            path.display()
        ))
    })?;
    let mut count = 0usize;
    for_each_row(&mut BufReader::new(file), max_rows, |_, _| {
        count = count.saturating_add(1);
        Ok(())
    })?;
    Ok(count)
}

/// Calls `visit` with the index and text of every non-blank line, up to
/// `max_rows`. A UTF-8 BOM on the first line is dropped.
fn for_each_row<R, F>(reader: &mut R, max_rows: Option<usize>, mut visit: F) -> Result<(), AppError>
where
    R: BufRead + ?Sized,
    F: FnMut(usize, &str) -> Result<(), AppError>,
{
    let mut row_index = 0usize;
    let mut line = String::new();
    let mut first = true;

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|err| AppError::input_read(format!("failed to read input line: {err}")))?;
        if read == 0 {
            return Ok(());
        }
        let mut text = line.trim_end_matches(['\n', '\r']);
        if first {
            text = text.strip_prefix('\u{feff}').unwrap_or(text);
        }
        if text.trim().is_empty() {
            continue;
        }
        first = false;

        if max_rows.is_some_and(|limit| row_index >= limit) {
            return Ok(());
        }
        visit(row_index, text)?;
        row_index = row_index.saturating_add(1);
    }
}

fn dispatch_rows<R: BufRead + ?Sized>(
    reader: &mut R,
    max_rows: Option<usize>,
    task_tx: &Sender<CoupleTask>,
    result_tx: &Sender<BatchRowResult>,
    trace: &AuditTrace,
    progress: &ProgressBar,
) -> Result<(), AppError> {
    for_each_row(reader, max_rows, |row_index, line| match parse_row(row_index, line) {
        Ok(task) => task_tx
            .send(task)
            .map_err(|_| AppError::internal("batch worker queue closed unexpectedly".to_string())),
        Err(failure) => {
            tracing::debug!(row = row_index, code = %failure.error.code, "row rejected");
            let row = BatchRowResult::input_failure(row_index, *failure, trace);
            result_tx.send(row).map_err(|_| {
                AppError::internal("batch writer queue closed unexpectedly".to_string())
            })?;
            progress.inc(1);
            Ok(())
        }
    })
}

fn parse_row(row_index: usize, line: &str) -> Result<CoupleTask, Box<RowFailure>> {
    let parsed = serde_json::from_str::<JsonlRow>(line).map_err(|err| {
        Box::new(RowFailure {
            id: None,
            inputs_hash: blake3_hex(line.as_bytes()),
            error: ErrorEnvelope {
                code: "BATCH_INPUT_PARSE".to_string(),
                message: format!("row {row_index} is not a valid couple record"),
                details: json!({ "reason": err.to_string() }),
            },
        })
    })?;

    match (parsed.answers_a, parsed.answers_b) {
        (Some(answers_a), Some(answers_b)) => Ok(CoupleTask {
            row_index,
            id: parsed.id,
            inputs_hash: inputs_hash(&answers_a, &answers_b),
            answers_a,
            answers_b,
        }),
        (answers_a, answers_b) => {
            let mut missing = Vec::new();
            if answers_a.is_none() {
                missing.push("answers_a");
            }
            if answers_b.is_none() {
                missing.push("answers_b");
            }
            Err(Box::new(RowFailure {
                id: parsed.id,
                inputs_hash: inputs_hash(
                    &answers_a.unwrap_or_default(),
                    &answers_b.unwrap_or_default(),
                ),
                error: ErrorEnvelope {
                    code: "BATCH_INPUT_MISSING_FIELDS".to_string(),
                    message: format!("row {row_index} is missing required fields"),
                    details: json!({ "missing": missing }),
                },
            }))
        }
    }
}

fn inputs_hash(answers_a: &AnswerSet, answers_b: &AnswerSet) -> String {
    compute_inputs_hash(answers_a, answers_b).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "inputs hash unavailable");
        HASH_UNAVAILABLE.to_string()
    })
}

fn write_rows_in_order(
    out_file: File,
    result_rx: Receiver<BatchRowResult>,
) -> Result<WriterStats, AppError> {
    let mut writer = BufWriter::new(out_file);
    let mut next_expected = 0usize;
    let mut pending = BTreeMap::<usize, BatchRowResult>::new();
    let mut stats = WriterStats::default();

    while let Ok(row) = result_rx.recv() {
        pending.insert(row.row_index, row);
        while let Some(row) = pending.remove(&next_expected) {
            stats.record(&row);
            serde_json::to_writer(&mut writer, &row).map_err(|err| {
                if err.is_io() {
                    AppError::output_write(format!(
                        "failed to write batch output row {next_expected}: {err}"
                    ))
                } else {
                    AppError::internal(format!(
                        "failed to serialize batch row {next_expected}: {err}"
                    ))
                }
            })?;
            writer.write_all(b"\n").map_err(|err| {
                AppError::output_write(format!(
                    "failed to write batch output row {next_expected}: {err}"
                ))
            })?;
            next_expected = next_expected.saturating_add(1);
        }
    }

    if !pending.is_empty() {
        return Err(AppError::internal(
            "writer stopped before all rows were flushed".to_string(),
        ));
    }

    writer
        .flush()
        .map_err(|err| AppError::output_write(format!("failed to flush batch output: {err}")))?;

    Ok(stats.finish())
}

fn duration_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn print_batch_summary(summary: &BatchSummary) {
    println!(
        "batch complete: total={} ok={} partial={} err={} out={}",
        summary.rows_total,
        summary.rows_ok,
        summary.rows_partial,
        summary.rows_err,
        summary.out_path
    );
    if summary.lowest_k.is_empty() {
        return;
    }
    println!("lowest_k (bottom {} by global_score):", summary.lowest_k.len());
    for item in &summary.lowest_k {
        match &item.id {
            Some(id) => println!(
                "row={} id={} global={} hash={}",
                item.row_index, id, item.global_score, item.inputs_hash
            ),
            None => println!(
                "row={} global={} hash={}",
                item.row_index, item.global_score, item.inputs_hash
            ),
        }
    }
}
