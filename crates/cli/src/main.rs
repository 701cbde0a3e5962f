mod batch;
#[cfg(feature = "tui")]
mod tui;

use chrono::NaiveDate;
use clap::{error::ErrorKind, ArgAction, Parser, Subcommand};
use perspectiva_catalog::{
    load_catalog_file, validate_catalog, Catalog, CatalogError, CatalogIssue,
};
use perspectiva_core::{out_of_range_tags, round_to, tag_similarity, TagVector, SIMILARITY_METRIC_ID};
use perspectiva_quiz::{answer_status, compute_streak, ResponseRecord, STREAK_WINDOW_DAYS};
use perspectiva_scoring::{
    audit_trace, blake3_hex, catalog_hash, catalog_warnings, compute_answers_hash,
    compute_inputs_hash, jcs_bytes, load_config, score_couple_with, score_exact_match,
    tag_profile, unavailable_trace, AnswerSet, AuditTrace, AuditWarning, ConfigError,
    ConfigSource, ExactMatchScores, ExclusionReason, HashError, ScoreResult, ScoringConfig,
    TagAverage,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "perspectiva", version, about = "Perspectiva couple compatibility CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short = 'j', global = true)]
    json: bool,

    /// Scoring configuration file; overrides PERSPECTIVA_CONFIG.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Scenario catalog JSON; the built-in classic catalog when omitted.
    #[arg(long, global = true, value_name = "PATH")]
    catalog: Option<PathBuf>,

    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Doctor,
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    /// Score a couple from two answer files.
    Score {
        answers_a: PathBuf,
        answers_b: PathBuf,
        /// Append the exact-match report.
        #[arg(long)]
        exact_match: bool,
    },
    /// Tag averages for one respondent.
    Profile { answers: PathBuf },
    Similarity { tags_a: PathBuf, tags_b: PathBuf },
    Streak {
        responses: PathBuf,
        #[arg(long, value_name = "YYYY-MM-DD")]
        today: Option<NaiveDate>,
    },
    Batch {
        input: String,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        threads: Option<usize>,
        #[arg(long)]
        max_rows: Option<usize>,
        #[arg(long)]
        strict: bool,
    },
    Quiz {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum CatalogCommand {
    Show,
    Validate {
        #[arg(long)]
        strict: bool,
    },
    Hash,
}

#[derive(Clone, Copy, Debug)]
enum AppErrorKind {
    Usage,
    Input,
    Dependency,
    Internal,
}

#[derive(Clone, Debug)]
struct AppError {
    kind: AppErrorKind,
    code: &'static str,
    message: String,
    details: Box<Value>,
    data: Option<Box<Value>>,
    inputs_hash: Option<String>,
}

impl AppError {
    fn new(kind: AppErrorKind, code: &'static str, message: String) -> Self {
        Self {
            kind,
            code,
            message,
            details: Box::new(Value::Null),
            data: None,
            inputs_hash: None,
        }
    }

    fn usage(message: String) -> Self {
        Self::new(AppErrorKind::Usage, "CLI_USAGE", message)
    }

    fn input_read(message: String) -> Self {
        Self::new(AppErrorKind::Input, "INPUT_READ", message)
    }

    fn input_parse(message: String) -> Self {
        Self::new(AppErrorKind::Input, "INPUT_PARSE", message)
    }

    fn output_write(message: String) -> Self {
        Self::new(AppErrorKind::Input, "OUTPUT_WRITE", message)
    }

    fn catalog_invalid(message: String) -> Self {
        Self::new(AppErrorKind::Input, "CATALOG_INVALID", message)
    }

    fn config_invalid(message: String) -> Self {
        Self::new(AppErrorKind::Input, "CONFIG_INVALID", message)
    }

    fn strict_failure(code: &'static str, message: String) -> Self {
        Self::new(AppErrorKind::Input, code, message)
    }

    #[cfg_attr(not(feature = "tui"), allow(dead_code))]
    fn dependency(code: &'static str, message: String) -> Self {
        Self::new(AppErrorKind::Dependency, code, message)
    }

    fn internal(message: String) -> Self {
        Self::new(AppErrorKind::Internal, "INTERNAL_ERROR", message)
    }

    fn exit_code(&self) -> i32 {
        match self.kind {
            AppErrorKind::Usage => 1,
            AppErrorKind::Input | AppErrorKind::Dependency | AppErrorKind::Internal => 2,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Box::new(details);
        self
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = Some(Box::new(data));
        self
    }

    fn with_inputs_hash(mut self, inputs_hash: String) -> Self {
        self.inputs_hash = Some(inputs_hash);
        self
    }
}

#[derive(Serialize)]
struct JsonEnvelope {
    status: String,
    error: Option<ErrorEnvelope>,
    audit_trace: AuditTrace,
    data: Option<Value>,
}

impl JsonEnvelope {
    fn ok(audit_trace: AuditTrace, data: Value) -> Self {
        Self::with_status("OK", audit_trace, data)
    }

    fn with_status(status: &str, audit_trace: AuditTrace, data: Value) -> Self {
        Self {
            status: status.to_string(),
            error: None,
            audit_trace,
            data: Some(data),
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    code: String,
    message: String,
    details: Value,
}

/// Catalog and configuration shared by every subcommand.
struct Context {
    catalog: Catalog,
    config: ScoringConfig,
    config_source: ConfigSource,
    warnings: Vec<AuditWarning>,
}

impl Context {
    fn load(catalog_path: Option<&Path>, config_path: Option<&Path>) -> Result<Self, AppError> {
        let loaded = load_config(config_path).map_err(map_config_error)?;
        tracing::debug!(source = ?loaded.source, path = ?loaded.path, "scoring config resolved");

        let catalog = match catalog_path {
            Some(path) => load_catalog_file(path).map_err(map_catalog_error)?,
            None => Catalog::classic(),
        };
        let issues = validate_catalog(&catalog);
        for issue in &issues {
            tracing::warn!(%issue, "catalog data-quality issue");
        }

        Ok(Self {
            warnings: catalog_warnings(&issues),
            catalog,
            config: loaded.config,
            config_source: loaded.source,
        })
    }

    fn trace(&self, inputs_hash: Option<String>) -> AuditTrace {
        self.trace_with(inputs_hash, Vec::new())
    }

    fn trace_with(&self, inputs_hash: Option<String>, extra: Vec<AuditWarning>) -> AuditTrace {
        let mut warnings = self.warnings.clone();
        warnings.extend(extra);
        audit_trace(
            &self.catalog,
            &self.config,
            self.config_source,
            inputs_hash,
            warnings,
        )
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let wants_json = args.iter().any(|arg| arg == "--json" || arg == "-j");

    match Cli::try_parse_from(&args) {
        Ok(cli) => {
            init_tracing(cli.verbose);
            let json = cli.json || wants_json;
            let ctx = match Context::load(cli.catalog.as_deref(), cli.config.as_deref()) {
                Ok(ctx) => ctx,
                Err(err) => exit_with_error(&err, None, json),
            };
            match run(cli.command, &ctx, json) {
                Ok(envelope) => {
                    if json {
                        print_json(&envelope);
                    }
                    std::process::exit(0);
                }
                Err(err) => exit_with_error(&err, Some(&ctx), json),
            }
        }
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{err}");
                std::process::exit(0);
            }
            _ => {
                if wants_json {
                    let usage = AppError::usage(err.to_string());
                    print_json(&error_envelope(&usage, None));
                } else {
                    let _ = err.print();
                }
                std::process::exit(1);
            }
        },
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn exit_with_error(err: &AppError, ctx: Option<&Context>, json: bool) -> ! {
    if json {
        print_json(&error_envelope(err, ctx));
    } else {
        eprintln!("{}", err.message);
    }
    std::process::exit(err.exit_code());
}

fn run(command: Commands, ctx: &Context, json: bool) -> Result<JsonEnvelope, AppError> {
    match command {
        Commands::Doctor => doctor(ctx, json),
        Commands::Catalog { command } => catalog(command, ctx, json),
        Commands::Score {
            answers_a,
            answers_b,
            exact_match,
        } => score(ctx, &answers_a, &answers_b, exact_match, json),
        Commands::Profile { answers } => profile(ctx, &answers, json),
        Commands::Similarity { tags_a, tags_b } => similarity(ctx, &tags_a, &tags_b, json),
        Commands::Streak { responses, today } => streak(ctx, &responses, today, json),
        Commands::Batch {
            input,
            out,
            threads,
            max_rows,
            strict,
        } => batch::run(
            batch::BatchCommand {
                input,
                out,
                threads,
                max_rows,
                json_output: json,
                strict,
            },
            ctx,
        ),
        Commands::Quiz { out } => quiz(ctx, out, json),
    }
}

fn doctor(ctx: &Context, json: bool) -> Result<JsonEnvelope, AppError> {
    let trace = ctx.trace(None);
    if !json {
        println!("perspectiva {}", env!("CARGO_PKG_VERSION"));
        println!(
            "catalog: {} rev {} ({} scenarios)",
            ctx.catalog.catalog_id,
            ctx.catalog.revision,
            ctx.catalog.scenarios.len()
        );
        println!("catalog_hash: {}", trace.hashes.catalog_hash);
        println!(
            "config: {} ({})",
            ctx.config.scoring_algo_id,
            config_source_str(ctx.config_source)
        );
        println!("config_hash: {}", trace.hashes.config_hash);
        println!("metric: {}", ctx.config.similarity_metric_id);
        if !ctx.warnings.is_empty() {
            println!("catalog issues: {}", ctx.warnings.len());
        }
    }
    let data = json!({
        "version": env!("CARGO_PKG_VERSION"),
        "scoring_algo_id": ctx.config.scoring_algo_id,
        "similarity_metric_id": ctx.config.similarity_metric_id,
        "round_digits": ctx.config.round_digits,
        "method": ctx.config.method,
        "catalog_issues": ctx.warnings.len(),
        "tui": cfg!(feature = "tui"),
    });
    Ok(JsonEnvelope::ok(trace, data))
}

fn catalog(command: CatalogCommand, ctx: &Context, json: bool) -> Result<JsonEnvelope, AppError> {
    match command {
        CatalogCommand::Show => {
            if !json {
                print_catalog(&ctx.catalog);
            }
            Ok(JsonEnvelope::ok(ctx.trace(None), json!(ctx.catalog)))
        }
        CatalogCommand::Validate { strict } => {
            let issues = validate_catalog(&ctx.catalog);
            if !json {
                print_issues(&issues);
            }
            let data = json!({
                "issue_count": issues.len(),
                "issues": issues,
            });
            if strict && !issues.is_empty() {
                return Err(AppError::strict_failure(
                    "CATALOG_STRICT_FAILURE",
                    format!("catalog has {} data-quality issue(s)", issues.len()),
                )
                .with_data(data));
            }
            let status = if issues.is_empty() { "OK" } else { "ISSUES" };
            Ok(JsonEnvelope::with_status(status, ctx.trace(None), data))
        }
        CatalogCommand::Hash => {
            let hash = catalog_hash(&ctx.catalog).map_err(map_hash_error)?;
            if !json {
                println!("{hash}");
            }
            let data = json!({
                "catalog_id": ctx.catalog.catalog_id,
                "revision": ctx.catalog.revision,
                "catalog_hash": hash,
            });
            Ok(JsonEnvelope::ok(ctx.trace(None), data))
        }
    }
}

fn score(
    ctx: &Context,
    answers_a_path: &Path,
    answers_b_path: &Path,
    exact_match: bool,
    json: bool,
) -> Result<JsonEnvelope, AppError> {
    let answers_a: AnswerSet = read_json(answers_a_path, "answers")?;
    let answers_b: AnswerSet = read_json(answers_b_path, "answers")?;
    let inputs_hash = compute_inputs_hash(&answers_a, &answers_b).map_err(map_hash_error)?;

    let scenarios = &ctx.catalog.scenarios;
    let result = score_couple_with(scenarios, &answers_a, &answers_b, &ctx.config);
    let exact = (exact_match || ctx.config.includes_exact_match())
        .then(|| score_exact_match(scenarios, &answers_a, &answers_b));

    let warnings = result
        .excluded
        .iter()
        .map(|excluded| {
            AuditWarning::new(
                "SCENARIO_EXCLUDED",
                format!(
                    "scenario={}: {}",
                    excluded.scenario_id,
                    describe_exclusion(&excluded.reason)
                ),
            )
        })
        .collect();

    if !json {
        print_score(&result, exact.as_ref());
    }
    let data = json!({
        "result": result,
        "exact_match": exact,
    });
    Ok(JsonEnvelope::ok(ctx.trace_with(Some(inputs_hash), warnings), data))
}

fn profile(ctx: &Context, answers_path: &Path, json: bool) -> Result<JsonEnvelope, AppError> {
    let answers: AnswerSet = read_json(answers_path, "answers")?;
    let inputs_hash = compute_answers_hash(&answers).map_err(map_hash_error)?;
    let profile = tag_profile(&ctx.catalog.scenarios, &answers);
    if !json {
        print_profile(&profile);
    }
    let data = json!({
        "answered": answers.len(),
        "profile": profile,
    });
    Ok(JsonEnvelope::ok(ctx.trace(Some(inputs_hash)), data))
}

fn similarity(
    ctx: &Context,
    tags_a_path: &Path,
    tags_b_path: &Path,
    json: bool,
) -> Result<JsonEnvelope, AppError> {
    let tags_a: TagVector = read_json(tags_a_path, "tag vector")?;
    let tags_b: TagVector = read_json(tags_b_path, "tag vector")?;
    let inputs_hash = jcs_bytes(&json!({ "tags_a": tags_a, "tags_b": tags_b, "v": 1 }))
        .map(|bytes| blake3_hex(&bytes))
        .map_err(map_hash_error)?;

    let mut warnings = Vec::new();
    for (side, tags) in [("a", &tags_a), ("b", &tags_b)] {
        for (tag, value) in out_of_range_tags(tags) {
            warnings.push(AuditWarning::new(
                "TAG_OUT_OF_RANGE",
                format!("tags_{side}.{tag}={value}"),
            ));
        }
    }

    let raw = tag_similarity(&tags_a, &tags_b);
    let rounded = round_to(raw, ctx.config.round_digits);
    if !json {
        println!("{rounded}");
    }
    let data = json!({
        "similarity": rounded,
        "raw": raw,
        "metric_id": SIMILARITY_METRIC_ID,
    });
    Ok(JsonEnvelope::ok(ctx.trace_with(Some(inputs_hash), warnings), data))
}

fn streak(
    ctx: &Context,
    responses_path: &Path,
    today: Option<NaiveDate>,
    json: bool,
) -> Result<JsonEnvelope, AppError> {
    let records: Vec<ResponseRecord> = read_json(responses_path, "responses")?;
    let inputs_hash = jcs_bytes(&records)
        .map(|bytes| blake3_hex(&bytes))
        .map_err(map_hash_error)?;
    let today = today.unwrap_or_else(|| chrono::Local::now().date_naive());

    let streak = compute_streak(&records, today);
    let status = answer_status(&records, today);
    if !json {
        println!("streak: {streak} day(s)");
        println!(
            "{}: {} answer(s){}",
            status.day,
            status.answer_count,
            if status.both_answered { ", both answered" } else { "" }
        );
    }
    let data = json!({
        "streak": streak,
        "window_days": STREAK_WINDOW_DAYS,
        "today": status,
    });
    Ok(JsonEnvelope::ok(ctx.trace(Some(inputs_hash)), data))
}

#[cfg(feature = "tui")]
fn quiz(ctx: &Context, out: Option<PathBuf>, json: bool) -> Result<JsonEnvelope, AppError> {
    let out = out.unwrap_or_else(|| PathBuf::from(DEFAULT_QUIZ_OUT_PATH));
    let answers = tui::run(&ctx.catalog)
        .map_err(|err| AppError::dependency("TERMINAL_ERROR", err.to_string()))?;
    let Some(answers) = answers else {
        if !json {
            eprintln!("quiz aborted; nothing written");
        }
        let data = json!({ "completed": false });
        return Ok(JsonEnvelope::with_status("ABORTED", ctx.trace(None), data));
    };

    let inputs_hash = compute_answers_hash(&answers).map_err(map_hash_error)?;
    let body = serde_json::to_string_pretty(&answers)
        .map_err(|err| AppError::internal(format!("failed to serialize answers: {err}")))?;
    fs::write(&out, body + "\n").map_err(|err| {
        AppError::output_write(format!("failed to write {}: {err}", out.display()))
            .with_inputs_hash(inputs_hash.clone())
    })?;
    if !json {
        println!("{} answer(s) written to {}", answers.len(), out.display());
    }
    let data = json!({
        "completed": true,
        "answered": answers.len(),
        "total_questions": ctx.catalog.question_count(),
        "out": out,
    });
    Ok(JsonEnvelope::ok(ctx.trace(Some(inputs_hash)), data))
}

#[cfg(not(feature = "tui"))]
fn quiz(_ctx: &Context, _out: Option<PathBuf>, _json: bool) -> Result<JsonEnvelope, AppError> {
    Err(AppError::usage(
        "quiz requires a build with the `tui` feature".to_string(),
    ))
}

#[cfg(feature = "tui")]
const DEFAULT_QUIZ_OUT_PATH: &str = "answers.json";

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, AppError> {
    let raw = fs::read_to_string(path).map_err(|err| {
        AppError::input_read(format!(
            "failed to read {what} file {}: {err}",
            path.display()
        ))
        .with_details(json!({ "path": path }))
    })?;
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(&raw);
    serde_json::from_str(raw).map_err(|err| {
        AppError::input_parse(format!("invalid {what} JSON in {}: {err}", path.display()))
            .with_details(json!({
                "path": path,
                "line": err.line(),
                "column": err.column(),
            }))
    })
}

fn describe_exclusion(reason: &ExclusionReason) -> String {
    match reason {
        ExclusionReason::MalformedScenario { question_count } => {
            format!("expected 4 questions, found {question_count}")
        }
        ExclusionReason::MissingAnswer {
            respondent,
            question_id,
        } => format!("{} has no answer for {question_id}", respondent_str(*respondent)),
        ExclusionReason::OutOfRangeAnswer {
            respondent,
            question_id,
            index,
            option_count,
        } => format!(
            "{} answered {question_id} with index {index} ({option_count} options)",
            respondent_str(*respondent)
        ),
    }
}

fn respondent_str(respondent: perspectiva_scoring::Respondent) -> &'static str {
    match respondent {
        perspectiva_scoring::Respondent::A => "A",
        perspectiva_scoring::Respondent::B => "B",
    }
}

fn config_source_str(source: ConfigSource) -> &'static str {
    match source {
        ConfigSource::Default => "default",
        ConfigSource::File => "file",
        ConfigSource::Env => "env",
    }
}

fn print_catalog(catalog: &Catalog) {
    println!("{} rev {}", catalog.catalog_id, catalog.revision);
    for scenario in &catalog.scenarios {
        println!();
        println!("[{}] {}", scenario.id, scenario.title);
        for question in &scenario.questions {
            println!("  {} {}", question.id, question.text);
            for (index, option) in question.options.iter().enumerate() {
                println!("    {index}. {}", option.text);
            }
        }
    }
}

fn print_issues(issues: &[CatalogIssue]) {
    if issues.is_empty() {
        println!("catalog OK");
        return;
    }
    for issue in issues {
        println!("{issue}");
    }
    println!("{} issue(s)", issues.len());
}

fn print_score(result: &ScoreResult, exact: Option<&ExactMatchScores>) {
    println!("global score: {}", result.global_score);
    println!("  empathy:                     {}", result.empathy);
    println!("  fairness / consensus:        {}", result.fairness_consensus);
    println!("  desire alignment:            {}", result.desire_alignment);
    println!(
        "  personal-relational balance: {}",
        result.personal_relational_balance
    );
    for scenario in &result.per_scenario {
        println!(
            "  [{}] {}: E {} F {} D {} B {}",
            scenario.scenario_id,
            scenario.scenario_title,
            scenario.empathy,
            scenario.fairness_consensus,
            scenario.desire_alignment,
            scenario.personal_relational_balance
        );
    }
    for excluded in &result.excluded {
        println!(
            "  [{}] excluded: {}",
            excluded.scenario_id,
            describe_exclusion(&excluded.reason)
        );
    }
    if let Some(exact) = exact {
        println!("exact match (secondary):");
        println!("  alignment:           {}", exact.alignment);
        println!("  empathy:             {}", exact.empathy);
        println!("  relationship health: {}", exact.relationship_health);
    }
}

fn print_profile(profile: &[TagAverage]) {
    if profile.is_empty() {
        println!("no answered options");
        return;
    }
    let width = profile.iter().map(|entry| entry.tag.len()).max().unwrap_or(0);
    for entry in profile {
        println!(
            "{:<width$}  {:>4}  (n={})",
            entry.tag, entry.value, entry.samples
        );
    }
}

fn error_envelope(err: &AppError, ctx: Option<&Context>) -> JsonEnvelope {
    let audit_trace = match ctx {
        Some(ctx) => ctx.trace(err.inputs_hash.clone()),
        None => unavailable_trace(err.inputs_hash.clone()),
    };
    JsonEnvelope {
        status: "UNKNOWN".to_string(),
        error: Some(ErrorEnvelope {
            code: err.code.to_string(),
            message: err.message.clone(),
            details: (*err.details).clone(),
        }),
        audit_trace,
        data: err.data.as_deref().cloned(),
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("failed to serialize json output: {err}"),
    }
}

fn map_config_error(err: ConfigError) -> AppError {
    let details = match &err {
        ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => json!({ "path": path }),
        ConfigError::Invalid { .. } => Value::Null,
    };
    AppError::config_invalid(err.to_string()).with_details(details)
}

fn map_catalog_error(err: CatalogError) -> AppError {
    match &err {
        CatalogError::Io { path, .. } => {
            AppError::input_read(err.to_string()).with_details(json!({ "path": path }))
        }
        CatalogError::Parse { .. } => AppError::catalog_invalid(err.to_string()),
    }
}

fn map_hash_error(err: HashError) -> AppError {
    AppError::internal(format!("failed to hash inputs: {err}"))
}
