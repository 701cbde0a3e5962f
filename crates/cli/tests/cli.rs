use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn perspectiva() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("perspectiva");
    cmd.env_remove("PERSPECTIVA_CONFIG").env_remove("RUST_LOG");
    cmd
}

fn run_json(args: &[&str]) -> (Option<i32>, Value) {
    let output = perspectiva().args(args).arg("--json").output().unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    let value: Value = serde_json::from_str(&stdout).expect("stdout must be JSON");
    (output.status.code(), value)
}

fn write_json(dir: &TempDir, name: &str, value: &Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, value.to_string()).unwrap();
    path
}

fn full_answers(index: i64) -> Value {
    let mut answers = serde_json::Map::new();
    for scenario in 1..=3 {
        for slot in 1..=4 {
            answers.insert(format!("q{scenario}_{slot}"), json!(index));
        }
    }
    Value::Object(answers)
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn json_usage_error_when_missing_subcommand() {
    let output = perspectiva().arg("--json").output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let value: Value = serde_json::from_str(&stdout).expect("stdout must be JSON");
    assert_eq!(value["error"]["code"], "CLI_USAGE");
}

#[test]
fn non_json_usage_error() {
    let mut cmd = cargo_bin_cmd!("perspectiva");
    cmd.assert()
        .failure()
        .code(1)
        .stdout(predicates::str::is_empty())
        .stderr(contains("Usage"));
}

#[test]
fn help_and_version_exit_zero() {
    assert_eq!(perspectiva().arg("--help").output().unwrap().status.code(), Some(0));
    assert_eq!(
        perspectiva().arg("--version").output().unwrap().status.code(),
        Some(0)
    );
}

#[test]
fn json_doctor_success() {
    let (code, value) = run_json(&["doctor"]);

    assert_eq!(code, Some(0));
    assert!(value["error"].is_null());
    assert_eq!(value["status"], "OK");
    assert_eq!(value["data"]["scoring_algo_id"], "perspective4_tag_union_v1");
    assert_eq!(value["audit_trace"]["catalog"]["catalog_id"], "classic");
    assert_eq!(value["audit_trace"]["catalog"]["scenario_count"], 3);
    assert_eq!(value["audit_trace"]["config_source"], "default");
    assert_eq!(value["audit_trace"]["hashes"]["inputs_hash"], "UNAVAILABLE");
}

#[test]
fn catalog_hash_matches_audit_trace() {
    let (code, hashed) = run_json(&["catalog", "hash"]);
    assert_eq!(code, Some(0));
    let hash = hashed["data"]["catalog_hash"].as_str().unwrap();
    assert_eq!(hash.len(), 64);
    assert_eq!(hashed["audit_trace"]["hashes"]["catalog_hash"], hash);

    let (_, again) = run_json(&["catalog", "hash"]);
    assert_eq!(again["data"]["catalog_hash"], hash);
}

#[test]
fn classic_catalog_validates_clean() {
    let (code, value) = run_json(&["catalog", "validate", "--strict"]);
    assert_eq!(code, Some(0));
    assert_eq!(value["status"], "OK");
    assert_eq!(value["data"]["issue_count"], 0);
}

#[test]
fn strict_validation_fails_on_malformed_catalog() {
    let dir = TempDir::new().unwrap();
    let option = json!({ "text": "yes", "tags": { "calm": 5.0 } });
    let question = |id: &str| json!({ "id": id, "text": "?", "options": [option.clone()] });
    let catalog = json!({
        "catalog_id": "tiny",
        "revision": "t1",
        "scenarios": [{
            "id": 1,
            "title": "short",
            "questions": [question("a"), question("b"), question("c")],
        }],
    });
    let path = write_json(&dir, "catalog.json", &catalog);

    let (code, value) = run_json(&["--catalog", path_str(&path), "catalog", "validate"]);
    assert_eq!(code, Some(0));
    assert_eq!(value["status"], "ISSUES");
    assert_eq!(value["data"]["issues"][0]["code"], "WRONG_QUESTION_COUNT");
    assert_eq!(value["audit_trace"]["warnings"][0]["type"], "CATALOG_DATA_QUALITY");

    let (code, value) = run_json(&[
        "--catalog",
        path_str(&path),
        "catalog",
        "validate",
        "--strict",
    ]);
    assert_eq!(code, Some(2));
    assert_eq!(value["error"]["code"], "CATALOG_STRICT_FAILURE");
    assert_eq!(value["audit_trace"]["catalog"]["catalog_id"], "tiny");
}

#[test]
fn unparsable_catalog_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{\"catalog_id\": ").unwrap();

    let (code, value) = run_json(&["--catalog", path_str(&path), "doctor"]);
    assert_eq!(code, Some(2));
    assert_eq!(value["error"]["code"], "CATALOG_INVALID");
    assert_eq!(value["audit_trace"]["catalog"]["catalog_id"], "unavailable");
    assert_eq!(value["audit_trace"]["hashes"]["catalog_hash"], "UNAVAILABLE");
}

#[test]
fn score_reports_all_scenarios_and_binds_inputs() {
    let dir = TempDir::new().unwrap();
    let a = write_json(&dir, "a.json", &full_answers(0));
    let b = write_json(&dir, "b.json", &full_answers(0));

    let (code, value) = run_json(&["score", path_str(&a), path_str(&b), "--exact-match"]);
    assert_eq!(code, Some(0));
    assert_eq!(value["status"], "OK");
    let result = &value["data"]["result"];
    assert_eq!(result["per_scenario"].as_array().unwrap().len(), 3);
    assert!(result["excluded"].as_array().unwrap().is_empty());
    let global = result["global_score"].as_f64().unwrap();
    assert!((0.0..=100.0).contains(&global));
    assert_eq!(value["data"]["exact_match"]["alignment"], 100.0);
    assert_eq!(
        value["audit_trace"]["hashes"]["inputs_hash"]
            .as_str()
            .unwrap()
            .len(),
        64
    );
}

#[test]
fn score_with_empty_side_is_zero() {
    let dir = TempDir::new().unwrap();
    let a = write_json(&dir, "a.json", &full_answers(1));
    let b = write_json(&dir, "b.json", &json!({}));

    let (code, value) = run_json(&["score", path_str(&a), path_str(&b)]);
    assert_eq!(code, Some(0));
    assert_eq!(value["data"]["result"]["global_score"], 0.0);
    assert!(value["data"]["result"]["per_scenario"]
        .as_array()
        .unwrap()
        .is_empty());
    assert!(value["data"]["exact_match"].is_null());
}

#[test]
fn score_flags_excluded_scenarios_in_warnings() {
    let dir = TempDir::new().unwrap();
    let mut partial = full_answers(2);
    partial.as_object_mut().unwrap().remove("q2_3");
    let a = write_json(&dir, "a.json", &partial);
    let b = write_json(&dir, "b.json", &full_answers(2));

    let (code, value) = run_json(&["score", path_str(&a), path_str(&b)]);
    assert_eq!(code, Some(0));
    let excluded = value["data"]["result"]["excluded"].as_array().unwrap();
    assert_eq!(excluded.len(), 1);
    assert_eq!(excluded[0]["scenario_id"], 2);
    assert_eq!(excluded[0]["reason"], "missing_answer");
    let warnings = value["audit_trace"]["warnings"].as_array().unwrap();
    assert!(warnings.iter().any(|w| w["type"] == "SCENARIO_EXCLUDED"));
}

#[test]
fn score_missing_file_is_input_error() {
    let dir = TempDir::new().unwrap();
    let a = write_json(&dir, "a.json", &full_answers(0));
    let missing = dir.path().join("nope.json");

    let (code, value) = run_json(&["score", path_str(&a), path_str(&missing)]);
    assert_eq!(code, Some(2));
    assert_eq!(value["error"]["code"], "INPUT_READ");
}

#[test]
fn score_rejects_non_integer_answers() {
    let dir = TempDir::new().unwrap();
    let a = write_json(&dir, "a.json", &json!({ "q1_1": "first" }));
    let b = write_json(&dir, "b.json", &full_answers(0));

    let (code, value) = run_json(&["score", path_str(&a), path_str(&b)]);
    assert_eq!(code, Some(2));
    assert_eq!(value["error"]["code"], "INPUT_PARSE");
}

#[test]
fn profile_lists_tag_averages() {
    let dir = TempDir::new().unwrap();
    let a = write_json(&dir, "a.json", &full_answers(0));

    let (code, value) = run_json(&["profile", path_str(&a)]);
    assert_eq!(code, Some(0));
    assert_eq!(value["data"]["answered"], 12);
    let profile = value["data"]["profile"].as_array().unwrap();
    assert!(!profile.is_empty());
    let values: Vec<f64> = profile.iter().map(|t| t["value"].as_f64().unwrap()).collect();
    assert!(values.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[test]
fn similarity_of_disjoint_and_identical_vectors() {
    let dir = TempDir::new().unwrap();
    let a = write_json(&dir, "a.json", &json!({ "a": 10.0 }));
    let b = write_json(&dir, "b.json", &json!({ "b": 10.0 }));

    let (code, value) = run_json(&["similarity", path_str(&a), path_str(&b)]);
    assert_eq!(code, Some(0));
    assert_eq!(value["data"]["similarity"], 0.0);
    assert_eq!(value["data"]["metric_id"], "euclid_union_keys_scale10_v1");

    let (_, value) = run_json(&["similarity", path_str(&a), path_str(&a)]);
    assert_eq!(value["data"]["similarity"], 100.0);
}

#[test]
fn similarity_warns_on_out_of_range_tags() {
    let dir = TempDir::new().unwrap();
    let a = write_json(&dir, "a.json", &json!({ "calm": 12.0 }));
    let b = write_json(&dir, "b.json", &json!({ "calm": 10.0 }));

    let (code, value) = run_json(&["similarity", path_str(&a), path_str(&b)]);
    assert_eq!(code, Some(0));
    assert_eq!(value["audit_trace"]["warnings"][0]["type"], "TAG_OUT_OF_RANGE");
}

#[test]
fn streak_counts_back_from_today() {
    let dir = TempDir::new().unwrap();
    let records = json!([
        { "day": "2026-03-08", "user_id": "ana" },
        { "day": "2026-03-08", "user_id": "ben" },
        { "day": "2026-03-09", "user_id": "ana" },
        { "day": "2026-03-09", "user_id": "ben" },
        { "day": "2026-03-10", "user_id": "ana" },
    ]);
    let path = write_json(&dir, "responses.json", &records);

    let (code, value) = run_json(&["streak", path_str(&path), "--today", "2026-03-09"]);
    assert_eq!(code, Some(0));
    assert_eq!(value["data"]["streak"], 2);
    assert_eq!(value["data"]["today"]["both_answered"], true);

    let (_, value) = run_json(&["streak", path_str(&path), "--today", "2026-03-10"]);
    assert_eq!(value["data"]["streak"], 0);
    assert_eq!(value["data"]["today"]["answer_count"], 1);
}

#[test]
fn streak_rejects_bad_date_as_usage() {
    let dir = TempDir::new().unwrap();
    let path = write_json(&dir, "responses.json", &json!([]));
    let (code, value) = run_json(&["streak", path_str(&path), "--today", "10/03/2026"]);
    assert_eq!(code, Some(1));
    assert_eq!(value["error"]["code"], "CLI_USAGE");
}

#[test]
fn config_file_changes_rounding_and_source() {
    let dir = TempDir::new().unwrap();
    let config = json!({
        "scoring_algo_id": "perspective4_tag_union_v1",
        "similarity_metric_id": "euclid_union_keys_scale10_v1",
        "round_digits": 3,
        "report_components": false,
        "method": "tag_vector_with_exact_match",
    });
    let config_path = write_json(&dir, "config.json", &config);
    let a = write_json(&dir, "a.json", &json!({ "x": 3.0 }));
    let b = write_json(&dir, "b.json", &json!({ "x": 4.0 }));

    let (code, value) = run_json(&[
        "--config",
        path_str(&config_path),
        "similarity",
        path_str(&a),
        path_str(&b),
    ]);
    assert_eq!(code, Some(0));
    assert_eq!(value["audit_trace"]["config_source"], "file");
    // sqrt(1/100) = 0.1 normalized distance.
    assert_eq!(value["data"]["similarity"], 90.0);

    let answers = write_json(&dir, "answers.json", &full_answers(0));
    let (_, value) = run_json(&[
        "--config",
        path_str(&config_path),
        "score",
        path_str(&answers),
        path_str(&answers),
    ]);
    assert!(value["data"]["exact_match"].is_object());
}

#[test]
fn env_config_is_picked_up() {
    let dir = TempDir::new().unwrap();
    let config = json!({
        "scoring_algo_id": "perspective4_tag_union_v1",
        "similarity_metric_id": "euclid_union_keys_scale10_v1",
        "round_digits": 2,
        "report_components": true,
        "method": "tag_vector",
    });
    let config_path = write_json(&dir, "config.json", &config);

    let output = perspectiva()
        .env("PERSPECTIVA_CONFIG", &config_path)
        .args(["doctor", "--json"])
        .output()
        .unwrap();
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["audit_trace"]["config_source"], "env");
    assert_eq!(value["data"]["round_digits"], 2);
}

#[test]
fn unknown_config_fields_are_rejected() {
    let dir = TempDir::new().unwrap();
    let config_path = write_json(&dir, "config.json", &json!({ "round_digits": 1, "extra": true }));

    let (code, value) = run_json(&["--config", path_str(&config_path), "doctor"]);
    assert_eq!(code, Some(2));
    assert_eq!(value["error"]["code"], "CONFIG_INVALID");
}

fn batch_input(dir: &TempDir) -> PathBuf {
    let rows = [
        json!({ "id": "c0", "answers_a": full_answers(0), "answers_b": full_answers(1) }).to_string(),
        String::new(),
        "{broken".to_string(),
        json!({ "id": "c2", "answers_a": full_answers(3) }).to_string(),
        json!({ "answers_a": full_answers(2), "answers_b": { "q1_1": 2 } }).to_string(),
    ];
    let path = dir.path().join("couples.jsonl");
    fs::write(&path, rows.join("\n") + "\n").unwrap();
    path
}

#[test]
fn batch_writes_rows_in_input_order() {
    let dir = TempDir::new().unwrap();
    let input = batch_input(&dir);
    let out = dir.path().join("out.ndjson");

    let (code, value) = run_json(&[
        "batch",
        path_str(&input),
        "--out",
        path_str(&out),
        "--threads",
        "2",
    ]);
    assert_eq!(code, Some(0));
    let summary = &value["data"];
    assert_eq!(summary["rows_total"], 4);
    assert_eq!(summary["rows_ok"], 1);
    assert_eq!(summary["rows_partial"], 1);
    assert_eq!(summary["rows_err"], 2);
    assert_eq!(summary["lowest_k"].as_array().unwrap().len(), 1);

    let rows: Vec<Value> = fs::read_to_string(&out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let indices: Vec<u64> = rows.iter().map(|row| row["row_index"].as_u64().unwrap()).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert_eq!(rows[0]["id"], "c0");
    assert_eq!(rows[0]["status"], "OK");
    assert_eq!(rows[1]["error"]["code"], "BATCH_INPUT_PARSE");
    assert_eq!(rows[2]["error"]["code"], "BATCH_INPUT_MISSING_FIELDS");
    assert_eq!(rows[3]["status"], "PARTIAL");
    assert_eq!(
        rows[0]["inputs_hash"],
        rows[0]["audit_trace"]["hashes"]["inputs_hash"]
    );
}

#[test]
fn batch_strict_fails_on_row_errors() {
    let dir = TempDir::new().unwrap();
    let input = batch_input(&dir);
    let out = dir.path().join("out.ndjson");

    let (code, value) = run_json(&["batch", path_str(&input), "--out", path_str(&out), "--strict"]);
    assert_eq!(code, Some(2));
    assert_eq!(value["error"]["code"], "BATCH_STRICT_FAILURE");
    assert_eq!(value["data"]["rows_err"], 2);
}

#[test]
fn batch_max_rows_and_zero_threads() {
    let dir = TempDir::new().unwrap();
    let input = batch_input(&dir);
    let out = dir.path().join("out.ndjson");

    let (code, value) = run_json(&[
        "batch",
        path_str(&input),
        "--out",
        path_str(&out),
        "--max-rows",
        "1",
    ]);
    assert_eq!(code, Some(0));
    assert_eq!(value["data"]["rows_total"], 1);

    let (code, value) = run_json(&["batch", path_str(&input), "--threads", "0"]);
    assert_eq!(code, Some(1));
    assert_eq!(value["error"]["code"], "CLI_USAGE");
}

#[cfg(target_os = "linux")]
#[test]
fn batch_exits_when_output_device_is_full() {
    let dir = TempDir::new().unwrap();
    let row = json!({ "answers_a": full_answers(0), "answers_b": full_answers(2) }).to_string();
    let input = dir.path().join("many.jsonl");
    fs::write(&input, vec![row; 1000].join("\n") + "\n").unwrap();

    let output = perspectiva()
        .args(["batch", path_str(&input), "--out", "/dev/full", "--threads", "2", "--json"])
        .timeout(Duration::from_secs(60))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let value: Value = serde_json::from_slice(&output.stdout).expect("stdout must be JSON");
    assert_eq!(value["error"]["code"], "OUTPUT_WRITE");
}

#[test]
fn human_score_output() {
    let dir = TempDir::new().unwrap();
    let a = write_json(&dir, "a.json", &full_answers(0));
    let b = write_json(&dir, "b.json", &full_answers(3));

    let mut cmd = cargo_bin_cmd!("perspectiva");
    cmd.env_remove("PERSPECTIVA_CONFIG")
        .args(["score", path_str(&a), path_str(&b)])
        .assert()
        .success()
        .stdout(contains("global score:"))
        .stdout(contains("desire alignment"));
}
