//! CLI integration via the JSON interface.

use test_helpers::{permctl_bin, permctl_json, permctl_stdout, write_file};

use serde_json::Value;

// ── config ──────────────────────────────────────────────────────

#[test]
fn config_init_prints_defaults() {
    let out = permctl_stdout(&["config", "init"]);
    let v: Value = serde_json::from_str(&out).unwrap();
    let s = &v["breakScheduler"];
    assert_eq!(s["enabled"], false);
    assert_eq!(s["minBreakDurationMinutes"], 5);
    assert_eq!(s["maxBreakDurationMinutes"], 15);
    assert_eq!(s["minRunDurationMinutes"], 60);
    assert_eq!(s["maxRunDurationMinutes"], 120);
    assert_eq!(s["totalBreaksTaken"], 0);
    assert_eq!(s["totalBreakTimeMs"], 0);
}

#[test]
fn config_init_writes_file_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bot.json");
    let path = path.to_str().unwrap();

    let out = permctl_bin()
        .args(["config", "init", "--enabled", "-o", path])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v = permctl_json(&["config", "show", path], 0);
    assert_eq!(v["enabled"], true);

    let again = permctl_bin()
        .args(["config", "init", "-o", path])
        .output()
        .unwrap();
    assert_eq!(again.status.code(), Some(1));
}

#[test]
fn config_check_reports_skipped_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        &dir,
        "bot.json",
        r#"{"botName": "x", "breakScheduler": {"enabled": "yes", "minRunDurationMinutes": 10}}"#,
    );

    let v = permctl_json(&["config", "check", &path, "--json"], 0);
    assert_eq!(v["pass"], true);
    assert_eq!(v["applied"], serde_json::json!(["minRunDurationMinutes"]));
    assert_eq!(v["warnings"][0]["field"], "enabled");

    let strict = permctl_json(&["config", "check", &path, "--json", "--strict"], 1);
    assert_eq!(strict["pass"], false);
}

#[test]
fn config_check_rejects_invalid_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "broken.json", "{oops");
    let out = permctl_bin()
        .args(["config", "check", &path])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid settings JSON"));
}

#[test]
fn config_show_clamps_ranges() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        &dir,
        "bot.json",
        r#"{"breakScheduler": {"minBreakDurationMinutes": 30, "maxBreakDurationMinutes": 10, "minRunDurationMinutes": -5}}"#,
    );
    let v = permctl_json(&["config", "show", &path], 0);
    assert_eq!(v["minBreakDurationMinutes"], 30);
    assert_eq!(v["maxBreakDurationMinutes"], 30);
    assert_eq!(v["minRunDurationMinutes"], 0);
}

// ── breaks ──────────────────────────────────────────────────────

#[test]
fn breaks_status_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "bot.json", "{}");
    let v = permctl_json(&["breaks", "status", &path, "--json"], 0);
    assert_eq!(v["enabled"], false);
    assert_eq!(v["status"], "Disabled");
    assert_eq!(v["phase"], "running");
}

#[test]
fn breaks_status_enabled_reports_stats() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        &dir,
        "bot.json",
        r#"{"breakScheduler": {"enabled": true, "minRunDurationMinutes": 30, "maxRunDurationMinutes": 30, "totalBreaksTaken": 7, "totalBreakTimeMs": 600000}}"#,
    );
    let v = permctl_json(&["breaks", "status", &path, "--json"], 0);
    assert!(v["status"].as_str().unwrap().starts_with("Running ("));
    assert_eq!(v["total_breaks_taken"], 7);
    assert_eq!(v["total_break_time_ms"], 600000);
    assert!(v["remaining_run_ms"].as_u64().unwrap() <= 30 * 60 * 1000);
}

#[test]
fn breaks_reset_stats_keeps_other_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        &dir,
        "bot.json",
        r#"{"botName": "miner", "breakScheduler": {"totalBreaksTaken": 4, "totalBreakTimeMs": 1000}}"#,
    );
    let out = permctl_bin()
        .args(["breaks", "reset-stats", &path])
        .output()
        .unwrap();
    assert!(out.status.success());

    let doc: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc["botName"], "miner");
    assert_eq!(doc["breakScheduler"]["totalBreaksTaken"], 0);
    assert_eq!(doc["breakScheduler"]["totalBreakTimeMs"], 0);
}

// ── simulate ────────────────────────────────────────────────────

#[test]
fn simulate_runs_every_tick_once() {
    let v = permctl_json(&["simulate", "--ticks", "60", "--seed", "9", "--capacity", "3", "--json"], 0);
    assert_eq!(v["ticks"], 60);
    let ran = v["ran"].as_u64().unwrap();
    let delayed = v["delayed"].as_u64().unwrap();
    assert_eq!(ran + delayed, 60);
    assert_eq!(v["on_break"], 0);
    assert_eq!(v["reports"].as_array().unwrap().len(), 60);
    assert_eq!(v["state"], "woodcutting");
    assert_eq!(v["status"], "gathering logs");
}

#[test]
fn simulate_is_deterministic_per_seed() {
    let args = ["simulate", "--ticks", "40", "--seed", "5", "--json"];
    let a = permctl_json(&args, 0);
    let b = permctl_json(&args, 0);
    assert_eq!(a["reports"], b["reports"]);
    assert_eq!(a["logs_banked"], b["logs_banked"]);
}

#[test]
fn simulate_forced_break_suspends_ticks_and_saves_stats() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        &dir,
        "bot.json",
        r#"{"botName": "woodie", "breakScheduler": {"enabled": true, "minBreakDurationMinutes": 5, "maxBreakDurationMinutes": 5}}"#,
    );
    let v = permctl_json(
        &["simulate", "--settings", &path, "--ticks", "10", "--break-at", "4", "--save", "--json"],
        0,
    );
    assert_eq!(v["on_break"], 7);
    assert_eq!(v["breaks"]["phase"], "on_break");
    assert!(v["reports"][3]["report"].as_str().unwrap().starts_with("on break"));

    let doc: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc["botName"], "woodie");
    assert_eq!(doc["breakScheduler"]["totalBreaksTaken"], 1);
    assert_eq!(doc["breakScheduler"]["totalBreakTimeMs"], 300000);
}

#[test]
fn simulate_save_requires_settings() {
    let out = permctl_bin()
        .args(["simulate", "--ticks", "1", "--save"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn simulate_text_output_lists_ticks() {
    let out = permctl_stdout(&["simulate", "--ticks", "3"]);
    assert_eq!(out.lines().count(), 3);
    assert!(out.starts_with("tick    1: "));
}
