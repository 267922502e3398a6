use clap::Parser;
use fire_scan_sim::autopilot::Autopilot;
use fire_scan_sim::constants::{
    INITIAL_SPREAD_MULTIPLIER, SPREAD_MULTIPLIER_MAX, SPREAD_MULTIPLIER_MIN, TICK_MS,
};
use fire_scan_sim::engine::{MissionEngine, MissionOptions};
use fire_scan_sim::error::UplinkError;
use fire_scan_sim::probability::SpreadModel;
use fire_scan_sim::rng::Rng;
use fire_scan_sim::types::{ActionCode, MissionState, RuntimeEvent, Snapshot, Variant};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

const DEFAULT_ACTION_INTERVAL_MS: u64 = 3_000;
const TICK_SAFETY_LIMIT: usize = 60 * 60 * 10;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    single: bool,
    /// `human_only` or `human_cdn`.
    #[arg(long)]
    variant: Option<String>,
    #[arg(long)]
    seed: Option<u32>,
    /// Simulation time between autopilot decisions.
    #[arg(long)]
    action_interval_ms: Option<u64>,
    /// Fraction of probability calls treated as lost.
    #[arg(long)]
    uplink_failure_rate: Option<f32>,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    variant: Variant,
    seed: u32,
    #[serde(rename = "actionIntervalMs")]
    action_interval_ms: u64,
    #[serde(rename = "uplinkFailureRate")]
    uplink_failure_rate: f32,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    variant: Variant,
    seed: u32,
    state: MissionState,
    success: bool,
    #[serde(rename = "elapsedMs")]
    elapsed_ms: u64,
    ticks: u64,
    actions: u32,
    #[serde(rename = "firesTotal")]
    fires_total: usize,
    #[serde(rename = "firesMitigated")]
    fires_mitigated: usize,
    #[serde(rename = "finalCoverage")]
    final_coverage: f32,
    #[serde(rename = "maxVisibleCoverage")]
    max_visible_coverage: f32,
    ignitions: i32,
    suppressions: i32,
    scans: i32,
    evacuations: i32,
    #[serde(rename = "rejectedDecisions")]
    rejected_decisions: i32,
    #[serde(rename = "uplinkFailures")]
    uplink_failures: i32,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
    finished_tick: u64,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageElapsedMs")]
    average_elapsed_ms: u64,
    #[serde(rename = "stateCounts")]
    state_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Clone, Debug, Serialize)]
struct StructuredLogLine {
    #[serde(rename = "timestampMs")]
    timestamp_ms: u64,
    level: String,
    event: String,
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tick: Option<u64>,
    details: Value,
}

fn main() {
    let cli = Cli::parse();
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(seed_hint, run_started_at_ms));
    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut state_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_elapsed_ms = 0u64;
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        emit_log(
            "info",
            "scenario_started",
            &match_id,
            Some(&scenario.name),
            Some(scenario.seed),
            None,
            json!({
                "variant": scenario.variant,
                "actionIntervalMs": scenario.action_interval_ms,
                "uplinkFailureRate": scenario.uplink_failure_rate,
            }),
        );
        let scenario_run = run_scenario(&scenario);

        for anomaly in &scenario_run.anomaly_records {
            emit_log(
                "warn",
                "anomaly_detected",
                &match_id,
                Some(&scenario.name),
                Some(scenario.seed),
                Some(anomaly.tick),
                json!({
                    "message": anomaly.message,
                }),
            );
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();
        total_elapsed_ms += scenario_run.result.elapsed_ms;
        *state_counts
            .entry(scenario_run.result.state.key().to_string())
            .or_insert(0) += 1;

        emit_log(
            "info",
            "scenario_finished",
            &match_id,
            Some(&scenario.name),
            Some(scenario.seed),
            Some(scenario_run.finished_tick),
            json!({
                "state": scenario_run.result.state,
                "elapsedMs": scenario_run.result.elapsed_ms,
                "actions": scenario_run.result.actions,
                "anomalyCount": scenario_run.anomaly_records.len(),
            }),
        );

        match serde_json::to_string(&scenario_run.result) {
            Ok(line) => println!("{line}"),
            Err(error) => emit_log(
                "error",
                "result_serialize_failed",
                &match_id,
                Some(&scenario.name),
                Some(scenario.seed),
                None,
                json!({ "error": error.to_string() }),
            ),
        }
        scenario_results.push(scenario_run.result);
    }

    let run_finished_at_ms = now_ms();
    let summary = build_run_summary(
        match_id.clone(),
        run_started_at_ms,
        run_finished_at_ms,
        scenario_results,
        state_counts,
        total_anomalies,
        total_elapsed_ms,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &match_id,
                None,
                None,
                None,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    emit_log(
        "info",
        "run_finished",
        &match_id,
        None,
        None,
        None,
        json!({
            "scenarioCount": summary.scenario_count,
            "anomalyCount": summary.anomaly_count,
            "averageElapsedMs": summary.average_elapsed_ms,
            "stateCounts": summary.state_counts,
            "summaryOut": summary_out_written,
        }),
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

#[derive(Default)]
struct Counters {
    ignitions: i32,
    suppressions: i32,
    scans: i32,
    evacuations: i32,
    rejected: i32,
    uplink_failures: i32,
}

impl Counters {
    fn absorb(&mut self, events: &[RuntimeEvent]) {
        for event in events {
            match event {
                RuntimeEvent::FireIgnited { .. } => self.ignitions += 1,
                RuntimeEvent::SuppressionApplied { .. } => self.suppressions += 1,
                RuntimeEvent::ScanCompleted { .. } => self.scans += 1,
                RuntimeEvent::EvacuationCreated { .. } => self.evacuations += 1,
                _ => {}
            }
        }
    }
}

fn run_scenario(scenario: &Scenario) -> ScenarioRunResult {
    let mut engine = MissionEngine::new(scenario.variant, scenario.seed, MissionOptions::default());
    let model = SpreadModel::default();
    let mut autopilot = Autopilot::new();
    let mut uplink_rng = Rng::new(scenario.seed ^ 0x5bd1_e995);

    let mut counters = Counters::default();
    let mut max_visible_coverage = 0.0f32;
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();
    let mut tick_safety = 0usize;
    let mut last_tick = 0u64;
    let mut since_decision_ms = 0u64;

    let opening = engine.build_snapshot(true);
    counters.absorb(&opening.events);

    while !engine.is_ended() {
        engine.step(TICK_MS);
        since_decision_ms += TICK_MS;

        if since_decision_ms >= scenario.action_interval_ms && !engine.is_ended() {
            since_decision_ms = 0;
            let view = engine.build_snapshot(false);
            if let Some(decision) = autopilot.decide(&view) {
                let outcome = engine
                    .open_action_menu(&decision.node_id)
                    .and_then(|menu| {
                        let action = menu
                            .choices
                            .iter()
                            .map(|choice| choice.action)
                            .find(|action| *action == decision.action)
                            .or_else(|| menu.choices.first().map(|choice| choice.action))
                            .unwrap_or(ActionCode::Scan);
                        engine.handle_action(&decision.node_id, action, menu.nearest_fire_distance)
                    });
                match outcome {
                    Ok(outcome) => {
                        let feedback = if uplink_rng.bool(scenario.uplink_failure_rate) {
                            counters.uplink_failures += 1;
                            Err(UplinkError::Dropped)
                        } else {
                            model
                                .evaluate(&outcome.probability_request)
                                .map_err(|error| UplinkError::Malformed(error.to_string()))
                        };
                        engine.apply_probability_feedback(feedback);
                    }
                    Err(_) => counters.rejected += 1,
                }
            }
        }

        let snapshot = engine.build_snapshot(true);
        last_tick = snapshot.tick;
        counters.absorb(&snapshot.events);
        for message in collect_snapshot_anomalies(&snapshot, engine.config.mission_duration_ms) {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                snapshot.tick,
                message,
            );
        }
        max_visible_coverage = max_visible_coverage.max(snapshot.visible_coverage_percent);

        tick_safety += 1;
        if tick_safety > TICK_SAFETY_LIMIT {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                snapshot.tick,
                "tick safety limit exceeded".to_string(),
            );
            break;
        }
    }

    let summary = engine.build_summary();
    for fire in engine.fires() {
        if fire.radius < 0.0 || fire.radius > fire.max_radius {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                last_tick,
                format!("fire radius out of range: {} r={}", fire.id, fire.radius),
            );
        }
    }

    ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            variant: scenario.variant,
            seed: scenario.seed,
            state: summary.state,
            success: summary.success,
            elapsed_ms: summary.elapsed_ms,
            ticks: summary.ticks,
            actions: summary.actions_taken,
            fires_total: summary.fires_total,
            fires_mitigated: summary.fires_mitigated,
            final_coverage: (summary.coverage * 1000.0).round() / 10.0,
            max_visible_coverage: (max_visible_coverage * 10.0).round() / 10.0,
            ignitions: counters.ignitions,
            suppressions: counters.suppressions,
            scans: counters.scans,
            evacuations: counters.evacuations,
            rejected_decisions: counters.rejected,
            uplink_failures: counters.uplink_failures,
            anomalies,
        },
        anomaly_records,
        finished_tick: last_tick,
    }
}

fn collect_snapshot_anomalies(snapshot: &Snapshot, mission_duration_ms: u64) -> Vec<String> {
    let mut anomalies = Vec::new();
    let coverage = snapshot.visible_coverage_percent;
    if !coverage.is_finite() || !(0.0..=100.0).contains(&coverage) {
        anomalies.push(format!("invalid visible coverage: {coverage}"));
    }
    if snapshot.time_left_ms > mission_duration_ms {
        anomalies.push(format!("time left exceeds mission: {}", snapshot.time_left_ms));
    }
    let multiplier_max = SPREAD_MULTIPLIER_MAX.max(INITIAL_SPREAD_MULTIPLIER);
    if !(SPREAD_MULTIPLIER_MIN..=multiplier_max).contains(&snapshot.spread_multiplier) {
        anomalies.push(format!(
            "spread multiplier out of range: {}",
            snapshot.spread_multiplier
        ));
    }

    for fire in &snapshot.fires {
        if fire.radius < 0.0 || fire.radius > fire.max_radius {
            anomalies.push(format!(
                "fire radius out of range: {} {}/{}",
                fire.id, fire.radius, fire.max_radius
            ));
        }
    }

    if snapshot.nodes.is_empty() {
        anomalies.push("no decision nodes generated".to_string());
    }
    anomalies
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = cli.seed.unwrap_or_else(clock_seed);
    let action_interval_ms = cli
        .action_interval_ms
        .unwrap_or(DEFAULT_ACTION_INTERVAL_MS)
        .clamp(TICK_MS, 60_000);
    let uplink_failure_rate = cli
        .uplink_failure_rate
        .filter(|rate| rate.is_finite())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    let variant = cli.variant.as_deref().and_then(Variant::parse);

    if cli.single || variant.is_some() {
        let variant = variant.unwrap_or(Variant::HumanOnly);
        return vec![Scenario {
            name: format!("custom-{}", variant.key()),
            variant,
            seed,
            action_interval_ms,
            uplink_failure_rate,
        }];
    }

    vec![
        Scenario {
            name: "human-only-baseline".to_string(),
            variant: Variant::HumanOnly,
            seed,
            action_interval_ms,
            uplink_failure_rate,
        },
        Scenario {
            name: "human-cdn-baseline".to_string(),
            variant: Variant::HumanCdn,
            seed: seed.wrapping_add(1),
            action_interval_ms,
            uplink_failure_rate,
        },
    ]
}

/// Low 32 bits of the wall clock.
fn clock_seed() -> u32 {
    (now_ms() & u64::from(u32::MAX)) as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_match_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    match_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    state_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
    total_elapsed_ms: u64,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let average_elapsed_ms = if scenario_count == 0 {
        0
    } else {
        total_elapsed_ms / scenario_count as u64
    };
    RunSummary {
        match_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_elapsed_ms,
        state_counts,
        scenarios,
    }
}

fn emit_log(
    level: &str,
    event: &str,
    match_id: &str,
    scenario: Option<&str>,
    seed: Option<u32>,
    tick: Option<u64>,
    details: Value,
) {
    let log_line = StructuredLogLine {
        timestamp_ms: now_ms(),
        level: level.to_string(),
        event: event.to_string(),
        match_id: match_id.to_string(),
        scenario: scenario.map(|value| value.to_string()),
        seed,
        tick,
        details,
    };
    match serde_json::to_string(&log_line) {
        Ok(line) => eprintln!("{line}"),
        Err(error) => eprintln!("{{\"level\":\"error\",\"event\":\"log_serialize_failed\",\"error\":\"{error}\"}}"),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_scenario_result(state: MissionState, elapsed_ms: u64) -> ScenarioResultLine {
        ScenarioResultLine {
            scenario: "test".to_string(),
            variant: Variant::HumanOnly,
            seed: 42,
            state,
            success: state.is_success(),
            elapsed_ms,
            ticks: 100,
            actions: 3,
            fires_total: 2,
            fires_mitigated: 1,
            final_coverage: 0.0,
            max_visible_coverage: 0.0,
            ignitions: 2,
            suppressions: 1,
            scans: 2,
            evacuations: 0,
            rejected_decisions: 0,
            uplink_failures: 0,
            anomalies: Vec::new(),
        }
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("simulate").chain(args.iter().copied()))
    }

    #[test]
    fn default_match_id_contains_seed_and_timestamp() {
        assert_eq!(default_match_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn build_run_summary_calculates_average_elapsed() {
        let summary = build_run_summary(
            "sim-42-1".to_string(),
            1,
            2,
            vec![
                make_scenario_result(MissionState::TimedOut, 120_000),
                make_scenario_result(MissionState::AllClear, 60_000),
            ],
            BTreeMap::from([
                ("timed_out".to_string(), 1usize),
                ("all_clear".to_string(), 1usize),
            ]),
            1,
            180_000,
        );
        assert_eq!(summary.average_elapsed_ms, 90_000);
        assert_eq!(summary.scenario_count, 2);
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let target = std::env::temp_dir()
            .join(format!("fire-scan-missing-{}", now_ms()))
            .join("summary.json");
        let summary = build_run_summary(
            "sim-1-1".to_string(),
            1,
            2,
            vec![make_scenario_result(MissionState::TimedOut, 120_000)],
            BTreeMap::from([("timed_out".to_string(), 1usize)]),
            0,
            120_000,
        );
        assert!(write_summary(&target, &summary).is_err());
    }

    #[test]
    fn push_anomaly_keeps_records_and_deduplicates_summary_messages() {
        let mut anomalies = Vec::new();
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        push_anomaly(&mut anomalies, &mut records, &mut seen, 10, "same".to_string());
        push_anomaly(&mut anomalies, &mut records, &mut seen, 11, "same".to_string());
        assert_eq!(anomalies.len(), 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].tick, 11);
    }

    #[test]
    fn scenarios_cover_both_variants_by_default() {
        let scenarios = resolve_scenarios(&cli(&["--seed", "7"]));
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].variant, Variant::HumanOnly);
        assert_eq!(scenarios[1].variant, Variant::HumanCdn);
        assert_eq!(scenarios[1].seed, 8);

        let wrapped = resolve_scenarios(&cli(&["--seed", "4294967295"]));
        assert_eq!(wrapped[0].seed, u32::MAX);
        assert_eq!(wrapped[1].seed, 0);
        assert!(Cli::try_parse_from(["simulate", "--seed", "4294967296"]).is_err());

        let single = resolve_scenarios(&cli(&[
            "--variant",
            "human_cdn",
            "--uplink-failure-rate",
            "3.5",
        ]));
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].variant, Variant::HumanCdn);
        assert_eq!(single[0].uplink_failure_rate, 1.0);
    }

    #[test]
    fn seeded_run_ends_without_anomalies() {
        for variant in [Variant::HumanOnly, Variant::HumanCdn] {
            let run = run_scenario(&Scenario {
                name: "test".to_string(),
                variant,
                seed: 1_234,
                action_interval_ms: 1_000,
                uplink_failure_rate: 0.25,
            });
            assert!(run.result.state.is_terminal());
            assert!(run.result.anomalies.is_empty(), "{:?}", run.result.anomalies);
            assert!(run.result.actions > 0);
        }
    }
}
