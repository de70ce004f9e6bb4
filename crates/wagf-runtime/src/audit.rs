use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use wagf_core::{InterventionReport, ReflectionInsight, Result, WagfError};

/// End-of-run counters surfaced to the operator and serialized into
/// `governance_summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub seed: u64,
    pub years_completed: u32,
    pub decisions: u64,
    pub outcome_counts: BTreeMap<String, u64>,
    pub llm_invocations: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cache_hit_ratio: f64,
    pub effect_errors: u64,
    pub wall_time_ms: u64,
}

#[derive(Default)]
struct Counters {
    outcomes: BTreeMap<String, u64>,
    rules: BTreeMap<String, u64>,
    agent_types: BTreeMap<String, u64>,
    decisions: u64,
    invocations: u64,
    prompt_tokens: u64,
    completion_tokens: u64,
    effect_errors: u64,
}

/// Append-only audit writers, one mutex per file. Rows are flushed as they
/// are written so a cancelled run leaves valid files on disk.
pub struct AuditSink {
    dir: PathBuf,
    simulation_log: Mutex<csv::Writer<File>>,
    governance_audit: Mutex<csv::Writer<File>>,
    trace_writers: Mutex<HashMap<String, BufWriter<File>>>,
    reflection_log: Mutex<BufWriter<File>>,
    counters: Mutex<Counters>,
}

impl AuditSink {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join("traces"))?;

        let mut simulation_log = csv::Writer::from_writer(File::create(dir.join("simulation_log.csv"))?);
        simulation_log
            .write_record([
                "year",
                "agent_id",
                "agent_type",
                "proposed_skill",
                "final_skill",
                "outcome",
                "constructs",
                "cost",
                "state_snapshot_digest",
            ])
            .map_err(csv_error)?;

        let mut governance_audit =
            csv::Writer::from_writer(File::create(dir.join("governance_audit.csv"))?);
        governance_audit
            .write_record([
                "year",
                "agent_id",
                "agent_type",
                "attempt",
                "proposed_skill",
                "rule_id",
                "severity",
                "valid",
                "reason",
                "suggested_alternatives",
            ])
            .map_err(csv_error)?;

        let reflection_log = BufWriter::new(File::create(dir.join("reflection_log.jsonl"))?);

        Ok(Self {
            dir,
            simulation_log: Mutex::new(simulation_log),
            governance_audit: Mutex::new(governance_audit),
            trace_writers: Mutex::new(HashMap::new()),
            reflection_log: Mutex::new(reflection_log),
            counters: Mutex::new(Counters::default()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// One intervention report: a simulation-log row, per-attempt audit
    /// rows, and one trace line per attempt.
    pub fn record_decision(
        &self,
        report: &InterventionReport,
        state_digest: &str,
        cost: f64,
    ) -> Result<()> {
        let proposed = report
            .initial_proposal()
            .and_then(|p| p.skill.clone())
            .unwrap_or_else(|| "unparseable".to_string());
        let constructs = report
            .initial_proposal()
            .map(|p| {
                p.constructs
                    .iter()
                    .map(|(name, label)| format!("{name}={label}"))
                    .collect::<Vec<_>>()
                    .join(";")
            })
            .unwrap_or_default();

        {
            let mut writer = self.simulation_log.lock();
            writer
                .write_record([
                    report.year.to_string(),
                    report.agent_id.clone(),
                    report.agent_type.clone(),
                    proposed,
                    report.final_skill.clone(),
                    report.outcome.as_str().to_string(),
                    constructs,
                    cost.to_string(),
                    state_digest.to_string(),
                ])
                .map_err(csv_error)?;
            writer.flush()?;
        }

        {
            let mut writer = self.governance_audit.lock();
            for attempt in &report.attempts {
                if !attempt.proposal.is_parseable() {
                    writer
                        .write_record([
                            report.year.to_string(),
                            report.agent_id.clone(),
                            report.agent_type.clone(),
                            attempt.index.to_string(),
                            String::new(),
                            "parse_error".to_string(),
                            "ERROR".to_string(),
                            "false".to_string(),
                            "no parsing tier recognized the reply".to_string(),
                            String::new(),
                        ])
                        .map_err(csv_error)?;
                    continue;
                }
                for result in &attempt.results {
                    writer
                        .write_record([
                            report.year.to_string(),
                            report.agent_id.clone(),
                            report.agent_type.clone(),
                            attempt.index.to_string(),
                            attempt.proposal.skill.clone().unwrap_or_default(),
                            result.rule_id.clone(),
                            format!("{:?}", result.severity).to_uppercase(),
                            result.valid.to_string(),
                            result.reason.clone(),
                            result.alternatives.join(";"),
                        ])
                        .map_err(csv_error)?;
                }
            }
            writer.flush()?;
        }

        {
            let mut writers = self.trace_writers.lock();
            let writer = match writers.entry(report.agent_type.clone()) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    let path = self
                        .dir
                        .join("traces")
                        .join(format!("{}_traces.jsonl", report.agent_type));
                    entry.insert(BufWriter::new(File::create(path)?))
                }
            };
            for attempt in &report.attempts {
                let line = json!({
                    "year": report.year,
                    "agent_id": report.agent_id,
                    "attempt": attempt.index,
                    "prompt": attempt.prompt,
                    "raw_text": attempt.proposal.raw_text,
                    "proposal": attempt.proposal,
                    "results": attempt.results,
                    "from_cache": report.from_cache,
                });
                serde_json::to_writer(&mut *writer, &line)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }

        let mut counters = self.counters.lock();
        counters.decisions += 1;
        *counters
            .outcomes
            .entry(report.outcome.as_str().to_string())
            .or_default() += 1;
        *counters
            .agent_types
            .entry(report.agent_type.clone())
            .or_default() += 1;
        for attempt in &report.attempts {
            for result in &attempt.results {
                *counters.rules.entry(result.rule_id.clone()).or_default() += 1;
            }
        }
        if !report.from_cache {
            counters.invocations += report.attempt_count() as u64;
        }
        counters.prompt_tokens += report.tokens.prompt as u64;
        counters.completion_tokens += report.tokens.completion as u64;

        Ok(())
    }

    pub fn record_reflection(&self, agent_id: &str, insight: &ReflectionInsight) -> Result<()> {
        let mut writer = self.reflection_log.lock();
        let line = json!({
            "agent_id": agent_id,
            "year": insight.year_created,
            "importance": insight.importance,
            "summary": insight.summary,
            "construct_context": insight.construct_context,
        });
        serde_json::to_writer(&mut *writer, &line)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn record_effect_error(&self) {
        self.counters.lock().effect_errors += 1;
    }

    /// Merged effective configuration, including the resolved seed, so a run
    /// is reproducible from its output directory alone.
    pub fn write_config_snapshot<T: Serialize>(&self, config: &T) -> Result<()> {
        let yaml = serde_yaml::to_string(config)?;
        let stamped = format!("# written {}\n{yaml}", chrono::Utc::now().to_rfc3339());
        fs::write(self.dir.join("config_snapshot.yaml"), stamped)?;
        Ok(())
    }

    pub fn build_summary(
        &self,
        run_id: String,
        seed: u64,
        years_completed: u32,
        cache_hit_ratio: f64,
        wall_time_ms: u64,
    ) -> RunSummary {
        let counters = self.counters.lock();
        RunSummary {
            run_id,
            seed,
            years_completed,
            decisions: counters.decisions,
            outcome_counts: counters.outcomes.clone(),
            llm_invocations: counters.invocations,
            prompt_tokens: counters.prompt_tokens,
            completion_tokens: counters.completion_tokens,
            cache_hit_ratio,
            effect_errors: counters.effect_errors,
            wall_time_ms,
        }
    }

    pub fn write_summary(&self, summary: &RunSummary) -> Result<()> {
        let counters = self.counters.lock();
        let document = json!({
            "run": summary,
            "outcomes": counters.outcomes,
            "rules": counters.rules,
            "agent_types": counters.agent_types,
        });
        fs::write(
            self.dir.join("governance_summary.json"),
            serde_json::to_string_pretty(&document)?,
        )?;
        Ok(())
    }

    pub fn finalize(&self) -> Result<()> {
        self.simulation_log.lock().flush()?;
        self.governance_audit.lock().flush()?;
        for writer in self.trace_writers.lock().values_mut() {
            writer.flush()?;
        }
        self.reflection_log.lock().flush()?;
        debug!(dir = %self.dir.display(), "audit files closed");
        Ok(())
    }
}

fn csv_error(error: csv::Error) -> WagfError {
    WagfError::Audit(error.to_string())
}
