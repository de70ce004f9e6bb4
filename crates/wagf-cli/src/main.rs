//! `wagf`: run a governed-broker experiment from the command line
//!
//! Concrete LLM providers are external collaborators, so this driver wires
//! the scripted mock provider and the built-in demo simulation: enough to
//! exercise the whole pipeline and produce a complete audit directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use wagf_governance::GovernanceMode;
use wagf_llm::MockLlm;
use wagf_memory::EngineKind;
use wagf_runtime::{
    AgentTypesFile, DemoSimulation, ExperimentBuilder, ExperimentConfig, LoggingHooks,
};
use wagf_skills::SkillRegistry;

const DEFAULT_REGISTRY: &str = include_str!("../config/skill_registry.yaml");
const DEFAULT_AGENT_TYPES: &str = include_str!("../config/agent_types.yaml");

#[derive(Parser, Debug)]
#[command(name = "wagf", version, about = "Governed LLM-agent simulation experiments")]
struct Cli {
    /// Model name, used for model-family output preprocessing.
    #[arg(long, default_value = "mock")]
    model: String,

    #[arg(long, default_value_t = 5)]
    years: u32,

    #[arg(long, default_value_t = 10)]
    agents: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// window | importance | humancentric
    #[arg(long, default_value = "humancentric")]
    memory_engine: String,

    /// disabled | strict
    #[arg(long, default_value = "strict")]
    governance_mode: String,

    #[arg(long, default_value = "./wagf_output")]
    output: PathBuf,

    /// Parallel decision slots; simulation updates stay serialized.
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Skill registry YAML; the built-in demo registry when omitted.
    #[arg(long)]
    skills: Option<PathBuf>,

    /// Agent types YAML; the built-in demo configuration when omitted.
    #[arg(long)]
    agent_types: Option<PathBuf>,

    #[arg(long, default_value_t = 5000.0)]
    starting_funds: f64,
}

/// Scripted replies cycling through the governance-relevant cases: a sound
/// purchase, inaction under very high threat (draws a retry), and an
/// over-budget elevation (draws the affordability rule).
fn scripted_llm(model: &str) -> MockLlm {
    MockLlm::new(model)
        .with_responses([
            r#"<<<DECISION>>>{"decision": "buy_insurance", "reasoning": "the last flood was close", "TP": "H", "CP": "M"}<<<END>>>"#,
            r#"<<<DECISION>>>{"decision": "do_nothing", "reasoning": "it will pass", "TP": "VH", "CP": "L"}<<<END>>>"#,
            r#"<<<DECISION>>>{"decision": "do_nothing", "reasoning": "waiting one more year", "TP": "L", "CP": "M"}<<<END>>>"#,
            r#"<<<DECISION>>>{"decision": "elevate_house", "reasoning": "raise it above the water line", "TP": "VH", "CP": "H"}<<<END>>>"#,
        ])
        .cycling()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let registry = match &cli.skills {
        Some(path) => SkillRegistry::load_path(path)
            .with_context(|| format!("loading skill registry {}", path.display()))?,
        None => SkillRegistry::load_str(DEFAULT_REGISTRY).context("built-in skill registry")?,
    };

    let mut types = match &cli.agent_types {
        Some(path) => AgentTypesFile::load_path(path)
            .with_context(|| format!("loading agent types {}", path.display()))?,
        None => AgentTypesFile::load_str(DEFAULT_AGENT_TYPES).context("built-in agent types")?,
    };

    types.global_config.memory.engine = EngineKind::parse(&cli.memory_engine)
        .with_context(|| format!("unknown memory engine '{}'", cli.memory_engine))?;
    types.global_config.governance_mode = match cli.governance_mode.as_str() {
        "disabled" => GovernanceMode::Disabled,
        "strict" => GovernanceMode::Strict,
        other => anyhow::bail!("unknown governance mode '{other}'"),
    };

    let config = ExperimentConfig::new(cli.years, &cli.output)
        .with_seed(cli.seed)
        .with_workers(cli.workers);

    let simulation = DemoSimulation::households(cli.agents, cli.starting_funds);
    let llm = Arc::new(scripted_llm(&cli.model));

    let mut runner = ExperimentBuilder::new(registry, types, llm, config)
        .with_hooks(Arc::new(LoggingHooks))
        .build(simulation)?;

    // external cancellation drains in-flight decisions and halts cleanly
    let cancel = runner.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, draining current step");
            cancel.store(true, Ordering::Relaxed);
        }
    });

    let summary = runner.run().await?;

    println!();
    println!("run {} complete ({} ms)", summary.run_id, summary.wall_time_ms);
    println!(
        "years: {} / decisions: {} / LLM invocations: {}",
        summary.years_completed, summary.decisions, summary.llm_invocations
    );
    for (outcome, count) in &summary.outcome_counts {
        println!("  {outcome}: {count}");
    }
    println!(
        "tokens: {} prompt / {} completion, cache hit ratio {:.2}, effect errors {}",
        summary.prompt_tokens, summary.completion_tokens, summary.cache_hit_ratio,
        summary.effect_errors
    );
    println!("audit written to {}", cli.output.display());

    if summary.years_completed < cli.years {
        anyhow::bail!(
            "run halted after year {} of {}; audit files are valid",
            summary.years_completed,
            cli.years
        );
    }

    Ok(())
}
