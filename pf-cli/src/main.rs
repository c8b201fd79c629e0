//! Entry point (§9): loads a persona package, opens its memory store,
//! wires the mock LLM/embedding providers and the in-memory vector
//! index (the concrete platform/LLM backends are external collaborators
//! per §6, not part of this crate), and drives the session loop until a
//! shutdown signal arrives. Also exposes the backup/restore/list
//! subcommands for moving a persona's memory between hosts.

mod backup;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use pf_behavior::{PatternRegistry, TopicSelector, TopicWeights};
use pf_core::Persona;
use pf_llm::{LlmProvider, MockEmbeddingProvider, MockLlmProvider, SocialPlatformAdapter};
use pf_memory::vector_index::InMemoryVectorIndex;
use pf_memory::{Consolidator, MemoryStore, VectorIndex};
use pf_scheduler::{AgentMode, ModeManager};

#[derive(Parser)]
#[command(name = "pf-agent")]
#[command(about = "Persona social-media agent runtime")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the session loop until interrupted. This is the default when
    /// no subcommand is given.
    Run,
    /// Archive the data directory into a single zip file.
    Backup {
        data_dir: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extract a backup archive into a data directory.
    Restore { archive: PathBuf, data_dir: PathBuf },
    /// Print the contents of a backup archive without extracting it.
    List { archive: PathBuf },
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run().await,
        Commands::Backup { data_dir, output } => {
            let output = output.unwrap_or_else(|| {
                PathBuf::from(format!("memory_backup_{}.zip", Utc::now().format("%Y%m%d_%H%M%S")))
            });
            backup::create_backup(&data_dir, &output)
        }
        Commands::Restore { archive, data_dir } => backup::restore_backup(&archive, &data_dir),
        Commands::List { archive } => backup::list_backup_contents(&archive),
    }
}

async fn run() -> Result<()> {
    let persona_dir = env_or("PERSONA_DIR", "./personas/default");
    let mode_str = env_or("AGENT_MODE", "normal");
    let memory_db_path = env_or("MEMORY_DB_PATH", "./data/memory.db");
    let daily_action_cap: u32 = std::env::var("DAILY_ACTION_CAP")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(200);

    let persona = Persona::load_dir(Path::new(&persona_dir))
        .with_context(|| format!("loading persona package at {persona_dir}"))?;

    if let Some(parent) = Path::new(&memory_db_path).parent() {
        std::fs::create_dir_all(parent).context("creating data directory")?;
    }
    let store = Arc::new(MemoryStore::open(&memory_db_path).context("opening memory store")?);

    let agent_mode = match mode_str.to_lowercase().as_str() {
        "test" => AgentMode::Test,
        "aggressive" => AgentMode::Aggressive,
        _ => AgentMode::Normal,
    };
    let mode_manager = ModeManager::new(agent_mode, daily_action_cap);

    let llm: Arc<dyn LlmProvider> = Arc::new(MockLlmProvider);
    let embedder: Arc<dyn pf_llm::EmbeddingProvider> = Arc::new(MockEmbeddingProvider::default());
    let vector_index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
    let adapter: Arc<dyn SocialPlatformAdapter> = Arc::new(NoopAdapter);

    let topic_selector = TopicSelector::new(
        TopicWeights::default(),
        Vec::new(),
        persona.identity.domain.fallback_topics.clone(),
    );
    let pattern_tracker = pf_behavior::PatternTracker::new(PatternRegistry::default());
    let consolidator = Consolidator::new(store.clone(), vector_index.clone());

    let platform = env_or("PLATFORM", "twitter");
    tracing::info!(persona = %persona.identity.name, mode = %mode_str, "agent starting");

    let mut orchestrator = pf_journey::SessionOrchestrator::new(
        persona,
        store,
        adapter,
        llm,
        embedder,
        vector_index,
        mode_manager,
        topic_selector,
        pattern_tracker,
        consolidator,
        platform,
    );

    let mut rng = ChaCha8Rng::from_os_rng();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, exiting cleanly");
                return Ok(());
            }
            outcome = orchestrator.run_session(Utc::now(), &mut rng) => {
                match &outcome {
                    pf_journey::SessionOutcome::Idle { state } => {
                        tracing::info!(?state, "idle");
                    }
                    pf_journey::SessionOutcome::Executed { task, summary } => {
                        tracing::info!(?task, %summary, "session executed");
                    }
                    pf_journey::SessionOutcome::Paused { until } => {
                        tracing::warn!(%until, "paused by mode manager");
                    }
                }
                let sleep_for = orchestrator.next_sleep_duration(Utc::now(), &mut rng);
                tokio::select! {
                    _ = &mut shutdown => {
                        tracing::info!("shutdown signal received, exiting cleanly");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(sleep_for) => {}
                }
            }
        }
    }
}

/// Stand-in platform adapter: the concrete API client is an external
/// collaborator per §6 and out of scope here. Every call returns an
/// empty/no-op result so the orchestrator's pacing and memory logic can
/// still run end to end against a real store.
struct NoopAdapter;

#[async_trait::async_trait]
impl SocialPlatformAdapter for NoopAdapter {
    async fn search(&self, _query: &str, _n: usize) -> Result<Vec<pf_llm::Post>> {
        Ok(vec![])
    }
    async fn get_mentions(&self, _n: usize) -> Result<Vec<pf_llm::Notification>> {
        Ok(vec![])
    }
    async fn get_all_notifications(&self, _n: usize) -> Result<Vec<pf_llm::Notification>> {
        Ok(vec![])
    }
    async fn get_following_list(&self, _screen_name: &str, _n: usize) -> Result<Vec<pf_llm::User>> {
        Ok(vec![])
    }
    async fn get_user_tweets(&self, _user_id: &str, _n: usize) -> Result<Vec<pf_llm::Post>> {
        Ok(vec![])
    }
    async fn get_post(&self, _id: &str) -> Result<Option<pf_llm::Post>> {
        Ok(None)
    }
    async fn get_user(&self, _id_or_screen_name: &str) -> Result<Option<pf_llm::User>> {
        Ok(None)
    }
    async fn post(&self, _content: &str, _media: Option<&[u8]>, _reply_to: Option<&str>) -> Result<String> {
        Ok(pf_core::new_id())
    }
    async fn like(&self, _id: &str) -> Result<bool> {
        Ok(true)
    }
    async fn repost(&self, _id: &str) -> Result<bool> {
        Ok(true)
    }
    async fn follow(&self, _user_id: &str) -> Result<bool> {
        Ok(true)
    }
    async fn get_trends(&self, _locale: &str) -> Result<Vec<String>> {
        Ok(vec![])
    }
}
