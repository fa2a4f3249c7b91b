//! Semantic Analysis Pipeline - the delayed, pre-committed metrics
//!
//! Runnable only after the seal manager has verified and unlocked the
//! store. Each frozen protocol definition yields exactly one result; the
//! five metrics run in parallel over the same immutable corpus and land
//! together in one immutable `AnalysisRun`.

pub mod dynamics;
pub mod embedding;
pub mod emergence;
pub mod novelty;
pub mod run_log;
pub mod surprise;
pub mod synthesis;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::AnalysisSettings;
use crate::error::{Result, VigilError};
use crate::protocol::{MetricKind, ProtocolDefinition, ProtocolRegistry};
use crate::store::{Snapshot, SnapshotStore};
use crate::types::{Comment, Task};

use embedding::EmbeddingProvider;
use run_log::{AnalysisRun, MetricResult, RunLog};
use surprise::SurpriseModel;

/// The unlocked dataset every metric reads.
#[derive(Debug)]
pub struct Corpus {
    pub snapshots: Vec<Snapshot>,
    /// Latest observed version of each task
    pub tasks: Vec<Task>,
    /// All distinct comments across the history
    pub comments: Vec<Comment>,
}

impl Corpus {
    fn from_snapshots(snapshots: Vec<Snapshot>) -> Self {
        let mut tasks: BTreeMap<u64, Task> = BTreeMap::new();
        let mut comments: BTreeMap<u64, Comment> = BTreeMap::new();

        // Later snapshots carry updated counts for the same task id.
        for snapshot in &snapshots {
            for task in &snapshot.payload.tasks {
                tasks.insert(task.id, task.clone());
            }
            for comment in &snapshot.payload.comments {
                comments.entry(comment.id).or_insert_with(|| comment.clone());
            }
        }

        Self {
            snapshots,
            tasks: tasks.into_values().collect(),
            comments: comments.into_values().collect(),
        }
    }
}

/// Runs the frozen metric set over the unlocked snapshot history.
pub struct AnalysisPipeline {
    store: Arc<SnapshotStore>,
    registry: Arc<ProtocolRegistry>,
    run_log: RunLog,
    clock: Arc<dyn Clock>,
    embedder: Arc<dyn EmbeddingProvider>,
    surprise_model: Arc<dyn SurpriseModel>,
    settings: AnalysisSettings,
}

impl AnalysisPipeline {
    pub fn new(
        store: Arc<SnapshotStore>,
        registry: Arc<ProtocolRegistry>,
        run_log: RunLog,
        clock: Arc<dyn Clock>,
        embedder: Arc<dyn EmbeddingProvider>,
        surprise_model: Arc<dyn SurpriseModel>,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            store,
            registry,
            run_log,
            clock,
            embedder,
            surprise_model,
            settings,
        }
    }

    /// Execute one full analysis run.
    ///
    /// Fails with `SealedAccessDenied` unless unlocked (both the registry
    /// read and every snapshot read are independently gated). Produces a
    /// new immutable run every time; earlier runs are never touched.
    pub async fn run(&self) -> Result<AnalysisRun> {
        let definitions = self.registry.get_frozen_definitions()?;
        let freeze_hash = self
            .registry
            .freeze_hash()
            .ok_or(VigilError::NotSealed)?;

        let corpus = self.load_corpus().await?;
        tracing::info!(
            snapshots = corpus.snapshots.len(),
            tasks = corpus.tasks.len(),
            comments = corpus.comments.len(),
            metrics = definitions.len(),
            "analysis corpus loaded"
        );

        // Each metric reads the same immutable corpus; compute in parallel.
        let computations = definitions
            .iter()
            .map(|definition| self.compute_metric(&corpus, definition));
        let results: Vec<MetricResult> = join_all(computations)
            .await
            .into_iter()
            .collect::<Result<_>>()?;

        let run = AnalysisRun {
            run_id: Uuid::new_v4(),
            executed_at: self.clock.now(),
            protocol_definition_hash: freeze_hash,
            results,
        };
        self.run_log.append(&run).await?;

        tracing::info!(run_id = %run.run_id, results = run.results.len(), "analysis run recorded");
        Ok(run)
    }

    /// All runs ever recorded.
    pub async fn history(&self) -> Result<Vec<AnalysisRun>> {
        self.run_log.all_runs().await
    }

    async fn load_corpus(&self) -> Result<Corpus> {
        let mut snapshots = Vec::with_capacity(self.store.len() as usize);
        for sequence in 0..self.store.len() {
            snapshots.push(self.store.get(sequence).await?);
        }
        Ok(Corpus::from_snapshots(snapshots))
    }

    async fn compute_metric(
        &self,
        corpus: &Corpus,
        definition: &ProtocolDefinition,
    ) -> Result<MetricResult> {
        let params = &definition.parameters;
        let value = match definition.metric_kind {
            MetricKind::SemanticNovelty => {
                let window_days = param_i64(params, "window_days", self.settings.window_days);
                let baseline = param_phrases(params, &self.settings.baseline_phrases);
                serde_json::to_value(novelty::compute(
                    &corpus.comments,
                    self.embedder.as_ref(),
                    &baseline,
                    window_days,
                ))?
            }
            MetricKind::ConceptualSynthesis => {
                let relatedness = params
                    .get("relatedness_jaccard")
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(self.settings.relatedness_jaccard);
                serde_json::to_value(synthesis::compute(
                    &corpus.tasks,
                    &corpus.comments,
                    relatedness,
                ))?
            }
            MetricKind::TemporalDynamics => {
                serde_json::to_value(dynamics::compute(&corpus.snapshots))?
            }
            MetricKind::CollaborativeEmergence => {
                let cap = params
                    .get("max_concepts_per_task")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(self.settings.max_concepts_per_task as u64)
                    as usize;
                serde_json::to_value(emergence::compute(&corpus.comments, cap))?
            }
            MetricKind::Surprise => {
                let threshold = params
                    .get("threshold")
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(self.settings.surprise_threshold);
                serde_json::to_value(surprise::compute(
                    &corpus.comments,
                    self.surprise_model.as_ref(),
                    threshold,
                ))?
            }
        };

        Ok(MetricResult {
            metric: definition.metric_kind,
            definition_hash: definition.definition_hash,
            value,
        })
    }
}

impl std::fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisPipeline")
            .field("settings", &self.settings)
            .finish()
    }
}

fn param_i64(params: &serde_json::Value, key: &str, fallback: i64) -> i64 {
    params
        .get(key)
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(fallback)
}

fn param_phrases(params: &serde_json::Value, fallback: &[String]) -> Vec<String> {
    params
        .get("baseline_phrases")
        .and_then(serde_json::Value::as_array)
        .map(|phrases| {
            phrases
                .iter()
                .filter_map(|p| p.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_else(|| fallback.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::default_protocols;
    use crate::seal::{SealGate, SealState};
    use crate::types::{now, SnapshotPayload, TaskStatus};
    use embedding::CharFrequencyEmbedder;
    use surprise::UnigramSurpriseModel;

    fn task(id: u64, title: &str, comments: u32) -> Task {
        Task {
            id,
            title: title.to_string(),
            tags: Vec::new(),
            upvote_count: 0,
            comment_count: comments,
            pr_count: 0,
            merged_pr_count: 0,
            status: TaskStatus::Open,
            agent: Some("echo".to_string()),
            created_at: now(),
        }
    }

    fn comment(id: u64, task_id: u64, author: &str, body: &str) -> Comment {
        Comment {
            id,
            task_id,
            author: author.to_string(),
            body: body.to_string(),
            created_at: now(),
        }
    }

    async fn pipeline_over(
        dir: &std::path::Path,
        gate: Arc<SealGate>,
    ) -> (Arc<SnapshotStore>, Arc<ProtocolRegistry>, AnalysisPipeline) {
        let store = Arc::new(SnapshotStore::open(dir, gate.clone()).await.unwrap());
        let registry = Arc::new(ProtocolRegistry::open(dir, gate.clone()).await.unwrap());
        let settings = AnalysisSettings::default();
        let pipeline = AnalysisPipeline::new(
            store.clone(),
            registry.clone(),
            RunLog::open(dir),
            Arc::new(ManualClock::new(now())),
            Arc::new(CharFrequencyEmbedder::default()),
            Arc::new(UnigramSurpriseModel::from_corpus(&settings.baseline_phrases)),
            settings,
        );
        (store, registry, pipeline)
    }

    #[tokio::test]
    async fn test_run_denied_before_unlock() {
        let dir = tempfile::tempdir().unwrap();
        let gate = SealGate::new();
        let (_store, registry, pipeline) = pipeline_over(dir.path(), gate).await;

        for definition in default_protocols(&AnalysisSettings::default()) {
            registry.register(definition).await.unwrap();
        }
        registry.freeze().await.unwrap();

        assert!(matches!(
            pipeline.run().await,
            Err(VigilError::SealedAccessDenied)
        ));
    }

    #[tokio::test]
    async fn test_run_produces_five_tagged_results() {
        let dir = tempfile::tempdir().unwrap();
        let gate = SealGate::new();
        let (store, registry, pipeline) = pipeline_over(dir.path(), gate.clone()).await;

        for definition in default_protocols(&AnalysisSettings::default()) {
            registry.register(definition).await.unwrap();
        }
        let freeze_hash = registry.freeze().await.unwrap();

        store
            .append(
                SnapshotPayload::new(
                    vec![task(1, "entropy codec research", 2)],
                    vec![
                        comment(1, 1, "ada", "try arithmetic coding"),
                        comment(2, 1, "grace", "entropy bounds look tight"),
                    ],
                ),
                now(),
            )
            .await
            .unwrap();

        gate.set(SealState::Unlocked);

        let run = pipeline.run().await.unwrap();
        assert_eq!(run.results.len(), 5);
        assert_eq!(run.protocol_definition_hash, freeze_hash);
        for kind in MetricKind::all() {
            assert!(run.results.iter().any(|r| r.metric == kind));
        }

        // A second run is a new immutable record.
        let rerun = pipeline.run().await.unwrap();
        assert_ne!(rerun.run_id, run.run_id);
        assert_eq!(pipeline.history().await.unwrap().len(), 2);
    }
}
