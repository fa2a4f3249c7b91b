//! E2E test for the full blind-collection lifecycle
//!
//! Collect -> seal -> (too early) -> unlock -> analyze, plus the tampering
//! and racing-unlock paths.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;

use vigil_core::analysis::embedding::CharFrequencyEmbedder;
use vigil_core::analysis::surprise::UnigramSurpriseModel;
use vigil_core::clock::{Clock, ManualClock};
use vigil_core::config::AnalysisSettings;
use vigil_core::protocol::{default_protocols, MetricKind, ProtocolRegistry};
use vigil_core::seal::{SealGate, SealManager, SealState};
use vigil_core::source::{DiscourseSource, RawComment, RawTask, TaskSummary};
use vigil_core::store::SnapshotStore;
use vigil_core::types::now;
use vigil_core::{AnalysisPipeline, Collector, Result, RunLog, VigilError};

/// Deterministic source for three distinct collection passes.
struct ScriptedSource {
    task_ids: Vec<u64>,
    null_ids: HashSet<u64>,
}

impl ScriptedSource {
    fn new(task_ids: Vec<u64>) -> Self {
        Self {
            task_ids,
            null_ids: HashSet::new(),
        }
    }
}

#[async_trait]
impl DiscourseSource for ScriptedSource {
    async fn list_tasks(&self, limit: usize) -> Result<Vec<TaskSummary>> {
        Ok(self
            .task_ids
            .iter()
            .take(limit)
            .map(|&id| TaskSummary { id, title: None })
            .collect())
    }

    async fn get_task_detail(&self, id: u64) -> Result<Option<RawTask>> {
        if self.null_ids.contains(&id) {
            return Ok(None);
        }
        Ok(Some(RawTask {
            id: Some(id),
            title: Some(format!("explore concept space {}", id)),
            comment_count: Some(2),
            created_at: Some("2026-01-05T12:00:00Z".to_string()),
            ..Default::default()
        }))
    }

    async fn list_comments(&self, task_id: u64) -> Result<Vec<RawComment>> {
        Ok(vec![
            RawComment {
                id: Some(task_id * 10),
                task_id: Some(task_id),
                author: Some("ada".to_string()),
                body: Some("the entropy bound feels loose here".to_string()),
                created_at: Some("2026-01-06T12:00:00Z".to_string()),
            },
            RawComment {
                id: Some(task_id * 10 + 1),
                task_id: Some(task_id),
                author: Some("grace".to_string()),
                body: Some("gossip convergence might tighten it".to_string()),
                created_at: Some("2026-01-07T12:00:00Z".to_string()),
            },
        ])
    }
}

struct System {
    store: Arc<SnapshotStore>,
    registry: Arc<ProtocolRegistry>,
    seal: Arc<SealManager>,
    clock: Arc<ManualClock>,
}

async fn open_system(dir: &std::path::Path) -> System {
    let gate = SealGate::new();
    let store = Arc::new(SnapshotStore::open(dir, gate.clone()).await.unwrap());
    let registry = Arc::new(ProtocolRegistry::open(dir, gate.clone()).await.unwrap());
    let seal = Arc::new(
        SealManager::open(dir, store.clone(), registry.clone(), gate.clone())
            .await
            .unwrap(),
    );
    System {
        store,
        registry,
        seal,
        clock: Arc::new(ManualClock::new(now())),
    }
}

async fn collect_three_snapshots(system: &System) {
    for pass in 0..3u64 {
        let source = ScriptedSource::new(vec![pass * 3 + 1, pass * 3 + 2, pass * 3 + 3]);
        let collector = Collector::new(source, system.store.clone(), system.clock.clone(), 100);
        collector.collect_once().await.unwrap();
        system.clock.advance(Duration::days(1));
    }
}

fn pipeline_for(system: &System, dir: &std::path::Path) -> AnalysisPipeline {
    let settings = AnalysisSettings::default();
    AnalysisPipeline::new(
        system.store.clone(),
        system.registry.clone(),
        RunLog::open(dir),
        system.clock.clone(),
        Arc::new(CharFrequencyEmbedder::default()),
        Arc::new(UnigramSurpriseModel::from_corpus(&settings.baseline_phrases)),
        settings,
    )
}

#[tokio::test]
async fn e2e_seal_unlock_analyze() {
    let dir = tempfile::tempdir().unwrap();
    let system = open_system(dir.path()).await;

    for definition in default_protocols(&AnalysisSettings::default()) {
        system.registry.register(definition).await.unwrap();
    }

    collect_three_snapshots(&system).await;
    assert_eq!(system.store.len(), 3);

    // Seal for thirty days.
    let sealed_at = system.clock.now();
    let target = sealed_at + Duration::days(30);
    let record = system.seal.seal(target, sealed_at).await.unwrap();
    assert_eq!(record.sealed_snapshot_count, 3);
    assert_eq!(system.seal.state(), SealState::Sealed);
    assert!(system.registry.is_frozen());

    // A second seal is rejected outright.
    assert!(matches!(
        system.seal.seal(target, sealed_at).await,
        Err(VigilError::AlreadySealed)
    ));

    // One minute before the target: TooEarly, repeatedly, with no state change.
    let early = target - Duration::minutes(1);
    for _ in 0..3 {
        match system.seal.attempt_unlock(early).await {
            Err(VigilError::TooEarly { remaining_secs }) => {
                assert_eq!(remaining_secs, 60);
            }
            other => panic!("expected TooEarly, got {:?}", other.map(|_| ())),
        }
        assert_eq!(system.seal.state(), SealState::Sealed);
    }

    // Content stays dark during the blind period.
    assert!(matches!(
        system.store.get(0).await,
        Err(VigilError::SealedAccessDenied)
    ));

    // One second past the target: unlocked.
    let late = target + Duration::seconds(1);
    let outcome = system.seal.attempt_unlock(late).await.unwrap();
    assert_eq!(outcome.sealed_snapshots, 3);
    assert_eq!(system.seal.state(), SealState::Unlocked);

    // Re-invoking returns the same success.
    let again = system.seal.attempt_unlock(late + Duration::days(1)).await.unwrap();
    assert_eq!(again, outcome);

    // Analysis now runs and yields one result per registered metric kind.
    let pipeline = pipeline_for(&system, dir.path());
    let run = pipeline.run().await.unwrap();
    assert_eq!(run.results.len(), 5);
    assert_eq!(run.protocol_definition_hash, system.registry.freeze_hash().unwrap());
    for kind in MetricKind::all() {
        assert!(run.results.iter().any(|r| r.metric == kind));
    }
}

#[tokio::test]
async fn e2e_tampered_prefix_never_unlocks() {
    let dir = tempfile::tempdir().unwrap();
    let system = open_system(dir.path()).await;

    for definition in default_protocols(&AnalysisSettings::default()) {
        system.registry.register(definition).await.unwrap();
    }
    collect_three_snapshots(&system).await;

    let sealed_at = system.clock.now();
    let target = sealed_at + Duration::days(30);
    system.seal.seal(target, sealed_at).await.unwrap();

    // Rewrite one sealed payload file during the blind period.
    let victim = system.store.entry(1).unwrap();
    let path = dir
        .path()
        .join("snapshots")
        .join(format!("{}.json", victim.content_hash.to_hex()));
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[5] ^= 0x01;
    std::fs::write(&path, bytes).unwrap();

    let late = target + Duration::seconds(1);
    for _ in 0..2 {
        assert!(matches!(
            system.seal.attempt_unlock(late).await,
            Err(VigilError::IntegrityViolation { .. })
        ));
        assert_eq!(system.seal.state(), SealState::Sealed);
    }

    // The gate never opened.
    assert!(matches!(
        system.store.get(0).await,
        Err(VigilError::SealedAccessDenied)
    ));
}

#[tokio::test]
async fn e2e_racing_unlock_callers_agree() {
    let dir = tempfile::tempdir().unwrap();
    let system = open_system(dir.path()).await;

    system
        .registry
        .register(default_protocols(&AnalysisSettings::default()).remove(0))
        .await
        .unwrap();
    collect_three_snapshots(&system).await;

    let sealed_at = system.clock.now();
    let target = sealed_at + Duration::days(30);
    system.seal.seal(target, sealed_at).await.unwrap();

    let late = target + Duration::seconds(1);
    let (a, b, c) = tokio::join!(
        system.seal.attempt_unlock(late),
        system.seal.attempt_unlock(late),
        system.seal.attempt_unlock(late),
    );

    let a = a.unwrap();
    let b = b.unwrap();
    let c = c.unwrap();
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(system.seal.state(), SealState::Unlocked);
}

#[tokio::test]
async fn e2e_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let target;
    {
        let system = open_system(dir.path()).await;
        system
            .registry
            .register(default_protocols(&AnalysisSettings::default()).remove(0))
            .await
            .unwrap();
        collect_three_snapshots(&system).await;
        let sealed_at = system.clock.now();
        target = sealed_at + Duration::days(30);
        system.seal.seal(target, sealed_at).await.unwrap();
    }

    // Reopened while sealed: still sealed, still dark.
    {
        let system = open_system(dir.path()).await;
        assert_eq!(system.seal.state(), SealState::Sealed);
        assert!(matches!(
            system.store.get(0).await,
            Err(VigilError::SealedAccessDenied)
        ));
        system
            .seal
            .attempt_unlock(target + Duration::seconds(1))
            .await
            .unwrap();
    }

    // Reopened after unlock: unlocked without a fresh attempt.
    {
        let system = open_system(dir.path()).await;
        assert_eq!(system.seal.state(), SealState::Unlocked);
        assert!(system.store.get(0).await.is_ok());
    }
}

#[tokio::test]
async fn e2e_structural_report_available_while_sealed() {
    let dir = tempfile::tempdir().unwrap();
    let system = open_system(dir.path()).await;

    collect_three_snapshots(&system).await;
    let sealed_at = system.clock.now();
    system
        .seal
        .seal(sealed_at + Duration::days(30), sealed_at)
        .await
        .unwrap();

    // Count-only structural metrics work mid-blind-period.
    let report = vigil_core::StructuralReport::build(
        &system.store.latest_activity(),
        system.clock.now(),
        &vigil_core::config::Thresholds::default(),
    );
    assert_eq!(report.total_tasks, 3);
    assert!(report.total_comments > 0);
}
