//! Protocol Registry - the pre-committed analysis metric set
//!
//! Metric definitions are registered while collecting, frozen exactly once
//! at seal time, and only readable again after unlock. The freeze hash is
//! recorded in the seal record and recomputed from disk at unlock, so a
//! definition edited during the blind period is caught before any metric
//! runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::config::AnalysisSettings;
use crate::error::{Result, VigilError};
use crate::seal::{SealGate, SealState};
use crate::types::Blake3Hash;

/// The five pre-registered semantic metric kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    SemanticNovelty,
    ConceptualSynthesis,
    TemporalDynamics,
    CollaborativeEmergence,
    Surprise,
}

impl MetricKind {
    pub fn all() -> [MetricKind; 5] {
        [
            MetricKind::SemanticNovelty,
            MetricKind::ConceptualSynthesis,
            MetricKind::TemporalDynamics,
            MetricKind::CollaborativeEmergence,
            MetricKind::Surprise,
        ]
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MetricKind::SemanticNovelty => "semantic_novelty",
            MetricKind::ConceptualSynthesis => "conceptual_synthesis",
            MetricKind::TemporalDynamics => "temporal_dynamics",
            MetricKind::CollaborativeEmergence => "collaborative_emergence",
            MetricKind::Surprise => "surprise",
        };
        write!(f, "{}", label)
    }
}

/// One pre-committed metric definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolDefinition {
    pub name: String,
    pub metric_kind: MetricKind,
    pub parameters: serde_json::Value,
    pub definition_hash: Blake3Hash,
}

impl ProtocolDefinition {
    pub fn new(
        name: impl Into<String>,
        metric_kind: MetricKind,
        parameters: serde_json::Value,
    ) -> Self {
        let name = name.into();
        let mut hasher = blake3::Hasher::new();
        hasher.update(name.as_bytes());
        hasher.update(
            serde_json::to_string(&metric_kind)
                .unwrap_or_default()
                .as_bytes(),
        );
        hasher.update(parameters.to_string().as_bytes());
        let definition_hash = Blake3Hash::from(hasher.finalize());

        Self {
            name,
            metric_kind,
            parameters,
            definition_hash,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryFile {
    frozen: bool,
    freeze_hash: Option<Blake3Hash>,
    definitions: Vec<ProtocolDefinition>,
}

/// Freezable registry of analysis metric definitions.
pub struct ProtocolRegistry {
    path: PathBuf,
    gate: Arc<SealGate>,
    inner: RwLock<RegistryFile>,
}

impl ProtocolRegistry {
    /// Open (or create) the registry under `data_dir`.
    pub async fn open(data_dir: impl Into<PathBuf>, gate: Arc<SealGate>) -> Result<Self> {
        let path = data_dir.into().join("protocols.json");
        let inner = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&content)?
        } else {
            RegistryFile::default()
        };

        Ok(Self {
            path,
            gate,
            inner: RwLock::new(inner),
        })
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.read().unwrap().frozen
    }

    pub fn freeze_hash(&self) -> Option<Blake3Hash> {
        self.inner.read().unwrap().freeze_hash
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a definition. Allowed only while collecting.
    pub async fn register(&self, definition: ProtocolDefinition) -> Result<()> {
        {
            let inner = self.inner.read().unwrap();
            if inner.frozen || self.gate.state() != SealState::Collecting {
                return Err(VigilError::ProtocolLocked);
            }
            if inner
                .definitions
                .iter()
                .any(|d| d.name == definition.name)
            {
                return Err(VigilError::InvalidRecord(format!(
                    "protocol '{}' already registered",
                    definition.name
                )));
            }
        }

        {
            let mut inner = self.inner.write().unwrap();
            inner.definitions.push(definition);
        }
        self.persist().await
    }

    /// Freeze the registry, fixing the definition set.
    ///
    /// Idempotent when re-invoked over identical content; a second freeze
    /// over differing content is `RegistryMismatch`.
    pub async fn freeze(&self) -> Result<Blake3Hash> {
        let hash = {
            let inner = self.inner.read().unwrap();
            let hash = content_hash(&inner.definitions)?;
            if inner.frozen {
                return match inner.freeze_hash {
                    Some(frozen) if frozen == hash => Ok(frozen),
                    _ => Err(VigilError::RegistryMismatch),
                };
            }
            hash
        };

        {
            let mut inner = self.inner.write().unwrap();
            inner.frozen = true;
            inner.freeze_hash = Some(hash);
        }
        self.persist().await?;

        tracing::info!(freeze_hash = %hash, definitions = self.len(), "protocol registry frozen");
        Ok(hash)
    }

    /// The frozen definition set. Readable only after unlock.
    pub fn get_frozen_definitions(&self) -> Result<Vec<ProtocolDefinition>> {
        if !self.gate.content_reads_allowed() {
            return Err(VigilError::SealedAccessDenied);
        }
        let inner = self.inner.read().unwrap();
        if !inner.frozen {
            return Err(VigilError::NotSealed);
        }
        Ok(inner.definitions.clone())
    }

    /// Recompute the content hash from the registry file on disk.
    ///
    /// Used at unlock time: an in-memory copy cannot vouch for what sat on
    /// disk through the blind period.
    pub async fn current_content_hash(&self) -> Result<Blake3Hash> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|_| VigilError::NotFound("protocol registry file".to_string()))?;
        let persisted: RegistryFile = serde_json::from_str(&content)?;
        content_hash(&persisted.definitions)
    }

    async fn persist(&self) -> Result<()> {
        let content = {
            let inner = self.inner.read().unwrap();
            serde_json::to_string_pretty(&*inner)?
        };
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read().unwrap();
        f.debug_struct("ProtocolRegistry")
            .field("frozen", &inner.frozen)
            .field("definitions", &inner.definitions.len())
            .finish()
    }
}

/// Canonical content hash over an ordered definition set.
fn content_hash(definitions: &[ProtocolDefinition]) -> Result<Blake3Hash> {
    let bytes = serde_json::to_vec(definitions)?;
    Ok(Blake3Hash::from(blake3::hash(&bytes)))
}

/// The five default metric definitions, parameterized from the analysis
/// settings. Registered before sealing when the operator has not supplied
/// a custom set.
pub fn default_protocols(settings: &AnalysisSettings) -> Vec<ProtocolDefinition> {
    vec![
        ProtocolDefinition::new(
            "semantic-novelty",
            MetricKind::SemanticNovelty,
            serde_json::json!({
                "window_days": settings.window_days,
                "baseline_phrases": settings.baseline_phrases,
            }),
        ),
        ProtocolDefinition::new(
            "conceptual-synthesis",
            MetricKind::ConceptualSynthesis,
            serde_json::json!({
                "relatedness_jaccard": settings.relatedness_jaccard,
                "max_concepts_per_task": settings.max_concepts_per_task,
            }),
        ),
        ProtocolDefinition::new(
            "temporal-dynamics",
            MetricKind::TemporalDynamics,
            serde_json::json!({ "window_days": settings.window_days }),
        ),
        ProtocolDefinition::new(
            "collaborative-emergence",
            MetricKind::CollaborativeEmergence,
            serde_json::json!({ "max_concepts_per_task": settings.max_concepts_per_task }),
        ),
        ProtocolDefinition::new(
            "surprise",
            MetricKind::Surprise,
            serde_json::json!({
                "threshold": settings.surprise_threshold,
                "baseline_phrases": settings.baseline_phrases,
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry(dir: &std::path::Path, gate: Arc<SealGate>) -> ProtocolRegistry {
        ProtocolRegistry::open(dir, gate).await.unwrap()
    }

    fn definition(name: &str) -> ProtocolDefinition {
        ProtocolDefinition::new(name, MetricKind::Surprise, serde_json::json!({"t": 1.0}))
    }

    #[tokio::test]
    async fn test_register_then_freeze() {
        let dir = tempfile::tempdir().unwrap();
        let gate = SealGate::new();
        let reg = registry(dir.path(), gate).await;

        reg.register(definition("surprise")).await.unwrap();
        assert_eq!(reg.len(), 1);

        let hash = reg.freeze().await.unwrap();
        assert!(reg.is_frozen());
        assert_eq!(reg.freeze_hash(), Some(hash));

        // Identical content: freeze is idempotent.
        assert_eq!(reg.freeze().await.unwrap(), hash);
    }

    #[tokio::test]
    async fn test_register_after_freeze_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let gate = SealGate::new();
        let reg = registry(dir.path(), gate).await;

        reg.register(definition("a")).await.unwrap();
        reg.freeze().await.unwrap();

        let before = reg.len();
        assert!(matches!(
            reg.register(definition("b")).await,
            Err(VigilError::ProtocolLocked)
        ));
        // The failed attempt must not disturb the definition set.
        assert_eq!(reg.len(), before);
    }

    #[tokio::test]
    async fn test_register_blocked_once_sealed() {
        let dir = tempfile::tempdir().unwrap();
        let gate = SealGate::new();
        let reg = registry(dir.path(), gate.clone()).await;

        gate.set(SealState::Sealed);
        assert!(matches!(
            reg.register(definition("late")).await,
            Err(VigilError::ProtocolLocked)
        ));
    }

    #[tokio::test]
    async fn test_frozen_definitions_gated_until_unlock() {
        let dir = tempfile::tempdir().unwrap();
        let gate = SealGate::new();
        let reg = registry(dir.path(), gate.clone()).await;

        reg.register(definition("a")).await.unwrap();
        reg.freeze().await.unwrap();

        assert!(matches!(
            reg.get_frozen_definitions(),
            Err(VigilError::SealedAccessDenied)
        ));

        gate.set(SealState::Unlocked);
        assert_eq!(reg.get_frozen_definitions().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disk_hash_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let gate = SealGate::new();
        let reg = registry(dir.path(), gate).await;

        reg.register(definition("a")).await.unwrap();
        let frozen = reg.freeze().await.unwrap();
        assert_eq!(reg.current_content_hash().await.unwrap(), frozen);

        // Rewrite the persisted registry with an extra definition.
        let path = dir.path().join("protocols.json");
        let mut persisted: RegistryFile =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        persisted.definitions.push(definition("smuggled"));
        std::fs::write(&path, serde_json::to_string(&persisted).unwrap()).unwrap();

        assert_ne!(reg.current_content_hash().await.unwrap(), frozen);
    }

    #[test]
    fn test_default_protocols_cover_all_kinds() {
        let defaults = default_protocols(&AnalysisSettings::default());
        assert_eq!(defaults.len(), 5);
        for kind in MetricKind::all() {
            assert!(defaults.iter().any(|d| d.metric_kind == kind));
        }
    }

    #[test]
    fn test_definition_hash_depends_on_parameters() {
        let a = ProtocolDefinition::new("x", MetricKind::Surprise, serde_json::json!({"t": 1}));
        let b = ProtocolDefinition::new("x", MetricKind::Surprise, serde_json::json!({"t": 2}));
        assert_ne!(a.definition_hash, b.definition_hash);
    }
}
