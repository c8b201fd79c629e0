//! Vector index keyed by entity id, used for episode/inspiration
//! similarity search. The structured store (§4.4 `MemoryStore`) remains
//! the authoritative state; every write here is wrapped in a short
//! per-call timeout, and a timeout is logged and swallowed rather than
//! propagated.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use nalgebra::DVector;
use serde_json::Value;
use tracing::warn;

/// Per-call timeout budget for vector writes, per §5.
pub const VECTOR_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct VectorSearchFilter {
    pub min_strength: Option<f32>,
    pub tiers: Option<Vec<String>>,
}

impl VectorSearchFilter {
    fn matches(&self, metadata: &HashMap<String, Value>) -> bool {
        if let Some(min) = self.min_strength {
            let strength = metadata
                .get("strength")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0) as f32;
            if strength < min {
                return false;
            }
        }
        if let Some(tiers) = &self.tiers {
            let tier = metadata.get("tier").and_then(|v| v.as_str());
            match tier {
                Some(t) if tiers.iter().any(|x| x == t) => {}
                _ => return false,
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub id: String,
    pub document: String,
    pub metadata: HashMap<String, Value>,
    pub distance: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn add(&self, record: VectorRecord) -> anyhow::Result<()>;
    async fn update_metadata(&self, id: &str, metadata: HashMap<String, Value>) -> anyhow::Result<()>;
    async fn delete(&self, id: &str) -> anyhow::Result<()>;
    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: &VectorSearchFilter,
    ) -> anyhow::Result<Vec<ScoredRecord>>;
    async fn batch_update_metadata(
        &self,
        updates: Vec<(String, HashMap<String, Value>)>,
    ) -> anyhow::Result<()>;
    async fn batch_delete(&self, ids: &[String]) -> anyhow::Result<()>;
}

/// In-process vector index backed by a flat scan with cosine distance.
/// Adequate at the scale a single persona's memory operates at; a
/// production deployment would swap this for an ANN-backed store behind
/// the same trait.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    records: DashMap<String, VectorRecord>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 1.0;
    }
    let va = DVector::from_row_slice(a);
    let vb = DVector::from_row_slice(b);
    let denom = va.norm() * vb.norm();
    if denom == 0.0 {
        return 1.0;
    }
    let cosine_sim = va.dot(&vb) / denom;
    1.0 - cosine_sim
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, record: VectorRecord) -> anyhow::Result<()> {
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update_metadata(&self, id: &str, metadata: HashMap<String, Value>) -> anyhow::Result<()> {
        if let Some(mut rec) = self.records.get_mut(id) {
            rec.metadata = metadata;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        self.records.remove(id);
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: &VectorSearchFilter,
    ) -> anyhow::Result<Vec<ScoredRecord>> {
        let mut scored: Vec<ScoredRecord> = self
            .records
            .iter()
            .filter(|entry| filter.matches(&entry.metadata))
            .map(|entry| ScoredRecord {
                id: entry.id.clone(),
                document: entry.document.clone(),
                metadata: entry.metadata.clone(),
                distance: cosine_distance(query_embedding, &entry.embedding),
            })
            .collect();
        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap());
        scored.truncate(k);
        Ok(scored)
    }

    async fn batch_update_metadata(
        &self,
        updates: Vec<(String, HashMap<String, Value>)>,
    ) -> anyhow::Result<()> {
        for (id, metadata) in updates {
            self.update_metadata(&id, metadata).await?;
        }
        Ok(())
    }

    async fn batch_delete(&self, ids: &[String]) -> anyhow::Result<()> {
        for id in ids {
            self.delete(id).await?;
        }
        Ok(())
    }
}

/// Runs a vector-index write with the required per-call timeout. On
/// timeout this logs and returns `Ok(())` rather than propagating —
/// the structured store remains authoritative, so a missed vector
/// write is recovered on the next consolidation pass.
pub async fn with_write_timeout<F>(operation: &str, fut: F)
where
    F: std::future::Future<Output = anyhow::Result<()>>,
{
    match tokio::time::timeout(VECTOR_WRITE_TIMEOUT, fut).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(operation, error = %e, "vector index write failed"),
        Err(_) => warn!(operation, "vector index write timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_orders_by_distance_ascending() {
        let idx = InMemoryVectorIndex::new();
        idx.add(VectorRecord {
            id: "a".into(),
            document: "kimchi braise".into(),
            embedding: vec![1.0, 0.0],
            metadata: HashMap::new(),
        })
        .await
        .unwrap();
        idx.add(VectorRecord {
            id: "b".into(),
            document: "unrelated topic".into(),
            embedding: vec![0.0, 1.0],
            metadata: HashMap::new(),
        })
        .await
        .unwrap();

        let results = idx
            .search(&[1.0, 0.0], 2, &VectorSearchFilter::default())
            .await
            .unwrap();
        assert_eq!(results[0].id, "a");
        assert!(results[0].distance < results[1].distance);
    }

    #[tokio::test]
    async fn search_filters_by_metadata() {
        let idx = InMemoryVectorIndex::new();
        let mut meta = HashMap::new();
        meta.insert("strength".to_string(), serde_json::json!(0.2));
        idx.add(VectorRecord {
            id: "weak".into(),
            document: "x".into(),
            embedding: vec![1.0, 0.0],
            metadata: meta,
        })
        .await
        .unwrap();

        let filter = VectorSearchFilter {
            min_strength: Some(0.5),
            tiers: None,
        };
        let results = idx.search(&[1.0, 0.0], 10, &filter).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn timeout_wrapper_swallows_slow_operations() {
        with_write_timeout("slow_op", async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(())
        })
        .await;
    }
}
