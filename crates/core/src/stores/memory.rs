use crate::models::{IndexedVector, RetrievalMatch};
use crate::traits::VectorIndex;
use crate::ServiceError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

const DEFAULT_NAMESPACE: &str = "";

pub struct InMemoryIndex {
    vector_size: usize,
    namespaces: RwLock<HashMap<String, BTreeMap<String, IndexedVector>>>,
}

impl InMemoryIndex {
    pub fn new(vector_size: usize) -> Self {
        Self {
            vector_size,
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self, namespace: Option<&str>) -> usize {
        self.namespaces
            .read()
            .map(|namespaces| {
                namespaces
                    .get(namespace.unwrap_or(DEFAULT_NAMESPACE))
                    .map_or(0, BTreeMap::len)
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self, namespace: Option<&str>) -> bool {
        self.len(namespace) == 0
    }

    pub fn ids(&self, namespace: Option<&str>) -> Vec<String> {
        self.namespaces
            .read()
            .map(|namespaces| {
                namespaces
                    .get(namespace.unwrap_or(DEFAULT_NAMESPACE))
                    .map(|vectors| vectors.keys().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        f64::from(dot / (mag_a * mag_b))
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(
        &self,
        vectors: &[IndexedVector],
        namespace: Option<&str>,
    ) -> Result<(), ServiceError> {
        if let Some(bad) = vectors.iter().find(|v| v.values.len() != self.vector_size) {
            return Err(ServiceError::Config(format!(
                "vector {} has dimension {}, index expects {}",
                bad.id,
                bad.values.len(),
                self.vector_size
            )));
        }

        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|_| ServiceError::NotReady("index lock poisoned".to_string()))?;
        let target = namespaces
            .entry(namespace.unwrap_or(DEFAULT_NAMESPACE).to_string())
            .or_default();
        for vector in vectors {
            target.insert(vector.id.clone(), vector.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
    ) -> Result<Vec<RetrievalMatch>, ServiceError> {
        if vector.len() != self.vector_size {
            return Err(ServiceError::Config(format!(
                "query dimension {} != index dimension {}",
                vector.len(),
                self.vector_size
            )));
        }

        let namespaces = self
            .namespaces
            .read()
            .map_err(|_| ServiceError::NotReady("index lock poisoned".to_string()))?;
        let Some(stored) = namespaces.get(namespace.unwrap_or(DEFAULT_NAMESPACE)) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<RetrievalMatch> = stored
            .values()
            .map(|entry| RetrievalMatch {
                id: entry.id.clone(),
                score: cosine_similarity(vector, &entry.values),
                metadata: entry.metadata.clone(),
            })
            .collect();

        matches.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.id.cmp(&right.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    fn dimensions(&self) -> usize {
        self.vector_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn vector(id: &str, values: Vec<f32>) -> IndexedVector {
        IndexedVector {
            id: id.to_string(),
            values,
            metadata: ChunkMetadata {
                file_id: "f".to_string(),
                title: "t".to_string(),
                text: id.to_string(),
                chunk_index: 0,
                mime_type: "text/plain".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let index = InMemoryIndex::new(2);
        index.upsert(&[vector("a", vec![1.0, 0.0])], None).await.unwrap();
        index.upsert(&[vector("a", vec![0.0, 1.0])], None).await.unwrap();

        assert_eq!(index.len(None), 1);
        let matches = index.query(&[0.0, 1.0], 5, None).await.unwrap();
        assert!((matches[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn query_orders_by_descending_score_and_truncates() {
        let index = InMemoryIndex::new(2);
        index
            .upsert(
                &[
                    vector("far", vec![0.0, 1.0]),
                    vector("near", vec![1.0, 0.1]),
                    vector("mid", vec![1.0, 1.0]),
                ],
                None,
            )
            .await
            .unwrap();

        let matches = index.query(&[1.0, 0.0], 2, None).await.unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let index = InMemoryIndex::new(2);
        index
            .upsert(&[vector("a", vec![1.0, 0.0])], Some("one"))
            .await
            .unwrap();

        assert!(index.query(&[1.0, 0.0], 5, Some("two")).await.unwrap().is_empty());
        assert!(index.query(&[1.0, 0.0], 5, None).await.unwrap().is_empty());
        assert_eq!(index.query(&[1.0, 0.0], 5, Some("one")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let index = InMemoryIndex::new(3);
        assert!(index.upsert(&[vector("a", vec![1.0])], None).await.is_err());
        assert!(index.query(&[1.0], 1, None).await.is_err());
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
