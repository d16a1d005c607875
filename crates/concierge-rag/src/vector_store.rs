//! Flat inner-product index over unit-normalized vectors, with a parallel
//! metadata sequence aligned 1:1 with vector positions.
//!
//! On-disk layout (three sibling files, each written via tmp + rename):
//!   index          raw little-endian f32 matrix, row-major
//!   metadata.json  ordered chunk metadata
//!   config.json    { "dimension": D }
//!
//! A legacy pickled `metadata.pkl` sidecar is refused outright — the caller
//! rebuilds instead of deserializing untrusted binary.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

const INDEX_FILE: &str = "index";
const METADATA_FILE: &str = "metadata.json";
const LEGACY_PICKLE_FILE: &str = "metadata.pkl";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMeta {
    pub entry_id: i64,
    pub chunk_index: i64,
    pub category: String,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub meta: ChunkMeta,
    pub score: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreConfig {
    dimension: usize,
}

pub struct VectorStore {
    vectors: Vec<f32>,
    dimension: usize,
    metadata: Vec<ChunkMeta>,
}

impl VectorStore {
    pub fn empty(dimension: usize) -> Self {
        Self {
            vectors: Vec::new(),
            dimension,
            metadata: Vec::new(),
        }
    }

    /// Build a fresh index. Vectors are normalized in place so inner product
    /// equals cosine similarity. `embeddings.len()` must equal `metadata.len()`.
    pub fn build(embeddings: Vec<Vec<f32>>, metadata: Vec<ChunkMeta>, default_dim: usize) -> Self {
        debug_assert_eq!(embeddings.len(), metadata.len());
        if embeddings.is_empty() {
            return Self::empty(default_dim);
        }

        let dimension = embeddings[0].len();
        let mut vectors = Vec::with_capacity(embeddings.len() * dimension);
        for mut v in embeddings {
            normalize(&mut v);
            vectors.extend_from_slice(&v);
        }
        info!(vectors = metadata.len(), dimension, "built vector index");
        Self {
            vectors,
            dimension,
            metadata,
        }
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Top-`k` hits with similarity ≥ `min_relevance`, best first.
    pub fn search(&self, query: &[f32], k: usize, min_relevance: f32) -> Vec<SearchHit> {
        if self.is_empty() || query.len() != self.dimension {
            return Vec::new();
        }

        let mut q = query.to_vec();
        normalize(&mut q);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(i, row)| {
                let dot = row.iter().zip(&q).map(|(a, b)| a * b).sum::<f32>();
                (i, dot)
            })
            .filter(|(_, score)| *score >= min_relevance)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| SearchHit {
                meta: self.metadata[i].clone(),
                score,
            })
            .collect()
    }

    /// Persist to `dir`, atomically per file.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        let mut raw = Vec::with_capacity(self.vectors.len() * 4);
        for v in &self.vectors {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        write_atomic(&dir.join(INDEX_FILE), &raw)?;
        write_atomic(
            &dir.join(METADATA_FILE),
            serde_json::to_vec(&self.metadata)?.as_slice(),
        )?;
        write_atomic(
            &dir.join(CONFIG_FILE),
            serde_json::to_vec(&StoreConfig {
                dimension: self.dimension,
            })?
            .as_slice(),
        )?;

        info!(vectors = self.len(), path = %dir.display(), "saved vector index");
        Ok(())
    }

    /// Load a previously saved index. `None` means nothing loadable exists
    /// (missing files, or only a refused legacy pickle) and the caller
    /// should rebuild.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let index_path = dir.join(INDEX_FILE);
        let metadata_path = dir.join(METADATA_FILE);
        let config_path = dir.join(CONFIG_FILE);

        if !index_path.exists() || !config_path.exists() {
            return Ok(None);
        }
        if !metadata_path.exists() {
            if dir.join(LEGACY_PICKLE_FILE).exists() {
                warn!(
                    "legacy metadata.pkl found but pickle loading is disabled for security; \
                     rebuild the index to regenerate metadata.json"
                );
            }
            return Ok(None);
        }

        let config: StoreConfig = serde_json::from_slice(&fs::read(&config_path)?)?;
        let metadata: Vec<ChunkMeta> = serde_json::from_slice(&fs::read(&metadata_path)?)?;

        let raw = fs::read(&index_path)?;
        if config.dimension == 0 || raw.len() != metadata.len() * config.dimension * 4 {
            warn!(
                bytes = raw.len(),
                rows = metadata.len(),
                dimension = config.dimension,
                "index file size does not match metadata, ignoring saved index"
            );
            return Ok(None);
        }

        let vectors: Vec<f32> = raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        info!(vectors = metadata.len(), "loaded vector index");
        Ok(Some(Self {
            vectors,
            dimension: config.dimension,
            metadata,
        }))
    }
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v {
            *x /= norm;
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
