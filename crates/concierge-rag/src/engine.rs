//! Index lifecycle: build, persist, invalidate, query.
//!
//! Invalidation protocol: any KB write touches the zero-byte `.stale`
//! sentinel. Sentinel reads and writes are serialized across processes by an
//! exclusive file lock on `.index_state.lock`; rebuilds are serialized
//! in-process by an async mutex. A rebuild clears the sentinel only when its
//! mtime still equals the value captured at rebuild start, so writes that
//! land mid-rebuild keep the index flagged.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use fs2::FileExt;
use tracing::{info, warn};

use concierge_store::types::NewChunk;
use concierge_store::Store;

use crate::chunker::{chunks_for_entry, CandidateChunk};
use crate::embedder::{Embedder, LOCAL_EMBEDDING_DIM};
use crate::error::Result;
use crate::vector_store::{ChunkMeta, VectorStore};

const STALE_FILE: &str = ".stale";
const STATE_LOCK_FILE: &str = ".index_state.lock";

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub entry_id: i64,
    pub chunk_index: i64,
    pub category: String,
    pub title: String,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct RagParams {
    pub top_k: usize,
    pub min_relevance: f32,
    pub chunk_max_tokens: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RebuildReport {
    pub entries: usize,
    pub chunks: usize,
    /// Chunk texts actually sent to the embedder this rebuild.
    pub embedded: usize,
    /// Chunk embeddings reused from the store.
    pub reused: usize,
    pub cleared_sentinel: bool,
}

pub struct IndexManager {
    dir: PathBuf,
    store: Arc<Store>,
    embedder: Embedder,
    params: RagParams,
    index: RwLock<VectorStore>,
    rebuild_lock: tokio::sync::Mutex<()>,
}

impl IndexManager {
    /// Open the manager, loading any previously persisted index.
    pub fn new(dir: PathBuf, store: Arc<Store>, embedder: Embedder, params: RagParams) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        let index = match VectorStore::load(&dir) {
            Ok(Some(index)) => index,
            Ok(None) => {
                info!("no saved vector index, starting empty");
                VectorStore::empty(LOCAL_EMBEDDING_DIM)
            }
            Err(e) => {
                warn!(error = %e, "saved vector index unreadable, starting empty");
                VectorStore::empty(LOCAL_EMBEDDING_DIM)
            }
        };
        Ok(Self {
            dir,
            store,
            embedder,
            params,
            index: RwLock::new(index),
            rebuild_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    // ── Staleness sentinel ───────────────────────────────────────────

    /// Flag the index as invalid. Called after every KB mutation.
    pub fn mark_stale(&self) -> Result<()> {
        self.with_state_lock(|dir| {
            let path = dir.join(STALE_FILE);
            let file = fs::OpenOptions::new().create(true).write(true).open(&path)?;
            file.set_modified(SystemTime::now())?;
            Ok(())
        })
    }

    pub fn is_stale(&self) -> bool {
        self.with_state_lock(|dir| Ok(dir.join(STALE_FILE).exists()))
            .unwrap_or(false)
    }

    /// Sentinel mtime at rebuild start; `None` when the sentinel is absent.
    fn stale_token(&self) -> Option<SystemTime> {
        self.with_state_lock(|dir| {
            Ok(fs::metadata(dir.join(STALE_FILE))
                .and_then(|m| m.modified())
                .ok())
        })
        .unwrap_or(None)
    }

    /// Remove the sentinel only if nothing touched it since `token` was
    /// captured. Returns whether the index is now clean.
    fn clear_stale_if(&self, token: Option<SystemTime>) -> Result<bool> {
        self.with_state_lock(|dir| {
            let path = dir.join(STALE_FILE);
            let current = fs::metadata(&path).and_then(|m| m.modified()).ok();
            match (token, current) {
                (_, None) => Ok(true),
                (Some(t), Some(c)) if t == c => {
                    fs::remove_file(&path)?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn with_state_lock<T>(&self, f: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
        fs::create_dir_all(&self.dir)?;
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.dir.join(STATE_LOCK_FILE))?;
        lock_file.lock_exclusive()?;
        let result = f(&self.dir);
        let _ = FileExt::unlock(&lock_file);
        result
    }

    // ── Rebuild ──────────────────────────────────────────────────────

    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let _guard = self.rebuild_lock.lock().await;
        self.rebuild_inner().await
    }

    async fn rebuild_inner(&self) -> Result<RebuildReport> {
        let start_token = self.stale_token();

        let entries = self.store.list_kb_entries(true, None)?;
        let mut stored: HashMap<i64, Vec<concierge_store::types::Chunk>> = HashMap::new();
        for chunk in self.store.all_chunks()? {
            stored.entry(chunk.entry_id).or_default().push(chunk);
        }

        // Classify each entry: reuse its cached embeddings when the chunk
        // text sequence is unchanged and every embedding is present with a
        // consistent dimension; embed from scratch otherwise.
        struct Plan {
            entry_id: i64,
            candidates: Vec<CandidateChunk>,
            reused: Option<Vec<Vec<f32>>>,
        }

        let mut plans: Vec<Plan> = Vec::with_capacity(entries.len());
        for entry in &entries {
            let candidates = chunks_for_entry(
                entry.id,
                &entry.category,
                &entry.title,
                &entry.content,
                self.params.chunk_max_tokens,
            );
            let reused = stored
                .get(&entry.id)
                .and_then(|old| reusable_embeddings(old, &candidates));
            plans.push(Plan {
                entry_id: entry.id,
                candidates,
                reused,
            });
        }

        // Dimension coherence: reused vectors must all agree, and must agree
        // with freshly embedded ones. Any disagreement downgrades every plan
        // to a full re-embed.
        let reuse_dims: Vec<usize> = plans
            .iter()
            .filter_map(|p| p.reused.as_ref())
            .filter_map(|v| v.first().map(|e| e.len()))
            .collect();
        if reuse_dims.windows(2).any(|w| w[0] != w[1]) {
            warn!("cached embedding dimensions disagree, forcing full re-embed");
            for plan in &mut plans {
                plan.reused = None;
            }
        }

        let changed_texts: Vec<String> = plans
            .iter()
            .filter(|p| p.reused.is_none())
            .flat_map(|p| p.candidates.iter().map(|c| c.text.clone()))
            .collect();

        let mut fresh = if changed_texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(&changed_texts).await
        };

        if let (Some(new_dim), Some(&reuse_dim)) =
            (fresh.first().map(|v| v.len()), reuse_dims.first())
        {
            if new_dim != reuse_dim {
                warn!(
                    new_dim,
                    reuse_dim, "embedding dimension changed, forcing full re-embed"
                );
                for plan in &mut plans {
                    plan.reused = None;
                }
                let all_texts: Vec<String> = plans
                    .iter()
                    .flat_map(|p| p.candidates.iter().map(|c| c.text.clone()))
                    .collect();
                fresh = self.embedder.embed_batch(&all_texts).await;
            }
        }

        // Assemble the matrix and metadata in one entry order; write back
        // replaced chunks for the entries that were re-embedded.
        let mut fresh_iter = fresh.into_iter();
        let mut embeddings: Vec<Vec<f32>> = Vec::new();
        let mut metadata: Vec<ChunkMeta> = Vec::new();
        let mut report = RebuildReport {
            entries: entries.len(),
            ..Default::default()
        };

        for plan in &plans {
            let vectors: Vec<Vec<f32>> = match &plan.reused {
                Some(cached) => {
                    report.reused += cached.len();
                    cached.clone()
                }
                None => {
                    let taken: Vec<Vec<f32>> = fresh_iter
                        .by_ref()
                        .take(plan.candidates.len())
                        .collect();
                    report.embedded += taken.len();
                    taken
                }
            };

            for (candidate, vector) in plan.candidates.iter().zip(&vectors) {
                metadata.push(ChunkMeta {
                    entry_id: candidate.entry_id,
                    chunk_index: candidate.index,
                    category: candidate.category.clone(),
                    title: candidate.title.clone(),
                    text: candidate.text.clone(),
                });
                embeddings.push(vector.clone());
            }

            if plan.reused.is_none() {
                let new_chunks: Vec<NewChunk> = plan
                    .candidates
                    .iter()
                    .zip(&vectors)
                    .map(|(c, v)| NewChunk {
                        chunk_index: c.index,
                        text: c.text.clone(),
                        embedding: Some(embedding_to_bytes(v)),
                    })
                    .collect();
                self.store.save_chunks(plan.entry_id, &new_chunks)?;
            }
        }

        report.chunks = metadata.len();

        let next = VectorStore::build(embeddings, metadata, LOCAL_EMBEDDING_DIM);
        next.save(&self.dir)?;
        *self.index.write().unwrap() = next;

        report.cleared_sentinel = self.clear_stale_if(start_token)?;
        info!(
            entries = report.entries,
            chunks = report.chunks,
            embedded = report.embedded,
            reused = report.reused,
            cleared = report.cleared_sentinel,
            "rebuilt RAG index"
        );
        Ok(report)
    }

    // ── Retrieval ────────────────────────────────────────────────────

    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Result<Vec<RetrievedChunk>> {
        if self.is_stale() {
            let _guard = self.rebuild_lock.lock().await;
            if self.is_stale() {
                if let Err(e) = self.rebuild_inner().await {
                    warn!(error = %e, "stale-index rebuild failed, serving existing index");
                }
            }
        }

        if self.index.read().unwrap().is_empty() {
            let _guard = self.rebuild_lock.lock().await;
            if self.index.read().unwrap().is_empty() {
                self.rebuild_inner().await?;
            }
            if self.index.read().unwrap().is_empty() {
                return Ok(Vec::new());
            }
        }

        let query_vec = self.embedder.embed_one(query).await;
        let hits = self.index.read().unwrap().search(
            &query_vec,
            k.unwrap_or(self.params.top_k),
            self.params.min_relevance,
        );

        Ok(hits
            .into_iter()
            .map(|h| RetrievedChunk {
                entry_id: h.meta.entry_id,
                chunk_index: h.meta.chunk_index,
                category: h.meta.category,
                title: h.meta.title,
                text: h.meta.text,
                score: h.score,
            })
            .collect())
    }

    pub fn index_len(&self) -> usize {
        self.index.read().unwrap().len()
    }
}

/// Format retrieved chunks into the numbered context block handed to the LLM.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return "No relevant information found in the knowledge base.".to_string();
    }
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "--- Context {} (Source: {} — {}) ---\n{}",
                i + 1,
                c.category,
                c.title,
                c.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn embedding_to_bytes(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

pub fn bytes_to_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

/// Cached embeddings for an entry, position-matched by chunk index, provided
/// the stored text sequence equals the candidate sequence exactly and every
/// embedding decodes. Any gap reclassifies the entry as changed.
fn reusable_embeddings(
    stored: &[concierge_store::types::Chunk],
    candidates: &[CandidateChunk],
) -> Option<Vec<Vec<f32>>> {
    if stored.len() != candidates.len() || candidates.is_empty() {
        return None;
    }
    let mut by_index: HashMap<i64, &concierge_store::types::Chunk> = HashMap::new();
    for chunk in stored {
        by_index.insert(chunk.chunk_index, chunk);
    }

    let mut vectors = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let chunk = by_index.get(&candidate.index)?;
        if chunk.text != candidate.text {
            return None;
        }
        let embedding = bytes_to_embedding(chunk.embedding.as_deref()?)?;
        vectors.push(embedding);
    }
    // All vectors within one entry must share a dimension.
    if vectors.windows(2).any(|w| w[0].len() != w[1].len()) {
        return None;
    }
    Some(vectors)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::embedder::EmbeddingProvider;

    /// Deterministic 4-dim embeddings, counting every text embedded.
    struct CountingProvider {
        embedded: AtomicUsize,
        texts: Mutex<Vec<String>>,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                embedded: AtomicUsize::new(0),
                texts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, String> {
            self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
            self.texts.lock().unwrap().extend(texts.iter().cloned());
            Ok(texts
                .iter()
                .map(|t| {
                    let bytes = t.as_bytes();
                    vec![
                        bytes.len() as f32,
                        bytes.iter().map(|&b| b as f32).sum::<f32>() / 1000.0,
                        *bytes.first().unwrap_or(&1) as f32,
                        1.0,
                    ]
                })
                .collect())
        }
    }

    fn manager(dir: &Path) -> (IndexManager, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let embedder = Embedder::new(Box::new(CountingProvider::new()));
        let mgr = IndexManager::new(
            dir.to_path_buf(),
            Arc::clone(&store),
            embedder,
            RagParams {
                top_k: 10,
                min_relevance: -1.0,
                chunk_max_tokens: 300,
            },
        )
        .unwrap();
        (mgr, store)
    }

    #[tokio::test]
    async fn empty_kb_builds_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, _store) = manager(dir.path());

        let report = mgr.rebuild().await.unwrap();
        assert_eq!(report.chunks, 0);
        assert!(report.cleared_sentinel);
        assert!(mgr.retrieve("anything", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn incremental_rebuild_reembeds_only_changed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, store) = manager(dir.path());

        let a = store.add_kb_entry("Pricing", "Cuts", "Haircut: $65").unwrap();
        store.add_kb_entry("Pricing", "Color", "Color: $120").unwrap();
        store.add_kb_entry("Info", "Address", "12 Herzl St").unwrap();

        let first = mgr.rebuild().await.unwrap();
        assert_eq!(first.embedded, 3);
        assert_eq!(first.reused, 0);

        store
            .update_kb_entry(a, "Pricing", "Cuts", "Haircut: $70", true)
            .unwrap();
        mgr.mark_stale().unwrap();

        let second = mgr.rebuild().await.unwrap();
        assert_eq!(second.embedded, 1, "only the edited entry is re-embedded");
        assert_eq!(second.reused, 2);
        assert!(second.cleared_sentinel);
        assert!(!mgr.is_stale());
    }

    #[tokio::test]
    async fn chunk_rows_written_back_with_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, store) = manager(dir.path());
        store.add_kb_entry("Pricing", "Cuts", "Haircut: $65").unwrap();

        mgr.rebuild().await.unwrap();

        let chunks = store.all_chunks().unwrap();
        assert_eq!(chunks.len(), 1);
        let embedding = bytes_to_embedding(chunks[0].embedding.as_deref().unwrap()).unwrap();
        assert_eq!(embedding.len(), 4);
        assert_eq!(mgr.index_len(), 1);
    }

    #[tokio::test]
    async fn stale_sentinel_survives_concurrent_write() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, _store) = manager(dir.path());

        mgr.mark_stale().unwrap();
        let token = mgr.stale_token();
        assert!(token.is_some());

        // A write lands while the rebuild is in flight.
        std::thread::sleep(std::time::Duration::from_millis(20));
        mgr.mark_stale().unwrap();

        assert!(!mgr.clear_stale_if(token).unwrap());
        assert!(mgr.is_stale(), "sentinel must stay set for the next rebuild");
    }

    #[tokio::test]
    async fn retrieval_rebuilds_when_stale() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, store) = manager(dir.path());
        store.add_kb_entry("Pricing", "Cuts", "Haircut: $65").unwrap();
        mgr.mark_stale().unwrap();

        let hits = mgr.retrieve("how much is a haircut", None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Cuts");
        assert!(!mgr.is_stale());
    }

    #[tokio::test]
    async fn retrieval_is_deterministic_for_fixed_index() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, store) = manager(dir.path());
        store.add_kb_entry("Pricing", "Cuts", "Haircut: $65").unwrap();
        store.add_kb_entry("Pricing", "Color", "Color: $120").unwrap();
        mgr.rebuild().await.unwrap();

        let a: Vec<i64> = mgr
            .retrieve("color", None)
            .await
            .unwrap()
            .iter()
            .map(|c| c.entry_id)
            .collect();
        let b: Vec<i64> = mgr
            .retrieve("color", None)
            .await
            .unwrap()
            .iter()
            .map(|c| c.entry_id)
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn context_formatting_numbers_sections() {
        let chunks = vec![
            RetrievedChunk {
                entry_id: 1,
                chunk_index: 0,
                category: "Pricing".into(),
                title: "Summer 2025".into(),
                text: "[Pricing — Summer 2025]\nHaircut: $65".into(),
                score: 0.9,
            },
            RetrievedChunk {
                entry_id: 2,
                chunk_index: 0,
                category: "Info".into(),
                title: "Address".into(),
                text: "[Info — Address]\n12 Herzl St".into(),
                score: 0.5,
            },
        ];
        let ctx = format_context(&chunks);
        assert!(ctx.contains("--- Context 1 (Source: Pricing — Summer 2025) ---"));
        assert!(ctx.contains("--- Context 2 (Source: Info — Address) ---"));
    }

    #[test]
    fn embedding_bytes_roundtrip() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(bytes_to_embedding(&embedding_to_bytes(&v)).unwrap(), v);
        assert!(bytes_to_embedding(&[1, 2, 3]).is_none());
    }
}
