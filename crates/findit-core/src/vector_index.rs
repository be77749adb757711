//! Persistent vector index: wraps [`crate::hnsw::HnswGraph`] with an
//! external key space, on-disk persistence, and a read-only memory-mapped
//! view for concurrent readers while a writer rebuilds the index.
//!
//! The graph itself only knows dense `0..n` node ids over a flat
//! `embeddings` buffer it doesn't own. This module adds the clip-id keying,
//! similarity clamping, and the RO/RW split the daemon needs: a writer
//! holds the only mutable handle and periodically calls [`VectorIndex::save`];
//! readers (the search path, possibly a different process) open
//! [`VectorIndex::view`] against the same file without blocking the writer.

use crate::error::{FindItError, Result};
use crate::hnsw::HnswGraph;
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Default embedding width (CLIP / EmbeddingGemma output dimension).
pub const DEFAULT_DIM: usize = 768;
/// Default max neighbors per node, passed straight through to the graph.
pub const DEFAULT_CONNECTIVITY: usize = 16;

const MAGIC: &[u8; 4] = b"FVI1";

/// A vector index keyed by an opaque `i64` id (a clip's row id), rather
/// than the dense graph-internal id `HnswGraph` operates on.
pub struct VectorIndex {
    dim: usize,
    graph: HnswGraph,
    embeddings: Vec<f32>,
    key_to_dense: HashMap<i64, usize>,
    dense_to_key: Vec<i64>,
    writable: bool,
}

impl VectorIndex {
    /// A fresh, empty, writable index.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            graph: HnswGraph::with_params(DEFAULT_CONNECTIVITY, 100, 50),
            embeddings: Vec::new(),
            key_to_dense: HashMap::new(),
            dense_to_key: Vec::new(),
            writable: true,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.dense_to_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense_to_key.is_empty()
    }

    /// Insert or replace the embedding for `key`. Errors if this index was
    /// opened via [`VectorIndex::view`].
    pub fn add(&mut self, key: i64, embedding: &[f32]) -> Result<()> {
        if !self.writable {
            return Err(FindItError::ReadOnly);
        }
        if embedding.len() != self.dim {
            return Err(FindItError::Validation(format!(
                "embedding has {} dims, index expects {}",
                embedding.len(),
                self.dim
            )));
        }
        if let Some(&dense) = self.key_to_dense.get(&key) {
            let start = dense * self.dim;
            self.embeddings[start..start + self.dim].copy_from_slice(embedding);
        } else {
            let dense = self.dense_to_key.len();
            self.dense_to_key.push(key);
            self.key_to_dense.insert(key, dense);
            self.embeddings.extend_from_slice(embedding);
        }
        self.rebuild_graph();
        Ok(())
    }

    /// Insert many embeddings at once, rebuilding the graph only once at
    /// the end rather than after every single insert.
    pub fn add_batch(&mut self, items: &[(i64, Vec<f32>)]) -> Result<()> {
        if !self.writable {
            return Err(FindItError::ReadOnly);
        }
        for (key, embedding) in items {
            if embedding.len() != self.dim {
                return Err(FindItError::Validation(format!(
                    "embedding has {} dims, index expects {}",
                    embedding.len(),
                    self.dim
                )));
            }
            if let Some(&dense) = self.key_to_dense.get(key) {
                let start = dense * self.dim;
                self.embeddings[start..start + self.dim].copy_from_slice(embedding);
            } else {
                let dense = self.dense_to_key.len();
                self.dense_to_key.push(*key);
                self.key_to_dense.insert(*key, dense);
                self.embeddings.extend_from_slice(embedding);
            }
        }
        self.rebuild_graph();
        Ok(())
    }

    /// Remove a key from the index. The graph has no incremental deletion,
    /// so this compacts the embedding buffer and rebuilds from scratch.
    pub fn remove(&mut self, key: i64) -> Result<bool> {
        if !self.writable {
            return Err(FindItError::ReadOnly);
        }
        let Some(dense) = self.key_to_dense.remove(&key) else {
            return Ok(false);
        };
        self.dense_to_key.remove(dense);
        self.embeddings.drain(dense * self.dim..(dense + 1) * self.dim);
        for (&k, d) in self.key_to_dense.iter_mut() {
            if *d > dense {
                *d -= 1;
            }
            let _ = k;
        }
        self.rebuild_graph();
        Ok(true)
    }

    pub fn clear(&mut self) -> Result<()> {
        if !self.writable {
            return Err(FindItError::ReadOnly);
        }
        self.graph.clear();
        self.embeddings.clear();
        self.key_to_dense.clear();
        self.dense_to_key.clear();
        Ok(())
    }

    fn rebuild_graph(&mut self) {
        self.graph.rebuild(&self.embeddings, self.dim, self.dense_to_key.len());
    }

    /// Nearest neighbors to `query`, as `(key, similarity)` pairs sorted by
    /// descending similarity, clamped to `[0, 1]`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>> {
        if query.len() != self.dim {
            return Err(FindItError::Validation(format!(
                "query has {} dims, index expects {}",
                query.len(),
                self.dim
            )));
        }
        let hits = self.graph.search(query, k, &self.embeddings, self.dim);
        Ok(hits
            .into_iter()
            .map(|(score, dense)| (self.dense_to_key[dense], clamp_similarity(score)))
            .collect())
    }

    /// Serialize the index to `path`: header, key table, then the flat
    /// embedding buffer. The graph itself isn't persisted — it's cheap to
    /// rebuild from the embeddings on load, and rebuilding avoids pinning
    /// down the random layer-assignment internals as an on-disk format.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| FindItError::FatalGlobal(e.into()))?;
        let mut w = BufWriter::new(file);
        w.write_all(MAGIC).map_err(io_err)?;
        w.write_all(&(self.dim as u32).to_le_bytes()).map_err(io_err)?;
        w.write_all(&(self.dense_to_key.len() as u64).to_le_bytes())
            .map_err(io_err)?;
        for key in &self.dense_to_key {
            w.write_all(&key.to_le_bytes()).map_err(io_err)?;
        }
        for value in &self.embeddings {
            w.write_all(&value.to_le_bytes()).map_err(io_err)?;
        }
        w.flush().map_err(io_err)?;
        Ok(())
    }

    /// Load a writable, fully in-memory copy of the index from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| FindItError::FatalGlobal(e.into()))?;
        let (dim, dense_to_key, embeddings) = parse(&bytes)?;
        let mut index = Self {
            dim,
            graph: HnswGraph::with_params(DEFAULT_CONNECTIVITY, 100, 50),
            key_to_dense: dense_to_key
                .iter()
                .enumerate()
                .map(|(d, &k)| (k, d))
                .collect(),
            dense_to_key,
            embeddings,
            writable: true,
        };
        index.rebuild_graph();
        Ok(index)
    }

    /// Open a read-only, memory-mapped view of the index file, for a reader
    /// that runs alongside a writer periodically replacing the file.
    /// Mutating calls on the result return [`FindItError::ReadOnly`].
    pub fn view(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| FindItError::FatalGlobal(e.into()))?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| FindItError::FatalGlobal(e.into()))?;
        let (dim, dense_to_key, embeddings) = parse(&mmap)?;
        let mut index = Self {
            dim,
            graph: HnswGraph::with_params(DEFAULT_CONNECTIVITY, 100, 50),
            key_to_dense: dense_to_key
                .iter()
                .enumerate()
                .map(|(d, &k)| (k, d))
                .collect(),
            dense_to_key,
            embeddings,
            writable: false,
        };
        index.rebuild_graph();
        Ok(index)
    }
}

fn io_err(e: std::io::Error) -> FindItError {
    FindItError::FatalGlobal(e.into())
}

fn parse(bytes: &[u8]) -> Result<(usize, Vec<i64>, Vec<f32>)> {
    if bytes.len() < 16 || &bytes[0..4] != MAGIC {
        return Err(FindItError::Validation("not a vector index file".into()));
    }
    let dim = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let count = u64::from_le_bytes(bytes[8..16].try_into().unwrap()) as usize;

    let keys_start = 16;
    let keys_end = keys_start + count * 8;
    let embeddings_end = keys_end + count * dim * 4;
    if bytes.len() < embeddings_end {
        return Err(FindItError::Validation("truncated vector index file".into()));
    }

    let mut dense_to_key = Vec::with_capacity(count);
    for chunk in bytes[keys_start..keys_end].chunks_exact(8) {
        dense_to_key.push(i64::from_le_bytes(chunk.try_into().unwrap()));
    }

    let mut embeddings = Vec::with_capacity(count * dim);
    for chunk in bytes[keys_end..embeddings_end].chunks_exact(4) {
        embeddings.push(f32::from_le_bytes(chunk.try_into().unwrap()));
    }

    Ok((dim, dense_to_key, embeddings))
}

fn clamp_similarity(score: f32) -> f32 {
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: Vec<f32>) -> Vec<f32> {
        let n: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.into_iter().map(|x| x / n).collect()
    }

    #[test]
    fn add_then_search_finds_self() {
        let mut idx = VectorIndex::new(4);
        idx.add(10, &norm(vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        idx.add(20, &norm(vec![0.0, 1.0, 0.0, 0.0])).unwrap();

        let hits = idx.search(&norm(vec![1.0, 0.0, 0.0, 0.0]), 1).unwrap();
        assert_eq!(hits[0].0, 10);
        assert!(hits[0].1 > 0.9);
    }

    #[test]
    fn similarity_is_clamped_to_unit_interval() {
        assert_eq!(clamp_similarity(1.5), 1.0);
        assert_eq!(clamp_similarity(-1.5), 0.0);
        assert_eq!(clamp_similarity(0.5), 0.5);
    }

    #[test]
    fn add_rejects_wrong_dimension() {
        let mut idx = VectorIndex::new(4);
        let err = idx.add(1, &[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, FindItError::Validation(_)));
    }

    #[test]
    fn remove_drops_key_and_compacts() {
        let mut idx = VectorIndex::new(2);
        idx.add(1, &norm(vec![1.0, 0.0])).unwrap();
        idx.add(2, &norm(vec![0.0, 1.0])).unwrap();
        assert!(idx.remove(1).unwrap());
        assert_eq!(idx.len(), 1);
        let hits = idx.search(&norm(vec![0.0, 1.0]), 1).unwrap();
        assert_eq!(hits[0].0, 2);
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");

        let mut idx = VectorIndex::new(3);
        idx.add(100, &norm(vec![1.0, 0.0, 0.0])).unwrap();
        idx.add(200, &norm(vec![0.0, 1.0, 0.0])).unwrap();
        idx.save(&path).unwrap();

        let loaded = VectorIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.dim(), 3);
        let hits = loaded.search(&norm(vec![1.0, 0.0, 0.0]), 1).unwrap();
        assert_eq!(hits[0].0, 100);
    }

    #[test]
    fn view_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");

        let mut idx = VectorIndex::new(2);
        idx.add(1, &norm(vec![1.0, 0.0])).unwrap();
        idx.save(&path).unwrap();

        let mut view = VectorIndex::view(&path).unwrap();
        assert_eq!(view.len(), 1);
        let err = view.add(2, &norm(vec![0.0, 1.0])).unwrap_err();
        assert!(matches!(err, FindItError::ReadOnly));
    }
}
