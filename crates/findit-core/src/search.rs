//! Hybrid Search Engine (§4.2): three-way fusion of FTS5 lexical search,
//! CLIP image-embedding ANN search, and text-embedding ANN search, with
//! cross-language query expansion.
//!
//! Embedding a query is deliberately the caller's concern to drive (the
//! caller owns which [`crate::embed::EmbeddingProvider`]s are currently
//! loaded and the [`crate::query_cache::QueryCache`] to reuse across
//! calls) — this module only fuses whatever candidate sets it's handed.

use crate::embed::EmbeddingProvider;
use crate::error::Result;
use crate::filter::{ClipFilter, FilterPredicate, SortField};
use crate::query_cache::{CachedEmbedding, QueryCache};
use crate::storage::global_db::GlobalDb;
use crate::storage::model::ColorLabel;
use crate::vector_index::VectorIndex;
use std::collections::HashMap;

/// Which source(s) `search` consults. `Auto` runs and fuses all three;
/// the single-source modes zero out the other weights rather than
/// skipping a stage outright, so scoring stays one code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Fts,
    Vector,
    TextVector,
    Auto,
}

#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub fts: f32,
    pub clip: f32,
    pub text: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            fts: 0.4,
            clip: 0.3,
            text: 0.3,
        }
    }
}

impl FusionWeights {
    fn for_mode(mode: SearchMode, base: FusionWeights) -> Self {
        match mode {
            SearchMode::Auto => base,
            SearchMode::Fts => Self { fts: 1.0, clip: 0.0, text: 0.0 },
            SearchMode::Vector => Self { fts: 0.0, clip: 1.0, text: 0.0 },
            SearchMode::TextVector => Self { fts: 0.0, clip: 0.0, text: 1.0 },
        }
    }
}

#[derive(Debug, Clone)]
pub struct HybridSearchOptions {
    pub mode: SearchMode,
    pub folder_scope: Option<Vec<String>>,
    pub limit: usize,
    pub offset: usize,
    pub weights: FusionWeights,
    pub filter: Option<FilterPredicate>,
    pub sort: SortField,
}

impl Default for HybridSearchOptions {
    fn default() -> Self {
        Self {
            mode: SearchMode::Auto,
            folder_scope: None,
            limit: 20,
            offset: 0,
            weights: FusionWeights::default(),
            filter: None,
            sort: SortField::Relevance,
        }
    }
}

/// One ranked clip, with enough mirrored metadata to render and filter it
/// without a second round trip to the Folder DB.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub source_folder: String,
    pub clip_id: i64,
    pub video_path: String,
    pub start_time: f64,
    pub end_time: f64,
    pub description: Option<String>,
    pub scene: Option<String>,
    pub shot_type: Option<String>,
    pub mood: Option<String>,
    pub rating: i32,
    pub color_label: ColorLabel,
    pub score: f32,
}

/// FTS rank (lower is better, unbounded) to a [0,1] similarity-shaped
/// score, per §4.2 step 5's normalization rule.
fn normalize_fts_rank(rank: f64) -> f32 {
    (1.0 / (1.0 + rank.max(0.0))) as f32
}

/// Factor applied to a cross-language FTS pass's contribution (§4.2
/// cross-language expansion).
const TRANSLATION_DISCOUNT: f32 = 0.8;

fn accumulate_fts(
    global: &GlobalDb,
    fts_query: &str,
    folder_scope: Option<&[String]>,
    limit: usize,
    weight: f32,
    discount: f32,
    scores: &mut HashMap<(String, i64), f32>,
) -> Result<()> {
    if weight <= 0.0 {
        return Ok(());
    }
    let hits = global.fts_search(fts_query, folder_scope, limit)?;
    for hit in hits {
        let key = (hit.source_folder, hit.source_clip_id);
        let contribution = weight * discount * normalize_fts_rank(hit.rank);
        let entry = scores.entry(key).or_insert(0.0);
        *entry = entry.max(contribution);
    }
    Ok(())
}

/// Run an ANN search and fold hits into `scores`. The vector index's key
/// is the global DB's clip `rowid` (§3) rather than a `(folder, clip_id)`
/// pair, since a single index spans every registered folder; `global`
/// resolves each hit back to the pair the FTS stage keys on.
#[allow(clippy::too_many_arguments)]
fn accumulate_vector(
    global: &GlobalDb,
    index: &VectorIndex,
    query_embedding: &[f32],
    limit: usize,
    weight: f32,
    folder_scope: Option<&[String]>,
    scores: &mut HashMap<(String, i64), f32>,
) -> Result<()> {
    if weight <= 0.0 {
        return Ok(());
    }
    let hits = index.search(query_embedding, limit)?;
    for (vector_key, similarity) in hits {
        let Some((folder, clip_id)) = global.resolve_rowid(vector_key)? else {
            continue;
        };
        if let Some(scope) = folder_scope {
            if !scope.iter().any(|f| f == &folder) {
                continue;
            }
        }
        let key = (folder, clip_id);
        let contribution = weight * similarity;
        let entry = scores.entry(key).or_insert(0.0);
        *entry = entry.max(contribution);
    }
    Ok(())
}

/// Embed `text` via `provider`, using `cache` keyed by provider name plus
/// the lowercased, trimmed query text (§4.2 step 3). Embedding failure
/// degrades silently — the caller treats `None` as "skip this source"
/// rather than an error.
fn embed_cached(provider: &mut EmbeddingProvider, cache: &mut QueryCache, text: &str) -> Option<Vec<f32>> {
    let key = format!("{}:{}", provider.name(), text.trim().to_lowercase());
    if let Some(cached) = cache.get(&key) {
        return Some(cached.data.clone());
    }
    let embedding = provider.embed_text(text).ok()?;
    cache.insert(
        key,
        CachedEmbedding {
            data: embedding.clone(),
            num_tokens: text.split_whitespace().count(),
        },
    );
    Some(embedding)
}

/// Dependencies the search engine draws on for one call. Grouped into a
/// struct rather than threaded as individual arguments since most calls
/// pass the same handles through unchanged from the daemon's long-lived
/// state.
pub struct SearchContext<'a> {
    pub global: &'a GlobalDb,
    pub image_index: Option<&'a VectorIndex>,
    pub text_index: Option<&'a VectorIndex>,
    pub clip_text_embedder: Option<&'a mut EmbeddingProvider>,
    pub text_embedder: Option<&'a mut EmbeddingProvider>,
    pub cache: &'a mut QueryCache,
}

/// Run the hybrid search (§4.2): expand the query, fuse FTS, CLIP-image
/// ANN and text-embedding ANN candidates under `options.weights`, then
/// filter and sort.
pub fn search(ctx: SearchContext<'_>, query: &str, options: &HybridSearchOptions) -> Result<Vec<SearchHit>> {
    let SearchContext {
        global,
        image_index,
        text_index,
        clip_text_embedder,
        text_embedder,
        cache,
    } = ctx;

    let weights = FusionWeights::for_mode(options.mode, options.weights);
    let ann_limit = (options.limit + options.offset).max(options.limit) * 2;
    let folder_scope = options.folder_scope.as_deref();
    let expansion = findit_lang::expand_query(query);

    let mut scores: HashMap<(String, i64), f32> = HashMap::new();

    accumulate_fts(
        global,
        &expansion.original_fts,
        folder_scope,
        ann_limit,
        weights.fts,
        1.0,
        &mut scores,
    )?;

    if let Some(translated) = &expansion.translated_fts {
        accumulate_fts(
            global,
            translated,
            folder_scope,
            ann_limit,
            weights.fts,
            TRANSLATION_DISCOUNT,
            &mut scores,
        )?;
    }

    let has_query_term = !expansion.positive.is_empty() || !expansion.negative.is_empty();

    if has_query_term {
        if let (Some(index), Some(embedder)) = (text_index, text_embedder) {
            if let Some(embedding) = embed_cached(embedder, cache, &expansion.embedding_text) {
                accumulate_vector(
                    global,
                    index,
                    &embedding,
                    ann_limit,
                    weights.text,
                    folder_scope,
                    &mut scores,
                )?;
            }
        }

        if let (Some(index), Some(embedder)) = (image_index, clip_text_embedder) {
            if let Some(embedding) = embed_cached(embedder, cache, &expansion.embedding_text) {
                accumulate_vector(
                    global,
                    index,
                    &embedding,
                    ann_limit,
                    weights.clip,
                    folder_scope,
                    &mut scores,
                )?;
            }
        }
    }

    let mut hits = Vec::with_capacity(scores.len());
    for ((folder, clip_id), score) in scores {
        let Some(row) = global.get_full_row(&folder, clip_id)? else {
            continue;
        };
        hits.push(SearchHit {
            source_folder: row.source_folder,
            clip_id: row.source_clip_id,
            video_path: row.video_path,
            start_time: row.start_time,
            end_time: row.end_time,
            description: row.description,
            scene: row.scene,
            shot_type: row.shot_type,
            mood: row.mood,
            rating: row.rating,
            color_label: ColorLabel::parse(&row.color_label).unwrap_or(ColorLabel::None),
            score,
        });
    }

    let clip_filter = ClipFilter {
        predicate: options.filter.clone().unwrap_or_default(),
        sort: options.sort,
    };
    let mut hits = clip_filter.apply(hits);

    let start = options.offset.min(hits.len());
    let end = (start + options.limit).min(hits.len());
    hits.truncate(end);
    hits.drain(..start);
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(folder: &'static str, id: i64, description: &'static str, rating: i32) -> crate::storage::global_db::GlobalClipRow<'static> {
        crate::storage::global_db::GlobalClipRow {
            source_folder: folder,
            source_clip_id: id,
            video_path: "beach.mp4",
            start_time: 0.0,
            end_time: 5.0,
            description: Some(description),
            scene: Some("outdoor"),
            subjects: &[],
            actions: &[],
            objects: &[],
            colors: &[],
            tags: &[],
            user_tags: &[],
            transcript: None,
            shot_type: Some("wide"),
            mood: Some("calm"),
            rating,
            color_label: ColorLabel::Blue,
        }
    }

    fn no_vector_ctx<'a>(global: &'a GlobalDb, cache: &'a mut QueryCache) -> SearchContext<'a> {
        SearchContext {
            global,
            image_index: None,
            text_index: None,
            clip_text_embedder: None,
            text_embedder: None,
            cache,
        }
    }

    #[test]
    fn normalize_fts_rank_favors_lower_rank() {
        assert!(normalize_fts_rank(0.0) > normalize_fts_rank(5.0));
        assert!(normalize_fts_rank(-2.0) <= 1.0);
    }

    #[test]
    fn fts_only_search_returns_matching_clips() {
        let mut global = GlobalDb::in_memory().unwrap();
        global.upsert_clip(&sample_row("/lib/a", 1, "a dog on the beach", 3)).unwrap();
        global.upsert_clip(&sample_row("/lib/a", 2, "a cat in the forest", 3)).unwrap();

        let mut cache = QueryCache::new(8);
        let ctx = no_vector_ctx(&global, &mut cache);
        let options = HybridSearchOptions {
            mode: SearchMode::Fts,
            ..Default::default()
        };
        let hits = search(ctx, "dog", &options).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].clip_id, 1);
    }

    #[test]
    fn filter_predicate_excludes_below_min_rating() {
        let mut global = GlobalDb::in_memory().unwrap();
        global.upsert_clip(&sample_row("/lib/a", 1, "a dog on the beach", 2)).unwrap();
        global.upsert_clip(&sample_row("/lib/a", 2, "a dog in the park", 5)).unwrap();

        let mut cache = QueryCache::new(8);
        let ctx = no_vector_ctx(&global, &mut cache);
        let options = HybridSearchOptions {
            mode: SearchMode::Fts,
            filter: Some(FilterPredicate {
                min_rating: Some(4),
                ..Default::default()
            }),
            ..Default::default()
        };
        let hits = search(ctx, "dog", &options).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].clip_id, 2);
    }

    #[test]
    fn dedup_keeps_single_hit_per_clip() {
        let mut global = GlobalDb::in_memory().unwrap();
        global.upsert_clip(&sample_row("/lib/a", 1, "sunrise over the ocean", 3)).unwrap();

        let mut cache = QueryCache::new(8);
        let ctx = no_vector_ctx(&global, &mut cache);
        let hits = search(ctx, "sunrise ocean", &HybridSearchOptions::default()).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn folder_scope_excludes_other_folders() {
        let mut global = GlobalDb::in_memory().unwrap();
        global.upsert_clip(&sample_row("/lib/a", 1, "a dog on the beach", 3)).unwrap();
        global.upsert_clip(&sample_row("/lib/b", 2, "a dog in the yard", 3)).unwrap();

        let mut cache = QueryCache::new(8);
        let ctx = no_vector_ctx(&global, &mut cache);
        let options = HybridSearchOptions {
            mode: SearchMode::Fts,
            folder_scope: Some(vec!["/lib/a".to_string()]),
            ..Default::default()
        };
        let hits = search(ctx, "dog", &options).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_folder, "/lib/a");
    }

    #[test]
    fn weights_for_single_source_mode_zero_the_others() {
        let w = FusionWeights::for_mode(SearchMode::Vector, FusionWeights::default());
        assert_eq!(w.clip, 1.0);
        assert_eq!(w.fts, 0.0);
        assert_eq!(w.text, 0.0);
    }

    #[test]
    fn sort_by_rating_orders_descending() {
        let mut hits = vec![
            SearchHit {
                source_folder: "/a".into(),
                clip_id: 1,
                video_path: "a.mp4".into(),
                start_time: 0.0,
                end_time: 1.0,
                description: None,
                scene: None,
                shot_type: None,
                mood: None,
                rating: 2,
                color_label: ColorLabel::None,
                score: 0.1,
            },
            SearchHit {
                source_folder: "/a".into(),
                clip_id: 2,
                video_path: "b.mp4".into(),
                start_time: 0.0,
                end_time: 1.0,
                description: None,
                scene: None,
                shot_type: None,
                mood: None,
                rating: 5,
                color_label: ColorLabel::None,
                score: 0.01,
            },
        ];
        let hits = ClipFilter::new(FilterPredicate::default(), SortField::Rating).apply(hits);
        assert_eq!(hits[0].clip_id, 2);
    }

    #[test]
    fn offset_and_limit_paginate_results() {
        let mut global = GlobalDb::in_memory().unwrap();
        for i in 1..=5 {
            global
                .upsert_clip(&sample_row("/lib/a", i, "a dog running on the beach", 3))
                .unwrap();
        }
        let mut cache = QueryCache::new(8);
        let ctx = no_vector_ctx(&global, &mut cache);
        let options = HybridSearchOptions {
            mode: SearchMode::Fts,
            limit: 2,
            offset: 2,
            ..Default::default()
        };
        let hits = search(ctx, "dog", &options).unwrap();
        assert_eq!(hits.len(), 2);
    }
}
