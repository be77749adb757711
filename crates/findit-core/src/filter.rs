//! Filter Engine & Facets (§4.4): in-memory predicates and sort order
//! applied to a fused [`crate::search::SearchHit`] set, plus the facet
//! summaries (`shot_type`, `mood`, `rating`, `color_label`) a client uses
//! to populate filter UI, which are served directly by
//! [`crate::storage::global_db::GlobalDb::facet_counts`].
//!
//! Filters run after fusion rather than narrowing any one source early,
//! so a clip that only a lexical match would have surfaced can still be
//! excluded by, say, a minimum-rating predicate without distorting the
//! fused score of the clips that remain.

use crate::search::SearchHit;
use crate::storage::model::ColorLabel;

/// AND-combined predicates; an absent field imposes no constraint.
#[derive(Debug, Clone, Default)]
pub struct FilterPredicate {
    pub min_rating: Option<i32>,
    pub color_labels: Option<Vec<ColorLabel>>,
    pub shot_types: Option<Vec<String>>,
    pub moods: Option<Vec<String>>,
}

impl FilterPredicate {
    pub fn matches(&self, hit: &SearchHit) -> bool {
        if let Some(min_rating) = self.min_rating {
            if hit.rating < min_rating {
                return false;
            }
        }
        if let Some(colors) = &self.color_labels {
            if !colors.contains(&hit.color_label) {
                return false;
            }
        }
        if let Some(shot_types) = &self.shot_types {
            match &hit.shot_type {
                Some(s) if shot_types.iter().any(|t| t == s) => {}
                _ => return false,
            }
        }
        if let Some(moods) = &self.moods {
            match &hit.mood {
                Some(m) if moods.iter().any(|t| t == m) => {}
                _ => return false,
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Relevance,
    Date,
    Duration,
    Rating,
}

/// A predicate plus the sort order to apply once it's narrowed the set.
#[derive(Debug, Clone, Default)]
pub struct ClipFilter {
    pub predicate: FilterPredicate,
    pub sort: SortField,
}

impl Default for SortField {
    fn default() -> Self {
        Self::Relevance
    }
}

impl ClipFilter {
    pub fn new(predicate: FilterPredicate, sort: SortField) -> Self {
        Self { predicate, sort }
    }

    /// Apply the predicate, then sort. `Relevance` preserves the fused
    /// score order; the other fields reorder but never drop `score`,
    /// since callers still display it alongside whichever field sorted.
    pub fn apply(&self, mut hits: Vec<SearchHit>) -> Vec<SearchHit> {
        hits.retain(|hit| self.predicate.matches(hit));
        match self.sort {
            SortField::Relevance => {
                hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            }
            SortField::Date => {
                hits.sort_by(|a, b| b.start_time.partial_cmp(&a.start_time).unwrap_or(std::cmp::Ordering::Equal));
            }
            SortField::Duration => {
                hits.sort_by(|a, b| {
                    let da = a.end_time - a.start_time;
                    let db = b.end_time - b.start_time;
                    db.partial_cmp(&da).unwrap_or(std::cmp::Ordering::Equal)
                });
            }
            SortField::Rating => {
                hits.sort_by(|a, b| b.rating.cmp(&a.rating));
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(clip_id: i64, rating: i32, color: ColorLabel, score: f32) -> SearchHit {
        SearchHit {
            source_folder: "/lib".into(),
            clip_id,
            video_path: "a.mp4".into(),
            start_time: 0.0,
            end_time: 1.0,
            description: None,
            scene: None,
            shot_type: None,
            mood: None,
            rating,
            color_label: color,
            score,
        }
    }

    #[test]
    fn min_rating_excludes_lower_rated_clips() {
        let pred = FilterPredicate {
            min_rating: Some(3),
            ..Default::default()
        };
        assert!(pred.matches(&hit(1, 3, ColorLabel::None, 0.5)));
        assert!(!pred.matches(&hit(1, 2, ColorLabel::None, 0.5)));
    }

    #[test]
    fn color_label_filter_is_a_set_membership_check() {
        let pred = FilterPredicate {
            color_labels: Some(vec![ColorLabel::Red, ColorLabel::Green]),
            ..Default::default()
        };
        assert!(pred.matches(&hit(1, 0, ColorLabel::Green, 0.1)));
        assert!(!pred.matches(&hit(1, 0, ColorLabel::Blue, 0.1)));
    }

    #[test]
    fn apply_sorts_by_rating_after_filtering() {
        let filter = ClipFilter::new(FilterPredicate::default(), SortField::Rating);
        let hits = vec![hit(1, 2, ColorLabel::None, 0.9), hit(2, 5, ColorLabel::None, 0.1)];
        let sorted = filter.apply(hits);
        assert_eq!(sorted[0].clip_id, 2);
    }

    #[test]
    fn apply_relevance_sort_preserves_score_order() {
        let filter = ClipFilter::new(FilterPredicate::default(), SortField::Relevance);
        let hits = vec![hit(1, 0, ColorLabel::None, 0.2), hit(2, 0, ColorLabel::None, 0.8)];
        let sorted = filter.apply(hits);
        assert_eq!(sorted[0].clip_id, 2);
    }
}
