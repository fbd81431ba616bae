use std::collections::{HashMap, HashSet};

use crate::models::{Candidate, MovieMetadata, RankedMovie};

/// Component-wise mean of `vectors`
///
/// Rows whose dimension differs from the first row are skipped. Returns `None`
/// when there is nothing to average.
pub fn centroid(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let dimension = vectors.first()?.len();
    if dimension == 0 {
        return None;
    }

    let mut sum = vec![0.0_f32; dimension];
    let mut rows = 0_usize;
    for vector in vectors.iter().filter(|v| v.len() == dimension) {
        for (acc, value) in sum.iter_mut().zip(vector) {
            *acc += value;
        }
        rows += 1;
    }

    let rows = rows as f32;
    Some(sum.into_iter().map(|total| total / rows).collect())
}

/// |A ∩ B| / |A ∪ B|, zero when both sets are empty
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// Keeps the first occurrence of every movie id
pub fn dedup_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::with_capacity(candidates.len());
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.movie_id))
        .collect()
}

/// Re-ranks candidates by genre overlap with `target_genres`
///
/// Candidates without metadata or without any shared genre are dropped. The
/// rest are ordered by (jaccard desc, score desc); the sort is stable, so
/// full ties keep retrieval order.
pub fn rank_by_genre(
    candidates: Vec<Candidate>,
    metadata: &HashMap<i64, MovieMetadata>,
    target_genres: &[String],
) -> Vec<Candidate> {
    let target: HashSet<String> = target_genres.iter().map(|g| g.to_lowercase()).collect();

    let mut scored: Vec<(f32, Candidate)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let genres = metadata.get(&candidate.movie_id)?.genre_set();
            let overlap = jaccard(&genres, &target);
            (overlap > 0.0).then_some((overlap, candidate))
        })
        .collect();

    scored.sort_by(|(ja, a), (jb, b)| jb.total_cmp(ja).then(b.score.total_cmp(&a.score)));
    scored.into_iter().map(|(_, candidate)| candidate).collect()
}

/// Joins candidates with their metadata, preserving candidate order
///
/// Candidates the metadata store did not return are dropped.
pub fn enrich(candidates: &[Candidate], metadata: &HashMap<i64, MovieMetadata>) -> Vec<RankedMovie> {
    candidates
        .iter()
        .filter_map(|candidate| {
            metadata
                .get(&candidate.movie_id)
                .map(|meta| RankedMovie::from_parts(*candidate, meta))
        })
        .collect()
}
