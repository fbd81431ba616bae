use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Movie metadata as stored in the metadata database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieMetadata {
    pub movie_id: i64,
    pub title: String,
    /// Genres in source order (the store keeps them pipe-delimited)
    pub genres: Vec<String>,
    pub poster_url: Option<String>,
}

impl MovieMetadata {
    /// Builds metadata from a raw store row with a pipe-delimited genre column
    pub fn from_raw(
        movie_id: i64,
        title: String,
        genres: &str,
        poster_url: Option<String>,
    ) -> Self {
        Self {
            movie_id,
            title,
            genres: parse_genres(genres),
            poster_url,
        }
    }

    /// Lowercased genre set used for overlap comparisons
    pub fn genre_set(&self) -> HashSet<String> {
        self.genres.iter().map(|g| g.to_lowercase()).collect()
    }
}

/// Splits a pipe-delimited genre string, e.g. `"Action|Sci-Fi"`
pub fn parse_genres(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

/// A scored retrieval hit, before enrichment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub movie_id: i64,
    pub score: f32,
}

impl Candidate {
    pub fn new(movie_id: i64, score: f32) -> Self {
        Self { movie_id, score }
    }

    /// Criteria matches carry no similarity, only rank
    pub fn unscored(movie_id: i64) -> Self {
        Self {
            movie_id,
            score: 0.0,
        }
    }
}

/// A candidate joined with its metadata, returned to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMovie {
    pub id: i64,
    pub title: String,
    pub genres: Vec<String>,
    pub poster_url: Option<String>,
    pub score: f32,
}

impl RankedMovie {
    pub fn from_parts(candidate: Candidate, metadata: &MovieMetadata) -> Self {
        Self {
            id: candidate.movie_id,
            title: metadata.title.clone(),
            genres: metadata.genres.clone(),
            poster_url: metadata.poster_url.clone(),
            score: candidate.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_genres_pipe_delimited() {
        assert_eq!(
            parse_genres("Action|Sci-Fi| Thriller "),
            vec!["Action", "Sci-Fi", "Thriller"]
        );
    }

    #[test]
    fn test_parse_genres_skips_empty_segments() {
        assert_eq!(parse_genres("Drama||"), vec!["Drama"]);
        assert!(parse_genres("").is_empty());
    }

    #[test]
    fn test_genre_set_is_lowercased() {
        let movie = MovieMetadata::from_raw(1, "Alien".to_string(), "Horror|Sci-Fi", None);
        let set = movie.genre_set();
        assert!(set.contains("horror"));
        assert!(set.contains("sci-fi"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_ranked_movie_keeps_candidate_score() {
        let movie = MovieMetadata::from_raw(
            42,
            "Heat".to_string(),
            "Crime|Thriller",
            Some("https://img.example/heat.jpg".to_string()),
        );
        let ranked = RankedMovie::from_parts(Candidate::new(42, 0.87), &movie);

        assert_eq!(ranked.id, 42);
        assert_eq!(ranked.title, "Heat");
        assert_eq!(ranked.genres, vec!["Crime", "Thriller"]);
        assert_eq!(ranked.score, 0.87);
    }
}
