use std::collections::HashMap;
use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};

use crate::{
    error::AppResult,
    models::MovieMetadata,
    services::providers::MetadataStore,
};

/// Creates a PostgreSQL connection pool
///
/// The pool connects lazily so the service can start (and report itself
/// unhealthy) while the database is still coming up. Acquiring a connection
/// is bounded by `acquire_timeout`.
pub fn create_pool(database_url: &str, acquire_timeout: Duration) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(acquire_timeout)
        .connect_lazy(database_url)?;

    Ok(pool)
}

#[derive(Debug, sqlx::FromRow)]
struct MovieRow {
    movie_id: i64,
    title: String,
    genres: String,
    poster_url: Option<String>,
}

impl From<MovieRow> for MovieMetadata {
    fn from(row: MovieRow) -> Self {
        MovieMetadata::from_raw(row.movie_id, row.title, &row.genres, row.poster_url)
    }
}

/// Movie metadata backed by the `movies` table
#[derive(Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs `SELECT 1`; used at startup to log whether the database is reachable
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MetadataStore for PgMetadataStore {
    async fn get_by_ids(&self, ids: &[i64]) -> AppResult<HashMap<i64, MovieMetadata>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<MovieRow> = sqlx::query_as(
            r#"
            SELECT movie_id::BIGINT AS movie_id, title, genres, poster_url
            FROM movies
            WHERE movie_id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(requested = ids.len(), found = rows.len(), "Fetched movie metadata");

        Ok(rows
            .into_iter()
            .map(|row| (row.movie_id, MovieMetadata::from(row)))
            .collect())
    }

    async fn find_by_criteria(
        &self,
        genres: &[String],
        keywords: &[String],
        limit: usize,
    ) -> AppResult<Vec<i64>> {
        let Some(mut query) = build_criteria_query(genres, keywords, limit) else {
            return Ok(vec![]);
        };

        let ids: Vec<i64> = query.build_query_scalar::<i64>().fetch_all(&self.pool).await?;

        tracing::debug!(
            genres = ?genres,
            keywords = ?keywords,
            matched = ids.len(),
            "Criteria search completed"
        );

        Ok(ids)
    }
}

/// Builds `SELECT movie_id ... WHERE genres ILIKE .. OR title ILIKE .. LIMIT n`
///
/// Returns `None` when there is nothing to filter on.
fn build_criteria_query<'a>(
    genres: &[String],
    keywords: &[String],
    limit: usize,
) -> Option<QueryBuilder<'a, Postgres>> {
    if genres.is_empty() && keywords.is_empty() {
        return None;
    }

    let mut query = QueryBuilder::new("SELECT movie_id::BIGINT FROM movies WHERE ");
    {
        let mut conditions = query.separated(" OR ");
        for genre in genres {
            conditions.push("genres ILIKE ");
            conditions.push_bind_unseparated(contains_pattern(genre));
        }
        for keyword in keywords {
            conditions.push("title ILIKE ");
            conditions.push_bind_unseparated(contains_pattern(keyword));
        }
    }
    query.push(" LIMIT ");
    query.push_bind(limit as i64);

    Some(query)
}

/// `%needle%` with LIKE wildcards in the needle escaped
fn contains_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
