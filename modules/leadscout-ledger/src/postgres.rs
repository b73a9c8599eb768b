// Postgres implementation of the ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, error, info};

use leadscout_common::{
    EngagementType, Engager, LeadCandidate, LeadScoutError, Post, PostMedia, PostSeed,
    ProfileEnrichment, Result, ScrapeEvent, ScrapeStatus,
};

use crate::ledger::{CommitReceipt, CountMismatch, CycleRecord, Ledger, ScrapeCommit, UpsertStats};

pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LeadScoutError::Database(format!("migration failed: {e}")))?;
        info!("Ledger migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a sqlx error onto the taxonomy. Key conflicts the SQL did not absorb
/// become `ConstraintViolation`; everything else means the ledger is unusable.
fn db_err(err: sqlx::Error) -> LeadScoutError {
    if let Some(db) = err.as_database_error() {
        if db.is_unique_violation() || db.is_foreign_key_violation() {
            return LeadScoutError::ConstraintViolation(db.message().to_string());
        }
    }
    LeadScoutError::Database(err.to_string())
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    post_url: String,
    post_name: Option<String>,
    last_scraped_at: Option<DateTime<Utc>>,
    scrape_count: i32,
    total_reactions: i32,
    enriched: bool,
    enriched_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            post_url: row.post_url,
            post_name: row.post_name,
            last_scraped_at: row.last_scraped_at,
            scrape_count: row.scrape_count,
            total_reactions: row.total_reactions,
            enriched: row.enriched,
            enriched_at: row.enriched_at,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MediaRow {
    media_type: Option<String>,
    duration: Option<f64>,
    mime_type: Option<String>,
    thumbnail: Option<String>,
    video_url: Option<String>,
    image_url: Option<String>,
}

impl From<MediaRow> for PostMedia {
    fn from(row: MediaRow) -> Self {
        PostMedia {
            media_type: row.media_type,
            duration: row.duration,
            mime_type: row.mime_type,
            thumbnail: row.thumbnail,
            video_url: row.video_url,
            image_url: row.image_url,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    post_url: String,
    ran_at: DateTime<Utc>,
    reactions_count: Option<i32>,
    cost_usd: f64,
    status: String,
    error: Option<String>,
}

impl From<EventRow> for ScrapeEvent {
    fn from(row: EventRow) -> Self {
        ScrapeEvent {
            id: row.id,
            post_url: row.post_url,
            ran_at: row.ran_at,
            reactions_count: row.reactions_count,
            cost_usd: row.cost_usd,
            status: ScrapeStatus::from_str_loose(&row.status),
            error: row.error,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EngagerRow {
    id: i64,
    scrape_id: i64,
    post_url: String,
    profile_url: String,
    name: Option<String>,
    headline: Option<String>,
    engagement_type: String,
    company: Option<String>,
    title: Option<String>,
    audience: Option<String>,
    enriched_at: Option<DateTime<Utc>>,
    pushed_to_crm: bool,
    pushed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<EngagerRow> for Engager {
    fn from(row: EngagerRow) -> Self {
        Engager {
            id: row.id,
            scrape_id: row.scrape_id,
            post_url: row.post_url,
            profile_url: row.profile_url,
            name: row.name,
            headline: row.headline,
            engagement_type: EngagementType::from_str_loose(&row.engagement_type),
            company: row.company,
            title: row.title,
            audience: row.audience,
            enriched_at: row.enriched_at,
            pushed_to_crm: row.pushed_to_crm,
            pushed_at: row.pushed_at,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CandidateRow {
    id: i64,
    post_url: String,
    post_name: Option<String>,
    profile_url: String,
    name: Option<String>,
    headline: Option<String>,
    company: Option<String>,
    title: Option<String>,
    audience: Option<String>,
}

impl From<CandidateRow> for LeadCandidate {
    fn from(row: CandidateRow) -> Self {
        LeadCandidate {
            engager_id: row.id,
            post_url: row.post_url,
            post_name: row.post_name,
            profile_url: row.profile_url,
            name: row.name,
            headline: row.headline,
            company: row.company,
            title: row.title,
            audience: row.audience,
        }
    }
}

const POST_COLUMNS: &str = "id, post_url, post_name, last_scraped_at, scrape_count, \
     total_reactions, enriched, enriched_at, created_at";

const ENGAGER_COLUMNS: &str = "id, scrape_id, post_url, profile_url, name, headline, \
     engagement_type, company, title, audience, enriched_at, pushed_to_crm, pushed_at, created_at";

#[async_trait]
impl Ledger for PgLedger {
    async fn upsert_posts(&self, seeds: &[PostSeed]) -> Result<UpsertStats> {
        let mut stats = UpsertStats::default();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for seed in seeds {
            let post_url = seed.post_url.trim();
            if post_url.is_empty() {
                stats.rejected += 1;
                continue;
            }
            let post_name = seed
                .post_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty());

            // No row back means the name was already current.
            let inserted = sqlx::query_scalar::<_, bool>(
                r#"
                INSERT INTO linkedin_posts (post_url, post_name)
                VALUES ($1, $2)
                ON CONFLICT (post_url) DO UPDATE
                    SET post_name = EXCLUDED.post_name
                    WHERE EXCLUDED.post_name IS NOT NULL
                      AND linkedin_posts.post_name IS DISTINCT FROM EXCLUDED.post_name
                RETURNING (xmax = 0)
                "#,
            )
            .bind(post_url)
            .bind(post_name)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

            match inserted {
                Some(true) => stats.inserted += 1,
                Some(false) => stats.renamed += 1,
                None => stats.unchanged += 1,
            }
        }

        tx.commit().await.map_err(db_err)?;
        debug!(?stats, "Upserted posts");
        Ok(stats)
    }

    async fn posts(&self) -> Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM linkedin_posts ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn post(&self, post_url: &str) -> Result<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM linkedin_posts WHERE post_url = $1"
        ))
        .bind(post_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(Post::from))
    }

    async fn commit_scrape(&self, commit: ScrapeCommit) -> Result<CommitReceipt> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let scrape_count = sqlx::query_scalar::<_, i32>(
            "SELECT scrape_count FROM linkedin_posts WHERE post_url = $1 FOR UPDATE",
        )
        .bind(&commit.post_url)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or_else(|| {
            LeadScoutError::ConstraintViolation(format!("unknown post {}", commit.post_url))
        })?;

        let event_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM linkedin_post_scrapes WHERE post_url = $1",
        )
        .bind(&commit.post_url)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        if i64::from(scrape_count) != event_count {
            error!(
                post_url = %commit.post_url,
                scrape_count,
                event_count,
                "Post row disagrees with its scrape history, refusing to commit"
            );
            // Dropping the transaction rolls it back and releases the lock.
            return Err(LeadScoutError::StateInconsistency {
                post_url: commit.post_url,
                scrape_count: i64::from(scrape_count),
                event_count,
            });
        }

        let scrape_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO linkedin_post_scrapes (post_url, ran_at, reactions_count, cost_usd, status, error)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&commit.post_url)
        .bind(commit.ran_at)
        .bind(commit.reactions)
        .bind(commit.cost_usd)
        .bind(commit.status.as_str())
        .bind(&commit.error)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        // GREATEST skips NULL, so a first attempt just takes ran_at.
        let new_count = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE linkedin_posts
            SET scrape_count = scrape_count + 1,
                last_scraped_at = GREATEST(last_scraped_at, $2),
                total_reactions = COALESCE($3, total_reactions)
            WHERE post_url = $1
            RETURNING scrape_count
            "#,
        )
        .bind(&commit.post_url)
        .bind(commit.ran_at)
        .bind(commit.reactions)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        let mut engagers_inserted = 0usize;
        if !commit.engagers.is_empty() {
            let mut profile_urls = Vec::with_capacity(commit.engagers.len());
            let mut names = Vec::with_capacity(commit.engagers.len());
            let mut headlines = Vec::with_capacity(commit.engagers.len());
            let mut kinds = Vec::with_capacity(commit.engagers.len());
            for e in &commit.engagers {
                profile_urls.push(e.profile_url.clone());
                names.push(e.name.clone());
                headlines.push(e.headline.clone());
                kinds.push(e.engagement_type.as_str().to_string());
            }

            let result = sqlx::query(
                r#"
                INSERT INTO linkedin_engagers (scrape_id, post_url, profile_url, name, headline, engagement_type)
                SELECT $1, $2, u.profile_url, u.name, u.headline, u.engagement_type
                FROM UNNEST($3::text[], $4::text[], $5::text[], $6::text[])
                    AS u(profile_url, name, headline, engagement_type)
                ON CONFLICT (profile_url, post_url) DO NOTHING
                "#,
            )
            .bind(scrape_id)
            .bind(&commit.post_url)
            .bind(&profile_urls)
            .bind(&names)
            .bind(&headlines)
            .bind(&kinds)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            engagers_inserted = result.rows_affected() as usize;
        }

        tx.commit().await.map_err(db_err)?;

        let receipt = CommitReceipt {
            scrape_id,
            scrape_count: new_count,
            engagers_inserted,
            engagers_existing: commit.engagers.len() - engagers_inserted,
        };
        debug!(post_url = %commit.post_url, status = %commit.status, ?receipt, "Scrape committed");
        Ok(receipt)
    }

    async fn scrape_events(&self, post_url: &str) -> Result<Vec<ScrapeEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, post_url, ran_at, reactions_count, cost_usd, status, error
            FROM linkedin_post_scrapes
            WHERE post_url = $1
            ORDER BY ran_at, id
            "#,
        )
        .bind(post_url)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(ScrapeEvent::from).collect())
    }

    async fn engagers_for_post(&self, post_url: &str) -> Result<Vec<Engager>> {
        let rows = sqlx::query_as::<_, EngagerRow>(&format!(
            "SELECT {ENGAGER_COLUMNS} FROM linkedin_engagers WHERE post_url = $1 ORDER BY id"
        ))
        .bind(post_url)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Engager::from).collect())
    }

    async fn profiles_needing_enrichment(&self, limit: usize) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT profile_url
            FROM linkedin_engagers
            WHERE enriched_at IS NULL AND profile_url LIKE '%/in/%'
            GROUP BY profile_url
            ORDER BY MIN(id)
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn record_enrichment(
        &self,
        profile_url: &str,
        enrichment: &ProfileEnrichment,
        enriched_at: DateTime<Utc>,
    ) -> Result<u64> {
        let enrichment = enrichment.cleaned();
        let result = if enrichment.is_empty() {
            sqlx::query(
                r#"
                UPDATE linkedin_engagers
                SET enriched_at = $2
                WHERE profile_url = $1 AND enriched_at IS NULL
                "#,
            )
            .bind(profile_url)
            .bind(enriched_at)
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE linkedin_engagers
                SET company = COALESCE($2, company),
                    title = COALESCE($3, title),
                    audience = COALESCE($4, audience),
                    enriched_at = $5
                WHERE profile_url = $1
                "#,
            )
            .bind(profile_url)
            .bind(&enrichment.company)
            .bind(&enrichment.title)
            .bind(&enrichment.audience)
            .bind(enriched_at)
            .execute(&self.pool)
            .await
        }
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn posts_needing_media(&self, limit: usize) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT post_url FROM linkedin_posts WHERE NOT enriched ORDER BY id LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn record_post_media(
        &self,
        post_url: &str,
        media: &PostMedia,
        enriched_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE linkedin_posts
            SET media_type = $2,
                duration = $3,
                mime_type = $4,
                thumbnail = $5,
                video_url = $6,
                image_url = $7,
                enriched = TRUE,
                enriched_at = $8
            WHERE post_url = $1 AND NOT enriched
            "#,
        )
        .bind(post_url)
        .bind(&media.media_type)
        .bind(media.duration)
        .bind(&media.mime_type)
        .bind(&media.thumbnail)
        .bind(&media.video_url)
        .bind(&media.image_url)
        .bind(enriched_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn post_media(&self, post_url: &str) -> Result<Option<PostMedia>> {
        let row = sqlx::query_as::<_, MediaRow>(
            r#"
            SELECT media_type, duration, mime_type, thumbnail, video_url, image_url
            FROM linkedin_posts
            WHERE post_url = $1 AND enriched
            "#,
        )
        .bind(post_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(PostMedia::from))
    }

    async fn lead_candidates(&self, limit: usize) -> Result<Vec<LeadCandidate>> {
        let rows = sqlx::query_as::<_, CandidateRow>(
            r#"
            SELECT e.id, e.post_url, p.post_name, e.profile_url, e.name, e.headline,
                   e.company, e.title, e.audience
            FROM linkedin_engagers e
            JOIN linkedin_posts p ON p.post_url = e.post_url
            WHERE NOT e.pushed_to_crm
              AND btrim(COALESCE(e.company, '')) <> ''
              AND btrim(COALESCE(e.title, '')) <> ''
              AND e.profile_url LIKE '%/in/%'
            ORDER BY e.id
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(LeadCandidate::from).collect())
    }

    async fn mark_forwarded(&self, engager_ids: &[i64], pushed_at: DateTime<Utc>) -> Result<Vec<i64>> {
        if engager_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let flipped = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE linkedin_engagers
            SET pushed_to_crm = TRUE, pushed_at = $2
            WHERE id = ANY($1) AND NOT pushed_to_crm
            RETURNING id
            "#,
        )
        .bind(engager_ids)
        .bind(pushed_at)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(flipped)
    }

    async fn audit(&self) -> Result<Vec<CountMismatch>> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT p.post_url, p.scrape_count::BIGINT, COUNT(s.id)
            FROM linkedin_posts p
            LEFT JOIN linkedin_post_scrapes s ON s.post_url = p.post_url
            GROUP BY p.post_url, p.scrape_count
            HAVING p.scrape_count <> COUNT(s.id)
            ORDER BY p.post_url
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(post_url, scrape_count, event_count)| CountMismatch {
                post_url,
                scrape_count,
                event_count,
            })
            .collect())
    }

    async fn record_cycle(&self, record: &CycleRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scrape_cycles (cycle_id, started_at, finished_at, stats)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (cycle_id) DO NOTHING
            "#,
        )
        .bind(&record.cycle_id)
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(&record.stats)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
