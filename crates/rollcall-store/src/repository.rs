//! Member repository for PostgreSQL.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rollcall_core::error::AppError;
use rollcall_core::models::{EnrichmentCandidate, Member, PresenceStatus, StrategyKind};
use rollcall_core::traits::MemberStore;
use sqlx::{PgPool, Pool, Postgres};
use tracing::debug;

// Kept as a const literal since format!() bypasses sqlx validation.
const ALL_MEMBERS_QUERY: &str = "SELECT member_id, username, first_name, last_name, phone, \
is_bot, is_deleted, is_premium, is_verified, is_restricted, is_scam, is_fake, lang_code, \
status, bio, joined_at, discovered_via FROM members WHERE channel_id = $1 \
ORDER BY first_seen_at ASC, member_id ASC";

/// Row shape shared by all member SELECTs.
#[derive(sqlx::FromRow)]
struct MemberRow {
    member_id: i64,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
    is_bot: bool,
    is_deleted: bool,
    is_premium: bool,
    is_verified: bool,
    is_restricted: bool,
    is_scam: bool,
    is_fake: bool,
    lang_code: Option<String>,
    status: String,
    bio: Option<String>,
    joined_at: Option<DateTime<Utc>>,
    discovered_via: String,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Member {
            id: row.member_id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            is_bot: row.is_bot,
            is_deleted: row.is_deleted,
            is_premium: row.is_premium,
            is_verified: row.is_verified,
            is_restricted: row.is_restricted,
            is_scam: row.is_scam,
            is_fake: row.is_fake,
            lang_code: row.lang_code,
            status: PresenceStatus::from_token(Some(&row.status)),
            bio: row.bio,
            joined_at: row.joined_at,
            // Rows written before a strategy existed fall back to the
            // primary walk.
            discovered_via: row
                .discovered_via
                .parse()
                .unwrap_or(StrategyKind::FullWalk),
        }
    }
}

/// Repository for member persistence in PostgreSQL.
///
/// # Examples
///
/// ```no_run
/// use sqlx::postgres::PgPoolOptions;
/// use rollcall_store::MemberRepository;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://localhost/rollcall")
///     .await?;
///
/// let repo = MemberRepository::new(pool);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemberRepository {
    pool: Pool<Postgres>,
}

impl MemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl MemberStore for MemberRepository {
    async fn existing_ids(&self, channel_id: i64) -> Result<HashSet<i64>, AppError> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT member_id FROM members WHERE channel_id = $1")
                .bind(channel_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Writes one batch inside a transaction.
    ///
    /// Existing rows only have their still-NULL optionals filled and their
    /// `last_seen_at` bumped; flags, status, and provenance stay with the
    /// first writer.
    async fn upsert_batch(&self, members: &[Member], channel_id: i64) -> Result<usize, AppError> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut affected = 0usize;

        for member in members {
            let result = sqlx::query(
                r#"
                INSERT INTO members (
                    channel_id, member_id, username, first_name, last_name,
                    phone, is_bot, is_deleted, is_premium, is_verified,
                    is_restricted, is_scam, is_fake, lang_code, status,
                    bio, joined_at, discovered_via
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                        $11, $12, $13, $14, $15, $16, $17, $18)
                ON CONFLICT (channel_id, member_id)
                DO UPDATE SET
                    username = COALESCE(members.username, EXCLUDED.username),
                    first_name = COALESCE(members.first_name, EXCLUDED.first_name),
                    last_name = COALESCE(members.last_name, EXCLUDED.last_name),
                    phone = COALESCE(members.phone, EXCLUDED.phone),
                    lang_code = COALESCE(members.lang_code, EXCLUDED.lang_code),
                    bio = COALESCE(members.bio, EXCLUDED.bio),
                    joined_at = COALESCE(members.joined_at, EXCLUDED.joined_at),
                    last_seen_at = NOW()
                "#,
            )
            .bind(channel_id)
            .bind(member.id)
            .bind(&member.username)
            .bind(&member.first_name)
            .bind(&member.last_name)
            .bind(&member.phone)
            .bind(member.is_bot)
            .bind(member.is_deleted)
            .bind(member.is_premium)
            .bind(member.is_verified)
            .bind(member.is_restricted)
            .bind(member.is_scam)
            .bind(member.is_fake)
            .bind(&member.lang_code)
            .bind(member.status.as_str())
            .bind(&member.bio)
            .bind(member.joined_at)
            .bind(member.discovered_via.as_str())
            .execute(&mut *tx)
            .await?;

            affected += result.rows_affected() as usize;
        }

        tx.commit().await?;
        debug!(channel_id, batch_len = members.len(), affected, "Batch upserted");
        Ok(affected)
    }

    async fn needing_enrichment(
        &self,
        channel_id: i64,
    ) -> Result<Vec<EnrichmentCandidate>, AppError> {
        let rows: Vec<(i64, bool, bool, Option<String>, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
            SELECT member_id, is_bot, is_deleted, bio, joined_at
            FROM members
            WHERE channel_id = $1 AND (bio IS NULL OR joined_at IS NULL)
            ORDER BY first_seen_at ASC, member_id ASC
            "#,
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(member_id, is_bot, is_deleted, bio, joined_at)| EnrichmentCandidate {
                    member_id,
                    is_bot,
                    is_deleted,
                    bio,
                    joined_at,
                },
            )
            .collect())
    }

    /// Fills still-NULL enrichment fields. A row already carrying both
    /// values is left untouched and reported as not updated.
    async fn update_enrichment(
        &self,
        member_id: i64,
        channel_id: i64,
        bio: Option<&str>,
        joined_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE members
            SET bio = COALESCE(members.bio, $3),
                joined_at = COALESCE(members.joined_at, $4)
            WHERE channel_id = $1 AND member_id = $2
              AND ((members.bio IS NULL AND $3 IS NOT NULL)
                   OR (members.joined_at IS NULL AND $4 IS NOT NULL))
            "#,
        )
        .bind(channel_id)
        .bind(member_id)
        .bind(bio)
        .bind(joined_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, channel_id: i64) -> Result<i64, AppError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM members WHERE channel_id = $1")
            .bind(channel_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn all_members(&self, channel_id: i64) -> Result<Vec<Member>, AppError> {
        let rows: Vec<MemberRow> = sqlx::query_as(ALL_MEMBERS_QUERY)
            .bind(channel_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Member::from).collect())
    }

    async fn delete_channel_members(&self, channel_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM members WHERE channel_id = $1")
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
