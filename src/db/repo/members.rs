//! Tree store, credentials, sessions, and team queries for the repository.

use crate::domain::{
    AncestorStep, LegSide, Member, MemberId, NewMember, NodeSlots, Role, TeamNode, TimeMs,
};
use crate::engine::placement::SlotLookup;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

use super::{placeholders, unique_violation_columns, Repository};

const MEMBER_COLUMNS: &str = "id, referral_code, name, email, phone, role, sponsor_id, parent_id, side, depth, plan_id, activated_at, joined_at";

/// Largest IN-list sent to SQLite in one statement.
const SLOT_QUERY_CHUNK: usize = 500;

#[derive(Debug, Error)]
pub enum InsertMemberError {
    #[error("placement slot already occupied")]
    SlotTaken,
    #[error("email already registered")]
    EmailTaken,
    #[error("referral code already in use")]
    ReferralCodeTaken,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

fn member_from_row(row: &SqliteRow) -> Member {
    let side: Option<String> = row.get("side");
    Member {
        id: MemberId::new(row.get("id")),
        referral_code: row.get("referral_code"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        role: Role::from_db(row.get::<String, _>("role").as_str()),
        sponsor_id: row.get::<Option<i64>, _>("sponsor_id").map(MemberId::new),
        parent_id: row.get::<Option<i64>, _>("parent_id").map(MemberId::new),
        side: side.as_deref().and_then(parse_side),
        depth: row.get("depth"),
        plan_id: row.get("plan_id"),
        activated_at: row.get::<Option<i64>, _>("activated_at").map(TimeMs::new),
        joined_at: TimeMs::new(row.get("joined_at")),
    }
}

fn team_node_from_row(row: &SqliteRow) -> TeamNode {
    let side: Option<String> = row.get("side");
    TeamNode {
        id: MemberId::new(row.get("id")),
        referral_code: row.get("referral_code"),
        name: row.get("name"),
        parent_id: row.get::<Option<i64>, _>("parent_id").map(MemberId::new),
        side: side.as_deref().and_then(parse_side),
        plan_id: row.get("plan_id"),
        joined_at: TimeMs::new(row.get("joined_at")),
        child_count: row.get("child_count"),
    }
}

pub(super) fn parse_side(s: &str) -> Option<LegSide> {
    LegSide::from_str(s)
        .map_err(|e| warn!(side = %s, error = %e, "Unexpected stored side"))
        .ok()
}

/// Upward walk from `member` to the root: one step per ancestor, nearest first.
pub(super) async fn ancestor_path(
    conn: &mut SqliteConnection,
    member: MemberId,
) -> Result<Vec<AncestorStep>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        WITH RECURSIVE chain(id, parent_id, side, hop) AS (
            SELECT id, parent_id, side, 0 FROM members WHERE id = ?
            UNION ALL
            SELECT m.id, m.parent_id, m.side, chain.hop + 1
            FROM members m JOIN chain ON m.id = chain.parent_id
        )
        SELECT parent_id, side FROM chain
        WHERE parent_id IS NOT NULL
        ORDER BY hop ASC
        "#,
    )
    .bind(member.as_i64())
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let side: String = row.get("side");
            parse_side(&side).map(|side| AncestorStep {
                ancestor: MemberId::new(row.get("parent_id")),
                side,
            })
        })
        .collect())
}

impl Repository {
    // =========================================================================
    // Tree store
    // =========================================================================

    /// Create a member together with its carry, wallet, and KYC rows.
    ///
    /// Either all rows are written or none. A concurrent insert into the same
    /// `(parent, side)` slot surfaces as [`InsertMemberError::SlotTaken`].
    pub async fn insert_member_atomic(
        &self,
        new: &NewMember,
    ) -> Result<MemberId, InsertMemberError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO members (
                referral_code, name, email, phone, password_hash, password_salt, role,
                sponsor_id, parent_id, side, depth, joined_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.referral_code)
        .bind(&new.name)
        .bind(&new.email)
        .bind(new.phone.as_deref())
        .bind(&new.password_hash)
        .bind(&new.password_salt)
        .bind(new.role.as_str())
        .bind(new.sponsor_id.map(|id| id.as_i64()))
        .bind(new.placement.map(|p| p.parent.as_i64()))
        .bind(new.placement.map(|p| p.side.as_str()))
        .bind(new.placement.map(|p| p.depth).unwrap_or(0))
        .bind(new.joined_at.as_ms())
        .execute(&mut *tx)
        .await
        .map_err(|e| match unique_violation_columns(&e) {
            Some(cols) if cols.contains("members.parent_id") => InsertMemberError::SlotTaken,
            Some(cols) if cols.contains("members.email") => InsertMemberError::EmailTaken,
            Some(cols) if cols.contains("members.referral_code") => {
                InsertMemberError::ReferralCodeTaken
            }
            _ => InsertMemberError::Db(e),
        })?;

        let id = result.last_insert_rowid();

        sqlx::query("INSERT INTO carry_balances (member_id) VALUES (?)")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO wallets (member_id) VALUES (?)")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO kyc_records (member_id) VALUES (?)")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(MemberId::new(id))
    }

    pub async fn get_member(&self, id: MemberId) -> Result<Option<Member>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {} FROM members WHERE id = ?", MEMBER_COLUMNS))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(member_from_row))
    }

    pub async fn get_member_by_referral_code(
        &self,
        code: &str,
    ) -> Result<Option<Member>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM members WHERE referral_code = ?",
            MEMBER_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(member_from_row))
    }

    pub async fn count_members(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM members")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Ancestors of `member`, nearest first, with the side each was reached through.
    pub async fn ancestor_path(&self, member: MemberId) -> Result<Vec<AncestorStep>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        ancestor_path(&mut conn, member).await
    }

    /// True when `node` is `root` or lies anywhere below it.
    pub async fn is_in_subtree(&self, root: MemberId, node: MemberId) -> Result<bool, sqlx::Error> {
        if root == node {
            return Ok(true);
        }
        let path = self.ancestor_path(node).await?;
        Ok(path.iter().any(|step| step.ancestor == root))
    }

    // =========================================================================
    // Team views
    // =========================================================================

    /// Immediate children of `parent`, left before right.
    pub async fn query_children(&self, parent: MemberId) -> Result<Vec<TeamNode>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.referral_code, m.name, m.parent_id, m.side, m.plan_id, m.joined_at,
                   (SELECT COUNT(*) FROM members c WHERE c.parent_id = m.id) AS child_count
            FROM members m
            WHERE m.parent_id = ?
            ORDER BY CASE m.side WHEN 'left' THEN 0 ELSE 1 END
            "#,
        )
        .bind(parent.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(team_node_from_row).collect())
    }

    /// Nodes of the subtree rooted at `root`, down to `max_level` levels below it.
    ///
    /// Returns `(node, level)` pairs ordered by level, root first.
    pub async fn query_subtree(
        &self,
        root: MemberId,
        max_level: u32,
    ) -> Result<Vec<(TeamNode, u32)>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            WITH RECURSIVE sub(id, lvl) AS (
                SELECT id, 0 FROM members WHERE id = ?
                UNION ALL
                SELECT m.id, sub.lvl + 1 FROM members m JOIN sub ON m.parent_id = sub.id
                WHERE sub.lvl < ?
            )
            SELECT m.id, m.referral_code, m.name, m.parent_id, m.side, m.plan_id, m.joined_at,
                   (SELECT COUNT(*) FROM members c WHERE c.parent_id = m.id) AS child_count,
                   sub.lvl AS lvl
            FROM sub JOIN members m ON m.id = sub.id
            ORDER BY sub.lvl ASC, m.id ASC
            "#,
        )
        .bind(root.as_i64())
        .bind(max_level as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (team_node_from_row(row), row.get::<i64, _>("lvl") as u32))
            .collect())
    }

    /// `(total, active)` member counts in `member`'s `side` leg.
    pub async fn leg_counts(
        &self,
        member: MemberId,
        side: LegSide,
    ) -> Result<(i64, i64), sqlx::Error> {
        let row = sqlx::query(
            r#"
            WITH RECURSIVE sub(id) AS (
                SELECT id FROM members WHERE parent_id = ? AND side = ?
                UNION ALL
                SELECT m.id FROM members m JOIN sub ON m.parent_id = sub.id
            )
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(CASE WHEN m.plan_id IS NOT NULL THEN 1 ELSE 0 END), 0) AS active
            FROM sub JOIN members m ON m.id = sub.id
            "#,
        )
        .bind(member.as_i64())
        .bind(side.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok((row.get("total"), row.get("active")))
    }

    // =========================================================================
    // Credentials and sessions
    // =========================================================================

    /// Member plus stored `(password_hash, password_salt)` for `email`.
    pub async fn get_credentials(
        &self,
        email: &str,
    ) -> Result<Option<(Member, String, String)>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {}, password_hash, password_salt FROM members WHERE email = ?",
            MEMBER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            (
                member_from_row(&r),
                r.get("password_hash"),
                r.get("password_salt"),
            )
        }))
    }

    pub async fn insert_session(
        &self,
        token: &str,
        member: MemberId,
        created_at: TimeMs,
        expires_at: TimeMs,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO sessions (token, member_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(token)
        .bind(member.as_i64())
        .bind(created_at.as_ms())
        .bind(expires_at.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Member owning an unexpired session token.
    pub async fn get_session_member(
        &self,
        token: &str,
        now: TimeMs,
    ) -> Result<Option<Member>, sqlx::Error> {
        let columns = MEMBER_COLUMNS
            .split(", ")
            .map(|c| format!("m.{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        let row = sqlx::query(&format!(
            "SELECT {} FROM sessions s JOIN members m ON m.id = s.member_id WHERE s.token = ? AND s.expires_at > ?",
            columns
        ))
        .bind(token)
        .bind(now.as_ms())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(member_from_row))
    }
}

#[async_trait]
impl SlotLookup for Repository {
    async fn depth_of(&self, id: MemberId) -> Result<Option<i64>, sqlx::Error> {
        let row = sqlx::query("SELECT depth FROM members WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("depth")))
    }

    async fn node_slots(
        &self,
        ids: &[MemberId],
    ) -> Result<HashMap<MemberId, NodeSlots>, sqlx::Error> {
        let mut slots: HashMap<MemberId, NodeSlots> =
            ids.iter().map(|id| (*id, NodeSlots::default())).collect();

        for chunk in ids.chunks(SLOT_QUERY_CHUNK) {
            let sql = format!(
                "SELECT id, parent_id, side FROM members WHERE parent_id IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id.as_i64());
            }
            let rows = query.fetch_all(&self.pool).await?;

            for row in rows {
                let parent = MemberId::new(row.get("parent_id"));
                let side: String = row.get("side");
                if let (Some(side), Some(entry)) = (parse_side(&side), slots.get_mut(&parent)) {
                    entry.set(side, MemberId::new(row.get("id")));
                }
            }
        }

        Ok(slots)
    }
}
