//! Plans, PV accumulation, carry balances, and matching payouts for the repository.

use crate::domain::{
    AncestorStep, CarryBalance, Decimal, LegSide, MatchingPayout, MemberId, Plan, TimeMs,
    TopUpRequest, TransactionKind,
};
use crate::engine::{plan_credits, AccumulationError, MatchOutcome};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::members::ancestor_path;
use super::review::topup_from_row;
use super::wallet::{credit_wallet, insert_wallet_transaction};
use super::{decimal_column, unique_violation_columns, Repository, ReviewTransition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// Credits were written for these ancestors, nearest first.
    Applied { credited: Vec<AncestorStep> },
    /// The event key was seen before; nothing was written.
    AlreadyApplied,
}

fn plan_from_row(row: &SqliteRow) -> Result<Plan, sqlx::Error> {
    Ok(Plan {
        id: row.get("id"),
        name: row.get("name"),
        price: decimal_column(row, "price")?,
        pv: row.get("pv"),
        matching_rate: decimal_column(row, "matching_rate")?,
    })
}

fn payout_from_row(row: &SqliteRow) -> Result<MatchingPayout, sqlx::Error> {
    Ok(MatchingPayout {
        member_id: MemberId::new(row.get("member_id")),
        matched_pv: row.get("matched_pv"),
        rate: decimal_column(row, "rate")?,
        amount: decimal_column(row, "amount")?,
        left_after: row.get("left_after"),
        right_after: row.get("right_after"),
        carry_version: row.get("carry_version"),
        time_ms: TimeMs::new(row.get("created_at")),
    })
}

fn accumulation_to_db(err: AccumulationError) -> sqlx::Error {
    sqlx::Error::Protocol(err.to_string())
}

/// Credit `pv` to every ancestor of `member` inside an open transaction.
///
/// Ledger rows are keyed by `(event_key, ancestor)`; a row that already exists is
/// skipped together with its carry credit.
async fn credit_ancestors(
    conn: &mut SqliteConnection,
    member: MemberId,
    pv: i64,
    event_key: &str,
    now: TimeMs,
) -> Result<Vec<AncestorStep>, sqlx::Error> {
    let path = ancestor_path(conn, member).await?;
    let entries = plan_credits(member, pv, event_key, &path, now).map_err(accumulation_to_db)?;

    let mut credited = Vec::with_capacity(entries.len());
    for entry in &entries {
        let inserted = sqlx::query(
            r#"
            INSERT INTO pv_ledger (member_id, side, amount, source_event, source_member_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_event, member_id) DO NOTHING
            "#,
        )
        .bind(entry.member_id.as_i64())
        .bind(entry.side.as_str())
        .bind(entry.amount)
        .bind(&entry.source_event)
        .bind(entry.source_member_id.as_i64())
        .bind(entry.time_ms.as_ms())
        .execute(&mut *conn)
        .await?
        .rows_affected()
            > 0;

        if !inserted {
            continue;
        }

        let sql = match entry.side {
            LegSide::Left => {
                "UPDATE carry_balances SET left_carry = left_carry + ?, version = version + 1 WHERE member_id = ?"
            }
            LegSide::Right => {
                "UPDATE carry_balances SET right_carry = right_carry + ?, version = version + 1 WHERE member_id = ?"
            }
        };
        sqlx::query(sql)
            .bind(entry.amount)
            .bind(entry.member_id.as_i64())
            .execute(&mut *conn)
            .await?;

        credited.push(AncestorStep {
            ancestor: entry.member_id,
            side: entry.side,
        });
    }

    Ok(credited)
}

impl Repository {
    // =========================================================================
    // Plans
    // =========================================================================

    pub async fn list_plans(&self) -> Result<Vec<Plan>, sqlx::Error> {
        let rows = sqlx::query("SELECT id, name, price, pv, matching_rate FROM plans ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(plan_from_row).collect()
    }

    pub async fn get_plan(&self, id: i64) -> Result<Option<Plan>, sqlx::Error> {
        let row = sqlx::query("SELECT id, name, price, pv, matching_rate FROM plans WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(plan_from_row).transpose()
    }

    /// Add a plan to the catalogue. None when the name is already taken.
    pub async fn insert_plan(
        &self,
        name: &str,
        price: Decimal,
        pv: i64,
        matching_rate: Decimal,
    ) -> Result<Option<Plan>, sqlx::Error> {
        let inserted = sqlx::query(
            "INSERT INTO plans (name, price, pv, matching_rate) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(price.to_canonical_string())
        .bind(pv)
        .bind(matching_rate.to_canonical_string())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(result) => Ok(Some(Plan {
                id: result.last_insert_rowid(),
                name: name.to_string(),
                price,
                pv,
                matching_rate,
            })),
            Err(e) => match unique_violation_columns(&e) {
                Some(cols) if cols.contains("plans.name") => Ok(None),
                _ => Err(e),
            },
        }
    }

    /// Matching rate of `member`'s active plan; None while the member is inactive.
    pub async fn get_matching_rate(&self, member: MemberId) -> Result<Option<Decimal>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT p.matching_rate
            FROM members m JOIN plans p ON p.id = m.plan_id
            WHERE m.id = ?
            "#,
        )
        .bind(member.as_i64())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| decimal_column(&r, "matching_rate")).transpose()
    }

    // =========================================================================
    // PV accumulation
    // =========================================================================

    /// Apply an activation of `pv` by `member` to every ancestor in one transaction.
    ///
    /// `event_key` identifies the activation; replays return
    /// [`ActivationOutcome::AlreadyApplied`] without writing anything.
    pub async fn apply_activation_atomic(
        &self,
        member: MemberId,
        pv: i64,
        event_key: &str,
        now: TimeMs,
    ) -> Result<ActivationOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let fresh = sqlx::query(
            r#"
            INSERT INTO activations (event_key, member_id, pv, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(event_key) DO NOTHING
            "#,
        )
        .bind(event_key)
        .bind(member.as_i64())
        .bind(pv)
        .bind(now.as_ms())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !fresh {
            tx.rollback().await?;
            return Ok(ActivationOutcome::AlreadyApplied);
        }

        let credited = credit_ancestors(&mut tx, member, pv, event_key, now).await?;
        tx.commit().await?;

        Ok(ActivationOutcome::Applied { credited })
    }

    /// Approve a pending top-up, activate the member's plan, and credit the plan's
    /// PV up the tree, all in one transaction.
    pub async fn activate_topup_atomic(
        &self,
        topup_id: i64,
        reviewer: MemberId,
        now: TimeMs,
    ) -> Result<ReviewTransition<(TopUpRequest, Plan, ActivationOutcome)>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE topups SET status = 'approved', reviewer_id = ?, processed_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(reviewer.as_i64())
        .bind(now.as_ms())
        .bind(topup_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(match self.get_topup(topup_id).await? {
                Some(_) => ReviewTransition::AlreadyProcessed,
                None => ReviewTransition::NotFound,
            });
        }

        let row = sqlx::query(
            r#"
            SELECT id, member_id, plan_id, amount, payment_reference, status, reason,
                   reviewer_id, requested_at, processed_at
            FROM topups WHERE id = ?
            "#,
        )
        .bind(topup_id)
        .fetch_one(&mut *tx)
        .await?;
        let topup = topup_from_row(&row)?;

        let plan_row =
            sqlx::query("SELECT id, name, price, pv, matching_rate FROM plans WHERE id = ?")
                .bind(topup.plan_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(plan) = plan_row.as_ref().map(plan_from_row).transpose()? else {
            tx.rollback().await?;
            return Ok(ReviewTransition::Inconsistent(format!(
                "top-up {} references missing plan {}",
                topup_id, topup.plan_id
            )));
        };

        sqlx::query(
            "UPDATE members SET plan_id = ?, activated_at = COALESCE(activated_at, ?) WHERE id = ?",
        )
        .bind(plan.id)
        .bind(now.as_ms())
        .bind(topup.member_id.as_i64())
        .execute(&mut *tx)
        .await?;

        let event_key = topup.activation_event_key();
        let fresh = sqlx::query(
            r#"
            INSERT INTO activations (event_key, member_id, pv, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(event_key) DO NOTHING
            "#,
        )
        .bind(&event_key)
        .bind(topup.member_id.as_i64())
        .bind(plan.pv)
        .bind(now.as_ms())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        let outcome = if fresh {
            let credited =
                credit_ancestors(&mut tx, topup.member_id, plan.pv, &event_key, now).await?;
            ActivationOutcome::Applied { credited }
        } else {
            ActivationOutcome::AlreadyApplied
        };

        tx.commit().await?;
        Ok(ReviewTransition::Applied((topup, plan, outcome)))
    }

    // =========================================================================
    // Carry balances and matching
    // =========================================================================

    pub async fn get_carry(&self, member: MemberId) -> Result<Option<CarryBalance>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT left_carry, right_carry, version FROM carry_balances WHERE member_id = ?",
        )
        .bind(member.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| CarryBalance {
            left: r.get("left_carry"),
            right: r.get("right_carry"),
            version: r.get("version"),
        }))
    }

    /// Persist a match computed from the carry snapshot at `outcome.expected_version`.
    ///
    /// Returns false without writing if the carry changed since the snapshot.
    pub async fn commit_match_atomic(
        &self,
        member: MemberId,
        outcome: &MatchOutcome,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let swapped = sqlx::query(
            r#"
            UPDATE carry_balances
            SET left_carry = ?, right_carry = ?, version = version + 1
            WHERE member_id = ? AND version = ?
            "#,
        )
        .bind(outcome.left_after)
        .bind(outcome.right_after)
        .bind(member.as_i64())
        .bind(outcome.expected_version)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !swapped {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO matching_payouts (
                member_id, matched_pv, rate, amount, left_after, right_after, carry_version, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(member.as_i64())
        .bind(outcome.matched_pv)
        .bind(outcome.rate.to_canonical_string())
        .bind(outcome.payout.to_canonical_string())
        .bind(outcome.left_after)
        .bind(outcome.right_after)
        .bind(outcome.expected_version)
        .bind(now.as_ms())
        .execute(&mut *tx)
        .await?;

        credit_wallet(&mut tx, member, outcome.payout).await?;
        insert_wallet_transaction(
            &mut tx,
            member,
            TransactionKind::MatchingIncome,
            outcome.payout,
            &format!("matching:{}:{}", member, outcome.expected_version),
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Members whose legs both hold unmatched PV.
    pub async fn query_matchable_members(&self) -> Result<Vec<MemberId>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT member_id FROM carry_balances
            WHERE left_carry > 0 AND right_carry > 0
            ORDER BY member_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| MemberId::new(r.get("member_id")))
            .collect())
    }

    pub async fn query_payouts(
        &self,
        member: MemberId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MatchingPayout>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT member_id, matched_pv, rate, amount, left_after, right_after, carry_version, created_at
            FROM matching_payouts
            WHERE member_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(member.as_i64())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(payout_from_row).collect()
    }

    /// Total PV ever credited to `member`'s `side` leg.
    pub async fn sum_pv_credited(&self, member: MemberId, side: LegSide) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0) AS total FROM pv_ledger WHERE member_id = ? AND side = ?",
        )
        .bind(member.as_i64())
        .bind(side.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("total"))
    }

    /// Lifetime `(matched_pv, income)` for `member`.
    ///
    /// Income is summed in Rust; SQLite's SUM over TEXT would go through REAL.
    pub async fn matching_totals(&self, member: MemberId) -> Result<(i64, Decimal), sqlx::Error> {
        let rows = sqlx::query("SELECT matched_pv, amount FROM matching_payouts WHERE member_id = ?")
            .bind(member.as_i64())
            .fetch_all(&self.pool)
            .await?;

        let mut matched = 0i64;
        let mut income = Decimal::zero();
        for row in rows {
            matched += row.get::<i64, _>("matched_pv");
            income = income + decimal_column(&row, "amount")?;
        }
        Ok((matched, income))
    }
}
