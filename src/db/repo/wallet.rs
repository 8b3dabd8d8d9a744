//! Wallet balances, the wallet ledger, and withdrawals for the repository.

use crate::domain::{
    BankDetails, Decimal, MemberId, ReviewStatus, TimeMs, TransactionKind, WalletBalance,
    WalletTransaction, WithdrawalRequest,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use tracing::warn;

use super::{decimal_column, Repository, ReviewTransition};

const WITHDRAWAL_COLUMNS: &str = "id, member_id, amount, account_holder, account_number, ifsc, bank_name, status, reason, approver_id, requested_at, processed_at";

fn wallet_from_row(row: &SqliteRow) -> Result<WalletBalance, sqlx::Error> {
    Ok(WalletBalance {
        available: decimal_column(row, "available")?,
        held: decimal_column(row, "held")?,
        total_earned: decimal_column(row, "total_earned")?,
        version: row.get("version"),
    })
}

fn withdrawal_from_row(row: &SqliteRow) -> Result<WithdrawalRequest, sqlx::Error> {
    let status: String = row.get("status");
    Ok(WithdrawalRequest {
        id: row.get("id"),
        member_id: MemberId::new(row.get("member_id")),
        amount: decimal_column(row, "amount")?,
        bank: BankDetails {
            account_holder: row.get("account_holder"),
            account_number: row.get("account_number"),
            ifsc: row.get("ifsc"),
            bank_name: row.get("bank_name"),
        },
        status: ReviewStatus::parse(&status).unwrap_or_else(|| {
            warn!(status = %status, "Unexpected stored withdrawal status");
            ReviewStatus::Pending
        }),
        reason: row.get("reason"),
        approver_id: row.get::<Option<i64>, _>("approver_id").map(MemberId::new),
        requested_at: TimeMs::new(row.get("requested_at")),
        processed_at: row.get::<Option<i64>, _>("processed_at").map(TimeMs::new),
    })
}

fn transaction_from_row(row: &SqliteRow) -> Result<Option<WalletTransaction>, sqlx::Error> {
    let kind: String = row.get("kind");
    let Some(parsed) = TransactionKind::from_db(&kind) else {
        warn!(kind = %kind, "Skipping wallet transaction with unknown kind");
        return Ok(None);
    };
    Ok(Some(WalletTransaction {
        id: row.get("id"),
        member_id: MemberId::new(row.get("member_id")),
        kind: parsed,
        amount: decimal_column(row, "amount")?,
        reference: row.get("reference"),
        time_ms: TimeMs::new(row.get("created_at")),
    }))
}

async fn load_wallet(
    conn: &mut SqliteConnection,
    member: MemberId,
) -> Result<Option<WalletBalance>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT available, held, total_earned, version FROM wallets WHERE member_id = ?",
    )
    .bind(member.as_i64())
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(wallet_from_row).transpose()
}

async fn store_wallet(
    conn: &mut SqliteConnection,
    member: MemberId,
    wallet: &WalletBalance,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE wallets SET available = ?, held = ?, total_earned = ?, version = version + 1
        WHERE member_id = ?
        "#,
    )
    .bind(wallet.available.to_canonical_string())
    .bind(wallet.held.to_canonical_string())
    .bind(wallet.total_earned.to_canonical_string())
    .bind(member.as_i64())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Add matching income to `member`'s wallet inside a transaction that already
/// holds the write lock.
pub(super) async fn credit_wallet(
    conn: &mut SqliteConnection,
    member: MemberId,
    amount: Decimal,
) -> Result<(), sqlx::Error> {
    let mut wallet = load_wallet(conn, member)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    wallet.available = wallet.available + amount;
    wallet.total_earned = wallet.total_earned + amount;
    store_wallet(conn, member, &wallet).await
}

pub(super) async fn insert_wallet_transaction(
    conn: &mut SqliteConnection,
    member: MemberId,
    kind: TransactionKind,
    amount: Decimal,
    reference: &str,
    now: TimeMs,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO wallet_transactions (member_id, kind, amount, reference, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(member.as_i64())
    .bind(kind.as_str())
    .bind(amount.to_canonical_string())
    .bind(reference)
    .bind(now.as_ms())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl Repository {
    // =========================================================================
    // Wallets
    // =========================================================================

    pub async fn get_wallet(&self, member: MemberId) -> Result<Option<WalletBalance>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        load_wallet(&mut conn, member).await
    }

    pub async fn query_wallet_transactions(
        &self,
        member: MemberId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WalletTransaction>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, member_id, kind, amount, reference, created_at
            FROM wallet_transactions
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
        rows.iter()
            .map(transaction_from_row)
            .filter_map(Result::transpose)
            .collect()
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    /// Move `amount` from available to held and record a pending withdrawal.
    ///
    /// `expected` is the wallet snapshot the caller validated against; returns
    /// None without writing if the wallet changed since.
    pub async fn hold_for_withdrawal_atomic(
        &self,
        member: MemberId,
        amount: Decimal,
        bank: &BankDetails,
        expected: &WalletBalance,
        now: TimeMs,
    ) -> Result<Option<WithdrawalRequest>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let swapped = sqlx::query(
            r#"
            UPDATE wallets SET available = ?, held = ?, version = version + 1
            WHERE member_id = ? AND version = ?
            "#,
        )
        .bind((expected.available - amount).to_canonical_string())
        .bind((expected.held + amount).to_canonical_string())
        .bind(member.as_i64())
        .bind(expected.version)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !swapped {
            tx.rollback().await?;
            return Ok(None);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO withdrawals (
                member_id, amount, account_holder, account_number, ifsc, bank_name, status, requested_at
            ) VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(member.as_i64())
        .bind(amount.to_canonical_string())
        .bind(&bank.account_holder)
        .bind(&bank.account_number)
        .bind(&bank.ifsc)
        .bind(&bank.bank_name)
        .bind(now.as_ms())
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        insert_wallet_transaction(
            &mut tx,
            member,
            TransactionKind::WithdrawalHold,
            amount,
            &format!("withdrawal:{}", id),
            now,
        )
        .await?;

        tx.commit().await?;

        Ok(Some(WithdrawalRequest {
            id,
            member_id: member,
            amount,
            bank: bank.clone(),
            status: ReviewStatus::Pending,
            reason: None,
            approver_id: None,
            requested_at: now,
            processed_at: None,
        }))
    }

    /// Mark a pending withdrawal paid and release its hold.
    pub async fn approve_withdrawal_atomic(
        &self,
        id: i64,
        approver: MemberId,
        now: TimeMs,
    ) -> Result<ReviewTransition<WithdrawalRequest>, sqlx::Error> {
        self.close_withdrawal(id, approver, ReviewStatus::Approved, None, now)
            .await
    }

    /// Reject a pending withdrawal and return the held funds to available.
    pub async fn reject_withdrawal_atomic(
        &self,
        id: i64,
        approver: MemberId,
        reason: Option<&str>,
        now: TimeMs,
    ) -> Result<ReviewTransition<WithdrawalRequest>, sqlx::Error> {
        self.close_withdrawal(id, approver, ReviewStatus::Rejected, reason, now)
            .await
    }

    async fn close_withdrawal(
        &self,
        id: i64,
        approver: MemberId,
        status: ReviewStatus,
        reason: Option<&str>,
        now: TimeMs,
    ) -> Result<ReviewTransition<WithdrawalRequest>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE withdrawals SET status = ?, reason = ?, approver_id = ?, processed_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(reason)
        .bind(approver.as_i64())
        .bind(now.as_ms())
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(match self.get_withdrawal(id).await? {
                Some(_) => ReviewTransition::AlreadyProcessed,
                None => ReviewTransition::NotFound,
            });
        }

        let row = sqlx::query(&format!(
            "SELECT {} FROM withdrawals WHERE id = ?",
            WITHDRAWAL_COLUMNS
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        let withdrawal = withdrawal_from_row(&row)?;

        let Some(mut wallet) = load_wallet(&mut tx, withdrawal.member_id).await? else {
            tx.rollback().await?;
            return Ok(ReviewTransition::Inconsistent(format!(
                "wallet missing for member {}",
                withdrawal.member_id
            )));
        };
        if wallet.held < withdrawal.amount {
            tx.rollback().await?;
            return Ok(ReviewTransition::Inconsistent(format!(
                "held balance {} is below withdrawal amount {}",
                wallet.held, withdrawal.amount
            )));
        }

        wallet.held = wallet.held - withdrawal.amount;
        let kind = if status == ReviewStatus::Approved {
            TransactionKind::WithdrawalPaid
        } else {
            wallet.available = wallet.available + withdrawal.amount;
            TransactionKind::WithdrawalRelease
        };
        store_wallet(&mut tx, withdrawal.member_id, &wallet).await?;
        insert_wallet_transaction(
            &mut tx,
            withdrawal.member_id,
            kind,
            withdrawal.amount,
            &format!("withdrawal:{}", id),
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(ReviewTransition::Applied(withdrawal))
    }

    pub async fn get_withdrawal(&self, id: i64) -> Result<Option<WithdrawalRequest>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM withdrawals WHERE id = ?",
            WITHDRAWAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(withdrawal_from_row).transpose()
    }

    /// A member's withdrawals, newest first.
    pub async fn query_withdrawals(
        &self,
        member: MemberId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WithdrawalRequest>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM withdrawals WHERE member_id = ? ORDER BY requested_at DESC, id DESC LIMIT ? OFFSET ?",
            WITHDRAWAL_COLUMNS
        ))
        .bind(member.as_i64())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(withdrawal_from_row).collect()
    }

    /// All withdrawals, optionally filtered by status, oldest first.
    pub async fn query_withdrawals_by_status(
        &self,
        status: Option<ReviewStatus>,
    ) -> Result<Vec<WithdrawalRequest>, sqlx::Error> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM withdrawals WHERE status = ? ORDER BY requested_at ASC, id ASC",
                    WITHDRAWAL_COLUMNS
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM withdrawals ORDER BY requested_at ASC, id ASC",
                    WITHDRAWAL_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(withdrawal_from_row).collect()
    }
}
