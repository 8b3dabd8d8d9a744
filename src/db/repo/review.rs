//! KYC records and top-up requests for the repository.

use crate::domain::{
    BankDetails, Decimal, KycDocuments, KycRecord, KycStatus, MemberId, ReviewStatus, TimeMs,
    TopUpRequest,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::warn;

use super::{decimal_column, unique_violation_columns, Repository, ReviewTransition};

const KYC_COLUMNS: &str = "member_id, status, pan_number, aadhaar_number, account_holder, account_number, ifsc, bank_name, remarks, reviewer_id, submitted_at, reviewed_at";
const TOPUP_COLUMNS: &str = "id, member_id, plan_id, amount, payment_reference, status, reason, reviewer_id, requested_at, processed_at";

fn kyc_from_row(row: &SqliteRow) -> KycRecord {
    let status: String = row.get("status");
    let pan_number: Option<String> = row.get("pan_number");
    let documents = pan_number.map(|pan_number| KycDocuments {
        pan_number,
        aadhaar_number: row.get::<Option<String>, _>("aadhaar_number").unwrap_or_default(),
        bank: BankDetails {
            account_holder: row.get::<Option<String>, _>("account_holder").unwrap_or_default(),
            account_number: row.get::<Option<String>, _>("account_number").unwrap_or_default(),
            ifsc: row.get::<Option<String>, _>("ifsc").unwrap_or_default(),
            bank_name: row.get::<Option<String>, _>("bank_name").unwrap_or_default(),
        },
    });

    KycRecord {
        member_id: MemberId::new(row.get("member_id")),
        status: KycStatus::parse(&status).unwrap_or_else(|| {
            warn!(status = %status, "Unexpected stored KYC status");
            KycStatus::NotSubmitted
        }),
        documents,
        remarks: row.get("remarks"),
        reviewer_id: row.get::<Option<i64>, _>("reviewer_id").map(MemberId::new),
        submitted_at: row.get::<Option<i64>, _>("submitted_at").map(TimeMs::new),
        reviewed_at: row.get::<Option<i64>, _>("reviewed_at").map(TimeMs::new),
    }
}

pub(super) fn topup_from_row(row: &SqliteRow) -> Result<TopUpRequest, sqlx::Error> {
    let status: String = row.get("status");
    Ok(TopUpRequest {
        id: row.get("id"),
        member_id: MemberId::new(row.get("member_id")),
        plan_id: row.get("plan_id"),
        amount: decimal_column(row, "amount")?,
        payment_reference: row.get("payment_reference"),
        status: ReviewStatus::parse(&status).unwrap_or_else(|| {
            warn!(status = %status, "Unexpected stored top-up status");
            ReviewStatus::Pending
        }),
        reason: row.get("reason"),
        reviewer_id: row.get::<Option<i64>, _>("reviewer_id").map(MemberId::new),
        requested_at: TimeMs::new(row.get("requested_at")),
        processed_at: row.get::<Option<i64>, _>("processed_at").map(TimeMs::new),
    })
}

impl Repository {
    // =========================================================================
    // KYC
    // =========================================================================

    pub async fn get_kyc(&self, member: MemberId) -> Result<Option<KycRecord>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM kyc_records WHERE member_id = ?",
            KYC_COLUMNS
        ))
        .bind(member.as_i64())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(kyc_from_row))
    }

    /// Store documents and move the record to pending.
    ///
    /// Accepted only from NOT_SUBMITTED or REJECTED; a pending or active record
    /// yields [`ReviewTransition::AlreadyProcessed`].
    pub async fn submit_kyc(
        &self,
        member: MemberId,
        documents: &KycDocuments,
        now: TimeMs,
    ) -> Result<ReviewTransition<KycRecord>, sqlx::Error> {
        let updated = sqlx::query(
            r#"
            UPDATE kyc_records
            SET status = 'pending', pan_number = ?, aadhaar_number = ?, account_holder = ?,
                account_number = ?, ifsc = ?, bank_name = ?, remarks = NULL,
                reviewer_id = NULL, submitted_at = ?, reviewed_at = NULL
            WHERE member_id = ? AND status IN ('not_submitted', 'rejected')
            "#,
        )
        .bind(&documents.pan_number)
        .bind(&documents.aadhaar_number)
        .bind(&documents.bank.account_holder)
        .bind(&documents.bank.account_number)
        .bind(&documents.bank.ifsc)
        .bind(&documents.bank.bank_name)
        .bind(now.as_ms())
        .bind(member.as_i64())
        .execute(&self.pool)
        .await?
        .rows_affected();

        let record = self.get_kyc(member).await?;
        Ok(match (updated, record) {
            (0, Some(_)) => ReviewTransition::AlreadyProcessed,
            (_, None) => ReviewTransition::NotFound,
            (_, Some(record)) => ReviewTransition::Applied(record),
        })
    }

    /// Approve (status ACTIVE) or reject a pending KYC record.
    pub async fn review_kyc(
        &self,
        member: MemberId,
        reviewer: MemberId,
        approve: bool,
        remarks: Option<&str>,
        now: TimeMs,
    ) -> Result<ReviewTransition<KycRecord>, sqlx::Error> {
        let status = if approve {
            KycStatus::Active
        } else {
            KycStatus::Rejected
        };
        let updated = sqlx::query(
            r#"
            UPDATE kyc_records SET status = ?, remarks = ?, reviewer_id = ?, reviewed_at = ?
            WHERE member_id = ? AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(remarks)
        .bind(reviewer.as_i64())
        .bind(now.as_ms())
        .bind(member.as_i64())
        .execute(&self.pool)
        .await?
        .rows_affected();

        let record = self.get_kyc(member).await?;
        Ok(match (updated, record) {
            (0, Some(_)) => ReviewTransition::AlreadyProcessed,
            (_, None) => ReviewTransition::NotFound,
            (_, Some(record)) => ReviewTransition::Applied(record),
        })
    }

    pub async fn query_kyc_by_status(
        &self,
        status: Option<KycStatus>,
    ) -> Result<Vec<KycRecord>, sqlx::Error> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM kyc_records WHERE status = ? ORDER BY submitted_at ASC, member_id ASC",
                    KYC_COLUMNS
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM kyc_records WHERE status != 'not_submitted' ORDER BY submitted_at ASC, member_id ASC",
                    KYC_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.iter().map(kyc_from_row).collect())
    }

    // =========================================================================
    // Top-ups
    // =========================================================================

    /// Record a pending top-up. None when the member already has one pending.
    pub async fn insert_topup(
        &self,
        member: MemberId,
        plan_id: i64,
        amount: Decimal,
        payment_reference: Option<&str>,
        now: TimeMs,
    ) -> Result<Option<TopUpRequest>, sqlx::Error> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO topups (member_id, plan_id, amount, payment_reference, status, requested_at)
            VALUES (?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(member.as_i64())
        .bind(plan_id)
        .bind(amount.to_canonical_string())
        .bind(payment_reference)
        .bind(now.as_ms())
        .execute(&self.pool)
        .await;

        let result = match inserted {
            Ok(result) => result,
            Err(e) => {
                return match unique_violation_columns(&e) {
                    Some(cols) if cols.contains("topups.member_id") => Ok(None),
                    _ => Err(e),
                }
            }
        };

        Ok(Some(TopUpRequest {
            id: result.last_insert_rowid(),
            member_id: member,
            plan_id,
            amount,
            payment_reference: payment_reference.map(str::to_string),
            status: ReviewStatus::Pending,
            reason: None,
            reviewer_id: None,
            requested_at: now,
            processed_at: None,
        }))
    }

    pub async fn get_topup(&self, id: i64) -> Result<Option<TopUpRequest>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {} FROM topups WHERE id = ?", TOPUP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(topup_from_row).transpose()
    }

    /// A member's top-ups, newest first.
    pub async fn query_topups(&self, member: MemberId) -> Result<Vec<TopUpRequest>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM topups WHERE member_id = ? ORDER BY requested_at DESC, id DESC",
            TOPUP_COLUMNS
        ))
        .bind(member.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(topup_from_row).collect()
    }

    pub async fn query_topups_by_status(
        &self,
        status: Option<ReviewStatus>,
    ) -> Result<Vec<TopUpRequest>, sqlx::Error> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM topups WHERE status = ? ORDER BY requested_at ASC, id ASC",
                    TOPUP_COLUMNS
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM topups ORDER BY requested_at ASC, id ASC",
                    TOPUP_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(topup_from_row).collect()
    }

    pub async fn reject_topup(
        &self,
        id: i64,
        reviewer: MemberId,
        reason: Option<&str>,
        now: TimeMs,
    ) -> Result<ReviewTransition<TopUpRequest>, sqlx::Error> {
        let updated = sqlx::query(
            r#"
            UPDATE topups SET status = 'rejected', reason = ?, reviewer_id = ?, processed_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(reason)
        .bind(reviewer.as_i64())
        .bind(now.as_ms())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let topup = self.get_topup(id).await?;
        Ok(match (updated, topup) {
            (0, Some(_)) => ReviewTransition::AlreadyProcessed,
            (_, None) => ReviewTransition::NotFound,
            (_, Some(topup)) => ReviewTransition::Applied(topup),
        })
    }
}
