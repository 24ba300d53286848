use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{
        Actor,
        BalanceTransaction,
        DisbursementStatus,
        OrderItem,
        Paise,
        PayoutApprovalLog,
        PayoutDeduction,
        PayoutItem,
        PayoutPeriod,
        PayoutStatus,
        SellerId,
        SellerPayout,
    },
    payout_batch::{Deduction, PayoutTotals},
    traits::SettlementError,
};

//--------------------------------------  Settlement records   ---------------------------------------------------------

/// Creates the pending-settlement record for a freshly delivered item.
pub async fn insert_settlement_record(
    item: &OrderItem,
    allocated_fee: Paise,
    allocated_tax: Paise,
    hold_until: DateTime<Utc>,
    delivered_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PayoutItem, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO payout_items (
                order_item_id,
                seller_id,
                item_subtotal,
                allocated_fee,
                allocated_tax,
                settlement_hold_until,
                delivered_at,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(item.id)
    .bind(item.seller_id.as_str())
    .bind(item.subtotal.value())
    .bind(allocated_fee.value())
    .bind(allocated_tax.value())
    .bind(hold_until)
    .bind(delivered_at)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
}

pub async fn fetch_settlement_record(
    order_item_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PayoutItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payout_items WHERE order_item_id = $1 AND payout_id IS NULL")
        .bind(order_item_id)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_settlement_records(
    seller_id: &SellerId,
    conn: &mut SqliteConnection,
) -> Result<Vec<PayoutItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payout_items WHERE seller_id = $1 AND payout_id IS NULL ORDER BY id")
        .bind(seller_id.as_str())
        .fetch_all(conn)
        .await
}

/// Number of items the seller has had delivered so far.
pub async fn count_settlement_records(seller_id: &SellerId, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payout_items WHERE seller_id = $1 AND payout_id IS NULL")
        .bind(seller_id.as_str())
        .fetch_one(conn)
        .await?;
    Ok(count)
}

/// Flags the item as refunded on its pending-settlement record and on any snapshot in a payout that has not been paid.
/// Returns the number of rows flagged.
pub async fn mark_item_refunded(
    order_item_id: i64,
    refund_id: i64,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE payout_items SET is_refunded = 1, refund_id = $1
        WHERE order_item_id = $2 AND is_settled = 0 AND (
            payout_id IS NULL OR
            payout_id IN (SELECT id FROM seller_payouts WHERE status IN ('pending', 'approved'))
        )
        "#,
    )
    .bind(refund_id)
    .bind(order_item_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Pending-settlement records that could go into a new payout, regardless of their hold deadline:
/// * not settled and not refunded,
/// * the item is delivered, or its return was rejected and no other return is open,
/// * not already part of a pending or approved payout.
pub async fn fetch_unsettled_records(
    seller_id: &SellerId,
    conn: &mut SqliteConnection,
) -> Result<Vec<PayoutItem>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT pi.* FROM payout_items pi
        JOIN order_items oi ON oi.id = pi.order_item_id
        WHERE pi.seller_id = $1
        AND pi.payout_id IS NULL
        AND pi.is_settled = 0
        AND pi.is_refunded = 0
        AND (
            oi.status = 'delivered' OR (
                oi.status = 'return_requested' AND NOT EXISTS (
                    SELECT 1 FROM order_returns r WHERE r.order_item_id = oi.id AND r.status <> 'rejected'
                )
            )
        )
        AND NOT EXISTS (
            SELECT 1 FROM payout_items snap
            JOIN seller_payouts p ON p.id = snap.payout_id
            WHERE snap.order_item_id = pi.order_item_id AND p.status IN ('pending', 'approved')
        )
        ORDER BY pi.id
        "#,
    )
    .bind(seller_id.as_str())
    .fetch_all(conn)
    .await
}

pub async fn fetch_sellers_with_unsettled_items(conn: &mut SqliteConnection) -> Result<Vec<SellerId>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT DISTINCT seller_id FROM payout_items
        WHERE payout_id IS NULL AND is_settled = 0 AND is_refunded = 0
        ORDER BY seller_id
        "#,
    )
    .fetch_all(conn)
    .await
}

pub async fn mark_released(record_ids: &[i64], conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    for id in record_ids {
        sqlx::query("UPDATE payout_items SET is_released = 1 WHERE id = $1").bind(id).execute(&mut *conn).await?;
    }
    Ok(())
}

//--------------------------------------        Payouts        ---------------------------------------------------------

pub async fn fetch_payout(payout_id: i64, conn: &mut SqliteConnection) -> Result<Option<SellerPayout>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM seller_payouts WHERE id = $1").bind(payout_id).fetch_optional(conn).await
}

pub async fn fetch_existing_payout(payout_id: i64, conn: &mut SqliteConnection) -> Result<SellerPayout, SettlementError> {
    fetch_payout(payout_id, conn).await?.ok_or_else(|| SettlementError::NotFound(format!("Payout #{payout_id}")))
}

pub async fn fetch_payouts_for_seller(
    seller_id: &SellerId,
    conn: &mut SqliteConnection,
) -> Result<Vec<SellerPayout>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM seller_payouts WHERE seller_id = $1 ORDER BY id")
        .bind(seller_id.as_str())
        .fetch_all(conn)
        .await
}

pub async fn fetch_payouts_with_disbursement_status(
    status: DisbursementStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<SellerPayout>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM seller_payouts WHERE status = 'paid' AND disbursement_status = $1 ORDER BY id")
        .bind(status.to_string())
        .fetch_all(conn)
        .await
}

/// The non-rejected payout for the seller and period, if there is one.
pub async fn fetch_active_payout_for_period(
    seller_id: &SellerId,
    period: PayoutPeriod,
    conn: &mut SqliteConnection,
) -> Result<Option<SellerPayout>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT * FROM seller_payouts
        WHERE seller_id = $1 AND payout_month = $2 AND payout_year = $3 AND status <> 'rejected'
        "#,
    )
    .bind(seller_id.as_str())
    .bind(i64::from(period.month))
    .bind(i64::from(period.year))
    .fetch_optional(conn)
    .await
}

/// The seller's most recent paid payout, if its net amount was negative and no other live payout has carried it in yet.
pub async fn fetch_carry_in(
    seller_id: &SellerId,
    conn: &mut SqliteConnection,
) -> Result<Option<SellerPayout>, sqlx::Error> {
    let last_paid: Option<SellerPayout> = sqlx::query_as(
        "SELECT * FROM seller_payouts WHERE seller_id = $1 AND status = 'paid' ORDER BY paid_at DESC, id DESC LIMIT 1",
    )
    .bind(seller_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    let Some(last_paid) = last_paid.filter(|p| p.net_amount.is_negative()) else {
        return Ok(None);
    };
    let carried: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM seller_payouts
        WHERE carried_from_payout_id = $1 AND status IN ('pending', 'approved', 'paid')
        "#,
    )
    .bind(last_paid.id)
    .fetch_one(conn)
    .await?;
    Ok((carried == 0).then_some(last_paid))
}

pub async fn insert_payout(
    seller_id: &SellerId,
    period: PayoutPeriod,
    totals: &PayoutTotals,
    carried_from: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<SellerPayout, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as(
        r#"
            INSERT INTO seller_payouts (
                seller_id,
                payout_month,
                payout_year,
                status,
                gross_sales,
                fees,
                tax,
                refund_deductions,
                previous_balance,
                balance_adjustment,
                net_amount,
                item_count,
                carried_from_payout_id,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *;
        "#,
    )
    .bind(seller_id.as_str())
    .bind(i64::from(period.month))
    .bind(i64::from(period.year))
    .bind(PayoutStatus::Pending.to_string())
    .bind(totals.gross_sales.value())
    .bind(totals.fees.value())
    .bind(totals.tax.value())
    .bind(totals.refund_deductions.value())
    .bind(totals.previous_balance.value())
    .bind(totals.balance_adjustment.value())
    .bind(totals.net_amount.value())
    .bind(totals.item_count)
    .bind(carried_from)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await
}

/// Copies a pending-settlement record into the payout as a snapshot.
pub async fn insert_snapshot(
    payout_id: i64,
    record: &PayoutItem,
    conn: &mut SqliteConnection,
) -> Result<PayoutItem, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO payout_items (
                payout_id,
                order_item_id,
                seller_id,
                item_subtotal,
                allocated_fee,
                allocated_tax,
                settlement_hold_until,
                is_released,
                delivered_at,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(payout_id)
    .bind(record.order_item_id)
    .bind(record.seller_id.as_str())
    .bind(record.item_subtotal.value())
    .bind(record.allocated_fee.value())
    .bind(record.allocated_tax.value())
    .bind(record.settlement_hold_until)
    .bind(record.delivered_at)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
}

pub async fn insert_deduction(
    payout_id: i64,
    tx: &BalanceTransaction,
    conn: &mut SqliteConnection,
) -> Result<PayoutDeduction, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO payout_deductions (payout_id, balance_transaction_id, transaction_type, amount, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(payout_id)
    .bind(tx.id)
    .bind(tx.transaction_type.to_string())
    .bind(tx.amount.abs().value())
    .bind(Utc::now())
    .fetch_one(conn)
    .await
}

pub async fn fetch_payout_items(payout_id: i64, conn: &mut SqliteConnection) -> Result<Vec<PayoutItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payout_items WHERE payout_id = $1 ORDER BY id").bind(payout_id).fetch_all(conn).await
}

pub async fn fetch_deductions(
    payout_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PayoutDeduction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payout_deductions WHERE payout_id = $1 ORDER BY id")
        .bind(payout_id)
        .fetch_all(conn)
        .await
}

/// Recomputes the payout's totals from its snapshots and deductions as they are now, so that items refunded since
/// generation drop out. The carry-in from an earlier payout is kept as it was at generation.
pub async fn recompute_totals(
    payout: &SellerPayout,
    balance_adjustment: Paise,
    conn: &mut SqliteConnection,
) -> Result<PayoutTotals, SettlementError> {
    let items = fetch_payout_items(payout.id, conn).await?;
    let deductions: Vec<Deduction> = fetch_deductions(payout.id, conn).await?.iter().map(Deduction::from).collect();
    let carry_in = match payout.carried_from_payout_id {
        Some(id) => fetch_existing_payout(id, conn).await?.net_amount,
        None => Paise::ZERO,
    };
    Ok(PayoutTotals::compute(&items, &deductions, carry_in, balance_adjustment))
}

pub async fn update_totals(
    payout_id: i64,
    totals: &PayoutTotals,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE seller_payouts SET
            gross_sales = $1,
            fees = $2,
            tax = $3,
            refund_deductions = $4,
            previous_balance = $5,
            balance_adjustment = $6,
            net_amount = $7,
            item_count = $8,
            updated_at = $9
        WHERE id = $10
        "#,
    )
    .bind(totals.gross_sales.value())
    .bind(totals.fees.value())
    .bind(totals.tax.value())
    .bind(totals.refund_deductions.value())
    .bind(totals.previous_balance.value())
    .bind(totals.balance_adjustment.value())
    .bind(totals.net_amount.value())
    .bind(totals.item_count)
    .bind(Utc::now())
    .bind(payout_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Moves the payout from `expected` to `target`. `Conflict` if the stored status changed in the meantime.
pub async fn update_status(
    payout_id: i64,
    expected: PayoutStatus,
    target: PayoutStatus,
    conn: &mut SqliteConnection,
) -> Result<SellerPayout, SettlementError> {
    let updated: Option<SellerPayout> = sqlx::query_as(
        "UPDATE seller_payouts SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4 RETURNING *",
    )
    .bind(target.to_string())
    .bind(Utc::now())
    .bind(payout_id)
    .bind(expected.to_string())
    .fetch_optional(conn)
    .await?;
    updated.ok_or_else(|| SettlementError::Conflict(format!("Payout #{payout_id}")))
}

pub async fn set_approval(
    payout_id: i64,
    admin: &Actor,
    admin_notes: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE seller_payouts SET approved_by = $1, approved_at = $2, admin_notes = COALESCE($3, admin_notes) WHERE id = $4",
    )
    .bind(&admin.id)
    .bind(Utc::now())
    .bind(admin_notes)
    .bind(payout_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn set_rejection(payout_id: i64, reason: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE seller_payouts SET rejection_reason = $1 WHERE id = $2")
        .bind(reason)
        .bind(payout_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_payment(
    payout_id: i64,
    admin: &Actor,
    payment_method: &str,
    payment_reference: &str,
    disbursement: DisbursementStatus,
    paid_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE seller_payouts SET
            payment_method = $1,
            payment_reference = $2,
            disbursement_status = $3,
            paid_by = $4,
            paid_at = $5
        WHERE id = $6
        "#,
    )
    .bind(payment_method)
    .bind(payment_reference)
    .bind(disbursement.to_string())
    .bind(&admin.id)
    .bind(paid_at)
    .bind(payout_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Changes the disbursement status of a paid payout, if it is currently `expected`.
pub async fn update_disbursement(
    payout_id: i64,
    expected: DisbursementStatus,
    target: DisbursementStatus,
    reference: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<Option<SellerPayout>, sqlx::Error> {
    sqlx::query_as(
        r#"
        UPDATE seller_payouts SET
            disbursement_status = $1,
            payment_reference = COALESCE($2, payment_reference),
            updated_at = $3
        WHERE id = $4 AND status = 'paid' AND disbursement_status = $5
        RETURNING *
        "#,
    )
    .bind(target.to_string())
    .bind(reference)
    .bind(Utc::now())
    .bind(payout_id)
    .bind(expected.to_string())
    .fetch_optional(conn)
    .await
}

/// Flags every non-refunded snapshot of the payout, and the matching pending-settlement records, as settled.
pub async fn settle_items(payout_id: i64, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let settled = sqlx::query("UPDATE payout_items SET is_settled = 1 WHERE payout_id = $1 AND is_refunded = 0")
        .bind(payout_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    sqlx::query(
        r#"
        UPDATE payout_items SET is_settled = 1
        WHERE payout_id IS NULL AND order_item_id IN (
            SELECT order_item_id FROM payout_items WHERE payout_id = $1 AND is_refunded = 0
        )
        "#,
    )
    .bind(payout_id)
    .execute(conn)
    .await?;
    trace!("🏦️ {settled} items settled by payout #{payout_id}");
    Ok(settled)
}

//--------------------------------------     Approval logs     ---------------------------------------------------------

#[allow(clippy::too_many_arguments)]
pub async fn insert_approval_log(
    payout_id: i64,
    action: &str,
    previous_status: Option<PayoutStatus>,
    new_status: PayoutStatus,
    performed_by: &Actor,
    notes: Option<String>,
    payment_reference: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO payout_approval_logs (
                payout_id,
                action,
                previous_status,
                new_status,
                performed_by,
                notes,
                payment_reference,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(payout_id)
    .bind(action)
    .bind(previous_status.map(|s| s.to_string()))
    .bind(new_status.to_string())
    .bind(&performed_by.id)
    .bind(notes)
    .bind(payment_reference)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_approval_logs(
    payout_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PayoutApprovalLog>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payout_approval_logs WHERE payout_id = $1 ORDER BY id")
        .bind(payout_id)
        .fetch_all(conn)
        .await
}
