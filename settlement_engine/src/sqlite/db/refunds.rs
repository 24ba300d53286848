use chrono::Utc;
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewRefund, OrderItem, OrderItemStatus, OrderRefund, RefundSource, RefundStatus, ReturnStatus},
    ledger::LedgerEntry,
    sqlite::db::{ledger, order_items, payouts, returns},
    traits::{InsertRefundResult, SettlementError},
};

/// Records a refund for an order item and debits the seller's ledger. Not atomic on its own; always call this inside
/// the transaction of the state change that caused the refund.
///
/// * A refund for the same (item, source) pair that already exists is returned as `AlreadyExists`, with no writes.
/// * The amount must be positive and equal to the item subtotal.
/// * If the item's sale is still waiting for settlement, it is flagged refunded so that no payout pays it, and the
///   debit is a plain `refund_debit`.
/// * If the sale was already paid out, the debit is a `balance_adjustment` that the next payout carries in.
/// * If the item never reached delivery, there was no sale credit to offset; the `refund_debit` is carried forward.
pub async fn process_refund(
    refund: NewRefund,
    conn: &mut SqliteConnection,
) -> Result<InsertRefundResult, SettlementError> {
    if !refund.amount.is_positive() {
        return Err(SettlementError::ValidationError(format!("Refund amount must be positive, not {}", refund.amount)));
    }
    if refund.method.trim().is_empty() {
        return Err(SettlementError::ValidationError("A refund method is required".into()));
    }
    let key = refund.source.idempotency_key(refund.order_item_id);
    if let Some(existing) = fetch_refund_by_key(&key, conn).await? {
        debug!("💸️ Refund {key} already exists as #{}. Nothing to do.", existing.id);
        return Ok(InsertRefundResult::AlreadyExists(existing));
    }
    let item = order_items::fetch_existing_item(refund.order_item_id, conn).await?;
    if refund.amount != item.subtotal {
        return Err(SettlementError::ValidationError(format!(
            "Only full refunds are supported. Order item #{} must be refunded {}, not {}",
            item.id, item.subtotal, refund.amount
        )));
    }
    let cancellation_id = check_source(&item, refund.source, conn).await?;
    let record = insert_refund(&item, &refund, &key, cancellation_id, conn).await?;

    let settlement = payouts::fetch_settlement_record(item.id, conn).await?;
    let entry = match settlement {
        Some(s) if s.is_settled => LedgerEntry::adjustment(-record.amount)
            .for_item(item.id)
            .for_refund(record.id)
            .carried_forward()
            .with_description(format!("Refund #{} of order item #{} after it was paid out", record.id, item.id)),
        Some(_) => {
            let flagged = payouts::mark_item_refunded(item.id, record.id, conn).await?;
            trace!("💸️ {flagged} payout item rows flagged as refunded for order item #{}", item.id);
            LedgerEntry::refund_debit(item.id, record.id, record.amount)
        },
        None => LedgerEntry::refund_debit(item.id, record.id, record.amount).carried_forward(),
    };
    ledger::post_entry(&item.seller_id, entry, conn).await?;
    info!("💸️ Refund #{} of {} recorded for order item #{} ({key})", record.id, record.amount, item.id);
    Ok(InsertRefundResult::Inserted(record))
}

/// Returns the cancellation id for cancellation refunds.
async fn check_source(
    item: &OrderItem,
    source: RefundSource,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, SettlementError> {
    match source {
        RefundSource::Cancellation => {
            if item.status != OrderItemStatus::Cancelled {
                return Err(SettlementError::ValidationError(format!(
                    "Order item #{} is {}, not cancelled",
                    item.id, item.status
                )));
            }
            let cancellation = order_items::fetch_cancellation(item.id, conn)
                .await?
                .ok_or_else(|| SettlementError::NotFound(format!("Cancellation of order item #{}", item.id)))?;
            Ok(Some(cancellation.id))
        },
        RefundSource::Return(return_id) => {
            let order_return = returns::fetch_existing_return(return_id, conn).await?;
            if order_return.order_item_id != item.id {
                return Err(SettlementError::ValidationError(format!(
                    "Return #{return_id} does not belong to order item #{}",
                    item.id
                )));
            }
            if order_return.status != ReturnStatus::Approved {
                return Err(SettlementError::ValidationError(format!(
                    "Return #{return_id} is {}. Only approved returns are refunded.",
                    order_return.status
                )));
            }
            Ok(None)
        },
    }
}

async fn insert_refund(
    item: &OrderItem,
    refund: &NewRefund,
    key: &str,
    cancellation_id: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<OrderRefund, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as(
        r#"
            INSERT INTO order_refunds (
                order_item_id,
                seller_id,
                return_id,
                cancellation_id,
                idempotency_key,
                amount,
                method,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(item.id)
    .bind(item.seller_id.as_str())
    .bind(refund.source.return_id())
    .bind(cancellation_id)
    .bind(key)
    .bind(refund.amount.value())
    .bind(&refund.method)
    .bind(RefundStatus::Pending.to_string())
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn fetch_refund(refund_id: i64, conn: &mut SqliteConnection) -> Result<Option<OrderRefund>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_refunds WHERE id = $1").bind(refund_id).fetch_optional(conn).await
}

pub async fn fetch_existing_refund(refund_id: i64, conn: &mut SqliteConnection) -> Result<OrderRefund, SettlementError> {
    fetch_refund(refund_id, conn).await?.ok_or_else(|| SettlementError::NotFound(format!("Refund #{refund_id}")))
}

pub async fn fetch_refund_by_key(key: &str, conn: &mut SqliteConnection) -> Result<Option<OrderRefund>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_refunds WHERE idempotency_key = $1").bind(key).fetch_optional(conn).await
}

pub async fn fetch_refunds_for_item(
    order_item_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderRefund>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_refunds WHERE order_item_id = $1 ORDER BY id")
        .bind(order_item_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_refunds_with_status(
    status: RefundStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderRefund>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_refunds WHERE status = $1 ORDER BY id")
        .bind(status.to_string())
        .fetch_all(conn)
        .await
}

/// Moves the refund from `expected` to `target`, keeping the existing gateway reference when `reference` is `None`.
pub async fn update_status(
    refund_id: i64,
    expected: RefundStatus,
    target: RefundStatus,
    reference: Option<String>,
    failure_reason: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<OrderRefund, SettlementError> {
    let updated: Option<OrderRefund> = sqlx::query_as(
        r#"
        UPDATE order_refunds SET
            status = $1,
            gateway_reference = COALESCE($2, gateway_reference),
            failure_reason = $3,
            updated_at = $4
        WHERE id = $5 AND status = $6
        RETURNING *
        "#,
    )
    .bind(target.to_string())
    .bind(reference)
    .bind(failure_reason)
    .bind(Utc::now())
    .bind(refund_id)
    .bind(expected.to_string())
    .fetch_optional(conn)
    .await?;
    updated.ok_or_else(|| SettlementError::Conflict(format!("Refund #{refund_id}")))
}
