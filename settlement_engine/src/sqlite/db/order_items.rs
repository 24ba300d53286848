use chrono::Utc;
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{
        Actor,
        NewOrderItem,
        NewOrderPayment,
        OrderCancellation,
        OrderItem,
        OrderItemStatus,
        OrderPayment,
        OrderStatusHistory,
        RefundStatus,
    },
    traits::{OrderItemChanged, SettlementError},
};

/// Inserts a new order item in `pending` and records the initial history entry. This is not atomic. Embed the call
/// in a transaction if you need atomicity.
pub async fn insert_order_item(
    item: NewOrderItem,
    actor: &Actor,
    conn: &mut SqliteConnection,
) -> Result<OrderItem, SettlementError> {
    let now = Utc::now();
    let item: OrderItem = sqlx::query_as(
        r#"
            INSERT INTO order_items (
                order_id,
                seller_id,
                listing_id,
                variant_id,
                quantity,
                price_per_unit,
                subtotal,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(item.order_id)
    .bind(item.seller_id.as_str())
    .bind(item.listing_id)
    .bind(item.variant_id)
    .bind(item.quantity)
    .bind(item.price_per_unit.value())
    .bind(item.subtotal.value())
    .bind(OrderItemStatus::Pending.to_string())
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    insert_history(item.id, None, OrderItemStatus::Pending, actor, Some("Order placed".into()), conn).await?;
    debug!("📦️ Order item #{} for order {} inserted", item.id, item.order_id);
    Ok(item)
}

pub async fn fetch_order_item(id: i64, conn: &mut SqliteConnection) -> Result<Option<OrderItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_items WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_order_items_for_order(
    order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await
}

/// Fetches the item, or fails with `NotFound`.
pub async fn fetch_existing_item(id: i64, conn: &mut SqliteConnection) -> Result<OrderItem, SettlementError> {
    fetch_order_item(id, conn).await?.ok_or_else(|| SettlementError::NotFound(format!("Order item #{id}")))
}

/// Moves the item from `expected` to `target` and appends a history entry.
///
/// The update only succeeds if the stored status still equals `expected`. Otherwise the error is `Conflict` (or
/// `NotFound` if the item does not exist). The edge itself must already have been validated.
pub async fn transition(
    id: i64,
    expected: OrderItemStatus,
    target: OrderItemStatus,
    actor: &Actor,
    remarks: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<OrderItemChanged, SettlementError> {
    let updated: Option<OrderItem> = sqlx::query_as(
        "UPDATE order_items SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4 RETURNING *",
    )
    .bind(target.to_string())
    .bind(Utc::now())
    .bind(id)
    .bind(expected.to_string())
    .fetch_optional(&mut *conn)
    .await?;
    let item = match updated {
        Some(item) => item,
        None => {
            let current = fetch_existing_item(id, conn).await?;
            debug!("📦️ Order item #{id} is {} but the caller expected {expected}", current.status);
            return Err(SettlementError::Conflict(format!("Order item #{id}")));
        },
    };
    insert_history(id, Some(expected), target, actor, remarks, conn).await?;
    trace!("📦️ Order item #{id}: {expected} -> {target} by {actor}");
    Ok(OrderItemChanged { old_status: expected, item })
}

async fn insert_history(
    order_item_id: i64,
    old_status: Option<OrderItemStatus>,
    new_status: OrderItemStatus,
    actor: &Actor,
    remarks: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO order_status_history (
                order_item_id,
                old_status,
                new_status,
                changed_by,
                changed_by_role,
                remarks,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(order_item_id)
    .bind(old_status.map(|s| s.to_string()))
    .bind(new_status.to_string())
    .bind(&actor.id)
    .bind(actor.role.to_string())
    .bind(remarks)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_history(
    order_item_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderStatusHistory>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_status_history WHERE order_item_id = $1 ORDER BY id")
        .bind(order_item_id)
        .fetch_all(conn)
        .await
}

/// Inserts the payment for an order, returning `false` in the second parameter if one already exists.
pub async fn idempotent_insert_payment(
    payment: NewOrderPayment,
    conn: &mut SqliteConnection,
) -> Result<(OrderPayment, bool), SettlementError> {
    if let Some(existing) = fetch_payment(&payment.order_id, conn).await? {
        return Ok((existing, false));
    }
    let payment: OrderPayment = sqlx::query_as(
        r#"
            INSERT INTO order_payments (order_id, amount, gateway_fee, gateway_tax, gateway_reference, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(payment.order_id)
    .bind(payment.amount.value())
    .bind(payment.gateway_fee.value())
    .bind(payment.gateway_tax.value())
    .bind(payment.gateway_reference)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    debug!("📦️ Payment of {} recorded for order {}", payment.amount, payment.order_id);
    Ok((payment, true))
}

pub async fn fetch_payment(order_id: &str, conn: &mut SqliteConnection) -> Result<Option<OrderPayment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_payments WHERE order_id = $1").bind(order_id).fetch_optional(conn).await
}

pub async fn insert_cancellation(
    order_item_id: i64,
    actor: &Actor,
    reason: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<OrderCancellation, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as(
        r#"
            INSERT INTO order_cancellations (
                order_item_id,
                cancelled_by,
                cancelled_by_role,
                reason,
                refund_status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(order_item_id)
    .bind(&actor.id)
    .bind(actor.role.to_string())
    .bind(reason)
    .bind(RefundStatus::Pending.to_string())
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn fetch_cancellation(
    order_item_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderCancellation>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_cancellations WHERE order_item_id = $1")
        .bind(order_item_id)
        .fetch_optional(conn)
        .await
}

pub async fn update_cancellation_refund_status(
    cancellation_id: i64,
    status: RefundStatus,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE order_cancellations SET refund_status = $1, updated_at = $2 WHERE id = $3")
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(cancellation_id)
        .execute(conn)
        .await?;
    Ok(())
}
