use chrono::Utc;
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Actor, OrderReturn, QcResult, QualityCheck, ReturnStatus, ReturnTracking},
    traits::{ReturnChanged, SettlementError},
};

pub async fn insert_return(
    order_item_id: i64,
    buyer: &Actor,
    reason: &str,
    return_type: &str,
    conn: &mut SqliteConnection,
) -> Result<OrderReturn, SettlementError> {
    if let Some(open) = fetch_returns_for_item(order_item_id, conn).await?.into_iter().find(|r| r.status.is_open()) {
        return Err(SettlementError::ValidationError(format!(
            "Order item #{order_item_id} already has an open return (#{})",
            open.id
        )));
    }
    let now = Utc::now();
    let order_return: OrderReturn = sqlx::query_as(
        r#"
            INSERT INTO order_returns (order_item_id, buyer_id, reason, return_type, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(order_item_id)
    .bind(&buyer.id)
    .bind(reason)
    .bind(return_type)
    .bind(ReturnStatus::Initiated.to_string())
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    insert_tracking(order_return.id, ReturnStatus::Initiated, None, Some(reason.to_string()), buyer, conn).await?;
    debug!("↩️ Return #{} opened for order item #{order_item_id}", order_return.id);
    Ok(order_return)
}

pub async fn fetch_return(return_id: i64, conn: &mut SqliteConnection) -> Result<Option<OrderReturn>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_returns WHERE id = $1").bind(return_id).fetch_optional(conn).await
}

pub async fn fetch_existing_return(return_id: i64, conn: &mut SqliteConnection) -> Result<OrderReturn, SettlementError> {
    fetch_return(return_id, conn).await?.ok_or_else(|| SettlementError::NotFound(format!("Return #{return_id}")))
}

pub async fn fetch_returns_for_item(
    order_item_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderReturn>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_returns WHERE order_item_id = $1 ORDER BY id")
        .bind(order_item_id)
        .fetch_all(conn)
        .await
}

/// Moves the return from `expected` to `target` and appends a tracking entry. `Conflict` if the stored status is no
/// longer `expected`.
pub async fn transition(
    return_id: i64,
    expected: ReturnStatus,
    target: ReturnStatus,
    actor: &Actor,
    location: Option<String>,
    notes: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<ReturnChanged, SettlementError> {
    let updated: Option<OrderReturn> = sqlx::query_as(
        "UPDATE order_returns SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4 RETURNING *",
    )
    .bind(target.to_string())
    .bind(Utc::now())
    .bind(return_id)
    .bind(expected.to_string())
    .fetch_optional(&mut *conn)
    .await?;
    let Some(order_return) = updated else {
        let current = fetch_existing_return(return_id, conn).await?;
        debug!("↩️ Return #{return_id} is {} but the caller expected {expected}", current.status);
        return Err(SettlementError::Conflict(format!("Return #{return_id}")));
    };
    insert_tracking(return_id, target, location, notes, actor, conn).await?;
    trace!("↩️ Return #{return_id}: {expected} -> {target} by {actor}");
    Ok(ReturnChanged { old_status: expected, order_return })
}

async fn insert_tracking(
    return_id: i64,
    status: ReturnStatus,
    location: Option<String>,
    notes: Option<String>,
    actor: &Actor,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO return_tracking (return_id, status, location, notes, updated_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(return_id)
    .bind(status.to_string())
    .bind(location)
    .bind(notes)
    .bind(&actor.id)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_tracking(return_id: i64, conn: &mut SqliteConnection) -> Result<Vec<ReturnTracking>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM return_tracking WHERE return_id = $1 ORDER BY id")
        .bind(return_id)
        .fetch_all(conn)
        .await
}

/// Stores the inspection result. The schema allows one per return; a second attempt is a `Conflict`.
pub async fn insert_quality_check(
    return_id: i64,
    result: QcResult,
    remarks: Option<String>,
    actor: &Actor,
    conn: &mut SqliteConnection,
) -> Result<QualityCheck, SettlementError> {
    let qc = sqlx::query_as(
        r#"
            INSERT INTO return_quality_checks (return_id, result, remarks, performed_by, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(return_id)
    .bind(result.to_string())
    .bind(remarks)
    .bind(&actor.id)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(qc)
}

pub async fn fetch_quality_check(
    return_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<QualityCheck>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM return_quality_checks WHERE return_id = $1").bind(return_id).fetch_optional(conn).await
}
