//! Ledger persistence.
//!
//! [`post_entry`] is the only function that writes to `seller_balance_transactions`. It must run inside the same
//! transaction as the state change that caused it.
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{BalanceTransaction, Paise, SellerBalance, SellerId},
    ledger::{self, LedgerEntry},
    traits::SettlementError,
};

pub async fn fetch_balance(
    seller_id: &SellerId,
    conn: &mut SqliteConnection,
) -> Result<Option<SellerBalance>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM seller_balances WHERE seller_id = $1")
        .bind(seller_id.as_str())
        .fetch_optional(conn)
        .await
}

/// Fetches the seller's balance snapshot, creating a zeroed one if this is the seller's first ledger event.
pub async fn fetch_or_create_balance(
    seller_id: &SellerId,
    conn: &mut SqliteConnection,
) -> Result<SellerBalance, SettlementError> {
    if let Some(balance) = fetch_balance(seller_id, conn).await? {
        return Ok(balance);
    }
    let now = Utc::now();
    sqlx::query("INSERT OR IGNORE INTO seller_balances (seller_id, created_at, updated_at) VALUES ($1, $2, $3)")
        .bind(seller_id.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    debug!("📒️ Created balance snapshot for seller {seller_id}");
    fetch_balance(seller_id, conn).await?.ok_or_else(|| SettlementError::NotFound(format!("Balance of {seller_id}")))
}

/// Writes the snapshot if nobody else has written it since `expected_version` was read.
async fn save_balance(
    balance: &SellerBalance,
    expected_version: i64,
    conn: &mut SqliteConnection,
) -> Result<(), SettlementError> {
    let result = sqlx::query(
        r#"
            UPDATE seller_balances SET
                available_balance = $1,
                pending_balance = $2,
                total_earned = $3,
                total_paid_out = $4,
                total_refunded = $5,
                version = $6,
                updated_at = $7
            WHERE seller_id = $8 AND version = $9
        "#,
    )
    .bind(balance.available_balance.value())
    .bind(balance.pending_balance.value())
    .bind(balance.total_earned.value())
    .bind(balance.total_paid_out.value())
    .bind(balance.total_refunded.value())
    .bind(balance.version)
    .bind(Utc::now())
    .bind(balance.seller_id.as_str())
    .bind(expected_version)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        warn!("📒️ Balance of seller {} changed underneath us (version {expected_version})", balance.seller_id);
        return Err(SettlementError::Conflict(format!("Balance of seller {}", balance.seller_id)));
    }
    Ok(())
}

/// Applies a ledger entry for the seller: validates it, updates the balance snapshot and appends the ledger row.
pub async fn post_entry(
    seller_id: &SellerId,
    entry: LedgerEntry,
    conn: &mut SqliteConnection,
) -> Result<BalanceTransaction, SettlementError> {
    let current = fetch_or_create_balance(seller_id, conn).await?;
    let posting = ledger::post(&current, &entry)?;
    save_balance(&posting.balance, current.version, conn).await?;
    let tx: BalanceTransaction = sqlx::query_as(
        r#"
            INSERT INTO seller_balance_transactions (
                seller_id,
                transaction_type,
                amount,
                balance_before,
                balance_after,
                order_item_id,
                refund_id,
                payout_id,
                carry_forward,
                description,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *;
        "#,
    )
    .bind(seller_id.as_str())
    .bind(entry.transaction_type.to_string())
    .bind(entry.amount.value())
    .bind(posting.balance_before.value())
    .bind(posting.balance_after.value())
    .bind(entry.order_item_id)
    .bind(entry.refund_id)
    .bind(entry.payout_id)
    .bind(entry.carry_forward)
    .bind(entry.description)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    debug!(
        "📒️ Ledger #{} {} {} for seller {seller_id}. Balance {} -> {}",
        tx.id, tx.transaction_type, tx.amount, tx.balance_before, tx.balance_after
    );
    Ok(tx)
}

/// Moves `amount` from the seller's pending to available balance.
pub async fn release_hold(
    seller_id: &SellerId,
    amount: Paise,
    conn: &mut SqliteConnection,
) -> Result<SellerBalance, SettlementError> {
    let current = fetch_or_create_balance(seller_id, conn).await?;
    let released = ledger::release_hold(&current, amount)?;
    save_balance(&released, current.version, conn).await?;
    debug!("📒️ Released {amount} from pending to available for seller {seller_id}");
    Ok(released)
}

pub async fn record_last_payout(
    seller_id: &SellerId,
    amount: Paise,
    paid_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE seller_balances SET
            last_payout_amount = $1,
            last_payout_date = $2,
            version = version + 1,
            updated_at = $3
        WHERE seller_id = $4"#,
    )
    .bind(amount.value())
    .bind(paid_at)
    .bind(Utc::now())
    .bind(seller_id.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_transactions(
    seller_id: &SellerId,
    conn: &mut SqliteConnection,
) -> Result<Vec<BalanceTransaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM seller_balance_transactions WHERE seller_id = $1 ORDER BY id")
        .bind(seller_id.as_str())
        .fetch_all(conn)
        .await
}

/// Carry-forward debits for the seller that no pending, approved or paid payout has deducted yet.
pub async fn fetch_undeducted_debits(
    seller_id: &SellerId,
    conn: &mut SqliteConnection,
) -> Result<Vec<BalanceTransaction>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT * FROM seller_balance_transactions bt
        WHERE bt.seller_id = $1 AND bt.carry_forward = 1 AND bt.amount < 0
        AND NOT EXISTS (
            SELECT 1 FROM payout_deductions d
            JOIN seller_payouts p ON p.id = d.payout_id
            WHERE d.balance_transaction_id = bt.id AND p.status IN ('pending', 'approved', 'paid')
        )
        ORDER BY bt.id
        "#,
    )
    .bind(seller_id.as_str())
    .fetch_all(conn)
    .await
}
