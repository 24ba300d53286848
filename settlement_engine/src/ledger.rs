//! # Seller balance ledger arithmetic
//!
//! Every change to a [`SellerBalance`] is computed here, with no I/O, so that the rules are applied identically by
//! every backend and can be tested in isolation. A backend reads the current snapshot, calls [`post`] (or
//! [`release_hold`]), and writes both the returned snapshot and the ledger row in the same database transaction.
//!
//! Rules:
//! * `sale_credit` adds to `pending_balance` and `total_earned`.
//! * `refund_debit`, and `balance_adjustment` with a negative amount, take from a positive `pending_balance` first,
//!   then from a positive `available_balance`. Whatever is left over is charged to `pending_balance`, which may go
//!   negative. These add to `total_refunded`.
//! * `balance_adjustment` with a positive amount adds to `available_balance` and `total_earned`.
//! * A negative `balance_adjustment` that belongs to a payout (the fees and tax it settles) comes out of
//!   `available_balance`, since the sales it settles were released there. It adds to `total_paid_out`.
//! * `payout_debit` takes from `available_balance` and adds to `total_paid_out`.
//!
//! After every change `balance_after == balance_before + amount` and
//! `available + pending == total_earned - total_paid_out - total_refunded` must hold. If either check fails, the
//! result is [`SettlementError::LedgerCorruption`] and the caller must abort its transaction.
use log::*;

use crate::{
    db_types::{BalanceTransaction, Paise, SellerBalance, TransactionType},
    traits::SettlementError,
};

/// A requested ledger movement. `amount` is signed: positive for credits, negative for debits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub transaction_type: TransactionType,
    pub amount: Paise,
    pub order_item_id: Option<i64>,
    pub refund_id: Option<i64>,
    pub payout_id: Option<i64>,
    pub carry_forward: bool,
    pub description: Option<String>,
}

impl LedgerEntry {
    fn new(transaction_type: TransactionType, amount: Paise) -> Self {
        Self {
            transaction_type,
            amount,
            order_item_id: None,
            refund_id: None,
            payout_id: None,
            carry_forward: false,
            description: None,
        }
    }

    pub fn sale_credit(order_item_id: i64, amount: Paise) -> Self {
        Self::new(TransactionType::SaleCredit, amount).for_item(order_item_id)
    }

    pub fn refund_debit(order_item_id: i64, refund_id: i64, amount: Paise) -> Self {
        Self::new(TransactionType::RefundDebit, -amount.abs()).for_item(order_item_id).for_refund(refund_id)
    }

    pub fn payout_debit(payout_id: i64, amount: Paise) -> Self {
        Self::new(TransactionType::PayoutDebit, -amount.abs()).for_payout(payout_id)
    }

    /// A signed adjustment. Negative amounts are debits.
    pub fn adjustment(amount: Paise) -> Self {
        Self::new(TransactionType::BalanceAdjustment, amount)
    }

    /// The fees, tax and manual adjustment settled when payout `payout_id` is paid.
    pub fn payout_settlement(payout_id: i64, amount: Paise) -> Self {
        Self::adjustment(amount).for_payout(payout_id)
    }

    fn is_payout_settlement(&self) -> bool {
        self.transaction_type == TransactionType::BalanceAdjustment && self.payout_id.is_some()
    }

    pub fn for_item(mut self, order_item_id: i64) -> Self {
        self.order_item_id = Some(order_item_id);
        self
    }

    pub fn for_refund(mut self, refund_id: i64) -> Self {
        self.refund_id = Some(refund_id);
        self
    }

    pub fn for_payout(mut self, payout_id: i64) -> Self {
        self.payout_id = Some(payout_id);
        self
    }

    pub fn carried_forward(mut self) -> Self {
        self.carry_forward = true;
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_debit(&self) -> bool {
        self.amount.is_negative()
    }
}

/// The result of posting an entry: the new snapshot and the before/after totals for the ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub balance: SellerBalance,
    pub balance_before: Paise,
    pub balance_after: Paise,
}

/// Applies `entry` to `current` and returns the updated snapshot. `current` is not modified.
pub fn post(current: &SellerBalance, entry: &LedgerEntry) -> Result<Posting, SettlementError> {
    check_consistent(current)?;
    validate_sign(entry)?;
    let mut next = current.clone();
    let amount = entry.amount;
    match entry.transaction_type {
        TransactionType::SaleCredit => {
            next.pending_balance += amount;
            next.total_earned += amount;
        },
        TransactionType::BalanceAdjustment if amount.is_positive() => {
            next.available_balance += amount;
            next.total_earned += amount;
        },
        TransactionType::BalanceAdjustment if entry.is_payout_settlement() => {
            settle_from_available(&mut next, amount.abs());
            next.total_paid_out += amount.abs();
        },
        TransactionType::RefundDebit | TransactionType::BalanceAdjustment => {
            split_debit(&mut next, amount.abs());
            next.total_refunded += amount.abs();
        },
        TransactionType::PayoutDebit => {
            next.available_balance -= amount.abs();
            next.total_paid_out += amount.abs();
        },
    }
    let balance_before = current.balance();
    let balance_after = next.balance();
    if balance_after != balance_before + amount {
        return Err(corruption(
            current,
            format!(
                "{} of {amount} moved the balance from {balance_before} to {balance_after}",
                entry.transaction_type
            ),
        ));
    }
    check_consistent(&next)?;
    next.version += 1;
    trace!(
        "📒️ {} {amount} for seller {}: {balance_before} -> {balance_after}",
        entry.transaction_type,
        current.seller_id
    );
    Ok(Posting { balance: next, balance_before, balance_after })
}

/// Moves `amount` of a held sale from pending to available. The total balance does not change, so no ledger row is
/// written for a release.
pub fn release_hold(current: &SellerBalance, amount: Paise) -> Result<SellerBalance, SettlementError> {
    check_consistent(current)?;
    if amount.is_negative() {
        return Err(SettlementError::ValidationError(format!("Cannot release a negative amount ({amount})")));
    }
    let mut next = current.clone();
    next.pending_balance -= amount;
    next.available_balance += amount;
    if next.balance() != current.balance() {
        return Err(corruption(current, format!("releasing {amount} changed the total balance")));
    }
    check_consistent(&next)?;
    next.version += 1;
    Ok(next)
}

/// Checks the snapshot invariant `available + pending == earned - paid_out - refunded`.
pub fn check_consistent(balance: &SellerBalance) -> Result<(), SettlementError> {
    if balance.is_consistent() {
        Ok(())
    } else {
        Err(corruption(
            balance,
            format!(
                "available {} + pending {} != earned {} - paid out {} - refunded {}",
                balance.available_balance,
                balance.pending_balance,
                balance.total_earned,
                balance.total_paid_out,
                balance.total_refunded
            ),
        ))
    }
}

fn validate_sign(entry: &LedgerEntry) -> Result<(), SettlementError> {
    let amount = entry.amount;
    let ok = match entry.transaction_type {
        TransactionType::SaleCredit => amount.is_positive(),
        TransactionType::RefundDebit | TransactionType::PayoutDebit => amount.is_negative(),
        TransactionType::BalanceAdjustment => !amount.is_zero(),
    };
    if ok {
        Ok(())
    } else {
        Err(SettlementError::ValidationError(format!("{} cannot have an amount of {amount}", entry.transaction_type)))
    }
}

/// Replays a seller's ledger rows, in the order they were written, and checks them against the balance snapshot:
/// * each row's `balance_after` is its `balance_before` plus its amount,
/// * each row starts where the previous one ended (the first starts at zero),
/// * the last row ends at the snapshot's balance,
/// * the snapshot's running totals are the sums of the matching rows.
pub fn verify_history(balance: &SellerBalance, history: &[BalanceTransaction]) -> Result<(), SettlementError> {
    check_consistent(balance)?;
    let mut running = Paise::ZERO;
    let mut earned = Paise::ZERO;
    let mut paid_out = Paise::ZERO;
    let mut refunded = Paise::ZERO;
    for tx in history {
        if tx.seller_id != balance.seller_id {
            return Err(corruption(balance, format!("ledger row #{} belongs to seller {}", tx.id, tx.seller_id)));
        }
        if tx.balance_before != running {
            return Err(corruption(
                balance,
                format!("ledger row #{} starts at {} but the previous row ended at {running}", tx.id, tx.balance_before),
            ));
        }
        if tx.balance_after != tx.balance_before + tx.amount {
            return Err(corruption(
                balance,
                format!("ledger row #{}: {} + {} != {}", tx.id, tx.balance_before, tx.amount, tx.balance_after),
            ));
        }
        running = tx.balance_after;
        match tx.transaction_type {
            TransactionType::SaleCredit => earned += tx.amount,
            TransactionType::BalanceAdjustment if tx.amount.is_positive() => earned += tx.amount,
            TransactionType::BalanceAdjustment if tx.payout_id.is_some() => paid_out += tx.amount.abs(),
            TransactionType::RefundDebit | TransactionType::BalanceAdjustment => refunded += tx.amount.abs(),
            TransactionType::PayoutDebit => paid_out += tx.amount.abs(),
        }
    }
    if running != balance.balance() {
        return Err(corruption(balance, format!("the ledger ends at {running} but the balance is {}", balance.balance())));
    }
    if (earned, paid_out, refunded) != (balance.total_earned, balance.total_paid_out, balance.total_refunded) {
        return Err(corruption(
            balance,
            format!(
                "the ledger sums to earned {earned}, paid out {paid_out}, refunded {refunded} but the snapshot says {}, \
                 {}, {}",
                balance.total_earned, balance.total_paid_out, balance.total_refunded
            ),
        ));
    }
    Ok(())
}

fn split_debit(balance: &mut SellerBalance, amount: Paise) {
    let from_pending = balance.pending_balance.positive_part().min(amount);
    let remaining = amount - from_pending;
    let from_available = balance.available_balance.positive_part().min(remaining);
    let shortfall = remaining - from_available;
    balance.pending_balance -= from_pending + shortfall;
    balance.available_balance -= from_available;
}

/// Payout settlements come out of available first. Anything available cannot cover is charged to pending.
fn settle_from_available(balance: &mut SellerBalance, amount: Paise) {
    let from_available = balance.available_balance.positive_part().min(amount);
    balance.available_balance -= from_available;
    balance.pending_balance -= amount - from_available;
}

fn corruption(balance: &SellerBalance, detail: String) -> SettlementError {
    error!("📒️ LEDGER CORRUPTION for seller {}: {detail}. The transaction will be aborted.", balance.seller_id);
    SettlementError::LedgerCorruption(format!("seller {}: {detail}", balance.seller_id))
}
