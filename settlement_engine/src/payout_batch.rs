//! Payout arithmetic.
//!
//! ```text
//! net_amount = gross_sales - fees - tax - refund_deductions + previous_balance + balance_adjustment
//! ```
//!
//! * `gross_sales`, `fees` and `tax` sum the item snapshots that have not been refunded.
//! * `refund_deductions` sums the carry-forward `refund_debit`s the payout absorbs.
//! * `previous_balance` is the negative net amount of the last paid payout (if it has not been carried already), less
//!   the carry-forward `balance_adjustment` debits, i.e. refunds of items that an earlier payout already paid out.
//! * `balance_adjustment` is the admin's manual adjustment.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{BalanceTransaction, Paise, PayoutDeduction, PayoutItem, SellerPayout, TransactionType};

/// A carry-forward debit as seen by a payout. `amount` is the positive size of the debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deduction {
    pub transaction_type: TransactionType,
    pub amount: Paise,
}

impl From<&BalanceTransaction> for Deduction {
    fn from(tx: &BalanceTransaction) -> Self {
        Self { transaction_type: tx.transaction_type, amount: tx.amount.abs() }
    }
}

impl From<&PayoutDeduction> for Deduction {
    fn from(d: &PayoutDeduction) -> Self {
        Self { transaction_type: d.transaction_type, amount: d.amount.abs() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutTotals {
    pub gross_sales: Paise,
    pub fees: Paise,
    pub tax: Paise,
    pub refund_deductions: Paise,
    pub previous_balance: Paise,
    pub balance_adjustment: Paise,
    pub net_amount: Paise,
    pub item_count: i64,
}

impl PayoutTotals {
    /// Refunded items are skipped. `carry_in` is the (zero or negative) net amount carried over from the last paid
    /// payout.
    pub fn compute(items: &[PayoutItem], deductions: &[Deduction], carry_in: Paise, balance_adjustment: Paise) -> Self {
        let included = items.iter().filter(|i| !i.is_refunded);
        let mut totals = PayoutTotals { balance_adjustment, previous_balance: carry_in, ..Default::default() };
        for item in included {
            totals.gross_sales += item.item_subtotal;
            totals.fees += item.allocated_fee;
            totals.tax += item.allocated_tax;
            totals.item_count += 1;
        }
        for d in deductions {
            match d.transaction_type {
                TransactionType::BalanceAdjustment => totals.previous_balance -= d.amount.abs(),
                _ => totals.refund_deductions += d.amount.abs(),
            }
        }
        totals.net_amount = totals.gross_sales - totals.fees - totals.tax - totals.refund_deductions +
            totals.previous_balance +
            totals.balance_adjustment;
        totals
    }

    /// The ledger adjustment written when the payout is paid, so that the seller's balance is reduced by exactly what
    /// the payout settles: fees and tax come off, the manual adjustment goes on.
    pub fn settlement_adjustment(&self) -> Paise {
        self.balance_adjustment - self.fees - self.tax
    }
}

impl From<&SellerPayout> for PayoutTotals {
    fn from(p: &SellerPayout) -> Self {
        Self {
            gross_sales: p.gross_sales,
            fees: p.fees,
            tax: p.tax,
            refund_deductions: p.refund_deductions,
            previous_balance: p.previous_balance,
            balance_adjustment: p.balance_adjustment,
            net_amount: p.net_amount,
            item_count: p.item_count,
        }
    }
}

/// The pending-settlement records whose hold has elapsed at `as_of`.
pub fn past_hold(records: Vec<PayoutItem>, as_of: DateTime<Utc>) -> Vec<PayoutItem> {
    records.into_iter().filter(|r| r.settlement_hold_until <= as_of).collect()
}
