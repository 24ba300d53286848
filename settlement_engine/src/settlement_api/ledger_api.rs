//! Read-only access to seller money.

use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{BalanceTransaction, SellerBalance, SellerId},
    ledger,
    traits::{LedgerManagement, SettlementError},
};

/// `LedgerApi` answers "what is this seller owed, and why". It never writes: ledger rows only appear as side effects
/// of order, refund and payout transitions.
pub struct LedgerApi<B> {
    db: B,
}

impl<B: Debug> Debug for LedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApi ({:?})", self.db)
    }
}

impl<B> LedgerApi<B>
where B: LedgerManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// The seller's balance snapshot. A seller with no ledger activity has an all-zero balance.
    pub async fn balance(&self, seller_id: &SellerId) -> Result<SellerBalance, SettlementError> {
        let balance = self.db.fetch_seller_balance(seller_id).await?;
        Ok(balance.unwrap_or_else(|| SellerBalance::new(seller_id.clone())))
    }

    pub async fn history(&self, seller_id: &SellerId) -> Result<Vec<BalanceTransaction>, SettlementError> {
        self.db.fetch_ledger(seller_id).await
    }

    /// Replays the seller's ledger and checks it against the snapshot. A mismatch is
    /// [`SettlementError::LedgerCorruption`] and needs an operator.
    pub async fn verify_seller(&self, seller_id: &SellerId) -> Result<SellerBalance, SettlementError> {
        let balance = self.balance(seller_id).await?;
        let history = self.db.fetch_ledger(seller_id).await?;
        ledger::verify_history(&balance, &history)?;
        debug!("📒️ Ledger of seller {seller_id} verified: {} rows, balance {}", history.len(), balance.balance());
        Ok(balance)
    }
}
