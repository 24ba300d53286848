use crate::{
    db_types::{BalanceTransaction, SellerBalance, SellerId},
    traits::SettlementError,
};

/// Read access to the seller ledger. Writes only ever happen as part of the state changes in the other traits.
#[allow(async_fn_in_trait)]
pub trait LedgerManagement {
    async fn fetch_seller_balance(&self, seller_id: &SellerId) -> Result<Option<SellerBalance>, SettlementError>;

    /// The seller's ledger in the order it was written.
    async fn fetch_ledger(&self, seller_id: &SellerId) -> Result<Vec<BalanceTransaction>, SettlementError>;
}
