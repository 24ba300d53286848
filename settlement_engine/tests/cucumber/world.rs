use std::{collections::HashMap, fmt::Debug};

use cucumber::World;
use log::*;
use settlement_engine::{
    db_types::{OrderItem, SellerId, SellerPayout},
    SettlementDatabase,
};

use crate::support::Harness;

#[derive(Default, Debug, World)]
pub struct SettlementWorld {
    pub system: Option<SettlementSystem>,
    /// Order items by the label the feature file gave them
    pub items: HashMap<String, OrderItem>,
    pub last_error: Option<String>,
}

pub struct SettlementSystem {
    pub harness: Harness,
}

impl Debug for SettlementSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementSystem ({})", self.db_path())
    }
}

impl SettlementSystem {
    pub async fn new() -> Self {
        let harness = Harness::new().await;
        debug!("Created database: {}", harness.db.url());
        Self { harness }
    }

    pub fn db_path(&self) -> &str {
        self.harness.db.url()
    }
}

impl SettlementWorld {
    pub fn system(&self) -> &Harness {
        &self.system.as_ref().expect("Settlement system not initialised").harness
    }

    pub fn item(&self, label: &str) -> &OrderItem {
        self.items.get(label).unwrap_or_else(|| panic!("No item called {label}"))
    }

    /// The seller's most recent payout.
    pub async fn latest_payout(&self, seller: &str) -> SellerPayout {
        let payouts = self.system().payouts.payouts_for_seller(&SellerId::from(seller)).await.expect("Error fetching payouts");
        payouts.into_iter().last().unwrap_or_else(|| panic!("Seller {seller} has no payouts"))
    }
}
