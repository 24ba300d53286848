#![allow(dead_code)]
//! A fresh database and every API wired to the same mock gateway.

use chrono::{DateTime, Utc};
use log::*;
use settlement_engine::{
    db_types::{Actor, NewOrderItem, OrderItem, OrderItemStatus, Paise, PayoutPeriod, SellerBalance, SellerId},
    events::EventProducers,
    test_utils::{
        mock_gateway::MockGateway,
        prepare_env::{prepare_test_env, random_db_path},
    },
    LedgerApi,
    OrderFlowApi,
    PayoutApi,
    RefundApi,
    ReturnFlowApi,
    SettlementConfig,
    SettlementDatabase,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub type Db = SqliteDatabase;

pub struct Harness {
    pub db: Db,
    pub gateway: MockGateway,
    pub orders: OrderFlowApi<Db, MockGateway>,
    pub returns: ReturnFlowApi<Db, MockGateway>,
    pub refunds: RefundApi<Db, MockGateway>,
    pub payouts: PayoutApi<Db, MockGateway>,
    pub ledger: LedgerApi<Db>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let gateway = MockGateway::new();
        let config = SettlementConfig::default();
        let orders = OrderFlowApi::new(db.clone(), gateway.clone(), producers.clone(), config.clone());
        let returns = ReturnFlowApi::new(db.clone(), gateway.clone(), producers.clone(), config);
        let refunds = RefundApi::new(db.clone(), gateway.clone(), producers.clone());
        let payouts = PayoutApi::new(db.clone(), gateway.clone(), producers);
        let ledger = LedgerApi::new(db.clone());
        Self { db, gateway, orders, returns, refunds, payouts, ledger }
    }

    pub async fn tear_down(self) {
        let url = self.db.url().to_string();
        self.db.pool().close().await;
        drop(self);
        if let Err(e) = Sqlite::drop_database(&url).await {
            warn!("🚀️ Could not remove test database {url}: {e}");
        }
    }

    /// Places an item and walks it to `shipped`.
    pub async fn shipped_item(&self, order_id: &str, seller: &str, rupees: i64) -> OrderItem {
        let buyer = Actor::buyer("buyer-1");
        let seller_actor = Actor::seller(seller);
        let new_item = NewOrderItem::new(order_id, SellerId::from(seller), "listing-1", 1, Paise::from_rupees(rupees));
        let item = self.orders.place_order_item(new_item, &buyer).await.expect("Error placing order item");
        let steps = [
            (OrderItemStatus::Pending, OrderItemStatus::Confirmed),
            (OrderItemStatus::Confirmed, OrderItemStatus::Packed),
            (OrderItemStatus::Packed, OrderItemStatus::Shipped),
        ];
        for (from, to) in steps {
            self.orders.transition(item.id, from, to, &seller_actor, None).await.expect("Error moving order item");
        }
        self.orders.fetch_order_item(item.id).await.unwrap().unwrap()
    }

    /// Places an item and delivers it at `delivered_at`.
    pub async fn delivered_item(
        &self,
        order_id: &str,
        seller: &str,
        rupees: i64,
        delivered_at: DateTime<Utc>,
    ) -> OrderItem {
        let item = self.shipped_item(order_id, seller, rupees).await;
        let courier = Actor::system();
        let result = self
            .orders
            .deliver_at(item.id, OrderItemStatus::Shipped, &courier, None, delivered_at)
            .await
            .expect("Error delivering order item");
        result.change.item
    }

    pub async fn balance(&self, seller: &str) -> SellerBalance {
        self.ledger.balance(&SellerId::from(seller)).await.expect("Error fetching balance")
    }
}

pub fn period() -> PayoutPeriod {
    PayoutPeriod::new(6, 2026)
}

pub fn admin() -> Actor {
    Actor::admin("admin-1")
}

pub fn rupees(r: i64) -> Paise {
    Paise::from_rupees(r)
}
