//! Settlement policy knobs.
//!
//! The engine never reads the environment for these. The binary builds a [`SettlementConfig`] from its own
//! configuration and hands it to the APIs.
use std::fmt::Display;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

use crate::db_types::{OrderPayment, Paise};

pub const DEFAULT_HOLD_DAYS: i64 = 7;
pub const DEFAULT_SETTLEMENT_DAY: u32 = 28;
pub const DEFAULT_PROBATION_ORDERS: i64 = 3;
pub const DEFAULT_REFUND_METHOD: &str = "original_payment";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementConfig {
    pub hold_policy: HoldPolicy,
    /// The method recorded on refunds that the engine issues by itself (cancellations and approved returns).
    pub default_refund_method: String,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            hold_policy: HoldPolicy::default(),
            default_refund_method: DEFAULT_REFUND_METHOD.to_string(),
        }
    }
}

impl SettlementConfig {
    pub fn with_hold_policy(mut self, hold_policy: HoldPolicy) -> Self {
        self.hold_policy = hold_policy;
        self
    }
}

/// Decides when a delivered item becomes eligible for payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldPolicy {
    /// Eligible a fixed time after delivery.
    Window(Duration),
    /// Eligible on `day` of a month, 00:00 UTC. A seller's first `probation_orders` deliveries wait for `day` of the
    /// month after delivery; later deliveries only wait for `day` of the delivery month (which may already have passed).
    MonthlyCutoff { day: u32, probation_orders: i64 },
}

impl Default for HoldPolicy {
    fn default() -> Self {
        HoldPolicy::Window(Duration::days(DEFAULT_HOLD_DAYS))
    }
}

impl Display for HoldPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoldPolicy::Window(d) => write!(f, "{} second hold after delivery", d.num_seconds()),
            HoldPolicy::MonthlyCutoff { day, probation_orders } => {
                write!(f, "monthly settlement on day {day} ({probation_orders} probation orders)")
            },
        }
    }
}

impl HoldPolicy {
    /// The settlement deadline for an item delivered at `delivered_at`. `prior_deliveries` is the number of items the
    /// seller had delivered before this one.
    pub fn hold_until(&self, delivered_at: DateTime<Utc>, prior_deliveries: i64) -> DateTime<Utc> {
        match *self {
            HoldPolicy::Window(window) => delivered_at + window,
            HoldPolicy::MonthlyCutoff { day, probation_orders } => {
                let (year, month) = if prior_deliveries < probation_orders {
                    next_month(delivered_at.year(), delivered_at.month())
                } else {
                    (delivered_at.year(), delivered_at.month())
                };
                settlement_date(year, month, day)
            },
        }
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Midnight UTC on `day` of the month, clamped to the last day of short months.
fn settlement_date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    let date = (1..=day.max(1))
        .rev()
        .find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
        .and_then(|d| d.and_hms_opt(0, 0, 0));
    match date {
        Some(naive) => Utc.from_utc_datetime(&naive),
        // Only reachable for years chrono cannot represent
        None => DateTime::<Utc>::MAX_UTC,
    }
}

/// The share of an order payment's gateway fee and tax that belongs to one item of the order, in proportion to the
/// item's subtotal. No payment on record means no fee or tax.
pub fn allocate_fees(payment: Option<&OrderPayment>, item_subtotal: Paise) -> (Paise, Paise) {
    match payment {
        Some(p) => (
            p.gateway_fee.pro_rata(item_subtotal, p.amount),
            p.gateway_tax.pro_rata(item_subtotal, p.amount),
        ),
        None => (Paise::ZERO, Paise::ZERO),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn window_hold() {
        let policy = HoldPolicy::Window(Duration::days(7));
        assert_eq!(policy.hold_until(ts("2024-03-01T10:00:00Z"), 0), ts("2024-03-08T10:00:00Z"));
    }

    #[test]
    fn monthly_hold_for_new_sellers_waits_a_month() {
        let policy = HoldPolicy::MonthlyCutoff { day: 28, probation_orders: 3 };
        assert_eq!(policy.hold_until(ts("2024-03-05T10:00:00Z"), 0), ts("2024-04-28T00:00:00Z"));
        assert_eq!(policy.hold_until(ts("2024-12-30T10:00:00Z"), 2), ts("2025-01-28T00:00:00Z"));
        assert_eq!(policy.hold_until(ts("2024-03-05T10:00:00Z"), 3), ts("2024-03-28T00:00:00Z"));
    }

    #[test]
    fn settlement_day_is_clamped() {
        assert_eq!(settlement_date(2023, 2, 31), ts("2023-02-28T00:00:00Z"));
        assert_eq!(settlement_date(2024, 2, 30), ts("2024-02-29T00:00:00Z"));
    }

    #[test]
    fn fee_allocation() {
        let payment = OrderPayment {
            id: 1,
            order_id: "ord-1".into(),
            amount: Paise::from(30_000),
            gateway_fee: Paise::from(600),
            gateway_tax: Paise::from(108),
            gateway_reference: None,
            created_at: Utc::now(),
        };
        assert_eq!(allocate_fees(Some(&payment), Paise::from(10_000)), (Paise::from(200), Paise::from(36)));
        assert_eq!(allocate_fees(Some(&payment), Paise::from(20_000)), (Paise::from(400), Paise::from(72)));
        assert_eq!(allocate_fees(None, Paise::from(20_000)), (Paise::ZERO, Paise::ZERO));
    }
}
