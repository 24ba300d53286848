//! Seller and buyer notifications.
//!
//! The worker subscribes to the engine's refund, quality check and payout events and turns them into messages for
//! the people involved. Delivery is left to the log for now; the hooks are where a mail or push service plugs in.
use futures::future::BoxFuture;
use log::*;
use settlement_engine::{
    db_types::{PayoutStatus, QcResult, RefundStatus},
    events::{EventHandlers, EventHooks, PayoutStatusChangedEvent, RefundUpdatedEvent, ReturnQualityCheckEvent},
};

const NOTIFICATION_BUFFER_SIZE: usize = 25;

pub fn create_notification_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_refund_updated(|ev| {
        if let Some(message) = refund_message(&ev) {
            info!("📬️ To buyer of item #{}: {message}", ev.refund.order_item_id);
        }
        no_op()
    });
    hooks.on_return_quality_check(|ev| {
        info!("📬️ To buyer of item #{}: {}", ev.order_return.order_item_id, quality_check_message(&ev));
        no_op()
    });
    hooks.on_payout_status_changed(|ev| {
        if let Some(message) = payout_message(&ev) {
            info!("📬️ To seller {}: {message}", ev.payout.seller_id);
        }
        no_op()
    });
    EventHandlers::new(NOTIFICATION_BUFFER_SIZE, hooks)
}

/// Buyers hear about a refund once the gateway has it, and again when it completes or fails.
pub fn refund_message(ev: &RefundUpdatedEvent) -> Option<String> {
    let refund = &ev.refund;
    match refund.status {
        RefundStatus::Pending => None,
        RefundStatus::Processing => Some(format!("Your refund of {} is on its way.", refund.amount)),
        RefundStatus::Completed => Some(format!("Your refund of {} has been completed.", refund.amount)),
        RefundStatus::Failed => Some(format!(
            "We could not complete your refund of {}. Our support team will contact you. ({})",
            refund.amount,
            refund.failure_reason.as_deref().unwrap_or("no reason given")
        )),
    }
}

pub fn quality_check_message(ev: &ReturnQualityCheckEvent) -> String {
    match ev.quality_check.result {
        QcResult::Passed => format!("Return #{} passed inspection. A refund has been issued.", ev.order_return.id),
        QcResult::Failed => format!(
            "Return #{} did not pass inspection. {}",
            ev.order_return.id,
            ev.quality_check.remarks.as_deref().unwrap_or("")
        )
        .trim_end()
        .to_string(),
    }
}

pub fn payout_message(ev: &PayoutStatusChangedEvent) -> Option<String> {
    let payout = &ev.payout;
    let period = payout.period();
    match payout.status {
        PayoutStatus::Pending if ev.old_status.is_none() => {
            Some(format!("Your {period} payout of {} is awaiting approval.", payout.net_amount))
        },
        PayoutStatus::Pending => None,
        PayoutStatus::Approved => Some(format!("Your {period} payout of {} has been approved.", payout.net_amount)),
        PayoutStatus::Paid => Some(format!(
            "Your {period} payout of {} has been paid. Reference: {}",
            payout.net_amount,
            payout.payment_reference.as_deref().unwrap_or("none")
        )),
        PayoutStatus::Rejected => Some(format!(
            "Your {period} payout was rejected. {}",
            payout.rejection_reason.as_deref().unwrap_or("")
        )),
    }
}

fn no_op() -> BoxFuture<'static, ()> {
    Box::pin(async {})
}
