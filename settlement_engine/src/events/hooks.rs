use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderStatusChangedEvent,
    PayoutStatusChangedEvent,
    RefundUpdatedEvent,
    ReturnQualityCheckEvent,
};

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The publishing ends of the event channels. The APIs hold one of these and publish to every producer in the
/// matching list after a state change commits.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_status_changed_producer: Vec<EventProducer<OrderStatusChangedEvent>>,
    pub return_quality_check_producer: Vec<EventProducer<ReturnQualityCheckEvent>>,
    pub refund_updated_producer: Vec<EventProducer<RefundUpdatedEvent>>,
    pub payout_status_changed_producer: Vec<EventProducer<PayoutStatusChangedEvent>>,
}

impl EventProducers {
    pub async fn publish_order_status_changed(&self, event: OrderStatusChangedEvent) {
        for producer in &self.order_status_changed_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_return_quality_check(&self, event: ReturnQualityCheckEvent) {
        for producer in &self.return_quality_check_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_refund_updated(&self, event: RefundUpdatedEvent) {
        for producer in &self.refund_updated_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_payout_status_changed(&self, event: PayoutStatusChangedEvent) {
        for producer in &self.payout_status_changed_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_status_changed: Option<EventHandler<OrderStatusChangedEvent>>,
    pub on_return_quality_check: Option<EventHandler<ReturnQualityCheckEvent>>,
    pub on_refund_updated: Option<EventHandler<RefundUpdatedEvent>>,
    pub on_payout_status_changed: Option<EventHandler<PayoutStatusChangedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_status_changed = hooks.on_order_status_changed.map(|f| EventHandler::new(buffer_size, f));
        let on_return_quality_check = hooks.on_return_quality_check.map(|f| EventHandler::new(buffer_size, f));
        let on_refund_updated = hooks.on_refund_updated.map(|f| EventHandler::new(buffer_size, f));
        let on_payout_status_changed = hooks.on_payout_status_changed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_status_changed, on_return_quality_check, on_refund_updated, on_payout_status_changed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_status_changed {
            result.order_status_changed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_return_quality_check {
            result.return_quality_check_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_refund_updated {
            result.refund_updated_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payout_status_changed {
            result.payout_status_changed_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns one task per configured handler. Each task ends once every producer subscribed to it is dropped.
    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_status_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_return_quality_check {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_refund_updated {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_payout_status_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_status_changed: Option<Handler<OrderStatusChangedEvent>>,
    pub on_return_quality_check: Option<Handler<ReturnQualityCheckEvent>>,
    pub on_refund_updated: Option<Handler<RefundUpdatedEvent>>,
    pub on_payout_status_changed: Option<Handler<PayoutStatusChangedEvent>>,
}

impl EventHooks {
    pub fn on_order_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderStatusChangedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_order_status_changed = Some(Arc::new(f));
        self
    }

    pub fn on_return_quality_check<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ReturnQualityCheckEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_return_quality_check = Some(Arc::new(f));
        self
    }

    pub fn on_refund_updated<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RefundUpdatedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_refund_updated = Some(Arc::new(f));
        self
    }

    pub fn on_payout_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PayoutStatusChangedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_payout_status_changed = Some(Arc::new(f));
        self
    }
}
