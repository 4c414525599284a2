use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, OrderEvent, PledgeEvent, PledgeFailedEvent};

/// A container struct for holding event producers for the different event types.
///
/// An EventProducer is a thin wrapper around an mpsc sender. You don't create this struct directly, but rather use
/// the [`EventHandlers::producers`] method to generate it. The engine clones it and publishes fire-and-forget
/// events as lifecycle transitions happen; none of them gate correctness.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_created_producer: Vec<EventProducer<OrderEvent>>,
    pub pledge_success_producer: Vec<EventProducer<PledgeEvent>>,
    pub pledge_failed_producer: Vec<EventProducer<PledgeFailedEvent>>,
    pub order_completed_producer: Vec<EventProducer<OrderEvent>>,
    pub order_expired_producer: Vec<EventProducer<OrderEvent>>,
}

/// A container struct for holding event handlers for the different event types. These handlers are typically hooks
/// that let other modules (the push dispatcher, above all) respond to engine events.
pub struct EventHandlers {
    pub on_order_created: Option<EventHandler<OrderEvent>>,
    pub on_pledge_success: Option<EventHandler<PledgeEvent>>,
    pub on_pledge_failed: Option<EventHandler<PledgeFailedEvent>>,
    pub on_order_completed: Option<EventHandler<OrderEvent>>,
    pub on_order_expired: Option<EventHandler<OrderEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_created = hooks.on_order_created.map(|f| EventHandler::new(buffer_size, f));
        let on_pledge_success = hooks.on_pledge_success.map(|f| EventHandler::new(buffer_size, f));
        let on_pledge_failed = hooks.on_pledge_failed.map(|f| EventHandler::new(buffer_size, f));
        let on_order_completed = hooks.on_order_completed.map(|f| EventHandler::new(buffer_size, f));
        let on_order_expired = hooks.on_order_expired.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_created, on_pledge_success, on_pledge_failed, on_order_completed, on_order_expired }
    }

    pub fn producers(&self) -> EventProducers {
        let mut producers = EventProducers::default();
        if let Some(handler) = &self.on_order_created {
            producers.order_created_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_pledge_success {
            producers.pledge_success_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_pledge_failed {
            producers.pledge_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_completed {
            producers.order_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_expired {
            producers.order_expired_producer.push(handler.subscribe());
        }
        producers
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_created {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_pledge_success {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_pledge_failed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_completed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_expired {
            tokio::spawn(handler.start_handler());
        }
    }
}

/// EventHooks holds the callback functions that are called when an event is triggered.
///
/// Populate it with the hooks you want and hand it to [`EventHandlers::new`]; the server calls `start_handlers` to
/// spin up the mpsc dispatch loops.
#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_created: Option<Handler<OrderEvent>>,
    pub on_pledge_success: Option<Handler<PledgeEvent>>,
    pub on_pledge_failed: Option<Handler<PledgeFailedEvent>>,
    pub on_order_completed: Option<Handler<OrderEvent>>,
    pub on_order_expired: Option<Handler<OrderEvent>>,
}

impl EventHooks {
    pub fn on_order_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_created = Some(Arc::new(f));
        self
    }

    pub fn on_pledge_success<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PledgeEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_pledge_success = Some(Arc::new(f));
        self
    }

    pub fn on_pledge_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PledgeFailedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_pledge_failed = Some(Arc::new(f));
        self
    }

    pub fn on_order_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_completed = Some(Arc::new(f));
        self
    }

    pub fn on_order_expired<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_expired = Some(Arc::new(f));
        self
    }
}
