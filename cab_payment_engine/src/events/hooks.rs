use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, PaymentRejectedEvent, PaymentVerifiedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub payment_verified_producer: Vec<EventProducer<PaymentVerifiedEvent>>,
    pub payment_rejected_producer: Vec<EventProducer<PaymentRejectedEvent>>,
}

pub struct EventHandlers {
    pub on_payment_verified: Option<EventHandler<PaymentVerifiedEvent>>,
    pub on_payment_rejected: Option<EventHandler<PaymentRejectedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_payment_verified = hooks.on_payment_verified.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_rejected = hooks.on_payment_rejected.map(|f| EventHandler::new(buffer_size, f));
        Self { on_payment_verified, on_payment_rejected }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_payment_verified {
            result.payment_verified_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_rejected {
            result.payment_rejected_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_payment_verified {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_payment_rejected {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_payment_verified: Option<Handler<PaymentVerifiedEvent>>,
    pub on_payment_rejected: Option<Handler<PaymentRejectedEvent>>,
}

impl EventHooks {
    pub fn on_payment_verified<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentVerifiedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_verified = Some(Arc::new(f));
        self
    }

    pub fn on_payment_rejected<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentRejectedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_rejected = Some(Arc::new(f));
        self
    }
}
