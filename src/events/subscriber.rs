//! Delivery loop with bounded redelivery.
//!
//! One reader task runs per subscribed topic. Each delivered event goes to the
//! registered [`MessageHandler`]; the outcome decides how the event is settled:
//!
//! | Handler result | Settlement |
//! |---|---|
//! | `Ok` | ack |
//! | `Retryable`, deliveries within the cap | nak with the fixed delay |
//! | `Retryable`, deliveries above the cap | term |
//! | `Permanent` | term |
//! | `Fatal` | nak, cancel the shutdown token, `listen` returns an error |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::events::{BrokerError, ChangeConnection, ChangeEvent, FailureClass};
use crate::observability::metrics;

/// Default delay before a negatively acknowledged event is redelivered.
pub const DEFAULT_NAK_DELAY: Duration = Duration::from_secs(10);

/// Failure returned by a [`MessageHandler`].
#[derive(Debug, Error)]
#[error("{source}")]
pub struct HandlerError {
    class: FailureClass,
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl HandlerError {
    pub fn new(class: FailureClass, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            class,
            source: source.into(),
        }
    }

    pub fn retryable(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::new(FailureClass::Retryable, source)
    }

    pub fn permanent(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::new(FailureClass::Permanent, source)
    }

    pub fn fatal(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::new(FailureClass::Fatal, source)
    }

    pub fn class(&self) -> FailureClass {
        self.class
    }
}

/// Processes delivered change events.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, event: &ChangeEvent) -> Result<(), HandlerError>;
}

#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("message handler callback is not registered")]
    HandlerNotRegistered,

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("fatal error processing event {id}: {reason}")]
    Fatal { id: String, reason: String },

    #[error("reader task failed: {0}")]
    Reader(#[from] tokio::task::JoinError),
}

/// Subscribes to change topics and drives the delivery loop.
pub struct Subscriber {
    connection: Arc<dyn ChangeConnection>,
    channels: Vec<(String, mpsc::Receiver<ChangeEvent>)>,
    handler: Option<Arc<dyn MessageHandler>>,
    max_msg_process_attempts: u64,
    nak_delay: Duration,
    shutdown: CancellationToken,
}

impl Subscriber {
    pub fn new(connection: Arc<dyn ChangeConnection>, shutdown: CancellationToken) -> Self {
        Self {
            connection,
            channels: Vec::new(),
            handler: None,
            max_msg_process_attempts: 0,
            nak_delay: DEFAULT_NAK_DELAY,
            shutdown,
        }
    }

    /// Maximum deliveries before a failing event is terminated; 0 is unlimited.
    pub fn with_max_msg_process_attempts(mut self, max: u64) -> Self {
        self.max_msg_process_attempts = max;
        self
    }

    pub fn with_nak_delay(mut self, delay: Duration) -> Self {
        self.nak_delay = delay;
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn set_handler(&mut self, handler: Arc<dyn MessageHandler>) {
        self.handler = Some(handler);
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|(topic, _)| topic.as_str())
    }

    /// Open a channel for `topic`. Failures are returned, not retried.
    pub async fn subscribe(&mut self, topic: &str) -> Result<(), SubscriberError> {
        tracing::debug!(topic = %topic, "Subscribing to topic");

        let rx = self.connection.subscribe_changes(topic).await?;
        self.channels.push((topic.to_string(), rx));

        Ok(())
    }

    /// Deliver events until every channel closes or shutdown is requested.
    pub async fn listen(&mut self) -> Result<(), SubscriberError> {
        let handler = self
            .handler
            .clone()
            .ok_or(SubscriberError::HandlerNotRegistered)?;

        let reader = Reader {
            handler,
            max_msg_process_attempts: self.max_msg_process_attempts,
            nak_delay: self.nak_delay,
            shutdown: self.shutdown.clone(),
        };

        let mut readers = JoinSet::new();
        for (topic, rx) in self.channels.drain(..) {
            tracing::info!(topic = %topic, "Listening for change events");
            readers.spawn(reader.clone().run(rx));
        }

        let mut result = Ok(());
        while let Some(joined) = readers.join_next().await {
            let outcome = joined.map_err(SubscriberError::from).and_then(|r| r);
            if let Err(e) = outcome {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        result
    }

    /// Release the broker connection.
    pub async fn close(&self) -> Result<(), SubscriberError> {
        tracing::info!("Closing change event connection");
        self.connection.close().await?;
        Ok(())
    }
}

#[derive(Clone)]
struct Reader {
    handler: Arc<dyn MessageHandler>,
    max_msg_process_attempts: u64,
    nak_delay: Duration,
    shutdown: CancellationToken,
}

impl Reader {
    async fn run(self, mut rx: mpsc::Receiver<ChangeEvent>) -> Result<(), SubscriberError> {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(()),
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => return Ok(()),
                },
            };

            self.process(event).await?;
        }
    }

    async fn process(&self, event: ChangeEvent) -> Result<(), SubscriberError> {
        let span = tracing::info_span!(
            "change_event",
            event.message.id = %event.id,
            event.message.topic = %event.topic,
            event.message.source = %event.source,
            event.message.timestamp = event.unix_timestamp(),
            event.message.deliveries = event.deliveries,
        );

        self.settle(event).instrument(span).await
    }

    async fn settle(&self, event: ChangeEvent) -> Result<(), SubscriberError> {
        let err = match self.handler.handle(&event).await {
            Ok(()) => {
                if let Err(e) = event.ack().await {
                    tracing::warn!(error = %e, "error occurred while acking");
                }
                metrics::record_message("ack");
                return Ok(());
            }
            Err(err) => err,
        };

        match err.class() {
            FailureClass::Permanent => {
                tracing::warn!(error = %err, "terminating event, permanent failure");
                self.term(&event).await;
            }
            FailureClass::Retryable if self.attempts_exhausted(&event) => {
                tracing::warn!(error = %err, "terminating event, too many attempts");
                self.term(&event).await;
            }
            FailureClass::Retryable => {
                tracing::warn!(error = %err, delay = ?self.nak_delay, "failed to process event, requesting redelivery");
                self.nak(&event).await;
            }
            FailureClass::Fatal => {
                tracing::error!(error = %err, "fatal error processing event, shutting down");
                self.nak(&event).await;
                self.shutdown.cancel();
                return Err(SubscriberError::Fatal {
                    id: event.id.clone(),
                    reason: err.to_string(),
                });
            }
        }

        Ok(())
    }

    fn attempts_exhausted(&self, event: &ChangeEvent) -> bool {
        self.max_msg_process_attempts != 0 && event.deliveries > self.max_msg_process_attempts
    }

    async fn nak(&self, event: &ChangeEvent) {
        if let Err(e) = event.nak(self.nak_delay).await {
            tracing::warn!(error = %e, "error occurred while naking");
        }
        metrics::record_message("nak");
    }

    async fn term(&self, event: &ChangeEvent) {
        if let Err(e) = event.term().await {
            tracing::warn!(error = %e, "error occurred while terminating event");
        }
        metrics::record_message("term");
    }
}
