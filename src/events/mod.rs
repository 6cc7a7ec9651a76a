//! Change event subsystem.
//!
//! # Data Flow
//! ```text
//! broker (nats.rs | memory.rs)
//!     → one mpsc channel per subscribed topic
//!     → subscriber.rs (one reader task per channel)
//!     → MessageHandler::handle
//!     → ack | nak(delay) | term, decided by the handler's FailureClass
//! ```
//!
//! # Design Decisions
//! - Connections only produce channels; settlement policy lives in the Subscriber
//! - A channel closing is what ends its reader
//! - Settlement failures are logged, never fatal to a reader

pub mod memory;
pub mod message;
pub mod nats;
pub mod subscriber;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::MemoryConnection;
pub use message::{Acker, ChangeEvent, ChangeMessage, EventType};
pub use nats::NatsConnection;
pub use subscriber::{HandlerError, MessageHandler, Subscriber, SubscriberError};

/// How a failed message should be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// May succeed on redelivery.
    Retryable,
    /// Will fail the same way on every delivery.
    Permanent,
    /// The process cannot continue.
    Fatal,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::Permanent => "permanent",
            Self::Fatal => "fatal",
        }
    }
}

/// Errors from the message broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("failed to connect to broker: {0}")]
    Connect(String),

    #[error("failed to subscribe to topic {topic:?}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("failed to publish message: {0}")]
    Publish(String),

    #[error("failed to read message metadata: {0}")]
    Metadata(String),

    #[error("failed to settle message: {0}")]
    Settle(String),

    #[error("broker connection is closed")]
    Closed,
}

/// Source of change notifications.
#[async_trait]
pub trait ChangeConnection: Send + Sync {
    /// Open a channel delivering the change events of `topic`.
    async fn subscribe_changes(&self, topic: &str) -> Result<mpsc::Receiver<ChangeEvent>, BrokerError>;

    /// Stop delivering and release the connection. Safe to call more than once.
    async fn close(&self) -> Result<(), BrokerError>;
}
