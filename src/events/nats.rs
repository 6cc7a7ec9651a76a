//! NATS JetStream change connection.
//!
//! Topic `t` maps to the subject `{prefix}.changes.*.{t}` on the configured
//! stream. Each topic gets a durable pull consumer named after this process's
//! queue group, so every manager instance sees every change. A forwarder task
//! per consumer moves messages into the topic's channel until the connection
//! is closed or shutdown is requested.

use std::time::{Duration, SystemTime};

use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, DeliverPolicy},
    AckKind,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::NatsConfig;
use crate::events::{Acker, BrokerError, ChangeConnection, ChangeEvent};

const QUEUE_GROUP_PREFIX: &str = "lbmanager-haproxy-";
const QUEUE_GROUP_RAND_LEN: usize = 10;
const QUEUE_GROUP_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz1234567890";
const CONNECTION_NAME: &str = "loadbalancer-manager-haproxy";

/// Random consumer name prefix, e.g. `lbmanager-haproxy-k2j4h1m9xq-`.
pub fn generate_queue_group() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..QUEUE_GROUP_RAND_LEN)
        .map(|_| QUEUE_GROUP_CHARSET[rng.gen_range(0..QUEUE_GROUP_CHARSET.len())] as char)
        .collect();

    format!("{QUEUE_GROUP_PREFIX}{suffix}-")
}

/// Subject carrying the change events of `topic`.
pub fn change_subject(prefix: &str, topic: &str) -> String {
    format!("{prefix}.changes.*.{topic}")
}

/// Durable consumer name for `topic`; JetStream names cannot contain subject tokens.
pub fn consumer_name(queue_group: &str, topic: &str) -> String {
    let topic: String = topic
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    format!("{queue_group}{topic}")
}

/// Pull consumer settings for one topic.
///
/// Consumers only see changes published after they are created; the startup
/// reconciliation already covers anything older.
pub fn consumer_config(name: &str, filter_subject: String, inactive_threshold: Duration) -> pull::Config {
    pull::Config {
        durable_name: Some(name.to_string()),
        filter_subject,
        deliver_policy: DeliverPolicy::New,
        ack_policy: AckPolicy::Explicit,
        inactive_threshold,
        ..Default::default()
    }
}

/// Change connection backed by NATS JetStream.
pub struct NatsConnection {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: NatsConfig,
    queue_group: String,
    closed: CancellationToken,
}

impl NatsConnection {
    /// Connect to the server; forwarders stop when `shutdown` is cancelled.
    pub async fn connect(config: &NatsConfig, shutdown: &CancellationToken) -> Result<Self, BrokerError> {
        let mut options = async_nats::ConnectOptions::new().name(CONNECTION_NAME);

        if let Some(path) = &config.credentials_file {
            options = options
                .credentials_file(path)
                .await
                .map_err(|e| BrokerError::Connect(format!("failed to read credentials {path:?}: {e}")))?;
        }

        let client = options
            .connect(config.url.as_str())
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;

        let queue_group = if config.queue_group.is_empty() {
            generate_queue_group()
        } else {
            config.queue_group.clone()
        };

        tracing::info!(
            url = %config.url,
            stream = %config.stream,
            queue_group = %queue_group,
            "Connected to NATS"
        );

        Ok(Self {
            jetstream: jetstream::new(client.clone()),
            client,
            config: config.clone(),
            queue_group,
            closed: shutdown.child_token(),
        })
    }

    pub fn queue_group(&self) -> &str {
        &self.queue_group
    }

    async fn open_consumer(&self, topic: &str) -> Result<pull::Stream, String> {
        let stream = self
            .jetstream
            .get_stream(&self.config.stream)
            .await
            .map_err(|e| format!("stream {:?}: {e}", self.config.stream))?;

        let name = consumer_name(&self.queue_group, topic);
        let consumer: jetstream::consumer::PullConsumer = stream
            .get_or_create_consumer(
                &name,
                consumer_config(
                    &name,
                    change_subject(&self.config.subject_prefix, topic),
                    Duration::from_secs(self.config.consumer_inactive_secs),
                ),
            )
            .await
            .map_err(|e| format!("consumer {name:?}: {e}"))?;

        consumer
            .messages()
            .await
            .map_err(|e| format!("consumer {name:?} messages: {e}"))
    }
}

#[async_trait]
impl ChangeConnection for NatsConnection {
    async fn subscribe_changes(&self, topic: &str) -> Result<mpsc::Receiver<ChangeEvent>, BrokerError> {
        if self.closed.is_cancelled() {
            return Err(BrokerError::Closed);
        }

        let mut messages = self
            .open_consumer(topic)
            .await
            .map_err(|reason| BrokerError::Subscribe {
                topic: topic.to_string(),
                reason,
            })?;

        let (tx, rx) = mpsc::channel(1);
        let closed = self.closed.clone();
        let topic = topic.to_string();

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = closed.cancelled() => break,
                    next = messages.next() => next,
                };

                let message = match next {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        tracing::warn!(topic = %topic, error = %e, "error receiving change event");
                        continue;
                    }
                    None => break,
                };

                let acker = NatsAcker { message };
                match metadata(&acker.message) {
                    Ok(metadata) => {
                        if tx.send(into_event(&topic, acker, metadata)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => reject(&topic, &acker, &e).await,
                }
            }

            tracing::debug!(topic = %topic, "change event forwarder stopped");
        });

        Ok(rx)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.cancel();
        self.client
            .flush()
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))
    }
}

struct Metadata {
    id: String,
    deliveries: u64,
    timestamp: SystemTime,
}

fn metadata(message: &jetstream::Message) -> Result<Metadata, BrokerError> {
    let info = message.info().map_err(|e| BrokerError::Metadata(e.to_string()))?;

    Ok(Metadata {
        id: format!("{}.{}", info.stream, info.stream_sequence),
        deliveries: u64::try_from(info.delivered).unwrap_or(1).max(1),
        timestamp: SystemTime::from(info.published),
    })
}

fn into_event(topic: &str, acker: NatsAcker, metadata: Metadata) -> ChangeEvent {
    let source = acker.message.subject.to_string();
    let payload = acker.message.payload.to_vec();

    ChangeEvent::new(topic, payload, Box::new(acker))
        .with_id(metadata.id)
        .with_source(source)
        .with_timestamp(metadata.timestamp)
        .with_deliveries(metadata.deliveries)
}

/// Terminate a delivery that cannot be turned into an event. Left unsettled
/// it would be redelivered after every ack wait without ever reaching the
/// attempt cap.
async fn reject(topic: &str, acker: &dyn Acker, err: &BrokerError) {
    tracing::warn!(topic = %topic, error = %err, "terminating unreadable change event");

    if let Err(e) = acker.term().await {
        tracing::warn!(topic = %topic, error = %e, "error occurred while terminating event");
    }
}

struct NatsAcker {
    message: jetstream::Message,
}

#[async_trait]
impl Acker for NatsAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.message
            .ack()
            .await
            .map_err(|e| BrokerError::Settle(e.to_string()))
    }

    async fn nak(&self, delay: Duration) -> Result<(), BrokerError> {
        self.message
            .ack_with(AckKind::Nak(Some(delay)))
            .await
            .map_err(|e| BrokerError::Settle(e.to_string()))
    }

    async fn term(&self) -> Result<(), BrokerError> {
        self.message
            .ack_with(AckKind::Term)
            .await
            .map_err(|e| BrokerError::Settle(e.to_string()))
    }
}
