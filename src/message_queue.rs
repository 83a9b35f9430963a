/*!
 * # Message Queue
 *
 * Durable-queue boundary for the asynchronous reconciliation pipeline.
 * Delivery semantics mirror an AMQP consumer with a prefetch of one:
 * a consumed message stays in flight until it is acked (discarded) or
 * nacked (redelivered or dropped).
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

/// Message queue errors
#[derive(Error, Debug)]
pub enum MessageQueueError {
    #[error("Queue is full")]
    QueueFull,
    #[error("Unknown in-flight message: {0}")]
    UnknownMessage(Uuid),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Message envelope for queue items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Delivery attempts so far, incremented on each requeue.
    pub attempts: u32,
}

impl Message {
    pub fn new(topic: String, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic,
            payload,
            timestamp: chrono::Utc::now(),
            attempts: 0,
        }
    }
}

/// Message queue trait for different implementations
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError>;
    /// Takes the next message off the topic, leaving it in flight until
    /// acked or nacked. Returns `None` when the topic is empty.
    async fn consume(&self, topic: &str) -> Result<Option<Message>, MessageQueueError>;
    /// Acknowledges an in-flight message, discarding it permanently.
    async fn ack(&self, message_id: &Uuid) -> Result<(), MessageQueueError>;
    /// Rejects an in-flight message. With `requeue` the message goes back
    /// to the front of its topic (attempts incremented); messages past the
    /// queue's delivery cap, and all non-requeued rejects, are dropped.
    async fn nack(&self, message_id: &Uuid, requeue: bool) -> Result<(), MessageQueueError>;
}

#[derive(Debug, Default)]
struct QueueState {
    queues: HashMap<String, VecDeque<Message>>,
    in_flight: HashMap<Uuid, Message>,
}

/// In-memory message queue implementation. Single-process stand-in for a
/// broker; used by tests and single-node deployments.
#[derive(Debug, Clone)]
pub struct InMemoryMessageQueue {
    state: Arc<Mutex<QueueState>>,
    max_size: usize,
    max_attempts: u32,
}

const DEFAULT_MAX_ATTEMPTS: u32 = 5;

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::with_max_size(1000)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            max_size,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the delivery cap: a message requeued this many times is
    /// dropped instead of redelivered.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Number of messages waiting on a topic (excluding in-flight ones).
    pub fn pending(&self, topic: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.queues.get(topic).map_or(0, |q| q.len())
    }
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError> {
        let mut state = self.state.lock().unwrap();
        let queue = state.queues.entry(message.topic.clone()).or_default();

        if queue.len() >= self.max_size {
            return Err(MessageQueueError::QueueFull);
        }

        queue.push_back(message);
        Ok(())
    }

    async fn consume(&self, topic: &str) -> Result<Option<Message>, MessageQueueError> {
        let mut state = self.state.lock().unwrap();
        let next = state.queues.get_mut(topic).and_then(|q| q.pop_front());
        if let Some(message) = next {
            state.in_flight.insert(message.id, message.clone());
            Ok(Some(message))
        } else {
            Ok(None)
        }
    }

    async fn ack(&self, message_id: &Uuid) -> Result<(), MessageQueueError> {
        let mut state = self.state.lock().unwrap();
        state
            .in_flight
            .remove(message_id)
            .map(|_| ())
            .ok_or(MessageQueueError::UnknownMessage(*message_id))
    }

    async fn nack(&self, message_id: &Uuid, requeue: bool) -> Result<(), MessageQueueError> {
        let mut state = self.state.lock().unwrap();
        let mut message = state
            .in_flight
            .remove(message_id)
            .ok_or(MessageQueueError::UnknownMessage(*message_id))?;

        if !requeue {
            return Ok(());
        }

        message.attempts += 1;
        if message.attempts >= self.max_attempts {
            tracing::warn!(
                message_id = %message.id,
                topic = %message.topic,
                attempts = message.attempts,
                "message exceeded max delivery attempts, dropping"
            );
            return Ok(());
        }

        // Redeliver before anything newer on the topic.
        state
            .queues
            .entry(message.topic.clone())
            .or_default()
            .push_front(message);
        Ok(())
    }
}
