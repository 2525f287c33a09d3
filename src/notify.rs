use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::{Booking, BookingStatus};

/// Topic carrying booking lifecycle events.
pub const BOOKING_EVENTS_TOPIC: &str = "booking-events";

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    BookingCreated,
    BookingStatusUpdated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreatedData {
    pub id: Ulid,
    pub listing_id: Ulid,
    pub traveler_id: Ulid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_price: Decimal,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingStatusData {
    pub booking_id: Ulid,
    pub status: BookingStatus,
    pub owner_id: Ulid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    Created(BookingCreatedData),
    StatusUpdated(BookingStatusData),
}

/// `{eventType, timestamp, data}` as published on [`BOOKING_EVENTS_TOPIC`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingEvent {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl BookingEvent {
    pub fn created(booking: &Booking) -> Self {
        Self {
            event_type: EventType::BookingCreated,
            timestamp: Utc::now(),
            data: EventData::Created(BookingCreatedData {
                id: booking.id,
                listing_id: booking.listing_id,
                traveler_id: booking.traveler_id,
                check_in: booking.check_in,
                check_out: booking.check_out,
                total_price: booking.total_price,
                status: booking.status,
            }),
        }
    }

    pub fn status_updated(booking_id: Ulid, status: BookingStatus, owner_id: Ulid) -> Self {
        Self {
            event_type: EventType::BookingStatusUpdated,
            timestamp: Utc::now(),
            data: EventData::StatusUpdated(BookingStatusData {
                booking_id,
                status,
                owner_id,
            }),
        }
    }

    /// Partition key: the booking id.
    pub fn key(&self) -> Ulid {
        match &self.data {
            EventData::Created(d) => d.id,
            EventData::StatusUpdated(d) => d.booking_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("no subscribers on topic {0}")]
    NoSubscribers(String),
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where booking events go. Delivery is best-effort: callers log failures and move on.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &BookingEvent) -> Result<(), PublishError>;
}

/// A keyed message on a topic, as a broker would carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub key: String,
    pub value: String,
}

/// In-process broadcast hub, one channel per topic.
pub struct TopicHub {
    channels: DashMap<String, broadcast::Sender<Message>>,
}

impl Default for TopicHub {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a topic. Creates the channel if needed.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Message> {
        let sender = self
            .channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a message. Returns the number of receivers it reached.
    pub fn send(&self, message: Message) -> Result<usize, PublishError> {
        let Some(sender) = self.channels.get(&message.topic) else {
            return Err(PublishError::NoSubscribers(message.topic));
        };
        let topic = message.topic.clone();
        sender
            .send(message)
            .map_err(|_| PublishError::NoSubscribers(topic))
    }
}

#[async_trait]
impl EventPublisher for TopicHub {
    async fn publish(&self, event: &BookingEvent) -> Result<(), PublishError> {
        let message = Message {
            topic: BOOKING_EVENTS_TOPIC.to_string(),
            key: event.key().to_string(),
            value: serde_json::to_string(event)?,
        };
        self.send(message)?;
        Ok(())
    }
}

/// Consume booking events: log each one and acknowledge. Runs until the hub is dropped.
pub async fn run_event_logger(mut rx: broadcast::Receiver<Message>) {
    loop {
        match rx.recv().await {
            Ok(message) => log_message(&message),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("event logger lagged, skipped {skipped} messages");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn log_message(message: &Message) {
    match serde_json::from_str::<BookingEvent>(&message.value) {
        Ok(event) => {
            match &event.data {
                EventData::Created(d) => info!(
                    topic = %message.topic,
                    booking_id = %d.id,
                    listing_id = %d.listing_id,
                    "new booking received by owner"
                ),
                EventData::StatusUpdated(d) => info!(
                    topic = %message.topic,
                    booking_id = %d.booking_id,
                    status = %d.status,
                    "booking status updated for traveler"
                ),
            }
            metrics::counter!(crate::observability::EVENTS_CONSUMED_TOTAL).increment(1);
        }
        Err(e) => warn!(topic = %message.topic, key = %message.key, "undecodable event: {e}"),
    }
}
