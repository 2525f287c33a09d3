mod calendar;
mod error;
mod mutations;
mod queries;
mod store;

pub use error::EngineError;
pub use mutations::{ListingPatch, NewBooking, NewListing, NewUser, ProfilePatch};
pub use queries::{BookingFilter, ListingFilter};
pub use store::{InMemoryStore, SharedListingState};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::{BookingEvent, EventPublisher};
use crate::wal::Wal;

use store::event_listing_id;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            commit_batch(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                if !batch.is_empty() {
                    commit_batch(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

/// Commit the whole batch or none of it. A failed batch leaves no bytes behind for the
/// next one to carry onto disk.
fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            wal.discard_pending();
            return Err(e);
        }
    }
    wal.flush_sync()
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        // Appends are always drained by the batching loop.
        WalCommand::Append { response, .. } => {
            let _ = response.send(Err(io::Error::other("append routed outside batch")));
        }
    }
}

/// The booking lifecycle engine and the catalog it runs against.
///
/// Lock order: `commit_gate` (shared) before any listing lock. Compaction takes the gate
/// exclusively, so nothing commits between its snapshot and the WAL swap.
pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    publisher: Arc<dyn EventPublisher>,
    pub(super) commit_gate: RwLock<()>,
    /// Serializes writes whose uniqueness spans the catalog (emails, favorites).
    pub(super) catalog_lock: Mutex<()>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, publisher: Arc<dyn EventPublisher>) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: InMemoryStore::new(),
            wal_tx,
            publisher,
            commit_gate: RwLock::new(()),
            catalog_lock: Mutex::new(()),
        };

        // Replay: we're the sole owner of these locks, so try_write always succeeds.
        // Never use blocking_write here: this runs inside an async context.
        for event in &events {
            match event_listing_id(event) {
                Some(listing_id) => {
                    let Some(rs) = engine.store.get_listing(&listing_id) else {
                        continue; // listing already deleted
                    };
                    let mut guard = rs
                        .try_write()
                        .map_err(|_| io::Error::other("replay: listing lock contended"))?;
                    engine.store.apply_to_listing(&mut guard, event);
                }
                None => engine.store.apply_catalog_event(event),
            }
        }

        metrics::gauge!(crate::observability::LISTINGS_ACTIVE)
            .set(engine.store.listing_count() as f64);
        tracing::info!(
            events = events.len(),
            listings = engine.store.listing_count(),
            "engine state replayed"
        );
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Internal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Internal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Internal(e.to_string()))
    }

    /// WAL-append then apply, for events scoped to one listing. Caller holds the commit
    /// gate and the listing's write lock.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut ListingState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_to_listing(rs, event);
        Ok(())
    }

    /// WAL-append then apply, for catalog events. Caller holds the commit gate.
    pub(super) async fn persist_catalog(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_catalog_event(event);
        Ok(())
    }

    pub(super) fn get_listing_state(&self, id: &Ulid) -> Result<SharedListingState, EngineError> {
        self.store
            .get_listing(id)
            .ok_or(EngineError::NotFound("listing", *id))
    }

    /// Lookup booking → listing, acquire the listing's write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<ListingState>, EngineError> {
        let listing_id = self
            .store
            .get_listing_for_booking(booking_id)
            .ok_or(EngineError::NotFound("booking", *booking_id))?;
        let rs = self
            .store
            .get_listing(&listing_id)
            .ok_or(EngineError::NotFound("booking", *booking_id))?;
        let guard = rs.write_owned().await;
        // The listing may have been deleted while we waited for the lock.
        if !self.store.contains_listing(&listing_id) {
            return Err(EngineError::NotFound("booking", *booking_id));
        }
        Ok(guard)
    }

    /// Fire-and-forget publish. Failures are logged and counted, never returned.
    pub(super) fn announce(&self, event: BookingEvent) {
        let publisher = self.publisher.clone();
        tokio::spawn(async move {
            if let Err(e) = publisher.publish(&event).await {
                tracing::warn!(
                    event_type = ?event.event_type,
                    booking_id = %event.key(),
                    "booking event not delivered: {e}"
                );
                metrics::counter!(crate::observability::NOTIFY_FAILURES_TOTAL).increment(1);
            }
        });
    }

    /// Rewrite the WAL with only the events needed to recreate the current state.
    ///
    /// Bookings are written with their current status; blocked ranges are never
    /// written and are rebuilt from accepted bookings on replay.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;

        let mut events = Vec::new();
        for user in self.store.users() {
            events.push(Event::UserRegistered { user });
        }
        for rs in self.store.listing_states() {
            let guard = rs.read().await;
            events.push(Event::ListingCreated {
                listing: guard.listing.clone(),
            });
            for booking in &guard.bookings {
                events.push(Event::BookingCreated {
                    booking: booking.clone(),
                });
            }
        }
        for favorite in self.store.all_favorites() {
            events.push(Event::FavoriteAdded { favorite });
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Internal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Internal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
