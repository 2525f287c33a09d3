use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedListingState = Arc<RwLock<ListingState>>;

/// Indexed in-memory view of everything the WAL has committed.
pub struct InMemoryStore {
    listings: DashMap<Ulid, SharedListingState>,
    /// Reverse lookup: booking id → listing id
    booking_to_listing: DashMap<Ulid, Ulid>,
    users: DashMap<Ulid, User>,
    /// Lower-cased email → user id
    emails: DashMap<String, Ulid>,
    /// User id → favorites, in insertion order.
    favorites: DashMap<Ulid, Vec<Favorite>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            listings: DashMap::new(),
            booking_to_listing: DashMap::new(),
            users: DashMap::new(),
            emails: DashMap::new(),
            favorites: DashMap::new(),
        }
    }

    // ── Listings ─────────────────────────────────────────────

    pub fn listing_count(&self) -> usize {
        self.listings.len()
    }

    pub fn get_listing(&self, id: &Ulid) -> Option<SharedListingState> {
        self.listings.get(id).map(|e| e.value().clone())
    }

    pub fn contains_listing(&self, id: &Ulid) -> bool {
        self.listings.contains_key(id)
    }

    /// Snapshot of every listing handle. Collect first, lock later: never hold a
    /// DashMap reference across an await.
    pub fn listing_states(&self) -> Vec<SharedListingState> {
        self.listings.iter().map(|e| e.value().clone()).collect()
    }

    // ── Booking index ────────────────────────────────────────

    pub fn get_listing_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_listing.get(booking_id).map(|e| *e.value())
    }

    // ── Users ────────────────────────────────────────────────

    pub fn user(&self, id: &Ulid) -> Option<User> {
        self.users.get(id).map(|e| e.value().clone())
    }

    pub fn user_by_email(&self, email: &str) -> Option<Ulid> {
        self.emails
            .get(&email.to_ascii_lowercase())
            .map(|e| *e.value())
    }

    pub fn users(&self) -> Vec<User> {
        self.users.iter().map(|e| e.value().clone()).collect()
    }

    // ── Favorites ────────────────────────────────────────────

    pub fn favorites_of(&self, user_id: &Ulid) -> Vec<Favorite> {
        self.favorites
            .get(user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn has_favorite(&self, user_id: &Ulid, listing_id: &Ulid) -> bool {
        self.favorites
            .get(user_id)
            .is_some_and(|favs| favs.iter().any(|f| f.listing_id == *listing_id))
    }

    pub fn all_favorites(&self) -> Vec<Favorite> {
        self.favorites
            .iter()
            .flat_map(|e| e.value().clone())
            .collect()
    }

    // ── Event application ────────────────────────────────────

    /// Apply an event that is not scoped to a single listing's lock.
    pub fn apply_catalog_event(&self, event: &Event) {
        match event {
            Event::UserRegistered { user } => {
                self.emails
                    .insert(user.email.to_ascii_lowercase(), user.id);
                self.users.insert(user.id, user.clone());
            }
            Event::UserUpdated { user } => {
                self.users.insert(user.id, user.clone());
            }
            Event::ListingCreated { listing } => {
                let ls = ListingState::new(listing.clone());
                self.listings.insert(listing.id, Arc::new(RwLock::new(ls)));
            }
            Event::ListingDeleted { id } => {
                self.listings.remove(id);
                self.booking_to_listing.retain(|_, lid| lid != id);
                for mut favs in self.favorites.iter_mut() {
                    favs.retain(|f| f.listing_id != *id);
                }
            }
            Event::FavoriteAdded { favorite } => {
                self.favorites
                    .entry(favorite.user_id)
                    .or_default()
                    .push(favorite.clone());
            }
            Event::FavoriteRemoved { user_id, listing_id } => {
                if let Some(mut favs) = self.favorites.get_mut(user_id) {
                    favs.retain(|f| f.listing_id != *listing_id);
                }
            }
            // Listing-scoped; applied under the listing's write lock.
            Event::ListingUpdated { .. }
            | Event::BookingCreated { .. }
            | Event::BookingAccepted { .. }
            | Event::BookingRejected { .. }
            | Event::BookingCancelled { .. } => {}
        }
    }

    /// Apply a listing-scoped event. The caller holds the listing's write lock.
    pub fn apply_to_listing(&self, ls: &mut ListingState, event: &Event) {
        match event {
            Event::ListingUpdated { listing } => {
                ls.listing = listing.clone();
            }
            Event::BookingCreated { booking } => {
                if booking.status == BookingStatus::Accepted {
                    ls.insert_blocked(BlockedRange {
                        from: booking.check_in,
                        to: booking.check_out,
                        booking_id: booking.id,
                    });
                }
                ls.bookings.push(booking.clone());
                self.booking_to_listing.insert(booking.id, booking.listing_id);
            }
            Event::BookingAccepted { id, at, .. } => {
                if let Some(booking) = ls.booking_mut(id) {
                    booking.status = BookingStatus::Accepted;
                    booking.updated_at = *at;
                    let range = BlockedRange {
                        from: booking.check_in,
                        to: booking.check_out,
                        booking_id: booking.id,
                    };
                    ls.insert_blocked(range);
                }
            }
            Event::BookingRejected { id, at, .. } => {
                if let Some(booking) = ls.booking_mut(id) {
                    booking.status = BookingStatus::Rejected;
                    booking.updated_at = *at;
                }
            }
            Event::BookingCancelled { id, previous, at, .. } => {
                if let Some(booking) = ls.booking_mut(id) {
                    booking.status = BookingStatus::Cancelled;
                    booking.updated_at = *at;
                    if *previous == BookingStatus::Accepted {
                        ls.remove_blocked(*id);
                    }
                }
            }
            Event::UserRegistered { .. }
            | Event::UserUpdated { .. }
            | Event::ListingCreated { .. }
            | Event::ListingDeleted { .. }
            | Event::FavoriteAdded { .. }
            | Event::FavoriteRemoved { .. } => {}
        }
    }
}

/// The listing whose lock a listing-scoped event must be applied under.
pub fn event_listing_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::ListingUpdated { listing } => Some(listing.id),
        Event::BookingCreated { booking } => Some(booking.listing_id),
        Event::BookingAccepted { listing_id, .. }
        | Event::BookingRejected { listing_id, .. }
        | Event::BookingCancelled { listing_id, .. } => Some(*listing_id),
        Event::UserRegistered { .. }
        | Event::UserUpdated { .. }
        | Event::ListingCreated { .. }
        | Event::ListingDeleted { .. }
        | Event::FavoriteAdded { .. }
        | Event::FavoriteRemoved { .. } => None,
    }
}
