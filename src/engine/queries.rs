use chrono::NaiveDate;
use rust_decimal::Decimal;
use ulid::Ulid;

use crate::model::*;

use super::calendar::{find_conflict, unavailable_dates};
use super::{Engine, EngineError};

/// Public listing search. Every field is optional; dates only filter when both are set.
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    /// Case-insensitive substring of the city.
    pub city: Option<String>,
    pub guests: Option<u32>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    /// Which side of the bookings to list. Traveler wins when either this or the
    /// caller's role says so.
    pub role: Option<Role>,
    pub status: Option<BookingStatus>,
}

fn newest_first(bookings: &mut [BookingView]) {
    bookings.sort_by(|a, b| b.booking.created_at.cmp(&a.booking.created_at));
}

impl ListingFilter {
    fn matches(&self, listing: &Listing) -> bool {
        if let Some(city) = &self.city
            && !listing
                .city
                .to_lowercase()
                .contains(&city.trim().to_lowercase())
        {
            return false;
        }
        if self.guests.is_some_and(|g| listing.max_guests < g) {
            return false;
        }
        if self.min_price.is_some_and(|p| listing.price_per_night < p) {
            return false;
        }
        if self.max_price.is_some_and(|p| listing.price_per_night > p) {
            return false;
        }
        true
    }
}

impl Engine {
    pub(super) fn booking_view(&self, listing: &Listing, booking: Booking) -> BookingView {
        let traveler = self
            .store
            .user(&booking.traveler_id)
            .map(|u| UserSummary::from(&u));
        BookingView {
            booking,
            listing: ListingSummary::from(listing),
            traveler,
        }
    }

    pub(super) fn current_view(&self, ls: &ListingState, id: &Ulid) -> Result<BookingView, EngineError> {
        let booking = ls
            .booking(id)
            .cloned()
            .ok_or(EngineError::NotFound("booking", *id))?;
        Ok(self.booking_view(&ls.listing, booking))
    }

    fn listing_view(&self, ls: &ListingState) -> ListingView {
        ListingView {
            listing: ls.listing.clone(),
            blocked_dates: ls.blocked.clone(),
            unavailable_dates: unavailable_dates(ls),
            owner: self
                .store
                .user(&ls.listing.owner_id)
                .map(|u| UserSummary::from(&u)),
        }
    }

    // ── Users ────────────────────────────────────────────────

    pub fn get_user(&self, id: &Ulid) -> Result<User, EngineError> {
        self.store.user(id).ok_or(EngineError::NotFound("user", *id))
    }

    // ── Listings ─────────────────────────────────────────────

    pub async fn get_listing(&self, id: &Ulid) -> Result<ListingView, EngineError> {
        let rs = self.get_listing_state(id)?;
        let guard = rs.read().await;
        Ok(self.listing_view(&guard))
    }

    /// Active listings matching `filter`, newest first.
    pub async fn search_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>, EngineError> {
        let stay = match (filter.check_in, filter.check_out) {
            (Some(check_in), Some(check_out)) => Some(
                DateSpan::try_new(check_in, check_out).ok_or(EngineError::InvalidDateRange)?,
            ),
            _ => None,
        };

        let mut found = Vec::new();
        for rs in self.store.listing_states() {
            let guard = rs.read().await;
            if guard.listing.status != ListingStatus::Active || !filter.matches(&guard.listing) {
                continue;
            }
            if let Some(span) = &stay
                && find_conflict(&guard, span).is_some()
            {
                continue;
            }
            found.push(guard.listing.clone());
        }
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    pub async fn owner_listings(&self, actor: &ActingUser) -> Vec<Listing> {
        let mut owned = Vec::new();
        for rs in self.store.listing_states() {
            let guard = rs.read().await;
            if guard.listing.owner_id == actor.id {
                owned.push(guard.listing.clone());
            }
        }
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned
    }

    /// One of the caller's listings with its bookings, newest first. Someone else's
    /// listing is reported as missing.
    pub async fn owner_listing(
        &self,
        id: &Ulid,
        actor: &ActingUser,
    ) -> Result<OwnerListingView, EngineError> {
        let rs = self.get_listing_state(id)?;
        let guard = rs.read().await;
        if guard.listing.owner_id != actor.id {
            return Err(EngineError::NotFound("listing", *id));
        }
        let mut bookings: Vec<BookingView> = guard
            .bookings
            .iter()
            .map(|b| self.booking_view(&guard.listing, b.clone()))
            .collect();
        newest_first(&mut bookings);
        Ok(OwnerListingView {
            listing: self.listing_view(&guard),
            bookings,
        })
    }

    /// Read-only availability probe. A malformed range is reported, not rejected.
    pub async fn check_availability(
        &self,
        listing_id: &Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Availability, EngineError> {
        let rs = self.get_listing_state(listing_id)?;
        let guard = rs.read().await;
        let reason = match DateSpan::try_new(check_in, check_out) {
            None => Some("Invalid date range"),
            Some(span) => find_conflict(&guard, &span).map(|_| "Dates already booked"),
        };
        Ok(Availability {
            available: reason.is_none(),
            reason: reason.map(str::to_string),
            price_per_night: guard.listing.price_per_night,
            max_guests: guard.listing.max_guests,
        })
    }

    // ── Bookings ─────────────────────────────────────────────

    pub async fn get_booking(&self, id: &Ulid, actor: &ActingUser) -> Result<BookingView, EngineError> {
        let listing_id = self
            .store
            .get_listing_for_booking(id)
            .ok_or(EngineError::NotFound("booking", *id))?;
        let rs = self
            .store
            .get_listing(&listing_id)
            .ok_or(EngineError::NotFound("booking", *id))?;
        let guard = rs.read().await;
        let view = self.current_view(&guard, id)?;
        if guard.listing.owner_id != actor.id && view.booking.traveler_id != actor.id {
            return Err(EngineError::Forbidden("not a party to this booking"));
        }
        Ok(view)
    }

    /// Bookings visible to the caller. Travelers see what they booked; owners see
    /// requests on their listings. A traveler session always gets the traveler side.
    pub async fn list_bookings(&self, actor: &ActingUser, filter: &BookingFilter) -> Vec<BookingView> {
        let side = if filter.role == Some(Role::Traveler) || actor.role == Role::Traveler {
            Role::Traveler
        } else {
            Role::Owner
        };
        let mut out = Vec::new();
        for rs in self.store.listing_states() {
            let guard = rs.read().await;
            let is_owner = guard.listing.owner_id == actor.id;
            if side == Role::Owner && !is_owner {
                continue;
            }
            for booking in &guard.bookings {
                if side == Role::Traveler && booking.traveler_id != actor.id {
                    continue;
                }
                if filter.status.is_some_and(|s| booking.status != s) {
                    continue;
                }
                out.push(self.booking_view(&guard.listing, booking.clone()));
            }
        }
        newest_first(&mut out);
        out
    }

    pub async fn my_bookings(&self, actor: &ActingUser) -> Vec<BookingView> {
        let filter = BookingFilter {
            role: Some(Role::Traveler),
            status: None,
        };
        self.list_bookings(actor, &filter).await
    }

    /// Past and cancelled stays, most recent check-out first.
    pub async fn traveler_history(&self, actor: &ActingUser) -> Vec<BookingView> {
        let mut history: Vec<BookingView> = self
            .my_bookings(actor)
            .await
            .into_iter()
            .filter(|v| {
                matches!(
                    v.booking.status,
                    BookingStatus::Accepted | BookingStatus::Cancelled
                )
            })
            .collect();
        history.sort_by(|a, b| b.booking.check_out.cmp(&a.booking.check_out));
        history
    }

    // ── Favorites ────────────────────────────────────────────

    pub async fn list_favorites(&self, actor: &ActingUser) -> Vec<FavoriteView> {
        let mut out = Vec::new();
        for favorite in self.store.favorites_of(&actor.id) {
            let Some(rs) = self.store.get_listing(&favorite.listing_id) else {
                continue;
            };
            let guard = rs.read().await;
            out.push(FavoriteView {
                listing: ListingSummary::from(&guard.listing),
                favorite,
            });
        }
        out.sort_by(|a, b| b.favorite.created_at.cmp(&a.favorite.created_at));
        out
    }

    pub fn is_favorite(&self, actor: &ActingUser, listing_id: &Ulid) -> bool {
        self.store.has_favorite(&actor.id, listing_id)
    }
}
