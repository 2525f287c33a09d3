use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::BookingEvent;

use super::calendar::{check_no_conflict, quote, stay};
use super::{Engine, EngineError};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// Profile fields a user may change on themselves. `None` or blank leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewListing {
    pub title: String,
    pub description: Option<String>,
    pub property_type: Option<PropertyType>,
    pub city: String,
    pub country: Option<String>,
    pub address: Option<String>,
    pub price_per_night: Decimal,
    pub max_guests: u32,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<Decimal>,
    pub amenities: Vec<String>,
}

/// Fields an owner may change on a listing. `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct ListingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub property_type: Option<PropertyType>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub address: Option<String>,
    pub price_per_night: Option<Decimal>,
    pub max_guests: Option<u32>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<Decimal>,
    pub amenities: Option<Vec<String>>,
    pub status: Option<ListingStatus>,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub listing_id: Ulid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub message: Option<String>,
}

fn validate_listing(listing: &Listing) -> Result<(), EngineError> {
    if listing.title.trim().is_empty() {
        return Err(EngineError::InvalidInput("title is required"));
    }
    if listing.title.len() > MAX_TITLE_LEN {
        return Err(EngineError::LimitExceeded("title too long"));
    }
    if listing.city.trim().is_empty() {
        return Err(EngineError::InvalidInput("city is required"));
    }
    if listing.country.len() > MAX_NAME_LEN || listing.city.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("location too long"));
    }
    if listing
        .description
        .as_ref()
        .is_some_and(|d| d.len() > MAX_TEXT_LEN)
        || listing.address.as_ref().is_some_and(|a| a.len() > MAX_TEXT_LEN)
    {
        return Err(EngineError::LimitExceeded("text field too long"));
    }
    if listing.max_guests == 0 {
        return Err(EngineError::InvalidInput("maxGuests must be at least 1"));
    }
    if listing.max_guests > MAX_GUESTS {
        return Err(EngineError::LimitExceeded("maxGuests too large"));
    }
    if listing.price_per_night.is_sign_negative() {
        return Err(EngineError::InvalidInput("pricePerNight must not be negative"));
    }
    if listing.bathrooms.is_sign_negative() {
        return Err(EngineError::InvalidInput("bathrooms must not be negative"));
    }
    if listing.amenities.len() > MAX_AMENITIES {
        return Err(EngineError::LimitExceeded("too many amenities"));
    }
    Ok(())
}

impl Engine {
    // ── Users ────────────────────────────────────────────────

    pub async fn register_user(&self, new: NewUser) -> Result<User, EngineError> {
        let name = new.name.trim().to_string();
        let email = new.email.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::InvalidInput("name is required"));
        }
        if !email.contains('@') {
            return Err(EngineError::InvalidInput("email is invalid"));
        }
        if name.len() > MAX_NAME_LEN || email.len() > MAX_EMAIL_LEN {
            return Err(EngineError::LimitExceeded("name or email too long"));
        }

        let _catalog = self.catalog_lock.lock().await;
        let _gate = self.commit_gate.read().await;
        if self.store.user_by_email(&email).is_some() {
            return Err(EngineError::InvalidOperation("email already registered"));
        }

        let user = User {
            id: Ulid::new(),
            name,
            email,
            role: new.role,
            phone: new.phone,
            city: new.city,
            country: new.country,
        };
        self.persist_catalog(&Event::UserRegistered { user: user.clone() })
            .await?;
        tracing::info!(user_id = %user.id, role = %user.role, "user registered");
        Ok(user)
    }

    pub async fn update_profile(
        &self,
        actor: &ActingUser,
        patch: ProfilePatch,
    ) -> Result<User, EngineError> {
        fn given(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        let (name, phone, city, country) = (
            given(patch.name),
            given(patch.phone),
            given(patch.city),
            given(patch.country),
        );
        for field in [&name, &phone, &city, &country].into_iter().flatten() {
            if field.len() > MAX_NAME_LEN {
                return Err(EngineError::LimitExceeded("profile field too long"));
            }
        }

        let _catalog = self.catalog_lock.lock().await;
        let _gate = self.commit_gate.read().await;
        let mut user = self.get_user(&actor.id)?;
        if let Some(name) = name {
            user.name = name;
        }
        if phone.is_some() {
            user.phone = phone;
        }
        if city.is_some() {
            user.city = city;
        }
        if country.is_some() {
            user.country = country;
        }
        self.persist_catalog(&Event::UserUpdated { user: user.clone() })
            .await?;
        tracing::debug!(user_id = %user.id, "profile updated");
        Ok(user)
    }

    // ── Listings ─────────────────────────────────────────────

    pub async fn create_listing(
        &self,
        actor: &ActingUser,
        new: NewListing,
    ) -> Result<Listing, EngineError> {
        if actor.role != Role::Owner {
            return Err(EngineError::Forbidden("only owners can create listings"));
        }
        let listing = Listing {
            id: Ulid::new(),
            owner_id: actor.id,
            title: new.title.trim().to_string(),
            description: new.description,
            property_type: new.property_type.unwrap_or_default(),
            city: new.city.trim().to_string(),
            country: new.country.unwrap_or_else(|| "USA".to_string()),
            address: new.address,
            price_per_night: new.price_per_night,
            max_guests: new.max_guests,
            bedrooms: new.bedrooms.unwrap_or(1),
            bathrooms: new.bathrooms.unwrap_or(Decimal::ONE),
            amenities: new.amenities,
            status: ListingStatus::Active,
            created_at: Utc::now(),
        };
        validate_listing(&listing)?;

        let _gate = self.commit_gate.read().await;
        if self.store.listing_count() >= MAX_LISTINGS {
            return Err(EngineError::LimitExceeded("too many listings"));
        }
        self.persist_catalog(&Event::ListingCreated {
            listing: listing.clone(),
        })
        .await?;
        metrics::gauge!(crate::observability::LISTINGS_ACTIVE)
            .set(self.store.listing_count() as f64);
        tracing::info!(listing_id = %listing.id, owner_id = %actor.id, "listing created");
        Ok(listing)
    }

    pub async fn update_listing(
        &self,
        id: Ulid,
        actor: &ActingUser,
        patch: ListingPatch,
    ) -> Result<Listing, EngineError> {
        let _gate = self.commit_gate.read().await;
        let rs = self.get_listing_state(&id)?;
        let mut guard = rs.write().await;
        if !self.store.contains_listing(&id) {
            return Err(EngineError::NotFound("listing", id));
        }
        if guard.listing.owner_id != actor.id {
            return Err(EngineError::Forbidden("only the property owner can edit this listing"));
        }

        let mut listing = guard.listing.clone();
        if let Some(title) = patch.title {
            listing.title = title.trim().to_string();
        }
        if let Some(city) = patch.city {
            listing.city = city.trim().to_string();
        }
        if patch.description.is_some() {
            listing.description = patch.description;
        }
        if patch.address.is_some() {
            listing.address = patch.address;
        }
        if let Some(v) = patch.property_type {
            listing.property_type = v;
        }
        if let Some(v) = patch.country {
            listing.country = v;
        }
        if let Some(v) = patch.price_per_night {
            listing.price_per_night = v;
        }
        if let Some(v) = patch.max_guests {
            listing.max_guests = v;
        }
        if let Some(v) = patch.bedrooms {
            listing.bedrooms = v;
        }
        if let Some(v) = patch.bathrooms {
            listing.bathrooms = v;
        }
        if let Some(v) = patch.amenities {
            listing.amenities = v;
        }
        if let Some(v) = patch.status {
            listing.status = v;
        }
        validate_listing(&listing)?;

        let event = Event::ListingUpdated {
            listing: listing.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!(listing_id = %id, "listing updated");
        Ok(listing)
    }

    pub async fn delete_listing(&self, id: Ulid, actor: &ActingUser) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let rs = self.get_listing_state(&id)?;
        let guard = rs.write().await;
        if !self.store.contains_listing(&id) {
            return Err(EngineError::NotFound("listing", id));
        }
        if guard.listing.owner_id != actor.id {
            return Err(EngineError::Forbidden("only the property owner can delete this listing"));
        }
        if guard.has_live_bookings() {
            return Err(EngineError::InvalidOperation(
                "cannot delete a listing with pending or accepted bookings",
            ));
        }

        self.persist_catalog(&Event::ListingDeleted { id }).await?;
        drop(guard);
        metrics::gauge!(crate::observability::LISTINGS_ACTIVE)
            .set(self.store.listing_count() as f64);
        tracing::info!(listing_id = %id, "listing deleted");
        Ok(())
    }

    // ── Booking lifecycle ────────────────────────────────────

    pub async fn create_booking(
        &self,
        actor: &ActingUser,
        req: NewBooking,
    ) -> Result<BookingView, EngineError> {
        let _gate = self.commit_gate.read().await;
        let rs = self.get_listing_state(&req.listing_id)?;
        let mut guard = rs.write().await;
        if !self.store.contains_listing(&req.listing_id) {
            return Err(EngineError::NotFound("listing", req.listing_id));
        }

        let listing = &guard.listing;
        if listing.owner_id == actor.id {
            return Err(EngineError::InvalidOperation("cannot book your own property"));
        }
        if req.guests > listing.max_guests {
            return Err(EngineError::CapacityExceeded(listing.max_guests));
        }
        if req.guests == 0 {
            return Err(EngineError::InvalidInput("guests must be at least 1"));
        }
        let span = stay(req.check_in, req.check_out)?;
        check_no_conflict(&guard, &span)?;

        if guard.listing.status != ListingStatus::Active {
            return Err(EngineError::InvalidOperation("listing is not accepting bookings"));
        }
        if req.message.as_ref().is_some_and(|m| m.len() > MAX_MESSAGE_LEN) {
            return Err(EngineError::LimitExceeded("message too long"));
        }
        if guard.live_booking_count() >= MAX_BOOKINGS_PER_LISTING {
            return Err(EngineError::LimitExceeded("too many bookings on listing"));
        }

        let (nights, total_price) = quote(&span, guard.listing.price_per_night)?;
        let now = Utc::now();
        let booking = Booking {
            id: Ulid::new(),
            listing_id: req.listing_id,
            traveler_id: actor.id,
            check_in: span.start,
            check_out: span.end,
            guests: req.guests,
            total_price,
            status: BookingStatus::Pending,
            message: req.message,
            created_at: now,
            updated_at: now,
        };
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        tracing::info!(
            booking_id = %booking.id,
            listing_id = %booking.listing_id,
            nights,
            total_price = %booking.total_price,
            "booking requested"
        );
        self.announce(BookingEvent::created(&booking));
        Ok(self.booking_view(&guard.listing, booking))
    }

    pub async fn accept_booking(
        &self,
        id: Ulid,
        actor: &ActingUser,
    ) -> Result<BookingView, EngineError> {
        let _gate = self.commit_gate.read().await;
        let mut guard = self.resolve_booking_write(&id).await?;
        let booking = guard
            .booking(&id)
            .ok_or(EngineError::NotFound("booking", id))?;
        if guard.listing.owner_id != actor.id {
            return Err(EngineError::Forbidden("only the property owner can accept bookings"));
        }
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::InvalidState {
                action: "accept",
                status: booking.status,
            });
        }
        // Another request for these dates may have been accepted since this one was made.
        check_no_conflict(&guard, &booking.span())?;

        let event = Event::BookingAccepted {
            id,
            listing_id: guard.listing.id,
            at: Utc::now(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        self.transitioned(&id, BookingStatus::Accepted, guard.listing.owner_id);
        self.current_view(&guard, &id)
    }

    pub async fn reject_booking(
        &self,
        id: Ulid,
        actor: &ActingUser,
    ) -> Result<BookingView, EngineError> {
        let _gate = self.commit_gate.read().await;
        let mut guard = self.resolve_booking_write(&id).await?;
        let booking = guard
            .booking(&id)
            .ok_or(EngineError::NotFound("booking", id))?;
        if guard.listing.owner_id != actor.id {
            return Err(EngineError::Forbidden("only the property owner can reject bookings"));
        }
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::InvalidState {
                action: "reject",
                status: booking.status,
            });
        }

        let event = Event::BookingRejected {
            id,
            listing_id: guard.listing.id,
            at: Utc::now(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        self.transitioned(&id, BookingStatus::Rejected, guard.listing.owner_id);
        self.current_view(&guard, &id)
    }

    /// Cancel from either side. Cancelling a cancelled or rejected booking changes nothing.
    pub async fn cancel_booking(
        &self,
        id: Ulid,
        actor: &ActingUser,
    ) -> Result<BookingView, EngineError> {
        let _gate = self.commit_gate.read().await;
        let mut guard = self.resolve_booking_write(&id).await?;
        let booking = guard
            .booking(&id)
            .ok_or(EngineError::NotFound("booking", id))?;
        if guard.listing.owner_id != actor.id && booking.traveler_id != actor.id {
            return Err(EngineError::Forbidden("only the owner or the traveler can cancel"));
        }

        let previous = booking.status;
        if !previous.is_live() {
            return self.current_view(&guard, &id);
        }

        let event = Event::BookingCancelled {
            id,
            listing_id: guard.listing.id,
            previous,
            at: Utc::now(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(
            crate::observability::BOOKING_TRANSITIONS_TOTAL,
            "status" => BookingStatus::Cancelled.as_str()
        )
        .increment(1);
        tracing::info!(
            booking_id = %id,
            previous = %previous,
            released = previous == BookingStatus::Accepted,
            "booking cancelled"
        );
        self.current_view(&guard, &id)
    }

    fn transitioned(&self, id: &Ulid, status: BookingStatus, owner_id: Ulid) {
        metrics::counter!(
            crate::observability::BOOKING_TRANSITIONS_TOTAL,
            "status" => status.as_str()
        )
        .increment(1);
        tracing::info!(booking_id = %id, status = %status, "booking status updated");
        self.announce(BookingEvent::status_updated(*id, status, owner_id));
    }

    // ── Favorites ────────────────────────────────────────────

    pub async fn add_favorite(
        &self,
        actor: &ActingUser,
        listing_id: Ulid,
    ) -> Result<FavoriteView, EngineError> {
        let _catalog = self.catalog_lock.lock().await;
        let _gate = self.commit_gate.read().await;
        let rs = self.get_listing_state(&listing_id)?;
        if self.store.has_favorite(&actor.id, &listing_id) {
            return Err(EngineError::InvalidOperation("already in favorites"));
        }

        let favorite = Favorite {
            user_id: actor.id,
            listing_id,
            created_at: Utc::now(),
        };
        // Holding the listing lock keeps a concurrent delete from orphaning the favorite.
        let guard = rs.read().await;
        if !self.store.contains_listing(&listing_id) {
            return Err(EngineError::NotFound("listing", listing_id));
        }
        self.persist_catalog(&Event::FavoriteAdded {
            favorite: favorite.clone(),
        })
        .await?;
        Ok(FavoriteView {
            favorite,
            listing: ListingSummary::from(&guard.listing),
        })
    }

    pub async fn remove_favorite(
        &self,
        actor: &ActingUser,
        listing_id: Ulid,
    ) -> Result<(), EngineError> {
        let _catalog = self.catalog_lock.lock().await;
        let _gate = self.commit_gate.read().await;
        if !self.store.has_favorite(&actor.id, &listing_id) {
            return Err(EngineError::NotFound("favorite", listing_id));
        }
        self.persist_catalog(&Event::FavoriteRemoved {
            user_id: actor.id,
            listing_id,
        })
        .await
    }
}
