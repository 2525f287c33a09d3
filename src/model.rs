use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open stay `[check_in, check_out)`. The check-out day is free for the next guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateSpan {
    #[serde(rename = "checkIn")]
    pub start: NaiveDate,
    #[serde(rename = "checkOut")]
    pub end: NaiveDate,
}

impl DateSpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "DateSpan start must be before end");
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn try_new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &DateSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ── Users & identity ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Traveler,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Traveler => "traveler",
            Role::Owner => "owner",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "traveler" => Ok(Role::Traveler),
            "owner" => Ok(Role::Owner),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller of an engine operation, as vouched for by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingUser {
    pub id: Ulid,
    pub role: Role,
}

impl ActingUser {
    pub fn new(id: Ulid, role: Role) -> Self {
        Self { id, role }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

// ── Listings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    #[default]
    Apartment,
    House,
    Villa,
    Cabin,
    Condo,
    Townhouse,
    Loft,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    #[default]
    Active,
    Inactive,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub title: String,
    pub description: Option<String>,
    pub property_type: PropertyType,
    pub city: String,
    pub country: String,
    pub address: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub price_per_night: Decimal,
    pub max_guests: u32,
    pub bedrooms: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub bathrooms: Decimal,
    pub amenities: Vec<String>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
}

/// A range on a listing's calendar held by an accepted booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub booking_id: Ulid,
}

impl BlockedRange {
    pub fn span(&self) -> DateSpan {
        DateSpan::new(self.from, self.to)
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Whether this booking still has a claim (or a pending claim) on the calendar.
    pub fn is_live(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Accepted)
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "accepted" => Ok(BookingStatus::Accepted),
            "rejected" => Ok(BookingStatus::Rejected),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Ulid,
    pub listing_id: Ulid,
    pub traveler_id: Ulid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_price: Decimal,
    pub status: BookingStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn span(&self) -> DateSpan {
        DateSpan::new(self.check_in, self.check_out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub user_id: Ulid,
    pub listing_id: Ulid,
    pub created_at: DateTime<Utc>,
}

// ── Per-listing state ────────────────────────────────────────────

/// A listing with every booking made against it and the calendar of accepted stays.
#[derive(Debug, Clone)]
pub struct ListingState {
    pub listing: Listing,
    /// All bookings on this listing, in creation order.
    pub bookings: Vec<Booking>,
    /// Ranges held by accepted bookings, sorted by `from`. Only ever changed together
    /// with the owning booking's status.
    pub blocked: Vec<BlockedRange>,
}

impl ListingState {
    pub fn new(listing: Listing) -> Self {
        Self {
            listing,
            bookings: Vec::new(),
            blocked: Vec::new(),
        }
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    pub fn booking_mut(&mut self, id: &Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == *id)
    }

    /// Insert a blocked range maintaining sort order by `from`.
    pub fn insert_blocked(&mut self, range: BlockedRange) {
        let pos = self
            .blocked
            .binary_search_by_key(&range.from, |r| r.from)
            .unwrap_or_else(|e| e);
        self.blocked.insert(pos, range);
    }

    /// Remove the range held by `booking_id`.
    pub fn remove_blocked(&mut self, booking_id: Ulid) -> Option<BlockedRange> {
        let pos = self.blocked.iter().position(|r| r.booking_id == booking_id)?;
        Some(self.blocked.remove(pos))
    }

    /// Blocked ranges overlapping `query`. Binary search skips ranges starting at or
    /// after `query.end`.
    pub fn overlapping(&self, query: &DateSpan) -> impl Iterator<Item = &BlockedRange> {
        let right_bound = self.blocked.partition_point(|r| r.from < query.end);
        self.blocked[..right_bound]
            .iter()
            .filter(move |r| r.span().overlaps(query))
    }

    pub fn has_live_bookings(&self) -> bool {
        self.bookings.iter().any(|b| b.status.is_live())
    }

    /// Pending and accepted bookings. Rejected and cancelled ones hold no capacity.
    pub fn live_booking_count(&self) -> usize {
        self.bookings.iter().filter(|b| b.status.is_live()).count()
    }
}

/// The WAL record format. One record per state change, so a status transition and its
/// calendar delta always commit together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered {
        user: User,
    },
    ListingCreated {
        listing: Listing,
    },
    /// Full replacement of the listing row.
    ListingUpdated {
        listing: Listing,
    },
    ListingDeleted {
        id: Ulid,
    },
    /// A new booking request. Compaction also emits this for every surviving booking with
    /// its current status; an accepted booking re-blocks its range when applied.
    BookingCreated {
        booking: Booking,
    },
    BookingAccepted {
        id: Ulid,
        listing_id: Ulid,
        at: DateTime<Utc>,
    },
    BookingRejected {
        id: Ulid,
        listing_id: Ulid,
        at: DateTime<Utc>,
    },
    BookingCancelled {
        id: Ulid,
        listing_id: Ulid,
        /// Status before the cancellation; the calendar is released iff this is `Accepted`.
        previous: BookingStatus,
        at: DateTime<Utc>,
    },
    FavoriteAdded {
        favorite: Favorite,
    },
    FavoriteRemoved {
        user_id: Ulid,
        listing_id: Ulid,
    },
    /// Full replacement of the user row. The email never changes.
    UserUpdated {
        user: User,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            phone: u.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSummary {
    pub id: Ulid,
    pub title: String,
    pub city: String,
    pub country: String,
    pub property_type: PropertyType,
    #[serde(with = "rust_decimal::serde::str")]
    pub price_per_night: Decimal,
    pub max_guests: u32,
    pub owner_id: Ulid,
}

impl From<&Listing> for ListingSummary {
    fn from(l: &Listing) -> Self {
        Self {
            id: l.id,
            title: l.title.clone(),
            city: l.city.clone(),
            country: l.country.clone(),
            property_type: l.property_type,
            price_per_night: l.price_per_night,
            max_guests: l.max_guests,
            owner_id: l.owner_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub listing: ListingSummary,
    pub traveler: Option<UserSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingView {
    #[serde(flatten)]
    pub listing: Listing,
    pub blocked_dates: Vec<BlockedRange>,
    /// Accepted stays merged into disjoint ranges, ascending.
    pub unavailable_dates: Vec<DateSpan>,
    pub owner: Option<UserSummary>,
}

/// An owner's own listing with every booking made against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerListingView {
    #[serde(flatten)]
    pub listing: ListingView,
    pub bookings: Vec<BookingView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteView {
    #[serde(flatten)]
    pub favorite: Favorite,
    pub listing: ListingSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub available: bool,
    pub reason: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub price_per_night: Decimal,
    pub max_guests: u32,
}
