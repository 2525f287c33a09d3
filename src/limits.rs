//! Hard input limits, checked before anything reaches the WAL.

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_EMAIL_LEN: usize = 320;
pub const MAX_TITLE_LEN: usize = 200;
/// Description and address.
pub const MAX_TEXT_LEN: usize = 5_000;
pub const MAX_MESSAGE_LEN: usize = 2_000;
pub const MAX_AMENITIES: usize = 64;
pub const MAX_GUESTS: u32 = 100;
/// Longest stay a single booking may cover.
pub const MAX_STAY_NIGHTS: i64 = 365;
pub const MAX_LISTINGS: usize = 100_000;
/// Pending plus accepted bookings on one listing.
pub const MAX_BOOKINGS_PER_LISTING: usize = 10_000;
