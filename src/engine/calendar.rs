use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::limits::MAX_STAY_NIGHTS;
use crate::model::*;

use super::EngineError;

/// Build a stay from raw dates. `check_out <= check_in` is `InvalidDateRange`.
pub(crate) fn stay(check_in: NaiveDate, check_out: NaiveDate) -> Result<DateSpan, EngineError> {
    let span = DateSpan::try_new(check_in, check_out).ok_or(EngineError::InvalidDateRange)?;
    if span.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(span)
}

/// Nights and total for a stay. The total is fixed at booking time.
pub(crate) fn quote(span: &DateSpan, price_per_night: Decimal) -> Result<(i64, Decimal), EngineError> {
    let nights = span.nights();
    if nights <= 0 {
        return Err(EngineError::InvalidDateRange);
    }
    Ok((nights, Decimal::from(nights) * price_per_night))
}

/// First accepted stay on the listing that collides with `span`.
///
/// This is the one availability check: booking creation, acceptance, the public
/// availability query and date-filtered search all go through it.
pub(crate) fn find_conflict<'a>(ls: &'a ListingState, span: &DateSpan) -> Option<&'a BlockedRange> {
    ls.overlapping(span).next()
}

pub(crate) fn check_no_conflict(ls: &ListingState, span: &DateSpan) -> Result<(), EngineError> {
    match find_conflict(ls, span) {
        Some(_) => Err(EngineError::DatesUnavailable),
        None => Ok(()),
    }
}

/// Merge sorted overlapping/adjacent stays into disjoint ranges.
pub(crate) fn merge_overlapping(sorted: &[DateSpan]) -> Vec<DateSpan> {
    let mut merged: Vec<DateSpan> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// Disjoint unavailable ranges for display, ascending.
pub(crate) fn unavailable_dates(ls: &ListingState) -> Vec<DateSpan> {
    let spans: Vec<DateSpan> = ls.blocked.iter().map(|r| r.span()).collect();
    merge_overlapping(&spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ulid::Ulid;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn span(a: &str, b: &str) -> DateSpan {
        DateSpan::new(d(a), d(b))
    }

    fn state_with(blocked: &[(&str, &str)]) -> ListingState {
        let mut ls = ListingState::new(Listing {
            id: Ulid::new(),
            owner_id: Ulid::new(),
            title: "Loft".into(),
            description: None,
            property_type: PropertyType::Loft,
            city: "Lisbon".into(),
            country: "Portugal".into(),
            address: None,
            price_per_night: Decimal::from(100),
            max_guests: 2,
            bedrooms: 1,
            bathrooms: Decimal::ONE,
            amenities: vec![],
            status: ListingStatus::Active,
            created_at: Utc::now(),
        });
        for (from, to) in blocked {
            ls.insert_blocked(BlockedRange {
                from: d(from),
                to: d(to),
                booking_id: Ulid::new(),
            });
        }
        ls
    }

    #[test]
    fn quote_is_nights_times_price() {
        let (nights, total) = quote(&span("2025-03-01", "2025-03-04"), Decimal::from(100)).unwrap();
        assert_eq!(nights, 3);
        assert_eq!(total, Decimal::from(300));

        // cents are kept exactly
        let price = Decimal::new(12_999, 2); // 129.99
        let (nights, total) = quote(&span("2025-12-30", "2026-01-02"), price).unwrap();
        assert_eq!(nights, 3);
        assert_eq!(total, Decimal::new(38_997, 2));
    }

    #[test]
    fn quote_handles_month_and_leap_boundaries() {
        let (nights, _) = quote(&span("2024-02-28", "2024-03-01"), Decimal::ONE).unwrap();
        assert_eq!(nights, 2);
        let (nights, _) = quote(&span("2025-02-28", "2025-03-01"), Decimal::ONE).unwrap();
        assert_eq!(nights, 1);
    }

    #[test]
    fn stay_rejects_inverted_and_empty_ranges() {
        assert!(matches!(stay(d("2025-03-04"), d("2025-03-01")), Err(EngineError::InvalidDateRange)));
        assert!(matches!(stay(d("2025-03-04"), d("2025-03-04")), Err(EngineError::InvalidDateRange)));
        assert!(stay(d("2025-03-03"), d("2025-03-04")).is_ok());
    }

    #[test]
    fn stay_rejects_overlong_ranges() {
        let result = stay(d("2025-01-01"), d("2026-06-01"));
        assert!(matches!(result, Err(EngineError::LimitExceeded(_))));
    }

    #[test]
    fn back_to_back_stays_do_not_conflict() {
        let ls = state_with(&[("2025-01-10", "2025-01-15")]);
        assert!(check_no_conflict(&ls, &span("2025-01-15", "2025-01-20")).is_ok());
        assert!(check_no_conflict(&ls, &span("2025-01-05", "2025-01-10")).is_ok());
    }

    #[test]
    fn every_overlap_shape_conflicts() {
        let ls = state_with(&[("2025-01-10", "2025-01-15")]);
        for (a, b) in [
            ("2025-01-14", "2025-01-16"), // start inside
            ("2025-01-08", "2025-01-11"), // end inside
            ("2025-01-01", "2025-01-31"), // encloses
            ("2025-01-11", "2025-01-12"), // enclosed
            ("2025-01-10", "2025-01-15"), // identical
        ] {
            assert!(
                matches!(check_no_conflict(&ls, &span(a, b)), Err(EngineError::DatesUnavailable)),
                "[{a}, {b}) should conflict"
            );
        }
    }

    #[test]
    fn conflict_reports_the_blocking_booking() {
        let ls = state_with(&[("2025-01-01", "2025-01-03"), ("2025-02-01", "2025-02-03")]);
        let hit = find_conflict(&ls, &span("2025-02-02", "2025-02-10")).unwrap();
        assert_eq!(hit.from, d("2025-02-01"));
    }

    #[test]
    fn merge_joins_touching_and_overlapping() {
        let merged = merge_overlapping(&[
            span("2025-01-01", "2025-01-05"),
            span("2025-01-05", "2025-01-07"),
            span("2025-01-06", "2025-01-09"),
            span("2025-02-01", "2025-02-02"),
        ]);
        assert_eq!(
            merged,
            vec![span("2025-01-01", "2025-01-09"), span("2025-02-01", "2025-02-02")]
        );
    }

    #[test]
    fn unavailable_dates_follow_calendar() {
        let ls = state_with(&[("2025-03-05", "2025-03-07"), ("2025-03-01", "2025-03-05")]);
        assert_eq!(unavailable_dates(&ls), vec![span("2025-03-01", "2025-03-07")]);
    }
}
