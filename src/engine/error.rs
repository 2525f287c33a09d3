use ulid::Ulid;

use crate::model::BookingStatus;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0} not found: {1}")]
    NotFound(&'static str, Ulid),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    InvalidOperation(&'static str),
    #[error("property allows maximum {0} guests")]
    CapacityExceeded(u32),
    #[error("check-out must be after check-in")]
    InvalidDateRange,
    #[error("selected dates are not available")]
    DatesUnavailable,
    #[error("cannot {action} booking with status: {status}")]
    InvalidState {
        action: &'static str,
        status: BookingStatus,
    },
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("storage error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable kind, used in HTTP error bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(..) => "NOT_FOUND",
            EngineError::Forbidden(_) => "FORBIDDEN",
            EngineError::InvalidOperation(_) => "INVALID_OPERATION",
            EngineError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            EngineError::InvalidDateRange => "INVALID_DATE_RANGE",
            EngineError::DatesUnavailable => "DATES_UNAVAILABLE",
            EngineError::InvalidState { .. } => "INVALID_STATE",
            EngineError::InvalidInput(_) => "INVALID_INPUT",
            EngineError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            EngineError::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        assert_eq!(
            EngineError::CapacityExceeded(4).to_string(),
            "property allows maximum 4 guests"
        );
        assert_eq!(
            EngineError::InvalidState {
                action: "accept",
                status: BookingStatus::Accepted,
            }
            .to_string(),
            "cannot accept booking with status: accepted"
        );
        let id = Ulid::new();
        assert_eq!(
            EngineError::NotFound("listing", id).to_string(),
            format!("listing not found: {id}")
        );
    }
}
