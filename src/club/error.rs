//! Membership-specific error types.
//!
//! Provides granular error types for reservation, allowance, and redemption
//! operations, enabling better error handling and more informative messages
//! for API consumers.

use std::fmt;

/// Membership-specific errors.
///
/// These errors provide more context than generic errors and can be
/// converted to `ClubError` for HTTP responses. Note that a sold-out tier is
/// not an error: it is an expected reservation outcome the caller branches
/// on. A quota-exceeded redemption, by contrast, is a rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipError {
    // Validation errors
    /// The customer ID is invalid.
    InvalidCustomerId { id: String, reason: String },
    /// The tier ID is invalid.
    InvalidTierId { id: String, reason: String },
    /// Pour quantity must be at least 1.
    InvalidQuantity { quantity: u32 },
    /// The location string is not a recognized value.
    UnknownLocation { value: String },

    // Lookup errors
    /// The specified tier was not found.
    TierNotFound { tier_id: String },
    /// The specified customer was not found.
    CustomerNotFound { customer_id: String },
    /// The specified pour was not found.
    PourNotFound { pour_id: String },

    // State errors
    /// The tier exists but is not open for signup.
    TierInactive { tier_id: String },
    /// The redemption would exceed the remaining period quota.
    QuotaExceeded { requested: u32, available: u32 },
    /// The pour is not in a reversible state.
    PourNotReversible { pour_id: String, status: String },

    // Signup/checkout errors
    /// Invalid redirect URL provided.
    InvalidRedirectUrl { url: String, reason: String },
    /// Redirect URL domain not in allowed list.
    RedirectDomainNotAllowed { domain: String },
    /// The payment provider returned an error.
    ProviderApiError { operation: String, message: String },

    // General errors
    /// A conditional update failed because state changed underneath the
    /// caller. Retried internally a bounded number of times.
    ConcurrentModification { key: String },
    /// The operation failed after multiple retries.
    RetryLimitExceeded { operation: String },
    /// An unexpected internal error occurred.
    Internal { message: String },
}

impl fmt::Display for MembershipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCustomerId { id, reason } => {
                write!(f, "Invalid customer ID '{}': {}", id, reason)
            }
            Self::InvalidTierId { id, reason } => {
                write!(f, "Invalid tier ID '{}': {}", id, reason)
            }
            Self::InvalidQuantity { quantity } => {
                write!(f, "Pour quantity must be at least 1, got {}", quantity)
            }
            Self::UnknownLocation { value } => {
                write!(f, "Unknown pour location: '{}'", value)
            }
            Self::TierNotFound { tier_id } => {
                write!(f, "Tier not found: {}", tier_id)
            }
            Self::CustomerNotFound { customer_id } => {
                write!(f, "Customer not found: {}", customer_id)
            }
            Self::PourNotFound { pour_id } => {
                write!(f, "Pour not found: {}", pour_id)
            }
            Self::TierInactive { tier_id } => {
                write!(f, "Tier '{}' is not open for signup", tier_id)
            }
            Self::QuotaExceeded { requested, available } => {
                write!(
                    f,
                    "Cannot redeem {} pours, only {} remain this period",
                    requested, available
                )
            }
            Self::PourNotReversible { pour_id, status } => {
                write!(
                    f,
                    "Pour {} has status '{}' and cannot be reversed",
                    pour_id, status
                )
            }
            Self::InvalidRedirectUrl { url, reason } => {
                write!(f, "Invalid redirect URL '{}': {}", url, reason)
            }
            Self::RedirectDomainNotAllowed { domain } => {
                write!(f, "Redirect domain '{}' is not allowed", domain)
            }
            Self::ProviderApiError { operation, message } => {
                write!(f, "Payment provider error during '{}': {}", operation, message)
            }
            Self::ConcurrentModification { key } => {
                write!(f, "Concurrent modification detected for '{}', please retry", key)
            }
            Self::RetryLimitExceeded { operation } => {
                write!(f, "Operation '{}' failed after multiple retries", operation)
            }
            Self::Internal { message } => {
                write!(f, "Internal membership error: {}", message)
            }
        }
    }
}

impl std::error::Error for MembershipError {}

impl From<MembershipError> for crate::error::ClubError {
    fn from(err: MembershipError) -> Self {
        match &err {
            // Map to NotFound
            MembershipError::TierNotFound { .. }
            | MembershipError::CustomerNotFound { .. }
            | MembershipError::PourNotFound { .. } => {
                crate::error::ClubError::NotFound(err.to_string())
            }

            // Map to Forbidden (state issues)
            MembershipError::TierInactive { .. } => {
                crate::error::ClubError::Forbidden(err.to_string())
            }

            // Map to BadRequest (client errors)
            MembershipError::InvalidCustomerId { .. }
            | MembershipError::InvalidTierId { .. }
            | MembershipError::InvalidQuantity { .. }
            | MembershipError::UnknownLocation { .. }
            | MembershipError::QuotaExceeded { .. }
            | MembershipError::PourNotReversible { .. }
            | MembershipError::InvalidRedirectUrl { .. }
            | MembershipError::RedirectDomainNotAllowed { .. } => {
                crate::error::ClubError::BadRequest(err.to_string())
            }

            // Map to Conflict (retryable)
            MembershipError::ConcurrentModification { .. } => {
                crate::error::ClubError::Conflict(err.to_string())
            }

            // Map to Internal / upstream (server errors)
            MembershipError::ProviderApiError { .. } => {
                crate::error::ClubError::ServiceUnavailable(err.to_string())
            }
            MembershipError::RetryLimitExceeded { .. }
            | MembershipError::Internal { .. } => {
                crate::error::ClubError::Internal(err.to_string())
            }
        }
    }
}

impl MembershipError {
    /// Check if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCustomerId { .. }
                | Self::InvalidTierId { .. }
                | Self::InvalidQuantity { .. }
                | Self::UnknownLocation { .. }
                | Self::TierNotFound { .. }
                | Self::CustomerNotFound { .. }
                | Self::PourNotFound { .. }
                | Self::TierInactive { .. }
                | Self::QuotaExceeded { .. }
                | Self::PourNotReversible { .. }
                | Self::InvalidRedirectUrl { .. }
                | Self::RedirectDomainNotAllowed { .. }
        )
    }

    /// Check if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClubError;

    #[test]
    fn test_error_display() {
        let err = MembershipError::TierNotFound {
            tier_id: "elite".to_string(),
        };
        assert_eq!(err.to_string(), "Tier not found: elite");

        let err = MembershipError::QuotaExceeded {
            requested: 2,
            available: 1,
        };
        assert_eq!(
            err.to_string(),
            "Cannot redeem 2 pours, only 1 remain this period"
        );
    }

    #[test]
    fn test_error_classification() {
        let err = MembershipError::QuotaExceeded {
            requested: 5,
            available: 0,
        };
        assert!(err.is_client_error());
        assert!(!err.is_retryable());

        let err = MembershipError::ConcurrentModification {
            key: "tier:elite".to_string(),
        };
        assert!(!err.is_client_error());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_convert_to_club_error() {
        let err = MembershipError::CustomerNotFound {
            customer_id: "cust_1".to_string(),
        };
        let club_err: ClubError = err.into();
        assert!(matches!(club_err, ClubError::NotFound(_)));

        let err = MembershipError::UnknownLocation {
            value: "rooftop".to_string(),
        };
        let club_err: ClubError = err.into();
        assert!(matches!(club_err, ClubError::BadRequest(_)));

        let err = MembershipError::TierInactive {
            tier_id: "legacy".to_string(),
        };
        let club_err: ClubError = err.into();
        assert!(matches!(club_err, ClubError::Forbidden(_)));

        let err = MembershipError::ConcurrentModification {
            key: "tier:elite".to_string(),
        };
        let club_err: ClubError = err.into();
        assert!(matches!(club_err, ClubError::Conflict(_)));
    }
}
