//! Input validation for membership operations.
//!
//! Validation functions for customer and tier identifiers, preventing
//! injection attacks and ensuring data integrity before any lookup.

use super::error::MembershipError;
use crate::error::Result;

/// Maximum length for customer IDs.
const MAX_CUSTOMER_ID_LENGTH: usize = 256;

/// Maximum length for tier IDs.
const MAX_TIER_ID_LENGTH: usize = 64;

/// Validate a customer ID.
///
/// Customer IDs must:
/// - Not be empty
/// - Not exceed 256 characters
/// - Contain only alphanumeric characters, underscores, and hyphens
///
/// # Errors
///
/// Returns `MembershipError::InvalidCustomerId` if validation fails.
pub fn validate_customer_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(MembershipError::InvalidCustomerId {
            id: id.to_string(),
            reason: "customer_id cannot be empty".to_string(),
        }
        .into());
    }

    if id.len() > MAX_CUSTOMER_ID_LENGTH {
        return Err(MembershipError::InvalidCustomerId {
            id: truncate_for_error(id),
            reason: format!(
                "customer_id exceeds maximum length of {}",
                MAX_CUSTOMER_ID_LENGTH
            ),
        }
        .into());
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(MembershipError::InvalidCustomerId {
            id: sanitize_for_error(id),
            reason: "customer_id contains invalid characters (only alphanumeric, underscore, and hyphen allowed)".to_string(),
        }
        .into());
    }

    Ok(())
}

/// Validate a tier ID.
///
/// Tier IDs must:
/// - Not be empty
/// - Not exceed 64 characters
/// - Contain only alphanumeric characters, underscores, and hyphens
///
/// # Errors
///
/// Returns `MembershipError::InvalidTierId` if validation fails.
pub fn validate_tier_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(MembershipError::InvalidTierId {
            id: id.to_string(),
            reason: "tier_id cannot be empty".to_string(),
        }
        .into());
    }

    if id.len() > MAX_TIER_ID_LENGTH {
        return Err(MembershipError::InvalidTierId {
            id: truncate_for_error(id),
            reason: format!("tier_id exceeds maximum length of {}", MAX_TIER_ID_LENGTH),
        }
        .into());
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(MembershipError::InvalidTierId {
            id: sanitize_for_error(id),
            reason: "tier_id contains invalid characters".to_string(),
        }
        .into());
    }

    Ok(())
}

/// Truncate an overlong ID for inclusion in an error message.
fn truncate_for_error(id: &str) -> String {
    let truncated: String = id.chars().take(64).collect();
    format!("{}...", truncated)
}

/// Strip non-identifier characters before echoing an ID back in an error.
fn sanitize_for_error(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '?'
            }
        })
        .take(64)
        .collect()
}
