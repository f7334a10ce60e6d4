//! Per-instance contact addresses
//!
//! The account-creation API requires a globally unique email per account.
//! A configured base address such as `ops@example.com` is turned into
//! `ops+<instance-id>@example.com` so every instance gets its own address
//! while mail still lands in the same mailbox.

use crate::error::AddressError;

/// Split an address into local part and domain at the first `@`
pub fn split_address(address: &str) -> Result<(&str, &str), AddressError> {
    let (local, domain) = address
        .split_once('@')
        .ok_or_else(|| AddressError::MissingAt(address.to_string()))?;

    if local.is_empty() {
        return Err(AddressError::EmptyLocalPart(address.to_string()));
    }
    if domain.is_empty() {
        return Err(AddressError::EmptyDomain(address.to_string()));
    }

    Ok((local, domain))
}

/// Check that a base address can be used for derivation
pub fn validate_base(base: &str) -> Result<(), AddressError> {
    split_address(base).map(|_| ())
}

/// Derive the contact address for `instance_id` from `base`.
///
/// ```
/// use acctbroker_core::derive_address;
///
/// assert_eq!(derive_address("foo@bar.com", "1").unwrap(), "foo+1@bar.com");
/// ```
pub fn derive_address(base: &str, instance_id: &str) -> Result<String, AddressError> {
    let (local, domain) = split_address(base)?;

    let usable = !instance_id.is_empty()
        && !instance_id
            .chars()
            .any(|c| c == '@' || c.is_whitespace() || c.is_control());
    if !usable {
        return Err(AddressError::InvalidInstanceId(instance_id.to_string()));
    }

    Ok(format!("{}+{}@{}", local, instance_id, domain))
}

/// Recover the instance id from an address derived from `base`
pub fn instance_tag<'a>(base: &str, derived: &'a str) -> Option<&'a str> {
    let (base_local, base_domain) = split_address(base).ok()?;
    let (local, domain) = derived.split_once('@')?;
    if domain != base_domain {
        return None;
    }

    local
        .strip_prefix(base_local)?
        .strip_prefix('+')
        .filter(|tag| !tag.is_empty())
}
