//! Contacts and phone-number handling.
//!
//! Every contact is keyed by its canonical phone number: digits only, country
//! code first, prefixed with `+` (e.g. `+31612345678`). Transports address the
//! same number as `31612345678@c.us`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Country code applied to national numbers that start with `0`.
const DEFAULT_COUNTRY_CODE: &str = "31";

/// Suffix transports append to a phone number to form a chat id.
const TRANSPORT_SUFFIX: &str = "@c.us";

const MIN_DIGITS: usize = 10;
const MAX_DIGITS: usize = 15;

/// A campaign target. Immutable once read from the contact source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contact {
    /// Canonical phone number, also the ledger key.
    pub phone_number: String,
    /// Free-text category tag, matched case-insensitively against templates.
    pub category: String,
}

impl Contact {
    /// Build a contact from an already-canonical phone number.
    pub fn new(phone_number: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            category: category.into(),
        }
    }

    /// Build a contact from a raw phone number, normalizing it first.
    ///
    /// Returns `None` for numbers that do not look like a reachable phone.
    pub fn parse(raw_phone: &str, category: impl Into<String>) -> Option<Self> {
        let phone_number = normalize_phone_number(raw_phone)?;
        if !is_valid_phone_number(&phone_number) {
            return None;
        }
        Some(Self::new(phone_number, category))
    }

    /// The ledger/conversation key for this contact.
    pub fn id(&self) -> &str {
        &self.phone_number
    }

    /// Category normalized for template lookup.
    pub fn category_key(&self) -> String {
        self.category.trim().to_lowercase()
    }

    /// Chat id for the transport layer.
    pub fn transport_id(&self) -> String {
        to_transport_id(&self.phone_number)
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.phone_number, self.category)
    }
}

/// Normalize a raw phone number to `+<country><number>`.
///
/// Non-digits are stripped and a national `0` prefix becomes the default
/// country code. Fewer than ten digits is rejected.
pub fn normalize_phone_number(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    let digits = match digits.strip_prefix('0') {
        Some(rest) => format!("{DEFAULT_COUNTRY_CODE}{rest}"),
        None => digits,
    };

    if digits.len() < MIN_DIGITS {
        tracing::warn!(raw = %raw, "Invalid phone number");
        return None;
    }

    Some(format!("+{digits}"))
}

/// Whether a canonical number has a plausible international length.
pub fn is_valid_phone_number(phone_number: &str) -> bool {
    let count = phone_number.chars().filter(char::is_ascii_digit).count();
    (MIN_DIGITS..=MAX_DIGITS).contains(&count)
}

/// `+31612345678` → `31612345678@c.us`.
pub fn to_transport_id(phone_number: &str) -> String {
    let bare = phone_number.trim_start_matches('+');
    if bare.ends_with(TRANSPORT_SUFFIX) {
        bare.to_string()
    } else {
        format!("{bare}{TRANSPORT_SUFFIX}")
    }
}

/// `31612345678@c.us` → `+31612345678`.
pub fn from_transport_id(transport_id: &str) -> String {
    let bare = transport_id
        .strip_suffix(TRANSPORT_SUFFIX)
        .unwrap_or(transport_id);
    if bare.starts_with('+') {
        bare.to_string()
    } else {
        format!("+{bare}")
    }
}
