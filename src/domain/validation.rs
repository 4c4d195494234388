//! Request validation.
//!
//! Runs before the aggregation engine touches any state. Checks are applied
//! in order (country, page, delta) and the first failure is returned.

use std::collections::BTreeSet;

use crate::error::{Error, Result, ValidationError};

use super::model::{CountryCode, PageId};

/// Country codes recognized when no list is configured.
pub const DEFAULT_COUNTRY_CODES: &[&str] = &["RU", "US", "CY"];

// =============================================================================
// Country Registry
// =============================================================================

/// The enumeration of recognized country codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryRegistry {
    codes: BTreeSet<String>,
}

impl CountryRegistry {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            codes: codes
                .into_iter()
                .map(|c| c.as_ref().trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Parse a comma separated list such as `"RU,US,CY"`.
    pub fn parse(list: &str) -> Result<Self> {
        let registry = Self::new(list.split(','));
        if registry.is_empty() {
            return Err(Error::Config(format!(
                "country code list is empty: {:?}",
                list
            )));
        }
        Ok(registry)
    }

    /// Case-insensitive membership check. Surrounding whitespace is not
    /// stripped, so `" US"` is not a member.
    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(&code.to_ascii_uppercase())
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Default for CountryRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTRY_CODES.iter())
    }
}

// =============================================================================
// Validator
// =============================================================================

/// An update that passed validation, with the country normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpdate {
    pub country: CountryCode,
    pub page: PageId,
    pub delta: u64,
}

/// Pure validator over a fixed country registry.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    registry: CountryRegistry,
}

impl Validator {
    pub fn new(registry: CountryRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CountryRegistry {
        &self.registry
    }

    pub fn validate(
        &self,
        country_code: &str,
        page_id: &str,
        delta: i64,
    ) -> std::result::Result<ValidatedUpdate, ValidationError> {
        if !self.registry.contains(country_code) {
            return Err(ValidationError::InvalidCountryCode(country_code.to_string()));
        }
        if !is_valid_page_name(page_id) {
            return Err(ValidationError::InvalidPageName(page_id.to_string()));
        }
        if delta <= 0 {
            return Err(ValidationError::NonPositiveDelta(delta));
        }

        Ok(ValidatedUpdate {
            country: CountryCode::new(country_code),
            page: PageId::new(page_id),
            delta: delta as u64,
        })
    }
}

/// `[A-Za-z0-9_-]+`
fn is_valid_page_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
