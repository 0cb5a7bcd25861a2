//! Email Address

use std::{fmt, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use AddressError::*;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^@\s]*?@[^@\s]*?\.[^@\s]*$").unwrap();
    static ref NAMED_REGEX: Regex = Regex::new(r"^(.*?)\s*<([^<>]*)>$").unwrap();
}

/// An error that can occur when parsing an address
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The address is empty
    #[error("email is empty")]
    EmptyAddress,

    /// The address is invalid
    #[error("email is invalid: {0}")]
    InvalidAddress(String),
}

/// A display name and an email address
///
/// Construction through [`Address::new`] performs no validation; use
/// [`Address::parse`] for untrusted input.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Address {
    /// Display name, may be empty
    pub name: String,

    /// The bare `local@domain` address
    pub address: String,
}

impl Address {
    /// Create a new address without validating it
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Parse `Name <local@domain>` or a bare `local@domain`
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(EmptyAddress);
        }

        let (name, address) = match NAMED_REGEX.captures(trimmed) {
            Some(captures) => (
                captures[1].trim().trim_matches('"').to_string(),
                captures[2].trim().to_string(),
            ),
            None => (String::new(), trimmed.to_string()),
        };

        if address.is_empty() {
            return Err(EmptyAddress);
        }

        if !EMAIL_REGEX.is_match(&address) {
            return Err(InvalidAddress(address));
        }

        Ok(Self { name, address })
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            return write!(f, "<{}>", self.address);
        }

        let escaped = self.name.replace('\\', "\\\\").replace('"', "\\\"");

        write!(f, "\"{}\" <{}>", escaped, self.address)
    }
}
