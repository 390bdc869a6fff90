//! Picks one candidate from an upstream payload and normalizes it into a phone
//! token ready to be used in a messaging deep-link.

use crate::types::{CANDIDATE_FIELD, ContactPayload};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Prepended to numbers that arrive without their country code.
pub const COUNTRY_PREFIX: &str = "54";

/// Length of a national number missing [`COUNTRY_PREFIX`].
const NATIONAL_DIGITS: usize = 10;

pub const MIN_PHONE_DIGITS: usize = 8;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SelectionError {
    #[error("whatsapp list is empty")]
    EmptyList,

    #[error("invalid phone number from whatsapp list: {0:?}")]
    InvalidPhone(String),
}

/// A digits-only phone number with at least [`MIN_PHONE_DIGITS`] digits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CanonicalPhone(String);

impl CanonicalPhone {
    /// Strips every non-digit and prefixes national numbers with the country code.
    pub fn parse(raw: &str) -> Result<Self, SelectionError> {
        let mut digits: String = raw.chars().filter(char::is_ascii_digit).collect();

        if digits.len() == NATIONAL_DIGITS {
            digits.insert_str(0, COUNTRY_PREFIX);
        }

        if digits.len() < MIN_PHONE_DIGITS {
            return Err(SelectionError::InvalidPhone(raw.to_string()));
        }

        Ok(CanonicalPhone(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalPhone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub phone: CanonicalPhone,
    /// Name of the list the phone was chosen from.
    pub chosen_from: &'static str,
    pub list_len: usize,
}

pub fn select(payload: &ContactPayload) -> Result<Selection, SelectionError> {
    select_with(payload, &mut rand::thread_rng())
}

/// Uniform pick over the candidate list. Each call is independent.
pub fn select_with<R: Rng + ?Sized>(
    payload: &ContactPayload,
    rng: &mut R,
) -> Result<Selection, SelectionError> {
    let candidates = payload.candidates();
    let raw = candidates.choose(rng).ok_or(SelectionError::EmptyList)?;

    Ok(Selection {
        phone: CanonicalPhone::parse(&raw_candidate(raw))?,
        chosen_from: CANDIDATE_FIELD,
        list_len: candidates.len(),
    })
}

// Numbers are accepted as well as strings; everything else normalizes to nothing.
fn raw_candidate(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}
