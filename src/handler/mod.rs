use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod handler;
pub use handler::router;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetNumberRequest {
    pub target_number: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DigitRequest {
    pub digit: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum DigitError {
    #[error("digit must be a single character")]
    NotSingle,
    #[error("'{0}' is not a touch-tone digit")]
    NotDtmf(char),
}

/// Accepts exactly one of `0-9`, `*`, `#`, `A-D`.
pub fn parse_digit(input: &str) -> Result<char, DigitError> {
    let mut chars = input.trim().chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return Err(DigitError::NotSingle);
    };
    match c {
        '0'..='9' | '*' | '#' | 'A'..='D' => Ok(c),
        'a'..='d' => Ok(c.to_ascii_uppercase()),
        _ => Err(DigitError::NotDtmf(c)),
    }
}
