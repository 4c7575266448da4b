//! Outcome of processing one message.
//!
//! Every dispatched message resolves to exactly one `Outcome`, and each
//! variant maps onto one transport action:
//!
//! - `Success` -> acknowledge (remove from the subscription)
//! - `Retry`   -> abandon (back to the subscription, delivery count goes up)
//! - `Drop`    -> dead-letter (side queue for manual inspection)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::OutcomeParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Retry,
    Drop,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Retry => "retry",
            Outcome::Drop => "drop",
        }
    }

    /// Does this outcome count against the downstream dependency's health?
    ///
    /// A dropped message is a problem with the message, not the dependency,
    /// so only `Retry` counts.
    pub fn is_failure(self) -> bool {
        matches!(self, Outcome::Retry)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = OutcomeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(Outcome::Success),
            "retry" => Ok(Outcome::Retry),
            "drop" => Ok(Outcome::Drop),
            _ => Err(OutcomeParseError(s.to_string())),
        }
    }
}
