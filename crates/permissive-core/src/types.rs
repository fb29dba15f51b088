use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a cached boolean outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    Met,
    NotMet,
    Expired,
}

impl ResultType {
    pub fn from_bool(value: bool) -> Self {
        if value {
            ResultType::Met
        } else {
            ResultType::NotMet
        }
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultType::Met => write!(f, "Met"),
            ResultType::NotMet => write!(f, "Not Met"),
            ResultType::Expired => write!(f, "Expired"),
        }
    }
}
