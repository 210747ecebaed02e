use serde::{Deserialize, Serialize};
use std::fmt;

/// Kline interval shared by the pagination engine's kline helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KlineInterval {
    Seconds1,

    Minutes1,
    Minutes3,
    Minutes5,
    Minutes15,
    Minutes30,

    Hours1,
    Hours2,
    Hours4,
    Hours6,
    Hours8,
    Hours12,

    Days1,
    Days3,

    Weeks1,

    // fixed 30 days, calendar months are not modelled
    Months1,
}

impl KlineInterval {
    pub const fn seconds(self) -> i64 {
        match self {
            Self::Seconds1 => 1,
            Self::Minutes1 => 60,
            Self::Minutes3 => 3 * 60,
            Self::Minutes5 => 5 * 60,
            Self::Minutes15 => 15 * 60,
            Self::Minutes30 => 30 * 60,
            Self::Hours1 => 60 * 60,
            Self::Hours2 => 2 * 60 * 60,
            Self::Hours4 => 4 * 60 * 60,
            Self::Hours6 => 6 * 60 * 60,
            Self::Hours8 => 8 * 60 * 60,
            Self::Hours12 => 12 * 60 * 60,
            Self::Days1 => 24 * 60 * 60,
            Self::Days3 => 3 * 24 * 60 * 60,
            Self::Weeks1 => 7 * 24 * 60 * 60,
            Self::Months1 => 30 * 24 * 60 * 60,
        }
    }

    pub fn duration(self) -> chrono::Duration {
        chrono::Duration::seconds(self.seconds())
    }

    pub fn from_seconds(seconds: i64) -> Option<Self> {
        Self::all().into_iter().find(|i| i.seconds() == seconds)
    }

    pub fn all() -> Vec<Self> {
        vec![
            Self::Seconds1,
            Self::Minutes1,
            Self::Minutes3,
            Self::Minutes5,
            Self::Minutes15,
            Self::Minutes30,
            Self::Hours1,
            Self::Hours2,
            Self::Hours4,
            Self::Hours6,
            Self::Hours8,
            Self::Hours12,
            Self::Days1,
            Self::Days3,
            Self::Weeks1,
            Self::Months1,
        ]
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            Self::Seconds1 => "1 second",
            Self::Minutes1 => "1 minute",
            Self::Minutes3 => "3 minutes",
            Self::Minutes5 => "5 minutes",
            Self::Minutes15 => "15 minutes",
            Self::Minutes30 => "30 minutes",
            Self::Hours1 => "1 hour",
            Self::Hours2 => "2 hours",
            Self::Hours4 => "4 hours",
            Self::Hours6 => "6 hours",
            Self::Hours8 => "8 hours",
            Self::Hours12 => "12 hours",
            Self::Days1 => "1 day",
            Self::Days3 => "3 days",
            Self::Weeks1 => "1 week",
            Self::Months1 => "1 month",
        };
        write!(f, "{}", description)
    }
}
