//! Sales channel (tariff context).

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Which base price and rule set apply to a sale.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    B2B,
    B2C,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::B2B => "B2B",
            Channel::B2C => "B2C",
        }
    }
}

impl core::fmt::Display for Channel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "B2B" => Ok(Channel::B2B),
            "B2C" => Ok(Channel::B2C),
            other => Err(LedgerError::validation(format!("unknown channel '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("b2c".parse::<Channel>().unwrap(), Channel::B2C);
        assert_eq!(" B2B ".parse::<Channel>().unwrap(), Channel::B2B);
        assert!("retail".parse::<Channel>().is_err());
    }
}
