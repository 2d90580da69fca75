use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::WalletError;

/// Currencies tracked by the wallet.
///
/// Wire payloads that carry free-form currency codes stay strings at the
/// serialization boundary and parse into this enum at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Xrp,
    Krw,
    Usd,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Xrp => "XRP",
            Currency::Krw => "KRW",
            Currency::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("XRP") {
            Ok(Currency::Xrp)
        } else if trimmed.eq_ignore_ascii_case("KRW") {
            Ok(Currency::Krw)
        } else if trimmed.eq_ignore_ascii_case("USD") {
            Ok(Currency::Usd)
        } else {
            Err(WalletError::ValidationError(format!(
                "Unknown currency code: {}",
                s
            )))
        }
    }
}
