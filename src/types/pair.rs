use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use crate::error::{Error, Result};

pub const PAIR_SEPARATOR: char = '_';

/// Canonical currency pair title, `BASE_QUOTE`, always upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pair {
    base: String,
    quote: String,
}

impl Pair {
    /// Parse and normalize a pair title such as `btc_usdt` into `BTC_USDT`.
    pub fn parse(title: &str) -> Result<Self> {
        let mut parts = title.trim().split(PAIR_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) => Pair::new(base, quote),
            _ => Err(Error::InvalidPairFormat(format!(
                "pair string should be in format COIN1{}COIN2, got {:?}",
                PAIR_SEPARATOR, title
            ))),
        }
    }

    pub fn new(base: &str, quote: &str) -> Result<Self> {
        let base = base.trim();
        let quote = quote.trim();
        let valid = |s: &str| !s.is_empty() && !s.contains(PAIR_SEPARATOR);
        if !valid(base) || !valid(quote) {
            return Err(Error::InvalidPairFormat(format!(
                "both pair symbols must be non-empty, got {:?} and {:?}",
                base, quote
            )));
        }

        Ok(Pair {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// `USDT_BTC` -> `BTC_USDT`
    pub fn inverted(&self) -> Pair {
        Pair {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }

    pub fn title(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.base, PAIR_SEPARATOR, self.quote)
    }
}

impl FromStr for Pair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Pair::parse(s)
    }
}

impl Serialize for Pair {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Pair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let title = String::deserialize(deserializer)?;
        Pair::parse(&title).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalizes_to_upper_case() {
        let pair = Pair::parse("btc_usdt").unwrap();
        assert_eq!(pair.to_string(), "BTC_USDT");
        assert_eq!(pair.base(), "BTC");
        assert_eq!(pair.quote(), "USDT");
    }

    #[test]
    fn test_rejects_missing_separator() {
        assert!(matches!(Pair::parse("btcusdt"), Err(Error::InvalidPairFormat(_))));
    }

    #[test]
    fn test_rejects_extra_segments() {
        assert!(matches!(Pair::parse("a_b_c"), Err(Error::InvalidPairFormat(_))));
    }

    #[test]
    fn test_rejects_empty_sides() {
        assert!(Pair::parse("_USDT").is_err());
        assert!(Pair::parse("BTC_").is_err());
        assert!(Pair::parse("").is_err());
        assert!(Pair::new("BTC", "").is_err());
    }

    #[test]
    fn test_inverted() {
        let pair = Pair::parse("USDT_BTC").unwrap();
        assert_eq!(pair.inverted().to_string(), "BTC_USDT");
        assert_eq!(pair.inverted().inverted(), pair);
    }

    #[test]
    fn test_serde_uses_title() {
        let pair = Pair::parse("usdt_eth").unwrap();
        assert_eq!(serde_json::to_string(&pair).unwrap(), "\"USDT_ETH\"");
        let back: Pair = serde_json::from_str("\"usdt_eth\"").unwrap();
        assert_eq!(back, pair);
        assert!(serde_json::from_str::<Pair>("\"usdteth\"").is_err());
    }

    proptest! {
        #[test]
        fn prop_parse_is_case_insensitive(base in "[a-zA-Z0-9]{1,6}", quote in "[a-zA-Z0-9]{1,6}") {
            let lower = Pair::parse(&format!("{}_{}", base.to_lowercase(), quote.to_lowercase())).unwrap();
            let upper = Pair::parse(&format!("{}_{}", base.to_uppercase(), quote.to_uppercase())).unwrap();
            prop_assert_eq!(&lower, &upper);
            prop_assert_eq!(lower.to_string(), format!("{}_{}", base.to_uppercase(), quote.to_uppercase()));
        }

        #[test]
        fn prop_separator_count_must_be_one(parts in proptest::collection::vec("[A-Z]{1,4}", 1..5)) {
            let title = parts.join("_");
            prop_assert_eq!(Pair::parse(&title).is_ok(), parts.len() == 2);
        }
    }
}
