//! Canonical market identification.
//!
//! The exchange reports markets as concatenated symbols (`BTCUSDT`), which is
//! ambiguous (`USDTUSD`: `USDT/USD` or `USD/TUSD`?). Internally every market
//! is kept in the canonical `BASE/QUOTE` form resolved from exchange info.

use std::fmt;

/// A spot market in canonical `BASE/QUOTE` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Market {
    base: String,
    quote: String,
}

impl Market {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Parse the canonical `BASE/QUOTE` form.
    pub fn parse(canonical: &str) -> Option<Self> {
        let (base, quote) = canonical.split_once('/')?;
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        Some(Self::new(base, quote))
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    #[must_use]
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Exchange wire symbol, `BASE` and `QUOTE` concatenated.
    #[must_use]
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    #[must_use]
    pub fn touches(&self, coin: &str) -> bool {
        self.base == coin || self.quote == coin
    }

    /// The opposite side of the pair, `None` if `coin` is not traded here.
    #[must_use]
    pub fn other_coin(&self, coin: &str) -> Option<&str> {
        if self.base == coin {
            Some(&self.quote)
        } else if self.quote == coin {
            Some(&self.base)
        } else {
            None
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_display() {
        let market = Market::parse("BTC/USDT").unwrap();
        assert_eq!(market.base(), "BTC");
        assert_eq!(market.quote(), "USDT");
        assert_eq!(market.to_string(), "BTC/USDT");
        assert_eq!(market.symbol(), "BTCUSDT");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(Market::parse("BTCUSDT").is_none());
        assert!(Market::parse("/USDT").is_none());
        assert!(Market::parse("BTC/").is_none());
    }

    #[test]
    fn other_coin() {
        let market = Market::new("ETH", "BTC");
        assert_eq!(market.other_coin("ETH"), Some("BTC"));
        assert_eq!(market.other_coin("BTC"), Some("ETH"));
        assert_eq!(market.other_coin("USDT"), None);
        assert!(market.touches("ETH"));
        assert!(!market.touches("USDT"));
    }
}
