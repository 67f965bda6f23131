//! Conversions between exchange symbols and unified pair identifiers.

/// Quote assets recognised on the futures feed, longest first.
const SETTLE_ASSETS: [&str; 4] = ["USDT", "USDC", "BTC", "ETH"];

/// Convert an exchange symbol to a unified pair: `BTCUSDT` -> `BTC/USDT:USDT`.
///
/// Symbols without a recognised quote asset are returned unchanged.
pub fn format_pair_symbol(symbol: &str) -> String {
    for quote in SETTLE_ASSETS {
        if let Some(base) = symbol.strip_suffix(quote) {
            if !base.is_empty() {
                return format!("{base}/{quote}:{quote}");
            }
        }
    }
    symbol.to_string()
}

/// Convert a unified pair back to an exchange symbol: `BTC/USDT:USDT` -> `BTCUSDT`.
pub fn to_exchange_symbol(pair: &str) -> String {
    let market = pair.split_once(':').map_or(pair, |(market, _)| market);
    market.replace('/', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pair_symbol() {
        assert_eq!(format_pair_symbol("BTCUSDT"), "BTC/USDT:USDT");
        assert_eq!(format_pair_symbol("1000PEPEUSDT"), "1000PEPE/USDT:USDT");
        assert_eq!(format_pair_symbol("ETHUSDC"), "ETH/USDC:USDC");
        assert_eq!(format_pair_symbol("ETHBTC"), "ETH/BTC:BTC");
        assert_eq!(format_pair_symbol("USDT"), "USDT");
        assert_eq!(format_pair_symbol("BTCDOM"), "BTCDOM");
    }

    #[test]
    fn test_to_exchange_symbol() {
        assert_eq!(to_exchange_symbol("BTC/USDT:USDT"), "BTCUSDT");
        assert_eq!(to_exchange_symbol("ETH/USDT"), "ETHUSDT");
        assert_eq!(to_exchange_symbol("SOLUSDT"), "SOLUSDT");
    }
}
