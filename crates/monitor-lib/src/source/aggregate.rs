//! Option position aggregation

use crate::models::{Imparity, OptionsPositionSummary, PositionRecord, UserRecord};
use chrono::Local;

/// Which leg of the options book a symbol belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionSide {
    Call,
    Put,
}

/// Calls contain `CE`, puts `PE`; anything else is not an option
pub fn classify_symbol(symbol: &str) -> Option<OptionSide> {
    let upper = symbol.to_uppercase();
    if upper.contains("CE") {
        Some(OptionSide::Call)
    } else if upper.contains("PE") {
        Some(OptionSide::Put)
    } else {
        None
    }
}

/// Fold a user's open positions into an options summary.
///
/// Flat positions and non-option symbols are ignored. Long quantities count
/// as buys, short quantities (negative) as sells.
pub fn aggregate_user(user: &UserRecord, positions: &[PositionRecord]) -> OptionsPositionSummary {
    let mut summary = OptionsPositionSummary::flat(&user.user_id, user.display_alias());

    for position in positions {
        if position.net_qty == 0 {
            continue;
        }
        let Some(side) = classify_symbol(&position.symbol) else {
            continue;
        };

        let qty = position.net_qty;
        match (side, qty > 0) {
            (OptionSide::Call, true) => summary.call_buy_qty += qty,
            (OptionSide::Call, false) => summary.call_sell_qty += qty,
            (OptionSide::Put, true) => summary.put_buy_qty += qty,
            (OptionSide::Put, false) => summary.put_sell_qty += qty,
        }
    }

    summary.calls_net = summary.call_sell_qty + summary.call_buy_qty;
    summary.puts_net = summary.put_sell_qty + summary.put_buy_qty;
    summary.imparity = if summary.is_balanced() {
        Imparity::Green
    } else {
        Imparity::Red
    };
    summary.live_pnl = user.mtm;
    summary.available_margin = user.available_margin;
    summary.utilized_margin = user.utilized_margin;
    summary.last_updated = Some(Local::now());
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserRecord {
        UserRecord {
            enabled: true,
            user_id: "FZ20267".to_string(),
            logged_in: true,
            mtm: -1250.5,
            available_margin: 400_000.0,
            user_alias: "SUNNY".to_string(),
            broker: "Zerodha".to_string(),
            utilized_margin: 100_000.0,
        }
    }

    fn position(symbol: &str, net_qty: i64) -> PositionRecord {
        PositionRecord {
            symbol: symbol.to_string(),
            net_qty,
            user_id: "FZ20267".to_string(),
        }
    }

    #[test]
    fn test_classify_symbol() {
        assert_eq!(classify_symbol("NIFTY25MAR22500CE"), Some(OptionSide::Call));
        assert_eq!(classify_symbol("banknifty25mar48000pe"), Some(OptionSide::Put));
        assert_eq!(classify_symbol("RELIANCE"), None);
    }

    #[test]
    fn test_aggregate_buckets_by_side_and_direction() {
        let positions = vec![
            position("NIFTY25MAR22500CE", -150),
            position("NIFTY25MAR22600CE", -75),
            position("NIFTY25MAR23000CE", 75),
            position("NIFTY25MAR22000PE", -150),
            position("NIFTY25MAR21500PE", 150),
            position("NIFTY25MAR21000PE", 0),
            position("RELIANCE", 500),
        ];

        let summary = aggregate_user(&user(), &positions);
        assert_eq!(summary.user_alias, "SUNNY");
        assert_eq!(summary.call_sell_qty, -225);
        assert_eq!(summary.call_buy_qty, 75);
        assert_eq!(summary.calls_net, -150);
        assert_eq!(summary.put_sell_qty, -150);
        assert_eq!(summary.put_buy_qty, 150);
        assert_eq!(summary.puts_net, 0);
        assert_eq!(summary.imparity, Imparity::Red);
        assert_eq!(summary.live_pnl, -1250.5);
        assert!(summary.last_updated.is_some());
    }

    #[test]
    fn test_no_positions_is_green() {
        let summary = aggregate_user(&user(), &[]);
        assert_eq!(summary.imparity, Imparity::Green);
        assert_eq!(summary.utilized_margin, 100_000.0);
    }
}
