//! Property tests for request resolution and the per-unit seed.
//!
//! Uses proptest to verify:
//! 1. Resolved tickers are never empty, never blank and never repeated
//! 2. Resolution keeps the first-seen order of the trimmed tickers
//! 3. Unit seeds depend only on (seed, ticker, horizon)

use proptest::prelude::*;

use pricecast_core::domain::Horizon;
use pricecast_runner::{unit_seed, ForecastRequest};

// ── Strategies (proptest) ────────────────────────────────────────────

/// Tickers drawn from a small alphabet so duplicates are common, padded
/// with optional whitespace.
fn arb_ticker() -> impl Strategy<Value = String> {
    ("[ ]{0,2}", "[A-C]{0,2}", "[ ]{0,2}").prop_map(|(pre, body, post)| format!("{pre}{body}{post}"))
}

fn arb_request() -> impl Strategy<Value = ForecastRequest> {
    prop::collection::vec(arb_ticker(), 0..12).prop_map(|tickers| ForecastRequest {
        tickers,
        ..ForecastRequest::default()
    })
}

fn arb_horizon() -> impl Strategy<Value = Horizon> {
    prop_oneof![Just(Horizon::Short), Just(Horizon::Long)]
}

// ── Ticker resolution ────────────────────────────────────────────────

proptest! {
    #[test]
    fn resolved_tickers_are_clean_and_unique(req in arb_request()) {
        let out = req.resolved_tickers("DEFAULT");
        prop_assert!(!out.is_empty());
        for (i, t) in out.iter().enumerate() {
            prop_assert!(!t.trim().is_empty());
            prop_assert_eq!(t.trim(), t.as_str());
            prop_assert!(!out[..i].contains(t));
        }
    }

    #[test]
    fn resolution_keeps_first_seen_order(req in arb_request()) {
        let mut expected: Vec<String> = Vec::new();
        for t in req.tickers.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !expected.iter().any(|e| e == t) {
                expected.push(t.to_string());
            }
        }
        let out = req.resolved_tickers("DEFAULT");
        if expected.is_empty() {
            prop_assert_eq!(out, vec!["DEFAULT".to_string()]);
        } else {
            prop_assert_eq!(out, expected);
        }
    }
}

// ── Seeds ────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn unit_seed_is_deterministic(seed in any::<u64>(), ticker in "[A-Z]{1,8}", horizon in arb_horizon()) {
        prop_assert_eq!(unit_seed(seed, &ticker, horizon), unit_seed(seed, &ticker, horizon));
    }

    #[test]
    fn unit_seed_separates_horizons(seed in any::<u64>(), ticker in "[A-Z]{1,8}") {
        prop_assert_ne!(
            unit_seed(seed, &ticker, Horizon::Short),
            unit_seed(seed, &ticker, Horizon::Long)
        );
    }
}
