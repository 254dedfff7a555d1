//! Maximum executable volume for a chain.
//!
//! Each step only has so much liquidity at the book top. The solver projects
//! every step's available spending volume back into initial-coin units
//! through the prior steps' price ratios, takes the minimum, then propagates
//! that minimum forward so all three volumes stay consistent.

use crate::core::domain::ChainStep;

/// Resolve the maximum initial-coin volume the chain can move and rewrite
/// every step's volume accordingly. Returns the initial-coin volume.
///
/// If any step has zero volume the whole chain is unexecutable and all three
/// volumes are zeroed.
pub fn resolve_max_volume(steps: &mut [ChainStep; 3]) -> f64 {
    if steps.iter().any(|s| s.volume == 0.0) {
        for step in steps.iter_mut() {
            step.volume = 0.0;
        }
        return 0.0;
    }

    // Step 1 spends coin A directly.
    let coin_a_market1 = steps[0].proposed_volume();
    let coin_b_market1 = steps[0].received_volume();

    // Step 2 spends coin B; convert to A through step 1's ratio.
    let coin_b_market2 = steps[1].proposed_volume();
    let coin_c_market2 = steps[1].received_volume();
    let coin_a_market2 = coin_b_market2 * (coin_a_market1 / coin_b_market1);

    // Step 3 spends coin C; convert through steps 2 and 1.
    let coin_c_market3 = steps[2].proposed_volume();
    let coin_b_market3 = coin_c_market3 * (coin_b_market2 / coin_c_market2);
    let coin_a_market3 = coin_b_market3 * (coin_a_market1 / coin_b_market1);

    let max_available = coin_a_market1.min(coin_a_market2).min(coin_a_market3);

    steps[0].volume = adjusted_volume(&steps[0], max_available);
    let coin_b_after = steps[0].received_volume();
    steps[1].volume = adjusted_volume(&steps[1], coin_b_after);
    let coin_c_after = steps[1].received_volume();
    steps[2].volume = adjusted_volume(&steps[2], coin_c_after);

    max_available
}

/// Step volume that consumes exactly `prev_coin_volume` of its spending coin.
fn adjusted_volume(step: &ChainStep, prev_coin_volume: f64) -> f64 {
    if step.is_buy() {
        prev_coin_volume / step.price
    } else {
        prev_coin_volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Market, OrderSide};

    fn step(market: &str, side: OrderSide, price: f64, volume: f64) -> ChainStep {
        ChainStep::new(Market::parse(market).unwrap(), side, price, volume)
    }

    fn volumes(steps: &[ChainStep; 3]) -> [f64; 3] {
        [steps[0].volume, steps[1].volume, steps[2].volume]
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-7,
            "{} != {}",
            actual,
            expected
        );
    }

    #[test]
    fn all_buys() {
        let mut steps = [
            step("BTC/USDT", OrderSide::Buy, 50_000.0, 2.0),
            step("ETH/BTC", OrderSide::Buy, 0.05, 42.0),
            // No such market in reality, but the math doesn't care.
            step("USDT/ETH", OrderSide::Buy, 0.0004, 300_000.0),
        ];
        let max = resolve_max_volume(&mut steps);
        assert_close(max, 100_000.0);
        let [v1, v2, v3] = volumes(&steps);
        assert_close(v1, 2.0);
        assert_close(v2, 40.0);
        assert_close(v3, 100_000.0);
    }

    #[test]
    fn two_buys_one_sell() {
        let mut steps = [
            step("BTC/USDT", OrderSide::Buy, 50_000.0, 2.0),
            step("ETH/BTC", OrderSide::Buy, 0.05, 42.0),
            step("ETH/USDT", OrderSide::Sell, 2_500.0, 40.0),
        ];
        resolve_max_volume(&mut steps);
        let [v1, v2, v3] = volumes(&steps);
        assert_close(v1, 2.0);
        assert_close(v2, 40.0);
        assert_close(v3, 40.0);
    }

    #[test]
    fn all_sells_min_at_first_step() {
        let mut steps = [
            step("A/B", OrderSide::Sell, 10.0, 2.0),
            step("B/C", OrderSide::Sell, 0.1, 21.0),
            step("C/A", OrderSide::Sell, 1.1, 2.1),
        ];
        resolve_max_volume(&mut steps);
        let [v1, v2, v3] = volumes(&steps);
        assert_close(v1, 2.0);
        assert_close(v2, 20.0);
        assert_close(v3, 2.0);
    }

    #[test]
    fn all_sells_min_at_second_step() {
        let mut steps = [
            step("A/B", OrderSide::Sell, 10.0, 2.0),
            step("B/C", OrderSide::Sell, 0.1, 19.0),
            step("C/A", OrderSide::Sell, 1.1, 2.1),
        ];
        resolve_max_volume(&mut steps);
        let [v1, v2, v3] = volumes(&steps);
        assert_close(v1, 1.9);
        assert_close(v2, 19.0);
        assert_close(v3, 1.9);
    }

    #[test]
    fn all_sells_min_at_third_step() {
        let mut steps = [
            step("A/B", OrderSide::Sell, 10.0, 2.0),
            step("B/C", OrderSide::Sell, 0.1, 20.0),
            step("C/A", OrderSide::Sell, 1.1, 1.8),
        ];
        resolve_max_volume(&mut steps);
        let [v1, v2, v3] = volumes(&steps);
        assert_close(v1, 1.8);
        assert_close(v2, 18.0);
        assert_close(v3, 1.8);
    }

    #[test]
    fn zero_volume_zeroes_the_chain() {
        let mut steps = [
            step("BTC/USDT", OrderSide::Buy, 50_000.0, 0.0),
            step("ETH/BTC", OrderSide::Buy, 0.05, 42.0),
            step("ETH/USDT", OrderSide::Sell, 2_500.0, 40.0),
        ];
        let max = resolve_max_volume(&mut steps);
        assert_eq!(max, 0.0);
        assert_eq!(volumes(&steps), [0.0, 0.0, 0.0]);
    }
}
