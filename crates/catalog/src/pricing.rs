//! Exact decimal price statistics.

use rust_decimal::{Decimal, RoundingStrategy};

use storefront_core::Price;
use storefront_core::price::PRICE_SCALE;

/// Running sum + count of prices.
///
/// Accumulates in `Decimal` so that averaging never goes through floating
/// point. An empty accumulator has no mean (rather than a mean of zero).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceAverage {
    sum: Decimal,
    count: u64,
}

impl PriceAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, price: Price) {
        self.sum += price.amount();
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Unrounded arithmetic mean, or `None` when nothing was added.
    pub fn mean(&self) -> Option<Decimal> {
        if self.count == 0 {
            return None;
        }
        self.sum.checked_div(Decimal::from(self.count))
    }
}

impl FromIterator<Price> for PriceAverage {
    fn from_iter<T: IntoIterator<Item = Price>>(iter: T) -> Self {
        let mut avg = PriceAverage::new();
        for price in iter {
            avg.add(price);
        }
        avg
    }
}

/// Round a computed statistic to the scale prices are displayed with.
///
/// The result always carries exactly two decimal places (`3` becomes `3.00`).
pub fn round_to_price_scale(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(PRICE_SCALE);
    rounded
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn price(raw: &str) -> Price {
        Price::parse(raw).unwrap()
    }

    #[test]
    fn empty_has_no_mean() {
        assert_eq!(PriceAverage::new().mean(), None);
    }

    #[test]
    fn mean_of_two_prices() {
        let avg: PriceAverage = [price("2.00"), price("4.00")].into_iter().collect();
        assert_eq!(avg.count(), 2);
        assert_eq!(avg.mean(), Some(dec!(3)));
    }

    #[test]
    fn mean_is_not_rounded_internally() {
        let avg: PriceAverage = [price("1.00"), price("1.00"), price("2.00")].into_iter().collect();
        let mean = avg.mean().unwrap();
        assert!(mean > dec!(1.33) && mean < dec!(1.34));
        assert_eq!(round_to_price_scale(mean), dec!(1.33));
    }

    #[test]
    fn repeated_tenths_do_not_drift() {
        let avg: PriceAverage = std::iter::repeat(price("0.10")).take(1000).collect();
        assert_eq!(avg.mean(), Some(dec!(0.10)));
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_to_price_scale(dec!(2.125)), dec!(2.13));
        assert_eq!(round_to_price_scale(dec!(3)).to_string(), "3.00");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: the mean lies between the smallest and largest price.
            #[test]
            fn mean_is_bounded(cents in prop::collection::vec(0u32..10_000_000, 1..50)) {
                let prices: Vec<Price> = cents
                    .iter()
                    .map(|c| Price::new(Decimal::new(i64::from(*c), 2)).unwrap())
                    .collect();
                let avg: PriceAverage = prices.iter().copied().collect();
                let mean = avg.mean().unwrap();
                let min = prices.iter().min().unwrap().amount();
                let max = prices.iter().max().unwrap().amount();
                prop_assert!(mean >= min && mean <= max);
            }
        }
    }
}
