//! Time-cost formatting
//!
//! Converts a price and an hourly wage into the human-readable duration that
//! gets rendered next to the price, e.g. `2.0 hrs`, `15 mins`, `40 secs`.

use std::fmt;

/// Unit a time cost is rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Hours,
    Minutes,
    Seconds,
}

/// A computed time cost, ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct TimeCost {
    /// Rendered numeric value (`"1.5"`, `"12"`)
    pub value: String,
    pub unit: TimeUnit,
}

impl TimeCost {
    /// Compute the time cost of `price` at `wage` per hour.
    ///
    /// Returns `None` when no annotation should be produced: non-positive or
    /// non-finite inputs, or a cost that rounds to zero seconds.
    pub fn compute(price: f64, wage: f64) -> Option<Self> {
        if !(price > 0.0 && wage > 0.0) {
            return None;
        }
        let ratio = price / wage;
        if !ratio.is_finite() {
            return None;
        }

        if ratio >= 1.0 {
            return Some(Self {
                value: format!("{:.1}", ratio),
                unit: TimeUnit::Hours,
            });
        }

        if ratio >= 1.0 / 60.0 {
            let minutes = (ratio * 60.0).round() as u64;
            return Some(Self {
                value: minutes.to_string(),
                unit: TimeUnit::Minutes,
            });
        }

        let seconds = (ratio * 3600.0).round() as u64;
        if seconds == 0 {
            return None;
        }
        Some(Self {
            value: seconds.to_string(),
            unit: TimeUnit::Seconds,
        })
    }

    /// Singular or plural label for the rendered value
    pub fn label(&self) -> &'static str {
        let singular = match self.unit {
            TimeUnit::Hours => self.value == "1.0",
            TimeUnit::Minutes | TimeUnit::Seconds => self.value == "1",
        };
        match (self.unit, singular) {
            (TimeUnit::Hours, true) => "hr",
            (TimeUnit::Hours, false) => "hrs",
            (TimeUnit::Minutes, true) => "min",
            (TimeUnit::Minutes, false) => "mins",
            (TimeUnit::Seconds, true) => "sec",
            (TimeUnit::Seconds, false) => "secs",
        }
    }
}

impl fmt::Display for TimeCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.label())
    }
}

/// Format the time cost of `price` at `wage` per hour.
///
/// An empty string means "no annotation": it is returned for non-positive
/// inputs and for costs that round down to zero seconds.
pub fn format_time_cost(price: f64, wage: f64) -> String {
    TimeCost::compute(price, wage)
        .map(|cost| cost.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exactly_one_hour() {
        assert_eq!(format_time_cost(20.0, 20.0), "1.0 hr");
    }

    #[test]
    fn test_hours_plural() {
        assert_eq!(format_time_cost(20.0, 10.0), "2.0 hrs");
        assert_eq!(format_time_cost(15.0, 10.0), "1.5 hrs");
        assert_eq!(format_time_cost(1999.0, 50.0), "40.0 hrs");
    }

    #[test]
    fn test_hours_rounding_to_one() {
        // 1.04 renders as "1.0" and takes the singular label
        assert_eq!(format_time_cost(10.4, 10.0), "1.0 hr");
    }

    #[test]
    fn test_minutes() {
        assert_eq!(format_time_cost(5.0, 20.0), "15 mins");
        assert_eq!(format_time_cost(1.0, 60.0), "1 min");
    }

    #[test]
    fn test_seconds() {
        assert_eq!(format_time_cost(0.01, 36.0), "1 sec");
        assert_eq!(format_time_cost(0.1, 36.0), "10 secs");
    }

    #[test]
    fn test_zero_seconds_is_empty() {
        assert_eq!(format_time_cost(0.0001, 1000.0), "");
    }

    #[test]
    fn test_invalid_inputs_are_empty() {
        assert_eq!(format_time_cost(10.0, 0.0), "");
        assert_eq!(format_time_cost(10.0, -5.0), "");
        assert_eq!(format_time_cost(0.0, 10.0), "");
        assert_eq!(format_time_cost(-3.0, 10.0), "");
        assert_eq!(format_time_cost(f64::NAN, 10.0), "");
        assert_eq!(format_time_cost(10.0, f64::NAN), "");
        assert_eq!(format_time_cost(f64::INFINITY, 10.0), "");
    }

    #[test]
    fn test_time_cost_units() {
        let cost = TimeCost::compute(30.0, 60.0).unwrap();
        assert_eq!(cost.unit, TimeUnit::Minutes);
        assert_eq!(cost.value, "30");
    }

    proptest! {
        #[test]
        fn test_scaling_invariance(
            price_cents in 1u32..10_000_000,
            wage_cents in 1u32..1_000_000,
            exponent in -8i32..8,
        ) {
            let price = f64::from(price_cents) / 100.0;
            let wage = f64::from(wage_cents) / 100.0;
            // Power-of-two factors keep both products exact
            let factor = 2f64.powi(exponent);
            prop_assert_eq!(
                format_time_cost(price, wage),
                format_time_cost(price * factor, wage * factor)
            );
        }

        #[test]
        fn test_non_positive_wage_is_empty(price in 0.01f64..1e7, wage in -1e6f64..=0.0) {
            prop_assert_eq!(format_time_cost(price, wage), "");
        }
    }
}
