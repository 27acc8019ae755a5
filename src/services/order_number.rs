//! Human-readable order numbers: `ORD-YYMMDD-HHMMSS-NNNN` in UTC.
//!
//! Each second offers the 9000 suffixes `1000..=9999` in a shuffled order.
//! Once a second's suffixes are used up the generator moves on to the next
//! second, so a single generator never hands out the same number twice.
//! Numbers from different processes may still collide; the unique index on
//! `orders.order_number` rejects those.

use std::sync::{Mutex, PoisonError};

use jiff::Timestamp;
use rand::seq::SliceRandom;

const SUFFIX_MIN: u16 = 1000;
const SUFFIX_MAX: u16 = 9999;

#[derive(Debug)]
struct GeneratorState {
    second: i64,
    suffixes: Vec<u16>,
}

#[derive(Debug)]
pub struct OrderNumberGenerator {
    state: Mutex<GeneratorState>,
}

impl Default for OrderNumberGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderNumberGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GeneratorState {
                second: i64::MIN,
                suffixes: Vec::new(),
            }),
        }
    }

    /// Returns the next order number for the current time.
    pub fn next(&self) -> String {
        self.next_at(Timestamp::now())
    }

    /// Returns the next order number for `now`.
    ///
    /// A clock that moves backwards keeps the generator on the latest second
    /// it has issued numbers for.
    pub fn next_at(&self, now: Timestamp) -> String {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if now.as_second() > state.second {
            state.second = now.as_second();
            state.suffixes = shuffled_suffixes();
        }
        let suffix = match state.suffixes.pop() {
            Some(suffix) => suffix,
            None => {
                state.second += 1;
                tracing::debug!(second = state.second, "Order number suffixes exhausted, advancing");
                state.suffixes = shuffled_suffixes();
                state.suffixes.pop().unwrap_or(SUFFIX_MIN)
            }
        };

        let stamp = Timestamp::from_second(state.second).unwrap_or(now);
        format!("ORD-{}-{suffix}", stamp.strftime("%y%m%d-%H%M%S"))
    }
}

fn shuffled_suffixes() -> Vec<u16> {
    let mut suffixes: Vec<u16> = (SUFFIX_MIN..=SUFFIX_MAX).collect();
    suffixes.shuffle(&mut rand::rng());
    suffixes
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;
    use regex::Regex;

    use super::*;

    fn pattern() -> Regex {
        Regex::new(r"^ORD-\d{6}-\d{6}-\d{4}$").unwrap()
    }

    #[test]
    fn test_format_is_utc() {
        let generator = OrderNumberGenerator::new();
        let now: Timestamp = "2026-03-04T05:06:07Z".parse().unwrap();

        let number = generator.next_at(now);

        assert!(number.starts_with("ORD-260304-050607-"), "{number}");
        let suffix: u16 = number[18..].parse().unwrap();
        assert!((SUFFIX_MIN..=SUFFIX_MAX).contains(&suffix));
    }

    #[test]
    fn test_ten_thousand_rapid_numbers_are_unique() {
        let generator = OrderNumberGenerator::new();
        let numbers: HashSet<String> = (0..10_000).map(|_| generator.next()).collect();
        assert_eq!(numbers.len(), 10_000);
    }

    #[test]
    fn test_exhausted_second_advances() {
        let generator = OrderNumberGenerator::new();
        let now: Timestamp = "2026-03-04T05:06:07Z".parse().unwrap();

        let numbers: Vec<String> = (0..9001).map(|_| generator.next_at(now)).collect();

        assert!(numbers[..9000].iter().all(|n| n.starts_with("ORD-260304-050607-")));
        assert!(numbers[9000].starts_with("ORD-260304-050608-"));
        let unique: HashSet<&String> = numbers.iter().collect();
        assert_eq!(unique.len(), 9001);
    }

    #[test]
    fn test_clock_moving_backwards_never_repeats() {
        let generator = OrderNumberGenerator::new();
        let later: Timestamp = "2026-03-04T05:06:08Z".parse().unwrap();
        let earlier: Timestamp = "2026-03-04T05:06:07Z".parse().unwrap();

        let first = generator.next_at(later);
        let second = generator.next_at(earlier);

        assert_ne!(first, second);
        assert!(second.starts_with("ORD-260304-050608-"));
    }

    proptest! {
        #[test]
        fn prop_format_holds_for_any_time(secs in 946_684_800i64..4_102_444_800i64) {
            let generator = OrderNumberGenerator::new();
            let now = Timestamp::from_second(secs).unwrap();
            let number = generator.next_at(now);
            prop_assert!(pattern().is_match(&number), "{}", number);
        }
    }
}
