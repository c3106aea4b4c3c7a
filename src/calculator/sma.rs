// =============================================================================
// SMA — fixed-window rolling simple moving average, sum-tracked
// =============================================================================
//
// Ported from indicators/sma.py's deque+running-sum approach: eviction happens
// before insertion so the buffer never exceeds `window`, and the running sum
// is adjusted incrementally rather than re-summed every bar.
// =============================================================================

use std::collections::VecDeque;

use rust_decimal::Decimal;

pub struct Sma {
    window: usize,
    buffer: VecDeque<Decimal>,
    sum: Decimal,
}

impl Sma {
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "SMA window must be positive");
        Self {
            window,
            buffer: VecDeque::with_capacity(window),
            sum: Decimal::ZERO,
        }
    }

    /// Feeds one value. Returns `None` until the window has filled.
    pub fn update(&mut self, value: Decimal) -> Option<Decimal> {
        if self.buffer.len() == self.window {
            if let Some(evicted) = self.buffer.pop_front() {
                self.sum -= evicted;
            }
        }
        self.buffer.push_back(value);
        self.sum += value;

        if self.buffer.len() < self.window {
            None
        } else {
            Some(self.sum / Decimal::from(self.window as u64))
        }
    }

    pub fn is_ready(&self) -> bool {
        self.buffer.len() == self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn returns_none_until_window_fills() {
        let mut sma = Sma::new(3);
        assert_eq!(sma.update(dec!(1)), None);
        assert_eq!(sma.update(dec!(2)), None);
        assert_eq!(sma.update(dec!(3)), Some(dec!(2)));
    }

    #[test]
    fn evicts_oldest_on_overflow() {
        let mut sma = Sma::new(2);
        sma.update(dec!(10));
        assert_eq!(sma.update(dec!(20)), Some(dec!(15)));
        // 10 evicted, 20 and 30 remain -> average 25
        assert_eq!(sma.update(dec!(30)), Some(dec!(25)));
    }

    #[test]
    fn single_element_window_tracks_last_value() {
        let mut sma = Sma::new(1);
        assert_eq!(sma.update(dec!(5)), Some(dec!(5)));
        assert_eq!(sma.update(dec!(9)), Some(dec!(9)));
    }
}
