use std::collections::VecDeque;

/// Outcome of one permitted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CallOutcome {
    pub failed: bool,
    pub slow: bool,
}

/// Count-based sliding window over the most recent call outcomes.
#[derive(Debug)]
pub(crate) struct SlidingWindow {
    capacity: usize,
    outcomes: VecDeque<CallOutcome>,
    failed: usize,
    slow: usize,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            outcomes: VecDeque::with_capacity(capacity),
            failed: 0,
            slow: 0,
        }
    }

    pub fn record(&mut self, outcome: CallOutcome) {
        if self.outcomes.len() == self.capacity
            && let Some(evicted) = self.outcomes.pop_front()
        {
            self.failed -= usize::from(evicted.failed);
            self.slow -= usize::from(evicted.slow);
        }
        self.failed += usize::from(outcome.failed);
        self.slow += usize::from(outcome.slow);
        self.outcomes.push_back(outcome);
    }

    pub fn clear(&mut self) {
        self.outcomes.clear();
        self.failed = 0;
        self.slow = 0;
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn slow(&self) -> usize {
        self.slow
    }

    pub fn successful(&self) -> usize {
        self.outcomes.len() - self.failed
    }

    /// Percentage of failed calls, `None` while the window is empty.
    pub fn failure_rate(&self) -> Option<f64> {
        self.rate(self.failed)
    }

    /// Percentage of slow calls, `None` while the window is empty.
    pub fn slow_call_rate(&self) -> Option<f64> {
        self.rate(self.slow)
    }

    fn rate(&self, count: usize) -> Option<f64> {
        if self.outcomes.is_empty() {
            None
        } else {
            Some(count as f64 * 100.0 / self.outcomes.len() as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OK: CallOutcome = CallOutcome {
        failed: false,
        slow: false,
    };
    const FAIL: CallOutcome = CallOutcome {
        failed: true,
        slow: false,
    };
    const SLOW: CallOutcome = CallOutcome {
        failed: false,
        slow: true,
    };

    #[test]
    fn empty_window_has_no_rates() {
        let window = SlidingWindow::new(5);
        assert_eq!(window.failure_rate(), None);
        assert_eq!(window.slow_call_rate(), None);
    }

    #[test]
    fn rates_are_percentages_of_buffered_calls() {
        let mut window = SlidingWindow::new(4);
        window.record(OK);
        window.record(FAIL);
        window.record(SLOW);
        window.record(FAIL);

        assert_eq!(window.len(), 4);
        assert_eq!(window.failure_rate(), Some(50.0));
        assert_eq!(window.slow_call_rate(), Some(25.0));
        assert_eq!(window.successful(), 2);
    }

    #[test]
    fn oldest_outcome_is_evicted_when_full() {
        let mut window = SlidingWindow::new(3);
        window.record(FAIL);
        window.record(FAIL);
        window.record(OK);
        assert_eq!(window.failed(), 2);

        window.record(OK);
        window.record(OK);
        assert_eq!(window.len(), 3);
        assert_eq!(window.failed(), 0);
        assert_eq!(window.failure_rate(), Some(0.0));
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut window = SlidingWindow::new(0);
        window.record(FAIL);
        window.record(OK);
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.failed(), 0);
    }
}
