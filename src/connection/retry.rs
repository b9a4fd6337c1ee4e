/// Transport-failure bookkeeping for one connection
#[derive(Debug, Clone)]
pub struct RetryState {
    attempts: u32,
    max_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep the session; this was failure number `attempt`
    Retry { attempt: u32 },
    /// Budget exhausted, the connection must be closed
    GiveUp { attempts: u32 },
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
        }
    }

    pub fn record_failure(&mut self) -> RetryDecision {
        if self.attempts >= self.max_attempts {
            RetryDecision::GiveUp {
                attempts: self.attempts,
            }
        } else {
            self.attempts += 1;
            RetryDecision::Retry {
                attempt: self.attempts,
            }
        }
    }

    /// Successful frame exchange
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut retry = RetryState::new(3);

        assert_eq!(retry.record_failure(), RetryDecision::Retry { attempt: 1 });
        assert_eq!(retry.record_failure(), RetryDecision::Retry { attempt: 2 });
        assert_eq!(retry.record_failure(), RetryDecision::Retry { attempt: 3 });
        assert_eq!(retry.record_failure(), RetryDecision::GiveUp { attempts: 3 });
    }

    #[test]
    fn test_reset_restores_budget() {
        let mut retry = RetryState::new(2);
        retry.record_failure();
        retry.record_failure();
        retry.reset();

        assert_eq!(retry.attempts(), 0);
        assert_eq!(retry.record_failure(), RetryDecision::Retry { attempt: 1 });
    }

    #[test]
    fn test_zero_budget_closes_on_first_failure() {
        let mut retry = RetryState::new(0);
        assert_eq!(retry.record_failure(), RetryDecision::GiveUp { attempts: 0 });
    }
}
