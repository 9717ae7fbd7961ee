//! Cooperative cancellation for long-running fits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Checked by optimizers once per iteration.
///
/// Trips when the shared flag is raised or the deadline passes. The default
/// token never trips.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn with_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.flag = Some(flag);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        if let Some(flag) = &self.flag {
            if flag.load(Ordering::Relaxed) {
                return true;
            }
        }
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_token_never_trips() {
        assert!(!CancelToken::never().is_cancelled());
    }

    #[test]
    fn flag_trips_token() {
        let flag = Arc::new(AtomicBool::new(false));
        let token = CancelToken::never().with_flag(flag.clone());
        assert!(!token.is_cancelled());
        flag.store(true, Ordering::Relaxed);
        assert!(token.is_cancelled());
    }

    #[test]
    fn elapsed_deadline_trips_token() {
        let token = CancelToken::never().with_timeout(Duration::ZERO);
        assert!(token.is_cancelled());
    }
}
