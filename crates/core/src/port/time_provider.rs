// Time Provider Port (for testability)

/// Time provider interface (allows mocking in tests)
pub trait TimeProvider: Send + Sync {
    /// Current unix time in whole seconds
    fn now_secs(&self) -> i64;
}

/// System time provider (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

pub mod mocks {
    use super::TimeProvider;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Manually advanced clock for deterministic timeout tests.
    pub struct MockTimeProvider {
        now: AtomicI64,
    }

    impl MockTimeProvider {
        pub fn new(start_secs: i64) -> Self {
            Self {
                now: AtomicI64::new(start_secs),
            }
        }

        pub fn advance(&self, secs: i64) {
            self.now.fetch_add(secs, Ordering::SeqCst);
        }

        pub fn set(&self, secs: i64) {
            self.now.store(secs, Ordering::SeqCst);
        }
    }

    impl TimeProvider for MockTimeProvider {
        fn now_secs(&self) -> i64 {
            self.now.load(Ordering::SeqCst)
        }
    }
}
