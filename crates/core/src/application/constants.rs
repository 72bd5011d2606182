// Engine timing constants (no magic values in the code paths)

use std::time::Duration;

/// Lease on the per-job advisory lock.
pub const LOCK_LEASE: Duration = Duration::from_secs(5);

/// Poll interval while blocking on a contended lock.
pub const LOCK_ACQUIRE_RETRY: Duration = Duration::from_millis(100);

/// TTL refreshed on every write of a job hash; terminal jobs are
/// garbage-collected by this expiry (6 hours).
pub const RECORD_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Wall-clock budget for one processing pass.
pub const PROCESS_BUDGET: Duration = Duration::from_secs(3);

/// A job sitting in RUNNING longer than this since its last dispatch is
/// considered lost.
pub const RUNNING_TIMEOUT_SECS: i64 = 30;

/// Executor reply timeout on the synchronous compute path.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// The sweeper sleeps one tick at a time so shutdown stays prompt.
pub const SWEEP_TICK: Duration = Duration::from_secs(1);
pub const SWEEP_TICKS_PER_PASS: u32 = 5;

/// Jobs sampled per state per sweep pass.
pub const SWEEP_SAMPLE_SIZE: usize = 15;
