//! Tunable knobs for the lock-free components and the scheduler.
//!
//! The source hard-codes these as literals (a retry count of 10, a bucket
//! count of `1 + N/100`, a default successor-list capacity of 4). Collecting
//! them here keeps the algorithms parameterized without touching their call
//! sites when a tunable needs to change.

/// Scheduler- and component-wide tunables.
#[derive(Debug, Clone)]
pub struct Config {
    retry_budget: usize,
    successor_list_initial_capacity: usize,
    array_initial_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            retry_budget: 10,
            successor_list_initial_capacity: 4,
            array_initial_capacity: 4,
        }
    }
}

impl Config {
    /// Starts from [`Config::default`]; use the `with_*` setters to override
    /// individual tunables.
    pub fn new() -> Self {
        Config::default()
    }

    /// Number of contended-CAS retries `list`/`table`/`array` operations
    /// attempt before reporting `Failed`/exhaustion. Default: 10.
    pub fn with_retry_budget(mut self, retry_budget: usize) -> Self {
        assert!(retry_budget > 0, "retry_budget must be positive");
        self.retry_budget = retry_budget;
        self
    }

    /// Current retry budget.
    pub fn retry_budget(&self) -> usize {
        self.retry_budget
    }

    /// Initial capacity reserved for a freshly created node's
    /// `successors_to_notify` array. Default: 4.
    pub fn with_successor_list_initial_capacity(mut self, cap: usize) -> Self {
        assert!(cap > 0, "successor_list_initial_capacity must be positive");
        self.successor_list_initial_capacity = cap;
        self
    }

    /// Current successor-list initial capacity.
    pub fn successor_list_initial_capacity(&self) -> usize {
        self.successor_list_initial_capacity
    }

    /// Initial backing capacity for a bare `ConcurrentAppendOnlyArray` built
    /// without an explicit size hint. Default: 4.
    pub fn with_array_initial_capacity(mut self, cap: usize) -> Self {
        assert!(cap > 0, "array_initial_capacity must be positive");
        self.array_initial_capacity = cap;
        self
    }

    /// Current bare-array initial capacity.
    pub fn array_initial_capacity(&self) -> usize {
        self.array_initial_capacity
    }

    /// Default bucket-count formula for a `ConcurrentHashTable` sized for
    /// `expected_size` entries: `1 + expected_size / 100`.
    pub fn bucket_count_for(expected_size: u64) -> usize {
        (1 + expected_size / 100) as usize
    }
}
