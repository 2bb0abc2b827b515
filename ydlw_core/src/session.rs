use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::CallbackError;
use crate::message::Message;

/// Receives every message the wrapper emits. Returning `Ok(false)` asks the
/// engine to stop; returning `Err` removes the callback from the session.
pub type Callback = Box<dyn FnMut(&Message) -> Result<bool, CallbackError> + Send>;

/// Monotonic time source, injectable so duration limits can be tested.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.now) += by;
    }

    pub fn set(&self, to: Duration) {
        *lock(&self.now) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *lock(&self.now)
    }
}

#[derive(Debug, Clone, Copy)]
struct DurationLimit {
    start: Duration,
    max: Option<Duration>,
}

/// Coordinates one in-flight download: callback routing, user cancellation,
/// the optional wall-clock budget and the host abort signal.
///
/// Each concurrent download gets its own session. Every setter takes `&self`
/// so a session can be shared through an `Arc` with a UI thread.
pub struct DownloadSession {
    callback: Mutex<Option<Callback>>,
    /// Bumped on every `set_callback` so a dispatch in flight can tell whether
    /// its callback was replaced while it ran.
    callback_generation: AtomicU64,
    cancel_requested: AtomicBool,
    limit: Mutex<Option<DurationLimit>>,
    abort: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl DownloadSession {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            callback: Mutex::new(None),
            callback_generation: AtomicU64::new(0),
            cancel_requested: AtomicBool::new(false),
            limit: Mutex::new(None),
            abort: CancellationToken::new(),
            clock,
        }
    }

    /// Replaces the active callback. `None` silences the session.
    pub fn set_callback(&self, callback: Option<Callback>) {
        let mut slot = lock(&self.callback);
        *slot = callback;
        self.callback_generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn has_callback(&self) -> bool {
        lock(&self.callback).is_some()
    }

    /// Hands `msg` to the callback, if one is registered.
    ///
    /// The callback runs without the slot lock held, so it may itself call
    /// `set_callback`. On `Err` the callback is dropped.
    pub(crate) fn dispatch(&self, msg: &Message) -> Option<Result<bool, CallbackError>> {
        let (mut callback, generation) = {
            let mut slot = lock(&self.callback);
            let callback = slot.take()?;
            (callback, self.callback_generation.load(Ordering::SeqCst))
        };

        let result = callback(msg);

        if result.is_ok() {
            let mut slot = lock(&self.callback);
            if self.callback_generation.load(Ordering::SeqCst) == generation && slot.is_none() {
                *slot = Some(callback);
            }
        }
        Some(result)
    }

    /// Asks the running download to stop at its next progress event.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Reads and clears the cancellation flag.
    pub(crate) fn take_cancel_request(&self) -> bool {
        self.cancel_requested.swap(false, Ordering::SeqCst)
    }

    /// Sets (or clears) the time budget and restarts the session clock.
    pub fn set_duration_limit(&self, max: Option<Duration>) {
        *lock(&self.limit) = Some(DurationLimit {
            start: self.clock.now(),
            max,
        });
    }

    pub fn duration_limit(&self) -> Option<Duration> {
        lock(&self.limit).and_then(|l| l.max)
    }

    /// Time since the last `set_duration_limit`, or `None` if it was never called.
    pub fn elapsed(&self) -> Option<Duration> {
        let start = lock(&self.limit).map(|l| l.start)?;
        Some(self.clock.now().saturating_sub(start))
    }

    /// The host environment's abort signal. Distinct from `request_cancel`:
    /// once fired it stays fired.
    pub fn abort_signal(&self) -> CancellationToken {
        self.abort.clone()
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.is_cancelled()
    }
}

impl Default for DownloadSession {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
