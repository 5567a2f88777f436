use crate::error::{OTelSdkError, OTelSdkResult};
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

type Callback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Pending,
    Succeeded,
    Failed(Option<OTelSdkError>),
}

impl Outcome {
    fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }

    fn as_result(&self) -> Option<OTelSdkResult> {
        match self {
            Outcome::Pending => None,
            Outcome::Succeeded => Some(Ok(())),
            Outcome::Failed(Some(err)) => Some(Err(err.clone())),
            Outcome::Failed(None) => Some(Err(OTelSdkError::InternalFailure(
                "operation failed".into(),
            ))),
        }
    }
}

struct State {
    outcome: Outcome,
    callbacks: Vec<Callback>,
}

struct Inner {
    state: Mutex<State>,
    completed: Condvar,
}

/// A one-shot, thread-safe completion token for an asynchronous operation.
///
/// A `ResultCode` starts out pending and transitions exactly once to either
/// succeeded or failed. Completing it again is a no-op. Clones share the
/// same underlying state, so the producer of an operation keeps one clone to
/// complete and hands the others out to observers.
///
/// Observers can
/// - poll it with [`is_done`](ResultCode::is_done) / [`result`](ResultCode::result),
/// - block with a bound using [`join`](ResultCode::join),
/// - register a callback with [`when_complete`](ResultCode::when_complete),
/// - or `.await` it.
///
/// # Examples
///
/// ```
/// use opentelemetry_metrics_core::ResultCode;
/// use std::time::Duration;
///
/// let first = ResultCode::new();
/// let second = ResultCode::new();
/// let all = ResultCode::of_all([first.clone(), second.clone()]);
///
/// let worker = std::thread::spawn(move || {
///     first.succeed();
///     second.succeed();
/// });
///
/// assert!(all.join(Duration::from_secs(5)).is_success());
/// worker.join().unwrap();
/// ```
#[derive(Clone)]
pub struct ResultCode {
    inner: Arc<Inner>,
}

impl Default for ResultCode {
    fn default() -> Self {
        ResultCode::new()
    }
}

impl ResultCode {
    /// Creates a pending result code.
    pub fn new() -> Self {
        ResultCode::with_outcome(Outcome::Pending)
    }

    fn with_outcome(outcome: Outcome) -> Self {
        ResultCode {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    outcome,
                    callbacks: Vec::new(),
                }),
                completed: Condvar::new(),
            }),
        }
    }

    /// Returns a result code that has already succeeded.
    pub fn of_success() -> Self {
        ResultCode::with_outcome(Outcome::Succeeded)
    }

    /// Returns a result code that has already failed without a reason.
    pub fn of_failure() -> Self {
        ResultCode::with_outcome(Outcome::Failed(None))
    }

    /// Returns a result code that has already failed with `err`.
    pub fn of_exceptional_failure(err: OTelSdkError) -> Self {
        ResultCode::with_outcome(Outcome::Failed(Some(err)))
    }

    /// Returns a result code that completes once all of `codes` complete.
    ///
    /// The aggregate succeeds only once every code has succeeded, and fails
    /// as soon as any code fails, carrying that code's failure reason. Codes
    /// still pending at that point keep running and complete on their own;
    /// they no longer influence the aggregate. An empty set has already
    /// succeeded.
    pub fn of_all<I>(codes: I) -> Self
    where
        I: IntoIterator<Item = ResultCode>,
    {
        let codes: Vec<ResultCode> = codes.into_iter().collect();
        if codes.is_empty() {
            return ResultCode::of_success();
        }

        let aggregate = ResultCode::new();
        let pending = Arc::new(AtomicUsize::new(codes.len()));
        for code in codes {
            let aggregate = aggregate.clone();
            let pending = Arc::clone(&pending);
            // A strong handle here would make the code own itself until it completes.
            let child = Arc::downgrade(&code.inner);
            code.when_complete(move || {
                if let Some(Outcome::Failed(reason)) = outcome_of(&child) {
                    aggregate.complete(Outcome::Failed(reason));
                }
                if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                    aggregate.succeed();
                }
            });
        }
        aggregate
    }

    /// Marks this code as succeeded, if it is still pending.
    pub fn succeed(&self) -> &Self {
        self.complete(Outcome::Succeeded)
    }

    /// Marks this code as failed without a reason, if it is still pending.
    pub fn fail(&self) -> &Self {
        self.complete(Outcome::Failed(None))
    }

    /// Marks this code as failed with `err`, if it is still pending.
    pub fn fail_with(&self, err: OTelSdkError) -> &Self {
        self.complete(Outcome::Failed(Some(err)))
    }

    /// Completes this code with the outcome of `result`, if it is still pending.
    pub fn complete_with(&self, result: OTelSdkResult) -> &Self {
        match result {
            Ok(()) => self.succeed(),
            Err(err) => self.fail_with(err),
        }
    }

    /// Completes `target` with this code's outcome once this code completes.
    pub fn forward_to(&self, target: &ResultCode) -> &Self {
        let target = target.clone();
        let source = Arc::downgrade(&self.inner);
        self.when_complete(move || {
            if let Some(outcome) = outcome_of(&source) {
                target.complete(outcome);
            }
        })
    }

    /// Returns `true` once this code has completed, successfully or not.
    pub fn is_done(&self) -> bool {
        !self.lock().outcome.is_pending()
    }

    /// Returns `true` if this code completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self.lock().outcome, Outcome::Succeeded)
    }

    /// Returns the failure reason, if this code failed with one.
    pub fn failure(&self) -> Option<OTelSdkError> {
        match &self.lock().outcome {
            Outcome::Failed(reason) => reason.clone(),
            _ => None,
        }
    }

    /// Returns the outcome, or `None` while still pending.
    pub fn result(&self) -> Option<OTelSdkResult> {
        self.lock().outcome.as_result()
    }

    /// Blocks the calling thread until this code completes or `timeout`
    /// elapses, whichever comes first.
    ///
    /// Timing out does not fail the code; it stays pending and still
    /// reflects the eventual outcome of the operation.
    pub fn join(&self, timeout: Duration) -> &Self {
        let state = self.lock();
        let _guard = self
            .inner
            .completed
            .wait_timeout_while(state, timeout, |state| state.outcome.is_pending())
            .unwrap_or_else(PoisonError::into_inner);
        self
    }

    /// Registers `action` to run exactly once when this code completes.
    ///
    /// If the code has already completed, `action` runs immediately on the
    /// calling thread. Otherwise it runs on the thread that completes the
    /// code. Ordering between several registered actions is unspecified.
    pub fn when_complete<F>(&self, action: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.lock();
            if state.outcome.is_pending() {
                state.callbacks.push(Box::new(action));
                return self;
            }
        }
        action();
        self
    }

    fn complete(&self, outcome: Outcome) -> &Self {
        let callbacks = {
            let mut state = self.lock();
            if !state.outcome.is_pending() {
                return self;
            }
            state.outcome = outcome;
            std::mem::take(&mut state.callbacks)
        };
        self.inner.completed.notify_all();
        for callback in callbacks {
            callback();
        }
        self
    }

    // Callbacks run outside the lock, so a poisoned state is still consistent.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn outcome_of(inner: &Weak<Inner>) -> Option<Outcome> {
    inner.upgrade().map(|inner| {
        inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outcome
            .clone()
    })
}

impl From<OTelSdkResult> for ResultCode {
    fn from(result: OTelSdkResult) -> Self {
        match result {
            Ok(()) => ResultCode::of_success(),
            Err(err) => ResultCode::of_exceptional_failure(err),
        }
    }
}

impl fmt::Debug for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCode")
            .field("outcome", &self.lock().outcome)
            .finish()
    }
}

impl IntoFuture for ResultCode {
    type Output = OTelSdkResult;
    type IntoFuture = ResultCodeFuture;

    fn into_future(self) -> Self::IntoFuture {
        ResultCodeFuture {
            code: self,
            waker: None,
        }
    }
}

/// Future resolving to the outcome of a [ResultCode].
#[derive(Debug)]
pub struct ResultCodeFuture {
    code: ResultCode,
    // Registered with the code once, then updated on every poll.
    waker: Option<Arc<Mutex<Option<Waker>>>>,
}

impl Future for ResultCodeFuture {
    type Output = OTelSdkResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this
            .code
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(result) = state.outcome.as_result() {
            return Poll::Ready(result);
        }
        match &this.waker {
            Some(slot) => {
                let mut waker = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if !waker
                    .as_ref()
                    .is_some_and(|waker| waker.will_wake(cx.waker()))
                {
                    *waker = Some(cx.waker().clone());
                }
            }
            None => {
                let slot = Arc::new(Mutex::new(Some(cx.waker().clone())));
                this.waker = Some(Arc::clone(&slot));
                state.callbacks.push(Box::new(move || {
                    let waker = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                    if let Some(waker) = waker {
                        waker.wake();
                    }
                }));
            }
        }
        Poll::Pending
    }
}

impl ResultCode {
    #[cfg(test)]
    fn pending_callbacks(&self) -> usize {
        self.lock().callbacks.len()
    }
}
