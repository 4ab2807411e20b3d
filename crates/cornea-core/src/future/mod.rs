// ── Client futures ──
//
// Single-threaded completion handles. A `ClientFuture` completes exactly
// once; callbacks registered after completion run immediately. The same
// handle also implements `std::future::Future` so async code on the UI
// thread can `.await` it.

mod marshal;
mod settable;

use std::cell::RefCell;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::CoreError;

pub use marshal::Listeners;
pub use settable::SettableClientFuture;

/// Outcome delivered by a [`ClientFuture`].
pub type ClientResult<T> = Result<T, CoreError>;

type Callback<T> = Box<dyn FnOnce(ClientResult<T>)>;

enum State<T> {
    Pending {
        callbacks: Vec<Callback<T>>,
        wakers: Vec<Waker>,
    },
    Done(ClientResult<T>),
}

/// Read side of an asynchronous result. Cheap to clone; clones observe
/// the same completion.
pub struct ClientFuture<T> {
    state: Rc<RefCell<State<T>>>,
}

impl<T> Clone for ClientFuture<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: Clone + 'static> ClientFuture<T> {
    fn pending() -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Pending {
                callbacks: Vec::new(),
                wakers: Vec::new(),
            })),
        }
    }

    /// An already-completed future.
    pub fn ready(result: ClientResult<T>) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Done(result))),
        }
    }

    pub fn succeeded(value: T) -> Self {
        Self::ready(Ok(value))
    }

    pub fn failed(error: CoreError) -> Self {
        Self::ready(Err(error))
    }

    pub fn is_done(&self) -> bool {
        matches!(*self.state.borrow(), State::Done(_))
    }

    /// The result, if completed.
    pub fn result(&self) -> Option<ClientResult<T>> {
        match &*self.state.borrow() {
            State::Done(result) => Some(result.clone()),
            State::Pending { .. } => None,
        }
    }

    /// Run `f` with the result once complete (immediately if already done).
    pub fn on_completion(&self, f: impl FnOnce(ClientResult<T>) + 'static) -> &Self {
        let done = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Pending { callbacks, .. } => {
                    callbacks.push(Box::new(f));
                    return self;
                }
                State::Done(result) => result.clone(),
            }
        };
        f(done);
        self
    }

    pub fn on_success(&self, f: impl FnOnce(T) + 'static) -> &Self {
        self.on_completion(move |result| {
            if let Ok(value) = result {
                f(value);
            }
        })
    }

    pub fn on_failure(&self, f: impl FnOnce(CoreError) + 'static) -> &Self {
        self.on_completion(move |result| {
            if let Err(error) = result {
                f(error);
            }
        })
    }

    /// Map the success value. Errors pass through untouched.
    pub fn transform<U: Clone + 'static>(
        &self,
        f: impl FnOnce(T) -> ClientResult<U> + 'static,
    ) -> ClientFuture<U> {
        let out = ClientFuture::pending();
        let target = out.clone();
        self.on_completion(move |result| {
            target.complete(result.and_then(f));
        });
        out
    }

    /// Start another asynchronous step with the success value.
    pub fn chain<U: Clone + 'static>(
        &self,
        f: impl FnOnce(T) -> ClientFuture<U> + 'static,
    ) -> ClientFuture<U> {
        let out = ClientFuture::pending();
        let target = out.clone();
        self.on_completion(move |result| match result {
            Ok(value) => {
                f(value).on_completion(move |next| {
                    target.complete(next);
                });
            }
            Err(error) => {
                target.complete(Err(error));
            }
        });
        out
    }

    /// Complete with every value in order, or with the first failure.
    pub fn all(futures: Vec<ClientFuture<T>>) -> ClientFuture<Vec<T>> {
        if futures.is_empty() {
            return ClientFuture::succeeded(Vec::new());
        }

        let out = ClientFuture::pending();
        let slots: Rc<RefCell<Vec<Option<T>>>> = Rc::new(RefCell::new(vec![None; futures.len()]));
        for (index, future) in futures.into_iter().enumerate() {
            let target = out.clone();
            let slots = Rc::clone(&slots);
            future.on_completion(move |result| match result {
                Ok(value) => {
                    let collected = {
                        let mut slots = slots.borrow_mut();
                        if let Some(slot) = slots.get_mut(index) {
                            *slot = Some(value);
                        }
                        if slots.iter().all(Option::is_some) {
                            Some(slots.iter_mut().filter_map(Option::take).collect::<Vec<_>>())
                        } else {
                            None
                        }
                    };
                    if let Some(values) = collected {
                        target.complete(Ok(values));
                    }
                }
                Err(error) => {
                    target.complete(Err(error));
                }
            });
        }
        out
    }

    /// Complete the future. Returns `false` if it was already complete.
    fn complete(&self, result: ClientResult<T>) -> bool {
        let (callbacks, wakers) = {
            let mut state = self.state.borrow_mut();
            if matches!(*state, State::Done(_)) {
                return false;
            }
            let previous = std::mem::replace(&mut *state, State::Done(result.clone()));
            match previous {
                State::Pending { callbacks, wakers } => (callbacks, wakers),
                State::Done(_) => (Vec::new(), Vec::new()),
            }
        };

        // No borrow is held here: callbacks may freely inspect this future.
        for callback in callbacks {
            callback(result.clone());
        }
        for waker in wakers {
            waker.wake();
        }
        true
    }
}

impl<T: Clone + 'static> Future for ClientFuture<T> {
    type Output = ClientResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();
        match &mut *state {
            State::Done(result) => Poll::Ready(result.clone()),
            State::Pending { wakers, .. } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T> std::fmt::Debug for ClientFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let done = matches!(*self.state.borrow(), State::Done(_));
        f.debug_struct("ClientFuture").field("done", &done).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn callbacks_after_completion_run_immediately() {
        let future = ClientFuture::succeeded(5);
        let seen = Rc::new(Cell::new(0));
        let s = seen.clone();
        future.on_success(move |v| s.set(v));
        assert_eq!(seen.get(), 5);
    }

    #[test]
    fn callbacks_before_completion_run_on_set() {
        let settable = SettableClientFuture::new();
        let future = settable.future();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        future.on_success(move |v: u32| s.borrow_mut().push(format!("ok {v}")));
        let s = seen.clone();
        future.on_failure(move |e| s.borrow_mut().push(format!("err {e}")));

        assert!(!future.is_done());
        assert!(settable.set(3));
        assert!(future.is_done());
        assert_eq!(*seen.borrow(), vec!["ok 3".to_string()]);
    }

    #[test]
    fn transform_and_chain_propagate() {
        let settable = SettableClientFuture::new();
        let doubled = settable.future().transform(|v: u32| Ok(v * 2));
        let chained = doubled.chain(|v| ClientFuture::succeeded(format!("v={v}")));

        settable.set(21);
        assert_eq!(chained.result().unwrap().unwrap(), "v=42");
    }

    #[test]
    fn chain_short_circuits_on_error() {
        let called = Rc::new(Cell::new(false));
        let c = called.clone();
        let out = ClientFuture::<u32>::failed(CoreError::Disconnected).chain(move |_| {
            c.set(true);
            ClientFuture::succeeded(1)
        });
        assert_eq!(out.result().unwrap(), Err(CoreError::Disconnected));
        assert!(!called.get());
    }

    #[test]
    fn all_collects_in_order() {
        let a = SettableClientFuture::new();
        let b = SettableClientFuture::new();
        let joined = ClientFuture::all(vec![a.future(), b.future()]);

        b.set("b");
        assert!(!joined.is_done());
        a.set("a");
        assert_eq!(joined.result().unwrap().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn all_fails_fast() {
        let a = SettableClientFuture::<u8>::new();
        let b = SettableClientFuture::<u8>::new();
        let joined = ClientFuture::all(vec![a.future(), b.future()]);
        b.set_error(CoreError::SessionExpired);
        assert_eq!(joined.result().unwrap(), Err(CoreError::SessionExpired));
        a.set(1);
        assert_eq!(joined.result().unwrap(), Err(CoreError::SessionExpired));
    }

    #[test]
    fn awaitable() {
        let settable = SettableClientFuture::new();
        let future = settable.future();
        settable.set(9);
        let value = tokio_test::block_on(future).unwrap();
        assert_eq!(value, 9);
    }

    #[test]
    fn awaiting_a_pending_future_wakes_on_completion() {
        let settable = SettableClientFuture::<u8>::new();
        let mut task = tokio_test::task::spawn(settable.future());
        assert!(task.poll().is_pending());
        settable.set(4);
        assert!(task.is_woken());
        assert_eq!(task.poll(), Poll::Ready(Ok(4)));
    }
}
