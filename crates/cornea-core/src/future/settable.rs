use super::{ClientFuture, ClientResult};
use crate::error::CoreError;

/// Write side of a [`ClientFuture`].
///
/// The only way to complete a future. A second completion is a contract
/// violation: it is logged and ignored.
pub struct SettableClientFuture<T> {
    future: ClientFuture<T>,
}

impl<T: Clone + 'static> SettableClientFuture<T> {
    pub fn new() -> Self {
        Self {
            future: ClientFuture::pending(),
        }
    }

    /// Read handle observing this completion.
    pub fn future(&self) -> ClientFuture<T> {
        self.future.clone()
    }

    pub fn set(&self, value: T) -> bool {
        self.complete(Ok(value))
    }

    pub fn set_error(&self, error: CoreError) -> bool {
        self.complete(Err(error))
    }

    pub fn complete(&self, result: ClientResult<T>) -> bool {
        let accepted = self.future.complete(result);
        if !accepted {
            tracing::warn!(error = %CoreError::AlreadyCompleted, "ignoring second completion");
        }
        accepted
    }

    pub fn is_done(&self) -> bool {
        self.future.is_done()
    }
}

impl<T: Clone + 'static> Default for SettableClientFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SettableClientFuture<T> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
        }
    }
}

impl<T> std::fmt::Debug for SettableClientFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SettableClientFuture")
            .field(&self.future)
            .finish()
    }
}
