// Single-assignment completion handlers.
//
// Platform callbacks hand the core a completion handler that must run exactly
// once on every path. `Completion` owns the handler as a `FnOnce`, so it can
// only be consumed once, and fires a neutral fallback value if it is dropped
// without being completed (early returns, gate short-circuits, panicking
// application code unwinding through the façade).

use tokio::sync::oneshot;

/// Completion handler that fires exactly once
pub struct Completion<T: Send + 'static> {
    handler: Option<Box<dyn FnOnce(T) + Send>>,
    fallback: Option<T>,
}

impl<T: Send + 'static> Completion<T> {
    /// Wrap a handler. `fallback` is delivered if the completion is dropped.
    pub fn new(handler: impl FnOnce(T) + Send + 'static, fallback: T) -> Self {
        Self {
            handler: Some(Box::new(handler)),
            fallback: Some(fallback),
        }
    }

    /// Completion backed by a oneshot channel, for callers that want to await the result
    pub fn channel(fallback: T) -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self::new(
            move |value| {
                // Receiver may be gone if the caller stopped waiting
                let _ = tx.send(value);
            },
            fallback,
        );
        (completion, rx)
    }

    /// Invoke the handler with `value`, consuming the completion
    pub fn complete(mut self, value: T) {
        if let Some(handler) = self.handler.take() {
            handler(value);
        }
    }
}

impl<T: Send + 'static> Drop for Completion<T> {
    fn drop(&mut self) {
        if let (Some(handler), Some(fallback)) = (self.handler.take(), self.fallback.take()) {
            tracing::debug!("Completion dropped without a result, delivering fallback");
            handler(fallback);
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.handler.is_some())
            .finish()
    }
}
