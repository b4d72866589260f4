// Foreground presentation option resolution.
//
// Extenders are registered at runtime and each proposes a set of
// `PresentationOptions` for an incoming notification. Proposals are merged
// with bitwise OR, so registration order never changes the result. Extenders
// report through a `Contribution` handle, either synchronously or later from
// their own task; a `CompletionBarrier` sized to the extender count fires
// once every handle has reported or been dropped.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::completion::Completion;
use super::notification::PushNotification;
use super::{PushError, PushResult};

bitflags! {
    /// How a notification is surfaced while the app is in the foreground
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PresentationOptions: u32 {
        const BADGE = 1 << 0;
        const SOUND = 1 << 1;
        /// Pre-banner platforms
        const ALERT = 1 << 2;
        const LIST = 1 << 3;
        const BANNER = 1 << 4;
    }
}

impl Default for PresentationOptions {
    fn default() -> Self {
        Self::empty()
    }
}

struct BarrierState {
    outstanding: usize,
    merged: PresentationOptions,
    done: Option<oneshot::Sender<PresentationOptions>>,
}

impl BarrierState {
    fn report(&mut self, options: PresentationOptions) {
        self.merged |= options;
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.outstanding == 0
            && let Some(done) = self.done.take()
        {
            let _ = done.send(self.merged);
        }
    }
}

/// Waits for a fixed number of contributions
pub struct CompletionBarrier {
    state: Arc<Mutex<BarrierState>>,
    done: oneshot::Receiver<PresentationOptions>,
}

impl CompletionBarrier {
    /// Barrier expecting `expected` contributions, and the handles that feed it
    pub fn new(expected: usize) -> (Self, Vec<Contribution>) {
        let (tx, rx) = oneshot::channel();
        let state = Arc::new(Mutex::new(BarrierState {
            outstanding: expected,
            merged: PresentationOptions::empty(),
            done: Some(tx),
        }));

        if expected == 0
            && let Some(done) = state.lock().done.take()
        {
            let _ = done.send(PresentationOptions::empty());
        }

        let contributions = (0..expected)
            .map(|_| Contribution {
                state: Some(Arc::clone(&state)),
            })
            .collect();

        (Self { state, done: rx }, contributions)
    }

    /// Options merged so far
    pub fn merged(&self) -> PresentationOptions {
        self.state.lock().merged
    }

    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding
    }

    /// Wait until every contribution reported
    pub async fn wait(mut self) -> PresentationOptions {
        match (&mut self.done).await {
            Ok(merged) => merged,
            Err(_) => self.merged(),
        }
    }

    /// Wait at most `timeout`, failing with `PushError::Timeout` if some
    /// contribution is still outstanding. The barrier stays usable.
    pub async fn try_wait(&mut self, timeout: Duration) -> PushResult<PresentationOptions> {
        match tokio::time::timeout(timeout, &mut self.done).await {
            Ok(Ok(merged)) => Ok(merged),
            Ok(Err(_)) => Ok(self.merged()),
            Err(_) => Err(PushError::Timeout {
                operation: "presentation extenders".to_string(),
                duration: timeout,
            }),
        }
    }

    /// Wait at most `timeout`; late contributions are ignored
    pub async fn wait_timeout(mut self, timeout: Duration) -> PresentationOptions {
        match self.try_wait(timeout).await {
            Ok(merged) => merged,
            Err(error) => {
                let merged = self.merged();
                tracing::warn!(
                    outstanding = self.outstanding(),
                    error = %error,
                    "Delivering partially merged presentation options"
                );
                merged
            },
        }
    }
}

/// One extender's share of a barrier. Dropping it contributes nothing.
pub struct Contribution {
    state: Option<Arc<Mutex<BarrierState>>>,
}

impl Contribution {
    pub fn contribute(mut self, options: PresentationOptions) {
        if let Some(state) = self.state.take() {
            state.lock().report(options);
        }
    }
}

impl Drop for Contribution {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.lock().report(PresentationOptions::empty());
        }
    }
}

/// Application hook proposing presentation options for a notification
pub trait PresentationExtender: Send + Sync {
    /// Report through `contribution`, now or from another task
    fn extend_presentation_options(
        &self,
        notification: &PushNotification,
        contribution: Contribution,
    );
}

impl<F> PresentationExtender for F
where
    F: Fn(&PushNotification) -> PresentationOptions + Send + Sync,
{
    fn extend_presentation_options(
        &self,
        notification: &PushNotification,
        contribution: Contribution,
    ) {
        contribution.contribute(self(notification));
    }
}

/// Merges extender proposals into one decision per notification
pub struct PresentationResolver {
    extenders: RwLock<Vec<Arc<dyn PresentationExtender>>>,
    default_options: PresentationOptions,
    timeout: Option<Duration>,
}

impl PresentationResolver {
    /// `default_options` applies only when no extender is registered
    pub fn new(default_options: PresentationOptions, timeout: Option<Duration>) -> Self {
        Self {
            extenders: RwLock::new(Vec::new()),
            default_options,
            timeout,
        }
    }

    pub fn register_extender(&self, extender: Arc<dyn PresentationExtender>) {
        let mut extenders = self.extenders.write();
        extenders.push(extender);
        tracing::debug!(count = extenders.len(), "Registered presentation extender");
    }

    pub fn extender_count(&self) -> usize {
        self.extenders.read().len()
    }

    pub fn default_options(&self) -> PresentationOptions {
        self.default_options
    }

    /// Merged options for `notification`
    pub async fn resolve(&self, notification: &PushNotification) -> PresentationOptions {
        let extenders: Vec<_> = self.extenders.read().iter().cloned().collect();
        if extenders.is_empty() {
            return self.default_options;
        }

        let (barrier, contributions) = CompletionBarrier::new(extenders.len());
        for (extender, contribution) in extenders.iter().zip(contributions) {
            // A panicking extender drops its contribution while unwinding
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                extender.extend_presentation_options(notification, contribution)
            }));
            if outcome.is_err() {
                tracing::warn!(
                    notification_id = %notification.identifier,
                    "Presentation extender panicked, treating as empty contribution"
                );
            }
        }

        let merged = match self.timeout {
            Some(timeout) => barrier.wait_timeout(timeout).await,
            None => barrier.wait().await,
        };
        tracing::debug!(
            notification_id = %notification.identifier,
            options = ?merged,
            "Resolved presentation options"
        );
        merged
    }

    /// Completion-handler form of [`resolve`](Self::resolve)
    pub async fn resolve_presentation_options(
        &self,
        notification: &PushNotification,
        completion: Completion<PresentationOptions>,
    ) {
        completion.complete(self.resolve(notification).await);
    }
}

impl Default for PresentationResolver {
    fn default() -> Self {
        Self::new(PresentationOptions::empty(), None)
    }
}
