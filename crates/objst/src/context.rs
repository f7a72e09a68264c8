//! Per-operation cancellation and deadline.

use objst_common::{Error, Result};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Cancellation token plus optional deadline for one bucket operation.
///
/// Long scans call [`OpContext::check`] between records. Clones share the
/// same token, so cancelling any clone cancels all of them.
#[derive(Clone, Debug, Default)]
pub struct OpContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    /// Context that is never cancelled unless [`OpContext::cancel`] is called
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Context that expires `timeout` from now
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Context that expires at `deadline`
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Context driven by an existing token
    #[must_use]
    pub const fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Underlying token
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the context was cancelled or its deadline passed
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with [`Error::Cancelled`] once the context is done
    pub fn check(&self) -> Result<()> {
        if self.is_done() {
            return Err(Error::Cancelled { removed: 0 });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_never_done() {
        let ctx = OpContext::background();
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn test_cancel_shared_between_clones() {
        let ctx = OpContext::background();
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_done());
        assert!(matches!(ctx.check(), Err(Error::Cancelled { removed: 0 })));
    }

    #[test]
    fn test_deadline() {
        let ctx = OpContext::with_deadline(Instant::now());
        assert!(ctx.check().unwrap_err().is_cancelled());

        let ctx = OpContext::with_timeout(Duration::from_secs(3600));
        assert!(ctx.check().is_ok());
    }
}
