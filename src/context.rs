use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::DepGitError;

/// Cancellation and deadline carried into database calls.
#[derive(Clone, Debug, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    pub fn background() -> Self {
        Context::default()
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Context {
            token,
            deadline: None,
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Context {
            token: self.token.child_token(),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fails once the context is cancelled or past its deadline.
    pub fn check(&self) -> Result<(), DepGitError> {
        if self.token.is_cancelled() {
            return Err(DepGitError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(DepGitError::DeadlineExceeded);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel() {
        let ctx = Context::background();
        assert!(ctx.check().is_ok());
        let child = ctx.with_timeout(Duration::from_secs(60));
        ctx.cancel();
        assert!(matches!(ctx.check(), Err(DepGitError::Cancelled)));
        assert!(matches!(child.check(), Err(DepGitError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        assert!(ctx.check().is_ok());
        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(matches!(ctx.check(), Err(DepGitError::DeadlineExceeded)));
    }
}
