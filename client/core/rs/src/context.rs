//! Cancellation/deadline context threaded through every I/O-performing
//! entry point (§5): a `CancellationToken` paired with an optional
//! deadline.

use std::future::Future;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct CallContext {
  cancel: CancellationToken,
  deadline: Option<Instant>,
}

impl Default for CallContext {
  fn default() -> Self {
    CallContext {
      cancel: CancellationToken::new(),
      deadline: None,
    }
  }
}

impl CallContext {
  pub fn new() -> CallContext {
    CallContext::default()
  }

  pub fn with_deadline(mut self, deadline: Instant) -> CallContext {
    self.deadline = Some(deadline);
    self
  }

  pub fn with_timeout(self, timeout: std::time::Duration) -> CallContext {
    self.with_deadline(Instant::now() + timeout)
  }

  /// A context derived from this one: cancelling the child never
  /// cancels the parent, but cancelling the parent cancels the child.
  pub fn child(&self) -> CallContext {
    CallContext {
      cancel: self.cancel.child_token(),
      deadline: self.deadline,
    }
  }

  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  pub fn deadline(&self) -> Option<Instant> {
    self.deadline
  }

  /// Races `fut` against cancellation and the deadline, whichever comes
  /// first. Every blocking wire call is an observation point built on
  /// top of this.
  pub async fn run<F, T>(&self, fut: F) -> Result<T, CallContextError>
  where
    F: Future<Output = T>,
  {
    let cancelled = self.cancel.cancelled();
    match self.deadline {
      Some(deadline) => {
        tokio::select! {
          res = fut => Ok(res),
          _ = cancelled => Err(CallContextError::Cancelled),
          _ = tokio::time::sleep_until(deadline) => Err(CallContextError::DeadlineExceeded),
        }
      }
      None => {
        tokio::select! {
          res = fut => Ok(res),
          _ = cancelled => Err(CallContextError::Cancelled),
        }
      }
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CallContextError {
  #[error("call canceled")]
  Cancelled,
  #[error("call deadline exceeded")]
  DeadlineExceeded,
}
