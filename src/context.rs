use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

// ============================================================================
// Request Context
// ============================================================================
//
// Carries the tenant scope, the acting caller and the cancellation/deadline
// of one request through the pipeline. Filter and Push race every I/O future
// against it and abort with nothing applied.
//
// ============================================================================

/// Tenant the request is executed for
#[derive(Debug, Clone, Default)]
pub struct InstanceInfo {
    pub instance_id: String,
    /// Domain the instance was reached under, used to derive default org domains
    pub requested_domain: String,
}

/// Authenticated caller of the request
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub user_id: String,
    pub org_id: String,
}

#[derive(Debug, Clone)]
pub struct Context {
    instance: InstanceInfo,
    caller: Caller,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new(instance: InstanceInfo, caller: Caller) -> Self {
        Self {
            instance,
            caller,
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Context used by background work, scoped to an instance with a system caller
    pub fn background(instance_id: impl Into<String>) -> Self {
        Self::new(
            InstanceInfo {
                instance_id: instance_id.into(),
                requested_domain: String::new(),
            },
            Caller {
                user_id: "SYSTEM".to_string(),
                org_id: String::new(),
            },
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Same tenant and caller, but detached from this request's cancellation and deadline
    pub fn detached(&self) -> Self {
        Self::new(self.instance.clone(), self.caller.clone())
    }

    pub fn instance(&self) -> &InstanceInfo {
        &self.instance
    }

    pub fn instance_id(&self) -> &str {
        &self.instance.instance_id
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Fails fast when the request is already cancelled or past its deadline
    pub fn check(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Runs `fut` until it completes, the request is cancelled or the deadline passes.
    /// The future is dropped on abort.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        // A finished future wins over a cancellation observed in the same poll
        tokio::select! {
            biased;
            result = fut => result,
            _ = self.cancellation.cancelled() => Err(Error::Cancelled),
            _ = expired => Err(Error::DeadlineExceeded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_returns_future_output() {
        let ctx = Context::background("instance1");
        let value = ctx.run(async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_aborts_on_cancellation() {
        let ctx = Context::background("instance1");
        ctx.cancel();
        let result = ctx.run(async { Ok(()) }).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_keeps_result_completed_alongside_cancellation() {
        let ctx = Context::background("instance1");
        let result = ctx
            .run(async {
                ctx.cancel();
                Ok("committed")
            })
            .await;
        assert_eq!(result.unwrap(), "committed");
    }

    #[tokio::test]
    async fn test_run_aborts_when_cancelled_while_pending() {
        let ctx = Context::background("instance1");
        let result = ctx
            .run(async {
                ctx.cancel();
                std::future::pending::<()>().await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_aborts_after_deadline() {
        let ctx = Context::background("instance1").with_timeout(Duration::from_millis(10));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::DeadlineExceeded)));
    }

    #[test]
    fn test_detached_context_ignores_parent_cancellation() {
        let ctx = Context::background("instance1");
        let detached = ctx.detached();
        ctx.cancel();
        assert!(ctx.check().is_err());
        assert!(detached.check().is_ok());
        assert_eq!(detached.instance_id(), "instance1");
    }
}
