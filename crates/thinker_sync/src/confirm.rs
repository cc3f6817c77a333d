//! Delete confirmation.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::warn;

/// Asks whether destructive operations may proceed.
#[async_trait]
pub trait ConfirmationProvider: Send + Sync {
    /// Returns true if the described operation is allowed.
    async fn confirm(&self, description: &str) -> bool;
}

/// Allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

#[async_trait]
impl ConfirmationProvider for AssumeYes {
    async fn confirm(&self, _description: &str) -> bool {
        true
    }
}

/// Declines everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeNo;

#[async_trait]
impl ConfirmationProvider for AssumeNo {
    async fn confirm(&self, _description: &str) -> bool {
        false
    }
}

/// Asks the provider at most once per run and remembers the answer.
///
/// Concurrent tables asking at the same time wait for the single pending
/// question.
pub(crate) struct DeleteGate {
    provider: Arc<dyn ConfirmationProvider>,
    assume_yes: bool,
    answer: OnceCell<bool>,
}

impl DeleteGate {
    pub(crate) fn new(provider: Arc<dyn ConfirmationProvider>, assume_yes: bool) -> Self {
        Self {
            provider,
            assume_yes,
            answer: OnceCell::new(),
        }
    }

    pub(crate) async fn allows_deletes(&self, description: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        let allowed = *self
            .answer
            .get_or_init(|| async {
                let allowed = self.provider.confirm(description).await;
                if !allowed {
                    warn!("deletes declined; extra target documents will be kept");
                }
                allowed
            })
            .await;
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        asked: AtomicUsize,
        answer: bool,
    }

    #[async_trait]
    impl ConfirmationProvider for Counting {
        async fn confirm(&self, _description: &str) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    #[tokio::test]
    async fn asks_once() {
        let provider = Arc::new(Counting {
            asked: AtomicUsize::new(0),
            answer: false,
        });
        let gate = DeleteGate::new(provider.clone(), false);

        assert!(!gate.allows_deletes("users").await);
        assert!(!gate.allows_deletes("posts").await);
        assert_eq!(provider.asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn assume_yes_never_asks() {
        let provider = Arc::new(Counting {
            asked: AtomicUsize::new(0),
            answer: false,
        });
        let gate = DeleteGate::new(provider.clone(), true);

        assert!(gate.allows_deletes("users").await);
        assert_eq!(provider.asked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn static_providers() {
        assert!(AssumeYes.confirm("x").await);
        assert!(!AssumeNo.confirm("x").await);
    }
}
