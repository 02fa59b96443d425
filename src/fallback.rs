//! Ordered fallback chains.
//!
//! Content extraction, bullet summaries and tags all follow the same shape:
//! try the best source, then a cheaper one, then a last resort. Each source is
//! a [`Strategy`]; a [`Chain`] tries them in order and returns the first
//! success. A strategy that has nothing to offer returns an error (usually
//! [`AppError::Empty`](crate::error::AppError::Empty)) and the chain moves on.

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;

/// One way of producing `O` from `I`.
#[async_trait]
pub trait Strategy<I: ?Sized + Sync, O: Send>: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn attempt(&self, input: &I) -> Result<O>;
}

/// The winning strategy's output, tagged with its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<O> {
    pub strategy: &'static str,
    pub value: O,
}

pub struct Chain<I: ?Sized + Sync, O: Send> {
    strategies: Vec<Box<dyn Strategy<I, O>>>,
}

impl<I: ?Sized + Sync, O: Send> Chain<I, O> {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Append a strategy; strategies run in insertion order.
    pub fn then(mut self, strategy: impl Strategy<I, O> + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run strategies in order until one succeeds.
    ///
    /// Returns `None` when every strategy failed or the chain is empty.
    pub async fn first_success(&self, input: &I) -> Option<Resolved<O>> {
        for strategy in &self.strategies {
            match strategy.attempt(input).await {
                Ok(value) => {
                    debug!(strategy = strategy.name(), "strategy succeeded");
                    return Some(Resolved {
                        strategy: strategy.name(),
                        value,
                    });
                }
                Err(e) => {
                    debug!(strategy = strategy.name(), error = %e, "strategy failed; trying next");
                }
            }
        }
        None
    }
}

impl<I: ?Sized + Sync, O: Send> Default for Chain<I, O> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        value: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Strategy<str, String> for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn attempt(&self, input: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.value {
                Some(v) => Ok(format!("{v}:{input}")),
                None => Err(AppError::empty(self.name)),
            }
        }
    }

    fn fixed(name: &'static str, value: Option<&'static str>) -> (Fixed, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Fixed {
                name,
                value,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }

    #[tokio::test]
    async fn test_first_success_wins_and_stops() {
        let (a, a_calls) = fixed("a", None);
        let (b, b_calls) = fixed("b", Some("B"));
        let (c, c_calls) = fixed("c", Some("C"));
        let chain = Chain::new().then(a).then(b).then(c);

        let resolved = chain.first_success("x").await.unwrap();
        assert_eq!(resolved.strategy, "b");
        assert_eq!(resolved.value, "B:x");
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_fail_yields_none() {
        let (a, _) = fixed("a", None);
        let (b, _) = fixed("b", None);
        let chain = Chain::new().then(a).then(b);
        assert_eq!(chain.names(), vec!["a", "b"]);
        assert!(chain.first_success("x").await.is_none());
    }

    #[tokio::test]
    async fn test_empty_chain_yields_none() {
        let chain: Chain<str, String> = Chain::new();
        assert!(chain.is_empty());
        assert!(chain.first_success("x").await.is_none());
    }
}
