//! Waiting on several independently issued requests.

use std::fmt::Display;
use std::future::Future;

use futures::future::join_all;
use metrics::counter;

/// Terminal outcome of one input to [`settle_all_detailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Settled<T, E> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settled::Fulfilled(_))
    }

    /// The value, discarding the rejection reason.
    pub fn ok(self) -> Option<T> {
        match self {
            Settled::Fulfilled(value) => Some(value),
            Settled::Rejected(_) => None,
        }
    }
}

impl<T, E> From<Result<T, E>> for Settled<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Settled::Fulfilled(value),
            Err(e) => Settled::Rejected(e),
        }
    }
}

/// Wait for every request and keep the reason of each failure.
///
/// Never short-circuits; the output is index-aligned with the input.
pub async fn settle_all_detailed<I, F, T, E>(requests: I) -> Vec<Settled<T, E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    join_all(requests)
        .await
        .into_iter()
        .map(Settled::from)
        .collect()
}

/// Wait for every request; failed ones become `None`.
///
/// Failures are logged and counted, never returned. The output has one entry
/// per input, in input order.
///
/// # Example
/// ```ignore
/// let results = settle_all([
///     http.execute(&users, &token),
///     http.execute(&roles, &token),
/// ])
/// .await;
/// ```
pub async fn settle_all<I, F, T, E>(requests: I) -> Vec<Option<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    settle_all_detailed(requests)
        .await
        .into_iter()
        .enumerate()
        .map(|(index, settled)| match settled {
            Settled::Fulfilled(value) => Some(value),
            Settled::Rejected(reason) => {
                counter!("sortie_settle_rejections_total").increment(1);
                tracing::info!(index, error = %reason, "Request in settled group failed");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_failure_is_isolated_to_its_slot() {
        let requests: Vec<futures::future::BoxFuture<'static, Result<&str, String>>> = vec![
            Box::pin(async { Ok("X") }),
            Box::pin(async { Err("boom".to_string()) }),
            Box::pin(async { Ok("Y") }),
        ];

        let results = settle_all(requests).await;
        assert_eq!(results, vec![Some("X"), None, Some("Y")]);
    }

    #[tokio::test]
    async fn test_waits_for_slow_requests_and_keeps_order() {
        let delays = [30u64, 5, 15];
        let requests = delays.iter().map(|&ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            if ms == 5 {
                Err(format!("failed after {}ms", ms))
            } else {
                Ok(ms)
            }
        });

        let results = settle_all(requests).await;
        assert_eq!(results, vec![Some(30), None, Some(15)]);
    }

    #[tokio::test]
    async fn test_empty_input_yields_empty_output() {
        let requests: Vec<std::future::Ready<Result<u8, String>>> = Vec::new();
        assert!(settle_all(requests).await.is_empty());
    }

    #[tokio::test]
    async fn test_detailed_keeps_reasons() {
        let requests = vec![
            std::future::ready(Ok::<u8, &str>(1)),
            std::future::ready(Err("nope")),
        ];

        let results = settle_all_detailed(requests).await;
        assert_eq!(results[0], Settled::Fulfilled(1));
        assert_eq!(results[1], Settled::Rejected("nope"));
        assert!(!results[1].is_fulfilled());
    }
}
