//! At-least-one-success aggregation over concurrent sub-fetches.

use std::future::Future;

use futures::future::join_all;
use log::warn;

use crate::error::{AppError, AppResult};
use crate::models::{FetchFailure, FetchOutcome, FetchTarget};

/// A fan-out member: who it is and the fetch to run for it.
pub struct Member<'a, Fut> {
    pub id: &'a str,
    pub name: Option<&'a str>,
    pub fetch: Fut,
}

/// Runs every member concurrently. Fails only when there was at least one
/// member and all of them failed; otherwise returns the fulfilled results in
/// member order alongside one `FetchFailure` per failed member.
///
/// Nested outcomes are flattened, so failures reported by a member's own
/// fan-out surface here as well.
pub async fn at_least_one<'a, T, Fut>(
    target: FetchTarget,
    what: &str,
    members: Vec<Member<'a, Fut>>,
) -> AppResult<FetchOutcome<Vec<T>>>
where
    Fut: Future<Output = AppResult<FetchOutcome<T>>>,
{
    let total = members.len();
    let labels: Vec<(&str, Option<&str>)> = members.iter().map(|m| (m.id, m.name)).collect();
    let results = join_all(members.into_iter().map(|m| m.fetch)).await;

    let mut items = Vec::with_capacity(total);
    let mut failures = Vec::new();
    let mut failed = 0usize;

    for ((id, name), result) in labels.into_iter().zip(results) {
        match result {
            Ok(outcome) => {
                items.push(outcome.items);
                failures.extend(outcome.failures);
            }
            Err(e) => {
                failed += 1;
                warn!("[Fetch] {} {} failed: {}", target.as_str(), id, e);
                failures.push(FetchFailure::new(target, id, name, e.to_safe_string()));
            }
        }
    }

    if total > 0 && failed == total {
        return Err(AppError::all_failed(what, failures));
    }

    Ok(FetchOutcome { items, failures })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use futures::FutureExt;

    fn ok(n: u32) -> BoxFuture<'static, AppResult<FetchOutcome<u32>>> {
        async move { Ok(FetchOutcome::complete(n)) }.boxed()
    }

    fn fail(msg: &'static str) -> BoxFuture<'static, AppResult<FetchOutcome<u32>>> {
        async move { Err(AppError::server(500, msg)) }.boxed()
    }

    #[tokio::test]
    async fn test_partial_failure_succeeds() {
        let members = vec![
            Member { id: "a", name: Some("A"), fetch: ok(1) },
            Member { id: "b", name: Some("B"), fetch: fail("boom") },
            Member { id: "c", name: None, fetch: ok(3) },
        ];
        let outcome = at_least_one(FetchTarget::Calendar, "events", members).await.unwrap();
        assert_eq!(outcome.items, vec![1, 3]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].id, "b");
        assert_eq!(outcome.failures[0].message, "boom");
    }

    #[tokio::test]
    async fn test_all_failed_is_error() {
        let members = vec![
            Member { id: "a", name: None, fetch: fail("x") },
            Member { id: "b", name: None, fetch: fail("y") },
        ];
        let err = at_least_one(FetchTarget::Source, "calendars", members).await.unwrap_err();
        match err {
            AppError::AllFailed { what, failures } => {
                assert_eq!(what, "calendars");
                assert_eq!(failures.len(), 2);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_fanout_is_ok() {
        let members: Vec<Member<'_, BoxFuture<'static, AppResult<FetchOutcome<u32>>>>> = Vec::new();
        let outcome = at_least_one(FetchTarget::Source, "events", members).await.unwrap();
        assert!(outcome.items.is_empty());
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_nested_failures_are_flattened() {
        let nested = async {
            Ok(FetchOutcome {
                items: 7u32,
                failures: vec![FetchFailure::new(FetchTarget::Calendar, "c1", None, "down".into())],
            })
        }
        .boxed();
        let members = vec![Member { id: "s1", name: None, fetch: nested }];
        let outcome = at_least_one(FetchTarget::Source, "events", members).await.unwrap();
        assert_eq!(outcome.items, vec![7]);
        assert_eq!(outcome.failures[0].target, FetchTarget::Calendar);
    }
}
