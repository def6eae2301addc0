//! Bounded worker pool for per-document blocking work.
//!
//! Cache refreshes and text scans touch the disk and burn CPU, so each item
//! runs on a blocking thread while a semaphore caps how many run at once.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

/// Runs `f` over every item with at most `limit` calls in flight.
///
/// Results come back in input order. An item whose task panicked yields
/// `None`; the remaining items still complete.
pub async fn map_blocking<T, R, F>(items: Vec<T>, limit: usize, f: F) -> Vec<Option<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let f = Arc::new(f);
    let mut tasks = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let f = Arc::clone(&f);
        tasks.spawn(async move {
            // The semaphore is never closed, so acquisition cannot fail.
            let _permit = semaphore.acquire_owned().await.ok();
            let outcome = tokio::task::spawn_blocking(move || f(item)).await;
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<R>> = Vec::new();
    slots.resize_with(tasks.len(), || None);

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(value))) => slots[index] = Some(value),
            Ok((index, Err(e))) => warn!("Worker for item {} failed: {}", index, e),
            Err(e) => warn!("Worker task failed: {}", e),
        }
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn preserves_input_order() {
        let out = map_blocking(vec![3u64, 1, 2], 2, |ms| {
            std::thread::sleep(Duration::from_millis(ms * 5));
            ms * 10
        })
        .await;
        assert_eq!(out, vec![Some(30), Some(10), Some(20)]);
    }

    #[tokio::test]
    async fn never_exceeds_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));

        map_blocking((0..12).collect::<Vec<_>>(), 3, move |_| {
            let now = a.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            a.fetch_sub(1, Ordering::SeqCst);
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_input_yields_nothing() {
        let out: Vec<Option<u8>> = map_blocking(Vec::<u8>::new(), 4, |x| x).await;
        assert!(out.is_empty());
    }
}
