use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use tokio::task::JoinSet;

/// Run `worker` once per key, concurrently, and collect the results into a
/// map keyed by the input. All-or-nothing: the first worker error aborts the
/// batch and is returned; dropping the join set cancels the tasks still in
/// flight. Callers keep input sets small (tens of items); there is no bound
/// on fan-out width.
pub async fn collect_all<K, T, E, F, Fut>(keys: Vec<K>, worker: F) -> Result<HashMap<K, T>, E>
where
    K: Clone + Eq + Hash + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    for key in keys {
        let fut = worker(key.clone());
        tasks.spawn(async move { (key, fut.await) });
    }

    let mut results = HashMap::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let (key, outcome) = match joined {
            Ok(pair) => pair,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            // Aborted during runtime shutdown; nothing left to collect.
            Err(_) => continue,
        };
        results.insert(key, outcome?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ApiError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn empty_input_yields_empty_map() {
        let result: Result<HashMap<String, u32>, ApiError> =
            collect_all(Vec::new(), |_name| async move { Ok(1) }).await;
        assert!(result.unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_entry_per_key_on_success() {
        let keys = vec!["sled-a".to_string(), "sled-b".to_string(), "sled-c".to_string()];
        let result: Result<HashMap<String, usize>, ApiError> =
            collect_all(keys.clone(), |name| async move { Ok(name.len()) }).await;
        let map = result.unwrap();
        assert_eq!(map.len(), 3);
        for key in keys {
            assert_eq!(map[&key], key.len());
        }
    }

    #[tokio::test]
    async fn first_error_aborts_the_batch() {
        let keys = vec![1u32, 2, 3, 4];
        let result: Result<HashMap<u32, u32>, ApiError> = collect_all(keys, |n| async move {
            if n == 3 {
                Err(ApiError::fatal("worker 3 failed"))
            } else {
                Ok(n * 10)
            }
        })
        .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("worker 3 failed"));
    }

    #[tokio::test]
    async fn all_workers_run_concurrently() {
        let started = Arc::new(AtomicUsize::new(0));
        let keys: Vec<u32> = (0..8).collect();
        let counter = started.clone();
        let result: Result<HashMap<u32, u32>, ApiError> = collect_all(keys, move |n| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                // Every worker must have been spawned before any completes.
                while counter.load(Ordering::SeqCst) < 8 {
                    tokio::task::yield_now().await;
                }
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap().len(), 8);
        assert_eq!(started.load(Ordering::SeqCst), 8);
    }
}
