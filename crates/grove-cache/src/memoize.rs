//! Single-flight memoized computations

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::BoxFuture;
use grove_core::{ContentHash, DocumentUri};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::CacheError;

type Compute<T> = Box<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<T, CacheError>> + Send + Sync>;

struct PromiseInner<T> {
    label: String,
    cell: OnceCell<Arc<T>>,
    compute: Compute<T>,
}

/// A lazily computed value shared by everyone holding a clone.
///
/// At most one computation runs at a time. Concurrent callers wait for it
/// rather than starting their own. A caller that is cancelled stops waiting
/// without disturbing the others; if it was the one driving the computation,
/// the next waiter starts over. Failures are returned but not remembered.
pub struct Promise<T> {
    inner: Arc<PromiseInner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("label", &self.inner.label)
            .field("ready", &self.inner.cell.initialized())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Promise<T> {
    /// Wrap `compute`, which is not run until the first [`Promise::get`].
    ///
    /// The function must not capture anything whose lifetime the promise
    /// should not extend: promises outlive the snapshot that created them.
    pub fn new<F, Fut>(label: impl Into<String>, compute: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        Promise {
            inner: Arc::new(PromiseInner {
                label: label.into(),
                cell: OnceCell::new(),
                compute: Box::new(move |token| Box::pin(compute(token))),
            }),
        }
    }

    /// The value, if some caller has already computed it.
    pub fn cached(&self) -> Option<Arc<T>> {
        self.inner.cell.get().cloned()
    }

    /// Wait for the value, computing it if nobody else is.
    pub async fn get(&self, cancel: &CancellationToken) -> Result<Arc<T>, CacheError> {
        if let Some(value) = self.inner.cell.get() {
            return Ok(Arc::clone(value));
        }
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        let init = self.inner.cell.get_or_try_init(|| {
            trace!("Computing {}", self.inner.label);
            let computation = (self.inner.compute)(cancel.child_token());
            async move { computation.await.map(Arc::new) }
        });
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CacheError::Cancelled),
            result = init => result.map(Arc::clone),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether two promises are the same computation.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

/// Key of a content-addressed promise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    kind: &'static str,
    uri: DocumentUri,
    hash: ContentHash,
}

impl StoreKey {
    pub fn new(kind: &'static str, uri: &DocumentUri, hash: ContentHash) -> Self {
        StoreKey {
            kind,
            uri: uri.clone(),
            hash,
        }
    }
}

const PRUNE_INTERVAL: usize = 1024;

/// Deduplicates promises for identical inputs across snapshots and sessions.
///
/// The store holds promises weakly: a result lives as long as some snapshot
/// refers to it.
#[derive(Default)]
pub struct Store {
    promises: DashMap<StoreKey, Weak<dyn Any + Send + Sync>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live promise for `key`, or a new one from `make`.
    pub fn promise<T, F>(&self, key: StoreKey, make: F) -> Promise<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Promise<T>,
    {
        let promise = match self.promises.entry(key) {
            Entry::Occupied(mut entry) => {
                if let Some(inner) = Self::upgrade::<T>(entry.get()) {
                    return Promise { inner };
                }
                let promise = make();
                entry.insert(Self::downgrade(&promise));
                promise
            }
            Entry::Vacant(entry) => {
                let promise = make();
                entry.insert(Self::downgrade(&promise));
                promise
            }
        };
        if self.promises.len() % PRUNE_INTERVAL == 0 {
            self.prune();
        }
        promise
    }

    /// Forget entries whose promises are no longer referenced.
    pub fn prune(&self) {
        self.promises.retain(|_, weak| weak.strong_count() > 0);
    }

    pub fn len(&self) -> usize {
        self.promises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.promises.is_empty()
    }

    fn upgrade<T: Send + Sync + 'static>(weak: &Weak<dyn Any + Send + Sync>) -> Option<Arc<PromiseInner<T>>> {
        weak.upgrade()?.downcast::<PromiseInner<T>>().ok()
    }

    fn downgrade<T: Send + Sync + 'static>(promise: &Promise<T>) -> Weak<dyn Any + Send + Sync> {
        let inner: Arc<dyn Any + Send + Sync> = promise.inner.clone();
        Arc::downgrade(&inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn counting_promise(runs: Arc<AtomicUsize>, delay: Duration) -> Promise<usize> {
        Promise::new("count", move |_token| {
            let runs = runs.clone();
            async move {
                tokio::time::sleep(delay).await;
                Ok(runs.fetch_add(1, Ordering::SeqCst) + 1)
            }
        })
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_computation() {
        let runs = Arc::new(AtomicUsize::new(0));
        let promise = counting_promise(runs.clone(), Duration::from_millis(20));
        let token = CancellationToken::new();

        let (a, b, c) = tokio::join!(promise.get(&token), promise.get(&token), promise.get(&token));
        assert_eq!(*a.unwrap(), 1);
        assert_eq!(*b.unwrap(), 1);
        assert_eq!(*c.unwrap(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_caller_does_not_poison_waiters() {
        let runs = Arc::new(AtomicUsize::new(0));
        let promise = counting_promise(runs.clone(), Duration::from_millis(50));

        let impatient = CancellationToken::new();
        let patient = CancellationToken::new();
        let canceller = impatient.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            canceller.cancel();
        });

        let (first, second) = tokio::join!(promise.get(&impatient), promise.get(&patient));
        assert!(first.unwrap_err().is_cancelled());
        assert!(second.is_ok());
        assert!(promise.cached().is_some());
    }

    #[tokio::test]
    async fn test_failures_are_not_memoized() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let promise: Promise<u32> = Promise::new("flaky", move |_token| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CacheError::Analysis("first attempt".into()))
                } else {
                    Ok(7)
                }
            }
        });
        let token = CancellationToken::new();
        assert!(promise.get(&token).await.is_err());
        assert_eq!(*promise.get(&token).await.unwrap(), 7);
    }

    #[test]
    fn test_store_dedups_live_promises() {
        let store = Store::new();
        let uri = DocumentUri::from_path("/w/a.gv");
        let key = StoreKey::new("parse", &uri, ContentHash::of(b"a"));

        let first: Promise<u32> = store.promise(key.clone(), || Promise::new("a", |_| async { Ok(1) }));
        let second: Promise<u32> = store.promise(key.clone(), || Promise::new("b", |_| async { Ok(2) }));
        assert!(Promise::ptr_eq(&first, &second));

        drop(first);
        drop(second);
        store.prune();
        assert!(store.is_empty());
    }
}
