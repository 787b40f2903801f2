//! Unit tests for the optimistic concurrency controller

#[cfg(test)]
mod tests {
    use crate::concurrency::*;
    use crate::error::{ConcurrencyError, LockError, WriteError};
    use crate::lock::{KeyedLockRegistry, LockRegistry};
    use std::collections::HashMap;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// In-memory versioned documents with an instrumented critical section:
    /// `in_flight` counts callers between their read and the end of their write.
    #[derive(Default)]
    struct MemoryRemote {
        docs: Mutex<HashMap<String, (Vec<String>, u64)>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        writes: AtomicUsize,
    }

    impl MemoryRemote {
        fn with_doc(identity: &str) -> Self {
            let remote = Self::default();
            remote
                .docs
                .lock()
                .unwrap()
                .insert(identity.to_string(), (Vec::new(), 0));
            remote
        }

        /// A writer in another process: bypasses the lock, bumps the version.
        fn external_write(&self, identity: &str, item: &str) {
            let mut docs = self.docs.lock().unwrap();
            let doc = docs.get_mut(identity).unwrap();
            doc.0.push(item.to_string());
            doc.1 += 1;
        }

        fn snapshot(&self, identity: &str) -> (Vec<String>, u64) {
            self.docs.lock().unwrap().get(identity).cloned().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl VersionedRemote for MemoryRemote {
        type Value = Vec<String>;
        type Token = u64;
        type Error = io::Error;

        async fn read(&self, identity: &str) -> Result<Versioned<Vec<String>, u64>, io::Error> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let doc = self.docs.lock().unwrap().get(identity).cloned();
            tokio::time::sleep(Duration::from_millis(5)).await;
            match doc {
                Some((value, version)) => Ok(Versioned::new(value, version)),
                None => {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    Err(io::Error::new(io::ErrorKind::NotFound, format!("{} not found", identity)))
                }
            }
        }

        async fn write(
            &self,
            identity: &str,
            value: Vec<String>,
            expected: &u64,
        ) -> Result<Versioned<Vec<String>, u64>, WriteError<io::Error>> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.writes.fetch_add(1, Ordering::SeqCst);
            let result = {
                let mut docs = self.docs.lock().unwrap();
                match docs.get_mut(identity) {
                    None => Err(WriteError::Remote(io::Error::new(io::ErrorKind::NotFound, "gone"))),
                    Some(doc) if doc.1 != *expected => Err(WriteError::PreconditionFailed),
                    Some(doc) => {
                        *doc = (value, doc.1 + 1);
                        Ok(Versioned::new(doc.0.clone(), doc.1))
                    }
                }
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn controller() -> ConcurrencyController {
        ConcurrencyController::new(Arc::new(KeyedLockRegistry::new()))
    }

    fn append(item: String) -> impl FnOnce(&Vec<String>) -> Result<Vec<String>, io::Error> {
        move |current| {
            let mut next = current.clone();
            next.push(item);
            Ok(next)
        }
    }

    #[tokio::test]
    async fn test_mutation_writes_with_fresh_token() {
        let remote = MemoryRemote::with_doc("kvs-1");
        let written = controller()
            .mutate(&remote, "kvs-1", &CancellationToken::new(), append("a".to_string()))
            .await
            .unwrap();

        assert_eq!(written.value, vec!["a"]);
        assert_eq!(written.token, 1);
        assert_eq!(remote.snapshot("kvs-1"), (vec!["a".to_string()], 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_identity_never_overlaps() {
        let remote = Arc::new(MemoryRemote::with_doc("kvs-1"));
        let controller = controller();

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let remote = Arc::clone(&remote);
                let controller = controller.clone();
                tokio::spawn(async move {
                    controller
                        .mutate(&*remote, "kvs-1", &CancellationToken::new(), append(format!("item-{}", i)))
                        .await
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        assert_eq!(remote.max_in_flight.load(Ordering::SeqCst), 1);
        let (items, version) = remote.snapshot("kvs-1");
        assert_eq!(items.len(), 8, "no update may be lost");
        assert_eq!(version, 8);
        assert!(controller.locks().is_empty());
    }

    #[tokio::test]
    async fn test_distinct_identities_run_concurrently() {
        let remote = Arc::new(MemoryRemote::with_doc("kvs-1"));
        remote
            .docs
            .lock()
            .unwrap()
            .insert("kvs-2".to_string(), (Vec::new(), 0));
        let controller = controller();
        let cancel = CancellationToken::new();

        let (a, b) = tokio::join!(
            controller.mutate(&*remote, "kvs-1", &cancel, append("a".to_string())),
            controller.mutate(&*remote, "kvs-2", &cancel, append("b".to_string())),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(remote.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stale_token_reports_concurrent_modification() {
        let remote = MemoryRemote::with_doc("kvs-1");
        let controller = controller();

        let err = controller
            .mutate(&remote, "kvs-1", &CancellationToken::new(), |current: &Vec<String>| {
                // Another process writes between our read and our write
                remote.external_write("kvs-1", "external");
                let mut next = current.clone();
                next.push("stale".to_string());
                Ok::<_, io::Error>(next)
            })
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        match &err {
            ConcurrencyError::ConcurrentModification { identity, token } => {
                assert_eq!(identity, "kvs-1");
                assert_eq!(token, "0");
            }
            other => panic!("expected ConcurrentModification, got {:?}", other),
        }

        // The external value survives; the stale caller's value was not applied
        assert_eq!(remote.snapshot("kvs-1"), (vec!["external".to_string()], 1));
        assert_eq!(remote.writes.load(Ordering::SeqCst), 1);

        // Lock released: a fresh attempt re-reads and succeeds
        assert!(controller.locks().is_empty());
        controller
            .mutate(&remote, "kvs-1", &CancellationToken::new(), append("retry".to_string()))
            .await
            .unwrap();
        assert_eq!(
            remote.snapshot("kvs-1"),
            (vec!["external".to_string(), "retry".to_string()], 2)
        );
    }

    #[tokio::test]
    async fn test_build_error_skips_write() {
        let remote = MemoryRemote::with_doc("kvs-1");
        let controller = controller();

        let err = controller
            .mutate(&remote, "kvs-1", &CancellationToken::new(), |_: &Vec<String>| {
                Err::<Vec<String>, _>(io::Error::new(io::ErrorKind::InvalidInput, "key too large"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ConcurrencyError::Build { .. }));
        assert_eq!(remote.writes.load(Ordering::SeqCst), 0);
        assert!(controller.locks().is_empty());
    }

    #[tokio::test]
    async fn test_read_error_propagates() {
        let remote = MemoryRemote::default();
        let err = controller()
            .mutate(&remote, "missing", &CancellationToken::new(), append("a".to_string()))
            .await
            .unwrap_err();

        match err {
            ConcurrencyError::Read { identity, source } => {
                assert_eq!(identity, "missing");
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected Read, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_canceled_while_waiting_for_lock() {
        let remote = MemoryRemote::with_doc("kvs-1");
        let controller = controller();
        let held = controller.locks().acquire("kvs-1").await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = controller
            .mutate(&remote, "kvs-1", &cancel, append("a".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, ConcurrencyError::Lock(LockError::Canceled { .. })));
        assert_eq!(remote.snapshot("kvs-1").1, 0);
        drop(held);
    }

    #[tokio::test]
    async fn test_with_lock_serializes_critical_sections() {
        let controller = controller();
        let counter = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let section = || {
            let counter = Arc::clone(&counter);
            let overlap = Arc::clone(&overlap);
            async move {
                let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
                overlap.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }
        };

        let (a, b, c) = tokio::join!(
            controller.with_lock("kvs-1", &cancel, section),
            controller.with_lock("kvs-1", &cancel, section),
            controller.with_lock("kvs-1", &cancel, section),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        assert_eq!(overlap.load(Ordering::SeqCst), 1);
        assert!(controller.locks().is_empty());
    }
}
