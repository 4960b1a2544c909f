use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::reporting::domain::directory_client::{DirectoryClient, DirectoryError};

/// A directory update waiting to be delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectoryRequest {
    RegisterIdentity { name: String },
    SetEquipped { name: String, equipped: bool },
}

#[derive(Clone, Copy, Debug)]
pub struct DispatchPolicy {
    /// Pending requests beyond this are dropped.
    pub capacity: usize,
    /// Delivery attempts per request, at least one.
    pub attempts: u32,
    pub retry_delay: Duration,
    /// Longest `shutdown` waits for the queue to drain.
    pub flush_timeout: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            capacity: 256,
            attempts: 3,
            retry_delay: Duration::from_millis(200),
            flush_timeout: Duration::from_secs(5),
        }
    }
}

/// Delivers directory requests from a single background worker.
///
/// `dispatch` never blocks: when the queue is full the request is dropped
/// with a warning. One worker keeps requests for the same identity in the
/// order they were dispatched.
pub struct DirectoryDispatcher {
    sender: Option<Sender<DirectoryRequest>>,
    worker: Option<JoinHandle<()>>,
    drained: Receiver<()>,
    abandon: Arc<AtomicBool>,
    flush_timeout: Duration,
}

impl DirectoryDispatcher {
    pub fn spawn(client: Arc<dyn DirectoryClient>, policy: DispatchPolicy) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded::<DirectoryRequest>(policy.capacity.max(1));
        let (drained_tx, drained) = crossbeam_channel::bounded::<()>(1);
        let abandon = Arc::new(AtomicBool::new(false));
        let worker_abandon = Arc::clone(&abandon);
        let worker = thread::Builder::new()
            .name("directory".into())
            .spawn(move || {
                let mut dropped = 0usize;
                for request in receiver.iter() {
                    if worker_abandon.load(Ordering::Relaxed) {
                        dropped += 1;
                        continue;
                    }
                    deliver(client.as_ref(), &request, &policy, &worker_abandon);
                }
                if dropped > 0 {
                    log::warn!("Dropped {dropped} directory updates at shutdown");
                }
                let _ = drained_tx.send(());
                log::debug!("Directory worker stopped");
            });

        let flush_timeout = policy.flush_timeout;
        match worker {
            Ok(handle) => Self {
                sender: Some(sender),
                worker: Some(handle),
                drained,
                abandon,
                flush_timeout,
            },
            Err(e) => {
                log::error!("Failed to start directory worker, updates will be dropped: {e}");
                Self {
                    sender: None,
                    worker: None,
                    drained,
                    abandon,
                    flush_timeout,
                }
            }
        }
    }

    /// Queue a request. Returns `false` if it was dropped.
    pub fn dispatch(&self, request: DirectoryRequest) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        match sender.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(request)) => {
                log::warn!("Directory queue full, dropping {request:?}");
                false
            }
            Err(TrySendError::Disconnected(request)) => {
                log::warn!("Directory worker gone, dropping {request:?}");
                false
            }
        }
    }

    /// Stop accepting requests and wait for queued ones to be delivered.
    ///
    /// Waits at most `flush_timeout`. After that, requests still queued are
    /// dropped and the worker is left to finish its current call alone.
    pub fn shutdown(&mut self) {
        self.sender.take();
        let Some(worker) = self.worker.take() else {
            return;
        };
        match self.drained.recv_timeout(self.flush_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.join().is_err() {
                    log::error!("Directory worker panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                self.abandon.store(true, Ordering::Relaxed);
                log::warn!(
                    "Directory updates not flushed within {:?}, abandoning the rest",
                    self.flush_timeout
                );
            }
        }
    }
}

impl Drop for DirectoryDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn send(client: &dyn DirectoryClient, request: &DirectoryRequest) -> Result<(), DirectoryError> {
    match request {
        DirectoryRequest::RegisterIdentity { name } => client.register_identity(name),
        DirectoryRequest::SetEquipped { name, equipped } => client.set_equipped(name, *equipped),
    }
}

fn deliver(
    client: &dyn DirectoryClient,
    request: &DirectoryRequest,
    policy: &DispatchPolicy,
    abandon: &AtomicBool,
) {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match send(client, request) {
            Ok(()) => {
                log::debug!("Delivered {request:?}");
                return;
            }
            Err(e) if attempt < attempts && !abandon.load(Ordering::Relaxed) => {
                log::debug!("Directory attempt {attempt}/{attempts} failed: {e}");
                thread::sleep(policy.retry_delay);
            }
            Err(e) => log::warn!("Giving up on {request:?} after {attempts} attempts: {e}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Records every call and fails the first `failures` of them.
    #[derive(Default)]
    pub(crate) struct RecordingClient {
        pub calls: Mutex<Vec<DirectoryRequest>>,
        pub failures: Mutex<usize>,
    }

    impl RecordingClient {
        pub fn failing(failures: usize) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failures: Mutex::new(failures),
            }
        }

        pub fn calls(&self) -> Vec<DirectoryRequest> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, request: DirectoryRequest) -> Result<(), DirectoryError> {
            self.calls.lock().unwrap().push(request);
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(DirectoryError::Status {
                    status: 503,
                    url: "http://directory.test".into(),
                });
            }
            Ok(())
        }
    }

    impl DirectoryClient for RecordingClient {
        fn register_identity(&self, name: &str) -> Result<(), DirectoryError> {
            self.record(DirectoryRequest::RegisterIdentity { name: name.into() })
        }

        fn set_equipped(&self, name: &str, equipped: bool) -> Result<(), DirectoryError> {
            self.record(DirectoryRequest::SetEquipped {
                name: name.into(),
                equipped,
            })
        }
    }

    /// Blocks each call until the test releases it.
    struct GatedClient {
        gate: Receiver<()>,
    }

    impl DirectoryClient for GatedClient {
        fn register_identity(&self, _name: &str) -> Result<(), DirectoryError> {
            let _ = self.gate.recv();
            Ok(())
        }

        fn set_equipped(&self, _name: &str, _equipped: bool) -> Result<(), DirectoryError> {
            let _ = self.gate.recv();
            Ok(())
        }
    }

    fn fast_policy(attempts: u32) -> DispatchPolicy {
        DispatchPolicy {
            capacity: 16,
            attempts,
            retry_delay: Duration::from_millis(1),
            flush_timeout: Duration::from_secs(5),
        }
    }

    fn register(name: &str) -> DirectoryRequest {
        DirectoryRequest::RegisterIdentity { name: name.into() }
    }

    fn equipped(name: &str, equipped: bool) -> DirectoryRequest {
        DirectoryRequest::SetEquipped {
            name: name.into(),
            equipped,
        }
    }

    #[test]
    fn test_requests_delivered_in_order() {
        let client = Arc::new(RecordingClient::default());
        let mut dispatcher = DirectoryDispatcher::spawn(client.clone(), fast_policy(1));

        let requests = vec![
            register("bob"),
            equipped("bob", true),
            equipped("bob", false),
            register("alice"),
        ];
        for r in &requests {
            assert!(dispatcher.dispatch(r.clone()));
        }
        dispatcher.shutdown();

        assert_eq!(client.calls(), requests);
    }

    #[test]
    fn test_failed_request_is_retried() {
        let client = Arc::new(RecordingClient::failing(2));
        let mut dispatcher = DirectoryDispatcher::spawn(client.clone(), fast_policy(3));

        dispatcher.dispatch(register("bob"));
        dispatcher.shutdown();

        assert_eq!(client.calls(), vec![register("bob"); 3]);
    }

    #[test]
    fn test_retries_are_bounded() {
        let client = Arc::new(RecordingClient::failing(usize::MAX));
        let mut dispatcher = DirectoryDispatcher::spawn(client.clone(), fast_policy(2));

        dispatcher.dispatch(register("bob"));
        dispatcher.dispatch(equipped("bob", true));
        dispatcher.shutdown();

        assert_eq!(
            client.calls(),
            vec![
                register("bob"),
                register("bob"),
                equipped("bob", true),
                equipped("bob", true),
            ]
        );
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (release, gate) = crossbeam_channel::unbounded();
        let client = Arc::new(GatedClient { gate });
        let policy = DispatchPolicy {
            capacity: 1,
            ..fast_policy(1)
        };
        let mut dispatcher = DirectoryDispatcher::spawn(client, policy);

        // The worker may or may not have taken the first request yet, so at
        // most two fit; the rest must be refused immediately.
        let accepted = (0..10)
            .filter(|i| dispatcher.dispatch(register(&format!("p{i}"))))
            .count();
        assert!((1..=2).contains(&accepted));

        for _ in 0..accepted {
            release.send(()).unwrap();
        }
        dispatcher.shutdown();
    }

    #[test]
    fn test_dispatch_after_shutdown_is_dropped() {
        let client = Arc::new(RecordingClient::default());
        let mut dispatcher = DirectoryDispatcher::spawn(client.clone(), fast_policy(1));
        dispatcher.shutdown();

        assert!(!dispatcher.dispatch(register("bob")));
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_shutdown_gives_up_on_stuck_directory() {
        let (release, gate) = crossbeam_channel::unbounded();
        let client = Arc::new(GatedClient { gate });
        let policy = DispatchPolicy {
            flush_timeout: Duration::from_millis(50),
            ..fast_policy(3)
        };
        let mut dispatcher = DirectoryDispatcher::spawn(client, policy);
        for i in 0..8 {
            dispatcher.dispatch(register(&format!("p{i}")));
        }

        let start = Instant::now();
        dispatcher.shutdown();

        assert!(start.elapsed() < Duration::from_secs(2));
        drop(release);
    }

    #[test]
    fn test_updates_left_after_flush_timeout_are_dropped() {
        let (release, gate) = crossbeam_channel::unbounded();
        let client = Arc::new(GatedClient { gate });
        let policy = DispatchPolicy {
            flush_timeout: Duration::from_millis(20),
            ..fast_policy(1)
        };
        let mut dispatcher = DirectoryDispatcher::spawn(client, policy);
        for i in 0..8 {
            dispatcher.dispatch(register(&format!("p{i}")));
        }
        dispatcher.shutdown();

        // Every queued request but the one in flight is skipped, so a single
        // release lets the worker finish.
        let _ = release.send(());
        let worker_done = dispatcher.drained.recv_timeout(Duration::from_secs(2));
        assert!(worker_done.is_ok());
    }
}
