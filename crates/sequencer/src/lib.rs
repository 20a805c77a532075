//! Strictly serialized transaction submission with account-nonce tracking.
//!
//! All state-changing calls from the wallet go through one queue with one
//! consumer, so nonces are assigned without gaps or collisions despite
//! asynchronous confirmation. The worker holds the single source of truth
//! for the next nonce: fetched from the chain only when unknown,
//! incremented by exactly one on a confirmed success, and reset to
//! unknown on any failure. A failure may be a genuine revert (nonce
//! consumed) or a nonce collision (nonce not consumed); the worker cannot
//! tell them apart without another round trip, so it always forces a
//! refetch before the next submission.

use common::traits::IsChainClient;
use common::types::Address;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

const TASK_QUEUE_DEPTH: usize = 64;

type TaskFuture = Pin<Box<dyn Future<Output = bool> + Send>>;
type TaskFn = Box<dyn FnOnce(u64) -> TaskFuture + Send>;

struct QueuedTask {
    description: String,
    run: TaskFn,
    done: oneshot::Sender<bool>,
}

/// Cloneable handle for enqueueing submission tasks.
///
/// Dropping every handle closes the queue and lets the worker exit once
/// the remaining tasks have drained.
#[derive(Clone)]
pub struct Sequencer {
    task_tx: mpsc::Sender<QueuedTask>,
    nonce: Arc<Mutex<Option<u64>>>,
}

impl Sequencer {
    /// Creates the handle plus the worker that owns the queue. The worker
    /// must be spawned for submitted tasks to make progress.
    pub fn new(client: Arc<dyn IsChainClient>, wallet: Address) -> (Sequencer, SequencerWorker) {
        let (task_tx, task_rx) = mpsc::channel(TASK_QUEUE_DEPTH);
        let nonce = Arc::new(Mutex::new(None));
        let handle = Sequencer {
            task_tx,
            nonce: Arc::clone(&nonce),
        };
        let worker = SequencerWorker {
            client,
            wallet,
            nonce,
            task_rx,
        };
        (handle, worker)
    }

    /// Enqueues a submission task and waits for its terminal outcome.
    ///
    /// The task receives the nonce it must use and performs its own
    /// submit-plus-confirmation, reporting success as `true`. Tasks run
    /// strictly one at a time in enqueue order; this call resolves only
    /// after every earlier task has reached a terminal state and this one
    /// has too. Failures are reported as `false`, never as errors, and
    /// are never retried here.
    pub async fn submit<F, Fut>(&self, description: impl Into<String>, task: F) -> bool
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let description = description.into();
        let (done_tx, done_rx) = oneshot::channel();
        let queued = QueuedTask {
            description: description.clone(),
            run: Box::new(move |nonce| Box::pin(task(nonce))),
            done: done_tx,
        };
        if self.task_tx.send(queued).await.is_err() {
            log::error!("sequencer queue closed, dropping task \"{}\"", description);
            return false;
        }
        // A dropped reply means the worker is gone; treat as failure.
        done_rx.await.unwrap_or(false)
    }

    /// Forgets the cached nonce so the next task refetches it from the
    /// chain. Used by executors that positively classified a nonce error.
    pub async fn invalidate_nonce(&self) {
        *self.nonce.lock().await = None;
    }

    /// The locally tracked next nonce, if known. `None` until the first
    /// task runs or after any failure.
    pub async fn tracked_nonce(&self) -> Option<u64> {
        *self.nonce.lock().await
    }
}

/// Single consumer of the task queue. Owns the nonce state machine.
pub struct SequencerWorker {
    client: Arc<dyn IsChainClient>,
    wallet: Address,
    nonce: Arc<Mutex<Option<u64>>>,
    task_rx: mpsc::Receiver<QueuedTask>,
}

impl SequencerWorker {
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        while let Some(task) = self.task_rx.recv().await {
            let outcome = self.process(task.run, &task.description).await;
            // The submitter may have given up; the outcome is still final.
            let _ = task.done.send(outcome);
        }
        log::debug!("sequencer queue closed, worker exiting");
    }

    /// Runs one task through its full lifecycle. Exactly one task is ever
    /// in flight: the next `recv` happens only after this returns.
    async fn process(&self, run: TaskFn, description: &str) -> bool {
        log::info!("processing: {}", description);

        let nonce = {
            let mut slot = self.nonce.lock().await;
            match *slot {
                Some(nonce) => nonce,
                None => match self.client.pending_nonce(&self.wallet).await {
                    Ok(nonce) => {
                        log::info!("fetched account nonce: {}", nonce);
                        *slot = Some(nonce);
                        nonce
                    }
                    Err(e) => {
                        log::error!("nonce fetch failed for \"{}\": {}", description, e);
                        return false;
                    }
                },
            }
        };

        let success = run(nonce).await;

        let mut slot = self.nonce.lock().await;
        if success {
            *slot = Some(nonce + 1);
        } else {
            log::warn!(
                "task \"{}\" failed, nonce will be refetched for the next task",
                description
            );
            *slot = None;
        }
        success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::MockChainClient;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn wallet() -> Address {
        Address::from("0xWALLET")
    }

    fn setup() -> (Arc<MockChainClient>, Sequencer, JoinHandle<()>) {
        let client = Arc::new(MockChainClient::new());
        let (sequencer, worker) =
            Sequencer::new(Arc::clone(&client) as Arc<dyn IsChainClient>, wallet());
        let handle = worker.spawn();
        (client, sequencer, handle)
    }

    #[tokio::test]
    async fn test_nonce_monotonic_across_successes() {
        let (client, sequencer, worker) = setup();
        client.set_default_nonce(7);

        let used = Arc::new(std::sync::Mutex::new(Vec::new()));
        for _ in 0..3 {
            let used = Arc::clone(&used);
            let ok = sequencer
                .submit("noop", move |nonce| async move {
                    used.lock().unwrap().push(nonce);
                    true
                })
                .await;
            assert!(ok);
        }

        assert_eq!(*used.lock().unwrap(), vec![7, 8, 9]);
        // One fetch at the start, then local increments only.
        assert_eq!(client.nonce_fetches(), 1);
        assert_eq!(sequencer.tracked_nonce().await, Some(10));

        drop(sequencer);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_nonce_reset_and_refetch_after_failure() {
        let (client, sequencer, worker) = setup();
        client.push_nonce_fetch(5);
        client.push_nonce_fetch(42);

        let used = Arc::new(std::sync::Mutex::new(Vec::new()));

        let u = Arc::clone(&used);
        let ok = sequencer
            .submit("failing", move |nonce| async move {
                u.lock().unwrap().push(nonce);
                false
            })
            .await;
        assert!(!ok);
        assert_eq!(sequencer.tracked_nonce().await, None);

        let u = Arc::clone(&used);
        let ok = sequencer
            .submit("after failure", move |nonce| async move {
                u.lock().unwrap().push(nonce);
                true
            })
            .await;
        assert!(ok);

        // The second task used the freshly fetched value, not 5 or 6.
        assert_eq!(*used.lock().unwrap(), vec![5, 42]);
        assert_eq!(client.nonce_fetches(), 2);

        drop(sequencer);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_tasks_never_overlap() {
        let (_client, sequencer, worker) = setup();

        let in_flight = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));

        let mut joins = Vec::new();
        for i in 0..4 {
            let sequencer = sequencer.clone();
            let in_flight = Arc::clone(&in_flight);
            let overlapped = Arc::clone(&overlapped);
            joins.push(tokio::spawn(async move {
                sequencer
                    .submit(format!("task {}", i), move |_nonce| async move {
                        if in_flight.swap(true, Ordering::SeqCst) {
                            overlapped.store(true, Ordering::SeqCst);
                        }
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        in_flight.store(false, Ordering::SeqCst);
                        true
                    })
                    .await
            }));
        }
        for join in joins {
            assert!(join.await.unwrap());
        }
        assert!(!overlapped.load(Ordering::SeqCst));

        drop(sequencer);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let (_client, sequencer, worker) = setup();

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut joins = Vec::new();
        for i in 0..5u32 {
            let sequencer = sequencer.clone();
            let order = Arc::clone(&order);
            // submit() only returns once the task ran, so enqueue from the
            // same task to fix the enqueue order, then await all replies.
            joins.push(tokio::spawn(async move {
                sequencer
                    .submit(format!("ordered {}", i), move |_| async move {
                        order.lock().unwrap().push(i);
                        true
                    })
                    .await
            }));
            // Yield so the spawned submit lands in the queue before the next.
            tokio::task::yield_now().await;
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        for join in joins {
            assert!(join.await.unwrap());
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);

        drop(sequencer);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let (client, sequencer, worker) = setup();
        client.push_nonce_fetch(5);
        client.push_nonce_fetch(30);

        assert!(sequencer.submit("first", |_| async { true }).await);
        assert_eq!(sequencer.tracked_nonce().await, Some(6));

        sequencer.invalidate_nonce().await;
        assert_eq!(sequencer.tracked_nonce().await, None);

        let used = Arc::new(std::sync::Mutex::new(Vec::new()));
        let u = Arc::clone(&used);
        assert!(
            sequencer
                .submit("second", move |nonce| async move {
                    u.lock().unwrap().push(nonce);
                    true
                })
                .await
        );
        assert_eq!(*used.lock().unwrap(), vec![30]);

        drop(sequencer);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_nonce_fetch_failure_fails_task() {
        let client = Arc::new(MockChainClient::new());
        // No scripting needed: make pending_nonce fail by closing over a
        // client that errors. MockChainClient cannot fail fetches, so this
        // test drives the path through a thin failing wrapper.
        struct FailingNonce(Arc<MockChainClient>);

        #[async_trait::async_trait]
        impl IsChainClient for FailingNonce {
            async fn native_balance(
                &self,
                owner: &Address,
            ) -> Result<common::Amount, common::ChainError> {
                self.0.native_balance(owner).await
            }
            async fn token_balance(
                &self,
                token: &Address,
                owner: &Address,
            ) -> Result<common::Amount, common::ChainError> {
                self.0.token_balance(token, owner).await
            }
            async fn allowance(
                &self,
                token: &Address,
                owner: &Address,
                spender: &Address,
            ) -> Result<common::Amount, common::ChainError> {
                self.0.allowance(token, owner, spender).await
            }
            async fn pending_nonce(&self, _owner: &Address) -> Result<u64, common::ChainError> {
                Err(common::ChainError::Rpc("nonce fetch down".to_string()))
            }
            async fn fee_estimate(&self) -> Result<common::FeeEstimate, common::ChainError> {
                self.0.fee_estimate().await
            }
            async fn submit(
                &self,
                call: &common::CallSpec,
                nonce: u64,
                gas_limit: u64,
                fees: &common::FeeParams,
            ) -> Result<common::TxHandle, common::ChainError> {
                self.0.submit(call, nonce, gas_limit, fees).await
            }
            async fn await_confirmation(
                &self,
                handle: &common::TxHandle,
            ) -> Result<common::Receipt, common::ChainError> {
                self.0.await_confirmation(handle).await
            }
        }

        let (sequencer, worker) = Sequencer::new(Arc::new(FailingNonce(client)), wallet());
        let worker = worker.spawn();

        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        let ok = sequencer
            .submit("unreachable", move |_| async move {
                r.store(true, Ordering::SeqCst);
                true
            })
            .await;
        assert!(!ok);
        // The task body never ran: no nonce, no submission.
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(sequencer.tracked_nonce().await, None);

        drop(sequencer);
        worker.await.unwrap();
    }
}
