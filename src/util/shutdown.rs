// ref: https://tokio.rs/tokio/topics/shutdown
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Keeps a run alive. The run is cancelled once every clone is dropped.
#[derive(Debug, Clone)]
pub struct ShutdownLock {
    lock_sender: UnboundedSender<()>,
}

impl ShutdownLock {
    pub fn new(sender: UnboundedSender<()>) -> ShutdownLock {
        ShutdownLock {
            lock_sender: sender,
        }
    }
    pub fn unlock(self) {
        drop(self.lock_sender)
    }

    /// Release this lock when the process receives Ctrl-C.
    pub fn release_on_ctrl_c(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("cannot listen for ctrl-c: {:?}", e);
                // keep the lock so the run is not cancelled by a listener failure
                std::future::pending::<()>().await;
            }
            tracing::warn!("ctrl-c received, cancelling analysis");
            self.unlock();
        })
    }
}

/// Resolves once every `ShutdownLock` is gone.
#[derive(Debug)]
pub struct ShutdownWait {
    wait_receiver: UnboundedReceiver<()>,
}

impl ShutdownWait {
    pub fn new(wait_receiver: UnboundedReceiver<()>) -> ShutdownWait {
        ShutdownWait { wait_receiver }
    }
    pub async fn wait(&mut self) {
        // locks never send, so this only returns when all senders are dropped
        while self.wait_receiver.recv().await.is_some() {}
        tracing::debug!("shutdown wait released");
    }
}

pub fn create_lock_and_wait() -> (ShutdownLock, ShutdownWait) {
    let (send, recv) = mpsc::unbounded_channel();
    (ShutdownLock::new(send), ShutdownWait::new(recv))
}
