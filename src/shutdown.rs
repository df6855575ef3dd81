//! Ctrl-C による協調的な停止

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal::ctrl_c;
use tokio::sync::Notify;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            info!("Shutdown requested, finishing in-flight items...");
            self.notify.notify_waiters();
        }
    }

    /// 既に停止済みなら即座に戻る
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_shutdown() {
                return;
            }
            notified.await;
        }
    }

    /// Ctrl-C を監視するタスクを起動
    pub fn listen_for_ctrl_c(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            match ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl-C");
                    shutdown.trigger();
                }
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
        });
    }
}
