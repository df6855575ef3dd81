//! 手動ログインの待ち合わせ
//!
//! 認証・年齢確認はスクリプトでは突破できないため、オペレーターの確認を待つ。
//! タイムアウトは設けない。

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::info;

use crate::error::ScraperError;
use crate::traits::AuthGate;

/// 標準入力で Enter を待つ
#[derive(Debug, Default)]
pub struct ConsoleAuthGate;

impl ConsoleAuthGate {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuthGate for ConsoleAuthGate {
    async fn wait_ready(&mut self, session_ids: &[usize]) -> Result<(), ScraperError> {
        let line = "=".repeat(60);
        println!("\n{}", line);
        println!("Complete the following in every browser window:");
        println!("{}", line);
        println!("{} browser windows are open", session_ids.len());
        println!();
        println!("  1. Log in to your Books.com.tw account");
        println!("  2. (for adult titles) open any restricted book once");
        println!("  3. Confirm the age check so restricted pages load normally");
        println!();
        println!("Window titles show 'browser #1', 'browser #2', ... to tell them apart");
        println!("{}", line);
        println!(
            "\nPress Enter after logging in to all {} browsers...",
            session_ids.len()
        );

        // tokio::io::stdin はランタイム終了を妨げるため専用スレッドで読む
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = tx.send(std::io::stdin().read_line(&mut buf).map(|n| n > 0));
        });

        match rx.await {
            Ok(Ok(true)) => {
                info!("Operator confirmed login");
                Ok(())
            }
            Ok(Ok(false)) => Err(ScraperError::AuthAborted("stdin closed".into())),
            Ok(Err(e)) => Err(ScraperError::AuthAborted(e.to_string())),
            Err(_) => Err(ScraperError::AuthAborted("input thread exited".into())),
        }
    }
}

/// テストや組み込み用：`AuthSignal::confirm()` で解放される
#[derive(Debug)]
pub struct SignalAuthGate {
    rx: Option<oneshot::Receiver<()>>,
}

#[derive(Debug)]
pub struct AuthSignal {
    tx: oneshot::Sender<()>,
}

impl AuthSignal {
    pub fn confirm(self) {
        let _ = self.tx.send(());
    }
}

/// 確認シグナルとゲートの組を作る
pub fn auth_channel() -> (AuthSignal, SignalAuthGate) {
    let (tx, rx) = oneshot::channel();
    (AuthSignal { tx }, SignalAuthGate { rx: Some(rx) })
}

impl SignalAuthGate {
    /// 最初から確認済みのゲート
    pub fn confirmed() -> Self {
        let (signal, gate) = auth_channel();
        signal.confirm();
        gate
    }
}

#[async_trait]
impl AuthGate for SignalAuthGate {
    async fn wait_ready(&mut self, _session_ids: &[usize]) -> Result<(), ScraperError> {
        let rx = self
            .rx
            .take()
            .ok_or_else(|| ScraperError::AuthAborted("gate already used".into()))?;
        rx.await
            .map_err(|_| ScraperError::AuthAborted("signal dropped".into()))
    }
}
