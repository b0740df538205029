use crate::domain::model::NotificationMessage;
use crate::domain::ports::EventSource;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

const UNCLAIMED_CAPACITY: usize = 64;

struct Pending {
    token: u64,
    operation: String,
    tx: oneshot::Sender<NotificationMessage>,
}

impl Pending {
    /// 未標示 operation 的訊息視為屬於目前等待中的階段
    fn accepts(&self, message: &NotificationMessage) -> bool {
        message
            .operation
            .as_deref()
            .map_or(true, |op| op == self.operation)
    }
}

#[derive(Default)]
struct BridgeState {
    pending: HashMap<String, Pending>,
    unclaimed: VecDeque<NotificationMessage>,
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// 事件串流與等待者之間的橋接：(correlation id, operation) → one-shot
pub struct NotificationBridge {
    state: Arc<Mutex<BridgeState>>,
    next_token: AtomicU64,
    pacing: Duration,
    stop_timeout: Duration,
    worker: Mutex<Option<Worker>>,
}

/// 單一 correlation id 的等待憑證；drop 時自動取消登記
pub struct NotificationWaiter {
    correlation_id: String,
    token: u64,
    receiver: Option<oneshot::Receiver<NotificationMessage>>,
    state: Arc<Mutex<BridgeState>>,
}

fn lock(state: &Mutex<BridgeState>) -> MutexGuard<'_, BridgeState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl NotificationBridge {
    pub fn new(pacing: Duration, stop_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(BridgeState::default())),
            next_token: AtomicU64::new(1),
            pacing,
            stop_timeout,
            worker: Mutex::new(None),
        }
    }

    /// 在送出指令之前登記；若同一 operation 的訊息已先到達則直接完成
    ///
    /// 緩衝區中同 id 但未標示 operation 的訊息無法判斷屬於哪個階段，登記時丟棄。
    pub fn expect(&self, correlation_id: &str, operation: &str) -> NotificationWaiter {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let mut state = lock(&self.state);

        let before = state.unclaimed.len();
        state.unclaimed.retain(|m| {
            m.correlation_id.as_deref() != Some(correlation_id) || m.operation.is_some()
        });
        if state.unclaimed.len() < before {
            tracing::debug!(
                "🧹 Discarded {} stale notification(s) for {}",
                before - state.unclaimed.len(),
                correlation_id
            );
        }

        let early = state
            .unclaimed
            .iter()
            .position(|m| {
                m.correlation_id.as_deref() == Some(correlation_id)
                    && m.operation.as_deref() == Some(operation)
            })
            .and_then(|idx| state.unclaimed.remove(idx));

        match early {
            Some(message) => {
                tracing::debug!(
                    "📨 {} notification for {} was already buffered",
                    operation,
                    correlation_id
                );
                let _ = tx.send(message);
            }
            None => {
                let pending = Pending {
                    token,
                    operation: operation.to_string(),
                    tx,
                };
                if state.pending.insert(correlation_id.to_string(), pending).is_some() {
                    tracing::warn!("🔶 Replaced an existing waiter for {}", correlation_id);
                }
            }
        }

        NotificationWaiter {
            correlation_id: correlation_id.to_string(),
            token,
            receiver: Some(rx),
            state: self.state.clone(),
        }
    }

    /// 交付一則訊息給對應的等待者
    pub fn deliver(&self, message: NotificationMessage) {
        deliver(&self.state, message);
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// 啟動背景消費迴圈；已在執行時回傳 `false`
    pub fn start(&self, mut source: Box<dyn EventSource>) -> bool {
        let mut worker = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if worker.is_some() {
            tracing::warn!("🔶 Notification bridge already running");
            return false;
        }

        let (shutdown, mut stop_rx) = watch::channel(false);
        let state = self.state.clone();
        let pacing = self.pacing;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    next = source.recv() => match next {
                        Some(bytes) => {
                            let message = NotificationMessage::decode(&bytes);
                            tracing::info!(
                                "📨 Notification received ({} bytes, id={:?})",
                                message.payload.len(),
                                message.correlation_id
                            );
                            deliver(&state, message);
                        }
                        None => {
                            tracing::warn!("🔶 Event stream closed");
                            break;
                        }
                    },
                }

                if !pacing.is_zero() {
                    tokio::select! {
                        _ = stop_rx.changed() => break,
                        _ = tokio::time::sleep(pacing) => {}
                    }
                }
            }
            tracing::debug!("Notification loop exited");
        });

        *worker = Some(Worker { shutdown, handle });
        tracing::info!("🚀 Notification bridge started");
        true
    }

    pub fn is_running(&self) -> bool {
        match self.worker.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|w| !w.handle.is_finished()),
            Err(poisoned) => poisoned
                .into_inner()
                .as_ref()
                .is_some_and(|w| !w.handle.is_finished()),
        }
    }

    /// 通知迴圈停止並在 stop_timeout 內等待結束，逾時則中止
    pub async fn stop(&self) {
        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(Worker { shutdown, mut handle }) = worker else {
            return;
        };

        let _ = shutdown.send(true);
        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(_) => tracing::info!("🛑 Notification bridge stopped"),
            Err(_) => {
                tracing::warn!(
                    "🔶 Notification loop did not stop within {:?}, aborting",
                    self.stop_timeout
                );
                handle.abort();
            }
        }
    }
}

impl Drop for NotificationBridge {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.worker.lock() {
            if let Some(worker) = guard.take() {
                let _ = worker.shutdown.send(true);
                worker.handle.abort();
            }
        }
    }
}

fn deliver(state: &Mutex<BridgeState>, message: NotificationMessage) {
    let mut state = lock(state);

    let waiter = match &message.correlation_id {
        Some(id) if state.pending.get(id).is_some_and(|p| p.accepts(&message)) => {
            state.pending.remove(id)
        }
        Some(_) => None,
        None if state.pending.len() == 1 => {
            let only = state.pending.keys().next().cloned();
            only.and_then(|id| state.pending.remove(&id))
        }
        None => {
            tracing::warn!(
                "🔶 Dropping uncorrelated notification ({} waiters pending)",
                state.pending.len()
            );
            return;
        }
    };

    let message = match waiter {
        Some(pending) => match pending.tx.send(message) {
            Ok(()) => return,
            Err(returned) => returned,
        },
        None => message,
    };

    if message.correlation_id.is_none() {
        return;
    }
    if state.unclaimed.len() >= UNCLAIMED_CAPACITY {
        state.unclaimed.pop_front();
    }
    state.unclaimed.push_back(message);
}

impl NotificationWaiter {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// 最多等待 `timeout`；逾時回傳 `None`
    pub async fn wait(mut self, timeout: Duration) -> Option<NotificationMessage> {
        let receiver = self.receiver.take()?;
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(message)) => Some(message),
            _ => None,
        }
    }
}

impl Drop for NotificationWaiter {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if state
            .pending
            .get(&self.correlation_id)
            .is_some_and(|pending| pending.token == self.token)
        {
            state.pending.remove(&self.correlation_id);
        }
    }
}
