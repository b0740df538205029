use crate::adapters::ssh::{connect_password, SshHandle};
use crate::domain::model::JumpHost;
use crate::utils::error::Result;
use russh::Disconnect;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// 經由 jump host 的本機 port forward（127.0.0.1:<OS 分配的 port>）
///
/// 由開啟它的 session 或呼叫持有；`close()` 或 drop 都會停止轉送並中斷 SSH 連線。
pub struct SshTunnel {
    local_port: u16,
    destination: String,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SshTunnel {
    pub async fn open(
        jump: &JumpHost,
        dst_host: &str,
        dst_port: u16,
        timeout: Duration,
    ) -> Result<Self> {
        tracing::info!(
            "🚇 Opening tunnel to {}:{} via {}@{}:{}",
            dst_host,
            dst_port,
            jump.credentials.username,
            jump.host,
            jump.port
        );
        let handle =
            Arc::new(connect_password(&jump.host, jump.port, &jump.credentials, timeout).await?);

        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let local_port = listener.local_addr()?.port();
        let (shutdown, stop_rx) = watch::channel(false);

        let task = tokio::spawn(accept_loop(
            listener,
            handle,
            dst_host.to_string(),
            dst_port,
            stop_rx,
        ));

        let destination = format!("{}:{}", dst_host, dst_port);
        tracing::debug!("🚇 Tunnel ready: 127.0.0.1:{} -> {}", local_port, destination);
        Ok(Self {
            local_port,
            destination,
            shutdown,
            task: Some(task),
        })
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub async fn close(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
                task.abort();
            }
        }
        tracing::debug!("🚇 Tunnel to {} closed", self.destination);
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn accept_loop(
    listener: TcpListener,
    handle: Arc<SshHandle>,
    dst_host: String,
    dst_port: u16,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    let dst = dst_host.clone();
                    connections.spawn(forward(handle.clone(), socket, peer, dst, dst_port));
                }
                Err(e) => {
                    tracing::warn!("🔶 Tunnel accept failed: {}", e);
                    break;
                }
            },
        }
    }

    connections.shutdown().await;
    if let Err(e) = handle.disconnect(Disconnect::ByApplication, "", "en").await {
        tracing::debug!("ssh disconnect: {}", e);
    }
}

async fn forward(
    handle: Arc<SshHandle>,
    mut socket: TcpStream,
    peer: SocketAddr,
    dst_host: String,
    dst_port: u16,
) {
    let channel = match handle
        .channel_open_direct_tcpip(
            dst_host.as_str(),
            u32::from(dst_port),
            peer.ip().to_string(),
            u32::from(peer.port()),
        )
        .await
    {
        Ok(channel) => channel,
        Err(e) => {
            tracing::warn!("🔶 direct-tcpip to {}:{} refused: {}", dst_host, dst_port, e);
            return;
        }
    };

    let mut stream = channel.into_stream();
    if let Err(e) = tokio::io::copy_bidirectional(&mut socket, &mut stream).await {
        tracing::debug!("tunnel connection from {} ended: {}", peer, e);
    }
}
