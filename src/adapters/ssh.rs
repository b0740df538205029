use crate::domain::model::Credentials;
use crate::utils::error::{NovaError, Result};
use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;
use std::sync::Arc;
use std::time::Duration;

/// 接受任何 host key
pub struct AcceptAnyKey;

#[async_trait]
impl client::Handler for AcceptAnyKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

pub type SshHandle = client::Handle<AcceptAnyKey>;

/// 以帳號密碼建立 SSH 連線，整個握手與認證受 `timeout` 限制
pub async fn connect_password(
    host: &str,
    port: u16,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<SshHandle> {
    let config = Arc::new(client::Config::default());
    let operation = format!("ssh connect {}:{}", host, port);

    let handshake = async {
        let mut handle = client::connect(config, (host, port), AcceptAnyKey).await?;
        let authenticated = handle
            .authenticate_password(credentials.username.as_str(), credentials.password.as_str())
            .await?;
        Ok::<_, NovaError>((handle, authenticated))
    };

    let (handle, authenticated) = tokio::time::timeout(timeout, handshake)
        .await
        .map_err(|_| NovaError::timeout(operation, timeout))??;

    if !authenticated {
        return Err(NovaError::upstream(
            None,
            format!("ssh authentication failed for {}@{}", credentials.username, host),
        ));
    }
    tracing::debug!("🔐 SSH session established to {}:{}", host, port);
    Ok(handle)
}
