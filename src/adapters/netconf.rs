use crate::adapters::ssh::{connect_password, SshHandle};
use crate::adapters::tunnel::SshTunnel;
use crate::domain::model::Credentials;
use crate::domain::ports::{ConnectTarget, Datastore, NetconfConnector, NetconfSession};
use crate::utils::error::{NovaError, Result};
use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg, Disconnect};
use std::time::Duration;

pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";
pub const BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";
const NETCONF_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";
const MONITORING_NS: &str = "urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring";
const END_OF_MESSAGE: &[u8] = b"]]>]]>";

/// NETCONF over SSH（RFC 6242）
pub struct SshNetconfConnector {
    connect_timeout: Duration,
    rpc_timeout: Duration,
}

impl SshNetconfConnector {
    pub fn new(connect_timeout: Duration, rpc_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            rpc_timeout,
        }
    }
}

#[async_trait]
impl NetconfConnector for SshNetconfConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn NetconfSession>> {
        let tunnel = match &target.via {
            Some(jump) => {
                Some(SshTunnel::open(jump, &target.host, target.port, self.connect_timeout).await?)
            }
            None => None,
        };
        let (host, port) = match &tunnel {
            Some(tunnel) => ("127.0.0.1".to_string(), tunnel.local_port()),
            None => (target.host.clone(), target.port),
        };
        tracing::info!(
            "🔌 NETCONF connect to {} ({}:{}{})",
            target.host,
            host,
            port,
            if tunnel.is_some() { ", tunneled" } else { "" }
        );

        let credentials = Credentials {
            username: target.username.clone(),
            password: target.password.clone(),
        };
        let handle = connect_password(&host, port, &credentials, self.connect_timeout).await?;
        let channel = handle.channel_open_session().await?;
        channel.request_subsystem(true, "netconf").await?;

        let mut session = SshNetconfSession {
            peer: target.host.clone(),
            handle,
            channel,
            tunnel,
            buffer: Vec::new(),
            chunked: false,
            capabilities: Vec::new(),
            message_id: 0,
            rpc_timeout: self.rpc_timeout,
            closed: false,
        };

        tokio::time::timeout(self.connect_timeout, session.exchange_hello())
            .await
            .map_err(|_| {
                NovaError::timeout(
                    format!("NETCONF hello with {}", target.host),
                    self.connect_timeout,
                )
            })??;
        Ok(Box::new(session))
    }
}

pub struct SshNetconfSession {
    peer: String,
    handle: SshHandle,
    channel: Channel<Msg>,
    tunnel: Option<SshTunnel>,
    buffer: Vec<u8>,
    chunked: bool,
    capabilities: Vec<String>,
    message_id: u64,
    rpc_timeout: Duration,
    closed: bool,
}

impl SshNetconfSession {
    async fn exchange_hello(&mut self) -> Result<()> {
        let hello = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><hello xmlns="{}"><capabilities><capability>{}</capability><capability>{}</capability></capabilities></hello>"#,
            NETCONF_NS, BASE_1_0, BASE_1_1
        );
        self.send(&hello).await?;
        let reply = self.read_message().await?;
        self.capabilities = parse_hello_capabilities(&reply)?;
        self.chunked = self.capabilities.iter().any(|c| c == BASE_1_1);
        tracing::debug!(
            "🤝 {} hello: {} capabilities, framing={}",
            self.peer,
            self.capabilities.len(),
            if self.chunked { "chunked" } else { "end-of-message" }
        );
        Ok(())
    }

    async fn send(&mut self, body: &str) -> Result<()> {
        let frame = if self.chunked {
            encode_chunked(body)
        } else {
            let mut frame = body.as_bytes().to_vec();
            frame.extend_from_slice(END_OF_MESSAGE);
            frame
        };
        self.channel.data(frame.as_slice()).await?;
        Ok(())
    }

    async fn read_message(&mut self) -> Result<String> {
        loop {
            let extracted = if self.chunked {
                decode_chunked(&self.buffer)?
            } else {
                decode_end_of_message(&self.buffer)
            };
            if let Some((message, consumed)) = extracted {
                self.buffer.drain(..consumed);
                return Ok(message);
            }

            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => self.buffer.extend_from_slice(&data),
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return Err(NovaError::upstream(
                        None,
                        format!("NETCONF session to {} closed by peer", self.peer),
                    ))
                }
                Some(_) => {}
            }
        }
    }

    async fn rpc(&mut self, operation: &str, inner: &str) -> Result<String> {
        self.message_id += 1;
        let request = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><rpc message-id="{}" xmlns="{}">{}</rpc>"#,
            self.message_id, NETCONF_NS, inner
        );
        tracing::debug!("📤 {} {} ({} bytes)", self.peer, operation, request.len());

        let timeout = self.rpc_timeout;
        let peer = self.peer.clone();
        let reply = tokio::time::timeout(timeout, async {
            self.send(&request).await?;
            self.read_message().await
        })
        .await
        .map_err(|_| NovaError::timeout(format!("{} on {}", operation, peer), timeout))??;

        check_rpc_reply(&reply)?;
        Ok(reply)
    }
}

#[async_trait]
impl NetconfSession for SshNetconfSession {
    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn edit_config(&mut self, target: Datastore, config: &str) -> Result<()> {
        let body = format!(
            "<edit-config><target><{}/></target>{}</edit-config>",
            target.as_str(),
            wrap_config(config)
        );
        self.rpc("edit-config", &body).await.map(|_| ())
    }

    async fn commit(&mut self) -> Result<()> {
        self.rpc("commit", "<commit/>").await.map(|_| ())
    }

    async fn get_config(&mut self, source: Datastore, subtree_filter: &str) -> Result<String> {
        let filter = if subtree_filter.trim_start().starts_with("<filter") {
            subtree_filter.to_string()
        } else {
            format!(r#"<filter type="subtree">{}</filter>"#, subtree_filter)
        };
        let body = format!(
            "<get-config><source><{}/></source>{}</get-config>",
            source.as_str(),
            filter
        );
        self.rpc("get-config", &body).await
    }

    async fn get_schema(&mut self, identifier: &str) -> Result<String> {
        let body = format!(
            r#"<get-schema xmlns="{}"><identifier>{}</identifier><format>yang</format></get-schema>"#,
            MONITORING_NS, identifier
        );
        let reply = self.rpc("get-schema", &body).await?;
        Ok(reply_data_text(&reply).unwrap_or(reply))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let outcome = self.rpc("close-session", "<close-session/>").await.map(|_| ());
        let _ = self.channel.eof().await;
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!("ssh disconnect from {}: {}", self.peer, e);
        }
        if let Some(tunnel) = self.tunnel.take() {
            tunnel.close().await;
        }
        outcome
    }
}

/// `<config>` 外層不存在時補上
fn wrap_config(config: &str) -> String {
    if config.trim_start().starts_with("<config") {
        config.to_string()
    } else {
        format!("<config>{}</config>", config)
    }
}

fn encode_chunked(body: &str) -> Vec<u8> {
    let mut frame = format!("\n#{}\n", body.len()).into_bytes();
    frame.extend_from_slice(body.as_bytes());
    frame.extend_from_slice(b"\n##\n");
    frame
}

/// base:1.0 framing：回傳 (訊息, 消耗的位元組數)
pub fn decode_end_of_message(buffer: &[u8]) -> Option<(String, usize)> {
    let end = buffer
        .windows(END_OF_MESSAGE.len())
        .position(|window| window == END_OF_MESSAGE)?;
    let message = String::from_utf8_lossy(&buffer[..end]).trim().to_string();
    Some((message, end + END_OF_MESSAGE.len()))
}

/// base:1.1 chunked framing（RFC 6242 §4.2）；資料不完整時回傳 `None`
pub fn decode_chunked(buffer: &[u8]) -> Result<Option<(String, usize)>> {
    let mut pos = 0;
    let mut message = Vec::new();
    loop {
        if buffer.len() < pos + 3 {
            return Ok(None);
        }
        if &buffer[pos..pos + 2] != b"\n#" {
            return Err(NovaError::upstream(None, "malformed NETCONF chunk header"));
        }
        pos += 2;

        if buffer[pos] == b'#' {
            if buffer.len() < pos + 2 {
                return Ok(None);
            }
            if buffer[pos + 1] != b'\n' {
                return Err(NovaError::upstream(None, "malformed NETCONF end-of-chunks"));
            }
            let text = String::from_utf8_lossy(&message).into_owned();
            return Ok(Some((text, pos + 2)));
        }

        let Some(newline) = buffer[pos..].iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };
        let size: usize = std::str::from_utf8(&buffer[pos..pos + newline])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .filter(|size| *size > 0)
            .ok_or_else(|| NovaError::upstream(None, "invalid NETCONF chunk size"))?;
        pos += newline + 1;

        if buffer.len() < pos + size {
            return Ok(None);
        }
        message.extend_from_slice(&buffer[pos..pos + size]);
        pos += size;
    }
}

pub fn parse_hello_capabilities(hello: &str) -> Result<Vec<String>> {
    let doc = roxmltree::Document::parse(hello)?;
    Ok(doc
        .descendants()
        .filter(|n| n.has_tag_name("capability"))
        .filter_map(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}

/// `<rpc-error>`（severity=error）轉為 UpstreamProtocolError
pub fn check_rpc_reply(reply: &str) -> Result<()> {
    let doc = roxmltree::Document::parse(reply)?;
    let errors: Vec<String> = doc
        .descendants()
        .filter(|n| n.has_tag_name("rpc-error"))
        .filter(|err| {
            child_text(err, "error-severity")
                .map(|s| s != "warning")
                .unwrap_or(true)
        })
        .map(|err| {
            child_text(&err, "error-message")
                .or_else(|| child_text(&err, "error-tag"))
                .unwrap_or_else(|| "unspecified rpc-error".to_string())
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(NovaError::upstream(None, format!("rpc-error: {}", errors.join("; "))))
    }
}

fn child_text(node: &roxmltree::Node, name: &str) -> Option<String> {
    node.children()
        .find(|c| c.has_tag_name(name))
        .and_then(|c| c.text())
        .map(|t| t.trim().to_string())
}

fn reply_data_text(reply: &str) -> Option<String> {
    let doc = roxmltree::Document::parse(reply).ok()?;
    let data = doc.descendants().find(|n| n.has_tag_name("data"))?;
    let text: String = data
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    Some(text)
}
