//! Chat connection management.
//!
//! This module provides the [`ChatSession`] which owns the line connection
//! to the chat server: logging in, requesting capabilities, joining the
//! channel, answering PINGs, and leaving again.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::{ChatConfig, Credentials};
use crate::error::{Error, Result};
use crate::moderation::IdentityResolver;
use crate::observability::{CHAT_CONNECTS, CHAT_LINES_SENT, CHAT_PONGS, CHAT_READ_ERRORS};
use crate::types::{ChannelContext, channel_context::normalize_channel};

/// Capabilities requested after login.
pub const CAPABILITIES: &str = "twitch.tv/membership twitch.tv/tags twitch.tv/commands";

/// Size of a single read from the server.
const READ_BUFFER_SIZE: usize = 2048;

/// Wait after PASS/NICK before checking for a login failure.
const LOGIN_SETTLE: Duration = Duration::from_secs(1);

/// Wait after the capability request.
const CAP_SETTLE: Duration = Duration::from_millis(500);

/// Wait after JOIN before looking for the acknowledgment.
const JOIN_SETTLE: Duration = Duration::from_secs(1);

/// Extra wait once the join is confirmed, before the first action.
const JOIN_STABILIZE: Duration = Duration::from_secs(2);

/// Read bound used right after each PRIVMSG to catch interleaved PINGs.
const SEND_POLL: Duration = Duration::from_millis(500);

/// Grace period between PART and closing the socket.
const PART_GRACE: Duration = Duration::from_millis(500);

/// Lifecycle of a [`ChatSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    Disconnected,
    /// Resolving ids and opening the socket.
    Connecting,
    /// PASS/NICK sent, waiting to learn whether they were accepted.
    Authenticating,
    /// JOIN sent.
    Joining,
    /// In the channel; messages can be sent.
    Joined,
}

/// What a line from the server means to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine<'a> {
    /// Liveness probe; the payload must be echoed back in a PONG.
    Ping(&'a str),
    /// The server refused the PASS/NICK pair.
    AuthenticationFailed,
    /// Any other NOTICE.
    Notice,
    /// A JOIN for the session's channel.
    Joined,
    /// Numeric 366, the end of the channel's member list.
    EndOfNames,
    /// Everything else.
    Other,
}

/// Classify one line received from the chat server.
///
/// `channel` is the channel login without `#`. Tags (`@...`) and the source
/// prefix (`:...`) are skipped before the command is looked at.
pub fn classify<'a>(line: &'a str, channel: &str) -> ServerLine<'a> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.contains("Login authentication failed") {
        return ServerLine::AuthenticationFailed;
    }

    let mut rest = line;
    if rest.starts_with('@') {
        rest = rest.split_once(' ').map_or("", |(_, r)| r);
    }
    if rest.starts_with(':') {
        rest = rest.split_once(' ').map_or("", |(_, r)| r);
    }
    let (command, params) = rest.split_once(' ').unwrap_or((rest, ""));

    match command {
        "PING" => ServerLine::Ping(params.trim()),
        "NOTICE" => ServerLine::Notice,
        "JOIN" if params.trim().eq_ignore_ascii_case(&format!("#{channel}")) => ServerLine::Joined,
        "366" => ServerLine::EndOfNames,
        _ => ServerLine::Other,
    }
}

/// A live connection to the chat server, joined to one channel.
///
/// The session is generic over the transport so it can run over anything
/// that reads and writes bytes; [`ChatSession::connect`] opens a TCP stream.
pub struct ChatSession<S> {
    stream: Option<S>,
    channel: ChannelContext,
    state: SessionState,
    read_timeout: Duration,
    join_confirmed: bool,
    // Bytes after the last complete line of the previous read.
    partial: Vec<u8>,
}

impl ChatSession<TcpStream> {
    /// Resolve the acting account and the channel, open the connection, and
    /// join the channel.
    ///
    /// Fails with [`Error::NotFound`] if either id cannot be resolved and
    /// with [`Error::Authentication`] if the server rejects the login.
    pub async fn connect<R: IdentityResolver + ?Sized>(
        config: &ChatConfig,
        credentials: &Credentials,
        channel: &str,
        resolver: &R,
    ) -> Result<Self> {
        let channel = normalize_channel(channel);
        let self_id = resolver.resolve(credentials.username()).await.ok_or_else(|| {
            Error::not_found(
                "could not resolve the acting account; check the token",
                Some(credentials.username().to_string()),
            )
        })?;
        let channel_id = resolver.resolve(&channel).await.ok_or_else(|| {
            Error::not_found("could not resolve the channel", Some(channel.clone()))
        })?;
        tracing::info!(%self_id, %channel_id, %channel, "resolved channel context");

        let address = format!("{}:{}", config.host, config.port);
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| {
                Error::timeout(
                    format!("connecting to {address}"),
                    Some(config.connect_timeout.as_secs_f64()),
                )
            })?
            .map_err(|e| {
                Error::connection(
                    format!("could not connect to {address}: {e}"),
                    Some(Box::new(e)),
                )
            })?;
        CHAT_CONNECTS.click();

        let context = ChannelContext::new(&channel, channel_id, self_id);
        Self::handshake(stream, credentials, context, config.read_timeout).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> ChatSession<S> {
    /// Log in and join over an already-open stream.
    pub async fn handshake(
        stream: S,
        credentials: &Credentials,
        channel: ChannelContext,
        read_timeout: Duration,
    ) -> Result<Self> {
        let mut session = Self {
            stream: Some(stream),
            channel,
            state: SessionState::Connecting,
            read_timeout,
            join_confirmed: false,
            partial: Vec::new(),
        };

        session.state = SessionState::Authenticating;
        session
            .write_line(&format!("PASS {}", credentials.chat_token()))
            .await?;
        session
            .write_line(&format!("NICK {}", credentials.username()))
            .await?;
        tokio::time::sleep(LOGIN_SETTLE).await;

        let response = session.receive(read_timeout).await;
        let rejected = response.lines().any(|line| {
            matches!(
                classify(line, &session.channel.channel),
                ServerLine::AuthenticationFailed | ServerLine::Notice
            )
        });
        if rejected {
            session.abandon().await;
            return Err(Error::authentication(
                "the chat server rejected the login; check the token and username",
            ));
        }

        session.write_line(&format!("CAP REQ :{CAPABILITIES}")).await?;
        tokio::time::sleep(CAP_SETTLE).await;

        session.state = SessionState::Joining;
        let join = format!("JOIN #{}", session.channel.channel);
        session.write_line(&join).await?;
        tokio::time::sleep(JOIN_SETTLE).await;

        let response = session.receive(read_timeout).await;
        session.answer_pings(&response).await?;
        session.join_confirmed = response.lines().any(|line| {
            matches!(
                classify(line, &session.channel.channel),
                ServerLine::Joined | ServerLine::EndOfNames
            )
        });

        if session.join_confirmed {
            tracing::info!(channel = %session.channel.channel, "joined channel");
            tokio::time::sleep(JOIN_STABILIZE).await;
        } else {
            // The server does not always acknowledge within the settle time.
            tracing::warn!(
                channel = %session.channel.channel,
                "no join acknowledgment; continuing"
            );
        }
        session.state = SessionState::Joined;
        Ok(session)
    }

    /// The channel this session joined.
    pub fn channel(&self) -> &ChannelContext {
        &self.channel
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the server acknowledged the JOIN.
    pub fn join_confirmed(&self) -> bool {
        self.join_confirmed
    }

    /// Default read timeout used during the handshake.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Send a chat message to the channel, then answer any PING that
    /// arrived in the meantime.
    pub async fn send_message(&mut self, text: &str) -> Result<()> {
        let line = format!("PRIVMSG #{} :{text}", self.channel.channel);
        self.write_line(&line).await?;
        let response = self.receive(SEND_POLL).await;
        self.answer_pings(&response).await?;
        Ok(())
    }

    /// Read the complete lines the server sent within `timeout`.
    ///
    /// Only newline-terminated lines are returned. A line cut off by the end
    /// of a read is completed by further reads until `timeout` runs out, and
    /// is otherwise held back for the next call. A timeout or a closed
    /// connection yields an empty string, as does any other read error
    /// (which is logged).
    pub async fn receive(&mut self, timeout: Duration) -> String {
        let Some(stream) = self.stream.as_mut() else {
            return String::new();
        };
        let deadline = tokio::time::Instant::now() + timeout;
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let mut complete = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, stream.read(&mut buf)).await {
                Err(_) | Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    self.partial.extend_from_slice(&buf[..n]);
                    if let Some(end) = self.partial.iter().rposition(|&b| b == b'\n') {
                        complete.extend(self.partial.drain(..=end));
                    }
                    if self.partial.is_empty() {
                        break;
                    }
                }
                Ok(Err(err)) => {
                    CHAT_READ_ERRORS.click();
                    tracing::error!(error = %err, "error reading from chat server");
                    break;
                }
            }
        }

        let text = String::from_utf8_lossy(&complete).into_owned();
        for line in text.lines() {
            tracing::debug!(line, "<");
        }
        text
    }

    /// Answer every PING in `response`. Returns how many were answered.
    pub async fn answer_pings(&mut self, response: &str) -> Result<usize> {
        let mut answered = 0;
        for line in response.lines() {
            if let ServerLine::Ping(payload) = classify(line, &self.channel.channel) {
                self.write_line(&format!("PONG {payload}")).await?;
                CHAT_PONGS.click();
                answered += 1;
            }
        }
        Ok(answered)
    }

    /// Leave the channel and close the connection.
    ///
    /// Best effort: errors are logged and swallowed. Calling this more than
    /// once is harmless.
    pub async fn disconnect(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        let part = format!("PART #{}\r\n", self.channel.channel);
        if let Err(err) = stream.write_all(part.as_bytes()).await {
            tracing::debug!(error = %err, "could not send PART");
        } else {
            let _ = stream.flush().await;
            tokio::time::sleep(PART_GRACE).await;
        }
        if let Err(err) = stream.shutdown().await {
            tracing::debug!(error = %err, "error closing chat connection");
        }
        self.state = SessionState::Disconnected;
        tracing::info!(channel = %self.channel.channel, "disconnected");
    }

    /// Drop the connection without saying goodbye.
    async fn abandon(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.state = SessionState::Disconnected;
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::connection("chat connection is closed", None))?;
        if line.starts_with("PASS ") {
            tracing::debug!(line = "PASS oauth:<redacted>", ">");
        } else {
            tracing::debug!(line, ">");
        }
        let mut bytes = Vec::with_capacity(line.len() + 2);
        bytes.extend_from_slice(line.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        stream
            .write_all(&bytes)
            .await
            .map_err(|e| Error::io(format!("could not send to chat server: {e}"), e))?;
        stream
            .flush()
            .await
            .map_err(|e| Error::io(format!("could not send to chat server: {e}"), e))?;
        CHAT_LINES_SENT.click();
        Ok(())
    }
}

#[cfg(test)]
impl<S> ChatSession<S> {
    /// A session that is already in the channel, over a scripted transport.
    pub(crate) fn joined(stream: S, channel: ChannelContext) -> Self {
        Self {
            stream: Some(stream),
            channel,
            state: SessionState::Joined,
            read_timeout: SEND_POLL,
            join_confirmed: true,
            partial: Vec::new(),
        }
    }
}
