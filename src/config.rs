//! Configuration types for twitchmod.
//!
//! This module provides CLI argument parsing via `arrrg`, the credential
//! record shared by the chat and Helix clients, the persisted credential
//! file, and the chat connection settings.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default chat server host.
pub const DEFAULT_CHAT_HOST: &str = "irc.chat.twitch.tv";

/// Default chat server port (plain-text IRC).
pub const DEFAULT_CHAT_PORT: u16 = 6667;

/// Default delay between batch items, in seconds.
pub const DEFAULT_DELAY_SECS: f64 = 1.5;

/// Default timeout duration, in seconds (10 minutes).
pub const DEFAULT_TIMEOUT_DURATION_SECS: u32 = 600;

/// Longest timeout the moderation endpoint accepts, in seconds (two weeks).
pub const MAX_TIMEOUT_DURATION_SECS: u32 = 1_209_600;

/// Default path of the persisted credential file.
pub const DEFAULT_CONFIG_PATH: &str = "twitch_config.json";

const OAUTH_PREFIX: &str = "oauth:";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Command-line arguments for the twitchmod tool.
///
/// Anything left unset is asked for interactively.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct Args {
    /// Channel to join, without the leading `#`.
    #[arrrg(optional, "Channel to act on (without #)", "CHANNEL")]
    pub channel: Option<String>,

    /// Batch mode.
    #[arrrg(optional, "Mode: messages, ban, timeout", "MODE")]
    pub mode: Option<String>,

    /// Input file with one work item per line.
    #[arrrg(optional, "Input file (one message or username per line)", "FILE")]
    pub file: Option<String>,

    /// Delay between actions in seconds.
    #[arrrg(optional, "Delay between actions in seconds (default: 1.5)", "SECONDS")]
    pub delay: Option<String>,

    /// Timeout duration in seconds.
    #[arrrg(optional, "Timeout duration in seconds (default: 600)", "SECONDS")]
    pub duration: Option<String>,

    /// Path of the stored credential file.
    #[arrrg(optional, "Credential file (default: twitch_config.json)", "PATH")]
    pub config: Option<String>,

    /// Twitch login of the acting account.
    #[arrrg(optional, "Twitch login of the acting account", "LOGIN")]
    pub username: Option<String>,

    /// OAuth access token, with or without the `oauth:` prefix.
    #[arrrg(optional, "OAuth access token", "TOKEN")]
    pub token: Option<String>,

    /// Application client id.
    #[arrrg(optional, "Application client id", "ID")]
    pub client_id: Option<String>,

    /// Skip the confirmation prompt.
    #[arrrg(flag, "Start the batch without asking for confirmation")]
    pub yes: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// What a batch does with each input line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Send every line as a chat message.
    Messages,
    /// Ban every listed account.
    Ban,
    /// Time out every listed account.
    Timeout,
}

impl Mode {
    /// Returns true for the modes that act on accounts.
    pub fn is_moderation(&self) -> bool {
        !matches!(self, Mode::Messages)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Messages => write!(f, "messages"),
            Mode::Ban => write!(f, "ban"),
            Mode::Timeout => write!(f, "timeout"),
        }
    }
}

impl FromStr for Mode {
    type Err = Error;

    /// Accepts the mode names as well as the menu numbers 1-3.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "messages" | "message" | "1" => Ok(Mode::Messages),
            "ban" | "2" => Ok(Mode::Ban),
            "timeout" | "3" => Ok(Mode::Timeout),
            other => Err(Error::validation(
                format!("unknown mode {other:?}; expected messages, ban, or timeout"),
                Some("mode".to_string()),
            )),
        }
    }
}

/// Credentials for one run.
///
/// The chat server wants the token as `oauth:<token>` while Helix wants the
/// bare token as a bearer credential; both forms are kept.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    chat_token: String,
    access_token: String,
    client_id: String,
}

impl Credentials {
    /// Builds credentials from a token in either form.
    pub fn new(
        username: impl AsRef<str>,
        token: impl AsRef<str>,
        client_id: impl AsRef<str>,
    ) -> Self {
        let token = token.as_ref().trim();
        let (chat_token, access_token) = match token.strip_prefix(OAUTH_PREFIX) {
            Some(bare) => (token.to_string(), bare.to_string()),
            None => (format!("{OAUTH_PREFIX}{token}"), token.to_string()),
        };
        Self {
            username: username.as_ref().trim().to_lowercase(),
            chat_token,
            access_token,
            client_id: client_id.as_ref().trim().to_string(),
        }
    }

    /// Login of the acting account.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Token in the `oauth:` form used for the chat PASS line.
    pub fn chat_token(&self) -> &str {
        &self.chat_token
    }

    /// Bare token used as the Helix bearer credential.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Application client id sent with every Helix call.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("chat_token", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// Credential record persisted between runs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfig {
    /// Twitch login.
    pub username: String,
    /// Token as the operator entered it.
    pub token: String,
    /// Application client id; older files may not have one.
    #[serde(default)]
    pub client_id: String,
}

impl StoredConfig {
    /// Loads the stored record.
    ///
    /// A missing file is `None`. An unreadable or malformed file is also
    /// `None`, with a warning logged, so the operator is asked again.
    pub fn load(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "could not read stored config");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring malformed stored config");
                None
            }
        }
    }

    /// Writes the record as JSON, replacing any previous file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .map_err(|e| Error::io(format!("could not write {}: {e}", path.display()), e))
    }

    /// Converts the record into run credentials.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.username, &self.token, &self.client_id)
    }
}

/// Settings for the chat connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatConfig {
    /// Chat server host.
    pub host: String,
    /// Chat server port.
    pub port: u16,
    /// Bound on establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Default bound on a single read during the handshake.
    pub read_timeout: Duration,
}

impl ChatConfig {
    /// Creates a configuration pointing at the public Twitch chat server.
    pub fn new() -> Self {
        Self {
            host: DEFAULT_CHAT_HOST.to_string(),
            port: DEFAULT_CHAT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Sets the server host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the server port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the handshake read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns true if the operator's answer means yes.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "да" | "д"
    )
}

/// Parses an operator-supplied delay, falling back to the default when the
/// input is empty or not a number.
pub fn parse_delay(input: Option<&str>) -> f64 {
    input
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(DEFAULT_DELAY_SECS)
}

/// Parses an operator-supplied timeout duration in seconds.
///
/// Empty input means the default. Anything else must be a whole number
/// between 1 and [`MAX_TIMEOUT_DURATION_SECS`].
pub fn parse_timeout_duration(input: Option<&str>) -> Result<u32> {
    let Some(input) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(DEFAULT_TIMEOUT_DURATION_SECS);
    };
    match input.parse::<u32>() {
        Ok(duration) if (1..=MAX_TIMEOUT_DURATION_SECS).contains(&duration) => Ok(duration),
        _ => Err(Error::validation(
            format!(
                "timeout duration must be a whole number of seconds from 1 to \
                 {MAX_TIMEOUT_DURATION_SECS}, got '{input}'"
            ),
            Some("duration".to_string()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_token_gets_prefixed_for_chat() {
        let creds = Credentials::new("  SomeMod ", "abc123", "cid");
        assert_eq!(creds.username(), "somemod");
        assert_eq!(creds.chat_token(), "oauth:abc123");
        assert_eq!(creds.access_token(), "abc123");
        assert_eq!(creds.client_id(), "cid");
    }

    #[test]
    fn prefixed_token_is_stripped_for_helix() {
        let creds = Credentials::new("somemod", "oauth:abc123", "cid");
        assert_eq!(creds.chat_token(), "oauth:abc123");
        assert_eq!(creds.access_token(), "abc123");
    }

    #[test]
    fn debug_redacts_tokens() {
        let creds = Credentials::new("somemod", "secret-token", "cid");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("somemod"));
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("messages".parse::<Mode>().unwrap(), Mode::Messages);
        assert_eq!("1".parse::<Mode>().unwrap(), Mode::Messages);
        assert_eq!("BAN".parse::<Mode>().unwrap(), Mode::Ban);
        assert_eq!(" 3 ".parse::<Mode>().unwrap(), Mode::Timeout);
        assert!("4".parse::<Mode>().unwrap_err().is_validation());
        assert!(Mode::Timeout.is_moderation());
        assert!(!Mode::Messages.is_moderation());
    }

    #[test]
    fn affirmative_answers() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative(" YES "));
        assert!(is_affirmative("да"));
        assert!(is_affirmative("Д"));
        assert!(!is_affirmative("n"));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn delay_falls_back_to_default() {
        assert_eq!(parse_delay(None), 1.5);
        assert_eq!(parse_delay(Some("")), 1.5);
        assert_eq!(parse_delay(Some("soon")), 1.5);
        assert_eq!(parse_delay(Some("0.5")), 0.5);
        assert_eq!(parse_delay(Some(" 3 ")), 3.0);
    }

    #[test]
    fn timeout_duration_defaults_when_empty() {
        assert_eq!(parse_timeout_duration(None).unwrap(), 600);
        assert_eq!(parse_timeout_duration(Some("  ")).unwrap(), 600);
        assert_eq!(parse_timeout_duration(Some(" 60 ")).unwrap(), 60);
        assert_eq!(parse_timeout_duration(Some("1209600")).unwrap(), 1_209_600);
    }

    #[test]
    fn bad_timeout_duration_is_rejected() {
        for input in ["-5", "0", "1.5", "ten", "1209601", "5000000000"] {
            let err = parse_timeout_duration(Some(input)).unwrap_err();
            assert!(err.is_validation(), "{input}");
            assert!(err.to_string().contains(input), "{input}");
        }
    }

    #[test]
    fn stored_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twitch_config.json");
        assert_eq!(StoredConfig::load(&path), None);

        let stored = StoredConfig {
            username: "somemod".to_string(),
            token: "oauth:abc".to_string(),
            client_id: "cid".to_string(),
        };
        stored.save(&path).unwrap();
        let loaded = StoredConfig::load(&path).unwrap();
        assert_eq!(loaded, stored);
        assert_eq!(loaded.credentials().access_token(), "abc");
    }

    #[test]
    fn stored_config_without_client_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twitch_config.json");
        fs::write(&path, r#"{"username":"somemod","token":"abc"}"#).unwrap();
        let loaded = StoredConfig::load(&path).unwrap();
        assert_eq!(loaded.client_id, "");
    }

    #[test]
    fn malformed_stored_config_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twitch_config.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(StoredConfig::load(&path), None);
    }

    #[test]
    fn chat_config_builder() {
        let config = ChatConfig::new()
            .with_host("127.0.0.1")
            .with_port(16667)
            .with_connect_timeout(Duration::from_secs(1))
            .with_read_timeout(Duration::from_millis(100));
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 16667);
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.read_timeout, Duration::from_millis(100));
        assert_eq!(ChatConfig::default().host, DEFAULT_CHAT_HOST);
    }
}
