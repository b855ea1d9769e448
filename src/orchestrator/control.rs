//! Control channel between the management UI and the orchestrator.
//!
//! Messages are a closed set: [`ControlMessage`]. They travel over a tokio
//! mpsc channel with a oneshot reply per message, so the sender can wait for
//! the orchestrator's [`ControlResponse`] with a timeout.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, warn};

use crate::surface::{SurfaceId, WindowOptions};

/// Message ID counter for correlation
static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Page a tool loads when its descriptor names none.
pub const DEFAULT_TOOL_INDEX: &str = "index.html";

/// A tool window request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Directory holding the tool's files. Also the tool's registry key.
    pub files_dir: PathBuf,

    /// Page inside `files_dir` to load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,

    /// Overrides applied on top of the default tool window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_options: Option<WindowOptions>,
}

impl ToolDescriptor {
    pub fn new(files_dir: impl Into<PathBuf>) -> Self {
        Self {
            files_dir: files_dir.into(),
            index: None,
            window_options: None,
        }
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_window_options(mut self, options: WindowOptions) -> Self {
        self.window_options = Some(options);
        self
    }

    /// Index page name, `index.html` unless set.
    pub fn index_file(&self) -> &str {
        self.index
            .as_deref()
            .filter(|index| !index.is_empty())
            .unwrap_or(DEFAULT_TOOL_INDEX)
    }

    /// `file://` URL of the tool's index page.
    pub fn page_url(&self) -> String {
        format!("file://{}", self.files_dir.join(self.index_file()).display())
    }
}

/// Messages the management UI can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// Start the mirror and open the game surface.
    StartGame,

    /// Open a tool surface.
    StartTool(ToolDescriptor),
}

impl ControlMessage {
    /// Wire tag of this message.
    pub fn tag(&self) -> &'static str {
        match self {
            ControlMessage::StartGame => "start-game",
            ControlMessage::StartTool(_) => "start-tool",
        }
    }

    /// Parses the positional form: a tag followed by its arguments, e.g.
    /// `["start-tool", {"filesDir": "..."}]`.
    pub fn from_args(args: &[Value]) -> Result<Self, ControlError> {
        let tag = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| ControlError::InvalidMessage("missing message tag".to_string()))?;

        match tag {
            "start-game" => Ok(ControlMessage::StartGame),
            "start-tool" => {
                let descriptor = args.get(1).cloned().ok_or_else(|| {
                    ControlError::InvalidMessage("start-tool requires a tool descriptor".to_string())
                })?;
                serde_json::from_value(descriptor)
                    .map(ControlMessage::StartTool)
                    .map_err(|e| ControlError::InvalidMessage(e.to_string()))
            }
            other => Err(ControlError::UnknownTag(other.to_string())),
        }
    }

    /// Parses one line of JSON in either the positional (array) or the
    /// tagged object form.
    pub fn from_json(line: &str) -> Result<Self, ControlError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| ControlError::InvalidMessage(e.to_string()))?;

        match value {
            Value::Array(args) => Self::from_args(&args),
            Value::Object(ref object) => {
                let tag = object
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ControlError::InvalidMessage("missing message tag".to_string()))?;
                if !matches!(tag, "start-game" | "start-tool") {
                    return Err(ControlError::UnknownTag(tag.to_string()));
                }
                serde_json::from_value(value).map_err(|e| ControlError::InvalidMessage(e.to_string()))
            }
            _ => Err(ControlError::InvalidMessage(
                "expected a JSON array or object".to_string(),
            )),
        }
    }
}

/// Reply to a control message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Whether the message was handled
    pub success: bool,

    /// Error message if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Surface opened or reused by the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<SurfaceId>,

    /// Port the mirror is listening on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Whether the surface was opened by this message rather than reused
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub created: bool,
}

impl ControlResponse {
    /// Create a success response
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
            surface: None,
            port: None,
            created: false,
        }
    }

    /// Create a success response naming a surface
    pub fn with_surface(surface: SurfaceId) -> Self {
        Self {
            surface: Some(surface),
            ..Self::success()
        }
    }

    /// Adds the mirror port
    pub fn and_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Marks the named surface as newly opened
    pub fn opened(mut self, created: bool) -> Self {
        self.created = created;
        self
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            surface: None,
            port: None,
            created: false,
        }
    }
}

/// Control channel error types
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Control channel closed")]
    ChannelClosed,

    #[error("Control message timed out")]
    Timeout,

    #[error("Unknown control message: {0}")]
    UnknownTag(String),

    #[error("Invalid control message: {0}")]
    InvalidMessage(String),
}

type Envelope = (u64, ControlMessage, oneshot::Sender<ControlResponse>);

/// Sending side of the control channel. Cloneable.
#[derive(Clone)]
pub struct ControlChannel {
    message_tx: mpsc::Sender<Envelope>,
    message_rx: Arc<RwLock<Option<mpsc::Receiver<Envelope>>>>,
    default_timeout: Duration,
}

impl ControlChannel {
    /// Create a new control channel
    pub fn new() -> Self {
        Self::with_buffer_size(64)
    }

    /// Create a new control channel with custom buffer size
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let (message_tx, message_rx) = mpsc::channel(buffer_size);

        Self {
            message_tx,
            message_rx: Arc::new(RwLock::new(Some(message_rx))),
            default_timeout: Duration::from_secs(30),
        }
    }

    /// Set the default timeout for messages
    pub fn set_default_timeout(&mut self, timeout: Duration) {
        self.default_timeout = timeout;
    }

    /// Send a message and wait for the reply
    pub async fn send(&self, message: ControlMessage) -> Result<ControlResponse, ControlError> {
        self.send_timeout(message, self.default_timeout).await
    }

    /// Send a message with custom timeout
    pub async fn send_timeout(
        &self,
        message: ControlMessage,
        timeout: Duration,
    ) -> Result<ControlResponse, ControlError> {
        let (response_tx, response_rx) = oneshot::channel();
        let message_id = NEXT_MESSAGE_ID.fetch_add(1, Ordering::SeqCst);

        debug!("Sending control message {}: {:?}", message_id, message);

        self.message_tx
            .send((message_id, message, response_tx))
            .await
            .map_err(|_| ControlError::ChannelClosed)?;

        match tokio::time::timeout(timeout, response_rx).await {
            Ok(Ok(response)) => {
                debug!("Received control response {}: {:?}", message_id, response);
                Ok(response)
            }
            Ok(Err(_)) => {
                error!("Control response channel closed for message {}", message_id);
                Err(ControlError::ChannelClosed)
            }
            Err(_) => {
                warn!("Control message {} timed out after {:?}", message_id, timeout);
                Err(ControlError::Timeout)
            }
        }
    }

    /// Take the receiver (orchestrator side)
    pub async fn take_receiver(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.message_rx.write().await.take()
    }

    /// Check if the channel is still open
    pub fn is_open(&self) -> bool {
        !self.message_tx.is_closed()
    }
}

impl Default for ControlChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// A received control message awaiting its reply.
pub struct PendingControl {
    pub id: u64,
    pub message: ControlMessage,
    reply_tx: oneshot::Sender<ControlResponse>,
}

impl PendingControl {
    /// Sends the reply. A sender that stopped waiting is logged.
    pub fn reply(self, response: ControlResponse) {
        if self.reply_tx.send(response).is_err() {
            warn!("Failed to send response for control message {}", self.id);
        }
    }
}

/// Receiving side of the control channel.
pub struct ControlProcessor {
    receiver: mpsc::Receiver<Envelope>,
}

impl ControlProcessor {
    /// Create a new processor from a channel. `None` if already taken.
    pub async fn new(channel: &ControlChannel) -> Option<Self> {
        channel.take_receiver().await.map(|receiver| Self { receiver })
    }

    /// Receive the next message. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<PendingControl> {
        self.receiver
            .recv()
            .await
            .map(|(id, message, reply_tx)| PendingControl {
                id,
                message,
                reply_tx,
            })
    }
}
