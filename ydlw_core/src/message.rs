use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CancelReason;

/// Progress mapping reported by the engine during a transfer.
///
/// The named fields are the ones the wrapper reads. Everything else the
/// engine sends is kept in `extra` so callbacks still see the raw event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64", skip_serializing_if = "Option::is_none")]
    pub downloaded_bytes: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64", skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes_estimate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmpfilename: Option<String>,
    /// Seconds remaining, as estimated by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<f64>,
    /// Bytes per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProgressInfo {
    /// `total_bytes`, falling back to `total_bytes_estimate`. Zero counts as unknown.
    pub fn total(&self) -> Option<f64> {
        self.total_bytes
            .filter(|t| *t > 0)
            .map(|t| t as f64)
            .or(self.total_bytes_estimate.filter(|t| *t > 0.0))
    }
}

/// Byte counters occasionally arrive as floats (`1024.0`); accept both.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let n: Option<serde_json::Number> = Option::deserialize(deserializer)?;
    Ok(n.and_then(|n| n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))))
}

/// A status line decorated with the numbers it was built from.
/// Built fresh for every progress event and never changed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressMessage {
    text: String,
    percent: u32,
    eta_str: String,
    speed_str: String,
    info: ProgressInfo,
}

impl ProgressMessage {
    pub fn new(
        text: String,
        percent: u32,
        eta_str: String,
        speed_str: String,
        info: ProgressInfo,
    ) -> Self {
        Self {
            text,
            percent,
            eta_str,
            speed_str,
            info,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whole percent complete, 0 when unknown.
    pub fn percent(&self) -> u32 {
        self.percent
    }

    /// e.g. `3m 25s`, empty when unknown.
    pub fn eta_str(&self) -> &str {
        &self.eta_str
    }

    /// e.g. `35.0 KB/s`, empty when unknown.
    pub fn speed_str(&self) -> &str {
        &self.speed_str
    }

    pub fn info(&self) -> &ProgressInfo {
        &self.info
    }
}

impl fmt::Display for ProgressMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Everything the wrapper hands to the session callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A line of engine output, newline included.
    Text(String),
    Progress(ProgressMessage),
}

impl Message {
    pub fn as_str(&self) -> &str {
        match self {
            Message::Text(text) => text,
            Message::Progress(p) => p.text(),
        }
    }

    pub fn as_progress(&self) -> Option<&ProgressMessage> {
        match self {
            Message::Progress(p) => Some(p),
            Message::Text(_) => None,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the engine should do after a progress hook returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    Continue,
    Cancel(CancelReason),
}

impl HookOutcome {
    pub fn is_cancel(&self) -> bool {
        matches!(self, HookOutcome::Cancel(_))
    }
}
