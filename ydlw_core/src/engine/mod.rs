pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DownloadError;
use crate::message::{HookOutcome, ProgressInfo};

pub use ytdlp::YtDlpEngine;

/// Descriptor / result mapping exchanged with the engine.
pub type InfoDict = serde_json::Map<String, serde_json::Value>;

/// Engine options the wrapper manages between downloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    pub quiet: bool,
    pub verbose: bool,
    pub no_warnings: bool,
    /// Format selector, e.g. `best[height<=720]`.
    pub format: Option<String>,
    /// Only download items whose title matches this regex.
    pub matchtitle: Option<String>,
    /// Passed to the engine verbatim.
    pub extra_args: Vec<String>,
}

/// Parameters forced onto the engine before every download.
/// Unset fields leave the current value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamOverrides {
    pub quiet: Option<bool>,
    pub verbose: Option<bool>,
    pub no_warnings: Option<bool>,
    pub format: Option<String>,
    pub matchtitle: Option<String>,
    pub extra_args: Option<Vec<String>>,
}

impl ParamOverrides {
    pub fn is_empty(&self) -> bool {
        *self == ParamOverrides::default()
    }

    pub fn apply(&self, params: &mut EngineParams) {
        if let Some(quiet) = self.quiet {
            params.quiet = quiet;
        }
        if let Some(verbose) = self.verbose {
            params.verbose = verbose;
        }
        if let Some(no_warnings) = self.no_warnings {
            params.no_warnings = no_warnings;
        }
        if let Some(format) = &self.format {
            params.format = Some(format.clone());
        }
        if let Some(matchtitle) = &self.matchtitle {
            params.matchtitle = Some(matchtitle.clone());
        }
        if let Some(extra_args) = &self.extra_args {
            params.extra_args = extra_args.clone();
        }
    }
}

/// Structured logger that, when installed, receives engine text output
/// instead of the session callback.
pub trait EngineLogger: Send + Sync {
    fn debug(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards engine output to the `log` facade.
pub struct LogEngineLogger;

impl EngineLogger for LogEngineLogger {
    fn debug(&self, message: &str) {
        log::debug!("[engine] {}", message);
    }

    fn error(&self, message: &str) {
        log::error!("[engine] {}", message);
    }
}

/// Identity of one supported-site extractor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Extractor {
    name: String,
}

impl Extractor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Where an engine sends everything a user might see.
///
/// The engine never prints on its own. Text goes through the `to_*` and
/// `report_*` methods; transfer progress goes through `progress`, whose
/// outcome the engine must check after every call.
pub trait OutputSink: Send {
    fn params(&self) -> &EngineParams;

    fn to_stdout(
        &mut self,
        message: &str,
        skip_eol: bool,
        check_quiet: bool,
    ) -> Result<(), DownloadError>;

    fn to_stderr(&mut self, message: &str, only_once: bool) -> Result<(), DownloadError>;

    fn report_warning(&mut self, message: &str, only_once: bool) -> Result<(), DownloadError>;

    fn report_error(&mut self, message: &str) -> Result<(), DownloadError>;

    fn progress(&mut self, info: &ProgressInfo) -> HookOutcome;
}

/// The media-extraction/download backend.
///
/// `process_info` performs the transfer described by `info`, reporting
/// through `sink`. When `sink.progress` returns `HookOutcome::Cancel(reason)`
/// the engine stops the transfer and returns `DownloadError::Canceled(reason)`.
#[async_trait]
pub trait Engine: Send {
    fn name(&self) -> &str;

    /// Extractors the engine ships with, in registration order.
    fn default_extractors(&self) -> Vec<Extractor>;

    fn add_info_extractor(&mut self, extractor: Extractor);

    fn extractors(&self) -> &[Extractor];

    async fn process_info(
        &mut self,
        info: &InfoDict,
        sink: &mut dyn OutputSink,
    ) -> Result<InfoDict, DownloadError>;
}
