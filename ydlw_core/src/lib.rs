pub mod config;
pub mod downloader;
pub mod engine;
pub mod error;
pub mod format;
pub mod message;
pub mod session;
pub mod video_info;
pub mod wrapper;

pub use config::WrapperConfig;
pub use downloader::{std_headers, Downloader, EngineFactory};
pub use engine::{
    Engine, EngineLogger, EngineParams, Extractor, InfoDict, LogEngineLogger, OutputSink,
    ParamOverrides, YtDlpEngine,
};
pub use error::{CallbackError, CancelReason, DownloadError};
pub use message::{HookOutcome, Message, ProgressInfo, ProgressMessage};
pub use session::{Callback, Clock, DownloadSession, ManualClock, SystemClock};
pub use video_info::{StreamInfo, VideoInfo};
pub use wrapper::{DownloadState, ProgressHook, TextKind, YoutubeDlWrapper};
