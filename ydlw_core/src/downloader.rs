use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::config::WrapperConfig;
use crate::engine::{Engine, InfoDict, ParamOverrides, YtDlpEngine};
use crate::error::DownloadError;
use crate::session::DownloadSession;
use crate::wrapper::{ProgressHook, YoutubeDlWrapper};

/// Builds the engine the first time a download needs it.
pub type EngineFactory<E> =
    Box<dyn Fn(WrapperConfig) -> BoxFuture<'static, Result<E, DownloadError>> + Send + Sync>;

/// Headers injected into descriptors that carry none.
pub fn std_headers() -> BTreeMap<String, String> {
    [
        (
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        ),
        ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        ("Accept-Language", "en-us,en;q=0.5"),
        ("Sec-Fetch-Mode", "navigate"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Entry point: owns one session and a lazily built, reused engine wrapper.
///
/// The wrapper is built on first use with the session progress hook and the
/// default extractors registered. If building fails the error is remembered
/// and every later call fails fast with `DownloadError::Construction`.
pub struct Downloader<E: Engine> {
    session: Arc<DownloadSession>,
    config: WrapperConfig,
    factory: EngineFactory<E>,
    ytdl: Option<Result<YoutubeDlWrapper<E>, String>>,
}

impl Downloader<YtDlpEngine> {
    /// A downloader backed by the `yt-dlp` executable named in `config`.
    pub fn ytdlp(config: WrapperConfig, session: Arc<DownloadSession>) -> Self {
        Self::new(
            config,
            session,
            Box::new(
                |config: WrapperConfig| -> BoxFuture<'static, Result<YtDlpEngine, DownloadError>> {
                    Box::pin(async move { YtDlpEngine::connect(config.ytdlp_binary()).await })
                },
            ),
        )
    }
}

impl<E: Engine> Downloader<E> {
    pub fn new(config: WrapperConfig, session: Arc<DownloadSession>, factory: EngineFactory<E>) -> Self {
        Self {
            session,
            config,
            factory,
            ytdl: None,
        }
    }

    pub fn session(&self) -> &Arc<DownloadSession> {
        &self.session
    }

    pub fn config(&self) -> &WrapperConfig {
        &self.config
    }

    /// Returns the memoized wrapper, building it on first call.
    pub async fn get_ytdl(&mut self) -> Result<&mut YoutubeDlWrapper<E>, DownloadError> {
        if self.ytdl.is_none() {
            let built = match (self.factory)(self.config.clone()).await {
                Ok(engine) => {
                    let mut ytdl =
                        YoutubeDlWrapper::new(engine, Arc::clone(&self.session), &self.config);
                    ytdl.add_progress_hook(ProgressHook::Session);
                    ytdl.add_default_info_extractors();
                    Ok(ytdl)
                }
                Err(e) => {
                    log::error!("[Downloader] failed to initialise engine: {}", e);
                    Err(e.to_string())
                }
            };
            self.ytdl = Some(built);
        }

        match self.ytdl.as_mut() {
            Some(Ok(ytdl)) => Ok(ytdl),
            Some(Err(msg)) => Err(DownloadError::Construction(msg.clone())),
            None => Err(DownloadError::Construction("engine not initialised".to_string())),
        }
    }

    /// Downloads `info` with the engine's current parameters.
    ///
    /// Adds default `http_headers` when the descriptor has none; otherwise
    /// the descriptor reaches the engine unchanged. Engine errors and
    /// cancellations are returned as-is.
    pub async fn download(&mut self, mut info: InfoDict) -> Result<InfoDict, DownloadError> {
        if !info.contains_key("http_headers") {
            let headers = self.config.default_headers.clone().unwrap_or_else(std_headers);
            info.insert("http_headers".to_string(), serde_json::to_value(headers)?);
        }
        let ytdl = self.get_ytdl().await?;
        ytdl.process_info(&info).await
    }

    /// Like `download`, but first resets per-download parameters and then
    /// applies `params` on top.
    pub async fn download_with_params(
        &mut self,
        info: InfoDict,
        params: &ParamOverrides,
    ) -> Result<InfoDict, DownloadError> {
        let ytdl = self.get_ytdl().await?;
        ytdl.clear_download_params();
        params.apply(ytdl.params_mut());
        self.download(info).await
    }
}
