use std::collections::HashSet;
use std::sync::Arc;

use crate::config::WrapperConfig;
use crate::engine::{
    Engine, EngineLogger, EngineParams, Extractor, InfoDict, OutputSink, ParamOverrides,
};
use crate::error::{CancelReason, DownloadError};
use crate::format::{bidi_workaround, duration_to_short_text, speed_text, title_case};
use crate::message::{HookOutcome, Message, ProgressInfo, ProgressMessage};
use crate::session::DownloadSession;

/// Lifecycle of the wrapper's current (or last) download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Idle,
    Running,
    Completed,
    Canceled,
    Failed,
}

/// Severity of a text line passed to `report_text_line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Info,
    Warning,
    Error,
}

/// An entry in the wrapper's ordered progress-hook list.
pub enum ProgressHook {
    /// Cancellation checks plus status-line translation for the session callback.
    Session,
    Custom(Box<dyn FnMut(&ProgressInfo) -> HookOutcome + Send>),
}

/// The sink handed to the engine. Owns everything the hooks need so the
/// engine and the router can be borrowed separately.
struct OutputRouter {
    session: Arc<DownloadSession>,
    params: EngineParams,
    logger: Option<Arc<dyn EngineLogger>>,
    /// Messages already emitted with `only_once`.
    printed_messages: HashSet<String>,
    last_downloaded_file_path: String,
    progress_hooks: Vec<ProgressHook>,
}

impl OutputRouter {
    /// Single choke point for all output.
    ///
    /// With a callback registered its answer is returned; a failing callback
    /// is removed and the message counts as accepted. Without one, a fired
    /// host abort signal fails the call.
    fn show_message(&mut self, msg: Message) -> Result<bool, DownloadError> {
        match self.session.dispatch(&msg) {
            Some(Ok(keep_going)) => Ok(keep_going),
            Some(Err(e)) => {
                log::error!("[OutputRouter] error in callback, removing it: {}", e);
                Ok(true)
            }
            None => {
                if self.session.abort_requested() {
                    return Err(DownloadError::Aborted);
                }
                Ok(true)
            }
        }
    }

    /// Returns true if `only_once` suppresses this message.
    fn already_printed(&mut self, message: &str, only_once: bool) -> bool {
        only_once && !self.printed_messages.insert(message.to_string())
    }

    fn session_progress(&mut self, info: &ProgressInfo) -> HookOutcome {
        // Always consume the flag, even when the abort signal decides.
        let cancel_requested = self.session.take_cancel_request();
        if self.session.abort_requested() || cancel_requested {
            return HookOutcome::Cancel(CancelReason::AbortRequested);
        }

        let limit = self.session.duration_limit().filter(|d| !d.is_zero());
        let elapsed = self.session.elapsed().unwrap_or_default();
        if let Some(max) = limit {
            if elapsed > max {
                return HookOutcome::Cancel(CancelReason::DurationReached);
            }
        }

        if !self.session.has_callback() {
            return HookOutcome::Continue;
        }

        if let Some(filename) = info.filename.as_deref().filter(|f| !f.is_empty()) {
            self.last_downloaded_file_path = filename.to_string();
        }

        let mut pct_suffix = String::new();
        let mut percent = 0;
        let mut eta = None;
        if let Some(p) = byte_percent(info) {
            percent = p;
            pct_suffix = format!(" ({}%)", p);
        } else if let Some(max) = limit {
            // Approximation for time-bounded transfers: the budget stands in for the total size.
            let (done, total) = (elapsed.as_secs_f64(), max.as_secs_f64());
            eta = Some(total - done);
            percent = (done * 100.0 / total).floor() as u32;
        }

        let eta_str = eta
            .filter(|e| *e != 0.0)
            .or(info.eta.filter(|e| *e != 0.0))
            .map(duration_to_short_text)
            .unwrap_or_default();
        let speed_str = info
            .speed
            .filter(|s| *s != 0.0)
            .map(speed_text)
            .unwrap_or_default();

        let status = title_case(info.status.as_deref().unwrap_or("?"));
        let mut text = format!("{}{}:", status, pct_suffix);
        if !eta_str.is_empty() {
            text.push_str(" ETA: ");
            text.push_str(&eta_str);
        }
        if !speed_str.is_empty() {
            text.push(' ');
            text.push_str(&speed_str);
        }

        let msg = ProgressMessage::new(text, percent, eta_str, speed_str, info.clone());
        match self.show_message(Message::Progress(msg)) {
            Ok(true) => HookOutcome::Continue,
            Ok(false) => {
                log::info!("[OutputRouter] download canceled by callback");
                HookOutcome::Cancel(CancelReason::CallbackDeclined)
            }
            Err(_) => HookOutcome::Cancel(CancelReason::AbortRequested),
        }
    }
}

/// `floor(100 * downloaded / total)` when both are known and total > 0.
/// Exact integer math when the engine reports `total_bytes`.
fn byte_percent(info: &ProgressInfo) -> Option<u32> {
    let done = info.downloaded_bytes?;
    if let Some(total) = info.total_bytes.filter(|t| *t > 0) {
        let pct = u128::from(done) * 100 / u128::from(total);
        return Some(u32::try_from(pct).unwrap_or(u32::MAX));
    }
    let total = info.total()?;
    Some((done as f64 * 100.0 / total).floor() as u32)
}

impl OutputSink for OutputRouter {
    fn params(&self) -> &EngineParams {
        &self.params
    }

    fn to_stdout(
        &mut self,
        message: &str,
        skip_eol: bool,
        check_quiet: bool,
    ) -> Result<(), DownloadError> {
        if let Some(logger) = &self.logger {
            logger.debug(message);
            return Ok(());
        }
        if check_quiet && self.params.quiet {
            return Ok(());
        }
        let terminator = if skip_eol { "" } else { "\n" };
        let output = format!("{}{}", bidi_workaround(message), terminator);
        self.show_message(Message::Text(output)).map(|_| ())
    }

    fn to_stderr(&mut self, message: &str, only_once: bool) -> Result<(), DownloadError> {
        if self.already_printed(message, only_once) {
            return Ok(());
        }
        if let Some(logger) = &self.logger {
            logger.error(message);
            return Ok(());
        }
        let output = format!("{}\n", bidi_workaround(message));
        self.show_message(Message::Text(output)).map(|_| ())
    }

    fn report_warning(&mut self, message: &str, only_once: bool) -> Result<(), DownloadError> {
        self.to_stderr(&format!("WARNING: {}", message), only_once)
    }

    fn report_error(&mut self, message: &str) -> Result<(), DownloadError> {
        self.to_stderr(&format!("ERROR: {}", message), false)
    }

    fn progress(&mut self, info: &ProgressInfo) -> HookOutcome {
        let mut hooks = std::mem::take(&mut self.progress_hooks);
        let mut outcome = HookOutcome::Continue;
        for hook in hooks.iter_mut() {
            outcome = match hook {
                ProgressHook::Session => self.session_progress(info),
                ProgressHook::Custom(f) => f(info),
            };
            if outcome.is_cancel() {
                break;
            }
        }
        self.progress_hooks = hooks;
        outcome
    }
}

/// Adapts an [`Engine`] to a [`DownloadSession`]: every line of output and
/// every progress event goes through the session callback, and the
/// session's cancel flag, duration limit and abort signal are enforced at
/// each progress event.
pub struct YoutubeDlWrapper<E: Engine> {
    engine: E,
    router: OutputRouter,
    blacklist: HashSet<String>,
    override_params: ParamOverrides,
    state: DownloadState,
}

impl<E: Engine> YoutubeDlWrapper<E> {
    /// Wraps `engine`. No progress hooks or extractors are registered yet.
    pub fn new(engine: E, session: Arc<DownloadSession>, config: &WrapperConfig) -> Self {
        let params = EngineParams {
            verbose: config.verbose,
            ..EngineParams::default()
        };
        Self {
            engine,
            router: OutputRouter {
                session,
                params,
                logger: None,
                printed_messages: HashSet::new(),
                last_downloaded_file_path: String::new(),
                progress_hooks: Vec::new(),
            },
            blacklist: config.blacklist.iter().cloned().collect(),
            override_params: config.override_params.clone(),
            state: DownloadState::Idle,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn session(&self) -> &Arc<DownloadSession> {
        &self.router.session
    }

    pub fn params(&self) -> &EngineParams {
        &self.router.params
    }

    pub fn params_mut(&mut self) -> &mut EngineParams {
        &mut self.router.params
    }

    /// Routes text output to `logger` instead of the session callback.
    pub fn set_logger(&mut self, logger: Option<Arc<dyn EngineLogger>>) {
        self.router.logger = logger;
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    /// Path of the last file the engine reported writing, empty if none yet.
    pub fn last_downloaded_file_path(&self) -> &str {
        &self.router.last_downloaded_file_path
    }

    pub fn show_message(&mut self, msg: Message) -> Result<bool, DownloadError> {
        self.router.show_message(msg)
    }

    /// Emits one line of engine text. Warnings and errors get their
    /// `WARNING:` / `ERROR:` prefix; `only_once` drops exact repeats.
    pub fn report_text_line(
        &mut self,
        message: &str,
        kind: TextKind,
        only_once: bool,
    ) -> Result<(), DownloadError> {
        match kind {
            TextKind::Info => {
                if self.router.already_printed(message, only_once) {
                    return Ok(());
                }
                self.router.to_stdout(message, false, false)
            }
            TextKind::Warning => self.router.report_warning(message, only_once),
            TextKind::Error => {
                let line = format!("ERROR: {}", message);
                self.router.to_stderr(&line, only_once)
            }
        }
    }

    /// Runs the registered progress hooks for one event.
    pub fn progress_callback(&mut self, info: &ProgressInfo) -> Result<(), DownloadError> {
        match self.router.progress(info) {
            HookOutcome::Continue => Ok(()),
            HookOutcome::Cancel(reason) => Err(DownloadError::Canceled(reason)),
        }
    }

    pub fn add_progress_hook(&mut self, hook: ProgressHook) {
        self.router.progress_hooks.push(hook);
    }

    pub fn clear_progress_hooks(&mut self) {
        self.router.progress_hooks.clear();
    }

    pub fn progress_hook_count(&self) -> usize {
        self.router.progress_hooks.len()
    }

    /// Registers `extractor` with the engine unless it is blacklisted.
    /// Returns whether it was registered.
    pub fn add_info_extractor(&mut self, extractor: Extractor) -> bool {
        if self.blacklist.contains(extractor.name()) {
            log::debug!("[YoutubeDlWrapper] skipping blacklisted extractor {}", extractor.name());
            return false;
        }
        self.engine.add_info_extractor(extractor);
        true
    }

    pub fn add_default_info_extractors(&mut self) {
        for extractor in self.engine.default_extractors() {
            self.add_info_extractor(extractor);
        }
    }

    /// Drops per-download filters left over from the previous download and
    /// re-applies the configured overrides.
    pub fn clear_download_params(&mut self) {
        let params = &mut self.router.params;
        params.quiet = false;
        params.format = None;
        params.matchtitle = None;
        if !self.override_params.is_empty() {
            log::debug!("[YoutubeDlWrapper] re-applying overrides {:?}", self.override_params);
            self.override_params.apply(params);
        }
    }

    /// Hands `info` to the engine and tracks the outcome.
    pub async fn process_info(&mut self, info: &InfoDict) -> Result<InfoDict, DownloadError> {
        self.state = DownloadState::Running;
        log::info!("[YoutubeDlWrapper] starting download via {}", self.engine.name());

        let result = self.engine.process_info(info, &mut self.router).await;

        self.state = match &result {
            Ok(_) => DownloadState::Completed,
            Err(e) if e.is_canceled() => DownloadState::Canceled,
            Err(_) => DownloadState::Failed,
        };
        match &result {
            Ok(_) => log::info!("[YoutubeDlWrapper] download completed"),
            Err(e) => log::info!("[YoutubeDlWrapper] download ended: {}", e),
        }
        result
    }
}
