use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use super::{Engine, EngineParams, Extractor, InfoDict, OutputSink};
use crate::error::DownloadError;
use crate::message::{HookOutcome, ProgressInfo};

/// Prefix of the progress lines requested through `--progress-template`.
const PROGRESS_MARKER: &str = "[ydlw-progress]";

/// How many stderr lines are kept for the failure message.
const STDERR_TAIL: usize = 20;

enum Target {
    InfoJson(PathBuf),
    Url(String),
}

/// Drives the `yt-dlp` executable as a child process.
///
/// Progress arrives as one JSON object per line on stdout and is forwarded
/// to the sink; on `HookOutcome::Cancel` the child is killed.
pub struct YtDlpEngine {
    binary: PathBuf,
    version: String,
    available: Vec<Extractor>,
    registered: Vec<Extractor>,
}

impl YtDlpEngine {
    /// Checks that `binary` runs and loads its extractor list.
    pub async fn connect(binary: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        let binary = binary.into();
        let version = run_capture(&binary, &["--version"]).await?.trim().to_string();
        log::info!("[YtDlpEngine] {} core version: {}", binary.display(), version);

        let available = match run_capture(&binary, &["--list-extractors"]).await {
            Ok(listing) => parse_extractor_list(&listing),
            Err(e) => {
                log::warn!("[YtDlpEngine] could not list extractors: {}", e);
                Vec::new()
            }
        };

        Ok(Self {
            binary,
            version,
            available,
            registered: Vec::new(),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn build_args(&self, params: &EngineParams, target: &Target, info: &InfoDict) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--newline".into(),
            "--progress".into(),
            "--progress-template".into(),
            format!("download:{}%(progress)j", PROGRESS_MARKER),
        ];

        if params.quiet {
            args.push("-q".into());
        }
        if params.verbose {
            args.push("-v".into());
        }
        if params.no_warnings {
            args.push("--no-warnings".into());
        }
        if let Some(format) = &params.format {
            args.push("-f".into());
            args.push(format.clone());
        }
        if let Some(matchtitle) = &params.matchtitle {
            args.push("--match-filters".into());
            args.push(format!("title~=(?i){}", matchtitle));
        }

        // Only restrict extractors when something was filtered out.
        if !self.available.is_empty() && self.registered.len() < self.available.len() {
            let names: Vec<&str> = self.registered.iter().map(|e| e.name()).collect();
            args.push("--use-extractors".into());
            args.push(names.join(","));
        }

        args.extend(params.extra_args.iter().cloned());

        match target {
            Target::InfoJson(path) => {
                args.push("--load-info-json".into());
                args.push(path.to_string_lossy().into_owned());
            }
            Target::Url(url) => {
                if let Some(headers) = info.get("http_headers").and_then(|h| h.as_object()) {
                    for (key, value) in headers {
                        if let Some(value) = value.as_str() {
                            args.push("--add-header".into());
                            args.push(format!("{}:{}", key, value));
                        }
                    }
                }
                args.push("--".into());
                args.push(url.clone());
            }
        }
        args
    }
}

#[async_trait]
impl Engine for YtDlpEngine {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    fn default_extractors(&self) -> Vec<Extractor> {
        self.available.clone()
    }

    fn add_info_extractor(&mut self, extractor: Extractor) {
        if !self.registered.contains(&extractor) {
            self.registered.push(extractor);
        }
    }

    fn extractors(&self) -> &[Extractor] {
        &self.registered
    }

    async fn process_info(
        &mut self,
        info: &InfoDict,
        sink: &mut dyn OutputSink,
    ) -> Result<InfoDict, DownloadError> {
        // Held until the child exits; dropping it deletes the file.
        let mut info_file = None;
        let target = if is_resolved(info) {
            let mut file = tempfile::Builder::new()
                .prefix("ydlw-")
                .suffix(".info.json")
                .tempfile()?;
            serde_json::to_writer(&mut file, info)?;
            file.flush()?;
            let path = file.path().to_path_buf();
            info_file = Some(file);
            Target::InfoJson(path)
        } else {
            let url = source_url(info)
                .ok_or_else(|| DownloadError::Engine("descriptor has no url".to_string()))?;
            Target::Url(url.to_string())
        };

        let args = self.build_args(sink.params(), &target, info);
        log::debug!("[YtDlpEngine] spawning {} {:?}", self.binary.display(), args);

        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Keep terminal Ctrl-C away from the child; the session decides when it stops.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| {
                DownloadError::Engine(format!("failed to start {}: {}", self.binary.display(), e))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Engine("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::Engine("failed to capture stderr".to_string()))?;

        let mut stdout = BufReader::new(stdout);
        let mut stderr = BufReader::new(stderr);
        let mut stderr_tail = VecDeque::with_capacity(STDERR_TAIL);
        let mut last_filename = None;

        let pumped = pump_output(
            &mut stdout,
            &mut stderr,
            sink,
            &mut stderr_tail,
            &mut last_filename,
        )
        .await;

        if let Err(e) = pumped {
            if let Err(kill_err) = child.kill().await {
                log::warn!("[YtDlpEngine] failed to kill child: {}", kill_err);
            }
            log::info!("[YtDlpEngine] transfer stopped: {}", e);
            return Err(e);
        }

        let status = child.wait().await?;
        drop(info_file);

        if !status.success() {
            let tail: Vec<String> = stderr_tail.into_iter().collect();
            return Err(DownloadError::Engine(format!(
                "yt-dlp exited with {}: {}",
                status,
                tail.join("\n")
            )));
        }

        let mut result = info.clone();
        if let Some(path) = last_filename {
            result.insert("filepath".to_string(), serde_json::Value::String(path));
        }
        Ok(result)
    }
}

/// Reads both pipes until they close, routing each line to the sink.
///
/// Lines are decoded lossily: file names and console code pages are not
/// always UTF-8.
async fn pump_output<O, E>(
    stdout: &mut BufReader<O>,
    stderr: &mut BufReader<E>,
    sink: &mut dyn OutputSink,
    stderr_tail: &mut VecDeque<String>,
    last_filename: &mut Option<String>,
) -> Result<(), DownloadError>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut out_done = false;
    let mut err_done = false;

    while !(out_done && err_done) {
        // A branch that loses the race keeps its partial line in its buffer.
        tokio::select! {
            read = stdout.read_until(b'\n', &mut out_buf), if !out_done => {
                if read? == 0 {
                    out_done = true;
                } else {
                    let line = decode_line(&out_buf);
                    out_buf.clear();
                    handle_stdout_line(&line, sink, last_filename)?;
                }
            }
            read = stderr.read_until(b'\n', &mut err_buf), if !err_done => {
                if read? == 0 {
                    err_done = true;
                } else {
                    let line = decode_line(&err_buf);
                    err_buf.clear();
                    if stderr_tail.len() == STDERR_TAIL {
                        stderr_tail.pop_front();
                    }
                    stderr_tail.push_back(line.clone());
                    handle_stderr_line(&line, sink)?;
                }
            }
        }
    }
    Ok(())
}

/// One output line without its terminator.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn handle_stdout_line(
    line: &str,
    sink: &mut dyn OutputSink,
    last_filename: &mut Option<String>,
) -> Result<(), DownloadError> {
    let Some(payload) = line.strip_prefix(PROGRESS_MARKER) else {
        return sink.to_stdout(line, false, true);
    };

    // A garbled event still counts as a progress tick so cancellation is checked.
    let info: ProgressInfo = serde_json::from_str(payload).unwrap_or_else(|e| {
        log::debug!("[YtDlpEngine] unparseable progress line ({}): {}", e, payload);
        ProgressInfo::default()
    });
    if let Some(filename) = info.filename.as_deref().filter(|f| !f.is_empty()) {
        *last_filename = Some(filename.to_string());
    }

    match sink.progress(&info) {
        HookOutcome::Continue => Ok(()),
        HookOutcome::Cancel(reason) => Err(DownloadError::Canceled(reason)),
    }
}

fn handle_stderr_line(line: &str, sink: &mut dyn OutputSink) -> Result<(), DownloadError> {
    if let Some(rest) = line.strip_prefix("WARNING:") {
        sink.report_warning(rest.trim_start(), false)
    } else if let Some(rest) = line.strip_prefix("ERROR:") {
        sink.report_error(rest.trim_start())
    } else {
        sink.to_stderr(line, false)
    }
}

/// A descriptor the engine already resolved carries its extractor and id;
/// anything else is treated as a bare URL.
fn is_resolved(info: &InfoDict) -> bool {
    info.contains_key("extractor") && info.contains_key("id")
}

fn source_url(info: &InfoDict) -> Option<&str> {
    ["url", "webpage_url"]
        .iter()
        .find_map(|key| info.get(*key).and_then(|v| v.as_str()))
        .filter(|url| !url.is_empty())
}

/// `--list-extractors` prints one name per line, sometimes followed by a
/// parenthesised note such as `(CURRENTLY BROKEN)`.
fn parse_extractor_list(listing: &str) -> Vec<Extractor> {
    listing
        .lines()
        .filter_map(|line| line.split(" (").next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(Extractor::new)
        .collect()
}

async fn run_capture(binary: &Path, args: &[&str]) -> Result<String, DownloadError> {
    let output = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            DownloadError::Construction(format!("failed to run {}: {}", binary.display(), e))
        })?;

    if !output.status.success() {
        return Err(DownloadError::Construction(format!(
            "{} {:?} exited with {}: {}",
            binary.display(),
            args,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
