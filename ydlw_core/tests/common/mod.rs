#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ydlw_core::{
    Callback, CallbackError, DownloadError, Engine, Extractor, HookOutcome, InfoDict, Message,
    OutputSink, ProgressInfo,
};

/// One thing the scripted engine does during `process_info`.
#[derive(Clone)]
pub enum Step {
    Stdout(String),
    Stderr(String),
    Warning(String),
    Progress(ProgressInfo),
    Fail(String),
}

/// An engine that replays a fixed list of steps against the sink.
pub struct ScriptedEngine {
    steps: Vec<Step>,
    available: Vec<Extractor>,
    registered: Vec<Extractor>,
    /// Every descriptor handed to `process_info`.
    pub calls: Arc<Mutex<Vec<InfoDict>>>,
}

impl ScriptedEngine {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            available: vec![Extractor::new("youtube"), Extractor::new("generic")],
            registered: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_extractors(&self) -> Vec<Extractor> {
        self.available.clone()
    }

    fn add_info_extractor(&mut self, extractor: Extractor) {
        self.registered.push(extractor);
    }

    fn extractors(&self) -> &[Extractor] {
        &self.registered
    }

    async fn process_info(
        &mut self,
        info: &InfoDict,
        sink: &mut dyn OutputSink,
    ) -> Result<InfoDict, DownloadError> {
        self.calls.lock().unwrap().push(info.clone());
        for step in &self.steps {
            match step {
                Step::Stdout(line) => sink.to_stdout(line, false, true)?,
                Step::Stderr(line) => sink.to_stderr(line, false)?,
                Step::Warning(line) => sink.report_warning(line, true)?,
                Step::Progress(p) => {
                    if let HookOutcome::Cancel(reason) = sink.progress(p) {
                        return Err(DownloadError::Canceled(reason));
                    }
                }
                Step::Fail(msg) => return Err(DownloadError::Engine(msg.clone())),
            }
        }
        Ok(info.clone())
    }
}

pub fn progress(json: serde_json::Value) -> ProgressInfo {
    serde_json::from_value(json).unwrap()
}

pub fn descriptor(json: serde_json::Value) -> InfoDict {
    serde_json::from_value(json).unwrap()
}

/// A callback that records every message and answers with `answer`.
pub fn recording_callback(answer: bool) -> (Callback, Arc<Mutex<Vec<Message>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: Callback = Box::new(move |msg: &Message| -> Result<bool, CallbackError> {
        sink.lock().unwrap().push(msg.clone());
        Ok(answer)
    });
    (callback, seen)
}

pub fn texts(seen: &Arc<Mutex<Vec<Message>>>) -> Vec<String> {
    seen.lock().unwrap().iter().map(|m| m.as_str().to_string()).collect()
}
