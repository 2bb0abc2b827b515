mod common;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::json;

use common::{descriptor, progress, recording_callback, texts, ScriptedEngine, Step};
use ydlw_core::{
    std_headers, CancelReason, DownloadError, DownloadSession, Downloader, Engine, InfoDict,
    ParamOverrides, WrapperConfig,
};

type Calls = Arc<Mutex<Vec<InfoDict>>>;

/// Builds a downloader whose factory hands out scripted engines and counts
/// how often it was invoked. The returned `calls` sees every descriptor the
/// engine receives.
fn scripted_downloader(
    config: WrapperConfig,
    session: Arc<DownloadSession>,
    steps: Vec<Step>,
) -> (Downloader<ScriptedEngine>, Arc<AtomicUsize>, Calls) {
    let built = Arc::new(AtomicUsize::new(0));
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));

    let counter = Arc::clone(&built);
    let shared_calls = Arc::clone(&calls);
    let factory = Box::new(
        move |_config: WrapperConfig| -> BoxFuture<'static, Result<ScriptedEngine, DownloadError>> {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut engine = ScriptedEngine::new(steps.clone());
            engine.calls = Arc::clone(&shared_calls);
            Box::pin(async move { Ok(engine) })
        },
    );
    (Downloader::new(config, session, factory), built, calls)
}

fn failing_downloader(session: Arc<DownloadSession>) -> (Downloader<ScriptedEngine>, Arc<AtomicUsize>) {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    let factory = Box::new(
        move |_config: WrapperConfig| -> BoxFuture<'static, Result<ScriptedEngine, DownloadError>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                Err(DownloadError::Construction("yt-dlp not found".to_string()))
            })
        },
    );
    (Downloader::new(WrapperConfig::default(), session, factory), built)
}

// ---------------------------------------------------------------
// header injection
// ---------------------------------------------------------------

#[tokio::test]
async fn test_download_injects_standard_headers_when_missing() {
    let session = Arc::new(DownloadSession::new());
    let (mut downloader, _, calls) =
        scripted_downloader(WrapperConfig::default(), session, vec![]);

    downloader
        .download(descriptor(json!({"url": "https://example.com/v"})))
        .await
        .unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let expected = serde_json::to_value(std_headers()).unwrap();
    assert_eq!(calls[0]["http_headers"], expected);
    assert_eq!(calls[0]["url"], "https://example.com/v");
}

#[tokio::test]
async fn test_download_keeps_existing_headers() {
    let session = Arc::new(DownloadSession::new());
    let (mut downloader, _, calls) =
        scripted_downloader(WrapperConfig::default(), session, vec![]);

    let info = descriptor(json!({
        "url": "https://example.com/v",
        "http_headers": {"Referer": "https://example.com/"}
    }));
    downloader.download(info.clone()).await.unwrap();

    assert_eq!(calls.lock().unwrap()[0], info);
}

#[tokio::test]
async fn test_download_uses_configured_default_headers() {
    let mut headers = BTreeMap::new();
    headers.insert("User-Agent".to_string(), "ydlw-test".to_string());
    let config = WrapperConfig {
        default_headers: Some(headers),
        ..WrapperConfig::default()
    };
    let session = Arc::new(DownloadSession::new());
    let (mut downloader, _, calls) = scripted_downloader(config, session, vec![]);

    downloader
        .download(descriptor(json!({"url": "https://example.com/v"})))
        .await
        .unwrap();

    assert_eq!(
        calls.lock().unwrap()[0]["http_headers"],
        json!({"User-Agent": "ydlw-test"})
    );
}

// ---------------------------------------------------------------
// wrapper construction
// ---------------------------------------------------------------

#[tokio::test]
async fn test_engine_built_once_and_reused() {
    let session = Arc::new(DownloadSession::new());
    let (mut downloader, built, calls) =
        scripted_downloader(WrapperConfig::default(), session, vec![]);

    for _ in 0..3 {
        downloader
            .download(descriptor(json!({"url": "https://example.com/v"})))
            .await
            .unwrap();
    }

    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert_eq!(calls.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_wrapper_registers_session_hook_and_default_extractors() {
    let config = WrapperConfig {
        blacklist: vec!["generic".to_string()],
        ..WrapperConfig::default()
    };
    let session = Arc::new(DownloadSession::new());
    let (mut downloader, _, _) = scripted_downloader(config, session, vec![]);

    let ytdl = downloader.get_ytdl().await.unwrap();
    assert_eq!(ytdl.progress_hook_count(), 1);
    let names: Vec<&str> = ytdl.engine().extractors().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["youtube"]);
}

#[tokio::test]
async fn test_construction_failure_is_remembered() {
    let session = Arc::new(DownloadSession::new());
    let (mut downloader, built) = failing_downloader(session);

    let first = downloader
        .download(descriptor(json!({"url": "https://example.com/v"})))
        .await;
    let second = downloader
        .download(descriptor(json!({"url": "https://example.com/w"})))
        .await;

    match (first, second) {
        (Err(DownloadError::Construction(a)), Err(DownloadError::Construction(b))) => {
            assert!(a.contains("yt-dlp not found"));
            assert_eq!(a, b);
        }
        other => panic!("expected two construction errors, got {:?}", other),
    }
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------
// outcomes
// ---------------------------------------------------------------

#[tokio::test]
async fn test_cancel_then_next_download_runs() {
    let session = Arc::new(DownloadSession::new());
    let (callback, seen) = recording_callback(true);
    session.set_callback(Some(callback));

    let steps = vec![Step::Progress(progress(json!({
        "status": "downloading",
        "downloaded_bytes": 10,
        "total_bytes": 100
    })))];
    let (mut downloader, _, _) =
        scripted_downloader(WrapperConfig::default(), Arc::clone(&session), steps);

    session.request_cancel();
    let err = downloader
        .download(descriptor(json!({"url": "https://example.com/v"})))
        .await
        .unwrap_err();
    assert_eq!(err.cancel_reason(), Some(CancelReason::AbortRequested));
    assert!(texts(&seen).is_empty());

    // The flag was consumed by the first download.
    downloader
        .download(descriptor(json!({"url": "https://example.com/v"})))
        .await
        .unwrap();
    assert_eq!(texts(&seen), vec!["Downloading (10%):"]);
}

#[tokio::test]
async fn test_engine_error_propagates() {
    let session = Arc::new(DownloadSession::new());
    let steps = vec![Step::Fail("Unsupported URL".to_string())];
    let (mut downloader, _, _) =
        scripted_downloader(WrapperConfig::default(), session, steps);

    let err = downloader
        .download(descriptor(json!({"url": "https://example.com/v"})))
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Engine(ref m) if m == "Unsupported URL"));
    assert!(!err.is_canceled());
}

// ---------------------------------------------------------------
// per-download parameters
// ---------------------------------------------------------------

#[tokio::test]
async fn test_download_with_params_resets_previous_format() {
    let session = Arc::new(DownloadSession::new());
    let (mut downloader, _, _) =
        scripted_downloader(WrapperConfig::default(), session, vec![]);

    let first = ParamOverrides {
        format: Some("bestaudio".to_string()),
        matchtitle: Some("live".to_string()),
        ..ParamOverrides::default()
    };
    downloader
        .download_with_params(descriptor(json!({"url": "https://example.com/v"})), &first)
        .await
        .unwrap();
    {
        let params = downloader.get_ytdl().await.unwrap().params();
        assert_eq!(params.format.as_deref(), Some("bestaudio"));
        assert_eq!(params.matchtitle.as_deref(), Some("live"));
    }

    downloader
        .download_with_params(
            descriptor(json!({"url": "https://example.com/w"})),
            &ParamOverrides::default(),
        )
        .await
        .unwrap();
    let params = downloader.get_ytdl().await.unwrap().params();
    assert_eq!(params.format, None);
    assert_eq!(params.matchtitle, None);
}

#[tokio::test]
async fn test_configured_overrides_survive_reset() {
    let config = WrapperConfig {
        override_params: ParamOverrides {
            format: Some("best[height<=720]".to_string()),
            ..ParamOverrides::default()
        },
        ..WrapperConfig::default()
    };
    let session = Arc::new(DownloadSession::new());
    let (mut downloader, _, _) = scripted_downloader(config, session, vec![]);

    downloader
        .download_with_params(
            descriptor(json!({"url": "https://example.com/v"})),
            &ParamOverrides::default(),
        )
        .await
        .unwrap();

    let params = downloader.get_ytdl().await.unwrap().params();
    assert_eq!(params.format.as_deref(), Some("best[height<=720]"));
}
