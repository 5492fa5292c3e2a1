//! Worker protocol round trips that require no model weights.

use std::io::Write;
use std::time::Duration;

use kiln::{Client, ContextHandle, Error, ModelHandle, ModelParams};

const TICK: Duration = Duration::from_secs(10);

#[tokio::test]
async fn worker_reports_ready() {
    let (client, worker) = Client::start().await.unwrap();
    client.shutdown().await.unwrap();
    worker.join();
}

#[tokio::test]
async fn free_model_with_unknown_handle_fails() {
    let (client, worker) = Client::start().await.unwrap();

    let err = client.free_model(ModelHandle::from_raw(42)).await.unwrap_err();
    match err {
        Error::UnknownHandle(msg) => assert!(msg.contains("model 42"), "got: {msg}"),
        other => panic!("expected UnknownHandle, got {other}"),
    }

    client.shutdown().await.unwrap();
    worker.join();
}

#[tokio::test]
async fn context_calls_with_unknown_handle_fail() {
    let (client, worker) = Client::start().await.unwrap();
    let bogus = ContextHandle::from_raw(7);

    assert!(matches!(
        client.edit(bogus, Some(0)).await.unwrap_err(),
        Error::UnknownHandle(_)
    ));
    assert!(matches!(
        client.tokenize(bogus, "hello").await.unwrap_err(),
        Error::UnknownHandle(_)
    ));
    assert!(matches!(
        client.free_context(bogus).await.unwrap_err(),
        Error::UnknownHandle(_)
    ));
    // Streaming calls reject unknown handles before the handshake.
    assert!(matches!(
        client.ingest(bogus).await.unwrap_err(),
        Error::UnknownHandle(_)
    ));

    client.shutdown().await.unwrap();
    worker.join();
}

#[tokio::test]
async fn new_context_requires_a_known_model() {
    let (client, worker) = Client::start().await.unwrap();

    let err = client
        .new_context(ModelHandle::from_raw(5), &kiln::ContextParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownHandle(_)));

    client.shutdown().await.unwrap();
    worker.join();
}

#[tokio::test]
async fn load_rejects_a_missing_file() {
    let (client, worker) = Client::start().await.unwrap();

    let err = tokio::time::timeout(
        TICK,
        client.load_model("/nonexistent/weights.gguf", &ModelParams::default()),
    )
    .await
    .expect("load should not hang")
    .unwrap_err();
    assert!(matches!(err, Error::NativeLoadFailure(_)), "got {err}");

    client.shutdown().await.unwrap();
    worker.join();
}

#[tokio::test]
async fn load_rejects_a_non_model_file() {
    let (client, worker) = Client::start().await.unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"definitely not model weights").unwrap();
    file.flush().unwrap();

    let err = tokio::time::timeout(
        TICK,
        client.load_model(file.path(), &ModelParams::default()),
    )
    .await
    .expect("load should not hang")
    .unwrap_err();
    assert!(matches!(err, Error::NativeLoadFailure(_)), "got {err}");

    client.shutdown().await.unwrap();
    worker.join();
}

/// Concurrent callers each get the response to their own request: every
/// error message names the handle that caller probed.
#[tokio::test]
async fn concurrent_requests_correlate_by_id() {
    let (client, worker) = Client::start().await.unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..16u32 {
        let client = client.clone();
        tasks.spawn(async move {
            let probe = 1000 + i;
            let err = client.free_model(ModelHandle::from_raw(probe)).await.unwrap_err();
            match err {
                Error::UnknownHandle(msg) => {
                    assert!(msg.contains(&format!("model {probe}")), "got: {msg}")
                }
                other => panic!("expected UnknownHandle, got {other}"),
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    client.shutdown().await.unwrap();
    worker.join();
}

#[tokio::test]
async fn calls_after_shutdown_fail_cleanly() {
    let (client, worker) = Client::start().await.unwrap();
    let survivor = client.clone();

    client.shutdown().await.unwrap();
    worker.join();

    let err = survivor.free_model(ModelHandle::from_raw(1)).await.unwrap_err();
    assert!(matches!(err, Error::ChannelClosed));
}
