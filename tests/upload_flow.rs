mod common;

use std::time::Duration;

use alistfile::ops::{self, ListResponse};
use alistfile::UploadState;
use bytes::Bytes;
use common::MockBackend;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn begin_then_receive_uploads_to_current_directory() {
    let backend = MockBackend::seeded();
    let state = common::shared_state(backend.clone());

    ops::list(&state, "alice", "").await.unwrap();
    ops::list(&state, "alice", "1").await.unwrap(); // descend into /docs
    let begun = ops::begin_upload(&state, "alice").await.unwrap();
    assert_eq!(begun.target_path, "/docs");

    let receipt = ops::receive_upload(&state, "alice", "report.pdf", Bytes::from_static(b"pdf!"))
        .await
        .unwrap();
    assert_eq!(receipt.remote_path, "/docs/report.pdf");
    assert_eq!(receipt.size_bytes, 4);
    {
        let uploaded = backend.uploaded.lock().unwrap();
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0], ("/docs/report.pdf".to_string(), 4));
    }

    // Success disarms the session.
    assert_eq!(
        ops::upload_status(&state, "alice").await,
        UploadState::Inactive
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upload_invalidates_cached_target_listing() {
    let backend = MockBackend::seeded();
    let state = common::shared_state(backend.clone());

    ops::list(&state, "alice", "/docs").await.unwrap();
    let before = backend.list_count();

    ops::begin_upload(&state, "alice").await.unwrap();
    ops::receive_upload(&state, "alice", "new.txt", Bytes::from_static(b"hi"))
        .await
        .unwrap();

    // The cached /docs listing was dropped, so the re-list refetches and
    // already shows the uploaded file.
    let view = match ops::list(&state, "alice", "").await.unwrap() {
        ListResponse::Listing(view) => view,
        ListResponse::Download(_) => panic!("expected a listing"),
    };
    assert_eq!(backend.list_count(), before + 1);
    assert!(view.entries.iter().any(|e| e.name == "new.txt"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_upload_keeps_the_window_open() {
    let backend = MockBackend::seeded();
    let state = common::shared_state(backend.clone());

    ops::list(&state, "alice", "/docs").await.unwrap();
    ops::begin_upload(&state, "alice").await.unwrap();

    backend.set_fail_uploads(true);
    let err = ops::receive_upload(&state, "alice", "draft.txt", Bytes::from_static(b"v1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "UNREACHABLE");
    // Nothing landed, so the session must still be waiting for a resend.
    assert!(matches!(
        ops::upload_status(&state, "alice").await,
        UploadState::Awaiting { .. }
    ));

    backend.set_fail_uploads(false);
    let receipt = ops::receive_upload(&state, "alice", "draft.txt", Bytes::from_static(b"v2"))
        .await
        .unwrap();
    assert_eq!(receipt.remote_path, "/docs/draft.txt");
    assert_eq!(
        ops::upload_status(&state, "alice").await,
        UploadState::Inactive
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn receive_without_begin_is_rejected() {
    let backend = MockBackend::seeded();
    let state = common::shared_state(backend.clone());
    let err = ops::receive_upload(&state, "alice", "a.txt", Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NO_ACTIVE_UPLOAD");
    assert_eq!(backend.transfer_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_disarms_and_is_idempotent() {
    let backend = MockBackend::seeded();
    let state = common::shared_state(backend);

    ops::begin_upload(&state, "alice").await.unwrap();
    assert!(ops::cancel_upload(&state, "alice").await.unwrap());
    assert!(!ops::cancel_upload(&state, "alice").await.unwrap());

    let err = ops::receive_upload(&state, "alice", "a.txt", Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NO_ACTIVE_UPLOAD");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_upload_keeps_the_window_armed() {
    let backend = MockBackend::seeded();
    let state = common::shared_state_with(backend.clone(), |config| {
        config.max_upload_size_mb = 1;
    });

    ops::begin_upload(&state, "alice").await.unwrap();
    let big = Bytes::from(vec![0u8; 2 * 1024 * 1024]);
    let err = ops::receive_upload(&state, "alice", "big.bin", big)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TOO_LARGE");
    assert_eq!(backend.transfer_count(), 0);

    // A retry with a smaller file inside the same window still lands.
    let receipt = ops::receive_upload(&state, "alice", "small.bin", Bytes::from_static(b"ok"))
        .await
        .unwrap();
    assert_eq!(receipt.remote_path, "/small.bin");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_file_expires_the_session() {
    let backend = MockBackend::seeded();
    let state = common::shared_state_with(backend.clone(), |config| {
        config.upload_timeout_secs = 0.05;
    });

    ops::begin_upload(&state, "alice").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let err = ops::receive_upload(&state, "alice", "late.txt", Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "UPLOAD_EXPIRED");
    assert_eq!(
        ops::upload_status(&state, "alice").await,
        UploadState::Expired
    );
    assert_eq!(backend.transfer_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reissued_begin_restarts_the_window() {
    let backend = MockBackend::seeded();
    let state = common::shared_state_with(backend, |config| {
        config.upload_timeout_secs = 1.0;
    });

    ops::begin_upload(&state, "alice").await.unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;
    ops::begin_upload(&state, "alice").await.unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;
    // 1.4s after the first begin but only 0.7s after the second.
    assert!(
        ops::receive_upload(&state, "alice", "just-in-time.txt", Bytes::from_static(b"x"))
            .await
            .is_ok()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hostile_file_names_are_sanitized() {
    let backend = MockBackend::seeded();
    let state = common::shared_state(backend);

    ops::list(&state, "alice", "/docs").await.unwrap();
    ops::begin_upload(&state, "alice").await.unwrap();
    let receipt = ops::receive_upload(
        &state,
        "alice",
        "../..\\na:me?.txt",
        Bytes::from_static(b"x"),
    )
    .await
    .unwrap();
    assert!(receipt.remote_path.starts_with("/docs/"));
    let name = &receipt.remote_path["/docs/".len()..];
    assert!(!name.contains('/'));
    assert!(!name.contains(':'));
    assert!(!name.contains('?'));
    assert!(!name.starts_with('.'));
    assert!(!name.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sweep_marks_overdue_sessions_expired() {
    let backend = MockBackend::seeded();
    let state = common::shared_state_with(backend, |config| {
        config.upload_timeout_secs = 0.05;
    });

    ops::begin_upload(&state, "alice").await.unwrap();
    ops::begin_upload(&state, "bob").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let expired = state
        .sessions
        .sweep_uploads(alistfile::now_ts(), 0.05);
    assert_eq!(expired, 2);
    assert_eq!(
        ops::upload_status(&state, "alice").await,
        UploadState::Expired
    );
}
