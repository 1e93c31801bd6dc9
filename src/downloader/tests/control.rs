use super::*;
use crate::engine::FilePaths;

const STALL_AT: u64 = 32 * 1024;

/// Downloader whose first request stalls after `STALL_AT` bytes
async fn stalling_downloader(data: &[u8]) -> TestDownloader {
    create_test_downloader(ScriptedFetcher::new(
        data.to_vec(),
        vec![Step::Stall { after: STALL_AT }],
        Step::Serve { cut_at: None },
    ))
    .await
}

#[tokio::test]
async fn test_pause_running_download_keeps_checkpoint() {
    let data = payload(100_000);
    let t = stalling_downloader(&data).await;

    t.downloader
        .enqueue(verified_descriptor("fw.zip", &data))
        .await
        .unwrap();
    wait_for_checkpoint(&t.downloader, "fw.zip", STALL_AT).await;

    t.downloader.pause("fw.zip").await.unwrap();

    assert_eq!(
        t.downloader.state("fw.zip").await.unwrap(),
        DownloadState::Paused
    );
    assert_eq!(
        t.downloader.db.get_checkpoint("fw.zip").await.unwrap(),
        Some(STALL_AT)
    );
    let paths = FilePaths::new(&t.config, "fw.zip");
    assert_eq!(std::fs::metadata(&paths.temp).unwrap().len(), STALL_AT);
    // Cancellation is not a failure
    assert!(!t
        .sink
        .records()
        .iter()
        .any(|r| matches!(r, Recorded::Failure(..))));

    t.downloader.resume("fw.zip").await.unwrap();
    wait_for_state(&t.downloader, "fw.zip", DownloadState::VerificationCompleted).await;

    assert_eq!(t.fetcher.calls(), vec![None, Some(STALL_AT)]);
    assert_eq!(std::fs::read(&paths.final_path).unwrap(), data);
}

#[tokio::test]
async fn test_pause_already_paused() {
    let data = payload(100_000);
    let t = stalling_downloader(&data).await;

    t.downloader
        .enqueue(verified_descriptor("fw.zip", &data))
        .await
        .unwrap();
    wait_for_checkpoint(&t.downloader, "fw.zip", STALL_AT).await;

    t.downloader.pause("fw.zip").await.unwrap();
    // Pause it again (should be idempotent)
    t.downloader.pause("fw.zip").await.unwrap();

    assert_eq!(
        t.downloader.state("fw.zip").await.unwrap(),
        DownloadState::Paused
    );
}

#[tokio::test]
async fn test_pause_racing_completion_never_hides_finished_download() {
    let data = payload(20_000);
    let t = create_test_downloader(ScriptedFetcher::serving(data.clone())).await;

    for i in 0..20 {
        let filename = format!("fw-{i}.zip");
        t.downloader
            .enqueue(verified_descriptor(&filename, &data))
            .await
            .unwrap();
        for _ in 0..i {
            tokio::task::yield_now().await;
        }

        let paused = t.downloader.pause(&filename).await;
        t.downloader.executor.wait_idle().await;

        let state = t.downloader.state(&filename).await.unwrap();
        let final_path = FilePaths::new(&t.config, &filename).final_path;
        assert!(
            !(state == DownloadState::Paused && final_path.exists()),
            "{filename} relocated but reported paused"
        );
        match paused {
            Ok(()) => {}
            Err(Error::Download(DownloadError::InvalidState { .. })) => {
                assert_ne!(state, DownloadState::Paused)
            }
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_pause_completed_download() {
    let data = payload(10_000);
    let t = create_test_downloader(ScriptedFetcher::serving(data.clone())).await;

    t.downloader
        .enqueue(verified_descriptor("fw.zip", &data))
        .await
        .unwrap();
    wait_for_state(&t.downloader, "fw.zip", DownloadState::VerificationCompleted).await;

    let err = t.downloader.pause("fw.zip").await.unwrap_err();
    match err {
        Error::Download(DownloadError::InvalidState {
            operation,
            current_state,
            ..
        }) => {
            assert_eq!(operation, "pause");
            assert_eq!(current_state, "VerificationCompleted");
        }
        other => panic!("expected InvalidState, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resume_requires_paused() {
    let data = payload(1_000);
    let t = create_test_downloader(ScriptedFetcher::new(data.clone(), vec![], Step::Status(404)))
        .await;

    t.downloader
        .enqueue(verified_descriptor("fw.zip", &data))
        .await
        .unwrap();
    wait_for_state(&t.downloader, "fw.zip", DownloadState::Failed).await;

    let err = t.downloader.resume("fw.zip").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Download(DownloadError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_retry_requires_failure() {
    let data = payload(1_000);
    let t = create_test_downloader(ScriptedFetcher::serving(data.clone())).await;

    t.downloader
        .enqueue(verified_descriptor("fw.zip", &data))
        .await
        .unwrap();
    wait_for_state(&t.downloader, "fw.zip", DownloadState::VerificationCompleted).await;

    let err = t.downloader.retry("fw.zip").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Download(DownloadError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_retry_after_verification_failure_downloads_again() {
    let data = payload(20_000);
    let t = create_test_downloader(ScriptedFetcher::serving(data.clone())).await;

    t.downloader
        .enqueue(descriptor("fw.zip", data.len() as u64, Some("ffffffffffffffffffffffffffffffff")))
        .await
        .unwrap();
    wait_for_state(&t.downloader, "fw.zip", DownloadState::VerificationFailed).await;

    t.downloader.retry("fw.zip").await.unwrap();
    wait_for_state(&t.downloader, "fw.zip", DownloadState::VerificationFailed).await;

    assert_eq!(t.fetcher.calls(), vec![None, None]);
}

#[tokio::test]
async fn test_cancel_running_download_discards_partial() {
    let data = payload(100_000);
    let t = stalling_downloader(&data).await;

    t.downloader
        .enqueue(verified_descriptor("fw.zip", &data))
        .await
        .unwrap();
    wait_for_checkpoint(&t.downloader, "fw.zip", STALL_AT).await;

    t.downloader.cancel("fw.zip").await.unwrap();

    assert_eq!(
        t.downloader.state("fw.zip").await.unwrap(),
        DownloadState::NotDownloading
    );
    assert_eq!(t.downloader.db.get_checkpoint("fw.zip").await.unwrap(), None);
    let paths = FilePaths::new(&t.config, "fw.zip");
    assert!(!paths.temp.exists());
    assert!(!paths.final_path.exists());
}

#[tokio::test]
async fn test_cancel_verified_download_revokes_install() {
    let data = payload(10_000);
    let t = create_test_downloader(ScriptedFetcher::serving(data.clone())).await;

    t.downloader
        .enqueue(verified_descriptor("fw.zip", &data))
        .await
        .unwrap();
    wait_for_state(&t.downloader, "fw.zip", DownloadState::VerificationCompleted).await;

    t.downloader.cancel("fw.zip").await.unwrap();

    assert!(t.sink.records().contains(&Recorded::InstallRevoked));
    assert!(!FilePaths::new(&t.config, "fw.zip").final_path.exists());
    assert_eq!(
        t.downloader.state("fw.zip").await.unwrap(),
        DownloadState::NotDownloading
    );
}

#[tokio::test]
async fn test_delete_forgets_descriptor() {
    let data = payload(10_000);
    let t = create_test_downloader(ScriptedFetcher::serving(data.clone())).await;

    t.downloader
        .enqueue(verified_descriptor("fw.zip", &data))
        .await
        .unwrap();
    wait_for_state(&t.downloader, "fw.zip", DownloadState::VerificationCompleted).await;

    t.downloader.delete("fw.zip").await.unwrap();

    let err = t.downloader.state("fw.zip").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Download(DownloadError::NotFound { .. })
    ));
    assert!(t.downloader.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_enqueue_while_active_is_rejected() {
    let data = payload(100_000);
    let t = stalling_downloader(&data).await;

    t.downloader
        .enqueue(verified_descriptor("fw.zip", &data))
        .await
        .unwrap();
    wait_for_checkpoint(&t.downloader, "fw.zip", STALL_AT).await;

    let err = t
        .downloader
        .enqueue(verified_descriptor("fw.zip", &data))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Download(DownloadError::AlreadyActive { .. })
    ));

    t.downloader.pause("fw.zip").await.unwrap();
}

#[tokio::test]
async fn test_enqueue_same_descriptor_resumes() {
    let data = payload(100_000);
    let t = stalling_downloader(&data).await;
    let desc = verified_descriptor("fw.zip", &data);

    t.downloader.enqueue(desc.clone()).await.unwrap();
    wait_for_checkpoint(&t.downloader, "fw.zip", STALL_AT).await;
    t.downloader.pause("fw.zip").await.unwrap();

    t.downloader.enqueue(desc).await.unwrap();
    wait_for_state(&t.downloader, "fw.zip", DownloadState::VerificationCompleted).await;

    assert_eq!(t.fetcher.calls(), vec![None, Some(STALL_AT)]);
}

#[tokio::test]
async fn test_enqueue_new_version_discards_old_partial() {
    let data = payload(100_000);
    let t = stalling_downloader(&data).await;

    t.downloader
        .enqueue(verified_descriptor("fw.zip", &data))
        .await
        .unwrap();
    wait_for_checkpoint(&t.downloader, "fw.zip", STALL_AT).await;
    t.downloader.pause("fw.zip").await.unwrap();

    let mut newer = verified_descriptor("fw.zip", &data);
    newer.version_label = "1.2.4".to_string();
    t.downloader.enqueue(newer).await.unwrap();
    wait_for_state(&t.downloader, "fw.zip", DownloadState::VerificationCompleted).await;

    assert_eq!(t.fetcher.calls(), vec![None, None]);
    assert_eq!(
        t.downloader.info("fw.zip").await.unwrap().descriptor.version_label,
        "1.2.4"
    );
}

#[tokio::test]
async fn test_unknown_filename_is_not_found() {
    let t = create_test_downloader(ScriptedFetcher::serving(payload(10))).await;

    for result in [
        t.downloader.pause("nope.zip").await,
        t.downloader.resume("nope.zip").await,
        t.downloader.cancel("nope.zip").await,
        t.downloader.retry("nope.zip").await,
    ] {
        assert!(matches!(
            result,
            Err(Error::Download(DownloadError::NotFound { .. }))
        ));
    }
}
