// ABOUTME: Integration tests for the Backup/Restore subprocess pipeline (C9)
// ABOUTME: shells out to pg_dump/pg_restore, so these need a live target named by TEST_TARGET_URL

use pg_sync_engine::backup::{create_backup, restore_backup, BackupStatus};

#[tokio::test]
#[ignore] // Requires pg_dump/pg_restore on PATH and a live target with a `backup_probe` table
async fn create_backup_produces_a_checksummed_archive() {
    let target_url = std::env::var("TEST_TARGET_URL").expect("TEST_TARGET_URL not set");

    let metadata = create_backup(&target_url, "backup-test-job", "backup-test-conn", &["backup_probe".to_string()])
        .await
        .unwrap();

    assert_eq!(metadata.status, BackupStatus::Completed);
    assert!(metadata.archive_path.is_some());
    assert!(metadata.checksum.is_some());
    assert!(metadata.size_bytes > 0);
}

#[tokio::test]
#[ignore] // Requires pg_dump/pg_restore on PATH and a live target with a `backup_probe` table
async fn restore_backup_consumes_the_archive_exactly_once() {
    let target_url = std::env::var("TEST_TARGET_URL").expect("TEST_TARGET_URL not set");

    let mut metadata = create_backup(&target_url, "restore-test-job", "restore-test-conn", &["backup_probe".to_string()])
        .await
        .unwrap();
    assert_eq!(metadata.status, BackupStatus::Completed);

    restore_backup(&target_url, &mut metadata).await.unwrap();
    assert!(metadata.archive_path.is_none());

    // The archive was removed on success; a second restore attempt must
    // fail fast rather than silently restoring nothing.
    let second_attempt = restore_backup(&target_url, &mut metadata).await;
    assert!(second_attempt.is_err());
}
