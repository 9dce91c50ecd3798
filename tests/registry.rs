mod common;

use common::TestBoard;
use file_board::error::AppError;
use file_board::models::{MessagePost, Stats};
use file_board::services::{
    LifecycleService, PostService, ReconcileService, StatsService, UploadService,
};

async fn message(board: &TestBoard, title: &str) -> i64 {
    UploadService::post_message(
        &board.state.db,
        MessagePost {
            title: title.to_string(),
            content: Some(format!("{} body", title)),
            submitter_address: String::new(),
        },
    )
    .await
    .unwrap()
    .id
}

#[tokio::test]
async fn listing_is_newest_first_and_hides_deleted() {
    let board = TestBoard::new().await;
    let db = &board.state.db;

    let first = message(&board, "first").await;
    let second = board.upload("second.txt", b"2").await.id;
    let third = message(&board, "third").await;

    let ids: Vec<i64> = PostService::list_active(db)
        .await
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(ids, vec![third, second, first]);

    LifecycleService::delete(db, board.blobs(), second).await.unwrap();

    let active: Vec<i64> = PostService::list_active(db)
        .await
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(active, vec![third, first]);

    let all = PostService::list_all(db).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().any(|p| p.id == second && p.is_deleted()));
}

#[tokio::test]
async fn download_policy() {
    let board = TestBoard::new().await;
    let db = &board.state.db;

    let file_post = board.upload("a.txt", b"download me").await;
    let note = message(&board, "note").await;

    let target = PostService::download_target(db, file_post.id).await.unwrap();
    assert_eq!(target.post_id, file_post.id);
    assert_eq!(target.display_name, "a.txt");
    assert_eq!(target.media_type, "text/plain");
    assert_eq!(target.size_bytes, 11);
    assert!(board.blobs().open(&target.storage_path).await.is_ok());

    assert!(matches!(
        PostService::download_target(db, note).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        PostService::download_target(db, 12345).await,
        Err(AppError::NotFound(_))
    ));

    LifecycleService::delete(db, board.blobs(), file_post.id)
        .await
        .unwrap();
    assert!(matches!(
        PostService::download_target(db, file_post.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn other_references_count_every_state() {
    let board = TestBoard::new().await;
    let db = &board.state.db;

    let a = board.upload("a", b"shared").await;
    let b = board.upload("b", b"shared").await;
    let path = a.storage_path().unwrap().to_string();

    assert_eq!(
        PostService::count_other_references(db.pool(), a.id, &path)
            .await
            .unwrap(),
        1
    );

    // b is deleted but still records the same object, so a stays in place too
    LifecycleService::delete(db, board.blobs(), b.id).await.unwrap();
    assert_eq!(
        PostService::count_other_references(db.pool(), a.id, &path)
            .await
            .unwrap(),
        1
    );

    let deleted = LifecycleService::delete(db, board.blobs(), a.id).await.unwrap();
    assert_eq!(deleted.storage_path(), Some(path.as_str()));
    assert!(std::path::Path::new(&path).exists());
}

#[tokio::test]
async fn file_reference_updates_only_touch_file_posts() {
    let board = TestBoard::new().await;
    let db = &board.state.db;
    let post = board.upload("a.txt", b"x").await;
    let note = message(&board, "note").await;

    let mut conn = db.pool().acquire().await.unwrap();
    PostService::update_file_reference(&mut conn, post.id, "elsewhere", "a.txt")
        .await
        .unwrap();
    let moved = PostService::get(&mut *conn, post.id).await.unwrap();
    assert_eq!(moved.storage_path(), Some("elsewhere"));
    assert_eq!(moved.file(), post.file());

    assert!(matches!(
        PostService::update_file_reference(&mut conn, note, "elsewhere", "n").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn deleted_at_is_never_before_created_at() {
    let board = TestBoard::new().await;
    let db = &board.state.db;
    let id = message(&board, "timed").await;

    let deleted = LifecycleService::delete(db, board.blobs(), id).await.unwrap();
    let deleted_at = deleted.deleted_at.clone().unwrap();
    assert!(deleted_at >= deleted.created_at);
}

#[tokio::test]
async fn stats_count_posts_and_distinct_files() {
    let board = TestBoard::new().await;
    let db = &board.state.db;

    assert_eq!(StatsService::collect(db).await.unwrap(), Stats::default());

    board.upload("a.txt", b"hello").await;
    let b = board.upload("b.txt", b"hello").await;
    board.upload("c.bin", b"other bytes").await;
    message(&board, "note").await;
    LifecycleService::delete(db, board.blobs(), b.id).await.unwrap();

    let stats = StatsService::collect(db).await.unwrap();
    assert_eq!(stats.total_posts, 4);
    assert_eq!(stats.active_posts, 3);
    assert_eq!(stats.deleted_posts, 1);
    assert_eq!(stats.file_posts, 3);
    assert_eq!(stats.message_posts, 1);
    assert_eq!(stats.unique_files, 2);
    assert_eq!(stats.total_storage_bytes, 16);
    assert!((stats.total_storage_mb - 16.0 / 1_048_576.0).abs() < 1e-12);
}

#[tokio::test]
async fn reconcile_reports_missing_objects() {
    let board = TestBoard::new().await;
    let db = &board.state.db;

    let healthy = board.upload("ok.txt", b"present").await;
    let broken = board.upload("broken.txt", b"about to vanish").await;
    assert!(ReconcileService::scan(db, board.blobs())
        .await
        .unwrap()
        .is_empty());

    std::fs::remove_file(broken.storage_path().unwrap()).unwrap();

    let mismatches = ReconcileService::scan(db, board.blobs()).await.unwrap();
    assert_eq!(mismatches.len(), 1);
    let m = &mismatches[0];
    assert_eq!(m.post_id, broken.id);
    assert!(!m.deleted);
    assert_eq!(m.recorded_path, broken.storage_path().unwrap());
    assert_eq!(m.canonical_path, broken.storage_path().unwrap());
    assert!(!m.canonical_exists);
    assert_ne!(m.post_id, healthy.id);
}
