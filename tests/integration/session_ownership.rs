//! Session lookup, ownership and deletion.

use hyodo::error::CompanionError;
use hyodo::TurnRequest;

use crate::helpers::{ELDER, STRANGER, Harness, jan1};

#[tokio::test]
async fn foreign_session_is_unauthorized_and_untouched() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    let mine = pipeline
        .handle_at(TurnRequest::text(ELDER, "안녕"), jan1(10, 0))
        .await
        .unwrap();

    let err = pipeline
        .handle_at(
            TurnRequest::text(STRANGER, "남의 대화").in_session(mine.session_id),
            jan1(10, 1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CompanionError::Unauthorized(_)));
    assert_eq!(pipeline.message_log().count(mine.session_id).unwrap(), 2);

    assert!(matches!(
        pipeline.history(STRANGER, mine.session_id, None),
        Err(CompanionError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn unknown_session_and_unknown_user_are_not_found() {
    let h = Harness::new();
    let pipeline = h.pipeline();

    assert!(matches!(
        pipeline
            .handle_at(TurnRequest::text(ELDER, "안녕").in_session(999), jan1(10, 0))
            .await,
        Err(CompanionError::NotFound(_))
    ));
    assert!(matches!(
        pipeline.handle_at(TurnRequest::text(404, "안녕"), jan1(10, 0)).await,
        Err(CompanionError::NotFound(_))
    ));
    assert!(pipeline.sessions(ELDER).unwrap().is_empty());
}

#[tokio::test]
async fn sessions_are_listed_newest_first() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    let older = pipeline
        .handle_at(TurnRequest::text(ELDER, "아침"), jan1(8, 0))
        .await
        .unwrap();
    let newer = pipeline
        .handle_at(TurnRequest::text(ELDER, "저녁"), jan1(19, 0))
        .await
        .unwrap();

    let ids: Vec<i64> = pipeline.sessions(ELDER).unwrap().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![newer.session_id, older.session_id]);
    assert!(pipeline.sessions(STRANGER).unwrap().is_empty());
}

#[tokio::test]
async fn delete_removes_session_and_messages() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    let reply = pipeline
        .handle_at(TurnRequest::text(ELDER, "안녕"), jan1(10, 0))
        .await
        .unwrap();

    assert!(matches!(
        pipeline.delete_session(STRANGER, reply.session_id).await,
        Err(CompanionError::Unauthorized(_))
    ));
    pipeline.delete_session(ELDER, reply.session_id).await.unwrap();

    assert!(pipeline.sessions(ELDER).unwrap().is_empty());
    assert_eq!(pipeline.message_log().count(reply.session_id).unwrap(), 0);
    assert!(matches!(
        pipeline.history(ELDER, reply.session_id, None),
        Err(CompanionError::NotFound(_))
    ));
}

#[tokio::test]
async fn concurrent_turns_in_one_session_keep_pairs_together() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    let first = pipeline
        .handle_at(TurnRequest::text(ELDER, "시작"), jan1(10, 0))
        .await
        .unwrap();
    let id = first.session_id;

    let (a, b) = tokio::join!(
        pipeline.handle_at(TurnRequest::text(ELDER, "하나").in_session(id), jan1(10, 1)),
        pipeline.handle_at(TurnRequest::text(ELDER, "둘").in_session(id), jan1(10, 1)),
    );
    a.unwrap();
    b.unwrap();

    let history = pipeline.history(ELDER, id, Some(10)).unwrap();
    assert_eq!(history.len(), 6);
    for pair in history.chunks(2) {
        assert_eq!(pair[0].role, hyodo::store::Role::User);
        assert_eq!(pair[1].role, hyodo::store::Role::Assistant);
    }
}
