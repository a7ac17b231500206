//! Calendar commands spoken through the reply pipeline.

use chrono::NaiveDate;
use hyodo::TurnRequest;
use hyodo::identity::IdentityStore;

use crate::helpers::{ELDER, GUARDIAN, Harness, at, jan1};

#[tokio::test]
async fn add_repairs_missing_datetime_from_utterance() {
    let h = Harness::new();
    h.model.script(r#"{"action":"ADD","title":"병원 예약","startDateTime":null}"#);
    let pipeline = h.pipeline();

    let reply = pipeline
        .handle_at(TurnRequest::text(ELDER, "내일 2시에 병원 예약 잡아줘"), jan1(10, 0))
        .await
        .unwrap();

    assert_eq!(reply.action, "ADD");
    assert_eq!(reply.reply, "일정을 등록했어요. (병원 예약, 1월 2일 14:00)");

    let events = pipeline
        .calendar()
        .events_on(ELDER, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap())
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].start_at, at(2, 14, 0));
    assert_eq!(events[0].alarm_at, Some(at(2, 13, 50)));
    assert!(!events[0].alarm_sent);
}

#[tokio::test]
async fn add_without_title_asks_for_one_and_creates_nothing() {
    let h = Harness::new();
    h.model.script(r#"{"action":"ADD","startDateTime":"2025-01-02T14:00:00"}"#);
    let pipeline = h.pipeline();

    let reply = pipeline
        .handle_at(TurnRequest::text(ELDER, "내일 2시에 잡아줘"), jan1(10, 0))
        .await
        .unwrap();

    assert_eq!(reply.reply, "어떤 일정인지 제목을 말씀해 주시겠어요?");
    assert!(pipeline
        .calendar()
        .events_on(ELDER, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap())
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn check_on_an_empty_day() {
    let h = Harness::new();
    h.model.script(r#"{"action":"CHECK","targetDate":null}"#);

    let reply = h
        .pipeline()
        .handle_at(TurnRequest::text(ELDER, "오늘 일정 있어?"), jan1(10, 0))
        .await
        .unwrap();

    assert_eq!(reply.action, "CHECK");
    assert_eq!(reply.reply, "그날은 일정이 없어요. 편히 쉬세요.");
}

#[tokio::test]
async fn check_lists_events_in_start_order() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    h.model.script(r#"{"action":"ADD","title":"산책","startDateTime":"2025-01-02T16:00:00"}"#);
    h.model.script(r#"{"action":"ADD","title":"병원","startDateTime":"2025-01-02T09:30:00"}"#);
    h.model.script(r#"{"action":"CHECK"}"#);
    for text in ["산책 추가", "병원 추가"] {
        pipeline.handle_at(TurnRequest::text(ELDER, text), jan1(8, 0)).await.unwrap();
    }

    let reply = pipeline
        .handle_at(TurnRequest::text(ELDER, "내일 일정 알려줘"), jan1(8, 0))
        .await
        .unwrap();

    assert_eq!(reply.reply, "1월 2일 일정은 다음과 같아요.\n- 09:30 병원\n- 16:00 산책");
}

#[tokio::test]
async fn delete_of_unknown_title_reports_not_found() {
    let h = Harness::new();
    h.model.script(r#"{"action":"DELETE","title":"치과"}"#);

    let reply = h
        .pipeline()
        .handle_at(TurnRequest::text(ELDER, "치과 예약 취소해"), jan1(10, 0))
        .await
        .unwrap();

    assert_eq!(reply.action, "DELETE");
    assert_eq!(reply.reply, "'치과' 일정을 찾지 못했어요.");
}

#[tokio::test]
async fn delete_removes_nearest_future_match_only() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    h.model.script(r#"{"action":"ADD","title":"치과 검진","startDateTime":"2025-01-03T10:00:00"}"#);
    h.model.script(r#"{"action":"ADD","title":"치과 검진","startDateTime":"2025-01-10T10:00:00"}"#);
    h.model.script(r#"{"action":"DELETE","title":"치과"}"#);
    for text in ["치과 3일", "치과 10일"] {
        pipeline.handle_at(TurnRequest::text(ELDER, text), jan1(8, 0)).await.unwrap();
    }

    let reply = pipeline
        .handle_at(TurnRequest::text(ELDER, "치과 취소"), jan1(9, 0))
        .await
        .unwrap();

    assert_eq!(reply.reply, "'치과 검진' 일정을 지웠어요.");
    let day = |d| NaiveDate::from_ymd_opt(2025, 1, d).unwrap();
    assert!(pipeline.calendar().events_on(ELDER, day(3)).unwrap().is_empty());
    assert_eq!(pipeline.calendar().events_on(ELDER, day(10)).unwrap().len(), 1);
}

#[tokio::test]
async fn guardian_commands_act_on_the_elder_calendar() {
    let h = Harness::new();
    h.model.script(r#"{"action":"ADD","title":"약 드시기","startDateTime":"2025-01-02T08:00:00"}"#);
    let pipeline = h.pipeline();

    pipeline
        .handle_at(TurnRequest::text(GUARDIAN, "어머니 내일 아침 8시 약"), jan1(10, 0))
        .await
        .unwrap();

    let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
    assert_eq!(pipeline.calendar().events_on(ELDER, day).unwrap().len(), 1);
    assert!(pipeline.calendar().events_on(GUARDIAN, day).unwrap().is_empty());
}

#[tokio::test]
async fn alarm_command_sets_and_flips_the_preference() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    h.model.script(r#"{"action":"ALARM","alarmOn":false}"#);
    h.model.script(r#"{"action":"ALARM"}"#);

    let off = pipeline
        .handle_at(TurnRequest::text(ELDER, "알림 꺼줘"), jan1(22, 0))
        .await
        .unwrap();
    assert_eq!(off.action, "ALARM");
    assert_eq!(off.reply, "알림을 껐어요. 편히 주무세요.");
    assert!(!h.identity.alarm_enabled(ELDER).unwrap());

    let flipped = pipeline
        .handle_at(TurnRequest::text(ELDER, "알림 바꿔줘"), jan1(22, 1))
        .await
        .unwrap();
    assert_eq!(flipped.reply, "알림을 켰어요.");
    assert!(h.identity.alarm_enabled(ELDER).unwrap());
}

#[tokio::test]
async fn unparseable_classifier_output_falls_through_to_conversation() {
    let h = Harness::new();
    h.model.script("sorry, I cannot do that");

    let reply = h
        .pipeline()
        .handle_at(TurnRequest::text(ELDER, "안녕하세요"), jan1(10, 0))
        .await
        .unwrap();

    assert_eq!(reply.action, "NONE");
    assert_eq!(reply.reply, "네, 잘 알겠어요.");
}
