//! Free conversation turns: persona layers, history, titles and speech.

use std::sync::Arc;

use hyodo::TurnRequest;
use hyodo::store::Role;
use hyodo::stt::AudioClip;

use crate::helpers::{CannedSearch, ELDER, FakeSpeech, FixedTranscript, Harness, jan1};

#[tokio::test]
async fn dialect_follows_the_session_region() {
    let h = Harness::new();
    let pipeline = h.pipeline();

    pipeline
        .handle_at(TurnRequest::text(ELDER, "안녕하세요").with_region("gs"), jan1(10, 0))
        .await
        .unwrap();
    pipeline
        .handle_at(TurnRequest::text(ELDER, "안녕하세요"), jan1(10, 1))
        .await
        .unwrap();

    let prompts = h.model.conversations();
    assert_eq!(prompts.len(), 2);
    let gs = &prompts[0][0];
    let std = &prompts[1][0];
    assert_eq!(gs.role, Role::System);
    assert!(gs.content.contains("Gyeongsang"));
    assert!(!gs.content.contains("standard Korean"));
    assert!(std.content.contains("standard Korean"));
    assert!(std.content.ends_with("]"), "emotion directive closes the prompt");
}

#[tokio::test]
async fn new_session_defaults_to_standard_region() {
    let h = Harness::new();
    let reply = h
        .pipeline()
        .handle_at(TurnRequest::text(ELDER, "안녕"), jan1(10, 0))
        .await
        .unwrap();
    assert_eq!(reply.region, "std");
}

#[tokio::test]
async fn region_override_updates_an_existing_session() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    let first = pipeline
        .handle_at(TurnRequest::text(ELDER, "안녕"), jan1(10, 0))
        .await
        .unwrap();
    let second = pipeline
        .handle_at(
            TurnRequest::text(ELDER, "또 왔어요").in_session(first.session_id).with_region("JL"),
            jan1(10, 5),
        )
        .await
        .unwrap();
    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.region, "jl");
    assert_eq!(pipeline.sessions(ELDER).unwrap()[0].region_code, "jl");
}

#[tokio::test]
async fn title_is_set_once_from_the_first_exchange() {
    let h = Harness::new();
    let pipeline = h.pipeline();

    let first = pipeline
        .handle_at(TurnRequest::text(ELDER, "병원 가야 하는데"), jan1(10, 0))
        .await
        .unwrap();
    assert_eq!(first.title.as_deref(), Some("병원 예약"));

    let second = pipeline
        .handle_at(
            TurnRequest::text(ELDER, "그런데 날씨가 춥네").in_session(first.session_id),
            jan1(10, 1),
        )
        .await
        .unwrap();
    assert_eq!(second.title.as_deref(), Some("병원 예약"));
    assert_eq!(h.model.title_calls(), 1);
}

#[tokio::test]
async fn prompt_carries_prior_turns_and_reply_returns_history() {
    let h = Harness::new();
    let pipeline = h.pipeline();

    let first = pipeline
        .handle_at(TurnRequest::text(ELDER, "첫 번째"), jan1(10, 0))
        .await
        .unwrap();
    let second = pipeline
        .handle_at(TurnRequest::text(ELDER, "두 번째").in_session(first.session_id), jan1(10, 1))
        .await
        .unwrap();

    let prompt = &h.model.conversations()[1];
    let contents: Vec<&str> = prompt.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(prompt.len(), 4);
    assert_eq!(contents[1], "첫 번째");
    assert_eq!(contents[2], "네, 잘 알겠어요.");
    assert_eq!(contents[3], "사용자 (감정: 중립): 두 번째");

    let roles: Vec<Role> = second.history.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
    assert_eq!(second.history[0].emotion.as_deref(), Some("중립"));
    assert_eq!(second.history[1].emotion, None);
}

#[tokio::test]
async fn history_is_capped_at_the_configured_limit() {
    let h = Harness::new();
    let chat = hyodo::config::ChatConfig {
        history_limit: 3,
        ..Default::default()
    };
    let pipeline = h.pipeline_with(chat);

    let first = pipeline
        .handle_at(TurnRequest::text(ELDER, "하나"), jan1(10, 0))
        .await
        .unwrap();
    pipeline
        .handle_at(TurnRequest::text(ELDER, "둘").in_session(first.session_id), jan1(10, 1))
        .await
        .unwrap();
    let last = pipeline
        .handle_at(TurnRequest::text(ELDER, "셋").in_session(first.session_id), jan1(10, 2))
        .await
        .unwrap();

    assert_eq!(last.history.len(), 3);
    assert_eq!(last.history[2].content, "네, 잘 알겠어요.");
    // System prompt, three prior turns, current utterance.
    assert_eq!(h.model.conversations()[2].len(), 5);
}

#[tokio::test]
async fn factual_questions_are_grounded_in_search_results() {
    let h = Harness::new();
    let pipeline = h.pipeline().with_search(Arc::new(CannedSearch));

    pipeline
        .handle_at(TurnRequest::text(ELDER, "기초연금 혜택 알려줘"), jan1(10, 0))
        .await
        .unwrap();
    pipeline
        .handle_at(TurnRequest::text(ELDER, "오늘 기분 좋네"), jan1(10, 1))
        .await
        .unwrap();

    let prompts = h.model.conversations();
    assert!(prompts[0][0].content.contains("### [Reference Information] ###"));
    assert!(prompts[0][0].content.contains("기초연금 안내"));
    assert!(!prompts[1][0].content.contains("### [Reference Information] ###"));
}

#[tokio::test]
async fn voice_turn_is_transcribed_with_the_session_region() {
    let h = Harness::new();
    let transcriber = Arc::new(FixedTranscript::ok("오늘 손주가 왔어"));
    let pipeline = h
        .pipeline()
        .with_transcriber(transcriber.clone())
        .with_synthesizer(Arc::new(FakeSpeech { fail: false }));

    let reply = pipeline
        .handle_at(
            TurnRequest::voice(ELDER, AudioClip::wav(vec![0, 1, 2, 3])).with_region("gs"),
            jan1(10, 0),
        )
        .await
        .unwrap();

    assert_eq!(reply.utterance, "오늘 손주가 왔어");
    assert_eq!(*transcriber.regions.lock().unwrap(), vec!["gs".to_owned()]);
    assert_eq!(reply.audio.as_deref(), Some("data:audio/mp3;base64,gs"));
    assert_eq!(reply.history[0].content, "오늘 손주가 왔어");
}
