//! Collaborator failures degrade the turn instead of failing it.

use std::sync::Arc;

use hyodo::TurnRequest;
use hyodo::config::ChatConfig;
use hyodo::emotion::Emotion;
use hyodo::store::Role;
use hyodo::stt::AudioClip;

use crate::helpers::{
    ELDER, FailingSentiment, FakeSpeech, FixedTranscript, Hanging, Harness, ScriptedModel, jan1,
};

#[tokio::test]
async fn model_failure_still_logs_the_user_turn() {
    let h = Harness::with_model(ScriptedModel::failing_conversation());
    let pipeline = h.pipeline();

    let reply = pipeline
        .handle_at(TurnRequest::text(ELDER, "요즘 잠이 안 와").with_region("gs"), jan1(23, 0))
        .await
        .unwrap();

    assert_eq!(
        reply.reply,
        "죄송합니더. 지금은 대답을 몬 하겠네예. 쪼매 있다가 다시 말씀해 주이소."
    );
    let history = pipeline.history(ELDER, reply.session_id, None).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "요즘 잠이 안 와");
    assert_eq!(history[0].emotion.as_deref(), Some("중립"));
}

#[tokio::test]
async fn failed_transcription_becomes_the_utterance() {
    let h = Harness::new();
    let pipeline = h.pipeline().with_transcriber(Arc::new(FixedTranscript::failing()));

    let reply = pipeline
        .handle_at(TurnRequest::voice(ELDER, AudioClip::wav(vec![0; 8])), jan1(10, 0))
        .await
        .unwrap();

    assert_eq!(reply.utterance, "ASR 호출 실패: 503");
    assert_eq!(reply.history[0].content, "ASR 호출 실패: 503");
}

#[tokio::test]
async fn failed_synthesis_yields_a_placeholder() {
    let h = Harness::new();
    let pipeline = h.pipeline().with_synthesizer(Arc::new(FakeSpeech { fail: true }));

    let reply = pipeline
        .handle_at(TurnRequest::text(ELDER, "안녕"), jan1(10, 0))
        .await
        .unwrap();

    let audio = reply.audio.unwrap();
    assert!(audio.starts_with("TTS 오류"), "{audio}");
    assert_eq!(reply.reply, "네, 잘 알겠어요.");
}

#[tokio::test]
async fn no_synthesizer_means_no_audio() {
    let h = Harness::new();
    let reply = h
        .pipeline()
        .handle_at(TurnRequest::text(ELDER, "안녕"), jan1(10, 0))
        .await
        .unwrap();
    assert_eq!(reply.audio, None);
}

#[tokio::test]
async fn hanging_collaborators_time_out_into_a_degraded_turn() {
    tokio::time::pause();
    let h = Harness::new();
    let chat = ChatConfig {
        collaborator_timeout_secs: 1,
        ..Default::default()
    };
    let pipeline = h.pipeline_over(Arc::new(Hanging), Arc::new(Hanging), chat);

    let reply = pipeline
        .handle_at(TurnRequest::text(ELDER, "여보세요"), jan1(9, 0))
        .await
        .unwrap();

    assert_eq!(reply.emotion, Emotion::Neutral);
    assert_eq!(reply.action, "NONE");
    assert_eq!(
        reply.reply,
        "죄송해요. 지금은 답을 드리기 어려워요. 잠시 후 다시 말씀해 주세요."
    );
    assert_eq!(reply.title, None);
    let roles: Vec<Role> = reply.history.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);
    assert_eq!(reply.history[0].content, "여보세요");
    assert_eq!(reply.history[0].emotion.as_deref(), Some("중립"));
}

#[tokio::test]
async fn sentiment_failure_stores_the_turn_as_neutral() {
    let h = Harness::new();
    let pipeline = h.pipeline_over(h.model.clone(), Arc::new(FailingSentiment), ChatConfig::default());

    let reply = pipeline
        .handle_at(TurnRequest::text(ELDER, "속상한 일이 있었어"), jan1(15, 0))
        .await
        .unwrap();

    assert_eq!(reply.emotion, Emotion::Neutral);
    assert_eq!(reply.reply, "네, 잘 알겠어요.");
    let history = pipeline.history(ELDER, reply.session_id, None).unwrap();
    assert_eq!(history[0].content, "속상한 일이 있었어");
    assert_eq!(history[0].emotion.as_deref(), Some("중립"));
}
