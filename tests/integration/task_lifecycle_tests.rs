/*!
 * Integration tests for task lifecycle, cancellation and the audit trail.
 */

use std::sync::Arc;
use std::time::Duration;

use sublingo::document::{ChatRole, ConversationStatus, GlossarySet, MessageKind, SyncStatus, TaskStage, TaskStatus};
use sublingo::events::{BroadcastEventBus, PROGRESS_TOPIC, TranslationEvent};
use sublingo::providers::mock::{MOCK_TRANSLATION_PREFIX, MockChatClient};
use sublingo::translation::TaskKey;
use sublingo::{GlossaryEntry, TranslationError, TranslationRequest, TranslationService, TranslatorConfig};

use crate::common::{PROJECT_ID, TestHarness, english_project, init_logging};

fn request(target: &str) -> TranslationRequest {
    TranslationRequest::new(PROJECT_ID, "en", target, "mock", "test-model")
}

#[tokio::test]
async fn test_start_whileTaskRunning_shouldRejectSameLanguage() {
    let client = MockChatClient::working().with_delay(Duration::from_millis(300));
    let harness = TestHarness::new(english_project(3), client);

    let handle = harness.service.start(request("fr")).await.unwrap();

    let stored = harness.stored();
    let meta = &stored.language_metadata["fr"];
    assert_eq!(meta.active_task_id.as_deref(), Some(handle.task_id()));
    assert_eq!(meta.sync_status, Some(SyncStatus::Translating));
    assert_eq!(stored.task("fr", handle.task_id()).unwrap().status, TaskStatus::Processing);

    let second = harness.service.start(request("fr")).await;
    assert!(matches!(second, Err(TranslationError::TaskAlreadyRunning { .. })));
    assert!(harness.service.registry().is_running(&TaskKey::new(PROJECT_ID, "fr")));

    let outcome = handle.wait().await.unwrap();
    assert_eq!(outcome.status(), TaskStatus::Completed);
    assert!(!harness.service.registry().is_running(&TaskKey::new(PROJECT_ID, "fr")));
    assert_eq!(harness.stored().language_metadata["fr"].active_task_id, None);

    // The key is free again once the task ended
    let again = harness.service.translate(request("fr")).await.unwrap();
    assert_ne!(again.task_id(), outcome.task_id());
}

#[tokio::test]
async fn test_start_forAnotherLanguage_shouldRunAlongside() {
    let client = MockChatClient::working().with_delay(Duration::from_millis(200));
    let harness = TestHarness::new(english_project(3), client);

    let french = harness.service.start(request("fr")).await.unwrap();
    let german = harness.service.start(request("de")).await.unwrap();

    assert_ne!(french.task_id(), german.task_id());
    assert!(harness.service.cancel(PROJECT_ID, "de"));
    assert!(french.wait().await.is_ok());
    assert_eq!(german.wait().await.unwrap().status(), TaskStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_twoLanguagesToCompletion_shouldKeepBothTracks() {
    let client = MockChatClient::working().with_delay(Duration::from_millis(20));
    let harness = TestHarness::new(english_project(45), client);

    let french = harness.service.start(request("fr")).await.unwrap();
    let german = harness.service.start(request("de")).await.unwrap();
    let french = french.wait().await.unwrap();
    let german = german.wait().await.unwrap();
    assert_eq!(french.status(), TaskStatus::Completed);
    assert_eq!(german.status(), TaskStatus::Completed);

    let stored = harness.stored();
    for (language, outcome) in [("fr", &french), ("de", &german)] {
        assert!(
            stored.segments.iter().all(|segment| {
                segment
                    .text(language)
                    .is_some_and(|text| text.starts_with(MOCK_TRANSLATION_PREFIX))
            }),
            "missing {} text",
            language
        );
        let meta = &stored.language_metadata[language];
        assert_eq!(meta.active_task_id, None);
        assert_eq!(meta.sync_status, Some(SyncStatus::Done));
        assert_eq!(meta.revision, 1);
        assert_eq!(meta.status.conversion_tasks.len(), 1);
        assert_eq!(stored.task(language, outcome.task_id()).unwrap().status, TaskStatus::Completed);
        let conversation = stored.conversation(language, outcome.task_id()).unwrap();
        assert_eq!(conversation.status, ConversationStatus::Finished);
        assert_eq!(
            conversation.messages.last().unwrap().content,
            "Translation completed. Segments: processed=45, failed=0."
        );
    }
    assert!(stored.segments.iter().all(|segment| segment.text("en").is_some()));
}

#[tokio::test]
async fn test_cancel_duringRequest_shouldStopAndRecordCancellation() {
    let client = MockChatClient::working().with_delay(Duration::from_millis(300));
    let harness = TestHarness::new(english_project(30), client);

    let handle = harness.service.start(request("fr")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.service.cancel(PROJECT_ID, "fr"));

    let outcome = handle.wait().await.unwrap();
    assert_eq!(outcome.status(), TaskStatus::Cancelled);
    assert_eq!(outcome.task.stage, Some(TaskStage::Cancelled));
    assert!(outcome.task.error_message.starts_with("cancelled"));
    assert!(outcome.task.end_time > 0);
    assert!(!harness.service.cancel(PROJECT_ID, "fr"));

    let stored = harness.stored();
    let meta = &stored.language_metadata["fr"];
    assert_eq!(meta.sync_status, Some(SyncStatus::Failed));
    assert_eq!(meta.active_task_id, None);
    assert!(stored.segments.iter().all(|segment| !segment.languages.contains_key("fr")));

    let conversation = stored.conversation("fr", outcome.task_id()).unwrap();
    assert_eq!(conversation.status, ConversationStatus::Failed);
    let last = conversation.messages.last().unwrap();
    assert_eq!(last.content, "Translation cancelled (processed=0, failed=0).");
    assert_eq!(last.stage(), Some("cancelled"));
}

#[tokio::test]
async fn test_translate_shouldRecordConversationAndUsage() {
    let harness = TestHarness::new(english_project(5), MockChatClient::working());

    let outcome = harness.service.translate(request("fr")).await.unwrap();

    // Analysis plus one batch, 100/50 tokens each
    assert_eq!(outcome.task.prompt_tokens, 200);
    assert_eq!(outcome.task.completion_tokens, 100);
    assert_eq!(outcome.task.total_tokens, 300);
    assert_eq!(outcome.task.request_count, 2);

    let stored = harness.stored();
    let conversation = stored.conversation("fr", outcome.task_id()).unwrap();
    assert_eq!(conversation.status, ConversationStatus::Finished);
    assert!(conversation.ended_at > 0);
    assert_eq!(conversation.provider_id, "mock");
    assert_eq!(conversation.model, "test-model");

    let messages = &conversation.messages;
    assert_eq!(
        messages[0].content,
        "Start LLM subtitle translation: en → fr (provider=mock, model=test-model, total_segments=5)"
    );
    assert_eq!(messages[0].metadata["task_total"], 5);
    assert_eq!(messages[0].role, ChatRole::App);
    assert!(
        messages
            .iter()
            .any(|message| message.content == "Project analysis completed. Tokens: prompt=100, completion=50, total=150.")
    );

    let request_message = messages.iter().find(|message| message.kind == MessageKind::Request).unwrap();
    assert!(request_message.content.starts_with("Batch 1/1 (5 items) [JSON mode]\n\nSystem:\n"));
    assert_eq!(request_message.stage(), Some("batch_json"));

    let response = messages.iter().find(|message| message.kind == MessageKind::Response).unwrap();
    assert_eq!(response.role, ChatRole::Provider);
    assert_eq!(response.metadata["total_tokens"], 150);

    assert!(
        messages
            .iter()
            .any(|message| message.content == "Applied batch 1/1 to subtitles (processed=5, failed=0).")
    );
    let last = messages.last().unwrap();
    assert_eq!(last.content, "Translation completed. Segments: processed=5, failed=0.");
    assert_eq!(last.stage(), Some("completed"));

    let events = harness.publisher.events();
    assert!(events.iter().any(|event| matches!(event, TranslationEvent::Conversation(c) if c.delta)));
    let snapshots = harness.publisher.progress_snapshots();
    assert!(snapshots.iter().any(|task| task.stage == Some(TaskStage::BatchSending)));
    let final_snapshot = snapshots.last().unwrap();
    assert_eq!(final_snapshot.status, TaskStatus::Completed);
    assert_eq!(final_snapshot.progress, 100.0);
}

#[tokio::test]
async fn test_translate_withBroadcastBus_shouldDeliverProgressToSubscribers() {
    init_logging();
    let store = sublingo::MemoryStore::new();
    store.insert_project(english_project(3));
    let bus = BroadcastEventBus::new(1024);
    let mut receiver = bus.subscribe();
    let service = TranslationService::new(
        Arc::new(MockChatClient::working()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(bus.clone()),
        TranslatorConfig::default(),
    );

    service.translate(request("fr")).await.unwrap();

    let mut topics = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        topics.push(event.topic());
    }
    assert!(topics.contains(&PROGRESS_TOPIC));
    assert!(topics.len() > 3);
}

#[tokio::test]
async fn test_translate_withGlossarySet_shouldCacheSetLookups() {
    let harness = TestHarness::new(english_project(3), MockChatClient::working());
    harness.store.insert_glossary_set(
        GlossarySet {
            id: "brand".to_string(),
            name: "Brand names".to_string(),
            description: String::new(),
        },
        vec![GlossaryEntry::new("Acme").do_not_translate()],
    );

    for _ in 0..2 {
        let outcome = harness
            .service
            .translate(request("fr").with_glossary_sets(&["brand"]))
            .await
            .unwrap();
        assert_eq!(outcome.status(), TaskStatus::Completed);
    }

    assert_eq!(harness.store.glossary_read_count(), 1);
    let payload = harness.client.calls().last().unwrap().batch_payload().unwrap();
    assert_eq!(payload["glossary"][0]["origin"], "global");
    assert_eq!(payload["glossary"][0]["set_id"], "brand");
}
