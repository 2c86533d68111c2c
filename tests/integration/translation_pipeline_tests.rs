/*!
 * Integration tests for the full batch translation pipeline.
 *
 * Runs the service against the scripted mock client and the in-memory
 * store, then inspects the stored project and the recorded requests.
 */

use std::sync::Arc;

use serde_json::Value;
use sublingo::document::{ProcessStatus, Segment, SyncStatus, TaskStage, TaskStatus};
use sublingo::providers::mock::{MOCK_TRANSLATION_PREFIX, MockChatClient, MockReply};
use sublingo::translation::{ABORT_NO_OUTPUT, NO_OUTPUT_FOR_ID};
use sublingo::{GlossaryEntry, LlmProfile, StoreError, TranslationError, TranslationRequest, TranslatorConfig};

use crate::common::{PROJECT_ID, TestHarness, english_project, set_french, source_line};

fn request() -> TranslationRequest {
    TranslationRequest::new(PROJECT_ID, "en", "fr", "mock", "test-model")
}

fn jsonl_profile() -> LlmProfile {
    LlmProfile {
        json_mode: Some(false),
        ..Default::default()
    }
}

fn batch_len(payload: &Value) -> usize {
    payload["batch"].as_array().map(Vec::len).unwrap_or(0)
}

#[tokio::test]
async fn test_translate_with45Segments_shouldCompleteInThreeBatches() {
    let harness = TestHarness::new(english_project(45), MockChatClient::working());

    let outcome = harness.service.translate(request()).await.unwrap();

    assert_eq!(outcome.status(), TaskStatus::Completed);
    assert!(!outcome.aborted);
    assert_eq!(outcome.processed(), 45);
    assert_eq!(outcome.failed(), 0);
    assert_eq!(outcome.task.total_segments, 45);
    assert_eq!(outcome.task.progress, 100.0);
    assert_eq!(outcome.task.stage, Some(TaskStage::Completed));

    // One analysis call, then three JSON mode batches of 20/20/5
    let calls = harness.client.calls();
    assert_eq!(calls.len(), 4);
    assert!(calls[0].batch_payload().is_none());
    let sizes: Vec<usize> = calls[1..].iter().map(|call| batch_len(&call.batch_payload().unwrap())).collect();
    assert_eq!(sizes, vec![20, 20, 5]);
    assert!(calls[1..].iter().all(|call| call.options.json_mode));

    let stored = harness.stored();
    for (index, segment) in stored.segments.iter().enumerate() {
        let content = &segment.languages["fr"];
        assert_eq!(content.text, format!("{}{}", MOCK_TRANSLATION_PREFIX, source_line(index + 1)));
        let process = content.process.as_ref().unwrap();
        assert_eq!(process.status, ProcessStatus::Ok);
        assert_eq!(process.task_id, outcome.task_id());
        assert!(content.guideline.is_some());
        assert!(segment.guideline_standard.contains_key("fr"));
    }

    let meta = &stored.language_metadata["fr"];
    assert_eq!(meta.sync_status, Some(SyncStatus::Done));
    assert_eq!(meta.active_task_id, None);
    assert_eq!(meta.revision, 1);
    assert_eq!(meta.language_name, "French");
    assert_eq!(meta.translator, "llm/mock");
    assert!(!meta.status.is_original);
    assert_eq!(stored.task("fr", outcome.task_id()).unwrap().status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_translate_laterBatches_shouldCarryReferencesAndBoundary() {
    let harness = TestHarness::new(english_project(45), MockChatClient::working());

    harness.service.translate(request()).await.unwrap();

    let calls = harness.client.calls();
    let first = calls[1].batch_payload().unwrap();
    let second = calls[2].batch_payload().unwrap();

    assert_eq!(first["reference_translations"].as_array().unwrap().len(), 0);
    assert_eq!(first["boundary_context"]["prev_src"].as_array().unwrap().len(), 0);

    let references = second["reference_translations"].as_array().unwrap();
    assert_eq!(references.len(), 8);
    assert_eq!(references[0]["src"], source_line(1));
    assert_eq!(references[0]["dst"], format!("{}{}", MOCK_TRANSLATION_PREFIX, source_line(1)));

    let prev_src: Vec<&str> = second["boundary_context"]["prev_src"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    let expected: Vec<String> = (16..=20).map(source_line).collect();
    assert_eq!(prev_src, expected);
    assert_eq!(second["boundary_context"]["prev_dst"].as_array().unwrap().len(), 5);

    // Analysis digest and hints travel with every batch
    assert_eq!(second["global_style"]["genre"], "thriller");
    let hints: Vec<&Value> = second["glossary"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|entry| entry["origin"] == "auto")
        .collect();
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0]["source"], "HQ");
}

#[tokio::test]
async fn test_translate_whenBatchYieldsNothingAfterRetry_shouldAbort() {
    let client = MockChatClient::working()
        .with_reply(3, MockReply::Garbage)
        .with_reply(4, MockReply::Garbage);
    let harness = TestHarness::new(english_project(45), client);

    let outcome = harness
        .service
        .translate(request().with_profile(jsonl_profile()))
        .await
        .unwrap();

    assert!(outcome.aborted);
    assert_eq!(outcome.status(), TaskStatus::Failed);
    assert_eq!(outcome.task.stage, Some(TaskStage::Aborted));
    assert_eq!(outcome.task.stage_detail, ABORT_NO_OUTPUT);
    assert_eq!(outcome.processed(), 20);
    assert_eq!(harness.client.request_count(), 4);

    let message = &outcome.task.error_message;
    assert!(message.starts_with(ABORT_NO_OUTPUT));
    let batch_two_failures = message.lines().filter(|line| line.contains("batch 2/3")).count();
    assert_eq!(batch_two_failures, 2);
    assert!(message.contains("(retry) batch 2/3"));

    let stored = harness.stored();
    assert!(stored.segments[19].languages.contains_key("fr"));
    assert!(!stored.segments[20].languages.contains_key("fr"));
    let meta = &stored.language_metadata["fr"];
    assert_eq!(meta.sync_status, Some(SyncStatus::Failed));
    assert_eq!(meta.active_task_id, None);
}

#[tokio::test]
async fn test_translate_whenRequestFailsOnce_shouldRetryAndContinue() {
    let client = MockChatClient::working().with_reply(2, MockReply::Failure("timeout".to_string()));
    let harness = TestHarness::new(english_project(10), client);

    let outcome = harness
        .service
        .translate(request().with_profile(jsonl_profile()))
        .await
        .unwrap();

    assert_eq!(outcome.status(), TaskStatus::Completed);
    assert_eq!(outcome.processed(), 10);
    assert_eq!(harness.client.request_count(), 3);
}

#[tokio::test]
async fn test_retryFailed_shouldOnlyTranslateFailedSegments() {
    let mut project = english_project(45);
    for index in 0..45 {
        set_french(&mut project, index, "Existant", ProcessStatus::Ok);
    }
    for index in [4, 17, 30] {
        set_french(&mut project, index, "Raté", ProcessStatus::Error);
    }
    let harness = TestHarness::new(project, MockChatClient::working());

    let outcome = harness.service.retry_failed(request()).await.unwrap();

    assert_eq!(outcome.status(), TaskStatus::Completed);
    assert_eq!(outcome.task.total_segments, 3);
    assert_eq!(outcome.task.project_total_segments, 45);
    assert_eq!(outcome.task.project_completed_segments, 42);
    assert_eq!(outcome.processed(), 3);

    // Retry runs go straight to JSONL
    let calls = harness.client.calls();
    assert_eq!(calls.len(), 2);
    assert!(!calls[1].options.json_mode);
    let payload = calls[1].batch_payload().unwrap();
    let ids: Vec<&str> = payload["batch"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|item| item["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["5", "18", "31"]);

    let stored = harness.stored();
    assert_eq!(stored.segments[0].languages["fr"].text, "Existant");
    assert!(stored.segments[4].languages["fr"].text.starts_with(MOCK_TRANSLATION_PREFIX));
}

#[tokio::test]
async fn test_translate_withMissingOutput_shouldKeepExistingText() {
    let mut project = english_project(5);
    set_french(&mut project, 1, "Ancien texte", ProcessStatus::Ok);
    let client = MockChatClient::working().with_skipped_ids(&["2", "3"]);
    let harness = TestHarness::new(project, client);

    let outcome = harness.service.translate(request()).await.unwrap();

    assert_eq!(outcome.status(), TaskStatus::Failed);
    assert!(!outcome.aborted);
    assert_eq!(outcome.processed(), 5);
    assert_eq!(outcome.failed(), 2);
    assert!(outcome.task.error_message.starts_with(
        "partial_failed: 2 segments did not produce output\nProcessed=5 Failed=2\nFailedIDs(sample)=2, 3\n"
    ));

    let stored = harness.stored();
    let kept = &stored.segments[1].languages["fr"];
    assert_eq!(kept.text, "Ancien texte");
    let process = kept.process.as_ref().unwrap();
    assert_eq!(process.status, ProcessStatus::Error);
    assert_eq!(process.error, NO_OUTPUT_FOR_ID);
    assert_eq!(process.task_id, outcome.task_id());

    // A segment without an earlier translation gets no target entry at all
    assert!(!stored.segments[2].languages.contains_key("fr"));
    assert_eq!(stored.language_metadata["fr"].sync_status, Some(SyncStatus::PartialFailed));
}

#[tokio::test]
async fn test_translate_afterJsonParseFailure_shouldStayOnJsonl() {
    let client = MockChatClient::working().with_reply(2, MockReply::Garbage);
    let harness = TestHarness::new(english_project(45), client);

    let outcome = harness.service.translate(request()).await.unwrap();

    assert_eq!(outcome.status(), TaskStatus::Completed);
    assert_eq!(outcome.processed(), 45);

    // analysis, batch 1 JSON (garbage, no retry), batch 1 JSONL, batches 2-3 JSONL
    let modes: Vec<bool> = harness.client.calls()[1..].iter().map(|call| call.options.json_mode).collect();
    assert_eq!(modes, vec![true, false, false, false]);
}

#[tokio::test]
async fn test_translate_afterLaterJsonFailure_shouldUseJsonlForRemainingBatches() {
    let client = MockChatClient::working().with_reply(3, MockReply::Garbage);
    let harness = TestHarness::new(english_project(45), client);

    let outcome = harness.service.translate(request()).await.unwrap();

    assert_eq!(outcome.status(), TaskStatus::Completed);
    assert_eq!(outcome.processed(), 45);

    // analysis, batch 1 JSON, batch 2 JSON (garbage), batch 2 JSONL, batch 3 JSONL
    let calls = harness.client.calls();
    let modes: Vec<bool> = calls[1..].iter().map(|call| call.options.json_mode).collect();
    assert_eq!(modes, vec![true, true, false, false]);
    let batch_sizes: Vec<usize> = calls[1..]
        .iter()
        .map(|call| batch_len(&call.batch_payload().unwrap()))
        .collect();
    assert_eq!(batch_sizes, vec![20, 20, 20, 5]);
    assert!(
        harness
            .stored()
            .segments
            .iter()
            .all(|segment| segment.text("fr").is_some_and(|text| text.starts_with(MOCK_TRANSLATION_PREFIX)))
    );
}

#[tokio::test]
async fn test_translate_withPinnedJsonProfile_shouldFallBackPerBatch() {
    let profile = LlmProfile {
        json_mode: Some(true),
        sys_prompt_tpl: "Always use formal address.".to_string(),
        ..Default::default()
    };
    let client = MockChatClient::working().with_reply(2, MockReply::Garbage);
    let harness = TestHarness::with_config(
        english_project(4),
        client,
        TranslatorConfig::default().with_batch_size(2),
    );

    let outcome = harness.service.translate(request().with_profile(profile)).await.unwrap();

    assert_eq!(outcome.status(), TaskStatus::Completed);
    let calls = harness.client.calls();
    let modes: Vec<bool> = calls[1..].iter().map(|call| call.options.json_mode).collect();
    assert_eq!(modes, vec![true, false, true]);
    assert!(calls[1].system_prompt().starts_with("Always use formal address.\n\n"));
}

#[tokio::test]
async fn test_translate_withGlossary_shouldDiscloseTokensUnlessStrict() {
    let acme = GlossaryEntry::new("Acme").do_not_translate();

    let harness = TestHarness::new(english_project(3), MockChatClient::working());
    harness
        .service
        .translate(request().with_extra_glossary(vec![acme.clone()]))
        .await
        .unwrap();

    let payload = harness.client.calls()[1].batch_payload().unwrap();
    let enforced = &payload["glossary"][0];
    assert_eq!(enforced["source"], "Acme");
    assert_eq!(enforced["origin"], "task");
    assert_eq!(enforced["placeholder"], "⟦G000⟧");
    assert!(payload["batch"][0]["text"].as_str().unwrap().contains("⟦G000⟧"));
    assert_eq!(
        harness.stored().segments[0].languages["fr"].text,
        format!("{}{}", MOCK_TRANSLATION_PREFIX, source_line(1))
    );

    let strict = TestHarness::new(english_project(3), MockChatClient::working());
    strict
        .service
        .translate(request().with_extra_glossary(vec![acme]).with_strict_glossary(true))
        .await
        .unwrap();

    let payload = strict.client.calls()[1].batch_payload().unwrap();
    let glossary = payload["glossary"].as_array().unwrap();
    assert!(!glossary.is_empty());
    assert!(glossary.iter().all(|entry| entry.get("placeholder").is_none()));
}

#[tokio::test]
async fn test_retryRun_withoutExtras_shouldReuseStoredTaskTerms() {
    let harness = TestHarness::new(english_project(3), MockChatClient::working());
    let acme = GlossaryEntry::new("Acme").with_translation("fr", "Acmé");

    harness
        .service
        .translate(request().with_extra_glossary(vec![acme]))
        .await
        .unwrap();
    assert_eq!(harness.stored().metadata.task_terms.len(), 1);

    let only_first = Arc::new(|segment: &Segment| segment.id == "1");
    harness.service.translate(request().with_filter(only_first)).await.unwrap();
    let retry_payload = harness.client.calls().last().unwrap().batch_payload().unwrap();
    assert!(
        retry_payload["glossary"]
            .as_array()
            .unwrap()
            .iter()
            .any(|entry| entry["source"] == "Acme" && entry["origin"] == "task")
    );
    assert_eq!(
        harness.stored().segments[0].languages["fr"].text,
        "[TRANSLATED] We need to talk about Acmé, part 1."
    );

    harness.service.translate(request()).await.unwrap();
    let fresh_payload = harness.client.calls().last().unwrap().batch_payload().unwrap();
    assert!(
        fresh_payload["glossary"]
            .as_array()
            .unwrap()
            .iter()
            .all(|entry| entry["origin"] != "task")
    );
}

#[tokio::test]
async fn test_translate_twice_shouldAnalyzeProjectOnce() {
    let harness = TestHarness::new(english_project(3), MockChatClient::working());

    harness.service.translate(request()).await.unwrap();
    harness.service.translate(request()).await.unwrap();

    let analysis_calls = harness
        .client
        .calls()
        .iter()
        .filter(|call| call.batch_payload().is_none())
        .count();
    assert_eq!(analysis_calls, 1);
    assert_eq!(harness.stored().metadata.analysis.unwrap().genre, "thriller");
    assert_eq!(harness.stored().language_metadata["fr"].revision, 2);
}

#[tokio::test]
async fn test_translate_whenAnalysisFails_shouldStillTranslate() {
    let client = MockChatClient::working().with_reply(1, MockReply::Failure("analysis down".to_string()));
    let harness = TestHarness::new(english_project(3), client);

    let outcome = harness.service.translate(request()).await.unwrap();

    assert_eq!(outcome.status(), TaskStatus::Completed);
    let stored = harness.stored();
    assert!(stored.metadata.analysis.is_none());
    let payload = harness.client.calls()[1].batch_payload().unwrap();
    assert_eq!(payload["global_style"], serde_json::json!({}));

    let conversation = stored.conversation("fr", outcome.task_id()).unwrap();
    assert!(
        conversation
            .messages
            .iter()
            .any(|message| message.content.starts_with("Project analysis failed:"))
    );
}

#[tokio::test]
async fn test_translate_withInvalidRequests_shouldFailFast() {
    let harness = TestHarness::new(english_project(3), MockChatClient::working());

    let same = harness
        .service
        .translate(TranslationRequest::new(PROJECT_ID, "en", "EN", "mock", "m"))
        .await;
    assert!(matches!(same, Err(TranslationError::SameLanguage(_))));

    let missing = harness
        .service
        .translate(TranslationRequest::new("unknown", "en", "fr", "mock", "m"))
        .await;
    assert!(matches!(missing, Err(TranslationError::Store(StoreError::NotFound(_)))));

    let empty = TestHarness::new(english_project(0), MockChatClient::working());
    let result = empty.service.translate(request()).await;
    assert!(matches!(result, Err(TranslationError::EmptyProject(_))));

    assert_eq!(harness.client.request_count(), 0);
}
