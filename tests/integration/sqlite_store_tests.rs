/*!
 * Integration tests running the pipeline on the SQLite store.
 */

use std::sync::Arc;

use sublingo::document::{GlossarySet, SyncStatus, TaskStatus};
use sublingo::events::NullPublisher;
use sublingo::providers::mock::MockChatClient;
use sublingo::storage::DatabaseConnection;
use sublingo::{
    DocumentStore, GlossaryEntry, SqliteStore, TranslationRequest, TranslationService, TranslatorConfig,
};
use tempfile::TempDir;

use crate::common::{PROJECT_ID, english_project, init_logging};

#[tokio::test]
async fn test_translate_onSqliteFile_shouldPersistAcrossReopen() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("projects.db");

    let store = SqliteStore::new(DatabaseConnection::open(&db_path).unwrap());
    store.save(&english_project(25)).await.unwrap();
    store
        .put_glossary_set(
            &GlossarySet {
                id: "brand".to_string(),
                name: "Brand names".to_string(),
                description: "Company names kept verbatim".to_string(),
            },
            &[GlossaryEntry::new("Acme").do_not_translate()],
        )
        .await
        .unwrap();

    let service = TranslationService::new(
        Arc::new(MockChatClient::working()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(NullPublisher),
        TranslatorConfig::default(),
    );
    let outcome = service
        .translate(TranslationRequest::new(PROJECT_ID, "en", "fr", "mock", "m").with_glossary_sets(&["brand"]))
        .await
        .unwrap();
    assert_eq!(outcome.status(), TaskStatus::Completed);
    drop(service);
    drop(store);

    let reopened = SqliteStore::new(DatabaseConnection::open(&db_path).unwrap());
    let project = reopened.get(PROJECT_ID).await.unwrap();

    assert!(project.segments.iter().all(|segment| segment.languages.contains_key("fr")));
    assert!(project.metadata.analysis.is_some());
    let meta = &project.language_metadata["fr"];
    assert_eq!(meta.sync_status, Some(SyncStatus::Done));
    assert_eq!(meta.status.conversion_tasks.len(), 1);
    let conversation = project.conversation("fr", outcome.task_id()).unwrap();
    assert!(conversation.messages.len() >= 6);
}

#[tokio::test]
async fn test_translate_onSqliteMemoryStore_shouldKeepExistingLanguages() {
    init_logging();
    let store = SqliteStore::new_in_memory().unwrap();
    let mut project = english_project(4);
    project.segments[0]
        .languages
        .insert("de".to_string(), sublingo::document::LanguageContent::new("Hallo"));
    store.save(&project).await.unwrap();

    let service = TranslationService::new(
        Arc::new(MockChatClient::working()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(NullPublisher),
        TranslatorConfig::default(),
    );
    service
        .translate(TranslationRequest::new(PROJECT_ID, "en", "fr", "mock", "m"))
        .await
        .unwrap();

    let stored = store.get(PROJECT_ID).await.unwrap();
    assert_eq!(stored.segments[0].text("de"), Some("Hallo"));
    assert!(stored.segments[0].text("fr").is_some());
}
