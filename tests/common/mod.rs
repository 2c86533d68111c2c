/*!
 * Common test utilities for the sublingo test suite
 */

use std::sync::Arc;
use std::sync::Once;

use sublingo::document::{LanguageContent, LanguageProcess, ProcessStatus, Segment, SubtitleProject};
use sublingo::events::CollectingPublisher;
use sublingo::providers::mock::MockChatClient;
use sublingo::storage::MemoryStore;
use sublingo::{TranslationService, TranslatorConfig};

pub const PROJECT_ID: &str = "project-1";

static INIT: Once = Once::new();

/// Route library logs to the test output once per process
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// English source line for segment `n`
pub fn source_line(n: usize) -> String {
    match n % 3 {
        0 => format!("Line {} from <i>HQ</i>.", n),
        1 => format!("We need to talk about Acme, part {}.", n),
        _ => format!("Meet me at {} o'clock.", n),
    }
}

/// A project with `count` English segments, ids "1".."count"
pub fn english_project(count: usize) -> SubtitleProject {
    let segments = (1..=count)
        .map(|n| {
            let start = (n as u64 - 1) * 3000;
            Segment::new(&n.to_string(), start, start + 2500).with_text("en", &source_line(n))
        })
        .collect();
    SubtitleProject::new(PROJECT_ID, "Test project").with_segments(segments)
}

/// Give segment `index` an existing French translation with the given process status
pub fn set_french(project: &mut SubtitleProject, index: usize, text: &str, status: ProcessStatus) {
    let mut content = LanguageContent::new(text);
    content.process = Some(LanguageProcess {
        provider: "mock".to_string(),
        model: "earlier-model".to_string(),
        task_id: "earlier-task".to_string(),
        status,
        error: String::new(),
        updated_at: 1,
    });
    project.segments[index].languages.insert("fr".to_string(), content);
}

/// Everything a pipeline test needs to inspect
pub struct TestHarness {
    pub store: MemoryStore,
    pub client: MockChatClient,
    pub publisher: CollectingPublisher,
    pub service: TranslationService,
}

impl TestHarness {
    pub fn new(project: SubtitleProject, client: MockChatClient) -> Self {
        Self::with_config(project, client, TranslatorConfig::default())
    }

    pub fn with_config(project: SubtitleProject, client: MockChatClient, config: TranslatorConfig) -> Self {
        init_logging();
        let store = MemoryStore::new();
        store.insert_project(project);
        let publisher = CollectingPublisher::new();
        let service = TranslationService::new(
            Arc::new(client.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(publisher.clone()),
            config,
        );
        Self {
            store,
            client,
            publisher,
            service,
        }
    }

    /// Current stored copy of the test project
    pub fn stored(&self) -> SubtitleProject {
        self.store.project(PROJECT_ID).expect("project should be stored")
    }
}
