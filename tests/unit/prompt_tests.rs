/*!
 * Tests for batch prompt construction through the public API
 */

use serde_json::Value;
use sublingo::GlossaryEntry;
use sublingo::translation::glossary::{GlossaryOrigin, ResolvedGlossary};
use sublingo::translation::prompts::{
    BatchItem, BatchPayload, BatchPromptBuilder, BoundaryContext, PromptTemplate, ReferencePair, disclose_glossary,
};

fn payload() -> BatchPayload {
    BatchPayload {
        reference_translations: vec![ReferencePair {
            src: "Hello".to_string(),
            dst: "Bonjour".to_string(),
        }],
        boundary_context: BoundaryContext {
            prev_src: vec!["Bye".to_string()],
            prev_dst: vec!["Salut".to_string()],
        },
        batch: vec![BatchItem {
            id: "12".to_string(),
            text: "See you ⟦G000⟧".to_string(),
        }],
        ..Default::default()
    }
}

#[test]
fn test_build_inJsonMode_shouldUseJsonTemplates() {
    let (system, user) = BatchPromptBuilder::new("English", "French", true).build(&payload());

    assert!(system.contains("English"));
    assert!(system.contains("French"));
    assert!(user.starts_with(PromptTemplate::JSON_MODE_INSTRUCTION));
}

#[test]
fn test_build_inJsonlMode_shouldDifferFromJsonMode() {
    let (json_system, _) = BatchPromptBuilder::new("English", "French", true).build(&payload());
    let (jsonl_system, jsonl_user) = BatchPromptBuilder::new("English", "French", false).build(&payload());

    assert_ne!(json_system, jsonl_system);
    assert!(jsonl_user.starts_with(PromptTemplate::JSONL_INSTRUCTION));
}

#[test]
fn test_buildUserPrompt_withEmptyStyle_shouldOmitStyleFields() {
    let user = BatchPromptBuilder::new("English", "French", false).build_user_prompt(&payload());
    let last_line: Value = serde_json::from_str(user.lines().last().unwrap()).unwrap();

    assert_eq!(last_line["global_style"], serde_json::json!({}));
    assert_eq!(last_line["batch"][0]["id"], "12");
    assert_eq!(last_line["boundary_context"]["prev_dst"][0], "Salut");
    assert_eq!(last_line["reference_translations"][0]["dst"], "Bonjour");
}

#[test]
fn test_discloseGlossary_shouldCapHintsAndSkipUnusedTerms() {
    let resolved = ResolvedGlossary {
        enforced: vec![GlossaryEntry::new("Acme").do_not_translate()],
        origins: vec![GlossaryOrigin::Global],
        hints: (0..5).map(|i| GlossaryEntry::new(&format!("hint {}", i))).collect(),
        task_terms_update: None,
    };

    let disclosed = disclose_glossary(&resolved, &[false], false, 3);

    assert_eq!(disclosed.len(), 3);
    assert!(disclosed.iter().all(|entry| entry.origin == GlossaryOrigin::Auto));
}

#[test]
fn test_resolve_withRetryRun_shouldReuseStoredTaskTerms() {
    let store = std::sync::Arc::new(sublingo::MemoryStore::new());
    let resolver = sublingo::translation::GlossaryResolver::new(store, std::time::Duration::from_secs(60));
    let stored = vec![GlossaryEntry::new("Acme").do_not_translate()];

    let retry = tokio_test::block_on(resolver.resolve(&[], &[], &stored, true));
    let fresh = tokio_test::block_on(resolver.resolve(&[], &[], &stored, false));

    assert_eq!(retry.enforced, stored);
    assert_eq!(retry.origins, vec![GlossaryOrigin::Task]);
    assert!(retry.task_terms_update.is_none());
    assert!(fresh.enforced.is_empty());
}
