/*!
 * Tests for markup/glossary masking and tolerant response parsing
 */

use sublingo::GlossaryEntry;
use sublingo::translation::masking::glossary_token;
use sublingo::translation::{mask_general, mask_glossary, parse_json_items, parse_jsonl, restore};

fn lines(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|text| text.to_string()).collect()
}

#[test]
fn test_maskThenRestore_withMarkupAndGlossary_shouldRoundTrip() {
    let source = lines(&[
        "<i>Call</i> Acme HQ at {\\an8}noon",
        "Acme never sleeps.",
        "No markup here",
    ]);
    let entries = vec![GlossaryEntry::new("Acme").do_not_translate()];

    let (general, general_restore) = mask_general(&source);
    let glossary = mask_glossary(&general, &entries, "fr");

    assert!(glossary.used[0]);
    assert!(!glossary.masked[0].contains("<i>"));
    assert!(!glossary.masked[1].contains("Acme"));
    for (masked, original) in glossary.masked.iter().zip(&source) {
        let restored = restore(&restore(masked, &glossary.restore), &general_restore);
        assert_eq!(&restored, original);
    }
}

#[test]
fn test_maskGlossary_withNestedTerms_shouldMaskLongestTerm() {
    let entries = vec![
        GlossaryEntry::new("a").with_translation("fr", "x"),
        GlossaryEntry::new("a b").with_translation("fr", "y"),
    ];

    let mask = mask_glossary(&lines(&["a b c"]), &entries, "fr");

    assert_eq!(mask.masked[0], format!("{} c", glossary_token(1)));
    assert_eq!(mask.used, vec![false, true]);
    assert_eq!(restore(&mask.masked[0], &mask.restore), "y c");
}

#[test]
fn test_maskGlossary_withTranslation_shouldRestoreTargetRendering() {
    let entries = vec![GlossaryEntry::new("headquarters").with_translation("fr", "siège")];

    let mask = mask_glossary(&lines(&["Back to Headquarters."]), &entries, "fr");

    assert_eq!(restore(&mask.masked[0], &mask.restore), "Back to siège.");
}

#[test]
fn test_parseJsonl_withFencedReply_shouldReturnItems() {
    let raw = "Here you go:\n```jsonl\n{\"id\":\"1\",\"final\":\"Bonjour\"}\n{\"id\":2,\"draft\":\"Salut\"}\n```";

    let items = parse_jsonl(raw).unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].output(), Some("Bonjour"));
    assert_eq!(items[1].id, "2");
    assert_eq!(items[1].output(), Some("Salut"));
}

#[test]
fn test_parseJsonItems_withItemsObject_shouldReturnItems() {
    let raw = r#"{"items":[{"id":"7","src":"Hi","final":"Coucou"}]}"#;

    let items = parse_json_items(raw).unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].src.as_deref(), Some("Hi"));
}

#[test]
fn test_parseJsonItems_withProse_shouldFail() {
    assert!(parse_json_items("Sorry, I cannot translate this.").is_err());
    assert!(parse_jsonl("   ").is_err());
}
