/*!
 * Tests for language code utilities
 */

use sublingo::language_utils::{is_same_language, language_label, normalize_to_part2t};

#[test]
fn test_normalizeToPart2t_withTwoLetterCode_shouldReturnThreeLetterCode() {
    assert_eq!(normalize_to_part2t("fr").unwrap(), "fra");
    assert_eq!(normalize_to_part2t("DE").unwrap(), "deu");
}

#[test]
fn test_normalizeToPart2t_withThreeLetterCode_shouldKeepIt() {
    assert_eq!(normalize_to_part2t("spa").unwrap(), "spa");
}

#[test]
fn test_isSameLanguage_withMixedCodeLengths_shouldMatch() {
    assert!(is_same_language("de", "ger"));
    assert!(is_same_language("deu", "DE"));
    assert!(!is_same_language("de", "nl"));
}

#[test]
fn test_isSameLanguage_withUnknownCodes_shouldCompareLiterally() {
    assert!(is_same_language("x-custom", "X-CUSTOM"));
    assert!(!is_same_language("x-custom", "x-other"));
}

#[test]
fn test_languageLabel_withScriptSubtag_shouldKeepFullCode() {
    assert_eq!(language_label("zh-Hans"), "Chinese (zh-Hans)");
    assert_eq!(language_label("en"), "English");
}
