/*!
 * Readability metrics for subtitle text.
 *
 * Measures characters per second (CPS), words per minute (WPM) and the
 * longest line (CPL), and grades each against reading-speed limits:
 * - Kids content: 13 CPS / 130 WPM
 * - Primarily ideographic text (CJK): 15 CPS / 140 WPM
 * - Everything else: 17 CPS / 160 WPM
 * - Line length: 42 characters
 */

use crate::document::{Guideline, Segment, SubtitleGuideline};

/// Maximum characters per line before a line counts as too long
pub const MAX_CHARS_PER_LINE: u32 = 42;

/// Recommended reading speed limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingSpeed {
    pub max_cps: u32,
    pub max_wpm: u32,
}

impl ReadingSpeed {
    pub const KIDS: Self = Self { max_cps: 13, max_wpm: 130 };
    pub const IDEOGRAPHIC: Self = Self { max_cps: 15, max_wpm: 140 };
    pub const STANDARD: Self = Self { max_cps: 17, max_wpm: 160 };
}

/// Whether a character belongs to Han, Hiragana, Katakana or Hangul.
fn is_ideographic(c: char) -> bool {
    matches!(c as u32,
        0x2E80..=0x2FDF       // CJK radicals
        | 0x3005 | 0x3007 | 0x3021..=0x3029 | 0x3038..=0x303B
        | 0x3040..=0x309F     // Hiragana
        | 0x30A0..=0x30FF     // Katakana
        | 0x3130..=0x318F     // Hangul compatibility jamo
        | 0x31F0..=0x31FF     // Katakana phonetic extensions
        | 0x3400..=0x4DBF     // CJK extension A
        | 0x4E00..=0x9FFF     // CJK unified ideographs
        | 0x1100..=0x11FF     // Hangul jamo
        | 0xAC00..=0xD7AF     // Hangul syllables
        | 0xF900..=0xFAFF     // CJK compatibility ideographs
        | 0xFF66..=0xFF9F     // Halfwidth katakana
        | 0x20000..=0x2FA1F   // CJK extensions B onwards
    )
}

fn is_layout_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Text measurements used by the readability assessment
pub struct TextMetrics;

impl TextMetrics {
    /// Characters excluding spaces, tabs and line breaks.
    pub fn count_characters(text: &str) -> u32 {
        text.chars().filter(|c| !is_layout_whitespace(*c)).count() as u32
    }

    /// Word count; every ideographic character counts as one word.
    pub fn count_words(text: &str) -> u32 {
        let has_ideographic = text.chars().any(|c| c.is_alphabetic() && is_ideographic(c));
        let has_alphabetic = text.chars().any(|c| c.is_alphabetic() && !is_ideographic(c));

        match (has_ideographic, has_alphabetic) {
            (true, true) => Self::count_mixed_words(text),
            (true, false) => Self::count_characters(text),
            _ => text.split_whitespace().count() as u32,
        }
    }

    fn count_mixed_words(text: &str) -> u32 {
        let mut count = 0;
        let mut in_word = false;
        for c in text.chars() {
            if is_ideographic(c) {
                count += 1;
                in_word = false;
            } else if c.is_alphabetic() {
                if !in_word {
                    count += 1;
                    in_word = true;
                }
            } else {
                in_word = false;
            }
        }
        count
    }

    /// Character count of the longest line.
    pub fn max_line_length(text: &str) -> u32 {
        text.split('\n').map(Self::count_characters).max().unwrap_or(0)
    }

    /// More than half of the letters are ideographic.
    pub fn is_primarily_ideographic(text: &str) -> bool {
        let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
        if letters.is_empty() {
            return false;
        }
        let ideographic = letters.iter().filter(|c| is_ideographic(**c)).count();
        ideographic as f64 / letters.len() as f64 > 0.5
    }

    /// Reading speed limits for a text.
    pub fn reading_speed(text: &str, is_kids_content: bool) -> ReadingSpeed {
        if is_kids_content {
            ReadingSpeed::KIDS
        } else if Self::is_primarily_ideographic(text) {
            ReadingSpeed::IDEOGRAPHIC
        } else {
            ReadingSpeed::STANDARD
        }
    }
}

/// Grades segment text against reading-speed limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityAssessor;

impl QualityAssessor {
    pub fn new() -> Self {
        Self
    }

    /// 0 within the threshold, 1 within 120% of it, 2 beyond.
    pub fn evaluate_level(current: u32, threshold: u32) -> u8 {
        if current <= threshold {
            0
        } else if f64::from(current) <= f64::from(threshold) * 1.2 {
            1
        } else {
            2
        }
    }

    /// Assess one text displayed for `duration_secs`.
    pub fn assess_text(&self, text: &str, duration_secs: f64, is_kids_content: bool) -> SubtitleGuideline {
        let speed = TextMetrics::reading_speed(text, is_kids_content);
        let chars = TextMetrics::count_characters(text);
        let words = TextMetrics::count_words(text);
        let max_line = TextMetrics::max_line_length(text);

        let (cps, wpm) = if duration_secs > 0.0 {
            (
                (f64::from(chars) / duration_secs) as u32,
                (f64::from(words) / duration_secs * 60.0) as u32,
            )
        } else {
            (0, 0)
        };

        SubtitleGuideline {
            cps: Guideline {
                current: cps,
                level: Self::evaluate_level(cps, speed.max_cps),
            },
            wpm: Guideline {
                current: wpm,
                level: Self::evaluate_level(wpm, speed.max_wpm),
            },
            cpl: Guideline {
                current: max_line,
                level: Self::evaluate_level(max_line, MAX_CHARS_PER_LINE),
            },
        }
    }

    /// Refresh the guideline of every language that has a standard assigned.
    pub fn assess_segment(&self, segment: &mut Segment) {
        let duration = segment.duration_secs();
        let is_kids = segment.is_kids_content;
        for (language, content) in segment.languages.iter_mut() {
            if !segment.guideline_standard.contains_key(language) {
                continue;
            }
            content.guideline = Some(self.assess_text(&content.text, duration, is_kids));
        }
    }
}
