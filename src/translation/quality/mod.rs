/*!
 * Quality assessment for translated subtitles.
 *
 * Every segment written by the pipeline is graded for readability
 * (characters per second, words per minute, characters per line) so that
 * editors can spot lines that are too fast or too long to read.
 */

pub mod metrics;

pub use metrics::{QualityAssessor, ReadingSpeed, TextMetrics, MAX_CHARS_PER_LINE};
