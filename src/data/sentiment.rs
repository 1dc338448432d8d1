//! Title polarity scoring.
//!
//! The pipeline treats sentiment as an opaque collaborator: anything that
//! maps a string to one deterministic real number can be plugged in.  The
//! bundled [`LexiconScorer`] sums word polarities, applies negators and
//! amplifiers found in the three words before each polar word, and divides
//! by the square root of the word count.

use std::collections::HashMap;

/// Maps a piece of text to a single real-valued polarity.
pub trait SentimentScorer {
    fn score(&self, text: &str) -> f64;
}

impl<F> SentimentScorer for F
where
    F: Fn(&str) -> f64,
{
    fn score(&self, text: &str) -> f64 {
        self(text)
    }
}

const POSITIVE: &[(&str, f64)] = &[
    ("amazing", 1.0),
    ("angel", 0.75),
    ("awesome", 1.0),
    ("beautiful", 1.0),
    ("best", 1.0),
    ("bless", 0.75),
    ("brave", 0.75),
    ("bright", 0.5),
    ("celebrate", 0.75),
    ("charming", 0.75),
    ("dream", 0.5),
    ("fair", 0.5),
    ("faith", 0.5),
    ("free", 0.5),
    ("friend", 0.75),
    ("fun", 0.75),
    ("gift", 0.5),
    ("glory", 0.75),
    ("good", 0.75),
    ("grace", 0.75),
    ("great", 0.75),
    ("happy", 1.0),
    ("hero", 0.75),
    ("heroes", 0.75),
    ("hope", 0.75),
    ("joy", 1.0),
    ("kind", 0.5),
    ("laugh", 0.75),
    ("legend", 0.5),
    ("like", 0.25),
    ("love", 1.0),
    ("lucky", 0.75),
    ("magic", 0.5),
    ("marvel", 0.75),
    ("nice", 0.5),
    ("peace", 0.75),
    ("perfect", 1.0),
    ("pretty", 0.5),
    ("rich", 0.5),
    ("safe", 0.5),
    ("smart", 0.5),
    ("star", 0.25),
    ("strong", 0.5),
    ("success", 0.75),
    ("sweet", 0.75),
    ("triumph", 0.75),
    ("trust", 0.5),
    ("wonder", 0.75),
    ("wonderful", 1.0),
    ("yes", 0.25),
];

const NEGATIVE: &[(&str, f64)] = &[
    ("afraid", -0.75),
    ("alone", -0.5),
    ("angry", -0.75),
    ("bad", -0.75),
    ("black", -0.25),
    ("blood", -0.5),
    ("bomb", -0.75),
    ("broken", -0.75),
    ("crawl", -0.25),
    ("crime", -0.75),
    ("cry", -0.5),
    ("curse", -0.75),
    ("danger", -0.75),
    ("dark", -0.5),
    ("dead", -1.0),
    ("death", -1.0),
    ("destroy", -0.75),
    ("devil", -0.75),
    ("die", -1.0),
    ("doom", -0.75),
    ("enemy", -0.75),
    ("evil", -1.0),
    ("fall", -0.25),
    ("fear", -0.75),
    ("fight", -0.5),
    ("ghost", -0.25),
    ("grudge", -0.5),
    ("hate", -1.0),
    ("haunt", -0.5),
    ("hell", -0.75),
    ("hunt", -0.25),
    ("kill", -1.0),
    ("killer", -1.0),
    ("lie", -0.5),
    ("lost", -0.5),
    ("mad", -0.5),
    ("monster", -0.5),
    ("murder", -1.0),
    ("pain", -0.75),
    ("poor", -0.5),
    ("rage", -0.75),
    ("revenge", -0.75),
    ("sad", -0.75),
    ("scary", -0.75),
    ("shadow", -0.25),
    ("sick", -0.5),
    ("sin", -0.5),
    ("sorry", -0.25),
    ("storm", -0.25),
    ("terror", -1.0),
    ("trouble", -0.5),
    ("ugly", -0.75),
    ("villain", -0.5),
    ("war", -0.75),
    ("wicked", -0.75),
    ("wrong", -0.5),
];

const NEGATORS: &[&str] = &["ain't", "aren't", "can't", "don't", "isn't", "never", "no", "not", "nothing", "won't", "without"];
const AMPLIFIERS: &[&str] = &["absolutely", "extremely", "most", "really", "so", "super", "totally", "very"];
const DEAMPLIFIERS: &[&str] = &["barely", "hardly", "little", "only", "slightly", "somewhat"];

/// Words before a polar word inspected for valence shifters.
const SHIFT_WINDOW: usize = 3;
const AMPLIFIER_WEIGHT: f64 = 0.8;
const DEAMPLIFIER_WEIGHT: f64 = 0.5;

/// Dictionary scorer with simple valence shifting.
#[derive(Debug, Clone)]
pub struct LexiconScorer {
    polarity: HashMap<&'static str, f64>,
}

impl Default for LexiconScorer {
    fn default() -> Self {
        let polarity = POSITIVE.iter().chain(NEGATIVE).copied().collect();
        LexiconScorer { polarity }
    }
}

impl LexiconScorer {
    /// Add or replace entries in the polarity dictionary.
    pub fn with_words(mut self, words: &[(&'static str, f64)]) -> Self {
        self.polarity.extend(words.iter().copied());
        self
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> f64 {
        let words: Vec<String> = tokenize(text);
        if words.is_empty() {
            return 0.0;
        }

        let mut total = 0.0;
        for (i, word) in words.iter().enumerate() {
            let Some(&polarity) = self.polarity.get(word.as_str()) else {
                continue;
            };
            let window = &words[i.saturating_sub(SHIFT_WINDOW)..i];
            let negations = window.iter().filter(|w| NEGATORS.contains(&w.as_str())).count();
            let amplifiers = window.iter().filter(|w| AMPLIFIERS.contains(&w.as_str())).count();
            let deamplifiers = window.iter().filter(|w| DEAMPLIFIERS.contains(&w.as_str())).count();

            let mut weight = if negations % 2 == 1 {
                -1.0
            } else {
                1.0 + AMPLIFIER_WEIGHT * amplifiers as f64
            };
            weight *= (1.0 - DEAMPLIFIER_WEIGHT * deamplifiers as f64).max(0.0);
            total += polarity * weight;
        }

        total / (words.len() as f64).sqrt()
    }
}

/// Lower-cased words; apostrophes stay inside words, every other
/// non-alphanumeric character separates.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_title_scores_zero() {
        let s = LexiconScorer::default();
        assert_eq!(s.score("The Irishman"), 0.0);
        assert_eq!(s.score(""), 0.0);
        assert_eq!(s.score("!!!"), 0.0);
    }

    #[test]
    fn test_polarity_sign_and_normalisation() {
        let s = LexiconScorer::default();
        assert!(s.score("Dark Phoenix") < 0.0);
        assert_eq!(s.score("Happy Death Day"), 0.0);
        assert!((s.score("Love") - 1.0).abs() < 1e-12);
        // Two words: 1.0 / sqrt(2)
        assert!((s.score("Love Actually") - 1.0 / 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_negation_and_amplification() {
        let s = LexiconScorer::default();
        let plain = s.score("a good day");
        let negated = s.score("not a good day");
        let amplified = s.score("a very good day");
        assert!(plain > 0.0);
        assert!(negated < 0.0);
        assert!(amplified * 2.0 > plain * 3f64.sqrt());
        assert!(s.score("a slightly good day") < plain);
    }

    #[test]
    fn test_deterministic() {
        let s = LexiconScorer::default();
        let title = "Once Upon a Time in Hollywood";
        assert_eq!(s.score(title), s.score(title));
    }

    #[test]
    fn test_custom_words_and_closures() {
        let s = LexiconScorer::default().with_words(&[("hollywood", 0.5)]);
        assert!(s.score("Hollywood") > 0.0);

        let constant = |_: &str| -3.5;
        assert_eq!(constant.score("anything"), -3.5);
    }
}
