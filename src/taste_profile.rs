//! # Taste-Profile Classifier
//!
//! Turns the four sections of the eating-habits quiz into a four-letter
//! profile code. Each section feeds exactly one axis; the axis takes its high
//! letter when the summed answers reach [`AXIS_THRESHOLD`].
//!
//! | Axis | High | Low |
//! |------|------|-----|
//! | 1 | E (exploratory) | C (conservative) |
//! | 2 | F (fast) | S (slow) |
//! | 3 | S (solo) | G (group) |
//! | 4 | B (bold) | M (mild) |

use serde::{Deserialize, Serialize};

/// Inclusive lower bound of the high letter on every axis
pub const AXIS_THRESHOLD: i64 = 15;

/// Letter pairs `(high, low)` per axis
pub const AXIS_LETTERS: [(char, char); 4] = [('E', 'C'), ('F', 'S'), ('S', 'G'), ('B', 'M')];

/// Quiz answers as stored on the user document, one list per axis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizResponses {
    #[serde(rename = "responses-1", default)]
    pub exploration: Vec<i64>,
    #[serde(rename = "responses-2", default)]
    pub pace: Vec<i64>,
    #[serde(rename = "responses-3", default)]
    pub company: Vec<i64>,
    #[serde(rename = "responses-4", default)]
    pub flavor: Vec<i64>,
}

impl QuizResponses {
    pub fn axes(&self) -> [&[i64]; 4] {
        [&self.exploration, &self.pace, &self.company, &self.flavor]
    }
}

/// Summed score per axis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisScores {
    #[serde(rename = "E_C")]
    pub exploration: i64,
    #[serde(rename = "F_S")]
    pub pace: i64,
    #[serde(rename = "S_G")]
    pub company: i64,
    #[serde(rename = "B_M")]
    pub flavor: i64,
}

impl AxisScores {
    fn as_array(&self) -> [i64; 4] {
        [self.exploration, self.pace, self.company, self.flavor]
    }
}

/// A classified profile: the code and the scores it was derived from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasteProfile {
    #[serde(rename = "fmbt")]
    pub code: String,
    #[serde(rename = "fmbtScores")]
    pub scores: AxisScores,
}

/// Classify quiz answers into a profile
///
/// Missing sections count as zero and therefore take the low letter.
///
/// # Examples
///
/// ```rust
/// use cookit::taste_profile::{classify, QuizResponses};
///
/// let responses = QuizResponses {
///     exploration: vec![5, 5, 5],
///     pace: vec![2, 3],
///     company: vec![20],
///     flavor: vec![],
/// };
/// let profile = classify(&responses);
/// assert_eq!(profile.code, "ESSM");
/// assert_eq!(profile.scores.exploration, 15);
/// ```
pub fn classify(responses: &QuizResponses) -> TasteProfile {
    let [exploration, pace, company, flavor] = responses.axes().map(|axis| axis.iter().sum::<i64>());
    let scores = AxisScores {
        exploration,
        pace,
        company,
        flavor,
    };

    let code = scores
        .as_array()
        .iter()
        .zip(AXIS_LETTERS.iter())
        .map(|(sum, (high, low))| if *sum >= AXIS_THRESHOLD { *high } else { *low })
        .collect();

    TasteProfile { code, scores }
}
