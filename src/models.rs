// Core data models for the emotion sampling pipeline

use crate::error::VectorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Represents a single video frame with RGB data
#[derive(Clone, Debug)]
pub struct Frame {
    /// Raw RGB pixel data (width * height * 3 bytes), shared between readers
    pub data: Arc<[u8]>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Frame {
    /// Creates a new Frame with the given parameters
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            width,
            height,
        }
    }
}

/// The closed set of facial emotions. Declaration order is the tie-break order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
    Neutral,
}

impl EmotionLabel {
    /// Every label in declaration order
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Angry,
        EmotionLabel::Fearful,
        EmotionLabel::Disgusted,
        EmotionLabel::Surprised,
        EmotionLabel::Neutral,
    ];

    /// Position in declaration order
    pub fn index(self) -> usize {
        self as usize
    }

    /// Machine name used on the wire and in language-model context
    pub fn name(self) -> &'static str {
        match self {
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Fearful => "fearful",
            EmotionLabel::Disgusted => "disgusted",
            EmotionLabel::Surprised => "surprised",
            EmotionLabel::Neutral => "neutral",
        }
    }

    /// Short label shown next to charts and legends
    pub fn display_label(self) -> &'static str {
        match self {
            EmotionLabel::Happy => "Happy",
            EmotionLabel::Sad => "Sad",
            EmotionLabel::Angry => "Angry",
            EmotionLabel::Fearful => "Fear",
            EmotionLabel::Disgusted => "Disgust",
            EmotionLabel::Surprised => "Surprise",
            EmotionLabel::Neutral => "Neutral",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            EmotionLabel::Happy => "😊",
            EmotionLabel::Sad => "😢",
            EmotionLabel::Angry => "😠",
            EmotionLabel::Fearful => "😨",
            EmotionLabel::Disgusted => "🤢",
            EmotionLabel::Surprised => "😲",
            EmotionLabel::Neutral => "😐",
        }
    }

    /// Parses a machine name, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|label| label.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl std::fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw per-label scores as a classifier reports them
pub type EmotionScores = HashMap<String, f32>;

/// Validated probability vector: one score in [0, 1] per label
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmotionVector([f32; 7]);

impl EmotionVector {
    /// Validates a full vector indexed in label declaration order
    pub fn new(values: [f32; 7]) -> Result<Self, VectorError> {
        for (label, value) in EmotionLabel::ALL.iter().zip(values) {
            check_score(label.name(), value)?;
        }
        Ok(Self(values))
    }

    /// Validates a classifier's raw `label -> score` mapping.
    ///
    /// Missing labels, unknown labels, non-finite values and values outside
    /// [0, 1] are all rejected.
    pub fn from_scores(scores: &EmotionScores) -> Result<Self, VectorError> {
        let mut values = [None; 7];
        for (name, &value) in scores {
            let label = EmotionLabel::from_name(name)
                .ok_or_else(|| VectorError::UnknownLabel(name.clone()))?;
            check_score(name, value)?;
            values[label.index()] = Some(value);
        }

        let mut out = [0.0; 7];
        for label in EmotionLabel::ALL {
            out[label.index()] =
                values[label.index()].ok_or(VectorError::MissingLabel(label.name()))?;
        }
        Ok(Self(out))
    }

    /// Builds a vector from raw model logits.
    ///
    /// Expects the 8-class affect-model order (angry, disgust, fear, happy,
    /// sad, surprise, neutral, contempt); contempt is folded into disgusted.
    /// A 7-logit output without contempt is accepted as well.
    pub fn from_logits(logits: &[f32]) -> Result<Self, VectorError> {
        if logits.len() != 7 && logits.len() != 8 {
            return Err(VectorError::LogitCount(logits.len()));
        }
        if let Some(position) = logits.iter().position(|x| !x.is_finite()) {
            return Err(VectorError::NotFinite {
                label: format!("logit[{position}]"),
            });
        }

        // Softmax, shifted by the max logit for numerical stability
        let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();

        let mut out = [0.0f32; 7];
        for (index, &logit) in logits.iter().enumerate() {
            let probability = (logit - max_logit).exp() / exp_sum;
            out[logit_index_to_label(index).index()] += probability;
        }
        for value in &mut out {
            *value = value.clamp(0.0, 1.0);
        }
        Ok(Self(out))
    }

    /// Score for one label
    pub fn get(&self, label: EmotionLabel) -> f32 {
        self.0[label.index()]
    }

    /// Iterates `(label, score)` in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f32)> + '_ {
        EmotionLabel::ALL.into_iter().map(|label| (label, self.get(label)))
    }
}

fn check_score(label: &str, value: f32) -> Result<(), VectorError> {
    if !value.is_finite() {
        return Err(VectorError::NotFinite {
            label: label.to_string(),
        });
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(VectorError::OutOfRange {
            label: label.to_string(),
            value,
        });
    }
    Ok(())
}

/// Maps 8-class affect-model output index to EmotionLabel.
/// 0=Angry, 1=Disgust, 2=Fear, 3=Happy, 4=Sad, 5=Surprise, 6=Neutral, 7=Contempt
fn logit_index_to_label(index: usize) -> EmotionLabel {
    match index {
        0 => EmotionLabel::Angry,
        1 => EmotionLabel::Disgusted,
        2 => EmotionLabel::Fearful,
        3 => EmotionLabel::Happy,
        4 => EmotionLabel::Sad,
        5 => EmotionLabel::Surprised,
        6 => EmotionLabel::Neutral,
        // Contempt
        _ => EmotionLabel::Disgusted,
    }
}

/// Arg-max over the vector; the first-declared label wins ties
pub fn dominant_label(vector: &EmotionVector) -> EmotionLabel {
    let mut best = EmotionLabel::Happy;
    for (label, score) in vector.iter() {
        if score > vector.get(best) {
            best = label;
        }
    }
    best
}

/// Wraps a validated vector into a sample taken at `timestamp`
pub fn to_sample(vector: &EmotionVector, timestamp: DateTime<Utc>) -> EmotionSample {
    let emotion = dominant_label(vector);
    EmotionSample {
        emotion,
        confidence: vector.get(emotion),
        timestamp,
        all_emotions: vector.iter().collect(),
    }
}

/// One classified frame: the dominant emotion, its confidence and the full vector
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionSample {
    /// The arg-max label
    pub emotion: EmotionLabel,
    /// Probability of `emotion` (0.0 to 1.0)
    pub confidence: f32,
    /// Capture time
    pub timestamp: DateTime<Utc>,
    /// Full probability vector, one entry per label
    pub all_emotions: BTreeMap<EmotionLabel, f32>,
}

impl EmotionSample {
    /// Returns the confidence as a percentage (0-100)
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence * 100.0).round() as u8
    }

    /// Rounded percentage (0-100) for one label of the full vector
    pub fn percent_of(&self, label: EmotionLabel) -> u8 {
        let score = self.all_emotions.get(&label).copied().unwrap_or(0.0);
        (score * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

impl std::fmt::Display for EmotionSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}% confidence)",
            self.emotion.display_label(),
            self.confidence_percent()
        )
    }
}
