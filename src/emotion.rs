// Emotion classifier contract and result validation

use crate::error::{ClassifyError, ModelLoadError, VectorError};
use crate::models::{EmotionScores, EmotionVector, Frame};
use async_trait::async_trait;

/// Black-box facial emotion classifier.
///
/// `load_models` is called once by the detector before any frame is
/// classified. `classify` is called at most once at a time.
#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    async fn load_models(&self) -> Result<(), ModelLoadError>;

    /// Scores every emotion label for the most prominent face in `frame`
    async fn classify(&self, frame: &Frame) -> Result<EmotionScores, ClassifyError>;
}

/// What one classifier call amounts to once validated
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Vector(EmotionVector),
    NoFace,
    Rejected(VectorError),
    Failed(String),
}

impl Classification {
    /// Folds a raw classifier result into a validated outcome
    pub fn from_result(result: Result<EmotionScores, ClassifyError>) -> Self {
        match result {
            Ok(scores) => match EmotionVector::from_scores(&scores) {
                Ok(vector) => Classification::Vector(vector),
                Err(e) => Classification::Rejected(e),
            },
            Err(ClassifyError::NoFaceDetected) => Classification::NoFace,
            Err(ClassifyError::Failed(cause)) => Classification::Failed(cause),
        }
    }
}
