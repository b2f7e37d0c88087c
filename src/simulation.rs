// Simulated capture device and classifiers for headless runs and tests

use crate::camera::{Camera, StreamHandle};
use crate::error::{CameraError, ClassifyError, ModelLoadError};
use crate::models::{EmotionLabel, EmotionScores, Frame};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Scores with `score` on `label` and the remainder spread evenly over the rest
pub fn peaked_scores(label: EmotionLabel, score: f32) -> EmotionScores {
    let rest = ((1.0 - score) / 6.0).max(0.0);
    EmotionLabel::ALL
        .iter()
        .map(|&other| {
            let value = if other == label { score } else { rest };
            (other.name().to_string(), value)
        })
        .collect()
}

/// Camera that synthesises a moving gradient while active
pub struct SimulatedCamera {
    active: AtomicBool,
    fail_with: Option<CameraError>,
    width: u32,
    height: u32,
    frames: AtomicU64,
}

impl SimulatedCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            active: AtomicBool::new(false),
            fail_with: None,
            width,
            height,
            frames: AtomicU64::new(0),
        }
    }

    /// A camera whose `start` always fails with `error`
    pub fn unavailable(error: CameraError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::new(0, 0)
        }
    }

    pub fn frames_served(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new(64, 48)
    }
}

#[async_trait]
impl Camera for SimulatedCamera {
    async fn start(&self) -> Result<StreamHandle, CameraError> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }
        self.active.store(true, Ordering::SeqCst);
        info!("Simulated camera started ({}x{})", self.width, self.height);
        Ok(StreamHandle {
            device: "simulated".to_string(),
            width: self.width,
            height: self.height,
        })
    }

    fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!("Simulated camera stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn current_frame(&self) -> Option<Frame> {
        if !self.is_active() {
            return None;
        }
        let seq = self.frames.fetch_add(1, Ordering::SeqCst);
        let data = (0..self.width * self.height)
            .flat_map(|i| {
                let v = ((i as u64 + seq) % 256) as u8;
                [v, v, v]
            })
            .collect();
        Some(Frame::new(data, self.width, self.height))
    }
}

/// One scripted classifier response
#[derive(Clone, Debug)]
pub enum ScriptStep {
    Scores(EmotionScores),
    NoFace,
    Fail(String),
    Panic,
}

/// Classifier that replays a fixed script and records how it was called.
///
/// Once the script runs out every call reports no face.
pub struct ScriptedClassifier {
    load_result: Result<(), ModelLoadError>,
    load_delay: Duration,
    delay: Duration,
    script: Mutex<VecDeque<ScriptStep>>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            load_result: Ok(()),
            load_delay: Duration::ZERO,
            delay: Duration::ZERO,
            script: Mutex::new(steps.into_iter().collect()),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn failing_load(cause: &str) -> Self {
        Self {
            load_result: Err(ModelLoadError(cause.to_string())),
            ..Self::new(Vec::<ScriptStep>::new())
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Every `classify` call takes `delay` to resolve
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, step: ScriptStep) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
    }

    /// Number of `classify` invocations so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of `classify` calls that were pending at once
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

struct ActiveCall<'a>(&'a AtomicUsize);

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl crate::emotion::EmotionClassifier for ScriptedClassifier {
    async fn load_models(&self) -> Result<(), ModelLoadError> {
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        self.load_result.clone()
    }

    async fn classify(&self, _frame: &Frame) -> Result<EmotionScores, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let _guard = ActiveCall(&self.active);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match step {
            Some(ScriptStep::Scores(scores)) => Ok(scores),
            Some(ScriptStep::Fail(cause)) => Err(ClassifyError::Failed(cause)),
            Some(ScriptStep::Panic) => panic!("scripted classifier panic"),
            Some(ScriptStep::NoFace) | None => Err(ClassifyError::NoFaceDetected),
        }
    }
}

/// Classifier producing plausible, slowly drifting emotion vectors
pub struct RandomClassifier {
    rng: Mutex<StdRng>,
    mood: Mutex<EmotionLabel>,
    no_face_ratio: f64,
    load_delay: Duration,
}

impl RandomClassifier {
    pub fn new(seed: u64, no_face_ratio: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            mood: Mutex::new(EmotionLabel::Neutral),
            no_face_ratio: no_face_ratio.clamp(0.0, 1.0),
            load_delay: Duration::from_millis(300),
        }
    }
}

#[async_trait]
impl crate::emotion::EmotionClassifier for RandomClassifier {
    async fn load_models(&self) -> Result<(), ModelLoadError> {
        tokio::time::sleep(self.load_delay).await;
        info!("Simulated emotion models ready");
        Ok(())
    }

    async fn classify(&self, _frame: &Frame) -> Result<EmotionScores, ClassifyError> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        if rng.gen_bool(self.no_face_ratio) {
            return Err(ClassifyError::NoFaceDetected);
        }

        let mut mood = self.mood.lock().unwrap_or_else(PoisonError::into_inner);
        if rng.gen_bool(0.1) {
            *mood = EmotionLabel::ALL[rng.gen_range(0..EmotionLabel::ALL.len())];
            debug!("Simulated mood drifted to {}", *mood);
        }

        let weights: Vec<f32> = EmotionLabel::ALL
            .iter()
            .map(|&label| {
                let base: f32 = rng.gen_range(0.0..1.0);
                if label == *mood {
                    base + 3.0
                } else {
                    base
                }
            })
            .collect();
        let total: f32 = weights.iter().sum();

        Ok(EmotionLabel::ALL
            .iter()
            .zip(weights)
            .map(|(label, weight)| (label.name().to_string(), weight / total))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionClassifier;
    use crate::models::EmotionVector;

    #[test]
    fn peaked_scores_cover_every_label() {
        let scores = peaked_scores(EmotionLabel::Sad, 0.7);
        assert_eq!(scores.len(), 7);
        assert!(EmotionVector::from_scores(&scores).is_ok());
    }

    #[tokio::test]
    async fn camera_serves_frames_only_while_active() {
        let camera = SimulatedCamera::new(4, 2);
        assert!(camera.current_frame().is_none());
        camera.start().await.unwrap();
        let frame = camera.current_frame().unwrap();
        assert_eq!(frame.data.len(), 4 * 2 * 3);
        camera.stop();
        assert!(camera.current_frame().is_none());
        assert_eq!(camera.frames_served(), 1);
    }

    #[tokio::test]
    async fn random_classifier_emits_valid_vectors() {
        let classifier = RandomClassifier::new(7, 0.0);
        let frame = Frame::new(vec![0; 3], 1, 1);
        for _ in 0..20 {
            let scores = classifier.classify(&frame).await.unwrap();
            assert!(EmotionVector::from_scores(&scores).is_ok());
        }
    }
}
