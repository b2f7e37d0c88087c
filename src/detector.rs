// Detection lifecycle and the fixed-rate sampling loop

use crate::camera::Camera;
use crate::config::DetectorConfig;
use crate::emotion::{Classification, EmotionClassifier};
use crate::error::{ClassifyError, DetectorError, Result};
use crate::history::HistoryBuffer;
use crate::models::{to_sample, EmotionSample};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Lifecycle of a detection session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectionPhase {
    Idle,
    ModelLoading,
    Ready,
    Detecting,
    /// Model loading failed; carries the cause
    Error(String),
}

impl std::fmt::Display for DetectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionPhase::Idle => write!(f, "idle"),
            DetectionPhase::ModelLoading => write!(f, "model loading"),
            DetectionPhase::Ready => write!(f, "ready"),
            DetectionPhase::Detecting => write!(f, "detecting"),
            DetectionPhase::Error(cause) => write!(f, "error: {cause}"),
        }
    }
}

/// Snapshot of the detector as seen by presentation code
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorState {
    pub is_loading: bool,
    pub is_model_loaded: bool,
    pub is_detecting: bool,
    pub current_emotion: Option<EmotionSample>,
    pub error: Option<String>,
}

/// Counters describing what the sampling loop has done this session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickStats {
    /// Ticks that invoked the classifier (or found no frame)
    pub ticks: u64,
    /// Samples appended to history
    pub samples: u64,
    pub no_face: u64,
    /// Malformed probability vectors
    pub rejected: u64,
    /// Classifier errors, panics and timeouts
    pub failed: u64,
    /// Periods dropped because a classifier call was still in flight
    pub skipped: u64,
    /// Results discarded because detection stopped while they were pending
    pub stale: u64,
}

/// Outcome of a successful `start()`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyDetecting,
}

struct Ticker {
    stop: oneshot::Sender<()>,
}

struct Session {
    phase: DetectionPhase,
    current: Option<EmotionSample>,
    history: HistoryBuffer,
    /// Bumped on every start/stop; ticks from an older generation are stale
    generation: u64,
    /// Single-flight guard for classifier calls
    in_flight: bool,
    last_timestamp: Option<DateTime<Utc>>,
    stats: TickStats,
    ticker: Option<Ticker>,
}

impl Session {
    fn idle(history: HistoryBuffer) -> Self {
        Self {
            phase: DetectionPhase::Idle,
            current: None,
            history,
            generation: 0,
            in_flight: false,
            last_timestamp: None,
            stats: TickStats::default(),
            ticker: None,
        }
    }

    /// Idle -> ModelLoading; any other phase is left alone
    fn begin_loading(&mut self) -> bool {
        if self.phase != DetectionPhase::Idle {
            return false;
        }
        debug!("Detector phase: idle -> model loading");
        self.phase = DetectionPhase::ModelLoading;
        true
    }

    fn state(&self) -> DetectorState {
        DetectorState {
            is_loading: matches!(
                self.phase,
                DetectionPhase::Idle | DetectionPhase::ModelLoading
            ),
            is_model_loaded: matches!(
                self.phase,
                DetectionPhase::Ready | DetectionPhase::Detecting
            ),
            is_detecting: self.phase == DetectionPhase::Detecting,
            current_emotion: self.current.clone(),
            error: match &self.phase {
                DetectionPhase::Error(cause) => Some(cause.clone()),
                _ => None,
            },
        }
    }

    /// Cancels the pending timer and invalidates any in-flight tick
    fn halt(&mut self) {
        self.generation += 1;
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.stop.send(());
        }
    }
}

enum TickGate {
    Run,
    Skip,
    Halt,
}

struct Shared {
    session: Mutex<Session>,
    state_tx: watch::Sender<DetectorState>,
    camera: Arc<dyn Camera>,
    classifier: Arc<dyn EmotionClassifier>,
    config: DetectorConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, session: &Session) {
        self.state_tx.send_replace(session.state());
    }

    fn begin_tick(&self, generation: u64) -> TickGate {
        let mut session = self.lock();
        if session.generation != generation || session.phase != DetectionPhase::Detecting {
            return TickGate::Halt;
        }
        if session.in_flight {
            session.stats.skipped += 1;
            debug!("Previous classification still pending; skipping tick");
            return TickGate::Skip;
        }
        session.in_flight = true;
        session.stats.ticks += 1;
        TickGate::Run
    }
}

/// Owns the detection session: lifecycle, sampling loop, history and the
/// current-emotion pointer.
///
/// Must be created inside a tokio runtime; construction immediately starts
/// loading the classifier's models in the background. Dropping the detector
/// cancels the sampling loop.
pub struct EmotionDetector {
    shared: Arc<Shared>,
}

impl EmotionDetector {
    pub fn new(
        camera: Arc<dyn Camera>,
        classifier: Arc<dyn EmotionClassifier>,
        config: DetectorConfig,
    ) -> Self {
        let mut session = Session::idle(HistoryBuffer::with_capacity(config.history_capacity));
        session.begin_loading();
        let (state_tx, _) = watch::channel(session.state());
        let shared = Arc::new(Shared {
            session: Mutex::new(session),
            state_tx,
            camera,
            classifier,
            config,
        });

        info!("Loading emotion detection models");
        tokio::spawn(load_models(shared.clone()));
        Self { shared }
    }

    /// Current lifecycle view
    pub fn state(&self) -> DetectorState {
        self.shared.lock().state()
    }

    pub fn phase(&self) -> DetectionPhase {
        self.shared.lock().phase.clone()
    }

    pub fn current_emotion(&self) -> Option<EmotionSample> {
        self.shared.lock().current.clone()
    }

    /// Copy of the retained samples, oldest first
    pub fn history_snapshot(&self) -> Vec<EmotionSample> {
        self.shared.lock().history.snapshot()
    }

    pub fn stats(&self) -> TickStats {
        self.shared.lock().stats
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.shared.config
    }

    /// Receives a fresh `DetectorState` whenever the lifecycle or the current
    /// emotion changes
    pub fn subscribe(&self) -> watch::Receiver<DetectorState> {
        self.shared.state_tx.subscribe()
    }

    /// Resolves once model loading has finished, successfully or not
    pub async fn wait_until_settled(&self) -> DetectorState {
        let mut rx = self.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                if !state.is_loading {
                    return state.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Starts periodic sampling.
    ///
    /// Requires loaded models and an active camera stream; calling it while
    /// already detecting is a no-op.
    pub fn start(&self) -> Result<StartOutcome> {
        let camera_active = self.shared.camera.is_active();

        let mut session = self.shared.lock();
        match &session.phase {
            DetectionPhase::Detecting => return Ok(StartOutcome::AlreadyDetecting),
            DetectionPhase::Idle | DetectionPhase::ModelLoading => {
                return Err(DetectorError::ModelLoading)
            }
            DetectionPhase::Error(cause) => {
                return Err(DetectorError::ModelUnavailable(cause.clone()))
            }
            DetectionPhase::Ready => {}
        }
        if !camera_active {
            warn!("Refusing to start detection: camera is not active");
            return Err(DetectorError::CameraInactive);
        }

        session.generation += 1;
        let generation = session.generation;
        let (stop, stop_rx) = oneshot::channel();
        tokio::spawn(run_ticker(self.shared.clone(), generation, stop_rx));
        session.ticker = Some(Ticker { stop });
        session.phase = DetectionPhase::Detecting;
        self.shared.publish(&session);

        info!(
            "Emotion detection started (every {} ms)",
            self.shared.config.tick_interval_ms
        );
        Ok(StartOutcome::Started)
    }

    /// Stops sampling; idempotent
    pub fn stop(&self) {
        let mut session = self.shared.lock();
        if session.phase != DetectionPhase::Detecting {
            return;
        }
        session.halt();
        session.phase = DetectionPhase::Ready;
        self.shared.publish(&session);
        info!("Emotion detection stopped");
    }

    /// Stops detection and clears history and the current emotion.
    ///
    /// Model state (ready or error) is kept.
    pub fn reset(&self) {
        let mut session = self.shared.lock();
        if session.phase == DetectionPhase::Detecting {
            session.halt();
            session.phase = DetectionPhase::Ready;
        }
        session.history.clear();
        session.current = None;
        session.last_timestamp = None;
        session.stats = TickStats::default();
        self.shared.publish(&session);
        info!("Detection session reset");
    }

    /// Retries model loading after a failure. Returns false when the
    /// detector is not in the error state.
    pub fn reload(&self) -> bool {
        {
            let mut session = self.shared.lock();
            if !matches!(session.phase, DetectionPhase::Error(_)) {
                return false;
            }
            session.phase = DetectionPhase::ModelLoading;
            self.shared.publish(&session);
        }
        info!("Retrying emotion model load");
        tokio::spawn(load_models(self.shared.clone()));
        true
    }
}

impl Drop for EmotionDetector {
    fn drop(&mut self) {
        self.shared.lock().halt();
    }
}

async fn load_models(shared: Arc<Shared>) {
    let result = shared.classifier.load_models().await;

    let mut session = shared.lock();
    if session.phase != DetectionPhase::ModelLoading {
        return;
    }
    match result {
        Ok(()) => {
            info!("Emotion detection models loaded");
            session.phase = DetectionPhase::Ready;
        }
        Err(e) => {
            error!("Error loading models: {}", e);
            session.phase = DetectionPhase::Error(e.to_string());
        }
    }
    shared.publish(&session);
}

/// Fires every tick period until stopped. Each firing either launches one
/// classification or, if the previous one is still pending, is dropped.
async fn run_ticker(shared: Arc<Shared>, generation: u64, mut stop: oneshot::Receiver<()>) {
    let period = shared.config.tick_interval();
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = interval.tick() => {}
        }
        match shared.begin_tick(generation) {
            TickGate::Run => {
                tokio::spawn(tick(shared.clone(), generation));
            }
            TickGate::Skip => continue,
            TickGate::Halt => break,
        }
    }
    debug!("Ticker for generation {} exited", generation);
}

async fn tick(shared: Arc<Shared>, generation: u64) {
    let captured_at = Utc::now();
    let classification = match shared.camera.current_frame() {
        Some(frame) => classify(&shared, frame).await,
        None => {
            debug!("No frame available");
            Classification::NoFace
        }
    };

    let mut session = shared.lock();
    session.in_flight = false;

    if session.generation != generation || session.phase != DetectionPhase::Detecting {
        if matches!(classification, Classification::Vector(_)) {
            session.stats.stale += 1;
        }
        debug!("Discarding result of a tick issued before stop");
        return;
    }

    match classification {
        Classification::Vector(vector) => {
            let timestamp = match session.last_timestamp {
                Some(last) if last > captured_at => last,
                _ => captured_at,
            };
            let sample = to_sample(&vector, timestamp);
            debug!("Detected {}", sample);
            session.last_timestamp = Some(timestamp);
            session.history.push(sample.clone());
            session.current = Some(sample);
            session.stats.samples += 1;
            shared.publish(&session);
        }
        Classification::NoFace => session.stats.no_face += 1,
        Classification::Rejected(e) => {
            warn!("Rejected malformed emotion vector: {}", e);
            session.stats.rejected += 1;
        }
        Classification::Failed(cause) => {
            warn!("Detection error: {}", cause);
            session.stats.failed += 1;
        }
    }
}

/// Runs the classifier on its own task so a panic or a deadline miss
/// resolves the tick instead of wedging the single-flight guard
async fn classify(shared: &Shared, frame: crate::models::Frame) -> Classification {
    let classifier = shared.classifier.clone();
    let mut call = tokio::spawn(async move { classifier.classify(&frame).await });

    let joined = match shared.config.tick_timeout() {
        Some(limit) => match tokio::time::timeout(limit, &mut call).await {
            Ok(joined) => joined,
            Err(_) => {
                call.abort();
                warn!("Classifier exceeded {:?}; treating as no face", limit);
                return Classification::NoFace;
            }
        },
        None => call.await,
    };

    let result = joined.unwrap_or_else(|e| Err(ClassifyError::Failed(e.to_string())));
    Classification::from_result(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CameraError, ModelLoadError};
    use crate::models::{EmotionScores, Frame};
    use crate::simulation::{ScriptStep, ScriptedClassifier, SimulatedCamera};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FixedCamera(AtomicBool);

    #[async_trait]
    impl Camera for FixedCamera {
        async fn start(&self) -> std::result::Result<crate::camera::StreamHandle, CameraError> {
            self.0.store(true, Ordering::SeqCst);
            Ok(crate::camera::StreamHandle {
                device: "fixed".into(),
                width: 2,
                height: 1,
            })
        }
        fn stop(&self) {
            self.0.store(false, Ordering::SeqCst);
        }
        fn is_active(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
        fn current_frame(&self) -> Option<Frame> {
            Some(Frame::new(vec![0; 6], 2, 1))
        }
    }

    struct FailingModels;

    #[async_trait]
    impl EmotionClassifier for FailingModels {
        async fn load_models(&self) -> std::result::Result<(), ModelLoadError> {
            Err(ModelLoadError("weights not found".into()))
        }
        async fn classify(
            &self,
            _frame: &Frame,
        ) -> std::result::Result<EmotionScores, crate::error::ClassifyError> {
            Err(crate::error::ClassifyError::NoFaceDetected)
        }
    }

    #[tokio::test]
    async fn load_failure_surfaces_as_error_state() {
        let detector = EmotionDetector::new(
            Arc::new(FixedCamera(AtomicBool::new(true))),
            Arc::new(FailingModels),
            DetectorConfig::default(),
        );
        let state = detector.wait_until_settled().await;
        assert!(!state.is_loading);
        assert!(!state.is_model_loaded);
        assert_eq!(
            state.error.as_deref(),
            Some("Model loading failed: weights not found")
        );
        assert!(matches!(
            detector.start(),
            Err(DetectorError::ModelUnavailable(_))
        ));

        detector.reset();
        assert!(matches!(detector.phase(), DetectionPhase::Error(_)));
    }

    #[test]
    fn loading_starts_only_from_idle() {
        let mut session = Session::idle(HistoryBuffer::new());
        assert_eq!(session.phase, DetectionPhase::Idle);
        assert!(session.begin_loading());
        assert_eq!(session.phase, DetectionPhase::ModelLoading);
        assert!(!session.begin_loading());

        session.phase = DetectionPhase::Ready;
        assert!(!session.begin_loading());
        assert_eq!(session.phase, DetectionPhase::Ready);
    }

    #[tokio::test]
    async fn new_detector_is_loading_models() {
        let detector = EmotionDetector::new(
            Arc::new(SimulatedCamera::default()),
            Arc::new(ScriptedClassifier::new(Vec::<ScriptStep>::new())),
            DetectorConfig::default(),
        );
        assert_eq!(detector.phase(), DetectionPhase::ModelLoading);
        assert!(detector.state().is_loading);
    }

    #[test]
    fn state_flags_follow_phase() {
        let mut session = Session::idle(HistoryBuffer::new());
        assert!(session.state().is_loading);

        session.phase = DetectionPhase::Detecting;
        let state = session.state();
        assert!(state.is_model_loaded && state.is_detecting && !state.is_loading);

        session.phase = DetectionPhase::Error("boom".into());
        assert_eq!(session.state().error.as_deref(), Some("boom"));
        assert_eq!(session.phase.to_string(), "error: boom");
    }
}
