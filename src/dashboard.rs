// Dashboard orchestration: camera + detector + aggregates for presentation

use crate::aggregate::{self, EmotionContext, EmotionShare, EmotionSummary, TrendPoint};
use crate::camera::{Camera, StreamHandle};
use crate::config::DetectorConfig;
use crate::detector::{DetectorState, EmotionDetector, StartOutcome};
use crate::emotion::EmotionClassifier;
use crate::error::Result;
use crate::models::EmotionSample;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Everything the dashboard renders, computed from one history snapshot
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub state: DetectorState,
    pub camera_active: bool,
    pub summary: EmotionSummary,
    /// Largest shares, for the summary legend
    pub legend: Vec<EmotionShare>,
    pub trend: Vec<TrendPoint>,
    pub context: EmotionContext,
}

/// Optional patient details forwarded to the report service
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInfo {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub notes: Option<String>,
}

/// Request body for report generation
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub emotion_history: Vec<EmotionSample>,
    pub current_emotion: Option<EmotionSample>,
    pub patient_info: PatientInfo,
}

/// Composes a camera and an emotion detector for the presentation layer
pub struct Dashboard {
    camera: Arc<dyn Camera>,
    detector: EmotionDetector,
}

impl Dashboard {
    /// Creates the dashboard; model loading starts immediately
    pub fn new(
        camera: Arc<dyn Camera>,
        classifier: Arc<dyn EmotionClassifier>,
        config: DetectorConfig,
    ) -> Self {
        let detector = EmotionDetector::new(camera.clone(), classifier, config);
        Self { camera, detector }
    }

    pub fn detector(&self) -> &EmotionDetector {
        &self.detector
    }

    pub async fn start_camera(&self) -> Result<StreamHandle> {
        let handle = self.camera.start().await.map_err(|e| {
            error!("Camera initialization failed: {}", e);
            e
        })?;
        info!(
            "Camera stream open: {} ({}x{})",
            handle.device, handle.width, handle.height
        );
        Ok(handle)
    }

    /// Stops detection first, then the camera
    pub fn stop_camera(&self) {
        self.detector.stop();
        self.camera.stop();
    }

    pub fn start_detection(&self) -> Result<StartOutcome> {
        self.detector.start()
    }

    pub fn stop_detection(&self) {
        self.detector.stop();
    }

    pub fn reset(&self) {
        self.detector.reset();
    }

    pub fn history(&self) -> Vec<EmotionSample> {
        self.detector.history_snapshot()
    }

    /// Polls the detector and recomputes every aggregate
    pub fn view(&self) -> DashboardView {
        let config = self.detector.config();
        let state = self.detector.state();
        let history = self.detector.history_snapshot();

        let summary = aggregate::summarize(&history);
        let legend = summary.top(config.summary_top).to_vec();
        let trend =
            aggregate::trend_series(&history, config.trend_window, &aggregate::TREND_LABELS);
        let context = EmotionContext::new(
            &history,
            state.current_emotion.as_ref(),
            config.context_window,
        );

        DashboardView {
            state,
            camera_active: self.camera.is_active(),
            summary,
            legend,
            trend,
            context,
        }
    }

    /// Recent-emotion context for the chat assistant
    pub fn emotion_context(&self) -> EmotionContext {
        let history = self.detector.history_snapshot();
        EmotionContext::new(
            &history,
            self.detector.current_emotion().as_ref(),
            self.detector.config().context_window,
        )
    }

    pub fn report_request(&self, patient_info: PatientInfo) -> ReportRequest {
        ReportRequest {
            emotion_history: self.detector.history_snapshot(),
            current_emotion: self.detector.current_emotion(),
            patient_info,
        }
    }
}
