// On-demand aggregates over a history snapshot

use crate::models::{EmotionLabel, EmotionSample};
use serde::Serialize;
use std::collections::BTreeMap;

/// Number of trailing samples plotted on the timeline chart
pub const TREND_WINDOW: usize = 30;

/// Labels plotted on the timeline chart
pub const TREND_LABELS: [EmotionLabel; 5] = [
    EmotionLabel::Happy,
    EmotionLabel::Sad,
    EmotionLabel::Angry,
    EmotionLabel::Neutral,
    EmotionLabel::Surprised,
];

/// Number of trailing samples handed to a language-model consumer
pub const CONTEXT_WINDOW: usize = 10;

/// How often each label was the dominant one
pub fn dominant_counts(history: &[EmotionSample]) -> BTreeMap<EmotionLabel, usize> {
    let mut counts = BTreeMap::new();
    for sample in history {
        *counts.entry(sample.emotion).or_insert(0) += 1;
    }
    counts
}

/// One slice of the percentage breakdown
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionShare {
    pub emotion: EmotionLabel,
    pub name: &'static str,
    pub count: usize,
    pub percent: u8,
}

/// Percentage-of-total per dominant label, largest first.
///
/// Labels never seen are omitted. Ties keep declaration order. Shares are
/// floored and the rounding residue goes to the last entry, so a non-empty
/// breakdown always sums to exactly 100.
pub fn breakdown(history: &[EmotionSample]) -> Vec<EmotionShare> {
    let total = history.len();
    if total == 0 {
        return Vec::new();
    }

    // BTreeMap iterates in declaration order; the stable sort preserves it for ties
    let mut shares: Vec<EmotionShare> = dominant_counts(history)
        .into_iter()
        .map(|(emotion, count)| EmotionShare {
            emotion,
            name: emotion.display_label(),
            count,
            percent: (count * 100 / total) as u8,
        })
        .collect();
    shares.sort_by(|a, b| b.count.cmp(&a.count));

    let assigned: u32 = shares.iter().map(|share| share.percent as u32).sum();
    if let Some(last) = shares.last_mut() {
        last.percent += (100 - assigned) as u8;
    }
    // the residue can lift the last share above its neighbours
    shares.sort_by(|a, b| b.percent.cmp(&a.percent).then(a.emotion.cmp(&b.emotion)));
    shares
}

/// Breakdown plus the number of samples it was computed from
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionSummary {
    pub data_points: usize,
    pub shares: Vec<EmotionShare>,
}

impl EmotionSummary {
    /// The `k` largest shares
    pub fn top(&self, k: usize) -> &[EmotionShare] {
        &self.shares[..k.min(self.shares.len())]
    }

    pub fn percent_of(&self, emotion: EmotionLabel) -> u8 {
        self.shares
            .iter()
            .find(|share| share.emotion == emotion)
            .map(|share| share.percent)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.data_points == 0
    }
}

pub fn summarize(history: &[EmotionSample]) -> EmotionSummary {
    EmotionSummary {
        data_points: history.len(),
        shares: breakdown(history),
    }
}

/// Last `n` samples in original order; all of them if fewer exist
pub fn recent_window(history: &[EmotionSample], n: usize) -> &[EmotionSample] {
    &history[history.len().saturating_sub(n)..]
}

/// One x-axis point of the timeline chart
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    /// Position within the plotted window, starting at 0
    pub time: usize,
    pub values: BTreeMap<EmotionLabel, u8>,
}

/// Per-label rounded percentages for each of the last `n` samples
pub fn trend_series(
    history: &[EmotionSample],
    n: usize,
    labels: &[EmotionLabel],
) -> Vec<TrendPoint> {
    recent_window(history, n)
        .iter()
        .enumerate()
        .map(|(time, sample)| TrendPoint {
            time,
            values: labels
                .iter()
                .map(|&label| (label, sample.percent_of(label)))
                .collect(),
        })
        .collect()
}

/// Short-term emotional context for a conversational consumer
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionContext {
    pub recent: Vec<EmotionLabel>,
    pub current: Option<EmotionLabel>,
}

impl EmotionContext {
    pub fn new(history: &[EmotionSample], current: Option<&EmotionSample>, n: usize) -> Self {
        Self {
            recent: recent_window(history, n)
                .iter()
                .map(|sample| sample.emotion)
                .collect(),
            current: current.map(|sample| sample.emotion),
        }
    }
}

impl std::fmt::Display for EmotionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Recent detected emotions:")?;
        for emotion in &self.recent {
            writeln!(f, "- {emotion}")?;
        }
        writeln!(f)?;
        writeln!(f, "Current emotion:")?;
        match self.current {
            Some(emotion) => writeln!(f, "{emotion}"),
            None => writeln!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{to_sample, EmotionVector};
    use chrono::Utc;

    fn sample_of(label: EmotionLabel, score: f32) -> EmotionSample {
        let rest = (1.0 - score) / 6.0;
        let mut values = [rest; 7];
        values[label.index()] = score;
        to_sample(&EmotionVector::new(values).unwrap(), Utc::now())
    }

    #[test]
    fn breakdown_sums_to_one_hundred() {
        let history = vec![
            sample_of(EmotionLabel::Happy, 0.9),
            sample_of(EmotionLabel::Sad, 0.7),
            sample_of(EmotionLabel::Happy, 0.6),
        ];
        let shares = breakdown(&history);
        assert_eq!(shares.len(), 2);
        assert_eq!((shares[0].emotion, shares[0].percent), (EmotionLabel::Happy, 66));
        assert_eq!((shares[1].emotion, shares[1].percent), (EmotionLabel::Sad, 34));
    }

    #[test]
    fn breakdown_ties_follow_declaration_order() {
        let history = vec![
            sample_of(EmotionLabel::Neutral, 0.8),
            sample_of(EmotionLabel::Angry, 0.8),
            sample_of(EmotionLabel::Happy, 0.8),
            sample_of(EmotionLabel::Neutral, 0.8),
        ];
        let order: Vec<_> = breakdown(&history).iter().map(|s| s.emotion).collect();
        assert_eq!(
            order,
            vec![EmotionLabel::Neutral, EmotionLabel::Happy, EmotionLabel::Angry]
        );
        let total: u32 = breakdown(&history).iter().map(|s| s.percent as u32).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn breakdown_stays_descending_after_residue() {
        let history = vec![
            sample_of(EmotionLabel::Happy, 0.8),
            sample_of(EmotionLabel::Sad, 0.8),
            sample_of(EmotionLabel::Angry, 0.8),
        ];
        let shares: Vec<_> = breakdown(&history)
            .iter()
            .map(|s| (s.emotion, s.percent))
            .collect();
        assert_eq!(
            shares,
            vec![
                (EmotionLabel::Angry, 34),
                (EmotionLabel::Happy, 33),
                (EmotionLabel::Sad, 33),
            ]
        );

        let mut history = Vec::new();
        for (label, n) in [
            (EmotionLabel::Happy, 3),
            (EmotionLabel::Sad, 2),
            (EmotionLabel::Fearful, 1),
            (EmotionLabel::Neutral, 1),
        ] {
            history.extend((0..n).map(|_| sample_of(label, 0.8)));
        }
        let shares = breakdown(&history);
        assert!(shares.windows(2).all(|w| {
            w[0].percent > w[1].percent
                || (w[0].percent == w[1].percent && w[0].emotion < w[1].emotion)
        }));
        let total: u32 = shares.iter().map(|s| s.percent as u32).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn empty_history_has_empty_summary() {
        let summary = summarize(&[]);
        assert!(summary.is_empty());
        assert!(summary.shares.is_empty());
        assert!(summary.top(5).is_empty());
        assert_eq!(summary.percent_of(EmotionLabel::Happy), 0);
    }

    #[test]
    fn recent_window_never_pads() {
        let history: Vec<_> = (0..4).map(|_| sample_of(EmotionLabel::Sad, 0.5)).collect();
        assert_eq!(recent_window(&history, 10).len(), 4);
        assert_eq!(recent_window(&history, 2).len(), 2);
        assert!(recent_window(&history, 0).is_empty());
        assert!(recent_window(&[], 3).is_empty());
    }

    #[test]
    fn trend_series_rounds_selected_labels() {
        let history = vec![
            sample_of(EmotionLabel::Happy, 0.904),
            sample_of(EmotionLabel::Sad, 0.7),
        ];
        let series = trend_series(&history, TREND_WINDOW, &TREND_LABELS);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].time, 0);
        assert_eq!(series[0].values[&EmotionLabel::Happy], 90);
        assert_eq!(series[1].values[&EmotionLabel::Sad], 70);
        assert_eq!(series[1].values.len(), TREND_LABELS.len());
        assert!(!series[1].values.contains_key(&EmotionLabel::Fearful));
    }

    #[test]
    fn context_renders_recent_and_current() {
        let history = vec![
            sample_of(EmotionLabel::Happy, 0.9),
            sample_of(EmotionLabel::Sad, 0.7),
        ];
        let context = EmotionContext::new(&history, history.last(), CONTEXT_WINDOW);
        assert_eq!(
            context.to_string(),
            "Recent detected emotions:\n- happy\n- sad\n\nCurrent emotion:\nsad\n"
        );

        let empty = EmotionContext::new(&[], None, CONTEXT_WINDOW);
        assert!(empty.to_string().ends_with("Current emotion:\nunknown\n"));
    }
}
