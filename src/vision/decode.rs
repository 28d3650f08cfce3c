//! Result decoding
//!
//! Walks the engine's fixed-capacity output buffers and turns the valid
//! entries into screen-space detections. The engine output is trusted but
//! bounded: the count is clamped to the buffer capacity and class indices are
//! clamped into the label table.

use serde::{Deserialize, Serialize};

use crate::vision::engine::OutputBuffers;
use crate::vision::models::LabelTable;
use crate::vision::{BoundingBox, Detection, ViewSize};

/// Number of detections shown at once
pub const DEFAULT_MAX_RESULTS: usize = 4;

/// How entries below the score threshold are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPolicy {
    /// Test every entry on its own; does not rely on score ordering
    #[default]
    SkipBelow,
    /// Stop at the first entry below threshold; relies on descending scores
    StopAtFirstBelow,
}

/// Turns raw output buffers into detections
#[derive(Debug, Clone)]
pub struct DetectionDecoder {
    view: ViewSize,
    max_results: usize,
    policy: FilterPolicy,
}

impl DetectionDecoder {
    /// Decoder mapping boxes into `view`, showing up to `DEFAULT_MAX_RESULTS`
    pub fn new(view: ViewSize) -> Self {
        Self {
            view,
            max_results: DEFAULT_MAX_RESULTS,
            policy: FilterPolicy::default(),
        }
    }

    /// Set the display cap
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Set the threshold policy
    pub fn with_policy(mut self, policy: FilterPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Number of valid entries: truncated, never negative, never past capacity
    pub fn valid_count(outputs: &OutputBuffers) -> usize {
        let raw = outputs.count.first().copied().unwrap_or(0.0);
        // `as` saturates: NaN and negatives become 0
        (raw.trunc() as usize).min(outputs.capacity())
    }

    /// Decode the current buffer contents
    pub fn decode(&self, outputs: &OutputBuffers, labels: &LabelTable, threshold: f32) -> Vec<Detection> {
        let count = Self::valid_count(outputs);
        let mut detections = Vec::with_capacity(count.min(self.max_results));

        for i in 0..count {
            if detections.len() == self.max_results {
                break;
            }

            let score = outputs.scores[[0, i]];
            // NaN never meets the threshold
            if score.is_nan() || score < threshold {
                match self.policy {
                    FilterPolicy::SkipBelow => continue,
                    FilterPolicy::StopAtFirstBelow => break,
                }
            }

            let label = labels.get_clamped(outputs.classes[[0, i]]).to_string();
            let bounding_box = self.map_box([
                outputs.boxes[[0, i, 0]],
                outputs.boxes[[0, i, 1]],
                outputs.boxes[[0, i, 2]],
                outputs.boxes[[0, i, 3]],
            ]);

            detections.push(Detection::new(score, label, bounding_box));
        }

        detections
    }

    /// Map a normalized (top, left, bottom, right) box into view pixels
    pub fn map_box(&self, normalized: [f32; 4]) -> BoundingBox {
        let [top, left, bottom, right] = normalized;
        let (w, h) = (self.view.width, self.view.height);
        BoundingBox {
            left: left * w,
            top: top * h,
            right: right * w,
            bottom: bottom * h,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::engine::OutputRole;

    fn labels() -> LabelTable {
        LabelTable::new(vec!["person".into(), "bicycle".into(), "car".into()]).unwrap()
    }

    /// Buffers with capacity 10, `scores` written in order, classes cycling
    fn outputs(count: f32, scores: &[f32]) -> OutputBuffers {
        let mut out = OutputBuffers::new(10);
        // Stale values from a "previous call" beyond the valid range
        out.fill(OutputRole::Scores, &[0.99; 10]).unwrap();
        for (i, s) in scores.iter().enumerate() {
            out.scores[[0, i]] = *s;
            out.classes[[0, i]] = (i % 3) as f32;
            out.boxes[[0, i, 0]] = 0.1;
            out.boxes[[0, i, 1]] = 0.2;
            out.boxes[[0, i, 2]] = 0.5;
            out.boxes[[0, i, 3]] = 0.6;
        }
        out.count[0] = count;
        out
    }

    fn decoder() -> DetectionDecoder {
        DetectionDecoder::new(ViewSize::new(1080.0, 1920.0))
    }

    #[test]
    fn test_threshold_scenario() {
        let out = outputs(3.0, &[0.9, 0.7, 0.5]);
        let result = decoder().decode(&out, &labels(), 0.6);

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].score, 0.9);
        assert_eq!(result[1].score, 0.7);
        assert_eq!(result[0].label, "person");
        assert_eq!(result[1].label, "bicycle");
    }

    #[test]
    fn test_zero_count_is_empty() {
        let out = outputs(0.0, &[0.9, 0.8]);
        assert!(decoder().decode(&out, &labels(), 0.1).is_empty());
    }

    #[test]
    fn test_truncated_to_four() {
        let out = outputs(6.0, &[0.95, 0.9, 0.85, 0.8, 0.75, 0.7]);
        let result = decoder().decode(&out, &labels(), 0.5);

        assert_eq!(result.len(), 4);
        let scores: Vec<f32> = result.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![0.95, 0.9, 0.85, 0.8]);
    }

    #[test]
    fn test_count_clamped_to_capacity() {
        // Count corrupted past capacity: must not index out of bounds
        let out = outputs(1_000.0, &[]);
        assert_eq!(DetectionDecoder::valid_count(&out), 10);

        let result = decoder().with_max_results(100).decode(&out, &labels(), 0.5);
        assert_eq!(result.len(), 10);
    }

    #[test]
    fn test_count_truncation_and_negative() {
        let out = outputs(2.9, &[0.9, 0.9, 0.9]);
        assert_eq!(DetectionDecoder::valid_count(&out), 2);

        let out = outputs(-3.0, &[0.9]);
        assert_eq!(DetectionDecoder::valid_count(&out), 0);

        let out = outputs(f32::NAN, &[0.9]);
        assert_eq!(DetectionDecoder::valid_count(&out), 0);
    }

    #[test]
    fn test_skip_below_vs_stop_at_first_below() {
        // Sort invariant violated: a high score after a low one
        let out = outputs(3.0, &[0.9, 0.3, 0.8]);

        let skip = decoder().decode(&out, &labels(), 0.6);
        assert_eq!(skip.len(), 2);
        assert_eq!(skip[1].score, 0.8);

        let stop = decoder()
            .with_policy(FilterPolicy::StopAtFirstBelow)
            .decode(&out, &labels(), 0.6);
        assert_eq!(stop.len(), 1);
        assert_eq!(stop[0].score, 0.9);
    }

    #[test]
    fn test_nan_score_excluded() {
        let out = outputs(3.0, &[f32::NAN, 0.9, 0.1]);

        let skip = decoder().decode(&out, &labels(), 0.6);
        assert_eq!(skip.len(), 1);
        assert_eq!(skip[0].score, 0.9);

        // A NaN entry counts as below threshold and ends the scan
        let stop = decoder()
            .with_policy(FilterPolicy::StopAtFirstBelow)
            .decode(&out, &labels(), 0.6);
        assert!(stop.is_empty());

        // Even a zero threshold does not admit NaN
        let all = decoder().decode(&out, &labels(), 0.0);
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|d| !d.score.is_nan()));
    }

    #[test]
    fn test_output_length_property() {
        let scores = [0.2, 0.9, 0.65, 0.1, 0.7, 0.8, 0.95, 0.3, 0.61, 0.59];
        for count in 0..=10 {
            for threshold in [0.0, 0.5, 0.6, 0.9, 1.0] {
                let out = outputs(count as f32, &scores);
                let passing = scores[..count].iter().filter(|s| **s >= threshold).count();
                let result = decoder().decode(&out, &labels(), threshold);
                assert_eq!(result.len(), passing.min(4));
            }
        }
    }

    #[test]
    fn test_box_mapping() {
        let d = decoder();

        let unit = d.map_box([0.0, 0.0, 1.0, 1.0]);
        assert_eq!(unit, BoundingBox { left: 0.0, top: 0.0, right: 1080.0, bottom: 1920.0 });

        // [top, left, bottom, right] -> (left*W, top*H, right*W, bottom*H)
        let b = d.map_box([0.25, 0.5, 0.75, 1.0]);
        assert_eq!(b.left, 540.0);
        assert_eq!(b.top, 480.0);
        assert_eq!(b.right, 1080.0);
        assert_eq!(b.bottom, 1440.0);
    }

    #[test]
    fn test_class_index_clamped() {
        let mut out = outputs(3.0, &[0.9, 0.9, 0.9]);
        out.classes[[0, 0]] = 57.0;
        out.classes[[0, 1]] = -4.0;
        out.classes[[0, 2]] = 1.7;

        let result = decoder().decode(&out, &labels(), 0.5);
        assert_eq!(result[0].label, "car");
        assert_eq!(result[1].label, "person");
        assert_eq!(result[2].label, "bicycle");
    }

    #[test]
    fn test_threshold_change_only_filters() {
        let out = outputs(3.0, &[0.9, 0.7, 0.5]);
        let strict = decoder().decode(&out, &labels(), 0.8);
        let loose = decoder().decode(&out, &labels(), 0.4);

        assert_eq!(strict.len(), 1);
        assert_eq!(loose.len(), 3);
        // The shared entry is identical either way
        assert_eq!(strict[0], loose[0]);
    }
}
