//! Threshold filtering and per-class counting.
//!
//! `filter_and_tally` turns a frame's raw detections into the kept detections plus
//! a `FrameStats` value. `RunSummary::fold` accumulates frame stats across a finite
//! source. Both are pure: same inputs, same outputs, nothing mutated in place.

use crate::detect::{BoundingBox, Detection, LabelTable, DEFAULT_CLASS_NAMES};

/// Categories reported in per-class breakdowns, in display order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedLabels {
    names: Vec<String>,
}

impl TrackedLabels {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for name in names.into_iter().map(Into::into) {
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        Self { names: unique }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.names.iter().any(|name| name == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn zeroed(&self) -> Vec<(String, u32)> {
        self.names.iter().map(|name| (name.clone(), 0)).collect()
    }
}

impl Default for TrackedLabels {
    fn default() -> Self {
        Self::new(DEFAULT_CLASS_NAMES.iter().copied())
    }
}

/// A detection that passed the threshold, with its resolved label.
#[derive(Clone, Debug, PartialEq)]
pub struct KeptDetection {
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl KeptDetection {
    /// Caption drawn next to the box, e.g. `cap: 87%`.
    pub fn caption(&self) -> String {
        format!("{}: {}%", self.label, (self.confidence * 100.0) as u32)
    }
}

/// Per-frame counts. Every tracked label is present, zero included, in
/// tracked order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    total_objects: u32,
    per_class: Vec<(String, u32)>,
}

impl FrameStats {
    pub fn total_objects(&self) -> u32 {
        self.total_objects
    }

    pub fn count(&self, label: &str) -> u32 {
        count_of(&self.per_class, label)
    }

    pub fn per_class(&self) -> &[(String, u32)] {
        &self.per_class
    }

    /// Tracked labels with at least one object this frame.
    pub fn nonzero(&self) -> impl Iterator<Item = (&str, u32)> {
        self.per_class
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(label, count)| (label.as_str(), *count))
    }
}

/// Kept detections and counts for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tally {
    pub kept: Vec<KeptDetection>,
    pub stats: FrameStats,
}

/// Keep detections with `confidence > threshold` and count them.
///
/// Labels outside `tracked` still count toward `total_objects` but have no
/// per-class entry.
pub fn filter_and_tally(
    detections: &[Detection],
    threshold: f32,
    labels: &LabelTable,
    tracked: &TrackedLabels,
) -> Tally {
    let mut per_class = tracked.zeroed();
    let mut kept = Vec::new();

    for det in detections.iter().filter(|det| det.confidence > threshold) {
        let label = labels.name(det.class_id).into_owned();
        if let Some((_, count)) = per_class.iter_mut().find(|(name, _)| *name == label) {
            *count += 1;
        }
        kept.push(KeptDetection {
            class_id: det.class_id,
            label,
            confidence: det.confidence,
            bbox: det.bbox,
        });
    }

    Tally {
        stats: FrameStats {
            total_objects: kept.len() as u32,
            per_class,
        },
        kept,
    }
}

/// Cumulative per-class counts across every frame of a finite source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    per_class: Vec<(String, u32)>,
}

impl RunSummary {
    pub fn new(tracked: &TrackedLabels) -> Self {
        Self {
            per_class: tracked.zeroed(),
        }
    }

    /// Add one frame's counts, component-wise.
    #[must_use]
    pub fn fold(self, frame: &FrameStats) -> Self {
        let mut per_class = self.per_class;
        for (label, count) in &frame.per_class {
            match per_class.iter_mut().find(|(name, _)| name == label) {
                Some((_, total)) => *total += count,
                None => per_class.push((label.clone(), *count)),
            }
        }
        Self { per_class }
    }

    pub fn count(&self, label: &str) -> u32 {
        count_of(&self.per_class, label)
    }

    pub fn per_class(&self) -> &[(String, u32)] {
        &self.per_class
    }

    pub fn total(&self) -> u32 {
        self.per_class.iter().map(|(_, count)| count).sum()
    }
}

fn count_of(per_class: &[(String, u32)], label: &str) -> u32 {
    per_class
        .iter()
        .find(|(name, _)| name == label)
        .map_or(0, |(_, count)| *count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: usize, confidence: f32) -> Detection {
        Detection::new(class_id, confidence, BoundingBox::new(0, 0, 10, 10))
    }

    fn tally(detections: &[Detection], threshold: f32) -> Tally {
        filter_and_tally(
            detections,
            threshold,
            &LabelTable::default(),
            &TrackedLabels::default(),
        )
    }

    #[test]
    fn threshold_is_strict() {
        let out = tally(&[det(0, 0.5), det(1, 0.50001), det(2, 0.2)], 0.5);
        assert_eq!(out.kept.len(), 1);
        assert_eq!(out.kept[0].label, "bottle-glass");
        assert_eq!(out.stats.total_objects(), 1);
        assert_eq!(out.stats.count("bottle-can"), 0);
        assert_eq!(out.stats.count("bottle-plastic"), 0);
    }

    #[test]
    fn per_class_counts_match_kept_labels() {
        let out = tally(&[det(2, 0.9), det(2, 0.8), det(3, 0.7), det(0, 0.1)], 0.5);
        assert_eq!(out.stats.count("bottle-plastic"), 2);
        assert_eq!(out.stats.count("cap"), 1);
        assert_eq!(out.stats.count("bottle-can"), 0);
        assert_eq!(out.stats.total_objects(), 3);
        let nonzero: Vec<_> = out.stats.nonzero().collect();
        assert_eq!(nonzero, vec![("bottle-plastic", 2), ("cap", 1)]);
    }

    #[test]
    fn untracked_labels_count_toward_total_only() {
        let labels = LabelTable::new(["bottle-plastic", "person"]);
        let tracked = TrackedLabels::new(["bottle-plastic"]);
        let out = filter_and_tally(&[det(1, 0.9), det(0, 0.9), det(7, 0.9)], 0.5, &labels, &tracked);
        assert_eq!(out.stats.total_objects(), 3);
        assert_eq!(out.stats.per_class().len(), 1);
        assert_eq!(out.stats.count("bottle-plastic"), 1);
        assert_eq!(out.kept[2].label, "class_7");
    }

    #[test]
    fn every_tracked_label_is_present() {
        let out = tally(&[], 0.5);
        assert_eq!(out.stats.per_class().len(), 4);
        assert!(out.stats.per_class().iter().all(|(_, count)| *count == 0));
    }

    #[test]
    fn counts_follow_tracked_order() {
        let labels = LabelTable::default();
        let tracked = TrackedLabels::new(["cap", "bottle-plastic", "bottle-can"]);
        let out = filter_and_tally(&[det(2, 0.9), det(3, 0.9), det(0, 0.9)], 0.5, &labels, &tracked);
        let order: Vec<&str> = out.stats.per_class().iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(order, vec!["cap", "bottle-plastic", "bottle-can"]);
        let nonzero: Vec<_> = out.stats.nonzero().collect();
        assert_eq!(nonzero, vec![("cap", 1), ("bottle-plastic", 1), ("bottle-can", 1)]);

        let summary = RunSummary::new(&tracked).fold(&out.stats);
        let order: Vec<&str> = summary.per_class().iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(order, vec!["cap", "bottle-plastic", "bottle-can"]);
    }

    #[test]
    fn summary_is_componentwise_sum_of_frames() {
        let tracked = TrackedLabels::default();
        let frames = [
            tally(&[det(2, 0.9), det(3, 0.9)], 0.5),
            tally(&[det(2, 0.9)], 0.5),
            tally(&[det(0, 0.4)], 0.5),
        ];
        let summary = frames
            .iter()
            .fold(RunSummary::new(&tracked), |acc, t| acc.fold(&t.stats));
        for label in tracked.iter() {
            let expected: u32 = frames.iter().map(|t| t.stats.count(label)).sum();
            assert_eq!(summary.count(label), expected, "label {label}");
        }
        assert_eq!(summary.count("bottle-plastic"), 2);
        assert_eq!(summary.total(), 3);
    }

    #[test]
    fn caption_truncates_percent() {
        let out = tally(&[det(3, 0.879)], 0.5);
        assert_eq!(out.kept[0].caption(), "cap: 87%");
    }

    #[test]
    fn tracked_labels_are_deduplicated() {
        let tracked = TrackedLabels::new(["cap", "cap", "bottle-can"]);
        assert_eq!(tracked.len(), 2);
        assert!(tracked.contains("bottle-can"));
    }
}
