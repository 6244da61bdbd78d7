// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session timeline layout.
//!
//! Places every segment and item of an outline on one session clock.
//! Sequence segments run their items back to back and last for the sum of
//! their item durations; parallel segments start every item together and
//! last for the longest one. Segments themselves always run in order.

use crate::keyframe::Step;
use crate::narration::NarrationSync;
use crate::outline::{ActionKind, Segment, SegmentMode};
use crate::resolver::{play_span, ItemKey};
use std::ops::Range;

/// An item placed on the session clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledItem {
    /// Position in the outline
    pub key: ItemKey,
    /// Session time the item starts at
    pub start: f64,
    /// Item length in seconds
    pub duration: f64,
}

impl ScheduledItem {
    /// Session time the item ends at
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Whether the item is running at `time` (start inclusive, end exclusive)
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end()
    }

    /// Item-local time for a session time
    pub fn local(&self, time: f64) -> f64 {
        time - self.start
    }
}

/// A segment placed on the session clock
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledSegment {
    /// Segment index
    pub index: usize,
    /// Segment id
    pub id: String,
    /// Scheduling mode
    pub mode: SegmentMode,
    /// Session time the segment starts at
    pub start: f64,
    /// Segment length in seconds
    pub duration: f64,
    /// Indices of the segment's items in [`Schedule::items`]
    pub items: Range<usize>,
}

impl ScheduledSegment {
    /// Session time the segment ends at
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// A step of a played animation, placed on the session clock
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledStep {
    /// The step
    pub step: Step,
    /// Animation that owns the step
    pub animation: String,
    /// Item whose `animation.play` reaches the step
    pub item: ItemKey,
    /// Session time the step is reached
    pub time: f64,
}

/// Flattened outline timing
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    segments: Vec<ScheduledSegment>,
    items: Vec<ScheduledItem>,
    steps: Vec<ScheduledStep>,
    duration: f64,
}

impl Schedule {
    /// Lay out an outline.
    ///
    /// `animation` looks up a loaded animation's length and steps by id.
    pub fn build<'a>(
        outline: &[Segment],
        narration: &NarrationSync,
        animation: impl Fn(&str) -> Option<(f64, &'a [Step])>,
    ) -> Self {
        let duration_of = |id: &str| animation(id).map(|(duration, _)| duration);
        let mut segments = Vec::with_capacity(outline.len());
        let mut items = Vec::new();
        let mut steps = Vec::new();
        let mut cursor = 0.0;

        for (segment_index, segment) in outline.iter().enumerate() {
            let first = items.len();
            let mut length: f64 = 0.0;
            for (item_index, item) in segment.items.iter().enumerate() {
                let duration = narration.item_duration(item, &duration_of).max(0.0);
                let start = match segment.mode {
                    SegmentMode::Sequence => cursor + length,
                    SegmentMode::Parallel => cursor,
                };
                let key = ItemKey::new(segment_index, item_index);
                items.push(ScheduledItem { key, start, duration });
                length = match segment.mode {
                    SegmentMode::Sequence => length + duration,
                    SegmentMode::Parallel => length.max(duration),
                };

                for action in &item.actions {
                    let ActionKind::AnimationPlay { animation_id } = &action.kind else {
                        continue;
                    };
                    let Some((animation_duration, animation_steps)) = animation(animation_id) else {
                        continue;
                    };
                    let window = action.resolved_window();
                    let span = play_span(&window, animation_duration);
                    for step in animation_steps.iter().filter(|s| s.time <= span) {
                        steps.push(ScheduledStep {
                            step: step.clone(),
                            animation: animation_id.clone(),
                            item: key,
                            time: start + window.start + step.time,
                        });
                    }
                }
            }

            segments.push(ScheduledSegment {
                index: segment_index,
                id: segment.id.clone(),
                mode: segment.mode,
                start: cursor,
                duration: length,
                items: first..items.len(),
            });
            cursor += length;
        }

        Self {
            segments,
            items,
            steps,
            duration: cursor,
        }
    }

    /// Total session length in seconds
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Segments in outline order
    pub fn segments(&self) -> &[ScheduledSegment] {
        &self.segments
    }

    /// Segment by index
    pub fn segment(&self, index: usize) -> Option<&ScheduledSegment> {
        self.segments.get(index)
    }

    /// Items in outline order, which is also start order
    pub fn items(&self) -> &[ScheduledItem] {
        &self.items
    }

    /// Items of one segment
    pub fn segment_items(&self, index: usize) -> &[ScheduledItem] {
        self.segments
            .get(index)
            .map_or(&[][..], |segment| &self.items[segment.items.clone()])
    }

    /// Steps reached by `animation.play` actions, in outline order
    pub fn steps(&self) -> &[ScheduledStep] {
        &self.steps
    }

    /// First scheduled occurrence of a step
    pub fn step(&self, id: &str) -> Option<&ScheduledStep> {
        self.steps.iter().find(|s| s.step.id == id)
    }

    /// Index of the segment in effect at `time`.
    ///
    /// The end of the session belongs to the last segment.
    pub fn segment_at(&self, time: f64) -> Option<usize> {
        let count = self.segments.partition_point(|s| s.start <= time);
        count.checked_sub(1)
    }

    /// Items whose start is at or before `time`, in fold order
    pub fn started_items(&self, time: f64) -> &[ScheduledItem] {
        let count = self.items.partition_point(|i| i.start <= time);
        &self.items[..count]
    }

    /// Items of the current segment that are running at `time`
    pub fn active_items(&self, time: f64) -> impl Iterator<Item = &ScheduledItem> + '_ {
        let items = self.segment_at(time).map_or(&[][..], |index| self.segment_items(index));
        items.iter().filter(move |item| item.contains(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outline() -> Vec<Segment> {
        serde_json::from_value(json!([
            {
                "id": "intro", "mode": "sequence", "items": [
                    { "id": "a", "type": "talk", "audio": { "url": "a.mp3", "duration": 4.0 } },
                    { "id": "b", "type": "scene.action",
                      "actions": [{ "type": "animation.play", "animationId": "spin", "startTime": 1.0 }] }
                ]
            },
            {
                "id": "body", "mode": "parallel", "items": [
                    { "id": "c", "type": "talk", "audio": { "url": "c.mp3", "duration": 2.0 } },
                    { "id": "d", "type": "talk", "audio": { "url": "d.mp3", "duration": 5.0 } }
                ]
            },
            { "id": "outro", "items": [{ "id": "e", "type": "talk" }] }
        ]))
        .unwrap()
    }

    fn steps() -> Vec<Step> {
        vec![Step::new("s1", 0.5, "Loosen"), Step::new("s2", 2.0, "Lift")]
    }

    fn schedule(steps: &[Step]) -> Schedule {
        Schedule::build(&outline(), &NarrationSync::default(), |id| {
            (id == "spin").then_some((2.0, steps))
        })
    }

    #[test]
    fn test_lays_out_sequence_and_parallel_segments() {
        let steps = steps();
        let schedule = schedule(&steps);

        let segments = schedule.segments();
        assert_eq!(segments.len(), 3);
        assert_eq!((segments[0].start, segments[0].duration), (0.0, 7.0));
        assert_eq!((segments[1].start, segments[1].duration), (7.0, 5.0));
        assert_eq!((segments[2].start, segments[2].duration), (12.0, 3.0));
        assert_eq!(schedule.duration(), 15.0);

        let b = &schedule.segment_items(0)[1];
        assert_eq!((b.start, b.end()), (4.0, 7.0));
        let items = schedule.segment_items(1);
        assert!(items.iter().all(|i| i.start == 7.0));
    }

    #[test]
    fn test_locates_segments_and_running_items() {
        let steps = steps();
        let schedule = schedule(&steps);
        assert_eq!(schedule.segment_at(0.0), Some(0));
        assert_eq!(schedule.segment_at(6.99), Some(0));
        assert_eq!(schedule.segment_at(7.0), Some(1));
        assert_eq!(schedule.segment_at(15.0), Some(2));

        let running: Vec<_> = schedule.active_items(8.0).map(|i| i.key).collect();
        assert_eq!(running, vec![ItemKey::new(1, 0), ItemKey::new(1, 1)]);
        let running: Vec<_> = schedule.active_items(10.0).map(|i| i.key).collect();
        assert_eq!(running, vec![ItemKey::new(1, 1)]);
        assert_eq!(schedule.active_items(15.0).count(), 0);

        assert_eq!(schedule.started_items(4.0).len(), 2);
        assert_eq!(schedule.started_items(7.0).len(), 4);
    }

    #[test]
    fn test_places_steps_of_played_animations() {
        let steps = steps();
        let schedule = schedule(&steps);
        let placed: Vec<_> = schedule.steps().iter().map(|s| (s.step.id.as_str(), s.time)).collect();
        assert_eq!(placed, vec![("s1", 5.5), ("s2", 7.0)]);
        assert_eq!(schedule.step("s2").unwrap().item, ItemKey::new(0, 1));
        assert!(schedule.step("missing").is_none());
    }

    #[test]
    fn test_empty_outline_has_zero_length() {
        let schedule = Schedule::build(&[], &NarrationSync::default(), |_| None);
        assert_eq!(schedule.duration(), 0.0);
        assert_eq!(schedule.segment_at(0.0), None);
    }
}
