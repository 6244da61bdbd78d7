// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end playback scenarios against scripted audio.

use courseplay_sequencer::{
    AudioChannel, AudioError, AudioHost, AudioRef, CoursewareDocument, PlaybackState,
    PlaybackWarning, SceneMutation, SessionConfig, SessionEvent, TimelineSession,
};
use serde_json::json;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

#[derive(Debug, Default)]
struct ChannelState {
    position: f64,
    ended: bool,
    playing: bool,
    silent: bool,
    seeks: Vec<f64>,
}

#[derive(Default)]
struct Script {
    channels: HashMap<String, ChannelState>,
    missing: HashSet<String>,
    max_rate: Option<f64>,
}

#[derive(Clone, Default)]
struct ScriptedAudio(Rc<RefCell<Script>>);

impl ScriptedAudio {
    fn advance(&self, url: &str, seconds: f64) {
        if let Some(channel) = self.0.borrow_mut().channels.get_mut(url) {
            channel.position += seconds;
        }
    }

    fn finish(&self, url: &str) {
        if let Some(channel) = self.0.borrow_mut().channels.get_mut(url) {
            channel.ended = true;
        }
    }

    fn is_open(&self, url: &str) -> bool {
        self.0.borrow().channels.contains_key(url)
    }

    fn is_playing(&self, url: &str) -> bool {
        self.0.borrow().channels.get(url).is_some_and(|c| c.playing)
    }

    fn seeks(&self, url: &str) -> Vec<f64> {
        self.0
            .borrow()
            .channels
            .get(url)
            .map(|c| c.seeks.clone())
            .unwrap_or_default()
    }
}

struct ScriptedChannel {
    url: String,
    script: Rc<RefCell<Script>>,
}

impl ScriptedChannel {
    fn with<R>(&self, f: impl FnOnce(&mut ChannelState) -> R) -> R {
        let mut script = self.script.borrow_mut();
        f(script.channels.entry(self.url.clone()).or_default())
    }
}

impl AudioChannel for ScriptedChannel {
    fn current_time(&self) -> Option<f64> {
        self.with(|c| (!c.silent).then_some(c.position))
    }

    fn duration(&self) -> Option<f64> {
        None
    }

    fn is_ended(&self) -> bool {
        self.with(|c| c.ended)
    }

    fn play(&mut self) {
        self.with(|c| c.playing = true);
    }

    fn pause(&mut self) {
        self.with(|c| c.playing = false);
    }

    fn seek(&mut self, time: f64) {
        self.with(|c| {
            c.position = time;
            c.seeks.push(time);
        });
    }

    fn set_rate(&mut self, rate: f64) -> f64 {
        let max = self.script.borrow().max_rate;
        max.map_or(rate, |max| rate.min(max))
    }
}

impl AudioHost for ScriptedAudio {
    fn open(&mut self, audio: &AudioRef) -> Result<Box<dyn AudioChannel>, AudioError> {
        let mut script = self.0.borrow_mut();
        if script.missing.contains(&audio.url) {
            return Err(AudioError::Unavailable(audio.url.clone()));
        }
        script.channels.entry(audio.url.clone()).or_default();
        Ok(Box::new(ScriptedChannel {
            url: audio.url.clone(),
            script: Rc::clone(&self.0),
        }))
    }
}

fn narrated_sequence() -> CoursewareDocument {
    serde_json::from_value(json!({
        "title": "Narrated",
        "outline": [{
            "id": "lesson", "mode": "sequence", "items": [
                { "id": "first", "type": "talk",
                  "audio": { "url": "first.mp3", "duration": 4.0 },
                  "subtitles": [
                      { "text": "Welcome", "offset": 0.0 },
                      { "text": "This is the engine", "offset": 1.25 },
                      { "text": "Watch the valve", "offset": 3.0 }
                  ] },
                { "id": "second", "type": "talk",
                  "audio": { "url": "second.mp3", "duration": 2.0 } }
            ]
        }]
    }))
    .unwrap()
}

fn choreography() -> CoursewareDocument {
    serde_json::from_value(json!({
        "title": "Choreography",
        "camera": { "position": [0, 0, 10], "target": [0, 0, 0], "fov": 45 },
        "nodes": [
            { "nodeKey": "engine", "center": [0, 0, 0], "radius": 2.0 },
            { "nodeKey": "valve", "center": [1, 1, 0], "radius": 0.2 }
        ],
        "annotations": [{ "id": "valve-note", "title": "Valve", "nodeKey": "valve", "position": [1, 1.5, 0] }],
        "animations": [{
            "id": "explode",
            "timeline": {
                "duration": 4.0,
                "visTracks": [{ "nodeKey": "cover", "keys": [{ "time": 1.0, "visible": false }] }],
                "trsTracks": [{ "nodeKey": "piston", "keys": [
                    { "time": 0.0, "position": [0, 0, 0] },
                    { "time": 4.0, "position": [0, 2, 0] }
                ] }],
                "steps": [{ "id": "apart", "time": 2.0, "name": "Pulled apart" }]
            }
        }],
        "outline": [
            { "id": "look", "items": [{
                "id": "frame", "type": "scene.action", "actions": [
                    { "type": "camera.focus", "target": "engine", "startTime": 0, "endTime": 2 },
                    { "type": "visibility.set", "startTime": 0, "endTime": 2,
                      "items": [{ "nodeKey": "a", "visible": true }] },
                    { "type": "visibility.set", "startTime": 1, "endTime": 3,
                      "items": [{ "nodeKey": "a", "visible": false }] },
                    { "type": "pointer.point", "nodeKey": "valve", "startTime": 1.0 },
                    { "type": "highlight.show", "nodeKeys": ["valve"], "startTime": 2.5 },
                    { "type": "annotation.show", "ids": ["valve-note"], "startTime": 2.5 }
                ]
            }] },
            { "id": "apart", "items": [{
                "id": "run", "type": "scene.action", "actions": [
                    { "type": "highlight.hide", "nodeKeys": ["valve"] },
                    { "type": "animation.play", "animationId": "explode", "startTime": 0.5 }
                ]
            }] }
        ]
    }))
    .unwrap()
}

fn session_with(document: CoursewareDocument, audio: &ScriptedAudio) -> TimelineSession {
    let mut session = TimelineSession::new(SessionConfig::default()).with_audio_host(audio.clone());
    session.load_outline(document).unwrap();
    session
}

fn pointer_count(batch: &courseplay_sequencer::SceneMutationBatch) -> usize {
    batch
        .iter()
        .filter(|m| matches!(m, SceneMutation::Pointer { .. }))
        .count()
}

fn started(events: &[SessionEvent], id: &str) -> bool {
    events
        .iter()
        .any(|e| matches!(e, SessionEvent::ItemStarted { id: started, .. } if started == id))
}

#[test]
fn test_second_item_waits_for_first_narration() {
    let audio = ScriptedAudio::default();
    let mut session = session_with(narrated_sequence(), &audio);
    session.play().unwrap();
    session.tick(0.1);
    assert!(audio.is_open("first.mp3"));
    assert!(audio.is_playing("first.mp3"));
    session.pause();
    assert!(!audio.is_playing("first.mp3"));
    session.play().unwrap();

    // Audio runs at half the wall clock: the session follows the audio.
    for _ in 0..60 {
        audio.advance("first.mp3", 0.05);
        session.tick(0.1);
        assert!(session.time() < 4.0);
    }
    let events = session.take_events();
    assert!(started(&events, "first"));
    assert!(!started(&events, "second"));
    assert!(!audio.is_open("second.mp3"));

    audio.finish("first.mp3");
    session.tick(0.1);
    assert_eq!(session.time(), 4.0);
    assert!(started(&session.take_events(), "second"));
    assert!(audio.is_open("second.mp3"));
}

#[test]
fn test_missing_audio_falls_back_to_wall_clock() {
    let audio = ScriptedAudio::default();
    audio.0.borrow_mut().missing.insert("first.mp3".into());
    let mut session = session_with(narrated_sequence(), &audio);
    session.play().unwrap();
    for _ in 0..10 {
        session.tick(0.25);
    }
    assert!((session.time() - 2.5).abs() < 1e-9);

    let drift: Vec<_> = session
        .take_events()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::Warning(PlaybackWarning::SyncDrift { .. })))
        .collect();
    assert_eq!(drift.len(), 1);
}

#[test]
fn test_narration_leads_from_the_first_tick() {
    let audio = ScriptedAudio::default();
    let mut session = session_with(narrated_sequence(), &audio);
    session.seek(1.0).unwrap();
    session.play().unwrap();

    // The audio has not moved yet, so neither does the session.
    session.tick(0.25);
    assert_eq!(audio.seeks("first.mp3"), vec![1.0]);
    assert!(audio.is_playing("first.mp3"));
    assert_eq!(session.time(), 1.0);

    audio.advance("first.mp3", 0.1);
    session.tick(0.25);
    assert!((session.time() - 1.1).abs() < 1e-9);
}

#[test]
fn test_silent_channel_reports_drift_once() {
    let audio = ScriptedAudio::default();
    let mut session = session_with(narrated_sequence(), &audio);
    session.play().unwrap();
    session.tick(0.1);
    audio.0.borrow_mut().channels.get_mut("first.mp3").unwrap().silent = true;
    for _ in 0..5 {
        session.tick(0.1);
    }
    // The first tick follows the channel at 0; the silent ticks run on the wall clock.
    assert!((session.time() - 0.5).abs() < 1e-9);
    let drift = session
        .take_events()
        .iter()
        .filter(|e| matches!(e, SessionEvent::Warning(PlaybackWarning::SyncDrift { .. })))
        .count();
    assert_eq!(drift, 1);
}

#[test]
fn test_subtitle_index_switches_at_offsets() {
    let audio = ScriptedAudio::default();
    let mut session = session_with(narrated_sequence(), &audio);
    let offsets = [0.0, 1.25, 3.0];
    for (k, offset) in offsets.iter().enumerate() {
        let expected = session.document().unwrap().outline[0].items[0].subtitles[k].text.clone();
        session.seek(*offset).unwrap();
        assert_eq!(session.active_subtitle().map(|s| s.text.clone()), Some(expected.clone()));

        if let Some(next) = offsets.get(k + 1) {
            session.seek(next - 1e-6).unwrap();
            assert_eq!(session.active_subtitle().map(|s| s.text.clone()), Some(expected));
        }
    }
}

#[test]
fn test_parallel_segment_runs_on_clock_and_reseeks_drifting_audio() {
    let document: CoursewareDocument = serde_json::from_value(json!({
        "outline": [{
            "id": "duet", "mode": "parallel", "items": [
                { "id": "short", "type": "talk", "audio": { "url": "short.mp3", "duration": 2.0 } },
                { "id": "long", "type": "talk", "audio": { "url": "long.mp3", "duration": 5.0 } }
            ]
        }]
    }))
    .unwrap();
    let audio = ScriptedAudio::default();
    let mut session = session_with(document, &audio);
    assert_eq!(session.duration(), 5.0);

    session.play().unwrap();
    session.tick(0.0);
    let events = session.take_events();
    assert!(started(&events, "short") && started(&events, "long"));

    // Neither channel advances on its own; the clock keeps going and re-seeks them.
    for _ in 0..10 {
        session.tick(0.1);
    }
    assert!((session.time() - 1.0).abs() < 1e-9);
    assert!(audio.seeks("long.mp3").iter().any(|t| *t > 0.25));

    for _ in 0..50 {
        session.tick(0.1);
    }
    assert_eq!(session.state(), PlaybackState::Ended);
    assert_eq!(session.time(), 5.0);
}

#[test]
fn test_clamped_audio_rate_is_reported() {
    let audio = ScriptedAudio::default();
    audio.0.borrow_mut().max_rate = Some(1.5);
    let mut session = session_with(narrated_sequence(), &audio);
    session.play().unwrap();
    session.tick(0.1);
    session.take_events();

    session.set_rate(2.0);
    assert_eq!(session.rate(), 2.0);
    assert!(session.take_events().iter().any(|e| matches!(
        e,
        SessionEvent::Warning(PlaybackWarning::RateDegraded { applied, .. }) if *applied == 1.5
    )));
}

#[test]
fn test_overlapping_actions_warn_at_load_and_last_declared_wins() {
    let mut session = TimelineSession::default();
    session.load_outline(choreography()).unwrap();
    let conflicts: Vec<_> = session
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::Warning(PlaybackWarning::ActionResolutionConflict { target, .. }) => Some(target),
            _ => None,
        })
        .collect();
    assert_eq!(conflicts, vec!["node:a".to_string()]);

    session.seek(1.5).unwrap();
    session.tick(0.0);
    assert_eq!(session.scene_state().is_visible("a"), Some(false));
    session.seek(0.5).unwrap();
    session.tick(0.0);
    assert_eq!(session.scene_state().is_visible("a"), Some(true));
}

#[test]
fn test_backward_seek_matches_cold_seek() {
    let mut wandering = TimelineSession::default();
    wandering.load_outline(choreography()).unwrap();
    for time in [0.0, 2.7, 6.0, 8.0, 1.2, 5.1] {
        wandering.seek(time).unwrap();
        wandering.tick(0.0);
    }

    let mut cold = TimelineSession::default();
    cold.load_outline(choreography()).unwrap();
    cold.seek(5.1).unwrap();
    cold.tick(0.0);

    assert_eq!(wandering.scene_state(), cold.scene_state());
    assert_eq!(wandering.current_segment(), cold.current_segment());
}

#[test]
fn test_pause_and_resume_equals_uninterrupted_playback() {
    let mut steady = TimelineSession::default();
    steady.load_outline(choreography()).unwrap();
    steady.play().unwrap();
    for _ in 0..60 {
        steady.tick(0.1);
    }

    let mut halting = TimelineSession::default();
    halting.load_outline(choreography()).unwrap();
    halting.play().unwrap();
    for _ in 0..30 {
        halting.tick(0.1);
    }
    halting.pause();
    for _ in 0..3 {
        halting.tick(5.0);
    }
    halting.play().unwrap();
    for _ in 0..30 {
        halting.tick(0.1);
    }

    assert_eq!(halting.time(), steady.time());
    assert_eq!(halting.scene_state(), steady.scene_state());
}

#[test]
fn test_pointer_fires_once_and_not_after_seeking_past_it() {
    let mut session = TimelineSession::default();
    session.load_outline(choreography()).unwrap();

    session.seek(2.0).unwrap();
    session.play().unwrap();
    let mut pointers = 0;
    for _ in 0..5 {
        pointers += pointer_count(&session.tick(0.1));
    }
    assert_eq!(pointers, 0);

    session.seek(0.5).unwrap();
    let mut pointers = 0;
    for _ in 0..20 {
        pointers += pointer_count(&session.tick(0.1));
    }
    assert_eq!(pointers, 1);
}

#[test]
fn test_focus_eases_camera_onto_node() {
    let mut session = TimelineSession::default();
    session.load_outline(choreography()).unwrap();

    session.tick(0.0);
    let start = session.scene_state().camera.unwrap();
    assert_eq!(start.position, [0.0, 0.0, 10.0]);

    session.seek(2.0).unwrap();
    session.tick(0.0);
    let framed = session.scene_state().camera.unwrap();
    assert_eq!(framed.target, [0.0, 0.0, 0.0]);
    assert!((framed.position[2] - 5.0).abs() < 1e-5);
    assert_eq!(framed.fov, Some(45.0));
}

#[test]
fn test_highlight_and_annotation_state_follow_time() {
    let mut session = TimelineSession::default();
    session.load_outline(choreography()).unwrap();

    session.seek(2.6).unwrap();
    session.tick(0.0);
    assert!(session.scene_state().is_highlighted("valve"));
    assert_eq!(session.scene_state().is_annotation_visible("valve-note"), Some(true));

    // The second segment starts at 3.0 and hides the highlight again.
    session.seek(3.0).unwrap();
    let batch = session.tick(0.0);
    assert!(!session.scene_state().is_highlighted("valve"));
    assert!(batch.iter().any(|m| matches!(m, SceneMutation::Highlight { active: false, .. })));
}

#[test]
fn test_animation_runs_inside_its_item_and_steps_are_seekable() {
    let mut session = TimelineSession::default();
    session.load_outline(choreography()).unwrap();
    // look: 3.0 s (latest action end), run: 0.5 + 4.0 s
    assert_eq!(session.duration(), 7.5);

    session.seek_to_step("apart").unwrap();
    assert_eq!(session.time(), 5.5);
    session.tick(0.0);
    let state = session.scene_state();
    assert_eq!(state.is_visible("cover"), Some(false));
    assert!((state.transforms["piston"].position[1] - 1.0).abs() < 1e-5);
    assert!(session
        .take_events()
        .iter()
        .any(|e| matches!(e, SessionEvent::Step { step, .. } if step.id == "apart")));

    session.seek(3.2).unwrap();
    session.tick(0.0);
    assert_eq!(session.scene_state().is_visible("cover"), Some(true));
    assert!(session.scene_state().transforms.is_empty());
    assert_eq!(session.current_segment(), Some(1));
}
