//! Debounced two/three-finger gesture recognition from fingertip landmarks.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::GestureThresholds;
use crate::ema::Ema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureType {
    #[default]
    None,
    Two,
    Three,
}

impl GestureType {
    pub fn fingers(&self) -> &'static [Finger] {
        match self {
            GestureType::None => &[],
            GestureType::Two => &[Finger::Index, Finger::Middle],
            GestureType::Three => &[Finger::Index, Finger::Middle, Finger::Ring],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GestureType::None => "none",
            GestureType::Two => "two",
            GestureType::Three => "three",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Begin(GestureType),
    End,
    NoChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finger {
    Index,
    Middle,
    Ring,
}

/// A fingertip landmark. Coordinates are normalized to the search window, y up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

/// One frame of fingertip detections for a single hand; missing slots were not detected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingertipDetections {
    pub index: Option<Landmark>,
    pub middle: Option<Landmark>,
    pub ring: Option<Landmark>,
}

impl FingertipDetections {
    pub fn get(&self, finger: Finger) -> Option<&Landmark> {
        match finger {
            Finger::Index => self.index.as_ref(),
            Finger::Middle => self.middle.as_ref(),
            Finger::Ring => self.ring.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_none() && self.middle.is_none() && self.ring.is_none()
    }

    /// Drop points below `min_confidence` or below `min_y`.
    pub fn filtered(&self, min_confidence: f32, min_y: f32) -> Self {
        let keep = |p: Option<Landmark>| {
            p.filter(|p| p.confidence >= min_confidence && p.y >= min_y)
        };
        Self {
            index: keep(self.index),
            middle: keep(self.middle),
            ring: keep(self.ring),
        }
    }

    /// Mean x of `fingers`, or `None` if any of them is missing.
    fn mean_x(&self, fingers: &[Finger]) -> Option<f32> {
        let xs = fingers
            .iter()
            .map(|f| self.get(*f).map(|p| p.x))
            .collect::<Option<Vec<f32>>>()?;
        Some(mean(&xs))
    }
}

fn mean(values: &[f32]) -> f32 {
    values.iter().sum::<f32>() / values.len() as f32
}

#[derive(Debug)]
pub struct GestureStateMachine {
    th: GestureThresholds,
    gesture: GestureType,
    history: VecDeque<GestureType>,
    start_position: Option<f32>,
    index: Ema,
    middle: Ema,
    ring: Ema,
}

impl Default for GestureStateMachine {
    fn default() -> Self {
        Self::new(GestureThresholds::default())
    }
}

impl GestureStateMachine {
    pub fn new(th: GestureThresholds) -> Self {
        let alpha = th.smoothing_alpha;
        Self {
            history: VecDeque::with_capacity(th.history_size + 1),
            th,
            gesture: GestureType::None,
            start_position: None,
            index: Ema::new(alpha, 0.0),
            middle: Ema::new(alpha, 0.0),
            ring: Ema::new(alpha, 0.0),
        }
    }

    /// Feed one frame of detections.
    ///
    /// `region_bottom_fraction` is the bottom of the active region within the
    /// search window (0 = bottom, 1 = top); fingertips are accepted from
    /// slightly below it, scaled by `active_area_fudge_scale`.
    pub fn input(
        &mut self,
        detections: &FingertipDetections,
        region_bottom_fraction: f32,
    ) -> Transition {
        let min_y = 1.0 - (1.0 - region_bottom_fraction) * self.th.active_area_fudge_scale;
        let tips = detections.filtered(self.th.min_confidence, min_y);
        let class = self.classify(&tips);

        self.history.push_back(class);
        if self.history.len() > self.th.history_size {
            self.history.pop_front();
        }
        debug_assert!(self.history.len() <= self.th.history_size);
        debug!("gesture frame: {} ({:?})", class.as_str(), self.history);

        match self.gesture {
            GestureType::None => self.try_begin(&tips),
            _ => self.continue_or_end(&tips),
        }
    }

    /// `(gesture, delta)`: delta is the smoothed position relative to where the
    /// gesture started, present only while a gesture is active.
    pub fn output(&self) -> (GestureType, Option<f32>) {
        match (self.gesture, self.start_position) {
            (GestureType::None, _) => (GestureType::None, None),
            (g, Some(start)) => (g, Some(self.current_position(g) - start)),
            (g, None) => unreachable!("active {g:?} gesture without a start position"),
        }
    }

    pub fn gesture(&self) -> GestureType {
        self.gesture
    }

    pub fn start_position(&self) -> Option<f32> {
        self.start_position
    }

    /// Smoothed fingertip x positions (index, middle, ring).
    pub fn smoothed_positions(&self) -> [f32; 3] {
        [self.index.output(), self.middle.output(), self.ring.output()]
    }

    fn classify(&self, tips: &FingertipDetections) -> GestureType {
        let (Some(index), Some(middle)) = (tips.index, tips.middle) else {
            return GestureType::None;
        };
        if let Some(ring) = tips.ring {
            let avg_y = (index.y + middle.y) / 2.0;
            if (ring.y - avg_y).abs() <= self.th.ring_tolerance {
                return GestureType::Three;
            }
        }
        GestureType::Two
    }

    fn count(&self, g: GestureType) -> usize {
        self.history.iter().filter(|h| **h == g).count()
    }

    fn try_begin(&mut self, tips: &FingertipDetections) -> Transition {
        let start = self.th.start_threshold;
        let winner = [
            (GestureType::Three, self.count(GestureType::Three)),
            (GestureType::Two, self.count(GestureType::Two)),
        ]
        .into_iter()
        .filter(|(_, n)| *n >= start)
        .max_by_key(|(g, n)| (*n, g.fingers().len()))
        .map(|(g, _)| g);

        let Some(winner) = winner else {
            return Transition::NoChange;
        };
        // the triggering frame must carry every finger the gesture is measured from
        let Some(reference) = tips.mean_x(winner.fingers()) else {
            debug!("{} gesture pending: fingers missing this frame", winner.as_str());
            return Transition::NoChange;
        };

        for finger in winner.fingers() {
            if let Some(p) = tips.get(*finger) {
                self.stream(*finger).set(p.x);
            }
        }
        self.gesture = winner;
        self.start_position = Some(reference);
        info!("{}-finger gesture began at x={reference:.3}", winner.as_str());
        Transition::Begin(winner)
    }

    fn continue_or_end(&mut self, tips: &FingertipDetections) -> Transition {
        if self.count(GestureType::None) >= self.th.stop_threshold {
            info!("{}-finger gesture ended", self.gesture.as_str());
            self.gesture = GestureType::None;
            self.start_position = None;
            return Transition::End;
        }

        for finger in [Finger::Index, Finger::Middle, Finger::Ring] {
            if let Some(p) = tips.get(finger) {
                self.stream(finger).input(p.x);
            }
        }
        Transition::NoChange
    }

    fn stream(&mut self, finger: Finger) -> &mut Ema {
        match finger {
            Finger::Index => &mut self.index,
            Finger::Middle => &mut self.middle,
            Finger::Ring => &mut self.ring,
        }
    }

    fn current_position(&self, g: GestureType) -> f32 {
        let xs: Vec<f32> = g
            .fingers()
            .iter()
            .map(|f| match f {
                Finger::Index => self.index.output(),
                Finger::Middle => self.middle.output(),
                Finger::Ring => self.ring.output(),
            })
            .collect();
        mean(&xs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tip(x: f32, y: f32) -> Option<Landmark> {
        Some(Landmark {
            x,
            y,
            confidence: 0.9,
        })
    }

    fn two(x: f32) -> FingertipDetections {
        FingertipDetections {
            index: tip(x, 0.8),
            middle: tip(x + 0.1, 0.8),
            ring: None,
        }
    }

    fn three(x: f32) -> FingertipDetections {
        FingertipDetections {
            index: tip(x, 0.8),
            middle: tip(x + 0.1, 0.8),
            ring: tip(x + 0.2, 0.82),
        }
    }

    fn none() -> FingertipDetections {
        FingertipDetections::default()
    }

    fn machine(history_size: usize, start: usize, stop: usize) -> GestureStateMachine {
        GestureStateMachine::new(GestureThresholds {
            history_size,
            start_threshold: start,
            stop_threshold: stop,
            ..Default::default()
        })
    }

    const BOTTOM: f32 = 0.5;

    #[test]
    fn classifies_fingers() {
        let g = GestureStateMachine::default();
        assert_eq!(g.classify(&none()), GestureType::None);
        assert_eq!(g.classify(&two(0.4)), GestureType::Two);
        assert_eq!(g.classify(&three(0.4)), GestureType::Three);

        // ring too far off the index/middle line
        let mut skewed = three(0.4);
        skewed.ring = tip(0.6, 0.6);
        assert_eq!(g.classify(&skewed), GestureType::Two);

        let only_index = FingertipDetections {
            index: tip(0.4, 0.8),
            ..none()
        };
        assert_eq!(g.classify(&only_index), GestureType::None);
    }

    #[test]
    fn filters_low_confidence_and_low_points() {
        let mut d = two(0.4);
        d.middle = Some(Landmark {
            x: 0.5,
            y: 0.8,
            confidence: 0.2,
        });
        let f = d.filtered(0.6, 0.0);
        assert!(f.index.is_some());
        assert!(f.middle.is_none());

        // bottom 0.5, fudge 1.8 => min_y = 0.1
        let mut g = machine(6, 1, 3);
        let low = FingertipDetections {
            index: tip(0.4, 0.05),
            middle: tip(0.5, 0.05),
            ring: None,
        };
        assert_eq!(g.input(&low, BOTTOM), Transition::NoChange);
        assert_eq!(g.input(&two(0.4), BOTTOM), Transition::Begin(GestureType::Two));
    }

    #[test]
    fn activation_fires_on_fourth_frame() {
        let mut g = machine(6, 4, 3);
        let seq = [two(0.4), two(0.4), two(0.4), two(0.4), none(), none()];
        let transitions: Vec<_> = seq.iter().map(|d| g.input(d, BOTTOM)).collect();

        assert_eq!(
            transitions,
            vec![
                Transition::NoChange,
                Transition::NoChange,
                Transition::NoChange,
                Transition::Begin(GestureType::Two),
                Transition::NoChange,
                Transition::NoChange,
            ]
        );
        assert_eq!(g.gesture(), GestureType::Two);
    }

    #[test]
    fn delta_is_zero_on_trigger_frame() {
        let mut g = machine(6, 4, 3);
        for _ in 0..3 {
            g.input(&two(0.3), BOTTOM);
            assert_eq!(g.output(), (GestureType::None, None));
        }
        g.input(&two(0.4), BOTTOM);
        assert_eq!(g.output(), (GestureType::Two, Some(0.0)));
        assert!((g.start_position().unwrap() - 0.45).abs() < 1e-6);
    }

    #[test]
    fn deactivation_fires_on_third_none_in_window() {
        let mut g = machine(6, 4, 3);
        for _ in 0..5 {
            g.input(&two(0.4), BOTTOM);
        }
        assert_eq!(g.input(&none(), BOTTOM), Transition::NoChange);
        assert_eq!(g.input(&none(), BOTTOM), Transition::NoChange);
        assert!(g.output().1.is_some());
        assert_eq!(g.input(&none(), BOTTOM), Transition::End);
        assert_eq!(g.output(), (GestureType::None, None));
        assert_eq!(g.start_position(), None);
    }

    #[test]
    fn brief_dropouts_do_not_end_gesture() {
        let mut g = machine(6, 4, 3);
        for _ in 0..4 {
            g.input(&two(0.4), BOTTOM);
        }
        for frame in 0..20 {
            let d = if frame % 3 == 0 { none() } else { two(0.4) };
            assert_eq!(g.input(&d, BOTTOM), Transition::NoChange);
        }
        assert_eq!(g.gesture(), GestureType::Two);
    }

    #[test]
    fn delta_tracks_smoothed_movement() {
        let mut g = machine(6, 4, 3);
        for _ in 0..4 {
            g.input(&two(0.4), BOTTOM);
        }
        let mut last = 0.0;
        for _ in 0..20 {
            g.input(&two(0.5), BOTTOM);
            let delta = g.output().1.unwrap();
            assert!(delta > last);
            assert!(delta <= 0.1 + 1e-6);
            last = delta;
        }
        assert!((last - 0.1).abs() < 1e-3);
    }

    #[test]
    fn missing_fingers_leave_streams_untouched() {
        let mut g = machine(6, 4, 3);
        for _ in 0..4 {
            g.input(&two(0.4), BOTTOM);
        }
        let before = g.smoothed_positions();
        let index_only = FingertipDetections {
            index: tip(0.9, 0.8),
            ..none()
        };
        g.input(&index_only, BOTTOM);
        let after = g.smoothed_positions();
        assert!(after[0] > before[0]);
        assert_eq!(after[1], before[1]);
    }

    #[test]
    fn three_finger_gesture_uses_ring() {
        let mut g = machine(6, 4, 3);
        for _ in 0..3 {
            assert_eq!(g.input(&three(0.2), BOTTOM), Transition::NoChange);
        }
        assert_eq!(
            g.input(&three(0.2), BOTTOM),
            Transition::Begin(GestureType::Three)
        );
        assert!((g.start_position().unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(g.output(), (GestureType::Three, Some(0.0)));
    }

    #[test]
    fn mixed_frames_need_a_clear_winner() {
        let mut g = machine(6, 4, 3);
        for i in 0..6 {
            let d = if i % 2 == 0 { two(0.4) } else { three(0.4) };
            assert_eq!(g.input(&d, BOTTOM), Transition::NoChange);
        }
        assert_eq!(g.gesture(), GestureType::None);
    }

    #[test]
    fn activation_waits_for_required_fingers() {
        let mut g = machine(4, 2, 1);
        g.input(&three(0.4), BOTTOM);
        assert_eq!(
            g.input(&three(0.4), BOTTOM),
            Transition::Begin(GestureType::Three)
        );
        assert_eq!(g.input(&none(), BOTTOM), Transition::End);

        // three-finger frames still dominate the window, but the ring is missing
        assert_eq!(g.input(&two(0.4), BOTTOM), Transition::NoChange);
        assert_eq!(g.gesture(), GestureType::None);
        assert_eq!(
            g.input(&three(0.4), BOTTOM),
            Transition::Begin(GestureType::Three)
        );
    }

    #[test]
    fn tie_prefers_more_fingers() {
        let mut g = machine(5, 2, 1);
        let seq = [three(0.4), three(0.4), none(), two(0.4), two(0.4), three(0.4)];
        let transitions: Vec<_> = seq.iter().map(|d| g.input(d, BOTTOM)).collect();

        // frame 5 ties two against three; three wins but needs the ring finger
        assert_eq!(
            transitions,
            vec![
                Transition::NoChange,
                Transition::Begin(GestureType::Three),
                Transition::End,
                Transition::NoChange,
                Transition::NoChange,
                Transition::Begin(GestureType::Three),
            ]
        );
        assert_eq!(g.count(GestureType::Two), 2);
        assert_eq!(g.count(GestureType::Three), 2);
    }

    #[test]
    fn empty_frames_keep_cycling_history() {
        let mut g = machine(6, 4, 3);
        for _ in 0..100 {
            assert_eq!(g.input(&none(), BOTTOM), Transition::NoChange);
        }
        assert_eq!(g.history.len(), 6);
        for _ in 0..3 {
            g.input(&two(0.4), BOTTOM);
        }
        assert_eq!(g.input(&two(0.4), BOTTOM), Transition::Begin(GestureType::Two));
    }
}
