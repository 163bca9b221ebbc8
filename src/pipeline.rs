//! Per-frame wiring: extractor -> tracker -> landmark window -> gestures -> controls.

use log::{error, info};
use serde::Serialize;
use std::{
    io::{BufRead, Write},
    sync::atomic::{AtomicBool, Ordering},
};

use crate::actions::Controls;
use crate::config::{DetectorSettings, Profile};
use crate::error::Result;
use crate::gestures::{FingertipDetections, GestureStateMachine, GestureType, Transition};
use crate::input::{FrameReader, FrameRecord, Signal};
use crate::region::{RegionCandidateExtractor, ThresholdExtractor, size_range_for};
use crate::tracker::{CandidateId, CandidateTracker};

#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    pub active_area: Option<(f32, f32)>,
    pub areas: Vec<(f32, f32)>,
    pub locked: Option<CandidateId>,
    pub gesture: GestureType,
    pub delta: Option<f32>,
    pub transition: Transition,
    /// Where the active gesture started, and the smoothed index/middle/ring x.
    pub start_position: Option<f32>,
    pub fingers: [f32; 3],
    /// `None` when the channel could not be read.
    pub volume: Option<f32>,
    pub brightness: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamSummary {
    pub frames: u64,
    pub frames_with_area: u64,
    pub gestures_begun: u64,
    pub gestures_ended: u64,
    pub last_active_area: Option<(f32, f32)>,
    pub volume: Option<f32>,
    pub brightness: Option<f32>,
    pub interrupted: bool,
}

/// Bottom of the active region inside the landmark search window (0 = bottom,
/// 1 = top). The window runs from `roi_top_offset` above the region's top
/// edge down to the bottom of the frame; `area` is in rows from the top.
pub fn region_bottom_fraction(area: (f32, f32), rows: usize, roi_top_offset: f32) -> f32 {
    let rows = rows as f32;
    let top = (area.0 / rows - roi_top_offset).clamp(0.0, 1.0);
    if top >= 1.0 {
        return 1.0;
    }
    (1.0 - (area.1 / rows - top) / (1.0 - top)).clamp(0.0, 1.0)
}

pub struct FramePipeline {
    detector: DetectorSettings,
    extractor: Box<dyn RegionCandidateExtractor>,
    tracker: CandidateTracker,
    gestures: GestureStateMachine,
    controls: Controls,
    frame: u64,
}

impl FramePipeline {
    pub fn new(profile: &Profile) -> Self {
        Self::with_parts(
            profile,
            Box::new(ThresholdExtractor::new(profile.detector.threshold)),
            Controls::in_memory(profile.bindings.clone(), profile.control.clone()),
        )
    }

    pub fn with_parts(
        profile: &Profile,
        extractor: Box<dyn RegionCandidateExtractor>,
        controls: Controls,
    ) -> Self {
        Self {
            detector: profile.detector.clone(),
            extractor,
            tracker: CandidateTracker::new(profile.tracker.clone()),
            gestures: GestureStateMachine::new(profile.gesture.clone()),
            controls,
            frame: 0,
        }
    }

    pub fn tracker(&self) -> &CandidateTracker {
        &self.tracker
    }

    pub fn process(&mut self, rec: &FrameRecord) -> FrameReport {
        let rows = rec.signal.len();
        let size_range = size_range_for(
            rows,
            self.detector.height_fraction_min,
            self.detector.height_fraction_max,
        );

        match &rec.signal {
            Signal::Arrays { edge, brightness } => {
                let found = self.extractor.extract(edge, brightness, &size_range);
                self.tracker.update(&found, Some(&size_range));
            }
            Signal::Candidates { candidates, .. } => {
                self.tracker.update(candidates, Some(&size_range));
            }
        }

        // landmarks are only searched above a known region
        let active_area = self.tracker.active_area();
        let transition = match active_area {
            Some(area) => {
                let bottom = region_bottom_fraction(area, rows, self.detector.roi_top_offset);
                self.gestures.input(&rec.fingertips, bottom)
            }
            None => self.gestures.input(&FingertipDetections::default(), 1.0),
        };

        let (gesture, delta) = self.gestures.output();
        self.drive_controls(transition, gesture, delta);

        let (volume, brightness) = self.levels();
        let report = FrameReport {
            frame: self.frame,
            active_area: self.tracker.active_area(),
            areas: self.tracker.all_areas_sorted(),
            locked: self.tracker.lock().id(),
            gesture,
            delta,
            transition,
            start_position: self.gestures.start_position(),
            fingers: self.gestures.smoothed_positions(),
            volume,
            brightness,
        };
        self.frame += 1;
        report
    }

    fn levels(&self) -> (Option<f32>, Option<f32>) {
        let read = |name: &str, level: Result<f32>| match level {
            Ok(v) => Some(v),
            Err(e) => {
                error!("reading {name} level failed: {e}");
                None
            }
        };
        (
            read("volume", self.controls.volume()),
            read("brightness", self.controls.brightness()),
        )
    }

    fn drive_controls(&mut self, transition: Transition, gesture: GestureType, delta: Option<f32>) {
        match transition {
            Transition::Begin(g) => {
                self.tracker.lock_top_candidate();
                if let Err(e) = self.controls.begin(g) {
                    error!("control begin failed: {e}");
                }
            }
            Transition::End => self.controls.end(),
            Transition::NoChange => {
                if let Some(d) = delta {
                    if let Err(e) = self.controls.apply(d) {
                        error!("control update failed: {e}");
                    }
                }
            }
        }
        if gesture == GestureType::None {
            self.tracker.unlock_top_candidate();
        }
    }

    /// Process every frame of a JSON-lines stream, writing one JSON report
    /// per frame to `out` (if given). Stops early once `stop` is set.
    pub fn run_stream<R: BufRead>(
        &mut self,
        reader: R,
        mut out: Option<&mut dyn Write>,
        stop: &AtomicBool,
    ) -> Result<StreamSummary> {
        let mut summary = StreamSummary::default();

        for rec in FrameReader::new(reader) {
            if stop.load(Ordering::Relaxed) {
                info!("stop requested; ending stream");
                summary.interrupted = true;
                break;
            }
            let report = self.process(&rec?);

            summary.frames += 1;
            if report.active_area.is_some() {
                summary.frames_with_area += 1;
                summary.last_active_area = report.active_area;
            }
            match report.transition {
                Transition::Begin(_) => summary.gestures_begun += 1,
                Transition::End => summary.gestures_ended += 1,
                Transition::NoChange => {}
            }
            summary.volume = report.volume;
            summary.brightness = report.brightness;

            if let Some(w) = out.as_mut() {
                serde_json::to_writer(&mut **w, &report)
                    .map_err(|e| std::io::Error::other(e.to_string()))?;
                writeln!(w)?;
            }
        }
        Ok(summary)
    }
}
