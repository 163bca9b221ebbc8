//! Recorded frame stream: one JSON object per line.
//!
//! A frame carries either the two per-row signal arrays
//! (`{"edge": [..], "brightness": [..]}`) or already extracted candidates
//! with the frame height (`{"candidates": [..], "height": 720}`), plus the
//! optional fingertip detections for that frame.

use serde::Deserialize;
use std::io::BufRead;

use crate::error::{Error, Result};
use crate::gestures::FingertipDetections;
use crate::region::RawCandidate;

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Arrays { edge: Vec<f32>, brightness: Vec<f32> },
    Candidates { candidates: Vec<RawCandidate>, height: usize },
}

impl Signal {
    /// Number of rows the signal spans.
    pub fn len(&self) -> usize {
        match self {
            Signal::Arrays { edge, .. } => edge.len(),
            Signal::Candidates { height, .. } => *height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub signal: Signal,
    pub fingertips: FingertipDetections,
}

#[derive(Debug, Deserialize)]
struct RecordLine {
    edge: Option<Vec<f32>>,
    brightness: Option<Vec<f32>>,
    candidates: Option<Vec<RawCandidate>>,
    height: Option<usize>,
    #[serde(default)]
    fingertips: FingertipDetections,
}

impl FrameRecord {
    pub fn parse(txt: &str, line: usize) -> Result<Self> {
        let rec: RecordLine =
            serde_json::from_str(txt).map_err(|source| Error::MalformedFrame { line, source })?;
        let invalid = |reason: &str| Error::InvalidFrame {
            line,
            reason: reason.to_string(),
        };

        let signal = match (rec.edge, rec.brightness, rec.candidates, rec.height) {
            (Some(edge), Some(brightness), None, _) => {
                if edge.len() != brightness.len() {
                    return Err(invalid("edge and brightness arrays differ in length"));
                }
                Signal::Arrays { edge, brightness }
            }
            (None, None, Some(candidates), Some(height)) => Signal::Candidates { candidates, height },
            (None, None, Some(_), None) => return Err(invalid("candidates need a frame height")),
            _ => {
                return Err(invalid(
                    "expected either edge+brightness arrays or candidates+height",
                ));
            }
        };
        if signal.is_empty() {
            return Err(invalid("frame has no rows"));
        }

        Ok(Self {
            signal,
            fingertips: rec.fingertips,
        })
    }
}

/// Iterates the frames of a JSON-lines stream, skipping blank lines.
pub struct FrameReader<R> {
    inner: R,
    line: usize,
    buf: String,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for FrameReader<R> {
    type Item = Result<FrameRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.inner.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line += 1;
            let txt = self.buf.trim();
            if txt.is_empty() {
                continue;
            }
            return Some(FrameRecord::parse(txt, self.line));
        }
    }
}
