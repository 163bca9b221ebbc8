//! Raw region candidates and the extractor that finds them in a 1-D signal.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Share of each half-segment (measured from its ends) ignored by the edge score.
const EDGE_SCORE_CUTOFF: f32 = 0.2;

/// One frame's unfiltered detected region. Has no identity across frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub x1: i32,
    pub size: i32,
    pub brightness: f32,
    pub edge_score: f32,
}

impl RawCandidate {
    pub fn x2(&self) -> i32 {
        self.x1 + self.size
    }

    pub fn center(&self) -> f32 {
        self.x1 as f32 + self.size as f32 / 2.0
    }

    pub fn is_well_formed(&self) -> bool {
        self.x1 >= 0 && self.size > 0
    }
}

/// Turns per-frame edge magnitude and brightness arrays into raw candidates.
pub trait RegionCandidateExtractor {
    fn extract(
        &self,
        edge: &[f32],
        brightness: &[f32],
        size_range: &RangeInclusive<i32>,
    ) -> Vec<RawCandidate>;
}

/// Accepted region sizes for a signal of `len` samples, given the band's
/// expected share of the frame height.
pub fn size_range_for(len: usize, min_fraction: f32, max_fraction: f32) -> RangeInclusive<i32> {
    let len = len as f32;
    let lo = (min_fraction * len).floor() as i32;
    let hi = (max_fraction * len).ceil() as i32;
    lo..=hi
}

/// CPU extractor: a region is a run of samples whose edge magnitude stays
/// below `threshold` (the surface is smooth) with a length inside the size range.
#[derive(Debug, Clone)]
pub struct ThresholdExtractor {
    pub threshold: f32,
}

impl ThresholdExtractor {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    fn close_run(
        start: usize,
        size: usize,
        edge: &[f32],
        brightness: &[f32],
        size_range: &RangeInclusive<i32>,
        out: &mut Vec<RawCandidate>,
    ) {
        if size == 0 || !size_range.contains(&(size as i32)) {
            return;
        }
        let mid = start + size / 2;
        out.push(RawCandidate {
            x1: start as i32,
            size: size as i32,
            brightness: brightness.get(mid).copied().unwrap_or(0.0),
            edge_score: central_edge_energy(&edge[start..start + size]),
        });
    }
}

impl RegionCandidateExtractor for ThresholdExtractor {
    fn extract(
        &self,
        edge: &[f32],
        brightness: &[f32],
        size_range: &RangeInclusive<i32>,
    ) -> Vec<RawCandidate> {
        let mut out = Vec::new();
        let mut start = 0usize;
        let mut size = 0usize;

        for (i, &v) in edge.iter().enumerate() {
            if v < self.threshold {
                if size == 0 {
                    start = i;
                }
                size += 1;
            } else {
                Self::close_run(start, size, edge, brightness, size_range, &mut out);
                size = 0;
            }
        }
        Self::close_run(start, size, edge, brightness, size_range, &mut out);

        out
    }
}

/// Sum of squared edge magnitude over the central band of a segment,
/// normalized by the full segment length.
fn central_edge_energy(segment: &[f32]) -> f32 {
    if segment.is_empty() {
        return 0.0;
    }
    let radius = (segment.len() - 1) as f32 / 2.0;
    let sum: f32 = segment
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            if radius == 0.0 {
                return true;
            }
            let t = 1.0 - (*i as f32 - radius).abs() / radius;
            t >= EDGE_SCORE_CUTOFF
        })
        .map(|(_, v)| v * v)
        .sum();
    sum / segment.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_geometry() {
        let c = RawCandidate {
            x1: 100,
            size: 20,
            brightness: 0.9,
            edge_score: 0.0001,
        };
        assert_eq!(c.x2(), 120);
        assert_eq!(c.center(), 110.0);
        assert!(c.is_well_formed());
        assert!(!RawCandidate { size: 0, ..c }.is_well_formed());
    }

    #[test]
    fn size_range_floors_and_ceils() {
        assert_eq!(size_range_for(720, 0.04, 0.06), 28..=44);
    }

    #[test]
    fn finds_smooth_runs_in_range() {
        // two smooth runs (len 4 and len 2) separated by edges
        let edge = [0.5, 0.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.5];
        let brightness = [0.1, 0.2, 0.3, 0.8, 0.4, 0.1, 0.6, 0.6, 0.1];
        let found = ThresholdExtractor::new(0.02).extract(&edge, &brightness, &(3..=5));

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].x1, 1);
        assert_eq!(found[0].size, 4);
        assert_eq!(found[0].brightness, 0.8);
        assert_eq!(found[0].edge_score, 0.0);
    }

    #[test]
    fn trailing_run_is_closed() {
        let edge = [0.9, 0.01, 0.01, 0.01];
        let brightness = [0.0, 0.5, 0.5, 0.5];
        let found = ThresholdExtractor::new(0.02).extract(&edge, &brightness, &(2..=3));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].x1, 1);
        assert_eq!(found[0].size, 3);
    }

    #[test]
    fn edge_energy_ignores_segment_ends() {
        // radius 2: the outer samples sit at t = 0 and are skipped
        let segment = [1.0, 0.1, 0.1, 0.1, 1.0];
        let energy = central_edge_energy(&segment);
        assert!((energy - 0.03 / 5.0).abs() < 1e-6);
    }
}
