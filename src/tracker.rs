//! Temporal tracking of active-region candidates across frames.
//!
//! Raw candidates carry no identity, so each frame they are matched to the
//! tracked set greedily: tracked candidates, in rank order, each claim the
//! first raw candidate (by center) within `max_deviation`. Unclaimed raw
//! candidates start new tracks. The survivors are ranked by score, pruned by
//! the cap, quality thresholds and interval overlap.

use log::{debug, error, info, warn};
use std::{fmt, ops::RangeInclusive};

use crate::config::TrackerThresholds;
use crate::ema::Ema;
use crate::region::RawCandidate;

pub type CandidateId = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lock {
    #[default]
    Unlocked,
    LockedTo(CandidateId),
}

impl Lock {
    pub fn id(&self) -> Option<CandidateId> {
        match self {
            Lock::Unlocked => None,
            Lock::LockedTo(id) => Some(*id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackedCandidate {
    id: CandidateId,
    x1: Ema,
    x2: Ema,
    brightness: Ema,
    edge_score: Ema,
    // ramps from initial_score_multiplier to 1 while the region keeps showing up
    trust: Ema,
    score: f32,
}

impl TrackedCandidate {
    fn seed(id: CandidateId, raw: &RawCandidate, th: &TrackerThresholds) -> Self {
        Self {
            id,
            x1: Ema::new(th.position_alpha, raw.x1 as f32),
            x2: Ema::new(th.position_alpha, raw.x2() as f32),
            brightness: Ema::new(th.quality_alpha, raw.brightness),
            edge_score: Ema::new(th.quality_alpha, raw.edge_score),
            trust: Ema::new(th.trust_alpha, th.initial_score_multiplier),
            score: 0.0,
        }
    }

    fn merge(&mut self, raw: &RawCandidate) {
        self.x1.input(raw.x1 as f32);
        self.x2.input(raw.x2() as f32);
        self.brightness.input(raw.brightness);
        self.edge_score.input(raw.edge_score);
        self.trust.input(1.0);
    }

    /// Positions stay where they were last seen.
    fn decay(&mut self, not_found_edge_score: f32) {
        self.brightness.input(0.0);
        self.edge_score.input(not_found_edge_score);
    }

    fn rescore(&mut self, th: &TrackerThresholds) {
        let ceiling = th.edge_score_ceiling;
        let smoothness = (ceiling - self.edge_score()).clamp(0.0, ceiling) / ceiling;
        self.score = self.trust.output() * (self.brightness() + smoothness);
    }

    fn overlaps(&self, other: &TrackedCandidate) -> bool {
        !(other.x2() < self.x1() || self.x2() < other.x1())
    }

    pub fn id(&self) -> CandidateId {
        self.id
    }
    pub fn x1(&self) -> f32 {
        self.x1.output()
    }
    pub fn x2(&self) -> f32 {
        self.x2.output()
    }
    pub fn size(&self) -> f32 {
        self.x2() - self.x1()
    }
    pub fn center(&self) -> f32 {
        (self.x1() + self.x2()) / 2.0
    }
    pub fn brightness(&self) -> f32 {
        self.brightness.output()
    }
    pub fn edge_score(&self) -> f32 {
        self.edge_score.output()
    }
    /// Brightness plus edge smoothness (each in `[0, 1]`), scaled by the
    /// candidate's trust in `[initial_score_multiplier, 1]`. Higher is better.
    pub fn score(&self) -> f32 {
        self.score
    }
}

impl fmt::Display for TrackedCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{:.2} to {:.2}], score {:.3} (brightness {:.3}, edge {:.5})",
            self.id,
            self.x1(),
            self.x2(),
            self.score,
            self.brightness(),
            self.edge_score()
        )
    }
}

#[derive(Debug)]
pub struct CandidateTracker {
    th: TrackerThresholds,
    candidates: Vec<TrackedCandidate>,
    next_id: CandidateId,
    lock: Lock,
}

impl Default for CandidateTracker {
    fn default() -> Self {
        Self::new(TrackerThresholds::default())
    }
}

impl CandidateTracker {
    pub fn new(th: TrackerThresholds) -> Self {
        Self {
            th,
            candidates: Vec::new(),
            next_id: 1,
            lock: Lock::Unlocked,
        }
    }

    pub fn update(&mut self, raw: &[RawCandidate], size_range: Option<&RangeInclusive<i32>>) {
        let mut pool: Vec<RawCandidate> = raw
            .iter()
            .filter(|c| {
                let ok = c.is_well_formed();
                if !ok {
                    debug!("dropping malformed raw candidate {c:?}");
                }
                ok
            })
            .copied()
            .collect();
        pool.sort_by(|a, b| a.center().total_cmp(&b.center()));
        debug!("{} raw candidates received", pool.len());

        // first fit in scan order, not nearest
        for tracked in &mut self.candidates {
            let center = tracked.center();
            let hit = pool
                .iter()
                .position(|c| (c.center() - center).abs() < self.th.max_deviation);
            match hit {
                Some(i) => {
                    let raw = pool.remove(i);
                    tracked.merge(&raw);
                    debug!("merged into {tracked}");
                }
                None => tracked.decay(self.th.not_found_edge_score),
            }
        }

        if !pool.is_empty() {
            debug!("{} new candidates", pool.len());
        }
        for raw in &pool {
            self.candidates
                .push(TrackedCandidate::seed(self.next_id, raw, &self.th));
            self.next_id += 1;
        }

        for c in &mut self.candidates {
            c.rescore(&self.th);
        }
        self.candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        if let Some(id) = self.lock.id() {
            match self.candidates.iter().position(|c| c.id == id) {
                Some(i) => self.candidates[..=i].rotate_right(1),
                None => {
                    debug_assert!(false, "locked candidate #{id} is no longer tracked");
                    error!("locked candidate #{id} is no longer tracked; releasing lock");
                    self.lock = Lock::Unlocked;
                }
            }
        }

        if self.candidates.len() > self.th.max_candidates {
            debug!(
                "dropping {} lowest-ranked candidates over the cap",
                self.candidates.len() - self.th.max_candidates
            );
            self.candidates.truncate(self.th.max_candidates);
        }

        self.prune_low_quality(size_range);
        self.remove_overlaps();

        debug_assert!(self.candidates.len() <= self.th.max_candidates);
        debug_assert!(
            self.lock
                .id()
                .is_none_or(|id| self.candidates.first().is_some_and(|c| c.id == id)),
            "locked candidate must rank first"
        );
    }

    fn prune_low_quality(&mut self, size_range: Option<&RangeInclusive<i32>>) {
        let th = &self.th;
        let locked = self.lock.id();
        self.candidates.retain(|c| {
            if Some(c.id) == locked {
                return true;
            }
            if c.brightness() < th.min_brightness {
                debug!("removal, brightness: {c}");
                return false;
            }
            if c.edge_score() > th.max_edge_score {
                debug!("removal, edge score: {c}");
                return false;
            }
            if let Some(range) = size_range {
                let size = c.size();
                if size < *range.start() as f32 || size > *range.end() as f32 {
                    debug!("removal, size {size:.1}: {c}");
                    return false;
                }
            }
            true
        });
    }

    /// Keeps the higher-ranked of any two overlapping candidates.
    fn remove_overlaps(&mut self) {
        let mut kept: Vec<TrackedCandidate> = Vec::with_capacity(self.candidates.len());
        for c in self.candidates.drain(..) {
            if let Some(winner) = kept.iter().find(|k| k.overlaps(&c)) {
                debug!("removal, overlap with {winner}: {c}");
                continue;
            }
            kept.push(c);
        }
        self.candidates = kept;
    }

    /// Best region, or `None` when nothing survived this frame.
    pub fn active_area(&self) -> Option<(f32, f32)> {
        self.candidates.first().map(|c| (c.x1(), c.x2()))
    }

    /// All surviving regions, best first.
    pub fn all_areas_sorted(&self) -> Vec<(f32, f32)> {
        self.candidates.iter().map(|c| (c.x1(), c.x2())).collect()
    }

    pub fn candidates(&self) -> &[TrackedCandidate] {
        &self.candidates
    }

    pub fn lock(&self) -> Lock {
        self.lock
    }

    /// Pin the current top candidate to rank 0 until unlocked.
    pub fn lock_top_candidate(&mut self) {
        if self.lock != Lock::Unlocked {
            return;
        }
        match self.candidates.first() {
            Some(top) => {
                self.lock = Lock::LockedTo(top.id);
                info!("locked active region {top}");
            }
            None => warn!("lock requested but no region is tracked; ignoring"),
        }
    }

    pub fn unlock_top_candidate(&mut self) {
        if let Lock::LockedTo(id) = self.lock {
            info!("unlocked active region #{id}");
        }
        self.lock = Lock::Unlocked;
    }
}
