//! Apply policies: per-stage admission and watermark advancement
//!
//! A policy rejecting an event is a normal skip, not an error.

use chainfold_types::{LogMeta, LogStatus};

use super::{Entity, EntityEvent, PendingMark, Stage, Watermarks};

/// Decides whether a log may mutate an entity in one stage
pub trait ApplyPolicy: Send + Sync {
    fn can_apply(&self, marks: &Watermarks, log: &LogMeta) -> bool;

    /// Record that `log` was applied
    fn advance(&self, marks: &mut Watermarks, log: &LogMeta);
}

/// Off-chain events apply once per strictly later timestamp
#[derive(Debug, Clone, Copy, Default)]
pub struct LazyApplyPolicy;

impl ApplyPolicy for LazyApplyPolicy {
    fn can_apply(&self, marks: &Watermarks, log: &LogMeta) -> bool {
        marks.last_lazy_at.map_or(true, |last| log.event_time() > last)
    }

    fn advance(&self, marks: &mut Watermarks, log: &LogMeta) {
        marks.last_lazy_at = Some(log.event_time());
    }
}

/// Pending events must come after the last applied pending log in chain
/// order and be newer than the confirmed watermark.
///
/// Sibling logs of one transaction share a timestamp, so the pending mark
/// also carries position and id.
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingApplyPolicy;

impl ApplyPolicy for PendingApplyPolicy {
    fn can_apply(&self, marks: &Watermarks, log: &LogMeta) -> bool {
        let mark = PendingMark::of(log);
        let after_pending = marks.last_pending.as_ref().map_or(true, |last| &mark > last);
        after_pending && marks.last_confirmed_at.map_or(true, |last| mark.at > last)
    }

    fn advance(&self, marks: &mut Watermarks, log: &LogMeta) {
        marks.last_pending = Some(PendingMark::of(log));
    }
}

/// Confirmed events apply in strictly ascending chain position
#[derive(Debug, Clone, Copy)]
pub struct ForwardApplyPolicy {
    pub max_revertable_events: usize,
}

impl ApplyPolicy for ForwardApplyPolicy {
    fn can_apply(&self, marks: &Watermarks, log: &LogMeta) -> bool {
        if log.status != LogStatus::Confirmed || !log.position().is_mined() {
            return false;
        }
        marks.last_confirmed.map_or(true, |last| log.position() > last)
    }

    fn advance(&self, marks: &mut Watermarks, log: &LogMeta) {
        marks.last_confirmed = Some(log.position());
        let at = log.event_time();
        marks.last_confirmed_at = Some(marks.last_confirmed_at.map_or(at, |last| last.max(at)));
        marks.revertable.push_back(log.id.clone());
        while marks.revertable.len() > self.max_revertable_events {
            marks.revertable.pop_front();
        }
    }
}

/// Admits only reverted logs whose effect is currently reflected
#[derive(Debug, Clone, Copy, Default)]
pub struct RevertApplyPolicy;

impl ApplyPolicy for RevertApplyPolicy {
    fn can_apply(&self, marks: &Watermarks, log: &LogMeta) -> bool {
        log.status == LogStatus::Reverted && marks.is_reflected(&log.id)
    }

    fn advance(&self, marks: &mut Watermarks, log: &LogMeta) {
        marks.revertable.retain(|id| id != &log.id);
    }
}

/// Policy set consulted by the chain reducer, one per stage
#[derive(Debug, Clone, Copy)]
pub struct StagePolicies {
    pub lazy: LazyApplyPolicy,
    pub pending: PendingApplyPolicy,
    pub forward: ForwardApplyPolicy,
    pub revert: RevertApplyPolicy,
}

impl StagePolicies {
    pub fn new(max_revertable_events: usize) -> Self {
        Self {
            lazy: LazyApplyPolicy,
            pending: PendingApplyPolicy,
            forward: ForwardApplyPolicy {
                max_revertable_events,
            },
            revert: RevertApplyPolicy,
        }
    }

    pub fn for_stage(&self, stage: Stage) -> &dyn ApplyPolicy {
        match stage {
            Stage::Lazy => &self.lazy,
            Stage::Pending => &self.pending,
            Stage::Forward => &self.forward,
            Stage::Inactive => &self.revert,
        }
    }

    pub fn can_apply<E: Entity>(&self, entity: &E, event: &EntityEvent<E>) -> bool {
        self.for_stage(event.stage()).can_apply(entity.watermarks(), &event.log)
    }

    pub fn advance<E: Entity>(&self, entity: &mut E, event: &EntityEvent<E>) {
        self.for_stage(event.stage()).advance(entity.watermarks_mut(), &event.log);
    }
}
