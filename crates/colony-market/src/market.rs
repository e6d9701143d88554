//! The request registry and its matching algorithm.
//!
//! All mutation happens inside one cycle's sequential pass, so assignment
//! is a plain read-modify-write. Consistency between requests and the
//! fulfillers holding them is repaired once per cycle by
//! [`RequestMarket::validate`].

use std::collections::BTreeMap;

use colony_types::{AgentId, Position, RequestId, ResourceRequest, SiteId, ZoneId};
use tracing::{debug, trace};

use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::score::score;

/// What the market needs to know about the world to validate requests.
pub trait MarketView {
    /// Whether the requester is still alive.
    fn requester_alive(&self, requester: AgentId) -> bool;

    /// Whether the requester no longer needs the energy it asked for.
    fn need_satisfied(&self, request: &ResourceRequest) -> bool;

    /// The request the fulfiller's own state says it is serving.
    fn fulfiller_target(&self, fulfiller: AgentId) -> Option<RequestId>;
}

/// Why a request was removed during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    /// The requester no longer exists.
    RequesterGone,
    /// The requester's buffer is already full.
    NeedSatisfied,
    /// The assigned fulfiller no longer references the request.
    OrphanedAssignment,
    /// The request outlived the staleness timeout.
    Stale,
}

impl InvalidationReason {
    /// Short label used in logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::RequesterGone => "requester_gone",
            Self::NeedSatisfied => "need_satisfied",
            Self::OrphanedAssignment => "orphaned_assignment",
            Self::Stale => "stale",
        }
    }

    /// Whether the requester is still waiting after this removal and should
    /// keep its accumulated wait when it asks again.
    pub const fn keeps_wait(self) -> bool {
        matches!(self, Self::OrphanedAssignment | Self::Stale)
    }
}

/// A request removed by [`RequestMarket::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    /// The removed request.
    pub request: RequestId,
    /// Zone it lived in.
    pub zone: ZoneId,
    /// Agent that posted it.
    pub requester: AgentId,
    /// Why it was removed.
    pub reason: InvalidationReason,
}

/// Registry of open resource requests.
#[derive(Debug, Default)]
pub struct RequestMarket {
    config: MarketConfig,
    requests: BTreeMap<RequestId, ResourceRequest>,
    by_requester: BTreeMap<AgentId, RequestId>,
    by_fulfiller: BTreeMap<AgentId, RequestId>,
    /// Wait start of requesters whose request was dropped by repair.
    waiting_since: BTreeMap<AgentId, u64>,
    /// Requests removed since the last [`RequestMarket::drain_closed`].
    closed: Vec<(ZoneId, RequestId)>,
}

impl RequestMarket {
    /// Create an empty market.
    pub fn new(config: MarketConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Scoring configuration.
    pub const fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Post a request for `requester`, or refresh the one it already has.
    ///
    /// Refreshing updates amount, priority, position, and hint but keeps
    /// the creation and wait ticks, so asking every cycle neither resets
    /// the wait bonus nor dodges the staleness timeout.
    #[allow(clippy::too_many_arguments)]
    pub fn register_request(
        &mut self,
        zone: ZoneId,
        requester: AgentId,
        amount: u32,
        priority: u32,
        position: Position,
        hint: Option<SiteId>,
        now: u64,
    ) -> RequestId {
        if let Some(request) = self
            .by_requester
            .get(&requester)
            .and_then(|id| self.requests.get_mut(id))
        {
            request.amount = amount;
            request.priority = priority;
            request.requester_position = position;
            request.hint = hint;
            trace!(request = %request.id, requester = %requester, amount, "Request refreshed");
            return request.id;
        }

        let wait_start = self.waiting_since.remove(&requester).unwrap_or(now);
        let id = RequestId::new();
        self.requests.insert(
            id,
            ResourceRequest {
                id,
                zone,
                requester,
                requester_position: position,
                amount,
                priority,
                created_at: now,
                wait_start,
                hint,
                assigned: None,
            },
        );
        self.by_requester.insert(requester, id);
        debug!(
            request = %id,
            zone = %zone,
            requester = %requester,
            amount,
            priority,
            wait_start,
            "Request registered"
        );
        id
    }

    /// Remove the request posted by `requester`, if any.
    pub fn clear_request(&mut self, requester: AgentId) -> Option<ResourceRequest> {
        self.waiting_since.remove(&requester);
        let id = self.by_requester.get(&requester).copied()?;
        self.remove(id)
    }

    /// The lowest-scoring request in `zone` that `fulfiller` may take.
    ///
    /// Only unassigned requests and the one already held by `fulfiller` are
    /// considered. Equal scores resolve to the smallest request id, so the
    /// answer is stable while the market is unchanged.
    pub fn find_best_request_for(
        &self,
        fulfiller: AgentId,
        zone: ZoneId,
        position: Position,
        now: u64,
    ) -> Option<RequestId> {
        self.requests
            .values()
            .filter(|r| r.zone == zone && r.requester != fulfiller)
            .filter(|r| r.assigned.is_none_or(|holder| holder == fulfiller))
            .map(|r| (score(&self.config, r, position, now), r.id))
            .min_by(|(a, a_id), (b, b_id)| a.total_cmp(b).then_with(|| a_id.cmp(b_id)))
            .map(|(_, id)| id)
    }

    /// Bind `fulfiller` to `request`.
    pub fn assign(&mut self, request: RequestId, fulfiller: AgentId) -> Result<(), MarketError> {
        if let Some(&held) = self.by_fulfiller.get(&fulfiller)
            && held != request
        {
            return Err(MarketError::FulfillerBusy {
                fulfiller,
                request: held,
            });
        }
        let entry = self
            .requests
            .get_mut(&request)
            .ok_or(MarketError::RequestNotFound { request })?;
        match entry.assigned {
            Some(holder) if holder != fulfiller => Err(MarketError::AlreadyAssigned {
                request,
                fulfiller: holder,
            }),
            _ => {
                entry.assigned = Some(fulfiller);
                self.by_fulfiller.insert(fulfiller, request);
                debug!(request = %request, fulfiller = %fulfiller, "Request assigned");
                Ok(())
            }
        }
    }

    /// Return the request `fulfiller` already holds, or find and assign the
    /// best one.
    pub fn claim_best(
        &mut self,
        fulfiller: AgentId,
        zone: ZoneId,
        position: Position,
        now: u64,
    ) -> Option<RequestId> {
        if let Some(&held) = self.by_fulfiller.get(&fulfiller) {
            return Some(held);
        }
        let best = self.find_best_request_for(fulfiller, zone, position, now)?;
        self.assign(best, fulfiller).ok()?;
        Some(best)
    }

    /// Drop the assignment held by `fulfiller`. The request stays open.
    pub fn release(&mut self, fulfiller: AgentId) -> Option<RequestId> {
        let id = self.by_fulfiller.remove(&fulfiller)?;
        if let Some(request) = self.requests.get_mut(&id)
            && request.assigned == Some(fulfiller)
        {
            request.assigned = None;
        }
        trace!(request = %id, fulfiller = %fulfiller, "Assignment released");
        Some(id)
    }

    /// Record `amount` energy delivered against `request`.
    ///
    /// Returns the amount still needed; a request that reaches zero is
    /// closed. Returns `None` if the request is not open.
    pub fn record_delivery(&mut self, request: RequestId, amount: u32) -> Option<u32> {
        let entry = self.requests.get_mut(&request)?;
        entry.amount = entry.amount.saturating_sub(amount);
        let remaining = entry.amount;
        if remaining == 0 {
            let requester = entry.requester;
            self.waiting_since.remove(&requester);
            self.remove(request);
            debug!(request = %request, requester = %requester, "Request fulfilled");
        }
        Some(remaining)
    }

    /// Remove every request whose preconditions no longer hold.
    ///
    /// Also drops fulfiller bindings that point at missing requests or at
    /// requests assigned to someone else.
    pub fn validate(&mut self, now: u64, view: &dyn MarketView) -> Vec<Invalidation> {
        let stale_after = self.config.stale_after;
        let doomed: Vec<Invalidation> = self
            .requests
            .values()
            .filter_map(|r| {
                let reason = if !view.requester_alive(r.requester) {
                    InvalidationReason::RequesterGone
                } else if view.need_satisfied(r) {
                    InvalidationReason::NeedSatisfied
                } else if r
                    .assigned
                    .is_some_and(|f| view.fulfiller_target(f) != Some(r.id))
                {
                    InvalidationReason::OrphanedAssignment
                } else if now.saturating_sub(r.created_at) > stale_after {
                    InvalidationReason::Stale
                } else {
                    return None;
                };
                Some(Invalidation {
                    request: r.id,
                    zone: r.zone,
                    requester: r.requester,
                    reason,
                })
            })
            .collect();

        for invalidation in &doomed {
            if let Some(removed) = self.remove(invalidation.request)
                && invalidation.reason.keeps_wait()
            {
                self.waiting_since
                    .insert(removed.requester, removed.wait_start);
            }
            debug!(
                request = %invalidation.request,
                requester = %invalidation.requester,
                reason = invalidation.reason.label(),
                "Request invalidated"
            );
        }

        let requests = &self.requests;
        self.by_fulfiller.retain(|fulfiller, id| {
            requests
                .get(id)
                .is_some_and(|r| r.assigned == Some(*fulfiller))
        });

        doomed
    }

    /// Forget everything about an agent that left the world.
    pub fn forget_agent(&mut self, agent: AgentId) {
        self.release(agent);
        self.clear_request(agent);
    }

    /// Smallest wait, in cycles, after which a request beats every fresh
    /// request whose priority is more urgent by `gap`, all else equal.
    ///
    /// Returns `None` when the gap is at least the wait cap: such a request
    /// is never promoted past a fresh one no matter how long it waits.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn starvation_bound(&self, gap: f64) -> Option<u64> {
        if gap < 0.0 {
            return Some(0);
        }
        if gap >= self.config.wait_cap || self.config.wait_rate <= 0.0 {
            return None;
        }
        let cycles = (gap / self.config.wait_rate).floor() as u64;
        Some(cycles.saturating_add(1))
    }

    /// An open request by id.
    pub fn request(&self, id: RequestId) -> Option<&ResourceRequest> {
        self.requests.get(&id)
    }

    /// The open request posted by `requester`.
    pub fn request_for(&self, requester: AgentId) -> Option<&ResourceRequest> {
        self.by_requester
            .get(&requester)
            .and_then(|id| self.requests.get(id))
    }

    /// The request `fulfiller` is assigned to.
    pub fn assignment_of(&self, fulfiller: AgentId) -> Option<RequestId> {
        self.by_fulfiller.get(&fulfiller).copied()
    }

    /// Open requests of one zone.
    pub fn open_in(&self, zone: ZoneId) -> impl Iterator<Item = &ResourceRequest> {
        self.requests.values().filter(move |r| r.zone == zone)
    }

    /// Every open request.
    pub fn requests(&self) -> impl Iterator<Item = &ResourceRequest> {
        self.requests.values()
    }

    /// Number of open requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether no request is open.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Take the requests removed since the last call.
    pub fn drain_closed(&mut self) -> Vec<(ZoneId, RequestId)> {
        std::mem::take(&mut self.closed)
    }

    /// Reload persisted requests.
    ///
    /// Duplicate requesters keep their first request; an assignment whose
    /// fulfiller already holds another request is dropped.
    pub fn restore(&mut self, requests: impl IntoIterator<Item = ResourceRequest>) {
        for mut request in requests {
            if self.by_requester.contains_key(&request.requester) {
                continue;
            }
            if let Some(fulfiller) = request.assigned {
                if self.by_fulfiller.contains_key(&fulfiller) {
                    request.assigned = None;
                } else {
                    self.by_fulfiller.insert(fulfiller, request.id);
                }
            }
            self.by_requester.insert(request.requester, request.id);
            self.requests.insert(request.id, request);
        }
        debug!(open = self.requests.len(), "Requests restored");
    }

    fn remove(&mut self, id: RequestId) -> Option<ResourceRequest> {
        let request = self.requests.remove(&id)?;
        if self.by_requester.get(&request.requester) == Some(&id) {
            self.by_requester.remove(&request.requester);
        }
        if let Some(fulfiller) = request.assigned
            && self.by_fulfiller.get(&fulfiller) == Some(&id)
        {
            self.by_fulfiller.remove(&fulfiller);
        }
        self.closed.push((request.zone, id));
        Some(request)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;

    /// View driven by explicit sets.
    #[derive(Default)]
    struct FakeView {
        dead: BTreeSet<AgentId>,
        satisfied: BTreeSet<AgentId>,
        targets: BTreeMap<AgentId, RequestId>,
    }

    impl MarketView for FakeView {
        fn requester_alive(&self, requester: AgentId) -> bool {
            !self.dead.contains(&requester)
        }

        fn need_satisfied(&self, request: &ResourceRequest) -> bool {
            self.satisfied.contains(&request.requester)
        }

        fn fulfiller_target(&self, fulfiller: AgentId) -> Option<RequestId> {
            self.targets.get(&fulfiller).copied()
        }
    }

    fn post(market: &mut RequestMarket, zone: ZoneId, priority: u32, now: u64) -> (AgentId, RequestId) {
        let requester = AgentId::new();
        let id = market.register_request(zone, requester, 50, priority, Position::new(5, 5), None, now);
        (requester, id)
    }

    #[test]
    fn old_low_priority_request_overtakes_fresh_urgent_one() {
        let mut market = RequestMarket::new(MarketConfig::default());
        let zone = ZoneId::new();
        let (_, old) = post(&mut market, zone, 50, 1000);
        let (_, fresh) = post(&mut market, zone, 20, 1049);
        let fulfiller = AgentId::new();
        let at = Position::new(5, 6);

        assert_eq!(market.find_best_request_for(fulfiller, zone, at, 1050), Some(old));
        assert_ne!(old, fresh);

        // Twenty cycles of waiting do not cover the 30-point gap.
        let mut early = RequestMarket::new(MarketConfig::default());
        post(&mut early, zone, 50, 1030);
        let (_, urgent) = post(&mut early, zone, 20, 1049);
        assert_eq!(early.find_best_request_for(fulfiller, zone, at, 1050), Some(urgent));
    }

    #[test]
    fn find_best_is_idempotent() {
        let mut market = RequestMarket::new(MarketConfig::default());
        let zone = ZoneId::new();
        for p in [30, 10, 10, 40] {
            post(&mut market, zone, p, 0);
        }
        let fulfiller = AgentId::new();
        let first = market.find_best_request_for(fulfiller, zone, Position::new(0, 0), 3);
        let second = market.find_best_request_for(fulfiller, zone, Position::new(0, 0), 3);
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn other_zones_are_invisible() {
        let mut market = RequestMarket::new(MarketConfig::default());
        post(&mut market, ZoneId::new(), 10, 0);
        let best = market.find_best_request_for(AgentId::new(), ZoneId::new(), Position::new(0, 0), 0);
        assert!(best.is_none());
    }

    #[test]
    fn single_assignment_holds() {
        let mut market = RequestMarket::new(MarketConfig::default());
        let zone = ZoneId::new();
        let (_, a) = post(&mut market, zone, 10, 0);
        let (_, b) = post(&mut market, zone, 20, 0);
        let first = AgentId::new();
        let second = AgentId::new();

        assert_eq!(market.claim_best(first, zone, Position::new(5, 5), 0), Some(a));
        assert_eq!(
            market.assign(a, second),
            Err(MarketError::AlreadyAssigned { request: a, fulfiller: first })
        );
        assert_eq!(
            market.assign(b, first),
            Err(MarketError::FulfillerBusy { fulfiller: first, request: a })
        );
        // The second fulfiller only sees what is left.
        assert_eq!(market.claim_best(second, zone, Position::new(5, 5), 0), Some(b));
        // Claiming again returns the held request.
        assert_eq!(market.claim_best(first, zone, Position::new(5, 5), 9), Some(a));

        let holders: BTreeSet<AgentId> = market.requests().filter_map(|r| r.assigned).collect();
        assert_eq!(holders.len(), 2);
    }

    #[test]
    fn re_registration_keeps_wait() {
        let mut market = RequestMarket::new(MarketConfig::default());
        let zone = ZoneId::new();
        let requester = AgentId::new();
        let id = market.register_request(zone, requester, 50, 30, Position::new(0, 0), None, 10);
        let again = market.register_request(zone, requester, 20, 25, Position::new(1, 0), None, 15);
        assert_eq!(id, again);
        let request = market.request(id).unwrap();
        assert_eq!(request.amount, 20);
        assert_eq!(request.priority, 25);
        assert_eq!(request.wait_start, 10);
        assert_eq!(market.len(), 1);
    }

    #[test]
    fn delivery_closes_request_when_complete() {
        let mut market = RequestMarket::new(MarketConfig::default());
        let zone = ZoneId::new();
        let (_, id) = post(&mut market, zone, 10, 0);
        let fulfiller = AgentId::new();
        market.assign(id, fulfiller).unwrap();

        assert_eq!(market.record_delivery(id, 30), Some(20));
        assert_eq!(market.record_delivery(id, 30), Some(0));
        assert!(market.request(id).is_none());
        assert!(market.assignment_of(fulfiller).is_none());
        assert_eq!(market.drain_closed(), vec![(zone, id)]);
        assert!(market.drain_closed().is_empty());
    }

    #[test]
    fn validate_applies_every_rule() {
        let mut market = RequestMarket::new(MarketConfig::default());
        let zone = ZoneId::new();
        let (dead, gone) = post(&mut market, zone, 10, 100);
        let (full, satisfied) = post(&mut market, zone, 10, 100);
        let (_, orphan) = post(&mut market, zone, 10, 100);
        let (_, stale) = post(&mut market, zone, 10, 40);
        let (_, healthy) = post(&mut market, zone, 10, 100);

        let wanderer = AgentId::new();
        let loyal = AgentId::new();
        market.assign(orphan, wanderer).unwrap();
        market.assign(healthy, loyal).unwrap();

        let mut view = FakeView::default();
        view.dead.insert(dead);
        view.satisfied.insert(full);
        view.targets.insert(loyal, healthy);

        let removed = market.validate(100, &view);
        let reasons: BTreeMap<RequestId, InvalidationReason> =
            removed.iter().map(|i| (i.request, i.reason)).collect();
        assert_eq!(reasons.get(&gone), Some(&InvalidationReason::RequesterGone));
        assert_eq!(reasons.get(&satisfied), Some(&InvalidationReason::NeedSatisfied));
        assert_eq!(reasons.get(&orphan), Some(&InvalidationReason::OrphanedAssignment));
        assert_eq!(reasons.get(&stale), Some(&InvalidationReason::Stale));
        assert_eq!(removed.len(), 4);

        assert_eq!(market.len(), 1);
        assert!(market.assignment_of(wanderer).is_none());
        assert_eq!(market.assignment_of(loyal), Some(healthy));
    }

    #[test]
    fn staleness_is_strict() {
        let mut market = RequestMarket::new(MarketConfig::default());
        let zone = ZoneId::new();
        post(&mut market, zone, 10, 0);
        let view = FakeView::default();
        assert!(market.validate(50, &view).is_empty());
        assert_eq!(market.validate(51, &view).len(), 1);
    }

    #[test]
    fn repaired_requester_inherits_wait() {
        let mut market = RequestMarket::new(MarketConfig::default());
        let zone = ZoneId::new();
        let requester = AgentId::new();
        market.register_request(zone, requester, 50, 30, Position::new(0, 0), None, 0);
        let view = FakeView::default();
        assert_eq!(market.validate(60, &view).len(), 1);

        let id = market.register_request(zone, requester, 50, 30, Position::new(0, 0), None, 61);
        let request = market.request(id).unwrap();
        assert_eq!(request.created_at, 61);
        assert_eq!(request.wait_start, 0);
    }

    #[test]
    fn cleared_requester_starts_over() {
        let mut market = RequestMarket::new(MarketConfig::default());
        let zone = ZoneId::new();
        let requester = AgentId::new();
        market.register_request(zone, requester, 50, 30, Position::new(0, 0), None, 0);
        assert!(market.clear_request(requester).is_some());
        let id = market.register_request(zone, requester, 50, 30, Position::new(0, 0), None, 20);
        assert_eq!(market.request(id).unwrap().wait_start, 20);
    }

    #[test]
    fn starving_request_is_eventually_matched() {
        // A rate that never produces an exact score tie.
        let config = MarketConfig {
            wait_rate: 0.7,
            ..MarketConfig::default()
        };
        let mut market = RequestMarket::new(config);
        let zone = ZoneId::new();
        let (_, starving) = post(&mut market, zone, 60, 0);
        let bound = market.starvation_bound(30.0).unwrap();
        assert_eq!(bound, 43);

        let fulfiller = AgentId::new();
        let mut matched_at = None;
        for now in 1..=bound {
            // A fresh, more urgent request arrives every cycle and the
            // winner of each cycle is served in full.
            post(&mut market, zone, 30, now);
            let best = market.claim_best(fulfiller, zone, Position::new(5, 5), now).unwrap();
            if best == starving {
                matched_at = Some(now);
                break;
            }
            market.record_delivery(best, 50);
        }
        assert_eq!(matched_at, Some(bound));
    }

    #[test]
    fn gap_beyond_cap_is_unbounded() {
        let market = RequestMarket::new(MarketConfig::default());
        assert!(market.starvation_bound(40.0).is_none());
        assert_eq!(market.starvation_bound(-5.0), Some(0));
    }

    #[test]
    fn restore_rebuilds_indexes() {
        let mut source = RequestMarket::new(MarketConfig::default());
        let zone = ZoneId::new();
        let (requester, id) = post(&mut source, zone, 10, 0);
        let fulfiller = AgentId::new();
        source.assign(id, fulfiller).unwrap();

        let mut restored = RequestMarket::new(MarketConfig::default());
        restored.restore(source.requests().cloned());
        assert_eq!(restored.request_for(requester).map(|r| r.id), Some(id));
        assert_eq!(restored.assignment_of(fulfiller), Some(id));
    }

    #[test]
    fn forget_agent_drops_both_roles() {
        let mut market = RequestMarket::new(MarketConfig::default());
        let zone = ZoneId::new();
        let (requester, id) = post(&mut market, zone, 10, 0);
        let (_, other) = post(&mut market, zone, 10, 0);
        let fulfiller = AgentId::new();
        market.assign(other, fulfiller).unwrap();

        market.forget_agent(requester);
        market.forget_agent(fulfiller);
        assert!(market.request(id).is_none());
        assert_eq!(market.request(other).unwrap().assigned, None);
    }
}
