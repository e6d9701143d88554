//! Transporter: Collecting <-> Delivering.
//!
//! While delivering, a transporter serves the best open request of its zone
//! through the market and falls back to refilling sinks when no request is
//! open. Its assignment is released whenever it goes back to collecting.

use colony_types::{Body, Entity, EntityRef, FactClass, Role};
use tracing::trace;

use super::{Action, StepContext, approach, idle_toward};
use crate::agent::{Agent, CachedTarget, RoleMemory, TransporterMemory, TransporterState};
use crate::error::AgentError;
use crate::targeting::{Search, TargetChoice, select_target};

pub(super) fn step(agent: &mut Agent, body: &Body, ctx: &mut StepContext<'_>) -> Result<Action, AgentError> {
    let Agent {
        id,
        memory,
        search_ready_at,
        ..
    } = agent;
    let id = *id;
    let RoleMemory::Transporter(memory) = memory else {
        return Err(AgentError::MemoryMismatch {
            agent: id,
            role: Role::Transporter,
        });
    };

    match memory.state {
        TransporterState::Collecting if body.is_full() => {
            memory.transition(TransporterState::Delivering);
        }
        TransporterState::Delivering if body.is_empty() => {
            stop_serving(memory, ctx, id);
            memory.transition(TransporterState::Collecting);
        }
        _ => {}
    }

    match memory.state {
        TransporterState::Collecting => collect(body, memory, search_ready_at, ctx),
        TransporterState::Delivering => deliver(body, memory, search_ready_at, ctx),
    }
}

fn stop_serving(memory: &mut TransporterMemory, ctx: &mut StepContext<'_>, id: colony_types::AgentId) {
    if memory.request.take().is_some() {
        ctx.market.release(id);
    }
}

fn collect(
    body: &Body,
    memory: &mut TransporterMemory,
    search_ready_at: &mut u64,
    ctx: &mut StepContext<'_>,
) -> Result<Action, AgentError> {
    let any_source = |_: &Entity| true;
    let choice = select_target(
        &*ctx.world,
        ctx.cache,
        search_ready_at,
        body.position,
        memory.target.map(|t| t.target),
        &Search {
            zone: body.zone,
            class: FactClass::EnergySources,
            valid: &any_source,
            now: ctx.now,
            cooldown: ctx.config.search_cooldown,
        },
    );
    let site = match choice {
        TargetChoice::Idle(spot) => {
            memory.target = None;
            // Part-loaded with nothing left to collect: go deliver what we have.
            if !body.is_empty() {
                memory.transition(TransporterState::Delivering);
                return deliver(body, memory, search_ready_at, ctx);
            }
            return Ok(idle_toward(ctx, body.id, body.position, spot));
        }
        other => match other.into_entity() {
            Some(Entity::Site(site)) => site,
            _ => return Ok(Action::Idle),
        },
    };
    memory.target = Some(CachedTarget::seen(EntityRef::Site(site.id), site.position));

    if let Some(action) = approach(ctx, body.id, body.position, site.position) {
        return Ok(action);
    }
    let taken = ctx.world.withdraw(body.id, site.id, body.free_capacity())?;
    Ok(Action::Withdrew(taken))
}

fn deliver(
    body: &Body,
    memory: &mut TransporterMemory,
    search_ready_at: &mut u64,
    ctx: &mut StepContext<'_>,
) -> Result<Action, AgentError> {
    memory.request = ctx.market.claim_best(body.id, body.zone, body.position, ctx.now);

    if let Some(request_id) = memory.request {
        let requester = ctx
            .market
            .request(request_id)
            .map(|r| (r.requester, r.amount));
        let live = requester.and_then(|(who, amount)| ctx.world.body(who).map(|b| (b, amount)));
        match live {
            Some((target, amount)) => {
                memory.target = Some(CachedTarget::seen(EntityRef::Agent(target.id), target.position));
                if let Some(action) = approach(ctx, body.id, body.position, target.position) {
                    return Ok(action);
                }
                let moved = ctx.world.transfer(
                    body.id,
                    EntityRef::Agent(target.id),
                    body.carried.min(amount),
                )?;
                if ctx.market.record_delivery(request_id, moved) == Some(0) {
                    memory.request = None;
                    memory.target = None;
                }
                return Ok(Action::Transferred(moved));
            }
            None => {
                // Requester is gone; validation removes the request next cycle.
                trace!(agent_id = %body.id, request = %request_id, "Requester vanished, dropping assignment");
                stop_serving(memory, ctx, body.id);
                memory.target = None;
            }
        }
    }

    // No request to serve: top up sinks that are not themselves sources.
    let not_a_source = |e: &Entity| matches!(e, Entity::Site(s) if !s.kind.provides_energy());
    let cached = memory
        .target
        .map(|t| t.target)
        .filter(|t| matches!(t, EntityRef::Site(_)));
    let choice = select_target(
        &*ctx.world,
        ctx.cache,
        search_ready_at,
        body.position,
        cached,
        &Search {
            zone: body.zone,
            class: FactClass::EnergySinks,
            valid: &not_a_source,
            now: ctx.now,
            cooldown: ctx.config.search_cooldown,
        },
    );
    let site = match choice {
        TargetChoice::Idle(spot) => {
            memory.target = None;
            return Ok(idle_toward(ctx, body.id, body.position, spot));
        }
        other => match other.into_entity() {
            Some(Entity::Site(site)) => site,
            _ => return Ok(Action::Idle),
        },
    };
    memory.target = Some(CachedTarget::seen(EntityRef::Site(site.id), site.position));

    if let Some(action) = approach(ctx, body.id, body.position, site.position) {
        return Ok(action);
    }
    let moved = ctx
        .world
        .transfer(body.id, EntityRef::Site(site.id), body.carried)?;
    Ok(Action::Transferred(moved))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use colony_types::{Position, SiteKind};
    use colony_world::WorldQuery;

    use super::*;
    use crate::roles::tests::Harness;

    #[test]
    fn collects_then_serves_a_request() {
        let mut h = Harness::new();
        h.world.add_site(h.zone, SiteKind::Container, Position::new(2, 0), 500, 500, 0);
        let builder = h.world.spawn_body(h.zone, Role::Builder, Position::new(0, 4), 50, 1_000);
        let request = h.market.register_request(h.zone, builder, 50, 30, Position::new(0, 4), None, 0);
        let mut agent = h.spawn(Role::Transporter, Position::new(0, 0), 50);

        // Move next to the container and fill up in one withdraw.
        h.run(&mut agent, 2);
        assert_eq!(h.world.body(agent.id).unwrap().carried, 50);

        h.run(&mut agent, 1);
        assert_eq!(agent.memory.state_label(), "delivering");
        assert_eq!(agent.memory.serving(), Some(request));
        assert_eq!(h.market.assignment_of(agent.id), Some(request));

        h.run(&mut agent, 6);
        assert_eq!(h.world.body(builder).unwrap().carried, 50);
        assert!(h.market.request(request).is_none());
    }

    #[test]
    fn without_requests_it_fills_sinks_not_sources() {
        let mut h = Harness::new();
        let container = h.world.add_site(h.zone, SiteKind::Container, Position::new(1, 0), 0, 500, 0);
        let extension = h.world.add_site(h.zone, SiteKind::Extension, Position::new(0, 3), 0, 50, 0);
        let mut agent = h.spawn(Role::Transporter, Position::new(0, 0), 50);
        h.world.set_carried(agent.id, 50);

        h.run(&mut agent, 4);
        assert_eq!(h.world.site(extension).unwrap().stored, 50);
        assert_eq!(h.world.site(container).unwrap().stored, 0);
    }

    #[test]
    fn emptying_releases_the_assignment() {
        let mut h = Harness::new();
        let builder = h.world.spawn_body(h.zone, Role::Builder, Position::new(0, 1), 50, 1_000);
        let request = h.market.register_request(h.zone, builder, 50, 30, Position::new(0, 1), None, 0);
        let mut agent = h.spawn(Role::Transporter, Position::new(0, 0), 20);
        h.world.set_carried(agent.id, 20);

        h.run(&mut agent, 1);
        assert_eq!(h.world.body(builder).unwrap().carried, 20);
        assert_eq!(h.market.request(request).map(|r| r.amount), Some(30));

        h.run(&mut agent, 1);
        assert_eq!(agent.memory.state_label(), "collecting");
        assert!(h.market.assignment_of(agent.id).is_none());
        assert_eq!(h.market.request(request).and_then(|r| r.assigned), None);
    }
}
