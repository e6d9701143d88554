//! Builders and upgraders: Refilling <-> Working.
//!
//! A consumer below its refill threshold posts a request to the market and
//! keeps it fresh every cycle until it is full again. While a transporter is
//! assigned to the request it holds position instead of fetching energy.

use colony_types::{Body, Entity, EntityRef, FactClass, Role, Site};

use super::{Action, StepContext, approach, idle_toward};
use crate::agent::{Agent, CachedTarget, ConsumerMemory, ConsumerState, RoleMemory};
use crate::error::AgentError;
use crate::targeting::{Search, TargetChoice, idle_position, select_target, zone_controller};

pub(super) fn step(agent: &mut Agent, body: &Body, ctx: &mut StepContext<'_>) -> Result<Action, AgentError> {
    let Agent {
        id,
        role,
        memory,
        search_ready_at,
        ..
    } = agent;
    let (id, role) = (*id, *role);
    let RoleMemory::Consumer(memory) = memory else {
        return Err(AgentError::MemoryMismatch { agent: id, role });
    };

    post_need(body, role, memory, ctx);

    match memory.state {
        ConsumerState::Refilling if body.is_full() => {
            memory.transition(ConsumerState::Working);
        }
        ConsumerState::Working if body.is_empty() => {
            memory.transition(ConsumerState::Refilling);
        }
        _ => {}
    }

    match memory.state {
        ConsumerState::Refilling => refill(body, role, memory, search_ready_at, ctx),
        ConsumerState::Working => work(body, role, memory, search_ready_at, ctx),
    }
}

/// Keep the market in sync with how much energy this consumer holds.
fn post_need(body: &Body, role: Role, memory: &mut ConsumerMemory, ctx: &mut StepContext<'_>) {
    if body.is_full() {
        if ctx.market.clear_request(body.id).is_some() {
            memory.request = None;
        }
        return;
    }
    if ctx.config.below_threshold(body)
        && let Some(priority) = ctx.config.request_priority(role)
    {
        let id = ctx.market.register_request(
            body.zone,
            body.id,
            body.free_capacity(),
            priority,
            body.position,
            memory.work_site,
            ctx.now,
        );
        memory.request = Some(id);
        return;
    }
    // Validation may have dropped the request since last cycle.
    memory.request = ctx.market.request_for(body.id).map(|r| r.id);
}

fn refill(
    body: &Body,
    role: Role,
    memory: &mut ConsumerMemory,
    search_ready_at: &mut u64,
    ctx: &mut StepContext<'_>,
) -> Result<Action, AgentError> {
    let delivery_coming = memory
        .request
        .and_then(|r| ctx.market.request(r))
        .is_some_and(|r| r.assigned.is_some());
    if delivery_coming {
        return Ok(Action::Waiting);
    }

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
            if !body.is_empty() {
                memory.transition(ConsumerState::Working);
                return work(body, role, memory, search_ready_at, ctx);
            }
            if memory.request.is_some() {
                return Ok(Action::Waiting);
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

fn work(
    body: &Body,
    role: Role,
    memory: &mut ConsumerMemory,
    search_ready_at: &mut u64,
    ctx: &mut StepContext<'_>,
) -> Result<Action, AgentError> {
    if role == Role::Builder {
        let any_site = |_: &Entity| true;
        let choice = select_target(
            &*ctx.world,
            ctx.cache,
            search_ready_at,
            body.position,
            memory.target.map(|t| t.target),
            &Search {
                zone: body.zone,
                class: FactClass::ConstructionSites,
                valid: &any_site,
                now: ctx.now,
                cooldown: ctx.config.search_cooldown,
            },
        );
        if let Some(Entity::Site(site)) = choice.into_entity() {
            memory.work_site = Some(site.id);
            memory.target = Some(CachedTarget::seen(EntityRef::Site(site.id), site.position));
            if let Some(action) = approach(ctx, body.id, body.position, site.position) {
                return Ok(action);
            }
            let spent = ctx.world.build(body.id, site.id)?;
            return Ok(Action::Built(spent));
        }
        // Nothing to build: help with the controller instead.
    }

    let Some(controller) = controller_of(body, ctx) else {
        memory.work_site = None;
        memory.target = None;
        let spot = idle_position(&*ctx.world, &*ctx.cache, body.zone, ctx.now);
        return Ok(idle_toward(ctx, body.id, body.position, spot));
    };
    memory.work_site = Some(controller.id);
    memory.target = Some(CachedTarget::seen(
        EntityRef::Site(controller.id),
        controller.position,
    ));
    if let Some(action) = approach(ctx, body.id, body.position, controller.position) {
        return Ok(action);
    }
    let spent = ctx.world.upgrade(body.id, controller.id)?;
    Ok(Action::Upgraded(spent))
}

fn controller_of(body: &Body, ctx: &StepContext<'_>) -> Option<Site> {
    let id = zone_controller(&*ctx.world, &*ctx.cache, body.zone, ctx.now)?;
    match ctx.world.resolve(EntityRef::Site(id)) {
        Some(Entity::Site(site)) => Some(site),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use colony_types::{Position, SiteKind};
    use colony_world::WorldQuery;

    use super::*;
    use crate::roles::tests::Harness;

    #[test]
    fn posts_a_request_below_threshold() {
        let mut h = Harness::new();
        let mut agent = h.spawn(Role::Builder, Position::new(0, 0), 50);

        let action = h.step(&mut agent).unwrap();
        assert_eq!(action, Action::Waiting);
        let request = h.market.request_for(agent.id).unwrap();
        assert_eq!(request.amount, 50);
        assert_eq!(request.priority, h.config.builder_priority);
    }

    #[test]
    fn refresh_keeps_a_single_request() {
        let mut h = Harness::new();
        let mut agent = h.spawn(Role::Upgrader, Position::new(0, 0), 50);
        h.run(&mut agent, 3);
        assert_eq!(h.market.len(), 1);
        assert_eq!(h.market.request_for(agent.id).unwrap().created_at, 1);
    }

    #[test]
    fn full_consumer_clears_its_request() {
        let mut h = Harness::new();
        let mut agent = h.spawn(Role::Builder, Position::new(0, 0), 50);
        h.step(&mut agent).unwrap();
        assert!(h.market.request_for(agent.id).is_some());

        h.world.set_carried(agent.id, 50);
        h.step(&mut agent).unwrap();
        assert!(h.market.request_for(agent.id).is_none());
        assert_eq!(agent.memory.state_label(), "working");
    }

    #[test]
    fn builder_spends_energy_on_construction() {
        let mut h = Harness::new();
        let site = h.world.add_site(h.zone, SiteKind::ConstructionSite, Position::new(0, 2), 0, 0, 100);
        let mut agent = h.spawn(Role::Builder, Position::new(0, 0), 50);
        h.world.set_carried(agent.id, 50);

        h.run(&mut agent, 1);
        assert_eq!(agent.memory.state_label(), "working");
        h.run(&mut agent, 1);
        assert_eq!(h.world.site(site).unwrap().progress, 5);
        assert_eq!(h.world.body(agent.id).unwrap().carried, 45);
    }

    #[test]
    fn builder_without_sites_upgrades() {
        let mut h = Harness::new();
        let controller = h.world.add_site(h.zone, SiteKind::Controller, Position::new(1, 1), 0, 0, 1_000);
        let mut agent = h.spawn(Role::Builder, Position::new(0, 0), 50);
        h.world.set_carried(agent.id, 50);

        let action = h.step(&mut agent).unwrap();
        assert_eq!(action, Action::Upgraded(1));
        assert_eq!(h.world.site(controller).unwrap().progress, 1);
    }

    #[test]
    fn waits_while_a_delivery_is_assigned() {
        let mut h = Harness::new();
        h.world.add_site(h.zone, SiteKind::Container, Position::new(5, 0), 500, 500, 0);
        let mut agent = h.spawn(Role::Upgrader, Position::new(0, 0), 50);
        h.step(&mut agent).unwrap();
        let request = h.market.request_for(agent.id).unwrap().id;
        let transporter = h.world.spawn_body(h.zone, Role::Transporter, Position::new(4, 4), 50, 1_000);
        h.market.assign(request, transporter).unwrap();

        let action = h.step(&mut agent).unwrap();
        assert_eq!(action, Action::Waiting);
        assert_eq!(h.world.body(agent.id).unwrap().carried, 0);
    }
}
