//! Gatherer: Seeking -> Extracting -> Delivering -> Seeking.
//!
//! A gatherer binds to one node through the assignment map and keeps that
//! binding across delivery trips. The binding is dropped when the node
//! vanishes or runs dry, and the gatherer re-matches in the same step.

use colony_types::{Body, Entity, EntityRef, FactClass, Position, ResourceNode, Role};

use super::{Action, StepContext, approach, idle_toward};
use crate::agent::{Agent, CachedTarget, GathererMemory, GathererState, RoleMemory};
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
    let RoleMemory::Gatherer(memory) = memory else {
        return Err(AgentError::MemoryMismatch {
            agent: id,
            role: Role::Gatherer,
        });
    };

    match memory.state {
        GathererState::Seeking | GathererState::Extracting if body.is_full() => {
            memory.transition(GathererState::Delivering);
        }
        GathererState::Delivering if body.is_empty() => {
            memory.transition(GathererState::Seeking);
        }
        _ => {}
    }

    match memory.state {
        GathererState::Seeking | GathererState::Extracting => {
            extract(body, memory, search_ready_at, ctx)
        }
        GathererState::Delivering => deliver(body, memory, search_ready_at, ctx),
    }
}

fn extract(
    body: &Body,
    memory: &mut GathererMemory,
    search_ready_at: &mut u64,
    ctx: &mut StepContext<'_>,
) -> Result<Action, AgentError> {
    let node = match bound_node(body, memory, search_ready_at, ctx) {
        Ok(node) => node,
        Err(spot) => {
            memory.transition(GathererState::Seeking);
            return Ok(idle_toward(ctx, body.id, body.position, spot));
        }
    };
    memory.transition(GathererState::Extracting);
    memory.target = Some(CachedTarget::seen(EntityRef::Node(node.id), node.position));

    if let Some(action) = approach(ctx, body.id, body.position, node.position) {
        return Ok(action);
    }
    let gained = ctx.world.harvest(body.id, node.id)?;
    Ok(Action::Harvested(gained))
}

/// The node this gatherer works, binding a new one if needed. On failure,
/// returns the idle spot picked by the cascade.
fn bound_node(
    body: &Body,
    memory: &GathererMemory,
    search_ready_at: &mut u64,
    ctx: &mut StepContext<'_>,
) -> Result<ResourceNode, Option<Position>> {
    if let Some(node_id) = ctx.assignments.node_of(body.id) {
        match ctx.world.resolve(EntityRef::Node(node_id)) {
            Some(Entity::Node(node)) if node.remaining > 0 => return Ok(node),
            _ => {
                ctx.assignments.unbind(body.id);
            }
        }
    }

    let assignments = &*ctx.assignments;
    let valid = |e: &Entity| matches!(e, Entity::Node(n) if assignments.has_room(n.id, n.slots));
    let choice = select_target(
        &*ctx.world,
        ctx.cache,
        search_ready_at,
        body.position,
        memory.target.map(|t| t.target),
        &Search {
            zone: body.zone,
            class: FactClass::ResourceNodes,
            valid: &valid,
            now: ctx.now,
            cooldown: ctx.config.search_cooldown,
        },
    );
    match choice {
        TargetChoice::Idle(spot) => Err(spot),
        other => match other.into_entity() {
            Some(Entity::Node(node)) if ctx.assignments.bind(body.id, node.id, node.slots) => Ok(node),
            _ => Err(None),
        },
    }
}

fn deliver(
    body: &Body,
    memory: &mut GathererMemory,
    search_ready_at: &mut u64,
    ctx: &mut StepContext<'_>,
) -> Result<Action, AgentError> {
    let any_sink = |_: &Entity| true;
    let choice = select_target(
        &*ctx.world,
        ctx.cache,
        search_ready_at,
        body.position,
        memory.target.map(|t| t.target),
        &Search {
            zone: body.zone,
            class: FactClass::EnergySinks,
            valid: &any_sink,
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
