//! Turns a single pick-up/put-down gesture into the steps that realise it.
//!
//! Only the gesture's own checker is followed: a candidate contributes a
//! prefix while each step starts where the previous one ended.

use log::debug;

use crate::types::{Point, Side, Step, TurnCandidate};

/// Walks the clean prefix of `candidate` starting at `from`, yielding the
/// steps while they keep moving the same checker.
fn clean_prefix(candidate: &[Step], from: Point) -> impl Iterator<Item = &Step> {
    let mut position = from;
    candidate.iter().take_while(move |step| {
        if step.from != position {
            return false;
        }
        position = step.to;
        true
    })
}

fn starts_at(candidate: &[Step], from: Point) -> bool {
    candidate.first().is_some_and(|step| step.from == from)
}

/// Returns the shortest clean prefix that carries the checker on `from` to
/// `to`, or `None` if no candidate allows it. Ties keep the first candidate.
pub fn resolve(from: Point, to: Point, candidates: &[TurnCandidate]) -> Option<Vec<Step>> {
    let mut best: Option<Vec<Step>> = None;

    for candidate in candidates.iter().filter(|c| starts_at(c, from)) {
        let mut prefix = Vec::new();
        let mut reached = false;
        for step in clean_prefix(candidate, from) {
            prefix.push(*step);
            if step.to == to {
                reached = true;
                break;
            }
        }

        if reached && best.as_ref().is_none_or(|b| prefix.len() < b.len()) {
            best = Some(prefix);
        }
    }

    match &best {
        Some(steps) => debug!("resolved {from} -> {to} as {steps:?}"),
        None => debug!("no clean prefix for {from} -> {to}"),
    }
    best
}

/// Distinct first-step origins, in the order the candidates list them.
pub fn movable_sources(candidates: &[TurnCandidate]) -> Vec<Point> {
    let mut sources = Vec::new();
    for step in candidates.iter().filter_map(|c| c.first()) {
        if !sources.contains(&step.from) {
            sources.push(step.from);
        }
    }
    sources
}

pub fn is_movable_source(point: Point, candidates: &[TurnCandidate]) -> bool {
    candidates.iter().any(|c| starts_at(c, point))
}

/// Every destination the checker on `from` can reach through a clean prefix.
pub fn reachable_destinations(from: Point, candidates: &[TurnCandidate]) -> Vec<Point> {
    let mut destinations = Vec::new();
    for candidate in candidates.iter().filter(|c| starts_at(c, from)) {
        for step in clean_prefix(candidate, from) {
            if !destinations.contains(&step.to) {
                destinations.push(step.to);
            }
        }
    }
    destinations
}

/// The first reachable bearing-off destination for `side`, used when the
/// gesture ends on a tray rather than a point.
pub fn bearing_off_target(from: Point, side: Side, candidates: &[TurnCandidate]) -> Option<Point> {
    reachable_destinations(from, candidates)
        .into_iter()
        .find(|&point| side.is_bearing_off(point))
}
