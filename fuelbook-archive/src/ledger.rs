//! Inherited carry-over bookkeeping between partial and full fill-ups.
//!
//! A partial fill-up passes its own cost, distance and volume (plus whatever
//! it inherited) on to the next event. A full fill-up absorbs that carry and
//! ends the chain. Inserting or removing an event therefore changes the
//! inherited values of every younger event up to and including the next full
//! fill-up; with no full fill-up ahead the change runs to the end of history.

use fuelbook_core::{Carry, FuelEvent};

use crate::error::{ArchiveError, ArchiveResult};

fn overflow() -> ArchiveError {
    ArchiveError::InvalidInput("carried cost, distance or fuel volume overflows".to_string())
}

fn contribution(event: &FuelEvent) -> ArchiveResult<Carry> {
    event.contribution().ok_or_else(overflow)
}

/// Carry a new event at this position inherits from its nearest older neighbour.
pub fn inherited_from(older: Option<&FuelEvent>) -> ArchiveResult<Carry> {
    match older {
        Some(event) if !event.filled_up => contribution(event)?
            .checked_add(event.inherited())
            .ok_or_else(overflow),
        _ => Ok(Carry::ZERO),
    }
}

/// Delta applied to younger events once `event` has been inserted.
///
/// A full fill-up cuts the chain, so younger events lose what it inherited;
/// a partial one pushes its own contribution forward.
pub fn insertion_delta(event: &FuelEvent) -> ArchiveResult<Carry> {
    if event.filled_up {
        Ok(-event.inherited())
    } else {
        contribution(event)
    }
}

/// Delta applied to younger events once `event` has been removed.
///
/// Returns `None` when nothing needs to move: a removed full fill-up that
/// inherited nothing leaves the chain after it unchanged.
pub fn removal_delta(event: &FuelEvent) -> ArchiveResult<Option<Carry>> {
    if event.filled_up {
        let inherited = event.inherited();
        Ok(inherited.has_positive().then_some(inherited))
    } else {
        Ok(Some(-contribution(event)?))
    }
}

/// Apply `delta` to `younger` (nearest first), clamping at zero and stopping
/// after the first full fill-up. Returns the events that were touched.
///
/// On overflow nothing is modified.
pub fn propagate<'a>(
    younger: &'a mut [FuelEvent],
    delta: Carry,
) -> ArchiveResult<&'a mut [FuelEvent]> {
    let reach = younger
        .iter()
        .position(|event| event.filled_up)
        .map_or(younger.len(), |index| index + 1);
    let touched = &mut younger[..reach];
    let updated = touched
        .iter()
        .map(|event| event.inherited().checked_add_clamped(delta).ok_or_else(overflow))
        .collect::<ArchiveResult<Vec<_>>>()?;
    for (event, carry) in touched.iter_mut().zip(updated) {
        event.set_inherited(carry);
    }
    Ok(touched)
}
