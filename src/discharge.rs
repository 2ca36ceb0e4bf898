//! Vehicles leaving the head of the active lane.
//!
//! Only the active lane discharges. Each departure is scheduled when its vehicle becomes the head
//! of the active lane, and is tagged with the phase it was scheduled in. A lane that is preempted
//! simply stops discharging: its pending departure is recognised as stale when it is dispatched.

use tracing::debug;

use crate::{
    clock::Clock,
    junction::{Phase, Scheduled},
    lane::Lane,
    vehicle::{Vehicle, VehicleId},
};

/// Outcome of dispatching a departure.
#[derive(Debug)]
pub(crate) enum Departure {
    /// The head cleared the junction.
    Departed {
        vehicle: Vehicle,
        /// Whether the lane is now empty.
        drained: bool,
    },
    /// The departure belongs to an earlier phase or a vehicle that is no longer the head.
    Stale,
}

/// Start discharging `lane`'s head, if it has one.
pub(crate) fn begin(lane: &Lane, clock: &mut Clock<Scheduled>, phase: Phase) {
    if let Some(head) = lane.head() {
        clock.schedule_after(
            head.discharge_duration,
            Scheduled::Departure {
                lane: lane.id(),
                vehicle: head.id,
                phase,
            },
        );
    }
}

/// Dispatch a departure scheduled in `scheduled_in` for `vehicle`.
///
/// Rechecks that the phase is still current and the vehicle is still the head before acting, then
/// schedules the next departure for the new head.
pub(crate) fn complete(
    lane: &mut Lane,
    clock: &mut Clock<Scheduled>,
    vehicle: VehicleId,
    scheduled_in: Phase,
    current: Phase,
) -> Departure {
    let is_head = lane.head().map(|head| head.id) == Some(vehicle);
    if scheduled_in != current || !is_head {
        debug!(
            lane = lane.id().0,
            vehicle = vehicle.0,
            "Ignoring stale departure"
        );
        return Departure::Stale;
    }

    let now = clock.now();
    let Some(departed) = lane.pop_head(now) else {
        return Departure::Stale;
    };

    begin(lane, clock, current);

    Departure::Departed {
        vehicle: departed,
        drained: lane.is_empty(),
    }
}
