use std::time::Duration;

use junction_scheduler::{
    Direction, EventKind, Junction, JunctionConfig, LaneConfig, LaneId, Step, SwitchReason,
    ThresholdPolicy, VehicleClass, VehicleId, VehicleType,
};

use crate::types::{
    count, departures, observe, observe_many, phase_changes, quiet_lanes, secs, timeline,
};

const NS: Duration = Duration::from_nanos(1);

/// Given an active lane with no arrivals of its own
/// When its last vehicle departs
/// Then LANE_EMPTY and the switch happen at the same instant
#[test]
fn lane_empty_switches_without_idling() {
    let config = JunctionConfig::builder().lanes(quiet_lanes(2)).build();
    let mut junction = Junction::new(config).unwrap();

    observe(&mut junction, 0, VehicleType::Car, Duration::ZERO);
    observe(&mut junction, 1, VehicleType::Car, Duration::ZERO);

    assert_eq!(junction.run().unwrap(), Step::Drained);

    assert_eq!(
        timeline(junction.events()),
        vec![
            (secs(0), 0, "ARRIVAL"),
            (secs(0), 1, "ARRIVAL"),
            (secs(2), 0, "DEPARTURE"),
            (secs(2), 0, "LANE_EMPTY"),
            (secs(2), 1, "PHASE_CHANGE"),
            (secs(4), 1, "DEPARTURE"),
            (secs(4), 1, "LANE_EMPTY"),
        ]
    );
    assert_eq!(
        phase_changes(junction.events()),
        vec![(secs(2), LaneId(0), LaneId(1), SwitchReason::LaneEmpty)]
    );
}

/// Given a junction that starts on an empty lane
/// When a vehicle arrives on another lane
/// Then the idle lane reports LANE_EMPTY before handing over
#[test]
fn idle_initial_lane_reports_empty_before_switching() {
    let config = JunctionConfig::builder().lanes(quiet_lanes(2)).build();
    let mut junction = Junction::new(config).unwrap();

    observe(&mut junction, 1, VehicleType::Car, secs(1));

    assert_eq!(junction.run().unwrap(), Step::Drained);
    assert_eq!(
        timeline(junction.events()),
        vec![
            (secs(1), 1, "ARRIVAL"),
            (secs(1), 0, "LANE_EMPTY"),
            (secs(1), 1, "PHASE_CHANGE"),
            (secs(3), 1, "DEPARTURE"),
            (secs(3), 1, "LANE_EMPTY"),
        ]
    );
}

/// An emptied lane with nobody waiting keeps right-of-way, and reports LANE_EMPTY only once.
#[test]
fn lane_empty_is_reported_once_per_idle_spell() {
    let config = JunctionConfig::builder().lanes(quiet_lanes(2)).build();
    let mut junction = Junction::new(config).unwrap();

    observe(&mut junction, 0, VehicleType::Car, Duration::ZERO);
    observe(&mut junction, 1, VehicleType::Car, secs(10));

    assert_eq!(junction.run().unwrap(), Step::Drained);
    assert_eq!(
        timeline(junction.events()),
        vec![
            (secs(0), 0, "ARRIVAL"),
            (secs(2), 0, "DEPARTURE"),
            (secs(2), 0, "LANE_EMPTY"),
            (secs(10), 1, "ARRIVAL"),
            (secs(10), 1, "PHASE_CHANGE"),
            (secs(12), 1, "DEPARTURE"),
            (secs(12), 1, "LANE_EMPTY"),
        ]
    );
}

#[test]
fn configured_discharge_durations_are_used() {
    let config = JunctionConfig::builder()
        .lanes(quiet_lanes(1))
        .vehicle_mix(vec![
            VehicleClass::new(VehicleType::Car, 1.0).with_discharge_duration(secs(5))
        ])
        .build();
    let mut junction = Junction::new(config).unwrap();

    observe_many(&mut junction, 0, VehicleType::Car, 2, Duration::ZERO);
    junction.run().unwrap();

    assert_eq!(
        departures(junction.events(), LaneId(0)),
        vec![(secs(5), VehicleId(0)), (secs(10), VehicleId(1))]
    );
}

/// A max_wait_time too large to add to a timestamp never fires.
#[test]
fn unreachable_max_wait_time_never_starves() {
    let config = JunctionConfig::builder()
        .lanes(quiet_lanes(2))
        .max_wait_time(Duration::MAX)
        .build();
    let mut junction = Junction::new(config).unwrap();

    observe_many(&mut junction, 0, VehicleType::Truck, 3, Duration::ZERO);
    observe(&mut junction, 1, VehicleType::Car, Duration::ZERO);
    junction.run_until(secs(5)).unwrap();

    assert!(phase_changes(junction.events()).is_empty());
    assert_eq!(
        departures(junction.events(), LaneId(0)),
        vec![(secs(4), VehicleId(0))]
    );

    assert_eq!(junction.run().unwrap(), Step::Drained);
    assert_eq!(
        phase_changes(junction.events()),
        vec![(secs(12), LaneId(0), LaneId(1), SwitchReason::LaneEmpty)]
    );
}

#[test]
fn unreachable_max_green_time_never_expires() {
    let config = JunctionConfig::builder()
        .lanes(quiet_lanes(2))
        .max_green_time(Duration::MAX)
        .start_time(secs(10))
        .build();
    let mut junction = Junction::new(config).unwrap();
    assert_eq!(junction.next_event_time(), None);

    observe(&mut junction, 0, VehicleType::Truck, secs(10));
    observe(&mut junction, 1, VehicleType::Car, secs(10));

    assert_eq!(junction.run().unwrap(), Step::Drained);
    assert_eq!(
        phase_changes(junction.events()),
        vec![(secs(14), LaneId(0), LaneId(1), SwitchReason::LaneEmpty)]
    );
}

/// Given a busy active lane and a waiting lane
/// When the waiting lane's head passes max_wait_time
/// Then it takes over, and the preempted head keeps its place
#[test]
fn starvation_preempts_and_the_head_survives() {
    let config = JunctionConfig::builder()
        .lanes(quiet_lanes(2))
        .max_wait_time(secs(10))
        .build();
    let mut junction = Junction::new(config).unwrap();

    observe_many(&mut junction, 0, VehicleType::Truck, 5, Duration::ZERO);
    observe_many(&mut junction, 1, VehicleType::Truck, 2, Duration::ZERO);

    let handback = secs(18) + NS;
    junction.run_until(handback).unwrap();

    // Lane 0 was preempted while vehicle 2 was its head. It is still the head, and its wait
    // restarted when the lane got right-of-way back.
    let lane = junction.lane(LaneId(0)).unwrap();
    assert_eq!(junction.signal().active_lane, LaneId(0));
    assert_eq!(lane.head().unwrap().id, VehicleId(2));
    assert_eq!(lane.head_wait_start(), Some(handback));

    assert_eq!(junction.run().unwrap(), Step::Drained);
    let events = junction.events();

    assert_eq!(
        phase_changes(events),
        vec![
            (secs(10) + NS, LaneId(0), LaneId(1), SwitchReason::Starvation),
            (handback, LaneId(1), LaneId(0), SwitchReason::Starvation),
        ]
    );

    let forced: Vec<_> = events
        .iter()
        .filter_map(|event| match event.kind {
            EventKind::StarvationForced { wait_time } => Some((event.lane, wait_time)),
            _ => None,
        })
        .collect();
    assert_eq!(
        forced,
        vec![(LaneId(1), secs(10) + NS), (LaneId(0), secs(10) + NS)]
    );

    // Vehicle 2's departure at 12s belonged to the preempted phase.
    assert_eq!(count(events, "STALE_DEPARTURE"), 1);

    assert_eq!(
        departures(events, LaneId(0)),
        vec![
            (secs(4), VehicleId(0)),
            (secs(8), VehicleId(1)),
            (secs(22) + NS, VehicleId(2)),
            (secs(26) + NS, VehicleId(3)),
            (secs(30) + NS, VehicleId(4)),
        ]
    );
    assert_eq!(
        departures(events, LaneId(1)),
        vec![(secs(14) + NS, VehicleId(5)), (handback, VehicleId(6))]
    );
}

/// Given a heavy northbound lane and a light southbound lane
/// When the junction runs for ten minutes
/// Then South is force-switched, and never waits past max_wait_time
#[test]
fn light_lane_is_never_starved() {
    let max_wait_time = secs(10);
    let config = JunctionConfig::builder()
        .lanes(vec![
            LaneConfig::new(0, Direction::North, 30.0),
            LaneConfig::new(1, Direction::South, 2.0),
        ])
        .max_wait_time(max_wait_time)
        .random_seed(7)
        .horizon(secs(600))
        .build();
    let mut junction = Junction::new(config).unwrap();

    while let Step::Dispatched(_) = junction.advance().unwrap() {
        let now = junction.now();
        let active = junction.signal().active_lane;
        for lane in junction.lanes().filter(|lane| lane.id() != active) {
            assert!(
                lane.wait_time(now) <= max_wait_time,
                "lane {} waited {:?} at {:?}",
                lane.id(),
                lane.wait_time(now),
                now
            );
        }
    }

    let forced: Vec<_> = junction
        .events()
        .iter()
        .filter_map(|event| match event.kind {
            EventKind::StarvationForced { wait_time } if event.lane == LaneId(1) => {
                Some(wait_time)
            }
            _ => None,
        })
        .collect();
    assert!(!forced.is_empty(), "South should be force-switched");
    for wait in forced {
        assert!(wait > max_wait_time);
        assert!(wait <= max_wait_time + Duration::from_millis(1));
    }
}

fn queue_after_a_minute(vehicle_type: VehicleType) -> usize {
    let config = JunctionConfig::builder()
        .lanes(vec![LaneConfig::new(0, Direction::North, 40.0)])
        .vehicle_mix(VehicleClass::only(vehicle_type))
        .random_seed(11)
        .build();
    let mut junction = Junction::new(config).unwrap();
    junction.run_until(secs(60)).unwrap();
    junction.lane(LaneId(0)).unwrap().queue_length()
}

/// Given one lane and identical arrivals
/// When every vehicle is a truck rather than a bike
/// Then the queue is much longer after a minute
#[test]
fn slow_vehicles_build_longer_queues() {
    let trucks = queue_after_a_minute(VehicleType::Truck);
    let bikes = queue_after_a_minute(VehicleType::Bike);

    assert!(trucks >= 10, "trucks: {trucks}");
    assert!(trucks > bikes * 2, "trucks: {trucks}, bikes: {bikes}");
}

fn threshold_junction(policy: ThresholdPolicy, min_green_time: Duration) -> Junction {
    let config = JunctionConfig::builder()
        .lanes(quiet_lanes(2))
        .queue_threshold(3)
        .threshold_policy(policy)
        .min_green_time(min_green_time)
        .build();
    let mut junction = Junction::new(config).unwrap();

    observe_many(&mut junction, 0, VehicleType::Truck, 10, Duration::ZERO);
    for at in 1..=5 {
        observe(&mut junction, 1, VehicleType::Car, secs(at));
    }
    junction
}

/// Given a waiting lane that grows past the threshold
/// When the policy is advisory only
/// Then the advisory is emitted once and right-of-way only moves when the active lane empties
#[test]
fn threshold_advisory_only() {
    let mut junction = threshold_junction(ThresholdPolicy::AdvisoryOnly, Duration::ZERO);
    junction.run().unwrap();
    let events = junction.events();

    let advisories: Vec<_> = events
        .iter()
        .filter_map(|event| match event.kind {
            EventKind::QueueThresholdExceeded {
                queue_length,
                threshold,
            } => Some((event.timestamp, event.lane, queue_length, threshold)),
            _ => None,
        })
        .collect();
    assert_eq!(advisories, vec![(secs(4), LaneId(1), 4, 3)]);

    assert_eq!(
        phase_changes(events),
        vec![(secs(40), LaneId(0), LaneId(1), SwitchReason::LaneEmpty)]
    );
}

/// Given a waiting lane over the threshold
/// When it outscores the active lane
/// Then it takes over
#[test]
fn threshold_with_score_override() {
    let mut junction = threshold_junction(ThresholdPolicy::ScoreOverride, Duration::ZERO);
    junction.run_until(secs(9)).unwrap();

    assert_eq!(
        phase_changes(junction.events()),
        vec![(secs(8), LaneId(0), LaneId(1), SwitchReason::QueueThreshold)]
    );
}

#[test]
fn threshold_force_switch() {
    let mut junction = threshold_junction(ThresholdPolicy::ForceSwitch, Duration::ZERO);
    junction.run_until(secs(4)).unwrap();

    assert_eq!(
        phase_changes(junction.events()),
        vec![(secs(4), LaneId(0), LaneId(1), SwitchReason::QueueThreshold)]
    );
}

/// Given a minimum green time
/// When a waiting lane crosses the threshold early in the phase
/// Then the switch waits for the minimum green time to pass
#[test]
fn min_green_holds_threshold_switches() {
    let mut junction = threshold_junction(ThresholdPolicy::ForceSwitch, secs(6));
    junction.run_until(secs(9)).unwrap();

    assert_eq!(
        phase_changes(junction.events()),
        vec![(secs(8), LaneId(0), LaneId(1), SwitchReason::QueueThreshold)]
    );
}

#[test]
fn max_green_hands_over() {
    let config = JunctionConfig::builder()
        .lanes(quiet_lanes(2))
        .max_wait_time(secs(1000))
        .max_green_time(secs(10))
        .build();
    let mut junction = Junction::new(config).unwrap();

    observe_many(&mut junction, 0, VehicleType::Truck, 10, Duration::ZERO);
    observe(&mut junction, 1, VehicleType::Car, Duration::ZERO);

    assert_eq!(junction.run().unwrap(), Step::Drained);
    let events = junction.events();

    assert_eq!(
        phase_changes(events),
        vec![
            (secs(10), LaneId(0), LaneId(1), SwitchReason::MaxGreenExpired),
            (secs(12), LaneId(1), LaneId(0), SwitchReason::LaneEmpty),
        ]
    );
    assert_eq!(departures(events, LaneId(0)).len(), 10);
}

#[test]
fn starts_on_the_configured_lane() {
    let config = JunctionConfig::builder()
        .lanes(quiet_lanes(4))
        .initial_lane(LaneId(2))
        .start_time(secs(100))
        .build();
    let junction = Junction::new(config).unwrap();

    assert_eq!(junction.signal().active_lane, LaneId(2));
    assert_eq!(junction.signal().phase_since, secs(100));
    assert_eq!(junction.now(), secs(100));
}

#[test]
fn stops_at_the_horizon() {
    let mut config = JunctionConfig::default();
    config.horizon = Some(secs(30));
    let mut junction = Junction::new(config).unwrap();

    assert_eq!(junction.run().unwrap(), Step::HorizonReached);
    assert!(junction.now() <= secs(30));
    assert!(junction.next_event_time().unwrap() > secs(30));
    assert!(junction
        .events()
        .iter()
        .all(|event| event.timestamp <= secs(30)));

    // Stays put.
    assert_eq!(junction.advance().unwrap(), Step::HorizonReached);
}
