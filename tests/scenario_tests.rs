use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use parking_sim::simulation::{
    DriverClass, DriverId, DriverState, EvictionPolicy, MemoryExporter, ParkingConfig,
    PricingConfig, PricingStrategy, ReservationConfig, SimWorld, SpaceId, BASE_RATE_PER_MINUTE,
};

/// One bay, entry gate on the checkpoint, no random arrivals
fn single_bay_config() -> ParkingConfig {
    ParkingConfig {
        width: 7,
        height: 2,
        n_spaces: 1,
        arrival_intensity: 0.0,
        seed: Some(7),
        ..Default::default()
    }
}

/// Eight bays, no random arrivals
fn small_lot_config() -> ParkingConfig {
    ParkingConfig {
        width: 10,
        height: 5,
        n_spaces: 4,
        arrival_intensity: 0.0,
        seed: Some(11),
        ..Default::default()
    }
}

fn with_reservations(mut config: ParkingConfig, reservations: ReservationConfig) -> ParkingConfig {
    config.pricing.strategy = PricingStrategy::Reservations;
    config.reservations = ReservationConfig {
        fraction: 0.0,
        ..reservations
    };
    config
}

fn state_of(world: &SimWorld, id: DriverId) -> Option<DriverState> {
    world.driver(id).map(|d| d.state)
}

fn tick_until(world: &mut SimWorld, max_ticks: u32, mut done: impl FnMut(&SimWorld) -> bool) {
    for _ in 0..max_ticks {
        if done(world) {
            return;
        }
        world.tick();
    }
    assert!(done(world), "condition not reached within {} ticks", max_ticks);
}

fn only_space(world: &SimWorld) -> SpaceId {
    world.spaces().spaces()[0].id
}

#[test]
fn test_single_bay_second_driver_waits_for_first() {
    let mut world = SimWorld::new(single_bay_config()).unwrap();
    let bay = only_space(&world);

    let a = world.spawn_driver(DriverClass::General, 5).unwrap();
    world.tick();
    let b = world.spawn_driver(DriverClass::General, 5).unwrap();
    world.tick();
    assert_eq!(state_of(&world, a), Some(DriverState::DrivingToSpot));
    assert_eq!(world.driver(a).unwrap().target_space_id, Some(bay));

    world.tick();
    assert_eq!(state_of(&world, b), Some(DriverState::WaitingAtGate));

    // B never gets the bay while A still has it
    tick_until(&mut world, 50, |w| {
        let space = w.spaces().get(bay).unwrap();
        if space.claimed_by == Some(a) {
            assert_eq!(state_of(w, b), Some(DriverState::WaitingAtGate));
            assert_eq!(w.driver(b).unwrap().target_space_id, None);
        }
        space.claimed_by != Some(a)
    });

    // B commits on its first activation after A drives off the bay
    if state_of(&world, b) != Some(DriverState::DrivingToSpot) {
        world.tick();
    }
    assert_eq!(state_of(&world, b), Some(DriverState::DrivingToSpot));
    assert_eq!(world.driver(b).unwrap().target_space_id, Some(bay));

    tick_until(&mut world, 20, |w| state_of(w, b) == Some(DriverState::Parked));
    let space = world.spaces().get(bay).unwrap();
    assert_eq!(space.occupant_id, Some(b));
    assert_eq!(world.driver(b).unwrap().current_space_id, Some(bay));

    tick_until(&mut world, 20, |w| w.driver(a).is_none());
    assert_eq!(world.counters.parked_count, 2);
}

#[test]
fn test_dwell_counts_down_exactly() {
    let mut world = SimWorld::new(small_lot_config()).unwrap();
    let id = world.spawn_driver(DriverClass::General, 7).unwrap();

    tick_until(&mut world, 30, |w| state_of(w, id) == Some(DriverState::Parked));
    let space = world.driver(id).unwrap().current_space_id.unwrap();

    let mut parked_ticks = 0;
    while state_of(&world, id) == Some(DriverState::Parked) {
        parked_ticks += 1;
        assert!(world.spaces().get(space).unwrap().occupied);
        world.tick();
    }
    assert_eq!(parked_ticks, 7);
    assert_eq!(state_of(&world, id), Some(DriverState::Exiting));

    // The bay is freed once the driver drives off it
    world.tick();
    assert!(!world.spaces().get(space).unwrap().occupied);
    assert_eq!(world.driver(id).unwrap().current_space_id, None);
}

#[test]
fn test_driver_leaves_through_exit() {
    let mut world = SimWorld::new(small_lot_config()).unwrap();
    let id = world.spawn_driver(DriverClass::General, 3).unwrap();

    tick_until(&mut world, 60, |w| state_of(w, id) == Some(DriverState::Exited));
    let exit = world.layout().exit_gate.cell;
    assert_eq!(world.driver(id).unwrap().position, Some(exit));
    assert_eq!(world.counters.cars_inside, 0);

    world.tick();
    assert!(world.driver(id).is_none());
    assert_eq!(world.occupancy().driver_count(), 0);
}

#[test]
fn test_price_turnaway_never_joins() {
    let config = ParkingConfig {
        arrival_intensity: 10.0,
        pricing: PricingConfig {
            base_rate_per_minute: 1.0,
            ..PricingConfig::default()
        },
        seed: Some(3),
        ..small_lot_config()
    };
    let mut world = SimWorld::new(config).unwrap();

    world.tick();
    assert_eq!(world.counters.total_arrivals, 1);
    assert_eq!(world.counters.total_price_turnaways, 1);
    assert_eq!(world.counters.total_turned_away, 1);
    assert_eq!(world.driver_count(), 0);
}

#[test]
fn test_long_queue_refusal() {
    let config = ParkingConfig {
        arrival_intensity: 10.0,
        max_queue_length: 0,
        p_not_enter_long_queue: 1.0,
        pricing: PricingConfig {
            base_rate_per_minute: 0.0,
            ..PricingConfig::default()
        },
        ..small_lot_config()
    };
    let mut world = SimWorld::new(config).unwrap();

    world.tick();
    assert_eq!(world.counters.total_not_entered_long_queue, 1);
    assert_eq!(world.counters.total_price_turnaways, 0);
    assert_eq!(world.driver_count(), 0);
}

#[test]
fn test_queued_driver_behind_front_balks() {
    // Checkpoint one cell right of the entry gate
    let config = ParkingConfig {
        width: 8,
        max_wait_time: 2,
        balk_probability: 1.0,
        ..single_bay_config()
    };
    let mut world = SimWorld::new(config).unwrap();

    let a = world.spawn_driver(DriverClass::General, 500).unwrap();
    tick_until(&mut world, 10, |w| state_of(w, a) == Some(DriverState::DrivingToSpot));

    let b = world.spawn_driver(DriverClass::General, 5).unwrap();
    tick_until(&mut world, 10, |w| state_of(w, b) == Some(DriverState::WaitingAtGate));
    let checkpoint = world.layout().checkpoint_gate.cell;
    assert_eq!(world.driver(b).unwrap().position, Some(checkpoint));

    let c = world.spawn_driver(DriverClass::General, 5).unwrap();
    tick_until(&mut world, 20, |w| w.driver(c).is_none());

    assert_eq!(world.counters.total_balked, 1);
    assert_eq!(world.counters.total_turned_away, 1);
    assert_eq!(world.counters.total_queue_time, 2);
    assert_eq!(world.counters.total_queued_drivers, 0);

    // The front-of-line driver waits indefinitely
    for _ in 0..30 {
        world.tick();
    }
    assert_eq!(state_of(&world, b), Some(DriverState::WaitingAtGate));
}

#[test]
fn test_gate_balking_lets_front_driver_leave() {
    let config = ParkingConfig {
        gate_balking: true,
        max_wait_time: 3,
        balk_probability: 1.0,
        ..single_bay_config()
    };
    let mut world = SimWorld::new(config).unwrap();

    let a = world.spawn_driver(DriverClass::General, 500).unwrap();
    world.tick();
    let b = world.spawn_driver(DriverClass::General, 5).unwrap();

    tick_until(&mut world, 20, |w| w.driver(b).is_none());
    assert_eq!(world.counters.total_balked, 1);
    assert_eq!(world.counters.total_queue_time, 3);
    assert!(world.driver(a).is_some());
}

#[test]
fn test_no_show_holds_space_until_expiry() {
    let config = with_reservations(
        small_lot_config(),
        ReservationConfig {
            no_show_prob: 1.0,
            hold_time: 10,
            walk_ins_use_reserved: true,
            ..ReservationConfig::default()
        },
    );
    let mut world = SimWorld::new(config).unwrap();
    let space = only_space(&world);
    let total = world.spaces().total();
    let reservation = world.add_reservation(space, 5, None).unwrap();

    for _ in 0..4 {
        world.tick();
    }
    assert!(!world.spaces().get(space).unwrap().held);

    world.tick();
    let bay = world.spaces().get(space).unwrap();
    assert!(bay.held);
    assert_eq!(bay.held_until, Some(15));
    assert_eq!(world.driver_count(), 0);
    let booked = world.reservations().get(reservation).unwrap();
    assert!(booked.handled && booked.no_show);

    while world.current_tick() < 14 {
        world.tick();
        assert!(world.spaces().get(space).unwrap().held);
        assert_eq!(
            world.spaces().free_capacity_for(DriverClass::General),
            total - 1
        );
    }

    world.tick();
    assert!(!world.spaces().get(space).unwrap().held);
    assert_eq!(world.counters.total_reservations_released, 1);
    assert_eq!(
        world.reservations().get(reservation).unwrap().released_at,
        Some(15)
    );
}

#[test]
fn test_reservation_processing_is_idempotent_within_tick() {
    let config = with_reservations(
        small_lot_config(),
        ReservationConfig {
            no_show_prob: 0.0,
            ..ReservationConfig::default()
        },
    );
    let mut world = SimWorld::new(config).unwrap();
    let space = only_space(&world);
    world.add_reservation(space, 3, Some(20)).unwrap();

    for _ in 0..3 {
        world.tick();
    }
    assert_eq!(world.driver_count(), 1);

    let before = world.reservations().reservations().to_vec();
    let counters = world.counters.clone();
    world.process_reservations();
    world.process_reservations();

    assert_eq!(world.driver_count(), 1);
    assert_eq!(world.reservations().reservations(), before.as_slice());
    assert_eq!(world.counters, counters);
}

#[test]
fn test_reservation_holder_parks_and_pays_fee() {
    let config = with_reservations(
        small_lot_config(),
        ReservationConfig {
            no_show_prob: 0.0,
            ..ReservationConfig::default()
        },
    );
    let mut world = SimWorld::new(config).unwrap();
    let space = only_space(&world);
    let reservation = world.add_reservation(space, 2, Some(20)).unwrap();

    tick_until(&mut world, 40, |w| w.counters.total_reservations_fulfilled == 1);

    let vip = world
        .drivers()
        .find(|d| d.class == DriverClass::Vip)
        .unwrap();
    assert_eq!(vip.state, DriverState::Parked);
    assert_eq!(vip.current_space_id, Some(space));
    assert_eq!(vip.reservation, Some(reservation));
    assert!(world.reservations().get(reservation).unwrap().fulfilled);

    let expected = 20.0 * BASE_RATE_PER_MINUTE + 5.0;
    assert!((world.counters.total_revenue - expected).abs() < 1e-9);

    // Holders are not counted as arrival attempts
    assert_eq!(world.counters.total_arrivals, 0);
}

fn evicting_world(eviction: EvictionPolicy) -> (SimWorld, SpaceId, DriverId) {
    let config = with_reservations(
        single_bay_config(),
        ReservationConfig {
            no_show_prob: 0.0,
            walk_ins_use_reserved: true,
            eviction,
            ..ReservationConfig::default()
        },
    );
    let mut world = SimWorld::new(config).unwrap();
    let bay = only_space(&world);
    world.add_reservation(bay, 20, Some(10)).unwrap();
    let walk_in = world.spawn_driver(DriverClass::General, 500).unwrap();

    while world.current_tick() < 19 {
        world.tick();
    }
    assert_eq!(state_of(&world, walk_in), Some(DriverState::Parked));
    assert_eq!(world.spaces().get(bay).unwrap().occupant_id, Some(walk_in));
    (world, bay, walk_in)
}

#[test]
fn test_immediate_eviction_frees_bay_for_holder() {
    let (mut world, bay, walk_in) = evicting_world(EvictionPolicy::Immediate);

    world.tick();
    assert_eq!(state_of(&world, walk_in), Some(DriverState::Exiting));
    assert!(!world.spaces().get(bay).unwrap().occupied);
    assert_eq!(world.counters.total_evictions, 1);

    tick_until(&mut world, 40, |w| w.counters.total_reservations_fulfilled == 1);
    let occupant = world.spaces().get(bay).unwrap().occupant_id.unwrap();
    assert_eq!(world.driver(occupant).unwrap().class, DriverClass::Vip);

    tick_until(&mut world, 20, |w| w.driver(walk_in).is_none());
}

#[test]
fn test_grace_period_caps_remaining_stay() {
    let (mut world, bay, walk_in) = evicting_world(EvictionPolicy::GracePeriod(3));

    world.tick();
    let driver = world.driver(walk_in).unwrap();
    assert_eq!(driver.state, DriverState::Parked);
    // capped to the grace period, then one tick served
    assert_eq!(driver.remaining, 2);
    assert_eq!(world.counters.total_evictions, 1);

    tick_until(&mut world, 60, |w| w.counters.total_reservations_fulfilled == 1);
    let occupant = world.spaces().get(bay).unwrap().occupant_id.unwrap();
    assert_eq!(world.driver(occupant).unwrap().class, DriverClass::Vip);
}

#[test]
fn test_disabled_eviction_makes_holder_wait() {
    let (mut world, bay, walk_in) = evicting_world(EvictionPolicy::Disabled);

    for _ in 0..15 {
        world.tick();
    }
    assert_eq!(state_of(&world, walk_in), Some(DriverState::Parked));
    assert_eq!(world.counters.total_evictions, 0);

    let vip = world
        .drivers()
        .find(|d| d.class == DriverClass::Vip)
        .unwrap();
    assert_eq!(vip.state, DriverState::WaitingAtGate);
    assert_eq!(vip.target_space_id, None);
    assert_eq!(world.spaces().get(bay).unwrap().claimed_by, Some(walk_in));
}

fn redirect_world(config: ParkingConfig) -> (SimWorld, SpaceId, DriverId, DriverId) {
    let config = with_reservations(
        config,
        ReservationConfig {
            no_show_prob: 0.0,
            walk_ins_use_reserved: true,
            eviction: EvictionPolicy::Immediate,
            ..ReservationConfig::default()
        },
    );
    let mut world = SimWorld::new(config).unwrap();
    let walk_in = world.spawn_driver(DriverClass::General, 300).unwrap();
    tick_until(&mut world, 20, |w| {
        state_of(w, walk_in) == Some(DriverState::DrivingToSpot)
    });
    let bay = world.driver(walk_in).unwrap().target_space_id.unwrap();

    let trigger = world.current_tick() + 1;
    world.add_reservation(bay, trigger, Some(10)).unwrap();
    world.tick();

    let holder = world
        .drivers()
        .find(|d| d.class == DriverClass::Vip)
        .unwrap()
        .id;
    (world, bay, walk_in, holder)
}

#[test]
fn test_reservation_redirects_walk_in_heading_for_bay() {
    let (mut world, bay, walk_in, holder) = redirect_world(small_lot_config());

    assert_eq!(world.counters.total_evictions, 1);
    let redirected = world.driver(walk_in).unwrap();
    assert_eq!(redirected.state, DriverState::DrivingToSpot);
    let spare = redirected.target_space_id.unwrap();
    assert_ne!(spare, bay);
    assert_eq!(world.spaces().get(spare).unwrap().claimed_by, Some(walk_in));
    assert_eq!(world.spaces().get(bay).unwrap().claimed_by, Some(holder));

    tick_until(&mut world, 40, |w| {
        w.counters.total_reservations_fulfilled == 1
            && state_of(w, walk_in) == Some(DriverState::Parked)
    });
    assert_eq!(world.driver(holder).unwrap().current_space_id, Some(bay));
    assert_eq!(world.driver(walk_in).unwrap().current_space_id, Some(spare));
}

#[test]
fn test_reservation_turns_walk_in_out_when_no_other_bay() {
    let (mut world, bay, walk_in, holder) = redirect_world(single_bay_config());

    assert_eq!(world.counters.total_evictions, 1);
    let turned_out = world.driver(walk_in).unwrap();
    assert_eq!(turned_out.state, DriverState::Exiting);
    assert_eq!(turned_out.target_space_id, None);
    assert_eq!(world.spaces().get(bay).unwrap().claimed_by, Some(holder));

    tick_until(&mut world, 40, |w| {
        w.counters.total_reservations_fulfilled == 1 && w.driver(walk_in).is_none()
    });
    assert_eq!(world.spaces().get(bay).unwrap().occupant_id, Some(holder));
    assert_eq!(world.counters.parked_count, 1);
}

#[test]
fn test_reservation_holders_never_wait_for_their_bay() {
    for per_space in [1, 4] {
        let config = ParkingConfig {
            arrival_intensity: 1.0,
            reservations: ReservationConfig {
                per_space,
                no_show_prob: 0.0,
                ..ReservationConfig::default()
            },
            pricing: PricingConfig {
                strategy: PricingStrategy::Reservations,
                ..PricingConfig::default()
            },
            seed: Some(5),
            ..Default::default()
        };
        let mut world = SimWorld::new(config).unwrap();
        let checkpoint = world.layout().checkpoint_gate.cell;

        // A holder may step onto the checkpoint while queueing and commit on
        // its next activation, but never stands there any longer
        let mut at_checkpoint: HashMap<DriverId, u32> = HashMap::new();
        for _ in 0..3000 {
            world.tick();
            let waiting: Vec<DriverId> = world
                .drivers()
                .filter(|d| {
                    d.class == DriverClass::Vip
                        && d.state == DriverState::WaitingAtGate
                        && d.position == Some(checkpoint)
                })
                .map(|d| d.id)
                .collect();
            at_checkpoint.retain(|id, _| waiting.contains(id));
            for id in waiting {
                let ticks = at_checkpoint.entry(id).or_insert(0);
                *ticks += 1;
                assert!(
                    *ticks < 2,
                    "holder {:?} stuck at the checkpoint at tick {} ({} per space)",
                    id,
                    world.current_tick(),
                    per_space
                );
            }
        }
        assert!(world.counters.total_reservations_fulfilled > 0);
    }
}

#[test]
fn test_same_seed_same_series() {
    let config = ParkingConfig {
        day_length: 300,
        pricing: PricingConfig {
            strategy: PricingStrategy::Dynamic,
            ..PricingConfig::default()
        },
        seed: Some(42),
        ..Default::default()
    };

    let mut first = SimWorld::new(config.clone()).unwrap();
    let mut second = SimWorld::new(config).unwrap();
    for _ in 0..300 {
        first.tick();
        second.tick();
    }

    assert_eq!(first.history(), second.history());
    assert!(first.counters.total_arrivals > 0);
}

#[test]
fn test_exporter_receives_each_day() {
    let config = ParkingConfig {
        day_length: 50,
        seed: Some(5),
        ..Default::default()
    };
    let mut world = SimWorld::new(config).unwrap();
    let exporter = Rc::new(RefCell::new(MemoryExporter::default()));
    world.set_exporter(Box::new(exporter.clone()));

    for _ in 0..120 {
        world.tick();
    }

    let exported = exporter.borrow();
    assert_eq!(exported.days.len(), 2);
    assert_eq!(exported.days[0].0, 1);
    assert_eq!(exported.days[1].0, 2);

    let first_day: Vec<u64> = exported.days[0].1.iter().map(|r| r.tick).collect();
    assert_eq!(first_day, (1..=50).collect::<Vec<_>>());
    let second_day: Vec<u64> = exported.days[1].1.iter().map(|r| r.tick).collect();
    assert_eq!(second_day, (51..=100).collect::<Vec<_>>());
    assert_eq!(world.history().len(), 120);
}

#[test]
fn test_reservations_scheduled_every_day() {
    let config = ParkingConfig {
        day_length: 200,
        seed: Some(9),
        pricing: PricingConfig {
            strategy: PricingStrategy::Reservations,
            ..PricingConfig::default()
        },
        ..Default::default()
    };
    let mut world = SimWorld::new(config).unwrap();
    let reservable = world.spaces().spaces().iter().filter(|s| s.is_reserved).count();
    assert_eq!(reservable, 32);
    assert_eq!(world.reservations().scheduled_count(), 32);

    for _ in 0..201 {
        world.tick();
    }
    assert_eq!(world.reservations().scheduled_count(), 64);
    assert_eq!(world.counters.total_reservations, 64);
    assert!(world
        .reservations()
        .reservations()
        .iter()
        .filter(|r| r.trigger_tick <= 200)
        .all(|r| r.handled));
}

#[test]
fn test_snapshot_reflects_world() {
    let mut world = SimWorld::new(small_lot_config()).unwrap();
    let id = world.spawn_driver(DriverClass::Ev, 10).unwrap();
    tick_until(&mut world, 30, |w| state_of(w, id) == Some(DriverState::Parked));

    let snapshot = world.snapshot();
    assert_eq!(snapshot.tick, world.current_tick());
    assert_eq!(snapshot.spaces.len(), world.spaces().total());
    assert_eq!(snapshot.drivers_in_state(DriverState::Parked), 1);

    let view = snapshot.driver(id).unwrap();
    let space = view.current_space.unwrap();
    let bay = snapshot.spaces.iter().find(|s| s.id == space).unwrap();
    assert_eq!(view.cell, Some(bay.cell));
    assert_eq!(bay.occupant, Some(id));
}

#[test]
fn test_spawning_reservation_holder_is_refused() {
    let mut world = SimWorld::new(small_lot_config()).unwrap();
    assert!(world.spawn_driver(DriverClass::Vip, 10).is_err());
}
