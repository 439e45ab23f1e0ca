//! Connection manager behaviour driven through its public API.

use std::{sync::Arc, time::Duration};

use proptest::prelude::*;
use rstest::{fixture, rstest};
use wirechain::{
    connection_manager::{ConnectionKey, ConnectionManager, ConnectionManagerConfig, DrainPhase},
    timer::TimeoutId,
};
use wirechain_testing::{CallbackEvent, ConnectionEvent, FakeConnection, ManualTimer, RecordingCallback};

type Manager = ConnectionManager<ManualTimer>;

fn manager_with(config: ConnectionManagerConfig) -> (Manager, RecordingCallback) {
    let mut manager = ConnectionManager::with_timer(config, ManualTimer::new()).expect("valid config");
    let callback = RecordingCallback::default();
    manager.set_callback(Box::new(callback.clone()));
    (manager, callback)
}

#[fixture]
fn manager() -> (Manager, RecordingCallback) {
    manager_with(ConnectionManagerConfig::new(Duration::from_secs(60)))
}

fn add_all(manager: &mut Manager, conns: &[Arc<FakeConnection>]) -> Vec<ConnectionKey> {
    conns
        .iter()
        .map(|conn| manager.add_connection(Arc::clone(conn) as _, true))
        .collect()
}

#[rstest]
fn graceful_drain_of_many_idle_connections_runs_in_batches(manager: (Manager, RecordingCallback)) {
    let (mut manager, callback) = manager;
    let conns: Vec<_> = (0..130).map(|_| FakeConnection::idle(Duration::from_secs(1))).collect();
    add_all(&mut manager, &conns);

    manager.initiate_graceful_shutdown(Duration::ZERO);
    assert_eq!(manager.num_connections(), 66);
    assert!(manager.needs_sweep());

    manager.drain_all_connections();
    assert_eq!(manager.num_connections(), 2);
    assert!(manager.needs_sweep());

    manager.drain_all_connections();
    assert!(manager.is_empty());
    assert!(!manager.needs_sweep());
    assert_eq!(manager.drain_phase(), DrainPhase::Complete);

    assert!(conns.iter().all(|conn| conn.events() == [ConnectionEvent::CloseWhenIdle]));
    assert_eq!(callback.events().last(), Some(&CallbackEvent::Empty));
}

#[rstest]
fn grace_period_warns_before_closing(manager: (Manager, RecordingCallback)) {
    let (mut manager, callback) = manager;
    let idle = FakeConnection::idle(Duration::from_secs(2));
    let busy = FakeConnection::busy();
    let keys = add_all(&mut manager, &[Arc::clone(&idle), Arc::clone(&busy)]);

    manager.initiate_graceful_shutdown(Duration::from_secs(5));
    assert_eq!(manager.drain_phase(), DrainPhase::NotifyPendingShutdown);
    assert_eq!(manager.timer().scheduled(TimeoutId::IdleGrace), Some(Duration::from_secs(5)));
    assert_eq!(idle.events(), [ConnectionEvent::NotifyPendingShutdown]);
    assert_eq!(busy.events(), [ConnectionEvent::NotifyPendingShutdown]);
    assert_eq!(manager.num_connections(), 2);

    assert!(manager.timer_mut().fire(TimeoutId::IdleGrace));
    manager.handle_timeout(TimeoutId::IdleGrace);

    assert_eq!(manager.drain_phase(), DrainPhase::Complete);
    assert_eq!(idle.count(ConnectionEvent::CloseWhenIdle), 1);
    assert_eq!(busy.count(ConnectionEvent::CloseWhenIdle), 1);
    assert_eq!(manager.num_connections(), 1);

    busy.set_busy(false);
    assert!(manager.on_deactivated(keys[1]));
    assert!(manager.is_empty());
    assert_eq!(callback.events().last(), Some(&CallbackEvent::Empty));
}

#[rstest]
fn drop_all_closes_everything_at_once(manager: (Manager, RecordingCallback)) {
    let (mut manager, callback) = manager;
    let conns = [
        FakeConnection::idle(Duration::from_secs(1)),
        FakeConnection::busy(),
        FakeConnection::idle(Duration::from_secs(3)),
    ];
    add_all(&mut manager, &conns);

    manager.drop_all_connections();

    assert!(manager.is_empty());
    assert!(manager.timer().is_empty());
    assert!(
        conns
            .iter()
            .all(|conn| conn.count(ConnectionEvent::DropConnection) == 1)
    );
    let dumps: usize = conns
        .iter()
        .map(|conn| conn.count(ConnectionEvent::DumpState(3)))
        .sum();
    assert_eq!(dumps, 2);
    assert_eq!(
        callback.events(),
        [
            CallbackEvent::Added(1),
            CallbackEvent::Added(2),
            CallbackEvent::Added(3),
            CallbackEvent::Empty,
        ]
    );
}

#[rstest]
fn early_drop_stops_at_the_first_recent_connection(manager: (Manager, RecordingCallback)) {
    let (mut manager, _callback) = manager;
    let conns = [50, 40, 10, 45].map(|secs| FakeConnection::idle(Duration::from_secs(secs)));
    let keys = add_all(&mut manager, &conns);
    for &key in &keys {
        manager.on_activated(key);
        manager.on_deactivated(key);
    }
    assert_eq!(manager.idle_connection(), Some(keys[0]));

    assert_eq!(manager.drop_idle_connections(10), 2);

    assert_eq!(conns[0].events(), [ConnectionEvent::TimeoutExpired]);
    assert_eq!(conns[1].events(), [ConnectionEvent::TimeoutExpired]);
    assert!(conns[2].events().is_empty());
    assert!(conns[3].events().is_empty());
    assert_eq!(manager.idle_connection(), Some(keys[2]));
    assert_eq!(manager.num_connections(), 2);
}

#[rstest]
fn idle_timeout_is_rearmed_on_every_deactivation(manager: (Manager, RecordingCallback)) {
    let (mut manager, callback) = manager;
    let conn = FakeConnection::idle(Duration::ZERO);
    let key = manager.add_connection(Arc::clone(&conn) as _, true);
    let id = TimeoutId::Connection(key);
    assert_eq!(manager.timer().scheduled(id), Some(Duration::from_secs(60)));

    manager.on_activated(key);
    assert_eq!(manager.timer().scheduled(id), None);

    manager.on_deactivated(key);
    assert!(manager.timer_mut().fire(id));
    manager.handle_timeout(id);

    assert_eq!(conn.events(), [ConnectionEvent::TimeoutExpired]);
    assert_eq!(
        callback.events(),
        [CallbackEvent::Added(1), CallbackEvent::Removed(0), CallbackEvent::Empty]
    );
}

#[derive(Clone, Debug)]
enum Op {
    Add,
    Activate(usize),
    Deactivate(usize),
    Remove(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Add),
        any::<usize>().prop_map(Op::Activate),
        any::<usize>().prop_map(Op::Deactivate),
        any::<usize>().prop_map(Op::Remove),
    ]
}

proptest! {
    #[test]
    fn idle_marker_only_covers_idle_connections(ops in prop::collection::vec(op(), 0..96)) {
        let (mut manager, _callback) = manager_with(ConnectionManagerConfig::new(Duration::from_secs(60)));
        // (key, idle) per live connection, in insertion order.
        let mut live: Vec<(ConnectionKey, bool)> = Vec::new();

        for op in ops {
            match op {
                Op::Add => {
                    let key = manager.add_connection(FakeConnection::idle(Duration::ZERO) as _, true);
                    live.push((key, false));
                }
                Op::Activate(i) if !live.is_empty() => {
                    let slot = i % live.len();
                    prop_assert!(manager.on_activated(live[slot].0));
                    live[slot].1 = false;
                }
                Op::Deactivate(i) if !live.is_empty() => {
                    let slot = i % live.len();
                    prop_assert!(manager.on_deactivated(live[slot].0));
                    live[slot].1 = true;
                }
                Op::Remove(i) if !live.is_empty() => {
                    let (key, _) = live.remove(i % live.len());
                    prop_assert!(manager.remove_connection(key).is_some());
                    prop_assert!(!manager.contains(key));
                }
                _ => {}
            }

            prop_assert_eq!(manager.num_connections(), live.len());
            if let Some(marker) = manager.idle_connection() {
                prop_assert!(manager.contains(marker));
                let from_marker = manager
                    .connections()
                    .map(|(key, _)| key)
                    .skip_while(|key| *key != marker);
                for key in from_marker {
                    let idle = live.iter().find(|(live_key, _)| *live_key == key).map(|(_, idle)| *idle);
                    prop_assert_eq!(idle, Some(true));
                }
            }
        }
    }
}
