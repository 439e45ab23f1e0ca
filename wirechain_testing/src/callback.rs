//! [`ConnectionManagerCallback`] recording each notification.

use std::sync::{Arc, Mutex};

use wirechain::{
    connection_manager::{ConnectionManager, ConnectionManagerCallback},
    timer::TimerService,
};

/// Notification received by a [`RecordingCallback`], with the number of
/// connections the manager held at the time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackEvent {
    Added(usize),
    Removed(usize),
    Empty,
}

/// Cloneable callback; every clone shares one event log, so a test keeps a
/// clone after boxing another into the manager.
#[derive(Clone, Debug, Default)]
pub struct RecordingCallback {
    events: Arc<Mutex<Vec<CallbackEvent>>>,
}

impl RecordingCallback {
    pub fn events(&self) -> Vec<CallbackEvent> { self.events.lock().expect("events lock").clone() }

    fn record(&self, event: CallbackEvent) { self.events.lock().expect("events lock").push(event); }
}

impl<T: TimerService> ConnectionManagerCallback<T> for RecordingCallback {
    fn on_connection_added(&mut self, manager: &ConnectionManager<T>) {
        self.record(CallbackEvent::Added(manager.num_connections()));
    }

    fn on_connection_removed(&mut self, manager: &ConnectionManager<T>) {
        self.record(CallbackEvent::Removed(manager.num_connections()));
    }

    fn on_empty(&mut self, _manager: &ConnectionManager<T>) { self.record(CallbackEvent::Empty); }
}
