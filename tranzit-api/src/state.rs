use std::sync::Arc;
use tranzit_core::repository::RecordStore;
use tranzit_dispatch::BookingStateMachine;

#[derive(Clone)]
pub struct AppState {
    pub machine: Arc<BookingStateMachine>,
    pub store: Arc<dyn RecordStore>,
}

impl AppState {
    pub fn new(machine: BookingStateMachine, store: Arc<dyn RecordStore>) -> Self {
        Self { machine: Arc::new(machine), store }
    }
}
