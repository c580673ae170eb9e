//! Time-sortable event id assignment.

pub fn new_event_id() -> String {
    ulid::Ulid::new().to_string()
}
