use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The owner of a booking. `messaging_id` is the customer's chat identity on the
/// messaging platform; customers who never linked one receive no notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    pub full_name: String,
    pub messaging_id: Option<String>,
}

impl Customer {
    pub fn new(full_name: impl Into<String>, messaging_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.into(),
            messaging_id,
        }
    }
}
