use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::{DispatchError, DispatchResult};

/// Parses a caller-supplied identifier. Malformed and nil ids are rejected before
/// any storage access.
pub fn parse_id(field: &str, raw: &str) -> DispatchResult<Uuid> {
    let id = Uuid::parse_str(raw.trim())
        .map_err(|_| DispatchError::InvalidRequest(format!("{} is not a valid id", field)))?;
    ensure_valid(field, id)
}

pub fn ensure_valid(field: &str, id: Uuid) -> DispatchResult<Uuid> {
    if id.is_nil() {
        return Err(DispatchError::InvalidRequest(format!("{} must not be nil", field)));
    }
    Ok(id)
}

/// Who is asking for a cancellation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Customer(Uuid),
    Driver(Uuid),
    Dispatcher(Uuid),
}

impl Actor {
    pub fn parse(kind: &str, raw_id: &str) -> DispatchResult<Self> {
        let id = parse_id("actor id", raw_id)?;
        match kind.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Actor::Customer(id)),
            "driver" => Ok(Actor::Driver(id)),
            "dispatcher" | "admin" => Ok(Actor::Dispatcher(id)),
            other => Err(DispatchError::InvalidRequest(format!("unknown actor kind: {}", other))),
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Actor::Customer(id) | Actor::Driver(id) | Actor::Dispatcher(id) => *id,
        }
    }
}
