use serde::{Serialize, Deserialize, Serializer};
use std::fmt;

/// Wraps a customer identifier (phone, messaging handle) so that `Debug` and
/// `Display` never print it. Serialization still emits the real value.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Masked<T>(pub T);

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Last two characters stay visible
        let raw = self.0.to_string();
        let tail: String = raw.chars().rev().take(2).collect::<Vec<_>>().into_iter().rev().collect();
        if raw.chars().count() <= 4 {
            write!(f, "****")
        } else {
            write!(f, "****{}", tail)
        }
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}
