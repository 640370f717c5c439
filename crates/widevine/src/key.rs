use std::fmt::{Display, Formatter};

use crate::protocol::KeyType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidevineKey {
    /// `None` for key types this crate does not know.
    pub kind: Option<KeyType>,
    pub id: Vec<u8>,
    pub key: Vec<u8>,
}

impl WidevineKey {
    pub fn type_name(&self) -> &'static str {
        self.kind.map_or("UNKNOWN", |kind| kind.name())
    }
}

impl Display for WidevineKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}:{}",
            self.type_name(),
            hex::encode(&self.id),
            hex::encode(&self.key)
        )
    }
}
