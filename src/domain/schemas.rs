/// Version stamped on every payload this crate produces.
pub const SCHEMA_VERSION: u16 = 1;

/// Serde default for payloads written before versioning existed.
pub fn current_schema_version() -> u16 {
    SCHEMA_VERSION
}

// Routing keys on the store mutation exchange
pub struct MutationKeys;

impl MutationKeys {
    pub const CREATED: &'static str = "created";
    pub const UPDATED: &'static str = "updated";
    pub const DELETED: &'static str = "deleted";

    pub const ALL: [&'static str; 3] = [Self::CREATED, Self::UPDATED, Self::DELETED];
}
