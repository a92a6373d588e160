//! ID utilities (region ids, relay connection ids).

use ulid::Ulid;

/// Region ids keep the `poly_` prefix clients already expect; the ULID
/// suffix sorts by creation time.
pub fn new_region_id() -> String {
    format!("poly_{}", Ulid::new())
}

pub fn new_connection_id() -> u64 {
    rand::random()
}
