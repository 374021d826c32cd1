//! Message identifiers.

use uuid::Uuid;

/// Generate a fresh, URL-safe, collision-resistant message id.
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
