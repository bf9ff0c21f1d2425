//! User identity and colours.

use crate::id::UserId;
use crate::object::{LockAnnotation, Timestamp};
use serde::{Deserialize, Serialize};

/// Palette used for lock highlights and cursors.
pub const COLOR_PALETTE: [&str; 12] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
    "#BB8FCE", "#85C1E9", "#F8C471", "#82E0AA",
];

/// Deterministic colour for a user: the same id always maps to the same
/// palette entry, on every client.
pub fn user_color(user_id: &UserId) -> &'static str {
    let hash = user_id
        .as_str()
        .encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_shl(5)
                .wrapping_sub(hash)
                .wrapping_add(i32::from(unit))
        });
    COLOR_PALETTE[(hash.unsigned_abs() as usize) % COLOR_PALETTE.len()]
}

/// The local user of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    pub name: String,
    pub color: String,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = UserId::new(id);
        let color = user_color(&id).to_string();
        Self {
            id,
            name: name.into(),
            color,
        }
    }

    /// Lock annotation naming this user as the holder.
    pub fn annotation(&self, locked_at: Timestamp) -> LockAnnotation {
        LockAnnotation {
            user_id: self.id.clone(),
            user_name: self.name.clone(),
            user_color: self.color.clone(),
            locked_at,
        }
    }
}
