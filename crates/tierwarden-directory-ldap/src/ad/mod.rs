//! Active Directory specifics
//!
//! - `userAccountControl` bitfield handling
//! - Binary security identifier decoding
//! - Object-kind filters for AD object classes

pub mod sid;
pub mod user_account_control;

pub use sid::{decode_sid, is_sid};
pub use user_account_control::UserAccountControl;

use tierwarden_directory::{Filter, ObjectKind};

/// Filter selecting objects of the given kind.
///
/// Computers carry `objectClass=user` too, so users are narrowed by
/// `objectCategory=person`.
pub fn kind_filter(kind: ObjectKind) -> Filter {
    match kind {
        ObjectKind::User => Filter::and(vec![
            Filter::eq("objectCategory", "person"),
            Filter::eq("objectClass", "user"),
        ]),
        ObjectKind::Group => Filter::eq("objectClass", "group"),
        ObjectKind::Computer => Filter::eq("objectClass", "computer"),
    }
}
