/// Router Module Index
///
/// Routes are grouped by the page class the access guard assigns them. The
/// guard middleware in `lib.rs` runs in front of every group, so the groups
/// themselves carry no access checks.

/// Landing pages, auth pages and the banned page.
pub mod public;

/// The signed-in user's own area under `/account`.
pub mod account;

/// Admin area under `/admin`. Mutations additionally require `AdminUser`.
pub mod admin;
