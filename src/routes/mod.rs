/// Router Module Index
///
/// Routing is segregated by access tier so that every protected endpoint sits behind an
/// explicit layer.

/// Routes open to anonymous callers: health, sign-up, sign-in, session lookup.
pub mod public;

/// Routes requiring a resolved identity (`AuthUser`).
pub mod authenticated;

/// Routes restricted to the admin role. Handlers re-check the role.
pub mod admin;

/// Server-rendered pages gated by the route guard.
pub mod pages;
