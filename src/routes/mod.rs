/// Router Module Index
///
/// Routes are split by access tier; each tier gets its guard as a router layer
/// in `create_router`, so a handler cannot be mounted without one by accident.

/// Anonymous access: health, facility list, registration.
pub mod public;

/// Requires a resolved `AuthUser`.
pub mod authenticated;

/// Requires a resolved `AuthUser` whose role is `Admin`.
pub mod admin;
