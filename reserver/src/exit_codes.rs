//! Stable exit codes for `reserver run`.

/// The study was reserved, or a non-session command succeeded.
pub const OK: i32 = 0;
/// Invalid config or another error.
pub const INVALID: i32 = 1;
/// The page reported the study unavailable (full, returned, paused).
pub const STOPPED: i32 = 2;
/// The operator stopped the session.
pub const CANCELLED: i32 = 3;
