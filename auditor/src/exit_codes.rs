//! Stable exit codes for `survey-audit` commands.

/// Command succeeded; every audited path matched the logic map.
pub const OK: i32 = 0;
/// Invalid input, config or logic map, or any other runtime error.
pub const INVALID: i32 = 1;
/// At least one audited path ended in a logic break.
pub const LOGIC_BREAK: i32 = 2;
/// System errors occurred but no logic break was seen.
pub const SYSTEM_ERROR: i32 = 3;
