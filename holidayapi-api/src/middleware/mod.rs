/// Router-wide middleware
///
/// Per-route authorization lives in `holidayapi_shared::auth::middleware`;
/// this module only holds layers applied to every response.

pub mod security;
