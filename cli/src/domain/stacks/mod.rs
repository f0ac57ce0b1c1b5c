//! The deployable stacks. Each module exposes its stack `NAME` and a `build`
//! function from its configuration section. Stacks never reference each other.

pub mod basic_server;
pub mod serverless;
pub mod waf;
