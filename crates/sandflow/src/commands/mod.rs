pub mod create;
pub mod destroy;
pub mod ps;
pub mod setup;
pub mod start;
pub mod stop;
