pub mod adapters;
pub mod async_unordered;
pub mod cancel;
pub mod chain;
pub mod channel;
pub mod config;
pub mod demand;
pub mod flow;
pub(crate) mod junction;
pub mod retry;
pub mod runtime;
pub mod stage;
pub mod subscription;
pub mod throttle;
