/// Dispatch engine - broken down into its components
mod core;
mod emitters;
mod stats;

pub use self::core::EventDispatcher;
pub use stats::DispatchStats;
