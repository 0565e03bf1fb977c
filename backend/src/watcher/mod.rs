pub mod propagate;
pub mod registry;

pub use propagate::ChangePropagator;
pub use registry::WatcherRegistry;
