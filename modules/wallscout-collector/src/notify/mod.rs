pub mod backend;
pub mod noop;

pub use backend::NotifyPublisher;
pub use noop::NoopPublisher;
