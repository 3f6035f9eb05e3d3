pub mod dispatcher;
pub mod job_builder;

pub use dispatcher::{Dispatcher, DispatcherState};
pub use job_builder::{JobBuilder, ModelVariant};
