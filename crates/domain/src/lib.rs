pub mod entities;
pub mod messages;
pub mod ports;
pub mod records;
pub mod schedule;

pub use entities::*;
pub use messages::*;
pub use ports::*;
pub use records::*;
pub use schedule::*;

pub use cropbatch_errors::{CropbatchError, CropbatchResult};
