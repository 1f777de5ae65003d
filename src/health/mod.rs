//! Health event model and the aggregation, classification and alerting
//! rules built on top of it.

mod alert;
mod error;
mod fleet;
mod models;
pub(crate) mod summary;

pub use alert::*;
pub use error::*;
pub use fleet::*;
pub use models::*;
pub use summary::*;
