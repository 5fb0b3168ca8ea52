pub mod error;
pub mod format;
pub mod load;
pub mod save;

pub use error::PersistError;
pub use format::{StateRecord, STATE_RECORD_SIZE};
pub use load::load;
pub use save::save;
