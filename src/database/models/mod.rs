pub mod broadcast_log;
pub mod delivery;
pub mod reminder;
pub mod sequence_log;
pub mod user;

pub use broadcast_log::*;
pub use delivery::*;
pub use reminder::*;
pub use sequence_log::*;
pub use user::*;
