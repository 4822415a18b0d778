pub mod connection;
pub mod presence;
pub mod room;

pub use presence::PresenceMap;
pub use room::ChatRoom;
