pub mod api;
pub mod countdown;
pub mod events;
pub mod validation;
