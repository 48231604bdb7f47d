pub mod events;
pub mod payload;
pub mod predictions;
pub mod resources;
pub mod session;
