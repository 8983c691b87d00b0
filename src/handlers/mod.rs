pub mod events;
pub mod hooks;
