pub mod events;
pub mod relay;
