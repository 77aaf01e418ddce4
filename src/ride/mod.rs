pub mod geo;
pub mod relay;
