mod position_provider;
mod trips;

pub use position_provider::*;
