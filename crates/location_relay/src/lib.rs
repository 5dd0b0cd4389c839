pub mod domain;
pub mod location_relay;
pub mod radar;
pub mod transport;

pub use domain::*;
pub use location_relay::*;
pub use radar::*;
pub use transport::*;
