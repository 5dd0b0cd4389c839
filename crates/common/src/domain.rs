mod location;
mod operator;
mod result;

pub use location::*;
pub use operator::*;
pub use result::*;
