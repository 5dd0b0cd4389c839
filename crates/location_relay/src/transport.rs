mod server;
mod webhook_handler;
mod ws_handler;

pub use server::*;
pub use webhook_handler::*;
pub use ws_handler::*;
