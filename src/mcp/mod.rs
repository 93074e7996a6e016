pub mod prompt;
pub mod protocol;
pub mod server;
