pub mod library;
pub mod serve;

pub use library::library_command;
pub use serve::{ServeArgs, open_engine, serve_command, serve_lines};
