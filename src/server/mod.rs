mod handlers;
mod models;
mod state;

pub use handlers::{app, run_server};
