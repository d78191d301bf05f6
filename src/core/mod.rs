pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod log_io;
pub mod model;
pub mod notifications;
pub mod submit;
pub mod watcher;
