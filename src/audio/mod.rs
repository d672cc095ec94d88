pub mod fetch;
pub mod player;
pub mod queue;
pub mod resolver;
pub mod session;
pub mod track;
pub mod watcher;
