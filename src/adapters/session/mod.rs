//! Session Adapters - Auth Token Storage
//!
//! - `store`: session holder implementing the `TokenSource` port
//! - `watcher`: session file polling that rotates the stream's token

pub mod store;
pub mod watcher;

pub use store::{is_valid_token_format, SessionData, SessionStore};
pub use watcher::TokenWatcher;
