//! One-shot system lookups. None of these can block for long, so they run
//! with the GIL held, which also serializes access to the libc functions
//! that return static storage.

mod groups;
mod login;
mod proto;
mod time;

pub use groups::getgroups;
pub use login::getlogin;
pub use proto::{getprotobyname, getprotobynumber};
#[cfg(unix)]
pub use proto::proto_entry;
pub use time::time;
