mod chat;
mod conversation;
mod profile;

pub use chat::*;
pub use conversation::*;
pub use profile::*;
