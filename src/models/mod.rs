pub mod conversation;
pub mod message;
pub mod profile;

pub use conversation::{Conversation, ConversationSummary, Subject};
pub use message::{InputType, Message, NewMessage, Role};
pub use profile::{EducationLevel, UserProfile};
