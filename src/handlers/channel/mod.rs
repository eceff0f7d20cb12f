//! Channel handlers: JOIN, PART, NAMES, TOPIC, LIST.

mod join;
mod list;
mod names;
mod part;
mod topic;

pub use join::JoinHandler;
pub use list::ListHandler;
pub use names::NamesHandler;
pub use part::PartHandler;
pub use topic::TopicHandler;
