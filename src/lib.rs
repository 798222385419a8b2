#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod cache;
mod error;
mod key;
mod locker;
mod node;
mod resource;
mod rerunner;
mod scope;

pub use error::Error;
pub use key::Key;
pub use resource::Resource;
pub use rerunner::Rerunner;
pub use scope::Scope;
