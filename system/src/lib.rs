mod hardware;
mod id;

pub use crate::hardware::*;
pub use crate::id::*;
