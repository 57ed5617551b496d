mod record;
mod settings;

pub use crate::record::*;
pub use crate::settings::*;
