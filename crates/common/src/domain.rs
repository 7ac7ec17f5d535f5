mod command;
mod decision;
mod result;
mod status;

pub use command::*;
pub use decision::*;
pub use result::*;
pub use status::*;
