mod definition;
mod result;

pub use definition::*;
pub use result::*;
