mod definition;
mod recovery;
mod run;

pub use definition::*;
pub use recovery::*;
pub use run::*;
