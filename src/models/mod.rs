mod course;
mod identity;
mod program;
mod role;
mod term;
mod validators;

pub use course::*;
pub use identity::*;
pub use program::*;
pub use role::*;
pub use term::*;
pub use validators::*;
