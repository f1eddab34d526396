mod cancel;
mod flowsnake;

pub use cancel::*;
pub use flowsnake::*;
