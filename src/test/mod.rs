mod helpers;

pub use helpers::*;
