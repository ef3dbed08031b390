pub mod asset;

pub use asset::*;

pub type DatabaseEntry<'a> = &'a str;
