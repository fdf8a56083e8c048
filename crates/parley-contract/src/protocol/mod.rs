pub mod transcoder;

pub use transcoder::{Identity, Transcoder};
