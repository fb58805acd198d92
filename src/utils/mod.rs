pub mod bytes;
pub mod domain;
pub mod time;
