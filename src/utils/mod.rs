pub mod locks;
pub mod time;
pub mod token;
