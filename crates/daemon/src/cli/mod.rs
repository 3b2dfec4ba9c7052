pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Ctl, Fs, Health, Init, Key, Mount, Node, Repair, Version};
