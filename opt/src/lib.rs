mod wreduce;

pub use wreduce::{wreduce, wreduce_command, WreduceError};
