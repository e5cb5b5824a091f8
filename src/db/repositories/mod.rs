pub mod job;
pub mod result;
pub mod search;
