pub mod prelude;

pub mod result_unlocks;
pub mod search_jobs;
pub mod search_results;
pub mod searches;
