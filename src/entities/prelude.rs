pub use super::result_unlocks::Entity as ResultUnlocks;
pub use super::search_jobs::Entity as SearchJobs;
pub use super::search_results::Entity as SearchResults;
pub use super::searches::Entity as Searches;
