pub mod job_store;
pub use job_store::{
    JobPatch, JobStore, NewResult, NewSearch, ResultPage, ResultQuery, Search, SearchJob,
    SearchResult, StoreError,
};

pub mod quota;
pub use quota::QuotaGuard;

pub mod normalize;

pub mod processor;
pub use processor::{JobOutcome, ListingCache, ProcessError, ProcessorSettings, SearchProcessor};

pub mod dispatcher;
pub use dispatcher::Dispatcher;
