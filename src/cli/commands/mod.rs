mod preset;
mod quota;
mod run;

pub use preset::cmd_preset;
pub use quota::cmd_quota;
pub use run::cmd_run_search;
