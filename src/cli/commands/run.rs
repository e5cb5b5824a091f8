use crate::config::Config;
use crate::domain::SearchFilters;
use crate::services::{JobOutcome, NewSearch, ResultQuery};
use crate::state::SharedState;

/// User id recorded on searches started from the command line.
const CLI_USER: &str = "cli";

pub async fn cmd_run_search(
    config: Config,
    query: &str,
    filters: SearchFilters,
    limit: u64,
) -> anyhow::Result<()> {
    let state = SharedState::new(config).await?;

    let search = state
        .jobs
        .create_search(NewSearch {
            user_id: CLI_USER.to_string(),
            query: query.to_string(),
            filters,
        })
        .await?;
    let job_id = state.jobs.create_job(search.id).await?;

    println!("Searching for: {query} (search {}, job {job_id})", search.id);

    let outcome = state.dispatcher.submit(job_id).await?;

    match outcome {
        JobOutcome::Completed { result_count } => {
            println!("✓ {result_count} listings found");
        }
        JobOutcome::Failed(err) => {
            println!("✗ Search failed: {}", err.encode());
            return Ok(());
        }
        other => {
            println!("Job did not run ({})", other.label());
            return Ok(());
        }
    }

    let page = state
        .jobs
        .get_results(
            job_id,
            &ResultQuery {
                limit,
                ..Default::default()
            },
        )
        .await?;

    println!();
    println!("{:-<60}", "");
    for result in &page.results {
        let price = match (result.price, result.currency.as_deref()) {
            (Some(p), Some(c)) => format!("{p:.2} {c}"),
            (Some(p), None) => format!("{p:.2}"),
            _ => "no price".to_string(),
        };
        println!("• {} ({price})", result.title);
        if let Some(location) = &result.location {
            println!("  Location: {location}");
        }
        println!("  {}", result.listing_url);
        println!();
    }

    if page.has_more() {
        println!(
            "Showing {} of {} listings",
            page.results.len(),
            page.total
        );
    }

    Ok(())
}
