//! Acquisition stage: fetch the plan's data source

use crate::collaborators::Collaborators;
use crate::data::StageResult;
use crate::types::DataSource;

/// Fetch the dataset for `source`. Failures are logged and degrade to
/// [`StageResult::None`].
pub async fn acquire(source: Option<&DataSource>, collaborators: &Collaborators) -> StageResult {
    let Some(source) = source else {
        return StageResult::None;
    };

    match source {
        DataSource::Web(url) => {
            tracing::info!("Scraping {}", url);
            let page = collaborators.scraper.fetch(url).await;
            if page.text.trim().is_empty() && page.tables.is_empty() {
                tracing::warn!("Scraper returned nothing for {}", url);
                return StageResult::None;
            }
            tracing::debug!("Scraped {} tables from {}", page.tables.len(), url);
            StageResult::Scraped(page)
        }
        DataSource::Query(query) => run_query(query, collaborators).await,
        DataSource::File(path) => {
            let query = format!("SELECT * FROM '{}'", path.replace('\'', "''"));
            run_query(&query, collaborators).await
        }
    }
}

async fn run_query(query: &str, collaborators: &Collaborators) -> StageResult {
    tracing::info!("Running query: {}", query);
    match collaborators.query_engine.query(query).await {
        Ok(result) => {
            tracing::debug!("Query returned {} rows", result.row_count());
            StageResult::Tabular(result.into())
        }
        Err(e) => {
            tracing::warn!("Acquisition failed, continuing without data: {}", e);
            StageResult::None
        }
    }
}
