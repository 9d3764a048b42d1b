use std::sync::Arc;

use tracing::{info, warn};

use rentcal::calendar::{CalendarFacade, Refresh};
use rentcal::config::Config;
use rentcal::filter::FilterMachine;
use rentcal::source::{CalendarSource, StaticSource};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    rentcal::observability::init(config.metrics_port)?;

    let source = StaticSource::load(&config.dataset).await?;
    info!("rentcal loaded {}", config.dataset.display());
    info!("  properties: {}", source.dataset().properties.len());
    info!("  reservations: {}", source.dataset().reservations.len());
    info!("  blocks: {}", source.dataset().blocks.len());
    if let Err(e) = rentcal::engine::find_overlapping_tiers(&source.dataset().pricing.tiers) {
        warn!("{e}");
    }

    let source: Arc<dyn CalendarSource> = Arc::new(source);
    let filters = FilterMachine::from_query(&config.query).shared();
    let facade = CalendarFacade::new(source, filters).with_default_window_days(config.window_days);

    let view = match facade.refresh().await? {
        Refresh::Updated(view) => view,
        Refresh::Superseded { key } => return Err(format!("filters changed during load: {key}").into()),
    };

    for conflict in &view.conflicts {
        let ids: Vec<&str> = conflict.reservations.iter().map(|r| r.id.as_str()).collect();
        warn!(
            "overbooked: {} on {} ({})",
            conflict.property_name,
            conflict.date,
            ids.join(", ")
        );
    }

    if let Some(platform) = config.platform.as_deref() {
        for property in &view.properties {
            if let Some(quote) = view.quote(&property.id, view.window.start, Some(platform)) {
                info!("{} via {platform}: {:.2}", property.name, quote.final_price);
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(view.as_ref())?);
    Ok(())
}
