//! `geocode` and `reverse`: address lookups through the remote resolver.

use bearing::geocoding::{
    Address, AsyncReqwestClient, GeocodeError, GeocodeQuery, GeocodingTask, RemoteGeocoder,
};
use tracing::info;

use super::common::{CliContext, OutputFormat};
use crate::error::CliError;

/// Overrides for the `[geocoding]` settings.
#[derive(Debug, Clone, Default)]
pub struct GeocodeOptions {
    pub results: Option<usize>,
    pub language: Option<String>,
}

fn build_task(
    ctx: &CliContext,
    query: GeocodeQuery,
    options: &GeocodeOptions,
) -> Result<GeocodingTask, CliError> {
    let settings = &ctx.config.geocoding;
    if settings.api_key.is_none() {
        info!("No geocoding api_key configured, sending unauthenticated requests");
    }

    let client = AsyncReqwestClient::new().map_err(GeocodeError::from)?;
    let mut remote = RemoteGeocoder::new(client);
    if let Some(key) = &settings.api_key {
        remote = remote.with_api_key(key.clone());
    }

    let task = match query {
        GeocodeQuery::Forward(text) => GeocodingTask::forward(text),
        GeocodeQuery::Reverse {
            latitude,
            longitude,
        } => GeocodingTask::reverse(latitude, longitude),
    };
    let mut task = settings.configure(task).remote(remote);

    if let Some(results) = options.results {
        task = task.results(results);
    }
    if let Some(language) = &options.language {
        task = task.locale(language.clone());
    }
    Ok(task)
}

fn print_addresses(addresses: &[Address], output: OutputFormat) {
    if addresses.is_empty() {
        eprintln!("No results");
        return;
    }

    for address in addresses {
        match output {
            OutputFormat::Text => println!("{}", address),
            OutputFormat::Json => match serde_json::to_string(address) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("Failed to encode address: {}", e),
            },
        }
    }
}

/// Resolve `query` and print the addresses.
pub async fn run(
    ctx: &CliContext,
    query: GeocodeQuery,
    options: &GeocodeOptions,
) -> Result<(), CliError> {
    query.validate()?;
    let task = build_task(ctx, query, options)?;
    let handle = task.start()?;

    match handle.outcome().await {
        Some(result) => {
            let addresses = result?;
            print_addresses(&addresses, ctx.options.output);
            Ok(())
        }
        None => Err(CliError::Geocode(GeocodeError::Cancelled)),
    }
}
