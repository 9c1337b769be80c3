use crate::{api::GraphQlApi, upstream::HttpUpstream};
use std::sync::Arc;
use stitchwork_graphql::{ExecutionAdapter, ExtensionSet};
use stitchwork_lib::{
    config::{ApiServerArgs, StitchConfig},
    utils::init_logging,
};
use tracing::{error, info};

pub async fn exec(args: ApiServerArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => StitchConfig::from_file(path)?,
        None => StitchConfig::try_from(args)?,
    };

    init_logging(&config)?;

    info!("Configuration: {:?}", config);

    let extensions = ExtensionSet::from_manifest_file(&config.extensions)?;
    info!(
        "Loaded {} type extension(s) from {:?}",
        extensions.extensions.len(),
        config.extensions
    );

    let upstream = HttpUpstream::new(&config.upstream)?;
    let adapter = Arc::new(ExecutionAdapter::new(Arc::new(upstream), extensions));

    if config.eager_init {
        warm_up(&adapter).await;
    }

    GraphQlApi::run(config, adapter).await?;

    Ok(())
}

/// Build the composed schema ahead of the first request.
///
/// A failed build leaves the adapter uninitialized and the server keeps starting;
/// the first request retries it.
pub(crate) async fn warm_up(adapter: &ExecutionAdapter) -> bool {
    match adapter.initialize().await {
        Ok(_) => {
            info!("Composed schema built at startup.");
            true
        }
        Err(e) => {
            error!("Eager schema build failed, retrying on first request: {e}");
            false
        }
    }
}
