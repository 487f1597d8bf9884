use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use auditflow_client::{AuditLogSource, DEFAULT_ENDPOINT, HttpAuditLogSource};
use auditflow_write::{
    AppendStore, AuditDrainer, DEFAULT_PAGE_SIZE, LocalFsAppendStore, PartitionedAppendSink,
    container_from_params,
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)]
    Client(#[from] auditflow_client::Error),

    #[error(transparent)]
    Drain(#[from] auditflow_write::DrainError),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Parser)]
pub(crate) struct Config {
    /// Audit log API endpoint to drain
    #[clap(
        long = "endpoint",
        env = "AUDITFLOW_ENDPOINT",
        default_value = DEFAULT_ENDPOINT
    )]
    endpoint: String,

    /// `user:password` credentials for the audit log API, sent as a Basic
    /// authorization header
    #[clap(long = "credentials", env = "AUDITFLOW_CREDENTIALS", hide_env_values = true)]
    credentials: Option<String>,

    /// Root directory of the local append store
    #[clap(long = "data-dir", env = "AUDITFLOW_DATA_DIR")]
    data_dir: PathBuf,

    /// Page-size hint sent with every page request
    #[clap(
        long = "page-size",
        env = "AUDITFLOW_PAGE_SIZE",
        default_value_t = DEFAULT_PAGE_SIZE
    )]
    page_size: usize,

    /// Abort a drain whose source has not returned an empty page after this
    /// many page fetches. Unset means the loop only stops on an empty page.
    #[clap(long = "max-pages", env = "AUDITFLOW_MAX_PAGES")]
    max_pages: Option<NonZeroUsize>,

    /// Query parameter passed through to the audit log API, as `key=value`.
    /// May be given multiple times. A `container=<name>` parameter selects
    /// the target container instead of being forwarded.
    #[clap(long = "param", value_parser = parse_key_val)]
    params: Vec<(String, String)>,
}

pub(crate) async fn command(config: Config) -> Result<()> {
    let mut source = HttpAuditLogSource::new(config.endpoint.as_str())?;
    if let Some(credentials) = config.credentials {
        source = source.with_basic_credentials(credentials);
    }
    let source: Arc<dyn AuditLogSource> = Arc::new(source);
    let store: Arc<dyn AppendStore> = Arc::new(LocalFsAppendStore::new(config.data_dir));

    let drainer = AuditDrainer::new(source, PartitionedAppendSink::new(store))
        .with_page_size(config.page_size)
        .with_max_pages(config.max_pages);

    let container = container_from_params(&config.params);
    let summary = drainer.drain(&container, &config.params).await?;

    println!("Logs written {}", summary.records_written);

    Ok(())
}

fn parse_key_val(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    Ok((key.to_string(), value.to_string()))
}
