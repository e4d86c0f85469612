//! Command implementations.

pub mod pull;
pub mod push;
pub mod query;
pub mod resolve;
pub mod review;

use crate::cli::{CommandContext, RemoteArgs};
use crate::config::{self, ConfigLayer, RemoteSettings};
use crate::error::Result;
use crate::storage::RestStore;
use serde::Serialize;
use tracing::debug;

/// Merged configuration for a command, with the remote store it names.
pub(crate) struct Remote {
    pub layer: ConfigLayer,
    pub settings: RemoteSettings,
    pub store: RestStore,
}

/// Load layered config and build the REST store. No request is made.
pub(crate) fn connect(ctx: &CommandContext, remote: &RemoteArgs) -> Result<Remote> {
    let layer = config::load_config(&ctx.beads_dir, &remote.overrides())?;
    let settings = RemoteSettings::from_layer(&layer)?;
    debug!(?settings, "Remote settings");
    let store = RestStore::new(&settings.url, &settings.key, settings.timeout)?;
    Ok(Remote {
        layer,
        settings,
        store,
    })
}

/// Print a result to stdout as pretty JSON.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value)?;
    println!("{output}");
    Ok(())
}
