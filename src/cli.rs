//! Command line arguments for the `syncfuse` binary.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "syncfuse", version, about)]
pub struct Cli {
    /// Configuration directory holding config.toml and the TLS identities.
    ///
    /// Defaults to `$XDG_CONFIG_HOME/syncfuse` (or `~/.config/syncfuse`).
    #[arg(long, env = "SYNCFUSE_HOME")]
    pub home: Option<PathBuf>,

    /// Serve GUI assets from this directory instead of the embedded bundle.
    ///
    /// Intended for UI development; files present here shadow the compiled-in
    /// assets path-by-path.
    #[arg(long, env = "SYNCFUSE_GUI_ASSETS")]
    pub gui_assets: Option<PathBuf>,
}
