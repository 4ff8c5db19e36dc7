pub mod completions;
pub mod creds;
pub mod engines;
pub mod roles;
pub mod select;

pub use completions::CompletionsCommand;
pub use creds::CredsCommand;
pub use engines::EnginesCommand;
pub use roles::RolesCommand;
pub use select::SelectCommand;

use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs;

/// Create the directory holding the state file; the store itself never does.
async fn ensure_state_dir(state_path: &Path) -> Result<()> {
    if let Some(parent) = state_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}
