//! `automemer settings`: print the runtime settings and store state.

use super::open_stores;
use crate::config::Config;
use anyhow::Result;

pub fn execute(config: &Config) -> Result<()> {
    let stores = open_stores(config)?;
    let settings = stores.settings.load()?;

    println!("# {}", stores.settings.path().display());
    println!("{}", serde_json::to_string_pretty(&settings)?);
    println!();
    println!(
        "Staged: {} ({})",
        stores.staging.snapshot()?.len(),
        stores.staging.path().display()
    );
    println!("Archived: {}", stores.archive.count()?);
    Ok(())
}
