//! Token command implementation.

use crate::settings::Settings;
use dirsync_engine::{ContinuationStore, FileContinuationStore};

/// Prints the stored continuation token.
pub fn show(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileContinuationStore::new(&settings.token_path);
    match store.read()? {
        Some(token) => println!("{token}"),
        None => println!("No continuation token at {}", store.path().display()),
    }
    Ok(())
}

/// Removes the stored continuation token.
pub fn reset(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileContinuationStore::new(&settings.token_path);
    store.clear()?;
    println!("Cleared continuation token at {}", store.path().display());
    Ok(())
}
