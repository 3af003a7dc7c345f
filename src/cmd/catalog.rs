use anyhow::{Context, Result};

use vodplay::{Catalog, CatalogEntry, PlayerConfig};

use super::catalog_client;

fn created_label(entry: &CatalogEntry) -> String {
    entry
        .created()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

pub async fn cmd_list(config: &PlayerConfig) -> Result<()> {
    let catalog = catalog_client(config)?;
    let entries = catalog
        .list()
        .await
        .with_context(|| format!("listing {}", catalog.base()))?;

    if entries.is_empty() {
        eprintln!("No videos in the catalog");
        return Ok(());
    }

    println!("{:<8} {:<40} {:>8}  {}", "ID", "TITLE", "LENGTH", "ADDED");
    for entry in &entries {
        println!(
            "{:<8} {:<40} {:>8}  {}",
            entry.id,
            entry.title,
            entry.duration_label().unwrap_or_default(),
            created_label(entry),
        );
    }
    eprintln!("{} video(s)", entries.len());
    Ok(())
}

pub async fn cmd_info(config: &PlayerConfig, id: &str) -> Result<()> {
    let catalog = catalog_client(config)?;
    let item = catalog
        .get(id)
        .await
        .with_context(|| format!("looking up video {id}"))?;

    println!("Title:    {}", item.entry.title);
    println!("ID:       {}", item.entry.id);
    if let Some(length) = item.entry.duration_label() {
        println!("Length:   {length}");
    }
    let added = created_label(&item.entry);
    if !added.is_empty() {
        println!("Added:    {added}");
    }
    match catalog.stream_url(&item) {
        Ok(url) => println!("Stream:   {url}"),
        Err(e) => println!("Stream:   unavailable ({e})"),
    }
    if let Some(thumb) = &item.entry.thumbnail_url {
        println!("Poster:   {thumb}");
    }
    if let Some(description) = &item.description {
        println!("\n{description}");
    }
    Ok(())
}
