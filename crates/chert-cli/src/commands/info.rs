//! Info command - show the file header and derived geometry.

use std::path::Path;

use anyhow::{Context, Result};
use chert_store::{FILE_HEADER_LENGTH, index_entry_length, read_file_header};

pub fn run(path: &str) -> Result<()> {
    let header = read_file_header(Path::new(path))
        .with_context(|| format!("failed to read the file header of {path}"))?;
    let file_length = std::fs::metadata(path)
        .with_context(|| format!("failed to stat {path}"))?
        .len();

    let entry_length = index_entry_length(header.max_key_length);
    let index_end = FILE_HEADER_LENGTH + u64::from(header.num_records) * entry_length;

    println!("Store File Information");
    println!("----------------------");
    println!("Path:             {path}");
    println!("Max key length:   {}", header.max_key_length);
    println!("Records:          {}", header.num_records);
    println!("Slot length:      {entry_length}");
    println!("Index region end: {index_end}");
    println!("Data start:       {}", header.data_start_ptr);
    println!(
        "Front free space: {}",
        header.data_start_ptr.saturating_sub(index_end)
    );
    println!("File length:      {file_length}");

    Ok(())
}
