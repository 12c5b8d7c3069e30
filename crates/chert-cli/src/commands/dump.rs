//! Dump command - list every record in a store file.

use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine;
use chert_store::{Store, StoreOptions, read_file_header};

pub fn run(path: &str, hex: bool, no_payload_crc: bool, limit: Option<usize>) -> Result<()> {
    // The stored key length is authoritative; read it before opening
    let header = read_file_header(Path::new(path))
        .with_context(|| format!("failed to read the file header of {path}"))?;

    let options = StoreOptions {
        max_key_length: header.max_key_length,
        payload_crc: !no_payload_crc,
        ..StoreOptions::read_only()
    };
    let store = Store::open(path, options).with_context(|| format!("failed to open {path}"))?;

    let records = store.records().context("failed to list records")?;
    println!(
        "{path}: {} records, max key length {}, data start {}",
        records.len(),
        header.max_key_length,
        header.data_start_ptr
    );
    println!(
        "{:>6}  {:>12}  {:>10}  {:>10}  {:>10}  key",
        "slot", "pointer", "capacity", "length", "free"
    );

    let shown = limit.unwrap_or(records.len());
    for record in records.iter().take(shown) {
        println!(
            "{:>6}  {:>12}  {:>10}  {:>10}  {:>10}  {}",
            record.slot,
            record.data_pointer,
            record.data_capacity,
            record.data_count,
            record.free_space,
            render_key(&record.key, hex)
        );
    }
    if shown < records.len() {
        println!("... {} more", records.len() - shown);
    }

    Ok(())
}

fn render_key(key: &[u8], hex: bool) -> String {
    if hex {
        key.iter().map(|b| format!("{b:02x}")).collect()
    } else {
        base64::engine::general_purpose::STANDARD.encode(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_render_in_both_alphabets() {
        assert_eq!(render_key(b"abc", false), "YWJj");
        assert_eq!(render_key(b"abc", true), "616263");
        assert_eq!(render_key(&[0x00, 0xFF], true), "00ff");
    }
}
