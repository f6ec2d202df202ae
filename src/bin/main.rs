// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use chrono::Utc;
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use marketplace_engine_rs::{Engine, EventKind, ProductId, Sku};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;

/// Inventory batch processor - replay stock event CSV files
///
/// Reads inventory events from a CSV file, streams them through the
/// engine, and outputs product stock snapshots to stdout.
#[derive(Parser, Debug)]
#[command(name = "marketplace-engine-rs")]
#[command(about = "Replays inventory event CSVs into product stock snapshots", long_about = None)]
struct Args {
    /// Path to CSV file with inventory events
    ///
    /// Expected format: type,product,sku,quantity,note
    /// Example: cargo run -- events.csv > stock.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = match process_events(BufReader::new(file)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error processing events: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_stock(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, product, sku, quantity, note`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    event_type: String,
    product: u32,
    #[serde(default)]
    sku: Option<String>,
    quantity: i64,
    #[serde(default)]
    note: Option<String>,
}

impl CsvRecord {
    /// Converts the CSV record into engine inputs.
    ///
    /// Returns `None` for unrecognized event types.
    fn into_event(self) -> Option<(ProductId, Option<Sku>, EventKind, i64, Option<String>)> {
        let kind = match self.event_type.to_lowercase().as_str() {
            "adjust" => EventKind::Adjust,
            "sale" => EventKind::Sale,
            "return" => EventKind::Return,
            "reserve" => EventKind::Reserve,
            "release" => EventKind::Release,
            _ => return None,
        };
        let sku = self.sku.filter(|s| !s.is_empty()).map(Sku);
        Some((ProductId(self.product), sku, kind, self.quantity, self.note))
    }
}

/// Process inventory events from a CSV reader.
///
/// Streaming parse, so arbitrarily large files never load fully into
/// memory. Products are registered at zero stock on first sight, matching
/// a replay from an empty store. Malformed rows and invalid events are
/// skipped.
///
/// # CSV Format
///
/// Expected columns: `type, product, sku, quantity, note`
/// - `type`: Event type (adjust, sale, return, reserve, release)
/// - `product`: Product ID (u32)
/// - `sku`: Variant SKU (optional)
/// - `quantity`: Signed quantity (sign conventions depend on type)
/// - `note`: Free-text note (optional)
///
/// # Example
///
/// ```csv
/// type,product,sku,quantity,note
/// adjust,1,,100,initial stock
/// sale,1,,3,
/// return,1,,1,damaged box
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is
/// invalid. Individual event errors don't stop processing.
pub fn process_events<R: Read>(reader: R) -> Result<Engine, csv::Error> {
    let engine = Engine::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All) // Handle whitespace in fields like " sale "
        .flexible(true) // Allow missing sku/note fields
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let Some((product_id, sku, kind, quantity, note)) = record.into_event() else {
                    tracing::debug!("skipping record with unrecognized event type");
                    continue;
                };

                // Register on first sight; an existing record is fine.
                let _ = engine.add_product(product_id, 0);

                if let Err(e) =
                    engine.record_stock_event(product_id, sku, kind, quantity, note, Utc::now())
                {
                    tracing::debug!(product = %product_id, error = %e, "skipping event");
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed row");
                continue;
            }
        }
    }

    Ok(engine)
}

/// Write product stock snapshots to a CSV writer.
///
/// # CSV Format
///
/// Columns: `product, stock`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_stock<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for product in engine.products() {
        wtr.serialize(product.value())?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_simple_adjust() {
        let csv = "type,product,sku,quantity,note\nadjust,1,,100,\n";
        let engine = process_events(Cursor::new(csv)).unwrap();

        assert_eq!(engine.product_stock(&ProductId(1)), Some(100));
    }

    #[test]
    fn parse_adjust_and_sale() {
        let csv = "type,product,sku,quantity,note\n\
                   adjust,1,,100,\n\
                   sale,1,,30,\n";
        let engine = process_events(Cursor::new(csv)).unwrap();

        assert_eq!(engine.product_stock(&ProductId(1)), Some(70));
    }

    #[test]
    fn parse_reserve_release_roundtrip() {
        let csv = "type,product,sku,quantity,note\n\
                   adjust,1,,10,\n\
                   reserve,1,,4,\n\
                   release,1,,4,\n";
        let engine = process_events(Cursor::new(csv)).unwrap();

        assert_eq!(engine.product_stock(&ProductId(1)), Some(10));
        assert_eq!(engine.journal().len(), 3);
    }

    #[test]
    fn oversell_clamps_at_zero() {
        let csv = "type,product,sku,quantity,note\n\
                   adjust,1,,5,\n\
                   sale,1,,8,\n";
        let engine = process_events(Cursor::new(csv)).unwrap();

        assert_eq!(engine.product_stock(&ProductId(1)), Some(0));
    }

    #[test]
    fn parse_with_whitespace() {
        let csv = "type,product,sku,quantity,note\n adjust , 1 ,, 100 ,\n";
        let engine = process_events(Cursor::new(csv)).unwrap();

        assert_eq!(engine.product_stock(&ProductId(1)), Some(100));
    }

    #[test]
    fn skip_malformed_rows() {
        let csv = "type,product,sku,quantity,note\n\
                   adjust,1,,100,\n\
                   bogus,row,data,here,now\n\
                   adjust,2,,50,\n";
        let engine = process_events(Cursor::new(csv)).unwrap();

        assert_eq!(engine.product_stock(&ProductId(1)), Some(100));
        assert_eq!(engine.product_stock(&ProductId(2)), Some(50));
    }

    #[test]
    fn zero_quantity_event_is_skipped() {
        let csv = "type,product,sku,quantity,note\n\
                   adjust,1,,0,\n\
                   adjust,1,,10,\n";
        let engine = process_events(Cursor::new(csv)).unwrap();

        assert_eq!(engine.product_stock(&ProductId(1)), Some(10));
        // Only the valid event reached the journal.
        assert_eq!(engine.journal().len(), 1);
    }

    #[test]
    fn sku_column_is_attached_to_events() {
        let csv = "type,product,sku,quantity,note\nadjust,1,RED-XL,5,\n";
        let engine = process_events(Cursor::new(csv)).unwrap();

        let events = engine.journal().for_product(ProductId(1));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].variant_sku, Some(Sku("RED-XL".to_string())));
    }

    #[test]
    fn write_stock_to_csv() {
        let csv_input = "type,product,sku,quantity,note\n\
                         adjust,1,,100,\n\
                         adjust,2,,200,\n";
        let engine = process_events(Cursor::new(csv_input)).unwrap();

        let mut output = Vec::new();
        write_stock(&engine, &mut output).unwrap();

        let output_str = String::from_utf8(output).unwrap();
        assert!(output_str.contains("product,stock"));
        assert!(output_str.contains("1,100"));
        assert!(output_str.contains("2,200"));
    }

    #[test]
    fn multiple_products() {
        let csv = "type,product,sku,quantity,note\n\
                   adjust,3,,10,\n\
                   adjust,1,,20,\n\
                   adjust,2,,30,\n";
        let engine = process_events(Cursor::new(csv)).unwrap();

        assert_eq!(engine.product_stock(&ProductId(1)), Some(20));
        assert_eq!(engine.product_stock(&ProductId(2)), Some(30));
        assert_eq!(engine.product_stock(&ProductId(3)), Some(10));
    }
}
