//! Shardpage - Command Line Interface
//!
//! A diagnostic harness for the paginated shard access layer: loads a shard
//! descriptor snapshot from a JSON file, pages through the shard data in
//! object storage, and prints the assembled page as JSON.
//!
//! # Commands
//!
//! - **`page`** - Fetch one page of deduplicated rows from a source
//!
//! # Usage Examples
//!
//! ```bash
//! # Page 1, 100 rows, newest shards first
//! shardpage page descriptors.json reddit 1 100
//!
//! # Sorted and filtered
//! shardpage page descriptors.json reddit 2 50 --sort-key created_at --desc --search-key rustlang
//!
//! # Show help
//! shardpage --help
//! ```
//!
//! The descriptor snapshot is a JSON array of shard descriptors, as exported
//! from the metadata store. Object storage credentials and the endpoint come
//! from the standard AWS environment variables (`AWS_ACCESS_KEY_ID`,
//! `AWS_SECRET_ACCESS_KEY`, `AWS_ENDPOINT`, ...).
//!
//! # Exit Codes
//!
//! - `0` - Success
//! - `1` - General error (invalid arguments, request failure)

use shardpage::credit_gate::UnmeteredGate;
use shardpage::metadata_store::{InMemoryMetadataStore, ShardDescriptor, SortDirection};
use shardpage::{DataService, PageRequest};
use std::env;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() == 2 && (args[1] == "--help" || args[1] == "-h") {
        print_help();
        return;
    }

    if args.len() < 2 {
        eprintln!("Error: no command given\n");
        print_help();
        process::exit(1);
    }

    match args[1].as_str() {
        "page" => {
            if args.len() < 6 {
                eprintln!("Error: 'page' requires <descriptors.json> <source> <page_number> <page_size>\n");
                print_help();
                process::exit(1);
            }
            handle_page(&args[2], &args[3], &args[4], &args[5], &args[6..]).await;
        }
        other => {
            eprintln!("Error: Unknown command '{}'\n", other);
            print_help();
            process::exit(1);
        }
    }
}

/// Handles the `page` command: one request against a descriptor snapshot.
async fn handle_page(
    descriptors_path: &str,
    source_name: &str,
    page_number: &str,
    page_size: &str,
    options: &[String],
) {
    let page_number: u64 = match page_number.parse() {
        Ok(n) => n,
        Err(_) => {
            eprintln!("Error: page_number must be a positive integer");
            process::exit(1);
        }
    };
    let page_size: u64 = match page_size.parse() {
        Ok(n) => n,
        Err(_) => {
            eprintln!("Error: page_size must be a positive integer");
            process::exit(1);
        }
    };

    let mut request = PageRequest::latest(source_name, page_number, page_size);
    let mut options = options.iter();
    while let Some(option) = options.next() {
        match option.as_str() {
            "--sort-key" => match options.next() {
                Some(value) => request.sort_key = Some(value.clone()),
                None => {
                    eprintln!("Error: --sort-key requires a value");
                    process::exit(1);
                }
            },
            "--search-key" => match options.next() {
                Some(value) => request.search_key = Some(value.clone()),
                None => {
                    eprintln!("Error: --search-key requires a value");
                    process::exit(1);
                }
            },
            "--desc" => request.sort_direction = SortDirection::Descending,
            other => {
                eprintln!("Error: unknown option '{}'", other);
                process::exit(1);
            }
        }
    }

    let descriptors = match load_descriptors(descriptors_path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: could not load descriptors from '{}': {}", descriptors_path, e);
            process::exit(1);
        }
    };

    let metadata_store = Arc::new(InMemoryMetadataStore::new());
    for descriptor in descriptors {
        metadata_store.insert(descriptor).await;
    }

    // A diagnostic run is not metered; billing lives in the API layer
    let service = DataService::new(metadata_store, Arc::new(UnmeteredGate));

    match service.get_page(&request, "cli").await {
        Ok(response) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&response)
                    .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
            );
            eprintln!(
                "\n✓ {} rows from {} shard files in {:.3}s (metadata {:.3}s, object store {:.3}s)",
                response.data.len(),
                response.files_read,
                response.total_duration,
                response.metadata_store_duration,
                response.object_store_duration
            );
        }
        Err(e) => {
            eprintln!("\n✗ Request failed: {}", e);
            process::exit(1);
        }
    }
}

fn load_descriptors(
    path: &str,
) -> Result<Vec<ShardDescriptor>, Box<dyn std::error::Error + Send + Sync>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn print_help() {
    let program = env::args()
        .next()
        .unwrap_or_else(|| "shardpage".to_string());
    println!("Shardpage - paginated, deduplicated access to CSV shards");
    println!();
    println!("USAGE:");
    println!("  {} page <descriptors.json> <source> <page_number> <page_size> [options]", program);
    println!("  {} --help", program);
    println!();
    println!("COMMANDS:");
    println!("  page               Fetch one page of deduplicated rows from a source");
    println!();
    println!("OPTIONS:");
    println!("  --sort-key <field>    Sort shards by a descriptor field");
    println!("  --search-key <key>    Only shards tagged with this search key");
    println!("  --desc                Sort descending (default ascending)");
    println!("  --help, -h            Show this help message");
    println!();
    println!("EXAMPLES:");
    println!("  # Latest reddit data, page 1, 100 rows");
    println!("  {} page descriptors.json reddit 1 100", program);
    println!();
    println!("  # Filtered by search key, newest shards first");
    println!("  {} page descriptors.json reddit 1 50 --search-key rustlang", program);
    println!();
    println!("NOTE:");
    println!("  - The descriptor snapshot is a JSON array exported from the metadata store");
    println!("  - Object storage credentials come from the AWS environment variables");
}
