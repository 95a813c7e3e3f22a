//! CLI smoke entry point.
//!
//! Loads an optional JSON config, opens the taxonomy database and prints the
//! root level of the tag/category tree.

use log::info;
use std::process::ExitCode;
use taxonomy_core::{
    core_version, Parent, SqliteTaxonomyStore, TaxonomyConfig, TaxonomyItem, TaxonomyService,
};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("taxonomy_cli error={err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => TaxonomyConfig::load(path)?,
        None => TaxonomyConfig::default(),
    };
    config.init_logging()?;
    info!(
        "event=cli_start module=cli status=ok version={} cycle_check={}",
        core_version(),
        config.cycle_check.as_str()
    );

    let conn = config.open_connection()?;
    let store = SqliteTaxonomyStore::try_new(&conn)?;
    let service = TaxonomyService::new(store, config.cycle_check)?;

    println!("taxonomy_core version={}", core_version());
    let tree = service.tree();
    for item in tree.children(Parent::Root).unwrap_or_default() {
        let Some(node) = tree.node(*item) else {
            continue;
        };
        match node.item() {
            TaxonomyItem::Category(category) => println!(
                "[category] {} tags={} categories={}",
                category.name, category.tag_counter, category.category_counter
            ),
            TaxonomyItem::Tag(tag) => println!("[tag] {}", tag.name),
        }
    }
    Ok(())
}
