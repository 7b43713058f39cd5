//! Rule Checking Harness
//!
//! Sweeps a rules directory, loads every rule, compiles every detection
//! section to a Stellar query, and reports what failed or degraded to a
//! diagnostic.

use sigmaview::compiler::{self, NO_DETECTION_LOGIC};
use sigmaview::config::AppConfig;
use sigmaview::{grouping, loader};
use std::collections::HashMap;
use std::time::Instant;

/// Checking statistics
#[derive(Default)]
struct CheckStats {
    total_loaded: usize,
    no_detection: usize,
    diagnostic_compiles: Vec<String>,
    aggregation_compiles: Vec<String>,
    by_group: HashMap<String, usize>,
}

fn main() {
    println!("═══════════════════════════════════════════════════");
    println!("Sigmaview Rule Checking Harness");
    println!("═══════════════════════════════════════════════════");
    println!();

    let cfg = AppConfig::new().unwrap_or_default();
    let rules_dir = std::env::args()
        .nth(1)
        .map(Into::into)
        .unwrap_or(cfg.rules.path);

    println!("Loading rules from: {:?}", rules_dir);
    let start = Instant::now();

    let records = match loader::load_rules(&rules_dir) {
        Ok(records) => records,
        Err(err) => {
            println!("❌ Failed to load rules: {}", err);
            std::process::exit(1);
        }
    };

    println!(
        "✓ Loaded {} rules in {:.2?}",
        records.len(),
        start.elapsed()
    );
    println!();

    let mut stats = CheckStats {
        total_loaded: records.len(),
        ..Default::default()
    };

    for (group, rules) in grouping::group_rules(&records, None) {
        stats.by_group.insert(group, rules.len());
    }

    println!("═══════════════════════════════════════════════════");
    println!("Phase 1: Detection Compilation");
    println!("═══════════════════════════════════════════════════");

    for record in &records {
        let Some(detection) = loader::detection_of(record) else {
            stats.no_detection += 1;
            continue;
        };

        let query = compiler::compile(&detection);
        if query == NO_DETECTION_LOGIC {
            stats.diagnostic_compiles.push(record.file_path.clone());
        } else if query.contains("# Count aggregation:") || query.contains("# Near aggregation:")
        {
            stats.aggregation_compiles.push(record.file_path.clone());
        }
    }

    println!();
    print_summary(&stats);
}

fn print_summary(stats: &CheckStats) {
    println!("═══════════════════════════════════════════════════");
    println!("Check Summary");
    println!("═══════════════════════════════════════════════════");
    println!("  Total rules loaded:        {}", stats.total_loaded);
    println!("  Without detection section: {}", stats.no_detection);
    println!(
        "  Diagnostic compiles:       {}",
        stats.diagnostic_compiles.len()
    );
    println!(
        "  Unsupported aggregations:  {}",
        stats.aggregation_compiles.len()
    );
    println!();

    if !stats.by_group.is_empty() {
        println!("Breakdown by product:");
        let mut groups: Vec<_> = stats.by_group.iter().collect();
        groups.sort_by(|a, b| b.1.cmp(a.1));
        for (group, count) in groups {
            println!("  {:25} {:>5} rules", group, count);
        }
        println!();
    }

    if !stats.diagnostic_compiles.is_empty() {
        println!("Rules that compiled to a diagnostic (first 10):");
        for path in stats.diagnostic_compiles.iter().take(10) {
            println!("  {}", path);
        }
        if stats.diagnostic_compiles.len() > 10 {
            println!("  ... and {} more", stats.diagnostic_compiles.len() - 10);
        }
    }
}
