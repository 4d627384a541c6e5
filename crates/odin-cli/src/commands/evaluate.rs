use std::path::Path;

use odin_core::ModelAttr;
use odin_metrics::{GridEntry, evaluate_grid};

use super::fmt_rate;

pub fn run(
    model: &str,
    postfix: &str,
    root: &str,
    delta_num: usize,
    top: usize,
    output_path: Option<&str>,
) {
    let attr = ModelAttr::new(model, postfix);
    let mut report =
        evaluate_grid(Path::new(root), &attr, delta_num).unwrap_or_else(|e| super::fail(e));
    if report.entries.is_empty() {
        super::fail(format!("no score files for {attr} under {root}"));
    }

    if let Some(path) = output_path {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => match std::fs::write(path, json) {
                Ok(()) => println!("Report saved to: {path}\n"),
                Err(e) => eprintln!("Failed to write report to {path}: {e}"),
            },
            Err(e) => eprintln!("Failed to serialize report: {e}"),
        }
    }

    report.sort_by_odin_fpr();
    let shown = if top == 0 { report.entries.len() } else { top.min(report.entries.len()) };

    println!("{attr}: {} grid point(s) under {root}", report.entries.len());
    println!("{}", "=".repeat(78));
    println!(
        "{:>6} {:>8} {:>10} {:>10} {:>10} {:>10} {:>9} {:>9}",
        "T", "eps", "FPR base", "FPR ODIN", "AUROC b", "AUROC O", "DetErr b", "DetErr O"
    );
    println!("{}", "-".repeat(78));
    for entry in report.entries.iter().take(shown) {
        print_row(entry);
    }

    match report.best() {
        Some(best) => println!(
            "\nBest: T={} eps={:?} (FPR at TPR95 {} -> {})",
            best.param.temperature,
            best.param.magnitude,
            fmt_rate(best.base.map(|r| r.fpr)),
            fmt_rate(best.odin_fpr())
        ),
        None => println!("\nNo grid point reached TPR95 for ODIN scores."),
    }
}

fn print_row(e: &GridEntry) {
    println!(
        "{:>6} {:>8} {:>10} {:>10} {:>10.4} {:>10.4} {:>9.4} {:>9.4}",
        e.param.temperature,
        format!("{:?}", e.param.magnitude),
        fmt_rate(e.base.map(|r| r.fpr)),
        fmt_rate(e.odin_fpr()),
        e.auroc_base,
        e.auroc_odin,
        e.detection_error_base,
        e.detection_error_odin
    );
}
