use std::path::Path;

pub fn run(base_in: &str, base_out: &str, odin_in: &str, odin_out: &str) {
    let (fpr_base, fpr_odin) = odin_metrics::tpr95(
        Path::new(base_in),
        Path::new(base_out),
        Path::new(odin_in),
        Path::new(odin_out),
    )
    .unwrap_or_else(|e| super::fail(e));

    println!("fpr_base: {fpr_base}");
    println!("fpr_odin: {fpr_odin}");
}
