use odin_core::ARCHITECTURES;

pub fn run() {
    println!(
        "{:<14} {:>9} {:>14} {:>10}",
        "Architecture", "Input", "Preprocessing", "Norm. eps"
    );
    println!("{}", "-".repeat(50));
    for spec in ARCHITECTURES {
        let (h, w) = spec.input_size;
        println!(
            "{:<14} {:>9} {:>14} {:>10}",
            spec.name,
            format!("{h}x{w}"),
            spec.preprocessing.to_string(),
            if spec.normalize_perturbations { "yes" } else { "no" }
        );
    }
}
