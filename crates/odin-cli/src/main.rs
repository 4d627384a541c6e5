//! CLI for odin: out-of-distribution scores for skin-lesion classifiers.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "odin")]
#[command(about = "odin: ODIN out-of-distribution scores and TPR95 evaluation")]
#[command(version = odin_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write Base and ODIN score files for every model over the temperature x magnitude grid.
    /// Flags override values from --config.
    Sweep {
        /// JSON sweep config; missing fields take their defaults
        #[arg(long)]
        config: Option<String>,

        /// In-distribution prediction tables ({model}_{postfix}.csv)
        #[arg(long)]
        pred_result_folder: Option<String>,

        /// In-distribution images
        #[arg(long)]
        image_folder: Option<String>,

        /// Out-of-distribution prediction tables
        #[arg(long)]
        out_dist_pred_result_folder: Option<String>,

        /// Out-of-distribution images
        #[arg(long)]
        out_dist_image_folder: Option<String>,

        /// Model artifacts ({model}_{postfix}.json)
        #[arg(long)]
        model_folder: Option<String>,

        /// Number of lesion classes in the prediction tables
        #[arg(long)]
        num_classes: Option<usize>,

        /// Root of the score tree (default: softmax_scores)
        #[arg(long)]
        output_dir: Option<String>,

        /// Image tensor layout
        #[arg(long, value_parser = ["channels_last", "channels_first"])]
        channel_layout: Option<String>,

        /// Comma-separated architecture names
        #[arg(long)]
        models: Option<String>,

        /// Comma-separated checkpoint postfixes
        #[arg(long)]
        postfixes: Option<String>,

        /// Comma-separated temperatures
        #[arg(long)]
        temperatures: Option<String>,

        /// Comma-separated perturbation magnitudes
        #[arg(long)]
        magnitudes: Option<String>,
    },

    /// FPR at 95% TPR for baseline and ODIN scores of one model and grid point
    Tpr95 {
        base_in: String,
        base_out: String,
        odin_in: String,
        odin_out: String,
    },

    /// Evaluate every grid point of one model under a score tree and rank them
    Evaluate {
        /// Architecture name
        #[arg(long)]
        model: String,

        /// Checkpoint postfix
        #[arg(long)]
        postfix: String,

        /// Root of the score tree
        #[arg(long, default_value = odin_core::DEFAULT_SCORE_ROOT)]
        root: String,

        /// Thresholds scanned per metric
        #[arg(long, default_value_t = odin_metrics::DEFAULT_DELTA_NUM)]
        delta_num: usize,

        /// Rows to print (0 = all)
        #[arg(long, default_value = "10")]
        top: usize,

        /// Write the full report as JSON
        #[arg(long)]
        output: Option<String>,
    },

    /// List the supported backbones
    Architectures,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sweep {
            config,
            pred_result_folder,
            image_folder,
            out_dist_pred_result_folder,
            out_dist_image_folder,
            model_folder,
            num_classes,
            output_dir,
            channel_layout,
            models,
            postfixes,
            temperatures,
            magnitudes,
        } => commands::sweep::run(commands::sweep::SweepCommandConfig {
            config_path: config.as_deref(),
            pred_result_folder: pred_result_folder.as_deref(),
            image_folder: image_folder.as_deref(),
            out_dist_pred_result_folder: out_dist_pred_result_folder.as_deref(),
            out_dist_image_folder: out_dist_image_folder.as_deref(),
            model_folder: model_folder.as_deref(),
            num_classes,
            output_dir: output_dir.as_deref(),
            channel_layout: channel_layout.as_deref(),
            models: models.as_deref(),
            postfixes: postfixes.as_deref(),
            temperatures: temperatures.as_deref(),
            magnitudes: magnitudes.as_deref(),
        }),
        Commands::Tpr95 {
            base_in,
            base_out,
            odin_in,
            odin_out,
        } => commands::tpr95::run(&base_in, &base_out, &odin_in, &odin_out),
        Commands::Evaluate {
            model,
            postfix,
            root,
            delta_num,
            top,
            output,
        } => commands::evaluate::run(&model, &postfix, &root, delta_num, top, output.as_deref()),
        Commands::Architectures => commands::architectures::run(),
    }
}
