use std::path::{Path, PathBuf};
use std::time::Instant;

use log::debug;
use odin_core::{ChannelLayout, DiskImageLoader, ModelStore, SweepConfig};

pub struct SweepCommandConfig<'a> {
    pub config_path: Option<&'a str>,
    pub pred_result_folder: Option<&'a str>,
    pub image_folder: Option<&'a str>,
    pub out_dist_pred_result_folder: Option<&'a str>,
    pub out_dist_image_folder: Option<&'a str>,
    pub model_folder: Option<&'a str>,
    pub num_classes: Option<usize>,
    pub output_dir: Option<&'a str>,
    pub channel_layout: Option<&'a str>,
    pub models: Option<&'a str>,
    pub postfixes: Option<&'a str>,
    pub temperatures: Option<&'a str>,
    pub magnitudes: Option<&'a str>,
}

pub fn run(cmd: SweepCommandConfig<'_>) {
    let config = build_config(&cmd).unwrap_or_else(|e| super::fail(e));
    if let Err(e) = config.validate() {
        super::fail(e);
    }
    debug!("{config:?}");

    let grid_points = config.temperatures.len() * config.magnitudes.len();
    println!(
        "ODIN sweep: {} model(s) x {} grid point(s) -> {}",
        config.model_names.len() * config.postfixes.len(),
        grid_points,
        config.output_dir.display()
    );

    let t0 = Instant::now();
    let mut models = ModelStore::new(&config.model_folder, config.channel_layout);
    let summary = odin_core::sweep::run(&config, &mut models, &DiskImageLoader)
        .unwrap_or_else(|e| super::fail(e));

    println!(
        "\nDone in {:.1}s: {} model(s), {} score file(s), {} ODIN score(s)",
        t0.elapsed().as_secs_f64(),
        summary.models,
        summary.files_written,
        summary.odin_scores
    );
}

fn build_config(cmd: &SweepCommandConfig<'_>) -> Result<SweepConfig, String> {
    let mut config = match cmd.config_path {
        Some(path) => SweepConfig::from_json_file(Path::new(path)).map_err(|e| e.to_string())?,
        None => SweepConfig::default(),
    };

    let folders = [
        (cmd.pred_result_folder, &mut config.pred_result_folder),
        (cmd.image_folder, &mut config.image_folder),
        (cmd.out_dist_pred_result_folder, &mut config.out_dist_pred_result_folder),
        (cmd.out_dist_image_folder, &mut config.out_dist_image_folder),
        (cmd.model_folder, &mut config.model_folder),
        (cmd.output_dir, &mut config.output_dir),
    ];
    for (flag, field) in folders {
        if let Some(value) = flag {
            *field = PathBuf::from(value);
        }
    }

    if let Some(n) = cmd.num_classes {
        config.num_classes = n;
    }
    if let Some(layout) = cmd.channel_layout {
        config.channel_layout = layout.parse::<ChannelLayout>().map_err(|e| e.to_string())?;
    }
    if let Some(models) = cmd.models {
        config.model_names = super::parse_list("models", models)?;
    }
    if let Some(postfixes) = cmd.postfixes {
        config.postfixes = super::parse_list("postfixes", postfixes)?;
    }
    if let Some(temperatures) = cmd.temperatures {
        config.temperatures = super::parse_list("temperatures", temperatures)?;
    }
    if let Some(magnitudes) = cmd.magnitudes {
        config.magnitudes = super::parse_list("magnitudes", magnitudes)?;
    }
    Ok(config)
}
