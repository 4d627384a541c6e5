//! Score files: one `temperature, magnitude, score` line per image.
//!
//! # Layout
//!
//! ```text
//! softmax_scores/
//!   {temperature}_{magnitude}/
//!     {model_name}_{postfix}_Base_In.txt
//!     {model_name}_{postfix}_Base_Out.txt
//!     {model_name}_{postfix}_ODIN_In.txt
//!     {model_name}_{postfix}_ODIN_Out.txt
//! ```

use std::fmt::Debug;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::ModelAttr;
use crate::param::OdinParam;

/// Default root directory of the score tree.
pub const DEFAULT_SCORE_ROOT: &str = "softmax_scores";

/// Which image population a score file covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Distribution {
    In,
    Out,
}

impl Distribution {
    pub const ALL: [Distribution; 2] = [Distribution::In, Distribution::Out];
}

impl std::fmt::Display for Distribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::In => write!(f, "In"),
            Self::Out => write!(f, "Out"),
        }
    }
}

/// How the confidence in a score file was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreMode {
    /// Stored softmax maximum, no temperature, no perturbation.
    Base,
    /// Perturbed input, temperature-scaled softmax maximum.
    Odin,
}

impl std::fmt::Display for ScoreMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Base => write!(f, "Base"),
            Self::Odin => write!(f, "ODIN"),
        }
    }
}

/// Path of one score file under `root`.
pub fn score_path(
    root: &Path,
    param: OdinParam,
    attr: &ModelAttr,
    mode: ScoreMode,
    dist: Distribution,
) -> PathBuf {
    root.join(param.label())
        .join(format!("{}_{mode}_{dist}.txt", attr.stem()))
}

/// One parsed score line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRecord {
    pub temperature: u32,
    pub magnitude: f64,
    pub score: f64,
}

impl ScoreRecord {
    /// Parse `temperature, magnitude, score`. Surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split(',').map(str::trim);
        let temperature = fields.next()?.parse::<f64>().ok()?;
        let magnitude = fields.next()?.parse().ok()?;
        let score = fields.next()?.parse().ok()?;
        if fields.next().is_some() || temperature < 0.0 || temperature.fract() != 0.0 {
            return None;
        }
        Some(Self {
            temperature: temperature as u32,
            magnitude,
            score,
        })
    }
}

/// Format one score line (without the newline).
///
/// Floats use their `Debug` form: the shortest representation that
/// round-trips, with a trailing `.0` for integral values. `f32` scores
/// therefore print with `f32` precision.
pub fn format_line<S: Debug>(param: OdinParam, score: S) -> String {
    format!("{}, {:?}, {:?}", param.temperature, param.magnitude, score)
}

/// Buffered writer for one score file. Creating it truncates the file.
pub struct ScoreWriter {
    path: PathBuf,
    param: OdinParam,
    writer: BufWriter<File>,
    lines: usize,
}

impl ScoreWriter {
    /// Create (or truncate) `path`, creating parent directories as needed.
    pub fn create(path: PathBuf, param: OdinParam) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            param,
            lines: 0,
        })
    }

    /// Append one record tagged with this file's grid point.
    pub fn append<S: Debug>(&mut self, score: S) -> Result<()> {
        writeln!(self.writer, "{}", format_line(self.param, score))
            .map_err(|e| Error::io(&self.path, e))?;
        self.lines += 1;
        Ok(())
    }

    /// Flush and close. Returns the number of lines written.
    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush().map_err(|e| Error::io(&self.path, e))?;
        Ok(self.lines)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read every record of a score file, in file order. Blank lines are skipped.
pub fn read_records(path: &Path) -> Result<Vec<ScoreRecord>> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            ScoreRecord::parse(line).ok_or_else(|| Error::ScoreFile {
                path: path.to_path_buf(),
                line: idx + 1,
                message: format!("expected 'temperature, magnitude, score', got '{line}'"),
            })
        })
        .collect()
}

/// Third column of every line of a score file.
pub fn read_scores(path: &Path) -> Result<Vec<f64>> {
    Ok(read_records(path)?.into_iter().map(|r| r.score).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(t: u32, m: f64) -> OdinParam {
        OdinParam::new(t, m).unwrap()
    }

    #[test]
    fn test_score_path_naming() {
        let attr = ModelAttr::new("DenseNet201", "best_balanced_acc");
        let p = score_path(
            Path::new("softmax_scores"),
            param(1000, 0.0014),
            &attr,
            ScoreMode::Odin,
            Distribution::Out,
        );
        assert_eq!(
            p,
            PathBuf::from("softmax_scores/1000_0.0014/DenseNet201_best_balanced_acc_ODIN_Out.txt")
        );
        let p = score_path(Path::new("s"), param(1, 0.0), &attr, ScoreMode::Base, Distribution::In);
        assert_eq!(p, PathBuf::from("s/1_0.0/DenseNet201_best_balanced_acc_Base_In.txt"));
    }

    #[test]
    fn test_format_line_matches_existing_files() {
        assert_eq!(format_line(param(1, 0.0), 0.5_f64), "1, 0.0, 0.5");
        assert_eq!(format_line(param(1000, 0.0002), 1.0_f64), "1000, 0.0002, 1.0");
        assert_eq!(format_line(param(2, 0.004), 0.125_f32), "2, 0.004, 0.125");
        // f32 scores keep f32 precision rather than widening noise.
        assert_eq!(format_line(param(5, 0.001), 0.9_f32), "5, 0.001, 0.9");
    }

    #[test]
    fn test_parse_record() {
        let r = ScoreRecord::parse("1000, 0.0014, 0.10043").unwrap();
        assert_eq!(r.temperature, 1000);
        assert_eq!(r.magnitude, 0.0014);
        assert_eq!(r.score, 0.10043);
        // Whitespace-free and float-formatted temperatures are accepted too.
        assert_eq!(ScoreRecord::parse("1.0,0.0,0.5").unwrap().temperature, 1);
        assert!(ScoreRecord::parse("1, 0.0").is_none());
        assert!(ScoreRecord::parse("1, 0.0, x").is_none());
        assert!(ScoreRecord::parse("1, 0.0, 0.5, 9").is_none());
    }

    #[test]
    fn test_writer_truncates_and_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let attr = ModelAttr::new("Xception", "latest");
        let path =
            score_path(tmp.path(), param(2, 0.0002), &attr, ScoreMode::Base, Distribution::In);

        let mut w = ScoreWriter::create(path.clone(), param(2, 0.0002)).unwrap();
        w.append(0.25_f64).unwrap();
        w.append(0.75_f64).unwrap();
        w.append(0.5_f64).unwrap();
        assert_eq!(w.finish().unwrap(), 3);

        let mut w = ScoreWriter::create(path.clone(), param(2, 0.0002)).unwrap();
        w.append(0.9_f32).unwrap();
        assert_eq!(w.path(), path.as_path());
        w.finish().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "2, 0.0002, 0.9\n");
        assert_eq!(read_scores(&path).unwrap(), vec![0.9]);
    }

    #[test]
    fn test_read_records_reports_bad_line() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.txt");
        fs::write(&path, "1, 0.0, 0.5\n\n1, 0.0, oops\n").unwrap();
        match read_records(&path).unwrap_err() {
            Error::ScoreFile { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error {other}"),
        }
    }
}
