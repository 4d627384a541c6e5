//! Per-image softmax predictions exported by the classifier.
//!
//! Tables are comma-separated with a header row. Column 0 holds the image
//! identifier, columns `1..=num_classes` the class probabilities; any further
//! columns are ignored.
//!
//! ```text
//! image,MEL,NV,BCC,AK,BKL,DF,VASC,SCC
//! ISIC_0000000,0.01,0.9,0.02,0.01,0.03,0.01,0.01,0.01
//! ```

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{Error, Result};

/// One image's stored prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRow {
    pub image: String,
    /// `{image_folder}/{image}.{extension}`.
    pub path: PathBuf,
    pub probabilities: Vec<f64>,
}

impl PredictionRow {
    /// Baseline confidence: the largest stored probability.
    pub fn max_probability(&self) -> f64 {
        self.probabilities
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Rows of a prediction table in file order.
#[derive(Debug, Clone)]
pub struct PredictionTable {
    pub rows: Vec<PredictionRow>,
}

impl PredictionTable {
    /// Read `path`, resolving image paths against `image_folder`.
    pub fn load(
        path: &Path,
        image_folder: &Path,
        extension: &str,
        num_classes: usize,
    ) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let table = Self::parse(&text, path, image_folder, extension, num_classes)?;
        debug!("{}: {} rows", path.display(), table.rows.len());
        Ok(table)
    }

    fn parse(
        text: &str,
        path: &Path,
        image_folder: &Path,
        extension: &str,
        num_classes: usize,
    ) -> Result<Self> {
        let fail = |line: usize, message: String| Error::PredictionTable {
            path: path.to_path_buf(),
            line,
            message,
        };

        let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
        let (_, header) = lines.next().ok_or_else(|| fail(1, "empty table".to_string()))?;
        let columns = header.split(',').count();
        if columns < num_classes + 1 {
            return Err(fail(
                1,
                format!("header has {columns} columns, need image + {num_classes} classes"),
            ));
        }

        let mut rows = Vec::new();
        for (idx, line) in lines {
            let line_no = idx + 1;
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < num_classes + 1 {
                return Err(fail(
                    line_no,
                    format!("expected at least {} fields, found {}", num_classes + 1, fields.len()),
                ));
            }
            let image = fields[0].to_string();
            if image.is_empty() {
                return Err(fail(line_no, "missing image identifier".to_string()));
            }

            let mut probabilities = Vec::with_capacity(num_classes);
            for field in &fields[1..=num_classes] {
                let p: f64 = field
                    .parse()
                    .map_err(|_| fail(line_no, format!("'{field}' is not a number")))?;
                if !p.is_finite() {
                    return Err(fail(line_no, format!("non-finite probability '{field}'")));
                }
                probabilities.push(p);
            }
            let total: f64 = probabilities.iter().sum();
            if (total - 1.0).abs() > 1e-3 {
                warn!(
                    "{} line {line_no}: probabilities for {image} sum to {total:.4}",
                    path.display()
                );
            }

            let path = image_folder.join(format!("{image}.{extension}"));
            rows.push(PredictionRow {
                image,
                path,
                probabilities,
            });
        }

        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Image paths in row order.
    pub fn image_paths(&self) -> Vec<PathBuf> {
        self.rows.iter().map(|r| r.path.clone()).collect()
    }

    /// Baseline confidences in row order.
    pub fn base_scores(&self) -> Vec<f64> {
        self.rows.iter().map(PredictionRow::max_probability).collect()
    }
}
