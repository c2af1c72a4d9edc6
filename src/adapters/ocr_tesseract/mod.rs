//! CPU OCR backend driving the `tesseract` command line tool.
//!
//! Frames are preprocessed (upscale + binarize), written to a temporary PNG
//! and fed through `tesseract ... tsv`, whose per-word confidence column
//! gives us a usable mean confidence.

use std::path::PathBuf;
use std::process::Command;

use image::GrayImage;
use tracing::{debug, trace};

use crate::adapters::preprocess_for_ocr;
use crate::config::{CaptureConfig, OcrConfig};
use crate::domain::errors::DomainError;
use crate::ports::{Recognition, TextRecognizer};
use crate::utils::path::resolve_tool;

pub struct TesseractRecognizer {
    binary: PathBuf,
    lang: String,
    psm: u32,
    scale: f32,
    threshold: u8,
}

impl TesseractRecognizer {
    /// Resolve and verify the tesseract binary. A missing or broken install
    /// is job-fatal before the first frame.
    pub fn new(ocr: &OcrConfig, capture: &CaptureConfig) -> Result<Self, DomainError> {
        let binary = resolve_tool("tesseract");
        let check = Command::new(&binary)
            .arg("--version")
            .output()
            .map_err(|e| DomainError::OcrInit(format!("tesseract not runnable: {e}")))?;
        if !check.status.success() {
            return Err(DomainError::OcrInit(format!(
                "tesseract --version exited with {}",
                check.status
            )));
        }
        debug!("using tesseract at {}", binary.display());
        Ok(Self {
            binary,
            lang: ocr.lang.clone(),
            psm: ocr.psm,
            scale: capture.scale,
            threshold: capture.threshold,
        })
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&mut self, image: &GrayImage) -> Result<Recognition, DomainError> {
        let prepared = preprocess_for_ocr(image, self.scale, self.threshold);

        let temp = tempfile::Builder::new()
            .prefix("killmark-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| DomainError::OcrFail(format!("temp file: {e}")))?;
        prepared
            .save(temp.path())
            .map_err(|e| DomainError::OcrFail(format!("frame encode: {e}")))?;

        let output = Command::new(&self.binary)
            .arg(temp.path())
            .arg("stdout")
            .args(["--psm", &self.psm.to_string()])
            .args(["-l", &self.lang])
            .arg("tsv")
            .output()
            .map_err(|e| DomainError::OcrFail(format!("tesseract spawn: {e}")))?;
        if !output.status.success() {
            return Err(DomainError::OcrFail(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let recognition = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        trace!(
            "recognized {} lines at {:.2} confidence",
            recognition.lines.len(),
            recognition.confidence
        );
        Ok(recognition)
    }
}

/// Reassemble words (level 5 rows) into text lines and average their
/// confidences. Tesseract reports confidence as 0-100, -1 for non-words.
fn parse_tsv(tsv: &str) -> Recognition {
    let mut lines: Vec<String> = Vec::new();
    let mut current_key: Option<(String, String, String)> = None;
    let mut current_words: Vec<String> = Vec::new();
    let mut conf_sum = 0.0f32;
    let mut conf_count = 0u32;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }
        if let Ok(conf) = cols[10].parse::<f32>() {
            if conf >= 0.0 {
                conf_sum += conf;
                conf_count += 1;
            }
        }
        let key = (
            cols[2].to_string(),
            cols[3].to_string(),
            cols[4].to_string(),
        );
        if current_key.as_ref() != Some(&key) {
            if !current_words.is_empty() {
                lines.push(current_words.join(" "));
            }
            current_key = Some(key);
            current_words = Vec::new();
        }
        current_words.push(word.to_string());
    }
    if !current_words.is_empty() {
        lines.push(current_words.join(" "));
    }

    let confidence = if conf_count > 0 {
        (conf_sum / conf_count as f32) / 100.0
    } else {
        0.0
    };
    Recognition { lines, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
1\t1\t0\t0\t0\t0\t0\t0\t600\t300\t-1\t\n\
5\t1\t1\t1\t1\t1\t10\t10\t50\t20\t90\tPlayer\n\
5\t1\t1\t1\t1\t2\t70\t10\t50\t20\t80\tkilled\n\
5\t1\t1\t1\t2\t1\t10\t40\t50\t20\t70\tEnemy\n";

    #[test]
    fn tsv_words_group_into_lines() {
        let recognition = parse_tsv(SAMPLE);
        assert_eq!(recognition.lines, vec!["Player killed", "Enemy"]);
        assert!((recognition.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn empty_tsv_yields_no_lines() {
        let recognition = parse_tsv("level\t...\n");
        assert!(recognition.lines.is_empty());
        assert_eq!(recognition.confidence, 0.0);
    }
}
