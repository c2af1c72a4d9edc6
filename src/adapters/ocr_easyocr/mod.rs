//! GPU OCR backend driving the `easyocr` command line tool.
//!
//! Noticeably slower to start than tesseract but far more tolerant of
//! stylized HUD fonts. Output rows look like
//! `([[x,y],...], 'Player killed Enemy', 0.97)` and are parsed per line.

use std::path::PathBuf;
use std::process::Command;

use image::GrayImage;
use regex::Regex;
use tracing::{debug, trace};

use crate::adapters::preprocess_for_ocr;
use crate::config::{CaptureConfig, OcrConfig};
use crate::domain::errors::DomainError;
use crate::ports::{Recognition, TextRecognizer};
use crate::utils::path::resolve_tool;

pub struct EasyOcrRecognizer {
    binary: PathBuf,
    lang: String,
    scale: f32,
    threshold: u8,
    row_pattern: Regex,
}

impl EasyOcrRecognizer {
    pub fn new(ocr: &OcrConfig, capture: &CaptureConfig) -> Result<Self, DomainError> {
        let binary = resolve_tool("easyocr");
        let check = Command::new(&binary)
            .arg("-h")
            .output()
            .map_err(|e| DomainError::OcrInit(format!("easyocr not runnable: {e}")))?;
        if !check.status.success() {
            return Err(DomainError::OcrInit(format!(
                "easyocr -h exited with {}",
                check.status
            )));
        }
        let row_pattern = Regex::new(r"^\(\[.*\], '(.*)', ([0-9.eE+-]+)\)$")
            .map_err(|e| DomainError::OcrInit(format!("row pattern: {e}")))?;
        debug!("using easyocr at {}", binary.display());
        Ok(Self {
            binary,
            lang: easyocr_lang(&ocr.lang),
            scale: capture.scale,
            threshold: capture.threshold,
            row_pattern,
        })
    }

    fn parse_rows(&self, stdout: &str) -> Recognition {
        let mut lines = Vec::new();
        let mut conf_sum = 0.0f32;
        let mut conf_count = 0u32;
        for row in stdout.lines() {
            let Some(captures) = self.row_pattern.captures(row.trim()) else {
                continue;
            };
            let text = captures[1].trim();
            if text.is_empty() {
                continue;
            }
            lines.push(text.to_string());
            if let Ok(conf) = captures[2].parse::<f32>() {
                conf_sum += conf;
                conf_count += 1;
            }
        }
        let confidence = if conf_count > 0 {
            conf_sum / conf_count as f32
        } else {
            0.0
        };
        Recognition { lines, confidence }
    }
}

/// Map tesseract-style language codes to easyocr's two-letter codes.
fn easyocr_lang(lang: &str) -> String {
    match lang {
        "eng" => "en".to_string(),
        other => other.chars().take(2).collect(),
    }
}

impl TextRecognizer for EasyOcrRecognizer {
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
            .args(["-l", &self.lang])
            .arg("-f")
            .arg(temp.path())
            .args(["--detail", "1", "--gpu", "True"])
            .output()
            .map_err(|e| DomainError::OcrFail(format!("easyocr spawn: {e}")))?;
        if !output.status.success() {
            return Err(DomainError::OcrFail(format!(
                "easyocr exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let recognition = self.parse_rows(&String::from_utf8_lossy(&output.stdout));
        trace!("easyocr recognized {} lines", recognition.lines.len());
        Ok(recognition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recognizer_for_parsing() -> EasyOcrRecognizer {
        EasyOcrRecognizer {
            binary: PathBuf::from("easyocr"),
            lang: "en".into(),
            scale: 1.0,
            threshold: 180,
            row_pattern: Regex::new(r"^\(\[.*\], '(.*)', ([0-9.eE+-]+)\)$").unwrap(),
        }
    }

    #[test]
    fn detail_rows_parse_text_and_confidence() {
        let recognizer = recognizer_for_parsing();
        let stdout = "([[10, 10], [200, 10], [200, 40], [10, 40]], 'Player killed Enemy', 0.9561)\n\
([[10, 50], [180, 50], [180, 80], [10, 80]], 'Ally knocked Foe', 0.8439)\n\
garbage line\n";
        let recognition = recognizer.parse_rows(stdout);
        assert_eq!(
            recognition.lines,
            vec!["Player killed Enemy", "Ally knocked Foe"]
        );
        assert!((recognition.confidence - 0.9).abs() < 1e-3);
    }

    #[test]
    fn lang_codes_map_to_two_letters() {
        assert_eq!(easyocr_lang("eng"), "en");
        assert_eq!(easyocr_lang("deu"), "de");
    }
}
