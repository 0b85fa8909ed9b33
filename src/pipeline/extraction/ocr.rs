use super::types::{BoundingBox, OcrEngine, OcrPageResult, OcrWordResult};
use super::ExtractionError;

/// Bundled Tesseract OCR engine.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct BundledTesseract {
    tessdata_dir: std::path::PathBuf,
    default_lang: String,
    /// Optional path to a medical wordlist file for improved recognition.
    medical_wordlist: Option<std::path::PathBuf>,
}

#[cfg(feature = "ocr")]
impl BundledTesseract {
    /// Initialize with a tessdata directory.
    /// Defaults to "eng+fra+deu" when all three are available, progressively
    /// falls back to "eng+fra", "eng+deu", or "eng" based on what's installed.
    pub fn new(tessdata_dir: &std::path::Path) -> Result<Self, ExtractionError> {
        if !tessdata_dir.join("eng.traineddata").exists() {
            return Err(ExtractionError::TessdataNotFound(tessdata_dir.to_path_buf()));
        }

        // EXT-04-G01: Default to multilingual OCR based on available traineddata
        let has_fra = tessdata_dir.join("fra.traineddata").exists();
        let has_deu = tessdata_dir.join("deu.traineddata").exists();

        let default_lang = match (has_fra, has_deu) {
            (true, true) => {
                tracing::info!("French + German traineddata found, defaulting to eng+fra+deu");
                "eng+fra+deu".to_string()
            }
            (true, false) => {
                tracing::info!("French traineddata found, defaulting to eng+fra");
                "eng+fra".to_string()
            }
            (false, true) => {
                tracing::info!("German traineddata found, defaulting to eng+deu");
                "eng+deu".to_string()
            }
            (false, false) => {
                tracing::warn!(
                    "No additional traineddata found at {}, using English only",
                    tessdata_dir.display()
                );
                "eng".to_string()
            }
        };

        Ok(Self {
            tessdata_dir: tessdata_dir.to_path_buf(),
            default_lang,
            medical_wordlist: None,
        })
    }

    /// Set language(s) for OCR (e.g., "eng", "eng+fra")
    pub fn with_languages(mut self, langs: &str) -> Self {
        self.default_lang = langs.to_string();
        self
    }

    /// EXT-02-G04: Set a medical wordlist file for improved OCR accuracy.
    /// The file should contain one term per line (comments starting with # are ignored).
    pub fn with_medical_wordlist(mut self, path: &std::path::Path) -> Self {
        if path.exists() {
            self.medical_wordlist = Some(path.to_path_buf());
        } else {
            tracing::warn!(
                path = %path.display(),
                "Medical wordlist file not found, skipping"
            );
        }
        self
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for BundledTesseract {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        self.ocr_image_with_lang(image_bytes, &self.default_lang)
    }

    fn ocr_image_with_lang(
        &self,
        image_bytes: &[u8],
        lang: &str,
    ) -> Result<OcrPageResult, ExtractionError> {
        let tessdata_str = self
            .tessdata_dir
            .to_str()
            .ok_or_else(|| ExtractionError::OcrInit("Invalid tessdata path".into()))?;

        let tess = tesseract::Tesseract::new(Some(tessdata_str), Some(lang))
            .map_err(|e| ExtractionError::OcrInit(format!("{e:?}")))?;

        // EXT-02-G04: Apply medical wordlist for improved recognition
        let tess = if let Some(ref wordlist_path) = self.medical_wordlist {
            if let Some(path_str) = wordlist_path.to_str() {
                tess.set_variable("user_words_file", path_str)
                    .map_err(|e| ExtractionError::OcrConfig(format!("Failed to set wordlist: {e:?}")))?
            } else {
                tess
            }
        } else {
            tess
        };

        let mut tess = tess
            .set_image_from_mem(image_bytes)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        let text = tess
            .get_text()
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        let confidence = tess.mean_text_conf().max(0) as f32 / 100.0;

        // EXT-02-G01: Real per-word confidence via TSV output.
        // TSV columns: level page_num block_num par_num line_num word_num left top width height conf text
        // Level 5 = word-level entries with individual confidence scores.
        let word_confidences = match tess.get_tsv_text(0) {
            Ok(tsv) => parse_tsv_word_confidences(&tsv),
            Err(_) => {
                // Fallback: split text with page-mean confidence (no bounding boxes)
                text.split_whitespace()
                    .map(|w| OcrWordResult {
                        text: w.to_string(),
                        confidence,
                        bounding_box: None,
                    })
                    .collect()
            }
        };

        Ok(OcrPageResult {
            text,
            confidence,
            word_confidences,
        })
    }
}

/// Mock OCR engine for unit testing without Tesseract.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        self.ocr_image_with_lang(_image_bytes, "eng")
    }

    fn ocr_image_with_lang(
        &self,
        _image_bytes: &[u8],
        _lang: &str,
    ) -> Result<OcrPageResult, ExtractionError> {
        let word_confidences: Vec<OcrWordResult> = self
            .text
            .split_whitespace()
            .map(|w| OcrWordResult {
                text: w.to_string(),
                confidence: self.confidence,
                bounding_box: None,
            })
            .collect();

        Ok(OcrPageResult {
            text: self.text.clone(),
            confidence: self.confidence,
            word_confidences,
        })
    }
}

/// Parse Tesseract TSV output to extract per-word confidence and bounding boxes.
/// TSV columns: level page_num block_num par_num line_num word_num left top width height conf text
/// Level 5 = individual word entries. Confidence is 0-100, scaled to 0.0-1.0.
/// EXT-05-G01: Bounding box populated from left/top/width/height columns.
fn parse_tsv_word_confidences(tsv: &str) -> Vec<OcrWordResult> {
    let mut results = Vec::new();

    for line in tsv.lines().skip(1) {
        // Skip header row
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        // Level 5 = word
        let level: i32 = match fields[0].parse() {
            Ok(l) => l,
            Err(_) => continue,
        };
        if level != 5 {
            continue;
        }

        let conf: i32 = match fields[10].parse() {
            Ok(c) => c,
            Err(_) => continue,
        };

        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }

        // Tesseract returns -1 for words it can't assign confidence to
        let confidence = if conf < 0 { 0.0 } else { conf as f32 / 100.0 };

        // EXT-05-G01: Extract bounding box from TSV columns 6-9 (left, top, width, height)
        let bounding_box = parse_bounding_box(fields[6], fields[7], fields[8], fields[9]);

        results.push(OcrWordResult {
            text: word.to_string(),
            confidence,
            bounding_box,
        });
    }

    results
}

/// Parse bounding box coordinates from TSV string fields.
/// Returns None if any field fails to parse (graceful degradation).
fn parse_bounding_box(left: &str, top: &str, width: &str, height: &str) -> Option<BoundingBox> {
    Some(BoundingBox {
        x: left.parse().ok()?,
        y: top.parse().ok()?,
        width: width.parse().ok()?,
        height: height.parse().ok()?,
    })
}
