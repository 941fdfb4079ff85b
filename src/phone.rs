//! Phone decoding: plain-text reveals and OCR over obfuscated phone images.

use std::fmt;
use std::io::Cursor;

use base64::Engine as _;
use image::imageops::FilterType;
use image::ImageFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::browser::CapturedResponse;
use crate::ocr::{OcrEngine, OcrError};

/// Shortest digit string accepted as a phone number.
pub const MIN_PHONE_DIGITS: usize = 9;

const UPSCALE_FACTOR: u32 = 3;
const PNG_BASE64_SIGNATURE: &str = "iVBOR";

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{9,}").expect("valid digit-run regex"));

/// A digit-only phone number of at least [`MIN_PHONE_DIGITS`] digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Strips every non-digit and accepts the rest if it is long enough.
    pub fn from_digits(raw: &str) -> Option<Self> {
        let digits = strip_non_digits(raw);
        (digits.len() >= MIN_PHONE_DIGITS).then_some(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Site-specific correction applied to OCR output before the length check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OcrPadding {
    #[default]
    None,
    /// An 8-digit read lost the leading mobile prefix; put it back.
    MobilePrefix(&'static str),
}

impl OcrPadding {
    fn apply(self, digits: String) -> String {
        match self {
            OcrPadding::MobilePrefix(prefix) if digits.len() == 8 => format!("{prefix}{digits}"),
            _ => digits,
        }
    }
}

pub fn strip_non_digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Plain-text reveal: only trusted when it contains an unbroken run of 9+ digits.
pub fn from_plain_text(text: &str) -> Option<PhoneNumber> {
    if DIGIT_RUN.is_match(text) {
        PhoneNumber::from_digits(text)
    } else {
        None
    }
}

/// Decodes a phone number from revealed text or, failing that, an intercepted image.
///
/// OCR and image errors are logged and reported as "no phone".
pub async fn decode(
    plain_text: Option<&str>,
    image_bytes: Option<&[u8]>,
    ocr: &dyn OcrEngine,
    padding: OcrPadding,
) -> Option<PhoneNumber> {
    if let Some(phone) = plain_text.and_then(from_plain_text) {
        return Some(phone);
    }

    let bytes = image_bytes?;
    match recognize_digits(bytes, ocr).await {
        Ok(digits) => {
            let digits = padding.apply(digits);
            let phone = PhoneNumber::from_digits(&digits);
            if phone.is_none() {
                tracing::debug!(digits = %digits, "OCR result too short for a phone number");
            }
            phone
        }
        Err(e) => {
            tracing::warn!("Phone image OCR failed: {}", e);
            None
        }
    }
}

async fn recognize_digits(bytes: &[u8], ocr: &dyn OcrEngine) -> Result<String, OcrError> {
    let owned = bytes.to_vec();
    let prepared = tokio::task::spawn_blocking(move || preprocess(&owned))
        .await
        .map_err(|e| OcrError::Image(e.to_string()))??;
    let text = ocr.recognize(&prepared).await?;
    Ok(strip_non_digits(&text))
}

/// Upscales 3x and inverts colours, returning a PNG.
pub fn preprocess(bytes: &[u8]) -> Result<Vec<u8>, OcrError> {
    let mut img = image::load_from_memory(bytes).map_err(|e| OcrError::Image(e.to_string()))?;
    img = img.resize_exact(
        img.width() * UPSCALE_FACTOR,
        img.height() * UPSCALE_FACTOR,
        FilterType::CatmullRom,
    );
    img.invert();

    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| OcrError::Image(e.to_string()))?;
    Ok(out)
}

/// Turns a captured phone-image response into raw image bytes.
///
/// JSON bodies are ignored, text bodies are only kept when they carry a
/// base64-encoded PNG, anything else is taken as binary image data.
pub fn image_from_capture(captured: &CapturedResponse) -> Option<Vec<u8>> {
    let content_type = captured.content_type.to_ascii_lowercase();
    if content_type.contains("json") {
        return None;
    }
    if content_type.contains("html") || content_type.contains("text") {
        let text = String::from_utf8_lossy(&captured.body);
        let text = text.trim();
        if !text.starts_with(PNG_BASE64_SIGNATURE) {
            return None;
        }
        return base64::engine::general_purpose::STANDARD.decode(text).ok();
    }
    if captured.body.is_empty() {
        return None;
    }
    Some(captured.body.clone())
}
