//! Defensive reshaping of model output into stable response shapes.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::warn;

pub const DEFAULT_SCORE: u8 = 75;
pub const MAX_LINE_ANALYSIS: usize = 10;

const SCORE_LABEL: &str = "Score:";
const FALLBACK_CONFIDENCE: u8 = 50;
const AI_DETECTED_THRESHOLD: u8 = 60;

/// Parses `raw` as JSON, or logs the failure and returns `fallback()`.
pub fn parse_json_or<T, F>(raw: &str, fallback: F) -> T
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(%err, "model returned malformed JSON, using fallback");
            fallback()
        }
    }
}

/// Removes Markdown bold/italic asterisks.
pub fn strip_markdown_emphasis(text: &str) -> String {
    text.replace("**", "").replace('*', "")
}

/// Drops surrounding code fence lines (```` ``` ```` or ```` ```json ````).
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    trimmed
        .lines()
        .filter(|line| !line.trim().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Reads the score from the first line carrying a `Score:` label, clamped to 0..=100.
pub fn extract_score(text: &str) -> u8 {
    text.lines()
        .find(|line| line.contains(SCORE_LABEL))
        .and_then(|line| line.split_once(SCORE_LABEL))
        .and_then(|(_, rest)| parse_leading_integer(rest.split('/').next().unwrap_or(rest)))
        .map(|value| value.clamp(0, 100) as u8)
        .unwrap_or(DEFAULT_SCORE)
}

fn parse_leading_integer(segment: &str) -> Option<i64> {
    let start = segment.find(|c: char| c.is_ascii_digit())?;
    let digits: String = segment[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let negative = segment[..start].ends_with('-');

    // Digit runs only fail to parse on overflow.
    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

/// Trims a generated title; `None` when nothing usable is left.
pub fn clean_title(raw: &str) -> Option<String> {
    let title = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim_end_matches(['.', '!', '?'])
        .trim();
    (!title.is_empty()).then(|| title.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Indicator {
    pub point: String,
    pub example: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineAnalysis {
    pub line_number: u32,
    pub text: String,
    pub likely_ai: bool,
    pub confidence: u8,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionAnalysis {
    pub human_indicators: Vec<Indicator>,
    pub ai_indicators: Vec<Indicator>,
    pub line_analysis: Vec<LineAnalysis>,
}

/// Response body of `/check-ai`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiDetectionReport {
    pub ai_detected: bool,
    pub confidence: u8,
    pub analysis: DetectionAnalysis,
    pub sentences_analyzed: usize,
}

#[derive(Debug, Default, Deserialize)]
struct RawDetection {
    #[serde(default)]
    ai_detected: Option<Value>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default)]
    human_indicators: Option<Value>,
    #[serde(default)]
    ai_indicators: Option<Value>,
    #[serde(default)]
    line_analysis: Option<Value>,
}

impl RawDetection {
    fn fallback() -> Self {
        Self {
            ai_detected: Some(Value::Bool(false)),
            confidence: Some(Value::from(FALLBACK_CONFIDENCE)),
            ..Self::default()
        }
    }
}

/// Normalizes the detector's JSON answer; malformed output yields the neutral fallback.
pub fn interpret_ai_detection(raw: &str, sentences_analyzed: usize) -> AiDetectionReport {
    let cleaned = strip_code_fences(raw);
    let detection: RawDetection = parse_json_or(json_object_slice(&cleaned), RawDetection::fallback);

    let confidence = detection
        .confidence
        .as_ref()
        .and_then(lenient_percentage)
        .unwrap_or(FALLBACK_CONFIDENCE);
    let ai_detected = detection
        .ai_detected
        .as_ref()
        .and_then(lenient_bool)
        .unwrap_or(confidence > AI_DETECTED_THRESHOLD);

    let mut line_analysis: Vec<LineAnalysis> = array_items(detection.line_analysis.as_ref())
        .enumerate()
        .filter_map(|(idx, item)| line_from_value(idx, item))
        .collect();
    line_analysis.truncate(MAX_LINE_ANALYSIS);

    AiDetectionReport {
        ai_detected,
        confidence,
        analysis: DetectionAnalysis {
            human_indicators: indicators(detection.human_indicators.as_ref()),
            ai_indicators: indicators(detection.ai_indicators.as_ref()),
            line_analysis,
        },
        sentences_analyzed: sentences_analyzed.min(MAX_LINE_ANALYSIS),
    }
}

// Models sometimes wrap the object in prose; keep the outermost braces.
fn json_object_slice(text: &str) -> &str {
    if text.starts_with('{') {
        return text;
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

fn array_items(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter())
        .into_iter()
        .flatten()
}

fn indicators(value: Option<&Value>) -> Vec<Indicator> {
    array_items(value)
        .filter_map(|item| match item {
            Value::String(point) if !point.trim().is_empty() => Some(Indicator {
                point: point.trim().to_string(),
                example: String::new(),
            }),
            Value::Object(map) => {
                let point = map.get("point").and_then(lenient_string).unwrap_or_default();
                let example = map.get("example").and_then(lenient_string).unwrap_or_default();
                (!point.is_empty() || !example.is_empty()).then_some(Indicator { point, example })
            }
            _ => None,
        })
        .collect()
}

fn line_from_value(idx: usize, item: &Value) -> Option<LineAnalysis> {
    let map = item.as_object()?;
    let line_number = map
        .get("line_number")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(idx as u32 + 1);
    let confidence = map
        .get("confidence")
        .and_then(lenient_percentage)
        .unwrap_or(FALLBACK_CONFIDENCE);

    Some(LineAnalysis {
        line_number,
        text: map.get("text").and_then(lenient_string).unwrap_or_default(),
        likely_ai: map
            .get("likely_ai")
            .and_then(lenient_bool)
            .unwrap_or(confidence > AI_DETECTED_THRESHOLD),
        confidence,
        reason: map.get("reason").and_then(lenient_string).unwrap_or_default(),
    })
}

fn lenient_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn lenient_percentage(value: &Value) -> Option<u8> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    Some(number.round().clamp(0.0, 100.0) as u8)
}
