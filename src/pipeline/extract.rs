// src/pipeline/extract.rs — Result extraction from an execution record

use crate::browser::ExecutionRecord;

pub const DEFAULT_MESSAGE: &str = "Task execution completed";
pub const CAPTCHA_NOTICE: &str = "Note: A CAPTCHA was detected during the task. ";

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub message: String,
    pub final_url: Option<String>,
    pub captcha_detected: bool,
}

impl Extraction {
    pub fn from_record(record: &ExecutionRecord) -> Self {
        let captcha_detected = record.step_evaluations().any(mentions_captcha);
        let base = record.last_message().unwrap_or(DEFAULT_MESSAGE);
        let message = if captcha_detected {
            format!("{CAPTCHA_NOTICE}{base}")
        } else {
            base.to_string()
        };

        Self {
            message,
            final_url: record.final_url().map(String::from),
            captcha_detected,
        }
    }
}

/// Case-insensitive; "recaptcha" is covered by the "captcha" substring.
pub fn mentions_captcha(text: &str) -> bool {
    text.to_lowercase().contains("captcha")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::StepRecord;

    fn record(evals: &[&str], extracted: &[&str], url: Option<&str>) -> ExecutionRecord {
        let mut steps: Vec<StepRecord> = evals
            .iter()
            .map(|e| StepRecord {
                evaluation: Some(e.to_string()),
                ..Default::default()
            })
            .collect();
        steps.push(StepRecord {
            url: url.map(String::from),
            extracted: extracted.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        });
        ExecutionRecord { steps }
    }

    #[test]
    fn test_recaptcha_prefixes_message() {
        let out = Extraction::from_record(&record(
            &["ReCAPTCHA detected on page"],
            &["Logged in"],
            Some("https://example.com/home"),
        ));
        assert!(out.captcha_detected);
        assert_eq!(
            out.message,
            "Note: A CAPTCHA was detected during the task. Logged in"
        );
        assert_eq!(out.final_url.as_deref(), Some("https://example.com/home"));
    }

    #[test]
    fn test_no_captcha_no_prefix() {
        let out = Extraction::from_record(&record(&["Page loaded fine"], &["42°F, sunny"], None));
        assert!(!out.captcha_detected);
        assert_eq!(out.message, "42°F, sunny");
        assert_eq!(out.final_url, None);
    }

    #[test]
    fn test_default_message_when_nothing_extracted() {
        let out = Extraction::from_record(&ExecutionRecord::default());
        assert_eq!(out.message, DEFAULT_MESSAGE);
        assert!(!out.captcha_detected);
    }

    #[test]
    fn test_mentions_captcha_case_insensitive() {
        assert!(mentions_captcha("hCaptcha challenge shown"));
        assert!(mentions_captcha("RECAPTCHA"));
        assert!(!mentions_captcha("captured the page title"));
    }
}
