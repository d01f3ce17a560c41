// src/browser/record.rs — Typed result of one automation run

use serde::{Deserialize, Serialize};

/// One agent step as reported by the automation engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Page location after the step.
    #[serde(default)]
    pub url: Option<String>,
    /// Base64 PNG captured inline with the step state.
    #[serde(default)]
    pub screenshot: Option<String>,
    /// The engine's own evaluation of how the step went.
    #[serde(default)]
    pub evaluation: Option<String>,
    /// Content extracted by the step's actions, in action order.
    #[serde(default)]
    pub extracted: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl ExecutionRecord {
    pub fn last_step(&self) -> Option<&StepRecord> {
        self.steps.last()
    }

    /// Most recent url any step reported.
    pub fn final_url(&self) -> Option<&str> {
        self.steps
            .iter()
            .rev()
            .find_map(|s| s.url.as_deref().filter(|u| !u.is_empty()))
    }

    /// Last extracted content of the last step.
    pub fn last_message(&self) -> Option<&str> {
        self.last_step()?
            .extracted
            .last()
            .map(String::as_str)
            .filter(|m| !m.is_empty())
    }

    /// Screenshot the last step captured inline, if any.
    pub fn inline_screenshot(&self) -> Option<&str> {
        self.last_step()?
            .screenshot
            .as_deref()
            .filter(|s| !s.is_empty())
    }

    pub fn step_evaluations(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|s| s.evaluation.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(url: Option<&str>, extracted: &[&str]) -> StepRecord {
        StepRecord {
            url: url.map(String::from),
            extracted: extracted.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_record_has_nothing() {
        let r = ExecutionRecord::default();
        assert!(r.final_url().is_none());
        assert!(r.last_message().is_none());
        assert!(r.inline_screenshot().is_none());
        assert_eq!(r.step_evaluations().count(), 0);
    }

    #[test]
    fn test_final_url_skips_steps_without_url() {
        let r = ExecutionRecord {
            steps: vec![step(Some("https://a.test/"), &[]), step(None, &[])],
        };
        assert_eq!(r.final_url(), Some("https://a.test/"));
    }

    #[test]
    fn test_last_message_only_from_last_step() {
        let r = ExecutionRecord {
            steps: vec![step(None, &["early"]), step(None, &[])],
        };
        assert!(r.last_message().is_none());

        let r = ExecutionRecord {
            steps: vec![step(None, &["first", "Temperature is 21C"])],
        };
        assert_eq!(r.last_message(), Some("Temperature is 21C"));
    }

    #[test]
    fn test_deserialize_sparse_json() {
        let json = r#"{"steps":[{"url":"https://x.test"},{"evaluation":"ok","extracted":["hi"]}]}"#;
        let r: ExecutionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.steps.len(), 2);
        assert_eq!(r.last_message(), Some("hi"));
        assert_eq!(r.step_evaluations().collect::<Vec<_>>(), vec!["ok"]);
    }
}
