//! Comparison and feedback: did preprocessing help text extraction?

pub mod similarity;

use crate::error::PrepError;
use crate::vision::{ImagePayload, Prompt, VisionService};
use serde::Serialize;

const FEEDBACK_SYSTEM_PROMPT: &str =
    "You evaluate image preprocessing for text recognition. Answer in a short paragraph.";

/// Direction of change between baseline and preprocessed extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increased,
    Decreased,
    Unchanged,
}

impl Direction {
    /// Classify a similarity percentage against the fixed 100 threshold.
    // The percentage never exceeds 100, so Increased is unreachable as
    // written. Kept pending a product decision on what "increased" means.
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage > 100.0 {
            Self::Increased
        } else if percentage < 100.0 {
            Self::Decreased
        } else {
            Self::Unchanged
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResult {
    pub original_text: String,
    pub preprocessed_text: String,
    /// Ratio in [0, 1]
    pub similarity: f64,
    pub similarity_percentage: f64,
    pub direction: Direction,
    pub qualitative_feedback: String,
}

/// Extract text from both images, score the pair and ask for a verdict.
/// Service failures propagate unchanged; nothing is retried.
pub fn compare(
    service: &dyn VisionService,
    baseline: &[u8],
    preprocessed: &[u8],
) -> Result<ComparisonResult, PrepError> {
    let original_text = service.extract_text(ImagePayload::sniff(baseline))?;
    let preprocessed_text = service.extract_text(ImagePayload::sniff(preprocessed))?;

    let similarity = similarity::ratio(&original_text, &preprocessed_text);
    let similarity_percentage = similarity * 100.0;
    let direction = Direction::from_percentage(similarity_percentage);

    tracing::info!(
        "Compared extractions: {} vs {} chars, similarity {:.1}%",
        original_text.chars().count(),
        preprocessed_text.chars().count(),
        similarity_percentage
    );

    let instruction =
        feedback_instruction(&original_text, &preprocessed_text, similarity_percentage);
    let qualitative_feedback = service.generate(Prompt {
        system: Some(FEEDBACK_SYSTEM_PROMPT),
        instruction: &instruction,
        image: None,
    })?;

    Ok(ComparisonResult {
        original_text,
        preprocessed_text,
        similarity,
        similarity_percentage,
        direction,
        qualitative_feedback,
    })
}

fn feedback_instruction(original: &str, preprocessed: &str, percentage: f64) -> String {
    format!(
        "Text extracted from the original image:\n\"\"\"\n{}\n\"\"\"\n\n\
Text extracted from the preprocessed image:\n\"\"\"\n{}\n\"\"\"\n\n\
The two extractions are {:.1}% similar. Did preprocessing improve, worsen or not \
affect text recognition? Point out specific characters or words that changed.",
        original, preprocessed, percentage
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::testing::ScriptedService;

    #[test]
    fn test_direction_threshold() {
        assert_eq!(Direction::from_percentage(100.0), Direction::Unchanged);
        assert_eq!(Direction::from_percentage(87.5), Direction::Decreased);
        assert_eq!(Direction::from_percentage(0.0), Direction::Decreased);
        assert_eq!(Direction::from_percentage(100.5), Direction::Increased);
    }

    #[test]
    fn test_compare_scores_and_requests_feedback() {
        let service = ScriptedService::new()
            .with_extractions(&["KX 2291", "KX-2291"])
            .with_generation(Ok("Preprocessing recovered the hyphen."));

        let result = compare(&service, b"baseline", b"preprocessed").unwrap();

        assert_eq!(result.original_text, "KX 2291");
        assert_eq!(result.preprocessed_text, "KX-2291");
        assert!(result.similarity > 0.8 && result.similarity < 1.0);
        assert!((result.similarity_percentage - result.similarity * 100.0).abs() < 1e-9);
        assert_eq!(result.direction, Direction::Decreased);
        assert_eq!(result.qualitative_feedback, "Preprocessing recovered the hyphen.");

        let prompts = service.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("KX 2291"));
        assert!(prompts[0].contains("KX-2291"));
        assert_eq!(*service.images_seen.lock().unwrap(), 2);
    }

    #[test]
    fn test_identical_extractions_are_unchanged() {
        let service = ScriptedService::new()
            .with_extractions(&["same text", "same text"])
            .with_generation(Ok("No difference."));

        let result = compare(&service, b"a", b"b").unwrap();
        assert_eq!(result.similarity, 1.0);
        assert_eq!(result.direction, Direction::Unchanged);
    }

    #[test]
    fn test_extraction_failure_propagates_without_feedback_call() {
        let service = ScriptedService::new()
            .with_extractions(&["only one"])
            .with_generation(Ok("unused"));

        let err = compare(&service, b"a", b"b").unwrap_err();
        assert!(matches!(err, PrepError::Upstream(_)));
        assert!(service.prompts().is_empty());
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Direction::Unchanged).unwrap(),
            "\"unchanged\""
        );
    }
}
