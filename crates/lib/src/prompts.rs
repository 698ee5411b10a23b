//! # Extraction Prompts
//!
//! The built-in instruction sent with every attached document. Callers can
//! replace it wholesale (the CLI exposes `--prompt-file`), so nothing here is
//! load-bearing beyond being a sensible default.

/// The default per-document analysis prompt: classify the research
/// methodology of the attached study and justify the classification.
pub const DEFAULT_ANALYSIS_PROMPT: &str = r#"You are an expert research assistant. Your task is to analyze the attached academic paper and identify its research methodology.

# Instructions:
1.  Read the attached document carefully, paying particular attention to the abstract and methods sections.
2.  Classify the study's methodology as exactly one of: "Experimental", "Systematic Review", "Survey", "Qualitative", or "Other".
3.  Provide a single-sentence reason for the classification, citing the evidence you used.

# JSON Output Schema:
{
  "methodology": "One of the five categories above.",
  "reason": "A single sentence justifying the classification."
}

Please provide only the JSON object in your response.
"#;
