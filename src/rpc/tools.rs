//! Tool catalog and fix request/response types
//!
//! Each remote operation is a named tool with a fixed required-argument
//! set, validated before anything goes on the wire. Response decoding is
//! tolerant: missing optional fields degrade to defaults instead of
//! failing the cycle.

use crate::diagnostics::Diagnostic;
use anyhow::Result;
use serde_json::{json, Map, Value};

/// Remote operations supported by the fixing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Fix,
    Explain,
    Refactor,
    GenerateTests,
    GenerateDocs,
    BuildAndFix,
    VerifyProject,
}

impl Tool {
    pub const ALL: [Tool; 7] = [
        Tool::Fix,
        Tool::Explain,
        Tool::Refactor,
        Tool::GenerateTests,
        Tool::GenerateDocs,
        Tool::BuildAndFix,
        Tool::VerifyProject,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Fix => "fix",
            Tool::Explain => "explain",
            Tool::Refactor => "refactor",
            Tool::GenerateTests => "generate-tests",
            Tool::GenerateDocs => "generate-docs",
            Tool::BuildAndFix => "build-and-fix",
            Tool::VerifyProject => "verify-project",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Arguments that must be present for this tool.
    pub fn required_args(&self) -> &'static [&'static str] {
        match self {
            Tool::Fix => &["code", "language", "diagnostics"],
            Tool::Explain => &["code", "language"],
            Tool::Refactor => &["code", "language"],
            Tool::GenerateTests => &["code", "language", "framework"],
            Tool::GenerateDocs => &["code", "language", "style"],
            Tool::BuildAndFix => &["project_path", "error_text"],
            Tool::VerifyProject => &["project_path", "auto_fix"],
        }
    }

    /// Check the required-argument schema before invocation.
    pub fn validate_args(&self, arguments: &Value) -> Result<()> {
        let Some(map) = arguments.as_object() else {
            anyhow::bail!("arguments for '{}' must be a JSON object", self.name());
        };
        for key in self.required_args() {
            if !map.contains_key(*key) {
                anyhow::bail!("tool '{}' requires argument '{}'", self.name(), key);
            }
        }
        Ok(())
    }
}

/// Everything the fixing service needs to produce corrected code.
#[derive(Debug, Clone)]
pub struct FixRequest {
    pub code: String,
    pub diagnostics: Vec<Diagnostic>,
    pub language: String,
    pub instructions: Option<String>,
}

impl FixRequest {
    /// Serialize into the `fix` tool's argument object.
    pub fn into_args(self) -> Value {
        let mut args = json!({
            "code": self.code,
            "language": self.language,
            "diagnostics": self.diagnostics,
        });
        if let Some(instructions) = self.instructions {
            args["instructions"] = json!(instructions);
        }
        args
    }
}

/// Decoded answer from the `fix` tool.
#[derive(Debug, Clone)]
pub struct FixResponse {
    pub success: bool,
    pub fixed_code: Option<String>,
    pub explanation: Option<String>,
    pub suggestions: Vec<String>,
    pub confidence: f64,
    pub metadata: Map<String, Value>,
}

impl FixResponse {
    /// Decode a tool-call result map. Fields the service omitted fall back
    /// to defaults; `success`, `fixed_code`, and `confidence` drive the
    /// loop.
    pub fn from_result(result: &Map<String, Value>) -> Self {
        let success = result
            .get("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let fixed_code = result
            .get("fixed_code")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from);

        let explanation = result
            .get("explanation")
            .and_then(|v| v.as_str())
            .map(String::from);

        let suggestions = result
            .get("suggestions")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let confidence = result
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        let metadata = result
            .get("metadata")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        Self {
            success,
            fixed_code,
            explanation,
            suggestions,
            confidence,
            metadata,
        }
    }

    /// A response is usable when it succeeded, actually carries code, and
    /// the service's confidence clears the caller's threshold. A service
    /// that omits the score decodes as 0.0, so gating is opt-in.
    pub fn usable_code(&self, min_confidence: f64) -> Option<&str> {
        if self.success && self.confidence >= min_confidence {
            self.fixed_code.as_deref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics;

    #[test]
    fn test_tool_names_round_trip() {
        for tool in Tool::ALL {
            assert_eq!(Tool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(Tool::from_name("format"), None);
    }

    #[test]
    fn test_validate_args_accepts_complete_sets() {
        let args = json!({"code": "x", "language": "swift", "diagnostics": []});
        Tool::Fix.validate_args(&args).unwrap();

        let args = json!({"project_path": "/p", "auto_fix": true});
        Tool::VerifyProject.validate_args(&args).unwrap();
    }

    #[test]
    fn test_validate_args_rejects_missing_keys() {
        let args = json!({"code": "x"});
        let err = Tool::Fix.validate_args(&args).unwrap_err();
        assert!(err.to_string().contains("language"));

        let err = Tool::GenerateTests
            .validate_args(&json!({"code": "x", "language": "rust"}))
            .unwrap_err();
        assert!(err.to_string().contains("framework"));
    }

    #[test]
    fn test_validate_args_rejects_non_objects() {
        assert!(Tool::Explain.validate_args(&json!("nope")).is_err());
    }

    #[test]
    fn test_fix_request_args_satisfy_schema() {
        let request = FixRequest {
            code: "let x = 1".to_string(),
            diagnostics: diagnostics::parse("a.swift:1:5: error: bad"),
            language: "swift".to_string(),
            instructions: None,
        };
        let args = request.into_args();
        Tool::Fix.validate_args(&args).unwrap();
        assert!(args.get("instructions").is_none());
    }

    #[test]
    fn test_fix_request_optional_instructions() {
        let request = FixRequest {
            code: String::new(),
            diagnostics: Vec::new(),
            language: "rust".to_string(),
            instructions: Some("prefer iterators".to_string()),
        };
        let args = request.into_args();
        assert_eq!(args["instructions"], "prefer iterators");
    }

    #[test]
    fn test_fix_response_decoding_is_tolerant() {
        let mut map = Map::new();
        map.insert("success".to_string(), json!(true));
        map.insert("fixed_code".to_string(), json!("let x = 1;"));
        let resp = FixResponse::from_result(&map);
        assert_eq!(resp.usable_code(0.0), Some("let x = 1;"));
        assert_eq!(resp.confidence, 0.0);
        assert!(resp.suggestions.is_empty());

        let resp = FixResponse::from_result(&Map::new());
        assert!(!resp.success);
        assert_eq!(resp.usable_code(0.0), None);
    }

    #[test]
    fn test_unsuccessful_response_has_no_usable_code() {
        let mut map = Map::new();
        map.insert("success".to_string(), json!(false));
        map.insert("fixed_code".to_string(), json!("ignored"));
        let resp = FixResponse::from_result(&map);
        assert_eq!(resp.usable_code(0.0), None);
    }

    #[test]
    fn test_confidence_threshold_gates_usable_code() {
        let mut map = Map::new();
        map.insert("success".to_string(), json!(true));
        map.insert("fixed_code".to_string(), json!("let x = 1;"));
        map.insert("confidence".to_string(), json!(0.6));
        let resp = FixResponse::from_result(&map);
        assert_eq!(resp.usable_code(0.7), None);
        assert_eq!(resp.usable_code(0.6), Some("let x = 1;"));
        assert_eq!(resp.usable_code(0.0), Some("let x = 1;"));
    }
}
