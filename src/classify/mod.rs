// src/classify/mod.rs
//! Prediction wire formats and the normalization applied before anything
//! reaches the review screen.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value;

use crate::error::FesatError;

/// Predictions scoring below this are never shown under their own label.
pub const CONFIDENCE_FLOOR: f32 = 0.65;

/// Sentinel label substituted for any prediction below [`CONFIDENCE_FLOOR`].
pub const NOT_IDENTIFIED_LABEL: &str = "not-identified";

/// One known disease vector: the classifier's raw label prefix, the common
/// name shown to users, and a short description for the review screen.
#[derive(Debug, Clone)]
pub struct VectorProfile {
    pub raw_label: &'static str,
    pub common_name: &'static str,
    pub description: &'static str,
}

pub static VECTOR_CATALOG: Lazy<Vec<VectorProfile>> = Lazy::new(|| {
    vec![
        VectorProfile {
            raw_label: "Aedes",
            common_name: "Aedes Mosquito",
            description: "Day-biting mosquito; principal vector of dengue, Zika and chikungunya.",
        },
        VectorProfile {
            raw_label: "Culex",
            common_name: "Culex Mosquito",
            description: "Night-biting mosquito; transmits West Nile virus and lymphatic filariasis.",
        },
        VectorProfile {
            raw_label: "Anopheles",
            common_name: "Anopheles Mosquito",
            description: "Dusk-to-dawn biter; the only genus that transmits human malaria.",
        },
        VectorProfile {
            raw_label: "tick",
            common_name: "Tick",
            description: "Hard-bodied ectoparasite; vector of Lyme disease and spotted fevers.",
        },
        VectorProfile {
            raw_label: "flea",
            common_name: "Flea",
            description: "Wingless jumping insect; vector of plague and murine typhus.",
        },
        VectorProfile {
            raw_label: "lice",
            common_name: "Lice",
            description: "Obligate human ectoparasite; body lice transmit epidemic typhus.",
        },
        VectorProfile {
            raw_label: "bed_bug",
            common_name: "Bed Bug",
            description: "Nocturnal blood-feeding insect; a biting nuisance, not a disease vector.",
        },
    ]
});

/// Common name for a raw classifier label. Labels matching a catalog entry
/// (prefix, case-insensitive, so `Culex_sp` resolves like `Culex`) render
/// with the vector's common name; anything else renders with underscores
/// replaced by spaces.
pub fn display_label(raw: &str) -> String {
    if raw == NOT_IDENTIFIED_LABEL {
        return raw.to_string();
    }
    let lowered = raw.to_ascii_lowercase();
    for profile in VECTOR_CATALOG.iter() {
        if lowered.starts_with(&profile.raw_label.to_ascii_lowercase()) {
            return profile.common_name.to_string();
        }
    }
    raw.replace('_', " ")
}

/// One-decimal percent, e.g. `0.82` -> `"82.0%"`.
pub fn format_confidence(confidence: f32) -> String {
    format!("{:.1}%", confidence * 100.0)
}

fn default_success() -> bool {
    true
}

/// Prediction body as the classifier sends it, before normalization. All
/// fields are optional because the deployed model services disagree on
/// which ones they populate.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPrediction {
    #[serde(default = "default_success")]
    pub success: bool,
    pub error: Option<String>,
    pub predicted_class: Option<String>,
    #[serde(alias = "max_prob")]
    pub confidence: Option<f32>,
    /// Per-class scores, keyed by class label. Key order is preserved from
    /// the wire; it is the tie-break for the primary prediction.
    #[serde(alias = "class_probabilities")]
    pub all_probabilities: Option<serde_json::Map<String, Value>>,
    pub warning: Option<String>,
    pub predicted_stage: Option<String>,
}

/// Some deployments wrap the prediction in a `{"classification": ...}`
/// envelope; others send it flat.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PredictEnvelope {
    Wrapped { classification: RawPrediction },
    Flat(RawPrediction),
}

impl PredictEnvelope {
    pub fn into_inner(self) -> RawPrediction {
        match self {
            PredictEnvelope::Wrapped { classification } => classification,
            PredictEnvelope::Flat(raw) => raw,
        }
    }
}

/// Per-class score entry. Multi-model deployments attach a description to
/// each class; single-model ones send a bare number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ClassScore {
    Plain(f32),
    Detailed {
        probability: f32,
        #[serde(default)]
        description: Option<String>,
    },
}

impl ClassScore {
    fn probability(&self) -> f32 {
        match self {
            ClassScore::Plain(p) => *p,
            ClassScore::Detailed { probability, .. } => *probability,
        }
    }

    fn description(self) -> Option<String> {
        match self {
            ClassScore::Plain(_) => None,
            ClassScore::Detailed { description, .. } => description,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassProbability {
    pub class: String,
    pub probability: f32,
    pub description: Option<String>,
}

/// Whether the two correction side-calls (reference relocation and comment
/// logging) landed. The optimistic label change is kept either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Synced,
    SyncFailed,
}

/// Normalized prediction record held while a result is under review.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Label as the classifier produced it (argmax winner).
    pub raw_label: String,
    /// Normalized label: the raw label, or the not-identified sentinel.
    pub label: String,
    /// Label as shown to the user.
    pub display_label: String,
    /// Raw top score, retained for display even when the sentinel applies.
    pub confidence: f32,
    /// Per-class scores in wire order.
    pub scores: Vec<ClassProbability>,
    pub warning: Option<String>,
    pub stage_label: Option<String>,
    pub predicted_at: DateTime<Utc>,
    pub correction_sync: Option<SyncState>,
}

impl Prediction {
    pub fn confidence_display(&self) -> String {
        format_confidence(self.confidence)
    }

    /// Prediction date as shown on the review screen, e.g. `Thu Aug 06 2026`.
    pub fn date_display(&self) -> String {
        self.predicted_at.format("%a %b %d %Y").to_string()
    }

    pub fn is_identified(&self) -> bool {
        self.label != NOT_IDENTIFIED_LABEL
    }
}

fn parse_scores(
    map: Option<serde_json::Map<String, Value>>,
) -> Result<Vec<ClassProbability>, FesatError> {
    let Some(map) = map else {
        return Ok(Vec::new());
    };

    let mut scores = Vec::with_capacity(map.len());
    for (class, value) in map {
        let score: ClassScore = serde_json::from_value(value).map_err(|err| {
            FesatError::UnexpectedResponse(format!("bad score for class {class}: {err}"))
        })?;
        scores.push(ClassProbability {
            class,
            probability: score.probability(),
            description: score.description(),
        });
    }

    // The stage-model service reports percentages, the flat service reports
    // fractions. Rescale to fractions when the values are clearly percent.
    let max = scores.iter().map(|s| s.probability).fold(0.0_f32, f32::max);
    if max > 1.0 {
        for score in &mut scores {
            score.probability /= 100.0;
        }
    }

    Ok(scores)
}

/// Apply the confidence floor and resolve the primary prediction from a raw
/// classifier reply. Fails on semantic classifier errors (`success:false`)
/// and on replies missing both a score map and a label/confidence pair.
pub fn normalize(raw: RawPrediction, now: DateTime<Utc>) -> Result<Prediction, FesatError> {
    if !raw.success {
        return Err(FesatError::Upstream(
            raw.error
                .unwrap_or_else(|| "classifier reported failure".to_string()),
        ));
    }

    let scores = parse_scores(raw.all_probabilities)?;

    // Primary prediction: argmax by probability; strictly-greater keeps the
    // first-encountered class on ties.
    let (raw_label, confidence) = if scores.is_empty() {
        let label = raw.predicted_class.ok_or_else(|| {
            FesatError::UnexpectedResponse("prediction carries no class label".to_string())
        })?;
        let confidence = raw.confidence.ok_or_else(|| {
            FesatError::UnexpectedResponse("prediction carries no confidence score".to_string())
        })?;
        (label, confidence)
    } else {
        let mut top = &scores[0];
        for score in &scores[1..] {
            if score.probability > top.probability {
                top = score;
            }
        }
        (top.class.clone(), raw.confidence.unwrap_or(top.probability))
    };

    let (label, display) = if confidence < CONFIDENCE_FLOOR {
        (
            NOT_IDENTIFIED_LABEL.to_string(),
            NOT_IDENTIFIED_LABEL.to_string(),
        )
    } else {
        (raw_label.clone(), display_label(&raw_label))
    };

    Ok(Prediction {
        raw_label,
        label,
        display_label: display,
        confidence,
        scores,
        warning: raw.warning,
        stage_label: raw.predicted_stage,
        predicted_at: now,
        correction_sync: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_from(value: serde_json::Value) -> RawPrediction {
        serde_json::from_value::<PredictEnvelope>(value)
            .unwrap()
            .into_inner()
    }

    #[test]
    fn low_confidence_becomes_sentinel() {
        let raw = raw_from(json!({"predicted_class": "Culex_sp", "confidence": 0.40}));
        let prediction = normalize(raw, Utc::now()).unwrap();

        assert_eq!(prediction.label, NOT_IDENTIFIED_LABEL);
        assert_eq!(prediction.display_label, NOT_IDENTIFIED_LABEL);
        assert_eq!(prediction.raw_label, "Culex_sp");
        assert!((prediction.confidence - 0.40).abs() < 1e-6);
        assert_eq!(prediction.confidence_display(), "40.0%");
    }

    #[test]
    fn floor_is_strict() {
        let raw = raw_from(json!({"predicted_class": "Aedes", "confidence": 0.65}));
        let prediction = normalize(raw, Utc::now()).unwrap();
        assert!(prediction.is_identified());

        let raw = raw_from(json!({"predicted_class": "Aedes", "confidence": 0.6499}));
        let prediction = normalize(raw, Utc::now()).unwrap();
        assert!(!prediction.is_identified());
    }

    #[test]
    fn argmax_over_probability_map() {
        let raw = raw_from(json!({
            "all_probabilities": {"Aedes": 0.9, "Culex": 0.05, "tick": 0.05}
        }));
        let prediction = normalize(raw, Utc::now()).unwrap();

        assert_eq!(prediction.raw_label, "Aedes");
        assert_eq!(prediction.display_label, "Aedes Mosquito");
        assert!((prediction.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn ties_keep_first_encountered_class() {
        let raw = raw_from(json!({
            "all_probabilities": {"tick": 0.7, "flea": 0.7, "lice": 0.1}
        }));
        let prediction = normalize(raw, Utc::now()).unwrap();

        assert_eq!(prediction.raw_label, "tick");
        assert_eq!(prediction.display_label, "Tick");
    }

    #[test]
    fn percent_valued_maps_are_rescaled() {
        let raw = raw_from(json!({
            "classification": {
                "predicted_class": "monkeypox",
                "max_prob": 0.88,
                "class_probabilities": {"acne": 4.0, "chickenpox": 8.0, "monkeypox": 88.0},
                "predicted_stage": "stage_2"
            }
        }));
        let prediction = normalize(raw, Utc::now()).unwrap();

        assert_eq!(prediction.raw_label, "monkeypox");
        assert_eq!(prediction.stage_label.as_deref(), Some("stage_2"));
        let total: f32 = prediction.scores.iter().map(|s| s.probability).sum();
        assert!((total - 1.0).abs() < 1e-3);
    }

    #[test]
    fn detailed_scores_carry_descriptions() {
        let raw = raw_from(json!({
            "all_probabilities": {
                "Aedes": {"probability": 0.8, "description": "dengue vector"},
                "Culex": {"probability": 0.2}
            }
        }));
        let prediction = normalize(raw, Utc::now()).unwrap();

        assert_eq!(prediction.scores[0].description.as_deref(), Some("dengue vector"));
        assert_eq!(prediction.scores[1].description, None);
    }

    #[test]
    fn classifier_failure_is_upstream_error() {
        let raw = raw_from(json!({"success": false, "error": "model not loaded"}));
        let err = normalize(raw, Utc::now()).unwrap_err();

        match err {
            FesatError::Upstream(message) => assert_eq!(message, "model not loaded"),
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[test]
    fn missing_label_and_scores_is_rejected() {
        let raw = raw_from(json!({"confidence": 0.9}));
        assert!(matches!(
            normalize(raw, Utc::now()),
            Err(FesatError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn display_labels() {
        assert_eq!(display_label("Aedes"), "Aedes Mosquito");
        assert_eq!(display_label("Culex_sp"), "Culex Mosquito");
        assert_eq!(display_label("bed_bug"), "Bed Bug");
        assert_eq!(display_label("non_skin"), "non skin");
        assert_eq!(display_label(NOT_IDENTIFIED_LABEL), NOT_IDENTIFIED_LABEL);
    }

    #[test]
    fn confidence_formatting() {
        assert_eq!(format_confidence(0.82), "82.0%");
        assert_eq!(format_confidence(1.0), "100.0%");
        assert_eq!(format_confidence(0.004), "0.4%");
    }

    #[test]
    fn date_formatting() {
        use chrono::TimeZone;

        let raw = raw_from(json!({"predicted_class": "Aedes", "confidence": 0.9}));
        let at = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();
        let prediction = normalize(raw, at).unwrap();
        assert_eq!(prediction.date_display(), "Thu Aug 06 2026");
    }
}
