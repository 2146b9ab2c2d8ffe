//! Deterministic risk scoring.
//!
//! Triage rules are independent and combined by taking the maximum score of
//! the rules that fire, never the sum, so overlapping findings are not
//! double-penalized. Age is a modifier applied after the max step.
//!
//! The scorer performs no I/O and uses no randomness: the same vitals always
//! yield the same assessment.

use crate::stats::SeriesSummary;
use crate::types::{ClinicalRequest, LocalEvidence, Operation, RiskAssessment, Vitals};

pub const LABEL_CRITICAL_TEMPERATURE: &str = "critical temperature";
pub const LABEL_MODERATE_HYPERTHERMIA: &str = "moderate hyperthermia";
pub const LABEL_HEMODYNAMIC_INSTABILITY: &str = "hemodynamic instability";
pub const LABEL_STAGE_1_HYPERTENSION: &str = "stage-1 hypertension";
pub const LABEL_RESPIRATORY_FAILURE: &str = "impending respiratory failure";
pub const LABEL_MODERATE_HYPOXIA: &str = "moderate hypoxia";
pub const LABEL_AGE_RISK: &str = "age risk factor";
pub const LABEL_ROUTINE: &str = "routine consultation";

/// Score when no rule fires.
pub const ROUTINE_SCORE: u8 = 20;

/// Flat bonus for patients under 2 or over 70.
pub const AGE_RISK_BONUS: u8 = 10;

/// A single rule that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RuleHit {
    score: u8,
    label: &'static str,
}

/// Mean and standard deviation of one feature in a reference population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureReference {
    pub mean: f64,
    pub std_dev: f64,
}

impl FeatureReference {
    pub const fn new(mean: f64, std_dev: f64) -> Self {
        Self { mean, std_dev }
    }

    fn z_score(&self, value: f64) -> Option<f64> {
        if !self.std_dev.is_finite() || self.std_dev <= 0.0 {
            return None;
        }
        let z = (value - self.mean) / self.std_dev;
        z.is_finite().then_some(z)
    }
}

/// Reference population the anomaly index standardizes against.
///
/// Standardizing a single observation against its own mean and deviation
/// always yields zero, so each feature is scored against these fixed
/// population statistics instead.
///
/// Features missing from a request are imputed with the reference mean, so
/// they contribute a zero deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePopulation {
    pub age: FeatureReference,
    pub temperature: FeatureReference,
    pub oxygen_saturation: FeatureReference,
    pub systolic_bp: FeatureReference,
}

impl Default for ReferencePopulation {
    /// Resting adult emergency-department intake.
    fn default() -> Self {
        Self {
            age: FeatureReference::new(40.0, 20.0),
            temperature: FeatureReference::new(36.8, 0.5),
            oxygen_saturation: FeatureReference::new(97.5, 1.5),
            systolic_bp: FeatureReference::new(120.0, 15.0),
        }
    }
}

impl ReferencePopulation {
    /// Mean absolute z-score of `[age, temperature, SpO2, systolic BP]`.
    pub fn anomaly_index(&self, vitals: Option<&Vitals>, age: Option<u32>) -> Option<f64> {
        let age = age.map(f64::from).unwrap_or(self.age.mean);
        let temperature = vitals
            .and_then(|v| v.temperature)
            .unwrap_or(self.temperature.mean);
        let oxygen = vitals
            .and_then(|v| v.oxygen_saturation)
            .unwrap_or(self.oxygen_saturation.mean);
        let systolic = vitals
            .and_then(|v| v.systolic_bp)
            .map(f64::from)
            .unwrap_or(self.systolic_bp.mean);

        let deviations = [
            self.age.z_score(age)?,
            self.temperature.z_score(temperature)?,
            self.oxygen_saturation.z_score(oxygen)?,
            self.systolic_bp.z_score(systolic)?,
        ];

        let index = deviations.iter().map(|z| z.abs()).sum::<f64>() / deviations.len() as f64;
        index.is_finite().then_some(index)
    }
}

/// Deterministic scoring engine.
#[derive(Debug, Clone, Default)]
pub struct DeterministicRiskScorer {
    reference: ReferencePopulation,
}

impl DeterministicRiskScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom reference population for the anomaly index.
    pub fn with_reference(reference: ReferencePopulation) -> Self {
        Self { reference }
    }

    /// Compute the local evidence for a request.
    ///
    /// Triage gets a risk assessment; demand forecasts and growth analyses
    /// get a descriptive summary of their history; chat and summaries need
    /// no local numbers.
    pub fn assess(&self, request: &ClinicalRequest) -> LocalEvidence {
        match request.operation() {
            Operation::Triage => LocalEvidence {
                risk: Some(self.score(request.vitals(), request.age())),
                series: None,
            },
            Operation::DemandForecast | Operation::GrowthAnalysis => LocalEvidence {
                risk: None,
                series: request.history().and_then(SeriesSummary::from_series),
            },
            Operation::Chat | Operation::Summarize => LocalEvidence::default(),
        }
    }

    /// Score vital signs and age.
    pub fn score(&self, vitals: Option<&Vitals>, age: Option<u32>) -> RiskAssessment {
        let hits: Vec<RuleHit> = vitals
            .map(|v| {
                [
                    v.temperature.and_then(temperature_rule),
                    v.systolic_bp.and_then(systolic_rule),
                    v.oxygen_saturation.and_then(oxygen_rule),
                ]
                .into_iter()
                .flatten()
                .collect()
            })
            .unwrap_or_default();

        let mut warnings: Vec<String> = hits.iter().map(|h| h.label.to_string()).collect();
        let mut score = match hits.iter().map(|h| h.score).max() {
            Some(max) => max,
            None => {
                warnings.push(LABEL_ROUTINE.to_string());
                ROUTINE_SCORE
            }
        };

        if age.is_some_and(|a| a < 2 || a > 70) {
            score = score.saturating_add(AGE_RISK_BONUS).min(100);
            warnings.push(LABEL_AGE_RISK.to_string());
        }

        let anomaly_index = match self.reference.anomaly_index(vitals, age) {
            Some(index) => index,
            None => {
                tracing::warn!("Anomaly index could not be computed, defaulting to 0.0");
                0.0
            }
        };

        tracing::debug!(score, warnings = ?warnings, anomaly_index, "Local risk assessment");

        RiskAssessment::new(score, warnings, Some(anomaly_index))
    }
}

fn temperature_rule(celsius: f64) -> Option<RuleHit> {
    if !celsius.is_finite() {
        tracing::warn!(celsius, "Skipping temperature rule for non-finite value");
        return None;
    }
    if celsius >= 40.0 || celsius <= 35.0 {
        Some(RuleHit {
            score: 90,
            label: LABEL_CRITICAL_TEMPERATURE,
        })
    } else if celsius >= 38.5 {
        Some(RuleHit {
            score: 50,
            label: LABEL_MODERATE_HYPERTHERMIA,
        })
    } else {
        None
    }
}

fn systolic_rule(systolic: u32) -> Option<RuleHit> {
    if systolic >= 180 || systolic <= 80 {
        Some(RuleHit {
            score: 95,
            label: LABEL_HEMODYNAMIC_INSTABILITY,
        })
    } else if systolic >= 140 {
        Some(RuleHit {
            score: 40,
            label: LABEL_STAGE_1_HYPERTENSION,
        })
    } else {
        None
    }
}

fn oxygen_rule(percent: f64) -> Option<RuleHit> {
    if !percent.is_finite() {
        tracing::warn!(percent, "Skipping oxygen saturation rule for non-finite value");
        return None;
    }
    if percent <= 88.0 {
        Some(RuleHit {
            score: 100,
            label: LABEL_RESPIRATORY_FAILURE,
        })
    } else if percent <= 92.0 {
        Some(RuleHit {
            score: 80,
            label: LABEL_MODERATE_HYPOXIA,
        })
    } else {
        None
    }
}
