pub mod slope;

pub use slope::{
    anomalous_pairs, calibrate_margin, detect_anomaly, AnomalyAssessment, AssessmentStatus,
    SlopeDetector,
};
