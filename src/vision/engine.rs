use image::GrayImage;
use tracing::debug;

use crate::vision::strategy::{self, StrategyKind, CASCADE};

/// Record of one strategy evaluation.
#[derive(Debug, Clone)]
pub struct DecodeAttempt {
    pub strategy: StrategyKind,
    pub payload: Option<String>,
}

impl DecodeAttempt {
    pub fn succeeded(&self) -> bool {
        self.payload.is_some()
    }
}

/// Outcome of running the cascade over one region: either the trail ends in
/// the first success, or it holds all seven failures.
#[derive(Debug, Clone)]
pub struct DecodeOutcome {
    pub attempts: Vec<DecodeAttempt>,
}

impl DecodeOutcome {
    pub fn payload(&self) -> Option<&str> {
        self.attempts.last().and_then(|a| a.payload.as_deref())
    }

    pub fn decoded(&self) -> bool {
        self.payload().is_some()
    }
}

/// Run the strategy cascade over a region crop, stopping at the first
/// success. Exhausting every strategy is a negative result, not an error.
pub fn decode_region(crop: &GrayImage) -> DecodeOutcome {
    let mut attempts = Vec::new();

    for kind in CASCADE {
        let payload = strategy::run(kind, crop);
        let succeeded = payload.is_some();

        if let Some(ref content) = payload {
            debug!(strategy = kind.name(), payload = %content, "decode succeeded");
        } else {
            debug!(strategy = kind.name(), "decode attempt failed");
        }

        attempts.push(DecodeAttempt {
            strategy: kind,
            payload,
        });

        if succeeded {
            break;
        }
    }

    DecodeOutcome { attempts }
}
