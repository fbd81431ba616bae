use sha2::{Digest, Sha256};

use crate::models::ExperimentGroup;

/// Deterministic A/B bucketing
///
/// The group is SHA-256 of the subject id's decimal/text form, reduced mod 2,
/// so every process in the fleet agrees without shared state.
#[derive(Debug, Clone, Copy)]
pub struct ExperimentAssigner {
    enabled: bool,
}

impl Default for ExperimentAssigner {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ExperimentAssigner {
    /// With `enabled = false` every subject lands in control
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Anonymous subjects always get control, never a random group
    pub fn assign(&self, subject: Option<&str>) -> ExperimentGroup {
        match subject {
            Some(id) if self.enabled => bucket(id),
            _ => ExperimentGroup::Control,
        }
    }

    pub fn assign_user(&self, user_id: i64) -> ExperimentGroup {
        self.assign(Some(&user_id.to_string()))
    }
}

fn bucket(subject: &str) -> ExperimentGroup {
    let digest = Sha256::digest(subject.as_bytes());
    // The parity of the digest read as a big-endian integer is the parity of its last byte.
    if digest[digest.len() - 1] % 2 == 0 {
        ExperimentGroup::Control
    } else {
        ExperimentGroup::Treatment
    }
}
