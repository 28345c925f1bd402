use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one probe job, drawn at random from the 16-bit space.
///
/// `JobId::NONE` (zero) is the rejection sentinel returned when a start
/// request is refused; it is never issued for a real job.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u16);

impl JobId {
    pub const NONE: JobId = JobId(0);

    pub fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Draw a random candidate id. Never returns `NONE`.
    pub fn random() -> Self {
        loop {
            let raw: u16 = rand::random();
            if raw != 0 {
                return Self(raw);
            }
        }
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one target within a job, assigned by the probe engine in
/// insertion order and stable for the job's lifetime.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(u32);

impl TargetId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
