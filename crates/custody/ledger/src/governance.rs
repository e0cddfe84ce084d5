use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Multi-party control over the trust anchor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernancePolicy {
    pub members: Vec<String>,
    #[serde(default = "default_threshold")]
    pub threshold: usize,
}

fn default_threshold() -> usize {
    2
}

impl GovernancePolicy {
    pub fn new<I, S>(members: I, threshold: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            members: members.into_iter().map(Into::into).collect(),
            threshold,
        }
    }

    pub fn validate(&self) -> LedgerResult<()> {
        let distinct: BTreeSet<&str> = self.members.iter().map(String::as_str).collect();
        if distinct.len() != self.members.len() {
            return Err(LedgerError::InvalidArgument(
                "governance members must be distinct".to_string(),
            ));
        }
        if self.threshold == 0 || self.threshold > distinct.len() {
            return Err(LedgerError::InvalidArgument(format!(
                "threshold {} is not satisfiable by {} members",
                self.threshold,
                distinct.len()
            )));
        }
        Ok(())
    }

    /// Number of distinct member endorsements; errors below the threshold.
    pub fn authorize(&self, endorsers: &[String]) -> LedgerResult<usize> {
        let approvals = endorsers
            .iter()
            .filter(|endorser| self.members.contains(endorser))
            .collect::<BTreeSet<_>>()
            .len();
        if approvals < self.threshold {
            return Err(LedgerError::UnauthorizedConfigUpdate {
                approvals,
                threshold: self.threshold,
            });
        }
        Ok(approvals)
    }
}
