//! Claim history list: search, status filter, and summary counts.

use shared_types::{Claim, ClaimStatus};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimFilter {
    /// Case-insensitive match on title, description, claim number or id.
    pub search: Option<String>,
    pub status: Option<ClaimStatus>,
}

impl ClaimFilter {
    pub fn matches(&self, claim: &Claim) -> bool {
        if self.status.is_some_and(|s| s != claim.status) {
            return false;
        }
        let Some(needle) = self
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
        else {
            return true;
        };
        [
            Some(claim.title.as_str()),
            Some(claim.description.as_str()),
            claim.claim_number.as_deref(),
            Some(claim.id.as_str()),
        ]
        .into_iter()
        .flatten()
        .any(|haystack| haystack.to_lowercase().contains(&needle))
    }

    pub fn apply<'a>(&self, claims: &'a [Claim]) -> Vec<&'a Claim> {
        claims.iter().filter(|c| self.matches(c)).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimStats {
    pub total: usize,
    pub open: usize,
    pub resolved: usize,
    pub rejected: usize,
}

impl ClaimStats {
    pub fn from_claims(claims: &[Claim]) -> Self {
        claims.iter().fold(Self::default(), |mut stats, claim| {
            stats.total += 1;
            match claim.status {
                ClaimStatus::Resolved => stats.resolved += 1,
                ClaimStatus::Rejected => stats.rejected += 1,
                _ => stats.open += 1,
            }
            stats
        })
    }
}
