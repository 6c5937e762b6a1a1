//! Tri-state readiness of the tokens relation.

use std::collections::BTreeSet;

use tokens_types::Identity;

/// Readiness of the relation as seen from a requirer unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// No relation instance is bound, or the bound one is being torn down.
    Missing,
    /// An instance is bound but usable provider data is not there yet.
    Waiting {
        /// Requested identities without a token. Empty when in-flight
        /// tracking is disabled.
        in_flight: BTreeSet<Identity>,
    },
    /// Provider data is usable and every tracked request has a token.
    Ready,
}

impl Readiness {
    /// Returns `true` for [`Readiness::Ready`].
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Renders the status message for a non-ready relation.
    ///
    /// Returns `None` when ready. In-flight identities are listed in sorted
    /// order so repeated evaluations produce identical messages.
    pub fn status_message(&self, endpoint: &str) -> Option<String> {
        match self {
            Self::Missing => Some(format!("Missing required {endpoint} relation")),
            Self::Waiting { in_flight } if in_flight.is_empty() => {
                Some(format!("Waiting for {endpoint} relation"))
            }
            Self::Waiting { in_flight } => {
                let pending: Vec<&str> = in_flight.iter().map(String::as_str).collect();
                Some(format!(
                    "Waiting for {endpoint} relation: {}",
                    pending.join(", ")
                ))
            }
            Self::Ready => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_per_state() {
        assert_eq!(
            Readiness::Missing.status_message("tokens").as_deref(),
            Some("Missing required tokens relation")
        );
        assert_eq!(
            Readiness::Waiting {
                in_flight: BTreeSet::new()
            }
            .status_message("tokens")
            .as_deref(),
            Some("Waiting for tokens relation")
        );
        assert_eq!(Readiness::Ready.status_message("tokens"), None);
    }

    #[test]
    fn in_flight_identities_are_sorted_and_comma_joined() {
        let waiting = Readiness::Waiting {
            in_flight: ["zed", "alice", "bob"].iter().map(|s| s.to_string()).collect(),
        };
        assert_eq!(
            waiting.status_message("vault").as_deref(),
            Some("Waiting for vault relation: alice, bob, zed")
        );
        assert!(!waiting.is_ready());
    }
}
