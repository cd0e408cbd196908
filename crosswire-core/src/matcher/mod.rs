//! Cross-project matching — pairs outgoing connections with incoming
//! connections in other projects.
//!
//! Runs after every affected project has been re-split, over the post-run
//! view of connections (survivors, shifted survivors, and this run's
//! pending inserts). Candidate pairs share a `technology_name`; a
//! per-technology [`strategies::MatchStrategy`] scores them and pairs at
//! or above the configured threshold become mapping rows. Input ordering
//! and tie-breaking are fixed (ascending connection ref), so identical
//! inputs always yield identical mappings.

pub mod strategies;

use std::collections::HashSet;

use tracing::debug;

use crate::types::{ConnectionId, ConnectionRef, Direction, NewMapping, ProjectId};

use self::strategies::StrategyRegistry;

/// A connection as the matcher sees it: either a stored row (with its
/// post-reconciliation state) or a pending insert from this run.
#[derive(Debug, Clone)]
pub struct ConnectionView {
    pub connection: ConnectionRef,
    pub project_id: ProjectId,
    pub direction: Direction,
    pub description: String,
    pub code_snippet: String,
    pub technology_name: String,
}

/// Compute the mapping rows for a run.
///
/// `existing_pairs` are already-stored mappings; their pairs are skipped so
/// re-running over an unchanged graph is a no-op.
pub fn match_connections(
    view: &[ConnectionView],
    existing_pairs: &HashSet<(ConnectionId, ConnectionId)>,
    threshold: f64,
    registry: &StrategyRegistry,
) -> Vec<NewMapping> {
    let mut outgoing: Vec<&ConnectionView> = view
        .iter()
        .filter(|c| c.direction == Direction::Outgoing)
        .collect();
    let mut incoming: Vec<&ConnectionView> = view
        .iter()
        .filter(|c| c.direction == Direction::Incoming)
        .collect();
    outgoing.sort_by_key(|c| c.connection);
    incoming.sort_by_key(|c| c.connection);

    let mut mappings = Vec::new();
    for out in &outgoing {
        for inc in &incoming {
            if inc.project_id == out.project_id {
                continue;
            }
            if inc.technology_name != out.technology_name {
                continue;
            }
            if let (ConnectionRef::Existing(out_id), ConnectionRef::Existing(in_id)) =
                (out.connection, inc.connection)
            {
                if existing_pairs.contains(&(out_id, in_id)) {
                    continue;
                }
            }

            let strategy = registry.strategy_for(&out.technology_name);
            let score = strategy.evaluate(out, inc);
            if score.value >= threshold {
                debug!(
                    outgoing = ?out.connection,
                    incoming = ?inc.connection,
                    technology = %out.technology_name,
                    strategy = strategy.name(),
                    confidence = score.value,
                    "Matched connection pair"
                );
                mappings.push(NewMapping {
                    outgoing: out.connection,
                    incoming: inc.connection,
                    confidence: score.value,
                    technology_name: out.technology_name.clone(),
                    rationale: Some(score.rationale),
                });
            }
        }
    }

    mappings
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn view(
        connection: ConnectionRef,
        project: i64,
        direction: Direction,
        description: &str,
        tech: &str,
    ) -> ConnectionView {
        ConnectionView {
            connection,
            project_id: ProjectId(project),
            direction,
            description: description.to_string(),
            code_snippet: String::new(),
            technology_name: tech.to_string(),
        }
    }

    fn existing(id: i64) -> ConnectionRef {
        ConnectionRef::Existing(ConnectionId(id))
    }

    #[test]
    fn matches_across_projects_with_same_technology() {
        let connections = vec![
            view(existing(1), 1, Direction::Outgoing, "GET /health check", "HTTP/GET"),
            view(existing(2), 2, Direction::Incoming, "serves GET /health", "HTTP/GET"),
        ];
        let mappings = match_connections(
            &connections,
            &HashSet::new(),
            0.5,
            &StrategyRegistry::default(),
        );
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].outgoing, existing(1));
        assert_eq!(mappings[0].incoming, existing(2));
        assert!(mappings[0].confidence >= 0.5);
        assert_eq!(mappings[0].technology_name, "HTTP/GET");
    }

    #[test]
    fn same_project_never_matches() {
        let connections = vec![
            view(existing(1), 1, Direction::Outgoing, "GET /health", "HTTP/GET"),
            view(existing(2), 1, Direction::Incoming, "GET /health", "HTTP/GET"),
        ];
        assert!(
            match_connections(&connections, &HashSet::new(), 0.1, &StrategyRegistry::default())
                .is_empty()
        );
    }

    #[test]
    fn technology_mismatch_never_matches() {
        let connections = vec![
            view(existing(1), 1, Direction::Outgoing, "GET /health", "HTTP/GET"),
            view(existing(2), 2, Direction::Incoming, "GET /health", "HTTP/POST"),
        ];
        assert!(
            match_connections(&connections, &HashSet::new(), 0.1, &StrategyRegistry::default())
                .is_empty()
        );
    }

    #[test]
    fn threshold_filters_weak_pairs() {
        let connections = vec![
            view(existing(1), 1, Direction::Outgoing, "publishes invoices", "gRPC"),
            view(existing(2), 2, Direction::Incoming, "handles user signups", "gRPC"),
        ];
        assert!(
            match_connections(&connections, &HashSet::new(), 0.5, &StrategyRegistry::default())
                .is_empty()
        );
    }

    #[test]
    fn existing_pairs_are_skipped() {
        let connections = vec![
            view(existing(1), 1, Direction::Outgoing, "GET /health", "HTTP/GET"),
            view(existing(2), 2, Direction::Incoming, "GET /health", "HTTP/GET"),
        ];
        let pairs: HashSet<_> = [(ConnectionId(1), ConnectionId(2))].into();
        assert!(
            match_connections(&connections, &pairs, 0.5, &StrategyRegistry::default()).is_empty()
        );
    }

    #[test]
    fn pending_connections_participate() {
        let connections = vec![
            view(ConnectionRef::New(0), 1, Direction::Outgoing, "GET /health", "HTTP/GET"),
            view(existing(2), 2, Direction::Incoming, "GET /health", "HTTP/GET"),
        ];
        let mappings =
            match_connections(&connections, &HashSet::new(), 0.5, &StrategyRegistry::default());
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].outgoing, ConnectionRef::New(0));
    }

    #[test]
    fn matcher_is_deterministic() {
        // L4: identical inputs yield identical mappings, regardless of the
        // order connections are handed in.
        let mut connections = vec![
            view(existing(3), 1, Direction::Outgoing, "GET /users list", "HTTP/GET"),
            view(existing(1), 1, Direction::Outgoing, "GET /health check", "HTTP/GET"),
            view(existing(4), 2, Direction::Incoming, "serves GET /users", "HTTP/GET"),
            view(existing(2), 2, Direction::Incoming, "serves GET /health", "HTTP/GET"),
        ];
        let first = match_connections(
            &connections,
            &HashSet::new(),
            0.3,
            &StrategyRegistry::default(),
        );
        connections.reverse();
        let second = match_connections(
            &connections,
            &HashSet::new(),
            0.3,
            &StrategyRegistry::default(),
        );

        let key = |m: &NewMapping| (m.outgoing, m.incoming, m.technology_name.clone());
        assert_eq!(
            first.iter().map(key).collect::<Vec<_>>(),
            second.iter().map(key).collect::<Vec<_>>()
        );
        assert!(!first.is_empty());
    }
}
