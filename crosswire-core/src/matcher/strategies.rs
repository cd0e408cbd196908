//! Per-technology similarity strategies.
//!
//! The matcher picks a strategy from the connection's `technology_name`:
//! HTTP connections compare normalized request paths, messaging
//! connections compare queue/topic literals, and everything else falls
//! back to token overlap on the descriptions. Scores are in `[0, 1]`.

use super::ConnectionView;

/// Outcome of scoring one outgoing/incoming pair.
#[derive(Debug, Clone)]
pub struct Score {
    pub value: f64,
    pub rationale: String,
}

/// A pluggable similarity function for one family of technologies.
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, outgoing: &ConnectionView, incoming: &ConnectionView) -> Score;
}

/// Lowercased alphanumeric tokens of a text.
fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity over two token bags.
fn jaccard(a: &[String], b: &[String]) -> f64 {
    use std::collections::HashSet;
    let sa: HashSet<&str> = a.iter().map(String::as_str).collect();
    let sb: HashSet<&str> = b.iter().map(String::as_str).collect();
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }
    let intersection = sa.intersection(&sb).count() as f64;
    let union = sa.union(&sb).count() as f64;
    intersection / union
}

// ── Default: token overlap ─────────────────────────────────────────

/// The documented default fall-back: Jaccard token overlap between the
/// two descriptions.
#[derive(Debug, Default)]
pub struct TokenOverlapStrategy;

impl MatchStrategy for TokenOverlapStrategy {
    fn name(&self) -> &'static str {
        "token-overlap"
    }

    fn evaluate(&self, outgoing: &ConnectionView, incoming: &ConnectionView) -> Score {
        let value = jaccard(&tokens(&outgoing.description), &tokens(&incoming.description));
        Score {
            value,
            rationale: format!("description token overlap {value:.2}"),
        }
    }
}

// ── HTTP ───────────────────────────────────────────────────────────

/// Compares normalized request paths. The HTTP method needs no comparison:
/// the matcher only pairs connections with identical technology names and
/// the method is part of the name (e.g. `HTTP/GET`).
#[derive(Debug, Default)]
pub struct HttpStrategy;

/// Pull the first path-looking token (`/...`) out of a description or
/// code snippet.
fn extract_path(view: &ConnectionView) -> Option<String> {
    for source in [&view.description, &view.code_snippet] {
        for raw in source.split(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '`')
        {
            let trimmed = raw.trim_end_matches([',', '.', ';', ')', '(']);
            if trimmed.len() > 1 && trimmed.starts_with('/') {
                return Some(normalize_path(trimmed));
            }
        }
    }
    None
}

/// Lowercase, strip trailing slash, collapse path parameters to `*`.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    let segments: Vec<String> = trimmed
        .split('/')
        .skip(1)
        .map(|seg| {
            if seg.starts_with(':') || seg.starts_with('{') || seg.starts_with('<') {
                "*".to_string()
            } else {
                seg.to_lowercase()
            }
        })
        .collect();
    format!("/{}", segments.join("/"))
}

/// Positional segment agreement; `*` matches anything.
fn path_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let sa: Vec<&str> = a.split('/').skip(1).collect();
    let sb: Vec<&str> = b.split('/').skip(1).collect();
    let matching = sa
        .iter()
        .zip(sb.iter())
        .filter(|(x, y)| x == y || **x == "*" || **y == "*")
        .count() as f64;
    2.0 * matching / (sa.len() + sb.len()) as f64
}

impl MatchStrategy for HttpStrategy {
    fn name(&self) -> &'static str {
        "http"
    }

    fn evaluate(&self, outgoing: &ConnectionView, incoming: &ConnectionView) -> Score {
        match (extract_path(outgoing), extract_path(incoming)) {
            (Some(out_path), Some(in_path)) => {
                let value = path_similarity(&out_path, &in_path);
                Score {
                    value,
                    rationale: format!("path {out_path} vs {in_path}: {value:.2}"),
                }
            }
            _ => TokenOverlapStrategy.evaluate(outgoing, incoming),
        }
    }
}

// ── Messaging ──────────────────────────────────────────────────────

/// Compares queue/topic/routing-key literals pulled from the code, with a
/// description-token fall-back when neither side names a literal.
#[derive(Debug, Default)]
pub struct MessagingStrategy;

/// String literals appearing in a code snippet.
fn quoted_literals(code: &str) -> Vec<String> {
    let mut literals = Vec::new();
    for quote in ['"', '\''] {
        let mut parts = code.split(quote);
        // Every odd-indexed part sits between two quotes.
        parts.next();
        while let (Some(inner), rest) = (parts.next(), parts.next()) {
            if !inner.is_empty() {
                literals.push(inner.to_lowercase());
            }
            if rest.is_none() {
                break;
            }
        }
    }
    literals
}

impl MatchStrategy for MessagingStrategy {
    fn name(&self) -> &'static str {
        "messaging"
    }

    fn evaluate(&self, outgoing: &ConnectionView, incoming: &ConnectionView) -> Score {
        let out_literals = quoted_literals(&outgoing.code_snippet);
        let in_literals = quoted_literals(&incoming.code_snippet);

        if !out_literals.is_empty() && !in_literals.is_empty() {
            let shared: Vec<&String> =
                out_literals.iter().filter(|l| in_literals.contains(l)).collect();
            if let Some(name) = shared.first() {
                return Score {
                    value: 1.0,
                    rationale: format!("shared queue/topic literal \"{name}\""),
                };
            }
            // Literals on both sides but none shared: weak signal at best.
            let value = jaccard(&out_literals, &in_literals)
                .max(jaccard(&tokens(&outgoing.description), &tokens(&incoming.description)) * 0.5);
            return Score {
                value,
                rationale: "no shared queue/topic literal".to_string(),
            };
        }

        TokenOverlapStrategy.evaluate(outgoing, incoming)
    }
}

// ── Registry ───────────────────────────────────────────────────────

/// Maps a technology name to the strategy that scores it.
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    http: HttpStrategy,
    messaging: MessagingStrategy,
    fallback: TokenOverlapStrategy,
}

const MESSAGING_PREFIXES: [&str; 7] =
    ["AMQP", "KAFKA", "RABBITMQ", "SQS", "MQTT", "NATS", "REDIS"];

impl StrategyRegistry {
    pub fn strategy_for(&self, technology: &str) -> &dyn MatchStrategy {
        let tech = technology.to_ascii_uppercase();
        if tech.starts_with("HTTP") || tech.starts_with("REST") {
            &self.http
        } else if MESSAGING_PREFIXES.iter().any(|p| tech.starts_with(p)) {
            &self.messaging
        } else {
            &self.fallback
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionRef, ConnectionId, Direction, ProjectId};

    fn view(direction: Direction, description: &str, code: &str, tech: &str) -> ConnectionView {
        ConnectionView {
            connection: ConnectionRef::Existing(ConnectionId(1)),
            project_id: ProjectId(1),
            direction,
            description: description.to_string(),
            code_snippet: code.to_string(),
            technology_name: tech.to_string(),
        }
    }

    #[test]
    fn http_exact_path_scores_one() {
        let out = view(
            Direction::Outgoing,
            "performs a GET request to /health",
            "http.Get(\"/health\")",
            "HTTP/GET",
        );
        let inc = view(
            Direction::Incoming,
            "serves GET /health",
            "r.GET(\"/health\", handler)",
            "HTTP/GET",
        );
        let score = HttpStrategy.evaluate(&out, &inc);
        assert!((score.value - 1.0).abs() < f64::EPSILON, "{score:?}");
    }

    #[test]
    fn http_path_parameters_are_wildcards() {
        assert_eq!(normalize_path("/users/:id/orders/"), "/users/*/orders");
        assert_eq!(normalize_path("/users/{userId}"), "/users/*");

        let out = view(
            Direction::Outgoing,
            "fetches /users/42? no - calls /users/{id}",
            "",
            "HTTP/GET",
        );
        let inc = view(Direction::Incoming, "handles /users/:id", "", "HTTP/GET");
        let score = HttpStrategy.evaluate(&out, &inc);
        assert!((score.value - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn http_different_paths_score_partially() {
        let out = view(Direction::Outgoing, "calls /api/users", "", "HTTP/GET");
        let inc = view(Direction::Incoming, "serves /api/orders", "", "HTTP/GET");
        let score = HttpStrategy.evaluate(&out, &inc);
        assert!(score.value < 1.0);
        assert!(score.value > 0.0, "shared /api prefix counts");
    }

    #[test]
    fn http_without_paths_falls_back_to_tokens() {
        let out = view(Direction::Outgoing, "calls the billing service", "", "HTTP/POST");
        let inc = view(Direction::Incoming, "billing service endpoint", "", "HTTP/POST");
        let score = HttpStrategy.evaluate(&out, &inc);
        assert!(score.value > 0.0);
    }

    #[test]
    fn messaging_shared_literal_scores_one() {
        let out = view(
            Direction::Outgoing,
            "publishes order events",
            "channel.publish('orders.created', payload)",
            "AMQP",
        );
        let inc = view(
            Direction::Incoming,
            "consumes order events",
            "channel.consume('orders.created', on_message)",
            "AMQP",
        );
        let score = MessagingStrategy.evaluate(&out, &inc);
        assert!((score.value - 1.0).abs() < f64::EPSILON, "{score:?}");
        assert!(score.rationale.contains("orders.created"));
    }

    #[test]
    fn messaging_disjoint_literals_score_low() {
        let out = view(Direction::Outgoing, "publishes", "publish(\"queue-a\")", "AMQP");
        let inc = view(Direction::Incoming, "consumes", "consume(\"queue-b\")", "AMQP");
        let score = MessagingStrategy.evaluate(&out, &inc);
        assert!(score.value < 0.5);
    }

    #[test]
    fn token_overlap_is_symmetric_and_bounded() {
        let a = view(Direction::Outgoing, "sends user sync request", "", "X");
        let b = view(Direction::Incoming, "receives user sync request", "", "X");
        let ab = TokenOverlapStrategy.evaluate(&a, &b).value;
        let ba = TokenOverlapStrategy.evaluate(&b, &a).value;
        assert!((ab - ba).abs() < f64::EPSILON);
        assert!(ab > 0.0 && ab <= 1.0);
    }

    #[test]
    fn registry_routes_by_technology_prefix() {
        let registry = StrategyRegistry::default();
        assert_eq!(registry.strategy_for("HTTP/GET").name(), "http");
        assert_eq!(registry.strategy_for("http/post").name(), "http");
        assert_eq!(registry.strategy_for("Kafka").name(), "messaging");
        assert_eq!(registry.strategy_for("AMQP").name(), "messaging");
        assert_eq!(registry.strategy_for("gRPC").name(), "token-overlap");
    }
}
