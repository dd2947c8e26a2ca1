//! Restricted read-only graph query language.
//!
//! Query text is never handed to a store. A small Cypher-style grammar is
//! validated and parsed into a [`QueryPlan`], then interpreted against the
//! [`GraphStore`] read API, so mutation is impossible by construction and
//! the mutating-keyword check is a second line of defense.
//!
//! Supported shapes:
//!
//! ```text
//! MATCH (n)                         RETURN n LIMIT 10
//! MATCH (n:Person)                  RETURN n
//! MATCH (n:Organization) WHERE n.name CONTAINS "acme" RETURN n LIMIT 5
//! MATCH (a)-[r]->(b)                RETURN a, r, b
//! MATCH (a:Person)-[r:WORKS_FOR]->(b:Organization) RETURN a, r, b LIMIT 20
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::{GraphQueryError, QueryResult};
use crate::traits::store::{
    clamp_limit, EntityFilter, GraphStore, RelationshipFilter, MAX_PAGE_SIZE,
};
use crate::types::entity::{Entity, EntityType};
use crate::types::relationship::{Relationship, RelationshipType};

/// Default LIMIT when the query omits one.
pub const DEFAULT_QUERY_LIMIT: usize = 25;

/// Longest accepted query text.
pub const MAX_QUERY_LEN: usize = 1_000;

/// Clauses that mutate a graph; any occurrence rejects the query.
pub const MUTATING_KEYWORDS: [&str; 10] = [
    "create", "merge", "delete", "detach", "set", "remove", "drop", "load", "call", "foreach",
];

fn mutating_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(r"(?i)\b({})\b", MUTATING_KEYWORDS.join("|"));
        Regex::new(&pattern).unwrap()
    })
}

fn node_query_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?isx)^\s*
            MATCH\s*\(\s*(?P<var>[a-zA-Z_][a-zA-Z0-9_]*)\s*
                (?::\s*(?P<label>[a-zA-Z_][a-zA-Z0-9_]*))?\s*\)\s*
            (?:WHERE\s+(?P<wvar>[a-zA-Z_][a-zA-Z0-9_]*)\s*\.\s*name\s+
                CONTAINS\s+(?:'(?P<sq>[^']*)'|"(?P<dq>[^"]*)")\s*)?
            RETURN\s+(?P<ret>[a-zA-Z0-9_.,\s*]+?)\s*
            (?:LIMIT\s+(?P<limit>\d+)\s*)?
            ;?\s*$"#,
        )
        .unwrap()
    })
}

fn edge_query_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?isx)^\s*
            MATCH\s*\(\s*(?P<svar>[a-zA-Z_][a-zA-Z0-9_]*)\s*
                (?::\s*(?P<slabel>[a-zA-Z_][a-zA-Z0-9_]*))?\s*\)\s*
            -\s*\[\s*(?P<rvar>[a-zA-Z_][a-zA-Z0-9_]*)\s*
                (?::\s*(?P<rtype>[a-zA-Z_][a-zA-Z0-9_]*))?\s*\]\s*->\s*
            \(\s*(?P<tvar>[a-zA-Z_][a-zA-Z0-9_]*)\s*
                (?::\s*(?P<tlabel>[a-zA-Z_][a-zA-Z0-9_]*))?\s*\)\s*
            RETURN\s+(?P<ret>[a-zA-Z0-9_.,\s*]+?)\s*
            (?:LIMIT\s+(?P<limit>\d+)\s*)?
            ;?\s*$"#,
        )
        .unwrap()
    })
}

/// Parsed, validated query ready to interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    /// `MATCH (n[:Type]) [WHERE n.name CONTAINS …] RETURN … [LIMIT k]`
    Nodes {
        entity_type: Option<EntityType>,
        name_contains: Option<String>,
        limit: usize,
    },
    /// `MATCH (a[:Type])-[r[:TYPE]]->(b[:Type]) RETURN … [LIMIT k]`
    Edges {
        source_type: Option<EntityType>,
        relationship_type: Option<RelationshipType>,
        target_type: Option<EntityType>,
        limit: usize,
    },
}

/// Reject anything that is not a read-only query this interpreter supports.
pub fn validate(query: &str) -> QueryResult<()> {
    if query.trim().is_empty() {
        return Err(GraphQueryError::Rejected {
            reason: "empty query".to_string(),
        });
    }
    if query.len() > MAX_QUERY_LEN {
        return Err(GraphQueryError::Rejected {
            reason: format!("query longer than {} characters", MAX_QUERY_LEN),
        });
    }
    if let Some(found) = mutating_re().find(query) {
        return Err(GraphQueryError::Rejected {
            reason: format!("mutating clause not permitted: {}", found.as_str().to_uppercase()),
        });
    }
    Ok(())
}

/// Validate and parse query text into a plan.
pub fn parse(query: &str) -> QueryResult<QueryPlan> {
    validate(query)?;

    if let Some(caps) = edge_query_re().captures(query) {
        let svar = caps.name("svar").map(|m| m.as_str()).unwrap_or_default();
        let rvar = caps.name("rvar").map(|m| m.as_str()).unwrap_or_default();
        let tvar = caps.name("tvar").map(|m| m.as_str()).unwrap_or_default();
        check_return_vars(caps.name("ret").map(|m| m.as_str()).unwrap_or_default(), &[svar, rvar, tvar])?;

        return Ok(QueryPlan::Edges {
            source_type: parse_entity_label(caps.name("slabel").map(|m| m.as_str()))?,
            relationship_type: parse_relationship_label(caps.name("rtype").map(|m| m.as_str()))?,
            target_type: parse_entity_label(caps.name("tlabel").map(|m| m.as_str()))?,
            limit: parse_limit(caps.name("limit").map(|m| m.as_str()))?,
        });
    }

    if let Some(caps) = node_query_re().captures(query) {
        let var = caps.name("var").map(|m| m.as_str()).unwrap_or_default();
        check_return_vars(caps.name("ret").map(|m| m.as_str()).unwrap_or_default(), &[var])?;

        if let Some(wvar) = caps.name("wvar") {
            if wvar.as_str() != var {
                return Err(GraphQueryError::Rejected {
                    reason: format!("unknown variable in WHERE: {}", wvar.as_str()),
                });
            }
        }
        let name_contains = caps
            .name("sq")
            .or_else(|| caps.name("dq"))
            .map(|m| m.as_str().to_string())
            .filter(|s| !s.is_empty());

        return Ok(QueryPlan::Nodes {
            entity_type: parse_entity_label(caps.name("label").map(|m| m.as_str()))?,
            name_contains,
            limit: parse_limit(caps.name("limit").map(|m| m.as_str()))?,
        });
    }

    Err(GraphQueryError::Rejected {
        reason: "unsupported query shape; expected MATCH (n[:Type]) … RETURN … \
                 or MATCH (a)-[r]->(b) … RETURN …"
            .to_string(),
    })
}

fn parse_limit(raw: Option<&str>) -> QueryResult<usize> {
    match raw {
        None => Ok(DEFAULT_QUERY_LIMIT),
        Some(digits) => {
            let value: usize = digits.parse().map_err(|_| GraphQueryError::Rejected {
                reason: format!("invalid LIMIT: {}", digits),
            })?;
            // Clamped to the server max, not rejected
            Ok(clamp_limit(value))
        }
    }
}

fn parse_entity_label(label: Option<&str>) -> QueryResult<Option<EntityType>> {
    match label {
        None => Ok(None),
        Some(raw) => raw
            .to_ascii_lowercase()
            .parse::<EntityType>()
            .map(Some)
            .map_err(|_| GraphQueryError::Rejected {
                reason: format!("unknown node label: {}", raw),
            }),
    }
}

fn parse_relationship_label(label: Option<&str>) -> QueryResult<Option<RelationshipType>> {
    match label {
        None => Ok(None),
        Some(raw) => raw
            .to_ascii_lowercase()
            .parse::<RelationshipType>()
            .map(Some)
            .map_err(|_| GraphQueryError::Rejected {
                reason: format!("unknown relationship type: {}", raw),
            }),
    }
}

fn check_return_vars(ret: &str, declared: &[&str]) -> QueryResult<()> {
    for item in ret.split(',') {
        let item = item.trim();
        if item.is_empty() || item == "*" {
            continue;
        }
        let var = item.split('.').next().unwrap_or(item).trim();
        if !declared.contains(&var) {
            return Err(GraphQueryError::Rejected {
                reason: format!("unknown variable in RETURN: {}", var),
            });
        }
    }
    Ok(())
}

/// Parse and interpret a query against the store, bounded by `timeout`.
pub async fn run_query<S>(
    store: &S,
    account_id: Uuid,
    query_text: &str,
    timeout: Duration,
) -> QueryResult<Vec<Value>>
where
    S: GraphStore + ?Sized,
{
    let plan = parse(query_text)?;
    debug!(?plan, "executing graph query");

    tokio::time::timeout(timeout, execute(store, account_id, plan))
        .await
        .map_err(|_| GraphQueryError::Timeout)?
}

async fn execute<S>(store: &S, account_id: Uuid, plan: QueryPlan) -> QueryResult<Vec<Value>>
where
    S: GraphStore + ?Sized,
{
    match plan {
        QueryPlan::Nodes {
            entity_type,
            name_contains,
            limit,
        } => {
            let mut filter = EntityFilter::for_account(account_id);
            filter.entity_type = entity_type;
            filter.name_contains = name_contains;

            let page = store.list_entities(&filter, limit, 0).await?;
            Ok(page.items.iter().map(entity_row).collect())
        }
        QueryPlan::Edges {
            source_type,
            relationship_type,
            target_type,
            limit,
        } => {
            let mut filter = RelationshipFilter::for_account(account_id);
            filter.relationship_type = relationship_type;

            // Endpoint labels filter after the fetch; over-fetch up to the
            // page cap so a filtered page can still fill the limit.
            let fetch = if source_type.is_some() || target_type.is_some() {
                MAX_PAGE_SIZE
            } else {
                limit
            };
            let page = store.list_relationships(&filter, fetch, 0).await?;

            let mut rows = Vec::new();
            for rel in &page.items {
                if rows.len() >= limit {
                    break;
                }
                if !endpoint_matches(store, rel.source_id, source_type).await? {
                    continue;
                }
                if !endpoint_matches(store, rel.target_id, target_type).await? {
                    continue;
                }
                rows.push(relationship_row(rel));
            }
            Ok(rows)
        }
    }
}

async fn endpoint_matches<S>(
    store: &S,
    entity_id: Uuid,
    wanted: Option<EntityType>,
) -> QueryResult<bool>
where
    S: GraphStore + ?Sized,
{
    let Some(wanted) = wanted else {
        return Ok(true);
    };
    let entity = store.get_entity(entity_id).await?;
    Ok(entity.map(|e| e.entity_type == wanted).unwrap_or(false))
}

fn entity_row(entity: &Entity) -> Value {
    json!({
        "id": entity.id,
        "name": entity.name,
        "type": entity.entity_type.as_str(),
        "confidence": entity.confidence,
        "mentions": entity.mention_count,
        "created_at": entity.created_at,
    })
}

fn relationship_row(rel: &Relationship) -> Value {
    json!({
        "id": rel.id,
        "source": rel.source_id,
        "source_name": rel.source_name,
        "target": rel.target_id,
        "target_name": rel.target_name,
        "type": rel.relationship_type.as_str(),
        "confidence": rel.confidence,
        "evidence_count": rel.evidence_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_empty_queries() {
        assert!(matches!(
            validate("   "),
            Err(GraphQueryError::Rejected { .. })
        ));
    }

    #[test]
    fn rejects_mutating_queries() {
        for query in [
            "DELETE n",
            "MATCH (n) DELETE n",
            "match (n) detach delete n",
            "CREATE (n:Person {name: 'x'})",
            "MATCH (n) SET n.name = 'x' RETURN n",
            "MERGE (n:Person) RETURN n",
            "DROP INDEX idx",
            "CALL db.labels()",
        ] {
            assert!(
                matches!(parse(query), Err(GraphQueryError::Rejected { .. })),
                "expected rejection: {}",
                query
            );
        }
    }

    #[test]
    fn parses_bare_node_query() {
        let plan = parse("MATCH (n) RETURN n").unwrap();
        assert_eq!(
            plan,
            QueryPlan::Nodes {
                entity_type: None,
                name_contains: None,
                limit: DEFAULT_QUERY_LIMIT,
            }
        );
    }

    #[test]
    fn parses_typed_node_query_with_limit() {
        let plan = parse("MATCH (p:Person) RETURN p LIMIT 10").unwrap();
        assert_eq!(
            plan,
            QueryPlan::Nodes {
                entity_type: Some(EntityType::Person),
                name_contains: None,
                limit: 10,
            }
        );
    }

    #[test]
    fn parses_where_contains() {
        let plan =
            parse(r#"MATCH (n:Organization) WHERE n.name CONTAINS "acme" RETURN n.name LIMIT 5"#)
                .unwrap();
        assert_eq!(
            plan,
            QueryPlan::Nodes {
                entity_type: Some(EntityType::Organization),
                name_contains: Some("acme".to_string()),
                limit: 5,
            }
        );
    }

    #[test]
    fn parses_edge_query() {
        let plan = parse("MATCH (a:Person)-[r:WORKS_FOR]->(b:Organization) RETURN a, r, b").unwrap();
        assert_eq!(
            plan,
            QueryPlan::Edges {
                source_type: Some(EntityType::Person),
                relationship_type: Some(RelationshipType::WorksFor),
                target_type: Some(EntityType::Organization),
                limit: DEFAULT_QUERY_LIMIT,
            }
        );
    }

    #[test]
    fn excessive_limits_are_clamped_not_rejected() {
        let plan = parse("MATCH (n) RETURN n LIMIT 5000").unwrap();
        assert_eq!(
            plan,
            QueryPlan::Nodes {
                entity_type: None,
                name_contains: None,
                limit: MAX_PAGE_SIZE,
            }
        );
    }

    #[test]
    fn rejects_unknown_labels_and_variables() {
        assert!(matches!(
            parse("MATCH (n:Starship) RETURN n"),
            Err(GraphQueryError::Rejected { .. })
        ));
        assert!(matches!(
            parse("MATCH (n) RETURN m"),
            Err(GraphQueryError::Rejected { .. })
        ));
        assert!(matches!(
            parse("MATCH (n) WHERE m.name CONTAINS 'x' RETURN n"),
            Err(GraphQueryError::Rejected { .. })
        ));
    }

    #[test]
    fn keywords_are_matched_on_word_boundaries() {
        // "asset" contains "set", "recall" contains "call" - neither mutates
        let plan = parse("MATCH (n) WHERE n.name CONTAINS 'asset recall' RETURN n");
        assert!(plan.is_ok());
    }

    #[test]
    fn trailing_semicolon_is_accepted() {
        assert!(parse("MATCH (n) RETURN n;").is_ok());
    }

    proptest! {
        #[test]
        fn any_query_containing_a_mutating_keyword_is_rejected(
            prefix in "[A-Za-z0-9 ()\\[\\]>:,.]{0,40}",
            keyword in proptest::sample::select(MUTATING_KEYWORDS.to_vec()),
            suffix in "[A-Za-z0-9 ()\\[\\]>:,.]{0,40}",
        ) {
            let query = format!("{} {} {}", prefix, keyword, suffix);
            let is_rejected = matches!(
                validate(&query),
                Err(GraphQueryError::Rejected { .. })
            );
            prop_assert!(is_rejected);
        }
    }
}
