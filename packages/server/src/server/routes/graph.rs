//! Graph read endpoints: entity/relationship listings and the restricted
//! query language.

use std::time::Instant;

use axum::extract::{Extension, Query};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use extraction::{
    run_query, Entity, EntityFilter, EntityType, GraphStore, Relationship, RelationshipFilter,
    RelationshipType,
};

use crate::common::PageParams;
use crate::kernel::accounts::{Account, AccountStore};
use crate::server::app::AppState;
use crate::server::auth::AuthUser;
use crate::server::error::ApiError;

async fn account_for(state: &AppState, auth: &AuthUser) -> Result<Account, ApiError> {
    state
        .accounts
        .find_by_user(auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("no connected account".to_string()))
}

#[derive(Serialize)]
pub struct EntityView {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub confidence: f32,
    pub mentions: u64,
    pub created_at: DateTime<Utc>,
}

impl From<Entity> for EntityView {
    fn from(entity: Entity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            entity_type: entity.entity_type.as_str().to_string(),
            confidence: entity.confidence,
            mentions: entity.mention_count,
            created_at: entity.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct RelationshipView {
    pub id: Uuid,
    pub source: Uuid,
    pub target: Uuid,
    pub source_name: String,
    pub target_name: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub confidence: f32,
    pub evidence_count: u64,
    pub created_at: DateTime<Utc>,
}

impl From<Relationship> for RelationshipView {
    fn from(rel: Relationship) -> Self {
        Self {
            id: rel.id,
            source: rel.source_id,
            target: rel.target_id,
            source_name: rel.source_name,
            target_name: rel.target_name,
            relationship_type: rel.relationship_type.as_str().to_string(),
            confidence: rel.confidence,
            evidence_count: rel.evidence_count,
            created_at: rel.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub count: u64,
    pub results: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct EntityListParams {
    /// Entity type filter, e.g. "person"
    #[serde(rename = "type")]
    pub entity_type: Option<String>,

    /// Case-insensitive name substring filter
    pub name_contains: Option<String>,

    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// `GET /api/graph/entities?type&limit&offset`
///
/// Ordered by mention count descending, then creation time ascending, for
/// deterministic pagination. Oversized limits are clamped, not rejected.
pub async fn list_entities_handler(
    auth: AuthUser,
    Extension(state): Extension<AppState>,
    Query(params): Query<EntityListParams>,
) -> Result<Json<ListResponse<EntityView>>, ApiError> {
    let account = account_for(&state, &auth).await?;

    let mut filter = EntityFilter::for_account(account.id);
    if let Some(raw) = &params.entity_type {
        let ty: EntityType = raw
            .parse()
            .map_err(|e: String| ApiError::BadRequest(e))?;
        filter = filter.with_type(ty);
    }
    if let Some(needle) = &params.name_contains {
        filter = filter.with_name_contains(needle.clone());
    }

    let (limit, offset) = PageParams {
        limit: params.limit,
        offset: params.offset,
    }
    .resolve();

    let page = state.store.list_entities(&filter, limit, offset).await?;
    Ok(Json(ListResponse {
        count: page.total,
        results: page.items.into_iter().map(EntityView::from).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RelationshipListParams {
    /// Restrict to edges touching this entity
    pub entity_id: Option<Uuid>,

    /// Relationship type filter, e.g. "works_for"
    pub relationship_type: Option<String>,

    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// `GET /api/graph/relationships?entity_id&relationship_type&limit&offset`
pub async fn list_relationships_handler(
    auth: AuthUser,
    Extension(state): Extension<AppState>,
    Query(params): Query<RelationshipListParams>,
) -> Result<Json<ListResponse<RelationshipView>>, ApiError> {
    let account = account_for(&state, &auth).await?;

    let mut filter = RelationshipFilter::for_account(account.id);
    if let Some(entity_id) = params.entity_id {
        filter = filter.with_entity(entity_id);
    }
    if let Some(raw) = &params.relationship_type {
        let ty: RelationshipType = raw
            .parse()
            .map_err(|e: String| ApiError::BadRequest(e))?;
        filter = filter.with_type(ty);
    }

    let (limit, offset) = PageParams {
        limit: params.limit,
        offset: params.offset,
    }
    .resolve();

    let page = state
        .store
        .list_relationships(&filter, limit, offset)
        .await?;
    Ok(Json(ListResponse {
        count: page.total,
        results: page.items.into_iter().map(RelationshipView::from).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub results: Vec<serde_json::Value>,
    pub count: usize,
    pub execution_time_ms: u64,
}

/// `POST /api/graph/query` - restricted read-only graph query.
///
/// Mutating clauses are rejected with 400; execution is bounded by the
/// configured timeout (504 on expiry, job state unaffected).
pub async fn run_query_handler(
    auth: AuthUser,
    Extension(state): Extension<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let account = account_for(&state, &auth).await?;

    let started = Instant::now();
    let rows = run_query(
        state.store.as_ref(),
        account.id,
        &request.query,
        state.query_timeout,
    )
    .await?;

    Ok(Json(QueryResponse {
        count: rows.len(),
        results: rows,
        execution_time_ms: started.elapsed().as_millis() as u64,
    }))
}
