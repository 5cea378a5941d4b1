//! Calendar snapshot endpoints under `/calendar`.

use crate::auth::Credentials;
use crate::error::{ApiError, ApiResult};
use crate::metrics::{SNAPSHOT_BYTES_STORED, SNAPSHOTS_SERVED, SNAPSHOTS_STORED};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use calsnap_core::snapshot::validate_shape;
use calsnap_core::{SnapshotId, SnapshotInfo, SnapshotKind, parse_datetime};
use calsnap_metadata::MetadataError;
use calsnap_metadata::models::OwnerRow;
use calsnap_metadata::repos::{NewSnapshot, SnapshotRepo};
use serde::Deserialize;
use time::OffsetDateTime;

/// Query parameters shared by the calendar endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarQuery {
    pub owner_name: Option<String>,
    pub passphrase_hash: Option<String>,
    #[serde(alias = "modifiedInterval_Start")]
    pub window_start: Option<String>,
    #[serde(alias = "modifiedInterval_End")]
    pub window_end: Option<String>,
    pub id: Option<String>,
}

impl CalendarQuery {
    fn credentials(&self) -> ApiResult<Credentials> {
        Credentials::from_parts(self.owner_name.as_deref(), self.passphrase_hash.as_deref())
    }
}

/// GET /calendar/Alive - Liveness probe.
pub async fn alive() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// POST /calendar/ReserveName - Create the owner or verify its hash.
#[tracing::instrument(skip(state, query), fields(owner_id))]
pub async fn reserve_name(
    State(state): State<AppState>,
    Query(query): Query<CalendarQuery>,
) -> ApiResult<StatusCode> {
    let credentials = query.credentials()?;
    let owner = state
        .authenticator
        .reserve_or_authenticate(&credentials)
        .await?;
    tracing::Span::current().record("owner_id", owner.owner_id.to_string());
    Ok(StatusCode::NO_CONTENT)
}

/// GET /calendar/Authenticate - Verify credentials of an existing owner.
#[tracing::instrument(skip(state, query), fields(owner_id))]
pub async fn authenticate(
    State(state): State<AppState>,
    Query(query): Query<CalendarQuery>,
) -> ApiResult<StatusCode> {
    let owner = authenticated_owner(&state, &query).await?;
    tracing::Span::current().record("owner_id", owner.owner_id.to_string());
    Ok(StatusCode::NO_CONTENT)
}

/// POST /calendar/AddFullSnapshot - Store a snapshot covering everything.
#[tracing::instrument(skip(state, query, headers, body), fields(owner_id))]
pub async fn add_full_snapshot(
    State(state): State<AppState>,
    Query(query): Query<CalendarQuery>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<StatusCode> {
    let owner = authenticated_owner(&state, &query).await?;
    tracing::Span::current().record("owner_id", owner.owner_id.to_string());

    let data = state.payload_gate.read(&headers, body).await?;
    store_snapshot(&state, &owner, SnapshotKind::Full, None, None, &data).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /calendar/AddPartialSnapshot - Store a snapshot of one modification window.
#[tracing::instrument(skip(state, query, headers, body), fields(owner_id))]
pub async fn add_partial_snapshot(
    State(state): State<AppState>,
    Query(query): Query<CalendarQuery>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<StatusCode> {
    let owner = authenticated_owner(&state, &query).await?;
    tracing::Span::current().record("owner_id", owner.owner_id.to_string());

    let start = parse_window_bound(query.window_start.as_deref(), "windowStart")?;
    let end = parse_window_bound(query.window_end.as_deref(), "windowEnd")?;
    validate_shape(SnapshotKind::Partial, Some(start), Some(end))?;

    let data = state.payload_gate.read(&headers, body).await?;
    store_snapshot(
        &state,
        &owner,
        SnapshotKind::Partial,
        Some(start),
        Some(end),
        &data,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /calendar/GetAvailableSnapshots - List the owner's snapshots, oldest first.
#[tracing::instrument(skip(state, query), fields(owner_id))]
pub async fn list_snapshots(
    State(state): State<AppState>,
    Query(query): Query<CalendarQuery>,
) -> ApiResult<Json<Vec<SnapshotInfo>>> {
    let owner = authenticated_owner(&state, &query).await?;
    tracing::Span::current().record("owner_id", owner.owner_id.to_string());

    let rows = state.metadata.list_snapshots(owner.owner_id).await?;
    let infos = rows.iter().filter_map(|row| row.to_info()).collect();
    Ok(Json(infos))
}

/// GET /calendar/GetSnapshotData - Return one snapshot payload.
#[tracing::instrument(skip(state, query), fields(owner_id, snapshot_id))]
pub async fn get_snapshot_data(
    State(state): State<AppState>,
    Query(query): Query<CalendarQuery>,
) -> ApiResult<impl IntoResponse> {
    let owner = authenticated_owner(&state, &query).await?;
    let span = tracing::Span::current();
    span.record("owner_id", owner.owner_id.to_string());

    let raw_id = query
        .id
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("missing snapshot id".to_string()))?;
    let snapshot_id = SnapshotId::parse(raw_id)?;
    span.record("snapshot_id", snapshot_id.get());

    let data = state
        .metadata
        .get_blob(owner.owner_id, snapshot_id)
        .await?;
    SNAPSHOTS_SERVED.inc();

    Ok(([(CONTENT_TYPE, "application/octet-stream")], data))
}

async fn authenticated_owner(state: &AppState, query: &CalendarQuery) -> ApiResult<OwnerRow> {
    let credentials = query.credentials()?;
    state.authenticator.authenticate(&credentials).await
}

fn parse_window_bound(value: Option<&str>, name: &str) -> ApiResult<OffsetDateTime> {
    let value = value.ok_or_else(|| ApiError::BadRequest(format!("missing {name}")))?;
    Ok(parse_datetime(value)?)
}

async fn store_snapshot(
    state: &AppState,
    owner: &OwnerRow,
    kind: SnapshotKind,
    start: Option<OffsetDateTime>,
    end: Option<OffsetDateTime>,
    data: &[u8],
) -> ApiResult<()> {
    let window = validate_shape(kind, start, end)?;
    let row = state
        .metadata
        .add_snapshot(
            NewSnapshot {
                owner_id: owner.owner_id,
                kind,
                window,
                data,
            },
            OffsetDateTime::now_utc(),
        )
        .await
        .map_err(|e| match e {
            // The owner was removed after authenticating.
            MetadataError::NotFound(_) => ApiError::Unauthorized,
            e => e.into(),
        })?;

    SNAPSHOTS_STORED.with_label_values(&[kind.as_str()]).inc();
    SNAPSHOT_BYTES_STORED.inc_by(data.len() as u64);
    tracing::info!(
        snapshot_id = row.snapshot_id,
        kind = kind.as_str(),
        size_bytes = data.len(),
        "Snapshot stored"
    );
    Ok(())
}
