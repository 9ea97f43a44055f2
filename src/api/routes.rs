use crate::analyzer::{discover_tables, report};
use crate::config::Config;
use crate::forms::{FormInput, ValidationError, build_record, parse_field};
use crate::store::schema::Column;
use crate::store::value::Record;
use crate::store::{ErrorCategory, Layout, StoreError, Table, TableStore};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub store: Arc<TableStore>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/status", get(status))
        .route("/api/v1/dashboard", get(dashboard))
        .route("/api/v1/tables", get(table_list))
        .route("/api/v1/tables/:id", get(table_detail))
        .route("/api/v1/tables/:id/rows", post(append_row))
        .route("/api/v1/tables/:id/cells", put(update_cell))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct TableQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct AppendPayload {
    values: FormInput,
}

#[derive(Debug, Deserialize)]
struct CellPayload {
    day: Value,
    column: String,
    value: Value,
}

#[derive(Debug, Serialize)]
struct StatusPayload {
    data_dir: String,
    report_dir: String,
    spreadsheet_files: usize,
    catalog_tables: usize,
    api_port: u16,
}

#[derive(Debug, Serialize)]
struct TableView<'a> {
    id: &'a str,
    title: &'a str,
    file: &'a str,
    sheet: &'a str,
    layout: &'static str,
    columns: &'a [Column],
}

#[derive(Debug, Serialize)]
struct TablePayload {
    id: String,
    columns: Vec<String>,
    row_count: usize,
    rows: Vec<Record>,
    totals: Vec<Record>,
}

impl TablePayload {
    fn new(id: &str, table: &Table, limit: usize) -> Self {
        Self {
            id: id.to_string(),
            columns: table.columns().to_vec(),
            row_count: table.len(),
            rows: table.head(limit).to_vec(),
            totals: table.totals().to_vec(),
        }
    }
}

async fn status(State(state): State<ApiState>) -> ApiResult<Json<StatusPayload>> {
    let files = discover_tables(state.store.root())?;

    Ok(Json(StatusPayload {
        data_dir: state.store.root().display().to_string(),
        report_dir: state.config.report_dir.display().to_string(),
        spreadsheet_files: files.len(),
        catalog_tables: state.store.catalog().tables().len(),
        api_port: state.config.api_port,
    }))
}

async fn dashboard(State(state): State<ApiState>) -> ApiResult<Json<report::Dashboard>> {
    let dashboard = report::build_dashboard(&state.store, state.config.preview_rows)?;
    Ok(Json(dashboard))
}

async fn table_list(State(state): State<ApiState>) -> Json<Value> {
    let tables = state
        .store
        .catalog()
        .tables()
        .iter()
        .map(|schema| TableView {
            id: &schema.id,
            title: &schema.title,
            file: &schema.file,
            sheet: &schema.sheet,
            layout: match schema.layout() {
                Layout::Append => "append",
                Layout::Weekly(_) => "weekly",
            },
            columns: schema.columns(),
        })
        .collect::<Vec<_>>();

    Json(json!({ "tables": tables }))
}

/// Reads only; a table that was never written is a 404.
async fn table_detail(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<TableQuery>,
) -> ApiResult<Json<TablePayload>> {
    let limit = query.limit.unwrap_or(state.config.preview_rows);
    let table = state.store.load(&id)?;
    Ok(Json(TablePayload::new(&id, &table, limit)))
}

async fn append_row(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(payload): Json<AppendPayload>,
) -> ApiResult<(StatusCode, Json<TablePayload>)> {
    let schema = state.store.schema(&id)?;
    let record = build_record(schema, &payload.values, Local::now().date_naive())?;
    let table = state.store.append(&id, record)?;

    info!(table = %id, rows = table.len(), "row submitted through API");
    Ok((
        StatusCode::CREATED,
        Json(TablePayload::new(&id, &table, state.config.preview_rows)),
    ))
}

async fn update_cell(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(payload): Json<CellPayload>,
) -> ApiResult<Json<TablePayload>> {
    let schema = state.store.schema(&id)?;
    let Some(weekly) = schema.weekly_layout() else {
        return Err(StoreError::LayoutMismatch {
            table: id,
            operation: "cell update",
        }
        .into());
    };

    let row = match &payload.day {
        Value::String(day) => weekly.day_index(day),
        Value::Number(index) => index
            .as_u64()
            .and_then(|index| usize::try_from(index).ok())
            .filter(|index| *index < weekly.days.len()),
        _ => None,
    }
    .ok_or_else(|| ApiError::BadRequest(format!("unknown day: {}", payload.day)))?;

    let column = schema
        .column(&payload.column)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown column: {}", payload.column)))?;
    let value = parse_field(column, &payload.value)
        .map_err(|message| ApiError::BadRequest(format!("{}: {message}", payload.column)))?;

    let table = state.store.update_cell(&id, row, &payload.column, value)?;
    Ok(Json(TablePayload::new(&id, &table, weekly.days.len())))
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value)
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value.category() {
            ErrorCategory::Validation => Self::BadRequest(value.to_string()),
            ErrorCategory::NotFound => Self::NotFound(value.to_string()),
            ErrorCategory::Conflict => Self::Conflict(value.to_string()),
            ErrorCategory::Io => Self::Internal(value.into()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(value: ValidationError) -> Self {
        Self::BadRequest(value.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Internal(error) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{error:#}")),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ApiError, ApiState, AppendPayload, CellPayload, TableQuery, append_row, table_detail,
        update_cell,
    };
    use crate::catalog::Catalog;
    use crate::config::Config;
    use crate::store::{StoreError, TableStore, Value};
    use axum::Json;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn state(root: &std::path::Path) -> ApiState {
        ApiState {
            config: Arc::new(Config::default()),
            store: Arc::new(TableStore::new(root, Catalog::standard())),
        }
    }

    #[test]
    fn store_errors_map_to_status_codes() {
        let cases = [
            (StoreError::UnknownTable("x".to_string()), StatusCode::NOT_FOUND),
            (
                StoreError::LayoutMismatch {
                    table: "x".to_string(),
                    operation: "append",
                },
                StatusCode::CONFLICT,
            ),
            (
                StoreError::InvalidEdit {
                    table: "x".to_string(),
                    reason: "no".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                StoreError::io(
                    "write",
                    std::path::Path::new("x.xlsx"),
                    std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                ),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let response = ApiError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn invalid_submission_writes_nothing() {
        let dir = tempdir().expect("temp dir");
        let state = state(dir.path());
        let values = json!({"Fournisseur": "Acme"})
            .as_object()
            .cloned()
            .expect("object");

        let result = append_row(
            State(state.clone()),
            Path("logistics_suppliers".to_string()),
            Json(AppendPayload { values }),
        )
        .await;

        let error = result.err().expect("missing required fields");
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
        assert!(!dir.path().join("Suivi_Fournisseur.xlsx").exists());
    }

    #[tokio::test]
    async fn reading_a_table_never_creates_it() {
        let dir = tempdir().expect("temp dir");
        let state = state(dir.path());

        let result = table_detail(
            State(state.clone()),
            Path("machine_g11".to_string()),
            Query(TableQuery { limit: None }),
        )
        .await;

        let error = result.err().expect("not created yet");
        assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
        assert!(!dir.path().join("Suivi_G11.xlsx").exists());
    }

    #[tokio::test]
    async fn cell_update_accepts_day_labels() {
        let dir = tempdir().expect("temp dir");
        let state = state(dir.path());

        let Json(payload) = update_cell(
            State(state.clone()),
            Path("machine_g11".to_string()),
            Json(CellPayload {
                day: json!("Lundi"),
                column: "Arrêt Machine (minutes)".to_string(),
                value: json!("120"),
            }),
        )
        .await
        .ok()
        .expect("cell updated");

        let availability = payload.rows[0]
            .get(3)
            .cloned()
            .expect("availability cell");
        assert_eq!(availability, Value::Number(91.7));
        assert_eq!(payload.totals.len(), 2);
    }
}
