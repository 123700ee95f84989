//! Gateway-owned endpoints.
//!
//! - `GET /actuator/health`: health snapshot, 503 when any dependency is down
//! - `GET /api/employees/{id}`: employee joined with its department

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::health::aggregator::OverallStatus;
use crate::observability::correlation::CorrelationContext;
use crate::security::access_control::RequestIdentity;

pub const EMPLOYEE_PEER: &str = "employee-service";
pub const DEPARTMENT_PEER: &str = "department-service";

pub async fn health(State(state): State<AppState>) -> Response {
    let snapshot = state.health.snapshot();
    let status = match snapshot.status {
        OverallStatus::Up => StatusCode::OK,
        OverallStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(snapshot)).into_response()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub department_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeWithDepartment {
    pub id: i64,
    pub name: String,
    pub position: Option<String>,
    pub department_id: Option<i64>,
    pub department: Option<Department>,
}

/// Fetch an employee, then its department, from the two peers.
pub async fn employee_with_department(
    State(state): State<AppState>,
    ctx: CorrelationContext,
    identity: Option<Extension<RequestIdentity>>,
    Path(raw_id): Path<String>,
) -> Result<Json<EmployeeWithDepartment>, ApiError> {
    let id: i64 = raw_id
        .parse()
        .map_err(|_| ApiError::validation(format!("employee id must be numeric, got '{raw_id}'")))?;
    let bearer = identity.as_ref().and_then(|Extension(i)| i.bearer.as_deref());

    let employees = state
        .peers
        .get(EMPLOYEE_PEER)
        .ok_or_else(|| ApiError::Internal(format!("peer {EMPLOYEE_PEER} not configured")))?;
    let employee: Employee = employees
        .get_json(&format!("/employees/{id}"), &ctx, bearer)
        .await
        .into_result(EMPLOYEE_PEER, &format!("employee {id}"))?;

    let department = match employee.department_id {
        Some(department_id) => {
            let departments = state.peers.get(DEPARTMENT_PEER).ok_or_else(|| {
                ApiError::Internal(format!("peer {DEPARTMENT_PEER} not configured"))
            })?;
            let department: Department = departments
                .get_json(&format!("/departments/{department_id}"), &ctx, bearer)
                .await
                .into_result(DEPARTMENT_PEER, &format!("department {department_id}"))?;
            Some(department)
        }
        None => None,
    };

    Ok(Json(EmployeeWithDepartment {
        id: employee.id,
        name: employee.name,
        position: employee.position,
        department_id: employee.department_id,
        department,
    }))
}
