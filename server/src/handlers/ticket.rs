use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::Response;
use axum::Extension;
use serde::Deserialize;

use crate::middleware::AuthUser;
use crate::models::Pagination;
use crate::routes::AppState;
use crate::utils::response::{paginated, success, PageInfo};
use crate::utils::{AppError, AppResult};

const INVALID_QUERY_PARAMS: &str = "Bad Request, Invalid Query Params";
const INVALID_TICKET_DETAIL_ID: &str = "Invalid Ticket Detail ID";
const INVALID_TOTAL_TICKET: &str = "Invalid Total Ticket";
const INVALID_REGION_NAME: &str = "Invalid Region Name";

#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    ticket_detail_id: Option<String>,
    total_ticket: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegionQuery {
    region_name: Option<String>,
}

fn parse_positive(raw: Option<&str>, message: &str) -> AppResult<i64> {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v >= 1)
        .ok_or_else(|| AppError::bad_request(message))
}

pub async fn show_tickets(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    query: Result<Query<Pagination>, QueryRejection>,
) -> AppResult<Response> {
    let Query(pagination) = query.map_err(|_| AppError::bad_request(INVALID_QUERY_PARAMS))?;
    let (page, size) = pagination
        .validated()
        .ok_or_else(|| AppError::bad_request(INVALID_QUERY_PARAMS))?;
    let user_id = user.map(|Extension(user)| user.user_id).unwrap_or(0);

    let tickets = state.usecase.show_tickets(page, size, user_id).await?;

    Ok(paginated(
        tickets.items,
        PageInfo {
            page,
            size,
            total_page: tickets.pages,
            total_data: tickets.total,
        },
        "Success get tickets",
    ))
}

pub async fn inquiry_ticket_amount(
    State(state): State<AppState>,
    Query(query): Query<DetailQuery>,
) -> AppResult<Response> {
    let detail_id = parse_positive(query.ticket_detail_id.as_deref(), INVALID_TICKET_DETAIL_ID)?;
    let total_ticket = parse_positive(query.total_ticket.as_deref(), INVALID_TOTAL_TICKET)?;

    let amount = state.usecase.inquiry_ticket_amount(detail_id, total_ticket).await?;
    Ok(success(amount, "Success inquiry ticket amount"))
}

pub async fn check_stock_ticket(
    State(state): State<AppState>,
    Query(query): Query<DetailQuery>,
) -> AppResult<Response> {
    let detail_id = parse_positive(query.ticket_detail_id.as_deref(), INVALID_TICKET_DETAIL_ID)?;

    let stock = state.usecase.check_stock_ticket(detail_id).await?;
    Ok(success(stock, "Success check stock ticket"))
}

pub async fn get_ticket_by_region_name(
    State(state): State<AppState>,
    Query(query): Query<RegionQuery>,
) -> AppResult<Response> {
    let region = query
        .region_name
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::bad_request(INVALID_REGION_NAME))?;

    let tickets = state.usecase.get_ticket_by_region_name(region).await?;
    Ok(success(tickets, "Success get ticket by region name"))
}
