use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::routing::get;
use axum::{BoxError, Router};
use tower::timeout::error::Elapsed;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::client::Collaborators;
use crate::handlers::{health_check, ticket};
use crate::middleware::authenticate;
use crate::usecase::TicketUsecase;
use crate::utils::AppError;

#[derive(Clone)]
pub struct AppState {
    pub usecase: Arc<dyn TicketUsecase>,
    pub collaborators: Arc<dyn Collaborators>,
    pub auth_enabled: bool,
}

pub fn create_routes(state: AppState, request_timeout: Duration) -> Router {
    let mut public = Router::new().route("/api/v1/tickets", get(ticket::show_tickets));
    if state.auth_enabled {
        public = public.route_layer(axum::middleware::from_fn_with_state(state.clone(), authenticate));
    }

    let private = Router::new()
        .route("/api/private/ticket", get(ticket::get_ticket_by_region_name))
        .route("/api/private/ticket/inquiry", get(ticket::inquiry_ticket_amount))
        .route("/api/private/ticket/stock", get(ticket::check_stock_ticket));

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(public)
        .merge(private);

    with_timeout(app, request_timeout)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bounds every request by `timeout`; an elapsed request gets the error
/// envelope with 408.
fn with_timeout<S>(router: Router<S>, timeout: Duration) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_timeout))
            .layer(TimeoutLayer::new(timeout)),
    )
}

async fn handle_timeout(err: BoxError) -> AppError {
    if err.is::<Elapsed>() {
        AppError::Timeout("Request timeout".to_string())
    } else {
        AppError::internal(format!("unhandled middleware error: {err}"))
    }
}
