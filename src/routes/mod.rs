use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod auth_routes;
pub mod case_routes;
pub mod dashboard_routes;
pub mod events_routes;
pub mod payment_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/auth", auth_routes::router())
        .nest(
            "/api/v1",
            appointment_routes::router()
                .merge(case_routes::router())
                .merge(payment_routes::router())
                .merge(events_routes::router()),
        )
        .merge(dashboard_routes::router())
        .with_state(state)
}
