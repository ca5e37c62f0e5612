use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use shared_config::AppConfig;

use crate::handlers;

pub fn scheduling_routes(state: Arc<AppConfig>) -> Router {
    let professional_routes = Router::new()
        // Weekly availability, one weekday at a time
        .route("/{professional_id}/rules", get(handlers::get_rules))
        .route("/{professional_id}/rules/{day_of_week}", put(handlers::replace_day_rules))

        // Full-day and single-slot blocks
        .route(
            "/{professional_id}/exceptions",
            get(handlers::list_exceptions).post(handlers::block_dates),
        )
        .route("/{professional_id}/exceptions/slot", post(handlers::block_slot))
        .route("/{professional_id}/exceptions/{exception_id}", delete(handlers::unblock))

        // Derived slots and bookings
        .route("/{professional_id}/slots", get(handlers::get_day_slots))
        .route("/{professional_id}/appointments", post(handlers::confirm_booking));

    let appointment_routes = Router::new()
        .route("/appointments/{appointment_id}/reschedule", post(handlers::reschedule_appointment));

    Router::new()
        .merge(professional_routes)
        .merge(appointment_routes)
        .with_state(state)
}
