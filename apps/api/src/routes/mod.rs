pub mod health;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::background_checks::handlers as background_checks;
use crate::consultants::handlers as consultants;
use crate::identity::handlers as identity;
use crate::mail::handlers as mail;
use crate::notifications::handle_notification_stream;
use crate::profiles::handlers as profiles;
use crate::recording::handlers as recording;
use crate::reports;
use crate::state::AppState;
use crate::tasks::handlers as tasks;

/// `?user_id=` scoping shared by most read endpoints. Every query filters on
/// the owning user.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Session / identity
        .route(
            "/api/v1/session",
            post(identity::handle_sign_in)
                .get(identity::handle_get_session)
                .delete(identity::handle_sign_out),
        )
        .route("/api/v1/session/stream", get(identity::handle_session_stream))
        .route(
            "/api/v1/identity/microsoft/link",
            post(identity::handle_link_microsoft),
        )
        .route(
            "/api/v1/identity/microsoft/callback",
            get(identity::handle_microsoft_callback),
        )
        .route(
            "/api/v1/identity/microsoft",
            delete(identity::handle_unlink_microsoft),
        )
        // Mail
        .route("/api/v1/emails", get(mail::handle_list_emails))
        .route("/api/v1/emails/send", post(mail::handle_send_email))
        .route("/api/v1/emails/:id", patch(mail::handle_update_email))
        .route(
            "/api/v1/email-templates",
            get(mail::handle_list_templates).post(mail::handle_create_template),
        )
        .route(
            "/api/v1/email-templates/:id",
            delete(mail::handle_delete_template),
        )
        .route(
            "/api/v1/email-templates/:id/use",
            post(mail::handle_use_template),
        )
        // Recording / call records
        .route("/api/v1/recordings", post(recording::handle_start_recording))
        .route(
            "/api/v1/recordings/:job_id",
            get(recording::handle_recording_status).delete(recording::handle_cancel_recording),
        )
        .route(
            "/api/v1/call-records",
            get(recording::handle_list_call_records).post(recording::handle_create_call_record),
        )
        .route(
            "/api/v1/call-records/:id",
            get(recording::handle_get_call_record),
        )
        // Tasks
        .route(
            "/api/v1/tasks",
            get(tasks::handle_list_tasks).post(tasks::handle_create_task),
        )
        .route("/api/v1/tasks/changes", get(tasks::handle_task_changes))
        .route(
            "/api/v1/tasks/:id",
            get(tasks::handle_get_task)
                .patch(tasks::handle_update_task)
                .delete(tasks::handle_delete_task),
        )
        .route(
            "/api/v1/notifications/stream",
            get(handle_notification_stream),
        )
        // Consultants
        .route(
            "/api/v1/consultants",
            get(consultants::handle_list_consultants).post(consultants::handle_create_consultant),
        )
        .route(
            "/api/v1/consultants/:id",
            get(consultants::handle_get_consultant)
                .patch(consultants::handle_update_consultant)
                .delete(consultants::handle_delete_consultant),
        )
        // Profile
        .route(
            "/api/v1/profile",
            get(profiles::handle_get_profile).put(profiles::handle_update_profile),
        )
        // Background checks
        .route(
            "/api/v1/background-checks",
            get(background_checks::handle_list_background_checks)
                .post(background_checks::handle_request_background_check),
        )
        // Reports
        .route("/api/v1/reports/summary", get(reports::handle_summary))
        .route("/api/v1/kpis", get(reports::handle_list_kpis))
        .route("/api/v1/assignments", get(reports::handle_list_assignments))
        .with_state(state)
}
