use axum::{
    routing::{get, post, put},
    Router,
};

use super::handlers::{
    assign_instructor, attendance_summary, available_instructors, bulk_record_assessments,
    create_session, delete_session, enroll_participant, get_session,
    issue_certificate_for_participant, issue_certificates, list_assessments, list_instructors,
    list_participants, list_session_certificates, record_assessment, remove_instructor,
    remove_participant, set_attendance, transition_session,
};
use crate::app_state::AppState;

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_session))
        .route("/{id}", get(get_session).delete(delete_session))
        .route("/{id}/transition", post(transition_session))
        // Roster
        .route("/{id}/instructors", get(list_instructors))
        .route("/{id}/instructors/available", post(available_instructors))
        .route(
            "/{id}/instructors/{user_id}",
            post(assign_instructor).delete(remove_instructor),
        )
        .route("/{id}/participants", get(list_participants))
        .route(
            "/{id}/participants/{user_id}",
            post(enroll_participant).delete(remove_participant),
        )
        .route("/{id}/participants/{user_id}/attendance", put(set_attendance))
        .route("/{id}/attendance", get(attendance_summary))
        // Grading and certification
        .route("/{id}/assessments", get(list_assessments))
        .route("/{id}/assessments/bulk", post(bulk_record_assessments))
        .route("/{id}/assessments/{user_id}", put(record_assessment))
        .route(
            "/{id}/certificates",
            get(list_session_certificates).post(issue_certificates),
        )
        .route(
            "/{id}/participants/{user_id}/certificate",
            post(issue_certificate_for_participant),
        )
}
