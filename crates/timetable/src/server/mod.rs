use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::server::endpoints::{reference, schedule, status, substitutions};
use crate::types::AppState;

mod endpoints;
pub mod types;
pub mod util;

pub use endpoints::substitutions::NewSubstitutionRequest;

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `app_state`: The app server state.
///
/// # Returns
/// The router.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let reference_router = Router::new()
        .route(
            "/teachers",
            get(reference::get_teachers).post(reference::post_teacher),
        )
        .route(
            "/subjects",
            get(reference::get_subjects).post(reference::post_subject),
        )
        .route(
            "/class_groups",
            get(reference::get_class_groups).post(reference::post_class_group),
        )
        .route(
            "/locations",
            get(reference::get_locations).post(reference::post_location),
        )
        .route(
            "/time_slots",
            get(reference::get_time_slots).post(reference::post_time_slot),
        );

    let schedule_router = Router::new()
        .route(
            "/schedule",
            get(schedule::get_entries).post(schedule::post_entry),
        )
        .route("/schedule/overwrite", post(schedule::post_overwrite))
        .route(
            "/schedule/:id",
            put(schedule::put_entry).delete(schedule::delete_entry),
        );

    let substitution_router = Router::new()
        .route(
            "/substitutions",
            get(substitutions::get_substitutions).post(substitutions::post_substitution),
        )
        .route("/substitutions/:id", delete(substitutions::delete_substitution))
        .route(
            "/substitutions/free_teachers",
            get(substitutions::get_free_teachers),
        )
        .route(
            "/substitutions/available",
            get(substitutions::get_available_substitutes),
        )
        .route(
            "/substitutions/absent_entries",
            get(substitutions::get_absent_entries),
        )
        .route("/substitutions/export", get(substitutions::get_export));

    Router::new()
        .route("/health", get(status::get_health))
        .merge(reference_router)
        .merge(schedule_router)
        .merge(substitution_router)
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::test_support::{draft, seeded_db};
    use crate::models::{ScheduleEntry, Substitution, SubstitutionDraft, Weekday};
    use crate::server::types::ApiErrorBody;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use chrono::NaiveDate;
    use serde::de::DeserializeOwned;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router() -> Router {
        create_router(Arc::new(AppState::new(seeded_db(), AppConfig::default())))
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&router(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse::<Value>(&body)["status"], "ok");
    }

    #[tokio::test]
    async fn test_conflicting_entry_then_overwrite() {
        let app = router();
        let first = json!(draft(Weekday::Monday, 1, vec![1], Some(1)));

        let (status, body) = send(&app, Method::POST, "/schedule", Some(first.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let existing: ScheduleEntry = parse(&body);

        let clash = json!(draft(Weekday::Monday, 1, vec![2], Some(1)));
        let (status, body) = send(&app, Method::POST, "/schedule", Some(clash.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let err: ApiErrorBody = parse(&body);
        let conflict = err.conflict.unwrap();
        assert_eq!(conflict.conflicting_entry, existing);
        assert_eq!(err.error, conflict.message);

        let request = json!({ "conflicting_entry_id": existing.id, "entry": clash });
        let (status, body) = send(&app, Method::POST, "/schedule/overwrite", Some(request)).await;
        assert_eq!(status, StatusCode::CREATED);
        let saved: ScheduleEntry = parse(&body);
        assert_eq!(saved.teacher_ids, vec![2]);

        let (_, body) = send(&app, Method::GET, "/schedule?day=monday", None).await;
        assert_eq!(parse::<Vec<ScheduleEntry>>(&body), vec![saved]);
    }

    #[tokio::test]
    async fn test_overwrite_of_unrelated_entry_is_rejected() {
        let app = router();
        let (_, body) = send(
            &app,
            Method::POST,
            "/schedule",
            Some(json!(draft(Weekday::Friday, 3, vec![2], Some(2)))),
        )
        .await;
        let bystander: ScheduleEntry = parse(&body);

        let request = json!({
            "conflicting_entry_id": bystander.id,
            "entry": draft(Weekday::Monday, 1, vec![1], None),
        });
        let (status, _) = send(&app, Method::POST, "/schedule/overwrite", Some(request)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, Method::GET, "/schedule", None).await;
        assert_eq!(parse::<Vec<ScheduleEntry>>(&body), vec![bystander]);
    }

    #[tokio::test]
    async fn test_missing_entry_is_404() {
        let app = router();
        let body = json!(draft(Weekday::Monday, 1, vec![1], None));
        let (status, _) = send(&app, Method::PUT, "/schedule/999", Some(body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, "/schedule/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_second_substitution_returns_existing() {
        let app = router();
        let (_, body) = send(
            &app,
            Method::POST,
            "/schedule",
            Some(json!(draft(Weekday::Monday, 2, vec![1], None))),
        )
        .await;
        let entry: ScheduleEntry = parse(&body);

        let mut sub = SubstitutionDraft {
            date: monday(),
            absent_teacher_id: 1,
            substitute_teacher_id: 2,
            schedule_entry_id: entry.id,
            reason: "Sick".to_string(),
            notes: None,
        };
        let (status, body) = send(
            &app,
            Method::POST,
            "/substitutions",
            Some(json!({ "substitution": sub })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let first: Substitution = parse(&body);

        sub.substitute_teacher_id = 3;
        let (status, body) = send(
            &app,
            Method::POST,
            "/substitutions",
            Some(json!({ "substitution": sub })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(parse::<ApiErrorBody>(&body).existing, Some(first.clone()));

        let (status, _) = send(
            &app,
            Method::POST,
            "/substitutions",
            Some(json!({ "substitution": sub, "replace_id": first.id })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, body) = send(&app, Method::GET, "/substitutions?date=2024-09-02", None).await;
        let stored: Vec<Substitution> = parse(&body);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].substitute_teacher_id, 3);
    }

    #[tokio::test]
    async fn test_free_teachers_over_http() {
        let app = router();
        send(
            &app,
            Method::POST,
            "/schedule",
            Some(json!(draft(Weekday::Monday, 1, vec![2], None))),
        )
        .await;

        let (status, body) = send(&app, Method::GET, "/substitutions/free_teachers?date=2024-09-02", None).await;
        assert_eq!(status, StatusCode::OK);
        let rows: Vec<Value> = parse(&body);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r["free_teachers"].as_array().unwrap().is_empty()));

        let (_, body) = send(
            &app,
            Method::GET,
            "/substitutions/free_teachers?date=2024-09-02&candidates=2,3",
            None,
        )
        .await;
        let rows: Vec<Value> = parse(&body);
        let names = |row: &Value| -> Vec<String> {
            row["free_teachers"]
                .as_array()
                .unwrap()
                .iter()
                .map(|t| t["name"].as_str().unwrap().to_string())
                .collect()
        };
        assert_eq!(names(&rows[0]), vec!["Chai"]);
        assert_eq!(names(&rows[1]), vec!["Boonmee", "Chai"]);

        let (status, _) = send(
            &app,
            Method::GET,
            "/substitutions/free_teachers?date=2024-09-02&candidates=two",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_export_is_csv_download() {
        let app = router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/substitutions/export?date=2024-09-02")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("substitutions_2024-09-02.csv"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("\u{feff}\"Period\""));
    }
}
