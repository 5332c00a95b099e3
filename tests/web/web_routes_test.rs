#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use axum::Router;
    use tower::ServiceExt;

    use reportkit::filter::{FieldKind, FilterField};
    use reportkit::record::Record;
    use reportkit::site::{ReportSite, SiteRegistry};
    use reportkit::store::{Store, WizardState};
    use reportkit::web::{router, AppState, USER_HEADER};

    fn app() -> (Router, Arc<AppState>) {
        let records = vec![
            Record::new().with("id", 1).with("status", "paid").with("total", 60),
            Record::new().with("id", 2).with("status", "open").with("total", 20),
            Record::new().with("id", 3).with("status", "paid").with("total", 15),
        ];
        let site = ReportSite::builder("orders")
            .name("Orders")
            .filter(FilterField::new(
                "status",
                FieldKind::Choice(vec!["paid".into(), "open".into()]),
            ))
            .include_columns(vec!["id".into(), "status".into(), "total".into()])
            .records(records)
            .build()
            .unwrap();
        let registry = SiteRegistry::new().with_site(site).unwrap();
        let state = Arc::new(AppState::new(registry, Store::open_in_memory().unwrap()));
        (router(state.clone()), state)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    /// `name=value` of the Set-Cookie header, ready to send back.
    fn session_cookie(response: &Response) -> String {
        let value = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("Set-Cookie header");
        value.split(';').next().unwrap().to_string()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_fields_then_results_share_a_session() {
        let (app, _) = app();

        let response = app
            .clone()
            .oneshot(get("/orders/fields?status=paid"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/orders/results");
        let cookie = session_cookie(&response);
        assert!(cookie.starts_with("reportkit_session="));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/orders/columns?display_fields=total&display_fields=id")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/orders/results?o=-total")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        let body = json(response).await;
        assert_eq!(body["page"], "results");
        assert_eq!(body["pagination"]["total"], 2);
        assert_eq!(body["rows"], serde_json::json!([[60, 1], [15, 3]]));
        assert_eq!(body["ordering"], "-total");
    }

    #[tokio::test]
    async fn test_new_visitor_gets_a_session_cookie() {
        let (app, _) = app();
        let first = app.clone().oneshot(get("/orders/fields")).await.unwrap();
        let second = app.oneshot(get("/orders/fields")).await.unwrap();
        assert_ne!(session_cookie(&first), session_cookie(&second));
    }

    #[tokio::test]
    async fn test_fields_form_is_rendered() {
        let (app, _) = app();
        let response = app.oneshot(get("/orders/fields")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["page"], "fields");
        assert_eq!(body["fields"][0]["name"], "status");
        assert_eq!(body["fieldsets"][0]["fields"][0], "status");
    }

    #[tokio::test]
    async fn test_unknown_site_is_not_found() {
        let (app, _) = app();
        let response = app.oneshot(get("/people/fields")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["error"], "Site 'people' not found");
    }

    #[tokio::test]
    async fn test_save_requires_a_user() {
        let (app, _) = app();
        let response = app.oneshot(post("/orders/save")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_save_then_rename_then_list() {
        let (app, state) = app();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/orders/save")
                    .header(USER_HEADER, "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let details = location(&response).to_string();
        assert!(details.starts_with("/orders/") && details.ends_with("/details"));
        let body = json(response).await;
        assert_eq!(body["notices"][0]["message"], "Your report has been saved");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(&details)
                    .header(USER_HEADER, "alice")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name": "Paid orders", "description": "  "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/orders");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/orders")
                    .header(USER_HEADER, "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body["page"], "index");
        assert_eq!(body["reports"][0]["name"], "Paid orders");
        assert_eq!(body["reports"][0]["description"], serde_json::Value::Null);

        let store = state.store.lock().await;
        assert_eq!(store.list_reports("orders", "alice").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_another_user_is_refused() {
        let (app, state) = app();
        let report = state
            .store
            .lock()
            .await
            .save_report(None, false, "orders", &WizardState::default(), "alice")
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/orders/{}/delete", report.id))
                    .header(USER_HEADER, "bob")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/orders");
        let body = json(response).await;
        assert_eq!(body["notices"][0]["level"], "error");

        assert!(state
            .store
            .lock()
            .await
            .get_report(&report.id, "orders")
            .is_ok());
    }

    #[tokio::test]
    async fn test_anonymous_delete_redirects_with_denial() {
        let (app, state) = app();
        let report = state
            .store
            .lock()
            .await
            .save_report(None, false, "orders", &WizardState::default(), "alice")
            .unwrap();

        let response = app
            .oneshot(post(&format!("/orders/{}/delete", report.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/orders");
        let body = json(response).await;
        assert_eq!(body["notices"][0]["level"], "error");
    }

    #[tokio::test]
    async fn test_recall_unknown_report_is_not_found() {
        let (app, _) = app();
        let response = app.oneshot(get("/orders/missing/recall")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_remove_unregistered_column_is_not_found() {
        let (app, _) = app();
        let response = app
            .oneshot(post("/orders/column/remove/customer.city"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
