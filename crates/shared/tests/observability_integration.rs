//! 可观测性模块集成测试
//!
//! 测试 metrics 记录、middleware 和配置的核心功能。

mod metrics_tests {
    use forms_shared::observability::metrics::{
        record_http_request, record_rule_save, set_rules_loaded,
    };

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/api/rules", 200, 0.005);
        record_http_request("PUT", "/api/rules/{id}", 200, 0.012);
        record_http_request("PUT", "/api/rules/{id}", 422, 0.003);
        record_http_request("DELETE", "/api/rules/{id}", 404, 0.001);
        record_http_request("POST", "/api/rules/evaluate", 200, 0.008);
    }

    #[test]
    fn test_metrics_with_edge_cases() {
        record_http_request("", "", 0, 0.0);
        record_http_request("GET", "/", 200, f64::MAX);
        record_rule_save("rejected", Some(""));
        set_rules_loaded(0);
        set_rules_loaded(usize::MAX);
    }
}

mod middleware_tests {
    use axum::{Router, body::Body, http::Request, middleware, routing::get};
    use forms_shared::observability::middleware::{
        REQUEST_ID_HEADER, RequestId, http_tracing, request_id,
    };

    fn app() -> Router {
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(middleware::from_fn(http_tracing))
            .layer(middleware::from_fn(request_id))
    }

    #[test]
    fn test_request_id_accessors() {
        let id = RequestId("req-001".to_string());
        assert_eq!(id.as_str(), "req-001");
        assert_eq!(id.clone().0, "req-001");
        assert!(format!("{:?}", id).contains("req-001"));
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        use tower::ServiceExt;

        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/ping")
                    .header(REQUEST_ID_HEADER, "upstream-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[REQUEST_ID_HEADER], "upstream-42");
    }

    #[tokio::test]
    async fn test_request_id_is_generated() {
        use tower::ServiceExt;

        let response = app()
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let generated = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
        assert_eq!(generated.len(), 36);
    }
}

mod config_tests {
    use forms_shared::observability::ObservabilityConfig;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert!(config.metrics_enabled);
    }

    #[test]
    fn test_config_from_env() {
        let config = ObservabilityConfig::from_env("form-rules-service");
        assert_eq!(config.service_name, "form-rules-service");
    }
}

mod guard_tests {
    use forms_shared::observability::ObservabilityGuard;

    #[test]
    fn test_empty_guard() {
        let guard = ObservabilityGuard::empty();
        drop(guard);
    }
}
