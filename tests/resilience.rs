//! Failure handling on the forwarding path and dependency health tracking.

use std::time::Duration;

use reqwest::StatusCode;

mod common;

use common::{
    client, config, department_peer, employee_peer, json_body, stalling_peer, start_gateway,
    token, unreachable_addr, LogCapture,
};

#[tokio::test]
async fn test_unreachable_peer_is_unavailable() {
    let departments = department_peer().await;
    let dead = unreachable_addr().await;
    let gateway = start_gateway(&config(&format!("http://{dead}"), &departments.url())).await;

    let res = client()
        .get(gateway.url("/employee-service/echo"))
        .bearer_auth(token(&["USER"]))
        .header("x-correlation-id", "corr-down")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(res).await;
    assert_eq!(body["error"], "DEPENDENCY_UNAVAILABLE");
    assert_eq!(body["correlation_id"], "corr-down");
    assert_eq!(
        gateway.health.is_dependency_healthy("employee-service"),
        Some(false)
    );

    let health = client().get(gateway.url("/actuator/health")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_peer_server_error_is_unavailable() {
    let employees = employee_peer().await;
    let departments = department_peer().await;
    employees.set_failing(true);
    let gateway = start_gateway(&config(&employees.url(), &departments.url())).await;

    let res = client()
        .get(gateway.url("/employee-service/echo"))
        .bearer_auth(token(&["USER"]))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(employees.request_count(), 1);
}

#[tokio::test]
async fn test_peer_not_found_passes_through() {
    let employees = employee_peer().await;
    let departments = department_peer().await;
    let gateway = start_gateway(&config(&employees.url(), &departments.url())).await;

    let res = client()
        .get(gateway.url("/employee-service/employees/404"))
        .bearer_auth(token(&["USER"]))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        gateway.health.is_dependency_healthy("employee-service"),
        Some(true)
    );
}

#[tokio::test]
async fn test_stalled_response_body_is_cut_off() {
    let departments = department_peer().await;
    let stalled = stalling_peer(
        b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 100\r\n\r\npartial",
    )
    .await;
    let mut config = config(&format!("http://{stalled}"), &departments.url());
    config.downstream.timeout_ms = 300;
    let gateway = start_gateway(&config).await;

    let res = client()
        .get(gateway.url("/employee-service/report"))
        .bearer_auth(token(&["USER"]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = tokio::time::timeout(Duration::from_secs(5), res.bytes())
        .await
        .expect("response body should be cut off, not left hanging");
    assert!(body.is_err());
    assert_eq!(
        gateway.health.is_dependency_healthy("employee-service"),
        Some(false)
    );
}

#[tokio::test]
async fn test_peer_refusal_on_composite_read_keeps_peer_healthy() {
    let departments = department_peer().await;
    let refused = stalling_peer(b"HTTP/1.1 403 Forbidden\r\ncontent-length: 0\r\n\r\n").await;
    let gateway = start_gateway(&config(&format!("http://{refused}"), &departments.url())).await;

    let res = client()
        .get(gateway.url("/api/employees/1"))
        .bearer_auth(token(&["USER"]))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(res).await["error"], "AUTHORIZATION_DENIED");
    assert_eq!(
        gateway.health.is_dependency_healthy("employee-service"),
        Some(true)
    );
    assert_eq!(departments.request_count(), 0);
}

#[tokio::test]
async fn test_down_and_recovery_are_logged_once() {
    let logs = LogCapture::default();
    let _guard = logs.install();

    let employees = employee_peer().await;
    let departments = department_peer().await;
    employees.set_failing(true);
    let gateway = start_gateway(&config(&employees.url(), &departments.url())).await;
    let bearer = token(&["USER"]);

    for _ in 0..2 {
        let res = client()
            .get(gateway.url("/employee-service/echo"))
            .bearer_auth(&bearer)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    let down = logs.events("health", "dependency DOWN");
    assert_eq!(down.len(), 1);
    assert_eq!(down[0]["level"], "ERROR");
    assert_eq!(down[0]["fields"]["dependency"], "employee-service");

    employees.set_failing(false);
    for _ in 0..2 {
        let res = client()
            .get(gateway.url("/employee-service/echo"))
            .bearer_auth(&bearer)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    assert_eq!(logs.events("health", "dependency recovered").len(), 1);
    assert_eq!(logs.events("health", "dependency DOWN").len(), 1);
}

#[tokio::test]
async fn test_active_probe_marks_peer_down() {
    use std::sync::Arc;
    use ems_gateway::health::active::PeerProber;
    use ems_gateway::health::HealthAggregator;
    use ems_gateway::resilience::PeerRegistry;

    let employees = employee_peer().await;
    let dead = unreachable_addr().await;
    let mut config = config(&employees.url(), &format!("http://{dead}"));
    config.health.probe_enabled = true;
    config.health.probe_timeout_secs = 1;

    let health = Arc::new(HealthAggregator::new());
    let peers = Arc::new(PeerRegistry::from_config(&config, health.clone()).unwrap());
    let prober = PeerProber::new(peers, health.clone(), config.health.clone());

    prober.check_all().await;

    assert_eq!(health.is_dependency_healthy("employee-service"), Some(true));
    assert_eq!(health.is_dependency_healthy("department-service"), Some(false));
    assert!(!health.is_healthy());
}
