//! HTTP backend client against a wiremock server

mod fixtures;

use fixtures::{ok, ok_with_message, rejected, EtcApiMock};
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use etc_apply::backend::errors::NETWORK_UNREACHABLE;
use etc_apply::backend::{BackendError, ConfirmRequest, EtcBackend, TaskId};
use etc_apply::forms::{FormPayload, VehicleClass};

#[tokio::test]
async fn test_provinces_are_decoded_and_cached() {
    let mock = EtcApiMock::new().await;
    Mock::given(method("GET"))
        .and(path("/api/common/provinces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "all_provinces": ["京", "津", "沪"],
            "hot_provinces": ["京"]
        }))))
        .expect(1)
        .mount(&mock.server)
        .await;
    let client = mock.client();

    let first = client.provinces().await.unwrap();
    let second = client.provinces().await.unwrap();

    assert_eq!(first, second);
    let list = first.data.unwrap();
    assert_eq!(list.all_provinces.unwrap(), vec!["京", "津", "沪"]);
    assert_eq!(list.hot_provinces.unwrap(), vec!["京"]);
}

#[tokio::test]
async fn test_failed_lookups_are_not_cached() {
    let mock = EtcApiMock::new().await;
    Mock::given(method("GET"))
        .and(path("/api/etc/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rejected("维护中")))
        .expect(2)
        .mount(&mock.server)
        .await;
    let client = mock.client();

    assert!(!client.service_status(VehicleClass::Passenger).await.unwrap().success);
    assert!(!client.service_status(VehicleClass::Passenger).await.unwrap().success);
}

#[tokio::test]
async fn test_passenger_apply_posts_flat_form() {
    let mock = EtcApiMock::new().await;
    Mock::given(method("POST"))
        .and(path("/api/etc/apply"))
        .and(body_partial_json(json!({ "name": "张三", "plateProvince": "京" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_with_message(
            json!({
                "apply_id": "T1",
                "progress": 10,
                "order_id": 8812,
                "verify_code_no": "V-77",
                "status": "processing"
            }),
            "申办已受理",
        )))
        .mount(&mock.server)
        .await;
    let client = mock.client();

    let mut form = FormPayload::defaults(VehicleClass::Passenger);
    form.merge([("name", "张三"), ("plateProvince", "京")]);
    let envelope = client.apply(VehicleClass::Passenger, &form).await.unwrap();

    assert_eq!(envelope.message(), Some("申办已受理"));
    let receipt = envelope.data.unwrap();
    assert_eq!(receipt.apply_id.as_deref(), Some("T1"));
    assert_eq!(receipt.order_id.as_deref(), Some("8812"));
    assert_eq!(receipt.verify_code_no.as_deref(), Some("V-77"));
    assert_eq!(receipt.progress, Some(10));
}

#[tokio::test]
async fn test_truck_endpoints_are_separate() {
    let mock = EtcApiMock::new().await;
    mock.respond("POST", "/truck/apply", ok(json!({ "task_id": "TR-1" })))
        .await;
    mock.respond("POST", "/truck/save_data", ok(json!({ "saved": true })))
        .await;
    let client = mock.client();
    let form = FormPayload::defaults(VehicleClass::Truck);

    let receipt = client.apply(VehicleClass::Truck, &form).await.unwrap();
    assert_eq!(receipt.data.unwrap().task_id.as_deref(), Some("TR-1"));
    let saved = client.save_data(VehicleClass::Truck, &form).await.unwrap();
    assert_eq!(saved.data.unwrap()["saved"], true);
}

#[tokio::test]
async fn test_progress_path_uses_task_id() {
    let mock = EtcApiMock::new().await;
    mock.respond(
        "GET",
        "/etc/progress/T-42",
        ok(json!({ "progress": 55, "message": "签约中", "status": "in-progress" })),
    )
    .await;
    let client = mock.client();

    let report = client
        .progress(&TaskId::from("T-42"))
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(report.progress, Some(55));
    assert_eq!(report.status.as_deref(), Some("in-progress"));
}

#[tokio::test]
async fn test_task_id_is_a_single_path_segment() {
    let mock = EtcApiMock::new().await;
    Mock::given(method("GET"))
        .and(path("/api/etc/progress/A%2FB%3Fx%23y"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({ "progress": 30 }))))
        .expect(1)
        .mount(&mock.server)
        .await;
    let client = mock.client();

    let report = client
        .progress(&TaskId::from("A/B?x#y"))
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(report.progress, Some(30));
}

#[tokio::test]
async fn test_confirm_sends_nulls_for_missing_ids() {
    let mock = EtcApiMock::new().await;
    Mock::given(method("POST"))
        .and(path("/api/etc/confirm_verify_code"))
        .and(body_json(json!({
            "verifyCode": "0000",
            "orderId": null,
            "signOrderId": null,
            "verifyCodeNo": null
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(rejected("验证码错误")))
        .expect(1)
        .mount(&mock.server)
        .await;
    let client = mock.client();

    let request = ConfirmRequest {
        verify_code: "0000".to_string(),
        order_id: None,
        sign_order_id: None,
        verify_code_no: None,
    };
    let envelope = client.confirm_verify_code(&request).await.unwrap();
    assert!(!envelope.success);
    assert_eq!(envelope.message(), Some("验证码错误"));
}

#[tokio::test]
async fn test_reference_queries() {
    let mock = EtcApiMock::new().await;
    Mock::given(method("GET"))
        .and(path("/api/etc/products"))
        .and(query_param("operator_code", "OP01"))
        .and(query_param("vehicle_type", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!([{ "code": "P1" }]))))
        .mount(&mock.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/etc/operators"))
        .and(query_param("vehicle_type", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!([{ "code": "OP01" }]))))
        .mount(&mock.server)
        .await;
    // 京
    mock.respond("GET", "/common/plate_letters/%E4%BA%AC", ok(json!(["A", "B", "C"])))
        .await;
    let client = mock.client();

    let products = client.products(VehicleClass::Passenger, "OP01").await.unwrap();
    assert_eq!(products.data.unwrap()[0]["code"], "P1");
    let operators = client.operators(VehicleClass::Passenger).await.unwrap();
    assert_eq!(operators.data.unwrap()[0]["code"], "OP01");
    let letters = client.plate_letters("京").await.unwrap();
    assert_eq!(letters.data.unwrap(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_send_verify_code_body() {
    let mock = EtcApiMock::new().await;
    Mock::given(method("POST"))
        .and(path("/api/etc/verify_code"))
        .and(body_json(json!({ "phone": "13800138000" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(ok_with_message(json!(null), "验证码已发送")),
        )
        .expect(1)
        .mount(&mock.server)
        .await;
    let client = mock.client();

    let envelope = client.send_verify_code("13800138000").await.unwrap();
    assert!(envelope.success);
    assert!(envelope.data.is_none());
}

#[tokio::test]
async fn test_non_2xx_carries_server_message() {
    let mock = EtcApiMock::new().await;
    mock.respond_status("POST", "/etc/apply", 400, rejected("缺少必填字段: vin"))
        .await;
    let client = mock.client();

    let err = client
        .apply(VehicleClass::Passenger, &FormPayload::defaults(VehicleClass::Passenger))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BackendError::Http {
            status: 400,
            message: Some("缺少必填字段: vin".to_string())
        }
    );
    assert_eq!(err.user_message(), "缺少必填字段: vin");
}

#[tokio::test]
async fn test_non_json_error_body() {
    let mock = EtcApiMock::new().await;
    Mock::given(method("GET"))
        .and(path("/api/truck/status"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&mock.server)
        .await;
    let client = mock.client();

    let err = client.service_status(VehicleClass::Truck).await.unwrap_err();
    assert_eq!(err.user_message(), "请求失败 (502)");
}

#[tokio::test]
async fn test_malformed_success_data_is_protocol_error() {
    let mock = EtcApiMock::new().await;
    mock.respond("GET", "/etc/progress/T1", ok(json!({ "progress": "lots" })))
        .await;
    mock.respond("GET", "/etc/progress/T2", json!({ "ok": true })).await;
    let client = mock.client();

    let err = client.progress(&TaskId::from("T1")).await.unwrap_err();
    assert!(err.is_protocol());
    let err = client.progress(&TaskId::from("T2")).await.unwrap_err();
    assert!(err.is_protocol());
}

#[tokio::test]
async fn test_unreachable_backend() {
    let mock = EtcApiMock::new().await;
    let mut config = mock.backend_config();
    drop(mock);
    config.base_url = "http://127.0.0.1:9/api".to_string();
    let client = etc_apply::http::HttpBackendClient::new(&config)
        .unwrap()
        .with_metrics(false);

    let err = client.provinces().await.unwrap_err();
    assert!(matches!(
        err,
        BackendError::Network(_) | BackendError::Timeout { .. }
    ));
    assert_eq!(err.user_message(), NETWORK_UNREACHABLE);
}
