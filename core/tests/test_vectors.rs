//! Verify build/parse methods against JSON test vectors stored in `test-vectors/`.
//!
//! Each vector file describes inputs, expected requests, simulated responses,
//! and expected parse results or error kinds. Comparing parsed JSON (not raw
//! strings) avoids false negatives from field-ordering differences.

use account_core::{AccountClient, AccountError, AppEui, Application, HttpMethod, HttpResponse};

const BASE_URL: &str = "http://localhost:3000";

fn client() -> AccountClient {
    AccountClient::new(BASE_URL, "token")
}

/// Parse the method string from test vectors into `HttpMethod`.
fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn simulated(case: &serde_json::Value) -> HttpResponse {
    let sim = &case["simulated_response"];
    HttpResponse {
        status: sim["status"].as_u64().unwrap() as u16,
        headers: Vec::new(),
        body: sim["body"].as_str().unwrap().to_string(),
    }
}

fn expected_headers(expected_req: &serde_json::Value) -> Vec<(String, String)> {
    expected_req["headers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| {
            let arr = h.as_array().unwrap();
            (arr[0].as_str().unwrap().to_string(), arr[1].as_str().unwrap().to_string())
        })
        .collect()
}

fn error_kind(err: &AccountError) -> &'static str {
    match err {
        AccountError::Transport(_) => "Transport",
        AccountError::Decode { .. } => "Decode",
        AccountError::NotFound(_) => "NotFound",
        AccountError::Conflict(_) => "Conflict",
        AccountError::Validation(_) => "Validation",
        AccountError::Unauthorized { .. } => "Unauthorized",
        AccountError::Creation { .. } => "Creation",
        AccountError::Deletion { .. } => "Deletion",
        AccountError::Update { .. } => "Update",
        AccountError::Encode(_) => "Encode",
        AccountError::Config(_) => "Config",
    }
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[test]
fn create_test_vectors() {
    let raw = include_str!("../../test-vectors/create.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    let c = client();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let input = &case["input"];
        let app_id = input["id"].as_str().unwrap();
        let app_name = input["name"].as_str().unwrap();
        let euis: Vec<AppEui> = serde_json::from_value(input["euis"].clone()).unwrap();
        let expected_req = &case["expected_request"];

        // Verify build
        let req = c.build_create_application(app_id, app_name, &euis).unwrap();
        assert_eq!(req.method, parse_method(expected_req["method"].as_str().unwrap()), "{name}: method");
        assert_eq!(req.path, format!("{BASE_URL}{}", expected_req["path"].as_str().unwrap()), "{name}: path");

        assert_eq!(req.headers, expected_headers(expected_req), "{name}: headers");

        let req_body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(req_body, expected_req["body"], "{name}: body");

        // Verify parse
        let result = c.parse_create_application(app_id, simulated(case));
        match case.get("expected_error") {
            Some(expected_error) => {
                let err = result.unwrap_err();
                assert_eq!(error_kind(&err), expected_error.as_str().unwrap(), "{name}: error kind");
            }
            None => {
                let expected: Application = serde_json::from_value(case["expected_result"].clone()).unwrap();
                assert_eq!(result.unwrap(), expected, "{name}: parsed result");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

#[test]
fn list_test_vectors() {
    let raw = include_str!("../../test-vectors/list.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    let c = client();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let expected_req = &case["expected_request"];

        // Verify build
        let req = c.build_list_applications();
        assert_eq!(req.method, parse_method(expected_req["method"].as_str().unwrap()), "{name}: method");
        assert_eq!(req.path, format!("{BASE_URL}{}", expected_req["path"].as_str().unwrap()), "{name}: path");
        assert_eq!(req.headers, expected_headers(expected_req), "{name}: headers");
        assert!(req.body.is_none(), "{name}: body should be None");

        // Verify parse
        let result = c.parse_list_applications(simulated(case));
        match case.get("expected_error") {
            Some(expected_error) => {
                let err = result.unwrap_err();
                assert_eq!(error_kind(&err), expected_error.as_str().unwrap(), "{name}: error kind");
            }
            None => {
                let expected: Vec<Application> = serde_json::from_value(case["expected_result"].clone()).unwrap();
                assert_eq!(result.unwrap(), expected, "{name}: parsed result");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Find
// ---------------------------------------------------------------------------

#[test]
fn find_test_vectors() {
    let raw = include_str!("../../test-vectors/find.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    let c = client();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let id = case["input_id"].as_str().unwrap();
        let expected_req = &case["expected_request"];

        // Verify build
        let req = c.build_find_application(id).unwrap();
        assert_eq!(req.method, parse_method(expected_req["method"].as_str().unwrap()), "{name}: method");
        assert_eq!(req.path, format!("{BASE_URL}{}", expected_req["path"].as_str().unwrap()), "{name}: path");
        assert!(req.body.is_none(), "{name}: body should be None");

        // Verify parse
        let result = c.parse_find_application(id, simulated(case));
        match case.get("expected_error") {
            Some(expected_error) => {
                let err = result.unwrap_err();
                assert_eq!(error_kind(&err), expected_error.as_str().unwrap(), "{name}: error kind");
            }
            None => {
                let expected: Application = serde_json::from_value(case["expected_result"].clone()).unwrap();
                assert_eq!(result.unwrap(), expected, "{name}: parsed result");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[test]
fn delete_test_vectors() {
    let raw = include_str!("../../test-vectors/delete.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    let c = client();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let id = case["input_id"].as_str().unwrap();
        let expected_req = &case["expected_request"];

        // Verify build
        let req = c.build_delete_application(id).unwrap();
        assert_eq!(req.method, parse_method(expected_req["method"].as_str().unwrap()), "{name}: method");
        assert_eq!(req.path, format!("{BASE_URL}{}", expected_req["path"].as_str().unwrap()), "{name}: path");
        assert!(req.body.is_none(), "{name}: body should be None");

        // Verify parse
        let result = c.parse_delete_application(id, simulated(case));
        match case.get("expected_error") {
            Some(expected_error) => {
                let err = result.unwrap_err();
                assert_eq!(error_kind(&err), expected_error.as_str().unwrap(), "{name}: error kind");
            }
            None => assert!(result.is_ok(), "{name}: expected success"),
        }
    }
}
