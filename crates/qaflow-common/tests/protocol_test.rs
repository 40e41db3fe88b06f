use qaflow_common::protocol::{ActRequest, StepDescriptor, StepValidationError, TestCase};

#[test]
fn test_parse_login_case() {
    let json = r#"[
        { "action": "open", "targetUrl": "https://test-admin.cfbaopay.com" },
        { "action": "act", "request": { "kind": "wait", "selector": "//input[@placeholder='登录账户']", "timeMs": 5000 } },
        { "action": "act", "request": { "kind": "type", "selector": "//input[@placeholder='登录账户']", "text": "admin" } },
        { "action": "act", "request": { "kind": "click", "selector": "//button[contains(text(),'登录')]" } },
        { "action": "screenshot", "path": "./reports/login_success.png" }
    ]"#;

    let steps: Vec<StepDescriptor> = serde_json::from_str(json).unwrap();
    assert_eq!(steps.len(), 5);
    assert_eq!(
        steps[0],
        StepDescriptor::open("https://test-admin.cfbaopay.com")
    );
    assert_eq!(
        steps[1],
        StepDescriptor::wait("//input[@placeholder='登录账户']", Some(5000))
    );
    assert_eq!(
        steps[2],
        StepDescriptor::type_text("//input[@placeholder='登录账户']", "admin")
    );
    assert_eq!(
        steps[4],
        StepDescriptor::screenshot("./reports/login_success.png")
    );
    assert_eq!(steps[3].label(), "act:click");
}

#[test]
fn test_wait_without_time_uses_default() {
    let step: StepDescriptor = serde_json::from_str(
        r#"{ "action": "act", "request": { "kind": "wait", "selector": "//table" } }"#,
    )
    .unwrap();
    match step {
        StepDescriptor::Act {
            request: ActRequest::Wait { time_ms, .. },
        } => assert_eq!(time_ms, None),
        other => panic!("unexpected step {:?}", other),
    }
}

#[test]
fn test_rejects_unknown_action_and_kind() {
    assert!(serde_json::from_str::<StepDescriptor>(r#"{ "action": "snapshot" }"#).is_err());
    assert!(
        serde_json::from_str::<StepDescriptor>(
            r##"{ "action": "act", "request": { "kind": "hover", "selector": "#x" } }"##
        )
        .is_err()
    );
    assert!(
        serde_json::from_str::<StepDescriptor>(
            r##"{ "action": "act", "request": { "kind": "wait", "selector": "#x", "timeMs": -1 } }"##
        )
        .is_err()
    );
}

#[test]
fn test_serialize_uses_wire_names() {
    let value = serde_json::to_value(StepDescriptor::wait("#user", Some(250))).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "action": "act",
            "request": { "kind": "wait", "selector": "#user", "timeMs": 250 }
        })
    );
    let value = serde_json::to_value(StepDescriptor::open("https://x/login")).unwrap();
    assert_eq!(value["targetUrl"], "https://x/login");
}

#[test]
fn test_validate_reports_offending_index() {
    let case = TestCase::new(
        "broken",
        vec![
            StepDescriptor::open("https://x/login"),
            StepDescriptor::click("#ok"),
            StepDescriptor::type_text("  ", "admin"),
        ],
    );
    assert_eq!(
        case.validate(),
        Err((2, StepValidationError::EmptySelector { kind: "type" }))
    );

    let case = TestCase::new("blank", vec![StepDescriptor::screenshot("")]);
    assert_eq!(case.validate(), Err((0, StepValidationError::EmptyPath)));
}
