use claimgate_core::{
    ClaimSet, Constraint, Expression, GeometryFilter, NoRestriction, Operator, Permission,
    PolicyConfig, PolicyError, RoleVerification, RuleFunction,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;

fn claims_from_token(claims: serde_json::Value) -> ClaimSet {
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"test_secret_for_unit_testing_only"),
    )
    .unwrap();
    ClaimSet::from_token(&token).unwrap()
}

fn any_permission() -> Permission {
    Permission::new("use", Vec::new())
}

const SQUARE: &str = "POLYGON((0 0,2 0,2 2,0 2,0 0))";

#[test]
fn test_role_verification_properties() {
    let rule = RoleVerification::default();
    let researcher = claims_from_token(json!({ "role": "Researcher" }));
    let steward = claims_from_token(json!({ "role": "foreststewards" }));

    assert!(rule
        .evaluate(Operator::Eq, &"researcher".into(), &any_permission(), &researcher)
        .unwrap());
    assert!(rule
        .evaluate(
            Operator::In,
            &"Researcher, ForestStewards".into(),
            &any_permission(),
            &steward
        )
        .unwrap());
}

#[test]
fn test_role_verification_without_claim_never_errors() {
    let rule = RoleVerification::default();
    let anonymous = claims_from_token(json!({ "participant_id": "did:web:anon" }));
    for op in Operator::ALL {
        let result = rule.evaluate(op, &"Researcher".into(), &any_permission(), &anonymous);
        assert!(matches!(result, Ok(false)), "{} should deny", op);
    }
}

#[test]
fn test_geometry_filter_properties() {
    let rule = GeometryFilter::default();
    let located = claims_from_token(json!({ "geometry": "POINT(1 1)" }));
    let square = Expression::literal(SQUARE);

    assert!(rule
        .evaluate(Operator::In, &square, &any_permission(), &located)
        .unwrap());
    assert!(!rule
        .evaluate(Operator::Eq, &square, &any_permission(), &located)
        .unwrap());
}

#[test]
fn test_geometry_filter_malformed_claim_is_loud() {
    let rule = GeometryFilter::default();
    let broken = claims_from_token(json!({ "geometry": "not-a-wkt-string" }));
    let result = rule.evaluate(
        Operator::In,
        &Expression::literal(SQUARE),
        &any_permission(),
        &broken,
    );
    match result {
        Err(err @ PolicyError::GeometryParse { .. }) => {
            assert!(!err.is_access_denied());
            assert_eq!(err.http_status(), 500);
        }
        other => panic!("expected GeometryParse, got {:?}", other),
    }
}

#[test]
fn test_no_restriction_ignores_claims() {
    assert!(NoRestriction
        .evaluate(
            Operator::IsPartOf,
            &Expression::literal(json!({ "anything": true })),
            &any_permission(),
            &ClaimSet::default()
        )
        .unwrap());
}

#[test]
fn test_configured_registry_enforces_rewritten_constraints() {
    let config = PolicyConfig::from_yaml_str(
        r#"
client_id: org123
role_claim: wetransform_role
bindings:
  "https://w3id.org/edc/v0.0.1/ns/Researcher": role_verification
  "https://w3id.org/edc/v0.0.1/ns/area": geometry_filter
"#,
    )
    .unwrap();
    let registry = config.build_registry();

    let permission = Permission::new(
        "use",
        vec![
            Constraint::atomic(
                "https://w3id.org/edc/v0.0.1/ns/Researcher",
                Operator::In,
                "researcher, admin",
            ),
            Constraint::atomic("https://w3id.org/edc/v0.0.1/ns/area", Operator::In, SQUARE),
        ],
    );

    let allowed = claims_from_token(json!({
        "wetransform_role": "Researcher",
        "geometry": "POINT(1.5 0.5)"
    }));
    let wrong_place = claims_from_token(json!({
        "wetransform_role": "Researcher",
        "geometry": "POINT(9 9)"
    }));

    assert!(registry
        .evaluate_permission(&permission, &allowed)
        .unwrap()
        .is_allowed());
    assert!(!registry
        .evaluate_permission(&permission, &wrong_place)
        .unwrap()
        .is_allowed());
}
