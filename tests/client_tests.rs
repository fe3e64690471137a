//! # External Client Tests
//!
//! The detector and recommender clients against mocked HTTP services.

use cookit::catalog::IngredientCatalog;
use cookit::config::{BreakerConfig, DetectorConfig, RecommenderConfig};
use cookit::detector::{detect_ingredients, DetectError, HttpDetector, ImageUpload, IngredientDetector};
use cookit::recipe::UserIngredients;
use cookit::recommender::{
    Candidate, OpenAiRecommender, RecommendRequest, Recommender, RecommenderError,
    SELECTION_CRITERIA,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG_HEADER: [u8; 16] = [
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
];

fn detector_config(base_url: &str) -> DetectorConfig {
    DetectorConfig {
        base_url: base_url.to_string(),
        timeout_secs: 5,
        breaker: BreakerConfig {
            failure_threshold: 2,
            reset_secs: 60,
        },
        ..Default::default()
    }
}

fn upload(config: &DetectorConfig) -> ImageUpload {
    ImageUpload::validate(PNG_HEADER.to_vec(), "fridge.png", config).unwrap()
}

fn recommender_config(base_url: &str) -> RecommenderConfig {
    RecommenderConfig {
        api_key: "test-key".to_string(),
        base_url: base_url.to_string(),
        timeout_secs: 5,
        ..Default::default()
    }
}

fn recommend_request() -> RecommendRequest {
    RecommendRequest {
        candidates: vec![Candidate {
            id: "r1".to_string(),
            name: "Egg Fried Rice".to_string(),
            match_score: 0.92,
            matched_ingredients: vec!["egg".to_string(), "rice".to_string()],
            contains_disliked: false,
            contains_allergic: false,
            is_previously_recommended: false,
            category: "main".to_string(),
        }],
        taste_profile: None,
        user: UserIngredients::new(&["egg", "rice"], &[], &[]),
        criteria: SELECTION_CRITERIA.iter().map(|c| c.to_string()).collect(),
        picks: 3,
    }
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    })
}

#[tokio::test]
async fn test_detector_maps_known_classes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/detect/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "detections": [
                { "class_name": "egg", "confidence": 0.97 },
                { "class_name": "spoon", "confidence": 0.51 },
                { "class_name": "egg", "confidence": 0.88 },
                { "class_name": "green_onion" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = detector_config(&server.uri());
    let detector = HttpDetector::new(config.clone()).unwrap();
    let catalog = IngredientCatalog::from_pairs([("egg", "계란"), ("green_onion", "대파")]);

    let names = detect_ingredients(&detector, &catalog, &upload(&config), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(names, vec!["계란".to_string(), "대파".to_string()]);
}

#[tokio::test]
async fn test_detector_without_known_ingredients() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/detect/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "detections": [{ "class_name": "spoon" }]
        })))
        .mount(&server)
        .await;

    let config = detector_config(&server.uri());
    let detector = HttpDetector::new(config.clone()).unwrap();
    let catalog = IngredientCatalog::from_pairs([("egg", "계란")]);

    let err = detect_ingredients(&detector, &catalog, &upload(&config), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, DetectError::NoIngredients));
}

#[tokio::test]
async fn test_detector_reported_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/detect/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false })))
        .mount(&server)
        .await;

    let config = detector_config(&server.uri());
    let detector = HttpDetector::new(config.clone()).unwrap();

    let err = detector.detect(&upload(&config)).await.unwrap_err();
    assert!(matches!(err, DetectError::Service(_)));
}

#[tokio::test]
async fn test_detector_circuit_opens_after_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/detect/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let config = detector_config(&server.uri());
    let detector = HttpDetector::new(config.clone()).unwrap();
    let image = upload(&config);

    for _ in 0..2 {
        let err = detector.detect(&image).await.unwrap_err();
        assert!(matches!(err, DetectError::Service(_)));
    }

    // Third call is rejected without reaching the service
    let err = detector.detect(&image).await.unwrap_err();
    assert!(matches!(err, DetectError::CircuitOpen));
}

#[tokio::test]
async fn test_detector_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/detect/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "detections": [] }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let config = detector_config(&server.uri());
    let detector = HttpDetector::new(config.clone()).unwrap();
    let catalog = IngredientCatalog::from_pairs([("egg", "계란")]);

    let err = detect_ingredients(&detector, &catalog, &upload(&config), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, DetectError::Timeout(_)));
}

#[tokio::test]
async fn test_recommender_parses_fenced_reply() {
    let server = MockServer::start().await;
    let reply = "Here you go:\n```json\n{\"recommendedRecipes\": [{\"id\": \"r1\", \"reason\": \"Uses your eggs\"}]}\n```";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(reply)))
        .expect(1)
        .mount(&server)
        .await;

    let recommender = OpenAiRecommender::new(recommender_config(&server.uri())).unwrap();
    let response = recommender.recommend(&recommend_request()).await.unwrap();

    assert_eq!(response.selections.len(), 1);
    assert_eq!(response.selections[0].id, "r1");
    assert_eq!(response.selections[0].rationale, "Uses your eggs");
}

#[tokio::test]
async fn test_recommender_rate_limit_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "Too many requests" }
        })))
        .mount(&server)
        .await;

    let recommender = OpenAiRecommender::new(recommender_config(&server.uri())).unwrap();
    let err = recommender.recommend(&recommend_request()).await.unwrap_err();
    assert_eq!(err, RecommenderError::RateLimited("Too many requests".to_string()));
}

#[tokio::test]
async fn test_recommender_rate_limit_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "quota", "code": "rate_limit_exceeded" }
        })))
        .mount(&server)
        .await;

    let recommender = OpenAiRecommender::new(recommender_config(&server.uri())).unwrap();
    let err = recommender.recommend(&recommend_request()).await.unwrap_err();
    assert!(matches!(err, RecommenderError::RateLimited(_)));
}

#[tokio::test]
async fn test_recommender_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let recommender = OpenAiRecommender::new(recommender_config(&server.uri())).unwrap();
    let err = recommender.recommend(&recommend_request()).await.unwrap_err();
    assert_eq!(
        err,
        RecommenderError::Api {
            status: 500,
            message: "boom".to_string()
        }
    );
}

#[tokio::test]
async fn test_recommender_prose_reply_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Sorry, I can't decide.")))
        .mount(&server)
        .await;

    let recommender = OpenAiRecommender::new(recommender_config(&server.uri())).unwrap();
    let err = recommender.recommend(&recommend_request()).await.unwrap_err();
    assert!(matches!(err, RecommenderError::Malformed(_)));
}

#[tokio::test]
async fn test_recommender_empty_choices_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let recommender = OpenAiRecommender::new(recommender_config(&server.uri())).unwrap();
    let err = recommender.recommend(&recommend_request()).await.unwrap_err();
    assert!(matches!(err, RecommenderError::Malformed(_)));
}
