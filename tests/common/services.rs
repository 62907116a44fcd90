//! Mock transform and export services backed by wiremock

use std::time::Duration;
use offramp_preview::{Config, RetryConfig, VariantId};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Preview payload as the transform service returns it
pub fn payload_json(source: &str, variant: VariantId) -> serde_json::Value {
    let title = format!("{} in {}", source, variant.info().name);
    serde_json::json!({
        "title": title,
        "author": "Integration Author",
        "publishedDate": "2024-06-01",
        "rawContent": format!("<article>{}</article>", source),
        "transformedContent": format!(
            "---\ntitle: \"{}\"\nauthor: Integration Author\nfeaturedImage: https://cdn.example.com/{}.png\n---\n# {}\n",
            title, variant, title
        ),
    })
}

/// Answer every preview request for `variant` with `template`
///
/// Mocks are matched in mount order, so mount more specific ones first.
pub async fn mount_variant(server: &MockServer, variant: VariantId, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/preview"))
        .and(body_partial_json(serde_json::json!({ "variantId": variant })))
        .respond_with(template)
        .mount(server)
        .await;
}

/// Answer the next preview request for `variant` with `template`, then fall through
pub async fn mount_variant_once(server: &MockServer, variant: VariantId, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/preview"))
        .and(body_partial_json(serde_json::json!({ "variantId": variant })))
        .respond_with(template)
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// Answer every variant of `source` successfully
pub async fn mount_all_variants(server: &MockServer, source: &str) {
    for variant in VariantId::ALL {
        mount_variant(
            server,
            variant,
            ResponseTemplate::new(200).set_body_json(payload_json(source, variant)),
        )
        .await;
    }
}

/// Config pointing at the mock services, with retries off and short timeouts
pub fn test_config(transform: &MockServer, packager: &MockServer) -> Config {
    let mut config = Config::default();
    config.transform.base_url = transform.uri();
    config.transform.timeout = Duration::from_secs(5);
    config.transform.retry = RetryConfig::disabled();
    config.packager.base_url = packager.uri();
    config.packager.timeout = Duration::from_secs(5);
    config
}
