use std::collections::HashMap;

use feature_rules::{
    AttributeValue, Configuration, EvaluatorConfig, ExposureEvent, FeatureValue,
};

pub fn main() -> feature_rules::Result<()> {
    // Configure env_logger to see engine logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("feature_rules=debug"))
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tests/data/features.json".to_owned());
    let configuration = Configuration::from_json(std::fs::read(path)?)?;

    let evaluator = EvaluatorConfig::new("production")
        .exposure_logger(|event: ExposureEvent| {
            println!("Logging exposure event: {:?}", event);
        })
        .to_evaluator();
    evaluator.set_configuration(configuration);

    let attributes: HashMap<String, AttributeValue> = [
        ("id".to_owned(), "frank".into()),
        ("country".to_owned(), "US".into()),
    ]
    .into();

    let checkout = evaluator.evaluate_feature("checkout-button", &attributes);
    println!("checkout-button: {:?} ({:?})", checkout.value, checkout.source);

    let pricing = evaluator
        .evaluate_feature("pricing", &attributes)
        .value
        .as_str()
        .map(str::to_owned)
        // default value
        .unwrap_or_else(|| "standard".to_owned());
    println!("pricing: {}", pricing);

    let (result, details) = evaluator.evaluate_feature_details("onboarding-flow", &attributes);
    if result.value != FeatureValue::Null {
        println!(
            "onboarding-flow details: {}",
            serde_json::to_string_pretty(&details).unwrap_or_default()
        );
    }

    Ok(())
}
