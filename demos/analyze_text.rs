//! Example: Analyzing Estonian text with the built-in recognizers
//!
//! This example demonstrates how to:
//! 1. Build a registry from configuration (pattern recognizers only)
//! 2. Add a custom deny-list recognizer
//! 3. Run the analyzer engine with entity priorities
//! 4. Inspect the decision process
//!
//! Run with: cargo run -p estpii-analyzer --example analyze_text --no-default-features

use estpii_analyzer::{
    AnalysisRequest, AnalyzerConfig, AnalyzerEngine, DenyListRecognizer, EntityTypeSettings,
    RecognizerRegistry,
};
use estpii_core::{EntityType, Language};
use std::sync::Arc;

#[tokio::main]
async fn main() -> estpii_core::Result<()> {
    println!("estpii analyzer example\n");

    let mut config = AnalyzerConfig::new(vec![Language::from("et"), Language::generic()]);
    config.default_language = Some(Language::from("et"));
    config
        .entity_types
        .insert(EntityType::EE_PERSONAL_CODE, EntityTypeSettings { priority: 10 });

    let mut registry = RecognizerRegistry::from_config(&config).await?;
    println!("Registered {} built-in recognizers", registry.count());

    let titles = vec!["härra".to_string(), "proua".to_string(), "dr".to_string()];
    let titles = DenyListRecognizer::new("TitleRecognizer", EntityType::new("TITLE"), &titles, 0.8)?
        .with_languages(vec![Language::from("et")]);
    registry.register(Arc::new(titles))?;

    let engine = AnalyzerEngine::from_config(Arc::new(registry), &config);

    let texts = [
        "Proua Mari Kask, isikukood 49403136526, telefon +372 5123 4567.",
        "Auto numbrimärk 123 ABC, konto EE382200221020145685.",
        "Kirjuta aadressil info@example.ee või vaata https://www.example.ee/kontakt",
    ];

    for text in texts {
        println!("─────────────────────────────────────────────────");
        println!("Text: {}", text);

        let outcome = engine
            .analyze(&AnalysisRequest::new(text).with_decision_process(true))
            .await?;

        for span in &outcome.result {
            let covered: String = text.chars().skip(span.start).take(span.len()).collect();
            println!(
                "  {:<18} [{:>3}, {:>3}) score={:.2} '{}' ({})",
                span.entity_type, span.start, span.end, span.score, covered, span.recognizer_name
            );
            if let Some(explanation) = &span.explanation {
                if let Some(word) = &explanation.supportive_context_word {
                    println!("      context word: {}", word);
                }
            }
        }

        println!("  latency: {}us", outcome.latency_us);
    }

    Ok(())
}
