//! The `learnpath init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("learnpath.toml").exists() {
        println!("learnpath.toml already exists, skipping.");
    } else {
        std::fs::write("learnpath.toml", SAMPLE_CONFIG)?;
        println!("Created learnpath.toml");
    }

    println!("\nNext steps:");
    println!("  1. Export GOOGLE_API_KEY and TAVILY_API_KEY (or edit learnpath.toml)");
    println!("  2. Run: learnpath check-config");
    println!("  3. Run: learnpath start");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# learnpath configuration

default_provider = "gemini"
default_model = "gemini-1.5-flash"
temperature = 0.7
max_tokens = 2048
search_provider = "tavily"
max_search_results = 3

[providers.gemini]
type = "gemini"
api_key = "${GOOGLE_API_KEY}"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

[search.tavily]
type = "tavily"
api_key = "${TAVILY_API_KEY}"

[session]
diagnostic_items = 5
module_quiz_items = 3
plan_modules = 3
max_retries = 2

[session.level_policy]
mode = "thresholds"
intermediate_at = 0.4
advanced_at = 0.8
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_parses_and_validates() {
        let config = learnpath_providers::config::parse_config(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert!(config.search.contains_key("tavily"));
        assert!(config.validate().is_ok());
    }
}
