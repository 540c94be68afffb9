//! The `learnpath check-config` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use learnpath_core::config::LevelPolicy;
use learnpath_providers::config::{load_config_from, LearnpathConfig, ProviderConfig, SearchConfig};

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    config.validate()?;

    println!("{}", settings_table(&config));
    println!("{}", backends_table(&config));

    let problems = problems(&config);
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("  - {problem}");
        }
        anyhow::bail!("config has {} problem(s)", problems.len());
    }

    println!("Config OK");
    Ok(())
}

fn settings_table(config: &LearnpathConfig) -> Table {
    let session = &config.session;
    let policy = match session.level_policy {
        LevelPolicy::Thresholds {
            intermediate_at,
            advanced_at,
        } => format!("thresholds (intermediate >= {intermediate_at}, advanced >= {advanced_at})"),
        LevelPolicy::Model => "model".to_string(),
    };

    let mut table = Table::new();
    table.set_header(vec!["Setting", "Value"]);
    let rows = [
        ("default_provider", config.default_provider.clone()),
        ("default_model", config.default_model.clone()),
        ("temperature", config.temperature.to_string()),
        ("max_tokens", config.max_tokens.to_string()),
        ("search_provider", config.search_provider.clone()),
        ("max_search_results", config.max_search_results.to_string()),
        ("session.diagnostic_items", session.diagnostic_items.to_string()),
        ("session.module_quiz_items", session.module_quiz_items.to_string()),
        ("session.plan_modules", session.plan_modules.to_string()),
        ("session.max_retries", session.max_retries.to_string()),
        ("session.level_policy", policy),
    ];
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    table
}

fn backends_table(config: &LearnpathConfig) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Backend", "Type", "API key", "Base URL"]);

    let mut providers: Vec<_> = config.providers.iter().collect();
    providers.sort_by(|a, b| a.0.cmp(b.0));
    for (name, provider) in providers {
        let (kind, key, url) = match provider {
            ProviderConfig::Gemini { api_key, base_url } => {
                ("gemini", mask(Some(api_key)), base_url.clone())
            }
            ProviderConfig::OpenAI {
                api_key, base_url, ..
            } => ("openai", mask(Some(api_key)), base_url.clone()),
            ProviderConfig::Ollama { base_url } => ("ollama", mask(None), Some(base_url.clone())),
        };
        table.add_row(vec![
            Cell::new(name),
            Cell::new(kind),
            Cell::new(key),
            Cell::new(url.unwrap_or_else(|| "default".into())),
        ]);
    }

    let mut searches: Vec<_> = config.search.iter().collect();
    searches.sort_by(|a, b| a.0.cmp(b.0));
    for (name, search) in searches {
        let SearchConfig::Tavily { api_key, base_url } = search;
        table.add_row(vec![
            Cell::new(name),
            Cell::new("tavily"),
            Cell::new(mask(Some(api_key))),
            Cell::new(base_url.clone().unwrap_or_else(|| "default".into())),
        ]);
    }
    table
}

fn mask(key: Option<&String>) -> String {
    match key {
        None => "not needed".into(),
        Some(k) if k.trim().is_empty() => "MISSING".into(),
        Some(_) => "set (***)".into(),
    }
}

fn problems(config: &LearnpathConfig) -> Vec<String> {
    let mut problems = Vec::new();

    match config.providers.get(&config.default_provider) {
        None => problems.push(format!(
            "default provider '{}' is not configured",
            config.default_provider
        )),
        Some(ProviderConfig::Gemini { api_key, .. } | ProviderConfig::OpenAI { api_key, .. })
            if api_key.trim().is_empty() =>
        {
            problems.push(format!(
                "default provider '{}' has no API key",
                config.default_provider
            ));
        }
        Some(_) => {}
    }

    match config.search.get(&config.search_provider) {
        None => problems.push(format!(
            "search provider '{}' is not configured",
            config.search_provider
        )),
        Some(SearchConfig::Tavily { api_key, .. }) if api_key.trim().is_empty() => {
            problems.push(format!(
                "search provider '{}' has no API key",
                config.search_provider
            ));
        }
        Some(_) => {}
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use learnpath_providers::config::parse_config;

    #[test]
    fn complete_config_has_no_problems() {
        let config = parse_config(
            r#"
[providers.gemini]
type = "gemini"
api_key = "g-key"

[search.tavily]
type = "tavily"
api_key = "t-key"
"#,
        )
        .unwrap();
        assert!(problems(&config).is_empty());
        let rendered = backends_table(&config).to_string();
        assert!(!rendered.contains("g-key"));
        assert!(rendered.contains("set (***)"));
    }

    #[test]
    fn missing_backends_are_reported() {
        let config = parse_config(
            r#"
[providers.gemini]
type = "gemini"
api_key = ""
"#,
        )
        .unwrap();
        let problems = problems(&config);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("has no API key"));
        assert!(problems[1].contains("search provider 'tavily' is not configured"));
    }
}
