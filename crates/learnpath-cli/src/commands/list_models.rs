//! The `learnpath list-models` command.

use std::path::PathBuf;

use anyhow::Result;

use learnpath_core::traits::ModelInfo;
use learnpath_providers::config::{load_config_from, ProviderConfig};
use learnpath_providers::create_provider;
use learnpath_providers::ollama::OllamaProvider;

pub async fn execute(provider_filter: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    let mut found_any = false;
    for name in names {
        if provider_filter.as_ref().is_some_and(|filter| filter != name) {
            continue;
        }
        let provider_config = &config.providers[name];

        let models = match provider_config {
            ProviderConfig::Ollama { base_url } => {
                match OllamaProvider::new(base_url)?.list_models_async().await {
                    Ok(models) => models,
                    Err(e) => {
                        println!("Provider: {name}\n  (unavailable: {e})\n");
                        continue;
                    }
                }
            }
            _ => match create_provider(provider_config) {
                Ok(provider) => provider.available_models(),
                Err(e) => {
                    println!("Provider: {name}\n  (skipped: {e})\n");
                    continue;
                }
            },
        };

        if !models.is_empty() {
            found_any = true;
            println!("Provider: {name}");
            for model in &models {
                println!("  {}", describe(model));
            }
            println!();
        }
    }

    if !found_any {
        println!("No providers configured. Run `learnpath init` to create a config file.");
    }

    Ok(())
}

fn describe(model: &ModelInfo) -> String {
    if model.max_context == 0 {
        format!("{} ({})", model.id, model.name)
    } else {
        format!(
            "{} ({}, {}K context)",
            model.id,
            model.name,
            model.max_context / 1000
        )
    }
}
