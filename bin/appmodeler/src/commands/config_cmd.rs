use appmodeler_core::{Config, Paths};

pub fn show() -> anyhow::Result<()> {
    let paths = Paths::new();
    let mut config = Config::load_or_default(&paths)?;
    if !config.ai.api_key.is_empty() {
        config.ai.api_key = "***".to_string();
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!();
    println!("Config file: {}", paths.config_file().display());
    Ok(())
}

pub fn init(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config_path = paths.config_file();
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    Config::default().save(&paths)?;
    println!("✅ Wrote {}", config_path.display());
    println!("   Set ai.apiKey (or APPMODELER_API_KEY) before connecting.");
    Ok(())
}
