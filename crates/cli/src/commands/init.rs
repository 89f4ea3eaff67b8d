//! `storyloom init` — Write a default config file.

use std::path::Path;

use storyloom_config::AppConfig;

pub async fn run(config: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));

    println!("🧵 Storyloom — Setup");
    println!("====================\n");

    if config_path.exists() && !force {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or re-run with --force to overwrite.\n");
        return Ok(());
    }

    if let Some(dir) = config_path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("✅ Created config directory: {}", dir.display());
        }
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Add your API key under [llm] (or set STORYLOOM_API_KEY)");
    println!("   2. Run: storyloom doctor");
    println!("   3. Run: storyloom architecture --project my-novel --topic \"...\"\n");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_parseable_config_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        run(Some(&path), false).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(AppConfig::load_from(&path).is_ok());

        std::fs::write(&path, "# edited").unwrap();
        run(Some(&path), false).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# edited");

        run(Some(&path), true).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), written);
    }
}
