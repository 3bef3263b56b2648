//! `simap doctor`: Diagnose configuration and dependencies.

use crate::services;
use simap_core::knowledge::VectorStore;
use simap_retrieval::QdrantStore;
use std::path::Path;

pub async fn run(config_path: Option<&Path>, init_db: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("SIMAP Doctor");
    println!("============\n");

    let mut issues = 0;

    let config = match services::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. Fix the configuration first.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ✅ LLM API key configured ({})", config.llm.model);
    } else {
        println!("  ⚠️  No LLM API key. Set OPENAI_API_KEY or llm.api_key");
        issues += 1;
    }

    match services::open_database(&config).await {
        Ok(db) => {
            match db.ping().await {
                Ok(()) => println!("  ✅ Database reachable ({})", db.driver()),
                Err(e) => {
                    println!("  ❌ Database not answering: {e}");
                    issues += 1;
                }
            }
            if init_db {
                match db.ensure_schema().await {
                    Ok(()) => println!("  ✅ Tables created or already present"),
                    Err(e) => {
                        println!("  ❌ Could not create tables: {e}");
                        issues += 1;
                    }
                }
            }
            match db.schema_present().await {
                Ok(true) => println!("  ✅ Tables consultas and prompts present"),
                Ok(false) => {
                    println!("  ⚠️  Tables missing. Run `simap doctor --init-db`");
                    issues += 1;
                }
                Err(e) => {
                    println!("  ❌ Could not inspect tables: {e}");
                    issues += 1;
                }
            }
            db.close().await;
        }
        Err(e) => {
            println!("  ❌ Database unavailable: {e}");
            issues += 1;
        }
    }

    let collection = &config.vector_store.collection;
    match QdrantStore::from_config(&config.vector_store) {
        Ok(store) => match store.collection_exists(collection).await {
            Ok(true) => println!("  ✅ Collection '{collection}' found at {}", config.vector_store.url),
            Ok(false) => {
                println!("  ❌ Collection '{collection}' does not exist");
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Vector store unreachable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Vector store misconfigured: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
