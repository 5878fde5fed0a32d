use promptvault::provider::{Model, Provider, ProviderRef};
use promptvault::session::Tab;
use promptvault::{Config, MemoryBackend, PromptMeta, PromptWorkbench};

fn main() -> anyhow::Result<()> {
    // Initialize logging for better debugging
    tracing_subscriber::fmt::init();

    println!("=== Prompt Workbench Demo ===\n");

    let backend = MemoryBackend::new()
        .with_providers(vec![Provider {
            id: 1,
            name: "Ollama".to_string(),
            api_key: None,
            base_url: Some("http://localhost:11434".to_string()),
            models: vec![
                Model { id: 1, name: "llama3".to_string() },
                Model { id: 2, name: "mistral".to_string() },
            ],
        }])?
        .with_responder(|request| {
            Ok(format!(
                "[{} via {}] {}",
                request.model_name, request.model_provider, request.prompt_text
            ))
        });

    let mut workbench = PromptWorkbench::new(backend, Config::default());
    workbench.load_providers()?;

    // 1. Author a template
    println!("--- Editing ---");
    workbench.edit_meta(PromptMeta {
        name: "order-status".to_string(),
        description: Some("Tells a customer where their order is".to_string()),
        tags: Some("support,orders".to_string()),
    })?;
    workbench.edit_template("Hello {{name}}, order {{id}} is {{status}}.")?;
    println!("Variables: {:?}", workbench.state().bindings.names());

    workbench.set_variable("name", "Alice")?;
    workbench.set_variable("id", "A-1024")?;
    workbench.set_variable("status", "shipped")?;

    // 2. Save a few versions
    println!("\n--- Versions ---");
    workbench.save("first draft")?;
    workbench.edit_template("Hi {{name}}! Your order {{id}} has {{status}}.")?;
    workbench.save("friendlier tone")?;

    for version in workbench.state().history.history() {
        println!(
            "  V{} - {}",
            version.version_number,
            version.commit_message.as_deref().unwrap_or("No message")
        );
    }

    // 3. Compare the latest version with its predecessor
    workbench.select_tab(Tab::History)?;
    let latest = workbench.state().history.history()[0].id;
    workbench.compare(latest)?;
    if let Some(comparison) = &workbench.state().comparison {
        println!("\nV{}: {}", comparison.older.version_number, comparison.older.template);
        println!("V{}: {}", comparison.newer.version_number, comparison.newer.template);
    }
    workbench.close_comparison()?;

    // 4. Run it
    println!("\n--- Playground ---");
    workbench.select_provider(ProviderRef::Configured(1))?;
    workbench.select_model("mistral")?;
    println!("Result: {}", workbench.run()?);

    // A malformed config aborts the run before anything is sent
    workbench.edit_config("{\"temperature\": }")?;
    match workbench.run() {
        Ok(_) => println!("Unexpected success"),
        Err(e) => println!("Expected error: {}", e),
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
